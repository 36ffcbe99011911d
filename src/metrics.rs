use crate::canvas::Document;
use crate::compose::{META_CARD, META_SECTION};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub section: String,
    pub command_count: usize,
    pub card_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub compose_ms: f64,
    /// Size of the rendered output; zero until a backend has run.
    pub total_bytes: usize,
}

impl DocumentMetrics {
    pub fn from_document(document: &Document) -> Self {
        let pages = document
            .pages
            .iter()
            .enumerate()
            .map(|(idx, page)| PageMetrics {
                page_number: idx + 1,
                section: page.meta(META_SECTION).unwrap_or_default().to_string(),
                command_count: page.commands.len() + page.footer.as_ref().map_or(0, Vec::len),
                card_count: page.meta_values(META_CARD).count(),
            })
            .collect();
        Self {
            pages,
            compose_ms: 0.0,
            total_bytes: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn card_count(&self) -> usize {
        self.pages.iter().map(|page| page.card_count).sum()
    }
}
