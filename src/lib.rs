mod backend;
mod canvas;
mod compose;
mod content;
mod debug;
mod error;
mod footer;
mod layout;
mod metrics;
mod normalize;
mod pdf;
mod request;
mod svg;
mod text;
mod types;

pub use backend::RenderBackend;
pub use canvas::{Canvas, Command, Document, Page, Paint, Stroke, TextAlign, TextStyle};
pub use compose::{
    ComposerSettings, HEADER_HEIGHT, META_BLOCK, META_CARD, META_CATALOG, META_CONTINUED,
    META_GRID_COLUMNS, META_REPORT_TYPE, META_SECTION, PageComposer, PageSection,
    STANDARD_METRIC_KEYS, SUMMARY_METRIC_KEYS,
};
pub use content::{Block, BlockTone, BounceBucket, insights, recommendations, summary_narrative};
use debug::DebugLogger;
pub use error::ReportError;
pub use footer::{
    DEFAULT_GENERATED_LABEL, DEFAULT_PAGE_LABEL, FooterSpec, FooterValues, stamp,
    substitute_placeholders,
};
pub use layout::{
    CardPlacement, GridGeometry, GridState, LayoutCursor, MIN_SPLIT_LINES, PlacementPlan,
    PlacementStep, StackItem, StackPlacement, StackPlan, StackStep, columns_for, place_grid,
    place_stack,
};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use normalize::{canonical_key, normalize};
pub use pagewright_catalog::{
    MAX_METRICS, METRIC_CATALOG, MetricCategory, MetricDefinition, MetricLookup, MetricValue,
    RankedEntry, ResolvedMetric, ValueFormat, catalog_fingerprint_sha256, definition, resolve,
    resolve_all,
};
pub use pdf::PdfBackend;
pub use request::{
    Branding, CustomField, DEFAULT_AGENCY_NAME, DEFAULT_BRAND_COLOR, DateRange, FieldKind,
    INVALID_DATE, PrimaryMetrics, QueryStat, ReportRequest, ReportType, format_date, parse_date,
};
pub use svg::SvgBackend;
pub use text::{measure_text_width, truncate_with_ellipsis, wrap_lines};
pub use types::{Color, Margins, Point, Pt, Rect, Size};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Composes and renders reports. Holds only immutable configuration, so one engine can
/// serve many threads.
pub struct ReportEngine {
    composer: PageComposer,
    debug: Option<Arc<DebugLogger>>,
}

#[derive(Clone)]
pub struct ReportEngineBuilder {
    settings: ComposerSettings,
    debug_path: Option<PathBuf>,
}

impl ReportEngine {
    pub fn builder() -> ReportEngineBuilder {
        ReportEngineBuilder::new()
    }

    pub fn settings(&self) -> &ComposerSettings {
        self.composer.settings()
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    /// Validated, laid out and footer-stamped pages, ready for any backend.
    pub fn compose(&self, request: &ReportRequest) -> Result<Document, ReportError> {
        let document = self.composer.compose(request);
        self.emit_debug_summary("compose");
        document
    }

    pub fn compose_with_metrics(
        &self,
        request: &ReportRequest,
    ) -> Result<(Document, DocumentMetrics), ReportError> {
        let started = Instant::now();
        let document = self.composer.compose(request)?;
        let mut metrics = DocumentMetrics::from_document(&document);
        metrics.compose_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.emit_debug_summary("compose_with_metrics");
        Ok((document, metrics))
    }

    pub fn render_with<B: RenderBackend>(
        &self,
        request: &ReportRequest,
        backend: &B,
    ) -> Result<B::Output, ReportError> {
        let document = self.composer.compose(request)?;
        let output = backend.render(&document);
        self.emit_debug_summary(backend.name());
        output
    }

    pub fn render_pdf(&self, request: &ReportRequest) -> Result<Vec<u8>, ReportError> {
        self.render_with(request, &pdf_backend_for(request))
    }

    pub fn render_pdf_with_metrics(
        &self,
        request: &ReportRequest,
    ) -> Result<(Vec<u8>, DocumentMetrics), ReportError> {
        let (document, mut metrics) = self.compose_with_metrics(request)?;
        let bytes = pdf_backend_for(request).render(&document)?;
        metrics.total_bytes = bytes.len();
        Ok((bytes, metrics))
    }

    pub fn render_pdf_to_file(
        &self,
        request: &ReportRequest,
        path: impl AsRef<std::path::Path>,
    ) -> Result<usize, ReportError> {
        let bytes = self.render_pdf(request)?;
        std::fs::write(path, &bytes)?;
        Ok(bytes.len())
    }

    /// One SVG string per page.
    pub fn render_svg(&self, request: &ReportRequest) -> Result<Vec<String>, ReportError> {
        self.render_with(request, &SvgBackend::default())
    }

    // Independent requests render in parallel; results keep input order and one failure
    // does not affect the others.
    pub fn render_batch_pdf(&self, requests: &[ReportRequest]) -> Vec<Result<Vec<u8>, ReportError>> {
        use rayon::prelude::*;

        let results: Vec<Result<Vec<u8>, ReportError>> = requests
            .par_iter()
            .map(|request| {
                let document = self.composer.compose(request)?;
                pdf_backend_for(request).render(&document)
            })
            .collect();
        self.emit_debug_summary("render_batch_pdf");
        results
    }
}

impl Default for ReportEngine {
    fn default() -> Self {
        Self {
            composer: PageComposer::default(),
            debug: None,
        }
    }
}

fn pdf_backend_for(request: &ReportRequest) -> PdfBackend {
    let client = request.client_name.trim();
    let title = if client.is_empty() {
        request.report_type.title().to_string()
    } else {
        format!("{} - {}", request.report_type.title(), client)
    };
    PdfBackend::default().with_title(title)
}

impl ReportEngineBuilder {
    pub fn new() -> Self {
        Self {
            settings: ComposerSettings::default(),
            debug_path: None,
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.settings.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.settings.margins = margins;
        self
    }

    pub fn card_height(mut self, height: f32) -> Self {
        self.settings.card_height = Pt::from_f32(height);
        self
    }

    pub fn card_gap(mut self, gap: f32) -> Self {
        self.settings.card_gap = Pt::from_f32(gap);
        self
    }

    pub fn footer_reserve(mut self, reserve: f32) -> Self {
        self.settings.footer.reserve = Pt::from_f32(reserve);
        self
    }

    pub fn max_metrics(mut self, max: usize) -> Self {
        self.settings.max_metrics = max;
        self
    }

    pub fn standard_metric_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.standard_metric_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn summary_metric_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.summary_metric_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    // Footer templates accept {page}, {pages}, {agency} and {date}.
    pub fn page_label(mut self, template: impl Into<String>) -> Self {
        self.settings.footer.page_label = template.into();
        self
    }

    pub fn generated_label(mut self, template: impl Into<String>) -> Self {
        self.settings.footer.generated_label = template.into();
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ReportEngine, ReportError> {
        let mut settings = self.settings;
        validate_settings(&settings)?;
        settings.footer.margin_left = settings.margins.left;
        settings.footer.margin_right = settings.margins.right;
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };
        Ok(ReportEngine {
            composer: PageComposer::new(settings).with_debug(debug.clone()),
            debug,
        })
    }
}

impl Default for ReportEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_settings(settings: &ComposerSettings) -> Result<(), ReportError> {
    let invalid = |message: String| Err(ReportError::InvalidConfiguration(message));
    let size = settings.page_size;
    if size.width <= Pt::ZERO || size.height <= Pt::ZERO {
        return invalid(format!("page size must be positive, got {} x {}", size.width, size.height));
    }
    let margins = settings.margins;
    if [margins.top, margins.right, margins.bottom, margins.left]
        .iter()
        .any(|m| *m < Pt::ZERO)
    {
        return invalid("margins cannot be negative".to_string());
    }
    if settings.geometry().content_width() <= Pt::ZERO {
        return invalid("left and right margins leave no content width".to_string());
    }
    if settings.card_height <= Pt::ZERO {
        return invalid("card_height must be > 0".to_string());
    }
    if settings.card_gap < Pt::ZERO || settings.footer.reserve < Pt::ZERO {
        return invalid("card_gap and footer_reserve cannot be negative".to_string());
    }
    if settings.content_top() + settings.card_height > size.height - settings.footer.reserve {
        return invalid(format!(
            "no room for a card row: content starts at {}, card_height {}, footer starts at {}",
            settings.content_top(),
            settings.card_height,
            size.height - settings.footer.reserve
        ));
    }
    if settings.max_metrics == 0 {
        return invalid("max_metrics must be at least 1".to_string());
    }
    for key in settings
        .standard_metric_keys
        .iter()
        .chain(settings.summary_metric_keys.iter())
    {
        if definition(key).is_none() {
            return invalid(format!("unknown metric id {key:?}"));
        }
    }
    Ok(())
}
