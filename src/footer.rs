//! Second pass over a composed document: draws the footer on every page once the final
//! page count is known.

use crate::canvas::{Command, Document, Stroke, TextAlign, TextStyle};
use crate::request::Branding;
use crate::types::{Color, Point, Pt};

pub const DEFAULT_PAGE_LABEL: &str = "Page {page} of {pages}";
pub const DEFAULT_GENERATED_LABEL: &str = "Generated by {agency} on {date}";

#[derive(Debug, Clone, PartialEq)]
pub struct FooterSpec {
    pub page_label: String,
    pub generated_label: String,
    /// Inset of the agency column and the start of the separator.
    pub margin_left: Pt,
    /// Inset of the page label and the end of the separator.
    pub margin_right: Pt,
    /// Height of the band at the bottom of each page that content never enters.
    pub reserve: Pt,
    pub color: Color,
}

impl Default for FooterSpec {
    fn default() -> Self {
        Self {
            page_label: DEFAULT_PAGE_LABEL.to_string(),
            generated_label: DEFAULT_GENERATED_LABEL.to_string(),
            margin_left: Pt::from_i32(50),
            margin_right: Pt::from_i32(50),
            reserve: Pt::from_i32(60),
            color: Color::gray(0.42),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FooterValues<'a> {
    pub page: usize,
    pub pages: usize,
    pub agency: &'a str,
    pub date: &'a str,
}

/// Replaces `{page}`, `{pages}`, `{agency}` and `{date}`. Unknown or unclosed tokens are
/// kept as written.
pub fn substitute_placeholders(template: &str, values: &FooterValues<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];
        let Some(end) = rest.find('}') else {
            out.push('{');
            out.push_str(rest);
            return out;
        };
        let token = &rest[..end];
        match token {
            "page" => out.push_str(&values.page.to_string()),
            "pages" => out.push_str(&values.pages.to_string()),
            "agency" => out.push_str(values.agency),
            "date" => out.push_str(values.date),
            _ => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Fills every page's footer slot. Existing footers are replaced, so stamping twice is
/// the same as stamping once.
pub fn stamp(mut document: Document, branding: &Branding, spec: &FooterSpec, generated_on: &str) -> Document {
    let total_pages = document.pages.len();
    let left = spec.margin_left;
    let right = document.page_size.width - spec.margin_right;
    let center = (left + right) / 2;
    let top = document.page_size.height - spec.reserve + Pt::from_i32(15);
    let agency = branding.agency_name();
    let contact = branding.contact_line();

    for (idx0, page) in document.pages.iter_mut().enumerate() {
        let values = FooterValues {
            page: idx0 + 1,
            pages: total_pages,
            agency,
            date: generated_on,
        };
        let mut footer = vec![Command::DrawLine {
            from: Point::new(left, top),
            to: Point::new(right, top),
            stroke: Stroke {
                color: Color::gray(0.82),
                width: Pt::from_f32(0.5),
            },
        }];
        footer.push(Command::DrawText {
            x: left,
            y: top + Pt::from_i32(8),
            text: agency.to_string(),
            style: TextStyle::new(9.0, spec.color).bold(),
            align: TextAlign::Left,
        });
        if !contact.is_empty() {
            footer.push(Command::DrawText {
                x: left,
                y: top + Pt::from_i32(21),
                text: contact.clone(),
                style: TextStyle::new(7.5, spec.color),
                align: TextAlign::Left,
            });
        }
        footer.push(Command::DrawText {
            x: center,
            y: top + Pt::from_i32(8),
            text: substitute_placeholders(&spec.generated_label, &values),
            style: TextStyle::new(8.0, spec.color),
            align: TextAlign::Center,
        });
        footer.push(Command::DrawText {
            x: right,
            y: top + Pt::from_i32(8),
            text: substitute_placeholders(&spec.page_label, &values),
            style: TextStyle::new(9.0, spec.color),
            align: TextAlign::Right,
        });
        page.footer = Some(footer);
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::types::Size;

    fn three_pages() -> Document {
        let mut canvas = Canvas::new(Size::a4());
        for label in ["one", "two", "three"] {
            canvas.draw_text(label, Pt::from_i32(50), Pt::from_i32(50), TextStyle::default(), TextAlign::Left);
            canvas.show_page();
        }
        canvas.finish()
    }

    fn values() -> FooterValues<'static> {
        FooterValues {
            page: 2,
            pages: 7,
            agency: "North Star",
            date: "March 1, 2024",
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        assert_eq!(substitute_placeholders(DEFAULT_PAGE_LABEL, &values()), "Page 2 of 7");
        assert_eq!(
            substitute_placeholders(DEFAULT_GENERATED_LABEL, &values()),
            "Generated by North Star on March 1, 2024"
        );
    }

    #[test]
    fn unknown_and_unclosed_tokens_survive() {
        assert_eq!(substitute_placeholders("{page}/{total}", &values()), "2/{total}");
        assert_eq!(substitute_placeholders("p{page} {oops", &values()), "p2 {oops");
    }

    #[test]
    fn every_page_gets_its_number_and_the_final_count() {
        let doc = three_pages();
        assert!(!doc.is_finalized());
        let stamped = stamp(doc, &Branding::default(), &FooterSpec::default(), "January 31, 2024");
        assert!(stamped.is_finalized());
        assert!(stamped.pages[0].contains_text("Page 1 of 3"));
        assert!(stamped.pages[2].contains_text("Page 3 of 3"));
        assert!(stamped.pages[1].contains_text("Generated by Your Agency on January 31, 2024"));
    }

    #[test]
    fn contact_line_is_drawn_when_present() {
        let branding = Branding {
            agency_name: Some("North Star".to_string()),
            email: Some("hello@northstar.io".to_string()),
            ..Branding::default()
        };
        let stamped = stamp(three_pages(), &branding, &FooterSpec::default(), "today");
        assert!(stamped.pages[0].contains_text("hello@northstar.io"));
        assert!(stamped.pages[0].contains_text("North Star"));
    }

    #[test]
    fn asymmetric_margins_align_each_column() {
        let spec = FooterSpec {
            margin_left: Pt::from_i32(72),
            margin_right: Pt::from_i32(36),
            ..FooterSpec::default()
        };
        let stamped = stamp(three_pages(), &Branding::default(), &spec, "today");
        let footer = stamped.pages[0].footer.as_ref().unwrap();
        let right = stamped.page_size.width - Pt::from_i32(36);
        assert!(matches!(
            &footer[0],
            Command::DrawLine { from, to, .. } if from.x == Pt::from_i32(72) && to.x == right
        ));
        let x_of = |align: TextAlign| {
            footer.iter().find_map(|cmd| match cmd {
                Command::DrawText { x, align: a, .. } if *a == align => Some(*x),
                _ => None,
            })
        };
        assert_eq!(x_of(TextAlign::Left), Some(Pt::from_i32(72)));
        assert_eq!(x_of(TextAlign::Right), Some(right));
        assert_eq!(x_of(TextAlign::Center), Some((Pt::from_i32(72) + right) / 2));
    }

    #[test]
    fn stamping_twice_is_idempotent() {
        let spec = FooterSpec::default();
        let once = stamp(three_pages(), &Branding::default(), &spec, "d");
        let twice = stamp(once.clone(), &Branding::default(), &spec, "d");
        assert_eq!(once.fingerprint(), twice.fingerprint());
    }
}
