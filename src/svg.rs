use crate::backend::{RenderBackend, ensure_finalized};
use crate::canvas::{Command, Document, Page, Paint, TextAlign};
use crate::error::ReportError;
use crate::types::Pt;
use std::fmt::Write as _;

const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";

/// One standalone SVG string per page.
#[derive(Debug, Clone)]
pub struct SvgBackend {
    /// Vertical space between pages in [`SvgBackend::render_stacked`].
    pub page_gap: Pt,
}

impl Default for SvgBackend {
    fn default() -> Self {
        Self {
            page_gap: Pt::from_i32(16),
        }
    }
}

impl RenderBackend for SvgBackend {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "svg"
    }

    fn render(&self, document: &Document) -> Result<Vec<String>, ReportError> {
        ensure_finalized(document, self.name())?;
        let width = document.page_size.width;
        let height = document.page_size.height;
        Ok(document
            .pages
            .iter()
            .map(|page| {
                let mut out = svg_open(width, height);
                write_page(&mut out, page, width, height);
                out.push_str("</svg>\n");
                out
            })
            .collect())
    }
}

impl SvgBackend {
    /// Every page in one SVG, top to bottom, for previews.
    pub fn render_stacked(&self, document: &Document) -> Result<String, ReportError> {
        ensure_finalized(document, self.name())?;
        let width = document.page_size.width;
        let height = document.page_size.height;
        let count = document.pages.len() as i32;
        let total = height * count + self.page_gap * (count - 1).max(0);
        let mut out = svg_open(width, total);
        let mut offset = Pt::ZERO;
        for page in &document.pages {
            let _ = writeln!(out, "<g transform=\"translate(0 {offset})\">");
            write_page(&mut out, page, width, height);
            out.push_str("</g>\n");
            offset += height + self.page_gap;
        }
        out.push_str("</svg>\n");
        Ok(out)
    }
}

fn svg_open(width: Pt, height: Pt) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">\n"
    )
}

fn write_page(out: &mut String, page: &Page, width: Pt, height: Pt) {
    let _ = writeln!(out, "<rect x=\"0\" y=\"0\" width=\"{width}\" height=\"{height}\" fill=\"#ffffff\"/>");
    for cmd in page.commands.iter().chain(page.footer.iter().flatten()) {
        write_command(out, cmd);
    }
}

fn write_command(out: &mut String, cmd: &Command) {
    match cmd {
        Command::Meta { .. } => {}
        Command::DrawText {
            x,
            y,
            text,
            style,
            align,
        } => {
            let anchor = match align {
                TextAlign::Left => "start",
                TextAlign::Center => "middle",
                TextAlign::Right => "end",
            };
            let weight = if style.bold { " font-weight=\"bold\"" } else { "" };
            // Baseline sits one font size below the top of the text box, as in the PDF backend.
            let _ = writeln!(
                out,
                "<text x=\"{}\" y=\"{}\" font-family=\"{}\" font-size=\"{}\"{} fill=\"{}\" text-anchor=\"{}\">{}</text>",
                x,
                *y + style.font_size,
                FONT_FAMILY,
                style.font_size,
                weight,
                style.color.to_hex(),
                anchor,
                escape_xml(text)
            );
        }
        Command::DrawRect { rect, radius, paint } => {
            let corner = if *radius > Pt::ZERO {
                format!(" rx=\"{radius}\" ry=\"{radius}\"")
            } else {
                String::new()
            };
            let _ = writeln!(
                out,
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\"{}{}/>",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                corner,
                paint_attrs(paint)
            );
        }
        Command::DrawLine { from, to, stroke } => {
            let _ = writeln!(
                out,
                "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"{}\"/>",
                from.x,
                from.y,
                to.x,
                to.y,
                stroke.color.to_hex(),
                stroke.width
            );
        }
        Command::DrawCircle { center, radius, paint } => {
            let _ = writeln!(
                out,
                "<circle cx=\"{}\" cy=\"{}\" r=\"{}\"{}/>",
                center.x,
                center.y,
                radius,
                paint_attrs(paint)
            );
        }
        Command::DrawImage { rect, source } => {
            let _ = writeln!(
                out,
                "<image x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" preserveAspectRatio=\"xMidYMid meet\" href=\"{}\"/>",
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                escape_xml(source)
            );
        }
    }
}

fn paint_attrs(paint: &Paint) -> String {
    let fill = paint.fill.map(|c| c.to_hex()).unwrap_or_else(|| "none".to_string());
    let mut attrs = format!(" fill=\"{fill}\"");
    if let Some(stroke) = paint.stroke {
        let _ = write!(
            attrs,
            " stroke=\"{}\" stroke-width=\"{}\"",
            stroke.color.to_hex(),
            stroke.width
        );
    }
    attrs
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Canvas, TextStyle};
    use crate::footer::{FooterSpec, stamp};
    use crate::request::Branding;
    use crate::types::{Color, Point, Rect, Size};

    fn sample() -> Document {
        let mut canvas = Canvas::new(Size::a4());
        canvas.meta("report.section", "cover");
        canvas.draw_text(
            "Q&A <draft> \"v2\"",
            Pt::from_i32(50),
            Pt::from_i32(40),
            TextStyle::new(12.0, Color::BLACK).bold(),
            TextAlign::Center,
        );
        canvas.rounded_rect(
            Rect::new(Pt::from_i32(50), Pt::from_i32(80), Pt::from_i32(200), Pt::from_i32(80)),
            Pt::from_i32(8),
            Paint::fill_and_stroke(Color::WHITE, Color::BLACK, 0.75),
        );
        canvas.draw_circle(Point::new(Pt::from_i32(60), Pt::from_i32(90)), Pt::from_i32(4), Paint::fill(Color::BLACK));
        canvas.draw_image(
            Rect::new(Pt::from_i32(50), Pt::from_i32(200), Pt::from_i32(120), Pt::from_i32(48)),
            "logo.png?size=2&fmt=png",
        );
        canvas.show_page();
        canvas.draw_text("second", Pt::from_i32(50), Pt::from_i32(40), TextStyle::default(), TextAlign::Left);
        stamp(canvas.finish(), &Branding::default(), &FooterSpec::default(), "today")
    }

    #[test]
    fn each_page_is_well_formed_svg() {
        let pages = SvgBackend::default().render(&sample()).unwrap();
        assert_eq!(pages.len(), 2);
        for svg in &pages {
            let parsed = roxmltree::Document::parse(svg).unwrap();
            assert_eq!(parsed.root_element().tag_name().name(), "svg");
        }
        let first = roxmltree::Document::parse(&pages[0]).unwrap();
        let texts: Vec<&str> = first
            .descendants()
            .filter(|n| n.has_tag_name("text"))
            .filter_map(|n| n.text())
            .collect();
        assert!(texts.contains(&"Q&A <draft> \"v2\""));
        assert!(texts.contains(&"Page 1 of 2"));
        let image = first.descendants().find(|n| n.has_tag_name("image")).unwrap();
        assert_eq!(image.attribute("href"), Some("logo.png?size=2&fmt=png"));
    }

    #[test]
    fn shapes_keep_top_left_coordinates() {
        let svg = SvgBackend::default().render(&sample()).unwrap().remove(0);
        assert!(svg.contains("<rect x=\"50\" y=\"80\" width=\"200\" height=\"80\" rx=\"8\" ry=\"8\" fill=\"#ffffff\" stroke=\"#000000\" stroke-width=\"0.75\"/>"));
        assert!(svg.contains("<circle cx=\"60\" cy=\"90\" r=\"4\" fill=\"#000000\"/>"));
        assert!(svg.contains("text-anchor=\"middle\""));
        assert!(svg.contains("y=\"52\""));
    }

    #[test]
    fn stacked_output_offsets_pages() {
        let svg = SvgBackend::default().render_stacked(&sample()).unwrap();
        let parsed = roxmltree::Document::parse(&svg).unwrap();
        let groups: Vec<_> = parsed
            .root_element()
            .children()
            .filter(|n| n.has_tag_name("g"))
            .filter_map(|n| n.attribute("transform"))
            .collect();
        assert_eq!(groups, vec!["translate(0 0)", "translate(0 857.89)"]);
        assert_eq!(parsed.root_element().attribute("height"), Some("1699.78"));
    }

    #[test]
    fn unstamped_documents_are_refused() {
        let doc = Canvas::new(Size::a4()).finish();
        assert!(SvgBackend::default().render(&doc).is_err());
        assert!(SvgBackend::default().render_stacked(&doc).is_err());
    }
}
