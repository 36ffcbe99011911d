use crate::backend::{ImageData, ImageEncoding, RenderBackend, ensure_finalized, load_image};
use crate::canvas::{Command, Document, Paint, TextAlign};
use crate::error::ReportError;
use crate::text::measure_text_width;
use crate::types::{Color, Point, Pt, Rect};
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream, dictionary};
use std::collections::HashMap;
use std::fmt::Write as _;

// Bezier handle length for quarter circles.
const KAPPA: f32 = 0.552_284_8;

const FONT_REGULAR: &str = "F1";
const FONT_BOLD: &str = "F2";

/// Writes documents as PDF 1.5 using the base-14 Helvetica pair, so nothing is embedded
/// except logo images.
#[derive(Debug, Clone)]
pub struct PdfBackend {
    pub title: Option<String>,
    pub producer: String,
    pub compress: bool,
}

impl Default for PdfBackend {
    fn default() -> Self {
        Self {
            title: None,
            producer: concat!("pagewright ", env!("CARGO_PKG_VERSION")).to_string(),
            compress: true,
        }
    }
}

impl PdfBackend {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

impl RenderBackend for PdfBackend {
    type Output = Vec<u8>;

    fn name(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, document: &Document) -> Result<Vec<u8>, ReportError> {
        ensure_finalized(document, self.name())?;
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular_id = doc.add_object(base14_font("Helvetica"));
        let bold_id = doc.add_object(base14_font("Helvetica-Bold"));

        let width = document.page_size.width;
        let height = document.page_size.height;
        let mut images = ImageCache::default();
        let mut kids = Vec::with_capacity(document.pages.len());

        for page in &document.pages {
            let mut writer = ContentWriter::new(height);
            let mut xobjects = Dictionary::new();
            for cmd in page.commands.iter().chain(page.footer.iter().flatten()) {
                if let Command::DrawImage { rect, source } = cmd {
                    match images.get_or_insert(&mut doc, source) {
                        Some((name, id)) => {
                            xobjects.set(name.clone(), id);
                            writer.image(*rect, &name);
                        }
                        None => writer.missing_image(*rect),
                    }
                } else {
                    writer.command(cmd);
                }
            }

            let content_id = doc.add_object(LoStream::new(dictionary! {}, writer.finish().into_bytes()));
            let mut resources = dictionary! {
                "Font" => dictionary! {
                    FONT_REGULAR => regular_id,
                    FONT_BOLD => bold_id,
                },
            };
            if !xobjects.is_empty() {
                resources.set("XObject", xobjects);
            }
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources,
                "MediaBox" => vec![0.into(), 0.into(), width.to_f32().into(), height.to_f32().into()],
            });
            kids.push(LoObject::Reference(page_id));
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut info = dictionary! {
            "Producer" => LoObject::string_literal(self.producer.as_str()),
        };
        if let Some(title) = self.title.as_deref() {
            info.set("Title", LoObject::string_literal(title));
        }
        let info_id = doc.add_object(info);
        doc.trailer.set("Info", info_id);

        if self.compress {
            doc.compress();
        }
        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|err| ReportError::Render(format!("pdf write failed: {err}")))?;
        log::debug!(
            "pdf backend wrote {} pages ({} bytes, {} images)",
            document.pages.len(),
            out.len(),
            images.embedded
        );
        Ok(out)
    }
}

fn base14_font(base_font: &str) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

#[derive(Default)]
struct ImageCache {
    by_source: HashMap<String, Option<(String, LoObjectId)>>,
    embedded: usize,
}

impl ImageCache {
    fn get_or_insert(&mut self, doc: &mut LoDocument, source: &str) -> Option<(String, LoObjectId)> {
        if let Some(cached) = self.by_source.get(source) {
            return cached.clone();
        }
        let entry = match load_image(source) {
            Some(image) => {
                self.embedded += 1;
                let name = format!("Im{}", self.embedded);
                Some((name, embed_image(doc, image)))
            }
            None => {
                log::warn!("logo image {} could not be loaded; drawing a placeholder", preview(source));
                None
            }
        };
        self.by_source.insert(source.to_string(), entry.clone());
        entry
    }
}

fn preview(source: &str) -> String {
    if source.chars().count() <= 48 {
        return source.to_string();
    }
    let mut out: String = source.chars().take(48).collect();
    out.push_str("...");
    out
}

fn embed_image(doc: &mut LoDocument, image: ImageData) -> LoObjectId {
    let smask_id = image.alpha.map(|alpha| {
        let mut stream = LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        );
        let _ = stream.compress();
        doc.add_object(stream)
    });

    let color_space = if image.gray { "DeviceGray" } else { "DeviceRGB" };
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width as i64,
        "Height" => image.height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
    };
    if let Some(smask_id) = smask_id {
        dict.set("SMask", smask_id);
    }
    let stream = match image.encoding {
        ImageEncoding::Dct => {
            dict.set("Filter", "DCTDecode");
            LoStream::new(dict, image.data).with_compression(false)
        }
        ImageEncoding::Raw => {
            let mut stream = LoStream::new(dict, image.data);
            let _ = stream.compress();
            stream
        }
    };
    doc.add_object(stream)
}

/// Builds one page content stream, flipping the top-left command space into PDF's
/// bottom-left user space.
struct ContentWriter {
    page_height: Pt,
    out: String,
}

impl ContentWriter {
    fn new(page_height: Pt) -> Self {
        Self {
            page_height,
            out: String::new(),
        }
    }

    fn finish(self) -> String {
        self.out
    }

    fn flip(&self, y: Pt) -> Pt {
        self.page_height - y
    }

    fn command(&mut self, cmd: &Command) {
        match cmd {
            Command::Meta { .. } | Command::DrawImage { .. } => {}
            Command::DrawText {
                x,
                y,
                text,
                style,
                align,
            } => {
                let width = measure_text_width(text, style.font_size, style.bold);
                let x = match align {
                    TextAlign::Left => *x,
                    TextAlign::Center => *x - width / 2,
                    TextAlign::Right => *x - width,
                };
                let baseline = self.flip(*y) - style.font_size;
                let font = if style.bold { FONT_BOLD } else { FONT_REGULAR };
                let _ = writeln!(
                    self.out,
                    "q {} BT /{} {} Tf {} {} Td ({}) Tj ET Q",
                    fill_color(style.color),
                    font,
                    style.font_size,
                    x,
                    baseline,
                    encode_winansi(text)
                );
            }
            Command::DrawRect { rect, radius, paint } => {
                if paint.fill.is_none() && paint.stroke.is_none() {
                    return;
                }
                self.out.push_str("q ");
                self.paint_state(paint);
                if *radius > Pt::ZERO {
                    self.rounded_rect_path(*rect, *radius);
                } else {
                    let _ = write!(
                        self.out,
                        "{} {} {} {} re ",
                        rect.x,
                        self.flip(rect.bottom()),
                        rect.width,
                        rect.height
                    );
                }
                let _ = writeln!(self.out, "{} Q", paint_op(paint));
            }
            Command::DrawLine { from, to, stroke } => {
                let _ = writeln!(
                    self.out,
                    "q {} {} w {} {} m {} {} l S Q",
                    stroke_color(stroke.color),
                    stroke.width,
                    from.x,
                    self.flip(from.y),
                    to.x,
                    self.flip(to.y)
                );
            }
            Command::DrawCircle { center, radius, paint } => {
                if paint.fill.is_none() && paint.stroke.is_none() {
                    return;
                }
                self.out.push_str("q ");
                self.paint_state(paint);
                self.circle_path(*center, *radius);
                let _ = writeln!(self.out, "{} Q", paint_op(paint));
            }
        }
    }

    fn image(&mut self, rect: Rect, name: &str) {
        let _ = writeln!(
            self.out,
            "q {} 0 0 {} {} {} cm /{} Do Q",
            rect.width,
            rect.height,
            rect.x,
            self.flip(rect.bottom()),
            name
        );
    }

    // Outline where an unloadable logo would have gone.
    fn missing_image(&mut self, rect: Rect) {
        let _ = writeln!(
            self.out,
            "q {} 0.75 w {} {} {} {} re S Q",
            stroke_color(Color::gray(0.75)),
            rect.x,
            self.flip(rect.bottom()),
            rect.width,
            rect.height
        );
    }

    fn paint_state(&mut self, paint: &Paint) {
        if let Some(fill) = paint.fill {
            let _ = write!(self.out, "{} ", fill_color(fill));
        }
        if let Some(stroke) = paint.stroke {
            let _ = write!(self.out, "{} {} w ", stroke_color(stroke.color), stroke.width);
        }
    }

    fn rounded_rect_path(&mut self, rect: Rect, radius: Pt) {
        let k = radius * (1.0 - KAPPA);
        let left = rect.x;
        let right = rect.right();
        let top = self.flip(rect.y);
        let bottom = self.flip(rect.bottom());
        let _ = write!(
            self.out,
            "{} {} m {} {} l {} {} {} {} {} {} c {} {} l {} {} {} {} {} {} c {} {} l {} {} {} {} {} {} c {} {} l {} {} {} {} {} {} c h ",
            left + radius,
            bottom,
            right - radius,
            bottom,
            right - k,
            bottom,
            right,
            bottom + k,
            right,
            bottom + radius,
            right,
            top - radius,
            right,
            top - k,
            right - k,
            top,
            right - radius,
            top,
            left + radius,
            top,
            left + k,
            top,
            left,
            top - k,
            left,
            top - radius,
            left,
            bottom + radius,
            left,
            bottom + k,
            left + k,
            bottom,
            left + radius,
            bottom
        );
    }

    fn circle_path(&mut self, center: Point, radius: Pt) {
        let cx = center.x;
        let cy = self.flip(center.y);
        let k = radius * KAPPA;
        let _ = write!(
            self.out,
            "{} {} m {} {} {} {} {} {} c {} {} {} {} {} {} c {} {} {} {} {} {} c {} {} {} {} {} {} c h ",
            cx + radius,
            cy,
            cx + radius,
            cy + k,
            cx + k,
            cy + radius,
            cx,
            cy + radius,
            cx - k,
            cy + radius,
            cx - radius,
            cy + k,
            cx - radius,
            cy,
            cx - radius,
            cy - k,
            cx - k,
            cy - radius,
            cx,
            cy - radius,
            cx + k,
            cy - radius,
            cx + radius,
            cy - k,
            cx + radius,
            cy
        );
    }
}

fn paint_op(paint: &Paint) -> &'static str {
    match (paint.fill.is_some(), paint.stroke.is_some()) {
        (true, true) => "B",
        (true, false) => "f",
        (false, true) => "S",
        (false, false) => "n",
    }
}

fn channel(value: f32) -> Pt {
    Pt::from_f32(value.clamp(0.0, 1.0))
}

fn fill_color(color: Color) -> String {
    format!("{} {} {} rg", channel(color.r), channel(color.g), channel(color.b))
}

fn stroke_color(color: Color) -> String {
    format!("{} {} {} RG", channel(color.r), channel(color.g), channel(color.b))
}

/// Escapes text for a literal string shown with a WinAnsi-encoded base-14 font. Characters
/// outside the code page become `?`.
fn encode_winansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            _ => b'?',
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if b < 0x20 || b >= 0x7f => {
                let _ = write!(out, "\\{:03o}", b);
            }
            b => out.push(b as char),
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
    use crate::types::Size;

    fn stamped(build: impl FnOnce(&mut Canvas)) -> Document {
        let mut canvas = Canvas::new(Size::a4());
        build(&mut canvas);
        stamp(canvas.finish(), &Branding::default(), &FooterSpec::default(), "January 31, 2024")
    }

    fn page_contents(bytes: &[u8]) -> Vec<String> {
        let doc = LoDocument::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned())
            .collect()
    }

    #[test]
    fn unstamped_documents_are_refused() {
        let doc = Canvas::new(Size::a4()).finish();
        let err = PdfBackend::default().render(&doc).unwrap_err();
        assert!(matches!(err, ReportError::Render(_)));
        assert!(err.to_string().contains("footer-stamped"));
    }

    #[test]
    fn pages_and_footers_survive_a_reload() {
        let doc = stamped(|canvas| {
            canvas.draw_text("Cover", Pt::from_i32(50), Pt::from_i32(50), TextStyle::default(), TextAlign::Left);
            canvas.show_page();
            canvas.draw_text("Second (draft)", Pt::from_i32(50), Pt::from_i32(50), TextStyle::default(), TextAlign::Left);
        });
        let bytes = PdfBackend::default().with_title("Acme report").render(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let contents = page_contents(&bytes);
        assert_eq!(contents.len(), 2);
        assert!(contents[0].contains("(Page 1 of 2) Tj"));
        assert!(contents[1].contains("(Second \\(draft\\)) Tj"));

        let reloaded = LoDocument::load_mem(&bytes).unwrap();
        let info_id = reloaded.trailer.get(b"Info").and_then(LoObject::as_reference).unwrap();
        let info = reloaded.get_dictionary(info_id).unwrap();
        assert_eq!(info.get(b"Title").and_then(LoObject::as_str).unwrap(), b"Acme report");
    }

    #[test]
    fn text_is_placed_from_the_top_left() {
        let doc = stamped(|canvas| {
            canvas.draw_text("Top", Pt::from_i32(50), Pt::from_i32(100), TextStyle::new(10.0, Color::BLACK), TextAlign::Left);
        });
        let bytes = PdfBackend {
            compress: false,
            ..PdfBackend::default()
        }
        .render(&doc)
        .unwrap();
        // 841.89 - 100 - 10
        assert!(page_contents(&bytes)[0].contains("/F1 10 Tf 50 731.89 Td (Top) Tj"));
    }

    #[test]
    fn shapes_emit_path_operators() {
        let doc = stamped(|canvas| {
            let rect = Rect::new(Pt::from_i32(10), Pt::from_i32(10), Pt::from_i32(100), Pt::from_i32(40));
            canvas.rounded_rect(rect, Pt::from_i32(6), Paint::fill_and_stroke(Color::WHITE, Color::BLACK, 1.0));
            canvas.draw_circle(Point::new(Pt::from_i32(200), Pt::from_i32(200)), Pt::from_i32(5), Paint::fill(Color::BLACK));
        });
        let content = page_contents(&PdfBackend::default().render(&doc).unwrap()).remove(0);
        assert!(content.contains(" c h B Q"));
        assert!(content.contains(" c h f Q"));
        assert!(content.contains("0 0 0 RG"));
    }

    #[test]
    fn logo_images_are_embedded_once() {
        let logo = crate::backend::png_data_uri(4, 4, [37, 99, 235, 255]);
        let doc = stamped(|canvas| {
            let rect = Rect::new(Pt::from_i32(50), Pt::from_i32(36), Pt::from_i32(120), Pt::from_i32(48));
            canvas.draw_image(rect, logo.clone());
            canvas.show_page();
            canvas.draw_image(rect, logo.clone());
        });
        let bytes = PdfBackend::default().render(&doc).unwrap();
        let reloaded = LoDocument::load_mem(&bytes).unwrap();
        let images = reloaded
            .objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .filter(|stream| matches!(stream.dict.get(b"Subtype").and_then(LoObject::as_name), Ok(name) if name == b"Image"))
            .count();
        assert_eq!(images, 1);
        assert!(page_contents(&bytes)[1].contains("/Im1 Do"));
    }

    #[test]
    fn unreachable_logo_draws_a_placeholder() {
        let doc = stamped(|canvas| {
            canvas.draw_image(
                Rect::new(Pt::from_i32(50), Pt::from_i32(36), Pt::from_i32(120), Pt::from_i32(48)),
                "https://cdn.example.com/logo.png",
            );
        });
        let content = page_contents(&PdfBackend::default().render(&doc).unwrap()).remove(0);
        assert!(!content.contains(" Do Q"));
        assert!(content.contains("50 757.89 120 48 re S"));
    }

    #[test]
    fn winansi_escapes() {
        assert_eq!(encode_winansi("a(b)\\"), "a\\(b\\)\\\\");
        assert_eq!(encode_winansi("café"), "caf\\351");
        assert_eq!(encode_winansi("€ 5 – 6"), "\\200 5 \\226 6");
        assert_eq!(encode_winansi("日本"), "??");
    }
}
