use crate::types::{Color, Point, Pt, Rect, Size};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    fn as_str(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: Pt,
    pub bold: bool,
    pub color: Color,
}

impl TextStyle {
    pub fn new(font_size: f32, color: Color) -> Self {
        Self {
            font_size: Pt::from_f32(font_size),
            bold: false,
            color,
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

impl Default for TextStyle {
    fn default() -> Self {
        Self::new(12.0, Color::BLACK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: Pt,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Paint {
    pub fill: Option<Color>,
    pub stroke: Option<Stroke>,
}

impl Paint {
    pub fn fill(color: Color) -> Self {
        Self {
            fill: Some(color),
            stroke: None,
        }
    }

    pub fn stroke(color: Color, width: f32) -> Self {
        Self {
            fill: None,
            stroke: Some(Stroke {
                color,
                width: Pt::from_f32(width),
            }),
        }
    }

    pub fn fill_and_stroke(fill: Color, stroke: Color, width: f32) -> Self {
        Self {
            fill: Some(fill),
            stroke: Some(Stroke {
                color: stroke,
                width: Pt::from_f32(width),
            }),
        }
    }
}

/// Backend-neutral drawing command. Coordinates are top-left origin; text `y` is the top
/// of the text box and `x` is the anchor selected by `align`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Non-rendered metadata used for page-aware reporting. Ignored by backends.
    Meta {
        key: String,
        value: String,
    },
    DrawText {
        x: Pt,
        y: Pt,
        text: String,
        style: TextStyle,
        align: TextAlign,
    },
    DrawRect {
        rect: Rect,
        radius: Pt,
        paint: Paint,
    },
    DrawLine {
        from: Point,
        to: Point,
        stroke: Stroke,
    },
    DrawCircle {
        center: Point,
        radius: Pt,
        paint: Paint,
    },
    DrawImage {
        rect: Rect,
        source: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub commands: Vec<Command>,
    /// Filled by the footer pass once the final page count is known.
    pub footer: Option<Vec<Command>>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
            footer: None,
        }
    }

    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.commands.iter().filter_map(move |cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.commands.iter().find_map(|cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.commands
            .iter()
            .chain(self.footer.iter().flatten())
            .filter_map(|cmd| match cmd {
                Command::DrawText { text, .. } => Some(text.as_str()),
                _ => None,
            })
    }

    pub fn contains_text(&self, needle: &str) -> bool {
        self.texts().any(|text| text.contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True once every page has had its footer stamped.
    pub fn is_finalized(&self) -> bool {
        !self.pages.is_empty() && self.pages.iter().all(|page| page.footer.is_some())
    }

    pub fn pages_in_section<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a Page> + 'a {
        self.pages
            .iter()
            .filter(move |page| page.meta(crate::compose::META_SECTION) == Some(section))
    }

    /// Hex SHA-256 over a canonical dump of every page, footers included.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            format!(
                "size {} {}\n",
                self.page_size.width.to_milli_i64(),
                self.page_size.height.to_milli_i64()
            )
            .as_bytes(),
        );
        for (idx, page) in self.pages.iter().enumerate() {
            hasher.update(format!("page {idx}\n").as_bytes());
            for cmd in &page.commands {
                hasher.update(canonical_command(cmd).as_bytes());
            }
            match &page.footer {
                Some(footer) => {
                    hasher.update(b"footer\n");
                    for cmd in footer {
                        hasher.update(canonical_command(cmd).as_bytes());
                    }
                }
                None => hasher.update(b"footer pending\n"),
            }
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for b in digest {
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

fn canonical_color(color: Color) -> String {
    color.to_hex()
}

fn canonical_paint(paint: &Paint) -> String {
    let fill = paint.fill.map(canonical_color).unwrap_or_else(|| "-".to_string());
    let stroke = paint
        .stroke
        .map(|s| format!("{}/{}", canonical_color(s.color), s.width.to_milli_i64()))
        .unwrap_or_else(|| "-".to_string());
    format!("{fill} {stroke}")
}

fn canonical_command(cmd: &Command) -> String {
    match cmd {
        Command::Meta { key, value } => format!("meta {key:?} {value:?}\n"),
        Command::DrawText {
            x,
            y,
            text,
            style,
            align,
        } => format!(
            "text {} {} {} {} {} {} {text:?}\n",
            x.to_milli_i64(),
            y.to_milli_i64(),
            style.font_size.to_milli_i64(),
            style.bold,
            canonical_color(style.color),
            align.as_str()
        ),
        Command::DrawRect { rect, radius, paint } => format!(
            "rect {} {} {} {} {} {}\n",
            rect.x.to_milli_i64(),
            rect.y.to_milli_i64(),
            rect.width.to_milli_i64(),
            rect.height.to_milli_i64(),
            radius.to_milli_i64(),
            canonical_paint(paint)
        ),
        Command::DrawLine { from, to, stroke } => format!(
            "line {} {} {} {} {} {}\n",
            from.x.to_milli_i64(),
            from.y.to_milli_i64(),
            to.x.to_milli_i64(),
            to.y.to_milli_i64(),
            canonical_color(stroke.color),
            stroke.width.to_milli_i64()
        ),
        Command::DrawCircle {
            center,
            radius,
            paint,
        } => format!(
            "circle {} {} {} {}\n",
            center.x.to_milli_i64(),
            center.y.to_milli_i64(),
            radius.to_milli_i64(),
            canonical_paint(paint)
        ),
        Command::DrawImage { rect, source } => format!(
            "image {} {} {} {} {source:?}\n",
            rect.x.to_milli_i64(),
            rect.y.to_milli_i64(),
            rect.width.to_milli_i64(),
            rect.height.to_milli_i64()
        ),
    }
}

/// Records drawing commands page by page.
pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Zero-based index of the page currently being drawn.
    pub fn page_index(&self) -> usize {
        self.pages.len()
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.current.commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn draw_text(&mut self, text: impl Into<String>, x: Pt, y: Pt, style: TextStyle, align: TextAlign) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.current.commands.push(Command::DrawText {
            x,
            y,
            text,
            style,
            align,
        });
    }

    pub fn draw_rect(&mut self, rect: Rect, paint: Paint) {
        self.rounded_rect(rect, Pt::ZERO, paint);
    }

    pub fn rounded_rect(&mut self, rect: Rect, radius: Pt, paint: Paint) {
        let max_radius = rect.width.min(rect.height) / 2;
        let radius = radius.max(Pt::ZERO).min(max_radius);
        self.current.commands.push(Command::DrawRect {
            rect,
            radius,
            paint,
        });
    }

    pub fn draw_line(&mut self, from: Point, to: Point, color: Color, width: f32) {
        self.current.commands.push(Command::DrawLine {
            from,
            to,
            stroke: Stroke {
                color,
                width: Pt::from_f32(width),
            },
        });
    }

    pub fn draw_circle(&mut self, center: Point, radius: Pt, paint: Paint) {
        self.current.commands.push(Command::DrawCircle {
            center,
            radius: radius.max(Pt::ZERO),
            paint,
        });
    }

    pub fn draw_image(&mut self, rect: Rect, source: impl Into<String>) {
        self.current.commands.push(Command::DrawImage {
            rect,
            source: source.into(),
        });
    }

    pub fn current_command_count(&self) -> usize {
        self.current.commands.len()
    }

    pub fn is_current_empty(&self) -> bool {
        self.current.commands.is_empty()
    }

    pub fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}
