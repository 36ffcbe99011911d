use crate::canvas::Document;
use crate::error::ReportError;
use base64::Engine;
use image::GenericImageView;
use std::path::Path;

/// Turns a stamped [`Document`] into an output format. Backends interpret the command list
/// only; they never see the request or the layout plan.
pub trait RenderBackend {
    type Output;

    fn name(&self) -> &'static str;

    fn render(&self, document: &Document) -> Result<Self::Output, ReportError>;
}

/// Footers carry the final page count, so an unstamped document is not renderable.
pub(crate) fn ensure_finalized(document: &Document, backend: &str) -> Result<(), ReportError> {
    if document.is_finalized() {
        Ok(())
    } else {
        Err(ReportError::Render(format!(
            "{backend} backend requires a footer-stamped document"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageEncoding {
    /// JPEG bytes embedded as-is.
    Dct,
    /// Raw 8-bit samples; the writer compresses them.
    Raw,
}

#[derive(Debug, Clone)]
pub(crate) struct ImageData {
    pub width: u32,
    pub height: u32,
    pub gray: bool,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

/// Loads a `data:` URI or a local file. Remote references and undecodable bytes yield
/// `None`; callers decide how to degrade.
pub(crate) fn load_image(source: &str) -> Option<ImageData> {
    if let Some((mime, data)) = parse_data_uri(source) {
        return decode_image_bytes(&data, Some(&mime));
    }
    if source.contains("://") {
        return None;
    }
    let bytes = std::fs::read(Path::new(source)).ok()?;
    decode_image_bytes(&bytes, None)
}

pub(crate) fn decode_image_bytes(data: &[u8], mime: Option<&str>) -> Option<ImageData> {
    let format = match mime {
        Some(mime) if mime.contains("png") => Some(image::ImageFormat::Png),
        Some(mime) if mime.contains("jpeg") || mime.contains("jpg") => Some(image::ImageFormat::Jpeg),
        _ => image::guess_format(data).ok(),
    };

    let decoded = image::load_from_memory(data).ok()?;
    let (width, height) = decoded.dimensions();

    if matches!(format, Some(image::ImageFormat::Jpeg)) {
        let gray = matches!(decoded.color(), image::ColorType::L8 | image::ColorType::La8);
        return Some(ImageData {
            width,
            height,
            gray,
            encoding: ImageEncoding::Dct,
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    Some(ImageData {
        width,
        height,
        gray: false,
        encoding: ImageEncoding::Raw,
        data: rgb,
        alpha: has_alpha.then_some(alpha),
    })
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        base64::engine::general_purpose::STANDARD
            .decode(data_part.trim())
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
pub(crate) fn png_data_uri(width: u32, height: u32, rgba: [u8; 4]) -> String {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_header_and_payload() {
        let (mime, data) = parse_data_uri("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(data, b"hello");
        let (mime, data) = parse_data_uri("data:,raw").unwrap();
        assert_eq!(mime, "application/octet-stream");
        assert_eq!(data, b"raw");
        assert!(parse_data_uri("https://example.com/logo.png").is_none());
        assert!(parse_data_uri("data:image/png;base64").is_none());
    }

    #[test]
    fn png_logo_decodes_to_rgb_samples() {
        let image = load_image(&png_data_uri(3, 2, [10, 20, 30, 255])).unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(image.encoding, ImageEncoding::Raw);
        assert_eq!(image.data.len(), 3 * 2 * 3);
        assert_eq!(&image.data[..3], &[10, 20, 30]);
        assert!(image.alpha.is_none());
    }

    #[test]
    fn translucent_png_keeps_an_alpha_plane() {
        let image = load_image(&png_data_uri(2, 2, [0, 0, 0, 128])).unwrap();
        assert_eq!(image.alpha.as_deref(), Some(&[128u8, 128, 128, 128][..]));
    }

    #[test]
    fn unreachable_sources_are_none() {
        assert!(load_image("https://cdn.example.com/logo.png").is_none());
        assert!(load_image("/definitely/not/here.png").is_none());
        assert!(load_image("data:image/png;base64,AAAA").is_none());
    }
}
