//! Embedded image resources.

use serde::{Deserialize, Serialize};

/// Image bytes carried alongside a document.
///
/// Resources are keyed in [`Document::resources`](super::Document) by the
/// source handle of the image block that refers to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Raw binary data
    #[serde(skip)]
    pub data: Vec<u8>,

    /// MIME type (e.g., "image/jpeg")
    pub mime_type: String,

    /// Original filename if known
    pub filename: Option<String>,

    /// Width in pixels
    pub width: Option<u32>,

    /// Height in pixels
    pub height: Option<u32>,
}

impl Resource {
    /// Create a new resource with an explicit MIME type.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            filename: None,
            width: None,
            height: None,
        }
    }

    /// Create a resource from raw bytes, sniffing MIME type and pixel size.
    pub fn from_data(data: Vec<u8>) -> Self {
        let mime = Self::detect_mime_type(&data).unwrap_or("application/octet-stream");
        let dimensions = image_dimensions(&data);
        let mut resource = Self::new(data, mime);
        if let Some((width, height)) = dimensions {
            resource = resource.with_dimensions(width, height);
        }
        resource
    }

    /// Create a PNG image resource.
    pub fn png(data: Vec<u8>) -> Self {
        Self::new(data, "image/png")
    }

    /// Create a JPEG image resource.
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self::new(data, "image/jpeg")
    }

    /// Set image dimensions.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Set filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Check if word processors can embed this image inline.
    pub fn is_embeddable(&self) -> bool {
        matches!(
            self.mime_type.as_str(),
            "image/png" | "image/jpeg" | "image/gif" | "image/bmp" | "image/tiff"
        )
    }

    /// Get the file extension based on MIME type.
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/tiff" => "tiff",
            "image/bmp" => "bmp",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            "application/pdf" => "pdf",
            "image/x-emf" => "emf",
            "image/x-wmf" => "wmf",
            _ => "bin",
        }
    }

    /// Map a file extension to an image MIME type.
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "gif" => Some("image/gif"),
            "bmp" => Some("image/bmp"),
            "tif" | "tiff" => Some("image/tiff"),
            "webp" => Some("image/webp"),
            "svg" => Some("image/svg+xml"),
            "pdf" => Some("application/pdf"),
            "emf" => Some("image/x-emf"),
            "wmf" => Some("image/x-wmf"),
            _ => None,
        }
    }

    /// Detect MIME type from data magic bytes.
    pub fn detect_mime_type(data: &[u8]) -> Option<&'static str> {
        if data.len() < 8 {
            return None;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some("image/jpeg");
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some("image/png");
        }

        // GIF: GIF87a or GIF89a
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some("image/gif");
        }

        // TIFF: 49 49 2A 00 (little-endian) or 4D 4D 00 2A (big-endian)
        if data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            return Some("image/tiff");
        }

        // BMP: BM
        if data.starts_with(b"BM") {
            return Some("image/bmp");
        }

        // WEBP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some("image/webp");
        }

        if data.starts_with(b"%PDF-") {
            return Some("application/pdf");
        }

        None
    }
}

/// Read pixel dimensions from PNG, GIF, BMP or JPEG headers.
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    match Resource::detect_mime_type(data)? {
        "image/png" => {
            // Signature, IHDR length and tag, then width and height.
            let width = u32::from_be_bytes(data.get(16..20)?.try_into().ok()?);
            let height = u32::from_be_bytes(data.get(20..24)?.try_into().ok()?);
            Some((width, height))
        }
        "image/gif" => {
            let width = u16::from_le_bytes(data.get(6..8)?.try_into().ok()?);
            let height = u16::from_le_bytes(data.get(8..10)?.try_into().ok()?);
            Some((width as u32, height as u32))
        }
        "image/bmp" => {
            let width = i32::from_le_bytes(data.get(18..22)?.try_into().ok()?);
            let height = i32::from_le_bytes(data.get(22..26)?.try_into().ok()?);
            Some((width.unsigned_abs(), height.unsigned_abs()))
        }
        "image/jpeg" => jpeg_dimensions(data),
        _ => None,
    }
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut i = 2;
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        match marker {
            0xFF => {
                i += 1;
                continue;
            }
            0x01 | 0xD0..=0xD8 => {
                i += 2;
                continue;
            }
            _ => {}
        }
        let length = u16::from_be_bytes(data.get(i + 2..i + 4)?.try_into().ok()?) as usize;
        // Start-of-frame markers, excluding DHT, JPG and DAC.
        if (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            let height = u16::from_be_bytes(data.get(i + 5..i + 7)?.try_into().ok()?);
            let width = u16::from_be_bytes(data.get(i + 7..i + 9)?.try_into().ok()?);
            return Some((width as u32, height as u32));
        }
        i += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    #[test]
    fn test_resource_new() {
        let res = Resource::jpeg(vec![0xFF, 0xD8, 0xFF]);
        assert!(res.is_embeddable());
        assert_eq!(res.mime_type, "image/jpeg");
        assert_eq!(res.extension(), "jpg");
    }

    #[test]
    fn test_detect_mime_type() {
        let jpeg_data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
        assert_eq!(Resource::detect_mime_type(&jpeg_data), Some("image/jpeg"));

        let png_data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(Resource::detect_mime_type(&png_data), Some("image/png"));

        let unknown = vec![0x00; 8];
        assert_eq!(Resource::detect_mime_type(&unknown), None);
    }

    #[test]
    fn test_png_dimensions() {
        let res = Resource::from_data(png_header(640, 480));
        assert_eq!(res.mime_type, "image/png");
        assert_eq!(res.width, Some(640));
        assert_eq!(res.height, Some(480));
    }

    #[test]
    fn test_jpeg_dimensions() {
        let data = vec![
            0xFF, 0xD8, // SOI
            0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, // APP0, 2 payload bytes
            0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x20, 0x00, 0x40, // SOF0 64x32
            0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(image_dimensions(&data), Some((64, 32)));
    }

    #[test]
    fn test_unknown_data_is_not_embeddable() {
        let res = Resource::from_data(b"not an image at all".to_vec());
        assert_eq!(res.mime_type, "application/octet-stream");
        assert!(!res.is_embeddable());
        assert_eq!(res.width, None);
    }

    #[test]
    fn test_extension_round_trip() {
        assert_eq!(Resource::mime_for_extension("JPEG"), Some("image/jpeg"));
        assert_eq!(Resource::png(vec![]).extension(), "png");
        assert_eq!(Resource::new(vec![], "image/svg+xml").extension(), "svg");
        assert_eq!(Resource::mime_for_extension("docx"), None);
    }
}
