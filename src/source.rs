//! Source items and classification
//!
//! A [`SourceItem`] is one caller-supplied file: its bytes, the media type the
//! caller declared for it, and the timestamp that decides its place in the
//! merged document. [`classify`] narrows an item to a [`SourceKind`] without
//! ever failing.

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
/// How far into the payload we look for the PDF header
const PDF_SNIFF_WINDOW: usize = 1024;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// One user-supplied file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Opaque identity (usually the file name)
    pub id: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
    /// Media type declared by the caller, e.g. `image/png`
    pub media_type: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl SourceItem {
    pub fn new(
        id: impl Into<String>,
        bytes: Vec<u8>,
        media_type: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            bytes,
            media_type: media_type.into(),
            timestamp,
        }
    }
}

/// Image encodings the classifier can tell apart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
    Png,
    /// Any other image subtype (gif, webp, ...); rejected at synthesis time
    Other(String),
}

impl ImageEncoding {
    pub fn name(&self) -> &str {
        match self {
            ImageEncoding::Jpeg => "jpeg",
            ImageEncoding::Png => "png",
            ImageEncoding::Other(name) => name,
        }
    }
}

/// Structural kind of a source item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Image(ImageEncoding),
    Unsupported,
}

impl SourceKind {
    /// Whether items of this kind can contribute pages
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            SourceKind::Pdf | SourceKind::Image(ImageEncoding::Jpeg | ImageEncoding::Png)
        )
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Pdf => write!(f, "pdf"),
            SourceKind::Image(encoding) => write!(f, "image/{}", encoding.name()),
            SourceKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A source item together with its resolved kind
#[derive(Debug, Clone)]
pub struct ClassifiedItem<'a> {
    pub item: &'a SourceItem,
    pub kind: SourceKind,
    /// Index of the item in the caller's input list
    pub position: usize,
}

impl<'a> ClassifiedItem<'a> {
    pub fn new(item: &'a SourceItem, position: usize) -> Self {
        Self {
            item,
            kind: classify(&item.bytes, &item.media_type),
            position,
        }
    }
}

/// Classify a payload by its declared media type and its magic bytes
///
/// For images the magic bytes win over the label, so a PNG uploaded as
/// `image/jpeg` is still treated as PNG. A payload without a recognizable
/// signature falls back to the label. The PDF signature is only sniffed when
/// the declared type says nothing (empty or `application/octet-stream`).
pub fn classify(bytes: &[u8], media_type: &str) -> SourceKind {
    let (category, subtype) = split_media_type(media_type);

    if category == "image" {
        let encoding = sniff_image(bytes).unwrap_or_else(|| match subtype.as_str() {
            "jpeg" | "jpg" | "pjpeg" => ImageEncoding::Jpeg,
            "png" => ImageEncoding::Png,
            other => ImageEncoding::Other(other.to_string()),
        });
        return SourceKind::Image(encoding);
    }

    if category == "application" && subtype == "pdf" {
        return SourceKind::Pdf;
    }

    if is_opaque_type(&category, &subtype) && has_pdf_header(bytes) {
        return SourceKind::Pdf;
    }

    SourceKind::Unsupported
}

/// Lower-cased (category, subtype), ignoring parameters such as `; charset=`
fn split_media_type(media_type: &str) -> (String, String) {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.split_once('/') {
        Some((category, subtype)) => (category.to_string(), subtype.to_string()),
        None => (essence, String::new()),
    }
}

/// A declared type that carries no information about the content
fn is_opaque_type(category: &str, subtype: &str) -> bool {
    category.is_empty() || (category == "application" && subtype == "octet-stream")
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_SNIFF_WINDOW)];
    window
        .windows(PDF_MAGIC.len())
        .any(|candidate| candidate == PDF_MAGIC)
}

fn sniff_image(bytes: &[u8]) -> Option<ImageEncoding> {
    if bytes.starts_with(JPEG_MAGIC) {
        Some(ImageEncoding::Jpeg)
    } else if bytes.starts_with(PNG_MAGIC) {
        Some(ImageEncoding::Png)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageEncoding::Other("gif".to_string()))
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ImageEncoding::Other("webp".to_string()))
    } else if bytes.starts_with(b"BM") {
        Some(ImageEncoding::Other("bmp".to_string()))
    } else if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        Some(ImageEncoding::Other("tiff".to_string()))
    } else {
        None
    }
}

/// Guess a media type from a file extension
pub fn guess_media_type(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
