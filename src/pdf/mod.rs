//! PDF page synthesis and assembly

pub mod assemble;
pub mod image;
pub mod import;
pub mod metadata;

use lopdf::Document;

use crate::error::{Error, Result};
use crate::layout::{PageGeometry, Placement};
use crate::source::{ClassifiedItem, SourceKind};

// Re-export commonly used items
pub use self::assemble::Assembler;
pub use self::image::{image_page, prepare_image, PreparedImage};
pub use self::import::import_pdf;
pub use self::metadata::{
    count_pages, count_pages_in_bytes, extract_metadata, extract_metadata_from_bytes, PdfMetadata,
};

/// One page of the merged document
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputPage {
    /// Copied from a source PDF; `source_page` is 1-based
    Copied { source_page: u32 },
    /// Newly created around a single image
    Image(Placement),
}

/// The pages synthesized from one source item
///
/// `document` is a self-contained fragment whose page tree lists the pages in
/// output order; the assembler takes its objects over wholesale.
#[derive(Debug)]
pub struct PageSet {
    pub item_id: String,
    pub document: Document,
    pub pages: Vec<OutputPage>,
}

impl PageSet {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Turn a classified item into its output pages
pub fn synthesize(
    item: &ClassifiedItem<'_>,
    geometry: &PageGeometry,
    allow_upscale: bool,
) -> Result<PageSet> {
    let source = item.item;
    match &item.kind {
        SourceKind::Pdf => import_pdf(&source.id, &source.bytes),
        SourceKind::Image(encoding) => {
            image_page(&source.id, encoding, &source.bytes, geometry, allow_upscale)
        }
        SourceKind::Unsupported => Err(Error::UnsupportedSource {
            item: source.id.clone(),
            media_type: source.media_type.clone(),
        }),
    }
}
