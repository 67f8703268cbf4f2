//! PDF metadata extraction

use std::path::Path;
use lopdf::{Document, Object};
use crate::error::{Error, Result};

/// Count pages by reading the Count field from the Pages dictionary
fn count_pages_from_catalog(doc: &Document, item: &str) -> Result<usize> {
    let malformed = |detail: &str| Error::MalformedDocument {
        item: item.to_string(),
        detail: detail.to_string(),
    };

    let catalog = doc.catalog().map_err(|_| malformed("no catalog"))?;

    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|_| malformed("catalog has no Pages reference"))?;

    let pages_dict = doc
        .get_dictionary(pages_id)
        .map_err(|_| malformed("Pages is not a dictionary"))?;

    match pages_dict.get(b"Count") {
        Ok(Object::Integer(n)) if *n >= 0 => Ok(*n as usize),
        Ok(_) => Err(malformed("Count is not a non-negative integer")),
        Err(_) => Err(malformed("no Count in Pages")),
    }
}

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
    /// Producing application (if present)
    pub producer: Option<String>,
}

fn load(bytes: &[u8], item: &str) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| Error::MalformedDocument {
        item: item.to_string(),
        detail: e.to_string(),
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read(path)?)
}

/// Read a text entry of the Info dictionary
fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info_id = doc.trailer.get(b"Info").and_then(Object::as_reference).ok()?;
    let info = doc.get_dictionary(info_id).ok()?;
    let bytes = info.get(key).and_then(Object::as_str).ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Extract metadata from PDF bytes
pub fn extract_metadata_from_bytes(bytes: &[u8], item: &str) -> Result<PdfMetadata> {
    let doc = load(bytes, item)?;

    Ok(PdfMetadata {
        page_count: count_pages_from_catalog(&doc, item)?,
        title: info_string(&doc, b"Title"),
        author: info_string(&doc, b"Author"),
        producer: info_string(&doc, b"Producer"),
    })
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    let bytes = read_file(path)?;
    extract_metadata_from_bytes(&bytes, &path.display().to_string())
}

/// Count the pages of an in-memory PDF
///
/// This is a quick operation that reads the Count field from the Pages dictionary.
pub fn count_pages_in_bytes(bytes: &[u8]) -> Result<usize> {
    let doc = load(bytes, "<memory>")?;
    count_pages_from_catalog(&doc, "<memory>")
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    let bytes = read_file(path)?;
    let item = path.display().to_string();
    let doc = load(&bytes, &item)?;
    count_pages_from_catalog(&doc, &item)
}
