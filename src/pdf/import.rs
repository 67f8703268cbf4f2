//! Importing pages from a source PDF
//!
//! Pages are copied as objects, never re-rendered. Before a page leaves its
//! original page tree, the attributes it inherits from ancestor `Pages` nodes
//! are written onto the page itself so the copy renders the same.

use lopdf::{Document, Object, ObjectId};
use crate::error::{Error, Result};
use crate::pdf::{OutputPage, PageSet};

/// Page attributes a page may inherit from its ancestors (PDF 32000 §7.7.3.4)
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic Parent chains in damaged files
const MAX_TREE_DEPTH: usize = 64;

/// Parse a PDF buffer and turn every page into an output page
///
/// Fails with `MalformedDocument` when the buffer is not a usable PDF and
/// with `EncryptedDocument` when it is password protected.
pub fn import_pdf(item_id: &str, bytes: &[u8]) -> Result<PageSet> {
    let mut doc = Document::load_mem(bytes).map_err(|e| Error::MalformedDocument {
        item: item_id.to_string(),
        detail: e.to_string(),
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(Error::EncryptedDocument {
            item: item_id.to_string(),
        });
    }

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(Error::MalformedDocument {
            item: item_id.to_string(),
            detail: "document has no pages".to_string(),
        });
    }

    for &page_id in pages.values() {
        // Some writers omit /Type on leaf pages
        if let Ok(page) = doc.get_dictionary_mut(page_id) {
            if page.get(b"Type").is_err() {
                page.set("Type", Object::Name(b"Page".to_vec()));
            }
        }
        flatten_inherited_attributes(&mut doc, page_id).map_err(|detail| {
            Error::MalformedDocument {
                item: item_id.to_string(),
                detail,
            }
        })?;
    }

    let output_pages = pages
        .keys()
        .map(|&number| OutputPage::Copied { source_page: number })
        .collect();

    log::debug!("Imported {} page(s) from '{}'", pages.len(), item_id);

    Ok(PageSet {
        item_id: item_id.to_string(),
        document: doc,
        pages: output_pages,
    })
}

/// Copy inheritable attributes from the page's ancestors onto the page
fn flatten_inherited_attributes(
    doc: &mut Document,
    page_id: ObjectId,
) -> std::result::Result<(), String> {
    let mut inherited: Vec<(&[u8], Object)> = Vec::new();

    {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| format!("page {:?} is unreadable: {}", page_id, e))?;

        let missing: Vec<&[u8]> = INHERITABLE
            .iter()
            .copied()
            .filter(|key| page.get(key).is_err())
            .collect();

        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut depth = 0;

        while let Some(parent_id) = parent {
            if inherited.len() == missing.len() || depth >= MAX_TREE_DEPTH {
                break;
            }
            let Ok(node) = doc.get_dictionary(parent_id) else {
                break;
            };

            for &key in &missing {
                if inherited.iter().any(|(found, _)| *found == key) {
                    continue;
                }
                if let Ok(value) = node.get(key) {
                    inherited.push((key, value.clone()));
                }
            }

            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
            depth += 1;
        }
    }

    if inherited.is_empty() {
        return Ok(());
    }

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| format!("page {:?} is unreadable: {}", page_id, e))?;
    for (key, value) in inherited {
        page.set(key.to_vec(), value);
    }

    Ok(())
}
