//! Assembling synthesized pages into one document using lopdf

use std::collections::BTreeMap;

use chrono::Utc;
use lopdf::{Dictionary, Document, Object, ObjectId};
use crate::error::{Error, Result};
use crate::pdf::PageSet;
use crate::timestamp::pdf_date;

/// Lowest PDF version we write
const BASE_VERSION: &str = "1.5";

/// Accumulates pages for exactly one merge
///
/// Based on the lopdf merge example:
/// https://github.com/J-F-Liu/lopdf/blob/main/examples/merge.rs
///
/// Each appended fragment is renumbered above everything collected so far,
/// so object ids never collide. Pages keep the order they were appended in.
#[derive(Debug)]
pub struct Assembler {
    objects: BTreeMap<ObjectId, Object>,
    page_ids: Vec<ObjectId>,
    /// Next free object number
    next_id: u32,
    version: String,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            page_ids: Vec::new(),
            next_id: 1,
            version: BASE_VERSION.to_string(),
        }
    }

    /// Number of pages collected so far
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append every page of `set`, in its page-tree order
    ///
    /// Returns the number of pages added.
    pub fn append(&mut self, set: PageSet) -> usize {
        let PageSet {
            item_id,
            mut document,
            ..
        } = set;

        // Renumber objects in this fragment to avoid conflicts
        document.renumber_objects_with(self.next_id);
        self.next_id = document.max_id + 1;

        if parse_version(&document.version) > parse_version(&self.version) {
            self.version = document.version.clone();
        }

        let pages = document.get_pages();
        let added = pages.len();
        self.page_ids.extend(pages.into_values());
        self.objects.extend(document.objects);

        log::debug!(
            "Appended {} page(s) from '{}' ({} total)",
            added,
            item_id,
            self.page_ids.len()
        );

        added
    }

    /// Build the page tree and catalog, then serialize the document
    ///
    /// `producer` is written to the document information dictionary.
    pub fn finish(self, producer: &str) -> Result<Vec<u8>> {
        if self.page_ids.is_empty() {
            return Err(Error::EmptyInput);
        }

        let mut merged = Document::with_version(self.version.as_str());

        // Add all collected objects FIRST
        merged.objects.extend(self.objects);

        // new_object_id() must hand out ids above everything we just added
        merged.max_id = self.next_id - 1;

        let pages_id = merged.new_object_id();

        let kids: Vec<Object> = self
            .page_ids
            .iter()
            .map(|&id| Object::Reference(id))
            .collect();

        let mut pages_object = Dictionary::new();
        pages_object.set("Type", Object::Name(b"Pages".to_vec()));
        pages_object.set("Count", Object::Integer(self.page_ids.len() as i64));
        pages_object.set("Kids", Object::Array(kids));
        merged.objects.insert(pages_id, Object::Dictionary(pages_object));

        let catalog_id = merged.add_object(Dictionary::from_iter([
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        merged.trailer.set("Root", Object::Reference(catalog_id));

        // Every page must resolve to a page dictionary before it can be re-parented
        for &page_id in &self.page_ids {
            match merged.get_object_mut(page_id) {
                Ok(Object::Dictionary(dict)) if is_page(&*dict) => {
                    dict.set("Parent", Object::Reference(pages_id))
                }
                Ok(_) => {
                    return Err(Error::SerializationError(format!(
                        "page {} {} R is not a /Type /Page dictionary",
                        page_id.0, page_id.1
                    )))
                }
                Err(_) => {
                    return Err(Error::SerializationError(format!(
                        "dangling page reference {} {} R",
                        page_id.0, page_id.1
                    )))
                }
            }
        }

        let info_id = merged.add_object(Dictionary::from_iter([
            ("Producer", Object::string_literal(producer)),
            ("CreationDate", Object::string_literal(pdf_date(&Utc::now()))),
        ]));
        merged.trailer.set("Info", Object::Reference(info_id));

        // Old catalogs and page trees of the fragments are unreachable now
        let pruned = merged.prune_objects();
        log::debug!("Pruned {} unreachable object(s)", pruned.len());

        merged.compress();

        let mut output = Vec::new();
        merged
            .save_to(&mut output)
            .map_err(|e| Error::SerializationError(e.to_string()))?;

        Ok(output)
    }
}

fn is_page(dict: &Dictionary) -> bool {
    dict.get(b"Type")
        .and_then(Object::as_name)
        .map(|name| name == b"Page")
        .unwrap_or(false)
}

/// `(major, minor)` of a version string like `1.7`; unreadable parts count as 0
fn parse_version(version: &str) -> (u32, u32) {
    let mut parts = version.trim().splitn(2, '.');
    let mut next = || {
        parts
            .next()
            .and_then(|part| part.trim().parse::<u32>().ok())
            .unwrap_or(0)
    };
    let major = next();
    let minor = next();
    (major, minor)
}
