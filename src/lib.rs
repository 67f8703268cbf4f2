//! Timeline Merge Library
//!
//! Merges PDF files and JPEG/PNG images into a single PDF whose pages follow
//! the chronological order of each source's timestamp.
//! This library provides functionality to:
//! - Classify inputs as PDF, image or unsupported
//! - Order them by timestamp (stable for equal timestamps)
//! - Copy PDF pages verbatim and place images on new, centered pages
//! - Assemble and serialize the composite document, all-or-nothing
//!
//! The engine performs no I/O: callers hand in bytes and get bytes back.
//!
//! # Example
//!
//! ```no_run
//! use timeline_merge::{merge, MergeOptions, SourceItem};
//!
//! let items = vec![
//!     SourceItem::new("receipt.png", std::fs::read("receipt.png").unwrap(), "image/png", 1_700_000_300_000),
//!     SourceItem::new("contract.pdf", std::fs::read("contract.pdf").unwrap(), "application/pdf", 1_700_000_000_000),
//! ];
//!
//! let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");
//! println!("{} pages, {} skipped", output.page_count, output.skipped.len());
//! ```

pub mod error;
pub mod layout;
pub mod merge;
pub mod order;
pub mod pdf;
pub mod source;
pub mod timestamp;

// Re-export commonly used items
pub use error::{Error, Result};
pub use layout::{Length, PageGeometry, Placement};
pub use merge::{
    merge, merge_with_cancel, merge_with_progress, CancelFlag, FailurePolicy, ItemSummary,
    MergeOptions, MergeOutput, MergeState, SkippedItem,
};
pub use source::{classify, ClassifiedItem, ImageEncoding, SourceItem, SourceKind};
