//! Merging source items into one chronological PDF
//!
//! A merge runs `Idle → Ordering → Synthesizing → Assembling → Done`, or ends
//! in `Failed` on the first fatal error. Nothing is returned on failure: the
//! caller gets either the complete document or one error.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::layout::PageGeometry;
use crate::order::{order, partition_unsupported};
use crate::pdf::{prepare_image, synthesize, Assembler, PageSet, PreparedImage};
use crate::source::{ClassifiedItem, SourceItem, SourceKind};

/// What to do with a PDF or image that is supported but broken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the whole merge (all-or-nothing)
    #[default]
    Abort,
    /// Leave the item out and report it as skipped
    Skip,
}

/// Options for merging
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Page size and margin for image pages
    pub geometry: PageGeometry,
    /// Allow small images to be enlarged to fill the page
    pub allow_upscale: bool,
    /// Decode images on the rayon thread pool
    pub parallel: bool,
    /// Handling of malformed PDFs and undecodable images
    pub on_malformed: FailurePolicy,
    /// Written to the Producer entry of the output
    pub producer: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            geometry: PageGeometry::letter(),
            allow_upscale: false,
            parallel: false,
            on_malformed: FailurePolicy::Abort,
            producer: format!("timeline-merge {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Lifecycle of a single merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Idle,
    Ordering,
    Synthesizing,
    Assembling,
    Done,
    Failed,
}

/// Lets a caller abort a merge from another thread
///
/// Checked before each item is synthesized and before assembly. A cancelled
/// merge discards everything it built.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// An item left out of the output
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedItem {
    pub id: String,
    pub timestamp: i64,
    /// Human-readable reason
    pub reason: String,
}

/// An item that contributed pages
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub id: String,
    pub kind: SourceKind,
    pub timestamp: i64,
    pub pages: usize,
}

/// Result of a successful merge
#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// The serialized PDF
    pub bytes: Vec<u8>,
    pub page_count: usize,
    /// Contributing items in output order
    pub items: Vec<ItemSummary>,
    /// Items left out, in chronological order
    pub skipped: Vec<SkippedItem>,
}

/// Merge source items into one PDF ordered by timestamp
///
/// # Example
///
/// ```no_run
/// use timeline_merge::{merge, MergeOptions, SourceItem};
///
/// let items = vec![
///     SourceItem::new("scan.pdf", std::fs::read("scan.pdf").unwrap(), "application/pdf", 1_700_000_000_000),
///     SourceItem::new("photo.jpg", std::fs::read("photo.jpg").unwrap(), "image/jpeg", 1_600_000_000_000),
/// ];
///
/// let output = merge(&items, &MergeOptions::default()).expect("Failed to merge");
/// std::fs::write("merged.pdf", &output.bytes).unwrap();
/// ```
pub fn merge(items: &[SourceItem], options: &MergeOptions) -> Result<MergeOutput> {
    merge_with_cancel(items, options, &CancelFlag::new())
}

/// [`merge`] with a flag the caller can raise to abort
pub fn merge_with_cancel(
    items: &[SourceItem],
    options: &MergeOptions,
    cancel: &CancelFlag,
) -> Result<MergeOutput> {
    merge_with_progress(items, options, cancel, |_| {})
}

/// [`merge_with_cancel`] that reports each item once its pages are appended
///
/// `progress` runs on the calling thread, in output order, so it may raise
/// `cancel` to stop the merge before the next item.
pub fn merge_with_progress<F>(
    items: &[SourceItem],
    options: &MergeOptions,
    cancel: &CancelFlag,
    mut progress: F,
) -> Result<MergeOutput>
where
    F: FnMut(&ItemSummary),
{
    let mut run = MergeRun::new(options, cancel);
    let result = run.execute(items, &mut progress);
    match &result {
        Ok(output) => {
            run.transition(MergeState::Done);
            log::info!(
                "Merged {} item(s) into {} page(s), skipped {}",
                output.items.len(),
                output.page_count,
                output.skipped.len()
            );
        }
        Err(e) => {
            run.transition(MergeState::Failed);
            log::error!("Merge failed: {}", e);
        }
    }
    result
}

/// State of one in-flight merge
struct MergeRun<'o> {
    options: &'o MergeOptions,
    cancel: &'o CancelFlag,
    state: MergeState,
    items: Vec<ItemSummary>,
    skipped: Vec<(usize, SkippedItem)>,
}

impl<'o> MergeRun<'o> {
    fn new(options: &'o MergeOptions, cancel: &'o CancelFlag) -> Self {
        Self {
            options,
            cancel,
            state: MergeState::Idle,
            items: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn transition(&mut self, next: MergeState) {
        log::debug!("Merge state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn execute(
        &mut self,
        items: &[SourceItem],
        progress: &mut dyn FnMut(&ItemSummary),
    ) -> Result<MergeOutput> {
        self.options.geometry.validate()?;

        self.transition(MergeState::Ordering);
        let classified = items
            .iter()
            .enumerate()
            .map(|(position, item)| ClassifiedItem::new(item, position))
            .collect();
        let (candidates, unsupported) = partition_unsupported(order(classified));

        for classified in &unsupported {
            self.skip(
                classified,
                &Error::UnsupportedSource {
                    item: classified.item.id.clone(),
                    media_type: classified.item.media_type.clone(),
                },
            );
        }

        if candidates.is_empty() {
            return Err(Error::EmptyInput);
        }

        self.transition(MergeState::Synthesizing);
        let mut assembler = Assembler::new();

        if self.options.parallel {
            // Only decoding runs in parallel; pages are appended in sorted order
            let prepared: Vec<Result<Option<PreparedImage>>> = candidates
                .par_iter()
                .map(|classified| self.prepare(classified))
                .collect();

            for (classified, prepared) in candidates.iter().zip(prepared) {
                self.cancel.check()?;
                let result = prepared.and_then(|prepared| match prepared {
                    Some(image) => Ok(image.into_page_set(&classified.item.id)),
                    None => self.synthesize(classified),
                });
                if self.accept(classified, result, &mut assembler)? {
                    self.report(progress);
                }
            }
        } else {
            for classified in &candidates {
                self.cancel.check()?;
                let result = self.synthesize(classified);
                if self.accept(classified, result, &mut assembler)? {
                    self.report(progress);
                }
            }
        }

        if assembler.page_count() == 0 {
            return Err(Error::EmptyInput);
        }

        self.cancel.check()?;
        self.transition(MergeState::Assembling);
        let page_count = assembler.page_count();
        let bytes = assembler.finish(&self.options.producer)?;

        let mut skipped = std::mem::take(&mut self.skipped);
        skipped.sort_by_key(|(position, item)| (item.timestamp, *position));

        Ok(MergeOutput {
            bytes,
            page_count,
            items: std::mem::take(&mut self.items),
            skipped: skipped.into_iter().map(|(_, item)| item).collect(),
        })
    }

    fn synthesize(&self, classified: &ClassifiedItem<'_>) -> Result<PageSet> {
        log::debug!(
            "Synthesizing '{}' ({}, t={})",
            classified.item.id,
            classified.kind,
            classified.item.timestamp
        );
        synthesize(classified, &self.options.geometry, self.options.allow_upscale)
    }

    /// Decode an image ahead of assembly; other kinds are left for later
    fn prepare(&self, classified: &ClassifiedItem<'_>) -> Result<Option<PreparedImage>> {
        self.cancel.check()?;
        match &classified.kind {
            SourceKind::Image(encoding) => prepare_image(
                &classified.item.id,
                encoding,
                &classified.item.bytes,
                &self.options.geometry,
                self.options.allow_upscale,
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    /// Append a synthesized item, or decide whether its failure is fatal
    ///
    /// Returns whether the item contributed pages.
    fn accept(
        &mut self,
        classified: &ClassifiedItem<'_>,
        result: Result<PageSet>,
        assembler: &mut Assembler,
    ) -> Result<bool> {
        match result {
            Ok(set) => {
                self.items.push(ItemSummary {
                    id: classified.item.id.clone(),
                    kind: classified.kind.clone(),
                    timestamp: classified.item.timestamp,
                    pages: set.page_count(),
                });
                assembler.append(set);
                Ok(true)
            }
            Err(e) if e.is_skippable() => {
                self.skip(classified, &e);
                Ok(false)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) if self.options.on_malformed == FailurePolicy::Skip => {
                self.skip(classified, &e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn report(&self, progress: &mut dyn FnMut(&ItemSummary)) {
        if let Some(summary) = self.items.last() {
            progress(summary);
        }
    }

    fn skip(&mut self, classified: &ClassifiedItem<'_>, reason: &Error) {
        log::warn!("Skipping '{}': {}", classified.item.id, reason);
        self.skipped.push((
            classified.position,
            SkippedItem {
                id: classified.item.id.clone(),
                timestamp: classified.item.timestamp,
                reason: reason.to_string(),
            },
        ));
    }
}
