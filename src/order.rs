//! Chronological ordering of classified items

use crate::source::{ClassifiedItem, SourceKind};

/// Sort items by timestamp, oldest first
///
/// `sort_by_key` is a stable merge sort, so items sharing a timestamp keep
/// their input order and re-running a merge always yields the same sequence.
pub fn order(mut items: Vec<ClassifiedItem<'_>>) -> Vec<ClassifiedItem<'_>> {
    items.sort_by_key(|classified| classified.item.timestamp);
    items
}

/// Split an ordered sequence into (candidates, unsupported), keeping order in both
///
/// Images of an unhandled encoding stay with the candidates; synthesis rejects
/// them with a skippable error so they are reported with the right reason.
pub fn partition_unsupported<'a>(
    items: Vec<ClassifiedItem<'a>>,
) -> (Vec<ClassifiedItem<'a>>, Vec<ClassifiedItem<'a>>) {
    items
        .into_iter()
        .partition(|classified| classified.kind != SourceKind::Unsupported)
}
