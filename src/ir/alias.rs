//! Result-aliasing descriptors for launch operations.
//!
//! Each produced result carries one descriptor identifying which input
//! operand (if any) that result aliases. The descriptor list length must
//! always equal the operation's result count; every rewrite that drops a
//! result or operand re-indexes the survivors through
//! [`reindex_after_removal`].

/// Per-result aliasing record on a kernel- or JIT-launch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultAlias {
    /// Position of the result in the output tuple. `None` is the special
    /// single-result encoding, legal only when the operation has exactly one
    /// result.
    pub output_index: Option<u32>,
    /// Operand index this result aliases, or `None` when it aliases nothing.
    pub operand_index: Option<u32>,
}

impl ResultAlias {
    pub fn aliasing(output_index: Option<u32>, operand_index: u32) -> Self {
        Self { output_index, operand_index: Some(operand_index) }
    }

    pub fn none(output_index: Option<u32>) -> Self {
        Self { output_index, operand_index: None }
    }
}

/// New index of `old_index` after the (sorted, deduplicated) `removed`
/// indices are deleted from the same list.
///
/// `old_index` itself must not be in `removed`; callers that would remove a
/// still-referenced index must abandon their rewrite instead.
pub fn reindex_after_removal(old_index: u32, removed: &[u32]) -> u32 {
    debug_assert!(removed.windows(2).all(|w| w[0] < w[1]), "removed set must be sorted");
    debug_assert!(!removed.contains(&old_index), "re-indexing a removed index");
    let preceding = removed.iter().take_while(|&&r| r < old_index).count() as u32;
    old_index - preceding
}
