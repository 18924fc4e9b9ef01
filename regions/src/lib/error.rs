use thiserror::Error;
use crate::node::Span;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Reasons a region could not be registered.
///
/// Missing regions are not errors: `lookup` answers `None` and `remove`
/// answers `false`.
pub enum RegionError {
    /// `low >= high`: the range holds no address.
    #[error("region [{low:#x}, {high:#x}) is empty or inverted")]
    Inverted { low: u64, high: u64 },
    /// The new region intersects a registered one without matching its
    /// bounds. The tree is left as it was.
    #[error("region {requested} overlaps registered region {existing}")]
    Overlap { requested: Span, existing: Span },
    #[error("node allocation of {size} bytes failed")]
    Alloc { size: usize },
}
