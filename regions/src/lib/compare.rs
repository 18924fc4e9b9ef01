use std::cmp::Ordering;
use crate::node::Span;

/// Where a query span lies relative to a stored region.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Overlap {
    /// The query ends at or before the region's start.
    Below,
    /// The query touches the region (or has identical bounds).
    Overlaps,
    /// The query starts at or after the region's end.
    Above,
}

impl Overlap {
    /// Direction the splay engine should take. `Less` means "go left".
    #[inline]
    pub fn as_ordering(self) -> Ordering {
        match self {
            Overlap::Below      => Ordering::Less,
            Overlap::Overlaps   => Ordering::Equal,
            Overlap::Above      => Ordering::Greater,
        }
    }
}

/// Containment comparator: drives `insert` and `lookup`.
pub type ContainFn = fn(&Span, &Span) -> Overlap;

/// Exact-start comparator: drives `remove` only. Returns where `addr`
/// lies relative to the region's start.
pub type ExactFn = fn(&Span, u64) -> Ordering;

/// Default containment comparator.
///
/// A point query `[a, a)` overlaps `region` iff `region.low <= a < region.high`.
/// A non-empty query overlaps iff the two half-open ranges intersect.
/// Identical bounds always overlap, even for empty regions, so that
/// re-registering a region is recognized as an update.
pub fn compare_interval(region: &Span, query: &Span) -> Overlap {
    if region == query {
        return Overlap::Overlaps;
    }
    if query.low < region.low && query.high <= region.low {
        Overlap::Below
    } else if query.low >= region.high {
        Overlap::Above
    } else {
        Overlap::Overlaps
    }
}

/// Default exact-start comparator.
pub fn compare_start(region: &Span, addr: u64) -> Ordering {
    addr.cmp(&region.low)
}
