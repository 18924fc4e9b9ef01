use std::fmt;
use std::ptr::NonNull;

/// A half-open address range `[low, high)`.
///
/// An empty span (`low == high`) is how point queries are expressed:
/// `[a, a)` stands for the single address `a`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Span {
    pub low:    u64,
    pub high:   u64,
}

impl Span {
    #[inline]
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    /// The degenerate span used to probe a single address.
    #[inline]
    pub fn point(addr: u64) -> Self {
        Self { low: addr, high: addr }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.high - self.low
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.low == self.high
    }

    /// Returns `true` if `addr` lies in `[low, high)`.
    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        self.low <= addr && addr < self.high
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.low, self.high)
    }
}

pub(crate) type Link<V> = Option<NonNull<Node<V>>>;

/// One registered region. Nodes are only ever handed out by reference;
/// the owning [`RegionTree`](crate::RegionTree) decides where they live.
pub struct Node<V> {
    pub(crate) span:    Span,
    pub(crate) value:   V,
    pub(crate) left:    Link<V>,
    pub(crate) right:   Link<V>,
}

// The child links are uniquely owned, so moving a node across threads
// moves the whole subtree with it.
unsafe impl<V: Send> Send for Node<V> {}

impl<V> Node<V> {
    #[inline]
    pub(crate) fn leaf(span: Span, value: V) -> Self {
        Self { span, value, left: None, right: None }
    }

    #[inline]
    pub fn span(&self) -> Span {
        self.span
    }

    /// Start address of the region.
    #[inline]
    pub fn start(&self) -> u64 {
        self.span.low
    }

    /// One past the last address of the region.
    #[inline]
    pub fn end(&self) -> u64 {
        self.span.high
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Distance of `addr` from the region's start. Callers are expected
    /// to have obtained the node through a lookup of that same address.
    #[inline]
    pub fn offset_of(&self, addr: u64) -> u64 {
        addr - self.span.low
    }
}

impl<V: fmt::Debug> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("span", &self.span)
            .field("value", &self.value)
            .finish()
    }
}
