//! Welcome to `regions`!
//!
//! A splay tree of non-overlapping, half-open address ranges. It answers
//! "which registered region, if any, holds address `a`?" in amortized
//! O(log n), and it is cheap on the access patterns memory tracing
//! produces: consecutive accesses tend to hit the same region, which the
//! previous lookup has already splayed to the root.
//!
//! ```
//! use regions::RegionTree;
//!
//! let mut tree = RegionTree::new();
//! tree.insert(100, 200, "heap block").unwrap();
//! tree.insert(300, 400, "mmap").unwrap();
//!
//! let hit = tree.lookup(150).unwrap();
//! assert_eq!((hit.start(), hit.offset_of(150)), (100, 50));
//! assert!(tree.lookup(250).is_none());
//!
//! // Regions are released by their start address only.
//! assert!(!tree.remove(150));
//! assert!(tree.remove(100));
//! ```

mod node;
mod splay;
mod walk;
pub mod alloc;
pub mod compare;
pub mod error;

use std::alloc::Layout;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use log::{debug, trace};

pub use crate::alloc::{Global, Libc, NodeAlloc, Pool};
pub use crate::compare::{compare_interval, compare_start, ContainFn, ExactFn, Overlap};
pub use crate::error::RegionError;
pub use crate::node::{Node, Span};
pub use crate::walk::{Iter, KeyHook, ValueHook};

use crate::node::Link;
use crate::walk::Hooks;

/// A [`Pool`] sized for the nodes of a `RegionTree<V, _>`.
pub type NodePool<V> = Pool<Node<V>>;

/// The interval splay tree.
///
/// Every operation that searches the tree restructures it, `lookup`
/// included. The tree itself performs no locking: hosts calling it from
/// several threads must serialize access (e.g. wrap it in a `Mutex`).
pub struct RegionTree<V, A: NodeAlloc = Global> {
    root:       Link<V>,
    len:        usize,
    contain:    ContainFn,
    exact:      ExactFn,
    hooks:      Hooks<V>,
    alloc:      A,
    _owns:      PhantomData<Box<Node<V>>>,
}

// All nodes are exclusively owned through `root`; hooks are `Send` by type.
unsafe impl<V: Send, A: NodeAlloc + Send> Send for RegionTree<V, A> {}

impl<V> RegionTree<V, Global> {
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// An empty tree ordered by custom comparators instead of
    /// [`compare_interval`] and [`compare_start`].
    pub fn ordered_by(contain: ContainFn, exact: ExactFn) -> Self {
        Self::ordered_by_in(Global, contain, exact)
    }
}

impl<V> Default for RegionTree<V, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RegionTree<V, NodePool<V>> {
    /// A tree whose nodes come from a pool of `capacity` slots, reserved
    /// right now. Inserting past capacity fails with [`RegionError::Alloc`].
    pub fn pooled(capacity: usize) -> Self {
        Self::new_in(Pool::new(capacity))
    }
}

impl<V, A: NodeAlloc> RegionTree<V, A> {
    pub fn new_in(alloc: A) -> Self {
        Self::ordered_by_in(alloc, compare_interval, compare_start)
    }

    /// Comparators are fixed for the life of the tree: every node is
    /// placed by them.
    pub fn ordered_by_in(alloc: A, contain: ContainFn, exact: ExactFn) -> Self {
        Self {
            root:       None,
            len:        0,
            contain,
            exact,
            hooks:      Hooks::none(),
            alloc,
            _owns:      PhantomData,
        }
    }

    /// Hook invoked with the span of every node that is removed or torn
    /// down.
    pub fn on_drop_key<F>(mut self, f: F) -> Self
    where F: FnMut(Span) + Send + 'static {
        self.hooks.key = Some(Box::new(f));
        self
    }

    /// Hook invoked with every payload the tree lets go of: on removal, on
    /// teardown, and with the old payload when a re-insert replaces it.
    /// Without one, payloads are simply dropped.
    pub fn on_drop_value<F>(mut self, f: F) -> Self
    where F: FnMut(V) + Send + 'static {
        self.hooks.value = Some(Box::new(f));
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// The current root, i.e. the node the last search ended on.
    pub fn root(&self) -> Option<&Node<V>> {
        self.root.map(|r| unsafe { &*r.as_ptr() })
    }

    /// Registers `[low, high)` with `value`.
    ///
    /// Registering bounds identical to an existing region replaces that
    /// region's payload in place and returns the existing node. A region
    /// that merely intersects a registered one is refused.
    pub fn insert(&mut self, low: u64, high: u64, value: V) -> Result<&mut Node<V>, RegionError> {
        if low >= high {
            // An empty range holds no address.
            return Err(RegionError::Inverted { low, high });
        }
        let span = Span::new(low, high);
        let contain = self.contain;
        unsafe {
            splay::splay(&mut self.root, |s| contain(s, &span).as_ordering());
        }

        let side = match self.root {
            None        => None,
            Some(root)  => {
                let r = root.as_ptr();
                let existing = unsafe { (*r).span };
                match contain(&existing, &span) {
                    Overlap::Overlaps if existing == span => {
                        let old = mem::replace(unsafe { &mut (*r).value }, value);
                        self.hooks.discard_value(old);
                        trace!("region {} updated in place", span);
                        return Ok(unsafe { &mut *r });
                    },
                    Overlap::Overlaps => {
                        debug!("region {} refused, overlaps {}", span, existing);
                        return Err(RegionError::Overlap { requested: span, existing });
                    },
                    other => Some((root, other)),
                }
            }
        };

        let layout = Layout::new::<Node<V>>();
        let node = self.alloc
            .allocate(layout)
            .ok_or(RegionError::Alloc { size: layout.size() })?
            .cast::<Node<V>>();
        unsafe {
            let n = node.as_ptr();
            n.write(Node::leaf(span, value));
            // Splice the new node above the old root. The splay left the old
            // root adjacent to `span`, so one of its subtrees moves over.
            match side {
                None    => {},
                Some((root, Overlap::Above)) => {
                    let r = root.as_ptr();
                    (*n).left = Some(root);
                    (*n).right = (*r).right;
                    (*r).right = None;
                },
                Some((root, _)) => {
                    let r = root.as_ptr();
                    (*n).right = Some(root);
                    (*n).left = (*r).left;
                    (*r).left = None;
                }
            }
        }
        self.root = Some(node);
        self.len += 1;
        trace!("region {} registered ({} live)", span, self.len);

        Ok(unsafe { &mut *node.as_ptr() })
    }

    /// Finds the region holding `addr`, if any, and leaves it at the root.
    pub fn lookup(&mut self, addr: u64) -> Option<&Node<V>> {
        self.find(addr).map(|n| unsafe { &*n.as_ptr() })
    }

    /// Like [`lookup`](Self::lookup), with write access to the payload.
    pub fn lookup_mut(&mut self, addr: u64) -> Option<&mut Node<V>> {
        self.find(addr).map(|n| unsafe { &mut *n.as_ptr() })
    }

    fn find(&mut self, addr: u64) -> Option<NonNull<Node<V>>> {
        let probe = Span::point(addr);
        let contain = self.contain;
        unsafe {
            splay::splay(&mut self.root, |s| contain(s, &probe).as_ordering());
        }
        let root = self.root?;
        match contain(unsafe { &(*root.as_ptr()).span }, &probe) {
            Overlap::Overlaps   => Some(root),
            _                   => None,
        }
    }

    /// Unregisters the region starting exactly at `addr`. Addresses inside
    /// a region but not at its start match nothing. Returns whether a
    /// region was removed.
    pub fn remove(&mut self, addr: u64) -> bool {
        let Some(node) = self.detach(addr) else {
            return false;
        };
        unsafe {
            let n = node.as_ptr();
            self.hooks.discard_key((*n).span);
            self.hooks.discard_value(std::ptr::read(&(*n).value));
            self.alloc.release(node.cast(), Layout::new::<Node<V>>());
        }

        true
    }

    /// Unregisters the region starting exactly at `addr` and hands its span
    /// and payload back. Hooks are not invoked: the caller owns the payload.
    pub fn take(&mut self, addr: u64) -> Option<(Span, V)> {
        let node = self.detach(addr)?;
        unsafe {
            let Node { span, value, .. } = node.as_ptr().read();
            self.alloc.release(node.cast(), Layout::new::<Node<V>>());
            Some((span, value))
        }
    }

    fn detach(&mut self, addr: u64) -> Option<NonNull<Node<V>>> {
        let exact = self.exact;
        unsafe {
            splay::splay(&mut self.root, |s| exact(s, addr));
            let root = self.root?;
            let r = root.as_ptr();
            if exact(&(*r).span, addr) != Ordering::Equal {
                return None;
            }
            let (left, right) = ((*r).left, (*r).right);
            self.root = match left {
                Some(l) => {
                    if right.is_some() {
                        // Everything in `right` follows the maximum of `left`.
                        let mut max = l;
                        while let Some(next) = (*max.as_ptr()).right {
                            max = next;
                        }
                        (*max.as_ptr()).right = right;
                    }
                    Some(l)
                },
                None    => right,
            };
            self.len -= 1;
            trace!("region {} unregistered ({} live)", (*r).span, self.len);

            Some(root)
        }
    }

    /// Visits regions in ascending order until `visit` returns non-zero,
    /// and returns that value (0 if every region was visited). Does not
    /// restructure the tree.
    pub fn foreach<F>(&self, mut visit: F) -> u64
    where F: FnMut(&Node<V>) -> u64 {
        for node in self.iter() {
            let signal = visit(node);
            if signal != 0 {
                return signal;
            }
        }

        0
    }

    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(self.root)
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        walk::height(self.root)
    }

    /// Verifies that in-order position and span order agree everywhere
    /// and that no two regions intersect.
    pub fn is_ordered(&self) -> bool {
        walk::is_ordered(self.root)
    }

    /// Frees every node, firing the hooks once per node. The tree stays
    /// usable.
    pub fn clear(&mut self) {
        let root = self.root.take();
        let freed = unsafe { walk::teardown(root, &mut self.hooks, &self.alloc) };
        debug_assert_eq!(freed, self.len);
        if freed > 0 {
            debug!("tore down {} regions", freed);
        }
        self.len = 0;
    }

    /// Tears the tree down. Same as dropping it.
    pub fn destroy(self) {
        drop(self)
    }
}

impl<V, A: NodeAlloc> Drop for RegionTree<V, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'a, V, A: NodeAlloc> IntoIterator for &'a RegionTree<V, A> {
    type Item = &'a Node<V>;
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
