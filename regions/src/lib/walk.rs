//! Ordered walks and teardown.
//!
//! A splay tree has no height bound: a run of ascending inserts leaves a
//! chain as deep as the tree is large. Nothing here recurses; every walk
//! keeps its own stack or worklist on the heap.

use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use crate::alloc::NodeAlloc;
use crate::node::{Link, Node, Span};

/// Called with the span of every node leaving the tree.
pub type KeyHook = Box<dyn FnMut(Span) + Send>;
/// Called with the payload of every node leaving the tree, and with the
/// old payload when a re-insert replaces it.
pub type ValueHook<V> = Box<dyn FnMut(V) + Send>;

pub(crate) struct Hooks<V> {
    pub(crate) key:     Option<KeyHook>,
    pub(crate) value:   Option<ValueHook<V>>,
}

impl<V> Hooks<V> {
    pub(crate) fn none() -> Self {
        Self { key: None, value: None }
    }

    #[inline]
    pub(crate) fn discard_key(&mut self, span: Span) {
        if let Some(f) = self.key.as_mut() {
            f(span);
        }
    }

    #[inline]
    pub(crate) fn discard_value(&mut self, value: V) {
        match self.value.as_mut() {
            Some(f) => f(value),
            None    => drop(value),
        }
    }
}

/// In-order iterator over the nodes of a [`RegionTree`](crate::RegionTree),
/// ascending by start address.
pub struct Iter<'a, V> {
    // Nodes whose left subtree has been pushed but not yet yielded.
    stack:  Vec<NonNull<Node<V>>>,
    _tree:  PhantomData<&'a Node<V>>,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(root: Link<V>) -> Self {
        let mut it = Self { stack: Vec::new(), _tree: PhantomData };
        it.push_left(root);
        it
    }

    fn push_left(&mut self, mut link: Link<V>) {
        while let Some(n) = link {
            self.stack.push(n);
            link = unsafe { (*n.as_ptr()).left };
        }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a Node<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        // The tree is borrowed for 'a, so no node can move or die meanwhile.
        let node: &'a Node<V> = unsafe { &*n.as_ptr() };
        self.push_left(node.right);
        Some(node)
    }
}

/// Number of nodes on the longest root-to-leaf path.
pub(crate) fn height<V>(root: Link<V>) -> usize {
    let mut deepest = 0;
    let mut stack: Vec<(NonNull<Node<V>>, usize)> = root.map(|r| (r, 1)).into_iter().collect();
    while let Some((n, depth)) = stack.pop() {
        deepest = deepest.max(depth);
        let node = unsafe { &*n.as_ptr() };
        for child in [node.left, node.right].into_iter().flatten() {
            stack.push((child, depth + 1));
        }
    }

    deepest
}

/// Checks that every node sits strictly between the bounds inherited from
/// its ancestors and that no two regions intersect.
pub(crate) fn is_ordered<V>(root: Link<V>) -> bool {
    // (node, exclusive lower fence, exclusive upper fence)
    let mut stack: Vec<(NonNull<Node<V>>, Option<Span>, Option<Span>)> = vec![];
    if let Some(r) = root {
        stack.push((r, None, None));
    }
    while let Some((n, below, above)) = stack.pop() {
        let node = unsafe { &*n.as_ptr() };
        let s = node.span;
        if let Some(b) = below {
            if s.low < b.high { return false; }
        }
        if let Some(a) = above {
            if s.high > a.low { return false; }
        }
        if let Some(l) = node.left {
            stack.push((l, below, Some(s)));
        }
        if let Some(r) = node.right {
            stack.push((r, Some(s), above));
        }
    }

    true
}

/// Moves the payload out of a freshly discovered node and queues it. The
/// node keeps its stale payload bytes until released; they are never read
/// or dropped again.
unsafe fn discover<V>(n: NonNull<Node<V>>, hooks: &mut Hooks<V>, pending: &mut Vec<NonNull<Node<V>>>) {
    let p = n.as_ptr();
    hooks.discard_key((*p).span);
    hooks.discard_value(std::ptr::read(&(*p).value));
    pending.push(n);
}

/// Frees every node reachable from `root`, level by level.
///
/// Two worklists alternate: nodes discovered on one level are `pending`
/// until the next sweep makes them `active`. A node's hooks fire when it is
/// discovered; its storage goes back to `alloc` once both of its children
/// have been queued.
///
/// # Safety
///
/// `root` must exclusively own its subtree, every node of which was
/// allocated by `alloc`. Nothing may touch the subtree afterwards.
pub(crate) unsafe fn teardown<V, A: NodeAlloc>(root: Link<V>, hooks: &mut Hooks<V>, alloc: &A) -> usize {
    let layout = Layout::new::<Node<V>>();
    let mut freed = 0;
    let mut pending: Vec<NonNull<Node<V>>> = vec![];
    let mut active: Vec<NonNull<Node<V>>> = vec![];

    if let Some(r) = root {
        discover(r, hooks, &mut pending);
    }
    while !pending.is_empty() {
        mem::swap(&mut active, &mut pending);
        for n in active.drain(..) {
            let (left, right) = ((*n.as_ptr()).left, (*n.as_ptr()).right);
            if let Some(l) = left {
                discover(l, hooks, &mut pending);
            }
            if let Some(r) = right {
                discover(r, hooks, &mut pending);
            }
            alloc.release(n.cast(), layout);
            freed += 1;
        }
    }

    freed
}
