//! Top-down splaying.
//!
//! Every search in the tree goes through [`splay`]: it walks down from the
//! root, two levels at a time, rotating as it goes, so that the last node
//! compared against the probe ends up at the root. Rotations only move
//! links around; nodes themselves never move in memory.

use std::cmp::Ordering;
use std::ptr::{addr_of_mut, NonNull};
use crate::node::{Link, Node, Span};

type NodePtr<V> = NonNull<Node<V>>;

/// Lifts `child`, the left child of `parent`, into `slot`.
///
/// ```text
///      p          c
///     / \        / \
///    c   C  →   A   p
///   / \            / \
///  A   B          B   C
/// ```
#[inline]
unsafe fn rotate_right<V>(slot: *mut Link<V>, parent: NodePtr<V>, child: NodePtr<V>) {
    let p = parent.as_ptr();
    let c = child.as_ptr();
    (*p).left = (*c).right;
    (*c).right = Some(parent);
    *slot = Some(child);
}

/// Mirror image of [`rotate_right`]: `child` is the right child of `parent`.
#[inline]
unsafe fn rotate_left<V>(slot: *mut Link<V>, parent: NodePtr<V>, child: NodePtr<V>) {
    let p = parent.as_ptr();
    let c = child.as_ptr();
    (*p).right = (*c).left;
    (*c).left = Some(parent);
    *slot = Some(child);
}

/// Restructures the tree rooted at `*root` around `probe`.
///
/// `probe` tells where the searched-for value lies relative to a node's
/// span: `Less` sends the walk left, `Greater` right, `Equal` stops it.
///
/// # Safety
///
/// Every link reachable from `*root` must point to a live node that is
/// owned by this tree alone.
pub(crate) unsafe fn splay<V, F>(root: &mut Link<V>, mut probe: F)
where
    F: FnMut(&Span) -> Ordering,
{
    let root: *mut Link<V> = root;
    loop {
        let n = match *root {
            Some(n) => n,
            None    => return,
        };
        let np = n.as_ptr();
        let cmp1 = probe(&(*np).span);
        let c = match cmp1 {
            Ordering::Equal     => return,
            Ordering::Less      => (*np).left,
            Ordering::Greater   => (*np).right,
        };
        let c = match c {
            Some(c) => c,
            None    => return,
        };
        let cp = c.as_ptr();
        let cmp2 = probe(&(*cp).span);

        // Single rotation: the child is where the walk ends.
        let stop = match cmp2 {
            Ordering::Equal     => true,
            Ordering::Less      => (*cp).left.is_none(),
            Ordering::Greater   => (*cp).right.is_none(),
        };
        if stop {
            match cmp1 {
                Ordering::Less  => rotate_right(root, n, c),
                _               => rotate_left(root, n, c),
            }
            return;
        }

        // Double rotation, then start over from the new root. The
        // grandchild exists: `stop` was false.
        match (cmp1, cmp2) {
            (Ordering::Less, Ordering::Less) => {
                // zig-zig
                let g = (*cp).left.unwrap_unchecked();
                rotate_right(addr_of_mut!((*np).left), c, g);
                rotate_right(root, n, g);
            },
            (Ordering::Greater, Ordering::Greater) => {
                let g = (*cp).right.unwrap_unchecked();
                rotate_left(addr_of_mut!((*np).right), c, g);
                rotate_left(root, n, g);
            },
            (Ordering::Less, _) => {
                // zig-zag
                let g = (*cp).right.unwrap_unchecked();
                rotate_left(addr_of_mut!((*np).left), c, g);
                rotate_right(root, n, g);
            },
            (Ordering::Greater, _) => {
                let g = (*cp).left.unwrap_unchecked();
                rotate_right(addr_of_mut!((*np).right), c, g);
                rotate_left(root, n, g);
            },
            (Ordering::Equal, _) => unreachable!(),
        }
    }
}
