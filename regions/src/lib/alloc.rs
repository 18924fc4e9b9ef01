//! Where nodes get their memory from.
//!
//! The tree never calls the global allocator for its nodes directly; it goes
//! through a [`NodeAlloc`]. This lets the tree live inside allocator hooks,
//! where re-entering `malloc` through Rust's global allocator would recurse
//! into the very hook being served.

use std::alloc::{self, Layout};
use std::cell::{Cell, UnsafeCell};
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

/// A provider of raw node storage.
///
/// # Safety
///
/// `allocate` must return either `None` or a pointer to at least
/// `layout.size()` bytes aligned to `layout.align()` that stays valid
/// until handed back through `release` with the same layout.
pub unsafe trait NodeAlloc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this same provider, called
    /// with `layout`, and must not be released twice.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Rust's global allocator. The default provider.
#[derive(Clone, Copy, Default, Debug)]
pub struct Global;

unsafe impl NodeAlloc for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // Node layouts are never zero-sized (two links at least).
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    #[inline]
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::dealloc(ptr.as_ptr(), layout)
    }
}

/// `malloc`/`free` straight from the C library.
///
/// Useful when the global allocator has been swapped for something that
/// observes the very process being tracked.
#[derive(Clone, Copy, Default, Debug)]
pub struct Libc;

unsafe impl NodeAlloc for Libc {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        // `malloc` aligns to twice the word size. Anything stricter goes
        // through `posix_memalign`.
        let ptr = if layout.align() <= MALLOC_ALIGN {
            unsafe { libc::malloc(layout.size()) }
        } else {
            let mut out: *mut libc::c_void = std::ptr::null_mut();
            let ret = unsafe { libc::posix_memalign(&mut out, layout.align(), layout.size()) };
            if ret != 0 { std::ptr::null_mut() } else { out }
        };
        NonNull::new(ptr as *mut u8)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, _layout: Layout) {
        libc::free(ptr.as_ptr() as *mut libc::c_void)
    }
}

const MALLOC_ALIGN: usize = 2 * mem::size_of::<usize>();

const NIL: usize = usize::MAX;

/// A fixed number of `T`-sized slots, reserved once at construction.
///
/// After [`Pool::new`] returns, no further memory is requested from anyone:
/// allocation pops a free slot, release pushes it back. When the pool runs
/// dry `allocate` returns `None` and the tree reports an allocation error.
///
/// Build one for a tree of `V` payloads with [`NodePool`](crate::NodePool).
pub struct Pool<T> {
    slots:  Box<[UnsafeCell<MaybeUninit<T>>]>,
    // Intrusive free list: `next[i]` is the slot freed before `i`.
    next:   Box<[Cell<usize>]>,
    head:   Cell<usize>,
    used:   Cell<usize>,
}

impl<T> Pool<T> {
    /// # Panics
    ///
    /// If `T` is zero-sized: slots are told apart by their address.
    pub fn new(capacity: usize) -> Self {
        assert!(mem::size_of::<T>() > 0, "pool of zero-sized slots");
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        // Slot i links to i + 1; the last one ends the list.
        let next = (0..capacity)
            .map(|i| Cell::new(if i + 1 < capacity { i + 1 } else { NIL }))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            next,
            head: Cell::new(if capacity > 0 { 0 } else { NIL }),
            used: Cell::new(0),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently handed out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.used.get()
    }

    fn index_of(&self, ptr: NonNull<u8>) -> usize {
        let base = self.slots.as_ptr() as usize;
        (ptr.as_ptr() as usize - base) / mem::size_of::<UnsafeCell<MaybeUninit<T>>>()
    }
}

unsafe impl<T> NodeAlloc for Pool<T> {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() > mem::size_of::<T>() || layout.align() > mem::align_of::<T>() {
            return None;
        }
        let idx = self.head.get();
        if idx == NIL {
            return None;
        }
        self.head.set(self.next[idx].get());
        self.used.set(self.used.get() + 1);
        NonNull::new(self.slots[idx].get() as *mut u8)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, _layout: Layout) {
        let idx = self.index_of(ptr);
        debug_assert!(idx < self.slots.len(), "pointer does not belong to this pool");
        self.next[idx].set(self.head.get());
        self.head.set(idx);
        self.used.set(self.used.get() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_recycles_slots() {
        let pool = Pool::<[u64; 4]>::new(2);
        let layout = Layout::new::<[u64; 4]>();
        let a = pool.allocate(layout).unwrap();
        let b = pool.allocate(layout).unwrap();
        assert_ne!(a, b);
        assert!(pool.allocate(layout).is_none());
        assert_eq!(pool.in_use(), 2);

        unsafe { pool.release(a, layout) };
        assert_eq!(pool.in_use(), 1);
        let c = pool.allocate(layout).unwrap();
        assert_eq!(a, c);
        unsafe {
            pool.release(b, layout);
            pool.release(c, layout);
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn pool_rejects_oversized_layouts() {
        let pool = Pool::<u32>::new(4);
        assert!(pool.allocate(Layout::new::<u64>()).is_none());
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    #[should_panic(expected = "zero-sized")]
    fn zero_sized_slots_are_refused() {
        let _ = Pool::<()>::new(8);
    }

    #[test]
    fn empty_pool() {
        let pool = Pool::<u64>::new(0);
        assert!(pool.allocate(Layout::new::<u64>()).is_none());
    }

    #[test]
    fn libc_round_trip() {
        let layout = Layout::new::<[u64; 3]>();
        let p = Libc.allocate(layout).unwrap();
        assert_eq!(p.as_ptr() as usize % layout.align(), 0);
        unsafe { Libc.release(p, layout) };
    }
}
