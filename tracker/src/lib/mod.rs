//! Welcome to `memtrack`!
//!
//! The host side of memory-access tracing. An instrumentation layer (or a
//! recorded script of what one saw) feeds a [`Tracker`] two kinds of
//! events: allocator exits, which grow and shrink the set of live memory
//! regions, and loads/stores, which are resolved against that set and
//! written to a text trace.
//!
//! Region bookkeeping lives in a [`regions::RegionTree`], one per tracker.

pub mod events;
pub mod logger;
pub mod script;
pub mod tracker;

use std::hash::BuildHasherDefault;
use ahash::AHasher;
use indexmap::IndexMap;

pub use crate::events::*;
pub use crate::logger::{write_sourcelines, TraceWriter};
pub use crate::script::{Script, ScriptError};
pub use crate::tracker::{SharedTracker, Stats, Tracker, UNKNOWN_LOCATION};

/// Source location (`file:line`) per instruction pointer.
pub type LineBook = IndexMap<u64, String, BuildHasherDefault<AHasher>>;

/// Where a tracked region came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// malloc and friends.
    Heap,
    Mapping,
    /// The program break, via `brk` or `sbrk`.
    Break,
    /// A data section of the executable image.
    Section,
}

/// Payload stored with every live region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub start:  u64,
    pub size:   u64,
    pub origin: Origin,
}
