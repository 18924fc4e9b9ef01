use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use log::{debug, info, trace, warn};
use regions::RegionTree;
use crate::events::*;
use crate::logger::{write_sourcelines, TraceWriter};
use crate::{LineBook, Origin, Region};

/// Location recorded for instruction pointers nobody described.
pub const UNKNOWN_LOCATION: &str = "??:0";

/// A tracker shared by several observing threads. Every call goes
/// through the lock; the region tree itself is never touched unlocked.
pub type SharedTracker<W> = Arc<Mutex<Tracker<W>>>;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Stats {
    /// Regions that entered the tree (payload updates included).
    pub registered: usize,
    /// Regions that left the tree.
    pub released:   usize,
    /// Release requests that matched no region start.
    pub unmatched:  usize,
    /// Regions at or under the size threshold.
    pub skipped:    usize,
    /// Regions the tree refused.
    pub rejected:   usize,
    pub accesses:   usize,
    pub hits:       usize,
    pub misses:     usize,
}

/// All state of one tracking session.
///
/// The host owns exactly one of these and passes it to every callback;
/// there is no process-wide tree.
pub struct Tracker<W: Write> {
    regions:    RegionTree<Region>,
    threshold:  u64,
    enabled:    bool,
    stats:      Stats,
    // Locations announced by the host, keyed by instruction pointer.
    hints:      LineBook,
    // Locations of instruction pointers that actually accessed memory.
    seen:       LineBook,
    trace:      TraceWriter<W>,
}

impl<W: Write> Tracker<W> {
    /// Regions of `threshold` bytes or fewer are not tracked.
    pub fn new(trace: W, threshold: u64) -> Self {
        Self {
            regions:    RegionTree::new(),
            threshold,
            enabled:    true,
            stats:      Stats::default(),
            hints:      LineBook::default(),
            seen:       LineBook::default(),
            trace:      TraceWriter::new(trace),
        }
    }

    pub fn shared(self) -> SharedTracker<W> {
        Arc::new(Mutex::new(self))
    }

    #[inline]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn regions(&self) -> &RegionTree<Region> {
        &self.regions
    }

    /// Source locations recorded so far, by instruction pointer.
    #[inline]
    pub fn sourcelines(&self) -> &LineBook {
        &self.seen
    }

    /// Resolves `addr` to `(base, offset)` of the region holding it.
    pub fn resolve(&mut self, addr: u64) -> Option<(u64, u64)> {
        self.regions
            .lookup(addr)
            .map(|n| (n.start(), n.offset_of(addr)))
    }

    pub fn apply(&mut self, evt: Event) -> io::Result<()> {
        match evt {
            Event::Alloc(a)                 => { self.on_alloc(a); Ok(()) },
            Event::Access(a)                => self.on_access(a),
            Event::Line { ip, location }    => { self.hint_location(ip, location); Ok(()) },
            Event::Enable                   => { self.enable(); Ok(()) },
            Event::Disable                  => self.disable(),
        }
    }

    /// Updates the region set. Allocator events are honored even while
    /// access recording is disabled, otherwise the set would go stale.
    pub fn on_alloc(&mut self, evt: AllocEvent) {
        trace!("{:?}", evt);
        match evt {
            AllocEvent::Malloc { size, addr } => {
                self.register(addr, size, Origin::Heap);
            },
            AllocEvent::Memalign { size, addr } => {
                self.track(addr, size, Origin::Heap);
            },
            AllocEvent::Calloc { nobj, size, addr } => {
                self.register(addr, nobj.saturating_mul(size), Origin::Heap);
            },
            AllocEvent::Realloc { old, size, addr } => {
                // A failed realloc leaves the old block alive; realloc(NULL, n)
                // releases nothing.
                if addr != 0 && old != 0 {
                    self.release(old);
                }
                self.register(addr, size, Origin::Heap);
            },
            AllocEvent::PosixMemalign { size, addr, ret } => {
                if ret == 0 {
                    self.track(addr, size, Origin::Heap);
                }
            },
            AllocEvent::Free { addr } => {
                // free(NULL) is legal and means nothing.
                if addr != 0 {
                    self.release(addr);
                }
            },
            AllocEvent::Mmap { size, addr } => {
                // MAP_FAILED
                if addr != u64::MAX {
                    self.track(addr, size, Origin::Mapping);
                }
            },
            AllocEvent::Munmap { addr } => {
                self.release(addr);
            },
            AllocEvent::Sbrk { delta, addr } => {
                if delta < 0 {
                    self.release(addr);
                } else {
                    self.register(addr, delta as u64, Origin::Break);
                }
            },
            AllocEvent::Brk { old_break, new_break, ret } => {
                if ret == 0 && new_break > old_break {
                    self.register(old_break, new_break - old_break, Origin::Break);
                }
            },
            AllocEvent::Section { name, addr, size } => {
                if DATA_SECTIONS.contains(&name.as_str()) {
                    self.register(addr, size, Origin::Section);
                }
            },
        }
    }

    /// Registers a region that passes the size threshold.
    fn register(&mut self, addr: u64, size: u64, origin: Origin) {
        if addr != 0 && size <= self.threshold {
            self.stats.skipped += 1;
            return;
        }
        self.track(addr, size, origin);
    }

    /// Registers a region whatever its size. Aligned allocations and
    /// mappings take this path.
    fn track(&mut self, addr: u64, size: u64, origin: Origin) {
        if addr == 0 {
            return;
        }
        if size == 0 {
            self.stats.skipped += 1;
            return;
        }
        let Some(end) = addr.checked_add(size) else {
            warn!("region at {:#x} of {} bytes wraps the address space", addr, size);
            self.stats.rejected += 1;
            return;
        };
        match self.regions.insert(addr, end, Region { start: addr, size, origin }) {
            Ok(_)   => {
                self.stats.registered += 1;
            },
            Err(e)  => {
                warn!("{:?} region dropped: {}", origin, e);
                self.stats.rejected += 1;
            }
        }
    }

    fn release(&mut self, addr: u64) {
        if self.regions.remove(addr) {
            self.stats.released += 1;
        } else {
            self.stats.unmatched += 1;
        }
    }

    /// Records a load or store. Ignored while recording is disabled.
    pub fn on_access(&mut self, acc: Access) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.stats.accesses += 1;
        if !self.seen.contains_key(&acc.ip) {
            let location = self.hints
                .get(&acc.ip)
                .cloned()
                .unwrap_or_else(|| String::from(UNKNOWN_LOCATION));
            self.seen.insert(acc.ip, location);
        }

        match self.resolve(acc.addr) {
            Some((base, offset)) => {
                self.stats.hits += 1;
                self.trace.hit(acc.ip, acc.addr, offset, base, acc.kind)
            },
            None    => {
                self.stats.misses += 1;
                self.trace.miss(acc.ip, acc.addr, acc.kind)
            }
        }
    }

    /// Tells the tracker where an instruction pointer comes from.
    pub fn hint_location(&mut self, ip: u64, location: String) {
        self.hints.insert(ip, location);
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            info!("access recording enabled");
            self.enabled = true;
        }
    }

    /// Stops access recording and marks the pause in the trace.
    pub fn disable(&mut self) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        info!("access recording disabled");
        self.enabled = false;
        self.trace.pause()
    }

    /// Flushes the trace, writes the source-line table to `lines` and
    /// returns the trace writer's target along with the final counters.
    pub fn finish<L: Write>(self, lines: L) -> io::Result<(W, Stats)> {
        write_sourcelines(lines, &self.seen)?;
        debug!("{} trace records, {} regions still live", self.trace.records(), self.regions.len());
        let out = self.trace.into_inner()?;

        Ok((out, self.stats))
    }
}
