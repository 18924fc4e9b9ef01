/// What the host observed at an allocator exit point. Arguments are the
/// ones the allocator was entered with; `addr` is what it returned.
///
/// Regions are registered as `[addr, addr + size)` and released by their
/// start address, mirroring how the program itself hands memory back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocEvent {
    Malloc          { size: u64, addr: u64 },
    Calloc          { nobj: u64, size: u64, addr: u64 },
    /// Treated as `free(old)` followed by `malloc(size)`.
    Realloc         { old: u64, size: u64, addr: u64 },
    Free            { addr: u64 },
    Memalign        { size: u64, addr: u64 },
    PosixMemalign   { size: u64, addr: u64, ret: i32 },
    Mmap            { size: u64, addr: u64 },
    Munmap          { addr: u64 },
    /// `addr` is the previous program break, as returned by `sbrk`.
    Sbrk            { delta: i64, addr: u64 },
    Brk             { old_break: u64, new_break: u64, ret: i32 },
    /// A section of the main executable image.
    Section         { name: String, addr: u64, size: u64 },
}

impl AllocEvent {
    /// Name of the interposed function (or `section`).
    pub fn name(&self) -> &'static str {
        match self {
            AllocEvent::Malloc { .. }           => "malloc",
            AllocEvent::Calloc { .. }           => "calloc",
            AllocEvent::Realloc { .. }          => "realloc",
            AllocEvent::Free { .. }             => "free",
            AllocEvent::Memalign { .. }         => "memalign",
            AllocEvent::PosixMemalign { .. }    => "posix_memalign",
            AllocEvent::Mmap { .. }             => "mmap",
            AllocEvent::Munmap { .. }           => "munmap",
            AllocEvent::Sbrk { .. }             => "sbrk",
            AllocEvent::Brk { .. }              => "brk",
            AllocEvent::Section { .. }          => "section",
        }
    }
}

/// Sections of the main image that hold program data.
pub const DATA_SECTIONS: [&str; 3] = [".bss", ".data", ".rodata"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// Trace encoding: 1 for loads, 0 for stores.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            AccessKind::Read    => 1,
            AccessKind::Write   => 0,
        }
    }
}

/// A single load or store made by the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Access {
    pub ip:     u64,
    pub addr:   u64,
    pub size:   u32,
    pub kind:   AccessKind,
}

/// Everything a replay script can carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Alloc(AllocEvent),
    Access(Access),
    /// Source location of an instruction pointer.
    Line { ip: u64, location: String },
    Enable,
    Disable,
}
