//! The atomic unit a [`Region`](crate::region::Region) partitions its address range into.
//!
//! A chunk never moves once created: its [`ChunkId`] stays valid for as long as the chunk
//! exists, even across splits and coalesces of its *neighbours*. Chunks are stored in a
//! [`ChunkArena`](crate::chunk_arena::ChunkArena) and referenced everywhere else — the address
//! ordered list and the free-heap alike — purely by id, never by raw pointer. A chunk's record
//! only moves to a different slot when that slot is recycled for an unrelated chunk, which only
//! happens after every other reference to the old id has already been dropped by the same
//! operation that freed it.

/// Stable handle to a [`Chunk`] stored in a [`ChunkArena`](crate::chunk_arena::ChunkArena).
///
/// Opaque on purpose: arithmetic on a `ChunkId` has no meaning, it is only ever used to index
/// back into the arena that produced it.
pub type ChunkId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Free,
    InUse,
}

/// A half-open byte range `[addr, addr + size)` within a region's reservation.
///
/// `prev`/`next` thread this chunk into the region's address-ordered chunk list. `heap_slot` is
/// `Some` exactly when `state == ChunkState::Free`, and gives this chunk's current position in
/// the region's free-heap array (kept in sync by every heap operation that moves it).
#[derive(Debug, Clone, Copy)]
pub struct Chunk {
    pub addr: usize,
    pub size: usize,
    pub state: ChunkState,
    pub prev: Option<ChunkId>,
    pub next: Option<ChunkId>,
    pub heap_slot: Option<usize>,
}

impl Chunk {
    pub fn is_free(&self) -> bool {
        self.state == ChunkState::Free
    }

    pub fn end(&self) -> usize {
        self.addr + self.size
    }
}
