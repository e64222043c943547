//! Stable-handle storage for [`Chunk`]s.
//!
//! Chunks are never removed from the backing `Vec` — a "removed" slot is recycled onto a free
//! list and handed back out by a later [`insert`](ChunkArena::insert). This keeps every
//! previously issued [`ChunkId`] meaningless-but-harmless to hold onto past its chunk's
//! lifetime (indexing a recycled slot just returns whatever new chunk now lives there), which is
//! fine because the only long-lived holders of a `ChunkId` — the chunk list links and the
//! free-heap array — are always updated in the same critical section that recycles the slot.

use crate::chunk::{Chunk, ChunkId};

#[derive(Debug, Default)]
pub struct ChunkArena {
    slots: Vec<Option<Chunk>>,
    free_slots: Vec<ChunkId>,
}

impl ChunkArena {
    pub fn new() -> Self {
        Self { slots: Vec::new(), free_slots: Vec::new() }
    }

    pub fn insert(&mut self, chunk: Chunk) -> ChunkId {
        if let Some(id) = self.free_slots.pop() {
            *self.slots.get_mut(id).expect("free_slots only ever holds in-bounds ids") = Some(chunk);
            id
        } else {
            self.slots.push(Some(chunk));
            self.slots.len() - 1
        }
    }

    /// Recycle `id`'s slot and return the chunk that was stored there.
    ///
    /// # Panics
    /// Panics if `id` is out of range or already recycled — both indicate a chunk-list or
    /// free-heap bug upstream, not a recoverable runtime condition.
    pub fn remove(&mut self, id: ChunkId) -> Chunk {
        let chunk = self
            .slots
            .get_mut(id)
            .expect("chunk id out of range")
            .take()
            .expect("chunk id already recycled");

        self.free_slots.push(id);
        chunk
    }

    pub fn get(&self, id: ChunkId) -> &Chunk {
        self.slots.get(id).expect("chunk id out of range").as_ref().expect("chunk id already recycled")
    }

    pub fn get_mut(&mut self, id: ChunkId) -> &mut Chunk {
        self.slots.get_mut(id).expect("chunk id out of range").as_mut().expect("chunk id already recycled")
    }

    /// Number of live (non-recycled) chunks, for invariant checks and tests.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "No need to be so rigid in tests")]
mod tests {
    use super::*;
    use crate::chunk::ChunkState;

    fn chunk(addr: usize, size: usize) -> Chunk {
        Chunk { addr, size, state: ChunkState::Free, prev: None, next: None, heap_slot: None }
    }

    #[test]
    fn recycled_slots_are_reused() {
        let mut arena = ChunkArena::new();
        let a = arena.insert(chunk(0, 10));
        let b = arena.insert(chunk(10, 10));
        arena.remove(a);
        let c = arena.insert(chunk(20, 10));

        assert_eq!(c, a, "freed slot should be reused rather than growing the backing vec");
        assert_eq!(arena.get(b).addr, 10);
        assert_eq!(arena.live_count(), 2);
    }

    #[test]
    #[should_panic(expected = "already recycled")]
    fn double_remove_panics() {
        let mut arena = ChunkArena::new();
        let a = arena.insert(chunk(0, 10));
        arena.remove(a);
        arena.remove(a);
    }
}
