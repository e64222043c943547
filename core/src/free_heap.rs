//! Max-heap over the FREE chunks of a region, keyed by chunk size.
//!
//! Backed by a plain `Vec<ChunkId>` with the usual array-binary-heap geometry (parent of `i` is
//! `(i - 1) / 2`, children `2i + 1` and `2i + 2`). Every element's chunk carries its own
//! `heap_slot` back-reference so a chunk can be located and resized in the heap without a linear
//! scan.

use crate::chunk::ChunkId;
use crate::chunk_arena::ChunkArena;

#[derive(Debug, Default)]
pub struct FreeHeap {
    slots: Vec<ChunkId>,
}

fn parent(slot: usize) -> Option<usize> {
    if slot == 0 {
        None
    } else {
        Some((slot - 1) / 2)
    }
}

fn children(slot: usize) -> (usize, usize) {
    (2 * slot + 1, 2 * slot + 2)
}

impl FreeHeap {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn chunk_at(&self, slot: usize) -> ChunkId {
        *self.slots.get(slot).expect("heap slot out of range")
    }

    /// Mutable access to the `ChunkId` stored at `slot`, for callers that replace a chunk's
    /// identity in place (e.g. absorbing a neighbor into the chunk that already owns this slot)
    /// without changing the slot's position in the heap.
    pub fn slot_mut(&mut self, slot: usize) -> &mut ChunkId {
        self.slots.get_mut(slot).expect("heap slot out of range")
    }

    fn size_at(&self, arena: &ChunkArena, slot: usize) -> Option<usize> {
        self.slots.get(slot).map(|&id| arena.get(id).size)
    }

    fn swap(&mut self, arena: &mut ChunkArena, a: usize, b: usize) {
        self.slots.swap(a, b);
        let id_a = *self.slots.get(a).expect("slot in range, just swapped");
        let id_b = *self.slots.get(b).expect("slot in range, just swapped");
        arena.get_mut(id_a).heap_slot = Some(a);
        arena.get_mut(id_b).heap_slot = Some(b);
    }

    /// Insert a chunk that is already marked FREE. Sets the chunk's `heap_slot` and restores the
    /// max-heap property.
    pub fn insert(&mut self, arena: &mut ChunkArena, id: ChunkId) {
        let slot = self.slots.len();
        self.slots.push(id);
        arena.get_mut(id).heap_slot = Some(slot);
        self.sift_up(arena, slot);
    }

    /// Remove the element at `slot` (swap-with-last, then reconcile the heap property from
    /// `slot`).
    ///
    /// The element swapped into `slot` comes from an arbitrary position elsewhere in the heap,
    /// so its correct resting place relative to `slot`'s old neighbors is unconstrained in either
    /// direction: try `sift_up` first, and only `sift_down` if that left it in place.
    pub fn remove(&mut self, arena: &mut ChunkArena, slot: usize) {
        let last = self.slots.len() - 1;

        if slot == last {
            self.slots.pop();
            return;
        }

        self.slots.swap(slot, last);
        self.slots.pop();

        let moved_id = *self.slots.get(slot).expect("slot < len after pop");
        arena.get_mut(moved_id).heap_slot = Some(slot);

        self.sift_up(arena, slot);

        if arena.get(moved_id).heap_slot == Some(slot) {
            self.sift_down(arena, slot);
        }
    }

    pub fn sift_up(&mut self, arena: &mut ChunkArena, mut slot: usize) {
        while let Some(p) = parent(slot) {
            let Some(p_size) = self.size_at(arena, p) else { break };
            let Some(slot_size) = self.size_at(arena, slot) else { break };

            if slot_size <= p_size {
                break;
            }

            self.swap(arena, slot, p);
            slot = p;
        }
    }

    pub fn sift_down(&mut self, arena: &mut ChunkArena, mut slot: usize) {
        loop {
            let (left, right) = children(slot);
            let slot_size = match self.size_at(arena, slot) {
                Some(s) => s,
                None => return,
            };

            let mut largest = slot;
            let mut largest_size = slot_size;

            if let Some(left_size) = self.size_at(arena, left) {
                if left_size > largest_size {
                    largest = left;
                    largest_size = left_size;
                }
            }

            if let Some(right_size) = self.size_at(arena, right) {
                if right_size > largest_size {
                    largest = right;
                }
            }

            if largest == slot {
                break;
            }

            self.swap(arena, slot, largest);
            slot = largest;
        }
    }

    /// Anti-fragmentation fit selection: among the root and its two children, whichever ones fit
    /// `size`, return the slot of the *smallest* one that still fits, preserving whichever of the
    /// three largest free chunks doesn't have to be carved into.
    ///
    /// Returns `None` if even the root (the single largest free chunk) is too small.
    pub fn peek_for_fit(&self, arena: &ChunkArena, size: usize) -> Option<usize> {
        let root_size = self.size_at(arena, 0)?;

        if root_size < size {
            return None;
        }

        let mut best_slot = 0;
        let mut best_size = root_size;

        let (left, right) = children(0);

        for candidate in [left, right] {
            if let Some(candidate_size) = self.size_at(arena, candidate) {
                if candidate_size >= size && candidate_size < best_size {
                    best_slot = candidate;
                    best_size = candidate_size;
                }
            }
        }

        Some(best_slot)
    }

    /// Verify the max-heap property and slot/id consistency. Used by integration tests and
    /// debug assertions, not on any allocation hot path.
    pub fn check_invariants(&self, arena: &ChunkArena) -> Result<(), String> {
        for (slot, &id) in self.slots.iter().enumerate() {
            let chunk = arena.get(id);

            if !chunk.is_free() {
                return Err(format!("heap slot {slot} holds non-FREE chunk {id}"));
            }

            if chunk.heap_slot != Some(slot) {
                return Err(format!("chunk {id} heap_slot {:?} does not match its array position {slot}", chunk.heap_slot));
            }

            if let Some(p) = parent(slot) {
                let p_id = *self.slots.get(p).expect("parent slot in range");
                if arena.get(p_id).size < chunk.size {
                    return Err(format!("max-heap property violated at slot {slot} (parent {p})"));
                }
            }
        }

        Ok(())
    }
}
