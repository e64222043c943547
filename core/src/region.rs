//! A single contiguous slice of reserved address space, carved into chunks.
//!
//! A `Region` owns an address-ordered, doubly linked chunk list (rooted at a zero-size,
//! permanently IN_USE sentinel so every real chunk always has a `prev`/`next`), a [`FreeHeap`]
//! over the FREE chunks for fast largest-fit lookup, and the running `used_bytes` /
//! `active_mappings` counters each allocator entry point reports through.

use crate::chunk::{Chunk, ChunkId, ChunkState};
use crate::chunk_arena::ChunkArena;
use crate::free_heap::FreeHeap;

/// Result of a successful `allocate` call: where the new chunk starts and how large it actually
/// is (after rounding), which may exceed the caller's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub addr: usize,
    pub size: usize,
}

#[derive(Debug)]
pub struct Region {
    base: usize,
    end: usize,
    arena: ChunkArena,
    heap: FreeHeap,
    sentinel: ChunkId,
    used_bytes: usize,
    active_mappings: usize,
}

impl Region {
    /// Build a region spanning `[base, base + size)` as one giant FREE chunk behind a sentinel.
    pub fn new(base: usize, size: usize) -> Self {
        let mut arena = ChunkArena::new();

        let sentinel = arena.insert(Chunk {
            addr: base,
            size: 0,
            state: ChunkState::InUse,
            prev: None,
            next: None,
            heap_slot: None,
        });

        let mut heap = FreeHeap::new();

        if size > 0 {
            let giant = arena.insert(Chunk {
                addr: base,
                size,
                state: ChunkState::Free,
                prev: Some(sentinel),
                next: None,
                heap_slot: None,
            });

            arena.get_mut(sentinel).next = Some(giant);
            heap.insert(&mut arena, giant);
        }

        Self { base, end: base + size, arena, heap, sentinel, used_bytes: 0, active_mappings: 0 }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn active_mappings(&self) -> usize {
        self.active_mappings
    }

    /// Record that the caller just installed a file-backed mapping for a freshly allocated
    /// chunk. Called by the orchestration layer, not by `allocate` itself, since mapping
    /// installation is a syscall the region's own bookkeeping doesn't perform.
    pub fn note_mapping_installed(&mut self) {
        self.active_mappings += 1;
    }

    /// Record that the caller just released a chunk's file-backed mapping.
    pub fn note_mapping_released(&mut self) {
        self.active_mappings -= 1;
    }

    /// Locate the chunk starting exactly at `addr`, following the address-ordered list from the
    /// sentinel. Returns `None` if `addr` is not the start address of any chunk.
    pub fn find_chunk_by_addr(&self, addr: usize) -> Option<ChunkId> {
        let mut cursor = self.arena.get(self.sentinel).next;

        while let Some(id) = cursor {
            let chunk = self.arena.get(id);

            if chunk.addr == addr {
                return Some(id);
            }

            if chunk.addr > addr {
                return None;
            }

            cursor = chunk.next;
        }

        None
    }

    /// Carve an IN_USE chunk of at least `round_up(requested, round_to)` bytes out of the
    /// largest-fit-preserving free chunk the heap selects. Returns `None` if no free chunk is
    /// large enough.
    pub fn allocate(&mut self, requested: usize, round_to: usize) -> Option<Allocation> {
        let size = crate::align::round_up(requested.max(1), round_to);
        let slot = self.heap.peek_for_fit(&self.arena, size)?;
        let free_id = self.heap.chunk_at(slot);
        let free_chunk = *self.arena.get(free_id);

        debug_assert!(free_chunk.size >= size);

        if free_chunk.size == size {
            // Exact fit: the whole free chunk becomes the allocation, just flip its state and
            // drop it from the heap.
            self.heap.remove(&mut self.arena, slot);
            self.arena.get_mut(free_id).state = ChunkState::InUse;
            self.arena.get_mut(free_id).heap_slot = None;
        } else {
            // Split: carve the new chunk from the free chunk's low end, leaving a smaller free
            // chunk in place (same slot, possibly needing to sift down).
            let new_id = self.arena.insert(Chunk {
                addr: free_chunk.addr,
                size,
                state: ChunkState::InUse,
                prev: free_chunk.prev,
                next: Some(free_id),
                heap_slot: None,
            });

            if let Some(prev_id) = free_chunk.prev {
                self.arena.get_mut(prev_id).next = Some(new_id);
            }

            let remainder = self.arena.get_mut(free_id);
            remainder.addr += size;
            remainder.size -= size;
            remainder.prev = Some(new_id);

            self.heap.sift_down(&mut self.arena, slot);
        }

        self.used_bytes += size;
        Some(Allocation { addr: free_chunk.addr, size })
    }

    /// Return the total size of the IN_USE chunk starting at `addr`, if any.
    pub fn chunk_size(&self, addr: usize) -> Option<usize> {
        let id = self.find_chunk_by_addr(addr)?;
        let chunk = self.arena.get(id);
        (!chunk.is_free()).then_some(chunk.size)
    }

    /// Mark the IN_USE chunk starting at `addr` FREE, coalescing with an immediate FREE neighbor
    /// on either side. Returns the freed chunk's address range so the caller can release any
    /// backing mapping, or `None` if `addr` doesn't name a live IN_USE chunk.
    pub fn free(&mut self, addr: usize) -> Option<(usize, usize)> {
        let id = self.find_chunk_by_addr(addr)?;
        let chunk = *self.arena.get(id);

        if chunk.is_free() {
            return None;
        }

        self.used_bytes -= chunk.size;

        let prev_free = chunk.prev.filter(|&p| self.arena.get(p).is_free());
        let next_free = chunk.next.filter(|&n| self.arena.get(n).is_free());

        match (prev_free, next_free) {
            (Some(prev_id), Some(next_id)) => {
                // Merge chunk + next into prev; drop chunk and next's slots and the heap entry
                // for next (prev's heap entry only ever grows here, so it can only need to sift
                // up, never down).
                let next_chunk = self.arena.remove(next_id);
                self.arena.remove(id);

                let prev_heap_slot = self.arena.get(prev_id).heap_slot.expect("prev_free chunk must be in the heap");
                let next_heap_slot = next_chunk.heap_slot.expect("next_free chunk must be in the heap");
                self.heap.remove(&mut self.arena, next_heap_slot);

                let prev_chunk = self.arena.get_mut(prev_id);
                prev_chunk.size += chunk.size + next_chunk.size;
                prev_chunk.next = next_chunk.next;

                if let Some(after_next) = next_chunk.next {
                    self.arena.get_mut(after_next).prev = Some(prev_id);
                }

                // `prev_heap_slot` may have shifted if the removal above swapped the last slot
                // into it; re-read it before sifting.
                let slot = self.arena.get(prev_id).heap_slot.unwrap_or(prev_heap_slot);
                self.heap.sift_up(&mut self.arena, slot);
            }
            (Some(prev_id), None) => {
                // Absorb chunk into prev; prev's heap entry only grows, so it can only need to
                // sift up.
                self.arena.remove(id);

                let prev_chunk = self.arena.get_mut(prev_id);
                prev_chunk.size += chunk.size;
                prev_chunk.next = chunk.next;

                if let Some(next_id) = chunk.next {
                    self.arena.get_mut(next_id).prev = Some(prev_id);
                }

                let slot = self.arena.get(prev_id).heap_slot.expect("prev_free chunk must be in the heap");
                self.heap.sift_up(&mut self.arena, slot);
            }
            (None, Some(next_id)) => {
                // Absorb next into chunk; chunk takes over next's heap slot and only grows, so a
                // sift-up is needed (same justification as the prev-only case, mirrored).
                let next_chunk = self.arena.remove(next_id);
                let slot = next_chunk.heap_slot.expect("next_free chunk must be in the heap");

                let this_chunk = self.arena.get_mut(id);
                this_chunk.state = ChunkState::Free;
                this_chunk.size += next_chunk.size;
                this_chunk.next = next_chunk.next;
                this_chunk.heap_slot = Some(slot);

                if let Some(after_next) = next_chunk.next {
                    self.arena.get_mut(after_next).prev = Some(id);
                }

                *self.heap_slot_mut(slot) = id;
                self.heap.sift_up(&mut self.arena, slot);
            }
            (None, None) => {
                self.arena.get_mut(id).state = ChunkState::Free;
                self.heap.insert(&mut self.arena, id);
            }
        }

        Some((chunk.addr, chunk.size))
    }

    fn heap_slot_mut(&mut self, slot: usize) -> &mut ChunkId {
        self.heap.slot_mut(slot)
    }

    /// Sum of sizes of every chunk (FREE and IN_USE) reachable from the sentinel; should always
    /// equal the region's total size. Used by tests and the invariant-check entry point.
    pub fn reachable_size(&self) -> usize {
        let mut total = 0;
        let mut cursor = self.arena.get(self.sentinel).next;

        while let Some(id) = cursor {
            let chunk = self.arena.get(id);
            total += chunk.size;
            cursor = chunk.next;
        }

        total
    }

    /// Check every region-level invariant: address-ordered contiguous list, no two adjacent FREE
    /// chunks, heap membership exactly matches FREE chunks, and used-bytes accounting.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.heap.check_invariants(&self.arena)?;

        let mut cursor = self.arena.get(self.sentinel).next;
        let mut expected_addr = self.base;
        let mut prev_was_free = false;
        let mut used_total = 0;
        let mut free_count = 0;

        while let Some(id) = cursor {
            let chunk = self.arena.get(id);

            if chunk.addr != expected_addr {
                return Err(format!("chunk {id} at {:#x}, expected {:#x} (list not contiguous)", chunk.addr, expected_addr));
            }

            if chunk.is_free() {
                if prev_was_free {
                    return Err(format!("two adjacent FREE chunks meeting at {:#x}", chunk.addr));
                }
                free_count += 1;
            } else {
                used_total += chunk.size;
            }

            prev_was_free = chunk.is_free();
            expected_addr += chunk.size;
            cursor = chunk.next;
        }

        if expected_addr != self.end {
            return Err(format!("chunk list ends at {:#x}, region ends at {:#x}", expected_addr, self.end));
        }

        if free_count != self.heap.len() {
            return Err(format!("{free_count} FREE chunks in list but {} in heap", self.heap.len()));
        }

        if used_total != self.used_bytes {
            return Err(format!("used_bytes is {} but list sums to {used_total}", self.used_bytes));
        }

        Ok(())
    }
}
