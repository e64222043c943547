//! Ties the two regions together: one shared address-space reservation, carved into a fries
//! region followed immediately by a bigmaacs region.
//!
//! Deliberately environment-agnostic — this module takes plain byte counts and a backing-file
//! template, so it can be unit-tested without touching environment variables or process-wide
//! globals. The `bigmaac` crate's `config`/`state` modules own translating environment variables
//! into the arguments this module expects.

use std::ffi::CString;

use crate::backing;
use crate::error::BigmaacError;
use crate::region::{Allocation, Region};

pub const PAGE_SIZE: usize = 4096;

/// Which region a chunk lives in; also doubles as the routing decision for a given request size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Fry,
    Bigmaac,
}

/// The fries region plus the bigmaacs region, carved out of one contiguous reservation.
pub struct System {
    fries: Region,
    bigmaacs: Region,
    template: CString,
}

impl System {
    /// Reserve `size_fries + size_bigmaac` bytes of address space, immediately back the whole
    /// fries range with one file mapping, and build both regions as single giant FREE chunks.
    ///
    /// `size_fries` and `size_bigmaac` are rounded up to `PAGE_SIZE` before reservation.
    pub fn new(size_fries: usize, size_bigmaac: usize, template: CString) -> Result<Self, BigmaacError> {
        let size_fries = crate::align::round_up(size_fries, PAGE_SIZE);
        let size_bigmaac = crate::align::round_up(size_bigmaac, PAGE_SIZE);

        let base = backing::reserve_address_range(size_fries + size_bigmaac)?;

        if size_fries > 0 {
            backing::install_mapping(base, size_fries, &template)?;
        }

        let fries = Region::new(base, size_fries);
        let bigmaacs = Region::new(base + size_fries, size_bigmaac);

        Ok(Self { fries, bigmaacs, template })
    }

    pub fn region(&self, kind: RegionKind) -> &Region {
        match kind {
            RegionKind::Fry => &self.fries,
            RegionKind::Bigmaac => &self.bigmaacs,
        }
    }

    fn region_mut(&mut self, kind: RegionKind) -> &mut Region {
        match kind {
            RegionKind::Fry => &mut self.fries,
            RegionKind::Bigmaac => &mut self.bigmaacs,
        }
    }

    /// Which region (if any) an address belongs to.
    pub fn locate(&self, addr: usize) -> Option<RegionKind> {
        if self.fries.contains(addr) {
            Some(RegionKind::Fry)
        } else if self.bigmaacs.contains(addr) {
            Some(RegionKind::Bigmaac)
        } else {
            None
        }
    }

    /// Lowest address either region could ever claim — everything below is never ours.
    pub fn base(&self) -> usize {
        self.fries.base()
    }

    /// One past the highest address either region could ever claim.
    pub fn end(&self) -> usize {
        self.bigmaacs.end()
    }

    /// Allocate `requested` bytes from `kind`. For bigmaacs, installs the chunk's file mapping
    /// before returning; for fries, the region's one persistent mapping already covers it.
    pub fn allocate(&mut self, kind: RegionKind, requested: usize, round_to: usize) -> Result<Allocation, BigmaacError> {
        let region = self.region_mut(kind);
        let allocation = region
            .allocate(requested, round_to)
            .ok_or(BigmaacError::RegionExhausted { region: region_name(kind), requested })?;

        if kind == RegionKind::Bigmaac {
            if let Err(e) = backing::install_mapping(allocation.addr, allocation.size, &self.template) {
                // Roll back the bookkeeping split so the region doesn't believe a chunk is
                // IN_USE when it has no backing.
                self.region_mut(kind).free(allocation.addr);
                return Err(e);
            }
            self.region_mut(kind).note_mapping_installed();
        }

        Ok(allocation)
    }

    /// Free the chunk starting at `addr` in `kind`. For bigmaacs, releases the file mapping.
    pub fn deallocate(&mut self, kind: RegionKind, addr: usize) -> Result<(), BigmaacError> {
        let region = self.region_mut(kind);
        let region_name = region_name(kind);

        let Some((freed_addr, freed_size)) = region.free(addr) else {
            return Err(BigmaacError::UnknownPointer { region: region_name, addr });
        };

        if kind == RegionKind::Bigmaac {
            backing::release_mapping(freed_addr, freed_size)?;
            self.region_mut(kind).note_mapping_released();
        }

        Ok(())
    }

    pub fn current_size(&self, kind: RegionKind, addr: usize) -> Option<usize> {
        self.region(kind).chunk_size(addr)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        self.fries.check_invariants()?;
        self.bigmaacs.check_invariants()
    }
}

fn region_name(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::Fry => "fries",
        RegionKind::Bigmaac => "bigmaacs",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "No need to be so rigid in tests")]
mod tests {
    use super::*;

    fn template() -> CString {
        backing::validate_template("/tmp/bigmaac-system-test.XXXXXX").unwrap()
    }

    #[test]
    fn regions_are_adjacent_and_sized_correctly() {
        let system = System::new(16 * PAGE_SIZE, 32 * PAGE_SIZE, template()).unwrap();
        assert_eq!(system.region(RegionKind::Fry).base(), system.base());
        assert_eq!(system.region(RegionKind::Fry).end(), system.region(RegionKind::Bigmaac).base());
        assert_eq!(system.region(RegionKind::Bigmaac).end(), system.end());
        system.check_invariants().unwrap();
    }

    #[test]
    fn locate_routes_addresses_to_the_right_region() {
        let system = System::new(16 * PAGE_SIZE, 32 * PAGE_SIZE, template()).unwrap();
        assert_eq!(system.locate(system.base()), Some(RegionKind::Fry));
        assert_eq!(system.locate(system.region(RegionKind::Bigmaac).base()), Some(RegionKind::Bigmaac));
        assert_eq!(system.locate(system.end()), None);
    }

    #[test]
    fn bigmaac_allocate_and_free_round_trip_mapping() {
        let mut system = System::new(16 * PAGE_SIZE, 32 * PAGE_SIZE, template()).unwrap();
        let allocation = system.allocate(RegionKind::Bigmaac, 3 * PAGE_SIZE, PAGE_SIZE).unwrap();
        assert_eq!(system.region(RegionKind::Bigmaac).active_mappings(), 1);

        let byte_ptr = allocation.addr as *mut u8;
        // Safety: `allocation` just installed a writable mapping covering this address.
        unsafe {
            *byte_ptr = 7;
        }
        // Safety: same mapping, still installed.
        unsafe {
            assert_eq!(*byte_ptr, 7);
        }

        system.deallocate(RegionKind::Bigmaac, allocation.addr).unwrap();
        assert_eq!(system.region(RegionKind::Bigmaac).active_mappings(), 0);
        system.check_invariants().unwrap();
    }

    #[test]
    fn deallocate_unknown_pointer_is_an_error() {
        let mut system = System::new(16 * PAGE_SIZE, 32 * PAGE_SIZE, template()).unwrap();
        let err = system.deallocate(RegionKind::Fry, system.base() + PAGE_SIZE).unwrap_err();
        assert!(matches!(err, BigmaacError::UnknownPointer { .. }));
    }
}
