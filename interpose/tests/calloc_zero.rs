//! Zero-fill law: `calloc(n, s)` returns a block whose first `n*s` bytes are zero, both for a
//! bypass-sized request (the underlying allocator's own `calloc`) and for one routed into the
//! fries region, where the backing file may carry leftover bytes from a previous occupant.

use std::ffi::c_void;

mod common;

fn all_zero(ptr: *const u8, len: usize) -> bool {
    (0..len).all(|i| unsafe { *ptr.add(i) } == 0)
}

#[test]
fn calloc_zeroes_both_bypass_and_fry_allocations() {
    common::with_config(&[
        ("BIGMAAC_MIN_FRY_SIZE", "16384"),
        ("BIGMAAC_MIN_BIGMAAC_SIZE", "1048576"),
        ("SIZE_FRIES", "16777216"),
        ("SIZE_BIGMAAC", "268435456"),
    ]);

    let small = unsafe { bigmaac::calloc(1, 64) };
    assert!(!small.is_null());
    assert!(all_zero(small as *const u8, 64));
    unsafe { bigmaac::free(small as *mut c_void) };

    // A fry-routed allocation, freed and immediately re-allocated at the same size so the second
    // call reuses bytes the first call's caller could have dirtied.
    let count = 32usize;
    let elem = 1024usize;
    let first = unsafe { bigmaac::calloc(count, elem) };
    assert!(!first.is_null());
    assert!(all_zero(first as *const u8, count * elem));

    unsafe {
        std::ptr::write_bytes(first as *mut u8, 0xFF, count * elem);
        bigmaac::free(first as *mut c_void);
    }

    let second = unsafe { bigmaac::calloc(count, elem) };
    assert!(!second.is_null());
    assert!(all_zero(second as *const u8, count * elem), "reused fry bytes were not re-zeroed");

    unsafe { bigmaac::free(second as *mut c_void) };
}
