//! Scenario: shrinking a bigmaac allocation in place returns the same pointer and never reduces
//! the region's used-byte count, matching the pointer-stability-under-shrink law.

use std::ffi::c_void;

mod common;

#[test]
fn realloc_to_a_smaller_size_keeps_the_pointer_and_bookkeeping() {
    common::with_config(&[
        ("BIGMAAC_MIN_FRY_SIZE", "0"),
        ("BIGMAAC_MIN_BIGMAAC_SIZE", "1048576"),
        ("SIZE_FRIES", "16777216"),
        ("SIZE_BIGMAAC", "536870912"),
    ]);

    let mib = 1024 * 1024;
    let original = unsafe { bigmaac::malloc(300 * mib) };
    assert!(!original.is_null());

    let used_before = {
        let system = bigmaac::state::system().lock();
        system.region(bigmaac_core::RegionKind::Bigmaac).used_bytes()
    };

    let shrunk = unsafe { bigmaac::realloc(original, 200 * mib) };
    assert_eq!(shrunk, original);

    let used_after = {
        let system = bigmaac::state::system().lock();
        system.region(bigmaac_core::RegionKind::Bigmaac).used_bytes()
    };
    assert_eq!(used_after, used_before);

    unsafe { bigmaac::free(shrunk as *mut c_void) };
}
