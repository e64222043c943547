//! Scenario: a request just above the fry threshold lands in the fries region and is reflected
//! in that region's used-byte counter, leaving bigmaacs untouched.

use std::ffi::c_void;

mod common;

#[test]
fn mid_sized_request_routes_to_fries() {
    common::with_config(&[
        ("BIGMAAC_MIN_FRY_SIZE", "0"),
        ("BIGMAAC_MIN_BIGMAAC_SIZE", "1048576"),
        ("SIZE_FRIES", "16777216"),
        ("SIZE_BIGMAAC", "268435456"),
    ]);

    let ptr = unsafe { bigmaac::malloc(5000) };
    assert!(!ptr.is_null());

    let system = bigmaac::state::system().lock();
    let addr = ptr as usize;

    assert_eq!(system.locate(addr), Some(bigmaac_core::RegionKind::Fry));

    let fry_size = system.current_size(bigmaac_core::RegionKind::Fry, addr).unwrap();
    assert_eq!(fry_size, bigmaac_core::align::round_up(5000, bigmaac_core::PAGE_SIZE));
    assert_eq!(system.region(bigmaac_core::RegionKind::Fry).used_bytes(), fry_size);
    assert_eq!(system.region(bigmaac_core::RegionKind::Bigmaac).used_bytes(), 0);
    drop(system);

    unsafe { bigmaac::free(ptr as *mut c_void) };
}
