//! Scenario: several threads hammer malloc/calloc/realloc/free concurrently over a size range
//! that lands in the fries region, and every region invariant still holds once they're done.
//!
//! Scaled down from the nominal 32 threads × 16384 operations to 4 threads × 500 operations —
//! enough to exercise the single global lock under real contention without making a deterministic
//! test run slow (see DESIGN.md).

use std::ffi::c_void;
use std::thread;

mod common;

const WORKERS: usize = 4;
const OPS_PER_WORKER: usize = 500;
const MIN_SIZE: usize = 8 * 1024;
const MAX_SIZE: usize = 24 * 1024;

#[test]
fn mixed_traffic_from_many_threads_preserves_invariants() {
    common::with_config(&[
        ("BIGMAAC_MIN_FRY_SIZE", "16384"),
        ("BIGMAAC_MIN_BIGMAAC_SIZE", "1048576"),
        ("SIZE_FRIES", "67108864"),
        ("SIZE_BIGMAAC", "134217728"),
    ]);

    // Trigger init on the main thread first so every worker observes `State::Loaded` immediately.
    let warmup = unsafe { bigmaac::malloc(8) };
    unsafe { bigmaac::free(warmup) };

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            thread::spawn(move || {
                use nanorand::{Rng, WyRand};

                let mut rng = WyRand::new_seed(0x5EED_0000 + worker as u64);
                let mut live: Vec<*mut c_void> = Vec::new();

                for _ in 0..OPS_PER_WORKER {
                    let choice = rng.generate_range(0u32..4);

                    match choice {
                        0 => {
                            let size = rng.generate_range(MIN_SIZE..=MAX_SIZE);
                            let ptr = unsafe { bigmaac::malloc(size) };
                            if !ptr.is_null() {
                                live.push(ptr);
                            }
                        }
                        1 => {
                            let size = rng.generate_range(MIN_SIZE..=MAX_SIZE);
                            let ptr = unsafe { bigmaac::calloc(1, size) };
                            if !ptr.is_null() {
                                live.push(ptr);
                            }
                        }
                        2 if !live.is_empty() => {
                            let index = rng.generate_range(0..live.len());
                            let old = live.swap_remove(index);
                            let size = rng.generate_range(MIN_SIZE..=MAX_SIZE);
                            let new_ptr = unsafe { bigmaac::realloc(old, size) };
                            if !new_ptr.is_null() {
                                live.push(new_ptr);
                            }
                        }
                        _ if !live.is_empty() => {
                            let index = rng.generate_range(0..live.len());
                            let ptr = live.swap_remove(index);
                            unsafe { bigmaac::free(ptr) };
                        }
                        _ => {}
                    }
                }

                for ptr in live {
                    unsafe { bigmaac::free(ptr) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    let system = bigmaac::state::system().lock();
    system.check_invariants().unwrap();
    assert_eq!(system.region(bigmaac_core::RegionKind::Fry).used_bytes(), 0);
    assert_eq!(system.region(bigmaac_core::RegionKind::Bigmaac).used_bytes(), 0);
}
