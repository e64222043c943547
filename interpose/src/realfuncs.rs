//! Resolves the libc allocator symbols this crate shadows, via `dlsym(RTLD_NEXT, ..)`.
//!
//! Deliberately not a `OnceLock`-guarded lazy accessor: `dlsym`'s first call on most libcs
//! allocates for its own bookkeeping, which would reenter this crate's `calloc` from inside the
//! very closure a `OnceLock::get_or_init` holds its initialization lock across, deadlocking the
//! thread against itself. Instead each symbol is resolved into a plain `AtomicPtr`, written once
//! by whichever thread performs init (see `state.rs`), and read locklessly by every call after.

use std::ffi::CStr;
use std::os::raw::c_void;
use std::sync::atomic::{AtomicPtr, Ordering};

type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
type CallocFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;
type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void);

static REAL_MALLOC: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_CALLOC: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_REALLOC: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());
static REAL_FREE: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

fn dlsym_next(name: &CStr) -> *mut c_void {
    // Safety: `name` is a valid, NUL-terminated C string; `RTLD_NEXT` is a well-known pseudo
    // handle understood by every libc that supports symbol interposition.
    unsafe { libc::dlsym(libc::RTLD_NEXT, name.as_ptr()) }
}

/// Resolve and cache all four symbols. Called exactly once, from the `LOADING_MEM_FUNCS` phase
/// of init, before any region structure exists.
pub fn resolve_all() -> Result<(), &'static str> {
    let malloc = dlsym_next(c"malloc");
    let calloc = dlsym_next(c"calloc");
    let realloc = dlsym_next(c"realloc");
    let free = dlsym_next(c"free");

    if malloc.is_null() || calloc.is_null() || realloc.is_null() || free.is_null() {
        return Err("dlsym(RTLD_NEXT, ..) failed to resolve one or more real allocator symbols");
    }

    REAL_MALLOC.store(malloc, Ordering::Release);
    REAL_CALLOC.store(calloc, Ordering::Release);
    REAL_REALLOC.store(realloc, Ordering::Release);
    REAL_FREE.store(free, Ordering::Release);

    Ok(())
}

/// Call the real `malloc`. Returns null if the symbol hasn't been resolved yet (the reentrant
/// bootstrap window described in `state.rs`), which callers in that window must already tolerate.
pub fn real_malloc(size: usize) -> *mut c_void {
    let ptr = REAL_MALLOC.load(Ordering::Acquire);
    if ptr.is_null() {
        return std::ptr::null_mut();
    }

    // Safety: a non-null `ptr` was stored only after a successful `dlsym` resolution of the
    // `malloc` symbol, whose C ABI matches `MallocFn` exactly.
    unsafe { std::mem::transmute::<*mut c_void, MallocFn>(ptr)(size) }
}

/// Call the real `calloc`. Returns null (never "falls back" to `malloc` + zero) if unresolved,
/// matching the documented pre-`LOADED` `calloc` bypass behavior.
pub fn real_calloc(count: usize, size: usize) -> *mut c_void {
    let ptr = REAL_CALLOC.load(Ordering::Acquire);
    if ptr.is_null() {
        return std::ptr::null_mut();
    }

    // Safety: see `real_malloc`; `ptr`'s C ABI matches `CallocFn`.
    unsafe { std::mem::transmute::<*mut c_void, CallocFn>(ptr)(count, size) }
}

pub fn real_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    let func = REAL_REALLOC.load(Ordering::Acquire);
    if func.is_null() {
        return std::ptr::null_mut();
    }

    // Safety: see `real_malloc`; `func`'s C ABI matches `ReallocFn`.
    unsafe { std::mem::transmute::<*mut c_void, ReallocFn>(func)(ptr, size) }
}

pub fn real_free(ptr: *mut c_void) {
    let func = REAL_FREE.load(Ordering::Acquire);
    if func.is_null() {
        // Nothing sane to do: dropping the pointer silently is consistent with tolerating a null
        // underlying pointer during the bootstrap window.
        return;
    }

    // Safety: see `real_malloc`; `func`'s C ABI matches `FreeFn`, and `ptr` was obtained from a
    // prior call to one of the `real_*` allocation functions above (caller's invariant).
    unsafe { std::mem::transmute::<*mut c_void, FreeFn>(func)(ptr) };
}

/// The usable size of a block the underlying allocator handed out, used when a `realloc` call
/// crosses from the system allocator into one of our regions.
pub fn real_malloc_usable_size(ptr: *mut c_void) -> usize {
    extern "C" {
        fn malloc_usable_size(ptr: *mut c_void) -> usize;
    }

    // Safety: `ptr` is either null (defined to return 0) or a live block from the real allocator.
    unsafe { malloc_usable_size(ptr) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "No need to be so rigid in tests")]
mod tests {
    use super::*;

    #[test]
    fn dlsym_next_finds_an_ordinary_libc_symbol() {
        assert!(!dlsym_next(c"printf").is_null());
    }

    #[test]
    fn resolves_real_symbols_and_round_trips_an_allocation() {
        resolve_all().unwrap();

        let ptr = real_malloc(64);
        assert!(!ptr.is_null());

        let usable = real_malloc_usable_size(ptr);
        assert!(usable >= 64);

        real_free(ptr);
    }
}
