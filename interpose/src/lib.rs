//! Interposes `malloc`/`calloc`/`realloc`/`reallocarray`/`free`, redirecting large requests into
//! file-backed regions (see `bigmaac_core`) while leaving ordinary-sized requests untouched.
//!
//! This crate publishes the five symbols with `#[no_mangle] extern "C"` and builds as a
//! `cdylib`; getting the dynamic linker to prefer these symbols over libc's own (`LD_PRELOAD=
//! libbigmaac.so <command>`, or an explicit `DT_NEEDED`/symbol-versioning arrangement) is a
//! deployment concern, not something this code performs itself.

pub mod config;
pub mod diagnostics;
pub mod realfuncs;
pub mod state;

use std::os::raw::c_void;

use bigmaac_core::{BigmaacError, RegionKind};

use crate::state::State;

fn set_enomem() {
    errno::set_errno(errno::Errno(libc::ENOMEM));
}

/// Decide where a request of `size` bytes should be routed, given the configured thresholds.
/// `None` means "bypass to the underlying allocator".
fn classify(size: usize, thresholds: state::Thresholds) -> Option<RegionKind> {
    if size == 0 || size <= thresholds.min_fry_size {
        None
    } else if size > thresholds.min_bigmaac_size {
        Some(RegionKind::Bigmaac)
    } else {
        Some(RegionKind::Fry)
    }
}

/// Route an allocation of `size` bytes once the library is fully `Loaded`. Returns `Ok(None)` to
/// mean "not ours, caller should use the underlying allocator".
fn route_allocate(size: usize) -> Result<Option<*mut c_void>, BigmaacError> {
    let Some(kind) = classify(size, state::thresholds()) else {
        return Ok(None);
    };

    let mut system = state::system().lock();
    let allocation = system.allocate(kind, size, bigmaac_core::PAGE_SIZE)?;
    Ok(Some(allocation.addr as *mut c_void))
}

fn handle_region_error(e: &BigmaacError) {
    match e {
        BigmaacError::RegionExhausted { .. } => {
            bigmaac_warn!("{e}");
        }
        BigmaacError::MappingFailed { .. } => {
            bigmaac_error!("{e}");
        }
        BigmaacError::UnknownPointer { .. } => {
            bigmaac_warn!("{e}");
        }
        BigmaacError::InitFailed(_) => {
            bigmaac_error!("{e}");
        }
    }
    set_enomem();
}

/// # Safety
/// Callable from any thread at any point in the host process's lifetime, including reentrantly
/// from within this very function's own bootstrap (see `state.rs`). Behaves as a drop-in
/// replacement for libc `malloc`.
#[no_mangle]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    state::trigger_init_if_needed();

    if size == 0 || state::current_state() != State::Loaded {
        return realfuncs::real_malloc(size);
    }

    match route_allocate(size) {
        Ok(Some(ptr)) => ptr,
        Ok(None) => realfuncs::real_malloc(size),
        Err(e) => {
            handle_region_error(&e);
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// Same contract as [`malloc`]. Zeroes fry allocations explicitly (bigmaac pages are zero-filled
/// by the kernel on first touch of a freshly installed mapping; see `state.rs`/`system.rs`).
#[no_mangle]
pub unsafe extern "C" fn calloc(count: usize, size: usize) -> *mut c_void {
    state::trigger_init_if_needed();

    match state::current_state() {
        State::LoadingMemFuncs | State::LoadingLibrary => return std::ptr::null_mut(),
        State::LibraryFail => return realfuncs::real_calloc(count, size),
        State::NotLoaded | State::Loaded => {}
    }

    let Some(total) = count.checked_mul(size) else {
        set_enomem();
        return std::ptr::null_mut();
    };

    if total == 0 {
        return realfuncs::real_calloc(count, size);
    }

    let Some(kind) = classify(total, state::thresholds()) else {
        return realfuncs::real_calloc(count, size);
    };

    let result = {
        let mut system = state::system().lock();
        system.allocate(kind, total, bigmaac_core::PAGE_SIZE)
    };

    match result {
        Ok(allocation) => {
            let ptr = allocation.addr as *mut c_void;
            if kind == RegionKind::Fry {
                // Safety: `allocation` covers exactly `allocation.size >= total` freshly
                // rounded bytes this call alone owns; the fry file's pages may carry leftover
                // data from a previous occupant and must be zeroed explicitly.
                unsafe {
                    std::ptr::write_bytes(ptr.cast::<u8>(), 0, total);
                }
            }
            ptr
        }
        Err(e) => {
            handle_region_error(&e);
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `ptr` must be null or a pointer previously returned by `malloc`/`calloc`/`realloc`/
/// `reallocarray` (ours or the underlying allocator's) and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    state::trigger_init_if_needed();

    match state::current_state() {
        State::LoadingMemFuncs | State::LoadingLibrary | State::LibraryFail => {
            return realfuncs::real_realloc(ptr, size);
        }
        State::NotLoaded | State::Loaded => {}
    }

    if ptr.is_null() {
        // Safety: delegating to our own `malloc`, which upholds the same contract.
        return unsafe { malloc(size) };
    }

    let addr = ptr as usize;
    let owner = state::system().lock().locate(addr);

    match owner {
        Some(kind) => realloc_owned(kind, addr, size),
        None => realloc_foreign(ptr, size),
    }
}

fn realloc_owned(kind: RegionKind, addr: usize, size: usize) -> *mut c_void {
    let mut system = state::system().lock();

    if size == 0 {
        if let Err(e) = system.deallocate(kind, addr) {
            handle_region_error(&e);
        }
        return std::ptr::null_mut();
    }

    let Some(current_size) = system.current_size(kind, addr) else {
        handle_region_error(&BigmaacError::UnknownPointer { region: region_label(kind), addr });
        return std::ptr::null_mut();
    };

    // Pointer stability under shrink: never shrinks, never moves.
    if size <= current_size {
        return addr as *mut c_void;
    }

    // A chunk already owned by a region has size > fry_min by construction, and we're only here
    // because `size > current_size`, so the grown request still classifies into a region;
    // thresholds are read once at init and never change underneath a live process.
    let new_kind = classify(size, state::thresholds())
        .expect("growing an owned chunk cannot classify below the fry threshold");

    match system.allocate(new_kind, size, bigmaac_core::PAGE_SIZE) {
        Ok(allocation) => {
            let new_ptr = allocation.addr as *mut c_void;
            let old_ptr = addr as *const c_void;
            let copy_len = current_size.min(size);

            // Safety: `old_ptr` is the live, still-valid chunk about to be freed below; `new_ptr`
            // is a freshly carved chunk of at least `size` bytes that doesn't overlap it (the two
            // regions never share address ranges with each other or with a chunk still IN_USE).
            unsafe {
                std::ptr::copy_nonoverlapping(old_ptr.cast::<u8>(), new_ptr.cast::<u8>(), copy_len);
            }

            if let Err(e) = system.deallocate(kind, addr) {
                handle_region_error(&e);
            }

            new_ptr
        }
        Err(e) => {
            handle_region_error(&e);
            std::ptr::null_mut()
        }
    }
}

fn realloc_foreign(ptr: *mut c_void, size: usize) -> *mut c_void {
    if size == 0 {
        // Safety: `ptr` is a live block from the underlying allocator (not ours, per `owner`).
        unsafe { realfuncs::real_free(ptr) };
        return std::ptr::null_mut();
    }

    let Some(kind) = classify(size, state::thresholds()) else {
        // Safety: `ptr` and `size` are exactly the caller's own `realloc` arguments.
        return unsafe { realfuncs::real_realloc(ptr, size) };
    };

    let old_usable = realfuncs::real_malloc_usable_size(ptr);

    let allocation = {
        let mut system = state::system().lock();
        system.allocate(kind, size, bigmaac_core::PAGE_SIZE)
    };

    match allocation {
        Ok(allocation) => {
            let new_ptr = allocation.addr as *mut c_void;
            let copy_len = old_usable.min(size);

            // Safety: `ptr` is the live foreign block about to be freed; `new_ptr` is a freshly
            // carved, disjoint chunk of at least `size` bytes.
            unsafe {
                std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), new_ptr.cast::<u8>(), copy_len);
                realfuncs::real_free(ptr);
            }

            new_ptr
        }
        Err(e) => {
            handle_region_error(&e);
            std::ptr::null_mut()
        }
    }
}

fn region_label(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::Fry => "fries",
        RegionKind::Bigmaac => "bigmaacs",
    }
}

/// # Safety
/// `ptr` must be null or a live pointer previously returned by `malloc`/`calloc`/`realloc`/
/// `reallocarray`, not yet freed. `count * size` must not overflow the host's intended buffer.
#[no_mangle]
pub unsafe extern "C" fn reallocarray(ptr: *mut c_void, count: usize, size: usize) -> *mut c_void {
    match count.checked_mul(size) {
        Some(total) => {
            // Safety: delegating to our own `realloc`, which upholds the same contract.
            unsafe { realloc(ptr, total) }
        }
        None => {
            set_enomem();
            std::ptr::null_mut()
        }
    }
}

/// # Safety
/// `ptr` must be null or a pointer previously returned by one of this crate's allocation
/// functions (ours or the underlying allocator's), not yet freed.
#[no_mangle]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }

    state::trigger_init_if_needed();

    if state::current_state() != State::Loaded {
        // Safety: nothing has ever been Loaded, so `ptr` cannot be one of our region pointers.
        unsafe { realfuncs::real_free(ptr) };
        return;
    }

    let addr = ptr as usize;
    let owner = state::system().lock().locate(addr);

    match owner {
        Some(kind) => {
            let mut system = state::system().lock();
            if let Err(e) = system.deallocate(kind, addr) {
                handle_region_error(&e);
            }
        }
        None => {
            // Safety: `locate` found no owning region, so this is the underlying allocator's.
            unsafe { realfuncs::real_free(ptr) };
        }
    }
}
