//! Creates the file-backed (and anonymous placeholder) mappings that give a region's chunks
//! their actual storage.
//!
//! Every function here assumes the caller already holds the region lock: mapping installation is
//! deliberately performed *with the global mutex held* so that "every IN_USE bigmaac chunk is
//! backed" holds at every unlock.

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr;

use nix::unistd;

use crate::error::BigmaacError;

fn mapping_failed(addr: usize, size: usize, source: nix::Error) -> BigmaacError {
    BigmaacError::MappingFailed { addr, size, source }
}

/// Reserve `size` bytes of anonymous, `PROT_NONE`, private address space at the kernel's choice
/// of base address. Used once at startup to claim the contiguous range both regions carve from.
pub fn reserve_address_range(size: usize) -> Result<usize, BigmaacError> {
    // Safety: no fixed address requested, no fd involved; a `PROT_NONE` anonymous mapping cannot
    // be observed by any other code until a later call replaces part of it.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return Err(mapping_failed(0, size, nix::Error::last()));
    }

    Ok(ptr as usize)
}

/// Create an unlinked temp file from `template`, size it to `size` bytes, and map it at the
/// fixed address `addr`, replacing whatever was mapped there before.
///
/// `template` must end in six `X` characters, per `mkstemp(3)`.
pub fn install_mapping(addr: usize, size: usize, template: &CString) -> Result<(), BigmaacError> {
    let (fd, path): (RawFd, _) =
        unistd::mkstemp(template.as_c_str()).map_err(|e| mapping_failed(addr, size, e))?;

    // Unlinked immediately: the file exists only via `fd` from here on, reclaimed by the kernel
    // once the last reference (the mapping we're about to create) goes away.
    let _ = unistd::unlink(path.as_path());

    let result = (|| -> Result<(), BigmaacError> {
        unistd::ftruncate(fd, size as i64).map_err(|e| mapping_failed(addr, size, e))?;

        // Safety: `addr` lies within our own reservation (caller's invariant) and `fd` is a
        // valid, just-truncated regular file descriptor. `MAP_FIXED` atomically replaces
        // whatever mapping previously occupied `[addr, addr + size)`.
        let mapped = unsafe {
            libc::mmap(
                addr as *mut libc::c_void,
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd,
                0,
            )
        };

        if mapped == libc::MAP_FAILED {
            return Err(mapping_failed(addr, size, nix::Error::last()));
        }

        Ok(())
    })();

    // The mapping retains the file; the descriptor itself is no longer needed either way.
    let _ = unistd::close(fd);

    result
}

/// Replace the mapping at `[addr, addr + size)` with an anonymous `PROT_NONE` placeholder,
/// releasing the backing file's pages back to the kernel. Used when a bigmaac chunk is freed.
pub fn release_mapping(addr: usize, size: usize) -> Result<(), BigmaacError> {
    // Safety: `addr` was previously handed out by `install_mapping` within our own reservation.
    let mapped = unsafe {
        libc::mmap(
            addr as *mut libc::c_void,
            size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED,
            -1,
            0,
        )
    };

    if mapped == libc::MAP_FAILED {
        return Err(mapping_failed(addr, size, nix::Error::last()));
    }

    Ok(())
}

/// Build a `CString` mkstemp template from a configured path, validating the trailing `XXXXXX`
/// placeholder `mkstemp` requires.
pub fn validate_template(template: &str) -> Result<CString, BigmaacError> {
    if !template.ends_with("XXXXXX") {
        return Err(BigmaacError::InitFailed(format!(
            "backing-file template {template:?} must end in six 'X' placeholder characters"
        )));
    }

    CString::new(template).map_err(|_| BigmaacError::InitFailed(format!("backing-file template {template:?} contains a NUL byte")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "No need to be so rigid in tests")]
mod tests {
    use super::*;

    #[test]
    fn template_must_end_in_six_xs() {
        assert!(validate_template("/tmp/bigmaac.XXXXXX").is_ok());
        assert!(validate_template("/tmp/bigmaacXXX").is_err());
        assert!(validate_template("/tmp/bigmaac").is_err());
    }

    #[test]
    fn reserve_and_install_roundtrip() {
        let size = 4096 * 4;
        let base = reserve_address_range(size).expect("reservation should succeed");

        let template = validate_template("/tmp/bigmaac-test.XXXXXX").unwrap();
        install_mapping(base, 4096, &template).expect("install should succeed");

        // Page is now a real, writable file-backed mapping.
        let byte_ptr = base as *mut u8;
        // Safety: `byte_ptr` points at the start of the page just mapped above.
        unsafe {
            *byte_ptr = 0xAB;
        }
        // Safety: same page, still mapped.
        unsafe {
            assert_eq!(*byte_ptr, 0xAB);
        }

        release_mapping(base, 4096).expect("release should succeed");

        // Safety: `base` is our own reservation of exactly `size` bytes, unmapped once here.
        unsafe {
            libc::munmap(base as *mut libc::c_void, size);
        }
    }
}
