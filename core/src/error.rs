use thiserror::Error;

/// Errors produced by the region allocator.
///
/// Internal to this crate and to `bigmaac`'s orchestration layer — the five `#[no_mangle]` C
/// ABI entry points collapse every variant down to a null return plus `errno`, per the
/// allocator interposition convention.
#[derive(Debug, Error)]
pub enum BigmaacError {
    #[error("bigmaac init failed: {0}")]
    InitFailed(String),

    #[error("{region} region exhausted: no free chunk of at least {requested} bytes")]
    RegionExhausted { region: &'static str, requested: usize },

    #[error("failed to install {size}-byte mapping at {addr:#x}: {source}")]
    MappingFailed {
        addr: usize,
        size: usize,
        #[source]
        source: nix::Error,
    },

    #[error("pointer {addr:#x} is not the start of any chunk in the {region} region")]
    UnknownPointer { region: &'static str, addr: usize },
}
