//! Process-wide init state machine and the single global lock guarding both regions.
//!
//! `NOT_LOADED → LOADING_MEM_FUNCS → LOADING_LIBRARY → LOADED` (or `→ LIBRARY_FAIL`). Exactly one
//! thread drives this transition, triggered by whichever thread's entry point call observes
//! `NOT_LOADED` first; every other thread sees a non-`NOT_LOADED` state and takes the bypass path
//! its caller already expects, without blocking on the thread doing the work.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;

use bigmaac_core::System;

use crate::config::Config;
use crate::{bigmaac_error, bigmaac_info, realfuncs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    NotLoaded = 0,
    LoadingMemFuncs = 1,
    LoadingLibrary = 2,
    Loaded = 3,
    LibraryFail = 4,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotLoaded,
            1 => Self::LoadingMemFuncs,
            2 => Self::LoadingLibrary,
            3 => Self::Loaded,
            _ => Self::LibraryFail,
        }
    }
}

static STATE: AtomicU8 = AtomicU8::new(State::NotLoaded as u8);
static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();
static THRESHOLDS: OnceLock<Thresholds> = OnceLock::new();

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub min_fry_size: usize,
    pub min_bigmaac_size: usize,
}

pub fn current_state() -> State {
    State::from_u8(STATE.load(Ordering::Acquire))
}

/// The routed-allocation thresholds, valid once `current_state() == State::Loaded`.
pub fn thresholds() -> Thresholds {
    *THRESHOLDS.get().unwrap_or(&Thresholds { min_fry_size: usize::MAX, min_bigmaac_size: usize::MAX })
}

/// The lock guarding both regions, valid once `current_state() == State::Loaded`.
pub fn system() -> &'static Mutex<System> {
    SYSTEM.get().expect("system() called before State::Loaded was observed")
}

/// If this is the first call to reach `NOT_LOADED`, drive the whole bootstrap to completion (or
/// failure) on this thread. Every other thread returns immediately without blocking.
pub fn trigger_init_if_needed() {
    if STATE
        .compare_exchange(State::NotLoaded as u8, State::LoadingMemFuncs as u8, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        run_init();
    }
}

fn run_init() {
    if let Err(msg) = realfuncs::resolve_all() {
        bigmaac_error!("failed to resolve real allocator symbols: {msg}");
        STATE.store(State::LibraryFail as u8, Ordering::Release);
        return;
    }

    STATE.store(State::LoadingLibrary as u8, Ordering::Release);

    match Config::from_env() {
        Ok(config) => {
            crate::diagnostics::set_min_severity(config.log_severity);
            let Config { template, min_fry_size, min_bigmaac_size, size_fries, size_bigmaac, .. } = config;

            match System::new(size_fries, size_bigmaac, template) {
                Ok(system) => {
                    let _ = THRESHOLDS.set(Thresholds { min_fry_size, min_bigmaac_size });
                    let _ = SYSTEM.set(Mutex::new(system));
                    bigmaac_info!(
                        "initialized: fries={size_fries} bytes, bigmaacs={size_bigmaac} bytes, fry_min={min_fry_size}, bigmaac_min={min_bigmaac_size}"
                    );
                    STATE.store(State::Loaded as u8, Ordering::Release);
                }
                Err(e) => {
                    bigmaac_error!("failed to reserve regions: {e}");
                    STATE.store(State::LibraryFail as u8, Ordering::Release);
                }
            }
        }
        Err(e) => {
            bigmaac_error!("config error: {e}");
            STATE.store(State::LibraryFail as u8, Ordering::Release);
        }
    }
}
