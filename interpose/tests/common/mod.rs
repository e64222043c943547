//! Shared harness for the integration tests below.
//!
//! Each test binary gets its own process, so the interposer's process-wide init only ever runs
//! once per binary; `with_config` sets the environment *before* that first run, which is the
//! only point at which it has any effect (see `bigmaac::state`).

use std::env;

pub fn with_config(vars: &[(&str, &str)]) {
    for (name, value) in vars {
        env::set_var(name, value);
    }
}
