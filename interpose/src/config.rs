//! Parses and validates the environment-variable tunables into an immutable [`Config`].
//!
//! Every variable is optional; a missing or unparseable one falls back to its documented
//! default rather than failing init, except for the fry/bigmaac threshold ordering, which is a
//! genuine misconfiguration and fails init outright.

use std::env;
use std::ffi::CString;

use bigmaac_core::BigmaacError;

use crate::diagnostics::Severity;

const DEFAULT_TEMPLATE: &str = "/tmp/bigmaac.XXXXXX";
const DEFAULT_MIN_FRY_SIZE: usize = 16 * 1024;
const DEFAULT_MIN_BIGMAAC_SIZE: usize = 1024 * 1024;
const DEFAULT_SIZE_FRIES: usize = 256 * 1024 * 1024;
const DEFAULT_SIZE_BIGMAAC: usize = 64 * 1024 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub template: CString,
    pub min_fry_size: usize,
    pub min_bigmaac_size: usize,
    pub size_fries: usize,
    pub size_bigmaac: usize,
    pub log_severity: Severity,
}

fn read_usize(name: &str, default: usize) -> usize {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn read_severity(name: &str, default: Severity) -> Severity {
    env::var(name).ok().and_then(|v| Severity::parse(&v)).unwrap_or(default)
}

impl Config {
    /// Read and validate all tunables from the process environment.
    pub fn from_env() -> Result<Self, BigmaacError> {
        let template_str = env::var("BIGMAAC_TEMPLATE").unwrap_or_else(|_| DEFAULT_TEMPLATE.to_string());
        let template = bigmaac_core::backing::validate_template(&template_str)?;

        let min_fry_size = read_usize("BIGMAAC_MIN_FRY_SIZE", DEFAULT_MIN_FRY_SIZE);
        let min_bigmaac_size = read_usize("BIGMAAC_MIN_BIGMAAC_SIZE", DEFAULT_MIN_BIGMAAC_SIZE);
        let size_fries = read_usize("SIZE_FRIES", DEFAULT_SIZE_FRIES);
        let size_bigmaac = read_usize("SIZE_BIGMAAC", DEFAULT_SIZE_BIGMAAC);
        let log_severity = read_severity("BIGMAAC_LOG", Severity::Error);

        if min_bigmaac_size < min_fry_size {
            return Err(BigmaacError::InitFailed(format!(
                "BIGMAAC_MIN_BIGMAAC_SIZE ({min_bigmaac_size}) must be >= BIGMAAC_MIN_FRY_SIZE ({min_fry_size})"
            )));
        }

        Ok(Self { template, min_fry_size, min_bigmaac_size, size_fries, size_bigmaac, log_severity })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "No need to be so rigid in tests")]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "BIGMAAC_TEMPLATE",
            "BIGMAAC_MIN_FRY_SIZE",
            "BIGMAAC_MIN_BIGMAAC_SIZE",
            "SIZE_FRIES",
            "SIZE_BIGMAAC",
            "BIGMAAC_LOG",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = Config::from_env().unwrap();
        assert_eq!(config.min_fry_size, DEFAULT_MIN_FRY_SIZE);
        assert_eq!(config.min_bigmaac_size, DEFAULT_MIN_BIGMAAC_SIZE);
        assert_eq!(config.size_fries, DEFAULT_SIZE_FRIES);
        assert_eq!(config.size_bigmaac, DEFAULT_SIZE_BIGMAAC);
        assert_eq!(config.log_severity, Severity::Error);
    }

    #[test]
    fn fry_min_above_bigmaac_min_is_a_fatal_misconfiguration() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("BIGMAAC_MIN_FRY_SIZE", "2097152");
        env::set_var("BIGMAAC_MIN_BIGMAAC_SIZE", "1048576");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, BigmaacError::InitFailed(_)));

        clear_env();
    }

    #[test]
    fn unparseable_numeric_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("SIZE_FRIES", "not-a-number");

        let config = Config::from_env().unwrap();
        assert_eq!(config.size_fries, DEFAULT_SIZE_FRIES);

        clear_env();
    }
}
