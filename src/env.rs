//! Environment variable names read by [`init_from_env`](crate::init::init_from_env).
//!
//! These are purely helpers; configuration types never read the environment
//! themselves.

/// Path of the YAML logging configuration. Defaults to
/// [`CONFIGURATION_FILENAME`](crate::config::CONFIGURATION_FILENAME) in the
/// working directory.
pub const CONTEXTUAL_LOG_CONFIG_ENV: &str = "CONTEXTUAL_LOG_CONFIG";

/// Optional application name stored in the global context at startup.
pub const CONTEXTUAL_LOG_APPLICATION_NAME_ENV: &str = "CONTEXTUAL_LOG_APPLICATION_NAME";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating unset and blank values alike.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
