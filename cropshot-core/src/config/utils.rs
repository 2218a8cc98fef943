//! Environment variable helpers for configuration overrides.
//!
//! Every getter falls back to the supplied default when the variable is unset.
//! Values that fail to parse are logged and ignored.

use std::path::PathBuf;
use std::str::FromStr;

/// Parses `key` from the environment, or returns `default`.
pub fn get_env_parsed<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                log::warn!("Ignoring unparseable value '{}' for {}", val, key);
                default
            }
        },
        Err(_) => default,
    }
}

/// Get a string value from an environment variable or use the default
pub fn get_env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

/// Get a path value from an environment variable or use the default
pub fn get_env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var_os(key).map(PathBuf::from).unwrap_or(default)
}

/// Get a boolean value from an environment variable or use the default.
///
/// Accepts `true`/`1`/`yes` and `false`/`0`/`no`, case-insensitively.
pub fn get_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

pub fn get_env_f64(key: &str, default: f64) -> f64 {
    get_env_parsed(key, default)
}

pub fn get_env_u8(key: &str, default: u8) -> u8 {
    get_env_parsed(key, default)
}

pub fn get_env_u32(key: &str, default: u32) -> u32 {
    get_env_parsed(key, default)
}

pub fn get_env_usize(key: &str, default: usize) -> usize {
    get_env_parsed(key, default)
}
