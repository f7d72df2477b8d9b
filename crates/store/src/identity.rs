//! Host and user stamped on history entries.

use std::fs;

const UNKNOWN: &str = "unknown";

/// Name of the machine running the monitor.
pub fn hostname() -> String {
    non_empty_env("HOSTNAME")
        .or_else(|| {
            fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Login name of the user running the monitor.
pub fn username() -> String {
    non_empty_env("USER")
        .or_else(|| non_empty_env("USERNAME"))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
