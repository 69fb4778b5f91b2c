//! Build and API version strings.

/// Version of this binary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version prefix of every HTTP route.
pub const API_VERSION: &str = "0.1.0";

/// The line printed by `--version`.
pub fn version_line() -> String {
    format!("App version {VERSION}, API version {API_VERSION}")
}
