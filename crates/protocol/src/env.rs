//! Environment variables that connect a spawned build to the collector.

/// `host:port` of the collector, read by the shim in every child process.
pub const REPORT_URL_ENV: &str = "REPORT_URL";

/// Dynamic-linker injection variable pointing at the shim library.
pub const PRELOAD_ENV: &str = "LD_PRELOAD";

/// Overrides the shim location when the launcher looks for it.
pub const PRELOAD_LIB_OVERRIDE_ENV: &str = "INTERCEPT_PRELOAD_LIB";
