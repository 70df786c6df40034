use std::path::PathBuf;

/// Configuration failures. All of them are fatal and reported before the collector
/// starts listening.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("fuzzer profile {0:?} not found")]
    ProfileNotFound(String),
    #[error("sanitizer {sanitizer:?} not found in fuzzer profile {profile:?}")]
    SanitizerNotFound { profile: String, sanitizer: String },
    #[error("invalid match pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
