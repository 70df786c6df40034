//! Collector side of compiler interception: rewrite policies, the report service the
//! shim talks to, and the compilation database assembled from what it reports.

pub mod assembler;
pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod matching;
pub mod queue;
pub mod service;

pub use assembler::{assemble, CompilationDatabaseEntry, COMPILATION_DATABASE_FILE};
pub use classifier::{classify, classify_command_line, CommandInfo};
pub use client::CollectorClient;
pub use config::{FuzzerConfig, ProfileSelection, SessionSettings};
pub use error::ConfigError;
pub use matching::{MatchingPolicy, Rewrite, RuleSet};
pub use queue::{CommandQueue, QueueItem};
pub use service::CollectorServer;
