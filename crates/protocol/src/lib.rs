use serde::{Deserialize, Serialize};

pub mod env;
pub mod framing;

/// One rewrite policy as it travels over the wire.
///
/// `match_command` is a regular expression that must fully match the base name of the
/// executable. An empty `replace_command` keeps the original executable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchingRule {
    pub match_command: String,
    #[serde(default)]
    pub replace_command: String,
    #[serde(default)]
    pub add_arguments: Vec<String>,
    #[serde(default)]
    pub remove_arguments: Vec<String>,
}

/// Everything a shim needs to rewrite compiler calls during one build session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterceptSettings {
    #[serde(default)]
    pub matching_rules: Vec<MatchingRule>,
}

/// A process execution observed (and possibly rewritten) by the shim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterceptedCommand {
    pub original_command: String,
    #[serde(default)]
    pub original_arguments: Vec<String>,
    pub replaced_command: String,
    #[serde(default)]
    pub replaced_arguments: Vec<String>,
    #[serde(default)]
    pub directory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl InterceptedCommand {
    /// Command line as it was actually executed: the replaced executable followed by the
    /// replaced arguments without their argv[0]. A shim that left `replaced_command` empty
    /// keeps the reported argv[0].
    pub fn executed_argv(&self) -> Vec<String> {
        let program = if self.replaced_command.is_empty() {
            self.replaced_arguments.first().cloned().unwrap_or_default()
        } else {
            self.replaced_command.clone()
        };
        std::iter::once(program)
            .chain(self.replaced_arguments.iter().skip(1).cloned())
            .collect()
    }
}

/// Collector bookkeeping returned for every report call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub received: u64,
    pub processed: u64,
    pub message: String,
}

impl Status {
    /// Builds a status from the total number of appended commands and the number still
    /// waiting in the queue.
    pub fn from_counts(received: u64, pending: u64) -> Self {
        Self {
            received,
            processed: received.saturating_sub(pending),
            message: format!("{pending} commands received"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorRequest {
    GetInterceptSettings,
    /// A single call carries one or more commands; they are queued contiguously.
    ReportInterceptedCommand { commands: Vec<InterceptedCommand> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollectorResponse {
    InterceptSettings { settings: InterceptSettings },
    Status { status: Status },
    Error { message: String },
}

impl CollectorResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
