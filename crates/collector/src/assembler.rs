use crate::classifier::classify;
use crate::queue::{CommandQueue, QueueItem};
use anyhow::Context;
use protocol::InterceptedCommand;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

pub const COMPILATION_DATABASE_FILE: &str = "compile_commands.json";

/// One `compile_commands.json` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompilationDatabaseEntry {
    pub arguments: Vec<String>,
    pub directory: String,
    pub output: String,
    pub file: String,
}

impl CompilationDatabaseEntry {
    /// One entry per input file of the executed command line; none for commands
    /// without source inputs, such as pure link steps.
    pub fn from_command(command: &InterceptedCommand) -> Vec<Self> {
        let arguments = command.executed_argv();
        let info = classify(&arguments);
        info.input_files
            .into_iter()
            .map(|file| Self {
                arguments: arguments.clone(),
                directory: command.directory.clone(),
                output: info.output_file.clone(),
                file,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblySummary {
    pub commands: usize,
    pub entries: usize,
}

/// Drains `queue` into `sink` as a JSON array until the end sentinel.
///
/// Entries are written as they are dequeued. The closing bracket is only written
/// once the sentinel was seen.
pub async fn assemble<W>(queue: &CommandQueue, sink: &mut W) -> anyhow::Result<AssemblySummary>
where
    W: AsyncWrite + Unpin,
{
    let mut summary = AssemblySummary::default();
    sink.write_all(b"[\n")
        .await
        .context("failed to open compilation database array")?;

    loop {
        let command = match queue.pop().await {
            QueueItem::Command(command) => command,
            QueueItem::End => break,
        };
        summary.commands += 1;
        for entry in CompilationDatabaseEntry::from_command(&command) {
            if summary.entries > 0 {
                sink.write_all(b",\n").await?;
            }
            let payload = serde_json::to_vec(&entry)?;
            sink.write_all(&payload)
                .await
                .context("failed to write compilation database entry")?;
            summary.entries += 1;
            tracing::debug!(event = "compdb.entry.written", file = %entry.file, output = %entry.output);
        }
    }

    sink.write_all(b"\n]\n")
        .await
        .context("failed to close compilation database array")?;
    sink.flush().await?;
    Ok(summary)
}

/// Creates `path` and runs [`assemble`] into it.
pub async fn write_compilation_database(
    queue: &CommandQueue,
    path: &Path,
) -> anyhow::Result<AssemblySummary> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let summary = assemble(queue, &mut writer).await?;
    writer.into_inner().sync_all().await?;
    tracing::info!(
        event = "compdb.written",
        path = %path.display(),
        commands = summary.commands,
        entries = summary.entries,
    );
    Ok(summary)
}
