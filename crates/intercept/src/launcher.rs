use crate::cli::Args;
use anyhow::Context;
use collector::assembler::{write_compilation_database, AssemblySummary};
use collector::config::EnvAdjustments;
use collector::{CollectorServer, CommandQueue, FuzzerConfig, ProfileSelection, COMPILATION_DATABASE_FILE};
use protocol::env::{PRELOAD_ENV, PRELOAD_LIB_OVERRIDE_ENV, REPORT_URL_ENV};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Exit code when the shim library cannot be found.
pub(crate) const MISSING_PRELOAD_EXIT_CODE: i32 = -1;
/// Exit code reported for a build that ended without one (killed by a signal).
const NO_EXIT_CODE: i32 = -1;
const PRELOAD_LIB_NAME: &str = "libintercept_preload.so";
const COLLECTOR_BIND_ADDR: &str = "127.0.0.1:0";

/// Pushes the end sentinel when dropped, so the database is closed on every path.
struct EndOfBuild {
    queue: Arc<CommandQueue>,
}

impl EndOfBuild {
    fn new(queue: Arc<CommandQueue>) -> Self {
        Self { queue }
    }
}

impl Drop for EndOfBuild {
    fn drop(&mut self) {
        if self.queue.push_end() {
            tracing::debug!(event = "build.end_sentinel", pending = self.queue.pending());
        }
    }
}

/// Runs the whole session and returns the process exit code.
pub(crate) async fn run(args: &Args) -> anyhow::Result<i32> {
    let config = FuzzerConfig::load(&args.config)?;
    let session = config.session(&ProfileSelection {
        fuzzer: &args.fuzzer,
        sanitizer: args.sanitizer.as_deref(),
        match_override: args.match_compiler.as_deref(),
    })?;

    let Some(preload_lib) = locate_preload_lib(args.preload_lib.as_deref()) else {
        tracing::error!(
            event = "build.preload_missing",
            name = PRELOAD_LIB_NAME,
            "shim library not found; set --preload-lib or {PRELOAD_LIB_OVERRIDE_ENV}"
        );
        return Ok(MISSING_PRELOAD_EXIT_CODE);
    };

    let directory = match &args.directory {
        Some(directory) => directory.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    let collector = CollectorServer::start(COLLECTOR_BIND_ADDR, session.settings).await?;
    let queue = collector.queue();

    let assembler = args
        .create_compiler_database
        .then(|| spawn_assembler(Arc::clone(&queue), directory.join(COMPILATION_DATABASE_FILE)));

    let build = {
        let _end_of_build = EndOfBuild::new(Arc::clone(&queue));
        let env = BuildEnv {
            preload_lib: &preload_lib,
            report_url: collector.report_url(),
            adjustments: &session.env,
        };
        run_build(&args.command, &directory, &env).await
    };

    if let Some(assembler) = assembler {
        finish_assembler(assembler).await;
    }
    collector.stop();

    Ok(exit_code(build?))
}

/// A failed database does not replace the build's own exit code.
async fn finish_assembler(assembler: JoinHandle<anyhow::Result<AssemblySummary>>) {
    let result = assembler
        .await
        .context("compilation database task failed")
        .and_then(|result| result);
    if let Err(err) = result {
        tracing::error!(
            event = "compdb.failed",
            error = %format!("{err:#}"),
            "compilation database was not written"
        );
    }
}

fn spawn_assembler(queue: Arc<CommandQueue>, path: PathBuf) -> JoinHandle<anyhow::Result<AssemblySummary>> {
    tokio::spawn(async move { write_compilation_database(&queue, &path).await })
}

struct BuildEnv<'a> {
    preload_lib: &'a Path,
    report_url: String,
    adjustments: &'a EnvAdjustments,
}

fn build_command(command: &[String], directory: &Path, env: &BuildEnv<'_>) -> anyhow::Result<Command> {
    let (program, args) = command.split_first().context("empty build command")?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(directory)
        .env(PRELOAD_ENV, env.preload_lib)
        .env(REPORT_URL_ENV, &env.report_url);
    for name in &env.adjustments.set {
        cmd.env(name, "1");
    }
    for name in &env.adjustments.unset {
        cmd.env_remove(name);
    }
    Ok(cmd)
}

async fn run_build(command: &[String], directory: &Path, env: &BuildEnv<'_>) -> anyhow::Result<ExitStatus> {
    let mut cmd = build_command(command, directory, env)?;
    let program = &command[0];

    tracing::info!(
        event = "build.start",
        command = %command.join(" "),
        directory = %directory.display(),
        report_url = %env.report_url,
    );
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn build command {program}"))?;

    let status = tokio::select! {
        status = child.wait() => status.context("failed to wait for build")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(event = "build.interrupted", "interrupted, stopping build");
            let _ = child.kill().await;
            child.wait().await.context("failed to wait for build")?
        }
    };

    let elapsed = whole_millis(started.elapsed());
    tracing::info!(
        event = "build.finished",
        status = %status,
        elapsed = %humantime::format_duration(elapsed),
    );
    Ok(status)
}

/// Returns an absolute path: the build runs in another directory, and the dynamic
/// linker looks up bare names on the library search path.
fn locate_preload_lib(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return existing_file(path);
    }
    if let Some(path) = std::env::var_os(PRELOAD_LIB_OVERRIDE_ENV) {
        return existing_file(Path::new(&path));
    }
    let exe = std::env::current_exe().ok()?;
    existing_file(&exe.parent()?.join(PRELOAD_LIB_NAME))
}

fn existing_file(path: &Path) -> Option<PathBuf> {
    if !path.is_file() {
        return None;
    }
    std::fs::canonicalize(path).ok()
}

fn whole_millis(elapsed: Duration) -> Duration {
    elapsed - Duration::from_nanos(u64::from(elapsed.subsec_nanos() % 1_000_000))
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(NO_EXIT_CODE)
}
