mod cli;
mod launcher;
mod logging;

use crate::cli::Args;
use crate::logging::init_tracing;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let file_guard = init_tracing(args.log_dir.as_deref())?;
    let code = launcher::run(&args).await?;

    drop(file_guard);
    std::process::exit(code);
}
