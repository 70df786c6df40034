use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "intercept",
    version,
    about = "Run a build with compiler interception and record a compilation database"
)]
pub(crate) struct Args {
    /// Fuzzer profile from the config file.
    #[arg(long, default_value = "default")]
    pub(crate) fuzzer: String,
    /// Sanitizer of the selected profile.
    #[arg(long)]
    pub(crate) sanitizer: Option<String>,
    /// Compiler pattern (regex or DEFAULT_CC/DEFAULT_CXX) used instead of the profile's.
    #[arg(long)]
    pub(crate) match_compiler: Option<String>,
    #[arg(long, default_value_t = false)]
    pub(crate) create_compiler_database: bool,
    #[arg(long, default_value = "config/fuzzers.toml")]
    pub(crate) config: PathBuf,
    /// Shim library injected into the build.
    #[arg(long)]
    pub(crate) preload_lib: Option<PathBuf>,
    /// Working directory of the build; defaults to the current directory.
    #[arg(long)]
    pub(crate) directory: Option<PathBuf>,
    #[arg(long)]
    pub(crate) log_dir: Option<PathBuf>,
    #[arg(last = true, required = true, num_args = 1..)]
    pub(crate) command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_command_after_separator() {
        let args = Args::try_parse_from([
            "intercept",
            "--fuzzer",
            "libfuzzer",
            "--create-compiler-database",
            "--",
            "make",
            "-j8",
            "--keep-going",
        ])
        .expect("args");
        assert_eq!(args.fuzzer, "libfuzzer");
        assert!(args.create_compiler_database);
        assert_eq!(args.command, vec!["make", "-j8", "--keep-going"]);
        assert_eq!(args.config, PathBuf::from("config/fuzzers.toml"));
    }

    #[test]
    fn build_command_is_required() {
        assert!(Args::try_parse_from(["intercept", "--fuzzer", "afl"]).is_err());
        assert!(Args::try_parse_from(["intercept", "make"]).is_err());
    }
}
