//! Syntactic classification of compiler command lines.
//!
//! Nothing here touches the filesystem: the same argv always yields the same
//! [`CommandInfo`].

/// Output file assumed when a command line carries no `-o`.
pub const DEFAULT_OUTPUT: &str = "a.out";

/// Flags that mark a command as (also) performing a link step.
pub const LINKER_FLAGS: [&str; 10] = [
    "-static", "-shared", "-s", "-rdynamic", "-l", "-L", "-u", "-z", "-T", "-Xlinker",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    CPreprocessed,
    CxxPreprocessed,
    ObjectiveC,
    ObjectiveCPreprocessed,
    ObjectiveCxx,
    ObjectiveCxxPreprocessed,
    Cxx,
    Assembly,
}

/// Language of a source file judged by its extension, `None` for anything that is not
/// a compiler input.
pub fn source_language(path: &str) -> Option<Language> {
    // Directory tokens such as `include.c/` have an empty last component.
    let name = path.rsplit_once('/').map_or(path, |(_, name)| name);
    let (_, extension) = name.rsplit_once('.')?;
    let language = match extension {
        "c" => Language::C,
        "i" => Language::CPreprocessed,
        "ii" => Language::CxxPreprocessed,
        "m" => Language::ObjectiveC,
        "mi" => Language::ObjectiveCPreprocessed,
        "mm" => Language::ObjectiveCxx,
        "mii" => Language::ObjectiveCxxPreprocessed,
        "C" | "cc" | "CC" | "cp" | "cpp" | "cxx" | "c++" | "C++" | "txx" => Language::Cxx,
        "s" | "S" | "sx" | "asm" => Language::Assembly,
        _ => return None,
    };
    Some(language)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub input_files: Vec<String>,
    pub output_file: String,
    pub is_linker_command: bool,
}

impl Default for CommandInfo {
    fn default() -> Self {
        Self {
            input_files: Vec::new(),
            output_file: DEFAULT_OUTPUT.to_string(),
            is_linker_command: false,
        }
    }
}

/// Classifies an already split argv, left to right.
///
/// The value after `-o` is the output and never an input. Non-flag tokens with a
/// source extension are inputs in order of appearance. Linker flags only set
/// `is_linker_command`; tokens following them are still inspected.
pub fn classify<S: AsRef<str>>(argv: &[S]) -> CommandInfo {
    let mut info = CommandInfo::default();
    let mut output_follows = false;

    for arg in argv.iter().map(AsRef::as_ref) {
        if output_follows {
            output_follows = false;
            info.output_file = arg.to_string();
            continue;
        }
        if arg == "-o" {
            output_follows = true;
            continue;
        }
        if LINKER_FLAGS.contains(&arg) {
            info.is_linker_command = true;
            continue;
        }
        if !arg.starts_with('-') && source_language(arg).is_some() {
            info.input_files.push(arg.to_string());
        }
    }

    info
}

/// Best-effort classification of a raw command string.
///
/// Shell quoting is honoured when the line parses; otherwise it falls back to splitting
/// on whitespace, which breaks paths containing spaces.
pub fn classify_command_line(line: &str) -> CommandInfo {
    match shell_words::split(line) {
        Ok(argv) => classify(&argv),
        Err(_) => {
            let argv: Vec<&str> = line.split_whitespace().collect();
            classify(&argv)
        }
    }
}
