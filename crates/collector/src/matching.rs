use crate::error::ConfigError;
use protocol::{InterceptSettings, MatchingRule};
use regex::Regex;
use std::path::Path;

/// Preset name accepted in place of a pattern for C compilers.
pub const DEFAULT_CC: &str = "DEFAULT_CC";
/// Preset name accepted in place of a pattern for C++ compilers.
pub const DEFAULT_CXX: &str = "DEFAULT_CXX";

/// gcc/mcc and clang, optionally cross-prefixed (`arm-none-eabi-gcc`) and versioned
/// (`gcc-9`, `clang-6.0`), plus `cc`, `icc`, `xlc` and `gxlc`.
pub const DEFAULT_CC_PATTERN: &str = concat!(
    r"^([^-]*-)*[mg]cc(-\d+(\.\d+){0,2})?$|",
    r"^([^-]*-)*clang(-\d+(\.\d+){0,2})?$|",
    r"^i?cc$|^g?xlc$",
);

/// The C++ counterparts of [`DEFAULT_CC_PATTERN`].
pub const DEFAULT_CXX_PATTERN: &str = concat!(
    r"^([^-]*-)*[cmg]\+\+(-\d+(\.\d+){0,2})?$|",
    r"^([^-]*-)*clang\+\+(-\d+(\.\d+){0,2})?$|",
    r"^icpc$|^g?xl(C|c\+\+)$",
);

/// Maps a preset name to its pattern; anything else is taken as a literal regex.
pub fn expand_preset(pattern: &str) -> &str {
    match pattern {
        DEFAULT_CC => DEFAULT_CC_PATTERN,
        DEFAULT_CXX => DEFAULT_CXX_PATTERN,
        other => other,
    }
}

/// Command and argv after a policy was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub command: String,
    pub arguments: Vec<String>,
}

/// A [`MatchingRule`] with its pattern compiled for full-string matching.
#[derive(Debug, Clone)]
pub struct MatchingPolicy {
    pattern: Regex,
    rule: MatchingRule,
}

impl MatchingPolicy {
    pub fn compile(rule: &MatchingRule) -> Result<Self, ConfigError> {
        let source = expand_preset(&rule.match_command);
        let pattern = Regex::new(&format!("^(?:{source})$")).map_err(|source| {
            ConfigError::InvalidPattern {
                pattern: rule.match_command.clone(),
                source,
            }
        })?;
        Ok(Self {
            pattern,
            rule: rule.clone(),
        })
    }

    pub fn rule(&self) -> &MatchingRule {
        &self.rule
    }

    /// Tests the base name of `executable` against the pattern.
    pub fn matches(&self, executable: &str) -> bool {
        self.pattern.is_match(basename(executable))
    }

    /// Rewrites `command`/`argv` (argv includes argv[0]). Added arguments go after the
    /// existing ones; removal then drops every exact occurrence past argv[0].
    pub fn apply(&self, command: &str, argv: &[String]) -> Rewrite {
        let replace = self.rule.replace_command.as_str();
        let mut arguments = argv.to_vec();
        let command = if replace.is_empty() {
            command.to_string()
        } else {
            let program = basename(replace).to_string();
            match arguments.first_mut() {
                Some(first) => *first = program,
                None => arguments.push(program),
            }
            replace.to_string()
        };

        arguments.extend(self.rule.add_arguments.iter().cloned());
        if !self.rule.remove_arguments.is_empty() && arguments.len() > 1 {
            let tail = arguments.split_off(1);
            arguments.extend(
                tail.into_iter()
                    .filter(|arg| !self.rule.remove_arguments.contains(arg)),
            );
        }

        Rewrite { command, arguments }
    }
}

/// Ordered policies; the first one matching an executable wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    policies: Vec<MatchingPolicy>,
}

impl RuleSet {
    pub fn compile(settings: &InterceptSettings) -> Result<Self, ConfigError> {
        let policies = settings
            .matching_rules
            .iter()
            .map(MatchingPolicy::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[MatchingPolicy] {
        &self.policies
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn resolve(&self, executable: &str) -> Option<&MatchingPolicy> {
        resolve(executable, &self.policies)
    }

    /// Returns `None` when no policy matches and the command passes through untouched.
    pub fn rewrite(&self, command: &str, argv: &[String]) -> Option<Rewrite> {
        let policy = self.resolve(command)?;
        Some(policy.apply(command, argv))
    }
}

pub fn resolve<'a>(executable: &str, policies: &'a [MatchingPolicy]) -> Option<&'a MatchingPolicy> {
    policies.iter().find(|policy| policy.matches(executable))
}

fn basename(command: &str) -> &str {
    Path::new(command)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(command)
}
