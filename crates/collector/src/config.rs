use crate::error::ConfigError;
use crate::matching::{expand_preset, RuleSet};
use protocol::{InterceptSettings, MatchingRule};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Fuzzer profiles keyed by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuzzerConfig {
    #[serde(default)]
    pub fuzzers: BTreeMap<String, FuzzerProfile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuzzerProfile {
    /// Rewrite rules in priority order.
    #[serde(default)]
    pub toolchain: Vec<ToolchainEntry>,
    #[serde(default)]
    pub sanitizers: BTreeMap<String, SanitizerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainEntry {
    #[serde(default)]
    pub name: Option<String>,
    /// Preset name (`DEFAULT_CC`, `DEFAULT_CXX`) or a regular expression.
    #[serde(rename = "match")]
    pub match_command: String,
    /// Empty keeps the original compiler.
    #[serde(rename = "replace")]
    pub replace_command: String,
    #[serde(default)]
    pub add_arguments: Vec<String>,
    #[serde(default)]
    pub remove_arguments: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizerConfig {
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub set_env: Vec<String>,
    #[serde(default)]
    pub unset_env: Vec<String>,
}

/// Which profile to build settings from, with optional refinements.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileSelection<'a> {
    pub fuzzer: &'a str,
    pub sanitizer: Option<&'a str>,
    /// Replaces the match pattern of every toolchain entry.
    pub match_override: Option<&'a str>,
}

/// Environment changes for the build process implied by a sanitizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvAdjustments {
    /// Variables set to `1`.
    pub set: Vec<String>,
    pub unset: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub settings: InterceptSettings,
    pub env: EnvAdjustments,
}

impl FuzzerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_with_origin(&raw, &path.display().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Self::parse_with_origin(raw, "<inline>")
    }

    fn parse_with_origin(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }

    pub fn profile(&self, fuzzer: &str) -> Result<&FuzzerProfile, ConfigError> {
        self.fuzzers
            .get(fuzzer)
            .ok_or_else(|| ConfigError::ProfileNotFound(fuzzer.to_string()))
    }

    /// Settings for `fuzzer` without sanitizer or overrides.
    pub fn intercept_settings(&self, fuzzer: &str) -> Result<InterceptSettings, ConfigError> {
        self.session(&ProfileSelection {
            fuzzer,
            ..Default::default()
        })
        .map(|session| session.settings)
    }

    /// Builds the settings served for one build session. Presets are expanded and every
    /// pattern is compiled here, so a broken profile never reaches the collector.
    pub fn session(&self, selection: &ProfileSelection<'_>) -> Result<SessionSettings, ConfigError> {
        let profile = self.profile(selection.fuzzer)?;
        let sanitizer = match selection.sanitizer {
            Some(name) => Some(profile.sanitizers.get(name).ok_or_else(|| {
                ConfigError::SanitizerNotFound {
                    profile: selection.fuzzer.to_string(),
                    sanitizer: name.to_string(),
                }
            })?),
            None => None,
        };

        let matching_rules = profile
            .toolchain
            .iter()
            .map(|entry| {
                let pattern = selection
                    .match_override
                    .unwrap_or(entry.match_command.as_str());
                let mut add_arguments = entry.add_arguments.clone();
                if let Some(sanitizer) = sanitizer {
                    add_arguments.extend(sanitizer.flags.iter().cloned());
                }
                MatchingRule {
                    match_command: expand_preset(pattern).to_string(),
                    replace_command: entry.replace_command.clone(),
                    add_arguments,
                    remove_arguments: entry.remove_arguments.clone(),
                }
            })
            .collect();
        let settings = InterceptSettings { matching_rules };
        RuleSet::compile(&settings)?;

        let env = sanitizer
            .map(|sanitizer| EnvAdjustments {
                set: sanitizer.set_env.clone(),
                unset: sanitizer.unset_env.clone(),
            })
            .unwrap_or_default();
        Ok(SessionSettings { settings, env })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{DEFAULT_CC_PATTERN, DEFAULT_CXX_PATTERN};
    use std::io::Write;

    const TEST_CONFIG: &str = r#"
[fuzzers.default]

[fuzzers.my-fuzzer]
[[fuzzers.my-fuzzer.toolchain]]
name = "cc"
match = "DEFAULT_CC"
replace = "my-cc-fuzzer"
add_arguments = ["-g", "-O0"]
remove_arguments = ["-O2", "-O3"]

[[fuzzers.my-fuzzer.toolchain]]
name = "cxx"
match = "DEFAULT_CXX"
replace = "my-c++-fuzzer"
add_arguments = ["-g", "-O0"]
remove_arguments = ["-O2", "-O3"]

[fuzzers.my-fuzzer.sanitizers.address]
flags = ["-fsanitize=address"]
set_env = ["USE_ASAN"]
unset_env = ["USE_MSAN"]
"#;

    fn config() -> FuzzerConfig {
        FuzzerConfig::parse(TEST_CONFIG).expect("config")
    }

    #[test]
    fn unknown_profile_is_reported() {
        let err = config().intercept_settings("nonexisting_fuzzer").unwrap_err();
        assert!(matches!(err, ConfigError::ProfileNotFound(ref name) if name == "nonexisting_fuzzer"));
    }

    #[test]
    fn profile_rules_keep_file_order_and_expand_presets() {
        let settings = config().intercept_settings("my-fuzzer").expect("settings");
        assert_eq!(settings.matching_rules.len(), 2);

        let cc = &settings.matching_rules[0];
        assert_eq!(cc.replace_command, "my-cc-fuzzer");
        assert_eq!(cc.match_command, DEFAULT_CC_PATTERN);
        assert_eq!(cc.add_arguments, vec!["-g", "-O0"]);
        assert_eq!(cc.remove_arguments, vec!["-O2", "-O3"]);

        let cxx = &settings.matching_rules[1];
        assert_eq!(cxx.replace_command, "my-c++-fuzzer");
        assert_eq!(cxx.match_command, DEFAULT_CXX_PATTERN);

        let rules = RuleSet::compile(&settings).expect("rules");
        let pick = |name: &str| rules.resolve(name).map(|p| p.rule().replace_command.clone());
        assert_eq!(pick("gcc").as_deref(), Some("my-cc-fuzzer"));
        assert_eq!(pick("clang-6.0").as_deref(), Some("my-cc-fuzzer"));
        assert_eq!(pick("g++").as_deref(), Some("my-c++-fuzzer"));
        assert_eq!(pick("clang++").as_deref(), Some("my-c++-fuzzer"));
    }

    #[test]
    fn empty_profile_is_passthrough() {
        let settings = config().intercept_settings("default").expect("settings");
        assert!(settings.matching_rules.is_empty());
    }

    #[test]
    fn sanitizer_flags_and_env_are_applied() {
        let session = config()
            .session(&ProfileSelection {
                fuzzer: "my-fuzzer",
                sanitizer: Some("address"),
                match_override: None,
            })
            .expect("session");
        for rule in &session.settings.matching_rules {
            assert_eq!(rule.add_arguments, vec!["-g", "-O0", "-fsanitize=address"]);
        }
        assert_eq!(session.env.set, vec!["USE_ASAN"]);
        assert_eq!(session.env.unset, vec!["USE_MSAN"]);
    }

    #[test]
    fn unknown_sanitizer_is_reported() {
        let err = config()
            .session(&ProfileSelection {
                fuzzer: "my-fuzzer",
                sanitizer: Some("thread"),
                match_override: None,
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::SanitizerNotFound { .. }));
    }

    #[test]
    fn match_override_replaces_every_pattern() {
        let session = config()
            .session(&ProfileSelection {
                fuzzer: "my-fuzzer",
                sanitizer: None,
                match_override: Some("my-gcc"),
            })
            .expect("session");
        assert!(session
            .settings
            .matching_rules
            .iter()
            .all(|rule| rule.match_command == "my-gcc"));
    }

    #[test]
    fn invalid_pattern_fails_at_load() {
        let raw = r#"
[[fuzzers.broken.toolchain]]
match = "gcc("
replace = "clang"
"#;
        let err = FuzzerConfig::parse(raw)
            .expect("parse")
            .intercept_settings("broken")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let raw = r#"
[[fuzzers.broken.toolchain]]
match = "DEFAULT_CC"
"#;
        assert!(matches!(FuzzerConfig::parse(raw), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn unknown_key_is_a_parse_error() {
        let raw = r#"
[[fuzzers.broken.toolchain]]
match = "DEFAULT_CC"
replace = "clang"
add_argument = ["-g"]
"#;
        assert!(matches!(FuzzerConfig::parse(raw), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_reads_file_and_reports_missing_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(TEST_CONFIG.as_bytes()).expect("write");
        let loaded = FuzzerConfig::load(file.path()).expect("load");
        assert!(loaded.fuzzers.contains_key("my-fuzzer"));

        let err = FuzzerConfig::load("/nonexistent/fuzzers.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/fuzzers.toml");
        let config = FuzzerConfig::load(path).expect("shipped config");
        for (name, profile) in &config.fuzzers {
            config.intercept_settings(name).expect("profile settings");
            for sanitizer in profile.sanitizers.keys() {
                config
                    .session(&ProfileSelection {
                        fuzzer: name,
                        sanitizer: Some(sanitizer),
                        match_override: None,
                    })
                    .expect("sanitizer settings");
            }
        }
        assert!(config.fuzzers.contains_key("default"));
        assert!(config.fuzzers.contains_key("libfuzzer"));
    }
}
