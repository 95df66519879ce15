//! Analyzer settings.
//!
//! One [`AnalyzerConfig`] is built per run and passed by reference to every
//! stage that needs it. Settings come from TOML: the embedded
//! `defaults/analyzer.toml`, or a user file given with `--config`. Keys left
//! out of a user file take their built-in defaults.

use std::fs;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::model::RuleKind;

/// A compiled rule-header pattern. Capture group 1 is the rule name.
#[derive(Debug, Clone)]
pub struct RuleHeaderPattern {
    pub kind: RuleKind,
    pub regex: Regex,
}

/// Result of matching a set-statement against the rule-header patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleHeader<'t> {
    pub kind: RuleKind,
    pub name: &'t str,
    /// Statement text before the header (`set device-group DG1 pre-rulebase`).
    pub prefix: &'t str,
    /// Statement text after the rule name.
    pub rest: &'t str,
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub progress_every: usize,
    pub chunk_lines: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub timeout: Option<Duration>,
    pub rule_headers: Vec<RuleHeaderPattern>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default = "default_progress_every")]
    progress_every: usize,
    #[serde(default = "default_chunk_lines")]
    chunk_lines: usize,
    #[serde(default = "default_cache_ttl_secs")]
    cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    cache_capacity: usize,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default = "fallback_rule_patterns")]
    rule_pattern: Vec<RulePatternEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RulePatternEntry {
    kind: RuleKind,
    pattern: String,
}

/// Errors returned when loading analyzer settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid rule pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("invalid config {path}: {reason}")]
    Invalid { path: String, reason: String },
}

impl AnalyzerConfig {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw, path.display().to_string())
    }

    /// Built-in settings.
    pub fn embedded() -> Self {
        let embedded = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/defaults/analyzer.toml"
        ));
        match Self::from_toml(embedded, "embedded config".to_string()) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("embedded config rejected ({err}); using fallback settings");
                Self::fallback()
            }
        }
    }

    /// Parse settings from TOML text; `origin` names the source in errors.
    pub fn from_toml(raw: &str, origin: String) -> Result<Self, ConfigError> {
        let parsed: ConfigFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.clone(),
            source,
        })?;
        Self::from_file(parsed, &origin)
    }

    /// Try each rule-header pattern in order; the first one matching outside
    /// a quoted token (a description, a tag) wins.
    pub fn match_rule_header<'t>(&self, line: &'t str) -> Option<RuleHeader<'t>> {
        let quoted = quoted_spans(line);
        self.rule_headers.iter().find_map(|pattern| {
            let captures = pattern.regex.captures_iter(line).find(|captures| {
                captures
                    .get(0)
                    .is_some_and(|whole| !quoted.iter().any(|span| span.contains(&whole.start())))
            })?;
            let whole = captures.get(0)?;
            let name = captures.get(1)?;
            Some(RuleHeader {
                kind: pattern.kind,
                name: name.as_str(),
                prefix: &line[..whole.start()],
                rest: line[whole.end()..].trim(),
            })
        })
    }

    fn fallback() -> Self {
        let file = ConfigFile {
            progress_every: default_progress_every(),
            chunk_lines: default_chunk_lines(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            timeout_secs: None,
            rule_pattern: fallback_rule_patterns(),
        };
        Self {
            progress_every: file.progress_every,
            chunk_lines: file.chunk_lines,
            cache_ttl: Duration::from_secs(file.cache_ttl_secs),
            cache_capacity: file.cache_capacity,
            timeout: None,
            rule_headers: file
                .rule_pattern
                .iter()
                .filter_map(|entry| {
                    Regex::new(&entry.pattern).ok().map(|regex| RuleHeaderPattern {
                        kind: entry.kind,
                        regex,
                    })
                })
                .collect(),
        }
    }

    fn from_file(file: ConfigFile, origin: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: origin.to_string(),
            reason: reason.to_string(),
        };
        if file.chunk_lines == 0 {
            return Err(invalid("chunk_lines must be greater than zero"));
        }
        if file.progress_every == 0 {
            return Err(invalid("progress_every must be greater than zero"));
        }
        if file.cache_capacity == 0 {
            return Err(invalid("cache_capacity must be greater than zero"));
        }
        if file.rule_pattern.is_empty() {
            return Err(invalid("at least one rule_pattern is required"));
        }

        let mut rule_headers = Vec::with_capacity(file.rule_pattern.len());
        for entry in file.rule_pattern {
            let regex = Regex::new(&entry.pattern).map_err(|source| ConfigError::Pattern {
                pattern: entry.pattern.clone(),
                source,
            })?;
            if regex.captures_len() < 2 {
                return Err(invalid(&format!(
                    "rule pattern '{}' has no capture group for the rule name",
                    entry.pattern
                )));
            }
            rule_headers.push(RuleHeaderPattern {
                kind: entry.kind,
                regex,
            });
        }

        Ok(Self {
            progress_every: file.progress_every,
            chunk_lines: file.chunk_lines,
            cache_ttl: Duration::from_secs(file.cache_ttl_secs),
            cache_capacity: file.cache_capacity,
            timeout: file.timeout_secs.map(Duration::from_secs),
            rule_headers,
        })
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::embedded()
    }
}

fn default_progress_every() -> usize {
    20_000
}

fn default_chunk_lines() -> usize {
    50_000
}

fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_cache_capacity() -> usize {
    8
}

/// Byte ranges strictly inside double quotes; an unclosed quote runs to the end.
fn quoted_spans(line: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open = None;
    for (index, ch) in line.char_indices() {
        if ch != '"' {
            continue;
        }
        match open.take() {
            Some(start) => spans.push(start + 1..index),
            None => open = Some(index),
        }
    }
    if let Some(start) = open {
        spans.push(start + 1..line.len());
    }
    spans
}

fn fallback_rule_patterns() -> Vec<RulePatternEntry> {
    [
        (RuleKind::Security, r#"security-rule\s+"([^"]+)""#),
        (RuleKind::Security, r"security-rule\s+(\S+)"),
        (RuleKind::Security, r#"security\s+rules\s+"([^"]+)""#),
        (RuleKind::Security, r"security\s+rules\s+(\S+)"),
        (RuleKind::Nat, r#"nat-rule\s+"([^"]+)""#),
        (RuleKind::Nat, r"nat-rule\s+(\S+)"),
        (RuleKind::Nat, r#"nat\s+rules\s+"([^"]+)""#),
        (RuleKind::Nat, r"nat\s+rules\s+(\S+)"),
    ]
    .into_iter()
    .map(|(kind, pattern)| RulePatternEntry {
        kind,
        pattern: pattern.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AnalyzerConfig, ConfigError};
    use crate::model::RuleKind;

    #[test]
    fn embedded_config_has_ordered_rule_patterns() {
        let config = AnalyzerConfig::embedded();
        assert_eq!(config.rule_headers.len(), 8);
        assert_eq!(config.rule_headers[0].kind, RuleKind::Security);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn quoted_rule_names_win_over_bare_ones() {
        let config = AnalyzerConfig::embedded();
        let header = config
            .match_rule_header(r#"set device-group DG1 pre-rulebase security rules "Allow Web" source web"#)
            .expect("header");
        assert_eq!(header.kind, RuleKind::Security);
        assert_eq!(header.name, "Allow Web");
        assert_eq!(header.prefix, "set device-group DG1 pre-rulebase ");
        assert_eq!(header.rest, "source web");

        let header = config
            .match_rule_header("set shared post-rulebase nat rules outbound source-translation dynamic-ip-and-port")
            .expect("nat header");
        assert_eq!(header.kind, RuleKind::Nat);
        assert_eq!(header.name, "outbound");
    }

    #[test]
    fn header_words_inside_quoted_values_are_ignored() {
        let config = AnalyzerConfig::embedded();
        let header = config
            .match_rule_header(r#"set shared nat rules N1 description "see security rules R1""#)
            .expect("nat header");
        assert_eq!(header.kind, RuleKind::Nat);
        assert_eq!(header.name, "N1");
        assert_eq!(header.rest, r#"description "see security rules R1""#);

        let header = config
            .match_rule_header(r#"set device-group "DG 1" pre-rulebase security rules R1 source a"#)
            .expect("quoted device group");
        assert_eq!(header.kind, RuleKind::Security);
        assert_eq!(header.name, "R1");
        assert_eq!(header.prefix, r#"set device-group "DG 1" pre-rulebase "#);

        let header = config
            .match_rule_header(r#"set shared security rules "nat rules audit" source a"#)
            .expect("quoted name");
        assert_eq!(header.kind, RuleKind::Security);
        assert_eq!(header.name, "nat rules audit");

        assert!(config
            .match_rule_header(r#"set shared address a description "security rules R1""#)
            .is_none());
    }

    #[test]
    fn user_file_overrides_and_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "chunk_lines = 10\ntimeout_secs = 5").expect("write");
        let config = AnalyzerConfig::load(file.path()).expect("load");
        assert_eq!(config.chunk_lines, 10);
        assert_eq!(config.timeout.map(|t| t.as_secs()), Some(5));
        assert_eq!(config.rule_headers.len(), 8);
    }

    #[test]
    fn rejects_pattern_without_capture_group() {
        let raw = "[[rule_pattern]]\nkind = \"security\"\npattern = 'security\\s+rules'\n";
        let err = AnalyzerConfig::from_toml(raw, "test".to_string()).expect_err("should fail");
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let raw = "[[rule_pattern]]\nkind = \"nat\"\npattern = '(unclosed'\n";
        let err = AnalyzerConfig::from_toml(raw, "test".to_string()).expect_err("should fail");
        assert!(matches!(err, ConfigError::Pattern { .. }));
    }
}
