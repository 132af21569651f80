//! Raw sweep configuration: named sections of key → token-list entries.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value as Yaml;

use crate::errors::{ErrorInfo, SweepError};

/// Parsed but untyped configuration source.
///
/// Each section maps parameter names to a raw entry string; an entry is a
/// whitespace-separated list of candidate value tokens. Typing happens later
/// when an attr table parses the tokens.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSource {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ConfigSource {
    /// Builds a source directly from section maps. Test and wiring helper.
    pub fn from_sections(sections: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        Self { sections }
    }

    /// Loads a YAML config file: a mapping of section name to a mapping of
    /// parameter name to entry.
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = fs::read_to_string(path).map_err(|err| {
            SweepError::Io(
                ErrorInfo::new("config-read", "failed to read config file")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        Self::parse(&text).map_err(|err| match err {
            SweepError::Config(info) => {
                SweepError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Parses config text. Scalar entries are coerced to strings, so
    /// `thresh: 5` and `thresh: "5 10"` both work; a sequence of scalars is
    /// joined with single spaces.
    pub fn parse(text: &str) -> Result<Self, SweepError> {
        let doc: Yaml = serde_yaml::from_str(text).map_err(|err| {
            SweepError::Config(
                ErrorInfo::new("config-parse", "config file is not valid YAML")
                    .with_hint(err.to_string()),
            )
        })?;
        let Yaml::Mapping(root) = doc else {
            return Err(SweepError::Config(ErrorInfo::new(
                "config-shape",
                "config root must be a mapping of sections",
            )));
        };
        let mut sections = BTreeMap::new();
        for (name, body) in root {
            let name = scalar_string(&name).ok_or_else(|| {
                SweepError::Config(ErrorInfo::new(
                    "config-section-name",
                    "section names must be scalars",
                ))
            })?;
            let Yaml::Mapping(body) = body else {
                return Err(SweepError::Config(
                    ErrorInfo::new("config-section-shape", "section body must be a mapping")
                        .with_context("section", name),
                ));
            };
            let mut entries = BTreeMap::new();
            for (key, value) in body {
                let key = scalar_string(&key).ok_or_else(|| {
                    SweepError::Config(
                        ErrorInfo::new("config-key-name", "entry keys must be scalars")
                            .with_context("section", name.clone()),
                    )
                })?;
                let entry = entry_string(&value).ok_or_else(|| {
                    SweepError::Config(
                        ErrorInfo::new(
                            "config-entry-shape",
                            "entries must be scalars or sequences of scalars",
                        )
                        .with_context("section", name.clone())
                        .with_context("key", key.clone()),
                    )
                })?;
                entries.insert(key, entry);
            }
            sections.insert(name, entries);
        }
        Ok(Self { sections })
    }

    /// Overlays `self` onto `defaults`: entries from the named file win,
    /// section by section and key by key; defaults only fill gaps.
    pub fn merged_over(self, defaults: ConfigSource) -> ConfigSource {
        let mut merged = defaults;
        for (name, entries) in self.sections {
            let slot = merged.sections.entry(name).or_default();
            for (key, value) in entries {
                slot.insert(key, value);
            }
        }
        merged
    }

    /// Returns the entries of the named section.
    pub fn section(&self, name: &str) -> Result<&BTreeMap<String, String>, SweepError> {
        self.sections.get(name).ok_or_else(|| {
            SweepError::Config(
                ErrorInfo::new("config-missing-section", "config has no such section")
                    .with_context("section", name),
            )
        })
    }

    /// Returns the raw entry for a key within a section.
    pub fn entry(&self, section: &str, key: &str) -> Result<&str, SweepError> {
        self.section(section)?
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| {
                SweepError::Config(
                    ErrorInfo::new("config-missing-key", "section has no entry for parameter")
                        .with_context("section", section)
                        .with_context("key", key),
                )
            })
    }

    /// Whether the named section exists.
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }
}

fn scalar_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        Yaml::Null => Some(String::new()),
        _ => None,
    }
}

fn entry_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::Sequence(items) => {
            let mut tokens = Vec::with_capacity(items.len());
            for item in items {
                tokens.push(scalar_string(item)?);
            }
            Some(tokens.join(" "))
        }
        other => scalar_string(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_coerces_scalars() {
        let cfg = ConfigSource::parse(
            "spots:\n  thresh: \"5 10\"\n  min_pix: 2\nindex:\n  use_friedel: true\n",
        )
        .unwrap();
        assert_eq!(cfg.entry("spots", "thresh").unwrap(), "5 10");
        assert_eq!(cfg.entry("spots", "min_pix").unwrap(), "2");
        assert_eq!(cfg.entry("index", "use_friedel").unwrap(), "true");
    }

    #[test]
    fn sequences_join_into_token_lists() {
        let cfg = ConfigSource::parse("spots:\n  thresh: [5, 10, 20]\n").unwrap();
        assert_eq!(cfg.entry("spots", "thresh").unwrap(), "5 10 20");
    }

    #[test]
    fn missing_section_and_key_are_distinct_errors() {
        let cfg = ConfigSource::parse("spots:\n  thresh: 5\n").unwrap();
        let missing_section = cfg.section("index").unwrap_err();
        assert_eq!(missing_section.info().code, "config-missing-section");
        let missing_key = cfg.entry("spots", "min_pix").unwrap_err();
        assert_eq!(missing_key.info().code, "config-missing-key");
    }

    #[test]
    fn named_file_wins_over_defaults() {
        let named = ConfigSource::parse("spots:\n  thresh: 7\n").unwrap();
        let defaults =
            ConfigSource::parse("spots:\n  thresh: 5\n  min_pix: 2\nindex:\n  hkl_tol: 0.1\n")
                .unwrap();
        let merged = named.merged_over(defaults);
        assert_eq!(merged.entry("spots", "thresh").unwrap(), "7");
        assert_eq!(merged.entry("spots", "min_pix").unwrap(), "2");
        assert_eq!(merged.entry("index", "hkl_tol").unwrap(), "0.1");
    }
}
