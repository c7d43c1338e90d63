//! Knowledge store: run-wide facts (hostname, timezone, users) seeded before decoding.
//!
//! The engine takes the store by value and freezes it behind an `Arc` before any decoder
//! runs, so it is read-only for the whole `Running` phase.

use anyhow::{Context, Result};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Keys the store recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KnowledgeKey {
    Hostname,
    Timezone,
    CodePage,
    Users,
    DefaultValues,
}

impl KnowledgeKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeKey::Hostname => "hostname",
            KnowledgeKey::Timezone => "timezone",
            KnowledgeKey::CodePage => "code_page",
            KnowledgeKey::Users => "users",
            KnowledgeKey::DefaultValues => "default_values",
        }
    }
}

impl FromStr for KnowledgeKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hostname" => Ok(KnowledgeKey::Hostname),
            "timezone" => Ok(KnowledgeKey::Timezone),
            "code_page" => Ok(KnowledgeKey::CodePage),
            "users" => Ok(KnowledgeKey::Users),
            "default_values" => Ok(KnowledgeKey::DefaultValues),
            other => anyhow::bail!("unknown knowledge key: {}", other),
        }
    }
}

impl fmt::Display for KnowledgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    values: HashMap<KnowledgeKey, Value>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite `key`. No history is kept.
    pub fn set(&mut self, key: KnowledgeKey, value: impl Into<Value>) {
        self.values.insert(key, value.into());
    }

    /// Current value of `key`, or `default` when unset.
    pub fn get(&self, key: KnowledgeKey, default: Value) -> Value {
        self.values.get(&key).cloned().unwrap_or(default)
    }

    pub fn contains(&self, key: KnowledgeKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hostname(&self) -> Option<String> {
        self.values
            .get(&KnowledgeKey::Hostname)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Configured timezone name; `UTC` when unset.
    pub fn timezone(&self) -> String {
        self.values
            .get(&KnowledgeKey::Timezone)
            .and_then(Value::as_str)
            .unwrap_or("UTC")
            .to_string()
    }
}

/// Pre-processing step that seeds the store before decoders run.
pub trait Preprocessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, knowledge: &mut KnowledgeBase) -> Result<()>;
}

/// Reads `etc/hostname` below a mounted source root (e.g. an exported Linux image).
pub struct HostnamePreprocessor {
    source_root: PathBuf,
}

impl HostnamePreprocessor {
    pub fn new(source_root: impl AsRef<Path>) -> Self {
        Self {
            source_root: source_root.as_ref().to_path_buf(),
        }
    }
}

impl Preprocessor for HostnamePreprocessor {
    fn name(&self) -> &'static str {
        "hostname"
    }

    fn run(&self, knowledge: &mut KnowledgeBase) -> Result<()> {
        let path = self.source_root.join("etc").join("hostname");
        if !path.is_file() {
            debug!("no hostname file at {}", path.display());
            return Ok(());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        if let Some(name) = raw.lines().map(str::trim).find(|l| !l.is_empty()) {
            debug!("hostname from source: {}", name);
            knowledge.set(KnowledgeKey::Hostname, name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_unset_returns_default_without_side_effect() {
        let kb = KnowledgeBase::new();
        assert_eq!(kb.get(KnowledgeKey::Hostname, json!("unknown")), json!("unknown"));
        assert!(!kb.contains(KnowledgeKey::Hostname));
        assert!(kb.is_empty());
    }

    #[test]
    fn test_set_then_get_overwrites() {
        let mut kb = KnowledgeBase::new();
        kb.set(KnowledgeKey::Users, json!([{"name": "root", "uid": 0}]));
        kb.set(KnowledgeKey::Users, json!([{"name": "alice", "uid": 1000}]));
        assert_eq!(
            kb.get(KnowledgeKey::Users, Value::Null),
            json!([{"name": "alice", "uid": 1000}])
        );
        assert_eq!(kb.len(), 1);
    }

    #[test]
    fn test_timezone_defaults_to_utc() {
        let mut kb = KnowledgeBase::new();
        assert_eq!(kb.timezone(), "UTC");
        kb.set(KnowledgeKey::Timezone, "Europe/Berlin");
        assert_eq!(kb.timezone(), "Europe/Berlin");
    }

    #[test]
    fn test_hostname_preprocessor_reads_first_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/hostname"), "\n ubuntu \n").unwrap();
        let mut kb = KnowledgeBase::new();
        HostnamePreprocessor::new(dir.path()).run(&mut kb).unwrap();
        assert_eq!(kb.hostname().as_deref(), Some("ubuntu"));
    }

    #[test]
    fn test_key_parse_round_trips_display() {
        for key in [
            KnowledgeKey::Hostname,
            KnowledgeKey::Timezone,
            KnowledgeKey::CodePage,
            KnowledgeKey::Users,
            KnowledgeKey::DefaultValues,
        ] {
            assert_eq!(key.to_string().parse::<KnowledgeKey>().unwrap(), key);
        }
        assert!("zodiac".parse::<KnowledgeKey>().is_err());
    }
}
