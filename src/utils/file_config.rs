//! Load `.timeliner.toml` (CLI only). Lib callers pass [`Opts`] and a [`KnowledgeBase`] directly.

use log::warn;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::knowledge::{KnowledgeBase, KnowledgeKey};
use crate::utils::config::PackagePaths;
use crate::{ExecutionMode, Opts, QueueKind};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TimelinerToml {
    #[serde(default)]
    settings: SettingsSection,
    /// Knowledge store seeds, e.g. `hostname = "wks-01"`.
    #[serde(default)]
    knowledge: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    sequential: Option<bool>,
    workers: Option<usize>,
    queue: Option<QueueKind>,
    queue_capacity: Option<usize>,
    decoders: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    follow_links: Option<bool>,
    strict: Option<bool>,
    verbose: Option<bool>,
}

/// Parse config text. Returns None (and warns) when it does not parse.
pub(crate) fn parse_timeliner_toml(text: &str, origin: &Path) -> Option<TimelinerToml> {
    toml::from_str(text)
        .map_err(|e| warn!("{}: {}", origin.display(), e))
        .ok()
}

/// Load the config file from `dir` if present. Returns None if file missing or unreadable.
pub(crate) fn load_timeliner_toml(dir: &Path) -> Option<TimelinerToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_timeliner_toml(&s, &path)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file settings to opts (only fields present in the file). Call before applying CLI flags.
pub(crate) fn apply_file_to_opts(file: &TimelinerToml, opts: &mut Opts) {
    let s = &file.settings;
    match (s.sequential, s.workers) {
        (Some(true), _) => opts.mode = ExecutionMode::Sequential,
        (_, Some(n)) => opts.mode = ExecutionMode::Parallel { workers: Some(n) },
        (Some(false), None) => opts.mode = ExecutionMode::Parallel { workers: None },
        (None, None) => {}
    }
    apply_file_opt!(s, opts, queue => queue_kind);
    if let Some(cap) = s.queue_capacity {
        opts.queue_capacity = Some(cap);
    }
    apply_file_opt!(s, opts, decoders => decoders);
    apply_file_opt!(s, opts, exclude => exclude);
    apply_file_opt!(s, opts, follow_links => follow_links);
    apply_file_opt!(s, opts, strict => strict);
    apply_file_opt!(s, opts, verbose => verbose);
}

/// Seed the knowledge store from the `[knowledge]` table. Unknown keys are skipped with a warning.
pub(crate) fn apply_file_to_knowledge(file: &TimelinerToml, knowledge: &mut KnowledgeBase) {
    for (name, value) in &file.knowledge {
        match name.parse::<KnowledgeKey>() {
            Ok(key) => knowledge.set(key, value.clone()),
            Err(e) => warn!("{}", e),
        }
    }
}
