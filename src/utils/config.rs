//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory, e.g. `.timeliner.toml`.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable name for `suffix`, e.g. `TIMELINER_CONFIG`.
    pub fn env_var(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }

    /// Names skipped when expanding directories, on top of user excludes.
    pub fn default_exclude_patterns(&self) -> Vec<String> {
        vec![self.config_filename().to_string()]
    }
}

// ---- Worker threads ----

/// Thread limits for the parallel runner.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Minimum for a derived worker count.
    pub floor: usize,
    /// Maximum for a derived worker count. Explicit requests are not capped.
    pub max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            max: Self::MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 2;
    pub const MAX_THREADS: usize = 32;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

// ---- Channels ----

pub struct QueueConsts;

impl QueueConsts {
    /// Event/error channel bound in parallel mode. Full channels stall decoders (backpressure).
    pub const DEFAULT_CAPACITY: usize = 10_000;
    /// Largest serialized frame accepted from a transport (bytes). 64 MB.
    pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;
}

// ---- Scheduling ----

/// Bytes read from the start of an input for signature matching.
pub const HEADER_SNIFF_LEN: usize = 512;

/// Decoder name used on parse errors raised by the engine itself (unreadable inputs).
pub const ENGINE_DECODER_NAME: &str = "engine";

// ---- Progress ----

pub struct ProgressConsts;

impl ProgressConsts {
    /// Invocations between progress counter refreshes.
    pub const UPDATE_BATCH_SIZE: usize = 16;
}
