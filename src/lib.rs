//! Timeliner: forensic event-extraction pipeline. Decoders turn artifacts into timestamped
//! events; the engine schedules them sequentially or on a worker pool and streams the output
//! to a sink.

pub mod decoders;
pub mod engine;
pub mod knowledge;
pub mod output;
pub mod pipeline;
pub mod types;
pub mod utils;
pub mod vfs;

/// Re-export types for API
pub use types::*;

pub use engine::{CancelHandle, Engine, EngineError, RunOutcome};
pub use knowledge::{KnowledgeBase, KnowledgeKey};

use log::debug;

/// Result alias used by public timeliner API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: run the built-in decoders over `inputs` with `opts` and collect everything.
///
/// Pass a pre-seeded [`KnowledgeBase`] (hostname, timezone, ...) or `KnowledgeBase::new()`.
/// An aborted run is returned as `Ok` with [`RunSummary::aborted`] set; only conditions that
/// prevent a run from starting (unknown decoder names, unresolvable inputs) are errors.
///
/// ```ignore
/// let outcome = timeliner::timeline(&["/cases/host01"], &Opts::default(), KnowledgeBase::new())?;
/// for event in &outcome.events {
///     println!("{} {}", event.timestamp, event.parser());
/// }
/// ```
pub fn timeline<L: AsRef<str>>(
    inputs: &[L],
    opts: &Opts,
    knowledge: KnowledgeBase,
) -> Result<RunOutcome> {
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    let engine = Engine::new(opts.clone());
    Ok(engine.run_collect(inputs, knowledge)?)
}
