//! Engine module: scheduling, runners, invocation isolation, cancellation and the CLI handler

pub mod arg_parser;
pub mod cancel;
pub mod cli;
pub mod core;
pub mod invoke;
pub mod progress;
pub mod runner;
pub mod schedule;
pub mod state;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cancel::CancelHandle;
pub use cli::handle_run;
pub use core::{Engine, EngineError, RunOutcome};
pub use invoke::{InvocationOutcome, run_isolated};
pub use schedule::{Invocation, Schedule};
pub use state::RunTracker;
