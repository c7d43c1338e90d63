use clap::Parser;
use std::path::PathBuf;

use crate::QueueKind;

/// Build a forensic timeline: run every matching decoder over the inputs and write events as JSON lines.
#[derive(Clone, Debug, Parser)]
#[command(name = "timeliner")]
#[command(about = "Extract timestamped events from files, directories and containers.")]
pub struct Cli {
    /// Files or directories to process.
    #[arg(value_name = "INPUT", required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Write events here instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Run decoders one at a time on the calling thread (deterministic output order).
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub sequential: Option<bool>,

    /// Worker threads in parallel mode. Default: derived from available cores.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Channel implementation between decoders and the collector.
    #[arg(long, value_parser = parse_queue_kind)]
    pub queue: Option<QueueKind>,

    /// Event/error channel bound in parallel mode.
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Only run these decoders. Can specify multiple: -d bodyfile gzip
    #[arg(long, short = 'd', num_args = 1..)]
    pub decoders: Vec<String>,

    /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2 pattern3
    #[arg(long, short = 'e', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Follow symbolic links.
    #[arg(long, short = 'f', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub follow_links: Option<bool>,

    /// Strict mode: abort on the first unreadable input instead of reporting it.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict: Option<bool>,

    /// Sort events by timestamp before writing (buffers the whole run).
    #[arg(long, short = 's')]
    pub sort: bool,

    /// Leave parse errors out of the output stream.
    #[arg(long)]
    pub events_only: bool,

    /// Mounted source root read by pre-processing (e.g. `etc/hostname`).
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Verbose output and progress counter.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

fn parse_queue_kind(s: &str) -> Result<QueueKind, String> {
    match s {
        "memory" => Ok(QueueKind::Memory),
        "pipe" => Ok(QueueKind::Pipe),
        other => Err(format!("unknown queue kind {other:?} (expected memory or pipe)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "timeliner",
            "/cases/a",
            "/cases/b",
            "--queue",
            "pipe",
            "-w",
            "4",
            "--strict",
            "-d",
            "bodyfile",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec!["/cases/a", "/cases/b"]);
        assert_eq!(cli.queue, Some(QueueKind::Pipe));
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.strict, Some(true));
        assert_eq!(cli.decoders, vec!["bodyfile"]);
        assert_eq!(cli.sequential, None);
    }

    #[test]
    fn test_inputs_required_and_queue_validated() {
        assert!(Cli::try_parse_from(["timeliner"]).is_err());
        assert!(Cli::try_parse_from(["timeliner", "x", "--queue", "tcp"]).is_err());
    }
}
