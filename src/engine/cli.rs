//! CLI command handler: load config, build the engine, wire Ctrl+C, write JSON lines.

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::engine::Engine;
use crate::engine::arg_parser::Cli;
use crate::knowledge::{HostnamePreprocessor, KnowledgeBase};
use crate::output::{EventSink, JsonLinesSink, SortingSink};
use crate::utils::config::PackagePaths;
use crate::utils::file_config::{apply_file_to_knowledge, apply_file_to_opts, load_timeliner_toml};
use crate::utils::{Colors, setup_logging};
use crate::{ExecutionMode, Opts, RunSummary};

/// Directory holding `.timeliner.toml`: `$TIMELINER_CONFIG_DIR` or the working directory.
fn config_dir() -> PathBuf {
    std::env::var_os(PackagePaths::get().env_var("CONFIG_DIR"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Opts and knowledge from the config file, then CLI flags on top.
fn setup_opts(cli: &Cli) -> (Opts, KnowledgeBase) {
    let mut opts = Opts::default();
    let mut knowledge = KnowledgeBase::new();
    let file = load_timeliner_toml(&config_dir());
    if let Some(file) = &file {
        apply_file_to_opts(file, &mut opts);
        apply_file_to_knowledge(file, &mut knowledge);
    }

    if let Some(verbose) = cli.verbose {
        opts.verbose = verbose;
    }
    setup_logging(opts.verbose);
    if file.is_some() {
        debug!("Loaded {}", PackagePaths::get().config_filename());
    }

    match (cli.sequential, cli.workers) {
        (Some(true), _) => opts.mode = ExecutionMode::Sequential,
        (_, Some(n)) => opts.mode = ExecutionMode::Parallel { workers: Some(n) },
        (Some(false), None) => opts.mode = ExecutionMode::Parallel { workers: None },
        (None, None) => {}
    }
    if let Some(queue) = cli.queue {
        opts.queue_kind = queue;
    }
    if cli.queue_capacity.is_some() {
        opts.queue_capacity = cli.queue_capacity;
    }
    if !cli.decoders.is_empty() {
        opts.decoders = cli.decoders.clone();
    }
    opts.exclude.extend(cli.exclude.iter().cloned());
    if let Some(follow) = cli.follow_links {
        opts.follow_links = follow;
    }
    if let Some(strict) = cli.strict {
        opts.strict = strict;
    }
    (opts, knowledge)
}

fn print_summary(summary: &RunSummary) {
    eprintln!(
        "{} events, {} errors, {} faults ({} invocations over {} inputs)",
        Colors::colorize(Colors::EVENTS, &summary.events.to_string()),
        Colors::colorize(Colors::ERRORS, &summary.errors.to_string()),
        Colors::colorize(Colors::FAULTS, &summary.faults.to_string()),
        summary.invocations,
        summary.inputs
    );
}

/// Run the engine over the CLI inputs. An aborted run is an error after output was flushed.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let (opts, knowledge) = setup_opts(cli);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );

    let mut engine = Engine::new(opts);
    if let Some(root) = &cli.source_root {
        engine = engine.with_preprocessor(HostnamePreprocessor::new(root));
    }

    let cancel = engine.cancel_handle();
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .context("set Ctrl+C handler")?;

    let out: Box<dyn Write + Send> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let mut json = JsonLinesSink::new(out);
    if cli.events_only {
        json = json.events_only();
    }
    let mut sink: Box<dyn EventSink> = if cli.sort {
        Box::new(SortingSink::new(json))
    } else {
        Box::new(json)
    };

    let summary = engine.run(&cli.inputs, knowledge, sink.as_mut())?;
    print_summary(&summary);
    if summary.aborted() {
        warn!("Partial output was flushed");
        bail!(
            "run aborted: {}",
            summary.abort_reason.as_deref().unwrap_or("unknown reason")
        );
    }
    if let Some(path) = &cli.output {
        info!("Events written to {}", path.display());
    }
    Ok(())
}
