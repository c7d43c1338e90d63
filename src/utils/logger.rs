use colored::{ColoredString, Colorize};
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Colors for the run summary printed by the CLI.
pub struct Colors;

impl Colors {
    pub const EVENTS: &'static str = "green";
    pub const ERRORS: &'static str = "yellow";
    pub const FAULTS: &'static str = "red";

    pub fn colorize(color: &str, text: &str) -> ColoredString {
        text.color(color)
    }
}

/// Crate logs at Debug when `verbose`, otherwise Info; dependencies only warn.
/// Logs go to stderr so stdout stays free for serialized events.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // try_init: library tests and embedding programs may have installed a logger already.
    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        _ => "ERROR".red(),
                    };
                    let path = record.target().to_string().white();
                    format!("[{} {} {}] {}", name.cyan(), level_str, path, record.args())
                }
                _ => format!("[{}] {}", name.cyan(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
