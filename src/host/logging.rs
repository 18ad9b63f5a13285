use std::fs::File;
use std::io::{IsTerminal, stdout};

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Per-edge and per-frame tracing.
const EDGE_TARGETS: &[&str] = &[
    "ps2_term::machine::generic::ps2::line",
    "ps2_term::machine::generic::ps2::device",
];

/// Logs to `ps2-term.log` in the temp directory, for when the TUI owns the
/// terminal.
pub fn setup_logging_file(level: tracing::Level, trace_edges: bool) -> std::io::Result<()> {
    let logfile = std::env::temp_dir().join("ps2-term.log");

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(File::create(logfile)?)
        .log_internal_errors(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(logging_targets(level, trace_edges))
        .init();
    Ok(())
}

pub fn setup_logging_stdio(level: tracing::Level, trace_edges: bool) {
    let format = tracing_subscriber::fmt::format()
        .with_target(false)
        .with_line_number(false)
        .with_level(false)
        .without_time();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(stdout().is_terminal())
        .with_writer(std::io::stderr)
        .event_format(format)
        .log_internal_errors(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(logging_targets(level, trace_edges))
        .init();
}

fn logging_targets(level: tracing::Level, trace_edges: bool) -> Targets {
    let level = LevelFilter::from_level(level);
    let edge_level = if trace_edges {
        level
    } else {
        level.min(LevelFilter::DEBUG)
    };
    EDGE_TARGETS
        .iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(*target, edge_level)
        })
        .with_default(level)
}
