use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, info};

mod host;
mod machine;

use crate::host::comm::{CommConfig, connect_uart};
use crate::host::screen::{Session, headless};
use crate::host::script::{Scancodes, parse_scancodes};
use crate::machine::generic::ps2::KeyboardConfig;
use crate::machine::generic::ps2::device::Ps2Device;
use crate::machine::generic::ps2::queue::DEFAULT_QUEUE_CAPACITY;
use crate::machine::generic::ps2::wires::Ps2Wires;
use crate::machine::terminal::{System, TerminalConfig};

/// PS/2 keyboard terminal
/// Emulates a keyboard/LCD/UART terminal with a PS/2 keyboard on its pins
#[derive(Parser)]
#[command(name = "ps2-term")]
#[command(about = "A PS/2 keyboard serial terminal with a character LCD")]
struct Args {
    /// Display the LCD and type on it from this terminal
    #[cfg(feature = "tui")]
    #[arg(long)]
    display: bool,

    /// Serial: Single bidirectional pipe
    #[arg(long = "comm-pipe", value_name = "PIPE")]
    comm_pipe: Option<PathBuf>,

    /// Serial: Separate read and write pipes
    #[arg(long = "comm-pipes", num_args = 2, value_names = ["RX", "TX"])]
    comm_pipes: Vec<PathBuf>,

    /// Serial: Execute a command and connect to its stdin/stdout
    #[arg(long = "comm-exec", value_name = "COMMAND")]
    comm_exec: Option<String>,

    /// Serial: Execute a command and connect to its pty
    #[arg(long = "comm-exec-pty", value_name = "COMMAND")]
    comm_exec_pty: Option<String>,

    /// Serial: Loop everything sent back to the terminal
    #[arg(long)]
    loopback: bool,

    /// Show typed characters on the LCD and echo serial input back
    #[arg(long)]
    echo: bool,

    /// Do not send LF after CR
    #[arg(long)]
    no_lf_add: bool,

    /// Characters kept for the received line
    #[arg(long, default_value_t = 40)]
    line_size: usize,

    /// Scancodes buffered between the clock interrupt and the terminal
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_size: usize,

    /// Clock hold time before each command byte, in microseconds
    #[arg(long, default_value_t = 120)]
    rts_hold_us: u64,

    /// How long the sign-on banner stays up, in milliseconds
    #[arg(long, default_value_t = 3000)]
    sign_on_ms: u64,

    /// Text to type on the keyboard after sign-on
    #[arg(long = "type", value_name = "TEXT")]
    type_text: Option<String>,

    /// Raw scancodes to send after sign-on, repeatable, parsed as hex
    #[arg(long, value_parser = parse_scancodes, value_name = "HEX")]
    scancodes: Vec<Scancodes>,

    /// Stop after this many milliseconds
    #[arg(long)]
    run_ms: Option<u64>,

    /// Trace every clock edge
    #[arg(long)]
    trace_edges: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn display(&self) -> bool {
        #[cfg(feature = "tui")]
        return self.display;
        #[cfg(not(feature = "tui"))]
        return false;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };
    if args.display() {
        host::logging::setup_logging_file(level, args.trace_edges)?;
    } else {
        host::logging::setup_logging_stdio(level, args.trace_edges);
    }

    info!("PS2 terminal starting...");

    let comm_pipes = if args.comm_pipes.len() == 2 {
        Some((args.comm_pipes[0].clone(), args.comm_pipes[1].clone()))
    } else {
        None
    };
    let comm_config = CommConfig::from_args(
        args.comm_pipe.clone(),
        comm_pipes,
        args.comm_exec.clone(),
        args.comm_exec_pty.clone(),
        args.loopback,
    );
    let keyboard_config = KeyboardConfig {
        queue_size: args.queue_size,
        rts_hold: Duration::from_micros(args.rts_hold_us),
    };
    let terminal_config = TerminalConfig {
        echo: args.echo,
        lf_add: !args.no_lf_add,
        line_size: args.line_size,
    };

    let wires = Arc::new(Ps2Wires::new());
    let (device, sender) = Ps2Device::new(wires.clone());
    let leds = device.leds();
    let (mut system, host_channel) = System::new(wires, keyboard_config, terminal_config);
    let loopback = comm_config == CommConfig::Loopback;
    let bridge = connect_uart(host_channel, comm_config)?;
    let device = device.spawn()?;

    system.sign_on();
    let sign_on = Instant::now();
    while sign_on.elapsed() < Duration::from_millis(args.sign_on_ms) {
        system.uart.flush();
        thread::sleep(Duration::from_millis(10));
    }
    system.start();

    let mut session = Session::new(system, sender, leds, device);
    for scancodes in &args.scancodes {
        session.sender.send_scancodes(&scancodes.0);
    }
    if let Some(text) = &args.type_text {
        session.sender.send_str(text);
    }

    let start_time = Instant::now();
    #[cfg(feature = "tui")]
    if args.display {
        host::screen::ratatui::run(&mut session)?;
    } else {
        headless::run(&mut session, args.run_ms.map(Duration::from_millis));
    }
    #[cfg(not(feature = "tui"))]
    headless::run(&mut session, args.run_ms.map(Duration::from_millis));

    let system = session.finish();
    let stats = system.keyboard.stats();
    info!("PS2 terminal stopped after {:?}", start_time.elapsed());
    info!(
        "  Frames received: {}, sent: {}, dropped: {}",
        stats.received, stats.sent, stats.dropped
    );
    info!(
        "  Parity errors: {}, missing acks: {}, aborted: {}",
        stats.parity_errors, stats.missing_acks, stats.aborted
    );
    if !args.display() {
        println!("{}", system.dump_screen_text());
    }

    drop(system);
    if loopback {
        bridge.join();
    }
    Ok(())
}
