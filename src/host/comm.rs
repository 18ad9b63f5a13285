use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::machine::generic::serial::SerialChannel;

const XON: u8 = 0x11;
const XOFF: u8 = 0x13;

/// Where the terminal's serial port is connected on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CommConfig {
    /// Everything the terminal sends comes straight back
    #[default]
    Loopback,
    /// Single bidirectional pipe
    Pipe(PathBuf),
    /// Separate read and write pipes
    Pipes { rx: PathBuf, tx: PathBuf },
    /// Execute a command and connect to its stdin/stdout
    Exec(String),
    /// Execute a command and connect to its pty
    #[cfg(feature = "pty")]
    ExecPty(String),
}

impl CommConfig {
    /// Parse command-line arguments into CommConfig
    pub fn from_args(
        pipe: Option<PathBuf>,
        pipes: Option<(PathBuf, PathBuf)>,
        exec: Option<String>,
        exec_pty: Option<String>,
        loopback: bool,
    ) -> Self {
        #[cfg(feature = "pty")]
        if let Some(exec_pty_cmd) = exec_pty {
            return CommConfig::ExecPty(exec_pty_cmd);
        }
        #[cfg(not(feature = "pty"))]
        if exec_pty.is_some() {
            error!("--comm-exec-pty needs the pty feature, using loopback");
        }

        if loopback {
            CommConfig::Loopback
        } else if let Some(exec_cmd) = exec {
            CommConfig::Exec(exec_cmd)
        } else if let Some((rx, tx)) = pipes {
            CommConfig::Pipes { rx, tx }
        } else if let Some(pipe) = pipe {
            CommConfig::Pipe(pipe)
        } else {
            CommConfig::Loopback
        }
    }
}

/// The threads pumping bytes between the terminal and the host.
pub struct Bridge {
    threads: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Waits for both directions to close.
    pub fn join(self) {
        for thread in self.threads {
            if thread.join().is_err() {
                error!("Serial bridge thread panicked");
            }
        }
    }
}

/// Connect the terminal's serial channel to the configured endpoint
pub fn connect_uart(channel: SerialChannel, config: CommConfig) -> io::Result<Bridge> {
    match config {
        CommConfig::Loopback => connect_loopback(channel),
        CommConfig::Pipe(path) => connect_single_pipe(channel, path),
        CommConfig::Pipes { rx, tx } => connect_dual_pipes(channel, rx, tx),
        CommConfig::Exec(cmd) => connect_exec(channel, cmd),
        #[cfg(feature = "pty")]
        CommConfig::ExecPty(cmd) => connect_exec_pty(channel, cmd),
    }
}

fn connect_loopback(channel: SerialChannel) -> io::Result<Bridge> {
    info!("Connecting UART loopback");
    let thread = thread::Builder::new()
        .name("uart-loopback".into())
        .spawn(move || {
            for b in channel.rx.iter() {
                trace!("UART loopback char {b:02X} {:?}", b as char);
                if channel.tx.send(b).is_err() {
                    break;
                }
            }
            trace!("UART loopback thread exited");
        })?;
    Ok(Bridge {
        threads: vec![thread],
    })
}

/// Bytes from the terminal to `writer`. XON and XOFF are consumed and gate
/// the other direction.
fn spawn_writer<W: Write + 'static>(
    name: &'static str,
    rx: Receiver<u8>,
    flow: Arc<AtomicBool>,
    open: impl FnOnce() -> io::Result<W> + Send + 'static,
    on_close: impl FnOnce() + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("uart-{name}-tx"))
        .spawn(move || {
            match open() {
                Ok(mut writer) => {
                    for b in rx.iter() {
                        match b {
                            XON => {
                                trace!("UART {name} XON");
                                flow.store(true, Ordering::Relaxed);
                            }
                            XOFF => {
                                trace!("UART {name} XOFF");
                                flow.store(false, Ordering::Relaxed);
                            }
                            _ => {
                                if writer.write_all(&[b]).and_then(|_| writer.flush()).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => error!("UART {name}: failed to open for writing: {e}"),
            }
            on_close();
            trace!("UART {name} write thread exited");
        })
}

/// Bytes from `reader` to the terminal, paused while XOFF is in effect.
fn spawn_reader<R: Read + 'static>(
    name: &'static str,
    tx: SyncSender<u8>,
    flow: Arc<AtomicBool>,
    open: impl FnOnce() -> io::Result<R> + Send + 'static,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("uart-{name}-rx"))
        .spawn(move || {
            let mut reader = match open() {
                Ok(reader) => reader,
                Err(e) => {
                    error!("UART {name}: failed to open for reading: {e}");
                    return;
                }
            };
            loop {
                if !flow.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                    continue;
                }
                let mut buf = [0; 1];
                match reader.read(&mut buf) {
                    Ok(1) => {
                        if tx.send(buf[0]).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    // EOF or error
                    _ => break,
                }
            }
            trace!("UART {name} read thread exited");
        })
}

fn connect_single_pipe(channel: SerialChannel, path: PathBuf) -> io::Result<Bridge> {
    info!("Connecting UART single pipe to {:?}", path);
    let flow = Arc::new(AtomicBool::new(true));

    debug!("Opening {:?} as read/write", path);
    let pipe_r = OpenOptions::new().read(true).write(true).open(&path)?;
    let pipe_w = pipe_r.try_clone()?;
    debug!("Opened!");

    let writer = spawn_writer("pipe", channel.rx, flow.clone(), || Ok(pipe_w), || {})?;
    let reader = spawn_reader("pipe", channel.tx, flow, || Ok(pipe_r))?;
    Ok(Bridge {
        threads: vec![writer, reader],
    })
}

fn connect_dual_pipes(
    channel: SerialChannel,
    pipe_r_path: PathBuf,
    pipe_w_path: PathBuf,
) -> io::Result<Bridge> {
    info!(
        "Connecting UART dual pipes to {:?} and {:?}",
        pipe_r_path, pipe_w_path
    );
    let flow = Arc::new(AtomicBool::new(true));

    // Opening a FIFO blocks until the other end shows up, so each side opens
    // on its own thread.
    let writer = spawn_writer(
        "pipes",
        channel.rx,
        flow.clone(),
        move || OpenOptions::new().write(true).open(&pipe_w_path),
        || {},
    )?;
    let reader = spawn_reader("pipes", channel.tx, flow, move || {
        OpenOptions::new().read(true).open(&pipe_r_path)
    })?;
    Ok(Bridge {
        threads: vec![writer, reader],
    })
}

fn reap(mut child: Child) {
    match child.wait() {
        Ok(status) => debug!("UART child exited: {status}"),
        Err(e) => error!("UART child wait failed: {e}"),
    }
}

fn connect_exec(channel: SerialChannel, cmd_string: String) -> io::Result<Bridge> {
    info!("Connecting UART to shell process {:?}", cmd_string);
    if cmd_string.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Empty command string",
        ));
    }
    let flow = Arc::new(AtomicBool::new(true));

    let mut child = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(&cmd_string)
        .stderr(Stdio::null())
        .stdout(Stdio::piped())
        .stdin(Stdio::piped())
        .spawn()?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(io::Error::other("child stdio not captured"));
    };

    // Closing stdin when the terminal goes away lets the child finish.
    let writer = spawn_writer(
        "exec",
        channel.rx,
        flow.clone(),
        move || Ok(stdin),
        move || reap(child),
    )?;
    let reader = spawn_reader("exec", channel.tx, flow, move || Ok(stdout))?;
    Ok(Bridge {
        threads: vec![writer, reader],
    })
}

#[cfg(feature = "pty")]
fn connect_exec_pty(channel: SerialChannel, cmd_string: String) -> io::Result<Bridge> {
    use pty_process::blocking::Command;
    use std::os::fd::OwnedFd;

    info!("Connecting UART to shell process PTY {:?}", cmd_string);
    if cmd_string.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Empty command string",
        ));
    }
    let flow = Arc::new(AtomicBool::new(true));

    let (pty, pts) = pty_process::blocking::open().map_err(io::Error::other)?;
    // Two LCD lines of 40 columns.
    pty.resize(pty_process::Size::new(2, 40))
        .map_err(io::Error::other)?;

    let child = Command::new("/bin/sh")
        .arg("-c")
        .arg(&cmd_string)
        .spawn(pts)
        .map_err(io::Error::other)?;

    let pty = File::from(OwnedFd::from(pty));
    let pty_read = pty.try_clone()?;

    let writer = spawn_writer(
        "pty",
        channel.rx,
        flow.clone(),
        move || Ok(pty),
        move || reap(child),
    )?;
    let reader = spawn_reader("pty", channel.tx, flow, move || Ok(pty_read))?;
    Ok(Bridge {
        threads: vec![writer, reader],
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Instant;

    use rstest::rstest;

    use super::*;
    use crate::machine::generic::serial::Uart;

    fn receive(uart: &mut Uart, count: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        while out.len() < count && Instant::now() < deadline {
            match uart.receive() {
                Some(b) => out.push(b),
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    #[rstest]
    #[case::nothing(None, None, None, None, false, CommConfig::Loopback)]
    #[case::pipe(Some("p".into()), None, None, None, false, CommConfig::Pipe("p".into()))]
    #[case::pipes(
        None,
        Some(("r".into(), "w".into())),
        None,
        None,
        false,
        CommConfig::Pipes { rx: "r".into(), tx: "w".into() }
    )]
    #[case::exec_wins(Some("p".into()), None, Some("cat".into()), None, false, CommConfig::Exec("cat".into()))]
    #[case::loopback_wins(None, None, Some("cat".into()), None, true, CommConfig::Loopback)]
    fn test_from_args(
        #[case] pipe: Option<PathBuf>,
        #[case] pipes: Option<(PathBuf, PathBuf)>,
        #[case] exec: Option<String>,
        #[case] exec_pty: Option<String>,
        #[case] loopback: bool,
        #[case] expected: CommConfig,
    ) {
        assert_eq!(
            CommConfig::from_args(pipe, pipes, exec, exec_pty, loopback),
            expected
        );
    }

    #[test]
    fn test_loopback() {
        let (mut uart, host) = Uart::new();
        let bridge = connect_uart(host, CommConfig::Loopback).unwrap();
        uart.send_bytes(b"ping\r");
        assert_eq!(receive(&mut uart, 5), b"ping\r");
        drop(uart);
        bridge.join();
    }

    #[test]
    fn test_dual_pipes_with_flow_control() {
        let dir = tempfile::tempdir().unwrap();
        let rx_path = dir.path().join("rx");
        let tx_path = dir.path().join("tx");
        fs::write(&rx_path, b"hello\r").unwrap();
        fs::write(&tx_path, b"").unwrap();

        let (mut uart, host) = Uart::new();
        let bridge = connect_uart(
            host,
            CommConfig::Pipes {
                rx: rx_path,
                tx: tx_path.clone(),
            },
        )
        .unwrap();

        assert_eq!(receive(&mut uart, 6), b"hello\r");
        uart.send_bytes(&[b'l', XOFF, b's', XON, b'\r']);
        drop(uart);
        bridge.join();
        assert_eq!(fs::read(&tx_path).unwrap(), b"ls\r");
    }

    #[test]
    fn test_exec_cat() {
        let (mut uart, host) = Uart::new();
        let bridge = connect_uart(host, CommConfig::Exec("cat".into())).unwrap();
        uart.send_bytes(b"echo\r");
        assert_eq!(receive(&mut uart, 5), b"echo\r");
        drop(uart);
        bridge.join();
    }

    #[test]
    fn test_exec_empty_command() {
        let (_uart, host) = Uart::new();
        let err = connect_uart(host, CommConfig::Exec(String::new())).err();
        assert_eq!(err.map(|e| e.kind()), Some(io::ErrorKind::InvalidInput));
    }
}
