//! Runs one login session: spawns `ssh` in a PTY and wires the automation
//! layers between it and the local terminal.

use crate::expect::{ExpectEngine, ExpectWriter};
use crate::keepalive::{ActivityReader, ActivityWriter, KeepaliveMonitor};
use crate::pty::{PtyInput, PtyResizer, PtySession, pty_size};
use crate::pty_reader::spawn_reader;
use crate::resize::ResizeRelay;
use crate::server::ServerRecord;
use anyhow::{Context, Result};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The login program driven by a session.
pub const LOGIN_COMMAND: &str = "ssh";

pub struct Session {
    server: ServerRecord,
    started_at: Instant,
}

impl Session {
    pub fn new(server: ServerRecord) -> Self {
        Session {
            server,
            started_at: Instant::now(),
        }
    }

    /// Arguments passed to [`LOGIN_COMMAND`].
    pub fn login_args(&self) -> Vec<String> {
        vec![
            "-p".to_string(),
            self.server.port.to_string(),
            self.server.destination(),
        ]
    }

    /// Run the session until the child's output closes.
    ///
    /// The PTY, the resize subscription and the terminal mode are released on
    /// every exit path.
    pub async fn run(self) -> Result<()> {
        let size = crossterm::terminal::size()
            .map(|(cols, rows)| pty_size(rows, cols))
            .unwrap_or_else(|_| pty_size(24, 80));

        info!(
            destination = %self.server.destination(),
            port = self.server.port,
            "starting session"
        );
        let (mut pty, reader) = PtySession::spawn(LOGIN_COMMAND, &self.login_args(), size)
            .context("Failed to start login command")?;
        let input = pty.input();

        let _resize = spawn_resize_relay(pty.resizer());
        let _raw = RawModeGuard::enable()?;

        let (notifier, _keepalive) =
            match KeepaliveMonitor::for_policy(&self.server.idle, input.clone()) {
                Some((notifier, monitor)) => {
                    info!(period = ?monitor.period(), "keepalive enabled");
                    (Some(notifier), Some(TaskGuard(tokio::spawn(monitor.run()))))
                }
                None => (None, None),
            };

        let stdin: Box<dyn Read + Send> = match &notifier {
            Some(n) => Box::new(ActivityReader::new(io::stdin(), n.clone())),
            None => Box::new(io::stdin()),
        };
        let mut outbound_failed = spawn_input_copy(stdin, input.clone());

        let stdout: Box<dyn Write + Send> = match notifier {
            Some(n) => Box::new(ActivityWriter::new(io::stdout(), n)),
            None => Box::new(io::stdout()),
        };
        let engine = ExpectEngine::new(&self.server, self.started_at);
        let mut output = ExpectWriter::new(stdout, engine, input);
        let mut chunks = spawn_reader(reader);

        let result = tokio::select! {
            res = relay_output(&mut chunks, &mut output) => res,
            Some(e) = outbound_failed.recv() => Err(e),
        };

        match pty.finish() {
            Ok(status) => debug!(code = status.exit_code(), "login command exited"),
            Err(e) => debug!(error = %e, "failed to reap login command"),
        }
        result
    }
}

/// Forward child output chunks to `out` in arrival order until the PTY closes.
pub async fn relay_output<W: Write>(
    chunks: &mut mpsc::Receiver<Vec<u8>>,
    out: &mut W,
) -> Result<()> {
    while let Some(chunk) = chunks.recv().await {
        out.write_all(&chunk)
            .context("Failed to copy pty output to stdout")?;
    }
    Ok(())
}

/// Copy `source` into the child's stdin on a dedicated thread.
///
/// EOF ends the copy quietly; an I/O error is reported on the returned
/// channel. The thread is not joined: a blocked read on stdin is abandoned
/// when the session ends.
fn spawn_input_copy(
    mut source: Box<dyn Read + Send>,
    input: PtyInput,
) -> mpsc::Receiver<anyhow::Error> {
    let (tx, rx) = mpsc::channel(1);

    thread::spawn(move || {
        let mut buffer = [0u8; 1024];
        let err = loop {
            match source.read(&mut buffer) {
                Ok(0) => return,
                Ok(n) => {
                    if let Err(e) = input.write(&buffer[..n]) {
                        break e.context("Failed to copy stdin to pty");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break anyhow::Error::from(e).context("Failed to read stdin"),
            }
        };
        let _ = tx.blocking_send(err);
    });

    rx
}

#[cfg(unix)]
fn spawn_resize_relay(resizer: PtyResizer) -> TaskGuard {
    let relay = ResizeRelay::new(resizer);
    match crate::resize::WindowChange::subscribe() {
        Ok(events) => TaskGuard(tokio::spawn(relay.run(events))),
        Err(e) => {
            warn!(error = %e, "failed to watch terminal resizes");
            sync_once(relay)
        }
    }
}

#[cfg(not(unix))]
fn spawn_resize_relay(resizer: PtyResizer) -> TaskGuard {
    sync_once(ResizeRelay::new(resizer))
}

fn sync_once(relay: ResizeRelay<PtyResizer>) -> TaskGuard {
    let (_, closed) = mpsc::channel::<()>(1);
    TaskGuard(tokio::spawn(relay.run(closed)))
}

/// Aborts a background task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keeps the controlling terminal in raw mode while alive.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("Failed to put terminal in raw mode")?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}
