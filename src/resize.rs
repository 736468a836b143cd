//! Keeps the child PTY the same size as the controlling terminal.

use crate::pty::{ResizeTarget, pty_size};
use async_trait::async_trait;
use std::io;
use tracing::{debug, warn};

/// Source of "terminal size changed" notifications.
#[async_trait]
pub trait ResizeEvents: Send {
    /// Wait for the next notification; `None` once the source is closed.
    async fn next(&mut self) -> Option<()>;
}

/// `SIGWINCH` delivered through tokio's signal driver.
#[cfg(unix)]
pub struct WindowChange(tokio::signal::unix::Signal);

#[cfg(unix)]
impl WindowChange {
    pub fn subscribe() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self(signal(SignalKind::window_change())?))
    }
}

#[cfg(unix)]
#[async_trait]
impl ResizeEvents for WindowChange {
    async fn next(&mut self) -> Option<()> {
        self.0.recv().await
    }
}

#[async_trait]
impl ResizeEvents for tokio::sync::mpsc::Receiver<()> {
    async fn next(&mut self) -> Option<()> {
        self.recv().await
    }
}

/// Returns the controlling terminal size as `(cols, rows)`.
pub type SizeSource = fn() -> io::Result<(u16, u16)>;

pub struct ResizeRelay<T> {
    target: T,
    size: SizeSource,
}

impl<T: ResizeTarget> ResizeRelay<T> {
    /// Relay the real terminal size to `target`.
    pub fn new(target: T) -> Self {
        Self::with_size_source(target, crossterm::terminal::size)
    }

    pub fn with_size_source(target: T, size: SizeSource) -> Self {
        Self { target, size }
    }

    /// Copy the current terminal size to the target. Failures are logged and
    /// the target keeps its previous size.
    pub fn sync(&self) {
        let (cols, rows) = match (self.size)() {
            Ok(size) => size,
            Err(e) => {
                warn!(error = %e, "failed to read terminal size");
                return;
            }
        };
        match self.target.resize(pty_size(rows, cols)) {
            Ok(()) => debug!(rows, cols, "resized pty"),
            Err(e) => warn!(error = %e, "error resizing pty"),
        }
    }

    /// Sync once immediately, then again on every notification until the
    /// source closes.
    pub async fn run(self, mut events: impl ResizeEvents) {
        self.sync();
        while events.next().await.is_some() {
            self.sync();
        }
    }
}
