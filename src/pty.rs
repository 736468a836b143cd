use anyhow::{Context, Result, anyhow};
use portable_pty::{Child, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

/// Build a [`PtySize`] from terminal rows and columns.
pub fn pty_size(rows: u16, cols: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Shared handle to the child's stdin.
///
/// The outbound copy loop, the expect engine and the idle monitor all write
/// through clones of this handle; each write happens under one lock so their
/// bytes never interleave.
#[derive(Clone)]
pub struct PtyInput {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyInput {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write data to the program's stdin
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("PTY writer lock poisoned"))?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }
}

/// Anything whose terminal dimensions can be updated.
pub trait ResizeTarget: Send + Sync {
    fn resize(&self, size: PtySize) -> Result<()>;
}

/// Resizes the master side of a PTY.
#[derive(Clone)]
pub struct PtyResizer {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
}

impl ResizeTarget for PtyResizer {
    fn resize(&self, size: PtySize) -> Result<()> {
        let master = self
            .master
            .lock()
            .map_err(|_| anyhow!("PTY master lock poisoned"))?;
        master.resize(size).context("Failed to resize PTY")?;
        Ok(())
    }
}

/// Manages a program running inside a PTY
///
/// Dropping the session reaps the child, killing it first if it still runs.
pub struct PtySession {
    child: Box<dyn Child + Send + Sync>,
    input: PtyInput,
    resizer: PtyResizer,
}

impl PtySession {
    /// Spawn `command` in a new PTY of the given size, returning the session
    /// and the output reader separately.
    ///
    /// The child inherits the environment and working directory of the
    /// current process.
    pub fn spawn(
        command: &str,
        args: &[String],
        size: PtySize,
    ) -> Result<(Self, Box<dyn Read + Send>)> {
        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system.openpty(size).context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn command: {command}"))?;
        // Only the child may hold the slave, otherwise reads never see EOF.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let session = PtySession {
            child,
            input: PtyInput::new(writer),
            resizer: PtyResizer {
                master: Arc::new(Mutex::new(pair.master)),
            },
        };

        Ok((session, reader))
    }

    /// Handle for writing to the program's stdin.
    pub fn input(&self) -> PtyInput {
        self.input.clone()
    }

    /// Handle for updating the PTY dimensions.
    pub fn resizer(&self) -> PtyResizer {
        self.resizer.clone()
    }

    /// Reap the child if it has exited, killing it otherwise.
    pub fn finish(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status);
        }
        self.child.kill().context("Failed to kill child")?;
        Ok(self.child.wait()?)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
