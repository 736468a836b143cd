use std::io::Read;
use std::thread;
use tokio::sync::mpsc::{Receiver, channel};
use tracing::debug;

/// Chunks buffered between the reader thread and the output loop.
const CHUNK_QUEUE: usize = 32;

/// Spawns a background thread to read from a PTY.
///
/// Each successful read becomes one chunk, delivered in order. The channel
/// closes when the PTY reports EOF or an error (the usual outcome once the
/// child has exited).
pub fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = channel(CHUNK_QUEUE);

    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if tx.blocking_send(buffer[..n].to_vec()).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    debug!(error = %e, "PTY read ended");
                    break;
                }
            }
        }
    });

    rx
}
