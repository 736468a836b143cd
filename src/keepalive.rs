//! Idle keepalive.
//!
//! Traffic in either direction is reported through an [`ActivityNotifier`];
//! when nothing has been reported for a full period the [`KeepaliveMonitor`]
//! writes its filler string to the child's stdin.

use crate::pty::PtyInput;
use crate::server::IdlePolicy;
use std::io::{self, Read, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Shortest idle period accepted from configuration.
pub const MIN_IDLE: Duration = Duration::from_secs(5);

/// Filler sent when the configuration does not name one.
pub const DEFAULT_FILLER: &str = "@";

/// Reports stream activity to the monitor.
///
/// The channel holds a single pending notification; further notifications
/// are dropped until the monitor has consumed it.
#[derive(Clone)]
pub struct ActivityNotifier {
    tx: mpsc::Sender<()>,
}

impl ActivityNotifier {
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Reader that reports every non-empty read.
pub struct ActivityReader<R> {
    inner: R,
    notifier: ActivityNotifier,
}

impl<R> ActivityReader<R> {
    pub fn new(inner: R, notifier: ActivityNotifier) -> Self {
        Self { inner, notifier }
    }
}

impl<R: Read> Read for ActivityReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.notifier.notify();
        }
        Ok(n)
    }
}

/// Writer that reports every non-empty write.
pub struct ActivityWriter<W> {
    inner: W,
    notifier: ActivityNotifier,
}

impl<W> ActivityWriter<W> {
    pub fn new(inner: W, notifier: ActivityNotifier) -> Self {
        Self { inner, notifier }
    }
}

impl<W: Write> Write for ActivityWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.notifier.notify();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct KeepaliveMonitor {
    period: Duration,
    filler: Vec<u8>,
    activity: mpsc::Receiver<()>,
    input: PtyInput,
}

impl KeepaliveMonitor {
    /// Build a monitor for `policy`, or `None` when keepalive is disabled.
    ///
    /// The period is floored at [`MIN_IDLE`].
    pub fn for_policy(policy: &IdlePolicy, input: PtyInput) -> Option<(ActivityNotifier, Self)> {
        if !policy.is_enabled() {
            return None;
        }
        let filler = policy.filler.as_deref().unwrap_or(DEFAULT_FILLER);
        Some(Self::with_period(
            policy.timeout().max(MIN_IDLE),
            filler,
            input,
        ))
    }

    fn with_period(period: Duration, filler: &str, input: PtyInput) -> (ActivityNotifier, Self) {
        let (tx, rx) = mpsc::channel(1);
        let monitor = Self {
            period,
            filler: filler.as_bytes().to_vec(),
            activity: rx,
            input,
        };
        (ActivityNotifier { tx }, monitor)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run until every notifier has been dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                seen = self.activity.recv() => {
                    if seen.is_none() {
                        debug!("keepalive stopped, no activity sources left");
                        return;
                    }
                }
                _ = tokio::time::sleep(self.period) => {
                    match self.input.write(&self.filler) {
                        Ok(()) => debug!(period = ?self.period, "idle, sent keepalive filler"),
                        Err(e) => warn!(error = %e, "failed to send keepalive filler"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SharedBuf;
    use tokio::time::sleep;

    fn policy(max_seconds: u64, filler: Option<&str>) -> IdlePolicy {
        IdlePolicy {
            max_seconds,
            filler: filler.map(str::to_string),
        }
    }

    #[test]
    fn test_disabled_policy() {
        let input = PtyInput::new(SharedBuf::default());
        assert!(KeepaliveMonitor::for_policy(&policy(0, None), input).is_none());
    }

    #[test]
    fn test_period_floor_and_default_filler() {
        let input = PtyInput::new(SharedBuf::default());
        let (_, monitor) = KeepaliveMonitor::for_policy(&policy(1, None), input.clone()).unwrap();
        assert_eq!(monitor.period(), MIN_IDLE);
        assert_eq!(monitor.filler, DEFAULT_FILLER.as_bytes());

        let (_, monitor) = KeepaliveMonitor::for_policy(&policy(30, Some(" ")), input).unwrap();
        assert_eq!(monitor.period(), Duration::from_secs(30));
        assert_eq!(monitor.filler, b" ");
    }

    #[test]
    fn test_notifications_coalesce() {
        let input = PtyInput::new(SharedBuf::default());
        let (notifier, mut monitor) =
            KeepaliveMonitor::with_period(Duration::from_secs(1), "@", input);
        notifier.notify();
        notifier.notify();
        notifier.notify();
        assert!(monitor.activity.try_recv().is_ok());
        assert!(monitor.activity.try_recv().is_err());
    }

    #[test]
    fn test_activity_wrappers_report_traffic() {
        let input = PtyInput::new(SharedBuf::default());
        let (notifier, mut monitor) =
            KeepaliveMonitor::with_period(Duration::from_secs(1), "@", input);

        let mut reader = ActivityReader::new(&b"hi"[..], notifier.clone());
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert!(monitor.activity.try_recv().is_ok());
        // EOF is not activity.
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(monitor.activity.try_recv().is_err());

        let mut writer = ActivityWriter::new(Vec::new(), notifier);
        writer.write_all(b"out").unwrap();
        assert!(monitor.activity.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_filler_sent_when_idle() {
        let child = SharedBuf::default();
        let (_notifier, monitor) =
            KeepaliveMonitor::with_period(Duration::from_millis(50), "@", PtyInput::new(child.clone()));
        let handle = tokio::spawn(monitor.run());

        sleep(Duration::from_millis(180)).await;
        let sent = child.contents();
        assert!(!sent.is_empty());
        assert!(sent.iter().all(|b| *b == b'@'));
        handle.abort();
    }

    #[tokio::test]
    async fn test_activity_postpones_filler() {
        let child = SharedBuf::default();
        let (notifier, monitor) = KeepaliveMonitor::with_period(
            Duration::from_millis(300),
            "@",
            PtyInput::new(child.clone()),
        );
        let handle = tokio::spawn(monitor.run());

        for _ in 0..12 {
            notifier.notify();
            sleep(Duration::from_millis(50)).await;
        }
        assert!(child.contents().is_empty());

        sleep(Duration::from_millis(500)).await;
        assert!(!child.contents().is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_monitor_stops_without_sources() {
        let input = PtyInput::new(SharedBuf::default());
        let (notifier, monitor) =
            KeepaliveMonitor::with_period(Duration::from_secs(60), "@", input);
        drop(notifier);
        tokio::time::timeout(Duration::from_secs(1), monitor.run())
            .await
            .unwrap();
    }
}
