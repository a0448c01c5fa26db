//! Progress reporting for import and transfer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Default capacity of a progress channel
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A named entry was discovered.
    Found { name: String },
    /// The total number of payload bytes is known.
    SizeKnown { bytes: u64 },
    /// Cumulative payload bytes processed so far. Never decreases.
    Progress { bytes_so_far: u64 },
    Done,
}

/// Sending half of a progress stream.
///
/// Clones share one cumulative byte counter, so `Progress` events from any
/// clone are emitted in non-decreasing order. The channel is bounded: a slow
/// consumer back-pressures the producer, while a missing or dropped consumer
/// is ignored.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressEvent>>,
    bytes: Arc<AtomicU64>,
}

impl ProgressSender {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx: Some(tx),
            bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A sender that discards every event.
    pub fn noop() -> Self {
        Self::default()
    }

    pub async fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Add `n` bytes to the running total and report it.
    pub async fn advance(&self, n: u64) {
        let total = self.bytes.fetch_add(n, Ordering::SeqCst) + n;
        if self.tx.is_some() {
            self.send(ProgressEvent::Progress {
                bytes_so_far: total,
            })
            .await;
        }
    }

    pub fn bytes_so_far(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

/// Create a bounded progress channel.
pub fn channel(capacity: usize) -> (ProgressSender, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ProgressSender::new(tx), rx)
}

/// Format a byte count with binary units, e.g. `1.50 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.2} {}", value, unit)
}

/// Format transfer speed from bytes and elapsed time
pub fn format_transfer_speed(bytes_transferred: u64, elapsed_secs: f64) -> String {
    if elapsed_secs <= 0.0 {
        return "Starting...".to_string();
    }

    let speed_bps = bytes_transferred as f64 / elapsed_secs;
    if speed_bps > 1_000_000.0 {
        format!("{:.2} MB/s", speed_bps / 1_000_000.0)
    } else if speed_bps > 1_000.0 {
        format!("{:.1} KB/s", speed_bps / 1_000.0)
    } else {
        format!("{:.0} B/s", speed_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(1536 * 1024), "1.50 MiB");
    }

    #[test]
    fn test_format_transfer_speed() {
        assert_eq!(format_transfer_speed(100, 0.0), "Starting...");
        assert_eq!(format_transfer_speed(500, 1.0), "500 B/s");
        assert_eq!(format_transfer_speed(2_500, 1.0), "2.5 KB/s");
        assert_eq!(format_transfer_speed(3_000_000, 1.0), "3.00 MB/s");
    }

    #[tokio::test]
    async fn test_progress_is_cumulative_across_clones() {
        let (progress, mut rx) = channel(8);
        let other = progress.clone();
        progress.advance(10).await;
        other.advance(5).await;
        progress.send(ProgressEvent::Done).await;
        drop(progress);
        drop(other);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(
            events,
            vec![
                ProgressEvent::Progress { bytes_so_far: 10 },
                ProgressEvent::Progress { bytes_so_far: 15 },
                ProgressEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_ignored() {
        let (progress, rx) = channel(1);
        drop(rx);
        progress.advance(42).await;
        progress.send(ProgressEvent::Done).await;
        assert_eq!(progress.bytes_so_far(), 42);
    }
}
