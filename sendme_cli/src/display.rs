use std::io::Write;

use sendme_core::ProgressEvent;
use sendme_core::progress::format_bytes;
use tokio::sync::mpsc;

/// Draws a single progress line on stderr until the stream ends.
///
/// `header` is called once the entry count is known. With `entries` set that
/// is after the collection manifest arrived, otherwise on the first bytes.
pub async fn show_progress<F>(mut rx: mpsc::Receiver<ProgressEvent>, entries: bool, mut header: F)
where
    F: FnMut(usize, u64) + Send,
{
    let mut total = 0u64;
    let mut found = 0usize;
    let mut announced = false;
    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::SizeKnown { bytes } => total = bytes,
            ProgressEvent::Found { .. } => found += 1,
            ProgressEvent::Progress { bytes_so_far } => {
                if !announced && (found > 0 || !entries) {
                    eprint!("\r");
                    header(found, total);
                    announced = true;
                }
                eprint!("\r{} / {}", format_bytes(bytes_so_far), format_bytes(total));
                let _ = std::io::stderr().flush();
            }
            ProgressEvent::Done => {
                eprintln!();
                if !announced {
                    header(found, total);
                    announced = true;
                }
            }
        }
    }
}
