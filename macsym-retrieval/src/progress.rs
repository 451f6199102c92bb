//! Transfer progress reporting.

use std::time::Instant;

/// A snapshot of a running transfer, emitted after every chunk completion.
#[derive(Clone, Debug)]
pub struct DownloadProgress {
    /// The URL being fetched.
    pub url: String,
    /// File name of the final output.
    pub filename: String,
    /// Declared total size in bytes.
    pub total_size: u64,
    /// Bytes fetched so far.
    pub downloaded_size: u64,
    /// Number of chunks finished.
    pub chunks_completed: usize,
    /// Total number of chunks in this transfer.
    pub total_chunks: usize,
    /// Instantaneous speed in bytes per second, from elapsed wall time.
    pub speed: f64,
    /// Estimated seconds until completion.
    pub eta: f64,
}

impl DownloadProgress {
    /// Completed fraction of the transfer, in percent.
    pub fn percent(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        self.downloaded_size as f64 / self.total_size as f64 * 100.0
    }
}

/// Accumulates progress across chunk completions.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    url: String,
    filename: String,
    total_size: u64,
    total_chunks: usize,
    downloaded_size: u64,
    chunks_completed: usize,
    started: Instant,
}

impl ProgressTracker {
    pub fn new(url: &str, filename: &str, total_size: u64, total_chunks: usize) -> Self {
        ProgressTracker {
            url: url.to_owned(),
            filename: filename.to_owned(),
            total_size,
            total_chunks,
            downloaded_size: 0,
            chunks_completed: 0,
            started: Instant::now(),
        }
    }

    /// Records one completed chunk and returns the updated snapshot.
    pub fn complete_chunk(&mut self, chunk_size: u64) -> DownloadProgress {
        self.downloaded_size += chunk_size;
        self.chunks_completed += 1;

        let elapsed = self.started.elapsed().as_secs_f64();
        let (speed, eta) = speed_and_eta(self.downloaded_size, self.total_size, elapsed);

        DownloadProgress {
            url: self.url.clone(),
            filename: self.filename.clone(),
            total_size: self.total_size,
            downloaded_size: self.downloaded_size,
            chunks_completed: self.chunks_completed,
            total_chunks: self.total_chunks,
            speed,
            eta,
        }
    }
}

fn speed_and_eta(downloaded: u64, total: u64, elapsed: f64) -> (f64, f64) {
    if elapsed == 0.0 {
        return (0.0, 0.0);
    }
    let speed = downloaded as f64 / elapsed;
    if speed == 0.0 {
        return (0.0, 0.0);
    }
    let eta = total.saturating_sub(downloaded) as f64 / speed;
    (speed, eta)
}

/// Formats a byte count with binary units.
pub fn format_size(bytes: f64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes <= 0.0 {
        return "0 B".into();
    }

    let exponent = (bytes.log2() / 10.0).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes / (1u64 << (exponent * 10)) as f64;

    if exponent == 0 {
        format!("{value:.0} {}", UNITS[exponent])
    } else {
        format!("{value:.2} {}", UNITS[exponent])
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0.0), "0 B");
        assert_eq!(format_size(512.0), "512 B");
        assert_eq!(format_size(8.0 * 1024.0 * 1024.0), "8.00 MiB");
        assert_eq!(format_size(1536.0), "1.50 KiB");
    }

    #[test]
    fn test_progress_accumulates() {
        let mut tracker = ProgressTracker::new("http://example/a", "a", 100, 4);

        let progress = tracker.complete_chunk(25);
        assert_eq!(progress.chunks_completed, 1);
        assert_eq!(progress.downloaded_size, 25);
        assert_eq!(progress.percent(), 25.0);

        let progress = tracker.complete_chunk(25);
        assert_eq!(progress.percent(), 50.0);
    }

    #[test]
    fn test_speed_and_eta() {
        let (speed, eta) = speed_and_eta(50, 100, 2.0);
        assert_eq!(speed, 25.0);
        assert_eq!(eta, 2.0);

        assert_eq!(speed_and_eta(50, 100, 0.0), (0.0, 0.0));
    }
}
