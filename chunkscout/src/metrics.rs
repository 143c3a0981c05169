use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters collected while a file is chunked and searched.
///
/// These only feed the log; no search result is ever built from them.
#[derive(Debug, Clone)]
pub struct SearchMetrics {
    // Producer side
    chunks_dispatched: Arc<AtomicU64>,
    chars_read: Arc<AtomicU64>,
    bytes_read: Arc<AtomicU64>,

    // Worker side
    lines_scanned: Arc<AtomicU64>,
    matches_reported: Arc<AtomicU64>,
    failed_chunks: Arc<AtomicU64>,

    // Bytes of chunk text queued or being searched
    in_flight_bytes: Arc<AtomicU64>,
    peak_in_flight_bytes: Arc<AtomicU64>,
}

impl SearchMetrics {
    /// Creates a new SearchMetrics instance
    pub fn new() -> Self {
        Self {
            chunks_dispatched: Arc::new(AtomicU64::new(0)),
            chars_read: Arc::new(AtomicU64::new(0)),
            bytes_read: Arc::new(AtomicU64::new(0)),
            lines_scanned: Arc::new(AtomicU64::new(0)),
            matches_reported: Arc::new(AtomicU64::new(0)),
            failed_chunks: Arc::new(AtomicU64::new(0)),
            in_flight_bytes: Arc::new(AtomicU64::new(0)),
            peak_in_flight_bytes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records a chunk handed to the worker queue
    pub fn record_dispatch(&self, chars: u64, bytes: u64) {
        self.chunks_dispatched.fetch_add(1, Ordering::Relaxed);
        self.chars_read.fetch_add(chars, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);

        let total = self.in_flight_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let mut peak = self.peak_in_flight_bytes.load(Ordering::Relaxed);
        while total > peak {
            match self.peak_in_flight_bytes.compare_exchange_weak(
                peak,
                total,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
        debug!("Chunk queued: {} bytes, in flight: {} bytes", bytes, total);
    }

    /// Records a chunk a worker has finished with, successfully or not
    pub fn record_release(&self, bytes: u64) {
        let total = self.in_flight_bytes.fetch_sub(bytes, Ordering::Relaxed) - bytes;
        debug!("Chunk released: {} bytes, in flight: {} bytes", bytes, total);
    }

    /// Records the outcome of a successful chunk scan
    pub fn record_scan(&self, lines: u64, matches: u64) {
        self.lines_scanned.fetch_add(lines, Ordering::Relaxed);
        self.matches_reported.fetch_add(matches, Ordering::Relaxed);
    }

    /// Records a chunk whose search failed and whose matches were dropped
    pub fn record_failure(&self) {
        self.failed_chunks.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> SearchStats {
        SearchStats {
            chunks_dispatched: self.chunks_dispatched.load(Ordering::Relaxed),
            chars_read: self.chars_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines_scanned: self.lines_scanned.load(Ordering::Relaxed),
            matches_reported: self.matches_reported.load(Ordering::Relaxed),
            failed_chunks: self.failed_chunks.load(Ordering::Relaxed),
            in_flight_bytes: self.in_flight_bytes.load(Ordering::Relaxed),
            peak_in_flight_bytes: self.peak_in_flight_bytes.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Search stats:\n\
             Chunks dispatched: {}\n\
             Read: {} chars / {} bytes\n\
             Lines scanned: {}\n\
             Matches reported: {}\n\
             Failed chunks: {}\n\
             Peak in flight: {} bytes",
            stats.chunks_dispatched,
            stats.chars_read,
            stats.bytes_read,
            stats.lines_scanned,
            stats.matches_reported,
            stats.failed_chunks,
            stats.peak_in_flight_bytes
        );
    }
}

impl Default for SearchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`SearchMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchStats {
    pub chunks_dispatched: u64,
    pub chars_read: u64,
    pub bytes_read: u64,
    pub lines_scanned: u64,
    pub matches_reported: u64,
    pub failed_chunks: u64,
    pub in_flight_bytes: u64,
    pub peak_in_flight_bytes: u64,
}
