use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPoolBuilder;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, info, trace, warn};

use super::chunker::{chunked_file_reader, Chunk};
use super::worker::{scan_chunk, MatchSink, StdoutSink};
use crate::config::SearchConfig;
use crate::errors::SearchResult;
use crate::metrics::SearchMetrics;

/// Searches `file_path` for `keyword`, printing every matching line.
///
/// Uses the default configuration apart from the chunk size. Returns once
/// every chunk has been searched.
pub fn search_in_file(
    file_path: impl Into<PathBuf>,
    keyword: &str,
    chunk_size: Option<NonZeroUsize>,
) -> SearchResult<()> {
    let mut config = SearchConfig::new(file_path, keyword);
    if let Some(chunk_size) = chunk_size {
        config.chunk_size = chunk_size;
    }
    ChunkDispatcher::new(config).run()
}

/// Feeds chunks of a file to a pool of worker threads.
///
/// The calling thread reads chunks and pushes them into a bounded queue;
/// one long-lived loop per pool thread pulls chunks and scans them. Matches
/// go straight to the sink. [`ChunkDispatcher::run`] returns only after
/// every queued chunk has been scanned.
pub struct ChunkDispatcher<S = StdoutSink> {
    config: SearchConfig,
    sink: S,
    metrics: SearchMetrics,
}

impl ChunkDispatcher<StdoutSink> {
    /// Creates a dispatcher that prints matches to stdout
    pub fn new(config: SearchConfig) -> Self {
        Self::with_sink(config, StdoutSink)
    }
}

impl<S: MatchSink> ChunkDispatcher<S> {
    /// Creates a dispatcher that reports matches to `sink`
    pub fn with_sink(config: SearchConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            metrics: SearchMetrics::new(),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Gets the counters for the searches run so far
    pub fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    /// Chunks the configured file and searches every chunk.
    ///
    /// Fails if the file cannot be opened or decoded. Worker failures are
    /// logged and never returned.
    pub fn run(&self) -> SearchResult<()> {
        info!(
            "Searching {} for {:?} in chunks of {} chars",
            self.config.file_path.display(),
            self.config.keyword,
            self.config.chunk_size
        );
        let chunks = chunked_file_reader(
            &self.config.file_path,
            self.config.chunk_size,
            self.config.encoding_mode,
        )?;
        self.run_chunks(chunks)
    }

    /// Searches chunks from any producer.
    ///
    /// Feeding stops at the first producer error. Chunks already queued are
    /// still searched before the error is returned.
    pub fn run_chunks<I>(&self, chunks: I) -> SearchResult<()>
    where
        I: IntoIterator<Item = SearchResult<Chunk>>,
    {
        let worker_count = self.config.thread_count.get();
        let queue_capacity = self.config.effective_queue_capacity();
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("chunkscout-worker-{}", i))
            .build()?;
        debug!(
            "Started {} workers with a queue of {} chunks",
            worker_count, queue_capacity
        );

        let (chunk_tx, chunk_rx) = bounded::<Chunk>(queue_capacity);
        let keyword = self.config.keyword.as_str();

        // The producer runs on this thread; the scope joins every worker
        let outcome = pool.in_place_scope(|scope| {
            for worker_idx in 0..worker_count {
                let rx = chunk_rx.clone();
                scope.spawn(move |_| self.drain(worker_idx, &rx, keyword));
            }
            drop(chunk_rx);
            self.feed(chunks, chunk_tx)
        });

        self.metrics.log_stats();
        match &outcome {
            Ok(()) => info!(
                "Search complete. Reported {} matches",
                self.metrics.get_stats().matches_reported
            ),
            Err(e) => warn!("Search stopped early: {}", e),
        }
        outcome
    }

    /// Pushes chunks into the queue. Dropping `chunk_tx` on return lets the
    /// workers run dry and exit.
    fn feed<I>(&self, chunks: I, chunk_tx: Sender<Chunk>) -> SearchResult<()>
    where
        I: IntoIterator<Item = SearchResult<Chunk>>,
    {
        for chunk in chunks {
            let chunk = chunk?;
            let bytes = chunk.byte_len() as u64;
            self.metrics.record_dispatch(chunk.char_len as u64, bytes);
            trace!("Dispatching chunk {}", chunk.index);

            if let Err(rejected) = chunk_tx.send(chunk) {
                self.metrics.record_release(bytes);
                warn!(
                    "No workers left, stopping at chunk {}",
                    rejected.into_inner().index
                );
                break;
            }
        }
        Ok(())
    }

    /// Worker loop: scans chunks until the queue is closed and empty
    fn drain(&self, worker_idx: usize, chunk_rx: &Receiver<Chunk>, keyword: &str) {
        for chunk in chunk_rx.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                scan_chunk(&chunk.text, keyword, &self.sink)
            }));
            match outcome {
                Ok(Ok(scan)) => self
                    .metrics
                    .record_scan(scan.lines as u64, scan.matches as u64),
                Ok(Err(e)) => {
                    self.metrics.record_failure();
                    warn!(
                        "Worker {} dropped the rest of chunk {}: {}",
                        worker_idx, chunk.index, e
                    );
                }
                Err(_) => {
                    self.metrics.record_failure();
                    warn!(
                        "Worker {} panicked on chunk {}, its matches are lost",
                        worker_idx, chunk.index
                    );
                }
            }
            self.metrics.record_release(chunk.byte_len() as u64);
        }
        trace!("Worker {} finished", worker_idx);
    }
}
