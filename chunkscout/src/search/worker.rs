use std::io::{self, Write};
use tracing::warn;

/// Printed in front of every matching line
pub const MATCH_PREFIX: &str = "找到了:";

/// Destination for matching lines.
///
/// Shared by every worker thread, so implementations must handle concurrent
/// calls. A call reports one complete line.
pub trait MatchSink: Send + Sync {
    fn report(&self, line: &str) -> io::Result<()>;
}

/// Writes `找到了: <line>` to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl MatchSink for StdoutSink {
    fn report(&self, line: &str) -> io::Result<()> {
        // Hold the lock for the whole line so workers never interleave mid-line
        let mut out = io::stdout().lock();
        writeln!(out, "{} {}", MATCH_PREFIX, line)
    }
}

/// What a single chunk scan saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkScan {
    pub lines: usize,
    pub matches: usize,
}

/// Lines of `chunk` containing `keyword`, in order.
///
/// Lines are split on `\n` only. A `\r` before the newline stays part of the
/// line, and text after the last newline counts as a line even when empty.
pub fn matching_lines<'a>(chunk: &'a str, keyword: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    chunk.split('\n').filter(move |line| line.contains(keyword))
}

/// Reports every line of `chunk` that contains `keyword` to `sink`.
///
/// Stops at the first sink error; lines reported before it stay reported.
pub fn scan_chunk<S>(chunk: &str, keyword: &str, sink: &S) -> io::Result<ChunkScan>
where
    S: MatchSink + ?Sized,
{
    let mut scan = ChunkScan::default();
    for line in chunk.split('\n') {
        scan.lines += 1;
        if line.contains(keyword) {
            sink.report(line)?;
            scan.matches += 1;
        }
    }
    Ok(scan)
}

/// Prints every line of `chunk` that contains `keyword` to stdout.
///
/// Nothing is returned; a write failure is logged and the remaining matches
/// of the chunk are dropped.
pub fn search_in_chunk(chunk: &str, keyword: &str) {
    if let Err(e) = scan_chunk(chunk, keyword, &StdoutSink) {
        warn!("Failed to print matches, dropping the rest of the chunk: {}", e);
    }
}
