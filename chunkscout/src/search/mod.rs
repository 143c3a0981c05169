//! Chunked keyword search.
//!
//! Three pieces, wired in one direction:
//!
//! 1. [`chunker`] reads the file lazily and yields chunks of at most
//!    `chunk_size` characters.
//! 2. [`dispatcher`] pushes each chunk into a bounded queue served by a
//!    rayon thread pool and waits for the pool to finish.
//! 3. [`worker`] splits a chunk into lines and reports every line that
//!    contains the keyword.
//!
//! ```rust,ignore
//! use chunkscout::search::search_in_file;
//!
//! search_in_file("server.log", "timeout", None)?;
//! ```
//!
//! Chunks are cut by character count, not at line ends. A line that spans
//! two chunks is searched as two separate lines, so a keyword split across
//! the boundary is not found.
pub mod chunker;
pub mod dispatcher;
pub mod worker;

pub use chunker::{chunked_file_reader, Chunk, ChunkReader};
pub use dispatcher::{search_in_file, ChunkDispatcher};
pub use worker::{matching_lines, scan_chunk, search_in_chunk, ChunkScan, MatchSink, StdoutSink};
