use std::fs::File;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::config::EncodingMode;
use crate::errors::{SearchError, SearchResult};

// Bytes requested from the underlying reader per read call
pub(crate) const BUFFER_CAPACITY: usize = 65536;

/// A contiguous span of decoded file text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk in the file, starting at 0
    pub index: usize,
    /// Byte offset of the first character in the decoded text stream.
    /// Equal to the file offset unless lossy decoding replaced bytes
    pub offset: u64,
    /// Number of characters in `text`
    pub char_len: usize,
    /// The chunk content
    pub text: String,
}

impl Chunk {
    /// Size of the chunk text in bytes
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }
}

/// Opens `path` and returns a lazy reader over its chunks.
///
/// Every call opens a fresh handle, so calling it again starts over from the
/// beginning of the file regardless of how far an earlier reader got.
pub fn chunked_file_reader(
    path: impl AsRef<Path>,
    chunk_size: NonZeroUsize,
    encoding_mode: EncodingMode,
) -> SearchResult<ChunkReader<File>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SearchError::from_open(path, e))?;
    debug!(
        "Opened {} for chunked reading ({} chars per chunk)",
        path.display(),
        chunk_size
    );
    Ok(ChunkReader::new(file, path, chunk_size, encoding_mode))
}

/// Splits a UTF-8 byte stream into chunks of at most `chunk_size` characters.
///
/// Reads happen in blocks of [`BUFFER_CAPACITY`] bytes, so at most one chunk
/// plus one block is held in memory. A character is never split between two
/// chunks, even when its bytes straddle two reads. Line boundaries are
/// ignored: a chunk ends wherever the character budget runs out.
///
/// The iterator is fused after the first error.
#[derive(Debug)]
pub struct ChunkReader<R> {
    reader: R,
    path: PathBuf,
    chunk_size: usize,
    encoding_mode: EncodingMode,
    // Bytes read but not yet decoded (at most one partial character in strict mode)
    raw: Vec<u8>,
    raw_offset: u64,
    // Decoded text; everything before `start` has already been handed out
    text: String,
    start: usize,
    counted_bytes: usize,
    counted_chars: usize,
    next_index: usize,
    emitted_bytes: u64,
    eof: bool,
    done: bool,
    replaced: bool,
}

impl<R: Read> ChunkReader<R> {
    /// Wraps `reader`. `path` is only used in error messages and logs
    pub fn new(
        reader: R,
        path: impl Into<PathBuf>,
        chunk_size: NonZeroUsize,
        encoding_mode: EncodingMode,
    ) -> Self {
        Self {
            reader,
            path: path.into(),
            chunk_size: chunk_size.get(),
            encoding_mode,
            raw: Vec::with_capacity(BUFFER_CAPACITY),
            raw_offset: 0,
            text: String::new(),
            start: 0,
            counted_bytes: 0,
            counted_chars: 0,
            next_index: 0,
            emitted_bytes: 0,
            eof: false,
            done: false,
            replaced: false,
        }
    }

    /// Maximum number of characters per chunk
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Appends one block from the reader to `raw`. Returns false at end of input
    fn fill(&mut self) -> io::Result<bool> {
        let start = self.raw.len();
        self.raw.resize(start + BUFFER_CAPACITY, 0);
        let read = loop {
            match self.reader.read(&mut self.raw[start..]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        match read {
            Ok(n) => {
                self.raw.truncate(start + n);
                Ok(n > 0)
            }
            Err(e) => {
                self.raw.truncate(start);
                Err(e)
            }
        }
    }

    /// Moves every complete character from `raw` into `text`
    fn decode(&mut self) -> SearchResult<()> {
        loop {
            let err = match std::str::from_utf8(&self.raw) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.raw_offset += self.raw.len() as u64;
                    self.raw.clear();
                    return Ok(());
                }
                Err(e) => e,
            };

            let valid_up_to = err.valid_up_to();
            self.text
                .push_str(std::str::from_utf8(&self.raw[..valid_up_to]).unwrap_or_default());

            let invalid_len = match err.error_len() {
                Some(len) => len,
                // Character cut off by the read boundary; finish it on the next fill
                None if !self.eof => {
                    self.raw.drain(..valid_up_to);
                    self.raw_offset += valid_up_to as u64;
                    return Ok(());
                }
                // Truncated sequence at end of file
                None => self.raw.len() - valid_up_to,
            };

            if self.encoding_mode == EncodingMode::FailFast {
                return Err(SearchError::encoding_error(
                    &self.path,
                    self.raw_offset + valid_up_to as u64,
                    err,
                ));
            }

            if !self.replaced {
                warn!("Invalid UTF-8 replaced in file: {}", self.path.display());
                self.replaced = true;
            }
            self.text.push(char::REPLACEMENT_CHARACTER);
            self.raw.drain(..valid_up_to + invalid_len);
            self.raw_offset += (valid_up_to + invalid_len) as u64;
        }
    }

    /// Byte index in `text` where a full chunk ends, if enough text is buffered
    fn split_point(&mut self) -> Option<usize> {
        let needed = self.chunk_size - self.counted_chars;
        let pending = &self.text[self.counted_bytes..];
        match pending.char_indices().nth(needed) {
            Some((idx, _)) => Some(self.counted_bytes + idx),
            None => {
                self.counted_chars += pending.chars().count();
                self.counted_bytes = self.text.len();
                None
            }
        }
    }

    fn take_chunk(&mut self, end: usize, char_len: usize) -> Chunk {
        let text = self.text[self.start..end].to_owned();
        let chunk = Chunk {
            index: self.next_index,
            offset: self.emitted_bytes,
            char_len,
            text,
        };
        self.next_index += 1;
        self.emitted_bytes += chunk.text.len() as u64;
        self.start = end;
        self.counted_bytes = end;
        self.counted_chars = 0;
        chunk
    }

    /// Drops text that has already been handed out
    fn compact(&mut self) {
        if self.start > 0 {
            self.text.drain(..self.start);
            self.counted_bytes -= self.start;
            self.start = 0;
        }
    }

    fn next_chunk(&mut self) -> SearchResult<Option<Chunk>> {
        loop {
            if let Some(end) = self.split_point() {
                return Ok(Some(self.take_chunk(end, self.chunk_size)));
            }
            if self.eof {
                if self.start == self.text.len() {
                    return Ok(None);
                }
                let end = self.text.len();
                let char_len = self.counted_chars;
                return Ok(Some(self.take_chunk(end, char_len)));
            }
            self.compact();
            if !self.fill()? {
                self.eof = true;
            }
            self.decode()?;
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = SearchResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => {
                trace!(
                    "Read chunk {} at offset {} ({} chars)",
                    chunk.index,
                    chunk.offset,
                    chunk.char_len
                );
                Some(Ok(chunk))
            }
            Ok(None) => {
                self.done = true;
                debug!(
                    "Finished reading {} chunks from {}",
                    self.next_index,
                    self.path.display()
                );
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn chunks_of(bytes: &[u8], chunk_size: usize) -> Vec<Chunk> {
        ChunkReader::new(
            Cursor::new(bytes.to_vec()),
            "mem",
            size(chunk_size),
            EncodingMode::FailFast,
        )
        .collect::<SearchResult<Vec<_>>>()
        .unwrap()
    }

    /// Hands out one byte per read call
    struct Trickle<R>(R);

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    /// Fails with `Interrupted` on every other call
    struct Flaky<R> {
        inner: R,
        interrupt: bool,
    }

    impl<R: Read> Read for Flaky<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_chunk_count_and_reassembly() {
        let content = "abcdefghij";
        for (chunk_size, expected) in [(1, 10), (3, 4), (10, 1), (11, 1)] {
            let chunks = chunks_of(content.as_bytes(), chunk_size);
            assert_eq!(chunks.len(), expected, "chunk size {}", chunk_size);

            let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(joined, content);
            assert!(chunks.iter().all(|c| c.char_len <= chunk_size));
            assert!(chunks.iter().all(|c| !c.text.is_empty()));
        }
    }

    #[test]
    fn test_chunks_count_characters_not_bytes() {
        let content = "张三在这里\n李四不在\n张三又来了";
        assert_eq!(content.chars().count(), 16);

        let chunks = chunks_of(content.as_bytes(), 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "张三在这");
        assert_eq!(chunks[3].text, "三又来了");
        for chunk in &chunks {
            assert_eq!(chunk.char_len, chunk.text.chars().count());
            assert_eq!(chunk.char_len, 4);
        }
    }

    #[test]
    fn test_final_chunk_may_be_shorter() {
        let chunks = chunks_of("héllo wörld".as_bytes(), 4);
        let lens: Vec<usize> = chunks.iter().map(|c| c.char_len).collect();
        assert_eq!(lens, vec![4, 4, 3]);
        assert_eq!(chunks[2].text, "rld");
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunks_of(b"", 1).is_empty());
        assert!(chunks_of(b"", 1024).is_empty());
    }

    #[test]
    fn test_index_and_offsets() {
        let chunks = chunks_of("aé€😀b".as_bytes(), 2);
        assert_eq!(chunks.len(), 3);

        let mut expected_offset = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.offset, expected_offset);
            expected_offset += chunk.byte_len() as u64;
        }
        assert_eq!(chunks[1].text, "€😀");
        assert_eq!(chunks[1].offset, 3);
    }

    #[test]
    fn test_multibyte_char_across_read_boundary() {
        // Put a 3-byte character right across the first 64 KiB block
        let mut content = "a".repeat(BUFFER_CAPACITY - 1);
        content.push('张');
        content.push_str("三\n");
        let total_chars = content.chars().count();

        let chunks = chunks_of(content.as_bytes(), total_chars);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);

        let chunks = chunks_of(content.as_bytes(), BUFFER_CAPACITY);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.ends_with('张'));
        assert_eq!(chunks[1].text, "三\n");
    }

    #[test]
    fn test_single_byte_reads() {
        let content = "张三在这里\n李四不在\n";
        let reader = ChunkReader::new(
            Trickle(Cursor::new(content.as_bytes().to_vec())),
            "mem",
            size(3),
            EncodingMode::FailFast,
        );
        let chunks: Vec<Chunk> = reader.collect::<SearchResult<_>>().unwrap();
        let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, content);
        assert_eq!(chunks.len(), 4);
    }

    #[test]
    fn test_interrupted_reads_are_retried() {
        let reader = ChunkReader::new(
            Flaky {
                inner: Cursor::new(b"retry me".to_vec()),
                interrupt: false,
            },
            "mem",
            size(100),
            EncodingMode::FailFast,
        );
        let chunks: Vec<Chunk> = reader.collect::<SearchResult<_>>().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "retry me");
    }

    #[test]
    fn test_small_chunks_over_many_blocks() {
        let line = "张三 wrote a line of text\n";
        let content = line.repeat(3 * BUFFER_CAPACITY / line.len() + 17);
        let mut reader = ChunkReader::new(
            Cursor::new(content.as_bytes().to_vec()),
            "mem",
            size(7),
            EncodingMode::FailFast,
        );

        let mut joined = String::new();
        let mut expected_offset = 0;
        while let Some(chunk) = reader.next() {
            let chunk = chunk.unwrap();
            assert_eq!(chunk.offset, expected_offset);
            expected_offset += chunk.byte_len() as u64;
            joined.push_str(&chunk.text);

            // Handed-out text is released before the next block is read
            assert!(reader.text.len() <= BUFFER_CAPACITY + 7 * 4);
            assert!(reader.start <= reader.text.len());
        }
        assert_eq!(joined, content);
        assert_eq!(reader.next_index, content.chars().count().div_ceil(7));
    }

    #[test]
    fn test_failfast_reports_offset_and_fuses() {
        let mut reader = ChunkReader::new(
            Cursor::new(b"ok\nbad \xff here".to_vec()),
            "bad.txt",
            size(1024),
            EncodingMode::FailFast,
        );

        match reader.next() {
            Some(Err(SearchError::EncodingError { path, offset, .. })) => {
                assert_eq!(path, PathBuf::from("bad.txt"));
                assert_eq!(offset, 7);
            }
            other => panic!("expected encoding error, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_failfast_truncated_sequence_at_eof() {
        // First two bytes of "张"
        let mut reader = ChunkReader::new(
            Cursor::new(b"abc\xe5\xbc".to_vec()),
            "cut.txt",
            size(1024),
            EncodingMode::FailFast,
        );
        assert!(matches!(
            reader.next(),
            Some(Err(SearchError::EncodingError { offset: 3, .. }))
        ));
    }

    #[test]
    fn test_lossy_replaces_invalid_bytes() {
        let reader = ChunkReader::new(
            Cursor::new(b"a\xffb\xe5\xbc".to_vec()),
            "lossy.txt",
            size(1024),
            EncodingMode::Lossy,
        );
        let chunks: Vec<Chunk> = reader.collect::<SearchResult<_>>().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "a\u{FFFD}b\u{FFFD}");
        assert_eq!(chunks[0].char_len, 4);
    }

    #[test]
    fn test_reopen_starts_from_beginning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "line one\nline two\nline three\n").unwrap();

        let mut first = chunked_file_reader(&path, size(5), EncodingMode::FailFast).unwrap();
        let head = first.next().unwrap().unwrap();
        assert_eq!(head.text, "line ");

        let all: Vec<Chunk> = chunked_file_reader(&path, size(5), EncodingMode::FailFast)
            .unwrap()
            .collect::<SearchResult<_>>()
            .unwrap();
        assert_eq!(all[0], head);
        assert_eq!(all.len(), 6);

        // The first reader carries on independently
        assert_eq!(first.next().unwrap().unwrap(), all[1]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = chunked_file_reader(&path, size(10), EncodingMode::FailFast).unwrap_err();
        assert!(matches!(err, SearchError::FileNotFound(p) if p == path));
    }
}
