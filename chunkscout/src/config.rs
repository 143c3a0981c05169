use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Default number of characters per chunk (1 MiB worth of ASCII)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Configuration for a chunked search.
///
/// # Configuration Locations
///
/// The configuration can be loaded from multiple locations in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.chunkscout.yaml` in the current directory
/// 3. Global `$HOME/.config/chunkscout/config.yaml`
///
/// Every field has a default, so no file is required. Without any file the
/// search looks for `张三` in `file.txt`.
///
/// # Configuration Format
///
/// ```yaml
/// # File to scan
/// file_path: "logs/app.log"
///
/// # Literal, case-sensitive keyword
/// keyword: "ERROR"
///
/// # Characters per chunk
/// chunk_size: 1048576
///
/// # Worker threads (default: CPU cores)
/// thread_count: 4
///
/// # Chunks allowed to wait in the queue (default: 2 * thread_count)
/// queue_capacity: 8
///
/// # How to treat invalid UTF-8 (failfast, lossy)
/// encoding_mode: "failfast"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// Command-line arguments take precedence over config file values, see
/// [`SearchConfig::merge_with_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// File to scan
    pub file_path: PathBuf,

    /// Keyword to look for. Matched literally and case-sensitively
    pub keyword: String,

    /// Maximum number of characters per chunk
    pub chunk_size: NonZeroUsize,

    /// Number of worker threads.
    /// Defaults to number of CPU cores if not specified
    pub thread_count: NonZeroUsize,

    /// Number of chunks that may wait for a worker before the reader blocks.
    /// Defaults to twice the thread count
    pub queue_capacity: Option<NonZeroUsize>,

    /// How invalid UTF-8 in the input is handled
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// How bytes that are not valid UTF-8 are treated while chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Stop with an encoding error at the first invalid sequence
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep going
    Lossy,
}

/// Values supplied on the command line. `None` keeps the configured value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub file_path: Option<PathBuf>,
    pub keyword: Option<String>,
    pub chunk_size: Option<NonZeroUsize>,
    pub thread_count: Option<NonZeroUsize>,
    pub queue_capacity: Option<NonZeroUsize>,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
}

fn default_chunk_size() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroUsize::MIN)
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("file.txt"),
            keyword: "张三".to_string(),
            chunk_size: default_chunk_size(),
            thread_count: default_thread_count(),
            queue_capacity: None,
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl SearchConfig {
    /// Creates a config for `file_path` and `keyword` with every other value defaulted
    pub fn new(file_path: impl Into<PathBuf>, keyword: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Global, then local config; later sources win
        let defaults = [
            dirs::config_dir().map(|p| p.join("chunkscout/config.yaml")),
            Some(PathBuf::from(".chunkscout.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicit path must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(file_path) = cli.file_path {
            self.file_path = file_path;
        }
        if let Some(keyword) = cli.keyword {
            self.keyword = keyword;
        }
        if let Some(chunk_size) = cli.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(thread_count) = cli.thread_count {
            self.thread_count = thread_count;
        }
        if cli.queue_capacity.is_some() {
            self.queue_capacity = cli.queue_capacity;
        }
        if let Some(encoding_mode) = cli.encoding_mode {
            self.encoding_mode = encoding_mode;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }

    /// Queue capacity with the default applied
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .map(NonZeroUsize::get)
            .unwrap_or_else(|| self.thread_count.get().saturating_mul(2))
    }
}
