use chunkscout::{
    config::{ConfigOverrides, EncodingMode, SearchConfig},
    ChunkDispatcher, SearchError,
};
use clap::Parser;
use std::{
    io::{self, Write},
    num::NonZeroUsize,
    path::PathBuf,
    time::Instant,
};
use tracing_subscriber::EnvFilter;

type Result<T> = std::result::Result<T, SearchError>;

/// Search a text file for lines containing a keyword, one chunk per worker
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File to search (default: file.txt)
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Keyword to look for, matched literally and case-sensitively (default: 张三)
    #[arg(short = 'k', long)]
    keyword: Option<String>,

    /// Number of characters per chunk (default: 1048576)
    #[arg(short = 'c', long)]
    chunk_size: Option<NonZeroUsize>,

    /// Number of worker threads (default: CPU cores)
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Chunks allowed to wait for a worker (default: 2 * threads)
    #[arg(short = 'q', long)]
    queue_capacity: Option<NonZeroUsize>,

    /// How to handle invalid UTF-8 sequences (failfast|lossy)
    #[arg(long)]
    encoding: Option<String>,

    /// Configuration file, applied on top of the global and local ones
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    run()
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let encoding_mode = match cli.encoding.as_deref().map(str::to_lowercase).as_deref() {
        None => None,
        Some("lossy") => Some(EncodingMode::Lossy),
        Some("failfast") => Some(EncodingMode::FailFast),
        Some(other) => {
            return Err(SearchError::config_error(format!(
                "Unknown encoding mode '{}', expected failfast or lossy",
                other
            )))
        }
    };

    let config = SearchConfig::load_from(cli.config.as_deref())
        .map_err(|e| SearchError::config_error(e.to_string()))?
        .merge_with_cli(ConfigOverrides {
            file_path: cli.file,
            keyword: cli.keyword,
            chunk_size: cli.chunk_size,
            thread_count: cli.threads,
            queue_capacity: cli.queue_capacity,
            encoding_mode,
            log_level: cli.log_level,
        });

    init_logging(&config.log_level);

    let start = Instant::now();
    ChunkDispatcher::new(config).run()?;
    // A closed stdout is an IO error, not a panic
    writeln!(
        io::stdout().lock(),
        "搜索完成，耗时 {}",
        humantime::format_duration(start.elapsed())
    )?;
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs stay on stderr so stdout carries only matches and the summary
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
