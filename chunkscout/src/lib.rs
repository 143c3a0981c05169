pub mod config;
pub mod errors;
pub mod metrics;
pub mod search;

pub use config::{ConfigOverrides, EncodingMode, SearchConfig};
pub use errors::{SearchError, SearchResult};
pub use metrics::{SearchMetrics, SearchStats};
pub use search::{search_in_file, ChunkDispatcher};
