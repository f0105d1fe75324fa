pub mod crawler;
pub mod error;
pub mod limiter;
pub mod result;
pub mod serpapi;
pub mod source;

pub use crawler::{
    CheckpointCallback, CrawlConfig, CrawlProgress, Crawler, ProgressCallback,
};
pub use error::{CrawlError, SourceError};
pub use limiter::RateLimiter;
pub use result::{
    CrawlCheckpoint, CrawlOutcome, EdgeRecord, NodeId, RelatedVideo, VideoMetadata,
};
pub use serpapi::SerpApiSource;
pub use source::{RelationSource, is_valid_video_id};
