pub mod archiver;
pub mod deduplicator;
pub mod error;
pub mod job_manager;
pub mod logger;
pub mod output_collector;
pub mod pipeline;
pub mod work_loader;

// Exporting types for convenience
pub use deduplicator::{DedupKey, Deduplicator};
pub use error::{Error, Result};
pub use job_manager::{JobManager, WorkerOutcome, WorkerResult};
pub use pipeline::{PipelineConfig, RunSummary};
pub use work_loader::PageRange;
