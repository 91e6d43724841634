//! Service layer: orchestration worker, persistence, progress fan-out and caching.

pub mod cache;
pub mod progress;
pub mod store;
pub mod worker;

pub use cache::RedisCache;
pub use progress::{ProgressHub, TracingObserver};
pub use store::{AnalysisStore, PgAnalysisStore};
pub use worker::{AnalysisWorker, WorkerError};
