//! Steam → `CheapShark` mapping pipeline: batch processing, re-evaluation
//! scans and the recurring scheduler.

pub mod error;
pub mod intake;
pub mod processor;
pub mod reclassify;
pub mod scheduler;

pub use error::MapperError;
pub use intake::{enqueue_never_attempted, enqueue_unmapped, priority};
pub use processor::{BatchProcessor, ProcessorConfig};
pub use reclassify::{
    cleanup, reclassify_too_new, requeue, retry_by_criteria, retry_failed, retry_not_found,
    CleanupOutcome, ScanOutcome,
};
pub use scheduler::{
    Scheduler, SchedulerConfig, SchedulerState, SchedulerStatus, Tick, TickStats,
};
