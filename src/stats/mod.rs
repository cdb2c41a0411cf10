//! Run statistics for the Motion Spectrum Agent.
//!
//! Counters are updated lock-free from the ingestion thread and the tick
//! loop, and can be persisted so `status` reports cumulative numbers.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_stats, create_shared_stats_with_persistence, PipelineStats, SharedPipelineStats,
    StatsSnapshot,
};
