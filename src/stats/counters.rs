//! Atomic pipeline counters with optional JSON persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct PipelineStats {
    /// Samples pushed into the buffer
    samples_ingested: AtomicU64,
    /// Windows handed to feature extraction
    windows_built: AtomicU64,
    /// Ticks that found too few samples
    ticks_skipped: AtomicU64,
    classifications_succeeded: AtomicU64,
    classifications_failed: AtomicU64,
    /// Calls aborted because a newer window superseded them
    classifications_abandoned: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            samples_ingested: AtomicU64::new(0),
            windows_built: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            classifications_succeeded: AtomicU64::new(0),
            classifications_failed: AtomicU64::new(0),
            classifications_abandoned: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that continue from, and save back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "Could not load previous statistics");
        }

        stats
    }

    pub fn record_sample(&self) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_samples(&self, count: u64) {
        self.samples_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_window_built(&self) {
        self.windows_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.classifications_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.classifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.classifications_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            windows_built: self.windows_built.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            classifications_succeeded: self.classifications_succeeded.load(Ordering::Relaxed),
            classifications_failed: self.classifications_failed.load(Ordering::Relaxed),
            classifications_abandoned: self.classifications_abandoned.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Samples ingested: {}\n\
             - Windows built: {}\n\
             - Ticks skipped: {}\n\
             - Classifications succeeded: {}\n\
             - Classifications failed: {}\n\
             - Classifications abandoned: {}\n\
             - Session duration: {} seconds",
            stats.samples_ingested,
            stats.windows_built,
            stats.ticks_skipped,
            stats.classifications_succeeded,
            stats.classifications_failed,
            stats.classifications_abandoned,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk. A no-op without a persistence path.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                samples_ingested: stats.samples_ingested,
                windows_built: stats.windows_built,
                ticks_skipped: stats.ticks_skipped,
                classifications_succeeded: stats.classifications_succeeded,
                classifications_failed: stats.classifications_failed,
                classifications_abandoned: stats.classifications_abandoned,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_ingested
                    .store(persisted.samples_ingested, Ordering::Relaxed);
                self.windows_built
                    .store(persisted.windows_built, Ordering::Relaxed);
                self.ticks_skipped
                    .store(persisted.ticks_skipped, Ordering::Relaxed);
                self.classifications_succeeded
                    .store(persisted.classifications_succeeded, Ordering::Relaxed);
                self.classifications_failed
                    .store(persisted.classifications_failed, Ordering::Relaxed);
                self.classifications_abandoned
                    .store(persisted.classifications_abandoned, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_ingested.store(0, Ordering::Relaxed);
        self.windows_built.store(0, Ordering::Relaxed);
        self.ticks_skipped.store(0, Ordering::Relaxed);
        self.classifications_succeeded.store(0, Ordering::Relaxed);
        self.classifications_failed.store(0, Ordering::Relaxed);
        self.classifications_abandoned.store(0, Ordering::Relaxed);
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_ingested: u64,
    pub windows_built: u64,
    pub ticks_skipped: u64,
    pub classifications_succeeded: u64,
    pub classifications_failed: u64,
    pub classifications_abandoned: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_ingested: u64,
    windows_built: u64,
    ticks_skipped: u64,
    classifications_succeeded: u64,
    classifications_failed: u64,
    classifications_abandoned: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedPipelineStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedPipelineStats {
    Arc::new(PipelineStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedPipelineStats {
    Arc::new(PipelineStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = PipelineStats::new();

        stats.record_sample();
        stats.record_samples(9);
        stats.record_window_built();
        stats.record_tick_skipped();
        stats.record_abandoned();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.samples_ingested, 10);
        assert_eq!(snapshot.windows_built, 1);
        assert_eq!(snapshot.ticks_skipped, 1);
        assert_eq!(snapshot.classifications_abandoned, 1);
        assert_eq!(snapshot.classifications_succeeded, 0);
    }

    #[test]
    fn test_reset() {
        let stats = PipelineStats::new();

        stats.record_samples(100);
        stats.record_success();
        stats.record_failure();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.samples_ingested, 0);
        assert_eq!(snapshot.classifications_succeeded, 0);
        assert_eq!(snapshot.classifications_failed, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = PipelineStats::new();
        let summary = stats.summary();

        assert!(summary.contains("Samples ingested: 0"));
        assert!(summary.contains("Classifications abandoned"));
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir().join(format!("msa-stats-{}.json", uuid::Uuid::new_v4()));

        let stats = PipelineStats::with_persistence(path.clone());
        stats.record_samples(42);
        stats.record_success();
        stats.save().unwrap();

        let reloaded = PipelineStats::with_persistence(path.clone());
        let snapshot = reloaded.snapshot();
        assert_eq!(snapshot.samples_ingested, 42);
        assert_eq!(snapshot.classifications_succeeded, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_save_without_path_is_noop() {
        assert!(PipelineStats::new().save().is_ok());
    }
}
