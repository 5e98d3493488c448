use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glq_protocol::command::PayloadStats;
use tracing::info;

/// Counters shared by the control plane and the execution plane.
pub struct RendererStats {
    pub records_enqueued: AtomicU64,
    pub records_dispatched: AtomicU64,
    pub records_dropped: AtomicU64,
    pub queue_full_signals: AtomicU64,
    pub frames_finalized: AtomicU64,
    pub sync_jobs: AtomicU64,
    pub jobs_abandoned: AtomicU64,
    /// Render cycles that finalized a frame, and the time the last one took
    pub frames_timed: AtomicU64,
    pub last_frame_nanos: AtomicU64,
    pub payloads: Arc<PayloadStats>,
    pub start_time: std::time::Instant,
}

impl RendererStats {
    pub fn new() -> Self {
        Self {
            records_enqueued: AtomicU64::new(0),
            records_dispatched: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            queue_full_signals: AtomicU64::new(0),
            frames_finalized: AtomicU64::new(0),
            sync_jobs: AtomicU64::new(0),
            jobs_abandoned: AtomicU64::new(0),
            frames_timed: AtomicU64::new(0),
            last_frame_nanos: AtomicU64::new(0),
            payloads: Arc::new(PayloadStats::default()),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn record_frame_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.last_frame_nanos.store(nanos, Ordering::Relaxed);
        self.frames_timed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_enqueued: self.records_enqueued.load(Ordering::Relaxed),
            records_dispatched: self.records_dispatched.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            queue_full_signals: self.queue_full_signals.load(Ordering::Relaxed),
            frames_finalized: self.frames_finalized.load(Ordering::Relaxed),
            sync_jobs: self.sync_jobs.load(Ordering::Relaxed),
            jobs_abandoned: self.jobs_abandoned.load(Ordering::Relaxed),
            frames_timed: self.frames_timed.load(Ordering::Relaxed),
            last_frame_time: Duration::from_nanos(self.last_frame_nanos.load(Ordering::Relaxed)),
            payloads_outstanding: self.payloads.outstanding(),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }

    pub fn log_snapshot(&self) {
        let s = self.snapshot();
        info!(
            enqueued = s.records_enqueued,
            dispatched = s.records_dispatched,
            dropped = s.records_dropped,
            queue_full = s.queue_full_signals,
            frames = s.frames_finalized,
            sync_jobs = s.sync_jobs,
            abandoned = s.jobs_abandoned,
            last_frame_us = s.last_frame_time.as_micros() as u64,
            payloads_outstanding = s.payloads_outstanding,
            "renderer stats"
        );
    }
}

impl Default for RendererStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RendererStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub records_enqueued: u64,
    pub records_dispatched: u64,
    pub records_dropped: u64,
    pub queue_full_signals: u64,
    pub frames_finalized: u64,
    pub sync_jobs: u64,
    pub jobs_abandoned: u64,
    pub frames_timed: u64,
    pub last_frame_time: Duration,
    pub payloads_outstanding: u64,
    pub uptime_secs: f64,
}

pub(crate) fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}
