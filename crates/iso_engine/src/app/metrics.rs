use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LockResult, RwLock};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::world::FrameStats;

static POISON_WARNED: AtomicBool = AtomicBool::new(false);

/// Takes the guard out of a poisoned lock; the snapshot is plain data, so whatever a
/// panicking writer left behind is still a valid value.
fn recover<G>(result: LockResult<G>, operation: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        if !POISON_WARNED.swap(true, Ordering::Relaxed) {
            warn!(operation, "metrics_lock_poisoned");
        }
        poisoned.into_inner()
    })
}

/// Loop rates over the last interval plus draw counts of the most recent frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub sprites_drawn: usize,
    pub sprites_culled: usize,
    pub shadows_cast: usize,
    pub lights_drawn: usize,
}

impl LoopMetricsSnapshot {
    fn log(&self) {
        info!(
            fps = self.fps,
            tps = self.tps,
            frame_time_ms = self.frame_time_ms,
            sprites_drawn = self.sprites_drawn,
            sprites_culled = self.sprites_culled,
            shadows_cast = self.shadows_cast,
            lights_drawn = self.lights_drawn,
            "loop_metrics"
        );
    }
}

/// Shared read side of the loop metrics. Clones observe the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    latest: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        *recover(self.latest.read(), "read")
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        *recover(self.latest.write(), "write") = snapshot;
    }
}

/// Counts frames and ticks until `interval` has passed, then yields one snapshot.
#[derive(Debug)]
pub(crate) struct MetricsWindow {
    interval: Duration,
    opened_at: Instant,
    frames: u32,
    ticks: u32,
    frame_time_total: Duration,
    last_stats: FrameStats,
}

impl MetricsWindow {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            opened_at: now,
            frames: 0,
            ticks: 0,
            frame_time_total: Duration::ZERO,
            last_stats: FrameStats::default(),
        }
    }

    pub(crate) fn record_ticks(&mut self, ticks: u32) {
        self.ticks = self.ticks.saturating_add(ticks);
    }

    /// `stats` is `None` when nothing was rendered (no scene loaded or a failed frame).
    pub(crate) fn record_frame(&mut self, frame_dt: Duration, stats: Option<FrameStats>) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_total = self.frame_time_total.saturating_add(frame_dt);
        if let Some(stats) = stats {
            self.last_stats = stats;
        }
    }

    /// Closes the window once the interval has elapsed and starts the next one at `now`.
    pub(crate) fn close_if_due(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.opened_at);
        if elapsed < self.interval {
            return None;
        }
        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = match self.frames {
            0 => 0.0,
            frames => self.frame_time_total.as_secs_f32() * 1000.0 / frames as f32,
        };
        let stats = self.last_stats;
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / seconds,
            tps: self.ticks as f32 / seconds,
            frame_time_ms,
            sprites_drawn: stats.draw.drawn,
            sprites_culled: stats.draw.culled,
            shadows_cast: stats.shadows.directional + stats.shadows.point,
            lights_drawn: stats.lighting.lights_drawn,
        };
        *self = Self {
            last_stats: stats,
            ..Self::new(self.interval, now)
        };
        Some(snapshot)
    }

    /// Publishes and logs a snapshot when the window closes.
    pub(crate) fn flush_to(&mut self, handle: &MetricsHandle, now: Instant) {
        if let Some(snapshot) = self.close_if_due(now) {
            handle.publish(snapshot);
            snapshot.log();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn poison(handle: &MetricsHandle) {
        let latest = Arc::clone(&handle.latest);
        let _ = thread::spawn(move || {
            let _guard = latest.write().expect("write guard");
            panic!("poison metrics lock");
        })
        .join();
    }

    #[test]
    fn rates_cover_the_whole_window() {
        let start = Instant::now();
        let mut window = MetricsWindow::new(Duration::from_secs(1), start);
        window.record_ticks(3);
        window.record_ticks(1);
        window.record_frame(Duration::from_millis(10), None);
        window.record_frame(Duration::from_millis(30), None);

        let snapshot = window
            .close_if_due(start + Duration::from_secs(2))
            .expect("snapshot");
        assert!((snapshot.fps - 1.0).abs() < 1e-4);
        assert!((snapshot.tps - 2.0).abs() < 1e-4);
        assert!((snapshot.frame_time_ms - 20.0).abs() < 1e-3);
    }

    #[test]
    fn window_stays_open_until_the_interval_passes() {
        let start = Instant::now();
        let mut window = MetricsWindow::new(Duration::from_secs(1), start);
        window.record_frame(Duration::from_millis(16), None);
        assert!(window.close_if_due(start + Duration::from_millis(999)).is_none());

        let closed_at = start + Duration::from_secs(1);
        assert!(window.close_if_due(closed_at).is_some());
        assert!(window.close_if_due(closed_at + Duration::from_millis(10)).is_none());
    }

    #[test]
    fn latest_frame_counts_survive_unrendered_frames() {
        let start = Instant::now();
        let mut window = MetricsWindow::new(Duration::from_secs(1), start);
        let mut stats = FrameStats::default();
        stats.draw.drawn = 7;
        stats.draw.culled = 2;
        stats.shadows.directional = 4;
        stats.lighting.lights_drawn = 3;
        window.record_frame(Duration::from_millis(16), Some(stats));
        window.record_frame(Duration::from_millis(16), None);

        let snapshot = window
            .close_if_due(start + Duration::from_secs(1))
            .expect("snapshot");
        assert_eq!(snapshot.sprites_drawn, 7);
        assert_eq!(snapshot.sprites_culled, 2);
        assert_eq!(snapshot.shadows_cast, 4);
        assert_eq!(snapshot.lights_drawn, 3);
    }

    #[test]
    fn handle_keeps_working_after_a_writer_panics() {
        let handle = MetricsHandle::default();
        poison(&handle);
        assert_eq!(handle.snapshot(), LoopMetricsSnapshot::default());

        let expected = LoopMetricsSnapshot {
            fps: 30.0,
            sprites_drawn: 42,
            ..LoopMetricsSnapshot::default()
        };
        handle.publish(expected);
        assert_eq!(handle.clone().snapshot(), expected);
    }
}
