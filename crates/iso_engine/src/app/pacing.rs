use std::env;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::loop_runner::{LoopConfig, SLOW_FRAME_ENV_VAR};

const FALLBACK_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);
const FALLBACK_METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// What one redraw should do before presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameBudget {
    /// Wall time since the previous redraw, unclamped.
    pub(crate) frame_dt: Duration,
    pub(crate) ticks: u32,
    /// Backlog thrown away because the tick cap was hit.
    pub(crate) dropped: Duration,
}

/// Fixed-timestep accounting for the redraw loop: turns wall time into a number of
/// simulation ticks and paces presentation to an optional FPS cap.
#[derive(Debug)]
pub(crate) struct FramePacer {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    render_target: Option<Duration>,
    slow_frame_delay: Duration,
    metrics_interval: Duration,
    accumulator: Duration,
    last_frame: Instant,
    last_present: Instant,
}

impl FramePacer {
    pub(crate) fn from_config(config: &LoopConfig, now: Instant) -> Self {
        let slow_frame_delay = slow_frame_delay_from_env(config.simulated_slow_frame_ms);
        Self::new(config, slow_frame_delay, now)
    }

    fn new(config: &LoopConfig, slow_frame_delay: Duration, now: Instant) -> Self {
        let target_tps = config.target_tps.max(1);
        Self {
            fixed_dt: Duration::from_secs_f64(1.0 / f64::from(target_tps)),
            max_frame_delta: non_zero_or(config.max_frame_delta, FALLBACK_MAX_FRAME_DELTA),
            max_ticks_per_frame: config.max_ticks_per_frame.max(1),
            render_target: config
                .max_render_fps
                .filter(|fps| *fps > 0)
                .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps))),
            slow_frame_delay,
            metrics_interval: non_zero_or(config.metrics_log_interval, FALLBACK_METRICS_INTERVAL),
            accumulator: Duration::ZERO,
            last_frame: now,
            last_present: now,
        }
    }

    pub(crate) fn fixed_dt_seconds(&self) -> f32 {
        self.fixed_dt.as_secs_f32()
    }

    pub(crate) fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub(crate) fn slow_frame_delay(&self) -> Duration {
        self.slow_frame_delay
    }

    pub(crate) fn log_config(&self) {
        info!(
            fixed_dt_ms = self.fixed_dt.as_secs_f64() * 1000.0,
            max_frame_delta_ms = self.max_frame_delta.as_millis() as u64,
            max_ticks_per_frame = self.max_ticks_per_frame,
            metrics_interval_ms = self.metrics_interval.as_millis() as u64,
            slow_frame_delay_ms = self.slow_frame_delay.as_millis() as u64,
            render_fps_cap = %self.render_cap_label(),
            "loop_config"
        );
    }

    /// Adds the time since the previous redraw (clamped) to the accumulator and
    /// spends it on whole ticks, at most `max_ticks_per_frame`. A backlog of one full
    /// tick or more that is left over after that is dropped.
    pub(crate) fn begin_frame(&mut self, now: Instant) -> FrameBudget {
        let frame_dt = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.accumulator = self
            .accumulator
            .saturating_add(frame_dt.min(self.max_frame_delta));

        let available = (self.accumulator.as_nanos() / self.fixed_dt.as_nanos().max(1)) as u64;
        let ticks = available.min(u64::from(self.max_ticks_per_frame)) as u32;
        self.accumulator = self.accumulator.saturating_sub(self.fixed_dt * ticks);

        let dropped = if self.accumulator >= self.fixed_dt {
            std::mem::take(&mut self.accumulator)
        } else {
            Duration::ZERO
        };
        FrameBudget {
            frame_dt,
            ticks,
            dropped,
        }
    }

    /// How long to wait before presenting so frames stay under the FPS cap.
    pub(crate) fn cap_sleep(&self, now: Instant) -> Duration {
        self.render_target.map_or(Duration::ZERO, |target| {
            target.saturating_sub(now.saturating_duration_since(self.last_present))
        })
    }

    pub(crate) fn mark_presented(&mut self, now: Instant) {
        self.last_present = now;
    }

    fn render_cap_label(&self) -> String {
        match self.render_target {
            Some(target) => format!("{:.0}", 1.0 / target.as_secs_f64()),
            None => "off".to_string(),
        }
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

/// The env var wins over the config value; an unparsable value is ignored with a warning.
fn slow_frame_delay_from_env(config_ms: u64) -> Duration {
    let from_config = Duration::from_millis(config_ms);
    let raw = match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(raw) => raw,
        Err(env::VarError::NotPresent) => return from_config,
        Err(error) => {
            warn!(env_var = SLOW_FRAME_ENV_VAR, error = %error, "slow_frame_env_unreadable");
            return from_config;
        }
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => {
            warn!(env_var = SLOW_FRAME_ENV_VAR, value = raw.as_str(), "slow_frame_env_invalid");
            from_config
        }
    }
}
