use std::f32::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::math::Vec2;
use crate::rendering::lighting::DirectionalLight;

const MIN_PHASE_SECONDS: f32 = 0.1;
const MAX_TRANSITIONS_PER_ADVANCE: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayPhase {
    Dawn,
    Day,
    Evening,
    Night,
}

impl DayPhase {
    pub fn next(self) -> DayPhase {
        match self {
            Self::Dawn => Self::Day,
            Self::Day => Self::Evening,
            Self::Evening => Self::Night,
            Self::Night => Self::Dawn,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dawn => "DAWN",
            Self::Day => "DAY",
            Self::Evening => "EVENING",
            Self::Night => "NIGHT",
        }
    }

    pub fn ambient_color(self) -> [u8; 3] {
        match self {
            Self::Dawn => [70, 60, 80],
            Self::Day => [120, 120, 130],
            Self::Evening => [80, 60, 70],
            Self::Night => [20, 20, 30],
        }
    }

    pub fn sun_intensity(self) -> f32 {
        match self {
            Self::Night => 0.05,
            Self::Dawn | Self::Evening => 0.2,
            Self::Day => 0.6,
        }
    }

    pub fn sun_color(self) -> [u8; 3] {
        match self {
            Self::Dawn => [255, 200, 160],
            Self::Day => [255, 255, 240],
            Self::Evening => [255, 170, 120],
            Self::Night => [120, 140, 200],
        }
    }

    /// The moon tints but casts no shadows.
    pub fn casts_sun_shadows(self) -> bool {
        self != Self::Night
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeOfDayConfig {
    pub dawn_seconds: f32,
    pub day_seconds: f32,
    pub evening_seconds: f32,
    pub night_seconds: f32,
    pub start_phase: DayPhase,
}

impl Default for TimeOfDayConfig {
    fn default() -> Self {
        Self {
            dawn_seconds: 30.0,
            day_seconds: 120.0,
            evening_seconds: 30.0,
            night_seconds: 90.0,
            start_phase: DayPhase::Day,
        }
    }
}

impl TimeOfDayConfig {
    pub fn duration(&self, phase: DayPhase) -> f32 {
        let seconds = match phase {
            DayPhase::Dawn => self.dawn_seconds,
            DayPhase::Day => self.day_seconds,
            DayPhase::Evening => self.evening_seconds,
            DayPhase::Night => self.night_seconds,
        };
        if seconds.is_finite() {
            seconds.max(MIN_PHASE_SECONDS)
        } else {
            MIN_PHASE_SECONDS
        }
    }
}

/// Day/night cycle advanced only by the `dt` it is handed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeOfDay {
    config: TimeOfDayConfig,
    phase: DayPhase,
    phase_elapsed: f32,
    day_count: u32,
}

impl TimeOfDay {
    pub fn new(config: TimeOfDayConfig) -> Self {
        Self {
            config,
            phase: config.start_phase,
            phase_elapsed: 0.0,
            day_count: 1,
        }
    }

    pub fn phase(&self) -> DayPhase {
        self.phase
    }

    pub fn day_count(&self) -> u32 {
        self.day_count
    }

    pub fn phase_elapsed(&self) -> f32 {
        self.phase_elapsed
    }

    /// `0..1` through the current phase.
    pub fn phase_progress(&self) -> f32 {
        (self.phase_elapsed / self.config.duration(self.phase)).clamp(0.0, 1.0)
    }

    pub fn set_phase(&mut self, phase: DayPhase) {
        self.phase = phase;
        self.phase_elapsed = 0.0;
    }

    /// Returns the number of phase changes that happened.
    pub fn advance(&mut self, dt_seconds: f32) -> u32 {
        if !dt_seconds.is_finite() || dt_seconds <= 0.0 {
            return 0;
        }
        self.phase_elapsed += dt_seconds;
        let mut transitions = 0;
        while self.phase_elapsed >= self.config.duration(self.phase) {
            self.phase_elapsed -= self.config.duration(self.phase);
            self.phase = self.phase.next();
            if self.phase == DayPhase::Dawn {
                self.day_count = self.day_count.saturating_add(1);
            }
            transitions += 1;
            info!(
                phase = self.phase.name(),
                day = self.day_count,
                "time_of_day_phase_changed"
            );
            if transitions >= MAX_TRANSITIONS_PER_ADVANCE {
                self.phase_elapsed = 0.0;
                break;
            }
        }
        transitions
    }

    pub fn ambient_color(&self) -> [u8; 3] {
        self.phase.ambient_color()
    }

    pub fn casts_sun_shadows(&self) -> bool {
        self.phase.casts_sun_shadows()
    }

    /// Direction shadows fall in. Sweeps from +x to +y across the daylight phases and
    /// rests on the `(1, 1)` diagonal at night.
    pub fn sun_direction(&self) -> Vec2 {
        let daylight = self.config.duration(DayPhase::Dawn)
            + self.config.duration(DayPhase::Day)
            + self.config.duration(DayPhase::Evening);
        let before = match self.phase {
            DayPhase::Dawn => 0.0,
            DayPhase::Day => self.config.duration(DayPhase::Dawn),
            DayPhase::Evening => {
                self.config.duration(DayPhase::Dawn) + self.config.duration(DayPhase::Day)
            }
            DayPhase::Night => return Vec2::new(1.0, 1.0),
        };
        let fraction = ((before + self.phase_elapsed) / daylight).clamp(0.0, 1.0);
        let angle = fraction * PI * 0.5;
        Vec2::new(angle.cos(), angle.sin())
    }

    pub fn sun(&self) -> DirectionalLight {
        DirectionalLight::new(
            self.sun_direction(),
            self.phase.sun_color(),
            self.phase.sun_intensity(),
        )
    }
}
