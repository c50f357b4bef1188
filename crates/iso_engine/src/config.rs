use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::physics::{DEFAULT_RAY_COUNT, DEFAULT_VIEW_RADIUS, DEFAULT_VISIBILITY_STEP};
use crate::rendering::lighting::DEFAULT_LIGHT_BUFFER_SCALE;
use crate::rendering::shadow::{DEFAULT_SHADOW_ALPHA, DEFAULT_SHADOW_BUFFER_SCALE};
use crate::time_of_day::TimeOfDayConfig;

pub const DEFAULT_NIGHT_VIEW_RADIUS: f32 = 5.0;
pub const DEFAULT_CLEAR_COLOR: [u8; 4] = [20, 22, 28, 255];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value at {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for the presentation pipeline. Every field has a default, so `{}` is a
/// valid document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub light_buffer_scale: f32,
    pub shadow_buffer_scale: f32,
    pub shadow_alpha: u8,
    pub visibility_ray_count: u32,
    pub view_radius: f32,
    pub night_view_radius: f32,
    pub visibility_fov_degrees: f32,
    pub visibility_step: f32,
    pub clear_color: [u8; 4],
    pub time_of_day: TimeOfDayConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            light_buffer_scale: DEFAULT_LIGHT_BUFFER_SCALE,
            shadow_buffer_scale: DEFAULT_SHADOW_BUFFER_SCALE,
            shadow_alpha: DEFAULT_SHADOW_ALPHA,
            visibility_ray_count: DEFAULT_RAY_COUNT,
            view_radius: DEFAULT_VIEW_RADIUS,
            night_view_radius: DEFAULT_NIGHT_VIEW_RADIUS,
            visibility_fov_degrees: 360.0,
            visibility_step: DEFAULT_VISIBILITY_STEP,
            clear_color: DEFAULT_CLEAR_COLOR,
            time_of_day: TimeOfDayConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: EngineConfig = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| {
                let path = error.path().to_string();
                ConfigError::Parse {
                    path: if path.is_empty() { ".".to_string() } else { path },
                    source: error.into_inner(),
                }
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_scale("light_buffer_scale", self.light_buffer_scale)?;
        check_scale("shadow_buffer_scale", self.shadow_buffer_scale)?;
        check_positive("view_radius", self.view_radius)?;
        check_positive("night_view_radius", self.night_view_radius)?;
        check_positive("visibility_step", self.visibility_step)?;
        if !(self.visibility_fov_degrees > 0.0 && self.visibility_fov_degrees <= 360.0) {
            return Err(ConfigError::Invalid {
                field: "visibility_fov_degrees",
                reason: format!("expected (0, 360], got {}", self.visibility_fov_degrees),
            });
        }
        if self.visibility_ray_count == 0 {
            return Err(ConfigError::Invalid {
                field: "visibility_ray_count",
                reason: "expected at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn check_scale(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected (0, 1], got {value}"),
    })
}

fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected a positive number, got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_of_day::DayPhase;
    use tempfile::TempDir;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(EngineConfig::from_json_str("{}").expect("config"), EngineConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let config = EngineConfig::from_json_str(
            r#"{ "view_radius": 12.0, "time_of_day": { "night_seconds": 10.0, "start_phase": "NIGHT" } }"#,
        )
        .expect("config");
        assert_eq!(config.view_radius, 12.0);
        assert_eq!(config.time_of_day.night_seconds, 10.0);
        assert_eq!(config.time_of_day.start_phase, DayPhase::Night);
        assert_eq!(config.visibility_ray_count, DEFAULT_RAY_COUNT);
    }

    #[test]
    fn unknown_field_reports_its_path() {
        let error = EngineConfig::from_json_str(r#"{ "time_of_day": { "noon_seconds": 1.0 } }"#)
            .expect_err("unknown field");
        match error {
            ConfigError::Parse { path, .. } => assert!(path.starts_with("time_of_day"), "{path}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_type_reports_its_path() {
        let error = EngineConfig::from_json_str(r#"{ "clear_color": [1, 2, "x", 4] }"#)
            .expect_err("bad type");
        match error {
            ConfigError::Parse { path, .. } => assert_eq!(path, "clear_color[2]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let error = EngineConfig::from_json_str(r#"{ "light_buffer_scale": 0.0 }"#)
            .expect_err("zero scale");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "light_buffer_scale",
                ..
            }
        ));
        assert!(EngineConfig::from_json_str(r#"{ "visibility_ray_count": 0 }"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "shadow_alpha": 40 }"#).expect("write");
        assert_eq!(EngineConfig::load(&path).expect("config").shadow_alpha, 40);

        let missing = EngineConfig::load(&dir.path().join("absent.json")).expect_err("missing");
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
