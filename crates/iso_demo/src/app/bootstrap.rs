use std::path::PathBuf;
use std::process::ExitCode;

use iso_engine::{load_map, parse_map_json, EngineConfig, LoopConfig, MapDesc, MapError, Scene};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use super::courtyard::CourtyardScene;

const CONFIG_ENV_VAR: &str = "ISO_CONFIG";
const MAP_ENV_VAR: &str = "ISO_MAP";
const COURTYARD_MAP_JSON: &str = include_str!("../../assets/maps/courtyard.json");

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) engine_config: EngineConfig,
    pub(crate) scene: Box<dyn Scene>,
}

pub(crate) fn build_app() -> Result<AppWiring, ExitCode> {
    init_tracing();
    info!("=== Iso Demo Startup ===");

    let engine_config = engine_config_from_env();
    let map = match map_from_env() {
        Ok(map) => map,
        Err(err) => {
            error!(error = %err, "map_load_failed");
            return Err(ExitCode::FAILURE);
        }
    };
    info!(
        width = map.width,
        height = map.height,
        tiles = map.tiles.len(),
        walls = map.walls.len(),
        objects = map.objects.len(),
        "map_loaded"
    );

    let config = LoopConfig {
        window_title: "Iso Demo".to_string(),
        ..LoopConfig::default()
    };

    Ok(AppWiring {
        config,
        engine_config,
        scene: Box::new(CourtyardScene::new(map)),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// A bad config file is not fatal: the demo falls back to defaults.
fn engine_config_from_env() -> EngineConfig {
    let Some(path) = env_path(CONFIG_ENV_VAR) else {
        return EngineConfig::default();
    };
    match EngineConfig::load(&path) {
        Ok(config) => {
            info!(path = %path.display(), "engine_config_loaded");
            config
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "engine_config_rejected");
            EngineConfig::default()
        }
    }
}

fn map_from_env() -> Result<MapDesc, MapError> {
    match env_path(MAP_ENV_VAR) {
        Some(path) => load_map(&path),
        None => parse_map_json(COURTYARD_MAP_JSON),
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
