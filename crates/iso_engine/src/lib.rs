pub mod app;
pub mod config;
pub mod map;
pub mod math;
pub mod nodes;
pub mod paths;
pub mod physics;
pub mod projection;
pub mod rendering;
pub mod scene_graph;
pub mod time_of_day;
pub mod world;

pub use app::{
    run_app, run_app_with_metrics, AppError, InputAction, InputSnapshot, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, Presenter, Scene, SceneCommand, SceneRuntime,
    SLOW_FRAME_ENV_VAR,
};
pub use config::{ConfigError, EngineConfig};
pub use map::{install_map, load_map, parse_map_json, InstalledMap, MapDesc, MapError};
pub use math::{Vec2, Vec3};
pub use nodes::{Block, Flicker, FloorTile, ImageSprite, LightNode, Wall};
pub use paths::{resolve_app_paths, AppPaths, StartupError, ROOT_ENV_VAR};
pub use physics::{
    compute_visibility, Body, BodyId, BodyKind, CellKey, RegisterOutcome, SpatialIndex,
    VisibilityPolygon, VisibilityRequest, WorldExtents,
};
pub use rendering::{
    Camera, CameraMode, DirectionalLight, LightingError, PointLight, SpriteKey, Surface, Viewport,
    WallSide,
};
pub use scene_graph::{
    Group, LightEmitter, NodeContent, NodeId, Renderable, SceneGraph, SceneGraphError,
};
pub use time_of_day::{DayPhase, TimeOfDay, TimeOfDayConfig};
pub use world::{BodySpec, FrameStats, IsoWorld};
