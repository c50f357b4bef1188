mod input;
mod loop_runner;
mod metrics;
mod pacing;
mod presenter;
mod scene;

pub use input::{InputAction, InputSnapshot};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use presenter::Presenter;
pub use scene::{Scene, SceneCommand, SceneRuntime};
