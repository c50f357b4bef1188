use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::config::EngineConfig;
use crate::math::Vec2;
use crate::world::IsoWorld;
use crate::{resolve_app_paths, StartupError};

use super::input::InputCollector;
use super::metrics::{MetricsHandle, MetricsWindow};
use super::pacing::FramePacer;
use super::presenter::Presenter;
use super::scene::{Scene, SceneCommand, SceneRuntime};

/// Overrides [`LoopConfig::simulated_slow_frame_ms`] when set.
pub const SLOW_FRAME_ENV_VAR: &str = "ISO_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Iso Engine".to_string(),
            window_width: 1280,
            window_height: 720,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize presenter: {0}")]
    CreatePresenter(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(
    config: LoopConfig,
    engine_config: EngineConfig,
    scene: Box<dyn Scene>,
) -> Result<(), AppError> {
    run_app_with_metrics(config, engine_config, scene, MetricsHandle::default())
}

/// Opens the window, loads `scene` into a fresh [`IsoWorld`] and runs until the window
/// closes, `Esc` is pressed or the scene asks to quit.
pub fn run_app_with_metrics(
    config: LoopConfig,
    engine_config: EngineConfig,
    scene: Box<dyn Scene>,
    metrics: MetricsHandle,
) -> Result<(), AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        "startup"
    );

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                f64::from(config.window_width),
                f64::from(config.window_height),
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let presenter = Presenter::new(Arc::clone(&window)).map_err(AppError::CreatePresenter)?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let viewport = presenter.viewport();
    let world = IsoWorld::new(viewport, engine_config, Some(app_paths.assets_dir));
    let mut runtime = SceneRuntime::new(scene, world);
    runtime.load();

    let now = Instant::now();
    let pacer = FramePacer::from_config(&config, now);
    pacer.log_config();
    let mut state = LoopState {
        metrics_window: MetricsWindow::new(pacer.metrics_interval(), now),
        pacer,
        input: InputCollector::new(viewport.width, viewport.height),
        presenter,
        runtime,
        window,
        default_title: config.window_title,
        applied_title: None,
        metrics,
    };

    event_loop
        .run(move |event, target| match event {
            Event::WindowEvent { window_id, event } if window_id == state.window.id() => {
                if state.handle_window_event(event) == LoopControl::Exit {
                    target.exit();
                }
            }
            Event::AboutToWait => state.window.request_redraw(),
            Event::LoopExiting => {
                state.runtime.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Exit,
}

struct LoopState {
    pacer: FramePacer,
    input: InputCollector,
    presenter: Presenter,
    runtime: SceneRuntime,
    window: Arc<Window>,
    default_title: String,
    applied_title: Option<String>,
    metrics_window: MetricsWindow,
    metrics: MetricsHandle,
}

impl LoopState {
    fn handle_window_event(&mut self, event: WindowEvent) -> LoopControl {
        match event {
            WindowEvent::CloseRequested => {
                self.input.request_quit();
                info!(reason = "window_close", "shutdown_requested");
                return LoopControl::Exit;
            }
            WindowEvent::Resized(size) => {
                self.input.set_window_size(size.width, size.height);
                match self.presenter.resize(size.width, size.height) {
                    Ok(true) => self.runtime.resize(self.presenter.viewport()),
                    Ok(false) => {}
                    Err(error) => {
                        warn!(error = %error, "presenter_resize_failed");
                        return LoopControl::Exit;
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .set_cursor(Some(Vec2::new(position.x as f32, position.y as f32)));
            }
            WindowEvent::CursorLeft { .. } => self.input.set_cursor(None),
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.handle_mouse_button(button, state);
            }
            WindowEvent::MouseWheel { delta, .. } => self.input.handle_wheel(delta),
            WindowEvent::KeyboardInput { event, .. } => {
                self.input.handle_key_event(&event);
                if self.input.quit_requested() {
                    info!(reason = "escape_key", "shutdown_requested");
                    return LoopControl::Exit;
                }
            }
            WindowEvent::RedrawRequested => return self.redraw(),
            _ => {}
        }
        LoopControl::Continue
    }

    /// Runs the ticks owed since the last redraw, then renders and presents one frame.
    fn redraw(&mut self) -> LoopControl {
        let slow_frame_delay = self.pacer.slow_frame_delay();
        if !slow_frame_delay.is_zero() {
            thread::sleep(slow_frame_delay);
        }

        let now = Instant::now();
        let budget = self.pacer.begin_frame(now);
        let dt_seconds = self.pacer.fixed_dt_seconds();
        let mut control = LoopControl::Continue;
        let mut ticks_run = 0;
        for _ in 0..budget.ticks {
            let snapshot = self.input.next_snapshot();
            ticks_run += 1;
            if self.runtime.update(dt_seconds, &snapshot) == SceneCommand::Quit {
                info!(reason = "scene_request", "shutdown_requested");
                control = LoopControl::Exit;
                break;
            }
        }
        self.metrics_window.record_ticks(ticks_run);
        if !budget.dropped.is_zero() {
            warn!(
                dropped_backlog_ms = budget.dropped.as_millis() as u64,
                ticks = budget.ticks,
                "sim_clamp_triggered"
            );
        }

        let cap_sleep = self.pacer.cap_sleep(Instant::now());
        if !cap_sleep.is_zero() {
            thread::sleep(cap_sleep);
        }
        let stats = self.runtime.render(self.presenter.frame_mut());
        if let Err(error) = self.presenter.present() {
            warn!(error = %error, "presenter_draw_failed");
            control = LoopControl::Exit;
        }
        self.pacer.mark_presented(Instant::now());

        self.refresh_title();
        self.metrics_window.record_frame(budget.frame_dt, stats);
        self.metrics_window.flush_to(&self.metrics, now);
        control
    }

    fn refresh_title(&mut self) {
        let title = self.runtime.debug_title();
        if title == self.applied_title {
            return;
        }
        self.window
            .set_title(title.as_deref().unwrap_or(&self.default_title));
        self.applied_title = title;
    }
}
