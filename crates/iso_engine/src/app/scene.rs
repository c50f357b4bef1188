use tracing::{info, warn};

use crate::rendering::camera::Viewport;
use crate::rendering::surface::Surface;
use crate::world::{FrameStats, IsoWorld};

use super::input::InputSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Quit,
}

/// Gameplay hook driven by the runtime. The world is owned by the runtime and lent to
/// the scene for each call.
pub trait Scene {
    fn load(&mut self, world: &mut IsoWorld);
    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot, world: &mut IsoWorld)
        -> SceneCommand;
    fn unload(&mut self, world: &mut IsoWorld);
    fn debug_title(&self, _world: &IsoWorld) -> Option<String> {
        None
    }
}

/// A scene together with the world it runs in.
pub struct SceneRuntime {
    scene: Box<dyn Scene>,
    world: IsoWorld,
    is_loaded: bool,
}

impl SceneRuntime {
    pub fn new(scene: Box<dyn Scene>, world: IsoWorld) -> Self {
        Self {
            scene,
            world,
            is_loaded: false,
        }
    }

    pub fn world(&self) -> &IsoWorld {
        &self.world
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn load(&mut self) {
        if self.is_loaded {
            return;
        }
        self.scene.load(&mut self.world);
        self.is_loaded = true;
        info!(nodes = self.world.graph().len(), bodies = self.world.spatial().len(), "scene_loaded");
    }

    /// Applies engine-level camera controls, then the scene's own tick, then advances
    /// world time.
    pub fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) -> SceneCommand {
        if !self.is_loaded {
            return SceneCommand::None;
        }
        let camera = self.world.camera_mut();
        if input.zoom_delta_steps() != 0 {
            camera.apply_zoom_steps(input.zoom_delta_steps());
        }
        if input.camera_follow_toggle_pressed() {
            if camera.is_following() {
                camera.stop_following();
            } else {
                camera.resume_following();
            }
            info!(following = camera.is_following(), "camera_follow_toggled");
        }

        let command = self.scene.update(fixed_dt_seconds, input, &mut self.world);
        self.world.update(fixed_dt_seconds);
        command
    }

    pub fn render(&mut self, frame: &mut Surface) -> Option<FrameStats> {
        if !self.is_loaded {
            return None;
        }
        match self.world.render_frame(frame) {
            Ok(stats) => Some(stats),
            Err(error) => {
                warn!(error = %error, "frame_render_failed");
                None
            }
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.world.resize(viewport);
    }

    pub fn debug_title(&self) -> Option<String> {
        self.scene.debug_title(&self.world)
    }

    pub fn shutdown(&mut self) {
        if !self.is_loaded {
            return;
        }
        self.scene.unload(&mut self.world);
        self.is_loaded = false;
        info!("scene_unloaded");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::math::Vec3;
    use crate::nodes::FloorTile;

    #[derive(Default)]
    struct Calls {
        loads: u32,
        updates: u32,
        unloads: u32,
    }

    struct Probe(Rc<RefCell<Calls>>);

    impl Scene for Probe {
        fn load(&mut self, world: &mut IsoWorld) {
            self.0.borrow_mut().loads += 1;
            let root = world.root();
            world
                .spawn(root, "tile", Vec3::new(0.5, 0.5, 0.0), FloorTile { color: [80, 80, 80] })
                .expect("tile");
        }

        fn update(&mut self, _dt: f32, input: &InputSnapshot, _world: &mut IsoWorld) -> SceneCommand {
            self.0.borrow_mut().updates += 1;
            if input.quit_requested() {
                SceneCommand::Quit
            } else {
                SceneCommand::None
            }
        }

        fn unload(&mut self, _world: &mut IsoWorld) {
            self.0.borrow_mut().unloads += 1;
        }
    }

    fn runtime() -> (SceneRuntime, Rc<RefCell<Calls>>) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let world = IsoWorld::new(Viewport::new(160, 120), EngineConfig::default(), None);
        (SceneRuntime::new(Box::new(Probe(Rc::clone(&calls))), world), calls)
    }

    #[test]
    fn load_and_shutdown_run_once() {
        let (mut runtime, calls) = runtime();
        runtime.load();
        runtime.load();
        runtime.shutdown();
        runtime.shutdown();
        assert_eq!(calls.borrow().loads, 1);
        assert_eq!(calls.borrow().unloads, 1);
    }

    #[test]
    fn update_is_ignored_until_loaded() {
        let (mut runtime, calls) = runtime();
        assert_eq!(runtime.update(1.0 / 60.0, &InputSnapshot::empty()), SceneCommand::None);
        assert_eq!(calls.borrow().updates, 0);
        runtime.load();
        runtime.update(1.0 / 60.0, &InputSnapshot::empty());
        assert_eq!(calls.borrow().updates, 1);
    }

    #[test]
    fn zoom_and_follow_toggle_reach_the_camera() {
        let (mut runtime, _) = runtime();
        runtime.load();
        let input = InputSnapshot::empty()
            .with_zoom_delta_steps(2)
            .with_camera_follow_toggle_pressed(true);
        runtime.update(1.0 / 60.0, &input);
        assert!((runtime.world().camera().zoom() - 1.2).abs() < 1e-5);
        assert!(!runtime.world().camera().is_following());
    }

    #[test]
    fn render_draws_the_loaded_world() {
        let (mut runtime, _) = runtime();
        let mut frame = Surface::new(160, 120);
        assert!(runtime.render(&mut frame).is_none());
        runtime.load();
        let stats = runtime.render(&mut frame).expect("stats");
        assert_eq!(stats.draw.drawn, 1);
    }
}
