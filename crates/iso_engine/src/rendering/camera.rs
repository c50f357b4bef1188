use crate::math::{Vec2, Vec3};
use crate::projection;

pub const CAMERA_ZOOM_DEFAULT: f32 = 1.0;
pub const CAMERA_ZOOM_MIN: f32 = 0.5;
pub const CAMERA_ZOOM_MAX: f32 = 2.0;
pub const CAMERA_ZOOM_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn center(self) -> Vec2 {
        Vec2::new(self.width as f32 * 0.5, self.height as f32 * 0.5)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// `follow` moves the camera.
    Following,
    /// `follow` is ignored; the camera stays where it was left.
    Free,
}

/// Maps iso-space pixels onto the window: `screen = (iso - position) * zoom + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Iso-space point shown at `offset`.
    pub position: Vec2,
    zoom: f32,
    offset: Vec2,
    viewport: Viewport,
    mode: CameraMode,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Viewport::default())
    }
}

impl Camera {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: CAMERA_ZOOM_DEFAULT,
            offset: viewport.center(),
            viewport,
            mode: CameraMode::Following,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn zoom(&self) -> f32 {
        clamp_camera_zoom(self.zoom)
    }

    pub fn set_zoom_clamped(&mut self, zoom: f32) {
        self.zoom = clamp_camera_zoom(zoom);
    }

    pub fn apply_zoom_steps(&mut self, steps: i32) {
        if steps == 0 {
            return;
        }
        let target_zoom = self.zoom + steps as f32 * CAMERA_ZOOM_STEP;
        self.set_zoom_clamped(target_zoom);
    }

    /// Re-centers the offset on the new viewport.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.offset = viewport.center();
    }

    pub fn world_to_screen(&self, iso: Vec2) -> Vec2 {
        (iso - self.position) * self.zoom() + self.offset
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        (screen - self.offset) * (1.0 / self.zoom()) + self.position
    }

    /// World position straight to window pixels.
    pub fn project(&self, world: Vec3) -> Vec2 {
        self.world_to_screen(projection::project(world))
    }

    /// Ground-plane (`z = 0`) world point under a window pixel.
    pub fn pick_ground(&self, screen: Vec2) -> Vec2 {
        let iso = self.screen_to_world(screen);
        projection::iso_to_cart(iso.x, iso.y)
    }

    /// Centers on `target_iso` while in follow mode. Returns whether the camera moved.
    /// No smoothing is applied; callers that want easing pass an eased target.
    pub fn follow(&mut self, target_iso: Vec2) -> bool {
        if self.mode != CameraMode::Following || !target_iso.is_finite() {
            return false;
        }
        self.position = target_iso;
        true
    }

    pub fn follow_world(&mut self, target: Vec3) -> bool {
        self.follow(projection::project(target))
    }

    pub fn stop_following(&mut self) {
        self.mode = CameraMode::Free;
    }

    pub fn resume_following(&mut self) {
        self.mode = CameraMode::Following;
    }

    pub fn is_following(&self) -> bool {
        self.mode == CameraMode::Following
    }

    /// Moves the view by a window-pixel delta at the current zoom.
    pub fn pan(&mut self, delta_screen: Vec2) {
        if !delta_screen.is_finite() {
            return;
        }
        self.position += delta_screen * (1.0 / self.zoom());
    }
}

fn clamp_camera_zoom(zoom: f32) -> f32 {
    if !zoom.is_finite() {
        return CAMERA_ZOOM_DEFAULT;
    }
    zoom.clamp(CAMERA_ZOOM_MIN, CAMERA_ZOOM_MAX)
}
