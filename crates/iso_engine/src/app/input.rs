use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Quit,
}

impl InputAction {
    const COUNT: usize = 5;

    const fn index(self) -> usize {
        self as usize
    }

    fn bound_to(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::KeyW | KeyCode::ArrowUp => Some(Self::MoveUp),
            KeyCode::KeyS | KeyCode::ArrowDown => Some(Self::MoveDown),
            KeyCode::KeyA | KeyCode::ArrowLeft => Some(Self::MoveLeft),
            KeyCode::KeyD | KeyCode::ArrowRight => Some(Self::MoveRight),
            KeyCode::Escape => Some(Self::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ActionStates {
    down: [bool; InputAction::COUNT],
}

/// Input state handed to one simulation tick. Press edges are true for exactly one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputSnapshot {
    quit_requested: bool,
    actions: ActionStates,
    cursor_position_px: Option<Vec2>,
    left_click_pressed: bool,
    camera_follow_toggle_pressed: bool,
    zoom_delta_steps: i32,
    window_size: (u32, u32),
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.down[action.index()]
    }

    pub fn with_quit_requested(mut self, quit_requested: bool) -> Self {
        self.quit_requested = quit_requested;
        self
    }

    pub fn with_action_down(mut self, action: InputAction, is_down: bool) -> Self {
        self.actions.down[action.index()] = is_down;
        self
    }

    pub fn with_cursor_position_px(mut self, cursor_position_px: Option<Vec2>) -> Self {
        self.cursor_position_px = cursor_position_px;
        self
    }

    pub fn with_left_click_pressed(mut self, left_click_pressed: bool) -> Self {
        self.left_click_pressed = left_click_pressed;
        self
    }

    pub fn with_camera_follow_toggle_pressed(mut self, pressed: bool) -> Self {
        self.camera_follow_toggle_pressed = pressed;
        self
    }

    pub fn with_zoom_delta_steps(mut self, steps: i32) -> Self {
        self.zoom_delta_steps = steps;
        self
    }

    pub fn cursor_position_px(&self) -> Option<Vec2> {
        self.cursor_position_px
    }

    pub fn left_click_pressed(&self) -> bool {
        self.left_click_pressed
    }

    pub fn camera_follow_toggle_pressed(&self) -> bool {
        self.camera_follow_toggle_pressed
    }

    pub fn zoom_delta_steps(&self) -> i32 {
        self.zoom_delta_steps
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    /// Ground-plane movement intent from the held direction keys. Screen "up" maps to
    /// the world's `(-1, -1)` diagonal; the result is normalized or zero.
    pub fn movement_direction(&self) -> Vec2 {
        let axis = |negative: InputAction, positive: InputAction| {
            f32::from(u8::from(self.is_down(positive))) - f32::from(u8::from(self.is_down(negative)))
        };
        let screen = Vec2::new(
            axis(InputAction::MoveLeft, InputAction::MoveRight),
            axis(InputAction::MoveUp, InputAction::MoveDown),
        );
        Vec2::new(screen.x + screen.y, screen.y - screen.x)
            .normalized()
            .unwrap_or(Vec2::ZERO)
    }
}

/// Rising-edge latch: reports one press per physical press, ignoring key repeat.
#[derive(Debug, Default, Clone, Copy)]
struct PressLatch {
    held: bool,
    fired: bool,
}

impl PressLatch {
    fn update(&mut self, state: ElementState) {
        let pressed = state == ElementState::Pressed;
        if pressed && !self.held {
            self.fired = true;
        }
        self.held = pressed;
    }

    fn take(&mut self) -> bool {
        std::mem::take(&mut self.fired)
    }
}

/// Folds window events into per-tick [`InputSnapshot`]s.
///
/// Bindings: WASD / arrows move, `Esc` quits, `C` toggles camera follow, `+`/`-` and
/// the wheel zoom, left mouse clicks.
#[derive(Debug, Default)]
pub(crate) struct InputCollector {
    quit_requested: bool,
    actions: ActionStates,
    follow_toggle: PressLatch,
    zoom_in: PressLatch,
    zoom_out: PressLatch,
    left_click: PressLatch,
    pending_zoom_steps: i32,
    cursor_position_px: Option<Vec2>,
    window_size: (u32, u32),
}

impl InputCollector {
    pub(crate) fn new(window_width: u32, window_height: u32) -> Self {
        Self {
            window_size: (window_width, window_height),
            ..Self::default()
        }
    }

    pub(crate) fn quit_requested(&self) -> bool {
        self.quit_requested
    }

    pub(crate) fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    pub(crate) fn handle_key_event(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(code) = event.physical_key {
            self.handle_key(code, event.state);
        }
    }

    fn handle_key(&mut self, code: KeyCode, state: ElementState) {
        if let Some(action) = InputAction::bound_to(code) {
            let pressed = state == ElementState::Pressed;
            self.actions.down[action.index()] = pressed;
            if action == InputAction::Quit && pressed {
                self.request_quit();
            }
            return;
        }
        match code {
            KeyCode::KeyC => self.follow_toggle.update(state),
            KeyCode::Equal | KeyCode::NumpadAdd => {
                self.zoom_in.update(state);
                if self.zoom_in.take() {
                    self.pending_zoom_steps = self.pending_zoom_steps.saturating_add(1);
                }
            }
            KeyCode::Minus | KeyCode::NumpadSubtract => {
                self.zoom_out.update(state);
                if self.zoom_out.take() {
                    self.pending_zoom_steps = self.pending_zoom_steps.saturating_sub(1);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Left {
            self.left_click.update(state);
        }
    }

    /// Line deltas count whole notches; pixel deltas (touchpads) count one step per event.
    pub(crate) fn handle_wheel(&mut self, delta: MouseScrollDelta) {
        let steps = match delta {
            MouseScrollDelta::LineDelta(_, y) => y.round() as i32,
            MouseScrollDelta::PixelDelta(position) => {
                if position.y > 0.0 {
                    1
                } else if position.y < 0.0 {
                    -1
                } else {
                    0
                }
            }
        };
        self.pending_zoom_steps = self.pending_zoom_steps.saturating_add(steps);
    }

    pub(crate) fn set_cursor(&mut self, position: Option<Vec2>) {
        self.cursor_position_px = position;
    }

    pub(crate) fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    /// Builds the snapshot for the next tick and consumes pending edges.
    pub(crate) fn next_snapshot(&mut self) -> InputSnapshot {
        InputSnapshot {
            quit_requested: self.quit_requested,
            actions: self.actions,
            cursor_position_px: self.cursor_position_px,
            left_click_pressed: self.left_click.take(),
            camera_follow_toggle_pressed: self.follow_toggle.take(),
            zoom_delta_steps: std::mem::take(&mut self.pending_zoom_steps),
            window_size: self.window_size,
        }
    }
}
