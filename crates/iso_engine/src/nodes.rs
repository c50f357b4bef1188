//! Concrete node contents: tiles, blocks, walls, image sprites and point lights.

use std::f32::consts::TAU;

use crate::rendering::lighting::PointLight;
use crate::rendering::sprites::{SpriteKey, WallSide};
use crate::scene_graph::{LightEmitter, NodeContent, Renderable};

/// Height of a flat floor tile. Low enough to never cast a shadow.
pub const FLOOR_SIZE_Z: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorTile {
    pub color: [u8; 3],
}

impl Renderable for FloorTile {
    fn sprite_key(&self) -> SpriteKey {
        SpriteKey::Floor { color: self.color }
    }

    fn size_z(&self) -> f32 {
        FLOOR_SIZE_Z
    }
}

impl NodeContent for FloorTile {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

/// Shaded cube filling one cell, `size_z` world units tall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub color: [u8; 3],
    pub size_z: f32,
}

impl Renderable for Block {
    fn sprite_key(&self) -> SpriteKey {
        SpriteKey::block(self.color, self.size_z)
    }

    fn size_z(&self) -> f32 {
        self.size_z
    }
}

impl NodeContent for Block {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wall {
    pub side: WallSide,
    pub color: [u8; 3],
    pub size_z: f32,
}

impl Renderable for Wall {
    fn sprite_key(&self) -> SpriteKey {
        SpriteKey::wall(self.side, self.color, self.size_z)
    }

    fn size_z(&self) -> f32 {
        self.size_z
    }
}

impl NodeContent for Wall {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

/// Sprite loaded from the asset tree by key.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSprite {
    pub key: String,
    pub size_z: f32,
}

impl Renderable for ImageSprite {
    fn sprite_key(&self) -> SpriteKey {
        SpriteKey::image(self.key.clone())
    }

    fn size_z(&self) -> f32 {
        self.size_z
    }
}

impl NodeContent for ImageSprite {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

/// Sinusoidal intensity wobble.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Flicker {
    /// Fraction of the base intensity that may be lost at the trough, `0..=1`.
    pub depth: f32,
    pub frequency_hz: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightNode {
    pub light: PointLight,
    pub flicker: Option<Flicker>,
    elapsed_seconds: f32,
}

impl LightNode {
    pub fn new(light: PointLight) -> Self {
        Self {
            light,
            flicker: None,
            elapsed_seconds: 0.0,
        }
    }

    pub fn with_flicker(mut self, flicker: Flicker) -> Self {
        self.flicker = Some(flicker);
        self
    }

    fn intensity_factor(&self) -> f32 {
        let Some(flicker) = self.flicker else {
            return 1.0;
        };
        let depth = flicker.depth.clamp(0.0, 1.0);
        let wave = (self.elapsed_seconds * flicker.frequency_hz * TAU).sin();
        1.0 - depth * 0.5 * (1.0 + wave)
    }
}

impl LightEmitter for LightNode {
    fn point_light(&self) -> PointLight {
        PointLight {
            intensity: self.light.intensity * self.intensity_factor(),
            ..self.light
        }
    }
}

impl NodeContent for LightNode {
    fn as_light_emitter(&self) -> Option<&dyn LightEmitter> {
        Some(self)
    }

    fn update(&mut self, dt_seconds: f32) {
        if dt_seconds.is_finite() && dt_seconds > 0.0 {
            self.elapsed_seconds += dt_seconds;
        }
    }
}
