use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::math::Vec2;
use crate::projection::{HEIGHT_SCALE, TILE_HEIGHT, TILE_WIDTH};

use super::surface::{BlendMode, Rgba, Surface};

const MAX_SPRITE_HEIGHT_PX: f32 = 4096.0;
const WALL_SHADE_NW: i16 = 40;
const BLOCK_SHADE_LEFT: i16 = 30;
const BLOCK_SHADE_RIGHT: i16 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WallSide {
    /// Face along the north-east tile edge (right-hand back edge on screen).
    #[serde(rename = "NE")]
    NorthEast,
    /// Face along the north-west tile edge, drawn darker.
    #[serde(rename = "NW")]
    NorthWest,
}

impl WallSide {
    /// Short tag used in map documents and node names.
    pub fn tag(self) -> &'static str {
        match self {
            Self::NorthEast => "NE",
            Self::NorthWest => "NW",
        }
    }
}

/// Everything a sprite's pixels depend on. Position never appears here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpriteKey {
    Floor {
        color: [u8; 3],
    },
    Block {
        color: [u8; 3],
        height_px: u32,
    },
    Wall {
        side: WallSide,
        color: [u8; 3],
        height_px: u32,
    },
    Image {
        key: String,
    },
}

impl SpriteKey {
    pub fn block(color: [u8; 3], size_z: f32) -> Self {
        Self::Block {
            color,
            height_px: height_px(size_z),
        }
    }

    pub fn wall(side: WallSide, color: [u8; 3], size_z: f32) -> Self {
        Self::Wall {
            side,
            color,
            height_px: height_px(size_z),
        }
    }

    pub fn image(key: impl Into<String>) -> Self {
        Self::Image { key: key.into() }
    }
}

/// Vertical world height converted to whole sprite pixels.
pub fn height_px(size_z: f32) -> u32 {
    (size_z.max(0.0) * HEIGHT_SCALE)
        .round()
        .min(MAX_SPRITE_HEIGHT_PX) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteKeyError {
    #[error("sprite key must not be empty")]
    Empty,
    #[error("sprite key must not start with '/'")]
    LeadingSlash,
    #[error("sprite key must not contain '\\\\'")]
    Backslash,
    #[error("sprite key must not contain '..'")]
    ParentTraversal,
    #[error("sprite key contains invalid character '{character}'")]
    InvalidCharacter { character: char },
}

pub fn validate_sprite_key(key: &str) -> Result<(), SpriteKeyError> {
    if key.is_empty() {
        return Err(SpriteKeyError::Empty);
    }
    if key.starts_with('/') {
        return Err(SpriteKeyError::LeadingSlash);
    }
    if key.contains('\\') {
        return Err(SpriteKeyError::Backslash);
    }
    if key.contains("..") {
        return Err(SpriteKeyError::ParentTraversal);
    }
    for ch in key.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '_' | '/' | '-') {
            continue;
        }
        return Err(SpriteKeyError::InvalidCharacter { character: ch });
    }
    Ok(())
}

/// Sprite surfaces keyed by their visual parameters.
///
/// Procedural keys always resolve. Image keys are read from `<asset_root>/sprites/<key>.png`;
/// a failed load is cached as absent and warned about once.
#[derive(Debug, Default)]
pub struct SpriteCache {
    asset_root: Option<PathBuf>,
    cache: HashMap<SpriteKey, Option<Surface>>,
    warned_missing_sprite_keys: HashSet<String>,
}

impl SpriteCache {
    pub fn new(asset_root: Option<PathBuf>) -> Self {
        Self {
            asset_root,
            cache: HashMap::new(),
            warned_missing_sprite_keys: HashSet::new(),
        }
    }

    pub fn asset_root(&self) -> Option<&Path> {
        self.asset_root.as_deref()
    }

    pub fn resolve(&mut self, key: &SpriteKey) -> Option<&Surface> {
        if !self.cache.contains_key(key) {
            let sprite = self.build(key);
            self.cache.insert(key.clone(), sprite);
        }
        self.cache.get(key).and_then(Option::as_ref)
    }

    /// Drops one cached entry. Returns whether it was present.
    pub fn invalidate(&mut self, key: &SpriteKey) -> bool {
        if let SpriteKey::Image { key: image_key } = key {
            self.warned_missing_sprite_keys.remove(image_key);
        }
        self.cache.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.warned_missing_sprite_keys.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn build(&mut self, key: &SpriteKey) -> Option<Surface> {
        match key {
            SpriteKey::Floor { color } => Some(floor_sprite(*color)),
            SpriteKey::Block { color, height_px } => Some(block_sprite(*color, *height_px)),
            SpriteKey::Wall {
                side,
                color,
                height_px,
            } => Some(wall_sprite(*side, *color, *height_px)),
            SpriteKey::Image { key } => self.load_image(key),
        }
    }

    fn load_image(&mut self, key: &str) -> Option<Surface> {
        let path = match resolve_sprite_image_path(self.asset_root.as_deref(), key) {
            Ok(path) => path,
            Err(reason) => {
                warn_sprite_load_once(&mut self.warned_missing_sprite_keys, key, None, &reason);
                return None;
            }
        };
        match Surface::load_png(&path) {
            Ok(surface) => Some(surface),
            Err(error) => {
                warn_sprite_load_once(
                    &mut self.warned_missing_sprite_keys,
                    key,
                    Some(&path),
                    &error.to_string(),
                );
                None
            }
        }
    }
}

fn resolve_sprite_image_path(asset_root: Option<&Path>, key: &str) -> Result<PathBuf, String> {
    validate_sprite_key(key).map_err(|error| format!("invalid_key:{error}"))?;
    let asset_root = asset_root.ok_or_else(|| "no_asset_root".to_string())?;
    Ok(asset_root.join("sprites").join(format!("{key}.png")))
}

fn warn_sprite_load_once(
    warned_keys: &mut HashSet<String>,
    key: &str,
    resolved_path: Option<&Path>,
    reason: &str,
) {
    if !warned_keys.insert(key.to_string()) {
        return;
    }
    let path_display = resolved_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unresolved>".to_string());
    warn!(
        sprite_key = key,
        path = %path_display,
        reason = reason,
        "sprite_load_failed_skipping"
    );
}

fn shaded(color: [u8; 3], darken: i16) -> Rgba {
    let channel = |value: u8| (value as i16 - darken).clamp(0, 255) as u8;
    [channel(color[0]), channel(color[1]), channel(color[2]), 255]
}

/// Ground diamond whose top corner sits `top` pixels below the sprite's top edge.
fn diamond(top: f32) -> [Vec2; 4] {
    let half_width = TILE_WIDTH * 0.5;
    let half_height = TILE_HEIGHT * 0.5;
    [
        Vec2::new(half_width, top),
        Vec2::new(TILE_WIDTH, top + half_height),
        Vec2::new(half_width, top + TILE_HEIGHT),
        Vec2::new(0.0, top + half_height),
    ]
}

fn floor_sprite(color: [u8; 3]) -> Surface {
    let mut sprite = Surface::new(TILE_WIDTH as u32, TILE_HEIGHT as u32);
    sprite.fill_polygon(&diamond(0.0), shaded(color, 0), BlendMode::Replace);
    sprite
}

/// Cube standing on its ground diamond. The diamond's bottom corner is the sprite's mid-bottom.
fn block_sprite(color: [u8; 3], height_px: u32) -> Surface {
    let height = height_px as f32;
    let mut sprite = Surface::new(TILE_WIDTH as u32, TILE_HEIGHT as u32 + height_px);
    let [top, right, bottom, left] = diamond(0.0);
    let drop = Vec2::new(0.0, height);

    sprite.fill_polygon(
        &[left, bottom, bottom + drop, left + drop],
        shaded(color, BLOCK_SHADE_LEFT),
        BlendMode::Replace,
    );
    sprite.fill_polygon(
        &[bottom, right, right + drop, bottom + drop],
        shaded(color, BLOCK_SHADE_RIGHT),
        BlendMode::Replace,
    );
    sprite.fill_polygon(&[top, right, bottom, left], shaded(color, 0), BlendMode::Replace);
    sprite
}

/// One vertical face rising from a back edge of the ground diamond.
fn wall_sprite(side: WallSide, color: [u8; 3], height_px: u32) -> Surface {
    let height = height_px as f32;
    let mut sprite = Surface::new(TILE_WIDTH as u32, TILE_HEIGHT as u32 + height_px);
    let [top, right, _, left] = diamond(height);
    let rise = Vec2::new(0.0, -height);
    let (edge_end, color) = match side {
        WallSide::NorthEast => (right, shaded(color, 0)),
        WallSide::NorthWest => (left, shaded(color, WALL_SHADE_NW)),
    };
    sprite.fill_polygon(
        &[top + rise, edge_end + rise, edge_end, top],
        color,
        BlendMode::Replace,
    );
    sprite
}
