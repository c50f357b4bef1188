//! JSON map documents and their installation into an [`IsoWorld`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::math::Vec3;
use crate::nodes::{Block, FloorTile, Wall};
use crate::physics::{RegisterOutcome, WorldExtents, ACTOR_HEIGHT};
use crate::rendering::sprites::WallSide;
use crate::scene_graph::{Group, NodeId, SceneGraphError};
use crate::world::{BodySpec, IsoWorld};

pub const DEFAULT_TILE_HEIGHT: f32 = 0.05;
pub const DEFAULT_WALL_HEIGHT: f32 = ACTOR_HEIGHT;
/// Tiles taller than this are solid blocks with collision.
pub const SOLID_TILE_MIN_HEIGHT: f32 = 0.1;
const DEFAULT_WALL_COLOR: [u8; 3] = [150, 140, 130];

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse map at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode map: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid map value at {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("failed to build map nodes: {0}")]
    Scene(#[from] SceneGraphError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TileDesc {
    pub tile_id: u64,
    pub pos: [i32; 2],
    #[serde(default = "default_tile_height")]
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WallDesc {
    pub pos: [i32; 2],
    pub side: WallSide,
    #[serde(default = "default_wall_height")]
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDesc {
    pub tile_id: u64,
    pub pos: [f32; 3],
    pub size_z: f32,
    #[serde(default)]
    pub collidable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapDesc {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub tiles: Vec<TileDesc>,
    #[serde(default)]
    pub walls: Vec<WallDesc>,
    #[serde(default)]
    pub objects: Vec<ObjectDesc>,
}

fn default_tile_height() -> f32 {
    DEFAULT_TILE_HEIGHT
}

fn default_wall_height() -> f32 {
    DEFAULT_WALL_HEIGHT
}

impl MapDesc {
    pub fn to_json(&self) -> Result<String, MapError> {
        serde_json::to_string_pretty(self).map_err(MapError::Encode)
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(
                "width",
                format!("map must be at least 1x1, got {}x{}", self.width, self.height),
            ));
        }
        for (index, tile) in self.tiles.iter().enumerate() {
            self.check_cell(format!("tiles[{index}].pos"), tile.pos)?;
            check_height(format!("tiles[{index}].height"), tile.height)?;
        }
        let mut seen_walls = HashSet::new();
        for (index, wall) in self.walls.iter().enumerate() {
            self.check_cell(format!("walls[{index}].pos"), wall.pos)?;
            check_height(format!("walls[{index}].height"), wall.height)?;
            if !seen_walls.insert((wall.pos, wall.side)) {
                return Err(invalid(
                    format!("walls[{index}]"),
                    format!("duplicate {} wall at {:?}", wall.side.tag(), wall.pos),
                ));
            }
        }
        for (index, object) in self.objects.iter().enumerate() {
            if object.pos.iter().any(|value| !value.is_finite()) {
                return Err(invalid(
                    format!("objects[{index}].pos"),
                    format!("expected finite coordinates, got {:?}", object.pos),
                ));
            }
            check_height(format!("objects[{index}].size_z"), object.size_z)?;
        }
        Ok(())
    }

    fn check_cell(&self, field: String, pos: [i32; 2]) -> Result<(), MapError> {
        let [x, y] = pos;
        let inside = x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height;
        if inside {
            return Ok(());
        }
        Err(invalid(
            field,
            format!("cell {pos:?} lies outside the {}x{} map", self.width, self.height),
        ))
    }
}

fn invalid(field: impl Into<String>, reason: String) -> MapError {
    MapError::Invalid {
        field: field.into(),
        reason,
    }
}

fn check_height(field: String, value: f32) -> Result<(), MapError> {
    if value.is_finite() && value >= 0.0 {
        return Ok(());
    }
    Err(invalid(field, format!("expected a non-negative number, got {value}")))
}

pub fn parse_map_json(raw: &str) -> Result<MapDesc, MapError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let map: MapDesc =
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            let path = error.path().to_string();
            MapError::Parse {
                path: if path.is_empty() { ".".to_string() } else { path },
                source: error.into_inner(),
            }
        })?;
    map.validate()?;
    Ok(map)
}

pub fn load_map(path: &Path) -> Result<MapDesc, MapError> {
    let raw = fs::read_to_string(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_map_json(&raw)
}

/// Deterministic display colour for a tile id. The semantic tile table lives elsewhere.
pub fn tile_color(tile_id: u64) -> [u8; 3] {
    let mut hash = tile_id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    hash ^= hash >> 29;
    let channel = |shift: u32| 70 + ((hash >> shift) & 0x7f) as u8;
    [channel(0), channel(8), channel(16)]
}

fn cell_center(pos: [i32; 2], z: f32) -> Vec3 {
    Vec3::new(pos[0] as f32 + 0.5, pos[1] as f32 + 0.5, z)
}

/// Nodes and bodies created by [`install_map`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledMap {
    pub floor_layer: NodeId,
    pub block_layer: NodeId,
    pub wall_layer: NodeId,
    pub object_layer: NodeId,
    pub tiles: usize,
    pub walls: usize,
    pub objects: usize,
    pub bodies: usize,
}

impl InstalledMap {
    pub fn layers(&self) -> [NodeId; 4] {
        [
            self.floor_layer,
            self.block_layer,
            self.wall_layer,
            self.object_layer,
        ]
    }
}

/// Builds scene nodes for every map entry under per-layer groups and registers static
/// collision bodies for solid tiles, walls and collidable objects. Also bounds the
/// spatial index to the map's extents.
pub fn install_map(map: &MapDesc, world: &mut IsoWorld) -> Result<InstalledMap, MapError> {
    map.validate()?;
    world.set_world_extents(Some(WorldExtents::from_size(map.width, map.height)));

    let root = world.root();
    let floor_layer = world.spawn(root, "floor_layer", Vec3::ZERO, Group)?;
    let block_layer = world.spawn(root, "block_layer", Vec3::ZERO, Group)?;
    let wall_layer = world.spawn(root, "wall_layer", Vec3::ZERO, Group)?;
    let object_layer = world.spawn(root, "object_layer", Vec3::ZERO, Group)?;
    let mut installed = InstalledMap {
        floor_layer,
        block_layer,
        wall_layer,
        object_layer,
        tiles: 0,
        walls: 0,
        objects: 0,
        bodies: 0,
    };

    for tile in &map.tiles {
        let [x, y] = tile.pos;
        let color = tile_color(tile.tile_id);
        if tile.height > SOLID_TILE_MIN_HEIGHT {
            let (_, outcome) = world.spawn_with_body(
                block_layer,
                format!("block_{x}_{y}"),
                cell_center(tile.pos, 0.0),
                Block {
                    color,
                    size_z: tile.height,
                },
                BodySpec::solid_tile(tile.height),
            )?;
            count_body(&mut installed, outcome, "tile", tile.pos);
        } else {
            world.spawn(
                floor_layer,
                format!("tile_{x}_{y}"),
                cell_center(tile.pos, 0.0),
                FloorTile { color },
            )?;
        }
        installed.tiles += 1;
    }

    for wall in &map.walls {
        let [x, y] = wall.pos;
        let color = wall.tile_id.map_or(DEFAULT_WALL_COLOR, tile_color);
        let (_, outcome) = world.spawn_with_body(
            wall_layer,
            format!("wall_{x}_{y}_{}", wall.side.tag()),
            cell_center(wall.pos, 0.0),
            Wall {
                side: wall.side,
                color,
                size_z: wall.height,
            },
            BodySpec::solid_tile(wall.height),
        )?;
        count_body(&mut installed, outcome, "wall", wall.pos);
        installed.walls += 1;
    }

    for (index, object) in map.objects.iter().enumerate() {
        let [x, y, z] = object.pos;
        let content = Block {
            color: tile_color(object.tile_id),
            size_z: object.size_z,
        };
        let name = format!("object_{index}");
        if object.collidable {
            let (_, outcome) = world.spawn_with_body(
                object_layer,
                name,
                Vec3::new(x, y, z),
                content,
                BodySpec::prop(object.size_z),
            )?;
            count_body(&mut installed, outcome, "object", [x as i32, y as i32]);
        } else {
            world.spawn(object_layer, name, Vec3::new(x, y, z), content)?;
        }
        installed.objects += 1;
    }

    info!(
        width = map.width,
        height = map.height,
        tiles = installed.tiles,
        walls = installed.walls,
        objects = installed.objects,
        bodies = installed.bodies,
        "map_installed"
    );
    Ok(installed)
}

fn count_body(installed: &mut InstalledMap, outcome: RegisterOutcome, kind: &'static str, pos: [i32; 2]) {
    match outcome {
        RegisterOutcome::Registered => installed.bodies += 1,
        RegisterOutcome::AlreadyRegistered | RegisterOutcome::OutOfBounds => {
            warn!(kind, x = pos[0], y = pos[1], outcome = ?outcome, "map_body_not_registered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::physics::CellKey;
    use crate::rendering::camera::Viewport;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "width": 8,
        "height": 8,
        "tiles": [
            { "tile_id": 110000001, "pos": [0, 0] },
            { "tile_id": 110000001, "pos": [1, 0] },
            { "tile_id": 310000002, "pos": [3, 3], "height": 1.2 }
        ],
        "walls": [
            { "pos": [6, 5], "side": "NE" },
            { "pos": [6, 5], "side": "NW", "tile_id": 212000000 }
        ],
        "objects": [
            { "tile_id": 410000003, "pos": [2.5, 5.5, 0.0], "size_z": 0.8, "collidable": true },
            { "tile_id": 410000004, "pos": [4.5, 1.5, 0.0], "size_z": 0.3 }
        ]
    }"#;

    fn world() -> IsoWorld {
        IsoWorld::new(Viewport::new(320, 240), EngineConfig::default(), None)
    }

    #[test]
    fn parses_defaults() {
        let map = parse_map_json(SAMPLE).expect("map");
        assert_eq!(map.tiles[0].height, DEFAULT_TILE_HEIGHT);
        assert_eq!(map.walls[0].height, DEFAULT_WALL_HEIGHT);
        assert_eq!(map.walls[0].tile_id, None);
        assert_eq!(map.walls[1].side, WallSide::NorthWest);
        assert!(!map.objects[1].collidable);
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let map = parse_map_json(SAMPLE).expect("map");
        let encoded = map.to_json().expect("encode");
        assert!(encoded.contains("\"NE\""));
        assert_eq!(parse_map_json(&encoded).expect("reparse"), map);
    }

    #[test]
    fn parse_errors_name_the_field() {
        let error = parse_map_json(
            r#"{ "width": 4, "height": 4, "walls": [ { "pos": [1, 1], "side": "SE" } ] }"#,
        )
        .expect_err("bad side");
        match error {
            MapError::Parse { path, .. } => assert!(path.starts_with("walls[0]"), "{path}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_cells_outside_the_map() {
        let error = parse_map_json(r#"{ "width": 2, "height": 2, "tiles": [ { "tile_id": 1, "pos": [2, 0] } ] }"#)
            .expect_err("outside");
        match error {
            MapError::Invalid { field, .. } => assert_eq!(field, "tiles[0].pos"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_duplicate_walls() {
        let error = parse_map_json(
            r#"{ "width": 4, "height": 4, "walls": [
                { "pos": [1, 1], "side": "NE" },
                { "pos": [1, 1], "side": "NE" }
            ] }"#,
        )
        .expect_err("duplicate");
        assert!(matches!(error, MapError::Invalid { .. }));
    }

    #[test]
    fn install_builds_layers_and_bodies() {
        let map = parse_map_json(SAMPLE).expect("map");
        let mut world = world();
        let installed = install_map(&map, &mut world).expect("install");

        assert_eq!(installed.tiles, 3);
        assert_eq!(installed.walls, 2);
        assert_eq!(installed.objects, 2);
        // Solid tile, both walls and the collidable object.
        assert_eq!(installed.bodies, 4);
        assert_eq!(world.graph().get(installed.floor_layer).expect("floor").children().len(), 2);
        assert_eq!(world.graph().get(installed.block_layer).expect("blocks").children().len(), 1);

        let snapshot = world.spatial().cell_snapshot();
        assert_eq!(snapshot.get(&CellKey::new(6, 5)).map(Vec::len), Some(2));
        assert_eq!(snapshot.get(&CellKey::new(3, 3)).map(Vec::len), Some(1));
        assert!(!snapshot.contains_key(&CellKey::new(0, 0)));
    }

    #[test]
    fn installed_wall_stops_a_ray() {
        let map = parse_map_json(SAMPLE).expect("map");
        let mut world = world();
        install_map(&map, &mut world).expect("install");
        let hit = world
            .raycast(Vec3::new(5.0, 5.5, 0.0), Vec3::new(7.5, 5.5, 0.0))
            .expect("hit");
        assert!(hit.x > 5.8 && hit.x <= 6.0 + 1e-4, "{hit:?}");
    }

    #[test]
    fn tile_colors_are_stable_and_distinct() {
        assert_eq!(tile_color(110000001), tile_color(110000001));
        assert_ne!(tile_color(110000001), tile_color(310000002));
    }

    #[test]
    fn loads_from_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("map.json");
        fs::write(&path, SAMPLE).expect("write");
        assert_eq!(load_map(&path).expect("map").walls.len(), 2);
        assert!(matches!(
            load_map(&dir.path().join("missing.json")),
            Err(MapError::Io { .. })
        ));
    }
}
