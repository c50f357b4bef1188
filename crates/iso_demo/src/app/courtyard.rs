use std::collections::VecDeque;

use iso_engine::physics::ACTOR_HEIGHT;
use iso_engine::{
    install_map, Block, Flicker, InputSnapshot, InstalledMap, IsoWorld, LightNode, MapDesc,
    NodeId, PointLight, Scene, SceneCommand, Vec2, Vec3,
};
use tracing::{debug, info, warn};

const PLAYER_SPEED_TILES_PER_SECOND: f32 = 3.0;
const PLAYER_HALF_EXTENT: f32 = 0.3;
const PLAYER_COLOR: [u8; 3] = [200, 170, 90];
const PLAYER_LIGHT_HEIGHT: f32 = 1.2;
const DEFAULT_SPAWN: Vec3 = Vec3 {
    x: 2.5,
    y: 9.5,
    z: 0.0,
};
const LANTERN_HEIGHT: f32 = 0.6;
const MAX_LANTERNS: usize = 6;

pub(crate) struct CourtyardScene {
    map: MapDesc,
    spawn: Vec3,
    installed: Option<InstalledMap>,
    player: Option<NodeId>,
    player_position: Vec3,
    facing: Vec2,
    lanterns: VecDeque<NodeId>,
}

impl CourtyardScene {
    pub(crate) fn new(map: MapDesc) -> Self {
        Self {
            map,
            spawn: DEFAULT_SPAWN,
            installed: None,
            player: None,
            player_position: DEFAULT_SPAWN,
            facing: Vec2::new(1.0, 0.0),
            lanterns: VecDeque::new(),
        }
    }

    #[cfg(test)]
    fn with_spawn(mut self, spawn: Vec3) -> Self {
        self.spawn = spawn;
        self.player_position = spawn;
        self
    }

    fn spawn_player(&mut self, world: &mut IsoWorld) {
        let root = world.root();
        let player = match world.spawn(
            root,
            "Player",
            self.spawn,
            Block {
                color: PLAYER_COLOR,
                size_z: ACTOR_HEIGHT,
            },
        ) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "player_spawn_failed");
                return;
            }
        };
        match world.spawn(
            player,
            "PlayerLight",
            Vec3::new(0.0, 0.0, PLAYER_LIGHT_HEIGHT),
            LightNode::new(PointLight {
                color: [255, 220, 170],
                ..PointLight::default()
            }),
        ) {
            Ok(light) => world.set_shadow_light(Some(light)),
            Err(err) => warn!(error = %err, "player_light_spawn_failed"),
        }
        self.player = Some(player);
        self.player_position = self.spawn;
    }

    /// Moves one axis at a time so the player slides along walls instead of sticking.
    fn move_player(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot, world: &mut IsoWorld) {
        let Some(player) = self.player else {
            return;
        };
        let direction = input.movement_direction();
        if direction == Vec2::ZERO {
            return;
        }
        self.facing = direction;

        let delta = direction * (PLAYER_SPEED_TILES_PER_SECOND * fixed_dt_seconds);
        let mut next = self.player_position;
        let along_x = Vec3::new(next.x + delta.x, next.y, next.z);
        if !world.test_collision(along_x, PLAYER_HALF_EXTENT) {
            next = along_x;
        }
        let along_y = Vec3::new(next.x, next.y + delta.y, next.z);
        if !world.test_collision(along_y, PLAYER_HALF_EXTENT) {
            next = along_y;
        }
        if next == self.player_position {
            return;
        }
        match world.move_node(player, next) {
            Ok(()) => self.player_position = next,
            Err(err) => warn!(error = %err, "player_move_failed"),
        }
    }

    fn place_lantern(&mut self, input: &InputSnapshot, world: &mut IsoWorld) {
        if !input.left_click_pressed() {
            return;
        }
        let Some(cursor) = input.cursor_position_px() else {
            return;
        };
        let ground = world.pick_ground(cursor);
        let position = ground.extend(LANTERN_HEIGHT);
        if world.test_collision(ground.extend(0.0), 0.1) {
            debug!(x = ground.x, y = ground.y, "lantern_blocked");
            return;
        }

        if self.lanterns.len() >= MAX_LANTERNS {
            if let Some(oldest) = self.lanterns.pop_front() {
                if let Err(err) = world.remove_node(oldest) {
                    warn!(error = %err, "lantern_remove_failed");
                }
            }
        }
        let root = world.root();
        let lantern = LightNode::new(PointLight {
            radius_px: 96.0,
            color: [255, 170, 80],
            intensity: 0.8,
        })
        .with_flicker(Flicker {
            depth: 0.25,
            frequency_hz: 3.0,
        });
        match world.spawn(root, "Lantern", position, lantern) {
            Ok(id) => {
                self.lanterns.push_back(id);
                info!(x = ground.x, y = ground.y, count = self.lanterns.len(), "lantern_placed");
            }
            Err(err) => warn!(error = %err, "lantern_spawn_failed"),
        }
    }

    fn remove_owned(world: &mut IsoWorld, node: NodeId) {
        if let Err(err) = world.remove_node(node) {
            debug!(node = %node, error = %err, "courtyard_node_already_gone");
        }
    }
}

impl Scene for CourtyardScene {
    fn load(&mut self, world: &mut IsoWorld) {
        match install_map(&self.map, world) {
            Ok(installed) => self.installed = Some(installed),
            Err(err) => warn!(error = %err, "courtyard_install_failed"),
        }
        self.spawn_player(world);
        world.camera_mut().follow_world(self.player_position);
        info!(
            x = self.player_position.x,
            y = self.player_position.y,
            "courtyard_loaded"
        );
    }

    fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
        world: &mut IsoWorld,
    ) -> SceneCommand {
        if input.quit_requested() {
            return SceneCommand::Quit;
        }

        self.move_player(fixed_dt_seconds, input, world);
        world.camera_mut().follow_world(self.player_position);
        self.place_lantern(input, world);

        let polygon = world.compute_visibility(self.player_position, Some(self.facing));
        world.set_visibility(Some(polygon));
        SceneCommand::None
    }

    fn unload(&mut self, world: &mut IsoWorld) {
        for lantern in self.lanterns.drain(..) {
            Self::remove_owned(world, lantern);
        }
        if let Some(player) = self.player.take() {
            Self::remove_owned(world, player);
        }
        if let Some(installed) = self.installed.take() {
            for layer in installed.layers() {
                Self::remove_owned(world, layer);
            }
        }
        world.set_visibility(None);
        world.set_shadow_light(None);
    }

    fn debug_title(&self, world: &IsoWorld) -> Option<String> {
        let time = world.time();
        Some(format!(
            "Iso Demo | {} | day {} | ({:.1}, {:.1}) | lanterns {}",
            time.phase().name(),
            time.day_count(),
            self.player_position.x,
            self.player_position.y,
            self.lanterns.len()
        ))
    }
}
