//! Application context tying the scene graph, spatial index and render passes together.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::math::{Vec2, Vec3};
use crate::physics::{
    compute_visibility, Body, BodyKind, RegisterOutcome, SpatialIndex, VisibilityPolygon,
    VisibilityRequest, WorldExtents, DEFAULT_RAY_STEP, OBJECT_HALF_EXTENT,
};
use crate::rendering::camera::{Camera, Viewport};
use crate::rendering::draw_queue::{DrawQueue, DrawStats};
use crate::rendering::lighting::{LightingCompositor, LightingError, LightingStats};
use crate::rendering::shadow::{ShadowPass, ShadowStats};
use crate::rendering::sprites::SpriteCache;
use crate::rendering::surface::Surface;
use crate::scene_graph::{NodeContent, NodeId, SceneGraph, SceneGraphError};
use crate::time_of_day::{DayPhase, TimeOfDay};

/// Collision box attached to a node, centred on the node's global position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySpec {
    pub kind: BodyKind,
    pub half_extent: f32,
    pub height: f32,
}

impl BodySpec {
    /// Static box filling one whole cell.
    pub fn solid_tile(height: f32) -> Self {
        Self {
            kind: BodyKind::Static,
            half_extent: 0.5,
            height,
        }
    }

    /// Static box slightly smaller than a cell.
    pub fn prop(height: f32) -> Self {
        Self {
            kind: BodyKind::Static,
            half_extent: OBJECT_HALF_EXTENT,
            height,
        }
    }

    pub fn actor(height: f32) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            half_extent: OBJECT_HALF_EXTENT,
            height,
        }
    }

    fn body_at(&self, center: Vec3) -> Body {
        Body {
            center,
            half_extent: self.half_extent,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub draw: DrawStats,
    pub shadows: ShadowStats,
    pub lighting: LightingStats,
}

/// Owns every per-scene structure. Built when a scene loads, dropped when it unloads.
#[derive(Debug)]
pub struct IsoWorld {
    config: EngineConfig,
    graph: SceneGraph,
    spatial: SpatialIndex,
    camera: Camera,
    draw_queue: DrawQueue,
    sprites: SpriteCache,
    shadows: ShadowPass,
    lighting: LightingCompositor,
    time: TimeOfDay,
    visibility: Option<VisibilityPolygon>,
    shadow_light: Option<NodeId>,
}

impl IsoWorld {
    pub fn new(viewport: Viewport, config: EngineConfig, asset_root: Option<PathBuf>) -> Self {
        info!(
            width = viewport.width,
            height = viewport.height,
            light_scale = config.light_buffer_scale,
            shadow_scale = config.shadow_buffer_scale,
            "iso_world_created"
        );
        Self {
            graph: SceneGraph::new(),
            spatial: SpatialIndex::new(),
            camera: Camera::new(viewport),
            draw_queue: DrawQueue::new(),
            sprites: SpriteCache::new(asset_root),
            shadows: ShadowPass::new(viewport, config.shadow_buffer_scale, config.shadow_alpha),
            lighting: LightingCompositor::new(viewport, config.light_buffer_scale),
            time: TimeOfDay::new(config.time_of_day),
            visibility: None,
            shadow_light: None,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Direct graph access. Moving nodes through this bypasses body updates; prefer
    /// [`IsoWorld::move_node`] for anything with a collision body.
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    pub fn set_world_extents(&mut self, extents: Option<WorldExtents>) {
        self.spatial.set_extents(extents);
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn sprites_mut(&mut self) -> &mut SpriteCache {
        &mut self.sprites
    }

    pub fn draw_queue(&self) -> &DrawQueue {
        &self.draw_queue
    }

    pub fn lighting(&self) -> &LightingCompositor {
        &self.lighting
    }

    pub fn shadows(&self) -> &ShadowPass {
        &self.shadows
    }

    pub fn time(&self) -> &TimeOfDay {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut TimeOfDay {
        &mut self.time
    }

    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    pub fn spawn(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        position: Vec3,
        content: impl NodeContent + 'static,
    ) -> Result<NodeId, SceneGraphError> {
        self.graph.spawn(parent, name, position, content)
    }

    /// Spawns a node and registers a collision body at its global position.
    pub fn spawn_with_body(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        position: Vec3,
        content: impl NodeContent + 'static,
        body: BodySpec,
    ) -> Result<(NodeId, RegisterOutcome), SceneGraphError> {
        let id = self.graph.spawn(parent, name, position, content)?;
        let center = self
            .graph
            .global_position(id)
            .ok_or(SceneGraphError::MissingNode(id))?;
        let outcome = match body.kind {
            BodyKind::Static => self.spatial.register_body(id.body_id(), body.body_at(center)),
            BodyKind::Dynamic => self.spatial.register_dynamic(id.body_id(), body.body_at(center)),
        };
        Ok((id, outcome))
    }

    /// Removes a node with its subtree and every collision body the subtree owned.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneGraphError> {
        let removed = self.graph.remove(id)?;
        let mut bodies = 0;
        for node in &removed {
            if self.spatial.unregister(node.body_id()) {
                bodies += 1;
            }
        }
        if self.shadow_light.is_some_and(|light| removed.contains(&light)) {
            self.shadow_light = None;
        }
        debug!(node = %id, nodes = removed.len(), bodies, "iso_world_node_removed");
        Ok(removed)
    }

    /// Sets a node's local position and drags the dynamic bodies of its subtree along.
    /// Static bodies stay where they were registered.
    pub fn move_node(&mut self, id: NodeId, position: Vec3) -> Result<(), SceneGraphError> {
        self.graph.set_position(id, position)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let body = current.body_id();
            if self.spatial.body_kind(body) == Some(BodyKind::Dynamic) {
                if let Some(center) = self.graph.global_position(current) {
                    if !self.spatial.move_body(body, center) {
                        debug!(node = %current, "iso_world_body_left_extents");
                    }
                }
            }
            if let Some(node) = self.graph.get(current) {
                stack.extend(node.children().iter().copied());
            }
        }
        Ok(())
    }

    /// The point light whose position drives point-light shadows.
    pub fn set_shadow_light(&mut self, light: Option<NodeId>) {
        self.shadow_light = light;
    }

    pub fn shadow_light(&self) -> Option<NodeId> {
        self.shadow_light
    }

    /// Advances time of day and node contents by `dt_seconds`.
    pub fn update(&mut self, dt_seconds: f32) {
        self.time.advance(dt_seconds);
        self.graph.update(dt_seconds);
    }

    pub fn test_collision(&self, point: Vec3, half_extent: f32) -> bool {
        self.spatial.test_collision(point, half_extent)
    }

    pub fn raycast(&self, start: Vec3, end: Vec3) -> Option<Vec3> {
        self.spatial.raycast(start, end, DEFAULT_RAY_STEP)
    }

    /// View radius for the current phase of day.
    pub fn view_radius(&self) -> f32 {
        if self.time.phase() == DayPhase::Night {
            self.config.night_view_radius
        } else {
            self.config.view_radius
        }
    }

    pub fn compute_visibility(&self, origin: Vec3, facing: Option<Vec2>) -> VisibilityPolygon {
        self.compute_visibility_within(origin, facing, self.view_radius())
    }

    pub fn compute_visibility_within(
        &self,
        origin: Vec3,
        facing: Option<Vec2>,
        max_radius: f32,
    ) -> VisibilityPolygon {
        let mut request =
            VisibilityRequest::around(origin, max_radius).with_ray_count(self.config.visibility_ray_count);
        request.step = self.config.visibility_step;
        if let Some(facing) = facing {
            request = request.with_facing(facing, self.config.visibility_fov_degrees);
        }
        compute_visibility(&self.spatial, &request)
    }

    /// Polygon used to mask the light buffer on following frames. `None` disables masking.
    pub fn set_visibility(&mut self, polygon: Option<VisibilityPolygon>) {
        self.visibility = polygon;
    }

    pub fn visibility(&self) -> Option<&VisibilityPolygon> {
        self.visibility.as_ref()
    }

    pub fn world_to_screen(&self, world: Vec3) -> Vec2 {
        self.camera.project(world)
    }

    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        self.camera.screen_to_world(screen)
    }

    pub fn pick_ground(&self, screen: Vec2) -> Vec2 {
        self.camera.pick_ground(screen)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.camera.resize(viewport);
        self.lighting.resize(viewport);
        self.shadows.resize(viewport);
        debug!(width = viewport.width, height = viewport.height, "iso_world_resized");
    }

    /// Renders one frame into `frame`, which should match the camera viewport.
    ///
    /// The shadow layer goes onto the cleared background, every sprite follows in one
    /// depth-ordered pass, and finally the light buffer is multiplied over the lot.
    pub fn render_frame(&mut self, frame: &mut Surface) -> Result<FrameStats, LightingError> {
        frame.fill(self.config.clear_color);
        self.draw_queue.clear();
        self.lighting.begin_frame();
        self.shadows.begin_frame();

        let mut shadow_light_position = None;
        let traversal = self.graph.traverse();
        for visit in &traversal.renderables {
            self.draw_queue.submit(visit);
        }
        for light in &traversal.lights {
            self.lighting.register_light(*light);
            if self.shadow_light == Some(*light) {
                shadow_light_position = self.graph.global_position(*light);
            }
        }

        let sun = self.time.sun();
        self.lighting.set_ambient(self.time.ambient_color());
        self.lighting.set_directional(Some(sun));
        self.lighting.fill_ambient()?;
        self.lighting.apply_directional()?;

        if self.time.casts_sun_shadows() {
            self.shadows
                .draw_directional(self.draw_queue.entries(), &sun, &self.camera);
        }
        if let Some(position) = shadow_light_position {
            self.shadows
                .draw_point(self.draw_queue.entries(), position, &self.camera);
        }

        self.shadows.composite(frame);
        self.lighting.mark_shadows_drawn()?;
        let draw = self
            .draw_queue
            .flush(frame, &self.camera, &mut self.sprites);

        self.lighting
            .accumulate_point_lights(&self.graph, &self.camera)?;
        self.lighting
            .apply_visibility_mask(self.visibility.as_ref(), &self.camera)?;
        self.lighting.composite(frame)?;

        Ok(FrameStats {
            draw,
            shadows: self.shadows.stats(),
            lighting: self.lighting.stats(),
        })
    }
}
