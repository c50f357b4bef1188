//! Low-resolution light buffer composited over the frame by multiplication.
//!
//! One frame walks the stages in [`LightingStage`] order exactly once:
//! clear, ambient fill, directional tint, shadows, point lights, visibility mask, composite.
//! Calling a stage out of order returns [`LightingError::OutOfOrder`] and leaves the buffer
//! untouched.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::math::Vec2;
use crate::physics::VisibilityPolygon;
use crate::scene_graph::{NodeId, SceneGraph};

use super::camera::{Camera, Viewport};
use super::surface::{BlendMode, Surface, BLACK, WHITE};

pub const DEFAULT_LIGHT_BUFFER_SCALE: f32 = 0.5;
pub const MIN_BUFFER_SCALE: f32 = 0.05;
pub const DEFAULT_LIGHT_RADIUS_PX: f32 = 200.0;
pub const LIGHT_GRADIENT_STEPS: u32 = 20;
pub const LIGHT_INTENSITY_LEVELS: u32 = 32;
/// Soft mask border: (stroke width in buffer pixels, mask value) pairs, widest first.
pub const VISIBILITY_EDGE_BANDS: [(f32, u8); 2] = [(12.0, 50), (6.0, 100)];
const MAX_CACHED_LIGHT_MASKS: usize = 64;
const MAX_LIGHT_MASK_RADIUS_PX: f32 = 2048.0;

/// Radial light. `radius_px` is measured in unzoomed iso pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub radius_px: f32,
    pub color: [u8; 3],
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            radius_px: DEFAULT_LIGHT_RADIUS_PX,
            color: [255, 255, 200],
            intensity: 1.0,
        }
    }
}

/// Sun or moon. Adds a uniform tint; the direction only steers shadows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    direction: Vec2,
    pub color: [u8; 3],
    pub intensity: f32,
}

impl DirectionalLight {
    /// A zero or non-finite direction falls back to the `(1, 1)` diagonal.
    pub fn new(direction: Vec2, color: [u8; 3], intensity: f32) -> Self {
        let fallback = Vec2::new(std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2);
        Self {
            direction: direction.normalized().unwrap_or(fallback),
            color,
            intensity,
        }
    }

    /// Unit vector on the ground plane.
    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    pub fn is_active(&self) -> bool {
        self.intensity.is_finite() && self.intensity > 0.0
    }

    fn tint(&self) -> [u8; 4] {
        let intensity = self.intensity.clamp(0.0, 1.0);
        let channel = |value: u8| (value as f32 * intensity).round() as u8;
        [
            channel(self.color[0]),
            channel(self.color[1]),
            channel(self.color[2]),
            255,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LightingStage {
    Cleared,
    AmbientFilled,
    DirectionalApplied,
    ShadowsDrawn,
    PointLightsAccumulated,
    VisibilityMasked,
    Composited,
}

impl LightingStage {
    pub fn next(self) -> Option<LightingStage> {
        match self {
            Self::Cleared => Some(Self::AmbientFilled),
            Self::AmbientFilled => Some(Self::DirectionalApplied),
            Self::DirectionalApplied => Some(Self::ShadowsDrawn),
            Self::ShadowsDrawn => Some(Self::PointLightsAccumulated),
            Self::PointLightsAccumulated => Some(Self::VisibilityMasked),
            Self::VisibilityMasked => Some(Self::Composited),
            Self::Composited => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LightingError {
    #[error("lighting stage {attempted:?} cannot follow {current:?}")]
    OutOfOrder {
        current: LightingStage,
        attempted: LightingStage,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightingStats {
    pub lights_registered: usize,
    pub duplicate_registrations: usize,
    pub lights_drawn: usize,
    pub lights_culled: usize,
    pub lights_missing: usize,
    pub visibility_masked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LightMaskKey {
    radius_px: u32,
    color: [u8; 3],
    intensity_level: u8,
}

/// Radial gradients keyed by (radius, color, intensity). Intensity is snapped to
/// [`LIGHT_INTENSITY_LEVELS`] steps so flickering lights reuse a handful of masks.
#[derive(Debug, Default)]
pub struct LightMaskCache {
    masks: HashMap<LightMaskKey, Surface>,
}

impl LightMaskCache {
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn clear(&mut self) {
        self.masks.clear();
    }

    pub fn get_or_build(&mut self, radius_px: f32, color: [u8; 3], intensity: f32) -> &Surface {
        let radius_px = radius_px.clamp(1.0, MAX_LIGHT_MASK_RADIUS_PX).round() as u32;
        let intensity_level = if intensity.is_finite() {
            (intensity.clamp(0.0, 1.0) * LIGHT_INTENSITY_LEVELS as f32).round() as u8
        } else {
            0
        };
        let intensity = intensity_level as f32 / LIGHT_INTENSITY_LEVELS as f32;
        let key = LightMaskKey {
            radius_px,
            color,
            intensity_level,
        };
        if !self.masks.contains_key(&key) && self.masks.len() >= MAX_CACHED_LIGHT_MASKS {
            debug!(entries = self.masks.len(), "light_mask_cache_reset");
            self.masks.clear();
        }
        self.masks
            .entry(key)
            .or_insert_with(|| build_light_mask(radius_px, color, intensity))
    }
}

/// Quadratic falloff in discrete rings: ring `k` of `N` carries
/// `alpha = 255 * intensity * (1 - (k / N)^2)`.
pub fn build_light_mask(radius_px: u32, color: [u8; 3], intensity: f32) -> Surface {
    let size = radius_px.max(1) * 2;
    let mut mask = Surface::new(size, size);
    let radius = radius_px.max(1) as f32;
    let max_alpha = 255.0 * intensity.clamp(0.0, 1.0);
    let center = Vec2::new(radius, radius);
    for y in 0..size as i32 {
        for x in 0..size as i32 {
            let distance = Vec2::new(x as f32 + 0.5, y as f32 + 0.5).distance(center);
            if distance >= radius {
                continue;
            }
            let ring = ((distance / radius) * LIGHT_GRADIENT_STEPS as f32).floor();
            let progress = ring / LIGHT_GRADIENT_STEPS as f32;
            let alpha = (max_alpha * (1.0 - progress * progress)).round() as u8;
            mask.blend_pixel(x, y, [color[0], color[1], color[2], alpha], BlendMode::Replace);
        }
    }
    mask
}

fn buffer_dimension(full: u32, scale: f32) -> u32 {
    ((full as f32 * scale).round() as u32).max(1)
}

#[derive(Debug)]
pub struct LightingCompositor {
    buffer: Surface,
    mask: Surface,
    scale: f32,
    viewport: Viewport,
    stage: LightingStage,
    ambient: [u8; 3],
    directional: Option<DirectionalLight>,
    registered: Vec<NodeId>,
    registered_set: HashSet<NodeId>,
    masks: LightMaskCache,
    warned_missing_lights: HashSet<NodeId>,
    stats: LightingStats,
}

impl LightingCompositor {
    pub fn new(viewport: Viewport, scale: f32) -> Self {
        let scale = if scale.is_finite() {
            scale.clamp(MIN_BUFFER_SCALE, 1.0)
        } else {
            DEFAULT_LIGHT_BUFFER_SCALE
        };
        let width = buffer_dimension(viewport.width, scale);
        let height = buffer_dimension(viewport.height, scale);
        Self {
            buffer: Surface::filled(width, height, BLACK),
            mask: Surface::filled(width, height, BLACK),
            scale,
            viewport,
            stage: LightingStage::Composited,
            ambient: [0, 0, 0],
            directional: None,
            registered: Vec::new(),
            registered_set: HashSet::new(),
            masks: LightMaskCache::default(),
            warned_missing_lights: HashSet::new(),
            stats: LightingStats::default(),
        }
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        let width = buffer_dimension(viewport.width, self.scale);
        let height = buffer_dimension(viewport.height, self.scale);
        self.buffer = Surface::filled(width, height, BLACK);
        self.mask = Surface::filled(width, height, BLACK);
        self.viewport = viewport;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn buffer(&self) -> &Surface {
        &self.buffer
    }

    pub fn stage(&self) -> LightingStage {
        self.stage
    }

    pub fn stats(&self) -> LightingStats {
        self.stats
    }

    pub fn mask_cache(&self) -> &LightMaskCache {
        &self.masks
    }

    pub fn set_ambient(&mut self, color: [u8; 3]) {
        self.ambient = color;
    }

    pub fn ambient(&self) -> [u8; 3] {
        self.ambient
    }

    pub fn set_directional(&mut self, light: Option<DirectionalLight>) {
        self.directional = light;
    }

    pub fn directional(&self) -> Option<&DirectionalLight> {
        self.directional.as_ref()
    }

    /// Registers a point light for this frame. A second registration of the same node is
    /// ignored and returns `false`.
    pub fn register_light(&mut self, node: NodeId) -> bool {
        if !self.registered_set.insert(node) {
            self.stats.duplicate_registrations += 1;
            debug!(node = %node, "lighting_duplicate_light_registration_ignored");
            return false;
        }
        self.registered.push(node);
        self.stats.lights_registered += 1;
        true
    }

    pub fn registered_lights(&self) -> &[NodeId] {
        &self.registered
    }

    fn advance(&mut self, attempted: LightingStage) -> Result<(), LightingError> {
        if self.stage.next() != Some(attempted) {
            return Err(LightingError::OutOfOrder {
                current: self.stage,
                attempted,
            });
        }
        self.stage = attempted;
        Ok(())
    }

    /// Starts a new frame from any stage: buffer to black, registrations dropped.
    pub fn begin_frame(&mut self) {
        self.buffer.fill(BLACK);
        self.registered.clear();
        self.registered_set.clear();
        self.stats = LightingStats::default();
        self.stage = LightingStage::Cleared;
    }

    pub fn fill_ambient(&mut self) -> Result<(), LightingError> {
        self.advance(LightingStage::AmbientFilled)?;
        let [r, g, b] = self.ambient;
        self.buffer.fill([r, g, b, 255]);
        Ok(())
    }

    /// Adds `color * intensity` uniformly when a directional light is active.
    pub fn apply_directional(&mut self) -> Result<(), LightingError> {
        self.advance(LightingStage::DirectionalApplied)?;
        if let Some(light) = self.directional.filter(DirectionalLight::is_active) {
            self.buffer.fill_blend(light.tint(), BlendMode::Additive);
        }
        Ok(())
    }

    /// Shadows live on their own surface; this only records that they were drawn.
    pub fn mark_shadows_drawn(&mut self) -> Result<(), LightingError> {
        self.advance(LightingStage::ShadowsDrawn)
    }

    /// Adds every registered light's gradient. Lights whose nodes disappeared since
    /// registration are skipped.
    pub fn accumulate_point_lights(
        &mut self,
        graph: &SceneGraph,
        camera: &Camera,
    ) -> Result<usize, LightingError> {
        self.advance(LightingStage::PointLightsAccumulated)?;
        let buffer_width = self.buffer.width() as f32;
        let buffer_height = self.buffer.height() as f32;
        let mut drawn = 0;
        for index in 0..self.registered.len() {
            let node = self.registered[index];
            let resolved = graph.get(node).and_then(|scene_node| {
                let light = scene_node.light_emitter()?.point_light();
                Some((light, graph.global_position(node)?))
            });
            let Some((light, position)) = resolved else {
                self.stats.lights_missing += 1;
                if self.warned_missing_lights.insert(node) {
                    warn!(node = %node, "lighting_light_missing_skipped");
                }
                continue;
            };
            if !light.intensity.is_finite()
                || light.intensity <= 0.0
                || !light.radius_px.is_finite()
                || light.radius_px <= 0.0
            {
                continue;
            }

            let center = camera.project(position) * self.scale;
            let radius = light.radius_px * camera.zoom() * self.scale;
            let inside = -radius < center.x
                && center.x < buffer_width + radius
                && -radius < center.y
                && center.y < buffer_height + radius;
            if !inside {
                self.stats.lights_culled += 1;
                continue;
            }

            let gradient = self.masks.get_or_build(radius, light.color, light.intensity);
            let half = (gradient.width() / 2) as i32;
            self.buffer.blit(
                gradient,
                center.x.round() as i32 - half,
                center.y.round() as i32 - half,
                BlendMode::Additive,
            );
            drawn += 1;
        }
        self.stats.lights_drawn = drawn;
        Ok(drawn)
    }

    /// Multiplies the buffer by a soft-edged mask of the visibility polygon. Polygons with
    /// fewer than three points leave the buffer as it was. Returns whether a mask was applied.
    pub fn apply_visibility_mask(
        &mut self,
        polygon: Option<&VisibilityPolygon>,
        camera: &Camera,
    ) -> Result<bool, LightingError> {
        self.advance(LightingStage::VisibilityMasked)?;
        let Some(polygon) = polygon.filter(|polygon| polygon.is_drawable()) else {
            return Ok(false);
        };
        let scale = self.scale;
        let points: Vec<Vec2> = polygon
            .points()
            .iter()
            .map(|point| camera.project(point.extend(0.0)) * scale)
            .collect();

        self.mask.fill(BLACK);
        for (width, value) in VISIBILITY_EDGE_BANDS {
            self.mask
                .stroke_closed(&points, width, [value, value, value, 255], BlendMode::Lighten);
        }
        self.mask.fill_polygon(&points, WHITE, BlendMode::Lighten);
        self.buffer.blit(&self.mask, 0, 0, BlendMode::Multiply);
        self.stats.visibility_masked = true;
        Ok(true)
    }

    /// Upsamples the buffer to the frame and multiplies it in.
    pub fn composite(&mut self, frame: &mut Surface) -> Result<(), LightingError> {
        self.advance(LightingStage::Composited)?;
        let upsampled = self.buffer.resized(frame.width(), frame.height());
        frame.blit(&upsampled, 0, 0, BlendMode::Multiply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::scene_graph::{Group, LightEmitter, NodeContent};

    #[derive(Debug)]
    struct Lamp(PointLight);

    impl LightEmitter for Lamp {
        fn point_light(&self) -> PointLight {
            self.0
        }
    }

    impl NodeContent for Lamp {
        fn as_light_emitter(&self) -> Option<&dyn LightEmitter> {
            Some(self)
        }
    }

    fn camera() -> Camera {
        Camera::new(Viewport::new(200, 200))
    }

    fn lit_buffer(graph: &SceneGraph, lamp: NodeId, ambient: [u8; 3]) -> Surface {
        let mut compositor = LightingCompositor::new(Viewport::new(200, 200), 0.5);
        compositor.set_ambient(ambient);
        compositor.begin_frame();
        compositor.fill_ambient().expect("ambient");
        compositor.apply_directional().expect("directional");
        compositor.mark_shadows_drawn().expect("shadows");
        compositor.register_light(lamp);
        compositor
            .accumulate_point_lights(graph, &camera())
            .expect("point lights");
        compositor.buffer().clone()
    }

    fn run_to_points(compositor: &mut LightingCompositor) {
        compositor.begin_frame();
        compositor.fill_ambient().expect("ambient");
        compositor.apply_directional().expect("directional");
        compositor.mark_shadows_drawn().expect("shadows");
    }

    #[test]
    fn stages_must_run_in_order() {
        let mut compositor = LightingCompositor::new(Viewport::new(64, 64), 0.5);
        compositor.begin_frame();
        assert_eq!(
            compositor.apply_directional(),
            Err(LightingError::OutOfOrder {
                current: LightingStage::Cleared,
                attempted: LightingStage::DirectionalApplied,
            })
        );
        compositor.fill_ambient().expect("ambient");
        assert!(compositor.fill_ambient().is_err());
        assert_eq!(compositor.stage(), LightingStage::AmbientFilled);
    }

    #[test]
    fn full_frame_reaches_composited() {
        let graph = SceneGraph::new();
        let mut compositor = LightingCompositor::new(Viewport::new(64, 48), 0.5);
        compositor.set_ambient([40, 40, 60]);
        run_to_points(&mut compositor);
        compositor
            .accumulate_point_lights(&graph, &Camera::new(Viewport::new(64, 48)))
            .expect("points");
        compositor
            .apply_visibility_mask(None, &Camera::new(Viewport::new(64, 48)))
            .expect("mask");
        let mut frame = Surface::filled(64, 48, WHITE);
        compositor.composite(&mut frame).expect("composite");

        assert_eq!(compositor.stage(), LightingStage::Composited);
        assert_eq!(frame.pixel(10, 10), Some([40, 40, 60, 255]));
        assert!(compositor.composite(&mut frame).is_err());
    }

    #[test]
    fn directional_light_adds_uniform_tint() {
        let mut compositor = LightingCompositor::new(Viewport::new(20, 20), 0.5);
        compositor.set_ambient([20, 20, 30]);
        compositor.set_directional(Some(DirectionalLight::new(
            Vec2::new(1.0, 1.0),
            [200, 100, 0],
            0.5,
        )));
        compositor.begin_frame();
        compositor.fill_ambient().expect("ambient");
        compositor.apply_directional().expect("directional");
        assert_eq!(compositor.buffer().pixel(3, 7), Some([120, 70, 30, 255]));
    }

    #[test]
    fn inactive_directional_light_is_skipped() {
        let mut compositor = LightingCompositor::new(Viewport::new(20, 20), 0.5);
        compositor.set_ambient([20, 20, 30]);
        compositor.set_directional(Some(DirectionalLight::new(Vec2::ZERO, [255, 255, 255], 0.0)));
        compositor.begin_frame();
        compositor.fill_ambient().expect("ambient");
        compositor.apply_directional().expect("directional");
        assert_eq!(compositor.buffer().pixel(0, 0), Some([20, 20, 30, 255]));
        let direction = compositor.directional().expect("sun").direction();
        assert!((direction.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn light_brightens_around_its_position() {
        let mut graph = SceneGraph::new();
        let lamp = graph
            .spawn(
                graph.root(),
                "lamp",
                Vec3::ZERO,
                Lamp(PointLight {
                    radius_px: 60.0,
                    color: [255, 200, 100],
                    intensity: 1.0,
                }),
            )
            .expect("lamp");
        let buffer = lit_buffer(&graph, lamp, [10, 10, 10]);
        let center = buffer.pixel(50, 50).expect("center");
        let edge = buffer.pixel(50, 74).expect("edge");
        let outside = buffer.pixel(2, 2).expect("outside");

        assert_eq!(center, [255, 210, 110, 255]);
        assert!(edge[0] > 10 && edge[0] < center[0], "edge={edge:?}");
        assert_eq!(outside, [10, 10, 10, 255]);
    }

    #[test]
    fn raising_intensity_never_darkens_any_pixel() {
        let mut graph = SceneGraph::new();
        let mut previous: Option<Surface> = None;
        for intensity in [0.0, 0.1, 0.35, 0.6, 0.9, 1.0] {
            let lamp = graph
                .spawn(
                    graph.root(),
                    "lamp",
                    Vec3::new(0.5, 0.5, 0.0),
                    Lamp(PointLight {
                        radius_px: 80.0,
                        color: [180, 160, 120],
                        intensity,
                    }),
                )
                .expect("lamp");
            let buffer = lit_buffer(&graph, lamp, [15, 15, 25]);
            if let Some(previous) = &previous {
                for (now, before) in buffer.as_bytes().iter().zip(previous.as_bytes()) {
                    assert!(now >= before, "intensity={intensity}");
                }
            }
            previous = Some(buffer);
            graph.remove(lamp).expect("remove");
        }
    }

    #[test]
    fn duplicate_registration_does_not_double_light() {
        let mut graph = SceneGraph::new();
        let lamp = graph
            .spawn(graph.root(), "lamp", Vec3::ZERO, Lamp(PointLight::default()))
            .expect("lamp");
        let once = lit_buffer(&graph, lamp, [0, 0, 0]);

        let mut compositor = LightingCompositor::new(Viewport::new(200, 200), 0.5);
        run_to_points(&mut compositor);
        assert!(compositor.register_light(lamp));
        assert!(!compositor.register_light(lamp));
        assert_eq!(compositor.registered_lights(), &[lamp]);
        compositor
            .accumulate_point_lights(&graph, &camera())
            .expect("points");
        assert_eq!(compositor.buffer(), &once);
        assert_eq!(compositor.stats().duplicate_registrations, 1);
    }

    #[test]
    fn light_removed_after_registration_is_skipped() {
        let mut graph = SceneGraph::new();
        let lamp = graph
            .spawn(graph.root(), "lamp", Vec3::ZERO, Lamp(PointLight::default()))
            .expect("lamp");
        let plain = graph.spawn(graph.root(), "plain", Vec3::ZERO, Group).expect("plain");

        let mut compositor = LightingCompositor::new(Viewport::new(100, 100), 0.5);
        compositor.set_ambient([5, 5, 5]);
        run_to_points(&mut compositor);
        compositor.register_light(lamp);
        compositor.register_light(plain);
        graph.remove(lamp).expect("remove");

        let drawn = compositor
            .accumulate_point_lights(&graph, &Camera::new(Viewport::new(100, 100)))
            .expect("points");
        assert_eq!(drawn, 0);
        assert_eq!(compositor.stats().lights_missing, 2);
        assert_eq!(compositor.buffer().pixel(25, 25), Some([5, 5, 5, 255]));
    }

    #[test]
    fn offscreen_light_is_culled() {
        let mut graph = SceneGraph::new();
        let lamp = graph
            .spawn(
                graph.root(),
                "lamp",
                Vec3::new(100.0, -100.0, 0.0),
                Lamp(PointLight::default()),
            )
            .expect("lamp");
        let mut compositor = LightingCompositor::new(Viewport::new(100, 100), 0.5);
        run_to_points(&mut compositor);
        compositor.register_light(lamp);
        compositor
            .accumulate_point_lights(&graph, &Camera::new(Viewport::new(100, 100)))
            .expect("points");
        assert_eq!(compositor.stats().lights_culled, 1);
        assert!(compositor.mask_cache().is_empty());
    }

    #[test]
    fn visibility_mask_darkens_outside_polygon() {
        let camera = Camera::new(Viewport::new(400, 400));
        let mut compositor = LightingCompositor::new(Viewport::new(400, 400), 0.5);
        compositor.set_ambient([200, 200, 200]);
        run_to_points(&mut compositor);
        compositor
            .accumulate_point_lights(&SceneGraph::new(), &camera)
            .expect("points");
        let polygon = VisibilityPolygon::from_points(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, -2.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(-2.0, 2.0),
            Vec2::new(-2.0, -2.0),
        ]);
        assert!(compositor
            .apply_visibility_mask(Some(&polygon), &camera)
            .expect("mask"));

        let buffer = compositor.buffer();
        assert_eq!(buffer.pixel(90, 110), Some([200, 200, 200, 255]));
        assert_eq!(buffer.pixel(2, 2), Some([0, 0, 0, 255]));
    }

    #[test]
    fn degenerate_polygon_skips_masking() {
        let camera = Camera::new(Viewport::new(40, 40));
        let mut compositor = LightingCompositor::new(Viewport::new(40, 40), 0.5);
        compositor.set_ambient([90, 90, 90]);
        run_to_points(&mut compositor);
        compositor
            .accumulate_point_lights(&SceneGraph::new(), &camera)
            .expect("points");
        let polygon = VisibilityPolygon::from_points(vec![Vec2::ZERO, Vec2::new(1.0, 0.0)]);
        assert!(!compositor
            .apply_visibility_mask(Some(&polygon), &camera)
            .expect("mask"));
        assert_eq!(compositor.buffer().pixel(0, 0), Some([90, 90, 90, 255]));
        assert_eq!(compositor.stage(), LightingStage::VisibilityMasked);
    }

    #[test]
    fn light_mask_falls_off_quadratically() {
        let mask = build_light_mask(40, [255, 255, 255], 1.0);
        assert_eq!(mask.width(), 80);
        let alpha_at = |x: i32| mask.pixel(x, 40).expect("pixel")[3];
        assert_eq!(alpha_at(40), 255);
        assert!(alpha_at(50) > alpha_at(60));
        assert!(alpha_at(60) > alpha_at(75));
        assert!(alpha_at(79) < 30);
        assert_eq!(mask.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn flickering_intensity_reuses_snapped_masks() {
        let mut cache = LightMaskCache::default();
        for tick in 0..600 {
            let intensity = 0.8 + 0.2 * (tick as f32 * 0.1).sin();
            cache.get_or_build(30.0, [255, 200, 150], intensity);
        }
        assert!(cache.len() <= 16, "{} masks", cache.len());

        let mut fresh = LightMaskCache::default();
        fresh.get_or_build(30.0, [255, 255, 255], 0.9);
        fresh.get_or_build(30.0, [255, 255, 255], 0.9004);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn light_masks_are_cached_by_parameters() {
        let mut cache = LightMaskCache::default();
        cache.get_or_build(30.0, [255, 255, 255], 1.0);
        cache.get_or_build(30.2, [255, 255, 255], 1.0);
        assert_eq!(cache.len(), 1);
        cache.get_or_build(30.0, [255, 0, 0], 1.0);
        cache.get_or_build(30.0, [255, 255, 255], 0.5);
        assert_eq!(cache.len(), 3);
    }
}
