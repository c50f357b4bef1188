//! Ground-plane shadow silhouettes, rasterized at reduced resolution and laid under sprites.

use crate::math::{Vec2, Vec3};

use super::camera::{Camera, Viewport};
use super::draw_queue::DrawQueueEntry;
use super::lighting::DirectionalLight;
use super::surface::{BlendMode, Surface, TRANSPARENT};

pub const DEFAULT_SHADOW_BUFFER_SCALE: f32 = 0.5;
pub const DEFAULT_SHADOW_ALPHA: u8 = 90;
/// Entries no taller than this cast no shadow.
pub const SHADOW_CASTER_MIN_HEIGHT: f32 = 0.2;
/// Horizontal shadow length per unit of caster height under the sun.
pub const SUN_SHADOW_LENGTH: f32 = 0.8;
/// Point lights below this height are lifted to [`POINT_SHADOW_RAISED_LIGHT_Z`].
pub const POINT_SHADOW_MIN_LIGHT_Z: f32 = 2.0;
pub const POINT_SHADOW_RAISED_LIGHT_Z: f32 = 3.0;
pub const MAX_POINT_SHADOW_STRETCH: f32 = 6.0;
const FOOTPRINT_HALF_EXTENT: f32 = 0.5;
/// A caster this close to the light (horizontally) contains it and casts nothing.
const LIGHT_INSIDE_CASTER_DISTANCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadowStats {
    pub directional: usize,
    pub point: usize,
}

#[derive(Debug)]
pub struct ShadowPass {
    surface: Surface,
    scale: f32,
    alpha: u8,
    viewport: Viewport,
    stats: ShadowStats,
}

impl ShadowPass {
    pub fn new(viewport: Viewport, scale: f32, alpha: u8) -> Self {
        let scale = if scale.is_finite() {
            scale.clamp(0.05, 1.0)
        } else {
            DEFAULT_SHADOW_BUFFER_SCALE
        };
        Self {
            surface: Self::buffer_for(viewport, scale),
            scale,
            alpha,
            viewport,
            stats: ShadowStats::default(),
        }
    }

    fn buffer_for(viewport: Viewport, scale: f32) -> Surface {
        let width = ((viewport.width as f32 * scale).round() as u32).max(1);
        let height = ((viewport.height as f32 * scale).round() as u32).max(1);
        Surface::new(width, height)
    }

    pub fn resize(&mut self, viewport: Viewport) {
        if viewport == self.viewport {
            return;
        }
        self.surface = Self::buffer_for(viewport, self.scale);
        self.viewport = viewport;
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn stats(&self) -> ShadowStats {
        self.stats
    }

    pub fn begin_frame(&mut self) {
        self.surface.fill(TRANSPARENT);
        self.stats = ShadowStats::default();
    }

    /// Sun shadows: each footprint swept along the sun direction by its height.
    pub fn draw_directional(&mut self, entries: &[DrawQueueEntry], sun: &DirectionalLight, camera: &Camera) {
        if !sun.is_active() {
            return;
        }
        let offset_per_height = sun.direction() * SUN_SHADOW_LENGTH;
        for entry in entries.iter().filter(|entry| casts_shadow(entry)) {
            let base = footprint(entry.world);
            let offset = offset_per_height * entry.size_z;
            let mut points: Vec<Vec2> = base.to_vec();
            points.extend(base.iter().map(|corner| *corner + offset));
            self.fill_silhouette(&points, entry.world.z, camera);
            self.stats.directional += 1;
        }
    }

    /// Point-light shadows: footprint tops projected onto the ground away from the light.
    pub fn draw_point(&mut self, entries: &[DrawQueueEntry], light_position: Vec3, camera: &Camera) {
        if !light_position.is_finite() {
            return;
        }
        let mut light = light_position;
        if light.z < POINT_SHADOW_MIN_LIGHT_Z {
            light.z = POINT_SHADOW_RAISED_LIGHT_Z;
        }
        for entry in entries.iter().filter(|entry| casts_shadow(entry)) {
            if entry.world.xy().distance(light.xy()) < LIGHT_INSIDE_CASTER_DISTANCE {
                continue;
            }
            let light_height = light.z - entry.world.z;
            let stretch = if light_height - entry.size_z > f32::EPSILON {
                (entry.size_z / (light_height - entry.size_z)).min(MAX_POINT_SHADOW_STRETCH)
            } else {
                MAX_POINT_SHADOW_STRETCH
            };
            let base = footprint(entry.world);
            let mut points: Vec<Vec2> = base.to_vec();
            points.extend(
                base.iter()
                    .map(|corner| *corner + (*corner - light.xy()) * stretch),
            );
            self.fill_silhouette(&points, entry.world.z, camera);
            self.stats.point += 1;
        }
    }

    fn fill_silhouette(&mut self, ground_points: &[Vec2], ground_z: f32, camera: &Camera) {
        let hull = convex_hull(ground_points);
        if hull.len() < 3 {
            return;
        }
        let screen: Vec<Vec2> = hull
            .iter()
            .map(|point| camera.project(point.extend(ground_z)) * self.scale)
            .collect();
        self.surface
            .fill_polygon(&screen, [0, 0, 0, self.alpha], BlendMode::Replace);
    }

    /// Upsamples the shadow surface and alpha-blends it onto the frame.
    pub fn composite(&self, frame: &mut Surface) {
        if self.stats == ShadowStats::default() {
            return;
        }
        let upsampled = self.surface.resized(frame.width(), frame.height());
        frame.blit(&upsampled, 0, 0, BlendMode::Alpha);
    }
}

fn casts_shadow(entry: &DrawQueueEntry) -> bool {
    entry.size_z.is_finite() && entry.size_z > SHADOW_CASTER_MIN_HEIGHT && entry.world.is_finite()
}

/// Square cell footprint centred on the entry's anchor.
fn footprint(world: Vec3) -> [Vec2; 4] {
    let center = world.xy();
    let h = FOOTPRINT_HALF_EXTENT;
    [
        center + Vec2::new(-h, -h),
        center + Vec2::new(h, -h),
        center + Vec2::new(h, h),
        center + Vec2::new(-h, h),
    ]
}

fn cross(origin: Vec2, a: Vec2, b: Vec2) -> f32 {
    (a.x - origin.x) * (b.y - origin.y) - (a.y - origin.y) * (b.x - origin.x)
}

/// Andrew's monotone chain; counter-clockwise, collinear points dropped.
pub fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let mut sorted: Vec<Vec2> = points.iter().copied().filter(|point| point.is_finite()).collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Vec2> = Vec::with_capacity(sorted.len() * 2);
    for point in sorted.iter().copied() {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], point) <= 0.0 {
            hull.pop();
        }
        hull.push(point);
    }
    let lower_len = hull.len() + 1;
    for point in sorted.iter().rev().skip(1).copied() {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], point) <= 0.0
        {
            hull.pop();
        }
        hull.push(point);
    }
    hull.pop();
    hull
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::sprites::SpriteKey;
    use crate::scene_graph::SceneGraph;

    fn entry(world: Vec3, size_z: f32) -> DrawQueueEntry {
        let graph = SceneGraph::new();
        DrawQueueEntry {
            depth: world.x + world.y,
            sprite: SpriteKey::block([100, 100, 100], size_z),
            iso: crate::projection::project(world),
            world,
            size_z,
            scale: 1.0,
            node: graph.root(),
        }
    }

    fn shaded_pixels(pass: &ShadowPass) -> usize {
        pass.surface()
            .as_bytes()
            .chunks_exact(4)
            .filter(|pixel| pixel[3] != 0)
            .count()
    }

    #[test]
    fn hull_of_square_with_interior_point() {
        let hull = convex_hull(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.5, 0.5),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ]);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&Vec2::new(0.5, 0.5)));
    }

    #[test]
    fn hull_of_degenerate_input_is_short() {
        assert!(convex_hull(&[]).is_empty());
        assert_eq!(convex_hull(&[Vec2::ZERO, Vec2::ZERO]).len(), 1);
    }

    #[test]
    fn flat_entries_cast_no_shadow() {
        let camera = Camera::new(Viewport::new(200, 200));
        let mut pass = ShadowPass::new(Viewport::new(200, 200), 0.5, 90);
        pass.begin_frame();
        let sun = DirectionalLight::new(Vec2::new(1.0, 0.0), [255, 255, 255], 0.6);
        pass.draw_directional(&[entry(Vec3::new(0.5, 0.5, 0.0), 0.05)], &sun, &camera);
        assert_eq!(shaded_pixels(&pass), 0);
        assert_eq!(pass.stats().directional, 0);
    }

    #[test]
    fn taller_casters_cast_longer_sun_shadows() {
        let camera = Camera::new(Viewport::new(400, 400));
        let sun = DirectionalLight::new(Vec2::new(1.0, 0.0), [255, 255, 255], 0.6);
        let mut short = ShadowPass::new(Viewport::new(400, 400), 0.5, 90);
        short.begin_frame();
        short.draw_directional(&[entry(Vec3::new(0.5, 0.5, 0.0), 0.5)], &sun, &camera);
        let mut tall = ShadowPass::new(Viewport::new(400, 400), 0.5, 90);
        tall.begin_frame();
        tall.draw_directional(&[entry(Vec3::new(0.5, 0.5, 0.0), 2.0)], &sun, &camera);

        assert!(shaded_pixels(&tall) > shaded_pixels(&short));
        assert_eq!(tall.surface().pixel(100, 108).map(|p| p[3]), Some(90));
    }

    #[test]
    fn inactive_sun_draws_nothing() {
        let camera = Camera::new(Viewport::new(100, 100));
        let mut pass = ShadowPass::new(Viewport::new(100, 100), 0.5, 90);
        pass.begin_frame();
        let moon = DirectionalLight::new(Vec2::new(1.0, 1.0), [255, 255, 255], 0.0);
        pass.draw_directional(&[entry(Vec3::new(0.5, 0.5, 0.0), 1.8)], &moon, &camera);
        assert_eq!(shaded_pixels(&pass), 0);
    }

    #[test]
    fn point_shadow_falls_away_from_the_light() {
        let camera = Camera::new(Viewport::new(600, 600));
        let mut pass = ShadowPass::new(Viewport::new(600, 600), 0.5, 90);
        pass.begin_frame();
        pass.draw_point(
            &[entry(Vec3::new(2.5, 0.5, 0.0), 1.0)],
            Vec3::new(0.5, 0.5, 1.0),
            &camera,
        );
        assert_eq!(pass.stats().point, 1);

        // The far side (+x) of the caster is shaded, the near side is not.
        let far = camera.project(Vec3::new(3.15, 0.5, 0.0)) * 0.5;
        let near = camera.project(Vec3::new(1.7, 0.5, 0.0)) * 0.5;
        assert_eq!(pass.surface().pixel(far.x as i32, far.y as i32).map(|p| p[3]), Some(90));
        assert_eq!(pass.surface().pixel(near.x as i32, near.y as i32).map(|p| p[3]), Some(0));
    }

    #[test]
    fn light_inside_caster_is_ignored() {
        let camera = Camera::new(Viewport::new(200, 200));
        let mut pass = ShadowPass::new(Viewport::new(200, 200), 0.5, 90);
        pass.begin_frame();
        pass.draw_point(
            &[entry(Vec3::new(0.5, 0.5, 0.0), 1.8)],
            Vec3::new(0.5, 0.5, 0.5),
            &camera,
        );
        assert_eq!(pass.stats().point, 0);
    }

    #[test]
    fn overlapping_shadows_do_not_stack() {
        let camera = Camera::new(Viewport::new(400, 400));
        let sun = DirectionalLight::new(Vec2::new(0.0, 1.0), [255, 255, 255], 0.6);
        let mut pass = ShadowPass::new(Viewport::new(400, 400), 0.5, 90);
        pass.begin_frame();
        pass.draw_directional(
            &[
                entry(Vec3::new(0.5, 0.5, 0.0), 2.0),
                entry(Vec3::new(0.5, 1.0, 0.0), 2.0),
            ],
            &sun,
            &camera,
        );
        let alphas: std::collections::BTreeSet<u8> = pass
            .surface()
            .as_bytes()
            .chunks_exact(4)
            .map(|pixel| pixel[3])
            .collect();
        assert_eq!(alphas.into_iter().collect::<Vec<_>>(), vec![0, 90]);
    }

    #[test]
    fn composite_darkens_frame_under_shadow() {
        let camera = Camera::new(Viewport::new(100, 100));
        let sun = DirectionalLight::new(Vec2::new(1.0, 0.0), [255, 255, 255], 0.6);
        let mut pass = ShadowPass::new(Viewport::new(100, 100), 0.5, 128);
        pass.begin_frame();
        pass.draw_directional(&[entry(Vec3::new(0.5, 0.5, 0.0), 1.0)], &sun, &camera);

        let mut frame = Surface::filled(100, 100, [200, 200, 200, 255]);
        pass.composite(&mut frame);
        let shaded = frame.pixel(100 / 2, 100 / 2 + 16).expect("pixel");
        assert!(shaded[0] < 200, "{shaded:?}");
        assert_eq!(frame.pixel(0, 0), Some([200, 200, 200, 255]));
    }
}
