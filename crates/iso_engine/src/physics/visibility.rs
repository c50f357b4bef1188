use crate::math::{Vec2, Vec3};

use super::spatial::{normalize_ray_step, SpatialIndex, MAX_RAY_STEPS, RAY_PROBE_HALF_EXTENT};

pub const DEFAULT_RAY_COUNT: u32 = 120;
/// `ray_count + 1` rays are cast, so one is the smallest count that still forms a fan.
pub const MIN_RAY_COUNT: u32 = 1;
pub const DEFAULT_VIEW_RADIUS: f32 = 8.0;
pub const MIN_VIEW_RADIUS: f32 = 0.1;
pub const DEFAULT_VISIBILITY_STEP: f32 = 0.1;
pub const FULL_CIRCLE_DEGREES: f32 = 360.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityRequest {
    pub origin: Vec3,
    /// Facing direction on the ground plane. `None` (or a zero vector) sweeps a full circle.
    pub facing: Option<Vec2>,
    pub fov_degrees: f32,
    pub ray_count: u32,
    pub max_radius: f32,
    pub step: f32,
}

impl VisibilityRequest {
    pub fn around(origin: Vec3, max_radius: f32) -> Self {
        Self {
            origin,
            facing: None,
            fov_degrees: FULL_CIRCLE_DEGREES,
            ray_count: DEFAULT_RAY_COUNT,
            max_radius,
            step: DEFAULT_VISIBILITY_STEP,
        }
    }

    pub fn with_facing(mut self, facing: Vec2, fov_degrees: f32) -> Self {
        self.facing = Some(facing);
        self.fov_degrees = fov_degrees;
        self
    }

    pub fn with_ray_count(mut self, ray_count: u32) -> Self {
        self.ray_count = ray_count;
        self
    }
}

/// Star-shaped fan around an origin: the origin followed by one endpoint per ray in
/// angular order. Rebuilt every frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisibilityPolygon {
    points: Vec<Vec2>,
}

impl VisibilityPolygon {
    pub fn from_points(points: Vec<Vec2>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn origin(&self) -> Option<Vec2> {
        self.points.first().copied()
    }

    pub fn ray_endpoints(&self) -> &[Vec2] {
        self.points.get(1..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A polygon needs three points to cover any area.
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 3
    }
}

/// Sweeps rays from an origin through the spatial index and returns the visible fan.
pub fn compute_visibility(index: &SpatialIndex, request: &VisibilityRequest) -> VisibilityPolygon {
    let origin = request.origin;
    let ray_count = request.ray_count.max(MIN_RAY_COUNT);
    let max_radius = if request.max_radius.is_finite() {
        request.max_radius.max(MIN_VIEW_RADIUS)
    } else {
        DEFAULT_VIEW_RADIUS
    };
    let step = normalize_ray_step(request.step).min(max_radius);

    let (start_angle, span) = match request.facing.and_then(Vec2::normalized) {
        Some(facing) => {
            let fov = normalize_fov(request.fov_degrees);
            let base_angle = facing.y.atan2(facing.x).to_degrees();
            (base_angle - fov * 0.5, fov)
        }
        None => (0.0, FULL_CIRCLE_DEGREES),
    };
    let angle_step = span / ray_count as f32;

    let mut points = Vec::with_capacity(ray_count as usize + 2);
    points.push(origin.xy());
    for ray in 0..=ray_count {
        let angle = (start_angle + angle_step * ray as f32).to_radians();
        let direction = Vec2::new(angle.cos(), angle.sin());
        points.push(march_ray(index, origin, direction, max_radius, step));
    }
    VisibilityPolygon { points }
}

fn normalize_fov(fov_degrees: f32) -> f32 {
    if fov_degrees.is_finite() && fov_degrees > 0.0 {
        fov_degrees.min(FULL_CIRCLE_DEGREES)
    } else {
        FULL_CIRCLE_DEGREES
    }
}

fn march_ray(
    index: &SpatialIndex,
    origin: Vec3,
    direction: Vec2,
    max_radius: f32,
    step: f32,
) -> Vec2 {
    let step_count = march_step_count(max_radius, step);
    for index_step in 1..=step_count {
        let distance = (step * index_step as f32).min(max_radius);
        let point = origin.xy() + direction * distance;
        if index.test_collision(point.extend(origin.z), RAY_PROBE_HALF_EXTENT) {
            return point;
        }
    }
    origin.xy() + direction * max_radius
}

/// Steps needed to cover `max_radius`, never more than [`MAX_RAY_STEPS`].
fn march_step_count(max_radius: f32, step: f32) -> u32 {
    ((max_radius / step).ceil().max(1.0) as u32).min(MAX_RAY_STEPS)
}
