use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::math::{Vec2, Vec3};

/// Edge length of one spatial hash cell, in world units.
pub const CELL_SIZE: f32 = 1.0;
/// Vertical extent of an actor standing at a probe point.
pub const ACTOR_HEIGHT: f32 = 1.8;
/// Half extent of a free-standing object's collision box.
pub const OBJECT_HALF_EXTENT: f32 = 0.4;
/// Half extent of the probe used by ray marching.
pub const RAY_PROBE_HALF_EXTENT: f32 = 0.1;
pub const DEFAULT_RAY_STEP: f32 = 0.1;
pub const MIN_RAY_STEP: f32 = 0.005;
/// Hard bound on ray marching iterations regardless of ray length.
pub const MAX_RAY_STEPS: u32 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i32,
    pub y: i32,
}

impl CellKey {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn containing(point: Vec2) -> Self {
        Self {
            x: (point.x / CELL_SIZE).floor() as i32,
            y: (point.y / CELL_SIZE).floor() as i32,
        }
    }
}

/// Identity of a registered object. Registration is idempotent per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Static,
    Dynamic,
}

/// Axis-aligned collision box. `center.z` is the base elevation; the box spans
/// `center.z..center.z + height` vertically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub center: Vec3,
    pub half_extent: f32,
    pub height: f32,
}

impl Body {
    /// A body filling the grid cell `(grid_x, grid_y)` exactly.
    pub fn tile(grid_x: i32, grid_y: i32, base_z: f32, height: f32) -> Self {
        Self {
            center: Vec3::new(grid_x as f32 + 0.5, grid_y as f32 + 0.5, base_z),
            half_extent: CELL_SIZE * 0.5,
            height,
        }
    }

    pub fn object(position: Vec3, height: f32) -> Self {
        Self {
            center: position,
            half_extent: OBJECT_HALF_EXTENT,
            height,
        }
    }

    /// Cells covered by the box, treating its max edges as exclusive.
    pub fn footprint(&self) -> Vec<CellKey> {
        let min = CellKey::containing(Vec2::new(
            self.center.x - self.half_extent,
            self.center.y - self.half_extent,
        ));
        let max_x = ((self.center.x + self.half_extent) / CELL_SIZE).ceil() as i32 - 1;
        let max_y = ((self.center.y + self.half_extent) / CELL_SIZE).ceil() as i32 - 1;
        let mut cells = Vec::new();
        for y in min.y..=max_y.max(min.y) {
            for x in min.x..=max_x.max(min.x) {
                cells.push(CellKey::new(x, y));
            }
        }
        cells
    }

    fn overlaps(&self, point: Vec3, half_extent: f32, actor_height: f32) -> bool {
        let reach = half_extent + self.half_extent;
        let planar = (point.x - self.center.x).abs() < reach && (point.y - self.center.y).abs() < reach;
        if !planar {
            return false;
        }
        let top = self.center.z + self.height;
        point.z < top && point.z + actor_height > self.center.z
    }
}

/// Inclusive cell range that registrations and queries are clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldExtents {
    pub min: CellKey,
    pub max: CellKey,
}

impl WorldExtents {
    /// Extents of a `width` x `height` map whose first cell is `(0, 0)`.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            min: CellKey::new(0, 0),
            max: CellKey::new(
                width.max(1) as i32 - 1,
                height.max(1) as i32 - 1,
            ),
        }
    }

    pub fn contains(&self, cell: CellKey) -> bool {
        (self.min.x..=self.max.x).contains(&cell.x) && (self.min.y..=self.max.y).contains(&cell.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The id was already present; nothing changed.
    AlreadyRegistered,
    /// None of the footprint cells lie inside the world extents; nothing changed.
    OutOfBounds,
}

#[derive(Debug, Clone)]
struct RegisteredBody {
    body: Body,
    kind: BodyKind,
    cells: Vec<CellKey>,
}

/// Uniform grid over world cells mapping each cell to the bodies registered in it.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    cells: HashMap<CellKey, Vec<BodyId>>,
    bodies: HashMap<BodyId, RegisteredBody>,
    extents: Option<WorldExtents>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extents(extents: WorldExtents) -> Self {
        Self {
            extents: Some(extents),
            ..Self::default()
        }
    }

    pub fn extents(&self) -> Option<WorldExtents> {
        self.extents
    }

    /// Changes the extents. Existing registrations are kept as they are.
    pub fn set_extents(&mut self, extents: Option<WorldExtents>) {
        self.extents = extents;
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id).map(|registered| &registered.body)
    }

    pub fn body_kind(&self, id: BodyId) -> Option<BodyKind> {
        self.bodies.get(&id).map(|registered| registered.kind)
    }

    pub fn register_static(
        &mut self,
        id: BodyId,
        body: Body,
        footprint: &[CellKey],
    ) -> RegisterOutcome {
        self.register(id, body, footprint, BodyKind::Static)
    }

    /// Registers a body that is expected to move via [`SpatialIndex::move_body`].
    pub fn register_dynamic(&mut self, id: BodyId, body: Body) -> RegisterOutcome {
        let footprint = body.footprint();
        self.register(id, body, &footprint, BodyKind::Dynamic)
    }

    /// Registers a static body over the cells its box covers.
    pub fn register_body(&mut self, id: BodyId, body: Body) -> RegisterOutcome {
        let footprint = body.footprint();
        self.register(id, body, &footprint, BodyKind::Static)
    }

    fn register(
        &mut self,
        id: BodyId,
        body: Body,
        footprint: &[CellKey],
        kind: BodyKind,
    ) -> RegisterOutcome {
        if self.bodies.contains_key(&id) {
            debug!(body = id.0, "spatial_register_duplicate_ignored");
            return RegisterOutcome::AlreadyRegistered;
        }

        let mut cells: Vec<CellKey> = footprint
            .iter()
            .copied()
            .filter(|cell| self.extents.map_or(true, |extents| extents.contains(*cell)))
            .collect();
        cells.sort_unstable();
        cells.dedup();
        if cells.is_empty() {
            debug!(
                body = id.0,
                x = body.center.x,
                y = body.center.y,
                "spatial_register_out_of_bounds"
            );
            return RegisterOutcome::OutOfBounds;
        }

        for cell in &cells {
            self.cells.entry(*cell).or_default().push(id);
        }
        self.bodies.insert(id, RegisteredBody { body, kind, cells });
        RegisterOutcome::Registered
    }

    /// Removes the body from every cell it occupies. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: BodyId) -> bool {
        let Some(registered) = self.bodies.remove(&id) else {
            return false;
        };
        for cell in &registered.cells {
            if let Some(occupants) = self.cells.get_mut(cell) {
                occupants.retain(|occupant| *occupant != id);
                if occupants.is_empty() {
                    self.cells.remove(cell);
                }
            }
        }
        true
    }

    /// Moves a registered body and re-registers it over its new footprint.
    /// Returns `false` if the id is unknown or the new footprint is out of bounds
    /// (in which case the body is left unregistered).
    pub fn move_body(&mut self, id: BodyId, center: Vec3) -> bool {
        let Some(registered) = self.bodies.get(&id) else {
            return false;
        };
        let kind = registered.kind;
        let mut body = registered.body;
        body.center = center;
        self.unregister(id);
        let footprint = body.footprint();
        self.register(id, body, &footprint, kind) == RegisterOutcome::Registered
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.bodies.clear();
    }

    /// Ids registered in exactly `cell`, in registration order.
    pub fn cell(&self, cell: CellKey) -> &[BodyId] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All objects in the `(2 * radius_cells + 1)^2` neighborhood of `center`'s cell.
    /// Over-approximates; callers still run precise shape tests.
    pub fn query_region(&self, center: Vec2, radius_cells: u32) -> BTreeSet<BodyId> {
        let mut found = BTreeSet::new();
        self.for_each_candidate(center, radius_cells, |id, _| {
            found.insert(id);
        });
        found
    }

    /// True if a box of `half_extent` at `point` overlaps any body, using the fixed actor height.
    pub fn test_collision(&self, point: Vec3, half_extent: f32) -> bool {
        self.first_collision(point, half_extent).is_some()
    }

    pub fn first_collision(&self, point: Vec3, half_extent: f32) -> Option<BodyId> {
        self.first_collision_with_height(point, half_extent, ACTOR_HEIGHT)
    }

    pub fn first_collision_with_height(
        &self,
        point: Vec3,
        half_extent: f32,
        actor_height: f32,
    ) -> Option<BodyId> {
        if !point.is_finite() {
            return None;
        }
        let half_extent = if half_extent.is_finite() {
            half_extent.max(0.0)
        } else {
            0.0
        };
        let radius_cells = (half_extent / CELL_SIZE).ceil().max(1.0) as u32;
        let mut hit: Option<BodyId> = None;
        self.for_each_candidate(point.xy(), radius_cells, |id, body| {
            if hit.is_none() && body.overlaps(point, half_extent, actor_height) {
                hit = Some(id);
            }
        });
        hit
    }

    /// Marches a probe from `start` toward `end` in fixed steps and returns the first
    /// position that collides. Positions are computed from the step index, not accumulated.
    pub fn raycast(&self, start: Vec3, end: Vec3, step: f32) -> Option<Vec3> {
        if !start.is_finite() || !end.is_finite() {
            return None;
        }
        let step = normalize_ray_step(step);
        let delta = end - start;
        let distance = delta.length();
        if distance <= f32::EPSILON {
            return self
                .test_collision(start, RAY_PROBE_HALF_EXTENT)
                .then_some(start);
        }
        let direction = delta * distance.recip();
        let step_count = ((distance / step).ceil() as u32).min(MAX_RAY_STEPS);
        (0..step_count)
            .map(|index| start + direction * (step * index as f32))
            .find(|point| self.test_collision(*point, RAY_PROBE_HALF_EXTENT))
    }

    /// Cell contents keyed by cell, sorted for stable comparison and persistence.
    pub fn cell_snapshot(&self) -> BTreeMap<CellKey, Vec<BodyId>> {
        self.cells
            .iter()
            .map(|(cell, ids)| {
                let mut ids = ids.clone();
                ids.sort_unstable();
                (*cell, ids)
            })
            .collect()
    }

    fn for_each_candidate(
        &self,
        center: Vec2,
        radius_cells: u32,
        mut visit: impl FnMut(BodyId, &Body),
    ) {
        if self.cells.is_empty() || !center.is_finite() {
            return;
        }
        let origin = CellKey::containing(center);
        let radius = radius_cells.min(i32::MAX as u32 / 4) as i32;
        let (mut min_x, mut max_x) = (origin.x - radius, origin.x + radius);
        let (mut min_y, mut max_y) = (origin.y - radius, origin.y + radius);
        if let Some(extents) = self.extents {
            min_x = min_x.max(extents.min.x);
            max_x = max_x.min(extents.max.x);
            min_y = min_y.max(extents.min.y);
            max_y = max_y.min(extents.max.y);
        }
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let Some(occupants) = self.cells.get(&CellKey::new(x, y)) else {
                    continue;
                };
                for id in occupants {
                    if let Some(registered) = self.bodies.get(id) {
                        visit(*id, &registered.body);
                    }
                }
            }
        }
    }
}

pub(super) fn normalize_ray_step(step: f32) -> f32 {
    if step.is_finite() && step > 0.0 {
        step.max(MIN_RAY_STEP)
    } else {
        DEFAULT_RAY_STEP
    }
}
