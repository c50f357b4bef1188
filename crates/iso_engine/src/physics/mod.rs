mod spatial;
mod visibility;

pub use spatial::{
    Body, BodyId, BodyKind, CellKey, RegisterOutcome, SpatialIndex, WorldExtents, ACTOR_HEIGHT,
    CELL_SIZE, DEFAULT_RAY_STEP, OBJECT_HALF_EXTENT, RAY_PROBE_HALF_EXTENT,
};
pub use visibility::{
    compute_visibility, VisibilityPolygon, VisibilityRequest, DEFAULT_RAY_COUNT,
    DEFAULT_VIEW_RADIUS, DEFAULT_VISIBILITY_STEP,
};
