pub mod camera;
pub mod draw_queue;
pub mod lighting;
pub mod shadow;
pub mod sprites;
pub mod surface;

pub use camera::{
    Camera, CameraMode, Viewport, CAMERA_ZOOM_DEFAULT, CAMERA_ZOOM_MAX, CAMERA_ZOOM_MIN,
    CAMERA_ZOOM_STEP,
};
pub use draw_queue::{DrawQueue, DrawQueueEntry, DrawStats};
pub use lighting::{
    build_light_mask, DirectionalLight, LightMaskCache, LightingCompositor, LightingError,
    LightingStage, LightingStats, PointLight, DEFAULT_LIGHT_BUFFER_SCALE, DEFAULT_LIGHT_RADIUS_PX,
    LIGHT_GRADIENT_STEPS,
};
pub use shadow::{
    convex_hull, ShadowPass, ShadowStats, DEFAULT_SHADOW_ALPHA, DEFAULT_SHADOW_BUFFER_SCALE,
    SHADOW_CASTER_MIN_HEIGHT,
};
pub use sprites::{height_px, validate_sprite_key, SpriteCache, SpriteKey, SpriteKeyError, WallSide};
pub use surface::{BlendMode, Rgba, Surface, SurfaceError, BLACK, TRANSPARENT, WHITE};
