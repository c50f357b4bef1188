//! Fixed isometric projection between world grid units and unzoomed screen pixels.
//!
//! Screen space here is "iso space": pixels before camera pan and zoom are applied.
//! [`crate::Camera`] maps iso space onto the window.

use crate::math::{Vec2, Vec3};

/// Width of one diamond tile in pixels.
pub const TILE_WIDTH: f32 = 64.0;
/// Height of one diamond tile in pixels.
pub const TILE_HEIGHT: f32 = 32.0;
/// Pixels per world unit of vertical height.
pub const HEIGHT_SCALE: f32 = 32.0;
/// Weight of `z` in the depth key. Small enough that height never crosses an `x + y` bucket
/// for heights below 1000 world units.
pub const DEPTH_Z_EPSILON: f32 = 0.001;

const HALF_TILE_WIDTH: f32 = TILE_WIDTH * 0.5;
const HALF_TILE_HEIGHT: f32 = TILE_HEIGHT * 0.5;

pub fn cart_to_iso(x: f32, y: f32, z: f32) -> Vec2 {
    Vec2 {
        x: (x - y) * HALF_TILE_WIDTH,
        y: (x + y) * HALF_TILE_HEIGHT - z * HEIGHT_SCALE,
    }
}

/// Exact inverse of the ground-plane part of [`cart_to_iso`]; the result lies at `z = 0`.
pub fn iso_to_cart(screen_x: f32, screen_y: f32) -> Vec2 {
    let diff = screen_x / HALF_TILE_WIDTH;
    let sum = screen_y / HALF_TILE_HEIGHT;
    Vec2 {
        x: (sum + diff) * 0.5,
        y: (sum - diff) * 0.5,
    }
}

/// Paint-order key. Larger keys draw later (on top). Equal keys keep submission order.
pub fn depth_key(x: f32, y: f32, z: f32) -> f32 {
    x + y + z * DEPTH_Z_EPSILON
}

pub fn project(position: Vec3) -> Vec2 {
    cart_to_iso(position.x, position.y, position.z)
}

pub fn depth_key_of(position: Vec3) -> f32 {
    depth_key(position.x, position.y, position.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_projects_to_origin() {
        assert_eq!(cart_to_iso(0.0, 0.0, 0.0), Vec2::ZERO);
    }

    #[test]
    fn unit_axes_project_to_diamond_edges() {
        assert_eq!(cart_to_iso(1.0, 0.0, 0.0), Vec2::new(32.0, 16.0));
        assert_eq!(cart_to_iso(0.0, 1.0, 0.0), Vec2::new(-32.0, 16.0));
    }

    #[test]
    fn height_lifts_screen_position() {
        let ground = cart_to_iso(3.0, 2.0, 0.0);
        let raised = cart_to_iso(3.0, 2.0, 1.5);
        assert_eq!(raised.x, ground.x);
        assert!((ground.y - raised.y - 1.5 * HEIGHT_SCALE).abs() < 1e-4);
    }

    #[test]
    fn round_trip_recovers_ground_position() {
        let mut x = -20.0_f32;
        while x <= 20.0 {
            let mut y = -20.0_f32;
            while y <= 20.0 {
                let iso = cart_to_iso(x, y, 0.0);
                let back = iso_to_cart(iso.x, iso.y);
                assert!((back.x - x).abs() < 1e-4, "x={x} y={y} back={back:?}");
                assert!((back.y - y).abs() < 1e-4, "x={x} y={y} back={back:?}");
                y += 0.37;
            }
            x += 0.41;
        }
    }

    #[test]
    fn depth_key_breaks_ties_by_height() {
        assert!(depth_key(2.0, 3.0, 0.0) < depth_key(2.0, 3.0, 1.0));
        assert!(depth_key(2.0, 3.0, 5.0) < depth_key(3.0, 3.0, 0.0));
        assert_eq!(depth_key(1.0, 2.0, 0.0), depth_key(2.0, 1.0, 0.0));
    }
}
