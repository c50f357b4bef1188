use crate::math::{Vec2, Vec3};
use crate::projection::{self, TILE_HEIGHT};
use crate::scene_graph::{NodeId, Renderable, VisitedRenderable};

use super::camera::Camera;
use super::sprites::{SpriteCache, SpriteKey};
use super::surface::{BlendMode, Surface};

/// One sprite waiting to be drawn this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawQueueEntry {
    pub depth: f32,
    pub sprite: SpriteKey,
    /// Unzoomed iso-space position of the node's anchor.
    pub iso: Vec2,
    pub world: Vec3,
    pub size_z: f32,
    pub scale: f32,
    pub node: NodeId,
}

impl DrawQueueEntry {
    pub fn new(node: NodeId, world: Vec3, scale: f32, renderable: &dyn Renderable) -> Self {
        Self {
            depth: projection::depth_key_of(world),
            sprite: renderable.sprite_key(),
            iso: projection::project(world),
            world,
            size_z: renderable.size_z(),
            scale,
            node,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawStats {
    pub submitted: usize,
    pub drawn: usize,
    pub culled: usize,
    pub missing_sprite: usize,
}

/// Per-frame list of sprites, painted back to front by depth key.
#[derive(Debug, Default)]
pub struct DrawQueue {
    entries: Vec<DrawQueueEntry>,
}

impl DrawQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn submit(&mut self, visit: &VisitedRenderable<'_>) {
        self.entries.push(DrawQueueEntry::new(
            visit.node,
            visit.global_position,
            visit.scale,
            visit.renderable,
        ));
    }

    pub fn submit_entry(&mut self, entry: DrawQueueEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DrawQueueEntry] {
        &self.entries
    }

    /// Stable ascending sort; equal keys keep submission order.
    pub fn sort(&mut self) {
        self.entries
            .sort_by(|left, right| left.depth.total_cmp(&right.depth));
    }

    /// Sorts, then blits each sprite with its mid-bottom on the node's ground anchor.
    /// Sprites whose screen rectangle misses the frame are skipped.
    pub fn flush(&mut self, frame: &mut Surface, camera: &Camera, sprites: &mut SpriteCache) -> DrawStats {
        self.sort();
        let mut stats = DrawStats::default();
        let frame_width = frame.width() as i32;
        let frame_height = frame.height() as i32;

        for entry in &self.entries {
            stats.submitted += 1;
            let Some(sprite) = sprites.resolve(&entry.sprite) else {
                stats.missing_sprite += 1;
                continue;
            };
            let factor = camera.zoom() * entry.scale;
            let width = (sprite.width() as f32 * factor).round() as i32;
            let height = (sprite.height() as f32 * factor).round() as i32;
            if width <= 0 || height <= 0 {
                stats.culled += 1;
                continue;
            }
            let anchor = camera.world_to_screen(entry.iso + Vec2::new(0.0, TILE_HEIGHT * 0.5));
            let left = (anchor.x - width as f32 * 0.5).round() as i32;
            let top = (anchor.y - height as f32).round() as i32;
            if left >= frame_width || top >= frame_height || left + width <= 0 || top + height <= 0 {
                stats.culled += 1;
                continue;
            }
            frame.blit_scaled(
                sprite,
                left,
                top,
                width as u32,
                height as u32,
                BlendMode::Alpha,
            );
            stats.drawn += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::camera::Viewport;
    use crate::rendering::surface::TRANSPARENT;
    use crate::scene_graph::{NodeContent, SceneGraph};

    #[derive(Debug)]
    struct Tile([u8; 3]);

    impl Renderable for Tile {
        fn sprite_key(&self) -> SpriteKey {
            SpriteKey::Floor { color: self.0 }
        }

        fn size_z(&self) -> f32 {
            0.05
        }
    }

    impl NodeContent for Tile {
        fn as_renderable(&self) -> Option<&dyn Renderable> {
            Some(self)
        }
    }

    fn queue_from(graph: &SceneGraph) -> DrawQueue {
        let mut queue = DrawQueue::new();
        for visit in graph.traverse().renderables {
            queue.submit(&visit);
        }
        queue
    }

    #[test]
    fn sorts_by_depth_ascending() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let far = graph.spawn(root, "far", Vec3::new(1.0, 1.0, 0.0), Tile([1, 1, 1])).expect("far");
        let near = graph.spawn(root, "near", Vec3::new(4.0, 3.0, 0.0), Tile([2, 2, 2])).expect("near");
        let raised = graph.spawn(root, "raised", Vec3::new(1.0, 1.0, 2.0), Tile([3, 3, 3])).expect("raised");

        let mut queue = queue_from(&graph);
        let mut sunk = queue.entries()[0].clone();
        sunk.depth = -5.0;
        queue.submit_entry(sunk);
        queue.sort();
        let order: Vec<NodeId> = queue.entries().iter().map(|entry| entry.node).collect();
        assert_eq!(order, vec![far, far, raised, near]);
    }

    #[test]
    fn equal_depth_keeps_submission_order() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let a = graph.spawn(root, "a", Vec3::new(1.0, 2.0, 0.0), Tile([10, 0, 0])).expect("a");
        let b = graph.spawn(root, "b", Vec3::new(2.0, 1.0, 0.0), Tile([0, 10, 0])).expect("b");
        let mut queue = queue_from(&graph);
        assert_eq!(queue.entries()[0].depth, 3.0);
        assert_eq!(queue.entries()[1].depth, 3.0);

        let mut frame = Surface::new(320, 240);
        let mut sprites = SpriteCache::new(None);
        queue.flush(&mut frame, &Camera::new(Viewport::new(320, 240)), &mut sprites);
        let order: Vec<NodeId> = queue.entries().iter().map(|entry| entry.node).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn later_entries_paint_over_earlier_ones() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        graph.spawn(root, "front", Vec3::new(0.5, 0.5, 0.0), Tile([0, 200, 0])).expect("front");
        graph.spawn(root, "back", Vec3::new(0.5, 0.5, -0.5), Tile([200, 0, 0])).expect("back");
        let mut queue = queue_from(&graph);

        let mut frame = Surface::new(200, 200);
        let mut sprites = SpriteCache::new(None);
        let stats = queue.flush(&mut frame, &Camera::new(Viewport::new(200, 200)), &mut sprites);

        assert_eq!(stats.drawn, 2);
        let front_center = Camera::new(Viewport::new(200, 200)).project(Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(
            frame.pixel(front_center.x as i32, front_center.y as i32),
            Some([0, 200, 0, 255])
        );
    }

    #[test]
    fn sprite_feet_sit_on_the_ground_anchor() {
        let mut graph = SceneGraph::new();
        graph
            .spawn(graph.root(), "tile", Vec3::new(0.5, 0.5, 0.0), Tile([50, 60, 70]))
            .expect("tile");
        let mut queue = queue_from(&graph);
        let camera = Camera::new(Viewport::new(200, 200));
        let mut frame = Surface::new(200, 200);
        queue.flush(&mut frame, &camera, &mut SpriteCache::new(None));

        // Cell (0, 0) spans iso y 0..32; the diamond's bottom corner lands at y = 32.
        let top_corner = camera.world_to_screen(Vec2::new(0.0, 0.0));
        let bottom_corner = camera.world_to_screen(Vec2::new(0.0, 32.0));
        assert_eq!(
            frame.pixel(top_corner.x as i32, top_corner.y as i32),
            Some([50, 60, 70, 255])
        );
        assert_eq!(
            frame.pixel(bottom_corner.x as i32, bottom_corner.y as i32 - 1),
            Some([50, 60, 70, 255])
        );
        assert_eq!(
            frame.pixel(bottom_corner.x as i32, bottom_corner.y as i32 + 1),
            Some(TRANSPARENT)
        );
    }

    #[test]
    fn offscreen_sprites_are_culled() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        graph.spawn(root, "visible", Vec3::new(0.5, 0.5, 0.0), Tile([1, 1, 1])).expect("visible");
        graph.spawn(root, "away", Vec3::new(80.0, -80.0, 0.0), Tile([1, 1, 1])).expect("away");
        let mut queue = queue_from(&graph);
        let mut frame = Surface::new(100, 100);
        let stats = queue.flush(
            &mut frame,
            &Camera::new(Viewport::new(100, 100)),
            &mut SpriteCache::new(None),
        );
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.drawn, 1);
        assert_eq!(stats.culled, 1);
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut graph = SceneGraph::new();
        graph.spawn(graph.root(), "t", Vec3::ZERO, Tile([1, 1, 1])).expect("t");
        let mut queue = queue_from(&graph);
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }
}
