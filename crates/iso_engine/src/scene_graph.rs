//! Hierarchical transform tree stored in a generation-checked arena.
//!
//! Positions are local to the parent; a node's global position is the sum of its own and
//! every ancestor's local position. Nodes opt into drawing or emitting light through the
//! [`Renderable`] and [`LightEmitter`] capabilities of their content.

use std::fmt;

use thiserror::Error;

use crate::math::Vec3;
use crate::physics::BodyId;
use crate::rendering::lighting::PointLight;
use crate::rendering::sprites::SpriteKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Stable collision-body identity for the node occupying this slot generation.
    pub fn body_id(self) -> BodyId {
        BodyId(((self.generation as u64) << 32) | self.index as u64)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneGraphError {
    #[error("node {0} does not exist")]
    MissingNode(NodeId),
    #[error("the root node cannot be {0}")]
    RootOperation(&'static str),
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle { child: NodeId, parent: NodeId },
}

/// Something that can be drawn as a single sprite.
pub trait Renderable {
    fn sprite_key(&self) -> SpriteKey;
    /// Vertical extent in world units; drives shadow casting.
    fn size_z(&self) -> f32;
}

pub trait LightEmitter {
    fn point_light(&self) -> PointLight;
}

/// Per-node payload. Capabilities default to absent.
pub trait NodeContent: fmt::Debug {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        None
    }

    fn as_light_emitter(&self) -> Option<&dyn LightEmitter> {
        None
    }

    fn update(&mut self, _dt_seconds: f32) {}
}

/// Content-free node used for grouping.
#[derive(Debug, Clone, Copy, Default)]
pub struct Group;

impl NodeContent for Group {}

#[derive(Debug)]
pub struct SceneNode {
    name: String,
    position: Vec3,
    scale: f32,
    visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    content: Box<dyn NodeContent>,
}

impl SceneNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local position relative to the parent.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn content(&self) -> &dyn NodeContent {
        self.content.as_ref()
    }

    pub fn content_mut(&mut self) -> &mut dyn NodeContent {
        self.content.as_mut()
    }

    pub fn renderable(&self) -> Option<&dyn Renderable> {
        self.content.as_renderable()
    }

    pub fn light_emitter(&self) -> Option<&dyn LightEmitter> {
        self.content.as_light_emitter()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<SceneNode>,
}

#[derive(Clone, Copy)]
pub struct VisitedRenderable<'a> {
    pub node: NodeId,
    pub global_position: Vec3,
    pub scale: f32,
    pub renderable: &'a dyn Renderable,
}

impl fmt::Debug for VisitedRenderable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitedRenderable")
            .field("node", &self.node)
            .field("global_position", &self.global_position)
            .field("scale", &self.scale)
            .finish()
    }
}

/// Output of one pre-order traversal.
#[derive(Debug, Default)]
pub struct SceneTraversal<'a> {
    pub renderables: Vec<VisitedRenderable<'a>>,
    pub lights: Vec<NodeId>,
}

#[derive(Debug)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    live: usize,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub fn new() -> Self {
        let root_node = SceneNode {
            name: "root".to_string(),
            position: Vec3::ZERO,
            scale: 1.0,
            visible: true,
            parent: None,
            children: Vec::new(),
            content: Box::new(Group),
        };
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            live: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live <= 1
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn node(&self, id: NodeId) -> Result<&SceneNode, SceneGraphError> {
        self.get(id).ok_or(SceneGraphError::MissingNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode, SceneGraphError> {
        self.get_mut(id).ok_or(SceneGraphError::MissingNode(id))
    }

    pub fn spawn(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        position: Vec3,
        content: impl NodeContent + 'static,
    ) -> Result<NodeId, SceneGraphError> {
        self.spawn_boxed(parent, name, position, Box::new(content))
    }

    pub fn spawn_boxed(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        position: Vec3,
        content: Box<dyn NodeContent>,
    ) -> Result<NodeId, SceneGraphError> {
        self.node(parent)?;
        let node = SceneNode {
            name: name.into(),
            position,
            scale: 1.0,
            visible: true,
            parent: Some(parent),
            children: Vec::new(),
            content,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        self.node_mut(parent)?.children.push(id);
        self.live += 1;
        Ok(id)
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<(), SceneGraphError> {
        self.node_mut(id)?.position = position;
        Ok(())
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), SceneGraphError> {
        self.node_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_scale(&mut self, id: NodeId, scale: f32) -> Result<(), SceneGraphError> {
        self.node_mut(id)?.scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
        Ok(())
    }

    /// Moves `child` (and its subtree) under `new_parent`.
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) -> Result<(), SceneGraphError> {
        if child == self.root {
            return Err(SceneGraphError::RootOperation("reparented"));
        }
        self.node(child)?;
        self.node(new_parent)?;
        let mut cursor = Some(new_parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(SceneGraphError::Cycle {
                    child,
                    parent: new_parent,
                });
            }
            cursor = self.get(ancestor).and_then(SceneNode::parent);
        }
        self.unlink_from_parent(child);
        self.node_mut(child)?.parent = Some(new_parent);
        self.node_mut(new_parent)?.children.push(child);
        Ok(())
    }

    /// Cuts `id` loose from its parent. Its descendants stay attached to it; the detached
    /// subtree is skipped by traversal until it is reparented.
    pub fn detach(&mut self, id: NodeId) -> Result<(), SceneGraphError> {
        if id == self.root {
            return Err(SceneGraphError::RootOperation("detached"));
        }
        self.node(id)?;
        self.unlink_from_parent(id);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Frees `id` and every descendant. Returns the freed ids in pre-order so owners can
    /// release resources tied to them.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<NodeId>, SceneGraphError> {
        if id == self.root {
            return Err(SceneGraphError::RootOperation("removed"));
        }
        self.node(id)?;
        self.unlink_from_parent(id);

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.slots.get_mut(current.index as usize) else {
                continue;
            };
            if slot.generation != current.generation {
                continue;
            }
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(current.index);
            self.live -= 1;
            removed.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(removed)
    }

    fn unlink_from_parent(&mut self, id: NodeId) {
        let Some(parent) = self.get(id).and_then(SceneNode::parent) else {
            return;
        };
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.retain(|child| *child != id);
        }
    }

    /// Sum of local positions along the parent chain.
    pub fn global_position(&self, id: NodeId) -> Option<Vec3> {
        let mut node = self.get(id)?;
        let mut position = node.position;
        while let Some(parent) = node.parent {
            node = self.get(parent)?;
            position += node.position;
        }
        Some(position)
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.get(current).and_then(SceneNode::parent);
        }
        false
    }

    /// Finds the first live node with `name`, in slot order.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let node = slot.node.as_ref()?;
            (node.name == name).then_some(NodeId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    /// Pre-order walk from the root. Invisible nodes prune their whole subtree.
    pub fn traverse(&self) -> SceneTraversal<'_> {
        let mut traversal = SceneTraversal::default();
        let mut stack = vec![(self.root, Vec3::ZERO)];
        while let Some((id, parent_position)) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let global_position = parent_position + node.position;
            if let Some(renderable) = node.renderable() {
                traversal.renderables.push(VisitedRenderable {
                    node: id,
                    global_position,
                    scale: node.scale,
                    renderable,
                });
            }
            if node.light_emitter().is_some() {
                traversal.lights.push(id);
            }
            for child in node.children.iter().rev() {
                stack.push((*child, global_position));
            }
        }
        traversal
    }

    /// Lets every live node's content react to elapsed time.
    pub fn update(&mut self, dt_seconds: f32) {
        for slot in &mut self.slots {
            if let Some(node) = slot.node.as_mut() {
                node.content.update(dt_seconds);
            }
        }
    }
}
