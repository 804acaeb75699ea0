pub mod geometry;
pub mod material;
pub mod serialization;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use geometry::{GeometryDescriptor, GeometryKind, MeshData};
pub use material::{Color, MaterialDescriptor, MaterialKind, Side, TextureImage, TextureRef};

/// Structural defects of a graph read from outside, such as a hand-edited
/// project file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("node id {0} appears more than once")]
    DuplicateId(NodeId),
    #[error("node {node} names unknown parent {parent}")]
    UnknownParent { node: NodeId, parent: NodeId },
    #[error("node {0} is its own ancestor")]
    Cycle(NodeId),
}

/// Stable identity of a scene node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub uuid::Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local transform - matches what can be edited in UI
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation_deg: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation_deg: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl Transform {
    pub fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Rotation applied in X, Y, Z order.
    pub fn rotation(&self) -> glam::Quat {
        let [x, y, z] = self.rotation_deg;
        glam::Quat::from_euler(
            glam::EulerRot::XYZ,
            x.to_radians(),
            y.to_radians(),
            z.to_radians(),
        )
    }

    pub fn matrix(&self) -> glam::Mat4 {
        glam::Mat4::from_scale_rotation_translation(
            glam::Vec3::from_array(self.scale),
            self.rotation(),
            glam::Vec3::from_array(self.position),
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Transform::default()
    }
}

/// One addressable element of the scene graph.
///
/// Descriptors are shared behind `Arc`; replacing a descriptor means swapping
/// the `Arc`, never writing through it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SceneNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub geometry: Arc<GeometryDescriptor>,
    pub material: Arc<MaterialDescriptor>,
    pub transform: Transform,
    pub visible: bool,
    pub parent: Option<NodeId>,
}

impl SceneNode {
    pub fn new(geometry: GeometryDescriptor, material: MaterialDescriptor) -> Self {
        Self {
            id: NodeId::new(),
            name: None,
            geometry: Arc::new(geometry),
            material: Arc::new(material),
            transform: Transform::default(),
            visible: true,
            parent: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unnamed")
    }
}

/// Owned scene graph handle.
///
/// Nodes are kept in insertion order; hierarchy is expressed through
/// `SceneNode::parent`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Adds a top-level node.
    pub fn add(&mut self, mut node: SceneNode) -> NodeId {
        node.parent = None;
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Adds `node` under `parent`. Returns `None` when the parent is unknown.
    pub fn add_child(&mut self, parent: NodeId, mut node: SceneNode) -> Option<NodeId> {
        if !self.contains(parent) {
            return None;
        }
        node.parent = Some(parent);
        let id = node.id;
        self.nodes.push(node);
        Some(id)
    }

    /// Swaps in a new version of an existing node, keeping its position and
    /// parent. Returns `false` when no node has that id.
    pub fn replace(&mut self, node: SceneNode) -> bool {
        match self.nodes.iter_mut().find(|existing| existing.id == node.id) {
            Some(existing) => {
                let parent = existing.parent;
                *existing = SceneNode { parent, ..node };
                true
            }
            None => false,
        }
    }

    /// Removes a node together with its descendants.
    pub fn remove(&mut self, id: NodeId) -> usize {
        let mut doomed = vec![id];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let current = doomed[cursor];
            doomed.extend(
                self.nodes
                    .iter()
                    .filter(|node| node.parent == Some(current))
                    .map(|node| node.id),
            );
            cursor += 1;
        }
        let before = self.nodes.len();
        self.nodes.retain(|node| !doomed.contains(&node.id));
        before - self.nodes.len()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Clears the graph and attaches the imported one. No merge.
    pub fn import(&mut self, imported: SceneGraph) {
        self.nodes = imported.nodes;
    }

    pub fn roots(&self) -> impl Iterator<Item = &SceneNode> {
        self.nodes.iter().filter(|node| node.parent.is_none())
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &SceneNode> {
        self.nodes
            .iter()
            .filter(move |node| node.parent == Some(id))
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(SceneNode::display_name).collect()
    }

    /// Checks that ids are unique and every parent chain ends at a root.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(GraphError::DuplicateId(node.id));
            }
        }

        for node in &self.nodes {
            let mut cursor = node.parent;
            let mut steps = 0;
            while let Some(parent) = cursor {
                if parent == node.id || steps > self.nodes.len() {
                    return Err(GraphError::Cycle(node.id));
                }
                let Some(next) = self.get(parent) else {
                    return Err(GraphError::UnknownParent {
                        node: node.id,
                        parent,
                    });
                };
                cursor = next.parent;
                steps += 1;
            }
        }
        Ok(())
    }
}
