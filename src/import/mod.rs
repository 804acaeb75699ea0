//! Reads exported `.glb` / `.gltf` files back into a scene graph.
//!
//! Nodes are rebuilt from the editor `extras` written on export. Documents from
//! other tools fall back to a box with a standard material tinted by the base
//! color factor. Texture maps are not restored.

use std::collections::HashSet;
use std::path::Path;

use crate::export::{MaterialExtras, NodeExtras};
use crate::scene::{
    Color, GeometryKind, MaterialDescriptor, NodeId, SceneGraph, SceneNode, Transform,
};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("document has no scene")]
    NoScene,
}

pub type Result<T> = std::result::Result<T, ImportError>;

pub fn read_scene_file(path: &Path) -> Result<SceneGraph> {
    let bytes = std::fs::read(path)?;
    let graph = read_scene(&bytes)?;
    log::info!("Imported {} ({} nodes)", path.display(), graph.len());
    Ok(graph)
}

/// Parses a GLB container or a glTF JSON document.
pub fn read_scene(bytes: &[u8]) -> Result<SceneGraph> {
    let document = gltf::Gltf::from_slice(bytes)?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ImportError::NoScene)?;

    let mut graph = SceneGraph::new();
    let mut visited = HashSet::new();
    for node in scene.nodes() {
        import_node(&mut graph, &mut visited, None, &node);
    }
    Ok(graph)
}

fn import_node(
    graph: &mut SceneGraph,
    visited: &mut HashSet<usize>,
    parent: Option<NodeId>,
    node: &gltf::Node<'_>,
) {
    if !visited.insert(node.index()) {
        log::warn!("Node {} is referenced more than once; skipping", node.index());
        return;
    }
    let extras: Option<NodeExtras> = node
        .extras()
        .as_ref()
        .and_then(|raw| serde_json::from_str(raw.get()).ok());
    if extras.is_none() {
        log::warn!(
            "Node {} carries no editor metadata; importing as {}",
            node.name().unwrap_or("<unnamed>"),
            GeometryKind::Box
        );
    }
    let geometry = extras
        .as_ref()
        .map_or(GeometryKind::Box, |extras| extras.geometry);

    let mut scene_node = SceneNode::new(geometry.descriptor(), node_material(node))
        .with_transform(node_transform(node))
        .with_visible(extras.as_ref().map_or(true, |extras| extras.visible));
    scene_node.name = node.name().map(str::to_string);

    let id = match parent {
        Some(parent) => graph.add_child(parent, scene_node),
        None => Some(graph.add(scene_node)),
    };
    if let Some(id) = id {
        for child in node.children() {
            import_node(graph, visited, Some(id), &child);
        }
    }
}

fn node_material(node: &gltf::Node<'_>) -> MaterialDescriptor {
    let Some(material) = node
        .mesh()
        .and_then(|mesh| mesh.primitives().next())
        .map(|primitive| primitive.material())
    else {
        return MaterialDescriptor::default();
    };

    let from_extras = material
        .extras()
        .as_ref()
        .and_then(|raw| serde_json::from_str::<MaterialExtras>(raw.get()).ok())
        .and_then(|extras| extras.to_material());

    from_extras.unwrap_or_else(|| {
        let [r, g, b, _] = material.pbr_metallic_roughness().base_color_factor();
        MaterialDescriptor::default().with_color(Color::from_linear([r, g, b]))
    })
}

fn node_transform(node: &gltf::Node<'_>) -> Transform {
    let (position, rotation, scale) = node.transform().decomposed();
    let (x, y, z) = glam::Quat::from_array(rotation).to_euler(glam::EulerRot::XYZ);
    Transform {
        position,
        rotation_deg: [x.to_degrees(), y.to_degrees(), z.to_degrees()],
        scale,
    }
}
