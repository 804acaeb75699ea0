pub mod gltf_writer;

use std::borrow::Cow;
use std::fmt;

use gltf::json;
use sha2::{Digest, Sha256};

use crate::scene::{NodeId, SceneGraph, SceneNode};
use gltf_writer::GltfWriter;

pub use gltf_writer::{MaterialExtras, NodeExtras};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GLB packing failed: {0}")]
    Glb(#[from] gltf::Error),
    #[error("texture encoding failed: {0}")]
    Texture(#[from] image::ImageError),
    #[error("texture '{name}' has {actual} bytes of pixels, expected {expected}")]
    TextureSize {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("node {0} is not in the scene")]
    UnknownRoot(NodeId),
    #[error("node {0} is reached twice; the hierarchy has a duplicate id or a cycle")]
    RepeatedNode(NodeId),
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Exporter switches. `Default` is the fixed set the inspector exports with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Prefer a single-buffer GLB.
    pub binary: bool,
    /// Write translation / rotation / scale instead of a matrix.
    pub trs: bool,
    /// Skip hidden nodes and everything below them.
    pub only_visible: bool,
    /// Drop vertices no triangle references.
    pub truncate_draw_range: bool,
    pub embed_images: bool,
    /// Longest texture edge, in pixels.
    pub max_texture_size: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            binary: true,
            trs: false,
            only_visible: true,
            truncate_draw_range: true,
            embed_images: true,
            max_texture_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportKind {
    Glb,
    Gltf,
}

impl ExportKind {
    pub fn extension(self) -> &'static str {
        match self {
            ExportKind::Glb => "glb",
            ExportKind::Gltf => "gltf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportKind::Glb => "application/octet-stream",
            ExportKind::Gltf => "text/plain",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            ExportKind::Glb => "scene.glb",
            ExportKind::Gltf => "scene.gltf",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Serialized scene. Exactly one variant is produced per export; callers pick
/// their write strategy from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportBuffer {
    Binary(Vec<u8>),
    Text(String),
}

impl ExportBuffer {
    pub fn kind(&self) -> ExportKind {
        match self {
            ExportBuffer::Binary(_) => ExportKind::Glb,
            ExportBuffer::Text(_) => ExportKind::Gltf,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ExportBuffer::Binary(bytes) => bytes,
            ExportBuffer::Text(text) => text.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn content_type(&self) -> &'static str {
        self.kind().content_type()
    }

    pub fn extension(&self) -> &'static str {
        self.kind().extension()
    }

    pub fn default_file_name(&self) -> &'static str {
        self.kind().default_file_name()
    }

    /// SHA-256 of the payload, lowercase hex.
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.as_bytes());
        hash.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Serializes every root of `graph`.
pub fn serialize(graph: &SceneGraph, options: &ExportOptions) -> Result<ExportBuffer> {
    let roots: Vec<&SceneNode> = graph
        .roots()
        .filter(|node| node.visible || !options.only_visible)
        .collect();
    serialize_roots(graph, &roots, options)
}

/// Serializes the subtree below `root`, with `root` as the only scene node.
pub fn serialize_subtree(
    graph: &SceneGraph,
    root: NodeId,
    options: &ExportOptions,
) -> Result<ExportBuffer> {
    let node = graph.get(root).ok_or(ExportError::UnknownRoot(root))?;
    let roots: Vec<&SceneNode> = if node.visible || !options.only_visible {
        vec![node]
    } else {
        Vec::new()
    };
    serialize_roots(graph, &roots, options)
}

fn serialize_roots(
    graph: &SceneGraph,
    roots: &[&SceneNode],
    options: &ExportOptions,
) -> Result<ExportBuffer> {
    let textual = !options.binary || has_linked_map(graph, roots, options);

    let mut writer = GltfWriter::new(graph, options, textual);
    let scene_nodes = roots
        .iter()
        .map(|node| writer.add_node(node))
        .collect::<Result<Vec<_>>>()?;
    let (root, bin) = writer.finish(scene_nodes);

    let buffer = if textual {
        ExportBuffer::Text(json::serialize::to_string_pretty(&root)?)
    } else {
        ExportBuffer::Binary(pack_glb(&root, bin)?)
    };

    log::info!(
        "Exported {} nodes as {} ({} bytes, sha256 {})",
        root.nodes.len(),
        buffer.kind(),
        buffer.len(),
        buffer.digest()
    );
    Ok(buffer)
}

fn pack_glb(root: &json::Root, bin: Vec<u8>) -> Result<Vec<u8>> {
    let json_bytes = json::serialize::to_vec(root)?;
    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            // to_writer computes this
            length: 0,
        },
        json: Cow::Owned(json_bytes),
        bin: if bin.is_empty() {
            None
        } else {
            Some(Cow::Owned(bin))
        },
    };

    let mut out = Vec::new();
    glb.to_writer(&mut out)?;
    Ok(out)
}

/// A linked texture cannot be packed into the single GLB buffer.
fn has_linked_map(graph: &SceneGraph, roots: &[&SceneNode], options: &ExportOptions) -> bool {
    let mut stack: Vec<&SceneNode> = roots.to_vec();
    while let Some(node) = stack.pop() {
        if node.material.is_linked_map() {
            log::info!(
                "Node {} links an external texture; falling back to textual glTF",
                node.display_name()
            );
            return true;
        }
        stack.extend(
            graph
                .children(node.id)
                .filter(|child| child.visible || !options.only_visible),
        );
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        Color, GeometryKind, MaterialDescriptor, MaterialKind, Side, TextureImage, TextureRef,
        Transform,
    };
    use std::sync::Arc;

    fn node(kind: GeometryKind, material: MaterialDescriptor) -> SceneNode {
        SceneNode::new(kind.descriptor(), material)
    }

    fn parse(buffer: &ExportBuffer) -> gltf::Gltf {
        gltf::Gltf::from_slice(buffer.as_bytes()).unwrap()
    }

    #[test]
    fn default_options_produce_glb() {
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Box, MaterialDescriptor::default()).with_name("Crate"));

        let buffer = serialize(&graph, &ExportOptions::default()).unwrap();
        assert_eq!(buffer.kind(), ExportKind::Glb);
        assert_eq!(&buffer.as_bytes()[..4], b"glTF");
        assert_eq!(buffer.content_type(), "application/octet-stream");

        let gltf = parse(&buffer);
        assert_eq!(gltf.nodes().count(), 1);
        let node = gltf.nodes().next().unwrap();
        assert_eq!(node.name(), Some("Crate"));
        let primitive = node.mesh().unwrap().primitives().next().unwrap();
        let positions = primitive.get(&gltf::Semantic::Positions).unwrap();
        assert_eq!(positions.count(), 24);
        assert_eq!(primitive.indices().unwrap().count(), 36);
    }

    #[test]
    fn binary_disabled_produces_pretty_text() {
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Sphere, MaterialDescriptor::default()));
        let options = ExportOptions {
            binary: false,
            ..Default::default()
        };

        let buffer = serialize(&graph, &options).unwrap();
        let ExportBuffer::Text(text) = &buffer else {
            panic!("expected textual export");
        };
        assert!(text.starts_with("{\n  \""));
        assert!(text.contains("data:application/octet-stream;base64,"));
        assert_eq!(buffer.default_file_name(), "scene.gltf");
        assert_eq!(parse(&buffer).meshes().count(), 1);
    }

    #[test]
    fn linked_map_forces_text() {
        let mut graph = SceneGraph::new();
        graph.add(node(
            GeometryKind::Box,
            MaterialDescriptor::default()
                .with_map(TextureRef::Linked("https://example.com/wood.png".to_string())),
        ));

        let buffer = serialize(&graph, &ExportOptions::default()).unwrap();
        let ExportBuffer::Text(text) = &buffer else {
            panic!("expected textual export");
        };
        assert!(text.contains("https://example.com/wood.png"));
    }

    #[test]
    fn hidden_linked_map_does_not_force_text() {
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Box, MaterialDescriptor::default()));
        graph.add(
            node(
                GeometryKind::Box,
                MaterialDescriptor::default().with_map(TextureRef::Linked("a.png".to_string())),
            )
            .with_visible(false),
        );

        let buffer = serialize(&graph, &ExportOptions::default()).unwrap();
        assert_eq!(buffer.kind(), ExportKind::Glb);
        assert_eq!(parse(&buffer).nodes().count(), 1);
    }

    #[test]
    fn invisible_subtrees_are_skipped() {
        let mut graph = SceneGraph::new();
        let root = graph.add(node(GeometryKind::Box, MaterialDescriptor::default()));
        let hidden = graph
            .add_child(
                root,
                node(GeometryKind::Cone, MaterialDescriptor::default()).with_visible(false),
            )
            .unwrap();
        graph
            .add_child(hidden, node(GeometryKind::Sphere, MaterialDescriptor::default()))
            .unwrap();

        let gltf = parse(&serialize(&graph, &ExportOptions::default()).unwrap());
        assert_eq!(gltf.nodes().count(), 1);

        let everything = ExportOptions {
            only_visible: false,
            ..Default::default()
        };
        let gltf = parse(&serialize(&graph, &everything).unwrap());
        assert_eq!(gltf.nodes().count(), 3);
    }

    #[test]
    fn shared_descriptors_are_written_once() {
        let mut graph = SceneGraph::new();
        let first = node(GeometryKind::Box, MaterialDescriptor::default());
        let mut second = node(GeometryKind::Box, MaterialDescriptor::default());
        second.geometry = first.geometry.clone();
        second.material = first.material.clone();
        let mut third = node(GeometryKind::Box, MaterialDescriptor::default());
        third.geometry = first.geometry.clone();
        graph.add(first);
        graph.add(second);
        graph.add(third);

        let gltf = parse(&serialize(&graph, &ExportOptions::default()).unwrap());
        assert_eq!(gltf.nodes().count(), 3);
        assert_eq!(gltf.materials().count(), 2);
        assert_eq!(gltf.meshes().count(), 2);
        assert_eq!(gltf.accessors().count(), 4);
    }

    #[test]
    fn material_mapping() {
        let mut material = MaterialDescriptor::new(MaterialKind::Phong)
            .with_color(Color::from_hex("#ff0000").unwrap());
        material.transparent = true;
        material.opacity = 0.5;
        material.side = Side::Double;
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Box, material));

        let gltf = parse(&serialize(&graph, &ExportOptions::default()).unwrap());
        let exported = gltf.materials().next().unwrap();
        assert_eq!(exported.alpha_mode(), gltf::material::AlphaMode::Blend);
        assert!(exported.double_sided());
        let pbr = exported.pbr_metallic_roughness();
        assert_eq!(pbr.base_color_factor(), [1.0, 0.0, 0.0, 0.5]);
        assert_eq!(pbr.metallic_factor(), 0.5);

        let extras: MaterialExtras =
            serde_json::from_str(exported.extras().as_ref().unwrap().get()).unwrap();
        assert_eq!(extras.kind, MaterialKind::Phong);
        assert_eq!(extras.color, "#ff0000");
    }

    #[test]
    fn alpha_threshold_maps_to_mask() {
        let mut material = MaterialDescriptor::default();
        material.alpha_threshold = true;
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Box, material));

        let gltf = parse(&serialize(&graph, &ExportOptions::default()).unwrap());
        let exported = gltf.materials().next().unwrap();
        assert_eq!(exported.alpha_mode(), gltf::material::AlphaMode::Mask);
        assert_eq!(exported.alpha_cutoff(), Some(0.5));
    }

    #[test]
    fn transforms_are_matrices_unless_trs() {
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Box, MaterialDescriptor::default()));
        graph.add(
            node(GeometryKind::Box, MaterialDescriptor::default())
                .with_transform(Transform::from_position([1.0, 2.0, 3.0])),
        );

        let options = ExportOptions {
            binary: false,
            ..Default::default()
        };
        let ExportBuffer::Text(text) = serialize(&graph, &options).unwrap() else {
            panic!("expected textual export");
        };
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        let nodes = doc["nodes"].as_array().unwrap();
        assert!(nodes[0].get("matrix").is_none());
        let matrix = nodes[1]["matrix"].as_array().unwrap();
        assert_eq!(matrix.len(), 16);
        assert_eq!(matrix[12].as_f64(), Some(1.0));
        assert_eq!(matrix[14].as_f64(), Some(3.0));

        let trs = ExportOptions {
            binary: false,
            trs: true,
            ..Default::default()
        };
        let ExportBuffer::Text(text) = serialize(&graph, &trs).unwrap() else {
            panic!("expected textual export");
        };
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(doc["nodes"][1]["translation"][1].as_f64(), Some(2.0));
        assert!(doc["nodes"][1].get("matrix").is_none());
    }

    #[test]
    fn embedded_texture_goes_into_buffer() {
        let texture = Arc::new(TextureImage {
            name: Some("checker".to_string()),
            width: 2,
            height: 2,
            rgba: vec![
                255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 255,
            ],
        });
        let mut graph = SceneGraph::new();
        graph.add(node(
            GeometryKind::Box,
            MaterialDescriptor::default().with_map(TextureRef::Embedded(texture.clone())),
        ));
        graph.add(node(
            GeometryKind::Sphere,
            MaterialDescriptor::new(MaterialKind::Basic)
                .with_map(TextureRef::Embedded(texture)),
        ));

        let buffer = serialize(&graph, &ExportOptions::default()).unwrap();
        assert_eq!(buffer.kind(), ExportKind::Glb);
        let gltf = parse(&buffer);
        assert_eq!(gltf.images().count(), 1);
        assert_eq!(gltf.textures().count(), 1);
        let image = gltf.images().next().unwrap();
        assert!(matches!(
            image.source(),
            gltf::image::Source::View { mime_type: "image/png", .. }
        ));
    }

    #[test]
    fn repeated_export_is_byte_identical() {
        let mut graph = SceneGraph::new();
        let root = graph.add(node(GeometryKind::Cone, MaterialDescriptor::default()));
        let toon = MaterialDescriptor::new(MaterialKind::Toon);
        graph
            .add_child(root, node(GeometryKind::Sphere, toon))
            .unwrap();

        let first = serialize(&graph, &ExportOptions::default()).unwrap();
        let second = serialize(&graph, &ExportOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);
    }

    #[test]
    fn subtree_export() {
        let mut graph = SceneGraph::new();
        graph.add(node(GeometryKind::Box, MaterialDescriptor::default()));
        let root = graph.add(node(GeometryKind::Cone, MaterialDescriptor::default()));
        graph
            .add_child(root, node(GeometryKind::Sphere, MaterialDescriptor::default()))
            .unwrap();

        let gltf = parse(&serialize_subtree(&graph, root, &ExportOptions::default()).unwrap());
        assert_eq!(gltf.nodes().count(), 2);
        assert_eq!(gltf.default_scene().unwrap().nodes().count(), 1);

        assert!(matches!(
            serialize_subtree(&graph, NodeId::new(), &ExportOptions::default()),
            Err(ExportError::UnknownRoot(_))
        ));
    }

    #[test]
    fn empty_scene_exports() {
        let buffer = serialize(&SceneGraph::new(), &ExportOptions::default()).unwrap();
        let gltf = parse(&buffer);
        assert_eq!(gltf.nodes().count(), 0);
        assert!(gltf.blob.is_none());
    }
}
