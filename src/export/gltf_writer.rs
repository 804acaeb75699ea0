//! glTF 2.0 document builder.
//!
//! Walks scene nodes depth first and appends their geometry to a single binary
//! buffer. Materials, meshes, textures and geometry accessors are shared by
//! descriptor identity (`Arc` pointer), so a descriptor referenced by several
//! nodes is written once. Indices are handed out in walk order, which keeps the
//! output stable for an unchanged graph.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use gltf::json;
use json::validation::Checked::{self, Valid};
use json::validation::USize64;

use super::{ExportError, ExportOptions, Result};
use crate::scene::{
    Color, GeometryDescriptor, GeometryKind, MaterialDescriptor, MaterialKind, MeshData, NodeId,
    SceneGraph, SceneNode, Side, TextureImage, TextureRef,
};

const GENERATOR: &str = concat!("scene-inspector ", env!("CARGO_PKG_VERSION"));

/// Editor-only material state carried in `material.extras`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialExtras {
    #[serde(rename = "type")]
    pub kind: MaterialKind,
    pub color: String,
    pub wireframe: bool,
    pub transparent: bool,
    pub opacity: f32,
    pub depth_test: bool,
    pub depth_write: bool,
    pub alpha_hash: bool,
    pub side: u8,
    pub flat_shading: bool,
    pub vertex_colors: bool,
}

impl MaterialExtras {
    pub fn from_material(material: &MaterialDescriptor) -> Self {
        Self {
            kind: material.kind,
            color: material.color.to_hex(),
            wireframe: material.wireframe,
            transparent: material.transparent,
            opacity: material.opacity,
            depth_test: material.depth_test,
            depth_write: material.depth_write,
            alpha_hash: material.alpha_threshold,
            side: material.side.index(),
            flat_shading: material.flat_shading,
            vertex_colors: material.vertex_colors,
        }
    }

    /// Rebuilds the descriptor. The texture map is not part of the extras.
    pub fn to_material(&self) -> Option<MaterialDescriptor> {
        Some(MaterialDescriptor {
            kind: self.kind,
            color: Color::from_hex(&self.color)?,
            wireframe: self.wireframe,
            transparent: self.transparent,
            opacity: self.opacity,
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            alpha_threshold: self.alpha_hash,
            side: Side::from_index(i64::from(self.side))?,
            flat_shading: self.flat_shading,
            vertex_colors: self.vertex_colors,
            map: None,
        })
    }
}

/// Editor-only node state carried in `node.extras`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeExtras {
    pub geometry: GeometryKind,
    #[serde(default = "visible_default")]
    pub visible: bool,
}

fn visible_default() -> bool {
    true
}

#[derive(Clone)]
struct PrimitiveAccessors {
    attributes: BTreeMap<Checked<json::mesh::Semantic>, json::Index<json::Accessor>>,
    indices: Option<json::Index<json::Accessor>>,
}

type MeshKey = (*const GeometryDescriptor, *const MaterialDescriptor);

pub(crate) struct GltfWriter<'a> {
    graph: &'a SceneGraph,
    options: &'a ExportOptions,
    textual: bool,
    root: json::Root,
    bin: Vec<u8>,
    accessors: HashMap<*const GeometryDescriptor, PrimitiveAccessors>,
    materials: HashMap<*const MaterialDescriptor, json::Index<json::Material>>,
    meshes: HashMap<MeshKey, json::Index<json::Mesh>>,
    textures: HashMap<*const TextureImage, json::Index<json::Texture>>,
    sampler: Option<json::Index<json::texture::Sampler>>,
    visited: HashSet<NodeId>,
}

impl<'a> GltfWriter<'a> {
    /// `textual` selects where images go: data URIs for the text variant,
    /// buffer views for the binary one.
    pub(crate) fn new(graph: &'a SceneGraph, options: &'a ExportOptions, textual: bool) -> Self {
        let mut root = json::Root::default();
        root.asset = json::Asset {
            version: "2.0".to_string(),
            generator: Some(GENERATOR.to_string()),
            ..Default::default()
        };
        Self {
            graph,
            options,
            textual,
            root,
            bin: Vec::new(),
            accessors: HashMap::new(),
            materials: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            sampler: None,
            visited: HashSet::new(),
        }
    }

    pub(crate) fn add_node(&mut self, node: &SceneNode) -> Result<json::Index<json::Node>> {
        if !self.visited.insert(node.id) {
            return Err(ExportError::RepeatedNode(node.id));
        }
        let graph = self.graph;
        let only_visible = self.options.only_visible;
        let children = graph
            .children(node.id)
            .filter(|child| child.visible || !only_visible)
            .map(|child| self.add_node(child))
            .collect::<Result<Vec<_>>>()?;

        let mesh = self.mesh_for(node)?;
        let extras = serde_json::value::to_raw_value(&NodeExtras {
            geometry: node.geometry.kind(),
            visible: node.visible,
        })?;

        let (matrix, translation, rotation, scale) = if self.options.trs {
            let t = &node.transform;
            (
                None,
                Some(t.position),
                Some(json::scene::UnitQuaternion(t.rotation().to_array())),
                Some(t.scale),
            )
        } else if node.transform.is_identity() {
            (None, None, None, None)
        } else {
            (
                Some(node.transform.matrix().to_cols_array()),
                None,
                None,
                None,
            )
        };

        Ok(self.root.push(json::Node {
            mesh: Some(mesh),
            name: node.name.clone(),
            children: if children.is_empty() {
                None
            } else {
                Some(children)
            },
            matrix,
            translation,
            rotation,
            scale,
            extras: Some(extras),
            ..Default::default()
        }))
    }

    /// Closes the buffer and the default scene. Returns the document and the
    /// binary chunk (empty when no geometry was written).
    pub(crate) fn finish(
        mut self,
        scene_nodes: Vec<json::Index<json::Node>>,
    ) -> (json::Root, Vec<u8>) {
        pad_to_4(&mut self.bin);

        if !self.bin.is_empty() {
            let uri = self.textual.then(|| {
                format!(
                    "data:application/octet-stream;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(&self.bin)
                )
            });
            self.root.push(json::Buffer {
                byte_length: USize64::from(self.bin.len()),
                uri,
                name: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
        }

        let scene = self.root.push(json::Scene {
            nodes: scene_nodes,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.root.scene = Some(scene);

        (self.root, self.bin)
    }

    fn mesh_for(&mut self, node: &SceneNode) -> Result<json::Index<json::Mesh>> {
        let key = (Arc::as_ptr(&node.geometry), Arc::as_ptr(&node.material));
        if let Some(mesh) = self.meshes.get(&key) {
            return Ok(*mesh);
        }

        let accessors = self.accessors_for(&node.geometry);
        let material = self.material_for(&node.material)?;
        let mesh = self.root.push(json::Mesh {
            primitives: vec![json::mesh::Primitive {
                attributes: accessors.attributes,
                indices: accessors.indices,
                material: Some(material),
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
                extensions: Default::default(),
                extras: Default::default(),
            }],
            weights: None,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.meshes.insert(key, mesh);
        Ok(mesh)
    }

    fn accessors_for(&mut self, geometry: &Arc<GeometryDescriptor>) -> PrimitiveAccessors {
        let key = Arc::as_ptr(geometry);
        if let Some(cached) = self.accessors.get(&key) {
            return cached.clone();
        }

        let mut mesh = geometry.mesh();
        if self.options.truncate_draw_range {
            mesh = mesh.compacted();
        }
        let accessors = self.write_mesh(&mesh);
        self.accessors.insert(key, accessors.clone());
        accessors
    }

    fn write_mesh(&mut self, mesh: &MeshData) -> PrimitiveAccessors {
        let mut attributes = BTreeMap::new();
        let mut indices = None;

        if !mesh.positions.is_empty() {
            let bytes = f32_bytes(mesh.positions.iter().flatten());
            let bounds = mesh.bounds();
            let accessor = self.push_accessor(
                &bytes,
                mesh.positions.len(),
                json::accessor::ComponentType::F32,
                json::accessor::Type::Vec3,
                json::buffer::Target::ArrayBuffer,
                bounds,
            );
            attributes.insert(Valid(json::mesh::Semantic::Positions), accessor);
        }

        if !mesh.normals.is_empty() {
            let bytes = f32_bytes(mesh.normals.iter().flatten());
            let accessor = self.push_accessor(
                &bytes,
                mesh.normals.len(),
                json::accessor::ComponentType::F32,
                json::accessor::Type::Vec3,
                json::buffer::Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::Normals), accessor);
        }

        if !mesh.uvs.is_empty() {
            let bytes = f32_bytes(mesh.uvs.iter().flatten());
            let accessor = self.push_accessor(
                &bytes,
                mesh.uvs.len(),
                json::accessor::ComponentType::F32,
                json::accessor::Type::Vec2,
                json::buffer::Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), accessor);
        }

        if !mesh.indices.is_empty() {
            let bytes: Vec<u8> = mesh.indices.iter().flat_map(|i| i.to_le_bytes()).collect();
            indices = Some(self.push_accessor(
                &bytes,
                mesh.indices.len(),
                json::accessor::ComponentType::U32,
                json::accessor::Type::Scalar,
                json::buffer::Target::ElementArrayBuffer,
                None,
            ));
        }

        PrimitiveAccessors {
            attributes,
            indices,
        }
    }

    fn push_view(
        &mut self,
        bytes: &[u8],
        target: Option<json::buffer::Target>,
    ) -> json::Index<json::buffer::View> {
        let byte_offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        pad_to_4(&mut self.bin);

        self.root.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64::from(bytes.len()),
            byte_offset: Some(USize64::from(byte_offset)),
            byte_stride: None,
            target: target.map(Valid),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn push_accessor(
        &mut self,
        bytes: &[u8],
        count: usize,
        component: json::accessor::ComponentType,
        type_: json::accessor::Type,
        target: json::buffer::Target,
        bounds: Option<([f32; 3], [f32; 3])>,
    ) -> json::Index<json::Accessor> {
        let view = self.push_view(bytes, Some(target));
        let (min, max) = match bounds {
            Some((min, max)) => (
                Some(json::Value::from(min.to_vec())),
                Some(json::Value::from(max.to_vec())),
            ),
            None => (None, None),
        };

        self.root.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(count),
            component_type: Valid(json::accessor::GenericComponentType(component)),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    fn material_for(
        &mut self,
        material: &Arc<MaterialDescriptor>,
    ) -> Result<json::Index<json::Material>> {
        let key = Arc::as_ptr(material);
        if let Some(index) = self.materials.get(&key) {
            return Ok(*index);
        }

        let base_color_texture = match &material.map {
            Some(TextureRef::Embedded(image)) => self.embedded_texture(image)?,
            Some(TextureRef::Linked(uri)) => Some(self.linked_texture(uri)),
            None => None,
        }
        .map(|index| json::texture::Info {
            index,
            tex_coord: 0,
            extensions: None,
            extras: Default::default(),
        });

        let [r, g, b] = material.color.to_linear();
        let (metallic, roughness) = material.kind.metallic_roughness();
        let (alpha_mode, alpha_cutoff) = if material.transparent {
            (json::material::AlphaMode::Blend, None)
        } else if material.alpha_threshold {
            (
                json::material::AlphaMode::Mask,
                Some(json::material::AlphaCutoff(0.5)),
            )
        } else {
            (json::material::AlphaMode::Opaque, None)
        };
        if material.side == Side::Back {
            log::warn!("glTF has no back-face-only mode; exporting material as front-facing");
        }

        let extras = serde_json::value::to_raw_value(&MaterialExtras::from_material(material))?;
        let index = self.root.push(json::Material {
            alpha_cutoff,
            alpha_mode: Valid(alpha_mode),
            double_sided: material.side == Side::Double,
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor([
                    r,
                    g,
                    b,
                    material.effective_alpha(),
                ]),
                base_color_texture,
                metallic_factor: json::material::StrengthFactor(metallic),
                roughness_factor: json::material::StrengthFactor(roughness),
                ..Default::default()
            },
            extras: Some(extras),
            ..Default::default()
        });
        self.materials.insert(key, index);
        Ok(index)
    }

    fn embedded_texture(
        &mut self,
        image: &Arc<TextureImage>,
    ) -> Result<Option<json::Index<json::Texture>>> {
        if !self.options.embed_images {
            log::warn!(
                "Skipping texture {}: image embedding is disabled",
                image.name.as_deref().unwrap_or("<unnamed>")
            );
            return Ok(None);
        }
        let key = Arc::as_ptr(image);
        if let Some(texture) = self.textures.get(&key) {
            return Ok(Some(*texture));
        }

        let png = encode_png(image, self.options.max_texture_size)?;
        let gltf_image = if self.textual {
            json::Image {
                buffer_view: None,
                mime_type: Some(json::image::MimeType("image/png".to_string())),
                uri: Some(format!(
                    "data:image/png;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(&png)
                )),
                name: image.name.clone(),
                extensions: Default::default(),
                extras: Default::default(),
            }
        } else {
            let view = self.push_view(&png, None);
            json::Image {
                buffer_view: Some(view),
                mime_type: Some(json::image::MimeType("image/png".to_string())),
                uri: None,
                name: image.name.clone(),
                extensions: Default::default(),
                extras: Default::default(),
            }
        };
        let source = self.root.push(gltf_image);
        let texture = self.push_texture(source);
        self.textures.insert(key, texture);
        Ok(Some(texture))
    }

    fn linked_texture(&mut self, uri: &str) -> json::Index<json::Texture> {
        let source = self.root.push(json::Image {
            buffer_view: None,
            mime_type: None,
            uri: Some(uri.to_string()),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.push_texture(source)
    }

    fn push_texture(&mut self, source: json::Index<json::Image>) -> json::Index<json::Texture> {
        let sampler = match self.sampler {
            Some(sampler) => sampler,
            None => {
                let sampler = self.root.push(json::texture::Sampler {
                    mag_filter: Some(Valid(json::texture::MagFilter::Linear)),
                    min_filter: Some(Valid(json::texture::MinFilter::LinearMipmapLinear)),
                    wrap_s: Valid(json::texture::WrappingMode::Repeat),
                    wrap_t: Valid(json::texture::WrappingMode::Repeat),
                    name: None,
                    extensions: Default::default(),
                    extras: Default::default(),
                });
                self.sampler = Some(sampler);
                sampler
            }
        };

        self.root.push(json::Texture {
            source,
            sampler: Some(sampler),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }
}

/// Encodes the texture as PNG, shrinking it to fit `max_size` on its longer
/// edge.
fn encode_png(texture: &TextureImage, max_size: u32) -> Result<Vec<u8>> {
    let expected = texture.width as usize * texture.height as usize * 4;
    let mut pixels = image::RgbaImage::from_raw(texture.width, texture.height, texture.rgba.clone())
        .ok_or_else(|| ExportError::TextureSize {
            name: texture.name.clone().unwrap_or_default(),
            expected,
            actual: texture.rgba.len(),
        })?;

    let longest = texture.width.max(texture.height);
    if max_size > 0 && longest > max_size {
        let scale = max_size as f64 / longest as f64;
        let width = ((texture.width as f64 * scale).round() as u32).max(1);
        let height = ((texture.height as f64 * scale).round() as u32).max(1);
        log::warn!(
            "Downscaling texture {} from {}x{} to {}x{}",
            texture.name.as_deref().unwrap_or("<unnamed>"),
            texture.width,
            texture.height,
            width,
            height
        );
        pixels = image::imageops::resize(
            &pixels,
            width,
            height,
            image::imageops::FilterType::Triangle,
        );
    }

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(png)
}

fn f32_bytes<'v>(values: impl Iterator<Item = &'v f32>) -> Vec<u8> {
    values.flat_map(|v| v.to_le_bytes()).collect()
}

fn pad_to_4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}
