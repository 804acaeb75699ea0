//! Node mutation engine.
//!
//! `apply_property_change` never writes through a descriptor `Arc`: it clones
//! the current value, changes one field and returns a node holding a brand new
//! `Arc`. Anything still holding the old descriptor keeps seeing the old value.

use std::sync::Arc;

use crate::scene::{
    Color, GeometryKind, MaterialDescriptor, MaterialKind, SceneNode, Side, TextureRef,
};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("invalid intent: {0}")]
    InvalidIntent(String),
}

pub type Result<T> = std::result::Result<T, EditError>;

/// A single requested change to the selected node.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyIntent {
    Color(Color),
    MaterialKind(MaterialKind),
    ToggleWireframe,
    ToggleTransparent,
    SetOpacity(f32),
    ToggleDepthTest,
    ToggleDepthWrite,
    ToggleAlphaThreshold,
    SetSide(Side),
    ToggleFlatShading,
    ToggleVertexColors,
    SetMap(Option<TextureRef>),
    Geometry(GeometryKind),
    /// Uniform scale on all three axes.
    Size(f32),
}

impl PropertyIntent {
    /// Parses an editor `(property, value)` pair. Toggle properties ignore the
    /// value.
    pub fn parse(property: &str, value: &str) -> Result<Self> {
        let value = value.trim();
        let intent = match property {
            "color" => PropertyIntent::Color(
                Color::from_hex(value)
                    .ok_or_else(|| invalid(format!("color '{value}' is not #rrggbb")))?,
            ),
            "material" => PropertyIntent::MaterialKind(
                MaterialKind::from_type_name(value)
                    .ok_or_else(|| invalid(format!("unknown material type '{value}'")))?,
            ),
            "geometry" => PropertyIntent::Geometry(
                GeometryKind::from_type_name(value)
                    .ok_or_else(|| invalid(format!("unknown geometry type '{value}'")))?,
            ),
            "wireframe" => PropertyIntent::ToggleWireframe,
            "transparent" => PropertyIntent::ToggleTransparent,
            "depthTest" => PropertyIntent::ToggleDepthTest,
            "depthWrite" => PropertyIntent::ToggleDepthWrite,
            "alphaHash" => PropertyIntent::ToggleAlphaThreshold,
            "flatShading" => PropertyIntent::ToggleFlatShading,
            "vertexColors" => PropertyIntent::ToggleVertexColors,
            "opacity" => PropertyIntent::SetOpacity(parse_number(property, value)?),
            "size" => PropertyIntent::Size(parse_number(property, value)?),
            "side" => {
                let index: i64 = value
                    .parse()
                    .map_err(|_| invalid(format!("side '{value}' is not an index")))?;
                PropertyIntent::SetSide(
                    Side::from_index(index)
                        .ok_or_else(|| invalid(format!("side index {index} out of range")))?,
                )
            }
            other => return Err(invalid(format!("unknown property '{other}'"))),
        };
        Ok(intent)
    }

    /// Like [`PropertyIntent::parse`], but an unknown material or geometry type
    /// falls back to `MeshBasicMaterial` / `BoxGeometry`.
    pub fn parse_or_default(property: &str, value: &str) -> Result<Self> {
        match Self::parse(property, value) {
            Err(err) if property == "material" => {
                log::warn!("{err}; falling back to {}", MaterialKind::Basic);
                Ok(PropertyIntent::MaterialKind(MaterialKind::Basic))
            }
            Err(err) if property == "geometry" => {
                log::warn!("{err}; falling back to {}", GeometryKind::Box);
                Ok(PropertyIntent::Geometry(GeometryKind::Box))
            }
            other => other,
        }
    }
}

fn invalid(message: String) -> EditError {
    EditError::InvalidIntent(message)
}

fn parse_number(property: &str, value: &str) -> Result<f32> {
    let number: f32 = value
        .parse()
        .map_err(|_| invalid(format!("{property} '{value}' is not a number")))?;
    finite(property, number)
}

fn finite(property: &str, value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(format!("{property} must be finite, got {value}")))
    }
}

/// Applies one intent and returns the updated node. The input node and its
/// descriptors are left untouched.
pub fn apply_property_change(node: &SceneNode, intent: &PropertyIntent) -> Result<SceneNode> {
    let mut updated = node.clone();

    match intent {
        PropertyIntent::Geometry(kind) => {
            updated.geometry = Arc::new(kind.descriptor());
        }
        PropertyIntent::Size(size) => {
            let size = finite("size", *size)?;
            updated.transform.scale = [size; 3];
        }
        PropertyIntent::MaterialKind(kind) => {
            updated.material = Arc::new(MaterialDescriptor::switched(*kind, node.material.color));
        }
        other => {
            let material = edited_material(&node.material, other)?;
            updated.material = Arc::new(material);
        }
    }

    log::debug!("Applied {:?} to node {}", intent, node.id);
    Ok(updated)
}

fn edited_material(
    current: &MaterialDescriptor,
    intent: &PropertyIntent,
) -> Result<MaterialDescriptor> {
    let mut next = current.clone();
    match intent {
        PropertyIntent::Color(color) => next.color = *color,
        PropertyIntent::ToggleWireframe => next.wireframe = !next.wireframe,
        PropertyIntent::ToggleTransparent => next.transparent = !next.transparent,
        PropertyIntent::SetOpacity(opacity) => next.opacity = finite("opacity", *opacity)?,
        PropertyIntent::ToggleDepthTest => next.depth_test = !next.depth_test,
        PropertyIntent::ToggleDepthWrite => next.depth_write = !next.depth_write,
        PropertyIntent::ToggleAlphaThreshold => next.alpha_threshold = !next.alpha_threshold,
        PropertyIntent::SetSide(side) => next.side = *side,
        PropertyIntent::ToggleFlatShading => next.flat_shading = !next.flat_shading,
        PropertyIntent::ToggleVertexColors => next.vertex_colors = !next.vertex_colors,
        PropertyIntent::SetMap(map) => next.map = map.clone(),
        PropertyIntent::MaterialKind(_) | PropertyIntent::Geometry(_) | PropertyIntent::Size(_) => {
            return Err(invalid(format!("{intent:?} is not a material field edit")));
        }
    }
    Ok(next)
}
