//! Material descriptors.
//!
//! A `MaterialDescriptor` is a plain value. Nodes hold it behind an `Arc` and
//! edits always build a fresh descriptor, so a descriptor that is still
//! referenced elsewhere never changes underneath its holder.

use std::fmt;
use std::sync::Arc;

/// Shading model of a surface. The serialized names are the type names the
/// property editor uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MaterialKind {
    #[serde(rename = "MeshBasicMaterial")]
    Basic,
    #[serde(rename = "MeshLambertMaterial")]
    Lambert,
    #[serde(rename = "MeshPhongMaterial")]
    Phong,
    #[serde(rename = "MeshStandardMaterial")]
    Standard,
    #[serde(rename = "MeshNormalMaterial")]
    Normal,
    #[serde(rename = "MeshPhysicalMaterial")]
    Physical,
    #[serde(rename = "MeshToonMaterial")]
    Toon,
    #[serde(rename = "MeshMatcapMaterial")]
    Matcap,
}

impl MaterialKind {
    pub const ALL: [MaterialKind; 8] = [
        MaterialKind::Basic,
        MaterialKind::Lambert,
        MaterialKind::Phong,
        MaterialKind::Standard,
        MaterialKind::Normal,
        MaterialKind::Physical,
        MaterialKind::Toon,
        MaterialKind::Matcap,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            MaterialKind::Basic => "MeshBasicMaterial",
            MaterialKind::Lambert => "MeshLambertMaterial",
            MaterialKind::Phong => "MeshPhongMaterial",
            MaterialKind::Standard => "MeshStandardMaterial",
            MaterialKind::Normal => "MeshNormalMaterial",
            MaterialKind::Physical => "MeshPhysicalMaterial",
            MaterialKind::Toon => "MeshToonMaterial",
            MaterialKind::Matcap => "MeshMatcapMaterial",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == name)
    }

    /// Metallic / roughness factors written on export. Only the PBR models carry
    /// real values; the rest get the neutral 0.5 / 0.5 pair.
    pub fn metallic_roughness(self) -> (f32, f32) {
        match self {
            MaterialKind::Standard | MaterialKind::Physical => (0.0, 1.0),
            _ => (0.5, 0.5),
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Which faces are rendered. Indices match the property editor's select values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

impl Side {
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Side::Front),
            1 => Some(Side::Back),
            2 => Some(Side::Double),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Side::Front => 0,
            Side::Back => 1,
            Side::Double => 2,
        }
    }
}

/// RGB color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(value: &str) -> Option<Self> {
        let digits = value.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(&self) -> String {
        let byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", byte(self.r), byte(self.g), byte(self.b))
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.r * factor, self.g * factor, self.b * factor)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Linear-light components, as glTF color factors expect.
    pub fn to_linear(self) -> [f32; 3] {
        fn channel(c: f32) -> f32 {
            if c < 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        }
        [channel(self.r), channel(self.g), channel(self.b)]
    }

    pub fn from_linear([r, g, b]: [f32; 3]) -> Self {
        fn channel(c: f32) -> f32 {
            if c < 0.0031308 {
                c * 12.92
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            }
        }
        Self::new(channel(r), channel(g), channel(b))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Decoded RGBA8 pixels for an embedded texture.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextureImage {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Color map of a material.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TextureRef {
    /// Pixels held in memory; written inline on export.
    Embedded(Arc<TextureImage>),
    /// An image living outside the scene, referenced by URI.
    Linked(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MaterialDescriptor {
    pub kind: MaterialKind,
    pub color: Color,
    pub wireframe: bool,
    pub transparent: bool,
    /// Only visible while `transparent` is set.
    pub opacity: f32,
    pub depth_test: bool,
    pub depth_write: bool,
    pub alpha_threshold: bool,
    pub side: Side,
    pub flat_shading: bool,
    pub vertex_colors: bool,
    #[serde(default)]
    pub map: Option<TextureRef>,
}

impl MaterialDescriptor {
    /// Defaults of the given shading model.
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            kind,
            color: Color::WHITE,
            wireframe: false,
            transparent: false,
            opacity: 1.0,
            depth_test: true,
            depth_write: true,
            alpha_threshold: false,
            side: Side::Front,
            flat_shading: false,
            vertex_colors: false,
            map: None,
        }
    }

    /// Fresh descriptor of `kind` that keeps only `color`.
    pub fn switched(kind: MaterialKind, color: Color) -> Self {
        Self {
            color,
            ..Self::new(kind)
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_map(mut self, map: TextureRef) -> Self {
        self.map = Some(map);
        self
    }

    pub fn is_linked_map(&self) -> bool {
        matches!(self.map, Some(TextureRef::Linked(_)))
    }

    /// Alpha written to the base color factor.
    pub fn effective_alpha(&self) -> f32 {
        if self.transparent {
            self.opacity
        } else {
            1.0
        }
    }
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self::new(MaterialKind::Standard)
    }
}
