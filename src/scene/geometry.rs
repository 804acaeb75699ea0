//! Geometry descriptors and primitive mesh generation.
//!
//! Primitives are generated with outward normals and UVs in `0..=1`, Y up,
//! centered at the origin.

use std::f32::consts::PI;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GeometryKind {
    #[serde(rename = "ConeGeometry")]
    Cone,
    #[serde(rename = "BoxGeometry")]
    Box,
    #[serde(rename = "SphereGeometry")]
    Sphere,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 3] =
        [GeometryKind::Cone, GeometryKind::Box, GeometryKind::Sphere];

    pub fn type_name(self) -> &'static str {
        match self {
            GeometryKind::Cone => "ConeGeometry",
            GeometryKind::Box => "BoxGeometry",
            GeometryKind::Sphere => "SphereGeometry",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_name() == name)
    }

    /// The fixed parameters the editor creates this primitive with.
    pub fn descriptor(self) -> GeometryDescriptor {
        match self {
            GeometryKind::Cone => GeometryDescriptor::Cone {
                radius: 1.0,
                height: 1.0,
                radial_segments: 32,
            },
            GeometryKind::Box => GeometryDescriptor::Box {
                width: 1.0,
                height: 1.0,
                depth: 1.0,
            },
            GeometryKind::Sphere => GeometryDescriptor::Sphere {
                radius: 1.0,
                width_segments: 32,
                height_segments: 32,
            },
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum GeometryDescriptor {
    Cone {
        radius: f32,
        height: f32,
        radial_segments: u32,
    },
    Box {
        width: f32,
        height: f32,
        depth: f32,
    },
    Sphere {
        radius: f32,
        width_segments: u32,
        height_segments: u32,
    },
}

impl GeometryDescriptor {
    pub fn kind(&self) -> GeometryKind {
        match self {
            GeometryDescriptor::Cone { .. } => GeometryKind::Cone,
            GeometryDescriptor::Box { .. } => GeometryKind::Box,
            GeometryDescriptor::Sphere { .. } => GeometryKind::Sphere,
        }
    }

    pub fn mesh(&self) -> MeshData {
        match *self {
            GeometryDescriptor::Cone {
                radius,
                height,
                radial_segments,
            } => generate_cone(radius, height, radial_segments),
            GeometryDescriptor::Box {
                width,
                height,
                depth,
            } => generate_box(width, height, depth),
            GeometryDescriptor::Sphere {
                radius,
                width_segments,
                height_segments,
            } => generate_sphere(radius, width_segments, height_segments),
        }
    }
}

impl Default for GeometryDescriptor {
    fn default() -> Self {
        GeometryKind::Box.descriptor()
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Component-wise bounds of the positions, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(mut min, mut max), p| {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
            (min, max)
        }))
    }

    /// Drops vertices no index refers to and remaps the indices, keeping the
    /// original vertex order.
    pub fn compacted(&self) -> MeshData {
        let mut remap = vec![u32::MAX; self.positions.len()];
        for &index in &self.indices {
            if let Some(slot) = remap.get_mut(index as usize) {
                *slot = 0;
            }
        }

        let mut out = MeshData::default();
        for (old, slot) in remap.iter_mut().enumerate() {
            if *slot == u32::MAX {
                continue;
            }
            *slot = out.positions.len() as u32;
            out.positions.push(self.positions[old]);
            if let Some(normal) = self.normals.get(old) {
                out.normals.push(*normal);
            }
            if let Some(uv) = self.uvs.get(old) {
                out.uvs.push(*uv);
            }
        }
        out.indices = self
            .indices
            .iter()
            .filter_map(|&index| remap.get(index as usize).copied())
            .collect();
        out
    }
}

fn generate_box(width: f32, height: f32, depth: f32) -> MeshData {
    let (hx, hy, hz) = (width * 0.5, height * 0.5, depth * 0.5);
    // (normal, u axis, v axis) per face
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let half = [hx, hy, hz];

    let mut mesh = MeshData::default();
    for (normal, u_axis, v_axis) in faces {
        let base = mesh.positions.len() as u32;
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let su = u * 2.0 - 1.0;
            let sv = v * 2.0 - 1.0;
            let mut position = [0.0f32; 3];
            for axis in 0..3 {
                position[axis] =
                    (normal[axis] + u_axis[axis] * su + v_axis[axis] * sv) * half[axis];
            }
            mesh.positions.push(position);
            mesh.normals.push(normal);
            mesh.uvs.push([u, v]);
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    mesh
}

fn generate_sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let long_segs = width_segments.max(3);
    let lat_segs = height_segments.max(2);
    let mut mesh = MeshData::default();

    for lat in 0..=lat_segs {
        let theta = lat as f32 * PI / lat_segs as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for long in 0..=long_segs {
            let phi = long as f32 * 2.0 * PI / long_segs as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let normal = [-cos_phi * sin_theta, cos_theta, sin_phi * sin_theta];
            mesh.positions
                .push([normal[0] * radius, normal[1] * radius, normal[2] * radius]);
            mesh.normals.push(normal);
            mesh.uvs.push([
                long as f32 / long_segs as f32,
                1.0 - lat as f32 / lat_segs as f32,
            ]);
        }
    }

    let row = long_segs + 1;
    for lat in 0..lat_segs {
        for long in 0..long_segs {
            let a = lat * row + long + 1;
            let b = lat * row + long;
            let c = (lat + 1) * row + long;
            let d = (lat + 1) * row + long + 1;
            // Degenerate triangles at the poles are skipped.
            if lat != 0 {
                mesh.indices.extend_from_slice(&[a, b, d]);
            }
            if lat != lat_segs - 1 {
                mesh.indices.extend_from_slice(&[b, c, d]);
            }
        }
    }
    mesh
}

fn generate_cone(radius: f32, height: f32, radial_segments: u32) -> MeshData {
    let segs = radial_segments.max(3);
    let half_height = height * 0.5;
    let slope = if height != 0.0 { radius / height } else { 0.0 };
    let mut mesh = MeshData::default();

    // Side: one apex vertex per segment (normal at the segment's mid angle)
    // followed by the base ring.
    for i in 0..segs {
        let u = (i as f32 + 0.5) / segs as f32;
        let (sin_t, cos_t) = (u * 2.0 * PI).sin_cos();
        mesh.positions.push([0.0, half_height, 0.0]);
        let n = glam::Vec3::new(sin_t, slope, cos_t).normalize_or_zero();
        mesh.normals.push(n.to_array());
        mesh.uvs.push([u, 1.0]);
    }
    for i in 0..=segs {
        let u = i as f32 / segs as f32;
        let (sin_t, cos_t) = (u * 2.0 * PI).sin_cos();
        mesh.positions.push([radius * sin_t, -half_height, radius * cos_t]);
        let n = glam::Vec3::new(sin_t, slope, cos_t).normalize_or_zero();
        mesh.normals.push(n.to_array());
        mesh.uvs.push([u, 0.0]);
    }
    for i in 0..segs {
        let apex = i;
        let base = segs + i;
        mesh.indices.extend_from_slice(&[apex, base, base + 1]);
    }

    // Bottom cap.
    let center = mesh.positions.len() as u32;
    mesh.positions.push([0.0, -half_height, 0.0]);
    mesh.normals.push([0.0, -1.0, 0.0]);
    mesh.uvs.push([0.5, 0.5]);
    for i in 0..=segs {
        let theta = i as f32 / segs as f32 * 2.0 * PI;
        let (sin_t, cos_t) = theta.sin_cos();
        mesh.positions
            .push([radius * sin_t, -half_height, radius * cos_t]);
        mesh.normals.push([0.0, -1.0, 0.0]);
        mesh.uvs.push([sin_t * 0.5 + 0.5, cos_t * 0.5 + 0.5]);
    }
    for i in 0..segs {
        let current = center + 1 + i;
        mesh.indices.extend_from_slice(&[current + 1, current, center]);
    }
    mesh
}
