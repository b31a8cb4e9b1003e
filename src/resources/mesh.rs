//! Mesh geometry channels and procedural generators

use glam::{Vec2, Vec3, Vec4};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a mesh, used to key cached GPU storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) u64);

impl MeshId {
    fn next() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-vertex colors with 1 to 4 channels
#[derive(Debug, Clone, PartialEq)]
pub enum Colors {
    R(Vec<f32>),
    Rg(Vec<Vec2>),
    Rgb(Vec<Vec3>),
    Rgba(Vec<Vec4>),
}

impl Colors {
    pub fn channels(&self) -> usize {
        match self {
            Colors::R(_) => 1,
            Colors::Rg(_) => 2,
            Colors::Rgb(_) => 3,
            Colors::Rgba(_) => 4,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Colors::R(c) => c.len(),
            Colors::Rg(c) => c.len(),
            Colors::Rgb(c) => c.len(),
            Colors::Rgba(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Color of vertex `i` widened to RGBA, missing channels left at 0.
    #[inline]
    pub fn rgba(&self, i: usize) -> Vec4 {
        match self {
            Colors::R(c) => Vec4::new(c[i], 0.0, 0.0, 0.0),
            Colors::Rg(c) => c[i].extend(0.0).extend(0.0),
            Colors::Rgb(c) => c[i].extend(0.0),
            Colors::Rgba(c) => c[i],
        }
    }
}

/// Geometry channels of a mesh.
///
/// 2D meshes store their positions with `z = 0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub colors: Option<Colors>,
    pub tex_coords: Option<Vec<Vec2>>,
    pub indices: Vec<u32>,
}

/// A mesh with a stable identity and a generation counter.
///
/// The generation is bumped on every [`edit`](Mesh::edit), which is how the
/// render pass notices that cached GPU storage for this mesh went stale.
/// Cloning a mesh yields a new identity.
#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    generation: u64,
    pub name: String,
    data: MeshData,
}

impl Mesh {
    pub fn new(name: &str, data: MeshData) -> Self {
        Self {
            id: MeshId::next(),
            generation: 0,
            name: name.to_string(),
            data,
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn data(&self) -> &MeshData {
        &self.data
    }

    /// Mutable access to the geometry. Bumps the generation.
    pub fn edit(&mut self) -> &mut MeshData {
        self.generation += 1;
        &mut self.data
    }

    pub fn vertex_count(&self) -> usize {
        self.data.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.data.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.data.indices.len() / 3
    }

    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Self {
        self.data.normals = Some(normals);
        self
    }

    pub fn with_colors(mut self, colors: Colors) -> Self {
        self.data.colors = Some(colors);
        self
    }

    pub fn with_tex_coords(mut self, tex_coords: Vec<Vec2>) -> Self {
        self.data.tex_coords = Some(tex_coords);
        self
    }

    /// Unit quad on the XY plane, centered at origin, facing +Z
    pub fn quad() -> Self {
        let data = MeshData {
            positions: vec![
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0),
                Vec3::new(0.5, 0.5, 0.0),
                Vec3::new(-0.5, 0.5, 0.0),
            ],
            normals: Some(vec![Vec3::Z; 4]),
            colors: Some(Colors::Rgba(vec![Vec4::ONE; 4])),
            tex_coords: Some(vec![
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 0.0),
            ]),
            indices: vec![0, 1, 2, 0, 2, 3],
        };
        Mesh::new("quad", data)
    }

    /// Unit cube centered at origin
    pub fn cube() -> Self {
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];

        let mut data = MeshData {
            normals: Some(Vec::with_capacity(24)),
            colors: Some(Colors::Rgba(vec![Vec4::ONE; 24])),
            tex_coords: Some(Vec::with_capacity(24)),
            ..Default::default()
        };

        for (face, (normal, right, up)) in faces.into_iter().enumerate() {
            let center = normal * 0.5;
            let corners = [
                (center - right * 0.5 - up * 0.5, Vec2::new(0.0, 1.0)),
                (center + right * 0.5 - up * 0.5, Vec2::new(1.0, 1.0)),
                (center + right * 0.5 + up * 0.5, Vec2::new(1.0, 0.0)),
                (center - right * 0.5 + up * 0.5, Vec2::new(0.0, 0.0)),
            ];
            for (position, uv) in corners {
                data.positions.push(position);
                if let Some(normals) = data.normals.as_mut() {
                    normals.push(normal);
                }
                if let Some(uvs) = data.tex_coords.as_mut() {
                    uvs.push(uv);
                }
            }

            let base = face as u32 * 4;
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Mesh::new("cube", data)
    }

    /// Plane on the XZ axis with `(subdivisions + 1)^2` vertices
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let side = subdivisions as usize + 1;
        let vertex_count = side * side;
        let mut positions = Vec::with_capacity(vertex_count);
        let mut tex_coords = Vec::with_capacity(vertex_count);

        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions.max(1) as f32;
        let step_z = depth / subdivisions.max(1) as f32;

        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                positions.push(Vec3::new(
                    -half_width + x as f32 * step_x,
                    0.0,
                    -half_depth + z as f32 * step_z,
                ));
                tex_coords.push(Vec2::new(
                    x as f32 / subdivisions.max(1) as f32,
                    z as f32 / subdivisions.max(1) as f32,
                ));
            }
        }

        let mut indices = Vec::with_capacity(subdivisions as usize * subdivisions as usize * 6);
        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        let data = MeshData {
            positions,
            normals: Some(vec![Vec3::Y; vertex_count]),
            colors: Some(Colors::Rgba(vec![Vec4::ONE; vertex_count])),
            tex_coords: Some(tex_coords),
            indices,
        };
        Mesh::new("plane", data)
    }
}

impl Clone for Mesh {
    fn clone(&self) -> Self {
        Self {
            id: MeshId::next(),
            generation: 0,
            name: self.name.clone(),
            data: self.data.clone(),
        }
    }
}
