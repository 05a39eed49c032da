//! Chunk mesh data and meshers.
//!
//! Meshes are built in face-local chunk space (s, t, r axes in meters) and
//! projected onto the sphere afterwards; see [`project`].

mod greedy;
mod naive;
mod project;

pub use greedy::{mesh_chunk_greedy, mesh_chunk_greedy_neighbors, ChunkNeighbors};
pub use naive::mesh_chunk_naive;
pub use project::project_chunk_mesh;

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Pool vertex: position, flat normal, material id.
/// Must stay 28 bytes; the vertex pool is addressed in these units.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub material: u16,
    pub _pad: u16,
}

const_assert_eq!(std::mem::size_of::<Vertex>(), 28);

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], material: u16) -> Self {
        Self {
            position,
            normal,
            material,
            _pad: 0,
        }
    }
}

/// CPU-side triangle mesh for one chunk
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append a quad (two triangles) spanning `w` by `h` from `origin`
    pub(crate) fn add_quad(
        &mut self,
        origin: [f32; 3],
        udir: [f32; 3],
        vdir: [f32; 3],
        normal: [f32; 3],
        w: f32,
        h: f32,
        material: u16,
        flip: bool,
    ) {
        let base = self.vertices.len() as u32;
        let p0 = origin;
        let p1 = [
            origin[0] + udir[0] * w,
            origin[1] + udir[1] * w,
            origin[2] + udir[2] * w,
        ];
        let p2 = [
            p1[0] + vdir[0] * h,
            p1[1] + vdir[1] * h,
            p1[2] + vdir[2] * h,
        ];
        let p3 = [
            origin[0] + vdir[0] * h,
            origin[1] + vdir[1] * h,
            origin[2] + vdir[2] * h,
        ];
        self.vertices.push(Vertex::new(p0, normal, material));
        self.vertices.push(Vertex::new(p1, normal, material));
        self.vertices.push(Vertex::new(p2, normal, material));
        self.vertices.push(Vertex::new(p3, normal, material));
        if flip {
            self.indices
                .extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        } else {
            self.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }
}
