//! Renderer collaborator surface.
//!
//! The streaming core never talks to a graphics API directly; it consumes
//! the [`MeshBackend`] capability set (upload, free, record) and hands out
//! opaque pool allocations. [`WgpuMeshBackend`] is the engine's own
//! implementation over two fixed-capacity wgpu buffer pools.

mod pool;
mod wgpu_backend;

pub use pool::{FreeBlock, PoolAllocator};
pub use wgpu_backend::{request_headless_device, WgpuMeshBackend};

use bytemuck::{Pod, Zeroable};

use crate::mesh::Vertex;

/// Where a mesh landed in the pools, in element units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshAllocation {
    pub first_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
    pub vertex_count: u32,
}

/// One chunk's slice of the pools for this frame's draw batch
#[derive(Debug, Clone, Copy)]
pub struct ChunkDrawItem {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

/// Indirect draw record, laid out exactly as the GPU consumes it
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// Build the indirect command records for an ordered draw list
pub fn build_indirect_commands(items: &[ChunkDrawItem]) -> Vec<DrawIndexedIndirect> {
    items
        .iter()
        .map(|item| DrawIndexedIndirect {
            index_count: item.index_count,
            instance_count: 1,
            first_index: item.first_index,
            base_vertex: item.base_vertex,
            first_instance: 0,
        })
        .collect()
}

/// Capability set the world runtime needs from a renderer
pub trait MeshBackend {
    /// Upload a mesh into the pools. `None` means the pools are exhausted;
    /// the caller drops the mesh for this frame.
    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Option<MeshAllocation>;

    /// Return a mesh's pool ranges
    fn free_mesh(&mut self, alloc: &MeshAllocation);

    /// Stage an indirect draw batch for the current frame
    fn record(&mut self, mvp: &[f32; 16], items: &[ChunkDrawItem]);
}
