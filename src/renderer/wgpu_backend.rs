//! wgpu implementation of the mesh backend.
//!
//! Two fixed-capacity pool buffers are created up front; uploads go through
//! `Queue::write_buffer` into offsets handed out by the byte allocators.
//! Per-chunk GPU allocations after pool creation are forbidden, so pool
//! exhaustion drops the mesh rather than allocating.

use std::mem::size_of;
use std::sync::Arc;

use crate::error::EngineError;
use crate::mesh::Vertex;

use super::{
    build_indirect_commands, ChunkDrawItem, DrawIndexedIndirect, MeshAllocation, MeshBackend,
    PoolAllocator,
};

const VERTEX_SIZE: u64 = size_of::<Vertex>() as u64;
const INDEX_SIZE: u64 = size_of::<u32>() as u64;
const INDIRECT_RECORD_SIZE: u64 = size_of::<DrawIndexedIndirect>() as u64;
const INITIAL_INDIRECT_CAPACITY: usize = 1024;

/// Mesh pools and indirect draw staging over a wgpu device
pub struct WgpuMeshBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    vtx_buffer: wgpu::Buffer,
    idx_buffer: wgpu::Buffer,
    vtx_pool: PoolAllocator,
    idx_pool: PoolAllocator,

    indirect_buffer: wgpu::Buffer,
    indirect_capacity: usize,
    draw_count: u32,

    mvp_buffer: wgpu::Buffer,

    log_pool: bool,
    frame_counter: u64,
}

impl WgpuMeshBackend {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        pool_vtx_mb: usize,
        pool_idx_mb: usize,
        log_pool: bool,
    ) -> Self {
        let vtx_capacity = (pool_vtx_mb as u64) << 20;
        let idx_capacity = (pool_idx_mb as u64) << 20;

        let vtx_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk-vertex-pool"),
            size: vtx_capacity,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let idx_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk-index-pool"),
            size: idx_capacity,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indirect_buffer = Self::create_indirect_buffer(&device, INITIAL_INDIRECT_CAPACITY);
        let mvp_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk-mvp"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::info!(
            "[pool] created pools: vtx {} MiB, idx {} MiB",
            pool_vtx_mb,
            pool_idx_mb
        );

        Self {
            device,
            queue,
            vtx_buffer,
            idx_buffer,
            vtx_pool: PoolAllocator::new(vtx_capacity),
            idx_pool: PoolAllocator::new(idx_capacity),
            indirect_buffer,
            indirect_capacity: INITIAL_INDIRECT_CAPACITY,
            draw_count: 0,
            mvp_buffer,
            log_pool,
            frame_counter: 0,
        }
    }

    fn create_indirect_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("chunk-indirect"),
            size: capacity as u64 * INDIRECT_RECORD_SIZE,
            usage: wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn ensure_indirect_capacity(&mut self, draw_count: usize) {
        if draw_count <= self.indirect_capacity {
            return;
        }
        let new_capacity = draw_count.max(self.indirect_capacity * 2);
        self.indirect_buffer = Self::create_indirect_buffer(&self.device, new_capacity);
        self.indirect_capacity = new_capacity;
    }

    /// Vertex pool buffer, bound once per batch
    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vtx_buffer
    }

    /// Index pool buffer, bound once per batch
    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.idx_buffer
    }

    /// Indirect command buffer holding [`Self::draw_count`] records
    pub fn indirect_buffer(&self) -> &wgpu::Buffer {
        &self.indirect_buffer
    }

    pub fn mvp_buffer(&self) -> &wgpu::Buffer {
        &self.mvp_buffer
    }

    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }
}

impl MeshBackend for WgpuMeshBackend {
    fn upload_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Option<MeshAllocation> {
        let vbytes = vertices.len() as u64 * VERTEX_SIZE;
        let ibytes = indices.len() as u64 * INDEX_SIZE;

        let voff = match self.vtx_pool.alloc(vbytes, VERTEX_SIZE) {
            Some(off) => off,
            None => {
                log::debug!(
                    "[pool] {}",
                    EngineError::PoolExhausted {
                        requested: vbytes,
                        available: self.vtx_pool.free_listed(),
                    }
                );
                return None;
            }
        };
        let ioff = match self.idx_pool.alloc(ibytes, INDEX_SIZE) {
            Some(off) => off,
            None => {
                self.vtx_pool.free(voff, vbytes);
                log::debug!(
                    "[pool] {}",
                    EngineError::PoolExhausted {
                        requested: ibytes,
                        available: self.idx_pool.free_listed(),
                    }
                );
                return None;
            }
        };

        self.queue
            .write_buffer(&self.vtx_buffer, voff, bytemuck::cast_slice(vertices));
        self.queue
            .write_buffer(&self.idx_buffer, ioff, bytemuck::cast_slice(indices));

        if self.log_pool {
            log::debug!(
                "[pool] upload: vtx off={} bytes={} idx off={} bytes={}",
                voff,
                vbytes,
                ioff,
                ibytes
            );
        }

        Some(MeshAllocation {
            first_index: (ioff / INDEX_SIZE) as u32,
            index_count: indices.len() as u32,
            base_vertex: (voff / VERTEX_SIZE) as i32,
            vertex_count: vertices.len() as u32,
        })
    }

    fn free_mesh(&mut self, alloc: &MeshAllocation) {
        if alloc.index_count > 0 {
            self.idx_pool.free(
                alloc.first_index as u64 * INDEX_SIZE,
                alloc.index_count as u64 * INDEX_SIZE,
            );
        }
        if alloc.vertex_count > 0 {
            self.vtx_pool.free(
                alloc.base_vertex as u64 * VERTEX_SIZE,
                alloc.vertex_count as u64 * VERTEX_SIZE,
            );
        }
        if self.log_pool {
            log::debug!(
                "[pool] free: idx first={} count={} vtx base={} count={}",
                alloc.first_index,
                alloc.index_count,
                alloc.base_vertex,
                alloc.vertex_count
            );
        }
    }

    fn record(&mut self, mvp: &[f32; 16], items: &[ChunkDrawItem]) {
        self.draw_count = items.len() as u32;
        if items.is_empty() {
            return;
        }
        self.ensure_indirect_capacity(items.len());

        let commands = build_indirect_commands(items);
        self.queue
            .write_buffer(&self.mvp_buffer, 0, bytemuck::cast_slice(mvp));
        self.queue
            .write_buffer(&self.indirect_buffer, 0, bytemuck::cast_slice(&commands));

        self.frame_counter += 1;
        if self.log_pool && self.frame_counter % 120 == 0 {
            log::debug!(
                "[pool] record: draws={} vtx_high={}/{} idx_high={}/{}",
                items.len(),
                self.vtx_pool.used_high(),
                self.vtx_pool.capacity(),
                self.idx_pool.used_high(),
                self.idx_pool.capacity()
            );
        }
    }
}

/// Acquire a headless device/queue pair for hosts without a surface
pub fn request_headless_device() -> Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("terravox-device"),
            required_features: wgpu::Features::MULTI_DRAW_INDIRECT,
            required_limits: wgpu::Limits::default(),
        },
        None,
    ))
    .ok()?;
    Some((Arc::new(device), Arc::new(queue)))
}
