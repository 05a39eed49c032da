//! Terravox - planetary voxel streaming core.
//!
//! A cubed-sphere planet sampled on a uniform voxel lattice and streamed
//! around a moving observer: face-chunk addressing, paletted 64^3 chunks,
//! sparse/dense edit deltas with region-file persistence, a coalescing
//! ring scheduler with neighbor-aware greedy meshing, and pooled GPU mesh
//! memory with indirect draw assembly.
//!
//! The crate is windowing- and swapchain-agnostic: hosts own the surface
//! and event loop, drive [`WorldRuntime::update`] once per frame, and move
//! meshes between the runtime's transfer queues and a [`MeshBackend`].

pub mod camera;
pub mod config;
pub mod constants;
pub mod error;
pub mod math;
pub mod mesh;
pub mod noise;
pub mod persistence;
pub mod planet;
pub mod renderer;
pub mod runtime;
pub mod streaming;
pub mod world;

pub use camera::{CameraInput, CameraSnapshot, CameraState, LookInput, MovementAxes};
pub use config::{AppConfig, AppConfigManager};
pub use error::{EngineError, EngineResult};
pub use mesh::{MeshData, Vertex};
pub use planet::{
    direction_from_face_uv, face_basis, face_from_direction, face_uv_from_direction, sample_base,
    terrain_height_m, PlanetConfig,
};
pub use renderer::{
    ChunkDrawItem, DrawIndexedIndirect, MeshAllocation, MeshBackend, PoolAllocator,
    WgpuMeshBackend,
};
pub use runtime::{
    AllowRegion, ChunkRenderable, MeshUpload, WorldRenderSnapshot, WorldRuntime, WorldUpdateInput,
    WorldUpdateResult,
};
pub use streaming::{LoadRequest, MeshResult, StreamSettings, StreamStatus, StreamingManager};
pub use world::core::{BaseSample, EditCommand, EditKind, FaceChunkKey, MaterialId, VoxelHit};
pub use world::storage::{apply_chunk_delta, BitArray, Chunk64, ChunkDelta, DeltaMode};

// Re-export wgpu for hosts wiring the mesh backend into their render pass
pub use wgpu;
