//! World data types: identities, voxel storage, and edit overlays.

pub mod core;
pub mod storage;

pub use core::{BaseSample, EditCommand, EditKind, FaceChunkKey, MaterialId, VoxelHit};
pub use storage::{apply_chunk_delta, BitArray, Chunk64, ChunkDelta, DeltaMode};
