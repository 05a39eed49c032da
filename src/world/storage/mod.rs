//! Voxel storage: packed palette indices, occupancy, and edit overlays.

mod bit_array;
mod chunk;
mod delta;

pub use bit_array::BitArray;
pub use chunk::Chunk64;
pub use delta::{apply_chunk_delta, ChunkDelta, DeltaEntry, DeltaMode, NO_OVERRIDE};
