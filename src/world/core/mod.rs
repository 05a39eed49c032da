//! Core world identity types, independent of storage or streaming.

mod edit;
mod key;
mod material;

pub use edit::{EditCommand, EditKind, VoxelHit};
pub use key::FaceChunkKey;
pub use material::{BaseSample, MaterialId};
