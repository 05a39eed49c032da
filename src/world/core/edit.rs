//! Edit targeting types shared between picking and the runtime.

use glam::{DVec3, I64Vec3};

use super::{FaceChunkKey, MaterialId};

/// A picked voxel: chunk identity, chunk-local coordinate, and the global
/// integer voxel index used to re-sample the procedural base.
#[derive(Debug, Clone, Copy)]
pub struct VoxelHit {
    pub key: FaceChunkKey,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub voxel: I64Vec3,
    pub world_pos: DVec3,
    pub material: MaterialId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    AddVoxel,
    RemoveVoxel,
    PaintMaterial,
}

/// A queued world edit, applied during the next runtime update
#[derive(Debug, Clone, Copy)]
pub struct EditCommand {
    pub kind: EditKind,
    pub key: FaceChunkKey,
    pub local_x: i16,
    pub local_y: i16,
    pub local_z: i16,
    pub material: MaterialId,
}

impl Default for VoxelHit {
    fn default() -> Self {
        Self {
            key: FaceChunkKey::default(),
            x: 0,
            y: 0,
            z: 0,
            voxel: I64Vec3::ZERO,
            world_pos: DVec3::ZERO,
            material: MaterialId::AIR,
        }
    }
}
