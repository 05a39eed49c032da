//! Core dimensional constants shared across the engine.

/// Core chunk and voxel constants
pub mod core {
    /// Chunk dimension in voxels along each axis
    pub const CHUNK_SIZE: usize = 64;

    /// Total voxels per chunk (64^3)
    pub const VOXELS_PER_CHUNK: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

    /// Number of 64-bit words in a chunk occupancy bitset
    pub const OCC_WORDS: usize = (VOXELS_PER_CHUNK + 63) / 64;

    /// Initial palette index width in bits
    pub const PALETTE_BPP: u32 = 8;
}

/// Region file constants
pub mod region {
    /// Chunks per region file side (tile * tile slots per file)
    pub const REGION_TILE: i64 = 32;

    /// Region container magic, 8 bytes including the NUL pad
    pub const REGION_MAGIC: &[u8; 8] = b"WFREGN1\0";

    /// Chunk blob magic
    pub const CHUNK_MAGIC: &[u8; 8] = b"WFCHK1\0\0";

    /// Delta blob magic
    pub const DELTA_MAGIC: &[u8; 8] = b"WFDEL1\0\0";

    /// Container format version
    pub const REGION_VERSION: u32 = 1;

    /// TOC flag bit marking a delta blob (clear = chunk blob)
    pub const TOC_FLAG_DELTA: u32 = 1 << 0;
}

/// Streaming defaults, overridable through [`crate::config::AppConfig`]
pub mod streaming {
    /// Ring radius in tiles around the camera tile
    pub const DEFAULT_RING_RADIUS: i32 = 14;

    /// Extra tiles kept beyond the ring before pruning
    pub const DEFAULT_PRUNE_MARGIN: i32 = 3;

    /// Radial shells below / above the camera shell
    pub const DEFAULT_K_DOWN: i32 = 3;
    pub const DEFAULT_K_UP: i32 = 3;
    pub const DEFAULT_K_PRUNE_MARGIN: i32 = 1;

    /// Seconds the previous face stays in the allow list after a switch
    pub const DEFAULT_FACE_KEEP_TIME_S: f32 = 0.75;

    /// Forward-alignment advantage a face must have to steal streaming focus
    pub const FACE_SWITCH_HYSTERESIS: f32 = 0.05;

    /// Half-angle of the meshing cone around the camera forward, degrees
    pub const DEFAULT_STREAM_CONE_DEG: f32 = 75.0;

    /// Mesh results drained per runtime tick
    pub const DEFAULT_UPLOADS_PER_FRAME: usize = 16;

    /// Remesh jobs processed per runtime tick
    pub const DEFAULT_REMESH_PER_FRAME: usize = 4;
}

/// Pool allocator defaults
pub mod pool {
    /// Vertex pool capacity in MiB
    pub const DEFAULT_VTX_MB: usize = 256;

    /// Index pool capacity in MiB
    pub const DEFAULT_IDX_MB: usize = 128;
}

/// Delta representation thresholds
pub mod delta {
    /// Sparse deltas promote to dense at or above this edit density
    pub const PROMOTE_DENSITY: f32 = 0.18;

    /// Dense deltas demote to sparse at or below this edit density
    pub const DEMOTE_DENSITY: f32 = 0.08;
}
