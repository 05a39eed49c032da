//! Camera-driven chunk streaming.
//!
//! A single long-lived loader thread waits on a coalesced request queue.
//! Each request describes the full ring of tiles around the camera; newer
//! requests cancel older ones through a monotonically increasing generation
//! label that every worker task re-checks at task boundaries.

mod loader;
mod manager;

pub use manager::StreamingManager;
pub(crate) use manager::StagedEdit;

use std::path::PathBuf;
use std::sync::Arc;

use crate::mesh::MeshData;
use crate::planet::PlanetConfig;
use crate::world::core::FaceChunkKey;

/// Ring request submitted by the runtime. Submitting a new request discards
/// all pending unstarted requests for the same manager.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest {
    pub face: u8,
    pub ring_radius: i32,
    pub ci: i64,
    pub cj: i64,
    pub ck: i64,
    pub k_down: i32,
    pub k_up: i32,
    /// Camera forward projected onto the face right axis
    pub fwd_s: f32,
    /// Camera forward projected onto the face up axis
    pub fwd_t: f32,
    pub generation: u64,
}

/// One meshed chunk produced by a ring job or a remesh
#[derive(Debug, Clone)]
pub struct MeshResult {
    pub key: FaceChunkKey,
    pub mesh: MeshData,
    pub center: [f32; 3],
    pub radius: f32,
    pub job_gen: u64,
}

/// Loader health snapshot for the HUD / host application
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamStatus {
    pub queued: usize,
    pub last_gen_ms: f64,
    pub last_generated_chunks: i32,
    pub last_mesh_ms: f64,
    pub last_meshed_chunks: i32,
    pub loader_busy: bool,
}

/// Callback receiving profile CSV lines
pub type ProfileSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Streaming configuration resolved from [`crate::config::AppConfig`]
#[derive(Clone)]
pub struct StreamSettings {
    pub planet: PlanetConfig,
    pub region_root: PathBuf,
    pub save_chunks_enabled: bool,
    pub log_stream: bool,
    pub loader_threads: usize,
    pub stream_cone_deg: f32,
    pub surface_push_m: f32,
    pub debug_chunk_keys: bool,
    pub remesh_per_frame_cap: usize,
    pub profile_sink: Option<ProfileSink>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            planet: PlanetConfig::default(),
            region_root: PathBuf::from("regions"),
            save_chunks_enabled: false,
            log_stream: false,
            loader_threads: 0,
            stream_cone_deg: crate::constants::streaming::DEFAULT_STREAM_CONE_DEG,
            surface_push_m: 0.0,
            debug_chunk_keys: false,
            remesh_per_frame_cap: crate::constants::streaming::DEFAULT_REMESH_PER_FRAME,
            profile_sink: None,
        }
    }
}
