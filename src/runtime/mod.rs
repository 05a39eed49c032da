//! World runtime: the simulation hub tying camera, streaming, edits, and
//! the renderer transfer queues together.
//!
//! The runtime owns all session state. Collaborators (window, renderer,
//! config file watcher) push typed inputs in through [`WorldUpdateInput`]
//! and pull typed outputs out of the snapshot and transfer-queue accessors;
//! nothing here blocks on IO or the GPU.

mod picking;

pub use picking::{pick_voxel, world_to_chunk_coords};

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::camera::{CameraInput, CameraSnapshot, CameraState, LookInput, MovementAxes};
use crate::config::{AppConfig, AppConfigManager};
use crate::constants::core::CHUNK_SIZE;
use crate::constants::streaming::FACE_SWITCH_HYSTERESIS;
use crate::mesh::MeshData;
use crate::planet::{face_basis, face_from_direction, sample_base, voxel_from_face_local};
use crate::streaming::{MeshResult, ProfileSink, StreamSettings, StreamStatus, StreamingManager};
use crate::world::core::{EditCommand, EditKind, FaceChunkKey, MaterialId, VoxelHit};

/// Seconds between dirty-delta flushes while persistence is enabled
const DELTA_FLUSH_INTERVAL_S: f64 = 2.0;

/// Per-update input bundle
#[derive(Debug, Clone)]
pub struct WorldUpdateInput {
    pub dt: f64,
    pub movement: MovementAxes,
    pub look: LookInput,
    pub walk_mode: bool,
    pub sprint: bool,
    pub ground_follow: bool,
    pub clamp_pitch: bool,
    pub edits: Vec<EditCommand>,
    pub reload_config: bool,
    pub save_config: bool,
}

impl Default for WorldUpdateInput {
    fn default() -> Self {
        Self {
            dt: 0.0,
            movement: MovementAxes::default(),
            look: LookInput::default(),
            walk_mode: false,
            sprint: false,
            ground_follow: false,
            clamp_pitch: true,
            edits: Vec::new(),
            reload_config: false,
            save_config: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorldUpdateResult {
    pub camera_changed: bool,
    pub config_changed: bool,
    pub streaming_dirty: bool,
}

/// GPU-side view of one meshed chunk. `mesh_handle` carries the generation
/// of the job that produced the current mesh.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRenderable {
    pub key: FaceChunkKey,
    pub center: Vec3,
    pub radius: f32,
    pub mesh_handle: u64,
}

/// Retain-filter for the renderable table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowRegion {
    pub face: u8,
    pub ci: i64,
    pub cj: i64,
    pub ck: i64,
    pub span: i32,
    pub k_down: i32,
    pub k_up: i32,
}

impl AllowRegion {
    pub fn contains(&self, key: &FaceChunkKey) -> bool {
        if self.face != key.face {
            return false;
        }
        if (key.i - self.ci).abs() > self.span as i64 || (key.j - self.cj).abs() > self.span as i64
        {
            return false;
        }
        key.k >= self.ck - self.k_down as i64 && key.k <= self.ck + self.k_up as i64
    }
}

/// A mesh waiting for the renderer to upload it into the pools
#[derive(Debug, Clone)]
pub struct MeshUpload {
    pub key: FaceChunkKey,
    pub mesh: MeshData,
    pub center: [f32; 3],
    pub radius: f32,
    pub job_generation: u64,
}

/// Read-only view handed to the renderer each frame
pub struct WorldRenderSnapshot<'a> {
    pub camera: CameraSnapshot,
    pub chunks: &'a [ChunkRenderable],
    pub allow_regions: &'a [AllowRegion],
}

/// Streaming focus: which face the ring follows and what is kept alive
/// while a face switch settles
#[derive(Debug, Clone, Copy, Default)]
struct StreamFocus {
    face: Option<u8>,
    ready: bool,
    pending_gen: u64,
    center: (i64, i64, i64),
    prev_face: Option<u8>,
    prev_center: (i64, i64, i64),
    keep_timer_s: f32,
}

/// Simulation hub for world streaming, camera, and edit application
pub struct WorldRuntime {
    config_manager: AppConfigManager,
    active_config: AppConfig,
    config_dirty: bool,

    camera: CameraState,
    streaming: StreamingManager,
    focus: StreamFocus,

    renderables: Vec<ChunkRenderable>,
    renderable_lookup: FxHashMap<FaceChunkKey, usize>,
    allow_regions: Vec<AllowRegion>,
    allow_regions_prev: Vec<AllowRegion>,

    mesh_uploads: Vec<MeshUpload>,
    mesh_releases: Vec<FaceChunkKey>,
    pending_edits: Vec<EditCommand>,

    profile_sink: Option<ProfileSink>,
    flush_accum_s: f64,
    initialized: bool,
}

impl WorldRuntime {
    pub fn new(initial_config: AppConfig) -> Self {
        let camera = CameraState::new(&initial_config);
        let streaming = StreamingManager::new(stream_settings_from(&initial_config, None));
        Self {
            config_manager: AppConfigManager::new(initial_config.clone()),
            active_config: initial_config,
            config_dirty: false,
            camera,
            streaming,
            focus: StreamFocus::default(),
            renderables: Vec::new(),
            renderable_lookup: FxHashMap::default(),
            allow_regions: Vec::new(),
            allow_regions_prev: Vec::new(),
            mesh_uploads: Vec::new(),
            mesh_releases: Vec::new(),
            pending_edits: Vec::new(),
            profile_sink: None,
            flush_accum_s: 0.0,
            initialized: false,
        }
    }

    /// Load config, wire the profile sink, and start the loader thread
    pub fn initialize(&mut self, config_path_override: Option<PathBuf>) -> anyhow::Result<()> {
        if let Some(path) = config_path_override {
            self.config_manager.set_config_path(path);
            self.config_manager.reload();
        }
        let cfg = self.config_manager.active().clone();
        cfg.validate()?;

        if self.profile_sink.is_none() && cfg.profile_csv_enabled {
            self.profile_sink = Some(make_csv_sink(cfg.profile_csv_path.clone()));
        }

        self.apply_config(cfg);
        self.initialized = true;
        log::info!("[runtime] initialized, region root {:?}", self.active_config.region_root);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if self.active_config.save_chunks_enabled {
            self.streaming.flush_dirty_chunk_deltas();
        }
        self.streaming.stop();
        self.renderables.clear();
        self.renderable_lookup.clear();
        self.mesh_uploads.clear();
        self.mesh_releases.clear();
        self.pending_edits.clear();
        self.initialized = false;
    }

    /// Replace the active config, rebuilding the streaming stack when its
    /// settings changed
    pub fn apply_config(&mut self, cfg: AppConfig) {
        let streaming_changed = stream_settings_differ(&self.active_config, &cfg)
            || !self.streaming.is_running();
        self.active_config = cfg.clone();
        self.camera.apply_config(&cfg);
        self.config_manager.adopt_runtime_state(cfg.clone());
        self.config_dirty = true;

        if streaming_changed {
            self.streaming.flush_dirty_chunk_deltas();
            self.streaming.stop();
            self.streaming =
                StreamingManager::new(stream_settings_from(&cfg, self.profile_sink.clone()));
            self.streaming.start();
            // Force a fresh ring request on the next update
            self.focus = StreamFocus::default();
        }
    }

    pub fn active_config(&self) -> &AppConfig {
        &self.active_config
    }

    /// Active config with runtime-mutated state folded back in
    pub fn snapshot_config(&self) -> AppConfig {
        let mut cfg = self.active_config.clone();
        cfg.walk_mode = self.camera.walk_mode;
        cfg
    }

    /// Install a profile line sink. Takes effect for streaming jobs after
    /// the next [`Self::apply_config`] / [`Self::initialize`].
    pub fn set_profile_sink(&mut self, sink: ProfileSink) {
        self.profile_sink = Some(sink);
    }

    pub fn streaming(&self) -> &StreamingManager {
        &self.streaming
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.camera.aspect_ratio = aspect;
    }

    // -- per-frame update ----------------------------------------------------

    pub fn update(&mut self, input: &WorldUpdateInput) -> WorldUpdateResult {
        let mut result = WorldUpdateResult::default();
        if !self.initialized {
            return result;
        }

        let dt = input.dt.max(0.0);

        if input.walk_mode != self.camera.walk_mode {
            self.camera.walk_mode = input.walk_mode;
            self.active_config.walk_mode = input.walk_mode;
            self.config_dirty = true;
        }

        let reloaded = input.reload_config && self.reload_config();
        let saved = input.save_config && self.save_config();

        if !input.edits.is_empty() {
            self.pending_edits.extend(input.edits.iter().copied());
            result.streaming_dirty = true;
        }
        if self.process_queued_edits() {
            result.streaming_dirty = true;
        }

        let cam_input = CameraInput {
            dt,
            movement: input.movement,
            look: input.look,
            sprint: input.sprint,
            ground_follow: input.ground_follow,
            clamp_pitch: input.clamp_pitch,
        };
        result.camera_changed = self.camera.update(&cam_input, &self.active_config.planet);
        result.streaming_dirty |= result.camera_changed;

        let streaming_changed = self.update_streaming_state(dt, self.camera.forward());
        let remeshed = self.process_pending_remeshes(0);
        let uploads = self.drain_mesh_results();
        let releases = self.prune_renderables();
        if streaming_changed || remeshed || uploads || releases {
            result.streaming_dirty = true;
        }

        if self.active_config.save_chunks_enabled {
            self.flush_accum_s += dt;
            if self.flush_accum_s >= DELTA_FLUSH_INTERVAL_S {
                self.flush_accum_s = 0.0;
                // Hand the file writes to the writer thread
                self.streaming.request_delta_flush();
            }
        }

        if self.config_dirty || reloaded || saved {
            result.config_changed = true;
            self.config_dirty = false;
        }
        result
    }

    // -- snapshots -----------------------------------------------------------

    pub fn snapshot_camera(&self) -> CameraSnapshot {
        self.camera.snapshot()
    }

    pub fn snapshot_stream_status(&self) -> StreamStatus {
        self.streaming.status()
    }

    pub fn snapshot_renderables(&self) -> WorldRenderSnapshot<'_> {
        WorldRenderSnapshot {
            camera: self.camera.snapshot(),
            chunks: &self.renderables,
            allow_regions: &self.allow_regions,
        }
    }

    pub fn active_allow_regions(&self) -> &[AllowRegion] {
        &self.allow_regions
    }

    // -- mesh transfer queues ------------------------------------------------

    pub fn pending_mesh_uploads(&self) -> &[MeshUpload] {
        &self.mesh_uploads
    }

    pub fn pending_mesh_releases(&self) -> &[FaceChunkKey] {
        &self.mesh_releases
    }

    /// Pop exactly what the renderer handled; unconsumed items stay queued
    /// in FIFO order for the next frame
    pub fn consume_mesh_transfer_queues(&mut self, uploads_processed: usize, releases_processed: usize) {
        let up = uploads_processed.min(self.mesh_uploads.len());
        let rel = releases_processed.min(self.mesh_releases.len());
        self.mesh_uploads.drain(..up);
        self.mesh_releases.drain(..rel);
    }

    // -- edits ---------------------------------------------------------------

    pub fn queue_edit(&mut self, edit: EditCommand) {
        self.pending_edits.push(edit);
    }

    pub fn clear_pending_edits(&mut self) {
        self.pending_edits.clear();
    }

    /// Pick the first solid voxel (and the empty voxel before it) along the
    /// camera ray
    pub fn pick_voxel(&self, max_dist: f64) -> Option<(VoxelHit, Option<VoxelHit>)> {
        picking::pick_voxel(
            &self.active_config.planet,
            &self.streaming,
            self.camera.position,
            self.camera.forward().as_dvec3(),
            max_dist,
        )
    }

    /// Apply an N^3 cubic brush of `new_material` centered on `target`.
    /// Even brush sizes favor the negative side. Returns false when the
    /// target chunk is not resident or the brush lands fully out of bounds.
    pub fn apply_voxel_edit(
        &mut self,
        target: &VoxelHit,
        new_material: MaterialId,
        brush_dim: i32,
    ) -> bool {
        let n = CHUNK_SIZE as i32;
        let brush_dim = brush_dim.clamp(1, n);
        let half = brush_dim / 2;
        let even = brush_dim % 2 == 0;
        let start = -half;
        let end = if even { half - 1 } else { half };

        let cfg = self.active_config.planet;
        let mut staged = Vec::with_capacity((brush_dim * brush_dim * brush_dim) as usize);
        for dz in start..=end {
            let lz = target.z + dz;
            if !(0..n).contains(&lz) {
                continue;
            }
            for dy in start..=end {
                let ly = target.y + dy;
                if !(0..n).contains(&ly) {
                    continue;
                }
                for dx in start..=end {
                    let lx = target.x + dx;
                    if !(0..n).contains(&lx) {
                        continue;
                    }
                    let voxel = glam::I64Vec3::new(
                        target.voxel.x + dx as i64,
                        target.voxel.y + dy as i64,
                        target.voxel.z + dz as i64,
                    );
                    let base = sample_base(&cfg, voxel);
                    staged.push(crate::streaming::StagedEdit {
                        x: lx as usize,
                        y: ly as usize,
                        z: lz as usize,
                        base_material: base.material,
                    });
                }
            }
        }
        if staged.is_empty() {
            return false;
        }

        let Some(neighbors) =
            self.streaming
                .modify_chunk_and_delta(&target.key, &staged, new_material)
        else {
            return false;
        };

        self.streaming.queue_remesh(target.key);
        for neighbor in neighbors {
            self.streaming.queue_remesh(neighbor);
        }
        true
    }

    /// Remesh up to `max_count` queued chunks (0 = configured cap).
    /// Returns true when any upload was produced.
    pub fn process_pending_remeshes(&mut self, max_count: usize) -> bool {
        let batch = self.streaming.take_remesh_batch(max_count);
        if batch.is_empty() {
            return false;
        }
        let mut any = false;
        for key in batch {
            if let Some(res) = self.streaming.remesh_chunk(&key) {
                self.push_upload(res);
                any = true;
            }
        }
        any
    }

    // -- internals -----------------------------------------------------------

    fn reload_config(&mut self) -> bool {
        if !self.config_manager.reload() {
            return false;
        }
        let cfg = self.config_manager.active().clone();
        self.apply_config(cfg);
        true
    }

    fn save_config(&mut self) -> bool {
        let runtime_cfg = self.snapshot_config();
        self.config_manager.adopt_runtime_state(runtime_cfg);
        if !self.config_manager.save_active() {
            return false;
        }
        self.reload_config();
        true
    }

    /// Convert queued edit commands into single-voxel brush applications
    fn process_queued_edits(&mut self) -> bool {
        if self.pending_edits.is_empty() {
            return false;
        }
        let edits = std::mem::take(&mut self.pending_edits);
        let mut any = false;
        for cmd in edits {
            let (x, y, z) = (cmd.local_x as i32, cmd.local_y as i32, cmd.local_z as i32);
            let n = CHUNK_SIZE as i32;
            if !(0..n).contains(&x) || !(0..n).contains(&y) || !(0..n).contains(&z) {
                continue;
            }
            let voxel = voxel_from_face_local(
                &self.active_config.planet,
                &cmd.key,
                x as usize,
                y as usize,
                z as usize,
            );
            let hit = VoxelHit {
                key: cmd.key,
                x,
                y,
                z,
                voxel,
                world_pos: voxel.as_dvec3() * self.active_config.planet.voxel_size_m,
                material: cmd.material,
            };
            let material = match cmd.kind {
                EditKind::RemoveVoxel => MaterialId::AIR,
                EditKind::AddVoxel | EditKind::PaintMaterial => cmd.material,
            };
            any |= self.apply_voxel_edit(&hit, material, 1);
        }
        any
    }

    fn update_streaming_state(&mut self, dt: f64, forward: Vec3) -> bool {
        let mut changed = false;
        let chunk_m = self.active_config.planet.chunk_m();
        let face_keep_time_s = self.active_config.face_keep_time_s;
        let span_base = self.active_config.ring_radius + self.active_config.prune_margin;
        let k_down_base = self.active_config.k_down + self.active_config.k_prune_margin;
        let k_up_base = self.active_config.k_up + self.active_config.k_prune_margin;

        let eye = self.camera.position;
        let dir = crate::math::normalize_or(eye.as_vec3(), Vec3::X);

        // Face selection with hysteresis: a new face must beat the current
        // one's forward alignment by a margin before streaming refocuses
        let raw_face = face_from_direction(dir);
        let chosen_face = match self.focus.face {
            Some(prev) if raw_face != prev => {
                let (_, _, prev_fwd) = face_basis(prev);
                let (_, _, cand_fwd) = face_basis(raw_face);
                let prev_align = dir.dot(prev_fwd).abs();
                let cand_align = dir.dot(cand_fwd).abs();
                if cand_align < prev_align + FACE_SWITCH_HYSTERESIS {
                    prev
                } else {
                    raw_face
                }
            }
            Some(prev) => prev,
            None => raw_face,
        };

        let (right, up, _) = face_basis(chosen_face);
        let s = eye.dot(right.as_dvec3());
        let t = eye.dot(up.as_dvec3());
        let ci = (s / chunk_m).floor() as i64;
        let cj = (t / chunk_m).floor() as i64;
        let ck = (eye.length() / chunk_m).floor() as i64;

        let fwd_s = forward.dot(right);
        let fwd_t = forward.dot(up);

        let face_changed = self.focus.face != Some(chosen_face);
        if face_changed {
            self.focus.prev_face = self.focus.face;
            self.focus.prev_center = self.focus.center;
            self.focus.keep_timer_s = face_keep_time_s;
            self.focus.face = Some(chosen_face);
            self.focus.center = (ci, cj, ck);
            self.submit_ring_request(chosen_face, ci, cj, ck, fwd_s, fwd_t);
            changed = true;
        } else if self.focus.center != (ci, cj, ck) {
            self.focus.center = (ci, cj, ck);
            self.submit_ring_request(chosen_face, ci, cj, ck, fwd_s, fwd_t);
            changed = true;
        }

        if self.focus.keep_timer_s > 0.0 {
            self.focus.keep_timer_s = (self.focus.keep_timer_s - dt as f32).max(0.0);
        }
        if !self.focus.ready && self.streaming.loader_idle() {
            self.focus.ready = true;
        }

        // Rebuild the allow regions: current face plus, while settling, the
        // previous one
        std::mem::swap(&mut self.allow_regions_prev, &mut self.allow_regions);
        self.allow_regions.clear();
        let relaxed = !self.focus.ready;
        let relax = if relaxed { 1 } else { 0 };
        let mut push_region = |face: u8, center: (i64, i64, i64)| {
            self.allow_regions.push(AllowRegion {
                face,
                ci: center.0,
                cj: center.1,
                ck: center.2,
                span: span_base + relax,
                k_down: k_down_base + relax,
                k_up: k_up_base + relax,
            });
        };
        if let Some(face) = self.focus.face {
            push_region(face, self.focus.center);
        }
        let keep_prev = self.focus.prev_face.is_some()
            && (self.focus.keep_timer_s > 0.0 || !self.focus.ready);
        if keep_prev {
            if let Some(prev) = self.focus.prev_face {
                push_region(prev, self.focus.prev_center);
            }
        }

        if self.allow_regions != self.allow_regions_prev {
            changed = true;
        }
        changed
    }

    fn submit_ring_request(&mut self, face: u8, ci: i64, cj: i64, ck: i64, fwd_s: f32, fwd_t: f32) {
        let cfg = &self.active_config;
        let gen = self.streaming.enqueue_ring_request(
            face,
            cfg.ring_radius,
            ci,
            cj,
            ck,
            cfg.k_down,
            cfg.k_up,
            fwd_s,
            fwd_t,
        );
        self.focus.ready = false;
        self.focus.pending_gen = gen;
    }

    /// Drain up to `uploads_per_frame_limit` mesh results into the upload
    /// queue and the renderable table
    fn drain_mesh_results(&mut self) -> bool {
        let mut any = false;
        for _ in 0..self.active_config.uploads_per_frame_limit {
            let Some(res) = self.streaming.try_pop_result() else {
                break;
            };

            if !self.focus.ready
                && Some(res.key.face) == self.focus.face
                && res.job_gen >= self.focus.pending_gen
            {
                self.focus.ready = true;
            }

            self.update_renderable_entry(res.key, res.center, res.radius, res.job_gen);
            self.push_upload(res);
            any = true;
        }
        any
    }

    fn push_upload(&mut self, res: MeshResult) {
        self.mesh_uploads.push(MeshUpload {
            key: res.key,
            mesh: res.mesh,
            center: res.center,
            radius: res.radius,
            job_generation: res.job_gen,
        });
    }

    /// Insert or refresh a renderable. A stale generation never overwrites
    /// a newer mesh for the same key.
    fn update_renderable_entry(&mut self, key: FaceChunkKey, center: [f32; 3], radius: f32, job_gen: u64) {
        match self.renderable_lookup.get(&key) {
            Some(&idx) => {
                let entry = &mut self.renderables[idx];
                if entry.mesh_handle > job_gen {
                    return;
                }
                entry.center = Vec3::from_array(center);
                entry.radius = radius;
                entry.mesh_handle = job_gen;
            }
            None => {
                self.renderable_lookup.insert(key, self.renderables.len());
                self.renderables.push(ChunkRenderable {
                    key,
                    center: Vec3::from_array(center),
                    radius,
                    mesh_handle: job_gen,
                });
            }
        }
    }

    /// Drop renderables outside every allow region, queueing their keys on
    /// the release queue and evicting their cache entries
    fn prune_renderables(&mut self) -> bool {
        if self.allow_regions.is_empty() {
            return false;
        }
        let mut removed = false;
        let mut idx = 0;
        while idx < self.renderables.len() {
            let key = self.renderables[idx].key;
            let inside = self.allow_regions.iter().any(|r| r.contains(&key));
            if inside {
                idx += 1;
                continue;
            }
            self.mesh_releases.push(key);
            self.streaming.erase_chunk(&key);
            self.remove_renderable(idx);
            removed = true;
        }
        removed
    }

    /// Delete-by-swap-with-last, keeping the lookup indices consistent
    fn remove_renderable(&mut self, index: usize) {
        if index >= self.renderables.len() {
            return;
        }
        let key = self.renderables[index].key;
        let last = self.renderables.len() - 1;
        if index != last {
            self.renderables.swap(index, last);
            let moved_key = self.renderables[index].key;
            self.renderable_lookup.insert(moved_key, index);
        }
        self.renderables.pop();
        self.renderable_lookup.remove(&key);
    }
}

impl Drop for WorldRuntime {
    fn drop(&mut self) {
        if self.initialized {
            self.shutdown();
        }
    }
}

fn stream_settings_from(cfg: &AppConfig, sink: Option<ProfileSink>) -> StreamSettings {
    StreamSettings {
        planet: cfg.planet,
        region_root: cfg.region_root.clone(),
        save_chunks_enabled: cfg.save_chunks_enabled,
        log_stream: cfg.log_stream,
        loader_threads: cfg.loader_threads,
        stream_cone_deg: cfg.stream_cone_deg,
        surface_push_m: cfg.surface_push_m,
        debug_chunk_keys: cfg.debug_chunk_keys,
        remesh_per_frame_cap: cfg.remesh_per_frame_cap,
        profile_sink: sink,
    }
}

fn stream_settings_differ(a: &AppConfig, b: &AppConfig) -> bool {
    a.planet != b.planet
        || a.region_root != b.region_root
        || a.save_chunks_enabled != b.save_chunks_enabled
        || a.log_stream != b.log_stream
        || a.loader_threads != b.loader_threads
        || a.stream_cone_deg != b.stream_cone_deg
        || a.surface_push_m != b.surface_push_m
        || a.debug_chunk_keys != b.debug_chunk_keys
        || a.remesh_per_frame_cap != b.remesh_per_frame_cap
}

/// Profile sink appending `job,...` lines to a CSV file, writing the header
/// on first use
fn make_csv_sink(path: PathBuf) -> ProfileSink {
    let state: Mutex<bool> = Mutex::new(false);
    Arc::new(move |line: &str| {
        let mut header_written = state.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| {
                if !*header_written {
                    writeln!(file, "event,time_s,items,meshed,gen_ms,mesh_ms,total_or_frame_ms")?;
                    *header_written = true;
                }
                file.write_all(line.as_bytes())
            });
        if let Err(err) = result {
            log::debug!("[profile] csv append failed: {}", err);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::storage::Chunk64;

    fn offline_runtime(dir: &std::path::Path) -> WorldRuntime {
        // Runtime with the loader not started: deterministic queue tests
        let mut cfg = AppConfig::default();
        cfg.region_root = dir.join("regions");
        WorldRuntime::new(cfg)
    }

    fn solid_chunk() -> Chunk64 {
        let mut c = Chunk64::new();
        for z in 0..Chunk64::N {
            for y in 0..Chunk64::N {
                for x in 0..Chunk64::N {
                    c.set_voxel(x, y, z, MaterialId::ROCK);
                }
            }
        }
        c
    }

    #[test]
    fn test_edit_boundary_neighbor_remesh() {
        // Scenario: 3x3x3 brush at local (0, 32, 32) queues the -i neighbor
        // and the target chunk, nothing else
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());
        let key = FaceChunkKey::new(2, 0, 0, 7);
        rt.streaming.store_chunk(key, solid_chunk());

        let hit = VoxelHit {
            key,
            x: 0,
            y: 32,
            z: 32,
            voxel: voxel_from_face_local(&rt.active_config.planet, &key, 0, 32, 32),
            world_pos: glam::DVec3::ZERO,
            material: MaterialId::ROCK,
        };
        assert!(rt.apply_voxel_edit(&hit, MaterialId::AIR, 3));

        let queued = rt.streaming.take_remesh_batch(16);
        assert_eq!(
            queued,
            vec![FaceChunkKey::new(2, 0, 0, 7), FaceChunkKey::new(2, -1, 0, 7)]
        );
    }

    #[test]
    fn test_edit_missing_chunk_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());
        let hit = VoxelHit {
            key: FaceChunkKey::new(0, 9, 9, 9),
            x: 5,
            y: 5,
            z: 5,
            voxel: glam::I64Vec3::ZERO,
            world_pos: glam::DVec3::ZERO,
            material: MaterialId::ROCK,
        };
        assert!(!rt.apply_voxel_edit(&hit, MaterialId::AIR, 1));
        assert_eq!(rt.streaming.remesh_queue_depth(), 0);
    }

    #[test]
    fn test_even_brush_favors_negative_side() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());
        let key = FaceChunkKey::new(0, 0, 0, 180);
        rt.streaming.store_chunk(key, solid_chunk());

        let hit = VoxelHit {
            key,
            x: 10,
            y: 10,
            z: 10,
            voxel: voxel_from_face_local(&rt.active_config.planet, &key, 10, 10, 10),
            world_pos: glam::DVec3::ZERO,
            material: MaterialId::ROCK,
        };
        assert!(rt.apply_voxel_edit(&hit, MaterialId::AIR, 2));

        // dim 2: offsets -1..=0 on each axis
        for (x, y, z, expect_air) in [
            (9usize, 9usize, 9usize, true),
            (10, 10, 10, true),
            (11, 10, 10, false),
            (10, 11, 10, false),
        ] {
            let solid = rt.streaming.is_voxel_solid(&key, x, y, z).unwrap();
            assert_eq!(!solid, expect_air, "at ({}, {}, {})", x, y, z);
        }
    }

    #[test]
    fn test_allow_region_containment() {
        let region = AllowRegion {
            face: 1,
            ci: 10,
            cj: -4,
            ck: 100,
            span: 3,
            k_down: 2,
            k_up: 1,
        };
        assert!(region.contains(&FaceChunkKey::new(1, 13, -1, 101)));
        assert!(!region.contains(&FaceChunkKey::new(0, 10, -4, 100)));
        assert!(!region.contains(&FaceChunkKey::new(1, 14, -4, 100)));
        assert!(!region.contains(&FaceChunkKey::new(1, 10, -4, 102)));
        assert!(region.contains(&FaceChunkKey::new(1, 10, -4, 98)));
        assert!(!region.contains(&FaceChunkKey::new(1, 10, -4, 97)));
    }

    #[test]
    fn test_renderable_generation_guard() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());
        let key = FaceChunkKey::new(0, 0, 0, 1);

        rt.update_renderable_entry(key, [1.0, 0.0, 0.0], 5.0, 3);
        // Older generation must not overwrite
        rt.update_renderable_entry(key, [9.0, 0.0, 0.0], 9.0, 2);
        assert_eq!(rt.renderables[0].mesh_handle, 3);
        assert_eq!(rt.renderables[0].center.x, 1.0);
        // Equal or newer generations do
        rt.update_renderable_entry(key, [2.0, 0.0, 0.0], 6.0, 3);
        assert_eq!(rt.renderables[0].center.x, 2.0);
        rt.update_renderable_entry(key, [4.0, 0.0, 0.0], 7.0, 8);
        assert_eq!(rt.renderables[0].mesh_handle, 8);
    }

    #[test]
    fn test_prune_releases_outside_regions() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());

        let inside = FaceChunkKey::new(0, 0, 0, 100);
        let outside = FaceChunkKey::new(0, 50, 0, 100);
        rt.update_renderable_entry(inside, [0.0; 3], 1.0, 1);
        rt.update_renderable_entry(outside, [0.0; 3], 1.0, 1);

        rt.allow_regions.push(AllowRegion {
            face: 0,
            ci: 0,
            cj: 0,
            ck: 100,
            span: 5,
            k_down: 3,
            k_up: 3,
        });
        assert!(rt.prune_renderables());

        assert_eq!(rt.renderables.len(), 1);
        assert_eq!(rt.renderables[0].key, inside);
        assert_eq!(rt.mesh_releases, vec![outside]);
        // Every released key lies outside every active region
        for key in &rt.mesh_releases {
            assert!(rt.allow_regions.iter().all(|r| !r.contains(key)));
        }
    }

    #[test]
    fn test_transfer_queue_consumption_preserves_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());
        for i in 0..4 {
            rt.push_upload(MeshResult {
                key: FaceChunkKey::new(0, i, 0, 0),
                mesh: MeshData::default(),
                center: [0.0; 3],
                radius: 1.0,
                job_gen: 1,
            });
        }
        rt.mesh_releases.push(FaceChunkKey::new(1, 0, 0, 0));

        rt.consume_mesh_transfer_queues(2, 0);
        assert_eq!(rt.pending_mesh_uploads().len(), 2);
        assert_eq!(rt.pending_mesh_uploads()[0].key, FaceChunkKey::new(0, 2, 0, 0));
        assert_eq!(rt.pending_mesh_releases().len(), 1);

        // Over-consumption clamps
        rt.consume_mesh_transfer_queues(10, 10);
        assert!(rt.pending_mesh_uploads().is_empty());
        assert!(rt.pending_mesh_releases().is_empty());
    }

    #[test]
    fn test_queued_edit_command_applies() {
        let dir = tempfile::tempdir().unwrap();
        let mut rt = offline_runtime(dir.path());
        let key = FaceChunkKey::new(0, 0, 0, 180);
        rt.streaming.store_chunk(key, solid_chunk());

        rt.queue_edit(EditCommand {
            kind: EditKind::RemoveVoxel,
            key,
            local_x: 20,
            local_y: 21,
            local_z: 22,
            material: MaterialId::AIR,
        });
        assert!(rt.process_queued_edits());
        assert_eq!(rt.streaming.is_voxel_solid(&key, 20, 21, 22), Some(false));
    }
}
