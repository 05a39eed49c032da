//! Streaming manager: chunk/delta caches, remesh queue, and the loader
//! thread lifecycle.
//!
//! Lock discipline: helpers that touch more than one shared table take the
//! locks in cache -> delta -> remesh order. The request/result queues use
//! their own mutex + condvar inside [`super::loader`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::persistence::RegionStore;
use crate::world::core::{FaceChunkKey, MaterialId};
use crate::world::storage::{apply_chunk_delta, Chunk64, ChunkDelta};

use super::loader::{self, LoaderShared};
use super::{LoadRequest, MeshResult, StreamSettings, StreamStatus};

/// One staged brush cell for [`StreamingManager::modify_chunk_and_delta`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct StagedEdit {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub base_material: MaterialId,
}

pub(super) struct CacheState {
    pub chunks: Mutex<FxHashMap<FaceChunkKey, Chunk64>>,
    pub deltas: Mutex<FxHashMap<FaceChunkKey, ChunkDelta>>,
    pub remesh: Mutex<VecDeque<FaceChunkKey>>,
    pub regions: RegionStore,
    pub settings: StreamSettings,
}

impl CacheState {
    /// Overlay `chunk` with its delta, loading the delta from the region
    /// store on first touch. Caches the (possibly empty) delta either way.
    pub fn overlay_chunk_delta(&self, key: &FaceChunkKey, chunk: &mut Chunk64) {
        {
            let mut deltas = self.deltas.lock();
            if let Some(delta) = deltas.get_mut(key) {
                delta.normalize();
                if !delta.is_empty() {
                    apply_chunk_delta(delta, chunk);
                }
                return;
            }
        }

        let mut delta = ChunkDelta::new();
        if !self.regions.load_chunk_delta(key, &mut delta) {
            self.deltas.lock().insert(*key, ChunkDelta::new());
            return;
        }

        delta.normalize();
        if !delta.is_empty() {
            apply_chunk_delta(&delta, chunk);
        }
        self.deltas.lock().insert(*key, delta);
    }
}

/// Wakeup state for the delta-flush writer thread
struct FlushSignal {
    pending: Mutex<bool>,
    wakeup: Condvar,
    quit: AtomicBool,
}

impl FlushSignal {
    fn new() -> Self {
        Self {
            pending: Mutex::new(false),
            wakeup: Condvar::new(),
            quit: AtomicBool::new(false),
        }
    }
}

/// Owner of all streamed chunk state and the loader worker
pub struct StreamingManager {
    cache: Arc<CacheState>,
    shared: Arc<LoaderShared>,
    worker: Option<JoinHandle<()>>,
    flush_signal: Arc<FlushSignal>,
    flusher: Option<JoinHandle<()>>,
}

impl StreamingManager {
    pub fn new(settings: StreamSettings) -> Self {
        let regions = RegionStore::new(settings.region_root.clone());
        Self {
            cache: Arc::new(CacheState {
                chunks: Mutex::new(FxHashMap::default()),
                deltas: Mutex::new(FxHashMap::default()),
                remesh: Mutex::new(VecDeque::new()),
                regions,
                settings,
            }),
            shared: Arc::new(LoaderShared::new()),
            worker: None,
            flush_signal: Arc::new(FlushSignal::new()),
            flusher: None,
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.cache.settings
    }

    /// Spawn the loader and flush-writer threads. Idempotent.
    pub fn start(&mut self) {
        if self.worker.is_none() {
            self.shared.reset_for_start();
            let cache = Arc::clone(&self.cache);
            let shared = Arc::clone(&self.shared);
            self.worker = Some(
                std::thread::Builder::new()
                    .name("terravox-loader".into())
                    .spawn(move || loader::loader_main(cache, shared))
                    .expect("spawn loader thread"),
            );
        }
        if self.flusher.is_none() && self.cache.settings.save_chunks_enabled {
            self.flush_signal.quit.store(false, Ordering::SeqCst);
            let cache = Arc::clone(&self.cache);
            let signal = Arc::clone(&self.flush_signal);
            self.flusher = Some(
                std::thread::Builder::new()
                    .name("terravox-flush".into())
                    .spawn(move || flusher_main(cache, signal))
                    .expect("spawn flush thread"),
            );
        }
    }

    /// Signal quit, wake both threads, and join them
    pub fn stop(&mut self) {
        self.shared.request_quit();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.flush_signal.quit.store(true, Ordering::SeqCst);
        self.flush_signal.wakeup.notify_all();
        if let Some(handle) = self.flusher.take() {
            let _ = handle.join();
        }
    }

    /// Ask the writer thread to flush dirty deltas without blocking the
    /// caller. Falls back to a synchronous flush when no writer is running.
    pub fn request_delta_flush(&self) {
        if !self.cache.settings.save_chunks_enabled {
            return;
        }
        if self.flusher.is_some() {
            *self.flush_signal.pending.lock() = true;
            self.flush_signal.wakeup.notify_one();
        } else {
            self.flush_dirty_chunk_deltas();
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Submit a ring request, discarding any pending unstarted request.
    /// Returns the generation label tagged onto the produced meshes.
    pub fn enqueue_ring_request(
        &self,
        face: u8,
        ring_radius: i32,
        ci: i64,
        cj: i64,
        ck: i64,
        k_down: i32,
        k_up: i32,
        fwd_s: f32,
        fwd_t: f32,
    ) -> u64 {
        let generation = self.shared.next_generation();
        let req = LoadRequest {
            face,
            ring_radius,
            ci,
            cj,
            ck,
            k_down,
            k_up,
            fwd_s,
            fwd_t,
            generation,
        };
        if self.cache.settings.log_stream {
            log::info!(
                "[stream] request gen={} face={} ring={} center=({}, {}, {}) shells=[-{}, +{}]",
                generation,
                face,
                ring_radius,
                ci,
                cj,
                ck,
                k_down,
                k_up
            );
        }
        self.shared.submit_request(req);
        generation
    }

    /// Latest submitted generation
    pub fn latest_generation(&self) -> u64 {
        self.shared.latest_generation()
    }

    /// Pop one mesh result if any are ready
    pub fn try_pop_result(&self) -> Option<MeshResult> {
        self.shared.try_pop_result()
    }

    pub fn result_queue_depth(&self) -> usize {
        self.shared.result_queue_depth()
    }

    pub fn loader_busy(&self) -> bool {
        self.shared.loader_busy()
    }

    /// True when no request is pending and no job is running
    pub fn loader_idle(&self) -> bool {
        self.shared.loader_idle()
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.status()
    }

    // -- chunk cache ---------------------------------------------------------

    pub fn store_chunk(&self, key: FaceChunkKey, chunk: Chunk64) {
        self.cache.chunks.lock().insert(key, chunk);
    }

    pub fn erase_chunk(&self, key: &FaceChunkKey) {
        self.cache.chunks.lock().remove(key);
    }

    pub fn contains_chunk(&self, key: &FaceChunkKey) -> bool {
        self.cache.chunks.lock().contains_key(key)
    }

    pub fn chunk_copy(&self, key: &FaceChunkKey) -> Option<Chunk64> {
        self.cache.chunks.lock().get(key).cloned()
    }

    pub fn cached_chunk_count(&self) -> usize {
        self.cache.chunks.lock().len()
    }

    /// Solidity of a cached voxel; `None` when the chunk is not resident
    pub fn is_voxel_solid(&self, key: &FaceChunkKey, x: usize, y: usize, z: usize) -> Option<bool> {
        self.cache
            .chunks
            .lock()
            .get(key)
            .map(|c| c.is_solid(x, y, z))
    }

    /// Cached material of a voxel; `None` when the chunk is not resident
    pub fn voxel_material(
        &self,
        key: &FaceChunkKey,
        x: usize,
        y: usize,
        z: usize,
    ) -> Option<MaterialId> {
        self.cache
            .chunks
            .lock()
            .get(key)
            .map(|c| c.get_material(x, y, z))
    }

    // -- deltas --------------------------------------------------------------

    /// Copy of the delta for `key`, empty if none is cached
    pub fn delta_copy(&self, key: &FaceChunkKey) -> ChunkDelta {
        self.cache
            .deltas
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Overlay `chunk` with its delta, loading the delta from the region
    /// store on first touch. Caches the (possibly empty) delta either way.
    pub fn overlay_chunk_delta(&self, key: &FaceChunkKey, chunk: &mut Chunk64) {
        self.cache.overlay_chunk_delta(key, chunk);
    }

    /// Write every dirty delta through the region store on the calling
    /// thread. Prefer [`Self::request_delta_flush`] from frame code.
    pub fn flush_dirty_chunk_deltas(&self) {
        if !self.cache.settings.save_chunks_enabled {
            return;
        }
        flush_dirty_deltas(&self.cache);
    }

    /// Apply a staged brush under the cache and delta locks (in that order).
    /// Returns the boundary-neighbor keys needing a remesh, or `None` when
    /// the target chunk is not resident.
    pub(crate) fn modify_chunk_and_delta(
        &self,
        key: &FaceChunkKey,
        edits: &[StagedEdit],
        new_material: MaterialId,
    ) -> Option<Vec<FaceChunkKey>> {
        let mut chunks = self.cache.chunks.lock();
        let chunk = chunks.get_mut(key)?;

        for edit in edits {
            chunk.set_voxel(edit.x, edit.y, edit.z, new_material);
        }

        {
            let mut deltas = self.cache.deltas.lock();
            let delta = deltas.entry(*key).or_default();
            for edit in edits {
                let lidx = Chunk64::lindex(edit.x, edit.y, edit.z);
                delta.apply_edit(lidx, edit.base_material, new_material);
            }
            delta.normalize();
        }

        let last = Chunk64::N - 1;
        let mut neighbors = Vec::new();
        let mut push_unique = |k: FaceChunkKey| {
            if !neighbors.contains(&k) {
                neighbors.push(k);
            }
        };
        for edit in edits {
            if edit.x == 0 {
                push_unique(key.offset(-1, 0, 0));
            }
            if edit.x == last {
                push_unique(key.offset(1, 0, 0));
            }
            if edit.y == 0 {
                push_unique(key.offset(0, -1, 0));
            }
            if edit.y == last {
                push_unique(key.offset(0, 1, 0));
            }
            if edit.z == 0 {
                push_unique(key.offset(0, 0, -1));
            }
            if edit.z == last {
                push_unique(key.offset(0, 0, 1));
            }
        }
        Some(neighbors)
    }

    // -- remesh queue --------------------------------------------------------

    pub fn queue_remesh(&self, key: FaceChunkKey) {
        self.cache.remesh.lock().push_back(key);
    }

    /// Pop up to `n` queued remesh keys (0 = use the configured cap)
    pub fn take_remesh_batch(&self, n: usize) -> Vec<FaceChunkKey> {
        let cap = if n > 0 {
            n
        } else {
            self.cache.settings.remesh_per_frame_cap
        };
        let mut queue = self.cache.remesh.lock();
        let take = cap.min(queue.len());
        queue.drain(..take).collect()
    }

    pub fn remesh_queue_depth(&self) -> usize {
        self.cache.remesh.lock().len()
    }

    /// Remesh one chunk without neighbor context: clone the cached chunk,
    /// overlay its delta, mesh, and store overlay side effects back.
    pub fn remesh_chunk(&self, key: &FaceChunkKey) -> Option<MeshResult> {
        let mut chunk = self.chunk_copy(key)?;

        let mut delta = self.delta_copy(key);
        delta.normalize();
        apply_chunk_delta(&delta, &mut chunk);

        let result = loader::mesh_single_chunk(
            &self.cache.settings,
            key,
            &chunk,
            self.shared.latest_generation(),
        );

        self.store_chunk(*key, chunk);
        result
    }
}

impl Drop for StreamingManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delta-flush writer thread: waits for a flush request, then performs the
/// file writes off the runtime thread
fn flusher_main(cache: Arc<CacheState>, signal: Arc<FlushSignal>) {
    loop {
        {
            let mut pending = signal.pending.lock();
            while !*pending && !signal.quit.load(Ordering::Relaxed) {
                signal.wakeup.wait(&mut pending);
            }
            if signal.quit.load(Ordering::Relaxed) {
                break;
            }
            *pending = false;
        }
        flush_dirty_deltas(&cache);
    }
    // Drain anything staged between the last flush and quit
    flush_dirty_deltas(&cache);
}

fn flush_dirty_deltas(cache: &CacheState) {
    let mut pending: Vec<(FaceChunkKey, ChunkDelta)> = Vec::new();
    {
        let mut deltas = cache.deltas.lock();
        for (key, delta) in deltas.iter_mut() {
            if !delta.dirty {
                continue;
            }
            pending.push((*key, delta.clone()));
            delta.dirty = false;
            for word in &mut delta.dirty_mask {
                *word = 0;
            }
        }
    }

    for (key, mut delta) in pending {
        delta.normalize();
        if !cache.regions.save_chunk_delta(&key, &delta) {
            log::warn!("[stream] delta flush failed for {:?}", key);
        } else if cache.settings.log_stream {
            log::debug!(
                "[stream] flushed delta {:?} ({} overrides, {:?})",
                key,
                delta.override_count,
                delta.mode
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager(dir: &std::path::Path, save: bool) -> StreamingManager {
        let settings = StreamSettings {
            region_root: dir.join("regions"),
            save_chunks_enabled: save,
            ..Default::default()
        };
        StreamingManager::new(settings)
    }

    fn filled_chunk() -> Chunk64 {
        let mut c = Chunk64::new();
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    c.set_voxel(x, y, z, MaterialId::ROCK);
                }
            }
        }
        c
    }

    #[test]
    fn test_remesh_queue_fifo_and_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path(), false);
        for i in 0..6 {
            mgr.queue_remesh(FaceChunkKey::new(0, i, 0, 0));
        }
        let batch = mgr.take_remesh_batch(4);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0], FaceChunkKey::new(0, 0, 0, 0));
        assert_eq!(mgr.remesh_queue_depth(), 2);

        // n = 0 falls back to the configured cap (default 4)
        let rest = mgr.take_remesh_batch(0);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_modify_missing_chunk_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path(), false);
        let key = FaceChunkKey::new(0, 0, 0, 5);
        let edits = [StagedEdit {
            x: 1,
            y: 1,
            z: 1,
            base_material: MaterialId::ROCK,
        }];
        assert!(mgr
            .modify_chunk_and_delta(&key, &edits, MaterialId::AIR)
            .is_none());
    }

    #[test]
    fn test_modify_updates_cache_and_delta() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path(), false);
        let key = FaceChunkKey::new(2, 0, 0, 7);
        mgr.store_chunk(key, filled_chunk());

        let edits = [StagedEdit {
            x: 3,
            y: 4,
            z: 5,
            base_material: MaterialId::ROCK,
        }];
        let neighbors = mgr
            .modify_chunk_and_delta(&key, &edits, MaterialId::AIR)
            .unwrap();
        assert!(neighbors.is_empty(), "interior edit touches no neighbor");
        assert_eq!(mgr.is_voxel_solid(&key, 3, 4, 5), Some(false));

        let delta = mgr.delta_copy(&key);
        assert_eq!(delta.override_count, 1);
        assert!(delta.dirty);
    }

    #[test]
    fn test_modify_boundary_reports_neighbors() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path(), false);
        let key = FaceChunkKey::new(2, 0, 0, 7);
        mgr.store_chunk(key, Chunk64::new());

        let edits = [
            StagedEdit {
                x: 0,
                y: 32,
                z: 32,
                base_material: MaterialId::AIR,
            },
            StagedEdit {
                x: 1,
                y: 32,
                z: 32,
                base_material: MaterialId::AIR,
            },
        ];
        let neighbors = mgr
            .modify_chunk_and_delta(&key, &edits, MaterialId::ROCK)
            .unwrap();
        assert_eq!(neighbors, vec![FaceChunkKey::new(2, -1, 0, 7)]);
    }

    #[test]
    fn test_overlay_roundtrip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path(), true);
        let key = FaceChunkKey::new(1, 4, 4, 9);

        // Stage an edit and flush it
        mgr.store_chunk(key, filled_chunk());
        let edits = [StagedEdit {
            x: 2,
            y: 2,
            z: 2,
            base_material: MaterialId::ROCK,
        }];
        mgr.modify_chunk_and_delta(&key, &edits, MaterialId::AIR)
            .unwrap();
        mgr.flush_dirty_chunk_deltas();

        // A second manager sharing the region root sees the override
        let mgr2 = test_manager(dir.path(), true);
        let mut chunk = filled_chunk();
        mgr2.overlay_chunk_delta(&key, &mut chunk);
        assert!(!chunk.is_solid(2, 2, 2));
        assert!(chunk.is_solid(3, 2, 2));
    }

    #[test]
    fn test_flush_clears_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = test_manager(dir.path(), true);
        let key = FaceChunkKey::new(0, 1, 2, 3);
        mgr.store_chunk(key, filled_chunk());
        let edits = [StagedEdit {
            x: 0,
            y: 1,
            z: 1,
            base_material: MaterialId::ROCK,
        }];
        mgr.modify_chunk_and_delta(&key, &edits, MaterialId::DIRT)
            .unwrap();
        assert!(mgr.delta_copy(&key).dirty);
        mgr.flush_dirty_chunk_deltas();
        assert!(!mgr.delta_copy(&key).dirty);
    }
}
