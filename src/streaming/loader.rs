//! Loader thread and ring build jobs.
//!
//! The loader waits on a condvar for ring requests, coalescing to the
//! newest one. Each job runs two rayon phases over the dense tile window:
//! generation (region load or procedural fill, then delta overlay) and
//! neighbor-aware meshing with forward-cone prioritization. Every task
//! re-checks the request generation and bails once superseded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glam::{I64Vec3, Vec3};
use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;

use crate::constants::core::CHUNK_SIZE;
use crate::mesh::{mesh_chunk_greedy, mesh_chunk_greedy_neighbors, project_chunk_mesh, ChunkNeighbors, MeshData};
use crate::planet::{face_basis, sample_base};
use crate::world::core::FaceChunkKey;
use crate::world::storage::Chunk64;

use super::manager::CacheState;
use super::{LoadRequest, MeshResult, StreamSettings, StreamStatus};

const SQRT3: f32 = 1.732_050_8;

struct LoaderQueues {
    requests: Vec<LoadRequest>,
    results: VecDeque<MeshResult>,
    busy: bool,
}

/// State shared between the loader thread and the manager
pub(super) struct LoaderShared {
    queues: Mutex<LoaderQueues>,
    wakeup: Condvar,
    quit: AtomicBool,
    request_gen: AtomicU64,
    last_gen_ms: AtomicU64,
    last_mesh_ms: AtomicU64,
    last_generated: AtomicI32,
    last_meshed: AtomicI32,
    started: Instant,
}

impl LoaderShared {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(LoaderQueues {
                requests: Vec::new(),
                results: VecDeque::new(),
                busy: false,
            }),
            wakeup: Condvar::new(),
            quit: AtomicBool::new(false),
            request_gen: AtomicU64::new(0),
            last_gen_ms: AtomicU64::new(0),
            last_mesh_ms: AtomicU64::new(0),
            last_generated: AtomicI32::new(0),
            last_meshed: AtomicI32::new(0),
            started: Instant::now(),
        }
    }

    pub fn reset_for_start(&self) {
        self.quit.store(false, Ordering::SeqCst);
        let mut q = self.queues.lock();
        q.busy = false;
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        self.wakeup.notify_all();
    }

    pub fn quitting(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }

    pub fn next_generation(&self) -> u64 {
        self.request_gen.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_generation(&self) -> u64 {
        self.request_gen.load(Ordering::SeqCst)
    }

    pub fn submit_request(&self, req: LoadRequest) {
        {
            let mut q = self.queues.lock();
            // Coalesce: pending unstarted requests are superseded
            q.requests.clear();
            q.requests.push(req);
        }
        self.wakeup.notify_one();
    }

    pub fn push_result(&self, result: MeshResult) {
        self.queues.lock().results.push_back(result);
    }

    pub fn try_pop_result(&self) -> Option<MeshResult> {
        self.queues.lock().results.pop_front()
    }

    pub fn result_queue_depth(&self) -> usize {
        self.queues.lock().results.len()
    }

    pub fn loader_busy(&self) -> bool {
        self.queues.lock().busy
    }

    pub fn loader_idle(&self) -> bool {
        let q = self.queues.lock();
        !q.busy && q.requests.is_empty()
    }

    pub fn status(&self) -> StreamStatus {
        let (queued, busy) = {
            let q = self.queues.lock();
            (q.results.len(), q.busy)
        };
        StreamStatus {
            queued,
            last_gen_ms: f64::from_bits(self.last_gen_ms.load(Ordering::Relaxed)),
            last_generated_chunks: self.last_generated.load(Ordering::Relaxed),
            last_mesh_ms: f64::from_bits(self.last_mesh_ms.load(Ordering::Relaxed)),
            last_meshed_chunks: self.last_meshed.load(Ordering::Relaxed),
            loader_busy: busy,
        }
    }
}

/// Loader thread entry point
pub(super) fn loader_main(cache: Arc<CacheState>, shared: Arc<LoaderShared>) {
    let threads = if cache.settings.loader_threads > 0 {
        cache.settings.loader_threads.max(num_cpus::get())
    } else {
        num_cpus::get().max(1)
    };
    let pool = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool,
        Err(err) => {
            log::error!("[stream] worker pool build failed: {}", err);
            return;
        }
    };

    loop {
        let req = {
            let mut q = shared.queues.lock();
            while !shared.quitting() && q.requests.is_empty() {
                shared.wakeup.wait(&mut q);
            }
            if shared.quitting() {
                break;
            }
            // Coalesce to the latest request
            let req = *q.requests.last().expect("request queue non-empty");
            q.requests.clear();
            q.busy = true;
            req
        };

        if cache.settings.log_stream {
            log::info!(
                "[stream] job gen={} face={} ring={} center=({}, {}, {})",
                req.generation,
                req.face,
                req.ring_radius,
                req.ci,
                req.cj,
                req.ck
            );
        }
        pool.install(|| build_ring_job(&cache, &shared, &req));

        shared.queues.lock().busy = false;
    }
}

/// Tile offsets sorted by (a) squared tangent distance, (b) forward
/// alignment, (c) stable key order
fn prioritized_offsets(span: i32, fwd_s: f32, fwd_t: f32) -> Vec<(i32, i32)> {
    let len = (fwd_s * fwd_s + fwd_t * fwd_t).sqrt();
    let (dir_s, dir_t) = if len > 1e-6 {
        (fwd_s / len, fwd_t / len)
    } else {
        (0.0, 0.0)
    };

    let mut order: Vec<(i32, i32)> = Vec::with_capacity(((2 * span + 1) * (2 * span + 1)) as usize);
    for dj in -span..=span {
        for di in -span..=span {
            order.push((di, dj));
        }
    }
    order.sort_by(|a, b| {
        let d2a = a.0 * a.0 + a.1 * a.1;
        let d2b = b.0 * b.0 + b.1 * b.1;
        if d2a != d2b {
            return d2a.cmp(&d2b);
        }
        let dota = a.0 as f32 * dir_s + a.1 as f32 * dir_t;
        let dotb = b.0 as f32 * dir_s + b.1 as f32 * dir_t;
        match dotb.partial_cmp(&dota) {
            Some(std::cmp::Ordering::Equal) | None => (a.1, a.0).cmp(&(b.1, b.0)),
            Some(ord) => ord,
        }
    });
    order
}

fn build_ring_job(cache: &CacheState, shared: &LoaderShared, req: &LoadRequest) {
    let cfg = &cache.settings.planet;
    let n = CHUNK_SIZE;
    let chunk_m = cfg.chunk_m();
    let voxel_m = cfg.voxel_size_m;
    let s = voxel_m as f32;
    let (right, up, forward) = face_basis(req.face);

    let span = req.ring_radius;
    let w = (2 * span + 1) as usize;
    let kd = (req.k_down + req.k_up + 1) as usize;
    let slot_count = w * w * kd;

    let idx_of = |di: i32, dj: i32, dk: i32| -> usize {
        let ix = (di + span) as usize;
        let jy = (dj + span) as usize;
        let kz = (dk + req.k_down) as usize;
        (kz * w + jy) * w + ix
    };
    let coords_of = |idx: usize| -> (i32, i32, i32) {
        let ix = (idx % w) as i32;
        let jy = ((idx / w) % w) as i32;
        let kz = (idx / (w * w)) as i32;
        (ix - span, jy - span, kz - req.k_down)
    };

    let mut window: Vec<Chunk64> = Vec::with_capacity(slot_count);
    window.resize_with(slot_count, Chunk64::new);

    // Generation phase: region load, procedural fill on miss, delta overlay
    let t0 = Instant::now();
    let job_gen = req.generation;
    let debug_keys = cache.settings.debug_chunk_keys;
    let debug_logged = AtomicI32::new(0);

    window.par_iter_mut().enumerate().for_each(|(idx, chunk)| {
        if shared.quitting() || shared.latest_generation() != job_gen {
            return;
        }
        let (di, dj, dk) = coords_of(idx);
        let key = FaceChunkKey::new(req.face, req.ci + di as i64, req.cj + dj as i64, req.ck + dk as i64);

        if debug_keys && debug_logged.fetch_add(1, Ordering::Relaxed) < 32 {
            log::debug!("[stream] chunk-load {:?}", key);
        }

        if !cache.regions.load_chunk(&key, chunk) {
            fill_chunk_procedural(cfg, &key, chunk, right, up, forward);
            if cache.settings.save_chunks_enabled {
                cache.regions.save_chunk(&key, chunk);
            }
        }
        cache.overlay_chunk_delta(&key, chunk);
    });

    let gen_ms = t0.elapsed().as_secs_f64() * 1000.0;
    shared.last_gen_ms.store(gen_ms.to_bits(), Ordering::Relaxed);
    shared
        .last_generated
        .store(slot_count as i32, Ordering::Relaxed);

    if shared.quitting() || shared.latest_generation() != job_gen {
        return;
    }

    // Meshing phase over the prioritized offsets, shells varying inside
    let t1 = Instant::now();
    let order = prioritized_offsets(span, req.fwd_s, req.fwd_t);
    let mut mtasks: Vec<(i32, i32, i32)> = Vec::with_capacity(slot_count);
    for &(di, dj) in &order {
        for dk in -req.k_down..=req.k_up {
            mtasks.push((di, dj, dk));
        }
    }

    // Camera forward in world space, from its projective face coordinates
    let inv_len = 1.0 / (1.0 + req.fwd_s * req.fwd_s + req.fwd_t * req.fwd_t).sqrt();
    let fwd_world =
        (right * (req.fwd_s * inv_len) + up * (req.fwd_t * inv_len) + forward * inv_len).normalize();
    let cone_cos = (cache.settings.stream_cone_deg.to_radians()).cos();
    let halfm = (n as f64 * voxel_m * 0.5) as f32;

    let meshed = AtomicI32::new(0);
    let window_ref = &window;

    mtasks.par_iter().for_each(|&(di, dj, dk)| {
        if shared.quitting() || shared.latest_generation() != job_gen {
            return;
        }
        let chunk = &window_ref[idx_of(di, dj, dk)];

        let s0 = (req.ci + di as i64) as f64 * chunk_m;
        let t0_local = (req.cj + dj as i64) as f64 * chunk_m;
        let r0 = (req.ck + dk as i64) as f64 * chunk_m;

        // Chunk-center direction for the forward-cone test
        let sc = s0 as f32 + halfm;
        let tc = t0_local as f32 + halfm;
        let rc = r0 as f32 + halfm;
        let (cu, cv) = (sc / rc, tc / rc);
        let cw = (1.0 - (cu * cu + cv * cv)).max(0.0).sqrt();
        let dirc = (right * cu + up * cv + forward * cw).normalize();
        if !debug_keys && fwd_world.dot(dirc) < cone_cos {
            return;
        }

        let neighbors = ChunkNeighbors {
            neg_x: (di > -span).then(|| &window_ref[idx_of(di - 1, dj, dk)]),
            pos_x: (di < span).then(|| &window_ref[idx_of(di + 1, dj, dk)]),
            neg_y: (dj > -span).then(|| &window_ref[idx_of(di, dj - 1, dk)]),
            pos_y: (dj < span).then(|| &window_ref[idx_of(di, dj + 1, dk)]),
            neg_z: (dk > -req.k_down).then(|| &window_ref[idx_of(di, dj, dk - 1)]),
            pos_z: (dk < req.k_up).then(|| &window_ref[idx_of(di, dj, dk + 1)]),
        };

        let mut mesh = MeshData::default();
        mesh_chunk_greedy_neighbors(chunk, &neighbors, &mut mesh, s);
        if mesh.is_empty() {
            return;
        }
        project_chunk_mesh(
            &mut mesh,
            s0,
            t0_local,
            r0,
            right,
            up,
            forward,
            cache.settings.surface_push_m,
        );
        meshed.fetch_add(1, Ordering::Relaxed);

        let center = dirc * rc;
        shared.push_result(MeshResult {
            key: FaceChunkKey::new(
                req.face,
                req.ci + di as i64,
                req.cj + dj as i64,
                req.ck + dk as i64,
            ),
            mesh,
            center: center.to_array(),
            radius: halfm * SQRT3,
            job_gen,
        });
    });

    let mesh_ms = t1.elapsed().as_secs_f64() * 1000.0;
    let meshed_count = meshed.load(Ordering::Relaxed);
    shared
        .last_mesh_ms
        .store(mesh_ms.to_bits(), Ordering::Relaxed);
    shared.last_meshed.store(meshed_count, Ordering::Relaxed);

    if shared.quitting() || shared.latest_generation() != job_gen {
        return;
    }

    // Adopt the window into the shared cache for edits and remeshes
    {
        let mut chunks = cache.chunks.lock();
        for (idx, chunk) in window.into_iter().enumerate() {
            let (di, dj, dk) = coords_of(idx);
            let key = FaceChunkKey::new(
                req.face,
                req.ci + di as i64,
                req.cj + dj as i64,
                req.ck + dk as i64,
            );
            chunks.insert(key, chunk);
        }
    }

    if cache.settings.log_stream {
        log::info!(
            "[stream] job gen={} done: {} chunks gen {:.1}ms, {} meshed {:.1}ms",
            job_gen,
            slot_count,
            gen_ms,
            meshed_count,
            mesh_ms
        );
    }
    if let Some(sink) = &cache.settings.profile_sink {
        let t_s = shared.started.elapsed().as_secs_f64();
        sink(&format!(
            "job,{:.3},{},{},{:.3},{:.3},{:.3}\n",
            t_s,
            slot_count,
            meshed_count,
            gen_ms,
            mesh_ms,
            gen_ms + mesh_ms
        ));
    }
}

/// Fill a chunk by sampling the base field at each voxel's world position
pub(super) fn fill_chunk_procedural(
    cfg: &crate::planet::PlanetConfig,
    key: &FaceChunkKey,
    chunk: &mut Chunk64,
    right: Vec3,
    up: Vec3,
    forward: Vec3,
) {
    let n = CHUNK_SIZE;
    let chunk_m = cfg.chunk_m();
    let voxel_m = cfg.voxel_size_m;

    for z in 0..n {
        let r0 = key.k as f64 * chunk_m + (z as f64 + 0.5) * voxel_m;
        for y in 0..n {
            let t0 = key.j as f64 * chunk_m + (y as f64 + 0.5) * voxel_m;
            for x in 0..n {
                let s0 = key.i as f64 * chunk_m + (x as f64 + 0.5) * voxel_m;
                let u = (s0 / r0) as f32;
                let v = (t0 / r0) as f32;
                let w = (1.0 - (u * u + v * v)).max(0.0).sqrt();
                let dir = (right * u + up * v + forward * w).normalize();
                let p = dir.as_dvec3() * r0;
                let voxel = I64Vec3::new(
                    (p.x / voxel_m).round() as i64,
                    (p.y / voxel_m).round() as i64,
                    (p.z / voxel_m).round() as i64,
                );
                let sample = sample_base(cfg, voxel);
                chunk.set_voxel(x, y, z, sample.material);
            }
        }
    }
}

/// Mesh one chunk without neighbor context (remesh path)
pub(super) fn mesh_single_chunk(
    settings: &StreamSettings,
    key: &FaceChunkKey,
    chunk: &Chunk64,
    job_gen: u64,
) -> Option<MeshResult> {
    let cfg = &settings.planet;
    let chunk_m = cfg.chunk_m();
    let (right, up, forward) = face_basis(key.face);

    let mut mesh = MeshData::default();
    mesh_chunk_greedy(chunk, &mut mesh, cfg.voxel_size_m as f32);
    if mesh.is_empty() {
        return None;
    }

    let s0 = key.i as f64 * chunk_m;
    let t0 = key.j as f64 * chunk_m;
    let r0 = key.k as f64 * chunk_m;
    project_chunk_mesh(
        &mut mesh,
        s0,
        t0,
        r0,
        right,
        up,
        forward,
        settings.surface_push_m,
    );

    let halfm = (chunk_m * 0.5) as f32;
    let sc = s0 as f32 + halfm;
    let tc = t0 as f32 + halfm;
    let rc = r0 as f32 + halfm;
    let (cu, cv) = (sc / rc, tc / rc);
    let cw = (1.0 - (cu * cu + cv * cv)).max(0.0).sqrt();
    let dirc = (right * cu + up * cv + forward * cw).normalize();

    Some(MeshResult {
        key: *key,
        mesh,
        center: (dirc * rc).to_array(),
        radius: halfm * SQRT3,
        job_gen,
    })
}
