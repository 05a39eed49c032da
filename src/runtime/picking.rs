//! Voxel picking: a 3D-DDA walk over the integer voxel grid in world space.
//!
//! Voxels are center-addressed (voxel `v` occupies the cube centered on
//! `v * voxel_size_m`), so cell boundaries sit at half-voxel offsets. The
//! walk reports the first occupied voxel and the last empty voxel crossed
//! before it, which edits use for digging and placing respectively.

use glam::{DVec3, I64Vec3};

use crate::constants::core::CHUNK_SIZE;
use crate::planet::{face_basis, face_from_direction, PlanetConfig};
use crate::streaming::StreamingManager;
use crate::world::core::{FaceChunkKey, MaterialId, VoxelHit};

/// Resolve a world position into its owning chunk, chunk-local coordinate,
/// and world voxel index. `None` at the planet center where no face exists.
pub fn world_to_chunk_coords(cfg: &PlanetConfig, p: DVec3) -> Option<(FaceChunkKey, usize, usize, usize, I64Vec3)> {
    let r = p.length();
    if r <= 0.0 {
        return None;
    }
    let dir = (p / r).as_vec3();
    let face = face_from_direction(dir);
    let (right, up, _) = face_basis(face);

    let s = p.dot(right.as_dvec3());
    let t = p.dot(up.as_dvec3());

    let n = CHUNK_SIZE as i64;
    let si = (s / cfg.voxel_size_m).floor() as i64;
    let ti = (t / cfg.voxel_size_m).floor() as i64;
    let ri = (r / cfg.voxel_size_m).floor() as i64;

    let key = FaceChunkKey {
        face,
        i: si.div_euclid(n),
        j: ti.div_euclid(n),
        k: ri.div_euclid(n),
    };
    let lx = si.rem_euclid(n) as usize;
    let ly = ti.rem_euclid(n) as usize;
    let lz = ri.rem_euclid(n) as usize;

    let voxel = I64Vec3::new(
        (p.x / cfg.voxel_size_m).round() as i64,
        (p.y / cfg.voxel_size_m).round() as i64,
        (p.z / cfg.voxel_size_m).round() as i64,
    );
    Some((key, lx, ly, lz, voxel))
}

fn hit_at(
    cfg: &PlanetConfig,
    streaming: &StreamingManager,
    world_pos: DVec3,
) -> Option<VoxelHit> {
    let (key, lx, ly, lz, voxel) = world_to_chunk_coords(cfg, world_pos)?;
    let material = streaming
        .voxel_material(&key, lx, ly, lz)
        .unwrap_or(MaterialId::AIR);
    Some(VoxelHit {
        key,
        x: lx as i32,
        y: ly as i32,
        z: lz as i32,
        voxel,
        world_pos,
        material,
    })
}

/// Walk the voxel grid from `eye` along `dir` for at most `max_dist` meters.
/// Returns `(solid_hit, empty_before)`; `empty_before` is `None` when the
/// ray starts inside a solid voxel.
pub fn pick_voxel(
    cfg: &PlanetConfig,
    streaming: &StreamingManager,
    eye: DVec3,
    dir: DVec3,
    max_dist: f64,
) -> Option<(VoxelHit, Option<VoxelHit>)> {
    let dir = dir.try_normalize()?;
    let s = cfg.voxel_size_m;

    // Center-addressed grid coordinate of the eye
    let mut gx = (eye.x / s).round() as i64;
    let mut gy = (eye.y / s).round() as i64;
    let mut gz = (eye.z / s).round() as i64;

    let step_x: i64 = if dir.x > 0.0 { 1 } else { -1 };
    let step_y: i64 = if dir.y > 0.0 { 1 } else { -1 };
    let step_z: i64 = if dir.z > 0.0 { 1 } else { -1 };

    // Distance to the first boundary plane along each axis; boundaries sit
    // at (g +/- 0.5) * s
    let boundary = |g: i64, step: i64| (g as f64 + 0.5 * step as f64) * s;
    let mut t_max_x = if dir.x != 0.0 {
        (boundary(gx, step_x) - eye.x) / dir.x
    } else {
        f64::INFINITY
    };
    let mut t_max_y = if dir.y != 0.0 {
        (boundary(gy, step_y) - eye.y) / dir.y
    } else {
        f64::INFINITY
    };
    let mut t_max_z = if dir.z != 0.0 {
        (boundary(gz, step_z) - eye.z) / dir.z
    } else {
        f64::INFINITY
    };

    let t_delta_x = if dir.x != 0.0 { s / dir.x.abs() } else { f64::INFINITY };
    let t_delta_y = if dir.y != 0.0 { s / dir.y.abs() } else { f64::INFINITY };
    let t_delta_z = if dir.z != 0.0 { s / dir.z.abs() } else { f64::INFINITY };

    let mut last_empty: Option<VoxelHit> = None;
    let mut t = 0.0f64;

    while t <= max_dist {
        let world_pos = DVec3::new(gx as f64 * s, gy as f64 * s, gz as f64 * s);
        if let Some((key, lx, ly, lz, _)) = world_to_chunk_coords(cfg, world_pos) {
            let solid = streaming
                .is_voxel_solid(&key, lx, ly, lz)
                .unwrap_or(false);
            if solid {
                let hit = hit_at(cfg, streaming, world_pos)?;
                return Some((hit, last_empty));
            }
            last_empty = hit_at(cfg, streaming, world_pos);
        }

        // Advance to the next voxel across the nearest boundary
        if t_max_x <= t_max_y && t_max_x <= t_max_z {
            gx += step_x;
            t = t_max_x;
            t_max_x += t_delta_x;
        } else if t_max_y <= t_max_z {
            gy += step_y;
            t = t_max_y;
            t_max_y += t_delta_y;
        } else {
            gz += step_z;
            t = t_max_z;
            t_max_z += t_delta_z;
        }
    }

    None
}
