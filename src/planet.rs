//! Cubed-sphere planet model and procedural base sampler.
//!
//! Six planar charts parameterize the sphere. Each face carries a fixed
//! (right, up, forward) basis; chunk keys live in face-local tangent
//! coordinates plus a radial shell. The base sampler is pure in
//! `(config, voxel)` so chunks can be regenerated bit-identically.

use glam::{I64Vec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::core::CHUNK_SIZE;
use crate::noise::fbm;
use crate::world::core::{BaseSample, FaceChunkKey, MaterialId};

/// Immutable per-session planet parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    /// Planet radius in meters
    pub radius_m: f64,
    /// Edge length of one voxel in meters
    pub voxel_size_m: f64,
    /// Radius below which basins fill with water
    pub sea_level_m: f64,
    /// World seed
    pub seed: u32,
    /// Peak terrain elevation in meters
    pub terrain_amp_m: f64,
    /// Terrain FBM parameters
    pub terrain_octaves: u32,
    pub terrain_lacunarity: f32,
    pub terrain_gain: f32,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            radius_m: 1150.0,
            voxel_size_m: 0.10,
            sea_level_m: 1135.0,
            seed: 1337,
            terrain_amp_m: 40.0,
            terrain_octaves: 5,
            terrain_lacunarity: 2.0,
            terrain_gain: 0.5,
        }
    }
}

impl PlanetConfig {
    /// Chunk edge length in meters
    #[inline]
    pub fn chunk_m(&self) -> f64 {
        CHUNK_SIZE as f64 * self.voxel_size_m
    }
}

// Cube face axes (right, up, forward) for faces +X, -X, +Y, -Y, +Z, -Z
const FACE_RIGHT: [Vec3; 6] = [
    Vec3::new(0.0, 0.0, -1.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(-1.0, 0.0, 0.0),
];
const FACE_UP: [Vec3; 6] = [
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
];
const FACE_FORWARD: [Vec3; 6] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(-1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(0.0, 0.0, -1.0),
];

/// (right, up, forward) basis of a cube face
#[inline]
pub fn face_basis(face: u8) -> (Vec3, Vec3, Vec3) {
    let f = face as usize;
    (FACE_RIGHT[f], FACE_UP[f], FACE_FORWARD[f])
}

/// Map a direction to the cube face whose forward axis dominates it
pub fn face_from_direction(d: Vec3) -> u8 {
    let a = d.abs();
    if a.x >= a.y && a.x >= a.z {
        if d.x >= 0.0 {
            0
        } else {
            1
        }
    } else if a.y >= a.x && a.y >= a.z {
        if d.y >= 0.0 {
            2
        } else {
            3
        }
    } else if d.z >= 0.0 {
        4
    } else {
        5
    }
}

/// Unit direction for face-local uv in [-1, 1]^2
pub fn direction_from_face_uv(face: u8, u: f32, v: f32) -> Vec3 {
    let (right, up, forward) = face_basis(face);
    (forward + right * u + up * v).normalize()
}

/// Inverse of [`direction_from_face_uv`]: owning face plus projective uv.
/// Returns `None` for directions grazing the face edge (|cos| ~ 0).
pub fn face_uv_from_direction(dir: Vec3) -> Option<(u8, f32, f32)> {
    let face = face_from_direction(dir);
    let (right, up, forward) = face_basis(face);
    let cf = dir.dot(forward);
    if cf.abs() < 1e-8 {
        return None;
    }
    Some((face, dir.dot(right) / cf, dir.dot(up) / cf))
}

/// Direction on the unit sphere for latitude/longitude in radians
pub fn direction_from_lat_lon(lat_rad: f64, lon_rad: f64) -> Vec3 {
    let (cl, sl) = (lat_rad.cos() as f32, lat_rad.sin() as f32);
    let (co, so) = (lon_rad.cos() as f32, lon_rad.sin() as f32);
    Vec3::new(cl * co, sl, cl * so).normalize()
}

/// Integer voxel index at (lat, lon, height above radius)
pub fn voxel_from_lat_lon_h(cfg: &PlanetConfig, lat_rad: f64, lon_rad: f64, height_m: f64) -> I64Vec3 {
    let dir = direction_from_lat_lon(lat_rad, lon_rad);
    let r = cfg.radius_m + height_m;
    let p = dir.as_dvec3() * r;
    I64Vec3::new(
        (p.x / cfg.voxel_size_m).round() as i64,
        (p.y / cfg.voxel_size_m).round() as i64,
        (p.z / cfg.voxel_size_m).round() as i64,
    )
}

/// Latitude/longitude/height of an integer voxel
pub fn lat_lon_h_from_voxel(cfg: &PlanetConfig, voxel: I64Vec3) -> (f64, f64, f64) {
    let p = voxel.as_dvec3() * cfg.voxel_size_m;
    let r = p.length();
    if r <= 0.0 {
        return (0.0, 0.0, -cfg.radius_m);
    }
    let d = p / r;
    (d.y.asin(), d.z.atan2(d.x), r - cfg.radius_m)
}

/// Chunk key owning an integer voxel position
pub fn face_chunk_from_voxel(cfg: &PlanetConfig, voxel: I64Vec3, chunk_vox: usize) -> FaceChunkKey {
    let p = voxel.as_dvec3() * cfg.voxel_size_m;
    let r = p.length();
    let d = if r > 0.0 {
        (p / r).as_vec3()
    } else {
        Vec3::X
    };
    let face = face_from_direction(d);
    let (right, up, _forward) = face_basis(face);
    let s = p.dot(right.as_dvec3());
    let t = p.dot(up.as_dvec3());
    let chunk_m = chunk_vox as f64 * cfg.voxel_size_m;
    FaceChunkKey {
        face,
        i: (s / chunk_m).floor() as i64,
        j: (t / chunk_m).floor() as i64,
        k: (r / chunk_m).floor() as i64,
    }
}

/// World voxel index sampled by chunk-local (x, y, z) of `key`.
///
/// Mirrors the generation recipe: face-local (s, t, r) at the voxel center
/// map through projective coordinates onto the sphere, then quantize.
pub fn voxel_from_face_local(
    cfg: &PlanetConfig,
    key: &FaceChunkKey,
    x: usize,
    y: usize,
    z: usize,
) -> I64Vec3 {
    let chunk_m = cfg.chunk_m();
    let s = key.i as f64 * chunk_m + (x as f64 + 0.5) * cfg.voxel_size_m;
    let t = key.j as f64 * chunk_m + (y as f64 + 0.5) * cfg.voxel_size_m;
    let r = key.k as f64 * chunk_m + (z as f64 + 0.5) * cfg.voxel_size_m;
    let (right, up, forward) = face_basis(key.face);
    let u = (s / r) as f32;
    let v = (t / r) as f32;
    let w = (1.0 - (u * u + v * v)).max(0.0).sqrt();
    let dir = (right * u + up * v + forward * w).normalize();
    let p = dir.as_dvec3() * r;
    I64Vec3::new(
        (p.x / cfg.voxel_size_m).round() as i64,
        (p.y / cfg.voxel_size_m).round() as i64,
        (p.z / cfg.voxel_size_m).round() as i64,
    )
}

/// Terrain elevation above `radius_m` along `direction`, in meters
pub fn terrain_height_m(cfg: &PlanetConfig, direction: Vec3) -> f64 {
    let (u, v) = match face_uv_from_direction(direction) {
        Some((_, u, v)) => (u, v),
        None => (0.0, 0.0),
    };
    let elev = fbm(
        Vec3::new(u * 128.0, v * 128.0, 0.0),
        cfg.terrain_octaves,
        cfg.terrain_lacunarity,
        cfg.terrain_gain,
        cfg.seed,
    );
    cfg.terrain_amp_m * ((elev + 1.0) * 0.5) as f64
}

/// Sample the procedural base world at an integer voxel position.
///
/// Layering, outermost first: air above the terrain surface, a thin water
/// band above sea level, carved cave air, a 2 m dirt skin, rock below.
pub fn sample_base(cfg: &PlanetConfig, voxel: I64Vec3) -> BaseSample {
    let pos_m = voxel.as_dvec3().as_vec3() * cfg.voxel_size_m as f32;
    let r = pos_m.length();

    let dir = if r > 0.0 { pos_m / r } else { Vec3::Y };
    let surface_r = cfg.radius_m + terrain_height_m(cfg, dir);

    if (r as f64) > surface_r {
        return BaseSample {
            material: MaterialId::AIR,
            density: -1.0,
        };
    }

    if (r as f64) > cfg.sea_level_m && (surface_r - r as f64) < 5.0 {
        return BaseSample {
            material: MaterialId::WATER,
            density: 1.0,
        };
    }

    // Carved cave air from sparse 3D FBM, kept clear of the surface skin
    let cave = fbm(pos_m * 0.05, 4, 2.2, 0.5, cfg.seed.wrapping_add(777));
    if cave > 0.35 && (r as f64) < surface_r - 3.0 {
        return BaseSample {
            material: MaterialId::AIR,
            density: -0.5,
        };
    }

    if surface_r - (r as f64) < 2.0 {
        BaseSample {
            material: MaterialId::DIRT,
            density: 1.0,
        }
    } else {
        BaseSample {
            material: MaterialId::ROCK,
            density: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_from_axis_directions() {
        assert_eq!(face_from_direction(Vec3::X), 0);
        assert_eq!(face_from_direction(-Vec3::X), 1);
        assert_eq!(face_from_direction(Vec3::Y), 2);
        assert_eq!(face_from_direction(-Vec3::Y), 3);
        assert_eq!(face_from_direction(Vec3::Z), 4);
        assert_eq!(face_from_direction(-Vec3::Z), 5);
    }

    #[test]
    fn test_face_uv_roundtrip() {
        // face_from_direction(direction_from_face_uv(f, u, v)) == f for |u|,|v| < 1
        for face in 0..6u8 {
            for &u in &[-0.9f32, -0.4, 0.0, 0.3, 0.85] {
                for &v in &[-0.8f32, -0.1, 0.0, 0.5, 0.9] {
                    let dir = direction_from_face_uv(face, u, v);
                    assert_eq!(face_from_direction(dir), face, "u={} v={}", u, v);
                    let (f2, u2, v2) = face_uv_from_direction(dir).unwrap();
                    assert_eq!(f2, face);
                    assert!((u2 - u).abs() < 1e-4, "u {} vs {}", u2, u);
                    assert!((v2 - v).abs() < 1e-4, "v {} vs {}", v2, v);
                }
            }
        }
    }

    #[test]
    fn test_face_basis_orthonormal() {
        for face in 0..6u8 {
            let (right, up, forward) = face_basis(face);
            assert!(right.dot(up).abs() < 1e-6);
            assert!(right.dot(forward).abs() < 1e-6);
            assert!(up.dot(forward).abs() < 1e-6);
            // the chart axes span the face plane; forward is its normal
            assert!(right.cross(up).dot(forward).abs() > 1.0 - 1e-6, "face {}", face);
        }
    }

    #[test]
    fn test_sample_base_pure() {
        let cfg = PlanetConfig::default();
        let v = I64Vec3::new(11400, 120, -300);
        assert_eq!(sample_base(&cfg, v), sample_base(&cfg, v));
    }

    #[test]
    fn test_sample_base_air_far_above_surface() {
        let cfg = PlanetConfig::default();
        // 2x radius is far above any terrain
        let r_vox = (2.0 * cfg.radius_m / cfg.voxel_size_m) as i64;
        let s = sample_base(&cfg, I64Vec3::new(r_vox, 0, 0));
        assert_eq!(s.material, MaterialId::AIR);
        assert!(s.density < 0.0);
    }

    #[test]
    fn test_sample_base_rock_at_depth() {
        let cfg = PlanetConfig::default();
        // Half the radius is deep interior; caves are possible, so accept
        // rock or carved air but never water or dirt.
        let r_vox = (0.5 * cfg.radius_m / cfg.voxel_size_m) as i64;
        let s = sample_base(&cfg, I64Vec3::new(0, r_vox, 0));
        assert!(
            s.material == MaterialId::ROCK || s.material == MaterialId::AIR,
            "unexpected {:?}",
            s.material
        );
    }

    #[test]
    fn test_voxel_latlon_roundtrip() {
        let cfg = PlanetConfig::default();
        let v = voxel_from_lat_lon_h(&cfg, 0.4, -1.2, 10.0);
        let (lat, lon, h) = lat_lon_h_from_voxel(&cfg, v);
        assert!((lat - 0.4).abs() < 1e-3);
        assert!((lon + 1.2).abs() < 1e-3);
        assert!((h - 10.0).abs() < 0.2);
    }

    #[test]
    fn test_face_chunk_from_voxel_shell() {
        let cfg = PlanetConfig::default();
        // Straight out the +X axis at the surface
        let r_vox = (cfg.radius_m / cfg.voxel_size_m) as i64;
        let key = face_chunk_from_voxel(&cfg, I64Vec3::new(r_vox, 0, 0), CHUNK_SIZE);
        assert_eq!(key.face, 0);
        let expected_k = (cfg.radius_m / cfg.chunk_m()).floor() as i64;
        assert_eq!(key.k, expected_k);
    }
}
