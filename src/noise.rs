//! Deterministic hash-based value noise and FBM.
//!
//! Everything here is a pure function of its inputs and the seed. The region
//! store relies on that: a chunk regenerated on another machine with the same
//! seed must be voxel-identical to one loaded from disk.

use glam::Vec3;

/// 32-bit avalanche mix (xorshift-multiply)
#[inline]
pub fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 17;
    x = x.wrapping_mul(0xED5A_D4BB);
    x ^= x >> 11;
    x = x.wrapping_mul(0xAC4C_1B51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8BAB);
    x ^= x >> 14;
    x
}

/// Combine three lattice coordinates and a seed into one hash
#[inline]
pub fn hash3(x: i32, y: i32, z: i32, seed: u32) -> u32 {
    let mut h = seed;
    h ^= hash_u32((x as u32).wrapping_mul(0x9E37_79B1));
    h ^= hash_u32((y as u32).wrapping_mul(0x85EB_CA77));
    h ^= hash_u32((z as u32).wrapping_mul(0xC2B2_AE3D));
    hash_u32(h)
}

/// Lattice value noise in [-1, 1]
#[inline]
pub fn value_noise(x: i32, y: i32, z: i32, seed: u32) -> f32 {
    (hash3(x, y, z, seed) as f32 / u32::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Trilinearly interpolated value noise at a floating-point position
pub fn value_noise_trilinear(p: Vec3, seed: u32) -> f32 {
    let xi = p.x.floor() as i32;
    let yi = p.y.floor() as i32;
    let zi = p.z.floor() as i32;
    let tx = smoothstep(p.x - xi as f32);
    let ty = smoothstep(p.y - yi as f32);
    let tz = smoothstep(p.z - zi as f32);

    let c000 = value_noise(xi, yi, zi, seed);
    let c100 = value_noise(xi + 1, yi, zi, seed);
    let c010 = value_noise(xi, yi + 1, zi, seed);
    let c110 = value_noise(xi + 1, yi + 1, zi, seed);
    let c001 = value_noise(xi, yi, zi + 1, seed);
    let c101 = value_noise(xi + 1, yi, zi + 1, seed);
    let c011 = value_noise(xi, yi + 1, zi + 1, seed);
    let c111 = value_noise(xi + 1, yi + 1, zi + 1, seed);

    let x00 = lerp(c000, c100, tx);
    let x10 = lerp(c010, c110, tx);
    let x01 = lerp(c001, c101, tx);
    let x11 = lerp(c011, c111, tx);
    let y0 = lerp(x00, x10, ty);
    let y1 = lerp(x01, x11, ty);
    lerp(y0, y1, tz)
}

/// Fractional Brownian motion, normalized to roughly [-1, 1]
pub fn fbm(p: Vec3, octaves: u32, lacunarity: f32, gain: f32, seed: u32) -> f32 {
    let mut amp = 0.5f32;
    let mut freq = 1.0f32;
    let mut sum = 0.0f32;
    let mut norm = 0.0f32;
    for i in 0..octaves {
        sum += amp * value_noise_trilinear(p * freq, seed.wrapping_add(i.wrapping_mul(1013)));
        norm += amp;
        freq *= lacunarity;
        amp *= gain;
    }
    if norm > 0.0 {
        sum / norm
    } else {
        0.0
    }
}
