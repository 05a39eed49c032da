//! Greedy per-axis sweep mesher with six-neighbor awareness.
//!
//! For every axis the mesher walks the N+1 planes between voxel layers,
//! builds a mask of exposed faces (material + facing sign), merges equal
//! cells into maximal rectangles, and emits one quad per rectangle. Cells
//! just outside the chunk are resolved through the neighbor chunks; a
//! missing neighbor reads as same-material so interior walls between
//! not-yet-loaded chunks stay suppressed.

use crate::world::core::MaterialId;
use crate::world::storage::Chunk64;

use super::MeshData;

const N: i32 = Chunk64::N as i32;

/// The six face-adjacent chunks, in -x, +x, -y, +y, -z, +z order
#[derive(Clone, Copy, Default)]
pub struct ChunkNeighbors<'a> {
    pub neg_x: Option<&'a Chunk64>,
    pub pos_x: Option<&'a Chunk64>,
    pub neg_y: Option<&'a Chunk64>,
    pub pos_y: Option<&'a Chunk64>,
    pub neg_z: Option<&'a Chunk64>,
    pub pos_z: Option<&'a Chunk64>,
}

/// Mask cell: exposed face material plus facing sign (+1 toward +axis)
type MaskCell = Option<(MaterialId, i8)>;

/// Solidity + material of a cell that may live one chunk over.
/// `None` means the cell is outside every available chunk.
#[inline]
fn sample_cell(
    chunk: &Chunk64,
    neighbors: &ChunkNeighbors<'_>,
    x: i32,
    y: i32,
    z: i32,
) -> Option<(bool, MaterialId)> {
    let (target, lx, ly, lz) = if x < 0 {
        (neighbors.neg_x, x + N, y, z)
    } else if x >= N {
        (neighbors.pos_x, x - N, y, z)
    } else if y < 0 {
        (neighbors.neg_y, x, y + N, z)
    } else if y >= N {
        (neighbors.pos_y, x, y - N, z)
    } else if z < 0 {
        (neighbors.neg_z, x, y, z + N)
    } else if z >= N {
        (neighbors.pos_z, x, y, z - N)
    } else {
        let (xu, yu, zu) = (x as usize, y as usize, z as usize);
        return Some((chunk.is_solid(xu, yu, zu), chunk.get_material(xu, yu, zu)));
    };
    target.map(|c| {
        let (xu, yu, zu) = (lx as usize, ly as usize, lz as usize);
        (c.is_solid(xu, yu, zu), c.get_material(xu, yu, zu))
    })
}

/// Greedy-mesh one chunk without neighbor context. Chunk-border faces are
/// suppressed, matching a fully surrounded chunk.
pub fn mesh_chunk_greedy(chunk: &Chunk64, out: &mut MeshData, voxel_size_m: f32) {
    mesh_chunk_greedy_neighbors(chunk, &ChunkNeighbors::default(), out, voxel_size_m);
}

/// Greedy-mesh one chunk against its six (possibly missing) neighbors
pub fn mesh_chunk_greedy_neighbors(
    chunk: &Chunk64,
    neighbors: &ChunkNeighbors<'_>,
    out: &mut MeshData,
    voxel_size_m: f32,
) {
    out.clear();
    let s = voxel_size_m;

    let mut mask: Vec<MaskCell> = vec![None; (N * N) as usize];
    let mut taken = vec![false; (N * N) as usize];

    for axis in 0..3 {
        // Sweep the N+1 planes between layers along this axis
        for d in 0..=N {
            build_mask(chunk, neighbors, axis, d, &mut mask);
            taken.fill(false);
            merge_and_emit(&mask, &mut taken, axis, d, s, out);
        }
    }
}

fn build_mask(
    chunk: &Chunk64,
    neighbors: &ChunkNeighbors<'_>,
    axis: usize,
    d: i32,
    mask: &mut [MaskCell],
) {
    for v in 0..N {
        for u in 0..N {
            // Cells on either side of the plane
            let (ax, ay, az, bx, by, bz) = match axis {
                0 => (d - 1, v, u, d, v, u),
                1 => (u, d - 1, v, u, d, v),
                _ => (u, v, d - 1, u, v, d),
            };

            let a = sample_cell(chunk, neighbors, ax, ay, az);
            let b = sample_cell(chunk, neighbors, bx, by, bz);

            // A face exists only where solidity flips; a side outside every
            // loaded chunk mirrors the other side, hiding the seam.
            let cell = match (a, b) {
                (Some((a_sol, a_mat)), Some((b_sol, b_mat))) => {
                    if a_sol != b_sol {
                        if a_sol {
                            Some((a_mat, 1i8))
                        } else {
                            Some((b_mat, -1i8))
                        }
                    } else {
                        None
                    }
                }
                _ => None,
            };
            mask[(u + v * N) as usize] = cell;
        }
    }
}

fn merge_and_emit(
    mask: &[MaskCell],
    taken: &mut [bool],
    axis: usize,
    d: i32,
    s: f32,
    out: &mut MeshData,
) {
    for v in 0..N {
        let mut u = 0;
        while u < N {
            let idx = (u + v * N) as usize;
            let Some(cell) = mask[idx] else {
                u += 1;
                continue;
            };
            if taken[idx] {
                u += 1;
                continue;
            }

            // Widen along u
            let mut w = 1;
            while u + w < N {
                let i2 = (u + w + v * N) as usize;
                if taken[i2] || mask[i2] != Some(cell) {
                    break;
                }
                w += 1;
            }
            // Then grow along v while every column matches
            let mut h = 1;
            'grow: while v + h < N {
                for x in 0..w {
                    let i2 = (u + x + (v + h) * N) as usize;
                    if taken[i2] || mask[i2] != Some(cell) {
                        break 'grow;
                    }
                }
                h += 1;
            }
            for y in 0..h {
                for x in 0..w {
                    taken[(u + x + (v + y) * N) as usize] = true;
                }
            }

            let (mat, sign) = cell;
            emit_quad(out, axis, d, u, v, w, h, s, mat, sign);
            u += w;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn emit_quad(
    out: &mut MeshData,
    axis: usize,
    d: i32,
    u: i32,
    v: i32,
    w: i32,
    h: i32,
    s: f32,
    mat: MaterialId,
    sign: i8,
) {
    let plane = d as f32 * s;
    let (origin, udir, vdir, normal, flip) = match axis {
        0 => (
            [plane, v as f32 * s, u as f32 * s],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 0.0],
            [f32::from(sign), 0.0, 0.0],
            sign > 0,
        ),
        1 => (
            [u as f32 * s, plane, v as f32 * s],
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, f32::from(sign), 0.0],
            sign > 0,
        ),
        _ => (
            [u as f32 * s, v as f32 * s, plane],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, f32::from(sign)],
            sign < 0,
        ),
    };
    out.add_quad(
        origin,
        udir,
        vdir,
        normal,
        w as f32 * s,
        h as f32 * s,
        mat.0,
        flip,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_chunk(mat: MaterialId) -> Chunk64 {
        let mut c = Chunk64::new();
        for z in 0..Chunk64::N {
            for y in 0..Chunk64::N {
                for x in 0..Chunk64::N {
                    c.set_voxel(x, y, z, mat);
                }
            }
        }
        c
    }

    #[test]
    fn test_single_interior_voxel_six_quads() {
        let mut c = Chunk64::new();
        c.set_voxel(31, 30, 29, MaterialId::ROCK);
        let mut m = MeshData::default();
        mesh_chunk_greedy(&c, &mut m, 1.0);
        assert_eq!(m.vertices.len(), 24, "6 quads x 4 vertices");
        assert_eq!(m.indices.len(), 36, "6 quads x 2 triangles");
        assert_eq!(m.triangle_count(), 12);
        assert!(m.vertices.iter().all(|v| v.material == MaterialId::ROCK.0));
    }

    #[test]
    fn test_empty_chunk_empty_mesh() {
        let c = Chunk64::new();
        let mut m = MeshData::default();
        mesh_chunk_greedy(&c, &mut m, 1.0);
        assert!(m.is_empty());
    }

    #[test]
    fn test_all_solid_without_neighbors_is_sealed() {
        // Border faces are suppressed when no neighbor context exists
        let c = solid_chunk(MaterialId::ROCK);
        let mut m = MeshData::default();
        mesh_chunk_greedy(&c, &mut m, 1.0);
        assert!(m.is_empty());
    }

    #[test]
    fn test_all_solid_with_solid_neighbors_is_sealed() {
        let c = solid_chunk(MaterialId::ROCK);
        let n = solid_chunk(MaterialId::ROCK);
        let neighbors = ChunkNeighbors {
            neg_x: Some(&n),
            pos_x: Some(&n),
            neg_y: Some(&n),
            pos_y: Some(&n),
            neg_z: Some(&n),
            pos_z: Some(&n),
        };
        let mut m = MeshData::default();
        mesh_chunk_greedy_neighbors(&c, &neighbors, &mut m, 1.0);
        assert!(m.is_empty());
    }

    #[test]
    fn test_solid_against_empty_neighbor_exposes_border() {
        let c = solid_chunk(MaterialId::ROCK);
        let empty = Chunk64::new();
        let neighbors = ChunkNeighbors {
            pos_x: Some(&empty),
            ..Default::default()
        };
        let mut m = MeshData::default();
        mesh_chunk_greedy_neighbors(&c, &neighbors, &mut m, 1.0);
        // Exactly the +x border wall, merged into one quad
        assert_eq!(m.vertices.len(), 4);
        assert_eq!(m.indices.len(), 6);
        assert!(m
            .vertices
            .iter()
            .all(|v| (v.position[0] - Chunk64::N as f32).abs() < 1e-6));
        assert!(m.vertices.iter().all(|v| v.normal == [1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_greedy_merges_slab() {
        // A 64x1x64 slab yields two big faces (top + bottom), each one quad
        let mut c = Chunk64::new();
        for z in 0..Chunk64::N {
            for x in 0..Chunk64::N {
                c.set_voxel(x, 20, z, MaterialId::DIRT);
            }
        }
        let mut m = MeshData::default();
        mesh_chunk_greedy(&c, &mut m, 1.0);
        assert_eq!(m.vertices.len(), 8, "one merged quad per side");
        assert_eq!(m.indices.len(), 12);
    }

    #[test]
    fn test_material_boundary_no_internal_wall() {
        // Solidity does not flip between two different solid materials
        let mut c = Chunk64::new();
        c.set_voxel(10, 10, 10, MaterialId::ROCK);
        c.set_voxel(11, 10, 10, MaterialId::DIRT);
        let mut m = MeshData::default();
        mesh_chunk_greedy(&c, &mut m, 1.0);
        // 2 voxels: 2x4 side quads + 2 caps = 10 quads
        assert_eq!(m.vertices.len() / 4, 10);
    }

    #[test]
    fn test_voxel_scale_applied() {
        let mut c = Chunk64::new();
        c.set_voxel(4, 4, 4, MaterialId::ROCK);
        let mut m = MeshData::default();
        mesh_chunk_greedy(&c, &mut m, 0.5);
        let max = m
            .vertices
            .iter()
            .map(|v| v.position[0])
            .fold(f32::MIN, f32::max);
        assert!((max - 2.5).abs() < 1e-6);
    }
}
