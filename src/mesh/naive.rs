//! Per-voxel reference mesher.
//!
//! Emits one quad for every voxel face that borders air or a different
//! material, with no merging. Slower and denser than the greedy mesher;
//! kept for debugging mesh artifacts against a known-simple output.

use crate::world::storage::Chunk64;

use super::MeshData;

/// Mesh a chunk one voxel face at a time
pub fn mesh_chunk_naive(chunk: &Chunk64, out: &mut MeshData, voxel_size_m: f32) {
    out.clear();
    let n = Chunk64::N as i32;
    let s = voxel_size_m;

    // Out-of-chunk cells read as same-material so chunk-edge walls stay hidden
    let same = |mat, x: i32, y: i32, z: i32| -> bool {
        if x < 0 || y < 0 || z < 0 || x >= n || y >= n || z >= n {
            return true;
        }
        let (xu, yu, zu) = (x as usize, y as usize, z as usize);
        chunk.is_solid(xu, yu, zu) && chunk.get_material(xu, yu, zu) == mat
    };

    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let (xu, yu, zu) = (x as usize, y as usize, z as usize);
                if !chunk.is_solid(xu, yu, zu) {
                    continue;
                }
                let mat = chunk.get_material(xu, yu, zu);
                let (fx, fy, fz) = (x as f32 * s, y as f32 * s, z as f32 * s);

                if !same(mat, x - 1, y, z) {
                    out.add_quad(
                        [fx, fy, fz],
                        [0.0, 0.0, 1.0],
                        [0.0, 1.0, 0.0],
                        [-1.0, 0.0, 0.0],
                        s,
                        s,
                        mat.0,
                        false,
                    );
                }
                if !same(mat, x + 1, y, z) {
                    out.add_quad(
                        [fx + s, fy, fz],
                        [0.0, 1.0, 0.0],
                        [0.0, 0.0, 1.0],
                        [1.0, 0.0, 0.0],
                        s,
                        s,
                        mat.0,
                        false,
                    );
                }
                if !same(mat, x, y - 1, z) {
                    out.add_quad(
                        [fx, fy, fz],
                        [1.0, 0.0, 0.0],
                        [0.0, 0.0, 1.0],
                        [0.0, -1.0, 0.0],
                        s,
                        s,
                        mat.0,
                        false,
                    );
                }
                if !same(mat, x, y + 1, z) {
                    out.add_quad(
                        [fx, fy + s, fz],
                        [0.0, 0.0, 1.0],
                        [1.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0],
                        s,
                        s,
                        mat.0,
                        false,
                    );
                }
                if !same(mat, x, y, z - 1) {
                    out.add_quad(
                        [fx, fy, fz],
                        [0.0, 1.0, 0.0],
                        [1.0, 0.0, 0.0],
                        [0.0, 0.0, -1.0],
                        s,
                        s,
                        mat.0,
                        false,
                    );
                }
                if !same(mat, x, y, z + 1) {
                    out.add_quad(
                        [fx, fy, fz + s],
                        [1.0, 0.0, 0.0],
                        [0.0, 1.0, 0.0],
                        [0.0, 0.0, 1.0],
                        s,
                        s,
                        mat.0,
                        false,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::core::MaterialId;

    #[test]
    fn test_single_voxel_six_faces() {
        let mut c = Chunk64::new();
        c.set_voxel(10, 10, 10, MaterialId::ROCK);
        let mut m = MeshData::default();
        mesh_chunk_naive(&c, &mut m, 1.0);
        assert_eq!(m.vertices.len(), 24);
        assert_eq!(m.indices.len(), 36);
    }

    #[test]
    fn test_material_seam_emits_walls() {
        // Unlike the greedy mesher, the naive mesher draws the wall between
        // two different solid materials
        let mut c = Chunk64::new();
        c.set_voxel(10, 10, 10, MaterialId::ROCK);
        c.set_voxel(11, 10, 10, MaterialId::DIRT);
        let mut m = MeshData::default();
        mesh_chunk_naive(&c, &mut m, 1.0);
        assert_eq!(m.vertices.len() / 4, 12, "two voxels x six faces");
    }

    #[test]
    fn test_chunk_border_suppressed() {
        let mut c = Chunk64::new();
        c.set_voxel(0, 0, 0, MaterialId::ROCK);
        let mut m = MeshData::default();
        mesh_chunk_naive(&c, &mut m, 1.0);
        // Corner voxel: three faces against the border are hidden
        assert_eq!(m.vertices.len() / 4, 3);
    }
}
