//! Projection of face-local chunk meshes onto the sphere.
//!
//! The mesher works in flat (s, t, r) chunk space. Each vertex is bent onto
//! the sphere by interpreting (s/r, t/r) as projective face coordinates,
//! then normals are recomputed flat per triangle from the curved geometry.
//! Near-radial triangles can optionally be pushed outward a few centimeters
//! to close radial cracks between shells.

use glam::Vec3;

use super::MeshData;

/// Radial alignment above which a face counts as "surface" for the push
const SURFACE_PUSH_ALIGNMENT: f32 = 0.8;

/// Bend a chunk-local mesh onto the sphere.
///
/// `s0`, `t0`, `r0` locate the chunk's minimum corner in face-local meters;
/// `right`/`up`/`forward` are the face basis. `surface_push_m` of 0 disables
/// the crack-hiding push.
pub fn project_chunk_mesh(
    mesh: &mut MeshData,
    s0: f64,
    t0: f64,
    r0: f64,
    right: Vec3,
    up: Vec3,
    forward: Vec3,
    surface_push_m: f32,
) {
    for vert in &mut mesh.vertices {
        let s = s0 as f32 + vert.position[0];
        let t = t0 as f32 + vert.position[1];
        let r = r0 as f32 + vert.position[2];
        let (u, v) = if r != 0.0 { (s / r, t / r) } else { (0.0, 0.0) };
        let w = (1.0 - (u * u + v * v)).max(0.0).sqrt();
        let dir = (right * u + up * v + forward * w).normalize();
        let world = dir * r;
        vert.position = world.to_array();
    }

    recompute_flat_normals(mesh, surface_push_m);
}

/// Recompute per-triangle flat normals in place, optionally pushing
/// near-radial triangles outward by `surface_push_m`.
fn recompute_flat_normals(mesh: &mut MeshData, surface_push_m: f32) {
    let indices = &mesh.indices;
    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let mut p0 = Vec3::from_array(mesh.vertices[i0].position);
        let mut p1 = Vec3::from_array(mesh.vertices[i1].position);
        let mut p2 = Vec3::from_array(mesh.vertices[i2].position);
        let mut n = (p1 - p0).cross(p2 - p0).normalize_or_zero();

        if surface_push_m > 0.0 {
            let radial = p0.normalize_or_zero();
            if n.dot(radial).abs() > SURFACE_PUSH_ALIGNMENT {
                let push = radial * surface_push_m;
                p0 += push;
                p1 += push;
                p2 += push;
                mesh.vertices[i0].position = p0.to_array();
                mesh.vertices[i1].position = p1.to_array();
                mesh.vertices[i2].position = p2.to_array();
                n = (p1 - p0).cross(p2 - p0).normalize_or_zero();
            }
        }

        let na = n.to_array();
        mesh.vertices[i0].normal = na;
        mesh.vertices[i1].normal = na;
        mesh.vertices[i2].normal = na;
    }
}
