//! Small math helpers shared by the camera and streaming paths.

use glam::{Mat4, Vec3};

/// Normalize `v`, falling back when it is too short to carry a direction
#[inline]
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len = v.length();
    if len > 1e-5 {
        v / len
    } else {
        fallback
    }
}

/// Rotate `v` about `axis` by `angle` radians (Rodrigues)
pub fn rotate_about_axis(v: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    let n = normalize_or(axis, Vec3::Y);
    let (s, c) = angle.sin_cos();
    v * c + n.cross(v) * s + n * (n.dot(v) * (1.0 - c))
}

/// Right-handed look-at view matrix
#[inline]
pub fn look_at_rh(eye: Vec3, center: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, center, up)
}

/// Right-handed perspective with Vulkan-style [0, 1] depth and flipped Y
pub fn perspective_vk(fovy_rad: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fovy_rad, aspect, near, far);
    // Clip-space Y points down in Vulkan
    proj.y_axis.y *= -1.0;
    proj
}
