//! Camera state and integration.
//!
//! Two modes: free flight (yaw/pitch about world axes) and walk mode, where
//! "up" is the radial direction and translation follows great circles over
//! the planet surface. Positions are kept in f64; at a 1+ km radius, f32
//! eye positions visibly jitter.

use glam::{DVec3, Mat4, Vec3};

use crate::config::AppConfig;
use crate::math::{look_at_rh, normalize_or, perspective_vk, rotate_about_axis};
use crate::planet::{terrain_height_m, PlanetConfig};

/// Half a degree shy of straight up/down, the free-look pitch limit
const FREE_PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.017_453_292;

/// Deltas below this are treated as no motion
const MOTION_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, Default)]
pub struct MovementAxes {
    pub forward: f32,
    pub strafe: f32,
    pub vertical: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LookInput {
    pub yaw_delta: f32,
    pub pitch_delta: f32,
}

/// Everything the renderer needs to place the camera for one frame
#[derive(Debug, Clone, Copy)]
pub struct CameraSnapshot {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov_deg: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

/// Per-update camera inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraInput {
    pub dt: f64,
    pub movement: MovementAxes,
    pub look: LookInput,
    pub sprint: bool,
    pub ground_follow: bool,
    pub clamp_pitch: bool,
}

/// Camera pose plus the tunables mirrored from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct CameraState {
    pub position: DVec3,
    pub yaw: f32,
    pub pitch: f32,
    pub walk_mode: bool,
    pub aspect_ratio: f32,

    cam_speed: f32,
    cam_sensitivity: f32,
    invert_mouse_x: bool,
    invert_mouse_y: bool,
    walk_speed: f32,
    walk_pitch_max_deg: f32,
    walk_surface_bias_m: f32,
    eye_height_m: f32,
    fov_deg: f32,
    near_m: f32,
    far_m: f32,
}

impl CameraState {
    pub fn new(cfg: &AppConfig) -> Self {
        let mut state = Self {
            // Spawn just above the surface on the +X face
            position: DVec3::new(cfg.planet.radius_m + 15.0, 12.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
            walk_mode: cfg.walk_mode,
            aspect_ratio: 16.0 / 9.0,
            cam_speed: 12.0,
            cam_sensitivity: 0.0025,
            invert_mouse_x: true,
            invert_mouse_y: false,
            walk_speed: 6.0,
            walk_pitch_max_deg: 60.0,
            walk_surface_bias_m: 1.0,
            eye_height_m: 1.7,
            fov_deg: 60.0,
            near_m: 0.1,
            far_m: 300.0,
        };
        state.apply_config(cfg);
        state
    }

    pub fn apply_config(&mut self, cfg: &AppConfig) {
        self.cam_speed = cfg.cam_speed;
        self.cam_sensitivity = cfg.cam_sensitivity;
        self.invert_mouse_x = cfg.invert_mouse_x;
        self.invert_mouse_y = cfg.invert_mouse_y;
        self.walk_speed = cfg.walk_speed;
        self.walk_pitch_max_deg = cfg.walk_pitch_max_deg;
        self.walk_surface_bias_m = cfg.walk_surface_bias_m;
        self.eye_height_m = cfg.eye_height_m;
        self.fov_deg = cfg.fov_deg;
        self.near_m = cfg.near_m;
        self.far_m = cfg.far_m;
        self.walk_mode = cfg.walk_mode;
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        normalize_or(Vec3::new(cp * cy, sp, cp * sy), Vec3::X)
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        if self.walk_mode {
            normalize_or(self.position.as_vec3(), Vec3::Y)
        } else {
            Vec3::Y
        }
    }

    /// Integrate one update step. Returns true when the pose changed.
    pub fn update(&mut self, input: &CameraInput, planet: &PlanetConfig) -> bool {
        let dt = input.dt.max(0.0);
        let prev_yaw = self.yaw;
        let prev_pitch = self.pitch;
        let prev_pos = self.position;

        let yaw_delta =
            input.look.yaw_delta * self.cam_sensitivity * if self.invert_mouse_x { -1.0 } else { 1.0 };
        let pitch_delta =
            input.look.pitch_delta * self.cam_sensitivity * if self.invert_mouse_y { 1.0 } else { -1.0 };

        if !self.walk_mode {
            self.integrate_free_look(yaw_delta, pitch_delta, input.clamp_pitch);
        } else {
            self.integrate_walk_look(yaw_delta, pitch_delta, input.clamp_pitch);
        }

        self.integrate_translation(input, planet, dt);

        let moved = (self.position - prev_pos).abs().max_element() > MOTION_EPSILON;
        let rotated = (self.yaw - prev_yaw).abs() > MOTION_EPSILON as f32
            || (self.pitch - prev_pitch).abs() > MOTION_EPSILON as f32;
        moved || rotated
    }

    fn integrate_free_look(&mut self, yaw_delta: f32, pitch_delta: f32, clamp_pitch: bool) {
        self.yaw += yaw_delta;
        if self.yaw > std::f32::consts::PI {
            self.yaw -= std::f32::consts::TAU;
        }
        if self.yaw < -std::f32::consts::PI {
            self.yaw += std::f32::consts::TAU;
        }
        self.pitch += pitch_delta;
        if clamp_pitch {
            self.pitch = self.pitch.clamp(-FREE_PITCH_LIMIT, FREE_PITCH_LIMIT);
        }
    }

    /// Walk-mode look: yaw spins the forward vector about the radial up,
    /// pitch tilts it about the tangent right axis, clamped so the camera
    /// cannot pitch past `walk_pitch_max_deg` off the horizon.
    fn integrate_walk_look(&mut self, yaw_delta: f32, pitch_delta: f32, clamp_pitch: bool) {
        let updir = normalize_or(self.position.as_vec3(), Vec3::Y);
        let mut forward = self.forward();

        if yaw_delta != 0.0 {
            forward = rotate_about_axis(forward, updir, yaw_delta).normalize();
        }
        if pitch_delta != 0.0 {
            let right_axis = normalize_or(updir.cross(forward), Vec3::Y);
            let mut candidate = rotate_about_axis(forward, right_axis, pitch_delta).normalize();
            if clamp_pitch {
                let sin_pitch = candidate.dot(updir).clamp(-1.0, 1.0);
                let max_s = self.walk_pitch_max_deg.to_radians().sin();
                if sin_pitch.abs() > max_s {
                    let clamped = sin_pitch.clamp(-max_s, max_s);
                    let tangent = normalize_or(candidate - updir * sin_pitch, forward);
                    let tangent_scale = (1.0 - clamped * clamped).max(0.0).sqrt();
                    candidate = (tangent * tangent_scale + updir * clamped).normalize();
                }
            }
            forward = candidate;
        }

        self.yaw = forward.z.atan2(forward.x);
        self.pitch = forward.y.clamp(-1.0, 1.0).asin();
    }

    fn integrate_translation(&mut self, input: &CameraInput, planet: &PlanetConfig, dt: f64) {
        let forward = self.forward();
        let world_up = self.up();
        let right = normalize_or(forward.cross(world_up), Vec3::Z);

        let sprint_scale = if input.sprint {
            if self.walk_mode {
                2.0
            } else {
                3.0
            }
        } else {
            1.0
        };
        let base_speed = if self.walk_mode {
            self.walk_speed
        } else {
            self.cam_speed
        };
        let step_scale = base_speed * dt as f32 * sprint_scale;

        if !self.walk_mode {
            let mut delta = forward * input.movement.forward
                + right * input.movement.strafe
                + Vec3::Y * input.movement.vertical;
            if delta.length() > 0.0 {
                delta = delta.normalize() * step_scale;
                self.position += delta.as_dvec3();
            }
            return;
        }

        // Tangential step: rotate the position about the sphere so the
        // tangent-arc length equals the step
        let updir = world_up;
        let tangent_forward = normalize_or(forward - updir * forward.dot(updir), right);
        let tangent_right = normalize_or(tangent_forward.cross(updir), Vec3::Y);
        let step =
            tangent_forward * input.movement.forward + tangent_right * input.movement.strafe;
        if step.length() > 0.0 {
            let direction = step.normalize();
            let radius = self.position.length().max(1e-6);
            let angle = (step_scale as f64 / radius) as f32;
            let rotated =
                (updir * angle.cos() + direction * angle.sin()).normalize();
            self.position = rotated.as_dvec3() * radius;
        }

        if input.ground_follow {
            let ndir = normalize_or(self.position.as_vec3(), Vec3::Y);
            let mut surface_r = planet.radius_m + terrain_height_m(planet, ndir);
            if surface_r < planet.sea_level_m {
                surface_r = planet.sea_level_m;
            }
            let target_r =
                surface_r + (self.eye_height_m + self.walk_surface_bias_m) as f64;
            self.position = ndir.as_dvec3() * target_r;
        }
    }

    pub fn snapshot(&self) -> CameraSnapshot {
        let position = self.position.as_vec3();
        let forward = self.forward();
        let up = self.up();
        let view = look_at_rh(position, position + forward, up);
        let projection = perspective_vk(
            self.fov_deg.to_radians(),
            self.aspect_ratio,
            self.near_m,
            self.far_m,
        );
        CameraSnapshot {
            view,
            projection,
            position,
            forward,
            up,
            fov_deg: self.fov_deg,
            near_plane: self.near_m,
            far_plane: self.far_m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_config() -> AppConfig {
        AppConfig {
            walk_mode: true,
            ..Default::default()
        }
    }

    fn zero_input(dt: f64) -> CameraInput {
        CameraInput {
            dt,
            clamp_pitch: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_free_pitch_clamp() {
        let mut cam = CameraState::new(&AppConfig::default());
        // invert_y false maps positive input to negative pitch; drive hard down
        let input = CameraInput {
            dt: 0.016,
            look: LookInput {
                yaw_delta: 0.0,
                pitch_delta: 1e6,
            },
            clamp_pitch: true,
            ..Default::default()
        };
        cam.update(&input, &PlanetConfig::default());
        assert!(cam.pitch >= -FREE_PITCH_LIMIT - 1e-6);
        assert!(cam.pitch.abs() <= FREE_PITCH_LIMIT + 1e-6);
    }

    #[test]
    fn test_free_translation_direction() {
        let mut cam = CameraState::new(&AppConfig::default());
        cam.yaw = 0.0;
        cam.pitch = 0.0;
        let start = cam.position;
        let input = CameraInput {
            dt: 1.0,
            movement: MovementAxes {
                forward: 1.0,
                strafe: 0.0,
                vertical: 0.0,
            },
            clamp_pitch: true,
            ..Default::default()
        };
        cam.update(&input, &PlanetConfig::default());
        let delta = cam.position - start;
        // yaw 0, pitch 0 faces +X; default speed 12 m/s for 1 s
        assert!((delta.x - 12.0).abs() < 1e-3);
        assert!(delta.y.abs() < 1e-6);
        assert!(delta.z.abs() < 1e-6);
    }

    #[test]
    fn test_zero_input_reports_unchanged_in_free_mode() {
        let mut cam = CameraState::new(&AppConfig::default());
        assert!(!cam.update(&zero_input(0.1), &PlanetConfig::default()));
    }

    #[test]
    fn test_walk_ground_follow_radius() {
        // Scenario: drop from 50 m up; one update snaps to the surface stack
        let planet = PlanetConfig::default();
        let cfg = walk_config();
        let mut cam = CameraState::new(&cfg);
        let dir = DVec3::new(1.0, 0.2, -0.3).normalize();
        cam.position = dir * (planet.radius_m + 50.0);

        let mut input = zero_input(0.1);
        input.ground_follow = true;
        cam.update(&input, &planet);

        let ndir = cam.position.normalize().as_vec3();
        let surface = (planet.radius_m + terrain_height_m(&planet, ndir)).max(planet.sea_level_m);
        let expected =
            surface + (cfg.eye_height_m + cfg.walk_surface_bias_m) as f64;
        assert!(
            (cam.position.length() - expected).abs() < 1e-3,
            "|pos| = {}, expected {}",
            cam.position.length(),
            expected
        );
    }

    #[test]
    fn test_walk_step_keeps_radius() {
        let planet = PlanetConfig::default();
        let cfg = walk_config();
        let mut cam = CameraState::new(&cfg);
        cam.position = DVec3::new(planet.radius_m + 10.0, 0.0, 0.0);

        let mut input = zero_input(0.5);
        input.movement.forward = 1.0;
        let r_before = cam.position.length();
        cam.update(&input, &planet);
        // The rotated direction passes through f32, so allow a few 1e-4
        assert!((cam.position.length() - r_before).abs() < 1e-3);
        // Walked 3 m of arc (6 m/s * 0.5 s)
        let arc = (cam.position.normalize().dot(DVec3::X)).acos() * r_before;
        assert!((arc - 3.0).abs() < 0.01, "arc {}", arc);
    }

    #[test]
    fn test_walk_pitch_clamped_to_max() {
        let planet = PlanetConfig::default();
        let cfg = walk_config();
        let mut cam = CameraState::new(&cfg);
        cam.position = DVec3::new(planet.radius_m, 0.0, 0.0);
        // Looking along +Z, tangent to the sphere at +X
        cam.yaw = std::f32::consts::FRAC_PI_2;
        cam.pitch = 0.0;

        let mut input = zero_input(0.016);
        input.look.pitch_delta = 1e5;
        cam.update(&input, &planet);

        let updir = Vec3::X;
        let sin_pitch = cam.forward().dot(updir).abs();
        let max_s = cfg.walk_pitch_max_deg.to_radians().sin();
        assert!(sin_pitch <= max_s + 1e-4);
    }

    #[test]
    fn test_sprint_multipliers() {
        let planet = PlanetConfig::default();
        let mut cam = CameraState::new(&AppConfig::default());
        cam.yaw = 0.0;
        cam.pitch = 0.0;
        let start = cam.position;
        let input = CameraInput {
            dt: 1.0,
            movement: MovementAxes {
                forward: 1.0,
                ..Default::default()
            },
            sprint: true,
            clamp_pitch: true,
            ..Default::default()
        };
        cam.update(&input, &planet);
        // Fly sprint is x3
        assert!(((cam.position - start).length() - 36.0).abs() < 1e-3);
    }
}
