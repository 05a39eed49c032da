//! Typed application configuration.
//!
//! The streaming core consumes these values; parsing lives here behind a
//! small TOML loader so a broken file never reaches the runtime. Loading
//! falls back to the last valid config (or defaults) on any error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{pool, streaming};
use crate::error::{EngineError, EngineResult};
use crate::planet::PlanetConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // Camera
    pub invert_mouse_x: bool,
    pub invert_mouse_y: bool,
    pub cam_sensitivity: f32,
    pub cam_speed: f32,
    pub fov_deg: f32,
    pub near_m: f32,
    pub far_m: f32,

    // Walk mode
    pub walk_mode: bool,
    pub eye_height_m: f32,
    pub walk_speed: f32,
    pub walk_pitch_max_deg: f32,
    pub walk_surface_bias_m: f32,
    pub surface_push_m: f32,

    // Streaming
    pub ring_radius: i32,
    pub prune_margin: i32,
    pub k_down: i32,
    pub k_up: i32,
    pub k_prune_margin: i32,
    pub face_keep_time_s: f32,
    pub stream_cone_deg: f32,
    pub uploads_per_frame_limit: usize,
    pub remesh_per_frame_cap: usize,
    /// 0 = use available hardware parallelism
    pub loader_threads: usize,

    // Pools
    pub device_local_enabled: bool,
    pub pool_vtx_mb: usize,
    pub pool_idx_mb: usize,

    // Persistence
    pub save_chunks_enabled: bool,
    pub region_root: PathBuf,

    // Telemetry
    pub log_stream: bool,
    pub log_pool: bool,
    pub debug_chunk_keys: bool,
    pub profile_csv_enabled: bool,
    pub profile_csv_path: PathBuf,

    // Planet
    pub planet: PlanetConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            invert_mouse_x: true,
            invert_mouse_y: false,
            cam_sensitivity: 0.0025,
            cam_speed: 12.0,
            fov_deg: 60.0,
            near_m: 0.1,
            far_m: 300.0,

            walk_mode: false,
            eye_height_m: 1.7,
            walk_speed: 6.0,
            walk_pitch_max_deg: 60.0,
            walk_surface_bias_m: 1.0,
            surface_push_m: 0.0,

            ring_radius: streaming::DEFAULT_RING_RADIUS,
            prune_margin: streaming::DEFAULT_PRUNE_MARGIN,
            k_down: streaming::DEFAULT_K_DOWN,
            k_up: streaming::DEFAULT_K_UP,
            k_prune_margin: streaming::DEFAULT_K_PRUNE_MARGIN,
            face_keep_time_s: streaming::DEFAULT_FACE_KEEP_TIME_S,
            stream_cone_deg: streaming::DEFAULT_STREAM_CONE_DEG,
            uploads_per_frame_limit: streaming::DEFAULT_UPLOADS_PER_FRAME,
            remesh_per_frame_cap: streaming::DEFAULT_REMESH_PER_FRAME,
            loader_threads: 0,

            device_local_enabled: true,
            pool_vtx_mb: pool::DEFAULT_VTX_MB,
            pool_idx_mb: pool::DEFAULT_IDX_MB,

            save_chunks_enabled: false,
            region_root: PathBuf::from("regions"),

            log_stream: false,
            log_pool: false,
            debug_chunk_keys: false,
            profile_csv_enabled: false,
            profile_csv_path: PathBuf::from("profile.csv"),

            planet: PlanetConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a TOML config file. Any error yields `None`; callers keep
    /// their previous config.
    pub fn load(path: &Path) -> Option<AppConfig> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                log::debug!("[config] {} not readable: {}", path.display(), err);
                return None;
            }
        };
        match toml::from_str::<AppConfig>(&text) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                log::warn!("[config] parse failure in {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> bool {
        let text = match toml::to_string_pretty(self) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("[config] serialize failure: {}", err);
                return false;
            }
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                let _ = fs::create_dir_all(dir);
            }
        }
        match fs::write(path, text) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("[config] write failure for {}: {}", path.display(), err);
                false
            }
        }
    }

    /// Reject configs the streaming core cannot run with
    pub fn validate(&self) -> EngineResult<()> {
        if self.ring_radius < 0 {
            return Err(EngineError::invalid_config(
                "ring_radius",
                self.ring_radius,
                "must be non-negative",
            ));
        }
        if self.k_down < 0 || self.k_up < 0 {
            return Err(EngineError::invalid_config(
                "k_down/k_up",
                format!("{}/{}", self.k_down, self.k_up),
                "shell bounds must be non-negative",
            ));
        }
        if self.uploads_per_frame_limit == 0 {
            return Err(EngineError::invalid_config(
                "uploads_per_frame_limit",
                self.uploads_per_frame_limit,
                "must be at least 1",
            ));
        }
        if self.pool_vtx_mb == 0 || self.pool_idx_mb == 0 {
            return Err(EngineError::invalid_config(
                "pool_vtx_mb/pool_idx_mb",
                format!("{}/{}", self.pool_vtx_mb, self.pool_idx_mb),
                "pools need capacity",
            ));
        }
        if self.planet.voxel_size_m <= 0.0 || self.planet.radius_m <= 0.0 {
            return Err(EngineError::invalid_config(
                "planet",
                format!(
                    "radius {} voxel {}",
                    self.planet.radius_m, self.planet.voxel_size_m
                ),
                "radius and voxel size must be positive",
            ));
        }
        Ok(())
    }

}

/// Owns the active config plus the path it round-trips through
pub struct AppConfigManager {
    active: AppConfig,
    path: Option<PathBuf>,
}

impl AppConfigManager {
    pub fn new(initial: AppConfig) -> Self {
        Self {
            active: initial,
            path: None,
        }
    }

    pub fn set_config_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn active(&self) -> &AppConfig {
        &self.active
    }

    /// Fold runtime-mutated state back into the active config
    pub fn adopt_runtime_state(&mut self, cfg: AppConfig) {
        self.active = cfg;
    }

    /// Re-read the config file. Keeps the current config when the file is
    /// missing or malformed; returns whether anything was applied.
    pub fn reload(&mut self) -> bool {
        let Some(path) = self.path.clone() else {
            return false;
        };
        match AppConfig::load(&path) {
            Some(cfg) => {
                self.active = cfg;
                log::info!("[config] reloaded {}", path.display());
                true
            }
            None => false,
        }
    }

    pub fn save_active(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        self.active.save(path)
    }
}
