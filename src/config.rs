use serde::{Deserialize, Serialize};

/// Tuning values for light falloff and visibility sampling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightingConfig {
    /// Attenuation factor below which a light no longer counts as reaching
    /// a point. Bounds the visibility and shine window of inverse and
    /// realistic lights: 0.04 gives `radius * 25` and `radius * 5`.
    #[serde(default = "default_cutoff")]
    pub cutoff: f32,
    /// Search radius used for lights without attenuation.
    #[serde(default = "default_unbounded_radius")]
    pub unbounded_radius: f32,
    /// Offset of the four corner samples from a ground cell center, as a
    /// fraction of the cell size.
    #[serde(default = "default_sample_spread")]
    pub sample_spread: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            unbounded_radius: default_unbounded_radius(),
            sample_spread: default_sample_spread(),
        }
    }
}

fn default_cutoff() -> f32 {
    0.04
}

fn default_unbounded_radius() -> f32 {
    1.0e4
}

fn default_sample_spread() -> f32 {
    0.4
}

/// Default projection and scan settings for new views.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Pixels per world unit on every axis; `None` uses `height / 16`.
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default = "default_skew")]
    pub x_skew: f32,
    #[serde(default = "default_skew")]
    pub z_skew: f32,
    /// World heights that may hold visible sprites, used to widen the scan.
    #[serde(default = "default_min_height")]
    pub min_height: f32,
    #[serde(default = "default_max_height")]
    pub max_height: f32,
    /// Camera distance of the fake perspective camera, in view heights.
    #[serde(default = "default_camera_depth")]
    pub camera_depth: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            scale: None,
            x_skew: default_skew(),
            z_skew: default_skew(),
            min_height: default_min_height(),
            max_height: default_max_height(),
            camera_depth: default_camera_depth(),
        }
    }
}

fn default_skew() -> f32 {
    0.5
}

fn default_min_height() -> f32 {
    -1.0
}

fn default_max_height() -> f32 {
    10.0
}

fn default_camera_depth() -> f32 {
    8.0
}

/// Engine wide configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub lighting: LightingConfig,
    #[serde(default)]
    pub view: ViewConfig,
}
