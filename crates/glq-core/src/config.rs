use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level configuration, loaded from glq.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlqConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub context: ContextAttributes,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Records preallocated by the command queue
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    /// Hard maximum; reaching it forces a flush
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
    /// Frame handoffs that may be queued to the render thread before the
    /// control plane blocks
    #[serde(default = "default_frames_in_flight")]
    pub max_frames_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Who owns the surface the execution plane draws into
    #[serde(default)]
    pub mode: SurfaceMode,
    /// Where a shared surface sits relative to the host's own content
    #[serde(default)]
    pub layer: HostLayer,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

/// Surface ownership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceMode {
    /// The execution plane owns offscreen render/display surfaces (default)
    #[default]
    #[serde(rename = "exclusive")]
    Exclusive,
    /// The execution plane draws into a surface owned by a host frame loop
    #[serde(rename = "shared")]
    Shared,
}

/// Stacking of a shared surface in the host scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostLayer {
    /// Drawn behind host content; each host frame clears color, depth and
    /// stencil (default)
    #[default]
    #[serde(rename = "background")]
    Background,
    /// Drawn over host content; the host's color must survive, so only
    /// depth and stencil are cleared
    #[serde(rename = "foreground")]
    Foreground,
}

/// Attributes requested when the context is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAttributes {
    #[serde(default = "default_true")]
    pub alpha: bool,
    #[serde(default = "default_true")]
    pub depth: bool,
    #[serde(default)]
    pub stencil: bool,
    #[serde(default = "default_true")]
    pub antialias: bool,
    #[serde(default = "default_true")]
    pub premultiplied_alpha: bool,
    #[serde(default)]
    pub preserve_drawing_buffer: bool,
    #[serde(default = "default_max_samples")]
    pub max_samples: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Poll the driver error state after every dispatched record
    #[serde(default)]
    pub poll_errors_per_command: bool,
    /// Minimum window for frame-rate accounting
    #[serde(default = "default_fps_interval_ms")]
    pub fps_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            max_capacity: default_max_capacity(),
            max_frames_in_flight: default_frames_in_flight(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            mode: SurfaceMode::default(),
            layer: HostLayer::default(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            depth: true,
            stencil: false,
            antialias: true,
            premultiplied_alpha: true,
            preserve_drawing_buffer: false,
            max_samples: default_max_samples(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            poll_errors_per_command: false,
            fps_interval_ms: default_fps_interval_ms(),
        }
    }
}

impl ContextAttributes {
    /// Content authored without premultiplied alpha needs an extra pass
    /// before it can be composited.
    pub fn multiply_alpha(&self) -> bool {
        self.alpha && !self.premultiplied_alpha
    }
}

impl GlqConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn to_toml(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::ConfigError(e.to_string()))
    }
}

/// Returns the default config file path.
/// Search order:
/// 1. `GLQ_CONFIG` environment variable
/// 2. System-wide config: `/etc/glq/glq.toml`
/// 3. Local fallback: `./glq.toml`
pub fn default_config_path() -> String {
    if let Ok(path) = std::env::var("GLQ_CONFIG") {
        return path;
    }
    let system_path = "/etc/glq/glq.toml";
    if std::path::Path::new(system_path).exists() {
        return system_path.to_string();
    }
    "glq.toml".to_string()
}

fn default_initial_capacity() -> usize {
    256
}

fn default_max_capacity() -> usize {
    1_000_000
}

fn default_frames_in_flight() -> usize {
    2
}

fn default_width() -> u32 {
    300
}

fn default_height() -> u32 {
    150
}

fn default_max_samples() -> u32 {
    4
}

fn default_fps_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}
