//! User tunable view settings, read from `config.toml` in the platform config directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Height of one packing row of the condensed timeline, in pixels.
    pub row_height: f32,
    /// How far the pointer has to move before a press turns into a drag selection.
    pub drag_threshold_px: f32,
    /// Spans are never drawn (or hit tested) narrower than this.
    pub min_rendered_width_px: f32,
    /// Number of equal intervals on the time axis, independent of zoom.
    pub axis_intervals: usize,
    pub zoom: ZoomBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            row_height: 8.0,
            drag_threshold_px: 5.0,
            min_rendered_width_px: 4.0,
            axis_intervals: 10,
            zoom: ZoomBounds::default(),
        }
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        ZoomBounds {
            min: 1.0,
            max: 5.0,
            step: 0.5,
        }
    }
}

impl ViewConfig {
    /// Reads the config at `path`, a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<ViewConfig> {
        if !path.try_exists()? {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(ViewConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<ViewConfig> {
        let config: ViewConfig = toml::from_str(text)?;
        Ok(config.sanitized())
    }

    pub fn load_default_location() -> Result<ViewConfig> {
        match config_file_path() {
            Some(path) => Self::load(&path),
            None => Ok(ViewConfig::default()),
        }
    }

    /// Replaces nonsensical values with defaults so that later arithmetic never divides by zero
    /// or clamps with inverted bounds.
    fn sanitized(mut self) -> ViewConfig {
        let defaults = ViewConfig::default();
        if self.row_height.is_nan() || self.row_height <= 0.0 {
            tracing::warn!("row_height must be positive, using {}", defaults.row_height);
            self.row_height = defaults.row_height;
        }
        if self.drag_threshold_px.is_nan() || self.drag_threshold_px < 0.0 {
            self.drag_threshold_px = defaults.drag_threshold_px;
        }
        if self.min_rendered_width_px.is_nan() || self.min_rendered_width_px < 0.0 {
            self.min_rendered_width_px = defaults.min_rendered_width_px;
        }
        if self.axis_intervals == 0 {
            self.axis_intervals = defaults.axis_intervals;
        }
        let zoom_ok = self.zoom.min > 0.0 && self.zoom.min <= self.zoom.max && self.zoom.step > 0.0;
        if !zoom_ok {
            tracing::warn!("invalid zoom bounds {:?}, using defaults", self.zoom);
            self.zoom = defaults.zoom;
        }
        self
    }
}

fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "traceview", "traceview")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
