use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::geometry::Color;
use crate::raster::PageSize;

pub const MIN_ZOOM: f32 = 0.2;
pub const MAX_ZOOM: f32 = 5.0;
pub const ZOOM_STEP: f32 = 0.1;

pub fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

/// How the zoom is chosen. Fit modes follow the display size; any manual zoom change
/// switches back to [`ZoomMode::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZoomMode {
    #[default]
    Custom,
    FitWidth,
    FitPage,
}

impl ZoomMode {
    /// Zoom that fits `page` into a `width` x `height` pixel display. `None` for
    /// [`ZoomMode::Custom`] or when either size is empty.
    pub fn fit(self, page: PageSize, width: f32, height: f32) -> Option<f32> {
        if page.width <= 0.0 || page.height <= 0.0 || width <= 0.0 {
            return None;
        }
        let by_width = width / page.width;
        let zoom = match self {
            ZoomMode::Custom => return None,
            ZoomMode::FitWidth => by_width,
            ZoomMode::FitPage if height > 0.0 => by_width.min(height / page.height),
            ZoomMode::FitPage => return None,
        };
        Some(clamp_zoom(zoom))
    }

    pub fn label(self) -> &'static str {
        match self {
            ZoomMode::Custom => "custom",
            ZoomMode::FitWidth => "fit width",
            ZoomMode::FitPage => "fit page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub zoom: f32,
    /// Starting zoom mode; fit modes take effect once the display size is known.
    pub zoom_mode: ZoomMode,
    /// Vertical space between consecutive pages, in unscaled points.
    pub page_gap: f32,
    pub dark_mode: bool,
    pub lifecycle: LifecycleConfig,
    pub annotation: AnnotationDefaults,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            zoom: 1.2,
            zoom_mode: ZoomMode::Custom,
            page_gap: 10.0,
            dark_mode: false,
            lifecycle: LifecycleConfig::default(),
            annotation: AnnotationDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Soft cap on simultaneously materialized pages.
    pub max_materialized_pages: usize,
    /// Pages up to this many viewport heights outside the visible area are materialized.
    pub proximity_threshold: f32,
    /// Out-of-window pages are evicted during a pass once the materialized count
    /// exceeds this fraction of the cap.
    pub crowding_fraction: f32,
    /// The periodic sweep evicts pages beyond twice the proximity window while the
    /// materialized count exceeds this fraction of the cap.
    pub sweep_fraction: f32,
    pub sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_materialized_pages: 10,
            proximity_threshold: 1.5,
            crowding_fraction: 0.7,
            sweep_fraction: 0.5,
            sweep_interval_secs: 10,
        }
    }
}

impl LifecycleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn crowding_threshold(&self) -> f32 {
        self.max_materialized_pages as f32 * self.crowding_fraction
    }

    pub fn sweep_threshold(&self) -> f32 {
        self.max_materialized_pages as f32 * self.sweep_fraction
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationDefaults {
    pub color: Color,
    pub stroke_width: f32,
    pub alpha: f32,
    pub text_size: f32,
    pub highlight_alpha: f32,
}

impl Default for AnnotationDefaults {
    fn default() -> Self {
        Self {
            color: Color::RED,
            stroke_width: 2.0,
            alpha: 1.0,
            text_size: 14.0,
            highlight_alpha: 0.4,
        }
    }
}

/// Platform directories for configuration, saved annotations and logs.
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "marginalia", "marginalia")
}

impl ViewerConfig {
    /// `config.toml` in the platform configuration directory.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_owned(),
            })
        };
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.zoom) {
            return invalid("zoom", "must be between 0.2 and 5.0");
        }
        if self.page_gap < 0.0 {
            return invalid("page_gap", "must not be negative");
        }
        let lifecycle = &self.lifecycle;
        if lifecycle.max_materialized_pages == 0 {
            return invalid("lifecycle.max_materialized_pages", "must be at least 1");
        }
        if lifecycle.proximity_threshold < 0.0 {
            return invalid("lifecycle.proximity_threshold", "must not be negative");
        }
        for (field, value) in [
            ("lifecycle.crowding_fraction", lifecycle.crowding_fraction),
            ("lifecycle.sweep_fraction", lifecycle.sweep_fraction),
            ("annotation.alpha", self.annotation.alpha),
            ("annotation.highlight_alpha", self.annotation.highlight_alpha),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(field, "must be between 0 and 1");
            }
        }
        if self.annotation.stroke_width <= 0.0 || self.annotation.text_size <= 0.0 {
            return invalid("annotation", "sizes must be positive");
        }
        Ok(())
    }
}
