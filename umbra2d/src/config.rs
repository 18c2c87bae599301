//! Serializable lighting settings.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::LightingError;
use crate::math::Color;

/// Frame-level lighting settings, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    /// Lightmap clear color. Alpha is ignored.
    pub ambient: Color,
    pub debug_draw: bool,
    /// Marker color for lights that were drawn.
    pub debug_light_color: Color,
    /// Marker color for lights swallowed by a hull.
    pub debug_contained_color: Color,
    pub debug_marker_segments: u32,
    /// Upper bound on light quads per frame (GPU uniform ring size).
    pub max_lights: usize,
    pub shadow_caching: bool,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: Color::rgb(0.1, 0.1, 0.15),
            debug_draw: false,
            debug_light_color: Color::rgba(1.0, 1.0, 0.0, 1.0),
            debug_contained_color: Color::rgba(1.0, 0.0, 0.0, 1.0),
            debug_marker_segments: 24,
            max_lights: 256,
            shadow_caching: true,
        }
    }
}

impl LightingConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.max_lights == 0 {
            return Err(LightingError::Config("max_lights must be at least 1".into()));
        }
        if self.debug_marker_segments < 3 {
            return Err(LightingError::Config(format!(
                "debug_marker_segments must be at least 3, got {}",
                self.debug_marker_segments
            )));
        }
        let colors = [
            ("ambient", self.ambient),
            ("debug_light_color", self.debug_light_color),
            ("debug_contained_color", self.debug_contained_color),
        ];
        if let Some((name, _)) = colors.iter().find(|(_, color)| !color.is_finite()) {
            return Err(LightingError::Config(format!("{name} must be finite")));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
