//! Error types for the lighting pipeline.

use thiserror::Error;

use crate::hull::HullId;
use crate::light::LightId;

/// Errors surfaced by light/hull mutation, configuration and backends.
///
/// Geometry degeneracies are never reported here: the kernel resolves them
/// to a "no intersection" result instead.
#[derive(Debug, Error)]
pub enum LightingError {
    /// Light range below 1 world unit (or not finite).
    #[error("Invalid light range {0}: must be finite and >= 1")]
    InvalidRange(f32),

    /// Light radius outside `[1, range]`.
    #[error("Invalid light radius {radius}: must lie within [1, {range}]")]
    InvalidRadius { radius: f32, range: f32 },

    /// Light intensity must be strictly positive; its reciprocal feeds the shader.
    #[error("Invalid light intensity {0}: must be finite and > 0")]
    InvalidIntensity(f32),

    #[error("Invalid position ({0}, {1}): components must be finite")]
    InvalidPosition(f32, f32),

    #[error("Invalid rotation {0}: must be finite")]
    InvalidRotation(f32),

    #[error("Invalid color: components must be finite")]
    InvalidColor,

    #[error("Invalid hull scale ({0}, {1}): components must be finite and non-zero")]
    InvalidScale(f32, f32),

    #[error("Invalid spotlight cone half-angle {0}: must lie within (0, pi]")]
    InvalidConeAngle(f32),

    #[error("Light not found: {0:?}")]
    UnknownLight(LightId),

    #[error("Hull not found: {0:?}")]
    UnknownHull(HullId),

    /// Failure reported by a render backend.
    #[error("Render backend error: {0}")]
    Backend(String),

    #[error("Invalid lighting configuration: {0}")]
    Config(String),
}

impl From<anyhow::Error> for LightingError {
    fn from(err: anyhow::Error) -> Self {
        LightingError::Backend(format!("{err:#}"))
    }
}

/// Result type for lighting operations.
pub type Result<T> = std::result::Result<T, LightingError>;
