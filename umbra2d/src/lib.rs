//! Umbra2D - dynamic 2D lighting with hull-cast shadows.
//!
//! Each frame, lights accumulate additively into an off-screen lightmap,
//! masked by the shadows polygonal hulls cast, and the lightmap multiplies
//! the rendered scene. [`LightingSystem`] is the entry point; rendering goes
//! through a [`render::LightingBackend`] (`WgpuBackend` on the GPU,
//! `SoftwareBackend` on the CPU).

pub mod cache;
pub mod camera;
pub mod compositor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod hull;
pub mod light;
pub mod math;
pub mod render;
pub mod resolver;
pub mod shadow;
pub mod system;
pub mod visibility;

pub use crate::camera::{Camera2D, CameraProvider, ScissorRect};
pub use crate::compositor::FrameStats;
pub use crate::config::LightingConfig;
pub use crate::error::{LightingError, Result};
pub use crate::hull::{Hull, HullId};
pub use crate::light::{Light, LightId, LightShape, LightTextureId, LightTransform, ShadowType};
pub use crate::math::{Aabb, Color, Transform2D, Vec2};
pub use crate::render::{LightingBackend, SoftwareBackend, WgpuBackend};
pub use crate::system::LightingSystem;
