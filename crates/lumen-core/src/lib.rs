//! Lumen Core - Core types and utilities for the Lumen scene core
//!
//! This crate provides the foundational types used throughout the workspace:
//! - Mathematical primitives (re-exported from glam)
//! - Globally unique entity identifiers
//! - Rays and axis-aligned bounding boxes for spatial queries

pub mod geometry;
pub mod types;

pub use geometry::{Aabb, Ray};
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use types::{Color, EntityGuid, ParseGuidError};
