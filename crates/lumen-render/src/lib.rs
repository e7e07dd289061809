//! Lumen Render - Backend-facing transform hierarchy
//!
//! The scene keeps its own transform components; the render backend keeps a
//! parallel hierarchy of transform nodes addressed by generational handles.
//! [`TransformBackend`] is the contract the scene drives, and
//! [`HierarchyTransformManager`] is an in-memory implementation of it.

mod backend;
mod hierarchy;

pub use backend::{BackendError, TransformBackend, TransformHandle};
pub use hierarchy::HierarchyTransformManager;
