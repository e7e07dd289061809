//! Local transform component
//!
//! Holds the local TRS values of an entity, the world matrix computed by the
//! render backend, and the two dirty flags that drive propagation:
//! - `dirty`: local values changed, the world matrix is stale
//! - `parent_dirty`: the parent link changed, the backend hierarchy must be re-linked

use std::sync::OnceLock;

use glam::{Mat4, Quat, Vec3};
use lumen_core::EntityGuid;

use crate::error::TransformError;

/// Propagation state derived from the dirty flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformState {
    /// World matrix is valid
    Clean,
    /// Local values changed since the last propagation
    Dirty,
    /// Parent link changed since the last propagation
    ParentDirty,
}

/// World-space decomposition of the world matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Decomposed {
    scale: Vec3,
    rotation: Quat,
    position: Vec3,
}

#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    scale: Vec3,
    rotation: Quat,
    parent: Option<EntityGuid>,
    world: Mat4,
    dirty: bool,
    parent_dirty: bool,
    decomposed: OnceLock<Decomposed>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            parent: None,
            world: Mat4::IDENTITY,
            dirty: true,
            parent_dirty: false,
            decomposed: OnceLock::new(),
        }
    }
}

impl Transform {
    /// Identity transform, marked dirty so the first frame pushes it to the backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform at the given position
    pub fn from_position(position: Vec3) -> Result<Self, TransformError> {
        let mut transform = Self::default();
        transform.set_position(position)?;
        Ok(transform)
    }

    /// Create a transform from position, rotation and scale.
    pub fn from_trs(position: Vec3, rotation: Quat, scale: Vec3) -> Result<Self, TransformError> {
        let mut transform = Self::default();
        transform.set_position(position)?;
        transform.set_rotation(rotation)?;
        transform.set_scale(scale)?;
        Ok(transform)
    }

    /// Builder-style parent assignment.
    pub fn with_parent(mut self, parent: EntityGuid) -> Self {
        self.set_parent(Some(parent));
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn parent(&self) -> Option<EntityGuid> {
        self.parent
    }

    pub fn set_position(&mut self, position: Vec3) -> Result<(), TransformError> {
        if !position.is_finite() {
            return Err(TransformError::NonFinite("position"));
        }
        self.position = position;
        self.dirty = true;
        Ok(())
    }

    pub fn translate(&mut self, offset: Vec3) -> Result<(), TransformError> {
        self.set_position(self.position + offset)
    }

    /// Set the local scale. Every axis must be strictly positive.
    pub fn set_scale(&mut self, scale: Vec3) -> Result<(), TransformError> {
        if !scale.is_finite() {
            return Err(TransformError::NonFinite("scale"));
        }
        if scale.cmple(Vec3::ZERO).any() {
            return Err(TransformError::InvalidScale(scale));
        }
        self.scale = scale;
        self.dirty = true;
        Ok(())
    }

    /// Set the local rotation. The quaternion is normalized before use.
    pub fn set_rotation(&mut self, rotation: Quat) -> Result<(), TransformError> {
        if !rotation.is_finite() {
            return Err(TransformError::NonFinite("rotation"));
        }
        let length = rotation.length();
        if length <= f32::EPSILON {
            return Err(TransformError::DegenerateRotation);
        }
        self.rotation = rotation / length;
        self.dirty = true;
        Ok(())
    }

    /// Assign or clear the parent entity. Only a real change marks the
    /// hierarchy dirty.
    pub fn set_parent(&mut self, parent: Option<EntityGuid>) {
        if self.parent != parent {
            self.parent = parent;
            self.parent_dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_parent_dirty(&self) -> bool {
        self.parent_dirty
    }

    pub fn state(&self) -> TransformState {
        if self.parent_dirty {
            TransformState::ParentDirty
        } else if self.dirty {
            TransformState::Dirty
        } else {
            TransformState::Clean
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn clear_parent_dirty(&mut self) {
        self.parent_dirty = false;
    }

    /// Local matrix, composed as translate * rotate * scale.
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// World matrix, or `None` while local values are pending propagation.
    pub fn world_matrix(&self) -> Option<Mat4> {
        (!self.dirty).then_some(self.world)
    }

    /// Last world matrix received from the backend, valid or not.
    pub fn last_world_matrix(&self) -> Mat4 {
        self.world
    }

    /// Store the world matrix read back from the backend. Returns `true` if it changed.
    pub fn set_world_matrix(&mut self, world: Mat4) -> bool {
        if self.world == world {
            return false;
        }
        self.world = world;
        self.decomposed = OnceLock::new();
        true
    }

    /// World-space position. Decomposition is cached until the world matrix changes.
    pub fn global_position(&self) -> Option<Vec3> {
        self.decomposed().map(|d| d.position)
    }

    /// World-space scale. See [`Transform::global_position`].
    pub fn global_scale(&self) -> Option<Vec3> {
        self.decomposed().map(|d| d.scale)
    }

    /// World-space rotation. See [`Transform::global_position`].
    pub fn global_rotation(&self) -> Option<Quat> {
        self.decomposed().map(|d| d.rotation)
    }

    fn decomposed(&self) -> Option<&Decomposed> {
        if self.dirty {
            return None;
        }
        Some(self.decomposed.get_or_init(|| {
            let (scale, rotation, position) = self.world.to_scale_rotation_translation();
            Decomposed {
                scale,
                rotation,
                position,
            }
        }))
    }
}
