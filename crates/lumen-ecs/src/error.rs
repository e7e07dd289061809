use glam::Vec3;
use lumen_core::EntityGuid;

use crate::identity::{ComponentType, SystemType};
use crate::message::MessageType;
use crate::system::SystemState;

/// Errors raised by the entity/component store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EcsError {
    #[error("entity {0} not found")]
    EntityNotFound(EntityGuid),

    #[error("entity {0} is already registered")]
    DuplicateEntity(EntityGuid),

    #[error("entity {entity} has no {component} component")]
    MissingComponent {
        entity: EntityGuid,
        component: ComponentType,
    },

    #[error("system {system} cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        system: SystemType,
        from: SystemState,
        to: SystemState,
    },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Message(#[from] MessageError),
}

/// Rejected transform mutations. Inputs are never clamped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("scale {0} must be strictly positive on every axis")]
    InvalidScale(Vec3),

    #[error("{0} must be finite")]
    NonFinite(&'static str),

    #[error("rotation quaternion has zero length")]
    DegenerateRotation,
}

/// Malformed or undeliverable messages.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MessageError {
    #[error("{message_type:?} message is missing field '{key}'")]
    MissingField {
        message_type: MessageType,
        key: &'static str,
    },

    #[error("field '{key}' of {message_type:?} message is not a {expected}")]
    WrongFieldType {
        message_type: MessageType,
        key: &'static str,
        expected: &'static str,
    },

    #[error("message bus is closed")]
    BusClosed,
}
