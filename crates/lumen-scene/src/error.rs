use std::path::PathBuf;

use lumen_core::EntityGuid;
use lumen_ecs::EcsError;
use lumen_render::BackendError;

/// Errors raised by the scene and its systems.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("entity {0} has no backend transform handle")]
    MissingTransformHandle(EntityGuid),

    #[error("entity {0} is not part of the scene")]
    UnknownEntity(EntityGuid),

    #[error("cannot parent {child} under {parent}")]
    InvalidParent {
        child: EntityGuid,
        parent: EntityGuid,
    },

    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to start worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("worker strand closed before the task completed")]
    StrandClosed,

    #[error("failed to read config '{0}': {1}")]
    ConfigIo(PathBuf, #[source] std::io::Error),

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Errors that can occur while loading environment assets.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("asset not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error loading '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("'{0}' is not a valid {1} file")]
    BadHeader(PathBuf, &'static str),
}
