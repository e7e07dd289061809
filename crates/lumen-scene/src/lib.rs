//! Lumen Scene - Systems and frame loop of the Lumen scene core
//!
//! This crate wires the entity store to the systems that give it meaning:
//! - [`TransformSystem`] pushes local transforms into a [`lumen_render::TransformBackend`]
//!   and reads world matrices back
//! - [`LightSystem`], [`MaterialSystem`] and [`CollisionSystem`] react to entity state
//! - [`Strand`] runs asynchronous asset loads off the frame thread
//! - [`Scene`] owns all of the above and drives one frame at a time

mod collision_system;
mod config;
mod environment;
mod error;
mod light_system;
mod material_system;
mod scene;
mod strand;
mod transform_system;

pub use collision_system::{CollisionHit, CollisionQueryResult, CollisionSystem};
pub use config::SceneConfig;
pub use environment::{
    read_asset, AssetFormat, EnvironmentAsset, IndirectLight, LoadedIndirectLight, LoadedSkybox,
    Skybox,
};
pub use error::{LoadError, SceneError};
pub use light_system::LightSystem;
pub use material_system::{MaterialDefinition, MaterialSystem};
pub use scene::Scene;
pub use strand::{PendingTask, Strand};
pub use transform_system::TransformSystem;
