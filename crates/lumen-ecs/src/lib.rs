//! Lumen ECS - Entity/component store for the Lumen scene core
//!
//! Entities are GUID-keyed identities that own an ordered set of components.
//! The crate provides:
//! - the live [`World`] store and the [`EntityBuilder`] used to bring entities to life
//! - the [`KvTree`] forest and the [`EntityLocator`] tracking parent/child links
//! - per-system message buses and the [`System`] lifecycle

mod bus;
mod component;
pub mod components;
mod entity;
mod error;
mod identity;
mod locator;
pub mod message;
mod system;
mod tree;
mod world;

pub use bus::{DrainReport, HandlerId, MessageBus, MessageHandler, MessageSender};
pub use component::{Component, ComponentData, ComponentKind};
pub use entity::{EntityBuilder, EntityObject};
pub use error::{EcsError, MessageError, TransformError};
pub use identity::{ComponentType, Identifiable, SystemType, TypeTag};
pub use locator::EntityLocator;
pub use message::{Message, MessageType, MessageValue};
pub use system::{
    destroy_system, initialize_system, run_system, FnSystem, System, SystemBase, SystemSchedule,
    SystemState,
};
pub use tree::{KvTree, TreeError, TreeNode};
pub use world::World;
