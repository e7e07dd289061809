//! Built-in component kinds

mod collidable;
mod light;
mod material;
mod renderable;
mod transform;

pub use collidable::{Collidable, CollisionShape};
pub use light::{Light, LightKind};
pub use material::{Material, MaterialValue};
pub use renderable::Renderable;
pub use transform::{Transform, TransformState};
