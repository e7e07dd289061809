//! Run-time type identity for components and systems.
//!
//! Every concrete component and system kind is assigned a fixed tag at
//! compile time. Tags are stable across builds and toolchains, so they can
//! be logged, persisted and compared without any reflection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag of a concrete component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentType {
    Transform,
    Renderable,
    Light,
    Collidable,
    Material,
}

impl ComponentType {
    pub const ALL: [ComponentType; 5] = [
        ComponentType::Transform,
        ComponentType::Renderable,
        ComponentType::Light,
        ComponentType::Collidable,
        ComponentType::Material,
    ];

    /// Stable numeric identifier.
    pub const fn id(self) -> u32 {
        match self {
            ComponentType::Transform => 1,
            ComponentType::Renderable => 2,
            ComponentType::Light => 3,
            ComponentType::Collidable => 4,
            ComponentType::Material => 5,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ComponentType::Transform => "Transform",
            ComponentType::Renderable => "Renderable",
            ComponentType::Light => "Light",
            ComponentType::Collidable => "Collidable",
            ComponentType::Material => "Material",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tag of a concrete system kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystemType {
    Locator,
    Transform,
    Collision,
    Light,
    Material,
    /// Application-defined systems, numbered by the host.
    Custom(u16),
}

impl SystemType {
    /// Stable numeric identifier. Custom systems live above 0x1000.
    pub const fn id(self) -> u32 {
        match self {
            SystemType::Locator => 1,
            SystemType::Transform => 2,
            SystemType::Collision => 3,
            SystemType::Light => 4,
            SystemType::Material => 5,
            SystemType::Custom(n) => 0x1000 + n as u32,
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemType::Custom(n) => write!(f, "Custom({n})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Either kind of tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Component(ComponentType),
    System(SystemType),
}

/// Implemented by every polymorphic value that needs a run-time identity.
pub trait Identifiable {
    fn type_tag(&self) -> TypeTag;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn component_ids_are_unique() {
        let ids: HashSet<u32> = ComponentType::ALL.iter().map(|t| t.id()).collect();
        assert_eq!(ids.len(), ComponentType::ALL.len());
    }

    #[test]
    fn custom_system_ids_do_not_collide() {
        assert_eq!(SystemType::Custom(0).id(), 0x1000);
        assert_ne!(SystemType::Custom(2).id(), SystemType::Transform.id());
        assert_eq!(SystemType::Custom(7).to_string(), "Custom(7)");
        assert_eq!(SystemType::Collision.to_string(), "Collision");
    }
}
