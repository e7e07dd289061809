use std::fmt;
use std::hash::{Hash, Hasher};

use lumen_core::{EntityGuid, ParseGuidError};
use tracing::{debug, warn};

use crate::component::{Component, ComponentKind};
use crate::error::EcsError;
use crate::identity::ComponentType;
use crate::world::World;

/// Handle to a live entity: its GUID and display name.
///
/// Components live in the [`World`]; the handle methods are thin lookups by
/// `(guid, component type)`. Two handles are equal when their GUIDs are.
#[derive(Debug, Clone)]
pub struct EntityObject {
    guid: EntityGuid,
    name: String,
}

impl EntityObject {
    pub fn guid(&self) -> EntityGuid {
        self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a component to this (live) entity.
    pub fn add_component(
        &self,
        world: &mut World,
        component: impl Into<Component>,
    ) -> Result<(), EcsError> {
        world.attach(self.guid, component)
    }

    pub fn component<'w>(
        &self,
        world: &'w World,
        component_type: ComponentType,
    ) -> Option<&'w Component> {
        world.component(self.guid, component_type)
    }

    pub fn get_component<'w, T: ComponentKind>(&self, world: &'w World) -> Option<&'w T> {
        world.get::<T>(self.guid)
    }

    pub fn get_component_mut<'w, T: ComponentKind>(
        &self,
        world: &'w mut World,
    ) -> Option<&'w mut T> {
        world.get_mut::<T>(self.guid)
    }

    pub fn has_component(&self, world: &World, component_type: ComponentType) -> bool {
        world.has(self.guid, component_type)
    }

    pub fn remove_component(
        &self,
        world: &mut World,
        component_type: ComponentType,
    ) -> Option<Component> {
        world.detach(self.guid, component_type)
    }

    /// Clone the component of the given type onto `other`.
    ///
    /// Logs and does nothing when this entity has no such component.
    /// Returns whether a copy was attached.
    pub fn shallow_copy_component_to(
        &self,
        world: &mut World,
        component_type: ComponentType,
        other: &EntityObject,
    ) -> bool {
        let Some(copy) = world.component(self.guid, component_type).map(Component::detached) else {
            warn!(
                "Entity {} ('{}') has no {} component to copy",
                self.guid, self.name, component_type
            );
            return false;
        };
        match world.attach(other.guid, copy) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to copy {} component to {}: {}", component_type, other.guid, e);
                false
            }
        }
    }
}

impl PartialEq for EntityObject {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}

impl Eq for EntityObject {}

impl Hash for EntityObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.guid.hash(state);
    }
}

impl fmt::Display for EntityObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.guid)
        } else {
            write!(f, "{} ({})", self.name, self.guid)
        }
    }
}

/// Entity under construction.
///
/// Components accumulate here, one per type; adding a second component of
/// the same type replaces the first. [`EntityBuilder::build`] moves them into
/// the [`World`] in a single step, after which the entity is live.
#[derive(Debug, Default)]
pub struct EntityBuilder {
    guid: Option<EntityGuid>,
    name: String,
    pending: Vec<Component>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guid(mut self, guid: EntityGuid) -> Self {
        self.guid = Some(guid);
        self
    }

    /// Use a GUID from a scene description. An empty string means "generate one".
    pub fn with_guid_str(self, guid: &str) -> Result<Self, ParseGuidError> {
        if guid.trim().is_empty() {
            return Ok(self);
        }
        Ok(self.with_guid(guid.parse()?))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_component(mut self, component: impl Into<Component>) -> Self {
        self.add_component(component);
        self
    }

    /// Buffer a component, replacing any buffered component of the same type.
    pub fn add_component(&mut self, component: impl Into<Component>) -> &mut Self {
        let component = component.into();
        let component_type = component.component_type();
        match self
            .pending
            .iter_mut()
            .find(|c| c.component_type() == component_type)
        {
            Some(slot) => {
                debug!("Replacing buffered {} component", component_type);
                *slot = component;
            }
            None => self.pending.push(component),
        }
        self
    }

    /// Buffered component types in insertion order.
    pub fn pending_types(&self) -> Vec<ComponentType> {
        self.pending.iter().map(|c| c.component_type()).collect()
    }

    /// Register the entity and move every buffered component into the world.
    pub fn build(self, world: &mut World) -> Result<EntityObject, EcsError> {
        let object = EntityObject {
            guid: self.guid.unwrap_or_default(),
            name: self.name,
        };
        let guid = object.guid;
        world.insert_entity(object.clone())?;
        for component in self.pending {
            world.attach(guid, component)?;
        }
        world.mark_initialized(guid);
        debug!("Entity {} initialized", object);
        Ok(object)
    }
}
