use std::collections::HashMap;

use lumen_core::EntityGuid;
use tracing::{debug, warn};

use crate::component::{Component, ComponentKind};
use crate::entity::EntityObject;
use crate::error::EcsError;
use crate::identity::ComponentType;

struct EntityRecord {
    object: EntityObject,
    /// Insertion order is iteration order.
    components: Vec<Component>,
}

/// The live entity/component store. Owns every attached component.
///
/// Entities are keyed by GUID. The store is mutated only from the frame loop;
/// other threads go through a message bus.
pub struct World {
    entities: HashMap<EntityGuid, EntityRecord>,
    /// Spawn order, for deterministic iteration.
    order: Vec<EntityGuid>,
    /// Entities that went live since the last [`World::take_initialized`].
    initialized: Vec<EntityGuid>,
}

impl World {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            order: Vec::new(),
            initialized: Vec::new(),
        }
    }

    // ---- Entity management ----

    pub(crate) fn insert_entity(&mut self, object: EntityObject) -> Result<(), EcsError> {
        let guid = object.guid();
        if self.entities.contains_key(&guid) {
            return Err(EcsError::DuplicateEntity(guid));
        }
        self.entities.insert(
            guid,
            EntityRecord {
                object,
                components: Vec::new(),
            },
        );
        self.order.push(guid);
        Ok(())
    }

    pub(crate) fn mark_initialized(&mut self, guid: EntityGuid) {
        self.initialized.push(guid);
    }

    /// Remove an entity, releasing every component it owns.
    pub fn despawn(&mut self, guid: EntityGuid) -> Option<EntityObject> {
        let record = self.entities.remove(&guid)?;
        self.order.retain(|g| *g != guid);
        self.initialized.retain(|g| *g != guid);
        debug!(
            "Despawned entity {} ({} components)",
            guid,
            record.components.len()
        );
        Some(record.object)
    }

    pub fn contains(&self, guid: EntityGuid) -> bool {
        self.entities.contains_key(&guid)
    }

    pub fn entity(&self, guid: EntityGuid) -> Option<&EntityObject> {
        self.entities.get(&guid).map(|r| &r.object)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Live entity GUIDs in spawn order.
    pub fn entity_guids(&self) -> &[EntityGuid] {
        &self.order
    }

    /// Drain the entities that went live since the previous call, in spawn order.
    pub fn take_initialized(&mut self) -> Vec<EntityGuid> {
        std::mem::take(&mut self.initialized)
    }

    // ---- Component management ----

    /// Attach a component to a live entity and bind its owner back-reference.
    pub fn attach(
        &mut self,
        guid: EntityGuid,
        component: impl Into<Component>,
    ) -> Result<(), EcsError> {
        let mut component = component.into();
        let record = self
            .entities
            .get_mut(&guid)
            .ok_or(EcsError::EntityNotFound(guid))?;
        let component_type = component.component_type();
        if record
            .components
            .iter()
            .any(|c| c.component_type() == component_type)
        {
            warn!("Entity {} already has a {} component", guid, component_type);
        }
        component.bind(guid);
        record.components.push(component);
        Ok(())
    }

    /// First component of the given type on an entity.
    pub fn component(&self, guid: EntityGuid, component_type: ComponentType) -> Option<&Component> {
        self.entities
            .get(&guid)?
            .components
            .iter()
            .find(|c| c.component_type() == component_type)
    }

    pub fn component_mut(
        &mut self,
        guid: EntityGuid,
        component_type: ComponentType,
    ) -> Option<&mut Component> {
        self.entities
            .get_mut(&guid)?
            .components
            .iter_mut()
            .find(|c| c.component_type() == component_type)
    }

    /// Every component of an entity in insertion order.
    pub fn components(&self, guid: EntityGuid) -> &[Component] {
        self.entities
            .get(&guid)
            .map(|r| r.components.as_slice())
            .unwrap_or(&[])
    }

    pub fn get<T: ComponentKind>(&self, guid: EntityGuid) -> Option<&T> {
        self.component(guid, T::TYPE)?.get::<T>()
    }

    pub fn get_mut<T: ComponentKind>(&mut self, guid: EntityGuid) -> Option<&mut T> {
        self.component_mut(guid, T::TYPE)?.get_mut::<T>()
    }

    /// Typed lookup that treats absence as a precondition violation.
    pub fn require<T: ComponentKind>(&self, guid: EntityGuid) -> Result<&T, EcsError> {
        if !self.contains(guid) {
            return Err(EcsError::EntityNotFound(guid));
        }
        self.get::<T>(guid).ok_or(EcsError::MissingComponent {
            entity: guid,
            component: T::TYPE,
        })
    }

    pub fn require_mut<T: ComponentKind>(&mut self, guid: EntityGuid) -> Result<&mut T, EcsError> {
        if !self.contains(guid) {
            return Err(EcsError::EntityNotFound(guid));
        }
        self.get_mut::<T>(guid).ok_or(EcsError::MissingComponent {
            entity: guid,
            component: T::TYPE,
        })
    }

    pub fn has(&self, guid: EntityGuid, component_type: ComponentType) -> bool {
        self.component(guid, component_type).is_some()
    }

    /// Detach the first component of the given type. Returns it if present.
    pub fn detach(&mut self, guid: EntityGuid, component_type: ComponentType) -> Option<Component> {
        let record = self.entities.get_mut(&guid)?;
        let index = record
            .components
            .iter()
            .position(|c| c.component_type() == component_type)?;
        Some(record.components.remove(index))
    }

    // ---- Queries ----

    /// Every live entity carrying a `T`, in spawn order.
    pub fn query<T: ComponentKind>(&self) -> impl Iterator<Item = (EntityGuid, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |guid| self.get::<T>(*guid).map(|c| (*guid, c)))
    }

    /// Mutable variant of [`World::query`]. Order is unspecified.
    pub fn query_mut<T: ComponentKind>(
        &mut self,
    ) -> impl Iterator<Item = (EntityGuid, &mut T)> + '_ {
        self.entities.iter_mut().filter_map(|(guid, record)| {
            record
                .components
                .iter_mut()
                .find(|c| c.component_type() == T::TYPE)
                .and_then(|c| c.get_mut::<T>())
                .map(|c| (*guid, c))
        })
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
