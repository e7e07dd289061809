use lumen_core::EntityGuid;
use tracing::{debug, warn};

use crate::entity::EntityObject;
use crate::identity::{Identifiable, SystemType, TypeTag};
use crate::tree::KvTree;

/// Tracks the parent/child hierarchy of the whole entity population.
///
/// Tree-level failures are logged here and reported as `false`/empty results;
/// they never propagate to the frame loop.
#[derive(Debug, Default)]
pub struct EntityLocator {
    tree: KvTree<EntityGuid, EntityObject>,
}

impl EntityLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an entity, optionally under an already-registered parent.
    pub fn register(&mut self, entity: EntityObject, parent: Option<EntityGuid>) -> bool {
        let guid = entity.guid();
        if self.tree.contains(&guid) {
            warn!("Entity {} is already registered with the locator", entity);
            return false;
        }
        match self.tree.insert(guid, entity, parent.as_ref()) {
            Ok(()) => {
                debug!("Registered entity {} under {:?}", guid, parent);
                true
            }
            Err(e) => {
                warn!("Failed to register entity {}: {}", guid, e);
                false
            }
        }
    }

    /// Stop tracking an entity and all of its descendants.
    ///
    /// Returns the removed entities, children before their parents.
    pub fn unregister(&mut self, guid: EntityGuid) -> Vec<EntityObject> {
        match self.tree.remove(&guid) {
            Ok(removed) => removed.into_iter().map(|(_, entity)| entity).collect(),
            Err(e) => {
                warn!("Failed to unregister entity: {}", e);
                Vec::new()
            }
        }
    }

    pub fn lookup(&self, guid: EntityGuid) -> Option<&EntityObject> {
        self.tree.get(&guid).map(|node| node.value())
    }

    pub fn contains(&self, guid: EntityGuid) -> bool {
        self.tree.contains(&guid)
    }

    /// Move an entity under a new parent, or to the root level with `None`.
    pub fn reparent(&mut self, guid: EntityGuid, new_parent: Option<EntityGuid>) -> bool {
        match self.tree.reparent(&guid, new_parent.as_ref()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to reparent entity {}: {}", guid, e);
                false
            }
        }
    }

    pub fn children_of(&self, guid: EntityGuid) -> Vec<EntityObject> {
        self.child_guids_of(guid)
            .into_iter()
            .filter_map(|child| self.lookup(child).cloned())
            .collect()
    }

    pub fn child_guids_of(&self, guid: EntityGuid) -> Vec<EntityGuid> {
        self.tree
            .children(&guid)
            .map(<[EntityGuid]>::to_vec)
            .unwrap_or_default()
    }

    pub fn parent_guid_of(&self, guid: EntityGuid) -> Option<EntityGuid> {
        self.tree.parent(&guid).copied()
    }

    /// Every descendant in pre-order.
    pub fn descendants_of(&self, guid: EntityGuid) -> Vec<EntityGuid> {
        self.tree.descendants(&guid)
    }

    pub fn roots(&self) -> &[EntityGuid] {
        self.tree.roots()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl Identifiable for EntityLocator {
    fn type_tag(&self) -> TypeTag {
        TypeTag::System(SystemType::Locator)
    }
}
