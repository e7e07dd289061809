//! Transform propagation
//!
//! Each frame, inside a single backend transaction:
//! 1. local matrices of dirty transforms are pushed to their backend nodes
//! 2. transforms whose parent changed are re-linked in the backend hierarchy
//! 3. the commit makes the backend recompute every affected world matrix,
//!    which is then copied back into the components.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use lumen_core::EntityGuid;
use lumen_ecs::components::Transform;
use lumen_ecs::message::fields;
use lumen_ecs::{
    EntityObject, Message, MessageError, MessageType, System, SystemBase, SystemType,
    TransformError, World,
};
use lumen_render::{TransformBackend, TransformHandle};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::SceneError;

/// A transform change requested through the message bus.
#[derive(Debug, Clone, PartialEq)]
struct TransformRequest {
    entity: EntityGuid,
    position: Option<Vec3>,
    rotation: Option<Quat>,
    scale: Option<Vec3>,
}

impl TransformRequest {
    fn from_message(message: &Message) -> anyhow::Result<Self> {
        let request = Self {
            entity: message.guid(fields::ENTITY)?,
            position: optional(message, fields::POSITION, Message::vec3)?,
            rotation: optional(message, fields::ROTATION, Message::quat)?,
            scale: optional(message, fields::SCALE, Message::vec3)?,
        };
        if request.position.is_none() && request.rotation.is_none() && request.scale.is_none() {
            anyhow::bail!("transform update for {} carries no values", request.entity);
        }
        Ok(request)
    }

    /// Apply every value or none of them.
    fn apply(&self, transform: &mut Transform) -> Result<(), TransformError> {
        let mut staged = transform.clone();
        if let Some(position) = self.position {
            staged.set_position(position)?;
        }
        if let Some(rotation) = self.rotation {
            staged.set_rotation(rotation)?;
        }
        if let Some(scale) = self.scale {
            staged.set_scale(scale)?;
        }
        *transform = staged;
        Ok(())
    }
}

fn optional<T>(
    message: &Message,
    key: &'static str,
    get: impl Fn(&Message, &'static str) -> Result<T, MessageError>,
) -> Result<Option<T>, MessageError> {
    if message.has_field(key) {
        get(message, key).map(Some)
    } else {
        Ok(None)
    }
}

/// Keeps transform components and the backend hierarchy in sync.
pub struct TransformSystem {
    base: SystemBase,
    backend: Box<dyn TransformBackend>,
    handles: HashMap<EntityGuid, TransformHandle>,
    force_recompute: bool,
    requests: Arc<Mutex<Vec<TransformRequest>>>,
}

impl TransformSystem {
    pub fn new(backend: Box<dyn TransformBackend>) -> Self {
        Self {
            base: SystemBase::new(SystemType::Transform),
            backend,
            handles: HashMap::new(),
            force_recompute: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Push every transform to the backend each frame, dirty or not.
    pub fn set_force_recompute(&mut self, force: bool) {
        self.force_recompute = force;
    }

    pub fn force_recompute(&self) -> bool {
        self.force_recompute
    }

    pub fn handle_of(&self, guid: EntityGuid) -> Option<TransformHandle> {
        self.handles.get(&guid).copied()
    }

    pub fn backend(&self) -> &dyn TransformBackend {
        self.backend.as_ref()
    }

    fn require_handle(&self, guid: EntityGuid) -> Result<TransformHandle, SceneError> {
        self.handle_of(guid)
            .ok_or(SceneError::MissingTransformHandle(guid))
    }

    /// Create the backend node of an entity carrying a transform.
    ///
    /// The node is linked under the parent's node when the parent already has
    /// one. Entities that already own a node are left alone.
    pub fn register(&mut self, world: &mut World, guid: EntityGuid) -> Result<bool, SceneError> {
        if self.handles.contains_key(&guid) {
            return Ok(false);
        }
        let Some(transform) = world.get_mut::<Transform>(guid) else {
            return Ok(false);
        };
        let parent_handle = match transform.parent() {
            Some(parent) => match self.handles.get(&parent) {
                Some(handle) => {
                    transform.clear_parent_dirty();
                    Some(*handle)
                }
                None => {
                    warn!(
                        "Parent {} of {} has no transform node yet, linking on next update",
                        parent, guid
                    );
                    None
                }
            },
            None => None,
        };
        transform.mark_dirty();
        let handle = self.backend.create(parent_handle)?;
        self.handles.insert(guid, handle);
        debug!("Created transform node {} for {}", handle, guid);
        Ok(true)
    }

    pub fn unregister(&mut self, guid: EntityGuid) {
        let Some(handle) = self.handles.remove(&guid) else {
            return;
        };
        if let Err(e) = self.backend.destroy(handle) {
            warn!("Failed to destroy transform node of {}: {}", guid, e);
        }
    }

    /// World matrix computed by the backend at the last commit.
    pub fn global_matrix(&self, guid: EntityGuid) -> Result<Mat4, SceneError> {
        let handle = self.require_handle(guid)?;
        Ok(self.backend.world(handle)?)
    }

    pub fn global_position(&self, world: &World, guid: EntityGuid) -> Result<Vec3, SceneError> {
        match self.component(world, guid)?.global_position() {
            Some(position) => Ok(position),
            None => Ok(self.global_matrix(guid)?.to_scale_rotation_translation().2),
        }
    }

    pub fn global_scale(&self, world: &World, guid: EntityGuid) -> Result<Vec3, SceneError> {
        match self.component(world, guid)?.global_scale() {
            Some(scale) => Ok(scale),
            None => Ok(self.global_matrix(guid)?.to_scale_rotation_translation().0),
        }
    }

    pub fn global_rotation(&self, world: &World, guid: EntityGuid) -> Result<Quat, SceneError> {
        match self.component(world, guid)?.global_rotation() {
            Some(rotation) => Ok(rotation),
            None => Ok(self.global_matrix(guid)?.to_scale_rotation_translation().1),
        }
    }

    fn component<'w>(
        &self,
        world: &'w World,
        guid: EntityGuid,
    ) -> Result<&'w Transform, SceneError> {
        self.require_handle(guid)?;
        Ok(world.require::<Transform>(guid)?)
    }

    fn apply_requests(&mut self, world: &mut World) {
        let requests = std::mem::take(&mut *self.requests.lock());
        for request in requests {
            let Some(transform) = world.get_mut::<Transform>(request.entity) else {
                warn!("Transform update for {} ignored: no transform", request.entity);
                continue;
            };
            if let Err(e) = request.apply(transform) {
                warn!("Rejected transform update for {}: {}", request.entity, e);
            }
        }
    }

    fn push_locals(&mut self, world: &mut World) -> Result<usize, SceneError> {
        let mut pushed = 0;
        for (guid, transform) in world.query_mut::<Transform>() {
            if !transform.is_dirty() && !self.force_recompute {
                continue;
            }
            let handle = self
                .handles
                .get(&guid)
                .copied()
                .ok_or(SceneError::MissingTransformHandle(guid))?;
            self.backend.set_local(handle, transform.local_matrix())?;
            transform.clear_dirty();
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Parent flags are cleared only once the backend link is made, so a
    /// failed frame retries the link on the next one.
    fn relink_parents(&mut self, world: &mut World) -> Result<(), SceneError> {
        for (guid, transform) in world.query_mut::<Transform>() {
            if !transform.is_parent_dirty() {
                continue;
            }
            if transform.parent() == Some(guid) {
                warn!("Entity {} cannot be its own parent", guid);
                transform.clear_parent_dirty();
                continue;
            }
            let handle = self.require_handle(guid)?;
            let new_parent = match transform.parent() {
                Some(parent) => Some(self.require_handle(parent)?),
                None => None,
            };
            if self.backend.parent(handle)? == new_parent {
                warn!("Entity {} is already linked to {:?}", guid, transform.parent());
            } else {
                self.backend.set_parent(handle, new_parent)?;
            }
            transform.clear_parent_dirty();
        }
        Ok(())
    }

    fn read_back(&mut self, world: &mut World) -> Result<(), SceneError> {
        for (guid, transform) in world.query_mut::<Transform>() {
            if let Some(handle) = self.handles.get(&guid) {
                transform.set_world_matrix(self.backend.world(*handle)?);
            }
        }
        Ok(())
    }

    fn stage(&mut self, world: &mut World) -> Result<usize, SceneError> {
        let pushed = self.push_locals(world)?;
        self.relink_parents(world)?;
        Ok(pushed)
    }

    /// Run one propagation pass. The transaction is committed even when
    /// staging fails, so the backend is never left mid-batch.
    pub fn propagate(&mut self, world: &mut World) -> Result<(), SceneError> {
        self.apply_requests(world);

        self.backend.begin_transaction();
        let staged = self.stage(world);
        let committed = self.backend.commit_transaction();
        let pushed = staged?;
        let recomputed = committed?;
        if pushed > 0 || recomputed > 0 {
            debug!(
                "Pushed {} local matrices, backend recomputed {} world matrices",
                pushed, recomputed
            );
        }
        self.read_back(world)
    }
}

impl System for TransformSystem {
    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn on_initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        let requests = Arc::clone(&self.requests);
        self.base
            .register_handler(MessageType::TransformUpdate, move |message| {
                requests.lock().push(TransformRequest::from_message(message)?);
                Ok(())
            });
        Ok(())
    }

    fn update(&mut self, world: &mut World) -> anyhow::Result<()> {
        self.propagate(world)?;
        Ok(())
    }

    fn on_entity_added(&mut self, world: &mut World, entity: &EntityObject) -> anyhow::Result<()> {
        self.register(world, entity.guid())?;
        Ok(())
    }

    fn on_entity_removed(&mut self, _world: &World, entity: &EntityObject) {
        self.unregister(entity.guid());
    }

    fn on_destroy(&mut self, _world: &mut World) {
        let guids: Vec<EntityGuid> = self.handles.keys().copied().collect();
        for guid in guids {
            self.unregister(guid);
        }
        self.requests.lock().clear();
    }
}
