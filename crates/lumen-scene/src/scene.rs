//! The scene: entity store, hierarchy, systems and the frame loop.
//!
//! Systems are updated sequentially in a fixed order: transform, light,
//! material, collision, then any application systems in registration order.
//! Each system drains its message queue immediately before its update.

use anyhow::Context;
use lumen_core::{EntityGuid, Ray};
use lumen_ecs::components::Transform;
use lumen_ecs::{
    destroy_system, initialize_system, run_system, Component, ComponentType, EntityBuilder,
    EntityLocator, EntityObject, System, SystemSchedule, World,
};
use lumen_render::{HierarchyTransformManager, TransformBackend};
use tracing::{debug, info, warn};

use crate::collision_system::{CollisionHit, CollisionSystem};
use crate::config::SceneConfig;
use crate::environment::{IndirectLight, LoadedIndirectLight, LoadedSkybox, Skybox};
use crate::error::{LoadError, SceneError};
use crate::light_system::LightSystem;
use crate::material_system::MaterialSystem;
use crate::strand::{PendingTask, Strand};
use crate::transform_system::TransformSystem;

pub struct Scene {
    config: SceneConfig,
    world: World,
    locator: EntityLocator,
    transforms: TransformSystem,
    lights: LightSystem,
    materials: MaterialSystem,
    collisions: CollisionSystem,
    custom: SystemSchedule,
    strand: Strand,
    skybox: Option<LoadedSkybox>,
    indirect_light: Option<LoadedIndirectLight>,
    pending_skybox: Option<PendingTask<Result<LoadedSkybox, LoadError>>>,
    pending_indirect_light: Option<PendingTask<Result<LoadedIndirectLight, LoadError>>>,
    frame: u64,
    shut_down: bool,
}

impl Scene {
    /// Create a scene backed by the in-memory transform hierarchy.
    pub fn new(config: SceneConfig) -> anyhow::Result<Self> {
        Self::with_backend(config, Box::new(HierarchyTransformManager::new()))
    }

    pub fn with_backend(
        config: SceneConfig,
        backend: Box<dyn TransformBackend>,
    ) -> anyhow::Result<Self> {
        let strand = Strand::new(config.worker_threads)?;
        let mut transforms = TransformSystem::new(backend);
        transforms.set_force_recompute(config.force_recompute);
        let mut collisions = CollisionSystem::new();
        collisions.set_debug_visualization(config.collision_debug);

        let mut scene = Self {
            config,
            world: World::new(),
            locator: EntityLocator::new(),
            transforms,
            lights: LightSystem::new(),
            materials: MaterialSystem::new(),
            collisions,
            custom: SystemSchedule::new(),
            strand,
            skybox: None,
            indirect_light: None,
            pending_skybox: None,
            pending_indirect_light: None,
            frame: 0,
            shut_down: false,
        };

        let Scene {
            world,
            transforms,
            lights,
            materials,
            collisions,
            ..
        } = &mut scene;
        let systems: [&mut dyn System; 4] = [transforms, lights, materials, collisions];
        for system in systems {
            initialize_system(system, world)?;
        }
        info!("Scene created");
        Ok(scene)
    }

    // ---- Entities ----

    /// Bring an entity to life and place it in the hierarchy.
    pub fn spawn(
        &mut self,
        builder: EntityBuilder,
        parent: Option<EntityGuid>,
    ) -> anyhow::Result<EntityObject> {
        if let Some(parent) = parent {
            if !self.locator.contains(parent) {
                return Err(SceneError::UnknownEntity(parent).into());
            }
        }
        let entity = builder.build(&mut self.world)?;
        self.register(entity.clone(), parent)
            .with_context(|| format!("registering {}", entity))?;
        Ok(entity)
    }

    /// Register an entity already built against [`Scene::world_mut`].
    pub fn register(
        &mut self,
        entity: EntityObject,
        parent: Option<EntityGuid>,
    ) -> anyhow::Result<()> {
        let guid = entity.guid();
        if !self.world.contains(guid) {
            return Err(SceneError::UnknownEntity(guid).into());
        }
        if !self.locator.register(entity.clone(), parent) {
            return Err(SceneError::UnknownEntity(parent.unwrap_or(guid)).into());
        }
        let transform_parent = self.transform_ancestor(parent);
        if let Some(transform) = self.world.get_mut::<Transform>(guid) {
            transform.set_parent(transform_parent);
        }
        self.notify_added(&entity)
    }

    fn notify_added(&mut self, entity: &EntityObject) -> anyhow::Result<()> {
        let Scene {
            world,
            transforms,
            lights,
            materials,
            collisions,
            custom,
            ..
        } = &mut *self;
        let systems: [&mut dyn System; 4] = [transforms, lights, materials, collisions];
        for system in systems {
            system.on_entity_added(world, entity)?;
        }
        custom.notify_added(world, entity)
    }

    /// Nearest entity at or above `start` that carries a transform.
    fn transform_ancestor(&self, start: Option<EntityGuid>) -> Option<EntityGuid> {
        let mut current = start;
        while let Some(guid) = current {
            if self.world.has(guid, ComponentType::Transform) {
                return Some(guid);
            }
            current = self.locator.parent_guid_of(guid);
        }
        None
    }

    /// Register entities built straight into the world since the last frame, as roots.
    fn adopt_initialized(&mut self) -> anyhow::Result<()> {
        for guid in self.world.take_initialized() {
            if self.locator.contains(guid) {
                continue;
            }
            let Some(entity) = self.world.entity(guid).cloned() else {
                continue;
            };
            debug!("Adopting {} as a root entity", entity);
            self.register(entity, None)?;
        }
        Ok(())
    }

    /// Remove an entity and its whole subtree. Returns how many entities were removed.
    pub fn despawn(&mut self, guid: EntityGuid) -> Result<usize, SceneError> {
        if !self.locator.contains(guid) {
            return Err(SceneError::UnknownEntity(guid));
        }
        let removed = self.locator.unregister(guid);
        for entity in &removed {
            self.transforms.on_entity_removed(&self.world, entity);
            self.lights.on_entity_removed(&self.world, entity);
            self.materials.on_entity_removed(&self.world, entity);
            self.collisions.on_entity_removed(&self.world, entity);
            self.custom.notify_removed(&self.world, entity);
            self.world.despawn(entity.guid());
        }
        debug!("Despawned {} entities under {}", removed.len(), guid);
        Ok(removed.len())
    }

    /// Move an entity under a new parent, or to the root level with `None`.
    ///
    /// Cycles and self-parenting are rejected and leave the hierarchy unchanged.
    pub fn set_parent(
        &mut self,
        child: EntityGuid,
        parent: Option<EntityGuid>,
    ) -> Result<(), SceneError> {
        if !self.locator.contains(child) {
            return Err(SceneError::UnknownEntity(child));
        }
        if let Some(parent) = parent {
            if !self.locator.contains(parent) {
                return Err(SceneError::UnknownEntity(parent));
            }
            if !self.locator.reparent(child, Some(parent)) {
                return Err(SceneError::InvalidParent { child, parent });
            }
        } else {
            self.locator.reparent(child, None);
        }

        self.relink_transforms(child);
        Ok(())
    }

    /// Point the transforms of `guid` and its whole subtree at their nearest
    /// transformed ancestor. Descendants of transform-less entities re-link too.
    fn relink_transforms(&mut self, guid: EntityGuid) {
        let mut affected = vec![guid];
        affected.extend(self.locator.descendants_of(guid));
        for guid in affected {
            let ancestor = self.transform_ancestor(self.locator.parent_guid_of(guid));
            if let Some(transform) = self.world.get_mut::<Transform>(guid) {
                transform.set_parent(ancestor);
            }
        }
    }

    /// Attach a component to a live entity and let the systems pick it up.
    pub fn add_component(
        &mut self,
        guid: EntityGuid,
        component: impl Into<Component>,
    ) -> anyhow::Result<()> {
        let Some(entity) = self.locator.lookup(guid).cloned() else {
            return Err(SceneError::UnknownEntity(guid).into());
        };
        let component = component.into();
        let is_transform = component.component_type() == ComponentType::Transform;
        self.world.attach(guid, component)?;
        if is_transform {
            self.relink_transforms(guid);
        }
        self.notify_added(&entity)
    }

    // ---- Frame loop ----

    /// Run one frame.
    pub fn update(&mut self) -> anyhow::Result<()> {
        self.adopt_initialized()?;
        self.poll_environment();

        let Scene {
            world,
            transforms,
            lights,
            materials,
            collisions,
            custom,
            ..
        } = &mut *self;
        let systems: [&mut dyn System; 4] = [transforms, lights, materials, collisions];
        for system in systems {
            run_system(system, world)?;
        }
        custom.run_all(world)?;

        self.frame += 1;
        Ok(())
    }

    /// Add an application system, run after the built-in ones.
    pub fn add_system<S: System + 'static>(&mut self, system: S) -> anyhow::Result<()> {
        self.custom.add_system(system);
        self.custom.initialize_all(&mut self.world)
    }

    /// Ray query against the collidables as of the last frame.
    pub fn raycast(&mut self, ray: &Ray) -> Vec<CollisionHit> {
        self.collisions.query(&self.world, ray)
    }

    // ---- Environment ----

    /// Start loading a skybox on the strand. It replaces the current one once loaded.
    pub fn load_skybox(&mut self, skybox: &Skybox) {
        self.pending_skybox = Some(skybox.load(&self.strand, &self.config));
    }

    pub fn load_indirect_light(&mut self, light: &IndirectLight) {
        self.pending_indirect_light = Some(light.load(&self.strand, &self.config));
    }

    /// Whether an environment load is still in flight.
    pub fn environment_pending(&self) -> bool {
        self.pending_skybox.is_some() || self.pending_indirect_light.is_some()
    }

    fn poll_environment(&mut self) {
        if let Some(result) = self.pending_skybox.as_ref().and_then(PendingTask::try_recv) {
            self.pending_skybox = None;
            match result {
                Ok(skybox) => {
                    info!("Skybox ready");
                    self.skybox = Some(skybox);
                }
                Err(e) => warn!("Failed to load skybox: {}", e),
            }
        }
        if let Some(result) = self
            .pending_indirect_light
            .as_ref()
            .and_then(PendingTask::try_recv)
        {
            self.pending_indirect_light = None;
            match result {
                Ok(light) => {
                    info!("Indirect light ready");
                    self.indirect_light = Some(light);
                }
                Err(e) => warn!("Failed to load indirect light: {}", e),
            }
        }
    }

    /// Block until pending environment loads finish. Only use during loading screens.
    pub fn wait_for_environment(&mut self) -> Result<(), SceneError> {
        if let Some(task) = self.pending_skybox.take() {
            match task.wait()? {
                Ok(skybox) => self.skybox = Some(skybox),
                Err(e) => warn!("Failed to load skybox: {}", e),
            }
        }
        if let Some(task) = self.pending_indirect_light.take() {
            match task.wait()? {
                Ok(light) => self.indirect_light = Some(light),
                Err(e) => warn!("Failed to load indirect light: {}", e),
            }
        }
        Ok(())
    }

    pub fn skybox(&self) -> Option<&LoadedSkybox> {
        self.skybox.as_ref()
    }

    pub fn indirect_light(&self) -> Option<&LoadedIndirectLight> {
        self.indirect_light.as_ref()
    }

    // ---- Accessors ----

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn locator(&self) -> &EntityLocator {
        &self.locator
    }

    pub fn transforms(&self) -> &TransformSystem {
        &self.transforms
    }

    pub fn transforms_mut(&mut self) -> &mut TransformSystem {
        &mut self.transforms
    }

    pub fn lights(&self) -> &LightSystem {
        &self.lights
    }

    pub fn materials(&self) -> &MaterialSystem {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialSystem {
        &mut self.materials
    }

    pub fn collisions(&self) -> &CollisionSystem {
        &self.collisions
    }

    pub fn collisions_mut(&mut self) -> &mut CollisionSystem {
        &mut self.collisions
    }

    pub fn strand(&self) -> &Strand {
        &self.strand
    }

    /// Frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Destroy every system. Called on drop; calling it twice is harmless.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let Scene {
            world,
            transforms,
            lights,
            materials,
            collisions,
            custom,
            ..
        } = &mut *self;
        custom.destroy_all(world);
        let systems: [&mut dyn System; 4] = [collisions, materials, lights, transforms];
        for system in systems {
            destroy_system(system, world);
        }
        info!("Scene shut down after {} frames", self.frame);
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_ecs::components::{Collidable, Light, LightKind, Material, Renderable};
    use lumen_ecs::message::fields;
    use lumen_ecs::{FnSystem, Message, MessageType, SystemType};
    use parking_lot::Mutex;
    use std::sync::Arc;

    const EPS: f32 = 1e-5;

    fn scene() -> Scene {
        Scene::new(SceneConfig::default()).unwrap()
    }

    fn at(position: Vec3) -> EntityBuilder {
        EntityBuilder::new().with_component(Transform::from_position(position).unwrap())
    }

    fn position_of(scene: &Scene, guid: EntityGuid) -> Vec3 {
        scene.transforms().global_position(scene.world(), guid).unwrap()
    }

    #[test]
    fn spawned_hierarchy_propagates_world_positions() {
        let mut scene = scene();
        let root = scene.spawn(at(Vec3::X), None).unwrap();
        let child = scene.spawn(at(Vec3::Y), Some(root.guid())).unwrap();
        scene.update().unwrap();

        assert!(position_of(&scene, child.guid()).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), EPS));
        assert_eq!(scene.locator().parent_guid_of(child.guid()), Some(root.guid()));
        assert_eq!(scene.frame(), 1);
    }

    #[test]
    fn spawn_under_unknown_parent_fails() {
        let mut scene = scene();
        let missing = EntityGuid::new();
        assert!(scene.spawn(at(Vec3::ZERO), Some(missing)).is_err());
        assert_eq!(scene.world().entity_count(), 0);
    }

    #[test]
    fn despawn_cascades_to_descendants() {
        let mut scene = scene();
        let root = scene.spawn(at(Vec3::ZERO), None).unwrap();
        let child = scene.spawn(at(Vec3::ZERO), Some(root.guid())).unwrap();
        let grandchild = scene.spawn(at(Vec3::ZERO), Some(child.guid())).unwrap();
        let other = scene.spawn(at(Vec3::ZERO), None).unwrap();
        scene.update().unwrap();

        assert_eq!(scene.despawn(root.guid()).unwrap(), 3);
        for guid in [root.guid(), child.guid(), grandchild.guid()] {
            assert!(!scene.world().contains(guid));
            assert!(scene.locator().lookup(guid).is_none());
            assert!(scene.transforms().handle_of(guid).is_none());
        }
        assert!(scene.world().contains(other.guid()));
        assert_eq!(scene.transforms().backend().len(), 1);
        assert!(matches!(
            scene.despawn(root.guid()),
            Err(SceneError::UnknownEntity(_))
        ));
        scene.update().unwrap();
    }

    #[test]
    fn reparenting_moves_children_and_rejects_cycles() {
        let mut scene = scene();
        let a = scene.spawn(at(Vec3::new(10.0, 0.0, 0.0)), None).unwrap();
        let b = scene.spawn(at(Vec3::new(0.0, 10.0, 0.0)), None).unwrap();
        let child = scene.spawn(at(Vec3::Z), Some(a.guid())).unwrap();
        scene.update().unwrap();

        scene.set_parent(child.guid(), Some(b.guid())).unwrap();
        scene.update().unwrap();
        assert!(position_of(&scene, child.guid()).abs_diff_eq(Vec3::new(0.0, 10.0, 1.0), EPS));

        assert!(matches!(
            scene.set_parent(b.guid(), Some(child.guid())),
            Err(SceneError::InvalidParent { .. })
        ));
        assert!(matches!(
            scene.set_parent(b.guid(), Some(b.guid())),
            Err(SceneError::InvalidParent { .. })
        ));
        assert_eq!(scene.locator().parent_guid_of(b.guid()), None);

        scene.set_parent(child.guid(), None).unwrap();
        scene.update().unwrap();
        assert!(position_of(&scene, child.guid()).abs_diff_eq(Vec3::Z, EPS));
    }

    #[test]
    fn transforms_link_through_untransformed_ancestors() {
        let mut scene = scene();
        let root = scene.spawn(at(Vec3::X), None).unwrap();
        let group = scene
            .spawn(EntityBuilder::new().with_name("group"), Some(root.guid()))
            .unwrap();
        let leaf = scene.spawn(at(Vec3::Y), Some(group.guid())).unwrap();
        scene.update().unwrap();

        let leaf_transform = scene.world().get::<Transform>(leaf.guid()).unwrap();
        assert_eq!(leaf_transform.parent(), Some(root.guid()));
        assert!(position_of(&scene, leaf.guid()).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), EPS));
    }

    #[test]
    fn transform_added_mid_hierarchy_adopts_descendants() {
        let mut scene = scene();
        let root = scene.spawn(at(Vec3::X), None).unwrap();
        let group = scene
            .spawn(EntityBuilder::new().with_name("group"), Some(root.guid()))
            .unwrap();
        let leaf = scene.spawn(at(Vec3::Y), Some(group.guid())).unwrap();
        scene.update().unwrap();

        scene
            .add_component(
                group.guid(),
                Transform::from_position(Vec3::new(0.0, 0.0, 5.0)).unwrap(),
            )
            .unwrap();
        scene.update().unwrap();

        let leaf_transform = scene.world().get::<Transform>(leaf.guid()).unwrap();
        assert_eq!(leaf_transform.parent(), Some(group.guid()));
        let group_transform = scene.world().get::<Transform>(group.guid()).unwrap();
        assert_eq!(group_transform.parent(), Some(root.guid()));
        assert!(position_of(&scene, leaf.guid()).abs_diff_eq(Vec3::new(1.0, 1.0, 5.0), EPS));
    }

    #[test]
    fn raycast_returns_nearest_first_after_update() {
        let mut scene = scene();
        let far = scene
            .spawn(
                at(Vec3::new(0.0, 0.0, -5.0))
                    .with_name("far")
                    .with_component(Collidable::unit_box()),
                None,
            )
            .unwrap();
        let near = scene
            .spawn(
                at(Vec3::new(0.0, 0.0, -2.0))
                    .with_name("near")
                    .with_component(Collidable::unit_box()),
                None,
            )
            .unwrap();
        scene.update().unwrap();

        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        let hits = scene.raycast(&ray);
        assert_eq!(
            hits.iter().map(|h| h.guid).collect::<Vec<_>>(),
            vec![near.guid(), far.guid()]
        );
    }

    #[test]
    fn added_components_are_picked_up_by_systems() {
        let mut scene = scene();
        let entity = scene.spawn(EntityBuilder::new(), None).unwrap();
        scene
            .add_component(
                entity.guid(),
                Transform::from_position(Vec3::new(0.0, 0.0, -3.0)).unwrap(),
            )
            .unwrap();
        scene.add_component(entity.guid(), Renderable::default()).unwrap();
        scene.add_component(entity.guid(), Collidable::matching_renderable()).unwrap();
        scene.update().unwrap();

        assert!(scene.transforms().handle_of(entity.guid()).is_some());
        assert!(scene.collisions().is_registered(entity.guid()));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        assert_eq!(scene.raycast(&ray).len(), 1);
    }

    #[test]
    fn entities_built_into_the_world_are_adopted() {
        let mut scene = scene();
        let entity = at(Vec3::ONE).build(scene.world_mut()).unwrap();
        scene.update().unwrap();
        assert!(scene.locator().contains(entity.guid()));
        assert!(position_of(&scene, entity.guid()).abs_diff_eq(Vec3::ONE, EPS));
    }

    #[test]
    fn messages_reach_systems_through_their_buses() {
        let mut scene = scene();
        let lamp = scene
            .spawn(
                at(Vec3::ZERO).with_component(Light::new(LightKind::Point { falloff: 4.0 })),
                None,
            )
            .unwrap();
        scene.update().unwrap();

        scene
            .transforms()
            .base()
            .send(
                Message::new(MessageType::TransformUpdate)
                    .with(fields::ENTITY, lamp.guid())
                    .with(fields::POSITION, Vec3::new(0.0, 3.0, 0.0)),
            )
            .unwrap();
        scene
            .lights()
            .base()
            .send(
                Message::new(MessageType::LightToggle)
                    .with(fields::ENTITY, lamp.guid())
                    .with(fields::ENABLED, true),
            )
            .unwrap();
        scene.update().unwrap();

        let light = scene.world().get::<Light>(lamp.guid()).unwrap();
        assert!(light.world_position().abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), EPS));
    }

    #[test]
    fn material_changes_are_reported() {
        let mut scene = scene();
        let entity = scene
            .spawn(EntityBuilder::new().with_component(Material::new("unlit")), None)
            .unwrap();
        scene.update().unwrap();
        assert_eq!(scene.materials_mut().take_dirty(), vec![entity.guid()]);
    }

    #[test]
    fn custom_systems_run_after_builtins() {
        let mut scene = scene();
        let frames = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&frames);
        scene
            .add_system(FnSystem::new(SystemType::Custom(1), move |_| {
                *counter.lock() += 1;
                Ok(())
            }))
            .unwrap();
        scene.update().unwrap();
        scene.update().unwrap();
        assert_eq!(*frames.lock(), 2);
    }

    #[test]
    fn failing_custom_system_aborts_the_frame() {
        let mut scene = scene();
        scene
            .add_system(FnSystem::new(SystemType::Custom(2), |_| {
                anyhow::bail!("custom failure")
            }))
            .unwrap();
        assert!(scene.update().is_err());
        assert_eq!(scene.frame(), 0);
    }

    #[test]
    fn color_skybox_loads_through_the_strand() {
        let mut scene = scene();
        scene.load_skybox(&Skybox::Color(lumen_core::Color::WHITE));
        scene.load_indirect_light(&IndirectLight::Default);
        assert!(scene.environment_pending());
        scene.wait_for_environment().unwrap();
        assert!(!scene.environment_pending());
        assert_eq!(
            scene.skybox(),
            Some(&LoadedSkybox::Color(lumen_core::Color::WHITE))
        );
        assert_eq!(scene.indirect_light(), Some(&LoadedIndirectLight::Default));
    }

    #[test]
    fn missing_skybox_file_is_logged_not_fatal() {
        let mut scene = scene();
        scene.load_skybox(&Skybox::Ktx("/nonexistent/lumen/sky.ktx".into()));
        scene.wait_for_environment().unwrap();
        assert!(scene.skybox().is_none());
        scene.update().unwrap();
    }

    #[test]
    fn config_flags_reach_systems() {
        let scene = Scene::new(SceneConfig {
            collision_debug: true,
            force_recompute: true,
            ..Default::default()
        })
        .unwrap();
        assert!(scene.collisions().debug_visualization());
        assert!(scene.transforms().force_recompute());
    }
}
