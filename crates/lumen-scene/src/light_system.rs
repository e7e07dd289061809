use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat4;
use lumen_core::EntityGuid;
use lumen_ecs::components::{Light, Transform};
use lumen_ecs::message::fields;
use lumen_ecs::{EntityObject, MessageType, System, SystemBase, SystemType, World};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Derives world-space position and direction of every light from its
/// entity's world matrix.
pub struct LightSystem {
    base: SystemBase,
    seen: HashMap<EntityGuid, Mat4>,
    toggles: Arc<Mutex<Vec<(EntityGuid, bool)>>>,
}

impl LightSystem {
    pub fn new() -> Self {
        Self {
            base: SystemBase::new(SystemType::Light),
            seen: HashMap::new(),
            toggles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enabled lights in spawn order.
    pub fn enabled_lights(&self, world: &World) -> Vec<EntityGuid> {
        world
            .query::<Light>()
            .filter(|(_, light)| light.is_enabled())
            .map(|(guid, _)| guid)
            .collect()
    }

    fn apply_toggles(&mut self, world: &mut World) {
        let toggles = std::mem::take(&mut *self.toggles.lock());
        for (guid, enabled) in toggles {
            match world.get_mut::<Light>(guid) {
                Some(light) => light.set_enabled(enabled),
                None => warn!("Light toggle for {} ignored: no light", guid),
            }
        }
    }

    /// Refresh lights whose owner moved or whose state changed. Returns how
    /// many lights were refreshed.
    pub fn refresh(&mut self, world: &mut World) -> usize {
        self.apply_toggles(world);

        let matrices: Vec<(EntityGuid, Mat4)> = world
            .query::<Light>()
            .map(|(guid, _)| {
                let matrix = world
                    .get::<Transform>(guid)
                    .map(Transform::last_world_matrix)
                    .unwrap_or(Mat4::IDENTITY);
                (guid, matrix)
            })
            .collect();

        let mut refreshed = 0;
        for (guid, matrix) in matrices {
            let moved = self.seen.get(&guid) != Some(&matrix);
            let Some(light) = world.get_mut::<Light>(guid) else {
                continue;
            };
            if !moved && !light.is_dirty() {
                continue;
            }
            if light.is_enabled() {
                light.update_from_world(&matrix);
            }
            light.clear_dirty();
            self.seen.insert(guid, matrix);
            refreshed += 1;
        }
        if refreshed > 0 {
            debug!("Refreshed {} lights", refreshed);
        }
        refreshed
    }
}

impl Default for LightSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for LightSystem {
    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn on_initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        let toggles = Arc::clone(&self.toggles);
        self.base.register_handler(MessageType::LightToggle, move |message| {
            let entity = message.guid(fields::ENTITY)?;
            let enabled = message.bool(fields::ENABLED)?;
            toggles.lock().push((entity, enabled));
            Ok(())
        });
        Ok(())
    }

    fn update(&mut self, world: &mut World) -> anyhow::Result<()> {
        self.refresh(world);
        Ok(())
    }

    fn on_entity_removed(&mut self, _world: &World, entity: &EntityObject) {
        self.seen.remove(&entity.guid());
    }

    fn on_destroy(&mut self, _world: &mut World) {
        self.seen.clear();
        self.toggles.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};
    use lumen_ecs::components::LightKind;
    use lumen_ecs::{initialize_system, run_system, EntityBuilder, Message};

    fn placed(world_matrix: Mat4) -> Transform {
        let mut transform = Transform::new();
        transform.set_world_matrix(world_matrix);
        transform.clear_dirty();
        transform
    }

    #[test]
    fn light_follows_world_matrix() {
        let mut world = World::new();
        let mut system = LightSystem::new();
        let matrix = Mat4::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(0.0, 5.0, 0.0),
        );
        let entity = EntityBuilder::new()
            .with_component(placed(matrix))
            .with_component(Light::new(LightKind::Spot {
                falloff: 10.0,
                inner_cone: 0.3,
                outer_cone: 0.5,
            }))
            .build(&mut world)
            .unwrap();

        assert_eq!(system.refresh(&mut world), 1);
        let light = world.get::<Light>(entity.guid()).unwrap();
        assert!(light.world_position().abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-5));
        assert!(light.world_direction().abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(!light.is_dirty());

        assert_eq!(system.refresh(&mut world), 0);
    }

    #[test]
    fn toggle_messages_enable_and_disable() {
        let mut world = World::new();
        let mut system = LightSystem::new();
        initialize_system(&mut system, &mut world).unwrap();
        let entity = EntityBuilder::new()
            .with_component(Light::new(LightKind::Sun))
            .build(&mut world)
            .unwrap();
        run_system(&mut system, &mut world).unwrap();
        assert_eq!(system.enabled_lights(&world), vec![entity.guid()]);

        system
            .base()
            .send(
                Message::new(MessageType::LightToggle)
                    .with(fields::ENTITY, entity.guid())
                    .with(fields::ENABLED, false),
            )
            .unwrap();
        run_system(&mut system, &mut world).unwrap();
        assert!(system.enabled_lights(&world).is_empty());
        assert!(!world.get::<Light>(entity.guid()).unwrap().is_enabled());
    }
}
