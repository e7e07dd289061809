use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use lumen_core::EntityGuid;
use lumen_ecs::components::{Material, MaterialValue};
use lumen_ecs::message::fields;
use lumen_ecs::{
    EntityObject, Message, MessageType, MessageValue, System, SystemBase, SystemType, World,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// A named material template: the parameters it accepts and their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDefinition {
    pub name: String,
    pub defaults: BTreeMap<String, MaterialValue>,
}

impl MaterialDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn with_default(mut self, parameter: impl Into<String>, value: MaterialValue) -> Self {
        self.defaults.insert(parameter.into(), value);
        self
    }

    pub fn declares(&self, parameter: &str) -> bool {
        self.defaults.contains_key(parameter)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ParameterRequest {
    entity: EntityGuid,
    name: String,
    value: MaterialValue,
}

impl ParameterRequest {
    fn from_message(message: &Message) -> anyhow::Result<Self> {
        let value = match message.field(fields::VALUE) {
            Some(MessageValue::Float(f)) => MaterialValue::Scalar(*f),
            Some(MessageValue::Int(i)) => MaterialValue::Scalar(*i as f32),
            Some(MessageValue::Bool(b)) => MaterialValue::Bool(*b),
            Some(MessageValue::Vec3(v)) => MaterialValue::Vec3(*v),
            Some(MessageValue::Color(c)) => MaterialValue::Color(*c),
            Some(MessageValue::Text(path)) => MaterialValue::Texture(path.clone()),
            Some(other) => anyhow::bail!("unsupported material parameter value {:?}", other),
            None => anyhow::bail!("material parameter message has no value"),
        };
        Ok(Self {
            entity: message.guid(fields::ENTITY)?,
            name: message.text(fields::NAME)?.to_string(),
            value,
        })
    }
}

/// Tracks material definitions and which entity materials need rebuilding.
pub struct MaterialSystem {
    base: SystemBase,
    definitions: HashMap<String, MaterialDefinition>,
    requests: Arc<Mutex<Vec<ParameterRequest>>>,
    dirty: Vec<EntityGuid>,
}

impl MaterialSystem {
    pub fn new() -> Self {
        Self {
            base: SystemBase::new(SystemType::Material),
            definitions: HashMap::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
            dirty: Vec::new(),
        }
    }

    /// Add or replace a definition. Returns the one it replaced.
    pub fn register_definition(
        &mut self,
        definition: MaterialDefinition,
    ) -> Option<MaterialDefinition> {
        debug!("Registered material definition '{}'", definition.name);
        self.definitions.insert(definition.name.clone(), definition)
    }

    pub fn definition(&self, name: &str) -> Option<&MaterialDefinition> {
        self.definitions.get(name)
    }

    /// Fill parameters the material does not set from its definition's defaults.
    pub fn apply_defaults(&self, world: &mut World, guid: EntityGuid) {
        let Some(material) = world.get_mut::<Material>(guid) else {
            return;
        };
        let Some(definition) = self.definitions.get(material.definition()) else {
            warn!(
                "Material of {} uses unknown definition '{}'",
                guid,
                material.definition()
            );
            return;
        };
        for (name, value) in &definition.defaults {
            if material.parameter(name).is_none() {
                material.set_parameter(name.clone(), value.clone());
            }
        }
    }

    /// Set a parameter on an entity's material. Returns `false` if the entity
    /// has no material or its definition does not declare the parameter.
    pub fn set_parameter(
        &self,
        world: &mut World,
        guid: EntityGuid,
        name: &str,
        value: MaterialValue,
    ) -> bool {
        let Some(material) = world.get_mut::<Material>(guid) else {
            warn!("Entity {} has no material", guid);
            return false;
        };
        if let Some(definition) = self.definitions.get(material.definition()) {
            if !definition.declares(name) {
                warn!(
                    "Material '{}' has no parameter '{}'",
                    definition.name, name
                );
                return false;
            }
        }
        material.set_parameter(name, value);
        true
    }

    /// Entities whose material changed since the last call, in spawn order.
    pub fn take_dirty(&mut self) -> Vec<EntityGuid> {
        std::mem::take(&mut self.dirty)
    }

    fn collect_dirty(&mut self, world: &mut World) {
        let dirty: Vec<EntityGuid> = world
            .query::<Material>()
            .filter(|(_, material)| material.is_dirty())
            .map(|(guid, _)| guid)
            .collect();
        for guid in dirty {
            if let Some(material) = world.get_mut::<Material>(guid) {
                material.clear_dirty();
            }
            if !self.dirty.contains(&guid) {
                self.dirty.push(guid);
            }
        }
    }
}

impl Default for MaterialSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for MaterialSystem {
    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn on_initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        let requests = Arc::clone(&self.requests);
        self.base
            .register_handler(MessageType::MaterialParameter, move |message| {
                requests.lock().push(ParameterRequest::from_message(message)?);
                Ok(())
            });
        Ok(())
    }

    fn update(&mut self, world: &mut World) -> anyhow::Result<()> {
        let requests = std::mem::take(&mut *self.requests.lock());
        for request in requests {
            self.set_parameter(world, request.entity, &request.name, request.value);
        }
        self.collect_dirty(world);
        Ok(())
    }

    fn on_entity_added(&mut self, world: &mut World, entity: &EntityObject) -> anyhow::Result<()> {
        self.apply_defaults(world, entity.guid());
        Ok(())
    }

    fn on_entity_removed(&mut self, _world: &World, entity: &EntityObject) {
        self.dirty.retain(|guid| *guid != entity.guid());
    }

    fn on_destroy(&mut self, _world: &mut World) {
        self.dirty.clear();
        self.requests.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Color;
    use lumen_ecs::{initialize_system, run_system, EntityBuilder};

    fn lit_definition() -> MaterialDefinition {
        MaterialDefinition::new("lit")
            .with_default("roughness", MaterialValue::Scalar(0.5))
            .with_default("baseColor", MaterialValue::Color(Color::WHITE))
    }

    #[test]
    fn defaults_fill_missing_parameters() {
        let mut world = World::new();
        let mut system = MaterialSystem::new();
        system.register_definition(lit_definition());
        let entity = EntityBuilder::new()
            .with_component(
                Material::new("lit").with_parameter("roughness", MaterialValue::Scalar(0.9)),
            )
            .build(&mut world)
            .unwrap();
        system.on_entity_added(&mut world, &entity).unwrap();

        let material = world.get::<Material>(entity.guid()).unwrap();
        assert_eq!(material.parameter("roughness"), Some(&MaterialValue::Scalar(0.9)));
        assert_eq!(
            material.parameter("baseColor"),
            Some(&MaterialValue::Color(Color::WHITE))
        );
    }

    #[test]
    fn parameter_messages_mark_materials_dirty() {
        let mut world = World::new();
        let mut system = MaterialSystem::new();
        system.register_definition(lit_definition());
        initialize_system(&mut system, &mut world).unwrap();
        let entity = EntityBuilder::new()
            .with_component(Material::new("lit"))
            .build(&mut world)
            .unwrap();
        run_system(&mut system, &mut world).unwrap();
        assert_eq!(system.take_dirty(), vec![entity.guid()]);
        run_system(&mut system, &mut world).unwrap();
        assert!(system.take_dirty().is_empty());

        system
            .base()
            .send(
                Message::new(MessageType::MaterialParameter)
                    .with(fields::ENTITY, entity.guid())
                    .with(fields::NAME, "roughness")
                    .with(fields::VALUE, 0.25f32),
            )
            .unwrap();
        run_system(&mut system, &mut world).unwrap();
        assert_eq!(system.take_dirty(), vec![entity.guid()]);
        assert_eq!(
            world.get::<Material>(entity.guid()).unwrap().parameter("roughness"),
            Some(&MaterialValue::Scalar(0.25))
        );
    }

    #[test]
    fn undeclared_parameter_is_rejected() {
        let mut world = World::new();
        let mut system = MaterialSystem::new();
        system.register_definition(lit_definition());
        let entity = EntityBuilder::new()
            .with_component(Material::new("lit"))
            .build(&mut world)
            .unwrap();
        let guid = entity.guid();
        assert!(!system.set_parameter(&mut world, guid, "metallic", MaterialValue::Scalar(1.0)));
        assert!(system.set_parameter(&mut world, guid, "roughness", MaterialValue::Scalar(1.0)));
    }

    #[test]
    fn unsupported_message_values_are_errors() {
        let message = Message::new(MessageType::MaterialParameter)
            .with(fields::ENTITY, EntityGuid::new())
            .with(fields::NAME, "roughness")
            .with(fields::VALUE, glam::Quat::IDENTITY);
        assert!(ParameterRequest::from_message(&message).is_err());
    }
}
