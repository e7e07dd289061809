use std::collections::BTreeMap;

use glam::{Vec3, Vec4};
use lumen_core::Color;

/// Value of a named material parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialValue {
    Scalar(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Color(Color),
    Bool(bool),
    Texture(String),
}

/// Material instance bound to an entity, referencing a named definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    definition: String,
    parameters: BTreeMap<String, MaterialValue>,
    dirty: bool,
}

impl Material {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            parameters: BTreeMap::new(),
            dirty: true,
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: MaterialValue) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn parameter(&self, name: &str) -> Option<&MaterialValue> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &MaterialValue)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set a parameter. Returns the previous value, if any.
    pub fn set_parameter(
        &mut self,
        name: impl Into<String>,
        value: MaterialValue,
    ) -> Option<MaterialValue> {
        self.dirty = true;
        self.parameters.insert(name.into(), value)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}
