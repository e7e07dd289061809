use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use lumen_core::{Color, EntityGuid, Ray};

use crate::error::MessageError;

/// Message type tags. Handlers subscribe by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// Set position/rotation/scale of an entity's transform
    TransformUpdate,
    /// An entity's parent changed
    ParentChanged,
    /// Ray query against registered collidables
    CollisionQuery,
    /// Results of a collision query
    CollisionResult,
    /// Enable or disable a light
    LightToggle,
    /// Set a named material parameter
    MaterialParameter,
    /// An entity left the scene
    EntityRemoved,
    /// An asynchronous asset load finished
    AssetLoaded,
    Custom(u32),
}

/// Well-known payload field names.
pub mod fields {
    pub const ENTITY: &str = "entity";
    pub const PARENT: &str = "parent";
    pub const POSITION: &str = "position";
    pub const ROTATION: &str = "rotation";
    pub const SCALE: &str = "scale";
    pub const RAY: &str = "ray";
    pub const REQUESTER: &str = "requester";
    pub const EVENT: &str = "event";
    pub const ENABLED: &str = "enabled";
    pub const NAME: &str = "name";
    pub const VALUE: &str = "value";
    pub const COUNT: &str = "count";
}

/// Typed payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Text(String),
    Guid(EntityGuid),
    Vec3(Vec3),
    Quat(Quat),
    Color(Color),
    Ray(Ray),
}

impl MessageValue {
    fn kind(&self) -> &'static str {
        match self {
            MessageValue::Bool(_) => "bool",
            MessageValue::Int(_) => "int",
            MessageValue::Float(_) => "float",
            MessageValue::Text(_) => "text",
            MessageValue::Guid(_) => "guid",
            MessageValue::Vec3(_) => "vec3",
            MessageValue::Quat(_) => "quat",
            MessageValue::Color(_) => "color",
            MessageValue::Ray(_) => "ray",
        }
    }
}

macro_rules! message_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for MessageValue {
                fn from(value: $ty) -> Self {
                    MessageValue::$variant(value)
                }
            }
        )*
    };
}

message_value_from! {
    bool => Bool,
    i64 => Int,
    f32 => Float,
    String => Text,
    EntityGuid => Guid,
    Vec3 => Vec3,
    Quat => Quat,
    Color => Color,
    Ray => Ray,
}

impl From<&str> for MessageValue {
    fn from(value: &str) -> Self {
        MessageValue::Text(value.to_string())
    }
}

/// A message carrying one or more type tags and named payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    types: Vec<MessageType>,
    fields: BTreeMap<&'static str, MessageValue>,
}

impl Message {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            types: vec![message_type],
            fields: BTreeMap::new(),
        }
    }

    /// Add another type tag. Duplicate tags are ignored.
    pub fn also(mut self, message_type: MessageType) -> Self {
        if !self.types.contains(&message_type) {
            self.types.push(message_type);
        }
        self
    }

    pub fn with(mut self, key: &'static str, value: impl Into<MessageValue>) -> Self {
        self.fields.insert(key, value.into());
        self
    }

    /// The first tag the message was created with.
    pub fn primary_type(&self) -> MessageType {
        self.types[0]
    }

    pub fn types(&self) -> &[MessageType] {
        &self.types
    }

    pub fn has_type(&self, message_type: MessageType) -> bool {
        self.types.contains(&message_type)
    }

    pub fn field(&self, key: &str) -> Option<&MessageValue> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    fn typed<'a, T>(
        &'a self,
        key: &'static str,
        expected: &'static str,
        extract: impl FnOnce(&'a MessageValue) -> Option<T>,
    ) -> Result<T, MessageError> {
        let value = self.fields.get(key).ok_or(MessageError::MissingField {
            message_type: self.primary_type(),
            key,
        })?;
        extract(value).ok_or(MessageError::WrongFieldType {
            message_type: self.primary_type(),
            key,
            expected,
        })
    }

    pub fn guid(&self, key: &'static str) -> Result<EntityGuid, MessageError> {
        self.typed(key, "guid", |v| match v {
            MessageValue::Guid(g) => Some(*g),
            MessageValue::Text(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn bool(&self, key: &'static str) -> Result<bool, MessageError> {
        self.typed(key, "bool", |v| match v {
            MessageValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    pub fn int(&self, key: &'static str) -> Result<i64, MessageError> {
        self.typed(key, "int", |v| match v {
            MessageValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    /// Float field; integer payloads are widened.
    pub fn float(&self, key: &'static str) -> Result<f32, MessageError> {
        self.typed(key, "float", |v| match v {
            MessageValue::Float(f) => Some(*f),
            MessageValue::Int(i) => Some(*i as f32),
            _ => None,
        })
    }

    pub fn text(&self, key: &'static str) -> Result<&str, MessageError> {
        self.typed(key, "text", |v| match v {
            MessageValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn vec3(&self, key: &'static str) -> Result<Vec3, MessageError> {
        self.typed(key, "vec3", |v| match v {
            MessageValue::Vec3(v) => Some(*v),
            _ => None,
        })
    }

    pub fn quat(&self, key: &'static str) -> Result<Quat, MessageError> {
        self.typed(key, "quat", |v| match v {
            MessageValue::Quat(q) => Some(*q),
            _ => None,
        })
    }

    pub fn color(&self, key: &'static str) -> Result<Color, MessageError> {
        self.typed(key, "color", |v| match v {
            MessageValue::Color(c) => Some(*c),
            _ => None,
        })
    }

    pub fn ray(&self, key: &'static str) -> Result<Ray, MessageError> {
        self.typed(key, "ray", |v| match v {
            MessageValue::Ray(r) => Some(*r),
            _ => None,
        })
    }

    /// Name of the payload kind stored under `key`, for diagnostics.
    pub fn field_kind(&self, key: &str) -> Option<&'static str> {
        self.fields.get(key).map(MessageValue::kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_deduplicated() {
        let msg = Message::new(MessageType::CollisionQuery)
            .also(MessageType::Custom(3))
            .also(MessageType::CollisionQuery);
        assert_eq!(
            msg.types(),
            &[MessageType::CollisionQuery, MessageType::Custom(3)]
        );
        assert_eq!(msg.primary_type(), MessageType::CollisionQuery);
    }

    #[test]
    fn typed_field_access() {
        let guid = EntityGuid::new();
        let msg = Message::new(MessageType::LightToggle)
            .with(fields::ENTITY, guid)
            .with(fields::ENABLED, false)
            .with(fields::VALUE, 3i64);
        assert_eq!(msg.guid(fields::ENTITY).unwrap(), guid);
        assert!(!msg.bool(fields::ENABLED).unwrap());
        assert_eq!(msg.float(fields::VALUE).unwrap(), 3.0);
        assert_eq!(msg.field_kind(fields::VALUE), Some("int"));
    }

    #[test]
    fn guid_accepts_text_payload() {
        let guid = EntityGuid::new();
        let msg = Message::new(MessageType::EntityRemoved).with(fields::ENTITY, guid.to_string());
        assert_eq!(msg.guid(fields::ENTITY).unwrap(), guid);
    }

    #[test]
    fn missing_and_mistyped_fields_are_errors() {
        let msg = Message::new(MessageType::TransformUpdate).with(fields::POSITION, "up");
        assert_eq!(
            msg.guid(fields::ENTITY),
            Err(MessageError::MissingField {
                message_type: MessageType::TransformUpdate,
                key: fields::ENTITY,
            })
        );
        assert_eq!(
            msg.vec3(fields::POSITION),
            Err(MessageError::WrongFieldType {
                message_type: MessageType::TransformUpdate,
                key: fields::POSITION,
                expected: "vec3",
            })
        );
    }
}
