use lumen_core::EntityGuid;

use crate::components::{Collidable, Light, Material, Renderable, Transform};
use crate::identity::{ComponentType, Identifiable, TypeTag};

/// Payload of a component, one variant per [`ComponentType`].
#[derive(Debug, Clone)]
pub enum ComponentData {
    Transform(Transform),
    Renderable(Renderable),
    Light(Light),
    Collidable(Collidable),
    Material(Material),
}

impl ComponentData {
    pub fn component_type(&self) -> ComponentType {
        match self {
            ComponentData::Transform(_) => ComponentType::Transform,
            ComponentData::Renderable(_) => ComponentType::Renderable,
            ComponentData::Light(_) => ComponentType::Light,
            ComponentData::Collidable(_) => ComponentType::Collidable,
            ComponentData::Material(_) => ComponentType::Material,
        }
    }
}

/// A component together with the GUID of the entity that owns it.
///
/// The owner is a non-owning back-reference: the [`World`](crate::World)
/// decides the component's lifetime. Cloning yields an independent copy that
/// is rebound when attached to another entity.
#[derive(Debug, Clone)]
pub struct Component {
    owner: Option<EntityGuid>,
    data: ComponentData,
}

impl Component {
    pub fn new(data: ComponentData) -> Self {
        Self { owner: None, data }
    }

    pub fn component_type(&self) -> ComponentType {
        self.data.component_type()
    }

    /// GUID of the owning entity, `None` until attached.
    pub fn owner(&self) -> Option<EntityGuid> {
        self.owner
    }

    pub(crate) fn bind(&mut self, owner: EntityGuid) {
        self.owner = Some(owner);
    }

    /// Copy of this component with no owner.
    pub fn detached(&self) -> Self {
        Self {
            owner: None,
            data: self.data.clone(),
        }
    }

    pub fn data(&self) -> &ComponentData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ComponentData {
        &mut self.data
    }

    /// Typed view of the payload.
    pub fn get<T: ComponentKind>(&self) -> Option<&T> {
        T::view(&self.data)
    }

    pub fn get_mut<T: ComponentKind>(&mut self) -> Option<&mut T> {
        T::view_mut(&mut self.data)
    }
}

impl Identifiable for Component {
    fn type_tag(&self) -> TypeTag {
        TypeTag::Component(self.component_type())
    }
}

/// Implemented by each concrete component payload type.
pub trait ComponentKind: Clone + Send + Sync + 'static + Into<Component> {
    const TYPE: ComponentType;

    fn view(data: &ComponentData) -> Option<&Self>;

    fn view_mut(data: &mut ComponentData) -> Option<&mut Self>;
}

macro_rules! component_kind {
    ($ty:ident) => {
        impl ComponentKind for $ty {
            const TYPE: ComponentType = ComponentType::$ty;

            fn view(data: &ComponentData) -> Option<&Self> {
                match data {
                    ComponentData::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn view_mut(data: &mut ComponentData) -> Option<&mut Self> {
                match data {
                    ComponentData::$ty(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Component {
            fn from(value: $ty) -> Self {
                Component::new(ComponentData::$ty(value))
            }
        }
    };
}

component_kind!(Transform);
component_kind!(Renderable);
component_kind!(Light);
component_kind!(Collidable);
component_kind!(Material);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::LightKind;

    #[test]
    fn typed_views_match_variant() {
        let component: Component = Light::new(LightKind::Sun).into();
        assert_eq!(component.component_type(), ComponentType::Light);
        assert!(component.get::<Light>().is_some());
        assert!(component.get::<Transform>().is_none());
        assert_eq!(
            component.type_tag(),
            TypeTag::Component(ComponentType::Light)
        );
    }

    #[test]
    fn detached_copy_drops_owner() {
        let mut component: Component = Renderable::default().into();
        component.bind(EntityGuid::new());
        assert!(component.owner().is_some());
        assert!(component.detached().owner().is_none());
    }

    #[test]
    fn clone_is_independent() {
        let mut original: Component = Renderable::default().into();
        let copy = original.clone();
        original.get_mut::<Renderable>().unwrap().visible = false;
        assert!(copy.get::<Renderable>().unwrap().visible);
    }
}
