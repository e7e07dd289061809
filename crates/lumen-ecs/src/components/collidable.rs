use glam::Vec3;

/// Shape descriptor of a collidable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionShape {
    /// Copy the bounding box of the attached renderable
    MatchRenderable,
    Box { center: Vec3, half_extents: Vec3 },
    Sphere { center: Vec3, radius: f32 },
}

/// Marks an entity as a target for collision queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Collidable {
    pub shape: CollisionShape,
    /// Static collidables never move after registration
    pub is_static: bool,
    /// Static only: use the attached renderable's bounds, whatever the shape
    pub match_attached_object: bool,
    pub enabled: bool,
}

impl Collidable {
    pub fn new(shape: CollisionShape) -> Self {
        Self {
            shape,
            is_static: false,
            match_attached_object: false,
            enabled: true,
        }
    }

    /// Unit cube centered on the entity origin.
    pub fn unit_box() -> Self {
        Self::new(CollisionShape::Box {
            center: Vec3::ZERO,
            half_extents: Vec3::splat(0.5),
        })
    }

    pub fn sphere(radius: f32) -> Self {
        Self::new(CollisionShape::Sphere {
            center: Vec3::ZERO,
            radius,
        })
    }

    pub fn matching_renderable() -> Self {
        Self::new(CollisionShape::MatchRenderable)
    }

    pub fn as_static(mut self, match_attached_object: bool) -> Self {
        self.is_static = true;
        self.match_attached_object = match_attached_object;
        self
    }
}
