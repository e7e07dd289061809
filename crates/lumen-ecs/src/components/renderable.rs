use lumen_core::Aabb;

/// Rendering flags of an entity backed by a model or primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    pub visible: bool,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    /// Draw order bucket, 0 drawn first
    pub priority: u8,
    /// Local-space bounds of the attached geometry
    pub bounds: Aabb,
    /// Asset identifier of the attached model, if any
    pub model: Option<String>,
}

impl Default for Renderable {
    fn default() -> Self {
        Self {
            visible: true,
            cast_shadows: true,
            receive_shadows: true,
            priority: 4,
            bounds: Aabb::unit(),
            model: None,
        }
    }
}

impl Renderable {
    pub fn with_bounds(bounds: Aabb) -> Self {
        Self {
            bounds,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
