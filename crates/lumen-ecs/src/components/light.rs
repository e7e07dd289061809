use glam::{Mat4, Vec3};
use lumen_core::Color;

/// Light source kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    /// A directional light that also renders a sun disk
    Sun,
    Point { falloff: f32 },
    Spot { falloff: f32, inner_cone: f32, outer_cone: f32 },
}

impl LightKind {
    /// Whether the light's position affects shading.
    pub fn is_positional(&self) -> bool {
        matches!(self, LightKind::Point { .. } | LightKind::Spot { .. })
    }

    /// Whether the light's orientation affects shading.
    pub fn is_directional(&self) -> bool {
        !matches!(self, LightKind::Point { .. })
    }
}

/// Light component. World position and direction are derived from the owning
/// entity's world matrix by the light system.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Color,
    /// Luminous intensity; lux for directional lights, lumen otherwise
    pub intensity: f32,
    pub cast_shadows: bool,
    enabled: bool,
    dirty: bool,
    world_position: Vec3,
    world_direction: Vec3,
}

impl Light {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            color: Color::WHITE,
            intensity: 100_000.0,
            cast_shadows: false,
            enabled: true,
            dirty: true,
            world_position: Vec3::ZERO,
            world_direction: Vec3::NEG_Z,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_position
    }

    /// Direction the light points at; lights face -Z in local space.
    pub fn world_direction(&self) -> Vec3 {
        self.world_direction
    }

    /// Derive world position and direction from the owner's world matrix.
    pub fn update_from_world(&mut self, world: &Mat4) {
        let position = world.transform_point3(Vec3::ZERO);
        let direction = world.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
        if position != self.world_position || direction != self.world_direction {
            self.world_position = position;
            self.world_direction = direction;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn world_direction_follows_rotation() {
        let mut light = Light::new(LightKind::Directional);
        light.clear_dirty();
        let world = Mat4::from_rotation_translation(
            Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
            Vec3::new(0.0, 10.0, 0.0),
        );
        light.update_from_world(&world);
        assert!(light.is_dirty());
        assert!(light.world_direction().abs_diff_eq(Vec3::NEG_Y, 1e-5));
        assert!(light.world_position().abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-5));
    }

    #[test]
    fn toggling_marks_dirty() {
        let mut light = Light::new(LightKind::Point { falloff: 5.0 });
        light.clear_dirty();
        light.set_enabled(true);
        assert!(!light.is_dirty());
        light.set_enabled(false);
        assert!(light.is_dirty());
        assert!(!light.is_enabled());
    }
}
