//! Rays and bounding volumes for spatial queries

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// A half-line with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    direction: Vec3,
}

impl Ray {
    /// Create a ray. Returns `None` if the direction is zero-length or not finite.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        if !origin.is_finite() {
            return None;
        }
        let direction = direction.try_normalize()?;
        Some(Self { origin, direction })
    }

    /// Unit direction of the ray
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray/sphere intersection. Returns the entry distance, or 0 when the
    /// origin is inside the sphere.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - radius * radius;
        if c > 0.0 && b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        Some((-b - discriminant.sqrt()).max(0.0))
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Create an AABB centered at a point with the given half extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half_extents = half_extents.abs();
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// The unit cube centered on the origin (half extent 0.5)
    pub fn unit() -> Self {
        Self::from_center_half_extents(Vec3::ZERO, Vec3::splat(0.5))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Bounds of this box after applying an affine transform.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extents();
        // Arvo: project the half extents onto the absolute basis vectors.
        let x = matrix.x_axis.truncate().abs() * half.x;
        let y = matrix.y_axis.truncate().abs() * half.y;
        let z = matrix.z_axis.truncate().abs() * half.z;
        Self::from_center_half_extents(center, x + y + z)
    }

    /// Slab test. Returns the entry distance along the ray, or 0 when the
    /// origin is inside the box.
    ///
    /// An axis the ray runs parallel to only constrains the origin.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let direction = ray.direction();
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let (min, max) = (self.min[axis], self.max[axis]);
            if direction[axis] == 0.0 {
                if origin < min || origin > max {
                    return None;
                }
                continue;
            }
            let inv = direction[axis].recip();
            let t1 = (min - origin) * inv;
            let t2 = (max - origin) * inv;
            tmin = tmin.max(t1.min(t2));
            tmax = tmax.min(t1.max(t2));
        }

        if tmax >= tmin.max(0.0) {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ray_rejects_zero_direction() {
        assert!(Ray::new(Vec3::ZERO, Vec3::ZERO).is_none());
        assert!(Ray::new(Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 0.0)).is_none());
    }

    #[test]
    fn ray_direction_is_normalized() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0)).unwrap();
        assert_eq!(ray.direction(), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(ray.at(2.0), Vec3::new(0.0, 0.0, -2.0));
    }

    #[test]
    fn ray_hits_box_in_front() {
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(0.5));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        let t = aabb.intersect_ray(&ray).unwrap();
        assert!((t - 4.5).abs() < 1e-5);
    }

    #[test]
    fn ray_misses_box_behind() {
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 5.0), Vec3::splat(0.5));
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        assert!(aabb.intersect_ray(&ray).is_none());
    }

    #[test]
    fn ray_along_box_face_hits() {
        let aabb = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(0.5));
        let grazing = Ray::new(Vec3::new(0.5, 0.0, 0.0), Vec3::NEG_Z).unwrap();
        let t = aabb.intersect_ray(&grazing).unwrap();
        assert!((t - 4.5).abs() < 1e-5);

        let outside = Ray::new(Vec3::new(0.6, 0.0, 0.0), Vec3::NEG_Z).unwrap();
        assert!(aabb.intersect_ray(&outside).is_none());
    }

    #[test]
    fn ray_inside_box_hits_at_zero() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X).unwrap();
        assert_eq!(Aabb::unit().intersect_ray(&ray), Some(0.0));
    }

    #[test]
    fn ray_sphere_intersection() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X).unwrap();
        let t = ray.intersect_sphere(Vec3::new(3.0, 0.0, 0.0), 1.0).unwrap();
        assert!((t - 2.0).abs() < 1e-5);
        assert!(ray.intersect_sphere(Vec3::new(-3.0, 0.0, 0.0), 1.0).is_none());
        assert!(ray.intersect_sphere(Vec3::new(3.0, 5.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn transformed_box_follows_translation_and_scale() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(1.0, 0.0, 0.0),
        );
        let aabb = Aabb::unit().transformed(&m);
        assert!(aabb.min.abs_diff_eq(Vec3::new(0.0, -1.0, -1.0), 1e-5));
        assert!(aabb.max.abs_diff_eq(Vec3::new(2.0, 1.0, 1.0), 1e-5));
    }

    #[test]
    fn contains_point() {
        let aabb = Aabb::unit();
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(!aabb.contains_point(Vec3::new(1.0, 0.0, 0.0)));
    }
}
