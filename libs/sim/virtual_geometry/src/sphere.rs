//! Minimum-enclosing bounding spheres for cluster and cluster-group culling.

use nalgebra::Point3;

/// A world-space bounding sphere: `(center, radius)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn zero() -> Self {
        Self { center: Point3::origin(), radius: 0.0 }
    }

    /// Approximate minimum enclosing sphere via Ritter's algorithm: an
    /// initial sphere from the two farthest-apart points of a bounding-box
    /// probe, grown to cover every remaining point. Not the true minimal
    /// sphere but a tight, cheap bound, which is all cluster culling needs.
    pub fn enclosing(points: &[Point3<f32>]) -> Self {
        if points.is_empty() {
            return Self::zero();
        }
        if points.len() == 1 {
            return Self::new(points[0], 0.0);
        }

        let mut min_axis = [points[0]; 3];
        let mut max_axis = [points[0]; 3];
        for &p in points {
            for axis in 0..3 {
                if p[axis] < min_axis[axis][axis] {
                    min_axis[axis] = p;
                }
                if p[axis] > max_axis[axis][axis] {
                    max_axis[axis] = p;
                }
            }
        }

        let mut best_pair = (min_axis[0], max_axis[0]);
        let mut best_dist2 = (best_pair.0 - best_pair.1).norm_squared();
        for axis in 1..3 {
            let dist2 = (min_axis[axis] - max_axis[axis]).norm_squared();
            if dist2 > best_dist2 {
                best_dist2 = dist2;
                best_pair = (min_axis[axis], max_axis[axis]);
            }
        }

        let mut center = Point3::from((best_pair.0.coords + best_pair.1.coords) * 0.5);
        let mut radius = best_dist2.sqrt() * 0.5;

        for &p in points {
            let dist = (p - center).norm();
            if dist > radius {
                let new_radius = (radius + dist) * 0.5;
                let k = (new_radius - radius) / dist;
                center = Point3::from(center.coords + (p - center) * k);
                radius = new_radius;
            }
        }

        Self::new(center, radius)
    }

    /// Smallest sphere enclosing both `self` and every sphere in `others`.
    pub fn merge_all<'a>(spheres: impl Iterator<Item = &'a BoundingSphere>) -> Self {
        let mut acc: Option<BoundingSphere> = None;
        for s in spheres {
            acc = Some(match acc {
                None => *s,
                Some(a) => a.merge(s),
            });
        }
        acc.unwrap_or_else(BoundingSphere::zero)
    }

    pub fn merge(&self, other: &BoundingSphere) -> BoundingSphere {
        let d = (other.center - self.center).norm();
        if d + other.radius <= self.radius {
            return *self;
        }
        if d + self.radius <= other.radius {
            return *other;
        }
        let new_radius = (self.radius + other.radius + d) * 0.5;
        let dir = if d > f32::EPSILON { (other.center - self.center) / d } else { nalgebra::Vector3::new(0.0, 0.0, 0.0) };
        let new_center = self.center + dir * (new_radius - self.radius);
        BoundingSphere::new(new_center, new_radius)
    }
}
