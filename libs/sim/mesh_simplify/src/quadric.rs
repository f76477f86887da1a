//! Per-triangle plane quadrics and the mesh vertex attribute bundle they are
//! accumulated over.

use nalgebra::{Matrix3, Point3, Vector2, Vector3, Vector4};

/// A single mesh vertex. Position drives every topological operation in the
/// simplifier (coalescing, hashing, locking); the remaining attributes just
/// come along for the ride, averaged across whichever vertices collapse into
/// a survivor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub tangent: Vector4<f32>,
    pub uv: Vector2<f32>,
}

impl Vertex {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>, tangent: Vector4<f32>, uv: Vector2<f32>) -> Self {
        Self { position, normal, tangent, uv }
    }

    /// Average two vertices' non-positional attributes; `position` is left
    /// to the caller, since the collapse target is not always the midpoint.
    pub(crate) fn lerp_attributes(&self, other: &Self, t: f32) -> (Vector3<f32>, Vector4<f32>, Vector2<f32>) {
        let normal = self.normal.lerp(&other.normal, t);
        let tangent = self.tangent.lerp(&other.tangent, t);
        let uv = self.uv.lerp(&other.uv, t);
        (normal, tangent, uv)
    }
}

/// Accumulated quadric error metric: ten coefficients of the quadratic form
/// `Q(x,y,z) = a^2x^2 + b^2y^2 + c^2z^2 + d^2 + 2(ab*xy + ac*xz + ad*x + bc*yz + bd*y + cd*z)`
/// derived from one or more triangle plane equations `ax + by + cz + d = 0`
/// with `a^2 + b^2 + c^2 = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuadricSurface {
    pub a2: f64,
    pub b2: f64,
    pub c2: f64,
    pub d2: f64,
    pub ab: f64,
    pub ac: f64,
    pub ad: f64,
    pub bc: f64,
    pub bd: f64,
    pub cd: f64,
}

impl QuadricSurface {
    /// Build the quadric for a single triangle's supporting plane. Degenerate
    /// (zero-area) triangles produce the zero quadric, which contributes
    /// nothing to a merge.
    pub fn from_triangle(p0: &Point3<f32>, p1: &Point3<f32>, p2: &Point3<f32>) -> Self {
        let e1 = p1 - p0;
        let e2 = p2 - p0;
        let raw_normal = e1.cross(&e2);
        let len = raw_normal.norm();
        if len <= f32::EPSILON {
            return Self::default();
        }
        let n = raw_normal / len;
        let a = n.x as f64;
        let b = n.y as f64;
        let c = n.z as f64;
        let d = -(n.dot(&p0.coords)) as f64;
        Self {
            a2: a * a,
            b2: b * b,
            c2: c * c,
            d2: d * d,
            ab: a * b,
            ac: a * c,
            ad: a * d,
            bc: b * c,
            bd: b * d,
            cd: c * d,
        }
    }

    /// Coefficient-wise sum; quadrics of coincident planes simply add.
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            a2: self.a2 + other.a2,
            b2: self.b2 + other.b2,
            c2: self.c2 + other.c2,
            d2: self.d2 + other.d2,
            ab: self.ab + other.ab,
            ac: self.ac + other.ac,
            ad: self.ad + other.ad,
            bc: self.bc + other.bc,
            bd: self.bd + other.bd,
            cd: self.cd + other.cd,
        }
    }

    pub fn add_assign(&mut self, other: &Self) {
        *self = self.merge(other);
    }

    /// Evaluate the quadric at a point: the sum of squared distances to every
    /// plane folded into this quadric.
    pub fn distance_to_surface(&self, p: &Point3<f32>) -> f64 {
        let x = p.x as f64;
        let y = p.y as f64;
        let z = p.z as f64;
        self.a2 * x * x
            + self.b2 * y * y
            + self.c2 * z * z
            + self.d2
            + 2.0 * (self.ab * x * y + self.ac * x * z + self.ad * x + self.bc * y * z + self.bd * y + self.cd * z)
    }

    fn matrix_a(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.a2, self.ab, self.ac, //
            self.ab, self.b2, self.bc, //
            self.ac, self.bc, self.c2,
        )
    }

    /// Solve for the point minimizing this quadric, via the normal equations
    /// `A x = -b`. Returns `None` if `A` is (near-)singular, which the caller
    /// falls back to the edge midpoint for.
    pub fn solve_minimizing_vertex(&self) -> Option<Point3<f32>> {
        let a = self.matrix_a();
        let b = nalgebra::Vector3::new(self.ad, self.bd, self.cd);
        let decomp = a.lu();
        if decomp.determinant().abs() < 1.0e-12 {
            return None;
        }
        let x = decomp.solve(&(-b))?;
        Some(Point3::new(x.x as f32, x.y as f32, x.z as f32))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quadric_of_a_point_on_its_own_plane_is_zero() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(1.0, 0.0, 0.0);
        let p2 = Point3::new(0.0, 1.0, 0.0);
        let q = QuadricSurface::from_triangle(&p0, &p1, &p2);
        assert_relative_eq!(q.distance_to_surface(&Point3::new(0.3, 0.2, 0.0)), 0.0, epsilon = 1.0e-9);
    }

    #[test]
    fn quadric_grows_with_distance_off_plane() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(1.0, 0.0, 0.0);
        let p2 = Point3::new(0.0, 1.0, 0.0);
        let q = QuadricSurface::from_triangle(&p0, &p1, &p2);
        let near = q.distance_to_surface(&Point3::new(0.1, 0.1, 0.1));
        let far = q.distance_to_surface(&Point3::new(0.1, 0.1, 2.0));
        assert!(far > near);
    }

    #[test]
    fn degenerate_triangle_contributes_nothing() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(1.0, 0.0, 0.0);
        let p2 = Point3::new(2.0, 0.0, 0.0);
        let q = QuadricSurface::from_triangle(&p0, &p1, &p2);
        assert_eq!(q, QuadricSurface::default());
    }

    #[test]
    fn merging_two_coincident_planes_doubles_the_error() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(1.0, 0.0, 0.0);
        let p2 = Point3::new(0.0, 1.0, 0.0);
        let q = QuadricSurface::from_triangle(&p0, &p1, &p2);
        let merged = q.merge(&q);
        let at = Point3::new(0.0, 0.0, 1.0);
        assert_relative_eq!(merged.distance_to_surface(&at), 2.0 * q.distance_to_surface(&at), epsilon = 1.0e-9);
    }

    #[test]
    fn solve_minimizing_vertex_recovers_a_corner_from_three_planes() {
        let plane_x = QuadricSurface::from_triangle(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
        );
        let plane_y = QuadricSurface::from_triangle(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 0.0),
        );
        let plane_z = QuadricSurface::from_triangle(
            &Point3::new(0.0, 0.0, 0.0),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        );
        let merged = plane_x.merge(&plane_y).merge(&plane_z);
        let solved = merged.solve_minimizing_vertex().expect("three independent planes are non-singular");
        assert_relative_eq!(solved, Point3::new(0.0, 0.0, 0.0), epsilon = 1.0e-5);
    }
}
