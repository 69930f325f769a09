//! Ray intersection routines against the primitive shapes of the collision
//! geometry.
//!
//! All routines work in the local space of the shape. The ray direction
//! doesn't need to be normalised: the returned `t` is always expressed in
//! multiples of `ray.dir`.

use crate::math::{DVec3, Vec3};

/// Determinant below which a ray is considered parallel to a triangle.
const PARALLEL_TOLERANCE: f64 = 1e-12;

/// Tolerance on the barycentric coordinates so that rays hitting shared
/// edges don't slip between two triangles.
const BARYCENTRIC_TOLERANCE: f32 = f32::EPSILON * 2.0;

/// Ray with an origin and a direction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    /// Origin of the ray.
    pub org: Vec3,
    /// Direction of the ray.
    pub dir: Vec3,
}

impl Ray {
    /// Creates a new ray.
    pub const fn new(org: Vec3, dir: Vec3) -> Self { Self { org, dir } }

    /// Returns the point at parameter `t`.
    pub fn at(&self, t: f32) -> Vec3 { self.org + self.dir * t }
}

/// Ray-triangle intersection result.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RayTriIsect {
    /// Ray parameter of the hit.
    pub t: f32,
    /// Barycentric coordinate of the second vertex.
    pub u: f32,
    /// Barycentric coordinate of the third vertex.
    pub v: f32,
    /// Geometric normal of the triangle (winding order), normalised.
    pub n: Vec3,
    /// Hit position.
    pub p: Vec3,
}

/// Intersection of a ray with an analytic shape.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ShapeIsect {
    /// Ray parameter of the hit.
    pub t: f32,
    /// Outward normal at the hit, normalised.
    pub n: Vec3,
}

/// Möller-Trumbore ray-triangle intersection, two-sided.
///
/// Solves `O + tD = (1 - u - v)A + uB + vC` with Cramer's rule, evaluating
/// the determinants with scalar triple products in double precision.
///
/// # Arguments
///
/// * `ray` - The ray to intersect with the triangle.
/// * `triangle` - The triangle (array of 3 points) to intersect with the ray.
/// * `t_max` - Largest accepted ray parameter.
///
/// # Returns
///
/// [`RayTriIsect`] if the ray intersects the triangle in `(0, t_max]`,
/// otherwise `None`.
pub fn ray_tri_intersect_moller_trumbore(
    ray: &Ray,
    triangle: &[Vec3; 3],
    t_max: f32,
) -> Option<RayTriIsect> {
    let ray_d = ray.dir.as_dvec3();
    let ray_o = ray.org.as_dvec3();
    let p0 = triangle[0].as_dvec3();
    let p1 = triangle[1].as_dvec3();
    let p2 = triangle[2].as_dvec3();

    let e0 = p1 - p0;
    let e1 = p2 - p0;

    let d_cross_e1 = ray_d.cross(e1); // D x E1
    let det = d_cross_e1.dot(e0);

    if det.abs() < PARALLEL_TOLERANCE {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray_o - p0; // O - A

    let u = (d_cross_e1.dot(tvec) * inv_det) as f32; // (D x E1) . T / det
    if !(-BARYCENTRIC_TOLERANCE..=1.0 + BARYCENTRIC_TOLERANCE).contains(&u) {
        return None;
    }

    let tvec_cross_e0 = tvec.cross(e0); // T x E0
    let v = (tvec_cross_e0.dot(ray_d) * inv_det) as f32; // (T x E0) . D / det
    if v < -BARYCENTRIC_TOLERANCE || u + v > 1.0 + BARYCENTRIC_TOLERANCE {
        return None;
    }

    let t = (tvec_cross_e0.dot(e1) * inv_det) as f32; // (T x E0) . E1 / det
    if t <= 0.0 || t > t_max {
        return None;
    }

    let n = e0.cross(e1).normalize_or_zero();
    let p: DVec3 = (1.0 - u as f64 - v as f64) * p0 + u as f64 * p1 + v as f64 * p2;
    Some(RayTriIsect {
        t,
        u,
        v,
        n: n.as_vec3(),
        p: p.as_vec3(),
    })
}

/// Intersects a ray with a sphere centred at the origin.
///
/// A ray starting inside the sphere reports the exit point.
pub fn ray_sphere_intersect(ray: &Ray, radius: f32, t_max: f32) -> Option<ShapeIsect> {
    let oc = ray.org;
    let a = ray.dir.length_squared();
    let half_b = oc.dot(ray.dir);
    let c = oc.length_squared() - radius * radius;
    let discriminant = half_b * half_b - a * c;

    if a == 0.0 || discriminant < 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();
    let range = 0.0..=t_max;
    let mut root = (-half_b - sqrtd) / a;
    if !range.contains(&root) {
        root = (-half_b + sqrtd) / a;
        if !range.contains(&root) {
            return None;
        }
    }

    Some(ShapeIsect {
        t: root,
        n: ray.at(root).normalize_or_zero(),
    })
}

/// Intersects a ray with an axis aligned box centred at the origin using
/// the slab method.
///
/// A ray starting inside the box reports the exit point.
pub fn ray_box_intersect(ray: &Ray, half_extents: Vec3, t_max: f32) -> Option<ShapeIsect> {
    let inv_dir = ray.dir.recip();
    let t0 = (-half_extents - ray.org) * inv_dir;
    let t1 = (half_extents - ray.org) * inv_dir;
    let t_min = t0.min(t1);
    let t_far = t0.max(t1);

    let near = t_min.max_element();
    let far = t_far.min_element();
    if near > far || far < 0.0 {
        return None;
    }

    let (t, axis_values, sign) = if near >= 0.0 {
        (near, t_min, -1.0)
    } else {
        (far, t_far, 1.0)
    };
    if t > t_max {
        return None;
    }

    let axis = (0..3)
        .find(|&i| axis_values[i] == t)
        .unwrap_or(0);
    let mut n = Vec3::ZERO;
    n[axis] = sign * ray.dir[axis].signum();
    Some(ShapeIsect { t, n })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TRIANGLE: [Vec3; 3] = [
        Vec3::new(0.0, -1.0, -1.0),
        Vec3::new(0.0, 1.0, -1.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];

    #[test]
    fn ray_hits_triangle_head_on() {
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        let isect = ray_tri_intersect_moller_trumbore(&ray, &TRIANGLE, 100.0).unwrap();
        assert_relative_eq!(isect.t, 5.0, epsilon = 1e-5);
        assert!(isect.p.abs_diff_eq(Vec3::ZERO, 1e-5));
        assert_relative_eq!(isect.n.x.abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn ray_misses_triangle() {
        let outside = Ray::new(Vec3::new(-5.0, 0.0, 2.0), Vec3::X);
        assert!(ray_tri_intersect_moller_trumbore(&outside, &TRIANGLE, 100.0).is_none());
        let parallel = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::Y);
        assert!(ray_tri_intersect_moller_trumbore(&parallel, &TRIANGLE, 100.0).is_none());
        let behind = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::X);
        assert!(ray_tri_intersect_moller_trumbore(&behind, &TRIANGLE, 100.0).is_none());
        let too_far = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X);
        assert!(ray_tri_intersect_moller_trumbore(&too_far, &TRIANGLE, 4.0).is_none());
    }

    #[test]
    fn unnormalised_direction_scales_t() {
        let ray = Ray::new(Vec3::new(-5.0, 0.0, 0.0), Vec3::X * 2.0);
        let isect = ray_tri_intersect_moller_trumbore(&ray, &TRIANGLE, 100.0).unwrap();
        assert_relative_eq!(isect.t, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn ray_sphere() {
        let ray = Ray::new(Vec3::new(-10.0, 0.0, 0.0), Vec3::X);
        let isect = ray_sphere_intersect(&ray, 2.0, 100.0).unwrap();
        assert_relative_eq!(isect.t, 8.0, epsilon = 1e-5);
        assert!(isect.n.abs_diff_eq(Vec3::NEG_X, 1e-5));

        let inside = Ray::new(Vec3::ZERO, Vec3::Z);
        assert_relative_eq!(ray_sphere_intersect(&inside, 2.0, 100.0).unwrap().t, 2.0, epsilon = 1e-5);

        let miss = Ray::new(Vec3::new(-10.0, 3.0, 0.0), Vec3::X);
        assert!(ray_sphere_intersect(&miss, 2.0, 100.0).is_none());
    }

    #[test]
    fn ray_box() {
        let half = Vec3::new(1.0, 2.0, 3.0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        let isect = ray_box_intersect(&ray, half, 100.0).unwrap();
        assert_relative_eq!(isect.t, 7.0, epsilon = 1e-5);
        assert!(isect.n.abs_diff_eq(Vec3::Z, 1e-6));

        let miss = Ray::new(Vec3::new(5.0, 0.0, 10.0), Vec3::NEG_Z);
        assert!(ray_box_intersect(&miss, half, 100.0).is_none());
        assert!(ray_box_intersect(&ray, half, 6.0).is_none());
    }
}
