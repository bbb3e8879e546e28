//! §4.2 — the symmetric `Overlapper` BV-vs-BV dispatch table.
//!
//! The overlap test is only used to prune BVH descent, so it never needs to
//! produce a contact; every routine returns a plain `bool`.

use cgmath::prelude::*;

use crate::bv::{Aabb, BoundingVolume, CapsuleBv, Obb, RayBv, SphereBv};
use crate::primitive::PrimType;
use crate::Real;

/// Symmetric overlap dispatch. `Overlapper::init` exists for contract parity
/// with the C++ original (it resets per-call caches); this implementation
/// keeps no cache so it is a no-op.
#[derive(Debug, Default)]
pub struct Overlapper;

impl Overlapper {
    pub fn init() {}

    pub fn check(t1: PrimType, t2: PrimType, bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
        use PrimType::*;
        match (t1, t2) {
            (Box, Box) => obb_like_overlap(bv1, bv2),
            (Box, Sphere) => obb_like_vs_sphere(bv1, bv2),
            (Sphere, Box) => obb_like_vs_sphere(bv2, bv1),
            (Sphere, Sphere) => sphere_sphere(bv1, bv2),
            (Box, Capsule) => obb_like_vs_capsule(bv1, bv2),
            (Capsule, Box) => obb_like_vs_capsule(bv2, bv1),
            (Capsule, Capsule) => capsule_capsule(bv1, bv2),
            (Capsule, Sphere) => capsule_vs_sphere(bv1, bv2),
            (Sphere, Capsule) => capsule_vs_sphere(bv2, bv1),
            (Box, Ray) => obb_like_vs_ray(bv1, bv2),
            (Ray, Box) => obb_like_vs_ray(bv2, bv1),
            (Sphere, Ray) => sphere_vs_ray(bv1, bv2),
            (Ray, Sphere) => sphere_vs_ray(bv2, bv1),
            (Capsule, Ray) => capsule_vs_ray(bv1, bv2),
            (Ray, Capsule) => capsule_vs_ray(bv2, bv1),
            (Ray, Ray) => ray_ray(bv1, bv2),
            _ => default_overlap(),
        }
    }
}

fn default_overlap() -> bool {
    false
}

fn aabb_of(bv: &BoundingVolume) -> Aabb {
    bv.loose_aabb()
}

fn obb_like_overlap(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Aabb { aabb: a1, .. }, BoundingVolume::Aabb { aabb: a2, .. }) => a1.overlaps(a2),
        (BoundingVolume::Obb { obb: o1, .. }, BoundingVolume::Obb { obb: o2, .. }) => obb_obb_sat(o1, o2),
        _ => aabb_of(bv1).overlaps(&aabb_of(bv2)),
    }
}

fn obb_obb_sat(o1: &Obb, o2: &Obb) -> bool {
    // Separating-axis test over the 15 candidate axes (6 face normals + 9
    // cross products); any axis that separates the two boxes proves no
    // overlap.
    let d = o2.center - o1.center;
    let mut axes = Vec::with_capacity(15);
    axes.extend_from_slice(&o1.basis);
    axes.extend_from_slice(&o2.basis);
    for a in &o1.basis {
        for b in &o2.basis {
            let c = a.cross(*b);
            if c.magnitude2() > 1e-10 {
                axes.push(c.normalize());
            }
        }
    }
    for axis in axes {
        let r1 = o1.half.x * o1.basis[0].dot(axis).abs()
            + o1.half.y * o1.basis[1].dot(axis).abs()
            + o1.half.z * o1.basis[2].dot(axis).abs();
        let r2 = o2.half.x * o2.basis[0].dot(axis).abs()
            + o2.half.y * o2.basis[1].dot(axis).abs()
            + o2.half.z * o2.basis[2].dot(axis).abs();
        if d.dot(axis).abs() > r1 + r2 {
            return false;
        }
    }
    true
}

fn obb_like_vs_sphere(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    let sph = match bv2 {
        BoundingVolume::Sphere { sph, .. } => sph,
        _ => return false,
    };
    closest_point_on_bv(bv1, sph.center).distance2(sph.center) <= sph.r * sph.r
}

fn sphere_sphere(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Sphere { sph: s1, .. }, BoundingVolume::Sphere { sph: s2, .. }) => {
            s1.center.distance2(s2.center) <= (s1.r + s2.r) * (s1.r + s2.r)
        }
        _ => false,
    }
}

fn obb_like_vs_capsule(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    let cap = match bv2 {
        BoundingVolume::Capsule { cap, .. } => cap,
        _ => return false,
    };
    let seg_dist2 = closest_on_segment_to_bv(bv1, cap);
    seg_dist2 <= cap.r * cap.r
}

fn capsule_capsule(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Capsule { cap: c1, .. }, BoundingVolume::Capsule { cap: c2, .. }) => {
            let (_, _, d2) = segment_segment_closest(
                c1.center - c1.axis * c1.hh,
                c1.center + c1.axis * c1.hh,
                c2.center - c2.axis * c2.hh,
                c2.center + c2.axis * c2.hh,
            );
            d2 <= (c1.r + c2.r) * (c1.r + c2.r)
        }
        _ => false,
    }
}

fn capsule_vs_sphere(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Capsule { cap, .. }, BoundingVolume::Sphere { sph, .. }) => {
            let (p, _t) = closest_on_segment(cap.center - cap.axis * cap.hh, cap.center + cap.axis * cap.hh, sph.center);
            p.distance2(sph.center) <= (cap.r + sph.r) * (cap.r + sph.r)
        }
        _ => false,
    }
}

fn obb_like_vs_ray(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    let ray = match bv2 {
        BoundingVolume::Ray { ray, .. } => ray,
        _ => return false,
    };
    ray_vs_aabb(ray, &aabb_of(bv1))
}

fn sphere_vs_ray(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Sphere { sph, .. }, BoundingVolume::Ray { ray, .. }) => {
            let (p, _t) = closest_on_segment(ray.origin, ray.origin + ray.dir, sph.center);
            p.distance2(sph.center) <= sph.r * sph.r
        }
        _ => false,
    }
}

fn capsule_vs_ray(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Capsule { cap, .. }, BoundingVolume::Ray { ray, .. }) => {
            let (_, _, d2) = segment_segment_closest(
                cap.center - cap.axis * cap.hh,
                cap.center + cap.axis * cap.hh,
                ray.origin,
                ray.origin + ray.dir,
            );
            d2 <= cap.r * cap.r
        }
        _ => false,
    }
}

fn ray_ray(bv1: &BoundingVolume, bv2: &BoundingVolume) -> bool {
    match (bv1, bv2) {
        (BoundingVolume::Ray { ray: r1, .. }, BoundingVolume::Ray { ray: r2, .. }) => {
            let (_, _, d2) = segment_segment_closest(r1.origin, r1.origin + r1.dir, r2.origin, r2.origin + r2.dir);
            d2 <= 1e-8
        }
        _ => false,
    }
}

fn ray_vs_aabb(ray: &RayBv, aabb: &Aabb) -> bool {
    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    for axis in 0..3 {
        let (o, d, lo, hi) = match axis {
            0 => (ray.origin.x, ray.dir.x, aabb.min.x, aabb.max.x),
            1 => (ray.origin.y, ray.dir.y, aabb.min.y, aabb.max.y),
            _ => (ray.origin.z, ray.dir.z, aabb.min.z, aabb.max.z),
        };
        if d.abs() < 1e-12 {
            if o < lo || o > hi {
                return false;
            }
        } else {
            let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return false;
            }
        }
    }
    true
}

fn closest_point_on_bv(bv: &BoundingVolume, p: cgmath::Point3<Real>) -> cgmath::Point3<Real> {
    match bv {
        BoundingVolume::Aabb { aabb, .. } => cgmath::Point3::new(
            p.x.clamp(aabb.min.x, aabb.max.x),
            p.y.clamp(aabb.min.y, aabb.max.y),
            p.z.clamp(aabb.min.z, aabb.max.z),
        ),
        BoundingVolume::Obb { obb, .. } => {
            let d = p - obb.center;
            let lx = d.dot(obb.basis[0]).clamp(-obb.half.x, obb.half.x);
            let ly = d.dot(obb.basis[1]).clamp(-obb.half.y, obb.half.y);
            let lz = d.dot(obb.basis[2]).clamp(-obb.half.z, obb.half.z);
            obb.center + obb.basis[0] * lx + obb.basis[1] * ly + obb.basis[2] * lz
        }
        _ => aabb_of(bv).center(),
    }
}

fn closest_on_segment_to_bv(bv: &BoundingVolume, cap: &CapsuleBv) -> Real {
    let a = cap.center - cap.axis * cap.hh;
    let b = cap.center + cap.axis * cap.hh;
    // Sample the segment endpoints and midpoint against the BV's closest
    // point; sufficient for a conservative prune test, not an exact distance.
    let mut best = Real::INFINITY;
    for t in [0.0f32, 0.5, 1.0] {
        let p = a + (b - a) * t;
        let c = closest_point_on_bv(bv, p);
        best = best.min(c.distance2(p));
    }
    best
}

fn closest_on_segment(a: cgmath::Point3<Real>, b: cgmath::Point3<Real>, p: cgmath::Point3<Real>) -> (cgmath::Point3<Real>, Real) {
    let ab = b - a;
    let len2 = ab.magnitude2();
    let t = if len2 > 1e-12 { ((p - a).dot(ab) / len2).clamp(0.0, 1.0) } else { 0.0 };
    (a + ab * t, t)
}

/// Closest points between two segments; returns `(point on seg1, point on
/// seg2, squared distance)`.
pub(crate) fn segment_segment_closest(
    p1: cgmath::Point3<Real>,
    q1: cgmath::Point3<Real>,
    p2: cgmath::Point3<Real>,
    q2: cgmath::Point3<Real>,
) -> (cgmath::Point3<Real>, cgmath::Point3<Real>, Real) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.magnitude2();
    let e = d2.magnitude2();
    let f = d2.dot(r);

    let (mut s, mut t);
    if a <= 1e-12 && e <= 1e-12 {
        s = 0.0;
        t = 0.0;
    } else if a <= 1e-12 {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(r);
        if e <= 1e-12 {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            s = if denom.abs() > 1e-12 { ((b * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
            t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
        }
    }
    let c1 = p1 + d1 * s;
    let c2 = p2 + d2 * t;
    (c1, c2, c1.distance2(c2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Vector3};

    #[test]
    fn sphere_sphere_overlap() {
        let a = BoundingVolume::Sphere {
            node_id: 0,
            sph: SphereBv { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 },
        };
        let b = BoundingVolume::Sphere {
            node_id: 1,
            sph: SphereBv { center: Point3::new(1.5, 0.0, 0.0), r: 1.0 },
        };
        assert!(Overlapper::check(PrimType::Sphere, PrimType::Sphere, &a, &b));
    }

    #[test]
    fn sphere_sphere_miss() {
        let a = BoundingVolume::Sphere {
            node_id: 0,
            sph: SphereBv { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 },
        };
        let b = BoundingVolume::Sphere {
            node_id: 1,
            sph: SphereBv { center: Point3::new(3.0, 0.0, 0.0), r: 1.0 },
        };
        assert!(!Overlapper::check(PrimType::Sphere, PrimType::Sphere, &a, &b));
    }

    #[test]
    fn ray_aabb_hit() {
        let ray = BoundingVolume::Ray {
            node_id: 0,
            ray: RayBv { origin: Point3::new(-2.0, 0.0, 0.0), dir: Vector3::new(4.0, 0.0, 0.0) },
        };
        let b = BoundingVolume::Aabb {
            node_id: 1,
            aabb: Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)),
        };
        assert!(Overlapper::check(PrimType::Ray, PrimType::Box, &ray, &b));
    }
}
