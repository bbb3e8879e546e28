//! Canonical primitive shape records (§3 of the spec).
//!
//! Every primitive carries its parameters in a single local frame; the
//! driver (`driver.rs`) is responsible for expressing two primitives in a
//! shared frame before handing them to the overlap/intersection/unprojection
//! dispatch tables.

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::Real;

/// Number of primitive kinds; also the row/column count of every dispatch
/// table (`Overlapper`, `Intersector`, `Unprojector`).
pub const NPRIMS: usize = 8;

/// Tag identifying which variant of [`Primitive`] (or, reusing the same tag
/// space, which [`crate::bv::BoundingVolume`]) a value is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    Triangle = 0,
    Box = 1,
    Cylinder = 2,
    Capsule = 3,
    Sphere = 4,
    Ray = 5,
    Plane = 6,
    Heightfield = 7,
}

impl PrimType {
    /// Index into an `NPRIMS x NPRIMS` dispatch table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// All primitive tags, in table order.
    pub const ALL: [PrimType; NPRIMS] = [
        PrimType::Triangle,
        PrimType::Box,
        PrimType::Cylinder,
        PrimType::Capsule,
        PrimType::Sphere,
        PrimType::Ray,
        PrimType::Plane,
        PrimType::Heightfield,
    ];
}

/// Three vertices and a precomputed unit normal.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub pt: [Point3<Real>; 3],
    pub n: Vector3<Real>,
}

impl Triangle {
    pub fn new(a: Point3<Real>, b: Point3<Real>, c: Point3<Real>) -> Self {
        let n = (b - a).cross(c - a);
        let n = if n.magnitude2() > 1e-10 {
            n.normalize()
        } else {
            Vector3::unit_z()
        };
        Triangle { pt: [a, b, c], n }
    }

    /// Edge `i` as `(start, end)`, `i` in `0..3`.
    pub fn edge(&self, i: usize) -> (Point3<Real>, Point3<Real>) {
        (self.pt[i], self.pt[(i + 1) % 3])
    }
}

/// Center, orthonormal basis (as three rows), non-negative half-extents, and
/// whether the box is free to rotate (`oriented`) or always axis-aligned.
#[derive(Debug, Clone)]
pub struct Box3 {
    pub center: Point3<Real>,
    pub basis: [Vector3<Real>; 3],
    pub size: Vector3<Real>,
    pub oriented: bool,
}

impl Box3 {
    pub fn axis_aligned(center: Point3<Real>, size: Vector3<Real>) -> Self {
        Box3 {
            center,
            basis: [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()],
            size,
            oriented: false,
        }
    }

    /// Coordinates of `p` expressed along the box's three basis rows.
    pub fn local_coords(&self, p: Point3<Real>) -> Vector3<Real> {
        let d = p - self.center;
        Vector3::new(d.dot(self.basis[0]), d.dot(self.basis[1]), d.dot(self.basis[2]))
    }

    /// World point from local (basis-row) coordinates.
    pub fn world_point(&self, local: Vector3<Real>) -> Point3<Real> {
        self.center + self.basis[0] * local.x + self.basis[1] * local.y + self.basis[2] * local.z
    }
}

/// Shared shape of `Cylinder` and `Capsule`: center, unit axis, radius and
/// non-negative half-height.
#[derive(Debug, Clone)]
pub struct Cylinder {
    pub center: Point3<Real>,
    pub axis: Vector3<Real>,
    pub r: Real,
    pub hh: Real,
}

/// Same parameters as [`Cylinder`]; kept as a distinct type because capsule
/// caps are hemispherical rather than flat.
#[derive(Debug, Clone)]
pub struct Capsule {
    pub center: Point3<Real>,
    pub axis: Vector3<Real>,
    pub r: Real,
    pub hh: Real,
}

/// Center and radius.
#[derive(Debug, Clone)]
pub struct Sphere {
    pub center: Point3<Real>,
    pub r: Real,
}

/// Origin plus direction; the direction is not required to be unit length —
/// its length encodes the ray's maximum parameter.
#[derive(Debug, Clone)]
pub struct Ray {
    pub origin: Point3<Real>,
    pub dir: Vector3<Real>,
}

/// A point on the plane and its unit normal.
#[derive(Debug, Clone)]
pub struct Plane {
    pub origin: Point3<Real>,
    pub n: Vector3<Real>,
}

/// Heightfield primitive. Intersection/overlap/unprojection routines
/// involving a heightfield all default (spec.md §4.4: "`heightfield` slots
/// default"); this stub exists only so `PrimType::Heightfield` has a
/// matching payload and the dispatch tables stay total.
#[derive(Debug, Clone)]
pub struct Heightfield;

/// Tagged union over every primitive kind.
#[derive(Debug, Clone)]
pub enum Primitive {
    Triangle(Triangle),
    Box(Box3),
    Cylinder(Cylinder),
    Capsule(Capsule),
    Sphere(Sphere),
    Ray(Ray),
    Plane(Plane),
    Heightfield(Heightfield),
}

impl Primitive {
    pub fn prim_type(&self) -> PrimType {
        match self {
            Primitive::Triangle(_) => PrimType::Triangle,
            Primitive::Box(_) => PrimType::Box,
            Primitive::Cylinder(_) => PrimType::Cylinder,
            Primitive::Capsule(_) => PrimType::Capsule,
            Primitive::Sphere(_) => PrimType::Sphere,
            Primitive::Ray(_) => PrimType::Ray,
            Primitive::Plane(_) => PrimType::Plane,
            Primitive::Heightfield(_) => PrimType::Heightfield,
        }
    }

    /// Axis-aligned world-space bound, used to seed BVH leaves and for the
    /// primitive-body fast path (§4.7).
    pub fn aabb(&self) -> (Point3<Real>, Point3<Real>) {
        match self {
            Primitive::Triangle(t) => {
                let mut lo = t.pt[0];
                let mut hi = t.pt[0];
                for p in &t.pt[1..] {
                    lo = min_pt(lo, *p);
                    hi = max_pt(hi, *p);
                }
                (lo, hi)
            }
            Primitive::Box(b) => {
                let ext = (b.basis[0] * b.size.x).map(|v| v.abs())
                    + (b.basis[1] * b.size.y).map(|v| v.abs())
                    + (b.basis[2] * b.size.z).map(|v| v.abs());
                (b.center - ext, b.center + ext)
            }
            Primitive::Cylinder(c) => cylinder_like_aabb(c.center, c.axis, c.r, c.hh),
            Primitive::Capsule(c) => cylinder_like_aabb(c.center, c.axis, c.r, c.hh),
            Primitive::Sphere(s) => {
                let r = Vector3::new(s.r, s.r, s.r);
                (s.center - r, s.center + r)
            }
            Primitive::Ray(r) => (min_pt(r.origin, r.origin + r.dir), max_pt(r.origin, r.origin + r.dir)),
            Primitive::Plane(p) => {
                // Unbounded; callers should not rely on a finite plane AABB.
                let inf = Real::INFINITY;
                let _ = p;
                (
                    Point3::new(-inf, -inf, -inf),
                    Point3::new(inf, inf, inf),
                )
            }
            Primitive::Heightfield(_) => {
                let inf = Real::INFINITY;
                (Point3::new(-inf, -inf, -inf), Point3::new(inf, inf, inf))
            }
        }
    }

    /// Furthest point on the primitive in a given direction (the GJK-style
    /// support function, generalized here to back the generic linear
    /// unprojector for every pair of convex primitives).
    pub fn support(&self, dir: Vector3<Real>) -> Point3<Real> {
        match self {
            Primitive::Triangle(t) => {
                *t.pt
                    .iter()
                    .max_by(|a, b| a.dot(dir).partial_cmp(&b.dot(dir)).unwrap())
                    .unwrap()
            }
            Primitive::Box(b) => {
                let sx = sign_nz(dir.dot(b.basis[0])) * b.size.x;
                let sy = sign_nz(dir.dot(b.basis[1])) * b.size.y;
                let sz = sign_nz(dir.dot(b.basis[2])) * b.size.z;
                b.center + b.basis[0] * sx + b.basis[1] * sy + b.basis[2] * sz
            }
            Primitive::Cylinder(c) => cylinder_support(c.center, c.axis, c.r, c.hh, dir),
            Primitive::Capsule(c) => capsule_support(c.center, c.axis, c.r, c.hh, dir),
            Primitive::Sphere(s) => {
                if dir.magnitude2() > 1e-12 {
                    s.center + dir.normalize() * s.r
                } else {
                    s.center
                }
            }
            Primitive::Ray(r) => {
                if dir.dot(r.dir) > 0.0 {
                    r.origin + r.dir
                } else {
                    r.origin
                }
            }
            Primitive::Plane(p) => p.origin,
            Primitive::Heightfield(_) => Point3::new(0.0, 0.0, 0.0),
        }
    }

    /// Projected interval `[min, max]` of the primitive onto `dir` (assumed
    /// unit length); used by the SAT-style overlap and unprojection helpers.
    pub fn project(&self, dir: Vector3<Real>) -> (Real, Real) {
        let hi = self.support(dir).dot(dir);
        let lo = self.support(-dir).dot(dir);
        (lo, hi)
    }

    /// Nearest point on (the boundary, or where applicable the solid, of)
    /// the primitive to world point `p`, paired with a feature id.
    pub fn closest_point(&self, p: Point3<Real>) -> (Point3<Real>, u8) {
        match self {
            Primitive::Triangle(t) => closest_on_triangle(t, p),
            Primitive::Box(b) => closest_on_box(b, p),
            Primitive::Cylinder(c) => closest_on_cylinder(c.center, c.axis, c.r, c.hh, p, false),
            Primitive::Capsule(c) => closest_on_cylinder(c.center, c.axis, c.r, c.hh, p, true),
            Primitive::Sphere(s) => {
                let d = p - s.center;
                if d.magnitude2() > 1e-12 {
                    (s.center + d.normalize() * s.r, 0x40)
                } else {
                    (s.center + Vector3::unit_x() * s.r, 0x40)
                }
            }
            Primitive::Ray(r) => {
                let t = ((p - r.origin).dot(r.dir) / r.dir.magnitude2().max(1e-12)).clamp(0.0, 1.0);
                (r.origin + r.dir * t, 0x20)
            }
            Primitive::Plane(pl) => (p - pl.n * (p - pl.origin).dot(pl.n), 0x40),
            Primitive::Heightfield(_) => (p, 0x40),
        }
    }
}

/// Support point of a capsule (cylinder core + hemispherical caps): the
/// nearest core-segment endpoint offset by `r` along the full direction.
fn capsule_support(
    center: Point3<Real>,
    axis: Vector3<Real>,
    r: Real,
    hh: Real,
    dir: Vector3<Real>,
) -> Point3<Real> {
    let axis = if axis.magnitude2() > 1e-12 {
        axis.normalize()
    } else {
        Vector3::unit_z()
    };
    let along = dir.dot(axis);
    let end = center + axis * (sign_nz(along) * hh);
    if dir.magnitude2() > 1e-12 {
        end + dir.normalize() * r
    } else {
        end
    }
}

pub(crate) fn sign_nz(x: Real) -> Real {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

fn min_pt(a: Point3<Real>, b: Point3<Real>) -> Point3<Real> {
    Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z))
}

fn max_pt(a: Point3<Real>, b: Point3<Real>) -> Point3<Real> {
    Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z))
}

fn cylinder_like_aabb(
    center: Point3<Real>,
    axis: Vector3<Real>,
    r: Real,
    hh: Real,
) -> (Point3<Real>, Point3<Real>) {
    let axis = if axis.magnitude2() > 1e-12 {
        axis.normalize()
    } else {
        Vector3::unit_z()
    };
    let end = axis * hh;
    // Conservative bound: sphere of radius r swept between the two caps.
    let a = center - end;
    let b = center + end;
    let rv = Vector3::new(r, r, r);
    (min_pt(a - rv, b - rv), max_pt(a + rv, b + rv))
}

/// Support point of an (infinite-side) cylinder/capsule-as-cylinder of given
/// `center`, unit `axis`, radius `r` and half-height `hh`, in direction `dir`.
fn cylinder_support(
    center: Point3<Real>,
    axis: Vector3<Real>,
    r: Real,
    hh: Real,
    dir: Vector3<Real>,
) -> Point3<Real> {
    let axis = if axis.magnitude2() > 1e-12 {
        axis.normalize()
    } else {
        Vector3::unit_z()
    };
    let along = dir.dot(axis);
    let radial = dir - axis * along;
    let radial_pt = if radial.magnitude2() > 1e-12 {
        radial.normalize() * r
    } else {
        Vector3::new(0.0, 0.0, 0.0)
    };
    center + axis * (sign_nz(along) * hh) + radial_pt
}

fn closest_on_box(b: &Box3, p: Point3<Real>) -> (Point3<Real>, u8) {
    let local = b.local_coords(p);
    let clamped = Vector3::new(
        local.x.clamp(-b.size.x, b.size.x),
        local.y.clamp(-b.size.y, b.size.y),
        local.z.clamp(-b.size.z, b.size.z),
    );
    if clamped == local {
        // p is inside the box: push out along the axis of least penetration.
        let slack = Vector3::new(b.size.x - local.x.abs(), b.size.y - local.y.abs(), b.size.z - local.z.abs());
        let axis = if slack.x <= slack.y && slack.x <= slack.z {
            0
        } else if slack.y <= slack.z {
            1
        } else {
            2
        };
        let mut pushed = local;
        let s = if axis == 0 {
            local.x
        } else if axis == 1 {
            local.y
        } else {
            local.z
        };
        let face = sign_nz(s) * match axis {
            0 => b.size.x,
            1 => b.size.y,
            _ => b.size.z,
        };
        match axis {
            0 => pushed.x = face,
            1 => pushed.y = face,
            _ => pushed.z = face,
        }
        (b.world_point(pushed), 0x40 | axis as u8)
    } else {
        (b.world_point(clamped), 0x20)
    }
}

fn closest_on_cylinder(
    center: Point3<Real>,
    axis: Vector3<Real>,
    r: Real,
    hh: Real,
    p: Point3<Real>,
    is_capsule: bool,
) -> (Point3<Real>, u8) {
    let axis = if axis.magnitude2() > 1e-12 {
        axis.normalize()
    } else {
        Vector3::unit_z()
    };
    let d = p - center;
    let along_raw = d.dot(axis);
    let along = along_raw.clamp(-hh, hh);
    let radial_vec = d - axis * along_raw;
    let radial_dist = radial_vec.magnitude();
    let radial_dir = if radial_dist > 1e-9 {
        radial_vec / radial_dist
    } else {
        axis.cross(Vector3::unit_x()).normalize_to(1.0)
    };

    if is_capsule {
        // Closest point on the core segment, offset outward by r.
        let seg_pt = center + axis * along;
        let out = p - seg_pt;
        let dist = out.magnitude();
        let dir = if dist > 1e-9 { out / dist } else { radial_dir };
        return (seg_pt + dir * r, 0x20);
    }

    let within_height = along_raw.abs() <= hh;
    if within_height && radial_dist <= r {
        // Inside the solid cylinder: push out to the nearer of side/caps.
        let side_gap = r - radial_dist;
        let cap_gap = hh - along_raw.abs();
        if side_gap <= cap_gap {
            (center + axis * along_raw + radial_dir * r, 0x20)
        } else {
            (center + axis * (sign_nz(along_raw) * hh) + radial_vec, 0x40)
        }
    } else if within_height {
        (center + axis * along_raw + radial_dir * r, 0x20)
    } else {
        let cap_center = center + axis * along;
        let clamped_radial = if radial_dist > r { radial_dir * r } else { radial_vec };
        (cap_center + clamped_radial, 0x40)
    }
}

fn closest_on_triangle(t: &Triangle, p: Point3<Real>) -> (Point3<Real>, u8) {
    // Standard closest-point-on-triangle via barycentric region tests.
    let a = t.pt[0];
    let b = t.pt[1];
    let c = t.pt[2];
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, 0xA0);
    }
    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, 0xA0 | 1);
    }
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, 0xA0);
    }
    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, 0xA0 | 2);
    }
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, 0xA0 | 2);
    }
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, 0xA0 | 1);
    }
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (a + ab * v + ac * w, 0x40)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_support_is_surface_point() {
        let s = Sphere {
            center: Point3::new(0.0, 0.0, 0.0),
            r: 2.0,
        };
        let p = Primitive::Sphere(s);
        let pt = p.support(Vector3::unit_x());
        assert_approx_eq::assert_approx_eq!(pt.x, 2.0, 1e-6);
    }

    #[test]
    fn box_closest_point_outside() {
        let b = Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let (pt, feat) = closest_on_box(&b, Point3::new(3.0, 0.0, 0.0));
        assert_approx_eq::assert_approx_eq!(pt.x, 1.0, 1e-6);
        assert_eq!(feat, 0x20);
    }

    #[test]
    fn box_closest_point_inside_pushes_out() {
        let b = Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let (pt, _) = closest_on_box(&b, Point3::new(0.0, 0.0, 0.9));
        assert_approx_eq::assert_approx_eq!(pt.z, 1.0, 1e-6);
    }

    #[test]
    fn triangle_closest_point_vertex_region() {
        let t = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        );
        let (pt, feat) = closest_on_triangle(&t, Point3::new(-1.0, -1.0, 0.0));
        assert_approx_eq::assert_approx_eq!(pt.x, 0.0, 1e-6);
        assert_approx_eq::assert_approx_eq!(pt.y, 0.0, 1e-6);
        assert_eq!(feat, 0xA0);
    }
}
