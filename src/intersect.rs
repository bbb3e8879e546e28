//! §4.4 — the `Intersector` primitive-vs-primitive dispatch table.
//!
//! Every routine writes a single segment `pt[0]..pt[1]` (equal for
//! point-like contacts) plus an optional border-point cloud. For every
//! ordered pair `(A, B)` with `A != B` there is a canonical implementation
//! `a_b_intersection` and a thin wrapper `b_a_intersection` that calls it and
//! applies the §4.4 swap (`pt` swap, `i_feature` cross-swap, normal flip).

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::primitive::{Box3, Capsule, Cylinder, Plane, Primitive, PrimType, Ray, Sphere, Triangle};
use crate::Real;

/// Fixed capacity of the border-point cloud (spec.md §9 open question:
/// overflow is dropped silently, matching the CryPhysics `ptborder_loc`
/// behavior — not surfaced as a budget-exhausted signal).
pub const MAX_BORDER_POINTS: usize = 16;

/// Raw output of one primitive-vs-primitive intersection test.
#[derive(Debug, Clone)]
pub struct PrimIntersection {
    pub pt: [Point3<Real>; 2],
    pub n: Vector3<Real>,
    /// `i_feature[side][slot]`; `side` 0 is the first primitive passed to
    /// `Intersector::check`, `side` 1 the second.
    pub i_feature: [[u8; 2]; 2],
    border_points: [Point3<Real>; MAX_BORDER_POINTS],
    border_idx: [[u8; 2]; MAX_BORDER_POINTS],
    n_border_pt: usize,
    pub min_pt_dist2: Real,
}

impl PrimIntersection {
    pub fn new(min_pt_dist2: Real) -> Self {
        PrimIntersection {
            pt: [Point3::new(0.0, 0.0, 0.0); 2],
            n: Vector3::new(0.0, 0.0, 0.0),
            i_feature: [[0, 0], [0, 0]],
            border_points: [Point3::new(0.0, 0.0, 0.0); MAX_BORDER_POINTS],
            border_idx: [[0, 0]; MAX_BORDER_POINTS],
            n_border_pt: 0,
            min_pt_dist2,
        }
    }

    /// Append a border point, dropping it silently once capacity is reached.
    pub fn push_border_point(&mut self, p: Point3<Real>, idx: [u8; 2]) {
        if self.n_border_pt < MAX_BORDER_POINTS {
            self.border_points[self.n_border_pt] = p;
            self.border_idx[self.n_border_pt] = idx;
            self.n_border_pt += 1;
        }
    }

    pub fn border_points(&self) -> &[Point3<Real>] {
        &self.border_points[..self.n_border_pt]
    }

    pub fn border_idx(&self) -> &[[u8; 2]] {
        &self.border_idx[..self.n_border_pt]
    }

    /// Apply the §4.4 swap rewrite in place: segment endpoints swap,
    /// `i_feature[0][0] <-> i_feature[1][1]`, `i_feature[0][1] <-> i_feature[1][0]`,
    /// normal flips, and border-point side indices swap component-wise.
    fn swap(&mut self) {
        self.pt.swap(0, 1);
        let tmp00 = self.i_feature[0][0];
        self.i_feature[0][0] = self.i_feature[1][1];
        self.i_feature[1][1] = tmp00;
        let tmp01 = self.i_feature[0][1];
        self.i_feature[0][1] = self.i_feature[1][0];
        self.i_feature[1][0] = tmp01;
        self.n = -self.n;
        for idx in &mut self.border_idx[..self.n_border_pt] {
            idx.swap(0, 1);
        }
    }
}

/// Dispatch function pointer type, mirroring the C++ `intersection_check`.
pub type IntersectionFn = fn(&Primitive, &Primitive, &mut PrimIntersection) -> bool;

#[derive(Debug, Default)]
pub struct Intersector;

impl Intersector {
    pub fn check(t1: PrimType, t2: PrimType, p1: &Primitive, p2: &Primitive, out: &mut PrimIntersection) -> bool {
        dispatch(t1, t2)(p1, p2, out)
    }
}

pub(crate) fn default_intersection(_a: &Primitive, _b: &Primitive, _out: &mut PrimIntersection) -> bool {
    false
}

fn dispatch(t1: PrimType, t2: PrimType) -> IntersectionFn {
    use PrimType::*;
    match (t1, t2) {
        (Triangle, Triangle) => tri_tri_intersection,
        (Triangle, Box) => tri_box_intersection,
        (Box, Triangle) => box_tri_intersection,
        (Triangle, Cylinder) => tri_cylinder_intersection,
        (Cylinder, Triangle) => cylinder_tri_intersection,
        (Triangle, Capsule) => tri_capsule_intersection,
        (Capsule, Triangle) => capsule_tri_intersection,
        (Triangle, Sphere) => tri_sphere_intersection,
        (Sphere, Triangle) => sphere_tri_intersection,
        (Triangle, Ray) => tri_ray_intersection,
        (Ray, Triangle) => ray_tri_intersection,
        (Triangle, Plane) => tri_plane_intersection,
        (Plane, Triangle) => plane_tri_intersection,
        (Box, Box) => box_box_intersection,
        (Box, Cylinder) => box_cylinder_intersection,
        (Cylinder, Box) => cylinder_box_intersection,
        (Box, Capsule) => box_capsule_intersection,
        (Capsule, Box) => capsule_box_intersection,
        (Box, Sphere) => box_sphere_intersection,
        (Sphere, Box) => sphere_box_intersection,
        (Box, Ray) => box_ray_intersection,
        (Ray, Box) => ray_box_intersection,
        (Box, Plane) => box_plane_intersection,
        (Plane, Box) => plane_box_intersection,
        (Cylinder, Cylinder) => cylinder_cylinder_intersection,
        (Cylinder, Capsule) => cylinder_capsule_intersection,
        (Capsule, Cylinder) => capsule_cylinder_intersection,
        (Cylinder, Sphere) => cylinder_sphere_intersection,
        (Sphere, Cylinder) => sphere_cylinder_intersection,
        (Cylinder, Ray) => cylinder_ray_intersection,
        (Ray, Cylinder) => ray_cylinder_intersection,
        (Cylinder, Plane) => cylinder_plane_intersection,
        (Plane, Cylinder) => plane_cylinder_intersection,
        (Capsule, Capsule) => capsule_capsule_intersection,
        (Capsule, Sphere) => capsule_sphere_intersection,
        (Sphere, Capsule) => sphere_capsule_intersection,
        (Capsule, Ray) => capsule_ray_intersection,
        (Ray, Capsule) => ray_capsule_intersection,
        (Capsule, Plane) => capsule_plane_intersection,
        (Plane, Capsule) => plane_capsule_intersection,
        (Sphere, Sphere) => sphere_sphere_intersection,
        (Sphere, Ray) => sphere_ray_intersection,
        (Ray, Sphere) => ray_sphere_intersection,
        (Sphere, Plane) => sphere_plane_intersection,
        (Plane, Sphere) => plane_sphere_intersection,
        (Ray, Plane) => ray_plane_intersection,
        (Plane, Ray) => plane_ray_intersection,
        _ => default_intersection,
    }
}

// ---------------------------------------------------------------------
// Shared extraction helpers: every canonical routine below is written
// against the concrete shape records, not the `Primitive` enum, so the
// table entries all start with one of these `unwrap`-style projections.
// ---------------------------------------------------------------------

macro_rules! as_shape {
    ($p:expr, $variant:ident) => {
        match $p {
            Primitive::$variant(s) => s,
            _ => return false,
        }
    };
}

fn set_point_contact(out: &mut PrimIntersection, pt: Point3<Real>, n: Vector3<Real>, f0: u8, f1: u8) {
    out.pt = [pt, pt];
    out.n = n;
    out.i_feature = [[f0, f0], [f1, f1]];
}

fn unit_or(v: Vector3<Real>, fallback: Vector3<Real>) -> Vector3<Real> {
    if v.magnitude2() > 1e-14 {
        v.normalize()
    } else {
        fallback
    }
}

// ---------------------------------------------------------------------
// sphere-sphere (analytic; ground truth for scenarios S1/S2)
// ---------------------------------------------------------------------

pub(crate) fn sphere_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let s1 = as_shape!(a, Sphere);
    let s2 = as_shape!(b, Sphere);
    let dc = s2.center - s1.center;
    if dc.magnitude2() > (s1.r + s2.r) * (s1.r + s2.r) {
        return false;
    }
    let dir = unit_or(dc, Vector3::unit_x());
    let p_on_1 = s1.center + dir * s1.r;
    let p_on_2 = s2.center - dir * s2.r;
    let pt = Point3::new((p_on_1.x + p_on_2.x) * 0.5, (p_on_1.y + p_on_2.y) * 0.5, (p_on_1.z + p_on_2.z) * 0.5);
    set_point_contact(out, pt, dir, 0x40, 0x40);
    true
}

// ---------------------------------------------------------------------
// sphere-box / box-sphere
// ---------------------------------------------------------------------

pub(crate) fn box_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let bx = as_shape!(a, Box);
    let sp = as_shape!(b, Sphere);
    let (closest, feat) = Primitive::Box(bx.clone()).closest_point(sp.center);
    let d2 = closest.distance2(sp.center);
    if d2 > sp.r * sp.r {
        return false;
    }
    let n = unit_or(sp.center - closest, Vector3::unit_x());
    set_point_contact(out, closest, n, feat, 0x40);
    true
}

pub(crate) fn sphere_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = box_sphere_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// sphere-capsule / capsule-sphere, sphere-cylinder / cylinder-sphere
// ---------------------------------------------------------------------

pub(crate) fn capsule_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let cap = as_shape!(a, Capsule);
    let sp = as_shape!(b, Sphere);
    let (closest, feat) = Primitive::Capsule(cap.clone()).closest_point(sp.center);
    let d2 = closest.distance2(sp.center);
    if d2 > sp.r * sp.r {
        return false;
    }
    let n = unit_or(sp.center - closest, Vector3::unit_x());
    set_point_contact(out, closest, n, feat, 0x40);
    true
}

pub(crate) fn sphere_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = capsule_sphere_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn cylinder_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let cyl = as_shape!(a, Cylinder);
    let sp = as_shape!(b, Sphere);
    let (closest, feat) = Primitive::Cylinder(cyl.clone()).closest_point(sp.center);
    let d2 = closest.distance2(sp.center);
    if d2 > sp.r * sp.r {
        return false;
    }
    let n = unit_or(sp.center - closest, Vector3::unit_x());
    set_point_contact(out, closest, n, feat, 0x40);
    true
}

pub(crate) fn sphere_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = cylinder_sphere_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// ray-sphere / sphere-ray (quadratic; ground truth adapted from the
// original `sphere_ray_intersection`)
// ---------------------------------------------------------------------

pub(crate) fn sphere_ray_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let sp = as_shape!(a, Sphere);
    let ry = as_shape!(b, Ray);
    let oc = ry.origin - sp.center;
    let qa = ry.dir.magnitude2();
    if qa < 1e-14 {
        return false;
    }
    let qb = ry.dir.dot(oc);
    let qc = oc.magnitude2() - sp.r * sp.r;
    let disc = qb * qb - qa * qc;
    if disc < 0.0 {
        return false;
    }
    let d = disc.sqrt();
    let t0 = (-qb - d) / qa;
    let t1 = (-qb + d) / qa;
    let t = if (0.0..=1.0).contains(&t0) {
        t0
    } else if (0.0..=1.0).contains(&t1) {
        t1
    } else {
        return false;
    };
    let pt = ry.origin + ry.dir * t;
    let n = unit_or(pt - sp.center, Vector3::unit_x());
    out.pt = [pt, pt];
    out.n = n;
    out.i_feature = [[0x40, 0x40], [0x20, 0x20]];
    true
}

pub(crate) fn ray_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = sphere_ray_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// ray-box / box-ray (slab test; ground truth for scenario S3)
// ---------------------------------------------------------------------

pub(crate) fn box_ray_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let bx = as_shape!(a, Box);
    let ry = as_shape!(b, Ray);
    let local_o = bx.local_coords(ry.origin);
    let local_d = Vector3::new(ry.dir.dot(bx.basis[0]), ry.dir.dot(bx.basis[1]), ry.dir.dot(bx.basis[2]));
    let extents = [bx.size.x, bx.size.y, bx.size.z];
    let o = [local_o.x, local_o.y, local_o.z];
    let d = [local_d.x, local_d.y, local_d.z];

    let mut tmin = 0.0f32;
    let mut tmax = 1.0f32;
    let mut hit_axis = 0usize;
    let mut hit_sign = 1.0f32;
    for axis in 0..3 {
        if d[axis].abs() < 1e-12 {
            if o[axis] < -extents[axis] || o[axis] > extents[axis] {
                return false;
            }
            continue;
        }
        let mut t0 = (-extents[axis] - o[axis]) / d[axis];
        let mut t1 = (extents[axis] - o[axis]) / d[axis];
        let mut sign = -1.0f32;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            sign = 1.0;
        }
        if t0 > tmin {
            tmin = t0;
            hit_axis = axis;
            hit_sign = sign;
        }
        tmax = tmax.min(t1);
        if tmin > tmax {
            return false;
        }
    }
    let pt = ry.origin + ry.dir * tmin;
    let n = bx.basis[hit_axis] * hit_sign;
    out.pt = [pt, pt];
    out.n = -n;
    out.i_feature = [[0x40, 0x40], [0x20, 0x20]];
    true
}

pub(crate) fn ray_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = box_ray_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// ray vs capsule / cylinder: closest-approach-of-segments test, returning
// the point on the ray where it first enters the swept radius.
// ---------------------------------------------------------------------

fn ray_vs_round_segment(ray: &Ray, center: Point3<Real>, axis: Vector3<Real>, r: Real, hh: Real) -> Option<(Real, Point3<Real>, Vector3<Real>)> {
    let a = center - axis * hh;
    let b = center + axis * hh;
    let steps = 32;
    let mut best: Option<(Real, Point3<Real>, Vector3<Real>)> = None;
    for i in 0..=steps {
        let t = i as Real / steps as Real;
        let p = ray.origin + ray.dir * t;
        let (closest, _, _) = crate::overlap::segment_segment_closest(a, b, p, p);
        let d2 = closest.distance2(p);
        if d2 <= r * r {
            let n = unit_or(p - closest, Vector3::unit_x());
            best = Some((t, p, n));
            break;
        }
    }
    best
}

pub(crate) fn capsule_ray_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let cap = as_shape!(a, Capsule);
    let ry = as_shape!(b, Ray);
    match ray_vs_round_segment(ry, cap.center, cap.axis, cap.r, cap.hh) {
        Some((_t, pt, n)) => {
            out.pt = [pt, pt];
            out.n = n;
            out.i_feature = [[0x20, 0x20], [0x20, 0x20]];
            true
        }
        None => false,
    }
}

pub(crate) fn ray_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = capsule_ray_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn cylinder_ray_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let cyl = as_shape!(a, Cylinder);
    let ry = as_shape!(b, Ray);
    match ray_vs_round_segment(ry, cyl.center, cyl.axis, cyl.r, cyl.hh) {
        Some((_t, pt, n)) => {
            out.pt = [pt, pt];
            out.n = n;
            out.i_feature = [[0x20, 0x20], [0x20, 0x20]];
            true
        }
        None => false,
    }
}

pub(crate) fn ray_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = cylinder_ray_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// ray-plane / plane-ray
// ---------------------------------------------------------------------

pub(crate) fn plane_ray_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let pl = as_shape!(a, Plane);
    let ry = as_shape!(b, Ray);
    let denom = pl.n.dot(ry.dir);
    if denom.abs() < 1e-10 {
        return false;
    }
    let t = (pl.origin - ry.origin).dot(pl.n) / denom;
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    let pt = ry.origin + ry.dir * t;
    out.pt = [pt, pt];
    out.n = -pl.n;
    out.i_feature = [[0x40, 0x40], [0x20, 0x20]];
    true
}

pub(crate) fn ray_plane_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = plane_ray_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// sphere-plane / plane-sphere, box-plane / plane-box (ground truth
// for box-plane adapted from the original `box_plane_intersection`)
// ---------------------------------------------------------------------

pub(crate) fn sphere_plane_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let sp = as_shape!(a, Sphere);
    let pl = as_shape!(b, Plane);
    let dist = (sp.center - pl.origin).dot(pl.n);
    if dist.abs() > sp.r {
        return false;
    }
    let pt = sp.center - pl.n * dist;
    out.pt = [pt, pt];
    out.n = pl.n;
    out.i_feature = [[0x40, 0x40], [0x40, 0x40]];
    true
}

pub(crate) fn plane_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = sphere_plane_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn box_plane_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let bx = as_shape!(a, Box);
    let pl = as_shape!(b, Plane);
    let dir = bx.basis[0] * bx.size.x * crate::primitive::sign_nz(bx.basis[0].dot(pl.n))
        + bx.basis[1] * bx.size.y * crate::primitive::sign_nz(bx.basis[1].dot(pl.n))
        + bx.basis[2] * bx.size.z * crate::primitive::sign_nz(bx.basis[2].dot(pl.n));
    let pt = bx.center - dir;
    out.pt = [pt, pt];
    out.n = -pl.n;
    out.i_feature = [[0x40, 0x40], [0x40, 0x40]];
    (pt - pl.origin).dot(pl.n) < 0.0
}

pub(crate) fn plane_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = box_plane_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// capsule/cylinder vs plane: offset by the round-section radius.
// ---------------------------------------------------------------------

fn round_vs_plane(center: Point3<Real>, axis: Vector3<Real>, r: Real, hh: Real, pl: &Plane) -> Option<Point3<Real>> {
    let ends = [center - axis * hh, center + axis * hh];
    let d0 = (ends[0] - pl.origin).dot(pl.n);
    let d1 = (ends[1] - pl.origin).dot(pl.n);
    let (end, dist) = if d0 <= d1 { (ends[0], d0) } else { (ends[1], d1) };
    if dist.abs() > r {
        return None;
    }
    Some(end - pl.n * dist)
}

pub(crate) fn capsule_plane_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let cap = as_shape!(a, Capsule);
    let pl = as_shape!(b, Plane);
    match round_vs_plane(cap.center, cap.axis, cap.r, cap.hh, pl) {
        Some(pt) => {
            out.pt = [pt, pt];
            out.n = pl.n;
            out.i_feature = [[0x40, 0x40], [0x40, 0x40]];
            true
        }
        None => false,
    }
}

pub(crate) fn plane_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = capsule_plane_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn cylinder_plane_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let cyl = as_shape!(a, Cylinder);
    let pl = as_shape!(b, Plane);
    match round_vs_plane(cyl.center, cyl.axis, cyl.r, cyl.hh, pl) {
        Some(pt) => {
            out.pt = [pt, pt];
            out.n = pl.n;
            out.i_feature = [[0x40, 0x40], [0x40, 0x40]];
            true
        }
        None => false,
    }
}

pub(crate) fn plane_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = cylinder_plane_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// box-box: SAT separation check, contact via clamped closest points, plus
// the clipped-edge border cloud (spec.md §4.4): every edge of one box that
// survives slab-clipping against the other box contributes its clipped
// endpoints, up to the border buffer's capacity.
// ---------------------------------------------------------------------

pub(crate) fn box_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let b1 = as_shape!(a, Box);
    let b2 = as_shape!(b, Box);
    let d = b2.center - b1.center;
    let mut axes = Vec::with_capacity(15);
    axes.extend_from_slice(&b1.basis);
    axes.extend_from_slice(&b2.basis);
    for x in &b1.basis {
        for y in &b2.basis {
            let c = x.cross(*y);
            if c.magnitude2() > 1e-10 {
                axes.push(c.normalize());
            }
        }
    }
    let mut min_overlap = Real::INFINITY;
    let mut min_axis = Vector3::unit_x();
    for axis in axes {
        let r1 = b1.size.x * b1.basis[0].dot(axis).abs() + b1.size.y * b1.basis[1].dot(axis).abs() + b1.size.z * b1.basis[2].dot(axis).abs();
        let r2 = b2.size.x * b2.basis[0].dot(axis).abs() + b2.size.y * b2.basis[1].dot(axis).abs() + b2.size.z * b2.basis[2].dot(axis).abs();
        let dist = d.dot(axis).abs();
        let overlap = r1 + r2 - dist;
        if overlap < 0.0 {
            return false;
        }
        if overlap < min_overlap {
            min_overlap = overlap;
            min_axis = if d.dot(axis) < 0.0 { -axis } else { axis };
        }
    }
    let (p1, _) = Primitive::Box(b1.clone()).closest_point(b2.center);
    let (p2, _) = Primitive::Box(b2.clone()).closest_point(b1.center);
    let mid = Point3::new((p1.x + p2.x) * 0.5, (p1.y + p2.y) * 0.5, (p1.z + p2.z) * 0.5);
    out.pt = [mid, mid];
    out.n = min_axis;
    out.i_feature = [[0x40, 0x40], [0x40, 0x40]];
    push_clipped_edge_borders(b1, b2, 0, out);
    push_clipped_edge_borders(b2, b1, 1, out);
    true
}

/// The 12 edges of a box, each as a (vertex, vertex) pair of local sign
/// triples in `{-1, 1}^3`.
const BOX_EDGES: [([i8; 3], [i8; 3]); 12] = [
    ([-1, -1, -1], [1, -1, -1]),
    ([-1, 1, -1], [1, 1, -1]),
    ([-1, -1, 1], [1, -1, 1]),
    ([-1, 1, 1], [1, 1, 1]),
    ([-1, -1, -1], [-1, 1, -1]),
    ([1, -1, -1], [1, 1, -1]),
    ([-1, -1, 1], [-1, 1, 1]),
    ([1, -1, 1], [1, 1, 1]),
    ([-1, -1, -1], [-1, -1, 1]),
    ([1, -1, -1], [1, -1, 1]),
    ([-1, 1, -1], [-1, 1, 1]),
    ([1, 1, -1], [1, 1, 1]),
];

fn box_vertex(bx: &Box3, sign: [i8; 3]) -> Point3<Real> {
    bx.center + bx.basis[0] * (sign[0] as Real * bx.size.x) + bx.basis[1] * (sign[1] as Real * bx.size.y) + bx.basis[2] * (sign[2] as Real * bx.size.z)
}

/// Clips each edge of `owner` against `clipper`'s slabs, pushing the
/// surviving segment's endpoints as border points. `owner_side` records
/// which side of `out` the edge belongs to (0 = the first primitive passed
/// to `Intersector::check`, 1 = the second).
fn push_clipped_edge_borders(owner: &Box3, clipper: &Box3, owner_side: u8, out: &mut PrimIntersection) {
    for (ei, (s0, s1)) in BOX_EDGES.iter().enumerate() {
        let p0 = box_vertex(owner, *s0);
        let p1 = box_vertex(owner, *s1);
        if let Some((t0, t1)) = clip_segment_to_box(clipper, p0, p1) {
            let idx = [if owner_side == 0 { 0x10 | ei as u8 } else { 0x40 }, if owner_side == 0 { 0x40 } else { 0x10 | ei as u8 }];
            out.push_border_point(p0 + (p1 - p0) * t0, idx);
            if (t1 - t0).abs() > 1e-5 {
                out.push_border_point(p0 + (p1 - p0) * t1, idx);
            }
        }
    }
}

/// Liang-Barsky clip of segment `p0..p1` against `bx`'s three slabs in its
/// own basis. Returns the surviving `[t0, t1] ⊆ [0, 1]` parameter range, or
/// `None` if the segment misses the box entirely.
fn clip_segment_to_box(bx: &Box3, p0: Point3<Real>, p1: Point3<Real>) -> Option<(Real, Real)> {
    let dir = p1 - p0;
    let mut tmin = 0.0;
    let mut tmax = 1.0;
    let half = [bx.size.x, bx.size.y, bx.size.z];
    for i in 0..3 {
        let axis = bx.basis[i];
        let h = half[i];
        let p0a = (p0 - bx.center).dot(axis);
        let da = dir.dot(axis);
        if da.abs() < 1e-9 {
            if p0a < -h || p0a > h {
                return None;
            }
        } else {
            let ta = (-h - p0a) / da;
            let tb = (h - p0a) / da;
            let (lo, hi) = if ta < tb { (ta, tb) } else { (tb, ta) };
            tmin = tmin.max(lo);
            tmax = tmax.min(hi);
            if tmin > tmax {
                return None;
            }
        }
    }
    Some((tmin, tmax))
}

// ---------------------------------------------------------------------
// triangle-triangle: supporting-plane intersection segment (ground truth
// for scenario S4).
// ---------------------------------------------------------------------

pub(crate) fn tri_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let t1 = as_shape!(a, Triangle);
    let t2 = as_shape!(b, Triangle);
    let axis = t1.n.cross(t2.n);
    if axis.magnitude2() < 1e-12 {
        return match coplanar_tri_tri(t1, t2) {
            Some((p0, p1, f1, f2)) => {
                out.pt = [p0, p1];
                out.n = t1.n;
                out.i_feature = [f1, f2];
                true
            }
            None => false,
        };
    }
    let axis = axis.normalize();

    let span = |t: &Triangle, plane_origin: Point3<Real>, plane_n: Vector3<Real>| -> Option<(Point3<Real>, Point3<Real>, u8, u8)> {
        let mut crossings: Vec<(Point3<Real>, u8)> = Vec::new();
        for i in 0..3 {
            let (s, e) = t.edge(i);
            let ds = (s - plane_origin).dot(plane_n);
            let de = (e - plane_origin).dot(plane_n);
            if ds == 0.0 {
                crossings.push((s, 0xA0 | i as u8));
            }
            if (ds < 0.0) != (de < 0.0) {
                let w = ds / (ds - de);
                crossings.push((s + (e - s) * w, 0xA0 | i as u8));
            }
        }
        if crossings.len() != 2 {
            return None;
        }
        Some((crossings[0].0, crossings[1].0, crossings[0].1, crossings[1].1))
    };

    let (a0, a1, fa0, fa1) = match span(t1, t2.pt[0], t2.n) {
        Some(v) => v,
        None => return false,
    };
    let (b0, b1, fb0, fb1) = match span(t2, t1.pt[0], t1.n) {
        Some(v) => v,
        None => return false,
    };

    // Project all four points onto `axis` and take the overlap of the two
    // 1-D intervals.
    let proj = |p: Point3<Real>| p.to_vec().dot(axis);
    let (mut alo, mut ahi) = (proj(a0), proj(a1));
    let (mut afl0, mut afl1) = (fa0, fa1);
    if alo > ahi {
        std::mem::swap(&mut alo, &mut ahi);
        std::mem::swap(&mut afl0, &mut afl1);
    }
    let (mut blo, mut bhi) = (proj(b0), proj(b1));
    let (mut bfl0, mut bfl1) = (fb0, fb1);
    if blo > bhi {
        std::mem::swap(&mut blo, &mut bhi);
        std::mem::swap(&mut bfl0, &mut bfl1);
    }
    let lo = alo.max(blo);
    let hi = ahi.min(bhi);
    if lo > hi {
        return false;
    }
    let lo_pt = if lo == alo { a0 } else { b0 };
    let hi_pt = if hi == ahi { a1 } else { b1 };
    // A clipped-to-t1-edge endpoint carries t1's real feature; the same
    // endpoint is interior to t2 unless t2's clip coincides at that bound.
    let feat1_lo = if lo == alo { afl0 } else { 0x40 };
    let feat2_lo = if lo == blo { bfl0 } else { 0x40 };
    let feat1_hi = if hi == ahi { afl1 } else { 0x40 };
    let feat2_hi = if hi == bhi { bfl1 } else { 0x40 };

    out.pt = [lo_pt, hi_pt];
    out.n = axis;
    out.i_feature = [[feat1_lo, feat1_hi], [feat2_lo, feat2_hi]];
    true
}

/// Coplanar-triangle fallback: clips each edge of one triangle against the
/// other in their shared plane and keeps the two most separated boundary
/// points as the overlap segment's witnesses (spec.md scenario: two
/// coplanar triangles sharing an edge region).
fn coplanar_tri_tri(t1: &Triangle, t2: &Triangle) -> Option<(Point3<Real>, Point3<Real>, [u8; 2], [u8; 2])> {
    let n = t1.n;
    let u = if n.x.abs() < 0.9 { Vector3::unit_x().cross(n) } else { Vector3::unit_y().cross(n) };
    let u = u.normalize();
    let v = n.cross(u);
    let origin = t1.pt[0];
    let to2d = |p: Point3<Real>| -> (Real, Real) {
        let d = p - origin;
        (d.dot(u), d.dot(v))
    };

    let t1_2d = [to2d(t1.pt[0]), to2d(t1.pt[1]), to2d(t1.pt[2])];
    let t2_2d = [to2d(t2.pt[0]), to2d(t2.pt[1]), to2d(t2.pt[2])];

    let mut points: Vec<(Point3<Real>, u8, u8)> = Vec::new();

    for i in 0..3 {
        let (a0, a1) = t1.edge(i);
        let (ax0, ay0) = to2d(a0);
        let (ax1, ay1) = to2d(a1);
        for j in 0..3 {
            let (bx0, by0) = t2_2d[j];
            let (bx1, by1) = t2_2d[(j + 1) % 3];
            if let Some(s) = seg2d_intersect(ax0, ay0, ax1, ay1, bx0, by0, bx1, by1) {
                let p = a0 + (a1 - a0) * s;
                points.push((p, 0xA0 | i as u8, 0xA0 | j as u8));
            }
        }
    }
    for k in 0..3 {
        if point_in_tri2d(t2_2d[k], t1_2d[0], t1_2d[1], t1_2d[2]) {
            points.push((t2.pt[k], 0x40, 0xA0 | k as u8));
        }
    }
    for k in 0..3 {
        if point_in_tri2d(t1_2d[k], t2_2d[0], t2_2d[1], t2_2d[2]) {
            points.push((t1.pt[k], 0xA0 | k as u8, 0x40));
        }
    }

    if points.is_empty() {
        return None;
    }
    if points.len() == 1 {
        let (p, f1, f2) = points[0];
        return Some((p, p, [f1, f1], [f2, f2]));
    }
    let mut best = (0usize, 1usize, -1.0 as Real);
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d2 = points[i].0.distance2(points[j].0);
            if d2 > best.2 {
                best = (i, j, d2);
            }
        }
    }
    let (pa, fa1, fa2) = points[best.0];
    let (pb, fb1, fb2) = points[best.1];
    Some((pa, pb, [fa1, fb1], [fa2, fb2]))
}

/// 2-D segment intersection parameter along segment `a` (`None` if parallel
/// or the crossing falls outside either segment's `[0, 1]` range).
fn seg2d_intersect(ax0: Real, ay0: Real, ax1: Real, ay1: Real, bx0: Real, by0: Real, bx1: Real, by1: Real) -> Option<Real> {
    let rx = ax1 - ax0;
    let ry = ay1 - ay0;
    let sx = bx1 - bx0;
    let sy = by1 - by0;
    let denom = rx * sy - ry * sx;
    if denom.abs() < 1e-12 {
        return None;
    }
    let qx = bx0 - ax0;
    let qy = by0 - ay0;
    let t = (qx * sy - qy * sx) / denom;
    let s = (qx * ry - qy * rx) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&s) {
        Some(t)
    } else {
        None
    }
}

fn point_in_tri2d(p: (Real, Real), a: (Real, Real), b: (Real, Real), c: (Real, Real)) -> bool {
    let sign = |p1: (Real, Real), p2: (Real, Real), p3: (Real, Real)| (p1.0 - p3.0) * (p2.1 - p3.1) - (p2.0 - p3.0) * (p1.1 - p3.1);
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

// ---------------------------------------------------------------------
// triangle vs box/cylinder/capsule: stripe clip. Each edge is walked in
// fixed steps; wherever consecutive samples disagree on inside/outside the
// peer shape is bisected down to the exact edge-clip crossing, which is
// reported as a border point. The deepest interior sample across all three
// edges becomes the main contact point.
// ---------------------------------------------------------------------

const TRI_STRIPE_STEPS: usize = 8;

/// Walks each of `tri`'s three edges in [`TRI_STRIPE_STEPS`] steps against a
/// peer-shape closest-point function (`closest` returns a negative gap once
/// the sample point is inside the peer), pushing every edge-clip crossing
/// found by bisection into `out`'s border cloud. Returns the peer witness
/// point, the outward normal (peer surface -> triangle sample), the
/// triangle-side feature id, and the peer-side feature id for the single
/// deepest-penetrating sample.
fn tri_vs_closest<F>(tri: &Triangle, closest: F, out: &mut PrimIntersection) -> Option<(Point3<Real>, Vector3<Real>, u8, u8)>
where
    F: Fn(Point3<Real>) -> (Point3<Real>, Real, u8),
{
    let mut best: Option<(Point3<Real>, Point3<Real>, u8, u8, Real)> = None;
    let edges = [(tri.pt[0], tri.pt[1], 0u8), (tri.pt[1], tri.pt[2], 1u8), (tri.pt[2], tri.pt[0], 2u8)];
    for (e0, e1, edge_idx) in edges {
        let edge_feat = 0xA0 | edge_idx;
        let mut prev_gap = closest(e0).1;
        for step in 1..=TRI_STRIPE_STEPS {
            let t = step as Real / TRI_STRIPE_STEPS as Real;
            let p = e0 + (e1 - e0) * t;
            let (c, gap, peer_feat) = closest(p);
            if (gap <= 0.0) != (prev_gap <= 0.0) {
                let t_prev = (step - 1) as Real / TRI_STRIPE_STEPS as Real;
                let (border_pt, border_feat) = bisect_edge_crossing(e0, e1, t_prev, t, &closest);
                out.push_border_point(border_pt, [edge_feat, border_feat]);
            }
            if gap <= 0.0 {
                let depth = -gap;
                if best.as_ref().map_or(true, |b| depth > b.4) {
                    best = Some((p, c, edge_feat, peer_feat, depth));
                }
            }
            prev_gap = gap;
        }
    }
    let centroid = Point3::new(
        (tri.pt[0].x + tri.pt[1].x + tri.pt[2].x) / 3.0,
        (tri.pt[0].y + tri.pt[1].y + tri.pt[2].y) / 3.0,
        (tri.pt[0].z + tri.pt[1].z + tri.pt[2].z) / 3.0,
    );
    let (c, gap, peer_feat) = closest(centroid);
    if gap <= 0.0 {
        let depth = -gap;
        if best.as_ref().map_or(true, |b| depth > b.4) {
            best = Some((centroid, c, 0x40, peer_feat, depth));
        }
    }
    best.map(|(p, c, feat, peer_feat, _)| (c, unit_or(p - c, tri.n), feat, peer_feat))
}

/// Bisects the `[t_lo, t_hi]` span of the edge `e0..e1` down to the point
/// where `closest`'s inside/outside sign flips, returning the peer witness
/// point and feature id at that crossing.
fn bisect_edge_crossing<F>(e0: Point3<Real>, e1: Point3<Real>, mut t_lo: Real, mut t_hi: Real, closest: &F) -> (Point3<Real>, u8)
where
    F: Fn(Point3<Real>) -> (Point3<Real>, Real, u8),
{
    let inside_at = |t: Real| closest(e0 + (e1 - e0) * t).1 <= 0.0;
    let lo_inside = inside_at(t_lo);
    for _ in 0..20 {
        let t_mid = (t_lo + t_hi) * 0.5;
        if inside_at(t_mid) == lo_inside {
            t_lo = t_mid;
        } else {
            t_hi = t_mid;
        }
    }
    let t = (t_lo + t_hi) * 0.5;
    let (c, _, feat) = closest(e0 + (e1 - e0) * t);
    (c, feat)
}

pub(crate) fn tri_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let tri = as_shape!(a, Triangle);
    let bx = as_shape!(b, Box).clone();
    let prim = Primitive::Box(bx);
    let hit = tri_vs_closest(tri, |p| box_shape_gap(&prim, p), out);
    match hit {
        Some((c, n, fa, fb)) => {
            out.pt = [c, c];
            out.n = n;
            out.i_feature = [[fa, fa], [fb, fb]];
            true
        }
        None => false,
    }
}

/// Signed distance of `p` from `prim`'s surface (negative once `p` is
/// inside the solid), paired with the surface witness point and feature id.
fn box_shape_gap(prim: &Primitive, p: Point3<Real>) -> (Point3<Real>, Real, u8) {
    let (c, feat) = prim.closest_point(p);
    let dist = p.distance(c);
    let inside = match prim {
        Primitive::Box(b) => {
            let l = b.local_coords(p);
            l.x.abs() <= b.size.x && l.y.abs() <= b.size.y && l.z.abs() <= b.size.z
        }
        _ => false,
    };
    (c, if inside { -dist } else { dist }, feat)
}

pub(crate) fn box_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = tri_box_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

fn round_shape_gap(prim: &Primitive, p: Point3<Real>) -> (Point3<Real>, Real, u8) {
    let (c, feat) = prim.closest_point(p);
    let gap = p.distance(c);
    let inside = match prim {
        Primitive::Cylinder(cyl) => {
            let d = p - cyl.center;
            let along = d.dot(cyl.axis);
            let radial = (d - cyl.axis * along).magnitude();
            along.abs() <= cyl.hh && radial <= cyl.r
        }
        Primitive::Capsule(cap) => {
            let d = p - cap.center;
            let along = d.dot(cap.axis).clamp(-cap.hh, cap.hh);
            let seg_pt = cap.center + cap.axis * along;
            p.distance(seg_pt) <= cap.r
        }
        _ => false,
    };
    (c, if inside { -gap } else { gap }, feat)
}

pub(crate) fn tri_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let tri = as_shape!(a, Triangle);
    let cyl = as_shape!(b, Cylinder).clone();
    let prim = Primitive::Cylinder(cyl);
    match tri_vs_closest(tri, |p| round_shape_gap(&prim, p), out) {
        Some((c, n, fa, fb)) => {
            out.pt = [c, c];
            out.n = n;
            out.i_feature = [[fa, fa], [fb, fb]];
            true
        }
        None => false,
    }
}

pub(crate) fn cylinder_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = tri_cylinder_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn tri_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let tri = as_shape!(a, Triangle);
    let cap = as_shape!(b, Capsule).clone();
    let prim = Primitive::Capsule(cap);
    match tri_vs_closest(tri, |p| round_shape_gap(&prim, p), out) {
        Some((c, n, fa, fb)) => {
            out.pt = [c, c];
            out.n = n;
            out.i_feature = [[fa, fa], [fb, fb]];
            true
        }
        None => false,
    }
}

pub(crate) fn capsule_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = tri_capsule_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn tri_sphere_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let tri = as_shape!(a, Triangle);
    let sp = as_shape!(b, Sphere);
    let (c, feat) = Primitive::Triangle(tri.clone()).closest_point(sp.center);
    let d2 = c.distance2(sp.center);
    if d2 > sp.r * sp.r {
        return false;
    }
    let n = unit_or(sp.center - c, tri.n);
    out.pt = [c, c];
    out.n = n;
    out.i_feature = [[feat, feat], [0x40, 0x40]];
    true
}

pub(crate) fn sphere_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = tri_sphere_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn tri_ray_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let tri = as_shape!(a, Triangle);
    let ry = as_shape!(b, Ray);
    // Moller-Trumbore.
    let e1 = tri.pt[1] - tri.pt[0];
    let e2 = tri.pt[2] - tri.pt[0];
    let pvec = ry.dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < 1e-12 {
        return false;
    }
    let inv_det = 1.0 / det;
    let tvec = ry.origin - tri.pt[0];
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let qvec = tvec.cross(e1);
    let v = ry.dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    let t = e2.dot(qvec) * inv_det;
    if !(0.0..=1.0).contains(&t) {
        return false;
    }
    let pt = ry.origin + ry.dir * t;
    out.pt = [pt, pt];
    out.n = if ry.dir.dot(tri.n) > 0.0 { -tri.n } else { tri.n };
    out.i_feature = [[0x40, 0x40], [0x20, 0x20]];
    true
}

pub(crate) fn ray_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = tri_ray_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn tri_plane_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let tri = as_shape!(a, Triangle);
    let pl = as_shape!(b, Plane);
    let d: Vec<Real> = tri.pt.iter().map(|p| (*p - pl.origin).dot(pl.n)).collect();
    let mut crossings = Vec::new();
    for i in 0..3 {
        let (ds, de) = (d[i], d[(i + 1) % 3]);
        if (ds < 0.0) != (de < 0.0) {
            let w = ds / (ds - de);
            let (s, e) = tri.edge(i);
            crossings.push((s + (e - s) * w, 0xA0 | i as u8));
        }
    }
    if crossings.len() != 2 {
        return false;
    }
    out.pt = [crossings[0].0, crossings[1].0];
    out.n = pl.n;
    out.i_feature = [[crossings[0].1, crossings[1].1], [0x40, 0x40]];
    true
}

pub(crate) fn plane_tri_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = tri_plane_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

// ---------------------------------------------------------------------
// box vs cylinder/capsule: closest-point sampling over the box's 8
// vertices and the peer's two cap centers, analogous to the stripe
// sampling used for triangle pairs above.
// ---------------------------------------------------------------------

pub(crate) fn box_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    round_vs_box(a, b, out, false)
}

pub(crate) fn cylinder_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = box_cylinder_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn box_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    round_vs_box(a, b, out, true)
}

pub(crate) fn capsule_box_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = box_capsule_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

fn round_vs_box(a: &Primitive, b: &Primitive, out: &mut PrimIntersection, is_capsule: bool) -> bool {
    let bx = as_shape!(a, Box).clone();
    let (center, axis, r, hh) = if is_capsule {
        let c = as_shape!(b, Capsule);
        (c.center, c.axis, c.r, c.hh)
    } else {
        let c = as_shape!(b, Cylinder);
        (c.center, c.axis, c.r, c.hh)
    };
    let box_prim = Primitive::Box(bx);
    let a0 = center - axis * hh;
    let a1 = center + axis * hh;
    let mut best: Option<(Point3<Real>, Point3<Real>, Real)> = None;
    for i in 0..=8 {
        let t = i as Real / 8.0;
        let p = a0 + (a1 - a0) * t;
        let (c, _feat) = box_prim.closest_point(p);
        let d = c.distance(p);
        if d <= r && best.as_ref().map_or(true, |bb| d < bb.2) {
            best = Some((p, c, d));
        }
    }
    match best {
        Some((axis_pt, box_pt, _)) => {
            let n = unit_or(axis_pt - box_pt, Vector3::unit_x());
            out.pt = [box_pt, box_pt];
            out.n = n;
            out.i_feature = [[0x40, 0x40], [0x20, 0x20]];
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------
// cylinder-cylinder, cylinder-capsule, capsule-capsule: axis-segment
// closest approach plus radius sum, matching the "axis vs axis" idiom of
// the original (§4.4 cylinder-cylinder) without the cap/side case split.
// ---------------------------------------------------------------------

pub(crate) fn cylinder_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let c1 = as_shape!(a, Cylinder);
    let c2 = as_shape!(b, Cylinder);
    if round_round(c1.center, c1.axis, c1.r, c1.hh, c2.center, c2.axis, c2.r, c2.hh, out) {
        return true;
    }
    // The side/side closest-approach test above treats both cylinders as
    // capsules (rounded ends); it misses the case where cylinder 1's flat
    // axis-aligned side comes within r1 of cylinder 2's *side* surface past
    // where the segment-segment closest point lands on a cap. Recover that
    // with the axis-vs-side test.
    if cylinder_axis_vs_side(c1.axis, c1.hh, c1.center - c2.center, c2.axis, c2.r, c2.hh)
        || cylinder_axis_vs_side(c2.axis, c2.hh, c2.center - c1.center, c1.axis, c1.r, c1.hh)
    {
        let n = unit_or(c2.center - c1.center, Vector3::unit_x());
        let mid = c1.center + (c2.center - c1.center) * 0.5;
        out.pt = [mid, mid];
        out.n = n;
        out.i_feature = [[0x20, 0x20], [0x20, 0x20]];
        return true;
    }
    false
}

/// Axis-vs-side refinement (`root_inrange` used as in the original
/// cylinder/cylinder intersection): is cylinder `i`'s axis within `r_j` of
/// cylinder `j`'s side surface, with both closest-approach roots landing
/// inside the respective `[-hh, hh]` spans?
fn cylinder_axis_vs_side(ax_i: Vector3<Real>, hh_i: Real, center0: Vector3<Real>, ax_j: Vector3<Real>, r_j: Real, hh_j: Real) -> bool {
    let cosa = ax_i.dot(ax_j);
    let a = 1.0 - cosa * cosa;
    if a <= 0.0001 {
        return false;
    }
    let b = ax_i.dot(center0) - center0.dot(ax_j) * cosa;
    let c = center0.magnitude2() - (center0.dot(ax_j)).powi(2) - r_j * r_j;
    let d = b * b - a * c;
    if d <= 0.0 {
        return false;
    }
    let hca = -(center0.dot(ax_j)) * a;
    use crate::rational::root_inrange;
    (root_inrange(a, 1.0, b, 0.0, d, hh_i) && root_inrange(a, cosa, b, hca, d, hh_j))
        || (root_inrange(a, 1.0, b, 0.0, -d, hh_i) && root_inrange(a, cosa, b, hca, -d, hh_j))
}

pub(crate) fn cylinder_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let c1 = as_shape!(a, Cylinder);
    let c2 = as_shape!(b, Capsule);
    round_round(c1.center, c1.axis, c1.r, c1.hh, c2.center, c2.axis, c2.r, c2.hh, out)
}

pub(crate) fn capsule_cylinder_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let res = cylinder_capsule_intersection(b, a, out);
    if res {
        out.swap();
    }
    res
}

pub(crate) fn capsule_capsule_intersection(a: &Primitive, b: &Primitive, out: &mut PrimIntersection) -> bool {
    let c1 = as_shape!(a, Capsule);
    let c2 = as_shape!(b, Capsule);
    round_round(c1.center, c1.axis, c1.r, c1.hh, c2.center, c2.axis, c2.r, c2.hh, out)
}

fn round_round(
    c1: Point3<Real>,
    ax1: Vector3<Real>,
    r1: Real,
    hh1: Real,
    c2: Point3<Real>,
    ax2: Vector3<Real>,
    r2: Real,
    hh2: Real,
    out: &mut PrimIntersection,
) -> bool {
    let (p1, p2, d2) = crate::overlap::segment_segment_closest(c1 - ax1 * hh1, c1 + ax1 * hh1, c2 - ax2 * hh2, c2 + ax2 * hh2);
    let rr = r1 + r2;
    if d2 > rr * rr {
        return false;
    }
    let mid = p1 + (p2 - p1) * (r1 / rr.max(1e-9));
    let n = unit_or(p2 - p1, Vector3::unit_x());
    out.pt = [mid, mid];
    out.n = n;
    out.i_feature = [[0x20, 0x20], [0x20, 0x20]];
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{Box3, Sphere};

    #[test]
    fn sphere_sphere_hit_matches_s2() {
        let s1 = Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 });
        let s2 = Primitive::Sphere(Sphere { center: Point3::new(1.5, 0.0, 0.0), r: 1.0 });
        let mut out = PrimIntersection::new(0.0);
        assert!(sphere_sphere_intersection(&s1, &s2, &mut out));
        assert_approx_eq::assert_approx_eq!(out.pt[0].x, 0.75, 1e-6);
        assert_approx_eq::assert_approx_eq!(out.n.x, 1.0, 1e-6);
    }

    #[test]
    fn sphere_sphere_miss_matches_s1() {
        let s1 = Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 });
        let s2 = Primitive::Sphere(Sphere { center: Point3::new(3.0, 0.0, 0.0), r: 1.0 });
        let mut out = PrimIntersection::new(0.0);
        assert!(!sphere_sphere_intersection(&s1, &s2, &mut out));
    }

    #[test]
    fn ray_box_matches_s3() {
        let ry = Primitive::Ray(Ray { origin: Point3::new(-2.0, 0.0, 0.0), dir: Vector3::new(4.0, 0.0, 0.0) });
        let bx = Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)));
        let mut out = PrimIntersection::new(0.0);
        assert!(ray_box_intersection(&ry, &bx, &mut out));
        assert_approx_eq::assert_approx_eq!(out.pt[0].x, -1.0, 1e-5);
        assert_approx_eq::assert_approx_eq!(out.n.x, -1.0, 1e-5);
        assert_eq!(out.i_feature[0][1], 0x20);
    }

    #[test]
    fn tri_tri_coplanar_edge_matches_s4() {
        let t1 = Primitive::Triangle(Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ));
        let t2 = Primitive::Triangle(Triangle::new(
            Point3::new(0.5, -0.5, 0.0),
            Point3::new(1.5, 0.5, 0.0),
            Point3::new(0.5, 0.5, 0.0),
        ));
        let mut out = PrimIntersection::new(0.0);
        assert!(tri_tri_intersection(&t1, &t2, &mut out));
        assert_approx_eq::assert_approx_eq!(out.pt[0].z, 0.0, 1e-6);
        assert_approx_eq::assert_approx_eq!(out.pt[1].z, 0.0, 1e-6);
        assert_eq!(out.i_feature[0][0] & 0xA0, 0xA0);
        assert_eq!(out.i_feature[0][1] & 0xA0, 0xA0);
    }

    #[test]
    fn swap_symmetry_box_sphere() {
        let bx = Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)));
        let sp = Primitive::Sphere(Sphere { center: Point3::new(1.5, 0.0, 0.0), r: 1.0 });
        let mut xy = PrimIntersection::new(0.0);
        let mut yx = PrimIntersection::new(0.0);
        let hit_xy = box_sphere_intersection(&bx, &sp, &mut xy);
        let hit_yx = sphere_box_intersection(&sp, &bx, &mut yx);
        assert_eq!(hit_xy, hit_yx);
        assert_approx_eq::assert_approx_eq!(xy.pt[0].x, yx.pt[1].x, 1e-6);
        assert_approx_eq::assert_approx_eq!(xy.n.x, -yx.n.x, 1e-6);
    }
}
