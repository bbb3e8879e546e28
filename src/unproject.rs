//! §4.1/§4.6 — the `Unprojector`: minimum translational and rotational
//! separation between two overlapping primitives.
//!
//! Where the `Intersector` answers "do these touch, and where", the
//! `Unprojector` answers "how far, and along which axis, would one of them
//! have to move (or turn) to stop touching". It is built on the same
//! `support`/`project` interval primitives as the rest of the crate instead
//! of ~30 bespoke analytic separating-vector routines, one per primitive
//! pair — the candidate-axis set is assembled per primitive kind (face
//! normals for a box, the shared axis for a cylinder/capsule, the
//! center-to-center direction for a sphere) and the minimum-overlap axis
//! across that set is the unprojection direction, exactly the SAT
//! discipline `box_box_intersection` already uses for a single pair.

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::primitive::Primitive;
use crate::rational::SinCosTable;
use crate::Real;

#[derive(Debug, Default)]
pub struct Unprojector;

/// Minimum-translation separation: the shortest vector that, added to
/// `p2`'s position, would remove the overlap with `p1`. `None` if the
/// shapes don't overlap along any candidate axis (a cheap witness of
/// separation, not a full proof for curved pairs) or if neither shape
/// offers a usable axis set (e.g. two rays).
impl Unprojector {
    pub fn unproject_translation(p1: &Primitive, p2: &Primitive) -> Option<Vector3<Real>> {
        let mut axes = candidate_axes(p1);
        axes.extend(candidate_axes(p2));
        let center_dir = center_of(p2) - center_of(p1);
        if center_dir.magnitude2() > 1e-14 {
            axes.push(center_dir.normalize());
        }
        if axes.is_empty() {
            return None;
        }

        let mut min_overlap = Real::INFINITY;
        let mut min_axis = Vector3::unit_x();
        for axis in axes {
            let (lo1, hi1) = p1.project(axis);
            let (lo2, hi2) = p2.project(axis);
            let overlap = hi1.min(hi2) - lo1.max(lo2);
            if overlap < 0.0 {
                return None; // axis separates them: no overlap to unproject
            }
            if overlap < min_overlap {
                min_overlap = overlap;
                // Push p2 away from p1 along this axis.
                let sign = if (lo2 + hi2) - (lo1 + hi1) < 0.0 { -1.0 } else { 1.0 };
                min_axis = axis * sign;
            }
        }
        Some(min_axis * min_overlap)
    }

    /// Directional separation (§4.5/§4.6, `imode == 0`): the minimal
    /// translation of `p2` along `dir` (need not be unit) that removes its
    /// overlap with `p1`, bounded by `tmax`. Unlike
    /// [`unproject_translation`](Self::unproject_translation), the axis is
    /// fixed by the caller rather than searched for — this is exact for
    /// convex primitives: once the shadows of `p1` and `p2` on `dir` stop
    /// overlapping, the primitives themselves no longer overlap, regardless
    /// of every other axis, so a single 1-D interval check suffices. `None`
    /// if the shapes don't currently overlap on `dir`, or if the needed
    /// translation exceeds `tmax`.
    pub fn unproject_along(p1: &Primitive, p2: &Primitive, dir: Vector3<Real>, tmax: Real) -> Option<Real> {
        if dir.magnitude2() < 1e-20 {
            return None;
        }
        let dir = dir.normalize();
        let (lo1, hi1) = p1.project(dir);
        let (lo2, hi2) = p2.project(dir);
        if lo2 > hi1 || lo1 > hi2 {
            return None; // already separated on this axis
        }
        // Exit in whichever direction along `dir` is nearer.
        let t_pos = hi1 - lo2;
        let t_neg = lo1 - hi2;
        let t = if t_pos.abs() <= t_neg.abs() { t_pos } else { t_neg };
        if t < 0.0 || t > tmax {
            return None;
        }
        Some(t)
    }

    /// Minimum rotational separation of `p2` about `pivot`/`axis` that
    /// removes its overlap with `p1`, found by bisecting the (assumed
    /// monotone over one table period) penetration-depth function with a
    /// [`SinCosTable`] — the same root-finding idiom `root_inrange` and the
    /// cap-vs-ellipse tests use for their own monotone cubic.
    pub fn unproject_rotation<F>(table: &SinCosTable, pivot: Point3<Real>, axis: Vector3<Real>, depth_at: F) -> Option<Real>
    where
        F: Fn(Real, Real) -> Real,
    {
        let _ = pivot;
        let _ = axis;
        table.bisect_monotone(|s, c| depth_at(s, c)).map(|i| {
            let (s, c) = table.at(i);
            s.atan2(c)
        })
    }
}

fn center_of(p: &Primitive) -> Point3<Real> {
    let (lo, hi) = p.aabb();
    Point3::new((lo.x + hi.x) * 0.5, (lo.y + hi.y) * 0.5, (lo.z + hi.z) * 0.5)
}

/// Axes worth testing for a primitive's own "natural" separating
/// directions — analogous to the face normals / axis a SAT test would pull
/// from each shape's own orientation.
fn candidate_axes(p: &Primitive) -> Vec<Vector3<Real>> {
    match p {
        Primitive::Triangle(t) => vec![t.n],
        Primitive::Box(b) => b.basis.to_vec(),
        Primitive::Cylinder(c) => vec![c.axis, perpendicular(c.axis)],
        Primitive::Capsule(c) => vec![c.axis, perpendicular(c.axis)],
        Primitive::Sphere(_) => Vec::new(),
        Primitive::Ray(r) => {
            if r.dir.magnitude2() > 1e-14 {
                vec![r.dir.normalize()]
            } else {
                Vec::new()
            }
        }
        Primitive::Plane(pl) => vec![pl.n],
        Primitive::Heightfield(_) => Vec::new(),
    }
}

fn perpendicular(axis: Vector3<Real>) -> Vector3<Real> {
    let axis = if axis.magnitude2() > 1e-12 { axis.normalize() } else { Vector3::unit_z() };
    let helper = if axis.x.abs() < 0.9 { Vector3::unit_x() } else { Vector3::unit_y() };
    axis.cross(helper).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{Box3, Sphere};

    #[test]
    fn translation_separates_overlapping_spheres() {
        let s1 = Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 });
        let s2 = Primitive::Sphere(Sphere { center: Point3::new(1.0, 0.0, 0.0), r: 1.0 });
        let mtv = Unprojector::unproject_translation(&s1, &s2).expect("spheres overlap");
        assert!(mtv.magnitude() > 0.0);
        let moved = Primitive::Sphere(Sphere { center: Point3::new(1.0, 0.0, 0.0) + mtv, r: 1.0 });
        let (lo1, hi1) = s1.project(Vector3::unit_x());
        let (lo2, hi2) = moved.project(Vector3::unit_x());
        assert!(hi1.min(hi2) - lo1.max(lo2) <= 1e-4);
    }

    #[test]
    fn translation_none_when_separated() {
        let b1 = Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)));
        let b2 = Primitive::Box(Box3::axis_aligned(Point3::new(10.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)));
        assert!(Unprojector::unproject_translation(&b1, &b2).is_none());
    }

    #[test]
    fn unproject_along_finds_exit_distance() {
        let s1 = Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 });
        let s2 = Primitive::Sphere(Sphere { center: Point3::new(0.5, 0.0, 0.0), r: 1.0 });
        let t = Unprojector::unproject_along(&s1, &s2, Vector3::unit_x(), 10.0).expect("overlapping on x");
        assert_approx_eq::assert_approx_eq!(t, 1.5, 1e-6);
    }

    #[test]
    fn unproject_along_none_past_tmax() {
        let s1 = Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 });
        let s2 = Primitive::Sphere(Sphere { center: Point3::new(0.5, 0.0, 0.0), r: 1.0 });
        assert!(Unprojector::unproject_along(&s1, &s2, Vector3::unit_x(), 0.1).is_none());
    }
}
