//! Bounding volumes used by the BVH (§3).
//!
//! A [`BoundingVolume`] reuses the same tag space as [`PrimType`]: an AABB or
//! OBB is tagged `Box`, a capsule-BV is tagged `Capsule`, and so on. Triangle,
//! Plane and Heightfield cannot act as bounding volumes and never appear
//! here; the [`Overlapper`](crate::overlap::Overlapper) table resolves those
//! rows/columns to `default_overlap = false`.

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::primitive::PrimType;
use crate::Real;

#[derive(Debug, Clone)]
pub struct Aabb {
    pub min: Point3<Real>,
    pub max: Point3<Real>,
}

impl Aabb {
    pub fn new(min: Point3<Real>, max: Point3<Real>) -> Self {
        Aabb { min, max }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(
            Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    pub fn center(&self) -> Point3<Real> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    pub fn half_extent(&self) -> Vector3<Real> {
        (self.max - self.min) * 0.5
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn expanded(&self, by: Vector3<Real>) -> Aabb {
        Aabb::new(self.min - by, self.max + by)
    }

    /// AABB swept along `dir` by `step` (used to build swept BVs, §4.6).
    pub fn swept(&self, dir: Vector3<Real>, step: Real) -> Aabb {
        let end = dir * step;
        let a = Aabb::new(self.min, self.max);
        let b = Aabb::new(self.min + end, self.max + end);
        a.union(&b)
    }
}

#[derive(Debug, Clone)]
pub struct Obb {
    pub center: Point3<Real>,
    pub basis: [Vector3<Real>; 3],
    pub half: Vector3<Real>,
}

#[derive(Debug, Clone)]
pub struct CapsuleBv {
    pub center: Point3<Real>,
    pub axis: Vector3<Real>,
    pub r: Real,
    pub hh: Real,
}

#[derive(Debug, Clone)]
pub struct SphereBv {
    pub center: Point3<Real>,
    pub r: Real,
}

#[derive(Debug, Clone)]
pub struct RayBv {
    pub origin: Point3<Real>,
    pub dir: Vector3<Real>,
}

/// A bounding volume, tagged with the same [`PrimType`] namespace the
/// primitive dispatch tables use (spec.md §3 invariant: "`type` in
/// `0..NPRIMS`").
#[derive(Debug, Clone)]
pub enum BoundingVolume {
    Aabb { node_id: usize, aabb: Aabb },
    Obb { node_id: usize, obb: Obb },
    Capsule { node_id: usize, cap: CapsuleBv },
    Sphere { node_id: usize, sph: SphereBv },
    Ray { node_id: usize, ray: RayBv },
}

impl BoundingVolume {
    pub fn bv_type(&self) -> PrimType {
        match self {
            BoundingVolume::Aabb { .. } | BoundingVolume::Obb { .. } => PrimType::Box,
            BoundingVolume::Capsule { .. } => PrimType::Capsule,
            BoundingVolume::Sphere { .. } => PrimType::Sphere,
            BoundingVolume::Ray { .. } => PrimType::Ray,
        }
    }

    pub fn node_id(&self) -> usize {
        match self {
            BoundingVolume::Aabb { node_id, .. }
            | BoundingVolume::Obb { node_id, .. }
            | BoundingVolume::Capsule { node_id, .. }
            | BoundingVolume::Sphere { node_id, .. }
            | BoundingVolume::Ray { node_id, .. } => *node_id,
        }
    }

    /// A loose AABB around the volume, used for the rough radius-prune in
    /// the occlusion cubemap descent (§4.8) and for sanity checks.
    pub fn loose_aabb(&self) -> Aabb {
        match self {
            BoundingVolume::Aabb { aabb, .. } => aabb.clone(),
            BoundingVolume::Obb { obb, .. } => {
                let ext = (obb.basis[0] * obb.half.x).map(|v| v.abs())
                    + (obb.basis[1] * obb.half.y).map(|v| v.abs())
                    + (obb.basis[2] * obb.half.z).map(|v| v.abs());
                Aabb::new(obb.center - ext, obb.center + ext)
            }
            BoundingVolume::Capsule { cap, .. } => {
                let r = Vector3::new(cap.r, cap.r, cap.r);
                let end = cap.axis * cap.hh;
                Aabb::new(cap.center - end - r, cap.center + end + r).union(&Aabb::new(
                    cap.center - end - r,
                    cap.center + end + r,
                ))
            }
            BoundingVolume::Sphere { sph, .. } => {
                let r = Vector3::new(sph.r, sph.r, sph.r);
                Aabb::new(sph.center - r, sph.center + r)
            }
            BoundingVolume::Ray { ray, .. } => {
                let a = ray.origin;
                let b = ray.origin + ray.dir;
                Aabb::new(
                    Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
                    Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aabb_union_covers_both() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(2.0, -1.0, 0.0), Point3::new(3.0, 0.5, 1.0));
        let u = a.union(&b);
        assert_eq!(u.min, Point3::new(0.0, -1.0, 0.0));
        assert_eq!(u.max, Point3::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn aabb_overlap_detects_separation() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 6.0, 6.0));
        assert!(!a.overlaps(&b));
    }
}
