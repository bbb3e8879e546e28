//! §4.5 — contact registration, aggregation and the border-budget
//! reduction pass.

use cgmath::prelude::*;
use cgmath::{Matrix3, Point3, Rad, Vector3};

use crate::gtest::IntersectionParams;
use crate::intersect::PrimIntersection;
use crate::primitive::Primitive;
use crate::rational::SinCosTable;
use crate::unproject::Unprojector;
use crate::Real;

/// Hard cap on contacts kept per body pair before reduction; matches
/// `IntersectionParams::max_contacts`'s default (§5).
pub const MAX_CONTACTS: usize = 64;

/// Promoted border-point cloud plus the area record fields spec.md §3
/// groups under `Contact::area` (primary normal, minimum edge length).
#[derive(Debug, Clone)]
pub struct ContactArea {
    pub points: Vec<Point3<Real>>,
    pub n1: Vector3<Real>,
    pub min_edge_len: Real,
}

/// One contact manifold: a world-space position on each body, the
/// separating normal (body1 -> body2), feature ids, and the unprojection
/// that turned the raw `PrimIntersection` segment into a physically
/// meaningful penetration (§4.5).
#[derive(Debug, Clone)]
pub struct Contact {
    pub pt: [Point3<Real>; 2],
    pub n: Vector3<Real>,
    pub i_feature: [[u8; 2]; 2],
    /// Penetration depth (linear mode) or rotation angle (rotational mode)
    /// along `dir`, as found by the `Unprojector`.
    pub depth: Real,
    /// Primitive index (row into the BVH's leaf list) on each body, so a
    /// caller can map a contact back to which triangle/part it touched.
    pub i_prim: [u32; 2],
    /// Unprojection direction: a translation axis (`unproj_mode == 0`) or a
    /// rotation axis (`unproj_mode == 1`).
    pub dir: Vector3<Real>,
    /// Unprojection magnitude: linear distance or rotation angle, matching
    /// `depth` (kept as a distinct field since a future reduction pass may
    /// rewrite `depth`, e.g. clamping to `min_penetration`, without losing
    /// the raw unprojection result).
    pub t: Real,
    /// `0` = linear, `1` = rotational; mirrors `IntersectionParams::unprojection_mode`.
    pub unproj_mode: u8,
    /// Relative speed along `dir` at the moment of contact (sweep queries
    /// only; `0.0` for a static `intersect`).
    pub vel: Real,
    /// Cross-referenced identifiers for both bodies: leaf/node handles the
    /// caller's BVH assigned, distinct from `i_prim` (which indexes the
    /// caller-visible primitive list).
    pub id: [u32; 2],
    pub i_node: [u32; 2],
    pub border_points: Vec<Point3<Real>>,
    pub border_idx: Vec<[u8; 2]>,
    pub area: Option<ContactArea>,
}

impl Contact {
    /// Raw constructor used by tests and by callers that already have a
    /// fully-formed manifold; production code reaches `register_intersection`
    /// instead, which actually runs the Unprojector.
    pub fn from_intersection(pi: &PrimIntersection, i_prim: [u32; 2]) -> Self {
        Contact {
            pt: pi.pt,
            n: pi.n,
            i_feature: pi.i_feature,
            depth: 0.0,
            i_prim,
            dir: pi.n,
            t: 0.0,
            unproj_mode: 0,
            vel: 0.0,
            id: [0, 0],
            i_node: [0, 0],
            border_points: pi.border_points().to_vec(),
            border_idx: pi.border_idx().to_vec(),
            area: None,
        }
    }

    /// Swap sides: same rewrite `PrimIntersection::swap` performs, kept in
    /// sync so a `Contact` built from a wrapper routine and one built from
    /// swapping a canonical routine's output are indistinguishable.
    pub fn swapped(&self) -> Contact {
        Contact {
            pt: [self.pt[1], self.pt[0]],
            n: -self.n,
            i_feature: [[self.i_feature[1][1], self.i_feature[1][0]], [self.i_feature[0][1], self.i_feature[0][0]]],
            depth: self.depth,
            i_prim: [self.i_prim[1], self.i_prim[0]],
            dir: -self.dir,
            t: self.t,
            unproj_mode: self.unproj_mode,
            vel: self.vel,
            id: [self.id[1], self.id[0]],
            i_node: [self.i_node[1], self.i_node[0]],
            border_points: self.border_points.clone(),
            border_idx: self.border_idx.iter().map(|idx| [idx[1], idx[0]]).collect(),
            area: self.area.clone(),
        }
    }
}

/// §4.5 registration: turns a raw `PrimIntersection` segment into a
/// `Contact` by running the `Unprojector` along the direction the query's
/// mode selects. Returns `None` exactly where the original's
/// `register_intersection` would return without appending: the
/// unprojector fails, or (mode 0) the bound check in step 3 fails on both
/// the velocity-driven direction and the normal fallback.
///
/// `v_rel` is the relative velocity at `pi.pt[1]` the caller has already
/// computed (zero for a plain static `intersect`, which correctly routes
/// mode 0 straight to the `|v_rel| < vrel_min` fallback below).
pub fn register_intersection(
    pi: &PrimIntersection,
    p1: &Primitive,
    p2: &Primitive,
    v_rel: Vector3<Real>,
    i_prim: [u32; 2],
    id: [u32; 2],
    i_node: [u32; 2],
    params: &IntersectionParams,
) -> Option<Contact> {
    match params.unprojection_mode {
        1 => register_rotational(pi, p1, p2, i_prim, id, i_node, params),
        _ => register_linear(pi, p1, p2, v_rel, i_prim, id, i_node, params),
    }
}

fn register_linear(
    pi: &PrimIntersection,
    p1: &Primitive,
    p2: &Primitive,
    v_rel: Vector3<Real>,
    i_prim: [u32; 2],
    id: [u32; 2],
    i_node: [u32; 2],
    params: &IntersectionParams,
) -> Option<Contact> {
    // Step 1: select the unprojection direction.
    let speed = v_rel.magnitude();
    let velocity_driven = speed >= params.vrel_min;
    let dir = if velocity_driven { -v_rel.normalize() } else { pi.n };

    let retry_with_normal = |pi: &PrimIntersection| -> Option<Contact> {
        let t = Unprojector::unproject_along(p1, p2, pi.n, params.max_unproj)?;
        Some(build_contact(pi, i_prim, id, i_node, pi.n, t, 0, 0.0))
    };

    // Step 2: run the unprojector; on failure along a velocity-driven
    // direction, fall straight back to the SAT normal before giving up.
    let t = match Unprojector::unproject_along(p1, p2, dir, params.max_unproj) {
        Some(t) => t,
        None if velocity_driven => return retry_with_normal(pi),
        None => return None,
    };

    // Step 3: bound check — a velocity-driven unprojection that needed more
    // distance than the query's time window allows is retried with the
    // normal and zero relative speed instead.
    if velocity_driven && t > params.time_interval * speed {
        return retry_with_normal(pi);
    }
    Some(build_contact(pi, i_prim, id, i_node, dir, t, 0, if velocity_driven { speed } else { 0.0 }))
}

fn register_rotational(
    pi: &PrimIntersection,
    p1: &Primitive,
    p2: &Primitive,
    i_prim: [u32; 2],
    id: [u32; 2],
    i_node: [u32; 2],
    params: &IntersectionParams,
) -> Option<Contact> {
    let axis = if params.axis_of_rotation.magnitude2() > 1e-12 { params.axis_of_rotation.normalize() } else { return None };
    let pivot = params.center_of_rotation;
    let table = SinCosTable::new();
    let depth_at = |s: Real, c: Real| -> Real {
        let angle = s.atan2(c);
        let rotated = rotate_primitive(p2, pivot, axis, angle);
        match Unprojector::unproject_translation(p1, &rotated) {
            Some(mtv) => mtv.magnitude(),
            None => -1.0,
        }
    };
    let angle = Unprojector::unproject_rotation(&table, pivot, axis, depth_at)?;
    Some(build_contact(pi, i_prim, id, i_node, axis, angle, 1, 0.0))
}

fn build_contact(
    pi: &PrimIntersection,
    i_prim: [u32; 2],
    id: [u32; 2],
    i_node: [u32; 2],
    dir: Vector3<Real>,
    t: Real,
    unproj_mode: u8,
    vel: Real,
) -> Contact {
    Contact {
        pt: pi.pt,
        n: pi.n,
        i_feature: pi.i_feature,
        depth: t,
        i_prim,
        dir,
        t,
        unproj_mode,
        vel,
        id,
        i_node,
        border_points: pi.border_points().to_vec(),
        border_idx: pi.border_idx().to_vec(),
        area: None,
    }
}

fn rotate_primitive(p: &Primitive, pivot: Point3<Real>, axis: Vector3<Real>, angle: Real) -> Primitive {
    let m = Matrix3::from_axis_angle(axis, Rad(angle));
    let rp = |pt: Point3<Real>| pivot + m * (pt - pivot);
    let rv = |v: Vector3<Real>| m * v;
    match p {
        Primitive::Triangle(t) => Primitive::Triangle(crate::primitive::Triangle::new(rp(t.pt[0]), rp(t.pt[1]), rp(t.pt[2]))),
        Primitive::Box(b) => {
            Primitive::Box(crate::primitive::Box3 { center: rp(b.center), basis: [rv(b.basis[0]), rv(b.basis[1]), rv(b.basis[2])], size: b.size, oriented: b.oriented })
        }
        Primitive::Cylinder(c) => Primitive::Cylinder(crate::primitive::Cylinder { center: rp(c.center), axis: rv(c.axis), r: c.r, hh: c.hh }),
        Primitive::Capsule(c) => Primitive::Capsule(crate::primitive::Capsule { center: rp(c.center), axis: rv(c.axis), r: c.r, hh: c.hh }),
        Primitive::Sphere(s) => Primitive::Sphere(crate::primitive::Sphere { center: rp(s.center), r: s.r }),
        Primitive::Ray(r) => Primitive::Ray(crate::primitive::Ray { origin: rp(r.origin), dir: rv(r.dir) }),
        Primitive::Plane(pl) => Primitive::Plane(crate::primitive::Plane { origin: rp(pl.origin), n: rv(pl.n) }),
        Primitive::Heightfield(_) => Primitive::Heightfield(crate::primitive::Heightfield),
    }
}

/// Swept-query single-slot reducer (§4.6): a body pair keeps at most one
/// hit, chosen by earliest impact (smallest `t`), instead of the
/// budget-truncating `ContactSet` the static query uses.
#[derive(Debug, Default)]
pub struct BestHit {
    best: Option<Contact>,
}

impl BestHit {
    pub fn new() -> Self {
        BestHit::default()
    }

    pub fn offer(&mut self, c: Contact) {
        let better = match &self.best {
            None => true,
            Some(cur) => c.t < cur.t,
        };
        if better {
            self.best = Some(c);
        }
    }

    pub fn into_vec(self) -> Vec<Contact> {
        self.best.into_iter().collect()
    }
}

/// Accumulates contacts across a whole BVH descent for one body pair.
///
/// Budget truncation happens at `push` time, in depth-first traversal
/// order — once `budget` contacts are held, further pushes are dropped and
/// `truncated()` reports it, so the kept contacts are always a prefix of
/// what an unbounded run would have produced, in traversal order. Sorting
/// (by descending depth, §5 "then reordered to descending t") happens only
/// afterwards, in `finish`, over that already-bounded set — never before
/// truncation, which would let a late-discovered deep contact evict an
/// early shallow one and break the traversal-order prefix guarantee.
#[derive(Debug)]
pub struct ContactSet {
    contacts: Vec<Contact>,
    budget: usize,
    truncated: bool,
}

impl ContactSet {
    pub fn new() -> Self {
        ContactSet::with_budget(MAX_CONTACTS)
    }

    pub fn with_budget(budget: usize) -> Self {
        ContactSet { contacts: Vec::new(), budget, truncated: false }
    }

    pub fn push(&mut self, c: Contact) {
        if self.contacts.len() < self.budget {
            self.contacts.push(c);
        } else {
            self.truncated = true;
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Sorts the already-bounded contact list by descending `t` (§4.5
    /// "sort the contact slice in descending t") and returns it alongside
    /// whether truncation dropped anything.
    pub fn finish(mut self) -> (Vec<Contact>, bool) {
        self.contacts.sort_by(|a, b| b.t.partial_cmp(&a.t).unwrap());
        (self.contacts, self.truncated)
    }

    pub fn into_vec(self) -> Vec<Contact> {
        self.contacts
    }
}

impl Default for ContactSet {
    fn default() -> Self {
        ContactSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(t: Real) -> Contact {
        Contact {
            pt: [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)],
            n: Vector3::unit_x(),
            i_feature: [[0, 0], [0, 0]],
            depth: t,
            i_prim: [0, 0],
            dir: Vector3::unit_x(),
            t,
            unproj_mode: 0,
            vel: 0.0,
            id: [0, 0],
            i_node: [0, 0],
            border_points: Vec::new(),
            border_idx: Vec::new(),
            area: None,
        }
    }

    #[test]
    fn budget_truncates_in_traversal_order_then_sorts() {
        let mut set = ContactSet::with_budget(2);
        set.push(contact(0.1)); // kept: first in traversal order
        set.push(contact(0.9)); // kept: second
        set.push(contact(0.5)); // dropped: budget already full
        let (reduced, truncated) = set.finish();
        assert!(truncated);
        assert_eq!(reduced.len(), 2);
        // sorted by t after truncation, not before: the 0.5 contact never
        // got the chance to evict the shallower 0.1 one.
        assert_approx_eq::assert_approx_eq!(reduced[0].t, 0.9, 1e-6);
        assert_approx_eq::assert_approx_eq!(reduced[1].t, 0.1, 1e-6);
    }

    #[test]
    fn no_truncation_when_under_budget() {
        let mut set = ContactSet::with_budget(5);
        set.push(contact(0.1));
        set.push(contact(0.9));
        let (reduced, truncated) = set.finish();
        assert!(!truncated);
        assert_eq!(reduced.len(), 2);
    }

    #[test]
    fn swap_is_involutive() {
        let c = contact(0.3);
        let back = c.swapped().swapped();
        assert_eq!(back.i_prim, c.i_prim);
        assert_approx_eq::assert_approx_eq!(back.n.x, c.n.x, 1e-6);
    }

    #[test]
    fn best_hit_keeps_earliest_impact() {
        let mut best = BestHit::new();
        best.offer(contact(1.5));
        best.offer(contact(0.4));
        best.offer(contact(2.0));
        let hits = best.into_vec();
        assert_eq!(hits.len(), 1);
        assert_approx_eq::assert_approx_eq!(hits[0].t, 0.4, 1e-6);
    }
}
