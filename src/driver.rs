//! §4.3/§4.6/§4.7/§6 — the driver: dual-BV descent, the swept variant, the
//! primitive-body fast path, and the `Geometry` facade every caller uses.

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::bv::BoundingVolume;
use crate::bvh::LeafPrimitive;
use crate::contact::{register_intersection, BestHit, Contact, ContactSet};
use crate::gtest::{GeometryUnderTest, IntersectionParams};
use crate::intersect::Intersector;
use crate::occlusion::{Cubemap, CUBEMAP_FACE_SIZE};
use crate::overlap::Overlapper;
use crate::primitive::Primitive;
use crate::unproject::Unprojector;
use crate::Real;

/// Dual bounding-volume descent (§4.3): walks `g1`'s and `g2`'s trees in
/// lockstep, pruning with `Overlapper` and only invoking `Intersector` once
/// both sides have bottomed out at leaves. `i_start_node`, if given, skips
/// straight to that pair of subtrees instead of starting at both roots —
/// the BVH traversal hint a caller reuses across frames when a body pair
/// keeps overlapping near the same leaf (the original's `iFeature1`-style
/// warm start, supplemented here from the original source's BVH caching).
pub fn intersect_bvs(g1: &mut GeometryUnderTest, g2: &mut GeometryUnderTest, params: &IntersectionParams) -> Vec<Contact> {
    intersect_bvs_hinted(g1, g2, params, None)
}

/// As [`intersect_bvs`], but given an `i_start_node` hint (§6) the descent
/// is attempted from that node pair first, falling back to the tree roots
/// only if the hinted subtrees produced no contact at all.
pub fn intersect_bvs_hinted(
    g1: &mut GeometryUnderTest,
    g2: &mut GeometryUnderTest,
    params: &IntersectionParams,
    i_start_node: Option<(BoundingVolume, BoundingVolume)>,
) -> Vec<Contact> {
    if let Some((hint1, hint2)) = i_start_node {
        let mut set = ContactSet::with_budget(params.max_contacts);
        descend(g1, g2, &hint1, &hint2, params, &mut set);
        if !set.is_empty() {
            return finish(set, params);
        }
    }
    let mut set = ContactSet::with_budget(params.max_contacts);
    let bv1 = g1.tree.root_bv();
    let bv2 = g2.tree.root_bv();
    descend(g1, g2, &bv1, &bv2, params, &mut set);
    finish(set, params)
}

/// Sorts a collected `ContactSet`'s (already budget-bounded) contents and,
/// if anything was dropped during collection, raises `stop_intersection` on
/// the caller's scratch record (§5 "Cancellation").
fn finish(set: ContactSet, params: &IntersectionParams) -> Vec<Contact> {
    let (contacts, truncated) = set.finish();
    if truncated {
        crate::scratch::with_caller_scratch(params.caller_id, |s| s.stop_intersection = true);
    }
    contacts
}

fn descend(
    g1: &mut GeometryUnderTest,
    g2: &mut GeometryUnderTest,
    bv1: &BoundingVolume,
    bv2: &BoundingVolume,
    params: &IntersectionParams,
    set: &mut ContactSet,
) {
    // Step 1: UsedNodes cache — if both sides already resolved this exact
    // pair, recursing further into it is redundant (§4.3 step 1).
    let used1 = g1.used_nodes.record_or_recall(bv1, bv2, false);
    let used2 = g2.used_nodes.record_or_recall(bv2, bv1, false);
    if used1 && used2 {
        return;
    }

    // Step 2: overlap prune.
    if !Overlapper::check(bv1.bv_type(), bv2.bv_type(), bv1, bv2) {
        return;
    }

    match (g1.tree.leaf_primitives(bv1), g2.tree.leaf_primitives(bv2)) {
        (Some(leaves1), Some(leaves2)) => {
            // Step 4: leaf case.
            for l1 in leaves1 {
                for l2 in leaves2 {
                    test_leaf_pair(g1, g2, l1, l2, params, set);
                    // §5 "Cancellation": poll stop_intersection after every
                    // leaf-pair dispatch instead of waiting for the whole
                    // descent to finish.
                    if set.truncated() {
                        return;
                    }
                }
            }
        }
        (Some(_), None) => {
            // bv1 is a leaf, bv2 is internal: must split bv2.
            if let Some((c1, c2)) = g2.tree.child_bvs(bv2) {
                descend(g1, g2, bv1, &c1, params, set);
                let truncated = set.truncated();
                g2.tree.release_bvs(std::slice::from_ref(&c1));
                if truncated {
                    return;
                }
                descend(g1, g2, bv1, &c2, params, set);
                g2.tree.release_bvs(std::slice::from_ref(&c2));
            }
        }
        (None, Some(_)) => {
            // bv2 is a leaf, bv1 is internal: must split bv1.
            if let Some((c1, c2)) = g1.tree.child_bvs(bv1) {
                descend(g1, g2, &c1, bv2, params, set);
                let truncated = set.truncated();
                g1.tree.release_bvs(std::slice::from_ref(&c1));
                if truncated {
                    return;
                }
                descend(g1, g2, &c2, bv2, params, set);
                g1.tree.release_bvs(std::slice::from_ref(&c2));
            }
        }
        (None, None) => {
            // Step 3: split choice — both sides are internal, split
            // whichever has the higher `split_priority`; ties favor bv1.
            let s1 = g1.tree.split_priority(bv1);
            let s2 = g2.tree.split_priority(bv2);
            if s1 >= s2 {
                if let Some((c1, c2)) = g1.tree.child_bvs(bv1) {
                    let (first, second) = if g1.tree.split_priority(&c1) >= g1.tree.split_priority(&c2) { (c1, c2) } else { (c2, c1) };
                    descend(g1, g2, &first, bv2, params, set);
                    let truncated = set.truncated();
                    g1.tree.release_bvs(std::slice::from_ref(&first));
                    if truncated {
                        g1.tree.release_bvs(std::slice::from_ref(&second));
                        return;
                    }
                    descend(g1, g2, &second, bv2, params, set);
                    g1.tree.release_bvs(std::slice::from_ref(&second));
                }
            } else if let Some((c1, c2)) = g2.tree.child_bvs(bv2) {
                let (first, second) = if g2.tree.split_priority(&c1) >= g2.tree.split_priority(&c2) { (c1, c2) } else { (c2, c1) };
                descend(g1, g2, bv1, &first, params, set);
                let truncated = set.truncated();
                g2.tree.release_bvs(std::slice::from_ref(&first));
                if truncated {
                    g2.tree.release_bvs(std::slice::from_ref(&second));
                    return;
                }
                descend(g1, g2, bv1, &second, params, set);
                g2.tree.release_bvs(std::slice::from_ref(&second));
            }
        }
    }
}

fn test_leaf_pair(
    g1: &GeometryUnderTest,
    g2: &GeometryUnderTest,
    l1: &LeafPrimitive,
    l2: &LeafPrimitive,
    params: &IntersectionParams,
    set: &mut ContactSet,
) {
    let p1 = world_primitive(g1, &l1.prim);
    let p2 = world_primitive(g2, &l2.prim);
    let mut pi = crate::intersect::PrimIntersection::new(params.min_vtx_dist * params.min_vtx_dist);
    if Intersector::check(p1.prim_type(), p2.prim_type(), &p1, &p2, &mut pi) {
        // §4.3 step 4c/4.5: delegate to register_intersection so the raw
        // segment gets a real unprojection instead of a zero depth.
        let v_rel = Vector3::new(0.0, 0.0, 0.0);
        let id = [l1.index, l2.index];
        let i_node = [l1.index, l2.index];
        if let Some(contact) = register_intersection(&pi, &p1, &p2, v_rel, [l1.index, l2.index], id, i_node, params) {
            if contact.depth >= params.min_penetration {
                set.push(contact);
            }
        }
    }
}

/// Expresses a body-local primitive in world space using its
/// `GeometryUnderTest`'s rigid transform.
fn world_primitive(g: &GeometryUnderTest, prim: &Primitive) -> Primitive {
    match prim {
        Primitive::Triangle(t) => Primitive::Triangle(crate::primitive::Triangle::new(
            g.to_world(t.pt[0]),
            g.to_world(t.pt[1]),
            g.to_world(t.pt[2]),
        )),
        Primitive::Box(b) => Primitive::Box(crate::primitive::Box3 {
            center: g.to_world(b.center),
            basis: [g.to_world_dir(b.basis[0]), g.to_world_dir(b.basis[1]), g.to_world_dir(b.basis[2])],
            size: b.size,
            oriented: b.oriented,
        }),
        Primitive::Cylinder(c) => Primitive::Cylinder(crate::primitive::Cylinder {
            center: g.to_world(c.center),
            axis: g.to_world_dir(c.axis),
            r: c.r,
            hh: c.hh,
        }),
        Primitive::Capsule(c) => Primitive::Capsule(crate::primitive::Capsule {
            center: g.to_world(c.center),
            axis: g.to_world_dir(c.axis),
            r: c.r,
            hh: c.hh,
        }),
        Primitive::Sphere(s) => Primitive::Sphere(crate::primitive::Sphere { center: g.to_world(s.center), r: s.r }),
        Primitive::Ray(r) => Primitive::Ray(crate::primitive::Ray { origin: g.to_world(r.origin), dir: g.to_world_dir(r.dir) }),
        Primitive::Plane(p) => Primitive::Plane(crate::primitive::Plane { origin: g.to_world(p.origin), n: g.to_world_dir(p.n) }),
        Primitive::Heightfield(_) => Primitive::Heightfield(crate::primitive::Heightfield),
    }
}

/// Swept query (§4.6): `g1` moves by `step * dir` over the query; BVs are
/// expanded along the motion before the usual descent, and any contact
/// whose witness point lies behind the starting position is treated as a
/// pass-through and recovered by re-testing at `t=0` instead of discarded
/// (the sweep-recovery behavior original_source's sweep path relies on to
/// avoid tunnelling through thin geometry at the very start of a step).
pub fn sweep_bvs(
    g1: &mut GeometryUnderTest,
    g2: &mut GeometryUnderTest,
    dir: Vector3<Real>,
    step: Real,
    params: &IntersectionParams,
) -> Vec<Contact> {
    let bv1 = g1.tree.root_bv();
    let bv2 = g2.tree.root_bv();
    let swept1 = swept_bv(&bv1, dir, step);

    let mut best = BestHit::new();
    descend_swept(g1, g2, &swept1, &bv2, dir, step, params, &mut best);
    let contacts = best.into_vec();
    if !contacts.is_empty() {
        return contacts;
    }

    // Pass-through recovery (§4.7): the sweep found nothing, but the bodies
    // may already be touching at the very start of the step.
    let mut set = ContactSet::with_budget(params.max_contacts.max(1));
    descend(g1, g2, &bv1, &bv2, params, &mut set);
    finish(set, params)
}

fn swept_bv(bv: &BoundingVolume, dir: Vector3<Real>, step: Real) -> BoundingVolume {
    let aabb = bv.loose_aabb().swept(dir, step);
    BoundingVolume::Aabb { node_id: bv.node_id(), aabb }
}

fn descend_swept(
    g1: &GeometryUnderTest,
    g2: &GeometryUnderTest,
    bv1: &BoundingVolume,
    bv2: &BoundingVolume,
    dir: Vector3<Real>,
    step: Real,
    params: &IntersectionParams,
    best: &mut BestHit,
) {
    if !Overlapper::check(bv1.bv_type(), bv2.bv_type(), bv1, bv2) {
        return;
    }
    match (g1.tree.leaf_primitives(bv1), g2.tree.leaf_primitives(bv2)) {
        (Some(leaves1), Some(leaves2)) => {
            for l1 in leaves1 {
                for l2 in leaves2 {
                    test_swept_leaf_pair(g1, g2, l1, l2, dir, step, params, best);
                }
            }
        }
        (Some(_), None) => {
            if let Some((c1, c2)) = g2.tree.child_bvs(bv2) {
                descend_swept(g1, g2, bv1, &c1, dir, step, params, best);
                g2.tree.release_swept_bvs(std::slice::from_ref(&c1));
                descend_swept(g1, g2, bv1, &c2, dir, step, params, best);
                g2.tree.release_swept_bvs(std::slice::from_ref(&c2));
            }
        }
        (None, _) => {
            if let Some((c1, c2)) = g1.tree.child_bvs(bv1) {
                let sc1 = swept_bv(&c1, dir, step);
                let sc2 = swept_bv(&c2, dir, step);
                descend_swept(g1, g2, &sc1, bv2, dir, step, params, best);
                g1.tree.release_swept_bvs(std::slice::from_ref(&c1));
                descend_swept(g1, g2, &sc2, bv2, dir, step, params, best);
                g1.tree.release_swept_bvs(std::slice::from_ref(&c2));
            }
        }
    }
}

/// §4.6 leaf dispatch: run the `Unprojector` along `-dir` with `tmax =
/// step`, bounded so the hit is an entry (not a far-side exit), and keep
/// it only if it is this body pair's earliest impact so far.
fn test_swept_leaf_pair(
    g1: &GeometryUnderTest,
    g2: &GeometryUnderTest,
    l1: &LeafPrimitive,
    l2: &LeafPrimitive,
    dir: Vector3<Real>,
    step: Real,
    params: &IntersectionParams,
    best: &mut BestHit,
) {
    let p2 = world_primitive(g2, &l2.prim);
    let p1_base = world_primitive(g1, &l1.prim);
    let mut p1_end = p1_base.clone();
    translate(&mut p1_end, dir * step);

    let min_pt_dist2 = params.min_vtx_dist * params.min_vtx_dist;
    let mut pi = crate::intersect::PrimIntersection::new(min_pt_dist2);
    if !Intersector::check(p1_end.prim_type(), p2.prim_type(), &p1_end, &p2, &mut pi) {
        return; // never touches within the step
    }

    // How far back from the end position would `p1` need to retreat along
    // `-dir` to just clear the overlap with `p2`? `step` minus that retreat
    // distance is the time of first impact.
    let retreat = match Unprojector::unproject_along(&p2, &p1_end, -dir, step) {
        Some(r) => r,
        None => step, // already overlapping at the very start of the sweep
    };
    let t_impact = (step - retreat).max(0.0);

    let mut p1_impact = p1_base.clone();
    translate(&mut p1_impact, dir * t_impact);
    let mut pi_impact = crate::intersect::PrimIntersection::new(min_pt_dist2);
    if !Intersector::check(p1_impact.prim_type(), p2.prim_type(), &p1_impact, &p2, &mut pi_impact) {
        // Numerical edge case: the reconstructed impact pose doesn't quite
        // touch; fall back to the end-of-step witness geometry.
        pi_impact = pi;
    }

    if pi_impact.n.dot(dir) <= 0.0 {
        return;
    }
    if t_impact > step {
        return;
    }

    let v_rel = dir;
    let id = [l1.index, l2.index];
    let i_node = [l1.index, l2.index];
    if let Some(mut contact) = register_intersection(&pi_impact, &p1_impact, &p2, v_rel, [l1.index, l2.index], id, i_node, params) {
        contact.t = t_impact;
        contact.dir = dir;
        contact.vel = dir.magnitude();
        if contact.depth >= params.min_penetration {
            best.offer(contact);
        }
    }
}

fn translate(p: &mut Primitive, by: Vector3<Real>) {
    match p {
        Primitive::Triangle(t) => t.pt.iter_mut().for_each(|pt| *pt = *pt + by),
        Primitive::Box(b) => b.center = b.center + by,
        Primitive::Cylinder(c) => c.center = c.center + by,
        Primitive::Capsule(c) => c.center = c.center + by,
        Primitive::Sphere(s) => s.center = s.center + by,
        Primitive::Ray(r) => r.origin = r.origin + by,
        Primitive::Plane(pl) => pl.origin = pl.origin + by,
        Primitive::Heightfield(_) => {}
    }
}

/// Fast path for a lone primitive against a body (§4.7): skips the dual
/// descent and tests the primitive against every leaf directly, which is
/// cheaper than building a one-leaf tree when the caller already has a
/// single shape in hand (a thrown object, a raycast probe).
pub fn intersect_primitive_body(prim: &Primitive, g: &GeometryUnderTest, params: &IntersectionParams) -> Vec<Contact> {
    let mut set = ContactSet::with_budget(params.max_contacts);
    let root = g.tree.root_bv();
    descend_primitive(prim, g, &root, params, &mut set);
    finish(set, params)
}

fn descend_primitive(prim: &Primitive, g: &GeometryUnderTest, bv: &BoundingVolume, params: &IntersectionParams, set: &mut ContactSet) {
    let (lo, hi) = prim.aabb();
    if !bv.loose_aabb().overlaps(&crate::bv::Aabb::new(lo, hi)) {
        return;
    }
    match g.tree.leaf_primitives(bv) {
        Some(leaves) => {
            for l in leaves {
                let p2 = world_primitive(g, &l.prim);
                let mut pi = crate::intersect::PrimIntersection::new(params.min_vtx_dist * params.min_vtx_dist);
                if Intersector::check(prim.prim_type(), p2.prim_type(), prim, &p2, &mut pi) {
                    let v_rel = Vector3::new(0.0, 0.0, 0.0);
                    let id = [u32::MAX, l.index];
                    if let Some(contact) = register_intersection(&pi, prim, &p2, v_rel, [u32::MAX, l.index], id, id, params) {
                        if contact.depth >= params.min_penetration {
                            set.push(contact);
                        }
                    }
                }
            }
        }
        None => {
            if let Some((c1, c2)) = g.tree.child_bvs(bv) {
                descend_primitive(prim, g, &c1, params, set);
                g.tree.release_bvs(std::slice::from_ref(&c1));
                descend_primitive(prim, g, &c2, params, set);
                g.tree.release_bvs(std::slice::from_ref(&c2));
            }
        }
    }
}

/// §6 external interface: the facade a caller outside this crate is meant
/// to hold onto per body. `tree` is borrowed, not owned, so callers keep
/// their own body storage; `Geometry` just adds the rigid transform and
/// the query entry points over it.
pub struct Geometry<'a> {
    pub gtest: GeometryUnderTest<'a>,
}

impl<'a> std::fmt::Debug for Geometry<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry").field("gtest", &self.gtest).finish()
    }
}

impl<'a> Geometry<'a> {
    pub fn new(gtest: GeometryUnderTest<'a>) -> Self {
        Geometry { gtest }
    }

    pub fn intersect(&mut self, other: &mut Geometry, params: &IntersectionParams) -> Vec<Contact> {
        intersect_bvs(&mut self.gtest, &mut other.gtest, params)
    }

    /// As [`Geometry::intersect`], but with an `i_start_node` BVH traversal
    /// hint (§6): a non-root node pair the descent tries first, falling
    /// back to the full tree only if it finds nothing there.
    pub fn intersect_hinted(
        &mut self,
        other: &mut Geometry,
        params: &IntersectionParams,
        i_start_node: Option<(BoundingVolume, BoundingVolume)>,
    ) -> Vec<Contact> {
        intersect_bvs_hinted(&mut self.gtest, &mut other.gtest, params, i_start_node)
    }

    pub fn sweep(&mut self, other: &mut Geometry, dir: Vector3<Real>, step: Real, params: &IntersectionParams) -> Vec<Contact> {
        sweep_bvs(&mut self.gtest, &mut other.gtest, dir, step, params)
    }

    pub fn sphere_check(&self, center: Point3<Real>, r: Real, params: &IntersectionParams) -> Vec<Contact> {
        let sphere = Primitive::Sphere(crate::primitive::Sphere { center, r });
        intersect_primitive_body(&sphere, &self.gtest, params)
    }

    pub fn get_bbox(&self) -> crate::bv::Aabb {
        self.gtest.tree.root_bv().loose_aabb()
    }

    pub fn get_extent(&self) -> Real {
        let ext = self.get_bbox().half_extent();
        ext.x.max(ext.y).max(ext.z) * 2.0
    }

    /// Pseudo-random point on the body's surface, seeded from the caller so
    /// results are reproducible without this crate owning an RNG (§4.7/§4.8
    /// both need sample points but neither needs true randomness).
    pub fn get_random_pos(&self, seed: u32) -> Point3<Real> {
        let root = self.gtest.tree.root_bv();
        let bbox = root.loose_aabb();
        let center = bbox.center();
        let ext = bbox.half_extent();
        let f = |s: u32, salt: u32| -> Real {
            let h = s.wrapping_mul(2654435761).wrapping_add(salt);
            (h as Real / u32::MAX as Real) * 2.0 - 1.0
        };
        Point3::new(center.x + ext.x * f(seed, 1), center.y + ext.y * f(seed, 2), center.z + ext.z * f(seed, 3))
    }

    /// §4.8 occlusion cubemap around `eye`, rasterizing this body's
    /// triangles into the six faces.
    pub fn build_occlusion_cubemap(&self, eye: Point3<Real>) -> Cubemap {
        crate::occlusion::rasterize(&self.gtest, eye)
    }
}

pub const DEFAULT_CUBEMAP_FACE_SIZE: usize = CUBEMAP_FACE_SIZE;
