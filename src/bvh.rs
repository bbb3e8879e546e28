//! §3/§4.3 — the `BVTree` visitor contract and a concrete binary BVH.
//!
//! `BVTree` is the interface the driver (`intersect_bvs`/`sweep_bvs`) walks;
//! it never owns a tree directly; it is handed one per `GeometryUnderTest`
//! (§5). Bounding volumes returned from `child_bvs`/`root_bv` are borrowed
//! from a caller-scoped arena: the driver must release them, in LIFO order,
//! through [`BVTree::release_bvs`] once it backs out of that subtree. This
//! mirrors the original's node-handle lifetime, where a BV is only valid
//! between the call that produced it and the matching release.

use crate::bv::{Aabb, BoundingVolume, SphereBv};
use crate::primitive::{Primitive, PrimType};
use crate::Real;

/// A leaf payload: a primitive plus the index the caller should use to
/// report it back to whatever owns the geometry (a triangle index into a
/// mesh, a part index into a compound body, and so on).
#[derive(Debug, Clone)]
pub struct LeafPrimitive {
    pub index: u32,
    pub prim: Primitive,
}

/// The contract a body's bounding-volume hierarchy exposes to the driver.
/// Implementors are free to lay out storage however they like; the only
/// requirement is that `release_bvs`/`release_swept_bvs` undo exactly the
/// allocations `root_bv`/`child_bvs` made, in reverse order.
pub trait BVTree {
    fn root_bv(&self) -> BoundingVolume;

    /// A root BV restricted to the part of the tree overlapping `bbox`,
    /// used when only a sub-region of a large body (a heightfield tile, a
    /// big static mesh) needs to be queried.
    fn root_bv_in(&self, bbox: &Aabb) -> Option<BoundingVolume> {
        if self.root_bv().loose_aabb().overlaps(bbox) {
            Some(self.root_bv())
        } else {
            None
        }
    }

    /// Heuristic for which of two candidate subtrees the driver should
    /// descend into first (larger volume descends first, matching a
    /// largest-extent-first traversal order).
    fn split_priority(&self, node: &BoundingVolume) -> Real {
        let ext = node.loose_aabb().half_extent();
        ext.x.max(ext.y).max(ext.z)
    }

    fn child_bvs(&self, node: &BoundingVolume) -> Option<(BoundingVolume, BoundingVolume)>;

    /// Variant of [`child_bvs`](Self::child_bvs) that prunes children not
    /// overlapping `rel_bbox`, letting the driver skip whole subtrees when
    /// only a local region of the tree is relevant (the swept-query case,
    /// §4.6).
    fn child_bvs_rel(&self, node: &BoundingVolume, rel_bbox: &Aabb) -> Option<(BoundingVolume, BoundingVolume)> {
        let (a, b) = self.child_bvs(node)?;
        let a = if a.loose_aabb().overlaps(rel_bbox) { Some(a) } else { None };
        let b = if b.loose_aabb().overlaps(rel_bbox) { Some(b) } else { None };
        match (a, b) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    fn leaf_primitives(&self, node: &BoundingVolume) -> Option<&[LeafPrimitive]>;

    /// Release BVs obtained from this tree, in LIFO order (last allocated,
    /// first released). A no-op for implementations with no backing arena.
    fn release_bvs(&self, _bvs: &[BoundingVolume]) {}

    /// Release BVs obtained during a swept query (§4.6); kept distinct from
    /// [`release_bvs`](Self::release_bvs) because swept BVs may come from a
    /// separate scratch pool sized for the sweep step.
    fn release_swept_bvs(&self, _bvs: &[BoundingVolume]) {}
}

/// Internal node storage for [`ArenaBvh`].
#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<LeafPrimitive>),
    Split { bv: BoundingVolume, left: usize, right: usize },
}

/// A simple array-backed binary BVH over a fixed primitive list. Built
/// top-down by a median split along the node's longest axis, which is
/// sufficient for the bodies this crate tests against (compound shapes with
/// tens to low hundreds of primitives, not streaming terrain).
#[derive(Debug)]
pub struct ArenaBvh {
    nodes: Vec<Node>,
    root: usize,
    next_node_id: std::cell::Cell<usize>,
}

impl ArenaBvh {
    pub fn build(mut prims: Vec<LeafPrimitive>) -> Self {
        let mut nodes = Vec::new();
        let root = if prims.is_empty() {
            nodes.push(Node::Leaf(Vec::new()));
            0
        } else {
            build_recursive(&mut prims, &mut nodes)
        };
        ArenaBvh { nodes, root, next_node_id: std::cell::Cell::new(0) }
    }

    fn alloc_node_id(&self) -> usize {
        let id = self.next_node_id.get();
        self.next_node_id.set(id + 1);
        id
    }

    fn bv_of(&self, idx: usize) -> BoundingVolume {
        match &self.nodes[idx] {
            Node::Leaf(prims) => leaf_bv(self.alloc_node_id(), prims),
            Node::Split { bv, .. } => retag(bv, self.alloc_node_id()),
        }
    }
}

fn retag(bv: &BoundingVolume, node_id: usize) -> BoundingVolume {
    match bv {
        BoundingVolume::Aabb { aabb, .. } => BoundingVolume::Aabb { node_id, aabb: aabb.clone() },
        BoundingVolume::Obb { obb, .. } => BoundingVolume::Obb { node_id, obb: obb.clone() },
        BoundingVolume::Capsule { cap, .. } => BoundingVolume::Capsule { node_id, cap: cap.clone() },
        BoundingVolume::Sphere { sph, .. } => BoundingVolume::Sphere { node_id, sph: sph.clone() },
        BoundingVolume::Ray { ray, .. } => BoundingVolume::Ray { node_id, ray: ray.clone() },
    }
}

fn leaf_bv(node_id: usize, prims: &[LeafPrimitive]) -> BoundingVolume {
    if prims.is_empty() {
        return BoundingVolume::Sphere { node_id, sph: SphereBv { center: cgmath::Point3::new(0.0, 0.0, 0.0), r: 0.0 } };
    }
    let (mut lo, mut hi) = prims[0].prim.aabb();
    for p in &prims[1..] {
        let (l, h) = p.prim.aabb();
        lo = cgmath::Point3::new(lo.x.min(l.x), lo.y.min(l.y), lo.z.min(l.z));
        hi = cgmath::Point3::new(hi.x.max(h.x), hi.y.max(h.y), hi.z.max(h.z));
    }
    BoundingVolume::Aabb { node_id, aabb: Aabb::new(lo, hi) }
}

fn build_recursive(prims: &mut Vec<LeafPrimitive>, nodes: &mut Vec<Node>) -> usize {
    if prims.len() <= 4 {
        nodes.push(Node::Leaf(std::mem::take(prims)));
        return nodes.len() - 1;
    }
    let bv = leaf_bv(0, prims);
    let half = bv.loose_aabb().half_extent();
    let axis = if half.x >= half.y && half.x >= half.z {
        0
    } else if half.y >= half.z {
        1
    } else {
        2
    };
    prims.sort_by(|a, b| {
        let ca = a.prim.aabb();
        let cb = b.prim.aabb();
        let key = |lo: cgmath::Point3<Real>, hi: cgmath::Point3<Real>| match axis {
            0 => lo.x + hi.x,
            1 => lo.y + hi.y,
            _ => lo.z + hi.z,
        };
        key(ca.0, ca.1).partial_cmp(&key(cb.0, cb.1)).unwrap()
    });
    let mid = prims.len() / 2;
    let mut right_half = prims.split_off(mid);
    let left = build_recursive(prims, nodes);
    let right = build_recursive(&mut right_half, nodes);
    nodes.push(Node::Split { bv, left, right });
    nodes.len() - 1
}

impl BVTree for ArenaBvh {
    fn root_bv(&self) -> BoundingVolume {
        self.bv_of(self.root)
    }

    fn child_bvs(&self, node: &BoundingVolume) -> Option<(BoundingVolume, BoundingVolume)> {
        let idx = self.node_index_for(node)?;
        match &self.nodes[idx] {
            Node::Split { left, right, .. } => Some((self.bv_of(*left), self.bv_of(*right))),
            Node::Leaf(_) => None,
        }
    }

    fn leaf_primitives(&self, node: &BoundingVolume) -> Option<&[LeafPrimitive]> {
        let idx = self.node_index_for(node)?;
        match &self.nodes[idx] {
            Node::Leaf(prims) => Some(prims),
            Node::Split { .. } => None,
        }
    }
}

impl ArenaBvh {
    /// Recovers the storage index a `BoundingVolume` handle was produced
    /// from. The handle's `node_id` is an allocation counter, not a storage
    /// index, so this walks the tree matching on geometry identity instead
    /// — acceptable for the tree sizes this BVH targets.
    fn node_index_for(&self, node: &BoundingVolume) -> Option<usize> {
        self.find(self.root, node)
    }

    fn find(&self, idx: usize, target: &BoundingVolume) -> Option<usize> {
        let same = match (&self.nodes[idx], target) {
            (Node::Leaf(prims), BoundingVolume::Aabb { aabb, .. }) => {
                let lb = leaf_bv(0, prims);
                matches!(lb, BoundingVolume::Aabb { aabb: ref a, .. } if a.min == aabb.min && a.max == aabb.max)
            }
            (Node::Leaf(prims), BoundingVolume::Sphere { sph, .. }) if prims.is_empty() => sph.r == 0.0,
            (Node::Split { bv, .. }, other) => same_geometry(bv, other),
            _ => false,
        };
        if same {
            return Some(idx);
        }
        if let Node::Split { left, right, .. } = &self.nodes[idx] {
            if let Some(found) = self.find(*left, target) {
                return Some(found);
            }
            if let Some(found) = self.find(*right, target) {
                return Some(found);
            }
        }
        None
    }
}

fn same_geometry(a: &BoundingVolume, b: &BoundingVolume) -> bool {
    match (a, b) {
        (BoundingVolume::Aabb { aabb: a1, .. }, BoundingVolume::Aabb { aabb: a2, .. }) => a1.min == a2.min && a1.max == a2.max,
        (BoundingVolume::Obb { obb: o1, .. }, BoundingVolume::Obb { obb: o2, .. }) => o1.center == o2.center,
        (BoundingVolume::Capsule { cap: c1, .. }, BoundingVolume::Capsule { cap: c2, .. }) => c1.center == c2.center,
        (BoundingVolume::Sphere { sph: s1, .. }, BoundingVolume::Sphere { sph: s2, .. }) => s1.center == s2.center && s1.r == s2.r,
        (BoundingVolume::Ray { ray: r1, .. }, BoundingVolume::Ray { ray: r2, .. }) => r1.origin == r2.origin,
        _ => false,
    }
}

/// Row/column tag every leaf's primitive carries, exposed so the driver can
/// index into the table without re-deriving it from the `Primitive` value.
pub fn leaf_prim_type(leaf: &LeafPrimitive) -> PrimType {
    leaf.prim.prim_type()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Point3, Vector3};
    use crate::primitive::Sphere;

    fn sphere_leaf(i: u32, x: Real) -> LeafPrimitive {
        LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(x, 0.0, 0.0), r: 0.5 }) }
    }

    #[test]
    fn build_and_descend_small_tree() {
        let prims: Vec<LeafPrimitive> = (0..10).map(|i| sphere_leaf(i, i as Real)).collect();
        let tree = ArenaBvh::build(prims);
        let root = tree.root_bv();
        let extent = root.loose_aabb().half_extent();
        assert!(extent.x > 0.0);
        let children = tree.child_bvs(&root);
        assert!(children.is_some());
    }

    #[test]
    fn leaf_primitives_reachable() {
        let prims: Vec<LeafPrimitive> = (0..3).map(|i| sphere_leaf(i, i as Real)).collect();
        let tree = ArenaBvh::build(prims);
        let root = tree.root_bv();
        assert!(tree.leaf_primitives(&root).is_some());
    }

    #[test]
    fn root_bv_in_rejects_far_bbox() {
        let prims: Vec<LeafPrimitive> = (0..5).map(|i| sphere_leaf(i, i as Real)).collect();
        let tree = ArenaBvh::build(prims);
        let far = Aabb::new(Point3::new(100.0, 100.0, 100.0), Point3::new(101.0, 101.0, 101.0));
        assert!(tree.root_bv_in(&far).is_none());
        let near = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        assert!(tree.root_bv_in(&near).is_some());
        let _ = Vector3::unit_x();
    }
}
