//! §5 — `GeometryUnderTest` and the per-query parameters and caches that
//! travel alongside it.

use std::collections::HashMap;

use cgmath::{Point3, Vector3};

use crate::bv::BoundingVolume;
use crate::bvh::BVTree;
use crate::Real;

/// Tunables for a single `intersect`/`sweep` call (§4.3/§4.6). Mirrors the
/// original's `intersection_params`: nothing here is persisted between
/// calls, it is read-only input threaded through the whole descent.
#[derive(Debug, Clone)]
pub struct IntersectionParams {
    /// Reject contacts whose penetration is shallower than this (world
    /// units); `0.0` accepts any touching contact.
    pub min_penetration: Real,
    /// Upper bound on contacts kept per body pair before the §4.5
    /// reduction pass runs.
    pub max_contacts: usize,
    /// If set, only descend into BV pairs within this distance of each
    /// other — used by the sphere/ray fast paths to avoid a full descent.
    pub prune_distance: Option<Real>,
    /// Forwarded to `Unprojector`: prefer the previous frame's separating
    /// axis before falling back to a fresh search (the "use_normal"
    /// fallback the spec's open question resolved as two explicit paths).
    pub use_normal: Option<cgmath::Vector3<Real>>,
    /// Scratch-arena routing (§5): which per-caller record
    /// `stop_intersection` gets set on when the contact budget truncates
    /// this query's results.
    pub caller_id: usize,

    /// Whether this call is a swept query (folds `sweep`/`intersect` into
    /// one entry point, §6).
    pub sweep_test: bool,
    /// Time window the query covers; bounds `register_intersection`'s
    /// unprojection distance against `|v_rel| * time_interval` (§4.5 step 3).
    pub time_interval: Real,
    /// Relative-velocity floor below which linear unprojection falls back
    /// to `dir = inters.n` instead of `-v_rel.normalize()` (§4.5 step 1).
    pub vrel_min: Real,
    /// `0` = linear unprojection, `1` = rotational.
    pub unprojection_mode: u8,
    /// Rotation axis used when `unprojection_mode == 1`.
    pub axis_of_rotation: Vector3<Real>,
    /// Rotation pivot used when `unprojection_mode == 1`.
    pub center_of_rotation: Point3<Real>,
    /// Per-body points outside the rotation pivot, used to pick `argmax`
    /// of `|c_rot|` between the two bodies (§4.5 step 1).
    pub pt_outside_pivot: [Point3<Real>; 2],
    /// Hard cap on the unprojection search distance.
    pub max_unproj: Real,
    /// Surface-gap angle beyond which two near-coplanar faces are not
    /// considered touching.
    pub max_surface_gap_angle: Real,
    /// Noise floor below which two vertices are treated as coincident.
    pub min_vtx_dist: Real,
    /// Skip promoting a contact's area record into the global area buffer.
    pub no_area_contacts: bool,
    /// Skip the narrow phase entirely and report no contacts (used by
    /// callers that only want `register_intersection`'s bookkeeping side
    /// effects, e.g. node-used cache warming, without a real query).
    pub no_intersection: bool,
    /// Append to the caller's contact buffer instead of replacing it
    /// (§8 testable property 5: no dedup, the caller's responsibility).
    pub keep_prev_contacts: bool,
    /// Set by the driver (not the caller) once both bodies are known
    /// convex, enabling the narrow phase's convex-only fast paths.
    pub both_convex: bool,
    /// Asserts the mesh is known-immutable for this query's duration, so
    /// the query can skip taking `lock_update`'s read lock (§5).
    pub thread_safe_mesh: bool,
}

impl Default for IntersectionParams {
    fn default() -> Self {
        IntersectionParams {
            min_penetration: 0.0,
            max_contacts: crate::contact::MAX_CONTACTS,
            prune_distance: None,
            use_normal: None,
            caller_id: 0,
            sweep_test: false,
            time_interval: 1.0,
            vrel_min: 1e-6,
            unprojection_mode: 0,
            axis_of_rotation: Vector3::unit_x(),
            center_of_rotation: Point3::new(0.0, 0.0, 0.0),
            pt_outside_pivot: [Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)],
            max_unproj: Real::INFINITY,
            max_surface_gap_angle: 0.1,
            min_vtx_dist: 1e-6,
            no_area_contacts: false,
            no_intersection: false,
            keep_prev_contacts: false,
            both_convex: false,
            thread_safe_mesh: false,
        }
    }
}

/// A bit-packed cache of which `(node_id, node_id)` BV pairs were already
/// ruled out this query, keyed by the cheaper of the two ids so repeated
/// descents into a shared subtree (common with swept queries re-testing
/// overlapping time slices) short-circuit instead of re-walking.
#[derive(Debug, Default)]
pub struct UsedNodesMap {
    seen: HashMap<u64, bool>,
}

impl UsedNodesMap {
    pub fn new() -> Self {
        UsedNodesMap::default()
    }

    fn key(a: usize, b: usize) -> u64 {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        ((lo as u64) << 32) | (hi as u64)
    }

    /// Records the outcome of testing `a` against `b`; returns the
    /// previously recorded outcome if this pair was already tested.
    pub fn record_or_recall(&mut self, a: &BoundingVolume, b: &BoundingVolume, outcome: bool) -> bool {
        let k = Self::key(a.node_id(), b.node_id());
        *self.seen.entry(k).or_insert(outcome)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// One body's side of a narrow-phase query: its tree, the world transform
/// expressing its local frame, and the scratch the driver fills in as it
/// descends. `'a` ties the lifetime of the borrowed tree to the query.
pub struct GeometryUnderTest<'a> {
    /// Borrowed, not owned: callers keep their own body storage.
    pub tree: &'a dyn BVTree,
    /// World-space origin of this body's local frame.
    pub pos: cgmath::Point3<Real>,
    /// World-space orientation, as an orthonormal basis (rows).
    pub rot: [cgmath::Vector3<Real>; 3],
    /// Per-query BV-pair cache; reset at the start of each `intersect`
    /// call by the driver, not reused across calls.
    pub used_nodes: UsedNodesMap,
}

impl<'a> std::fmt::Debug for GeometryUnderTest<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryUnderTest")
            .field("pos", &self.pos)
            .field("rot", &self.rot)
            .field("used_nodes", &self.used_nodes)
            .finish_non_exhaustive()
    }
}

impl<'a> GeometryUnderTest<'a> {
    pub fn new(tree: &'a dyn BVTree, pos: cgmath::Point3<Real>, rot: [cgmath::Vector3<Real>; 3]) -> Self {
        GeometryUnderTest { tree, pos, rot, used_nodes: UsedNodesMap::new() }
    }

    pub fn identity(tree: &'a dyn BVTree) -> Self {
        use cgmath::Vector3;
        GeometryUnderTest::new(
            tree,
            cgmath::Point3::new(0.0, 0.0, 0.0),
            [Vector3::unit_x(), Vector3::unit_y(), Vector3::unit_z()],
        )
    }

    pub fn to_world(&self, local: cgmath::Point3<Real>) -> cgmath::Point3<Real> {
        self.pos + self.rot[0] * local.x + self.rot[1] * local.y + self.rot[2] * local.z
    }

    pub fn to_world_dir(&self, local: cgmath::Vector3<Real>) -> cgmath::Vector3<Real> {
        self.rot[0] * local.x + self.rot[1] * local.y + self.rot[2] * local.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bv::{Aabb, BoundingVolume};
    use cgmath::Point3;

    #[test]
    fn used_nodes_recalls_prior_outcome() {
        let mut m = UsedNodesMap::new();
        let a = BoundingVolume::Aabb { node_id: 1, aabb: Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)) };
        let b = BoundingVolume::Aabb { node_id: 2, aabb: Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)) };
        assert_eq!(m.record_or_recall(&a, &b, true), true);
        assert_eq!(m.record_or_recall(&b, &a, false), true); // order-independent, recalls first outcome
    }

    #[test]
    fn params_default_is_permissive() {
        let p = IntersectionParams::default();
        assert_eq!(p.min_penetration, 0.0);
        assert!(p.prune_distance.is_none());
    }
}
