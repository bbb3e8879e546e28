//! Integration coverage for the concrete scenarios named in the project's
//! collision/intersection testing brief: sphere-sphere miss and hit,
//! ray-into-box, coplanar triangle-triangle, swept box-into-wall, and
//! contact-budget truncation — plus the six quantified properties the same
//! brief names.

use std::cell::Cell;

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use narrowphase::bv::{Aabb, BoundingVolume};
use narrowphase::bvh::{ArenaBvh, BVTree, LeafPrimitive};
use narrowphase::driver::Geometry;
use narrowphase::gtest::GeometryUnderTest;
use narrowphase::intersect::{Intersector, PrimIntersection};
use narrowphase::primitive::{Box3, Capsule, Cylinder, Primitive, PrimType, Ray, Sphere, Triangle};
use narrowphase::scratch;
use narrowphase::{Contact, IntersectionParams};

fn single_leaf_tree(prim: Primitive) -> ArenaBvh {
    ArenaBvh::build(vec![LeafPrimitive { index: 0, prim }])
}

#[test]
fn s1_sphere_sphere_miss() {
    let t1 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 }));
    let t2 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(3.0, 0.0, 0.0), r: 1.0 }));
    let mut g1 = Geometry::new(GeometryUnderTest::identity(&t1));
    let mut g2 = Geometry::new(GeometryUnderTest::identity(&t2));
    let contacts = g1.intersect(&mut g2, &IntersectionParams::default());
    assert_eq!(contacts.len(), 0);
}

#[test]
fn s2_sphere_sphere_hit() {
    let t1 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 }));
    let t2 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(1.5, 0.0, 0.0), r: 1.0 }));
    let mut g1 = Geometry::new(GeometryUnderTest::identity(&t1));
    let mut g2 = Geometry::new(GeometryUnderTest::identity(&t2));
    let contacts = g1.intersect(&mut g2, &IntersectionParams::default());
    assert_eq!(contacts.len(), 1);
    let c = &contacts[0];
    assert!((c.n.x - 1.0).abs() < 1e-4);
    assert!((c.pt[0].x - 0.75).abs() < 1e-4);
}

#[test]
fn s3_ray_into_box() {
    let t_box = single_leaf_tree(Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))));
    let t_ray = single_leaf_tree(Primitive::Ray(Ray { origin: Point3::new(-2.0, 0.0, 0.0), dir: Vector3::new(4.0, 0.0, 0.0) }));
    let mut g_box = Geometry::new(GeometryUnderTest::identity(&t_box));
    let mut g_ray = Geometry::new(GeometryUnderTest::identity(&t_ray));
    let contacts = g_box.intersect(&mut g_ray, &IntersectionParams::default());
    assert_eq!(contacts.len(), 1);
    let c = &contacts[0];
    assert!((c.pt[0].x - (-1.0)).abs() < 1e-4);
    assert!((c.n.x - (-1.0)).abs() < 1e-4);
    assert_eq!(c.i_feature[0][1], 0x20);
}

#[test]
fn s4_tri_tri_coplanar_edge() {
    let t1 = single_leaf_tree(Primitive::Triangle(Triangle::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    )));
    let t2 = single_leaf_tree(Primitive::Triangle(Triangle::new(
        Point3::new(0.5, -0.5, 0.0),
        Point3::new(1.5, 0.5, 0.0),
        Point3::new(0.5, 0.5, 0.0),
    )));
    let mut g1 = Geometry::new(GeometryUnderTest::identity(&t1));
    let mut g2 = Geometry::new(GeometryUnderTest::identity(&t2));
    let contacts = g1.intersect(&mut g2, &IntersectionParams::default());
    assert!(!contacts.is_empty());
    let c = &contacts[0];
    assert!(c.pt[0].z.abs() < 1e-5);
    assert!(c.pt[1].z.abs() < 1e-5);
    assert_eq!(c.i_feature[0][0] & 0xA0, 0xA0);
    assert_eq!(c.i_feature[0][1] & 0xA0, 0xA0);
}

#[test]
fn s5_sweep_box_into_wall() {
    let t_moving = single_leaf_tree(Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5))));
    let t_wall = single_leaf_tree(Primitive::Box(Box3::axis_aligned(Point3::new(3.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5))));
    let mut g_moving = Geometry::new(GeometryUnderTest::identity(&t_moving));
    let mut g_wall = Geometry::new(GeometryUnderTest::identity(&t_wall));
    let contacts = g_moving.sweep(&mut g_wall, Vector3::new(1.0, 0.0, 0.0), 2.0, &IntersectionParams::default());
    assert_eq!(contacts.len(), 1);
}

#[test]
fn s6_contact_budget_truncates_and_sets_stop_flag() {
    let caller_id = 2;
    scratch::reset_global_prim_buffers(caller_id);

    let leaves_a: Vec<LeafPrimitive> = (0..10)
        .map(|i| LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(i as f32 * 10.0, 0.0, 0.0), r: 1.0 }) })
        .collect();
    let leaves_b: Vec<LeafPrimitive> = (0..10)
        .map(|i| LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(i as f32 * 10.0 + 0.5, 0.0, 0.0), r: 1.0 }) })
        .collect();
    let t_a = ArenaBvh::build(leaves_a);
    let t_b = ArenaBvh::build(leaves_b);

    let mut g_a = Geometry::new(GeometryUnderTest::identity(&t_a));
    let mut g_b = Geometry::new(GeometryUnderTest::identity(&t_b));

    let mut params = IntersectionParams::default();
    params.max_contacts = 3;
    params.caller_id = caller_id;

    let contacts = g_a.intersect(&mut g_b, &params);
    assert_eq!(contacts.len(), 3);

    let stopped = scratch::with_caller_scratch(caller_id, |s| s.stop_intersection);
    assert!(stopped);
}

#[test]
fn p6_budget_truncation_is_a_traversal_prefix() {
    let caller_id = 3;
    scratch::reset_global_prim_buffers(caller_id);

    let leaves_a: Vec<LeafPrimitive> = (0..10)
        .map(|i| LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(i as f32 * 10.0, 0.0, 0.0), r: 1.0 }) })
        .collect();
    let leaves_b: Vec<LeafPrimitive> = (0..10)
        .map(|i| LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(i as f32 * 10.0 + 0.5, 0.0, 0.0), r: 1.0 }) })
        .collect();
    let t_a = ArenaBvh::build(leaves_a);
    let t_b = ArenaBvh::build(leaves_b);

    let mut unbounded = IntersectionParams::default();
    unbounded.caller_id = caller_id;
    let mut g_a = Geometry::new(GeometryUnderTest::identity(&t_a));
    let mut g_b = Geometry::new(GeometryUnderTest::identity(&t_b));
    let full = g_a.intersect(&mut g_b, &unbounded);
    assert_eq!(full.len(), 10);

    let mut bounded = unbounded.clone();
    bounded.max_contacts = 3;
    let mut g_a = Geometry::new(GeometryUnderTest::identity(&t_a));
    let mut g_b = Geometry::new(GeometryUnderTest::identity(&t_b));
    let truncated = g_a.intersect(&mut g_b, &bounded);

    assert_eq!(truncated.len(), 3);
    for (t, f) in truncated.iter().zip(full.iter()) {
        assert_eq!(t.i_prim, f.i_prim);
        assert_eq!(t.id, f.id);
    }
}

/// Property 1 (spec.md §8): swap symmetry. Representative ordered
/// primitive-type pairs, checked both ways through `Intersector::check`.
#[test]
fn p1_swap_symmetry() {
    let box1 = Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)));
    let sphere1 = Primitive::Sphere(Sphere { center: Point3::new(0.5, 0.5, 0.5), r: 1.0 });
    let cyl1 = Primitive::Cylinder(Cylinder { center: Point3::new(0.0, 0.0, 0.0), axis: Vector3::unit_z(), r: 1.0, hh: 1.0 });
    let cap1 = Primitive::Capsule(Capsule { center: Point3::new(0.2, 0.0, 0.0), axis: Vector3::unit_x(), r: 0.5, hh: 1.0 });
    let tri1 = Primitive::Triangle(Triangle::new(Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, -1.0, 0.0), Point3::new(0.0, 1.0, 0.0)));
    let sphere2 = Primitive::Sphere(Sphere { center: Point3::new(0.1, 0.1, 0.1), r: 0.5 });

    let pairs = [
        (PrimType::Box, box1.clone(), PrimType::Sphere, sphere1.clone()),
        (PrimType::Cylinder, cyl1.clone(), PrimType::Box, box1.clone()),
        (PrimType::Capsule, cap1.clone(), PrimType::Sphere, sphere1.clone()),
        (PrimType::Triangle, tri1.clone(), PrimType::Sphere, sphere2.clone()),
    ];

    for (t1, p1, t2, p2) in pairs.iter() {
        let mut x = PrimIntersection::new(1e-8);
        let mut y = PrimIntersection::new(1e-8);
        let hit_xy = Intersector::check(*t1, *t2, p1, p2, &mut x);
        let hit_yx = Intersector::check(*t2, *t1, p2, p1, &mut y);
        assert_eq!(hit_xy, hit_yx, "{:?}/{:?} disagree on hit", t1, t2);
        if !hit_xy {
            continue;
        }
        assert_eq!(y.pt[0], x.pt[1], "{:?}/{:?} pt[0]", t1, t2);
        assert_eq!(y.pt[1], x.pt[0], "{:?}/{:?} pt[1]", t1, t2);
        assert!((y.n + x.n).magnitude() < 1e-5, "{:?}/{:?} normal flip", t1, t2);
        assert_eq!(y.i_feature[0][0], x.i_feature[1][1], "{:?}/{:?} i_feature[0][0]", t1, t2);
        assert_eq!(y.i_feature[1][1], x.i_feature[0][0], "{:?}/{:?} i_feature[1][1]", t1, t2);
        assert_eq!(y.i_feature[0][1], x.i_feature[1][0], "{:?}/{:?} i_feature[0][1]", t1, t2);
        assert_eq!(y.i_feature[1][0], x.i_feature[0][1], "{:?}/{:?} i_feature[1][0]", t1, t2);
    }
}

/// Property 2 (spec.md §8): every contact's normal is unit-length within the
/// quoted tolerance, across several of the existing concrete scenarios.
#[test]
fn p2_normal_consistency() {
    let checks: Vec<Vec<Contact>> = vec![
        {
            let t1 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 }));
            let t2 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(1.5, 0.0, 0.0), r: 1.0 }));
            let mut g1 = Geometry::new(GeometryUnderTest::identity(&t1));
            let mut g2 = Geometry::new(GeometryUnderTest::identity(&t2));
            g1.intersect(&mut g2, &IntersectionParams::default())
        },
        {
            let t_box = single_leaf_tree(Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))));
            let t_ray = single_leaf_tree(Primitive::Ray(Ray { origin: Point3::new(-2.0, 0.0, 0.0), dir: Vector3::new(4.0, 0.0, 0.0) }));
            let mut g_box = Geometry::new(GeometryUnderTest::identity(&t_box));
            let mut g_ray = Geometry::new(GeometryUnderTest::identity(&t_ray));
            g_box.intersect(&mut g_ray, &IntersectionParams::default())
        },
    ];

    for contacts in &checks {
        for c in contacts {
            let len = c.n.magnitude();
            assert!((len - 1.0).abs() < 1e-4, "non-unit normal {:?} (len {})", c.n, len);
        }
    }
}

/// A `BVTree` wrapper that counts how many bounding volumes the driver pulls
/// out of `child_bvs`/`child_bvs_rel` against how many it hands back through
/// `release_bvs`/`release_swept_bvs`, to check property 3 (BV arena balance).
#[derive(Debug)]
struct CountingTree<'a> {
    inner: &'a ArenaBvh,
    produced: Cell<usize>,
    released: Cell<usize>,
}

impl<'a> CountingTree<'a> {
    fn new(inner: &'a ArenaBvh) -> Self {
        CountingTree { inner, produced: Cell::new(0), released: Cell::new(0) }
    }
}

impl<'a> BVTree for CountingTree<'a> {
    fn root_bv(&self) -> BoundingVolume {
        self.inner.root_bv()
    }

    fn root_bv_in(&self, bbox: &Aabb) -> Option<BoundingVolume> {
        self.inner.root_bv_in(bbox)
    }

    fn split_priority(&self, node: &BoundingVolume) -> f32 {
        self.inner.split_priority(node)
    }

    fn child_bvs(&self, node: &BoundingVolume) -> Option<(BoundingVolume, BoundingVolume)> {
        let r = self.inner.child_bvs(node);
        if r.is_some() {
            self.produced.set(self.produced.get() + 2);
        }
        r
    }

    fn child_bvs_rel(&self, node: &BoundingVolume, rel_bbox: &Aabb) -> Option<(BoundingVolume, BoundingVolume)> {
        let r = self.inner.child_bvs_rel(node, rel_bbox);
        if r.is_some() {
            self.produced.set(self.produced.get() + 2);
        }
        r
    }

    fn leaf_primitives(&self, node: &BoundingVolume) -> Option<&[LeafPrimitive]> {
        self.inner.leaf_primitives(node)
    }

    fn release_bvs(&self, bvs: &[BoundingVolume]) {
        self.released.set(self.released.get() + bvs.len());
        self.inner.release_bvs(bvs);
    }

    fn release_swept_bvs(&self, bvs: &[BoundingVolume]) {
        self.released.set(self.released.get() + bvs.len());
        self.inner.release_swept_bvs(bvs);
    }
}

#[test]
fn p3_bv_arena_balance() {
    let leaves_a: Vec<LeafPrimitive> = (0..10)
        .map(|i| LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(i as f32 * 0.3, 0.0, 0.0), r: 1.0 }) })
        .collect();
    let leaves_b: Vec<LeafPrimitive> = (0..10)
        .map(|i| LeafPrimitive { index: i, prim: Primitive::Sphere(Sphere { center: Point3::new(i as f32 * 0.3 + 0.1, 1.0, 0.0), r: 1.0 }) })
        .collect();
    let t_a = ArenaBvh::build(leaves_a);
    let t_b = ArenaBvh::build(leaves_b);
    let counting_a = CountingTree::new(&t_a);
    let counting_b = CountingTree::new(&t_b);

    let mut g_a = Geometry::new(GeometryUnderTest::identity(&counting_a));
    let mut g_b = Geometry::new(GeometryUnderTest::identity(&counting_b));
    let _ = g_a.intersect(&mut g_b, &IntersectionParams::default());

    assert_eq!(counting_a.produced.get(), counting_a.released.get());
    assert_eq!(counting_b.produced.get(), counting_b.released.get());
    assert!(counting_a.produced.get() > 0, "expected the ten-leaf bodies to force at least one split descent");
}

/// Property 4 (spec.md §8): monotone time-of-impact. A shorter sweep whose
/// step already reaches the true impact distance must report the same `t`
/// as a longer sweep over the same bodies.
#[test]
fn p4_monotone_time_of_impact() {
    let t_moving = single_leaf_tree(Primitive::Box(Box3::axis_aligned(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5))));
    let t_wall = single_leaf_tree(Primitive::Box(Box3::axis_aligned(Point3::new(3.0, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5))));

    let mut g_moving = Geometry::new(GeometryUnderTest::identity(&t_moving));
    let mut g_wall = Geometry::new(GeometryUnderTest::identity(&t_wall));
    let long_sweep = g_moving.sweep(&mut g_wall, Vector3::new(1.0, 0.0, 0.0), 4.0, &IntersectionParams::default());

    let mut g_moving2 = Geometry::new(GeometryUnderTest::identity(&t_moving));
    let mut g_wall2 = Geometry::new(GeometryUnderTest::identity(&t_wall));
    let short_sweep = g_moving2.sweep(&mut g_wall2, Vector3::new(1.0, 0.0, 0.0), 2.0, &IntersectionParams::default());

    assert_eq!(long_sweep.len(), 1);
    assert_eq!(short_sweep.len(), 1);
    assert!((long_sweep[0].t - short_sweep[0].t).abs() < 1e-5);
}

/// Property 5 (spec.md §8): `keep_prev_contacts` does not make the core
/// dedupe or merge — re-running the same query with no pose change yields
/// the same contacts again, not a deduplicated superset. Appending is left
/// to the caller, so two identical runs naively concatenated double the
/// count.
#[test]
fn p5_rerun_with_keep_prev_contacts_does_not_dedupe() {
    let t1 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 }));
    let t2 = single_leaf_tree(Primitive::Sphere(Sphere { center: Point3::new(1.5, 0.0, 0.0), r: 1.0 }));

    let mut params = IntersectionParams::default();
    params.keep_prev_contacts = true;

    let mut g1 = Geometry::new(GeometryUnderTest::identity(&t1));
    let mut g2 = Geometry::new(GeometryUnderTest::identity(&t2));
    let first = g1.intersect(&mut g2, &params);

    let mut g1b = Geometry::new(GeometryUnderTest::identity(&t1));
    let mut g2b = Geometry::new(GeometryUnderTest::identity(&t2));
    let second = g1b.intersect(&mut g2b, &params);

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.i_prim, b.i_prim);
        assert!((a.depth - b.depth).abs() < 1e-5);
    }

    let mut combined = first.clone();
    combined.extend(second.clone());
    assert_eq!(combined.len(), first.len() + second.len(), "the core must not merge across calls");
}
