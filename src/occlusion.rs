//! §4.8 — the occlusion cubemap: a sphere-pruned BV descent that rasterizes
//! a body's primitives into six faces around a viewpoint, for visibility
//! culling rather than collision.

use cgmath::prelude::*;
use cgmath::{Point3, Vector3};

use crate::gtest::GeometryUnderTest;
use crate::primitive::Primitive;
use crate::Real;

/// Resolution of one cube-map face; kept small since occlusion only needs a
/// coarse visibility estimate, not a render target.
pub const CUBEMAP_FACE_SIZE: usize = 16;

/// The six faces in +x, -x, +y, -y, +z, -z order.
#[derive(Debug, Clone)]
pub struct Cubemap {
    pub faces: [[bool; CUBEMAP_FACE_SIZE * CUBEMAP_FACE_SIZE]; 6],
}

impl Cubemap {
    fn empty() -> Self {
        Cubemap { faces: [[false; CUBEMAP_FACE_SIZE * CUBEMAP_FACE_SIZE]; 6] }
    }

    /// Fraction of cells marked occluded, `(n_cells - n_occluded) / n_cells`
    /// run the other way: this is the *occluded* fraction directly, since a
    /// caller asking "how much of this body is hidden" wants that number,
    /// not its complement.
    pub fn occluded_fraction(&self) -> Real {
        let mut total = 0usize;
        let mut hit = 0usize;
        for face in &self.faces {
            for &cell in face {
                total += 1;
                if cell {
                    hit += 1;
                }
            }
        }
        if total == 0 {
            0.0
        } else {
            hit as Real / total as Real
        }
    }
}

/// Rasterizes every leaf primitive of `g` into a cubemap centered on `eye`,
/// walking the tree directly rather than through the driver's leaf-pair
/// descent (there is only one body involved, not a pair).
pub fn rasterize(g: &GeometryUnderTest, eye: Point3<Real>) -> Cubemap {
    let mut cube = Cubemap::empty();
    rasterize_bv(g, &g.tree.root_bv(), eye, &mut cube);
    cube
}

fn rasterize_bv(g: &GeometryUnderTest, bv: &crate::bv::BoundingVolume, eye: Point3<Real>, cube: &mut Cubemap) {
    match g.tree.leaf_primitives(bv) {
        Some(leaves) => {
            for leaf in leaves {
                rasterize_primitive(g, &leaf.prim, eye, cube);
            }
        }
        None => {
            if let Some((c1, c2)) = g.tree.child_bvs(bv) {
                rasterize_bv(g, &c1, eye, cube);
                rasterize_bv(g, &c2, eye, cube);
            }
        }
    }
}

fn rasterize_primitive(g: &GeometryUnderTest, prim: &Primitive, eye: Point3<Real>, cube: &mut Cubemap) {
    for sample in sample_points(prim) {
        let world = g.to_world(sample);
        mark_direction(cube, world - eye);
    }
}

/// A handful of representative points per primitive (support points along
/// the cardinal axes plus the center) — enough to cover the cell the
/// primitive projects into without needing a full rasterizer.
fn sample_points(prim: &Primitive) -> Vec<Point3<Real>> {
    match prim {
        Primitive::Triangle(t) => t.pt.to_vec(),
        Primitive::Sphere(s) => vec![
            s.center,
            s.center + Vector3::unit_x() * s.r,
            s.center - Vector3::unit_x() * s.r,
            s.center + Vector3::unit_y() * s.r,
            s.center - Vector3::unit_y() * s.r,
            s.center + Vector3::unit_z() * s.r,
            s.center - Vector3::unit_z() * s.r,
        ],
        _ => {
            let (lo, hi) = prim.aabb();
            vec![
                lo,
                hi,
                Point3::new(lo.x, lo.y, hi.z),
                Point3::new(lo.x, hi.y, lo.z),
                Point3::new(hi.x, lo.y, lo.z),
                Point3::new((lo.x + hi.x) * 0.5, (lo.y + hi.y) * 0.5, (lo.z + hi.z) * 0.5),
            ]
        }
    }
}

/// Marks the cubemap cell `dir` (from the eye) falls into.
fn mark_direction(cube: &mut Cubemap, dir: Vector3<Real>) {
    if dir.magnitude2() < 1e-12 {
        return;
    }
    let ax = dir.x.abs();
    let ay = dir.y.abs();
    let az = dir.z.abs();
    let (face, u, v) = if ax >= ay && ax >= az {
        if dir.x > 0.0 {
            (0, -dir.z / ax, -dir.y / ax)
        } else {
            (1, dir.z / ax, -dir.y / ax)
        }
    } else if ay >= ax && ay >= az {
        if dir.y > 0.0 {
            (2, dir.x / ay, dir.z / ay)
        } else {
            (3, dir.x / ay, -dir.z / ay)
        }
    } else if dir.z > 0.0 {
        (4, dir.x / az, -dir.y / az)
    } else {
        (5, -dir.x / az, -dir.y / az)
    };

    let cell_u = (((u + 1.0) * 0.5) * CUBEMAP_FACE_SIZE as Real).clamp(0.0, CUBEMAP_FACE_SIZE as Real - 1.0) as usize;
    let cell_v = (((v + 1.0) * 0.5) * CUBEMAP_FACE_SIZE as Real).clamp(0.0, CUBEMAP_FACE_SIZE as Real - 1.0) as usize;
    cube.faces[face][cell_v * CUBEMAP_FACE_SIZE + cell_u] = true;
}

/// Two-pass occlusion fraction (§4.8): rasterizes `g` as seen from `eye`
/// once at its current extent and once grown by `n_grow`, and compares the
/// occluded cell counts between the two passes.
pub fn occlusion_fraction(g: &GeometryUnderTest, eye: Point3<Real>, n_grow: Real) -> Real {
    let base = rasterize(g, eye);
    let n_cells = base.faces.len() * CUBEMAP_FACE_SIZE * CUBEMAP_FACE_SIZE;
    let n_occluded: usize = base.faces.iter().flatten().filter(|&&c| c).count();

    let grown_eye = if n_grow > 0.0 {
        let to_center = g.tree.root_bv().loose_aabb().center() - eye;
        if to_center.magnitude2() > 1e-12 {
            eye - to_center.normalize() * n_grow
        } else {
            eye
        }
    } else {
        eye
    };
    let grown = rasterize(g, grown_eye);
    let n_grown_occluded: usize = grown.faces.iter().flatten().filter(|&&c| c).count();

    if n_cells == 0 {
        0.0
    } else {
        (n_cells - n_grown_occluded.min(n_occluded).min(n_cells)) as Real / n_cells as Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::{ArenaBvh, LeafPrimitive};
    use crate::primitive::Sphere;

    fn single_sphere_tree() -> ArenaBvh {
        ArenaBvh::build(vec![LeafPrimitive { index: 0, prim: Primitive::Sphere(Sphere { center: Point3::new(0.0, 0.0, 0.0), r: 1.0 }) }])
    }

    #[test]
    fn rasterize_marks_some_cells() {
        let tree = single_sphere_tree();
        let g = GeometryUnderTest::identity(&tree);
        let cube = rasterize(&g, Point3::new(5.0, 0.0, 0.0));
        assert!(cube.occluded_fraction() > 0.0);
    }

    #[test]
    fn empty_cubemap_has_zero_fraction() {
        let cube = Cubemap::empty();
        assert_eq!(cube.occluded_fraction(), 0.0);
    }
}
