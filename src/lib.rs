//! # narrowphase
//!
//! A narrow-phase collision and intersection kernel for rigid bodies built
//! from transformed primitives: triangles, boxes, cylinders, capsules,
//! spheres, rays and planes, organized under a caller-owned bounding-volume
//! hierarchy per body.
//!
//! Uses [`cgmath`](https://github.com/brendanzab/cgmath/) for all vector and
//! point arithmetic.
//!
//! The crate is organized leaves-first:
//!
//! * [`primitive`] and [`bv`] — the shape and bounding-volume data model.
//! * [`overlap`] — symmetric bounding-volume-vs-bounding-volume pruning.
//! * [`intersect`] — the ordered-pair primitive intersection dispatch table.
//! * [`unproject`] — minimum translational/rotational separation.
//! * [`bvh`] — the `BVTree` visitor contract and a concrete arena BVH.
//! * [`gtest`] — per-query state: `GeometryUnderTest`, `IntersectionParams`.
//! * [`contact`] — contact aggregation and priority-ordered reduction.
//! * [`driver`] — the dual-tree descent and the `Geometry` facade.
//! * [`occlusion`] — the occlusion cubemap query.
//! * [`scratch`] — the per-caller scratch arena and shared contact buffer.
//!
//! Single precision is used throughout (`Real = f32`); there is no `double`
//! feature, since every caller this kernel targets already works in
//! single-precision world space.

#![deny(missing_debug_implementations, trivial_casts, unsafe_code, unstable_features, unused_import_braces, unused_qualifications)]

pub mod bv;
pub mod bvh;
pub mod contact;
pub mod driver;
pub mod gtest;
pub mod intersect;
pub mod occlusion;
pub mod overlap;
pub mod primitive;
pub mod rational;
pub mod scratch;
pub mod unproject;

/// Scalar type used throughout the crate.
pub type Real = f32;

pub use contact::{Contact, ContactSet};
pub use driver::Geometry;
pub use gtest::{GeometryUnderTest, IntersectionParams};
pub use primitive::{PrimType, Primitive};
