// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Quadtopo Topology Kernel
//!
//! Quad-edge topology over polygon meshes. A [`Detail`] builds the edge rings
//! of a host [`Mesh`], rewrites them (subdivision, dual, cusping, clipping,
//! stitching, decimation, bricking, bevels) and writes the result back with
//! attributes carried along.

pub mod bevel;
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod topology;
pub mod utils;

pub use bevel::{BevelParms, BevelTarget, BevelType, PolyBevel};
pub use config::TopologyConfig;
pub use error::{Diagnostics, ErrorCode, Result, TopologyError, WarningCode};
pub use geometry::{EdgeGroup, Mesh, PointGroup, Primitive, PrimitiveGroup};
pub use topology::{Detail, EdgeId, FaceId, PointId, StitchParms, SubdivideParms};

/// Build the topology of `mesh` and check every structural invariant
pub fn validate_mesh(mesh: &mut Mesh) -> Result<()> {
    Detail::from_mesh(mesh).validate()
}

/// Subdivide every polygon of `mesh` in place, returning the face count
pub fn subdivide_mesh(mesh: &mut Mesh, parms: &SubdivideParms) -> usize {
    let mut detail = Detail::from_mesh(mesh);
    let faces = detail.subdivide(parms, None);
    detail.build_geometry();
    faces
}
