// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Quad-edge topology and the algorithms that rewrite it

pub mod boundary;
pub mod brick;
pub mod clip;
pub mod cusp;
pub mod decimate;
pub mod detail;
pub mod dual;
pub mod face;
pub mod point;
pub mod quadedge;
pub mod stitch;
pub mod subdivide;

pub use clip::{ClipResult, CreaseResult, PlaneSplit};
pub use detail::{BuildReport, Detail, FaceLoop, PointRecipe, CREASE_ATTRIBUTE, NORMAL_ATTRIBUTE};
pub use face::Face;
pub use point::Point;
pub use quadedge::{EdgeFlags, EdgeId, FaceId, Origin, PointId, QuadEdgeArena};
pub use stitch::StitchParms;
pub use subdivide::SubdivideParms;
