// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Topology view of one polygon

use super::point::Point;
use super::quadedge::{EdgeFlags, EdgeId, QuadEdgeArena};
use crate::geometry::Mesh;
use crate::utils::math::{polygon_normal, Plane, Side};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Face flag bits
pub mod flags {
    pub const VISIT: u32 = 1 << 0;
    pub const NEW: u32 = 1 << 1;
    pub const SELECTED: u32 = 1 << 2;
    pub const ABOVE: u32 = 1 << 3;
    pub const BELOW: u32 = 1 << 4;
    /// Temporary fill of a hole; removed before geometry is written
    pub const HOLE_FILL: u32 = 1 << 5;
    pub const NO_SUBDIVIDE: u32 = 1 << 6;
}

/// A face bounded by one closed `lnext` loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    prim: Option<usize>,
    edge: Option<EdgeId>,
    normal: Option<Vector3<f64>>,
    flags: u32,
    spare: i64,
    alive: bool,
}

impl Face {
    /// Face built from host primitive `prim`, or a new face with no source
    pub fn new(prim: Option<usize>) -> Self {
        Self {
            prim,
            edge: None,
            normal: None,
            flags: 0,
            spare: 0,
            alive: true,
        }
    }

    /// Host primitive the face came from; new faces inherit it from the face
    /// they were split off
    pub fn prim(&self) -> Option<usize> {
        self.prim
    }

    pub fn set_prim(&mut self, prim: Option<usize>) {
        self.prim = prim;
    }

    pub fn edge(&self) -> Option<EdgeId> {
        self.edge
    }

    pub fn set_edge(&mut self, edge: Option<EdgeId>) {
        self.edge = edge;
        self.normal = None;
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u32) {
        self.flags |= flag;
    }

    pub fn clear_flag(&mut self, flag: u32) {
        self.flags &= !flag;
    }

    /// Algorithm scratch value
    pub fn spare(&self) -> i64 {
        self.spare
    }

    pub fn set_spare(&mut self, value: i64) {
        self.spare = value;
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn kill(&mut self) {
        self.alive = false;
        self.edge = None;
        self.normal = None;
    }

    /// Count of records in the face loop
    pub fn num_edges(&self, arena: &QuadEdgeArena, limit: usize) -> usize {
        match self.edge {
            Some(e) => arena.left_ring(e, limit).len(),
            None => 0,
        }
    }

    pub fn positions(&self, arena: &QuadEdgeArena, points: &[Point], mesh: &Mesh, limit: usize) -> Vec<Point3<f64>> {
        let Some(e) = self.edge else {
            return Vec::new();
        };
        arena
            .left_ring(e, limit)
            .into_iter()
            .filter_map(|r| arena.org(r))
            .map(|p| points[p.index()].pos3(mesh))
            .collect()
    }

    /// Cached Newell normal
    pub fn normal(&mut self, arena: &QuadEdgeArena, points: &[Point], mesh: &Mesh, limit: usize) -> Vector3<f64> {
        if let Some(n) = self.normal {
            return n;
        }
        let n = polygon_normal(&self.positions(arena, points, mesh, limit));
        self.normal = Some(n);
        n
    }

    pub fn invalidate_normal(&mut self) {
        self.normal = None;
    }

    /// Classify the face against a plane from its corner points
    pub fn above_or_below(
        &self,
        arena: &QuadEdgeArena,
        points: &[Point],
        mesh: &Mesh,
        plane: &Plane,
        tolerance: f64,
        limit: usize,
    ) -> Side {
        let mut above = false;
        let mut below = false;
        for pos in self.positions(arena, points, mesh, limit) {
            match plane.side(&pos, tolerance) {
                Side::Above => above = true,
                Side::Below => below = true,
                _ => {}
            }
        }
        match (above, below) {
            (true, true) => Side::Both,
            (true, false) => Side::Above,
            (false, true) => Side::Below,
            (false, false) => Side::On,
        }
    }

    /// Move the bounding edge off a record flagged for deletion. Returns false
    /// when every record of the loop is flagged.
    pub fn adjust_to_safe_edge(&mut self, arena: &QuadEdgeArena, limit: usize) -> bool {
        let Some(e) = self.edge else {
            return false;
        };
        if arena.is_alive(e) && !arena.has_flag(e, EdgeFlags::DELETE) {
            return true;
        }
        let safe = arena
            .left_ring(e, limit)
            .into_iter()
            .find(|&r| arena.is_alive(r) && !arena.has_flag(r, EdgeFlags::DELETE));
        match safe {
            Some(r) => {
                self.set_edge(Some(r));
                true
            }
            None => false,
        }
    }
}
