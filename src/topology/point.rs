// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Topology view of one host point

use super::quadedge::EdgeId;
use crate::geometry::Mesh;
use crate::utils::math::{Plane, Side};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Point flag bits
pub mod flags {
    pub const VISIT: u32 = 1 << 0;
    pub const BOUNDARY: u32 = 1 << 1;
    pub const SELECTED: u32 = 1 << 2;
    pub const NEW: u32 = 1 << 3;
    pub const CORNER: u32 = 1 << 4;
    pub const ABOVE: u32 = 1 << 5;
    pub const BELOW: u32 = 1 << 6;
}

/// Wraps one host point offset with an incident-edge back-reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    offset: usize,
    edge: Option<EdgeId>,
    flags: u32,
    alive: bool,
}

impl Point {
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            edge: None,
            flags: 0,
            alive: true,
        }
    }

    /// Host point offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn edge(&self) -> Option<EdgeId> {
        self.edge
    }

    pub fn set_edge(&mut self, edge: Option<EdgeId>) {
        self.edge = edge;
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

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub(crate) fn kill(&mut self) {
        self.alive = false;
        self.edge = None;
    }

    /// Whether the host point is still live
    pub fn is_valid(&self, mesh: &Mesh) -> bool {
        self.alive && mesh.is_point_alive(self.offset)
    }

    pub fn pos3(&self, mesh: &Mesh) -> Point3<f64> {
        mesh.position(self.offset)
    }

    /// Homogeneous position with unit weight
    pub fn pos4(&self, mesh: &Mesh) -> [f64; 4] {
        let p = mesh.position(self.offset);
        [p.x, p.y, p.z, 1.0]
    }

    pub fn set_pos3(&self, mesh: &mut Mesh, pos: Point3<f64>) {
        mesh.set_position(self.offset, pos);
    }

    pub fn dist_to_plane(&self, mesh: &Mesh, plane: &Plane) -> f64 {
        plane.signed_distance(&mesh.position(self.offset))
    }

    pub fn above_or_below(&self, mesh: &Mesh, plane: &Plane, tolerance: f64) -> Side {
        plane.side(&mesh.position(self.offset), tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_point_view_reads_host() {
        let mut mesh = Mesh::new();
        let off = mesh.add_point(Point3::new(0.0, 0.0, 2.0));
        let mut p = Point::new(off);
        let plane = Plane::new(Vector3::z(), 1.0);

        assert_eq!(p.dist_to_plane(&mesh, &plane), 1.0);
        assert_eq!(p.above_or_below(&mesh, &plane, 1e-6), Side::Above);
        p.set_pos3(&mut mesh, Point3::new(0.0, 0.0, 0.5));
        assert_eq!(p.above_or_below(&mesh, &plane, 1e-6), Side::Below);
        assert_eq!(p.pos4(&mesh), [0.0, 0.0, 0.5, 1.0]);

        p.set_flag(flags::SELECTED);
        assert!(p.has_flag(flags::SELECTED));
        mesh.remove_point(off);
        assert!(!p.is_valid(&mesh));
    }
}
