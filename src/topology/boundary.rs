// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boundary and bridge analysis

use super::detail::Detail;
use super::quadedge::{EdgeFlags, EdgeId, FaceId, PointId};
use crate::geometry::EdgeGroup;
use ahash::{AHashMap, AHashSet};
use log::debug;

impl Detail<'_> {
    /// Face on the same side both ways: a bridge between two loops
    pub fn is_bridge(&self, e: EdgeId) -> bool {
        let left = self.left(e);
        left.is_some() && left == self.right(e)
    }

    /// Interior edge: real faces on both sides and not a bridge
    pub fn is_share(&self, e: EdgeId) -> bool {
        self.left(e).is_some() && self.right(e).is_some() && !self.is_bridge(e)
    }

    /// True when every edge is shared by two distinct faces
    pub fn is_closed(&self) -> bool {
        self.num_edges() > 0 && self.edges().all(|e| self.is_share(e))
    }

    /// Face-side records of every boundary edge, in creation order
    pub fn boundary(&self) -> Vec<EdgeId> {
        let mut out = Vec::new();
        for e in self.edges() {
            match (self.left(e), self.right(e)) {
                (Some(_), None) => out.push(e),
                (None, Some(_)) => out.push(e.sym()),
                _ => {}
            }
        }
        out
    }

    /// Store the boundary edges as a named edge group of host point offsets
    pub fn create_boundary_group(&mut self, name: &str) -> EdgeGroup {
        let group: EdgeGroup = self
            .boundary()
            .into_iter()
            .filter_map(|e| {
                let a = self.org(e)?;
                let b = self.dest(e)?;
                Some((self.point(a).offset(), self.point(b).offset()))
            })
            .collect();
        self.mesh.set_edge_group(name, group.clone());
        group
    }

    /// Boundary loops as point sequences following the winding of the
    /// adjacent faces
    pub fn create_boundary_list(&self) -> Vec<Vec<PointId>> {
        let limit = self.config.max_ring_walk;
        let mut seen: AHashSet<EdgeId> = AHashSet::new();
        let mut loops = Vec::new();
        for e in self.boundary() {
            let hole = e.sym();
            if seen.contains(&hole) {
                continue;
            }
            let ring = self.edges.left_ring(hole, limit);
            seen.extend(ring.iter().copied());
            let mut pts: Vec<PointId> = ring.iter().filter_map(|&r| self.dest(r)).collect();
            pts.reverse();
            loops.push(pts);
        }
        loops
    }

    /// Remove a bridge that has become redundant: one that dangles into its
    /// face or now separates two different faces. Returns true if removed.
    pub fn remove_possible_bridge(&mut self, e: EdgeId) -> bool {
        if !self.edges.is_alive(e) || !self.edges.has_flag(e, EdgeFlags::BRIDGE) {
            return false;
        }
        let dangling = self.edges.onext(e) == e || self.edges.onext(e.sym()) == e.sym();
        let (l, r) = (self.left(e), self.right(e));
        let separates = l.is_some() && r.is_some() && l != r;
        if dangling || separates {
            let ends = [self.org(e), self.dest(e)];
            self.delete_edge(e);
            for p in ends.into_iter().flatten() {
                if self.point(p).edge().is_none() {
                    self.kill_point(p);
                }
            }
            return true;
        }
        if l.is_none() && r.is_none() {
            self.edges.clear_edge_flag(e, EdgeFlags::BRIDGE);
        }
        false
    }

    /// Sweep bridges in creation order until none can be removed
    pub fn remove_all_possible_bridges(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let bridges: Vec<EdgeId> = self
                .edges()
                .filter(|&e| self.edges.has_flag(e, EdgeFlags::BRIDGE))
                .collect();
            let mut changed = false;
            for e in bridges {
                if self.remove_possible_bridge(e) {
                    removed += 1;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        if removed > 0 {
            debug!("removed {} bridges", removed);
        }
        removed
    }

    /// Reconnect loops that carry a face label but are not that face's main
    /// loop, bridging each at its closest point pair. Returns the number of
    /// bridges added.
    pub fn re_bridge(&mut self) -> usize {
        let limit = self.config.max_ring_walk;
        let mut by_face: AHashMap<FaceId, Vec<EdgeId>> = AHashMap::new();
        for e in self.edges.directed_edges() {
            if let Some(f) = self.left(e) {
                by_face.entry(f).or_default().push(e);
            }
        }

        let mut faces: Vec<FaceId> = by_face.keys().copied().collect();
        faces.sort();
        let mut added = 0;
        for f in faces {
            let Some(anchor) = self.face(f).edge() else {
                continue;
            };
            let mut main: AHashSet<EdgeId> = self.edges.left_ring(anchor, limit).into_iter().collect();
            for &r in &by_face[&f] {
                if main.contains(&r) {
                    continue;
                }
                let orphan = self.edges.left_ring(r, limit);
                if orphan.iter().any(|x| main.contains(x)) {
                    continue;
                }

                let mut best: Option<(f64, EdgeId, EdgeId)> = None;
                let main_records: Vec<EdgeId> = self.edges.left_ring(anchor, limit);
                for &a in &main_records {
                    let Some(pa) = self.dest(a) else { continue };
                    for &b in &orphan {
                        let Some(pb) = self.org(b) else { continue };
                        let d = (self.position(pa) - self.position(pb)).norm_squared();
                        if best.map_or(true, |(bd, _, _)| d < bd) {
                            best = Some((d, a, b));
                        }
                    }
                }
                if let Some((_, a, b)) = best {
                    let bridge = self.connect_edges(a, b);
                    self.edges.set_edge_flag(bridge, EdgeFlags::BRIDGE);
                    added += 1;
                    main = self.edges.left_ring(anchor, limit).into_iter().collect();
                }
            }
        }
        if added > 0 {
            debug!("added {} bridges", added);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Mesh, Primitive};
    use nalgebra::Point3;

    #[test]
    fn test_closed_and_open_meshes() {
        let mut cube = Primitive::cube(1.0).to_mesh();
        let detail = Detail::from_mesh(&mut cube);
        assert!(detail.is_closed());
        assert!(detail.boundary().is_empty());

        let mut grid = Primitive::grid(1.0, 2, 2).to_mesh();
        let mut detail = Detail::from_mesh(&mut grid);
        assert!(!detail.is_closed());
        assert_eq!(detail.boundary().len(), 8);
        let loops = detail.create_boundary_list();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].len(), 8);
        let group = detail.create_boundary_group("border");
        assert_eq!(group.len(), 8);
        assert!(grid.edge_group("border").is_some());
    }

    #[test]
    fn test_boundary_list_follows_face_winding() {
        let mut grid = Primitive::grid(1.0, 1, 1).to_mesh();
        let detail = Detail::from_mesh(&mut grid);
        let loop_points: Vec<usize> = detail.create_boundary_list()[0]
            .iter()
            .map(|&p| detail.point(p).offset())
            .collect();
        let start = loop_points.iter().position(|&o| o == 0).unwrap();
        let rotated: Vec<usize> = loop_points[start..].iter().chain(&loop_points[..start]).copied().collect();
        assert_eq!(rotated, vec![0, 1, 3, 2]);
    }

    fn square(mesh: &mut Mesh, half: f64, reverse: bool) -> usize {
        let mut pts: Vec<usize> = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .iter()
            .map(|(x, y)| mesh.add_point(Point3::new(x * half, y * half, 0.0)))
            .collect();
        if reverse {
            pts.reverse();
        }
        mesh.add_polygon(&pts)
    }

    #[test]
    fn test_re_bridge_joins_orphan_loop() {
        let mut mesh = Mesh::new();
        square(&mut mesh, 2.0, false);
        square(&mut mesh, 1.0, true);
        let mut detail = Detail::from_mesh(&mut mesh);
        let outer = FaceId(0);
        let inner = FaceId(1);
        let inner_edge = detail.face(inner).edge().unwrap();
        detail.relabel_loop(inner_edge, Some(outer));
        detail.kill_face(inner);

        assert_eq!(detail.re_bridge(), 1);
        detail.validate().unwrap();
        assert_eq!(detail.num_faces(), 1);
        assert_eq!(detail.face_edge_count(outer), 10);

        let bridge = detail
            .edges()
            .find(|&e| detail.arena().has_flag(e, EdgeFlags::BRIDGE))
            .unwrap();
        assert!(detail.is_bridge(bridge));
        assert!(!detail.is_share(bridge));
        assert!(!detail.remove_possible_bridge(bridge));
        assert_eq!(detail.remove_all_possible_bridges(), 0);
    }

    #[test]
    fn test_bridged_polygon_on_load() {
        // A square with a slit: the polygon walks into the slit and back
        let mut mesh = Mesh::new();
        let pts: Vec<usize> = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0), (1.0, 1.0)]
            .iter()
            .map(|(x, y)| mesh.add_point(Point3::new(*x, *y, 0.0)))
            .collect();
        mesh.add_polygon(&[pts[0], pts[1], pts[2], pts[4], pts[2], pts[3]]);
        let mut detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        let slit = detail
            .edges()
            .find(|&e| detail.arena().has_flag(e, EdgeFlags::BRIDGE))
            .unwrap();
        assert!(detail.is_bridge(slit));
        assert!(detail.remove_possible_bridge(slit));
        detail.validate().unwrap();
        let f = detail.faces().next().unwrap();
        assert_eq!(detail.face_edge_count(f), 4);
    }
}
