// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Semi-smooth Catmull-Clark subdivision
//!
//! Each level computes every new position from the previous level before
//! anything moves: one face point per subdivided face, one edge point per
//! edge touching a subdivided face, and a relaxed position for every
//! original point. Faces are then rebuilt as one quad per corner. Crease
//! weights bias edge and vertex points toward the linear rule and decay by
//! one per level.

use super::detail::{clean_loop, edge_key, Detail, FaceLoop, PointRecipe};
use super::face;
use super::point;
use super::quadedge::{EdgeFlags, EdgeId, FaceId, PointId};
use crate::geometry::PrimitiveGroup;
use crate::utils::math::{centroid, lerp_point};
use ahash::{AHashMap, AHashSet};
use log::{debug, trace};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Subdivision parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubdivideParms {
    pub iterations: usize,
    /// Fill boundary loops while subdividing so the border relaxes like an
    /// interior; the fills are removed afterwards
    pub close_holes: bool,
    /// Apply the boundary curve rule to boundary points instead of pinning them
    pub smooth_boundary: bool,
    /// Treat any positive crease weight as fully sharp
    pub linear_creases: bool,
}

impl Default for SubdivideParms {
    fn default() -> Self {
        Self {
            iterations: 1,
            close_holes: false,
            smooth_boundary: true,
            linear_creases: false,
        }
    }
}

impl SubdivideParms {
    fn crease_blend(&self, weight: f64) -> f64 {
        if weight <= 0.0 {
            0.0
        } else if self.linear_creases {
            1.0
        } else {
            weight.min(1.0)
        }
    }
}

impl Detail<'_> {
    /// Subdivide every face except those whose source primitive is in
    /// `non_subdivided`; those only receive the edge points they share with
    /// subdivided neighbours. Returns the number of faces afterwards.
    pub fn subdivide(&mut self, parms: &SubdivideParms, non_subdivided: Option<&PrimitiveGroup>) -> usize {
        self.split_polys_with_multiple_holes();
        if parms.close_holes {
            self.stitch_holes();
        }
        if let Some(group) = non_subdivided {
            for f in self.faces().collect::<Vec<_>>() {
                if self.face(f).prim().map_or(false, |p| group.contains(p)) {
                    self.face_mut(f).set_flag(face::flags::NO_SUBDIVIDE);
                }
            }
        }

        for level in 0..parms.iterations {
            self.subdivide_once(parms);
            debug!(
                "subdivision level {}: {} points, {} faces",
                level + 1,
                self.num_points(),
                self.num_faces()
            );
        }

        if parms.close_holes {
            self.close_holes_after_subdivide();
        }
        self.num_faces()
    }

    /// Cut every face bounded by an outer loop and bridged holes into simple
    /// faces by adding a second connection beside each bridge. Dangling
    /// bridges are removed. Returns the number of faces split.
    pub fn split_polys_with_multiple_holes(&mut self) -> usize {
        let limit = self.config.max_ring_walk;
        let mut split = 0;
        let mut skipped: AHashSet<EdgeId> = AHashSet::new();
        loop {
            let bridge = self.edges().find(|&e| {
                !skipped.contains(&e) && self.is_bridge(e) && self.edges.left_ring(e, limit).contains(&e.sym())
            });
            let Some(e) = bridge else {
                break;
            };

            let ring = self.edges.left_ring(e, limit);
            let k = ring.iter().position(|&r| r == e.sym()).unwrap_or(0);
            let hole = &ring[1..k];
            let outer = &ring[k + 1..];
            if hole.is_empty() || outer.is_empty() {
                if !self.remove_possible_bridge(e) {
                    skipped.insert(e);
                }
                continue;
            }

            let (u, w) = (self.org(e), self.dest(e));
            let mut best: Option<(f64, EdgeId, EdgeId)> = None;
            for &a in outer {
                let Some(pa) = self.dest(a) else { continue };
                for &b in hole {
                    let Some(pb) = self.org(b) else { continue };
                    if Some(pa) == u && Some(pb) == w {
                        continue;
                    }
                    let d = (self.position(pa) - self.position(pb)).norm_squared();
                    if best.map_or(true, |(bd, _, _)| d < bd) {
                        best = Some((d, a, b));
                    }
                }
            }
            match best {
                Some((_, a, b)) => {
                    let cut = self.connect_edges(a, b);
                    self.edges.clear_edge_flag(e, EdgeFlags::BRIDGE);
                    trace!("split holed face along {} beside bridge {}", cut, e);
                    split += 1;
                }
                None => {
                    skipped.insert(e);
                }
            }
        }
        if split > 0 {
            debug!("split {} faces with holes", split);
        }
        split
    }

    /// Close every boundary loop with a temporary fill face. Returns the
    /// number of loops filled.
    pub fn stitch_holes(&mut self) -> usize {
        let limit = self.config.max_ring_walk;
        let mut seen: AHashSet<EdgeId> = AHashSet::new();
        let mut filled = 0;
        let hole_records: Vec<EdgeId> = self.edges.directed_edges().filter(|&r| self.left(r).is_none()).collect();
        for r in hole_records {
            if seen.contains(&r) {
                continue;
            }
            let ring = self.edges.left_ring(r, limit);
            seen.extend(ring.iter().copied());
            if ring.len() < 3 {
                continue;
            }
            let fill = self.new_face(None, face::flags::HOLE_FILL);
            self.relabel_loop(r, Some(fill));
            filled += 1;
        }
        if filled > 0 {
            debug!("filled {} boundary loops", filled);
        }
        filled
    }

    /// Remove the fill faces added by [`Detail::stitch_holes`] and whatever
    /// they were subdivided into. Returns the number of faces removed.
    pub fn close_holes_after_subdivide(&mut self) -> usize {
        let fills: Vec<FaceId> = self
            .faces()
            .filter(|&f| self.face(f).has_flag(face::flags::HOLE_FILL))
            .collect();
        for &f in &fills {
            self.delete_face(f);
        }
        fills.len()
    }

    fn subdivide_once(&mut self, parms: &SubdivideParms) {
        let faces: Vec<FaceId> = self.faces().collect();
        let mut smooth = vec![false; self.faces.len()];
        let mut face_pos: AHashMap<FaceId, Point3<f64>> = AHashMap::new();
        for &f in &faces {
            if self.face(f).has_flag(face::flags::NO_SUBDIVIDE) {
                continue;
            }
            let corners = self.face_positions(f);
            if corners.len() >= 3 {
                smooth[f.index()] = true;
                face_pos.insert(f, centroid(&corners));
            }
        }
        let is_smooth = |f: Option<FaceId>| f.map_or(false, |f| smooth[f.index()]);

        let mut edge_pos: Vec<(EdgeId, Point3<f64>, PointId, PointId)> = Vec::new();
        for e in self.edges().collect::<Vec<_>>() {
            let (Some(a), Some(b)) = (self.org(e), self.dest(e)) else {
                continue;
            };
            let (l, r) = (self.left(e), self.right(e));
            if !is_smooth(l) && !is_smooth(r) {
                continue;
            }
            let (pa, pb) = (self.position(a), self.position(b));
            let mid = lerp_point(&pa, &pb, 0.5);
            let pos = match (l, r) {
                (Some(l), Some(r)) if self.is_share(e) && smooth[l.index()] && smooth[r.index()] => {
                    let full = Point3::from((pa.coords + pb.coords + face_pos[&l].coords + face_pos[&r].coords) / 4.0);
                    lerp_point(&full, &mid, parms.crease_blend(self.get_edge_weight(e)))
                }
                _ => mid,
            };
            edge_pos.push((e, pos, a, b));
        }

        let moved: Vec<(PointId, Point3<f64>)> = self
            .points()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|p| self.relaxed_position(p, &smooth, &face_pos, parms).map(|pos| (p, pos)))
            .collect();

        let mut face_point: AHashMap<FaceId, PointId> = AHashMap::new();
        for &f in &faces {
            if let Some(&pos) = face_pos.get(&f) {
                let corners = self.face_points(f);
                let c = self.add_point(pos, Some(PointRecipe::Average(corners)));
                face_point.insert(f, c);
            }
        }

        let mut edge_point: AHashMap<EdgeId, PointId> = AHashMap::new();
        let mut weights: AHashMap<(PointId, PointId), f64> = AHashMap::new();
        for (e, pos, a, b) in edge_pos {
            let m = self.add_point(pos, Some(PointRecipe::Lerp { a, b, t: 0.5 }));
            edge_point.insert(e, m);
            let w = self.get_edge_weight(e) - 1.0;
            if w > 0.0 {
                weights.insert(edge_key(a, m), w);
                weights.insert(edge_key(m, b), w);
            }
        }
        for e in self.edges().collect::<Vec<_>>() {
            if !edge_point.contains_key(&e) {
                let w = self.get_edge_weight(e);
                if let (Some(a), Some(b), true) = (self.org(e), self.dest(e), w > 0.0) {
                    weights.insert(edge_key(a, b), w);
                }
            }
        }
        for (p, pos) in moved {
            self.set_position(p, pos);
        }

        let mut loops = Vec::new();
        for &f in &faces {
            let records = self.face_edges(f);
            let src = self.face(f);
            let (prim, flags) = (src.prim(), src.flags());
            match face_point.get(&f) {
                Some(&c) => {
                    for &r in &records {
                        let prev = self.edges.lprev(r);
                        let corner = (
                            self.org(r),
                            edge_point.get(&r.canonical()),
                            edge_point.get(&prev.canonical()),
                        );
                        if let (Some(v), Some(&next_mid), Some(&prev_mid)) = corner {
                            loops.push(FaceLoop::new(vec![v, next_mid, c, prev_mid], prim).with_flags(flags));
                        }
                    }
                }
                None => {
                    let mut pts = Vec::with_capacity(records.len() * 2);
                    for &r in &records {
                        pts.extend(self.org(r));
                        pts.extend(edge_point.get(&r.canonical()).copied());
                    }
                    if let Some(points) = clean_loop(pts) {
                        loops.push(FaceLoop::new(points, prim).with_flags(flags));
                    }
                }
            }
        }

        self.rebuild_faces(loops);
        self.weights = weights;
    }

    /// New position of an original point, or None when it stays put
    fn relaxed_position(
        &self,
        p: PointId,
        smooth: &[bool],
        face_pos: &AHashMap<FaceId, Point3<f64>>,
        parms: &SubdivideParms,
    ) -> Option<Point3<f64>> {
        if self.point(p).has_flag(point::flags::CORNER) {
            return None;
        }
        let ring = self.point_edges(p);
        if ring.len() < 2 {
            return None;
        }
        if ring.iter().any(|&r| self.left(r).map_or(false, |f| !smooth[f.index()])) {
            return None;
        }

        let pos = self.position(p);
        let mut sharp: Vec<(Point3<f64>, f64)> = Vec::new();
        let mut on_hole = false;
        for &r in &ring {
            let other = self.position(self.dest(r)?);
            if self.is_bridge(r) {
                continue;
            }
            if self.left(r).is_none() || self.right(r).is_none() {
                on_hole = true;
                sharp.push((other, 1.0));
            } else {
                let w = parms.crease_blend(self.get_edge_weight(r));
                if w > 0.0 {
                    sharp.push((other, w));
                }
            }
        }

        match sharp.len() {
            0 | 1 if !on_hole => self.smooth_vertex(p, &ring, face_pos),
            2 => {
                let crease = Point3::from((pos.coords * 6.0 + sharp[0].0.coords + sharp[1].0.coords) / 8.0);
                if on_hole {
                    parms.smooth_boundary.then_some(crease)
                } else {
                    let w = (sharp[0].1 + sharp[1].1) / 2.0;
                    let full = self.smooth_vertex(p, &ring, face_pos)?;
                    Some(lerp_point(&full, &crease, w))
                }
            }
            _ => None,
        }
    }

    /// (Q + 2R + (n - 3)S) / n over the faces and edges around `p`
    fn smooth_vertex(&self, p: PointId, ring: &[EdgeId], face_pos: &AHashMap<FaceId, Point3<f64>>) -> Option<Point3<f64>> {
        let n = ring.len();
        if n < 3 {
            return None;
        }
        let s = self.position(p).coords;
        let mut q = Vector3::<f64>::zeros();
        let mut r = Vector3::<f64>::zeros();
        for &e in ring {
            q += face_pos.get(&self.left(e)?)?.coords;
            r += (s + self.position(self.dest(e)?).coords) / 2.0;
        }
        let nf = n as f64;
        Some(Point3::from((q / nf + r * 2.0 / nf + s * (nf - 3.0)) / nf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Mesh, Primitive};
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_one_level() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            assert_eq!(detail.subdivide(&SubdivideParms::default(), None), 24);
            detail.validate().unwrap();
            assert_eq!(detail.num_points(), 26);
            assert!(detail.is_closed());

            let corner = detail.point_of_offset(6).unwrap();
            let pos = detail.position(corner);
            assert_relative_eq!(pos.x.abs(), 5.0 / 9.0, epsilon = 1e-12);
            assert_relative_eq!(pos.y.abs(), 5.0 / 9.0, epsilon = 1e-12);
            assert_relative_eq!(pos.z.abs(), 5.0 / 9.0, epsilon = 1e-12);
            detail.build_geometry();
        }
        assert_eq!(mesh.polygon_count(), 24);
        assert_eq!(mesh.point_count(), 26);
    }

    #[test]
    fn test_two_levels_quadruple_twice() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        let parms = SubdivideParms {
            iterations: 2,
            ..SubdivideParms::default()
        };
        assert_eq!(detail.subdivide(&parms, None), 96);
        detail.validate().unwrap();
        assert_eq!(detail.num_points(), 98);
    }

    #[test]
    fn test_fully_creased_cube_keeps_corners() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        for e in detail.edges().collect::<Vec<_>>() {
            detail.set_edge_weight(e, 3.0);
        }
        detail.subdivide(&SubdivideParms::default(), None);
        for offset in 0..8 {
            let p = detail.point_of_offset(offset).unwrap();
            let pos = detail.position(p);
            assert_relative_eq!(pos.coords.abs(), Vector3::new(1.0, 1.0, 1.0), epsilon = 1e-12);
            for e in detail.point_edges(p) {
                assert_relative_eq!(detail.get_edge_weight(e), 2.0);
            }
        }
    }

    #[test]
    fn test_pinned_boundary() {
        let mut mesh = Primitive::grid(2.0, 1, 1).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        let parms = SubdivideParms {
            smooth_boundary: false,
            ..SubdivideParms::default()
        };
        assert_eq!(detail.subdivide(&parms, None), 4);
        detail.validate().unwrap();
        let p = detail.point_of_offset(0).unwrap();
        assert_relative_eq!(detail.position(p), Point3::new(-1.0, -1.0, 0.0));
    }

    #[test]
    fn test_close_holes_removes_fill() {
        let mut mesh = Primitive::grid(2.0, 1, 1).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        let parms = SubdivideParms {
            close_holes: true,
            ..SubdivideParms::default()
        };
        assert_eq!(detail.subdivide(&parms, None), 4);
        detail.validate().unwrap();
        assert_eq!(detail.num_points(), 9);
        assert!(!detail.is_closed());
    }

    #[test]
    fn test_non_subdivided_face_gets_edge_point() {
        let mut mesh = Primitive::grid(2.0, 1, 2).to_mesh();
        let keep: PrimitiveGroup = [1].into_iter().collect();
        let mut detail = Detail::from_mesh(&mut mesh);
        assert_eq!(detail.subdivide(&SubdivideParms::default(), Some(&keep)), 5);
        detail.validate().unwrap();
        let kept = detail.faces().find(|&f| detail.face(f).prim() == Some(1)).unwrap();
        assert_eq!(detail.face_edge_count(kept), 5);
    }

    #[test]
    fn test_split_face_with_hole() {
        let mut mesh = Mesh::new();
        let mut square = |half: f64, reverse: bool| {
            let mut pts: Vec<usize> = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
                .iter()
                .map(|(x, y)| mesh.add_point(Point3::new(x * half, y * half, 0.0)))
                .collect();
            if reverse {
                pts.reverse();
            }
            pts
        };
        let outer = square(2.0, false);
        let inner = square(1.0, true);
        // Bridge in to the hole, around it, back out, then the outer loop
        let mut mesh_loop = vec![outer[0]];
        mesh_loop.extend(inner.iter().copied());
        mesh_loop.push(inner[0]);
        mesh_loop.extend(outer.iter().copied());
        mesh.add_polygon(&mesh_loop);

        let mut detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        assert_eq!(detail.num_faces(), 1);
        assert_eq!(detail.split_polys_with_multiple_holes(), 1);
        detail.validate().unwrap();
        assert_eq!(detail.num_faces(), 2);
        assert!(detail.edges().all(|e| !detail.is_bridge(e)));
        assert_eq!(detail.subdivide(&SubdivideParms::default(), None), 12);
        detail.validate().unwrap();
    }
}
