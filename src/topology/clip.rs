// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Plane splitting: the shared core of clip, crease and brick

use super::detail::{BuildReport, Detail, PointRecipe};
use super::{face, point};
use super::quadedge::{EdgeFlags, EdgeId, FaceId, PointId};
use crate::error::Diagnostics;
use crate::geometry::{PointGroup, PrimitiveGroup};
use crate::utils::math::{lerp_point, Plane, Side};
use ahash::AHashSet;
use log::{debug, trace};
use nalgebra::{Point3, Vector3};

/// Faces on each side of a plane after a split
#[derive(Debug, Clone, Default)]
pub struct PlaneSplit {
    /// Faces with no corner below the plane (coplanar faces included)
    pub above: Vec<FaceId>,
    pub below: Vec<FaceId>,
    /// Intersection points created on crossing edges
    pub new_points: Vec<PointId>,
    /// Edges added across faces along the plane
    pub cut_edges: Vec<EdgeId>,
}

/// Output of [`Detail::clip`]
#[derive(Debug, Clone)]
pub struct ClipResult {
    pub report: BuildReport,
    /// Primitives kept above the plane
    pub kept: PrimitiveGroup,
    /// Host points created on the plane
    pub cut_points: PointGroup,
    pub diagnostics: Diagnostics,
}

/// Output of [`Detail::crease`]
#[derive(Debug, Clone)]
pub struct CreaseResult {
    pub report: BuildReport,
    pub above: Option<PrimitiveGroup>,
    pub below: Option<PrimitiveGroup>,
    pub cut_points: PointGroup,
    pub diagnostics: Diagnostics,
}

fn make_plane(normal: Vector3<f64>, distance: f64, normalize: bool) -> Plane {
    if normalize {
        Plane::normalized(normal, distance)
    } else {
        Plane::new(normal, distance)
    }
}

impl Detail<'_> {
    /// Parameter along `e` where it crosses the plane strictly
    pub fn intersect_plane(&self, e: EdgeId, plane: &Plane) -> Option<f64> {
        let tol = self.config.plane_tolerance;
        let (a, b) = (self.position(self.org(e)?), self.position(self.dest(e)?));
        match (plane.side(&a, tol), plane.side(&b, tol)) {
            (Side::Above, Side::Below) | (Side::Below, Side::Above) => plane.intersect_param(&a, &b),
            _ => None,
        }
    }

    /// Parameter of the projection of `p` onto `e` when `p` lies on the
    /// segment within `tolerance`
    pub fn intersect_point(&self, e: EdgeId, p: &Point3<f64>, tolerance: f64) -> Option<f64> {
        let (a, b) = (self.position(self.org(e)?), self.position(self.dest(e)?));
        let ab = b - a;
        let len2 = ab.norm_squared();
        if len2 < f64::EPSILON {
            return None;
        }
        let t = (p - a).dot(&ab) / len2;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }
        let closest = lerp_point(&a, &b, t);
        ((closest - p).norm() <= tolerance).then_some(t)
    }

    /// Split every crossing edge and every straddling face along `plane`.
    /// Restricted to `faces` when given.
    pub fn split_by_plane(&mut self, plane: &Plane, faces: Option<&AHashSet<FaceId>>) -> PlaneSplit {
        let tol = self.config.plane_tolerance;
        let eps = self.config.split_epsilon;
        let mut split = PlaneSplit::default();

        let touches = |d: &Self, e: EdgeId| {
            faces.map_or(true, |set| {
                d.left(e).map_or(false, |f| set.contains(&f)) || d.right(e).map_or(false, |f| set.contains(&f))
            })
        };
        let candidates: Vec<EdgeId> = self.edges().filter(|&e| touches(self, e)).collect();

        let mut on_plane: AHashSet<PointId> = AHashSet::new();
        for e in candidates {
            let (Some(a), Some(b)) = (self.org(e), self.dest(e)) else {
                continue;
            };
            let Some(t) = self.intersect_plane(e, plane) else {
                continue;
            };
            if t <= eps {
                on_plane.insert(a);
                continue;
            }
            if t >= 1.0 - eps {
                on_plane.insert(b);
                continue;
            }

            let pos = lerp_point(&self.position(a), &self.position(b), t);
            let glued = split
                .new_points
                .iter()
                .copied()
                .find(|&q| (self.position(q) - pos).norm() <= tol && self.can_glue(e, q));
            if let Some(q) = glued {
                self.glue_edge_point(e, q);
                continue;
            }
            let m = self.add_point(pos, Some(PointRecipe::Lerp { a, b, t }));
            let n = self.insert_edge_point(e, m);
            self.edges.set_edge_flag(e, EdgeFlags::INTERSECT);
            self.edges.set_edge_flag(n, EdgeFlags::INTERSECT);
            on_plane.insert(m);
            split.new_points.push(m);
        }

        let side_of = |d: &Self, p: PointId| {
            if on_plane.contains(&p) {
                Side::On
            } else {
                plane.side(&d.position(p), tol)
            }
        };

        let targets: Vec<FaceId> = self
            .faces()
            .filter(|f| faces.map_or(true, |set| set.contains(f)))
            .collect();
        for f in targets {
            let first_new = self.faces.len();
            let corners = self.face_points(f);
            let sides: Vec<Side> = corners.iter().map(|&p| side_of(self, p)).collect();
            let has_above = sides.contains(&Side::Above);
            let has_below = sides.contains(&Side::Below);

            if has_above && has_below {
                let transitions = transition_corners(&corners, &sides);
                let pairs = self.pair_transitions(f, plane, transitions);
                for (p, q) in pairs {
                    let host = std::iter::once(f)
                        .chain((first_new..self.faces.len()).map(|i| FaceId(i as u32)))
                        .find(|&g| {
                            self.face(g).is_alive() && {
                                let pts = self.face_points(g);
                                pts.contains(&p) && pts.contains(&q)
                            }
                        });
                    if let Some(g) = host {
                        if let Some(cut) = self.connect_points(g, p, q) {
                            self.edges.set_edge_flag(cut, EdgeFlags::INTERSECT);
                            split.cut_edges.push(cut);
                        }
                    }
                }
            }

            let produced = std::iter::once(f).chain((first_new..self.faces.len()).map(|i| FaceId(i as u32)));
            for g in produced.collect::<Vec<_>>() {
                if !self.face(g).is_alive() {
                    continue;
                }
                let below = self.face_points(g).iter().any(|&p| side_of(self, p) == Side::Below);
                let target = &mut self.faces[g.index()];
                target.clear_flag(face::flags::ABOVE | face::flags::BELOW);
                if below {
                    target.set_flag(face::flags::BELOW);
                    split.below.push(g);
                } else {
                    target.set_flag(face::flags::ABOVE);
                    split.above.push(g);
                }
            }
        }

        for p in self.points().collect::<Vec<_>>() {
            let side = side_of(self, p);
            let pt = &mut self.points[p.index()];
            pt.clear_flag(point::flags::ABOVE | point::flags::BELOW);
            match side {
                Side::Above => pt.set_flag(point::flags::ABOVE),
                Side::Below => pt.set_flag(point::flags::BELOW),
                _ => {}
            }
        }
        for e in self.edges().collect::<Vec<_>>() {
            self.edges.clear_edge_flag(e, EdgeFlags::INSIDE | EdgeFlags::OUTSIDE);
            let (Some(a), Some(b)) = (self.org(e), self.dest(e)) else {
                continue;
            };
            let sides = [side_of(self, a), side_of(self, b)];
            if sides.contains(&Side::Below) {
                self.edges.set_edge_flag(e, EdgeFlags::OUTSIDE);
            } else if sides.contains(&Side::Above) {
                self.edges.set_edge_flag(e, EdgeFlags::INSIDE);
            }
        }

        debug!(
            "plane split: {} new points, {} cuts, {} above, {} below",
            split.new_points.len(),
            split.cut_edges.len(),
            split.above.len(),
            split.below.len()
        );
        split
    }

    /// An intersection on `e` may reuse the split point `q` when both sit on
    /// a boundary and share no face
    fn can_glue(&self, e: EdgeId, q: PointId) -> bool {
        let (lf, rf) = (self.left(e), self.right(e));
        if lf.is_some() && rf.is_some() {
            return false;
        }
        let ring = self.point_edges(q);
        if !ring.iter().any(|&r| self.left(r).is_none()) {
            return false;
        }
        let faces = self.point_faces(q);
        ![lf, rf].into_iter().flatten().any(|f| faces.contains(&f))
    }

    /// Insert the existing point `q` into `e` and join the new fan to the
    /// ring already around `q` through their hole sectors
    fn glue_edge_point(&mut self, e: EdgeId, q: PointId) {
        let limit = self.config.max_ring_walk;
        let Some(old) = self.point(q).edge() else {
            return;
        };
        let n = self.insert_edge_point(e, q);
        let main_hole = self
            .edges
            .org_ring(old, limit)
            .into_iter()
            .find(|&r| self.edges.left(r).is_none());
        let fan_hole = self
            .edges
            .org_ring(n, limit)
            .into_iter()
            .find(|&r| self.edges.left(r).is_none());
        if let (Some(a), Some(b)) = (main_hole, fan_hole) {
            self.edges.splice(a, b);
        }
        self.points[q.index()].set_edge(Some(old));
        let flag = EdgeFlags::INTERSECT | EdgeFlags::GLUE;
        self.edges.set_edge_flag(e, flag);
        self.edges.set_edge_flag(n, flag);
        trace!("glued {} into {}", q, e);
    }

    /// Pair the transition corners of a face along the cut line
    fn pair_transitions(&mut self, f: FaceId, plane: &Plane, mut corners: Vec<PointId>) -> Vec<(PointId, PointId)> {
        if corners.len() > 2 {
            let dir = self.face_normal(f).cross(&plane.normal);
            corners.sort_by(|a, b| {
                let da = dir.dot(&self.position(*a).coords);
                let db = dir.dot(&self.position(*b).coords);
                da.total_cmp(&db)
            });
        }
        corners
            .chunks_exact(2)
            .filter(|pair| pair[0] != pair[1])
            .map(|pair| (pair[0], pair[1]))
            .collect()
    }

    /// Split along a plane and keep only the part above it. Consumes the
    /// detail; the host mesh holds the result.
    pub fn clip(mut self, normal: Vector3<f64>, distance: f64, normalize: bool) -> ClipResult {
        let plane = make_plane(normal, distance, normalize);
        let split = self.split_by_plane(&plane, None);
        for &f in &split.below {
            self.delete_face(f);
        }
        let report = self.build_geometry();
        let kept = split.above.iter().filter_map(|&f| report.prim_of(f)).collect();
        let cut_points = self.live_offsets(&split.new_points);
        trace!("clip kept {} faces", split.above.len());
        ClipResult {
            report,
            kept,
            cut_points,
            diagnostics: self.diagnostics,
        }
    }

    /// Split along a plane keeping both sides. With `groups`, the primitives
    /// on each side are stored on the mesh under the given (above, below)
    /// names and returned. Consumes the detail.
    pub fn crease(
        mut self,
        normal: Vector3<f64>,
        distance: f64,
        normalize: bool,
        groups: Option<(&str, &str)>,
    ) -> CreaseResult {
        let plane = make_plane(normal, distance, normalize);
        let split = self.split_by_plane(&plane, None);
        let report = self.build_geometry();
        let cut_points = self.live_offsets(&split.new_points);

        let (above, below) = match groups {
            Some((above_name, below_name)) => {
                let above: PrimitiveGroup = split.above.iter().filter_map(|&f| report.prim_of(f)).collect();
                let below: PrimitiveGroup = split.below.iter().filter_map(|&f| report.prim_of(f)).collect();
                self.mesh.set_primitive_group(above_name, above.clone());
                self.mesh.set_primitive_group(below_name, below.clone());
                (Some(above), Some(below))
            }
            None => (None, None),
        };
        CreaseResult {
            report,
            above,
            below,
            cut_points,
            diagnostics: self.diagnostics,
        }
    }

    fn live_offsets(&self, points: &[PointId]) -> PointGroup {
        points
            .iter()
            .filter(|p| self.point(**p).is_alive())
            .map(|p| self.point(*p).offset())
            .collect()
    }
}

/// Corners where the face passes from one side to the other. Each run of
/// on-plane corners between an above run and a below run yields the corner
/// adjacent to the below run.
fn transition_corners(corners: &[PointId], sides: &[Side]) -> Vec<PointId> {
    let n = corners.len();
    let Some(start) = sides.iter().position(|s| *s != Side::On) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut last = sides[start];
    let mut run: Vec<usize> = Vec::new();
    for i in 1..=n {
        let idx = (start + i) % n;
        let side = sides[idx];
        if side == Side::On {
            run.push(idx);
            continue;
        }
        if side != last {
            let pick = if last == Side::Above { run.last() } else { run.first() };
            if let Some(&k) = pick {
                out.push(corners[k]);
            }
            last = side;
        }
        run.clear();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Mesh, Primitive};

    #[test]
    fn test_transition_corners() {
        let p = |i| PointId(i);
        let corners = [p(0), p(1), p(2), p(3), p(4), p(5)];
        let sides = [Side::Above, Side::On, Side::On, Side::Below, Side::Below, Side::On];
        assert_eq!(transition_corners(&corners, &sides), vec![p(2), p(5)]);
    }

    fn unit_quad() -> Mesh {
        let mut mesh = Mesh::new();
        let pts: Vec<usize> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .map(|(x, y)| mesh.add_point(Point3::new(*x, *y, 0.0)))
            .collect();
        mesh.add_polygon(&pts);
        mesh
    }

    /// Two quads on top of each other whose seam points are separate copies
    fn stacked_quads() -> Mesh {
        let mut mesh = Mesh::new();
        for y0 in [0.0, 1.0] {
            let pts: Vec<usize> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
                .iter()
                .map(|(x, y)| mesh.add_point(Point3::new(*x, y0 + y, 0.0)))
                .collect();
            mesh.add_polygon(&pts);
        }
        mesh
    }

    #[test]
    fn test_crease_glues_coincident_intersections() {
        let mut mesh = stacked_quads();
        let result = Detail::from_mesh(&mut mesh).crease(Vector3::x(), 0.5, true, Some(("right", "left")));
        assert_eq!(result.cut_points.len(), 3);
        assert_eq!(result.above.map(|g| g.len()), Some(2));
        assert_eq!(result.below.map(|g| g.len()), Some(2));
        assert_eq!(mesh.polygon_count(), 4);
        assert_eq!(mesh.point_count(), 11);

        let seam: Vec<usize> = mesh
            .points()
            .filter(|&p| (mesh.position(p) - Point3::new(0.5, 1.0, 0.0)).norm() < 1e-9)
            .collect();
        assert_eq!(seam.len(), 1);
        let users = mesh
            .polygons()
            .filter(|&prim| mesh.polygon_points(prim).contains(&seam[0]))
            .count();
        assert_eq!(users, 4);

        let detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
    }

    #[test]
    fn test_split_glue_flags_and_ring() {
        let mut mesh = stacked_quads();
        let mut detail = Detail::from_mesh(&mut mesh);
        let split = detail.split_by_plane(&Plane::new(Vector3::x(), 0.5), None);
        detail.validate().unwrap();
        assert_eq!(split.new_points.len(), 3);
        let glued = detail
            .edges()
            .filter(|&e| detail.arena().has_flag(e, EdgeFlags::GLUE))
            .count();
        assert_eq!(glued, 2);
        let seam = split
            .new_points
            .iter()
            .copied()
            .find(|&p| (detail.position(p).y - 1.0).abs() < 1e-9)
            .unwrap();
        // two boundary edges and one cut edge on each side of the seam
        assert_eq!(detail.point_degree(seam), 6);
    }

    #[test]
    fn test_plane_near_corner_snaps_to_it() {
        let mut mesh = unit_quad();
        let mut detail = Detail::from_mesh(&mut mesh);
        // within the split epsilon of the two corners at x = 0
        let split = detail.split_by_plane(&Plane::new(Vector3::x(), 5e-5), None);
        assert!(split.new_points.is_empty());
        assert!(split.cut_edges.is_empty());
        assert_eq!(split.above.len(), 1);
        assert!(split.below.is_empty());
        assert_eq!(detail.num_points(), 4);
        detail.validate().unwrap();
    }

    #[test]
    fn test_split_sets_classification_flags() {
        let mut mesh = unit_quad();
        let mut detail = Detail::from_mesh(&mut mesh);
        let split = detail.split_by_plane(&Plane::new(Vector3::x(), 0.5), None);
        assert!(detail.face(split.above[0]).has_flag(face::flags::ABOVE));
        assert!(detail.face(split.below[0]).has_flag(face::flags::BELOW));

        let origin = detail.point_of_offset(0).unwrap();
        let far = detail.point_of_offset(1).unwrap();
        assert!(detail.point(origin).has_flag(point::flags::BELOW));
        assert!(detail.point(far).has_flag(point::flags::ABOVE));
        for &m in &split.new_points {
            let flags = detail.point(m).flags();
            assert_eq!(flags & (point::flags::ABOVE | point::flags::BELOW), 0);
        }

        let arena = detail.arena();
        let inside = detail.edges().filter(|&e| arena.has_flag(e, EdgeFlags::INSIDE)).count();
        let outside = detail.edges().filter(|&e| arena.has_flag(e, EdgeFlags::OUTSIDE)).count();
        // the cut edge lies on the plane and is neither
        assert_eq!(inside, 3);
        assert_eq!(outside, 3);
        assert!(split.cut_edges.iter().all(|&e| arena.has_flag(e, EdgeFlags::INTERSECT)));
    }

    #[test]
    fn test_crease_quad_through_center() {
        let mut mesh = unit_quad();
        let result = Detail::from_mesh(&mut mesh).crease(Vector3::x(), 0.5, true, Some(("above", "below")));
        let above = result.above.unwrap();
        let below = result.below.unwrap();
        assert_eq!(above.len(), 1);
        assert_eq!(below.len(), 1);
        assert_eq!(result.cut_points.len(), 2);

        for prim in above.iter().chain(below.iter()) {
            let pts = mesh.polygon_points(prim);
            assert_eq!(pts.len(), 4);
            let originals = pts.iter().filter(|p| **p < 4).count();
            assert_eq!(originals, 2);
        }
        let above_prim = above.iter().next().unwrap();
        assert!(mesh.polygon_positions(above_prim).iter().all(|p| p.x >= 0.5 - 1e-9));
        assert!(mesh.primitive_group("below").is_some());
    }

    #[test]
    fn test_clip_cube_keeps_upper_half() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let result = Detail::from_mesh(&mut mesh).clip(Vector3::new(0.0, 0.0, 2.0), 0.0, true);
        // top face plus the upper halves of the four sides
        assert_eq!(mesh.polygon_count(), 5);
        assert_eq!(result.kept.len(), 5);
        assert_eq!(result.cut_points.len(), 4);
        assert!(mesh
            .polygons()
            .flat_map(|p| mesh.polygon_positions(p))
            .all(|p| p.z >= -1e-9));
    }

    #[test]
    fn test_split_is_repeatable_on_live_detail() {
        let mut mesh = Primitive::grid(2.0, 2, 2).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        let plane = Plane::new(Vector3::x(), 0.5);
        let first = detail.split_by_plane(&plane, None);
        assert_eq!(first.below.len(), 4);
        assert_eq!(first.above.len(), 2);
        detail.validate().unwrap();
        let again = detail.split_by_plane(&plane, None);
        assert!(again.new_points.is_empty());
        assert!(again.cut_edges.is_empty());
    }
}
