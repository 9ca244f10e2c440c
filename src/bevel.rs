// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon bevels over selected points or edges
//!
//! Every face corner touching the selection is replaced by a short chain of
//! points: a point bevel cuts the corner between two slides along its edges,
//! an edge bevel slides the corner along its unbevelled edge or insets it
//! when both of its edges are bevelled. Each bevelled edge then becomes a
//! strip of quads, and the gap left around each bevelled interior point is
//! closed by one patch polygon.

use crate::config::TopologyConfig;
use crate::error::{Result, TopologyError};
use crate::geometry::{EdgeGroup, Mesh, PointGroup, PrimitiveGroup};
use crate::topology::detail::{clean_loop, edge_key};
use crate::topology::{face, Detail, EdgeId, FaceLoop, PointId, PointRecipe};
use crate::utils::math::{lerp_point, quadratic_bezier};
use ahash::{AHashMap, AHashSet};
use log::{debug, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Fraction of an edge a single inset may consume
const MAX_INSET_FRACTION: f64 = 0.49;
const MIN_SIN: f64 = 1e-3;

/// Profile across the bevel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BevelType {
    #[default]
    Flat,
    /// Rounded profile following a quadratic curve through the original corner
    Smooth,
}

/// Bevel parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BevelParms {
    /// Inset distance, or a fraction of the local edge length when `relative`
    pub offset: f64,
    pub relative: bool,
    /// Segments across each bevel
    pub divisions: usize,
    pub bevel_type: BevelType,
    /// Primitive group receiving the new polygons
    pub output_group: Option<String>,
}

impl Default for BevelParms {
    fn default() -> Self {
        Self {
            offset: 0.1,
            relative: false,
            divisions: 1,
            bevel_type: BevelType::Flat,
            output_group: None,
        }
    }
}

/// What to bevel, as host offsets
#[derive(Debug, Clone, PartialEq)]
pub enum BevelTarget {
    Points(PointGroup),
    Edges(EdgeGroup),
}

/// Bevel operation over one host mesh
#[derive(Debug)]
pub struct PolyBevel<'m> {
    mesh: &'m mut Mesh,
    parms: BevelParms,
    config: TopologyConfig,
}

impl<'m> PolyBevel<'m> {
    pub fn new(mesh: &'m mut Mesh, parms: BevelParms) -> Self {
        Self {
            mesh,
            parms,
            config: TopologyConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TopologyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn parms(&self) -> &BevelParms {
        &self.parms
    }

    fn check_parms(&self) -> Result<()> {
        let offset = self.parms.offset;
        if !offset.is_finite() || offset <= 0.0 {
            return Err(TopologyError::invalid_param("offset", offset, "must be positive and finite"));
        }
        if self.parms.divisions == 0 {
            return Err(TopologyError::invalid_param("divisions", 0, "must be at least one"));
        }
        Ok(())
    }

    /// Bevel `target` and return the group of polygons created
    pub fn bevel(&mut self, target: &BevelTarget) -> Result<PrimitiveGroup> {
        self.check_parms()?;
        let mut detail = Detail::new(&mut *self.mesh, None, &self.config);
        let mut state = BevelState::new(&detail, target, &self.parms);
        if state.selected.is_empty() {
            debug!("bevel: nothing selected");
            return Ok(PrimitiveGroup::new());
        }

        let loops = state.build(&mut detail);
        detail.rebuild_faces(loops);
        for p in detail.points().collect::<Vec<_>>() {
            if detail.point(p).edge().is_none() {
                detail.kill_point(p);
            }
        }
        let report = detail.build_geometry();
        let group: PrimitiveGroup = detail
            .faces()
            .filter(|&f| detail.face(f).has_flag(face::flags::NEW))
            .filter_map(|f| report.prim_of(f))
            .collect();
        drop(detail);

        if let Some(name) = &self.parms.output_group {
            self.mesh.set_primitive_group(name, group.clone());
        }
        debug!("bevel created {} polygons", group.len());
        Ok(group)
    }
}

/// Corner of a face: its point and the neighbours before and after it
struct Corner {
    record: EdgeId,
    a: PointId,
    x: PointId,
    y: PointId,
}

struct BevelState<'p> {
    parms: &'p BevelParms,
    by_points: bool,
    selected: AHashSet<PointId>,
    bevelled: AHashSet<(PointId, PointId)>,
    slides: AHashMap<(PointId, PointId), PointId>,
    insets: AHashMap<EdgeId, PointId>,
    chains: AHashMap<EdgeId, Vec<PointId>>,
    rounded: AHashMap<(PointId, PointId), Vec<PointId>>,
    loose_corners: AHashMap<PointId, usize>,
}

impl<'p> BevelState<'p> {
    fn new(detail: &Detail<'_>, target: &BevelTarget, parms: &'p BevelParms) -> Self {
        let mut state = Self {
            parms,
            by_points: matches!(target, BevelTarget::Points(_)),
            selected: AHashSet::new(),
            bevelled: AHashSet::new(),
            slides: AHashMap::new(),
            insets: AHashMap::new(),
            chains: AHashMap::new(),
            rounded: AHashMap::new(),
            loose_corners: AHashMap::new(),
        };
        match target {
            BevelTarget::Points(group) => {
                state.selected = group.iter().filter_map(|off| detail.point_of_offset(off)).collect();
            }
            BevelTarget::Edges(group) => {
                for (oa, ob) in group.iter() {
                    let (Some(a), Some(b)) = (detail.point_of_offset(oa), detail.point_of_offset(ob)) else {
                        continue;
                    };
                    match detail.find_edge(a, b) {
                        Some(e) if detail.is_share(e) => {
                            state.bevelled.insert(edge_key(a, b));
                            state.selected.insert(a);
                            state.selected.insert(b);
                        }
                        Some(_) => warn!("bevel skips boundary edge {} - {}", oa, ob),
                        None => {}
                    }
                }
            }
        }
        state
    }

    fn is_bevelled(&self, a: PointId, b: PointId) -> bool {
        self.bevelled.contains(&edge_key(a, b))
    }

    fn corners(detail: &Detail<'_>) -> Vec<Corner> {
        let mut out = Vec::new();
        for f in detail.faces() {
            for r in detail.face_edges(f) {
                let prev = detail.arena().lprev(r);
                if let (Some(a), Some(x), Some(y)) = (detail.org(r), detail.org(prev), detail.dest(r)) {
                    out.push(Corner { record: r, a, x, y });
                }
            }
        }
        out
    }

    fn base_distance(&self, detail: &Detail<'_>, a: PointId, b: PointId) -> f64 {
        if self.parms.relative {
            self.parms.offset * (detail.position(b) - detail.position(a)).norm()
        } else {
            self.parms.offset
        }
    }

    fn sin_angle(detail: &Detail<'_>, a: PointId, x: PointId, y: PointId) -> f64 {
        let pa = detail.position(a);
        let ux = (detail.position(x) - pa).normalize();
        let uy = (detail.position(y) - pa).normalize();
        ux.cross(&uy).norm().max(MIN_SIN)
    }

    /// Point on the edge from `a` toward `b` at `distance` from `a`
    fn slide(&mut self, detail: &mut Detail<'_>, a: PointId, b: PointId, distance: f64) -> PointId {
        if let Some(&s) = self.slides.get(&(a, b)) {
            return s;
        }
        let (pa, pb) = (detail.position(a), detail.position(b));
        let len = (pb - pa).norm();
        let t = if len > 0.0 { (distance / len).min(MAX_INSET_FRACTION) } else { 0.0 };
        let s = detail.add_point(lerp_point(&pa, &pb, t), Some(PointRecipe::Lerp { a, b, t }));
        self.slides.insert((a, b), s);
        s
    }

    fn inset(&mut self, detail: &mut Detail<'_>, c: &Corner) -> PointId {
        let pa = detail.position(c.a);
        let (vx, vy) = (detail.position(c.x) - pa, detail.position(c.y) - pa);
        let d = if self.parms.relative {
            self.parms.offset * vx.norm().min(vy.norm())
        } else {
            self.parms.offset
        };
        let along = (d / Self::sin_angle(detail, c.a, c.x, c.y)).min(MAX_INSET_FRACTION * vx.norm().min(vy.norm()));
        let pos = pa + (vx.normalize() + vy.normalize()) * along;
        let p = detail.add_point(pos, Some(PointRecipe::Alias(c.a)));
        self.insets.insert(c.record, p);
        p
    }

    /// Points strictly between `from` and `to`, bending toward `control`
    fn profile(&self, detail: &mut Detail<'_>, from: PointId, control: PointId, to: PointId) -> Vec<PointId> {
        let n = self.parms.divisions;
        let (p0, pc, p1) = (detail.position(from), detail.position(control), detail.position(to));
        (1..n)
            .map(|k| {
                let t = k as f64 / n as f64;
                let pos: Point3<f64> = match self.parms.bevel_type {
                    BevelType::Flat => lerp_point(&p0, &p1, t),
                    BevelType::Smooth => quadratic_bezier(&p0, &pc, &p1, t),
                };
                detail.add_point(pos, Some(PointRecipe::Lerp { a: from, b: to, t }))
            })
            .collect()
    }

    fn build(&mut self, detail: &mut Detail<'_>) -> Vec<FaceLoop> {
        let corners = Self::corners(detail);

        for c in &corners {
            if !self.selected.contains(&c.a) {
                continue;
            }
            if self.by_points {
                let (din, dout) = (self.base_distance(detail, c.a, c.x), self.base_distance(detail, c.a, c.y));
                self.slide(detail, c.a, c.x, din);
                self.slide(detail, c.a, c.y, dout);
                continue;
            }
            match (self.is_bevelled(c.a, c.x), self.is_bevelled(c.a, c.y)) {
                (true, true) => {
                    self.inset(detail, c);
                }
                (true, false) => {
                    let d = self.base_distance(detail, c.a, c.x) / Self::sin_angle(detail, c.a, c.x, c.y);
                    self.slide(detail, c.a, c.y, d);
                }
                (false, true) => {
                    let d = self.base_distance(detail, c.a, c.y) / Self::sin_angle(detail, c.a, c.x, c.y);
                    self.slide(detail, c.a, c.x, d);
                }
                (false, false) => *self.loose_corners.entry(c.a).or_insert(0) += 1,
            }
        }

        for c in &corners {
            let chain = self.corner_chain(detail, c);
            self.chains.insert(c.record, chain);
        }

        let mut loops = Vec::new();
        for f in detail.faces().collect::<Vec<_>>() {
            let pts: Vec<PointId> = detail
                .face_edges(f)
                .iter()
                .flat_map(|r| self.chains.get(r).cloned().unwrap_or_default())
                .collect();
            if let Some(points) = clean_loop(pts) {
                let src = detail.face(f);
                loops.push(FaceLoop::new(points, src.prim()).with_flags(src.flags() & !face::flags::NEW));
            }
        }

        let strips = if self.by_points { Vec::new() } else { self.strips(detail) };

        let mut patches = Vec::new();
        let mut selected: Vec<PointId> = self.selected.iter().copied().collect();
        selected.sort();
        for a in selected {
            let ring = detail.point_edges(a);
            if ring.is_empty() || ring.iter().any(|&r| detail.left(r).is_none()) {
                continue;
            }
            let mut pts = Vec::new();
            for r in &ring {
                if let Some(chain) = self.chains.get(r) {
                    pts.extend(chain.iter().rev().copied());
                }
            }
            if let Some(points) = clean_loop(pts) {
                let prim = detail.left(ring[0]).and_then(|f| detail.face(f).prim());
                patches.push(FaceLoop::new(points, prim).with_flags(face::flags::NEW));
            }
        }

        loops.extend(patches);
        for lp in &mut loops {
            self.insert_rounded(lp);
        }
        loops.extend(strips);
        loops
    }

    fn corner_chain(&self, detail: &mut Detail<'_>, c: &Corner) -> Vec<PointId> {
        if !self.selected.contains(&c.a) {
            return vec![c.a];
        }
        if self.by_points {
            let (s_in, s_out) = (self.slides[&(c.a, c.x)], self.slides[&(c.a, c.y)]);
            let mut chain = vec![s_in];
            if self.parms.bevel_type == BevelType::Smooth {
                chain.extend(self.profile(detail, s_in, c.a, s_out));
            }
            chain.push(s_out);
            return chain;
        }
        match (self.is_bevelled(c.a, c.x), self.is_bevelled(c.a, c.y)) {
            (true, true) => vec![self.insets[&c.record]],
            (true, false) => vec![self.slides[&(c.a, c.y)]],
            (false, true) => vec![self.slides[&(c.a, c.x)]],
            (false, false) => {
                let interior = !detail.point_edges(c.a).iter().any(|&r| detail.left(r).is_none());
                let dropped = interior && self.loose_corners.get(&c.a) == Some(&1);
                let mut chain = Vec::with_capacity(3);
                chain.extend(self.slides.get(&(c.a, c.x)).copied());
                if !dropped {
                    chain.push(c.a);
                }
                chain.extend(self.slides.get(&(c.a, c.y)).copied());
                chain
            }
        }
    }

    fn strips(&mut self, detail: &mut Detail<'_>) -> Vec<FaceLoop> {
        let mut strips = Vec::new();
        for e in detail.edges().collect::<Vec<_>>() {
            let (Some(a), Some(b)) = (detail.org(e), detail.dest(e)) else {
                continue;
            };
            if !self.is_bevelled(a, b) || !detail.is_share(e) {
                continue;
            }
            let arena = detail.arena();
            let (ln, rn) = (arena.lnext(e), arena.lnext(e.sym()));
            let ends = (
                self.chains.get(&e).and_then(|c| c.last().copied()),
                self.chains.get(&ln).and_then(|c| c.first().copied()),
                self.chains.get(&e.sym()).and_then(|c| c.last().copied()),
                self.chains.get(&rn).and_then(|c| c.first().copied()),
            );
            let (Some(la), Some(lb), Some(rb), Some(ra)) = ends else {
                continue;
            };

            let side_a = self.profile(detail, la, a, ra);
            let side_b = self.profile(detail, lb, b, rb);
            let mut rows_a = vec![la];
            rows_a.extend(side_a.iter().copied());
            rows_a.push(ra);
            let mut rows_b = vec![lb];
            rows_b.extend(side_b.iter().copied());
            rows_b.push(rb);
            if !side_a.is_empty() {
                self.rounded.insert((la, ra), side_a);
                self.rounded.insert((lb, rb), side_b);
            }

            let prim = detail.left(e).and_then(|f| detail.face(f).prim());
            for k in 0..rows_a.len() - 1 {
                let quad = vec![rows_b[k], rows_a[k], rows_a[k + 1], rows_b[k + 1]];
                if let Some(points) = clean_loop(quad) {
                    strips.push(FaceLoop::new(points, prim).with_flags(face::flags::NEW));
                }
            }
        }
        strips
    }

    /// Thread the profile points of a strip end through a loop that runs
    /// along it, in whichever direction the loop takes
    fn insert_rounded(&self, lp: &mut FaceLoop) {
        if self.rounded.is_empty() {
            return;
        }
        let n = lp.points.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let (u, v) = (lp.points[i], lp.points[(i + 1) % n]);
            out.push(u);
            if let Some(interior) = self.rounded.get(&(u, v)) {
                out.extend(interior.iter().copied());
            } else if let Some(interior) = self.rounded.get(&(v, u)) {
                out.extend(interior.iter().rev().copied());
            }
        }
        lp.points = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use approx::assert_relative_eq;

    fn cube_edge_group(pairs: &[(usize, usize)]) -> BevelTarget {
        BevelTarget::Edges(pairs.iter().copied().collect())
    }

    #[test]
    fn test_rejects_bad_parms() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let parms = BevelParms {
            offset: 0.0,
            ..BevelParms::default()
        };
        let result = PolyBevel::new(&mut mesh, parms).bevel(&cube_edge_group(&[(4, 5)]));
        assert!(matches!(result, Err(TopologyError::InvalidParameter { .. })));
    }

    #[test]
    fn test_point_bevel_cuts_corner() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let corner = mesh.position(6);
        let parms = BevelParms {
            offset: 0.25,
            output_group: Some("bevel".to_string()),
            ..BevelParms::default()
        };
        let group = PolyBevel::new(&mut mesh, parms)
            .bevel(&BevelTarget::Points([6].into_iter().collect()))
            .unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(mesh.polygon_count(), 7);
        assert_eq!(mesh.point_count(), 10);
        assert!(!mesh.is_point_alive(6));
        let cap = group.iter().next().unwrap();
        for pos in mesh.polygon_positions(cap) {
            assert_relative_eq!((pos - corner).norm(), 0.25, epsilon = 1e-12);
        }
        assert_eq!(mesh.primitive_group("bevel"), Some(&group));
    }

    #[test]
    fn test_single_edge_bevel() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let group = PolyBevel::new(&mut mesh, BevelParms::default())
            .bevel(&cube_edge_group(&[(4, 5)]))
            .unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(mesh.polygon_count(), 7);
        assert_eq!(mesh.point_count(), 10);
        let strip = group.iter().next().unwrap();
        assert_eq!(mesh.polygon_vertices(strip).len(), 4);

        let detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        assert!(detail.is_closed());
        let pentagons = detail.faces().filter(|&f| detail.face_edge_count(f) == 5).count();
        assert_eq!(pentagons, 2);
    }

    #[test]
    fn test_smooth_edge_bevel_divisions() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let parms = BevelParms {
            offset: 0.3,
            divisions: 3,
            bevel_type: BevelType::Smooth,
            ..BevelParms::default()
        };
        let group = PolyBevel::new(&mut mesh, parms).bevel(&cube_edge_group(&[(4, 5)])).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(mesh.polygon_count(), 9);
        assert_eq!(mesh.point_count(), 14);

        let detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        assert!(detail.is_closed());
        let ends = detail.faces().filter(|&f| detail.face_edge_count(f) == 7).count();
        assert_eq!(ends, 2);
    }

    #[test]
    fn test_flat_edge_bevel_divisions() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let parms = BevelParms {
            offset: 0.3,
            divisions: 3,
            ..BevelParms::default()
        };
        let group = PolyBevel::new(&mut mesh, parms).bevel(&cube_edge_group(&[(4, 5)])).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(mesh.polygon_count(), 9);
        assert_eq!(mesh.point_count(), 14);
        for prim in group.iter() {
            assert_eq!(mesh.polygon_vertices(prim).len(), 4);
        }

        let detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        assert!(detail.is_closed());
        assert!(detail.boundary().is_empty());
        let ends = detail.faces().filter(|&f| detail.face_edge_count(f) == 7).count();
        assert_eq!(ends, 2);
    }

    #[test]
    fn test_corner_of_three_edges() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let detail = Detail::from_mesh(&mut mesh);
        let six = detail.point_of_offset(6).unwrap();
        let pairs: Vec<(usize, usize)> = detail
            .point_edges(six)
            .into_iter()
            .filter_map(|r| detail.dest(r))
            .map(|q| (6, detail.point(q).offset()))
            .collect();
        drop(detail);
        assert_eq!(pairs.len(), 3);

        let group = PolyBevel::new(&mut mesh, BevelParms::default())
            .bevel(&cube_edge_group(&pairs))
            .unwrap();
        assert_eq!(group.len(), 4);
        assert_eq!(mesh.polygon_count(), 10);
        assert_eq!(mesh.point_count(), 13);

        let mut detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        assert!(detail.is_closed());
    }

    #[test]
    fn test_edge_touching_boundary() {
        let mut mesh = Primitive::grid(2.0, 2, 2).to_mesh();
        let group = PolyBevel::new(&mut mesh, BevelParms::default())
            .bevel(&cube_edge_group(&[(1, 4)]))
            .unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(mesh.polygon_count(), 6);
        assert_eq!(mesh.point_count(), 12);
        let detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        assert_eq!(detail.create_boundary_list().len(), 1);
    }
}
