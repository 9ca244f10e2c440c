// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! The topology engine: quad-edge connectivity built over a host mesh
//!
//! A [`Detail`] borrows one host mesh for its whole lifetime. Construction
//! wraps every referenced host point in a [`Point`], every participating
//! polygon in a [`Face`] and synthesizes the edge rings between them. The
//! algorithms in the sibling modules rewrite those rings; [`Detail::build_geometry`]
//! writes the result back into host polygons.

use super::face::{self, Face};
use super::point::Point;
use super::quadedge::{EdgeFlags, EdgeId, FaceId, Origin, PointId, QuadEdgeArena};
use crate::config::TopologyConfig;
use crate::error::{Diagnostics, ErrorCode, Result, TopologyError, WarningCode};
use crate::geometry::{AttributeOwner, AttributeRefMap, Mesh, PrimitiveGroup};
use crate::utils::math::{lerp_point, Plane, Side};
use ahash::{AHashMap, AHashSet};
use log::{debug, trace, warn};
use nalgebra::{Point3, Vector3};
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;

/// Vertex attribute holding per-edge crease weights
pub const CREASE_ATTRIBUTE: &str = "creaseweight";
/// Vertex attribute receiving cusped normals
pub const NORMAL_ATTRIBUTE: &str = "N";

const MAX_RECIPE_DEPTH: usize = 32;

/// How a point created by the engine derives its attributes
#[derive(Debug, Clone, PartialEq)]
pub enum PointRecipe {
    /// Along the edge `a -> b` at parameter `t`
    Lerp { a: PointId, b: PointId, t: f64 },
    /// Even blend of several points
    Average(Vec<PointId>),
    /// Copy of another point
    Alias(PointId),
}

/// One face to (re)build: its corner points and source primitive
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLoop {
    pub points: Vec<PointId>,
    pub prim: Option<usize>,
    pub flags: u32,
}

impl FaceLoop {
    pub fn new(points: Vec<PointId>, prim: Option<usize>) -> Self {
        Self { points, prim, flags: 0 }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

/// Outcome of writing the topology back to the host mesh
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Host primitive written for each face id (None for dead or skipped faces)
    pub face_prims: Vec<Option<usize>>,
    pub created: PrimitiveGroup,
    pub removed: PrimitiveGroup,
}

impl BuildReport {
    pub fn prim_of(&self, face: FaceId) -> Option<usize> {
        self.face_prims.get(face.index()).copied().flatten()
    }
}

/// Quad-edge topology over a borrowed host mesh
#[derive(Debug)]
pub struct Detail<'m> {
    pub(crate) mesh: &'m mut Mesh,
    pub(crate) config: TopologyConfig,
    pub(crate) group: Option<PrimitiveGroup>,
    pub(crate) edges: QuadEdgeArena,
    pub(crate) points: Vec<Point>,
    pub(crate) faces: Vec<Face>,
    pub(crate) point_of_offset: AHashMap<usize, PointId>,
    pub(crate) source_prims: BTreeSet<usize>,
    source_vertices: AHashMap<(usize, PointId), usize>,
    point_vertex: AHashMap<PointId, usize>,
    pub(crate) recipes: AHashMap<PointId, PointRecipe>,
    pub(crate) weights: AHashMap<(PointId, PointId), f64>,
    pub(crate) corner_normals: AHashMap<(FaceId, PointId), Vector3<f64>>,
    pub(crate) diagnostics: Diagnostics,
}

/// Undirected key of the edge between two points
pub(crate) fn edge_key(a: PointId, b: PointId) -> (PointId, PointId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Drop consecutive duplicates (including across the wrap). None when fewer
/// than three corners remain.
pub(crate) fn clean_loop(mut points: Vec<PointId>) -> Option<Vec<PointId>> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        None
    } else {
        Some(points)
    }
}

impl<'m> Detail<'m> {
    /// Build the topology of `mesh`, restricted to `group` when given
    pub fn new(mesh: &'m mut Mesh, group: Option<&PrimitiveGroup>, config: &TopologyConfig) -> Self {
        let mut detail = Self {
            mesh,
            config: config.clone(),
            group: group.cloned(),
            edges: QuadEdgeArena::new(),
            points: Vec::new(),
            faces: Vec::new(),
            point_of_offset: AHashMap::new(),
            source_prims: BTreeSet::new(),
            source_vertices: AHashMap::new(),
            point_vertex: AHashMap::new(),
            recipes: AHashMap::new(),
            weights: AHashMap::new(),
            corner_normals: AHashMap::new(),
            diagnostics: Diagnostics::new(),
        };
        detail.load();
        detail
    }

    /// Build over every polygon with the default configuration
    pub fn from_mesh(mesh: &'m mut Mesh) -> Self {
        Self::new(mesh, None, &TopologyConfig::default())
    }

    /// Discard the topology and build it again from the host mesh
    pub fn reload(&mut self) {
        self.load();
    }

    fn load(&mut self) {
        self.points.clear();
        self.point_of_offset.clear();
        self.source_vertices.clear();
        self.point_vertex.clear();
        self.recipes.clear();
        self.weights.clear();

        let group = self.group.clone();
        let prims: Vec<usize> = self
            .mesh
            .polygons()
            .filter(|p| group.as_ref().map_or(true, |g| g.contains(*p)))
            .collect();
        let referenced: BTreeSet<usize> = prims.iter().flat_map(|&p| self.mesh.polygon_points(p)).collect();
        self.merge_super_points(&referenced);

        let mut loops = Vec::with_capacity(prims.len());
        for &prim in &prims {
            let verts = self.mesh.polygon_vertices(prim).to_vec();
            let mut pts = Vec::with_capacity(verts.len());
            for v in verts {
                let Some(&pid) = self.point_of_offset.get(&self.mesh.vertex_point(v)) else {
                    continue;
                };
                self.source_vertices.entry((prim, pid)).or_insert(v);
                self.point_vertex.entry(pid).or_insert(v);
                pts.push(pid);
            }
            match clean_loop(pts) {
                Some(points) => loops.push(FaceLoop::new(points, Some(prim))),
                None => self
                    .diagnostics
                    .error(ErrorCode::Degenerate, format!("primitive {} has fewer than three distinct points", prim)),
            }
        }

        self.source_prims = prims.into_iter().collect();
        self.build_rings(loops);
        self.load_creases();
        debug!(
            "built detail: {} points, {} edges, {} faces",
            self.num_points(),
            self.num_edges(),
            self.num_faces()
        );
    }

    fn merge_super_points(&mut self, referenced: &BTreeSet<usize>) {
        let tol = self.config.super_point_tolerance;
        if tol < 0.0 {
            for &off in referenced {
                self.push_point(off);
            }
            return;
        }

        let cell = tol.max(1e-12);
        let key = |p: &Point3<f64>| {
            (
                (p.x / cell).floor() as i64,
                (p.y / cell).floor() as i64,
                (p.z / cell).floor() as i64,
            )
        };
        let mut grid: AHashMap<(i64, i64, i64), Vec<PointId>> = AHashMap::new();
        let mut merged = 0usize;

        for &off in referenced {
            let pos = self.mesh.position(off);
            let (kx, ky, kz) = key(&pos);
            let mut found = None;
            'search: for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        if let Some(list) = grid.get(&(kx + dx, ky + dy, kz + dz)) {
                            for &pid in list {
                                if (self.position(pid) - pos).norm() <= tol {
                                    found = Some(pid);
                                    break 'search;
                                }
                            }
                        }
                    }
                }
            }
            match found {
                Some(pid) => {
                    self.point_of_offset.insert(off, pid);
                    merged += 1;
                }
                None => {
                    let pid = self.push_point(off);
                    grid.entry((kx, ky, kz)).or_default().push(pid);
                }
            }
        }
        if merged > 0 {
            debug!("merged {} host points into super points (tolerance {})", merged, tol);
        }
    }

    fn push_point(&mut self, offset: usize) -> PointId {
        let pid = PointId(self.points.len() as u32);
        self.points.push(Point::new(offset));
        self.point_of_offset.insert(offset, pid);
        pid
    }

    /// Rebuild every face from point loops, replacing all edges and faces.
    /// Points keep their ids.
    pub(crate) fn rebuild_faces(&mut self, loops: Vec<FaceLoop>) {
        self.build_rings(loops);
    }

    /// Synthesize the quad-edge rings of a set of faces
    pub(crate) fn build_rings(&mut self, loops: Vec<FaceLoop>) {
        self.edges.clear();
        self.faces.clear();
        self.corner_normals.clear();
        for p in &mut self.points {
            p.set_edge(None);
        }

        let limit = self.config.max_ring_walk;
        let mut claimed: Vec<bool> = Vec::new();
        let mut slot: Vec<Option<(usize, usize)>> = Vec::new();
        let mut directed: AHashMap<(PointId, PointId), Vec<EdgeId>> = AHashMap::new();
        let mut face_records: Vec<Vec<EdgeId>> = Vec::with_capacity(loops.len());

        for lp in loops {
            let f = FaceId(self.faces.len() as u32);
            let mut face = Face::new(lp.prim);
            face.set_flag(lp.flags);
            self.faces.push(face);

            let n = lp.points.len();
            let mut records = Vec::with_capacity(n);
            for i in 0..n {
                let u = lp.points[i];
                let w = lp.points[(i + 1) % n];
                let reuse = directed
                    .get(&(w, u))
                    .and_then(|list| list.iter().copied().find(|r| !claimed[r.sym().index()]));
                let e = match reuse {
                    Some(r) => {
                        let e = r.sym();
                        if self.edges.left(r) == Some(f) {
                            self.edges.set_edge_flag(e, EdgeFlags::BRIDGE);
                        }
                        e
                    }
                    None => {
                        let e = self.edges.make_edge();
                        claimed.resize(self.edges.quad_count() * 4, false);
                        slot.resize(self.edges.quad_count() * 4, None);
                        self.edges.set_org(e, Some(u));
                        self.edges.set_dest(e, Some(w));
                        e
                    }
                };
                claimed[e.index()] = true;
                slot[e.index()] = Some((f.index(), i));
                self.edges.set_left(e, Some(f));
                directed.entry((u, w)).or_default().push(e);
                records.push(e);
            }
            self.faces[f.index()].set_edge(records.first().copied());
            face_records.push(records);
        }

        // Origin rings: a face-left record follows the reverse of its face
        // predecessor; a hole-left record sweeps clockwise across faces until
        // it reaches the next hole.
        let primal: Vec<EdgeId> = self.edges.directed_edges().collect();
        let mut onext: AHashMap<EdgeId, EdgeId> = AHashMap::with_capacity(primal.len());
        for records in &face_records {
            let n = records.len();
            for i in 0..n {
                onext.insert(records[i], records[(i + n - 1) % n].sym());
            }
        }
        for &h in &primal {
            if claimed[h.index()] {
                continue;
            }
            let mut cur = h;
            let mut steps = 0usize;
            loop {
                let s = cur.sym();
                if !claimed[s.index()] {
                    break;
                }
                let Some((f, i)) = slot[s.index()] else {
                    break;
                };
                let records = &face_records[f];
                cur = records[(i + 1) % records.len()];
                steps += 1;
                if steps > limit {
                    warn!("hole ring walk from {} did not close", h);
                    cur = h;
                    break;
                }
            }
            onext.insert(h, cur);
        }

        for &e in &primal {
            let next = onext.get(&e).copied().unwrap_or(e);
            self.edges.set_onext(e, next);
        }

        let mut inverse: AHashMap<EdgeId, EdgeId> = AHashMap::with_capacity(primal.len());
        let mut collisions = 0usize;
        for &e in &primal {
            if inverse.insert(self.edges.onext(e), e).is_some() {
                collisions += 1;
            }
        }
        if collisions > 0 {
            self.diagnostics.warning(
                WarningCode::BadPartition,
                format!("{} origin ring collisions; input orientation is inconsistent", collisions),
            );
        }
        for &e in &primal {
            let lnext = inverse.get(&e.sym()).copied().unwrap_or(e.sym());
            self.edges.set_onext(e.irot(), lnext.irot());
        }

        self.merge_point_rings(&primal);
    }

    /// Join the separate fans around a non-manifold point into one ring
    fn merge_point_rings(&mut self, primal: &[EdgeId]) {
        let limit = self.config.max_ring_walk;
        let mut by_point: AHashMap<PointId, Vec<EdgeId>> = AHashMap::new();
        for &e in primal {
            if let Some(p) = self.edges.org(e) {
                by_point.entry(p).or_default().push(e);
            }
        }

        let mut pids: Vec<PointId> = by_point.keys().copied().collect();
        pids.sort();
        for pid in pids {
            let records = &by_point[&pid];
            let first = records[0];
            self.points[pid.index()].set_edge(Some(first));

            let mut seen: AHashSet<EdgeId> = self.edges.org_ring(first, limit).into_iter().collect();
            if seen.len() == records.len() {
                continue;
            }
            for &r in records {
                if seen.contains(&r) {
                    continue;
                }
                let fan = self.edges.org_ring(r, limit);
                let main_hole = self
                    .edges
                    .org_ring(first, limit)
                    .into_iter()
                    .find(|&x| self.edges.left(x).is_none());
                let fan_hole = fan.iter().copied().find(|&x| self.edges.left(x).is_none());
                match (main_hole, fan_hole) {
                    (Some(a), Some(b)) => {
                        trace!("joining fans at {} through {} and {}", pid, a, b);
                        self.edges.splice(a, b);
                    }
                    _ => self.diagnostics.warning(
                        WarningCode::BadPartition,
                        format!("point {} joins closed fans that cannot share one ring", pid),
                    ),
                }
                seen.extend(fan);
            }
        }
    }

    // ---- accessors ----

    pub fn mesh(&self) -> &Mesh {
        &*self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut *self.mesh
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn arena(&self) -> &QuadEdgeArena {
        &self.edges
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn point(&self, p: PointId) -> &Point {
        &self.points[p.index()]
    }

    pub fn point_mut(&mut self, p: PointId) -> &mut Point {
        &mut self.points[p.index()]
    }

    pub fn face(&self, f: FaceId) -> &Face {
        &self.faces[f.index()]
    }

    pub fn face_mut(&mut self, f: FaceId) -> &mut Face {
        &mut self.faces[f.index()]
    }

    /// Live points in id order
    pub fn points(&self) -> impl Iterator<Item = PointId> + '_ {
        self.points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_alive())
            .map(|(i, _)| PointId(i as u32))
    }

    /// Live faces in id order
    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_alive())
            .map(|(i, _)| FaceId(i as u32))
    }

    /// Quadrant 0 record of every live edge in creation order
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.edges()
    }

    pub fn num_points(&self) -> usize {
        self.points.iter().filter(|p| p.is_alive() && p.edge().is_some()).count()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.is_alive()).count()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.live_count()
    }

    pub fn point_of_offset(&self, offset: usize) -> Option<PointId> {
        self.point_of_offset.get(&offset).copied()
    }

    pub fn org(&self, e: EdgeId) -> Option<PointId> {
        self.edges.org(e)
    }

    pub fn dest(&self, e: EdgeId) -> Option<PointId> {
        self.edges.dest(e)
    }

    pub fn left(&self, e: EdgeId) -> Option<FaceId> {
        self.edges.left(e)
    }

    pub fn right(&self, e: EdgeId) -> Option<FaceId> {
        self.edges.right(e)
    }

    pub fn position(&self, p: PointId) -> Point3<f64> {
        self.points[p.index()].pos3(&*self.mesh)
    }

    pub fn set_position(&mut self, p: PointId, pos: Point3<f64>) {
        let offset = self.points[p.index()].offset();
        self.mesh.set_position(offset, pos);
    }

    pub fn edge_length(&self, e: EdgeId) -> f64 {
        match (self.org(e), self.dest(e)) {
            (Some(a), Some(b)) => (self.position(b) - self.position(a)).norm(),
            _ => 0.0,
        }
    }

    /// Records of a face loop starting at its bounding edge
    pub fn face_edges(&self, f: FaceId) -> Vec<EdgeId> {
        match self.faces[f.index()].edge() {
            Some(e) if self.faces[f.index()].is_alive() => self.edges.left_ring(e, self.config.max_ring_walk),
            _ => Vec::new(),
        }
    }

    /// Corner points of a face in winding order
    pub fn face_points(&self, f: FaceId) -> Vec<PointId> {
        self.face_edges(f).into_iter().filter_map(|e| self.edges.org(e)).collect()
    }

    pub fn face_positions(&self, f: FaceId) -> Vec<Point3<f64>> {
        self.face_points(f).into_iter().map(|p| self.position(p)).collect()
    }

    pub fn face_normal(&mut self, f: FaceId) -> Vector3<f64> {
        let limit = self.config.max_ring_walk;
        self.faces[f.index()].normal(&self.edges, &self.points, &*self.mesh, limit)
    }

    /// Number of edges bounding a face
    pub fn face_edge_count(&self, f: FaceId) -> usize {
        self.faces[f.index()].num_edges(&self.edges, self.config.max_ring_walk)
    }

    /// Side of a plane the face lies on; `Both` when it straddles it
    pub fn face_side(&self, f: FaceId, plane: &Plane) -> Side {
        self.faces[f.index()].above_or_below(
            &self.edges,
            &self.points,
            &*self.mesh,
            plane,
            self.config.plane_tolerance,
            self.config.max_ring_walk,
        )
    }

    /// Outgoing records around a point, counter-clockwise
    pub fn point_edges(&self, p: PointId) -> Vec<EdgeId> {
        match self.points[p.index()].edge() {
            Some(e) => self.edges.org_ring(e, self.config.max_ring_walk),
            None => Vec::new(),
        }
    }

    pub fn point_degree(&self, p: PointId) -> usize {
        self.point_edges(p).len()
    }

    /// Record from `a` to `b`, if the two points share an edge
    pub fn find_edge(&self, a: PointId, b: PointId) -> Option<EdgeId> {
        self.point_edges(a).into_iter().find(|&e| self.edges.dest(e) == Some(b))
    }

    /// Faces around a point, counter-clockwise, holes skipped
    pub fn point_faces(&self, p: PointId) -> Vec<FaceId> {
        let mut faces = Vec::new();
        for e in self.point_edges(p) {
            if let Some(f) = self.edges.left(e) {
                if !faces.contains(&f) {
                    faces.push(f);
                }
            }
        }
        faces
    }

    // ---- element creation ----

    /// Append a host point and its topology view. Point attributes are
    /// interpolated from the recipe sources immediately.
    pub fn add_point(&mut self, pos: Point3<f64>, recipe: Option<PointRecipe>) -> PointId {
        let offset = self.mesh.add_point(pos);
        let pid = self.push_point(offset);
        if let Some(recipe) = recipe {
            let sources: Vec<(usize, f64)> = match &recipe {
                PointRecipe::Lerp { a, b, t } => vec![
                    (self.points[a.index()].offset(), 1.0 - t),
                    (self.points[b.index()].offset(), *t),
                ],
                PointRecipe::Average(list) => list.iter().map(|p| (self.points[p.index()].offset(), 1.0)).collect(),
                PointRecipe::Alias(src) => vec![(self.points[src.index()].offset(), 1.0)],
            };
            let map = AttributeRefMap::new(&*self.mesh, AttributeOwner::Point);
            if !map.is_empty() {
                map.blend(&mut *self.mesh, offset, &sources);
            }
            self.recipes.insert(pid, recipe);
        }
        trace!("added point {} at offset {}", pid, offset);
        pid
    }

    pub(crate) fn new_face(&mut self, prim: Option<usize>, flags: u32) -> FaceId {
        let f = FaceId(self.faces.len() as u32);
        let mut face = Face::new(prim);
        face.set_flag(flags);
        self.faces.push(face);
        f
    }

    /// Label every record of the loop through `start` with `face`
    pub(crate) fn relabel_loop(&mut self, start: EdgeId, face: Option<FaceId>) {
        for r in self.edges.left_ring(start, self.config.max_ring_walk) {
            self.edges.set_left(r, face);
        }
        if let Some(f) = face {
            let face = &mut self.faces[f.index()];
            face.set_edge(Some(start));
        }
    }

    pub(crate) fn kill_point(&mut self, p: PointId) {
        self.points[p.index()].kill();
        self.recipes.remove(&p);
    }

    pub(crate) fn kill_face(&mut self, f: FaceId) {
        self.faces[f.index()].kill();
    }

    // ---- local rewrites ----

    /// Split `e` at parameter `t`, returning the new point. None when `t` is
    /// within the split epsilon of either end or the edge is dead.
    pub fn split_edge(&mut self, e: EdgeId, t: f64) -> Option<PointId> {
        let eps = self.config.split_epsilon;
        if !self.edges.is_alive(e) || !e.is_primal() || t <= eps || t >= 1.0 - eps {
            return None;
        }
        let (a, b) = (self.org(e)?, self.dest(e)?);
        let pos = lerp_point(&self.position(a), &self.position(b), t);
        let m = self.add_point(pos, Some(PointRecipe::Lerp { a, b, t }));
        self.insert_edge_point(e, m);
        Some(m)
    }

    /// Make `m` the new destination of `e`; a new edge continues from `m` to
    /// the old destination with the same faces on either side. Returns it.
    pub(crate) fn insert_edge_point(&mut self, e: EdgeId, m: PointId) -> EdgeId {
        let es = e.sym();
        let (a, b) = (self.org(e), self.dest(e));
        let (lf, rf) = (self.left(e), self.right(e));
        let flags = self.edges.flags(e);
        let n = self.edges.make_edge();

        let prev = self.edges.oprev(es);
        if prev != es {
            self.edges.splice(es, prev);
            self.edges.splice(n.sym(), prev);
        }
        self.edges.splice(es, n);

        self.edges.set_org(es, Some(m));
        self.edges.set_org(n, Some(m));
        self.edges.set_dest(n, b);
        self.edges.set_left(n, lf);
        self.edges.set_right(n, rf);
        self.edges.set_flag(n, flags);
        self.edges.set_flag(n.sym(), self.edges.flags(es));

        self.points[m.index()].set_edge(Some(n));
        if let Some(b) = b {
            if self.points[b.index()].edge() == Some(es) {
                self.points[b.index()].set_edge(Some(n.sym()));
            }
            if let Some(a) = a {
                if let Some(w) = self.weights.remove(&edge_key(a, b)) {
                    self.weights.insert(edge_key(a, m), w);
                    self.weights.insert(edge_key(m, b), w);
                }
            }
        }
        for f in [lf, rf].into_iter().flatten() {
            self.faces[f.index()].invalidate_normal();
        }
        trace!("inserted {} into {}", m, e);
        n
    }

    /// New edge from `dest(a)` to `org(b)` through their common face. A
    /// face split in two keeps its id on the `sym` side; the loop of the new
    /// edge becomes a new face. Joining two loops yields a bridge.
    pub(crate) fn connect_edges(&mut self, a: EdgeId, b: EdgeId) -> EdgeId {
        let face = self.left(a);
        let e = self.edges.connect(a, b);
        let ring = self.edges.left_ring(e, self.config.max_ring_walk);
        if ring.contains(&e.sym()) {
            self.edges.set_edge_flag(e, EdgeFlags::BRIDGE);
            self.relabel_loop(e, face);
        } else if let Some(f) = face {
            let src = &self.faces[f.index()];
            let prim = src.prim();
            let flags = face::flags::NEW | (src.flags() & face::flags::HOLE_FILL);
            let g = self.new_face(prim, flags);
            self.relabel_loop(e, Some(g));
            self.relabel_loop(e.sym(), Some(f));
        }
        if let Some(p) = self.org(e) {
            self.points[p.index()].set_edge(Some(e));
        }
        trace!("connected {} -> {} with {}", a, b, e);
        e
    }

    /// Add an edge between two corners of a face, splitting it. None when
    /// either point is not a corner or the two are already adjacent.
    pub fn connect_points(&mut self, f: FaceId, a: PointId, b: PointId) -> Option<EdgeId> {
        let records = self.face_edges(f);
        let ea = records.iter().copied().find(|&r| self.org(r) == Some(a))?;
        let eb = records.iter().copied().find(|&r| self.org(r) == Some(b))?;
        if ea == eb || self.edges.lnext(ea) == eb || self.edges.lnext(eb) == ea {
            return None;
        }
        let prev = self.edges.lprev(ea);
        Some(self.connect_edges(prev, eb))
    }

    /// Remove an edge from both rings. Distinct faces on either side merge
    /// (a face merged with a hole becomes a hole); a face on both sides is
    /// split, the far loop becoming a new face.
    pub fn delete_edge(&mut self, e: EdgeId) -> bool {
        if !self.edges.is_alive(e) {
            return false;
        }
        let e = if e.is_primal() { e } else { e.rot() };
        let (lf, rf) = (self.left(e), self.right(e));
        let (po, pd) = (self.org(e), self.dest(e));
        let a = self.edges.oprev(e);
        let b = self.edges.oprev(e.sym());
        let a_live = a != e;
        let b_live = b != e.sym();

        self.edges.set_edge_flag(e, EdgeFlags::DELETE);
        for f in [lf, rf].into_iter().flatten() {
            self.faces[f.index()].adjust_to_safe_edge(&self.edges, self.config.max_ring_walk);
        }
        if a_live {
            self.edges.splice(e, a);
        }
        if b_live {
            self.edges.splice(e.sym(), b);
        }
        self.edges.kill(e);

        if let Some(p) = po {
            self.points[p.index()].set_edge(if a_live { Some(a) } else { None });
        }
        if let Some(p) = pd {
            self.points[p.index()].set_edge(if b_live { Some(b) } else { None });
        }
        if let (Some(p), Some(q)) = (po, pd) {
            self.weights.remove(&edge_key(p, q));
        }

        let anchor = if a_live {
            Some(a)
        } else if b_live {
            Some(b)
        } else {
            None
        };

        if lf != rf {
            let keep = match (lf, rf) {
                (Some(_), Some(r)) => Some(r),
                _ => None,
            };
            for f in [lf, rf].into_iter().flatten() {
                if Some(f) != keep {
                    self.kill_face(f);
                }
            }
            match anchor {
                Some(r) => self.relabel_loop(r, keep),
                None => {
                    if let Some(k) = keep {
                        self.kill_face(k);
                    }
                }
            }
        } else if a_live && b_live {
            let split = !self.edges.left_ring(a, self.config.max_ring_walk).contains(&b);
            self.relabel_loop(a, lf);
            if split {
                let second = match lf {
                    Some(f) => {
                        let prim = self.faces[f.index()].prim();
                        let flags = self.faces[f.index()].flags() & face::flags::HOLE_FILL;
                        Some(self.new_face(prim, flags))
                    }
                    None => None,
                };
                self.relabel_loop(b, second);
            }
        } else if let Some(r) = anchor {
            self.relabel_loop(r, lf);
        } else if let Some(f) = lf {
            self.kill_face(f);
        }
        trace!("deleted edge {}", e);
        true
    }

    /// Remove an edge unless doing so would split its face; in that case the
    /// edge is kept and flagged as a bridge. Endpoints left isolated are
    /// removed.
    pub fn remove_edge(&mut self, e: EdgeId) -> bool {
        if !self.edges.is_alive(e) {
            return false;
        }
        let e = if e.is_primal() { e } else { e.rot() };
        let lf = self.left(e);
        let dangling = self.edges.onext(e) == e || self.edges.onext(e.sym()) == e.sym();
        if lf.is_some()
            && lf == self.right(e)
            && !dangling
            && self.edges.left_ring(e, self.config.max_ring_walk).contains(&e.sym())
        {
            self.edges.set_edge_flag(e, EdgeFlags::BRIDGE);
            return false;
        }
        let ends = [self.org(e), self.dest(e)];
        self.delete_edge(e);
        for p in ends.into_iter().flatten() {
            if self.points[p.index()].edge().is_none() {
                self.kill_point(p);
            }
        }
        true
    }

    /// Remove a point and its edges. Faces around it merge into one; at a
    /// boundary the neighbouring corners are joined first so the face keeps
    /// its area.
    pub fn remove_point(&mut self, p: PointId) -> bool {
        if !self.points[p.index()].is_alive() {
            return false;
        }
        for e in self.point_edges(p) {
            if !self.edges.is_alive(e) {
                continue;
            }
            match (self.left(e), self.right(e)) {
                (Some(l), Some(r)) if l != r => {
                    self.delete_edge(e);
                }
                _ => {}
            }
        }

        for e in self.point_edges(p) {
            if let Some(f) = self.left(e) {
                if self.face_edge_count(f) > 3 && self.right(e).is_none() {
                    let before = self.edges.lprev(e);
                    let prev = self.edges.lprev(before);
                    let next = self.edges.lnext(e);
                    if self.right(before).is_none() {
                        self.connect_edges(prev, next);
                    }
                }
            }
        }

        for e in self.point_edges(p) {
            if self.edges.is_alive(e) {
                self.delete_edge(e);
            }
        }
        self.kill_point(p);
        true
    }

    /// Turn a face into a hole. Edges with holes on both sides are removed
    /// together with points they leave isolated.
    pub fn delete_face(&mut self, f: FaceId) -> bool {
        if !self.faces[f.index()].is_alive() {
            return false;
        }
        let records = self.face_edges(f);
        let corners: Vec<PointId> = records.iter().filter_map(|&r| self.org(r)).collect();
        for &r in &records {
            self.edges.set_left(r, None);
        }
        self.kill_face(f);
        for r in records {
            if self.edges.is_alive(r) && self.left(r).is_none() && self.right(r).is_none() {
                self.delete_edge(r);
            }
        }
        for p in corners {
            if self.points[p.index()].is_alive() && self.points[p.index()].edge().is_none() {
                self.kill_point(p);
            }
        }
        true
    }

    // ---- crease weights ----

    pub fn set_edge_weight(&mut self, e: EdgeId, weight: f64) {
        if let (Some(a), Some(b)) = (self.org(e), self.dest(e)) {
            if weight > 0.0 {
                self.weights.insert(edge_key(a, b), weight);
            } else {
                self.weights.remove(&edge_key(a, b));
            }
        }
    }

    pub fn get_edge_weight(&self, e: EdgeId) -> f64 {
        match (self.org(e), self.dest(e)) {
            (Some(a), Some(b)) => self.weights.get(&edge_key(a, b)).copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Read crease weights from the vertex attribute: a corner's weight
    /// belongs to the edge leaving it
    fn load_creases(&mut self) {
        let Some(attr) = self.mesh.attribute(AttributeOwner::Vertex, CREASE_ATTRIBUTE) else {
            return;
        };
        let mut weights = AHashMap::new();
        for &prim in &self.source_prims {
            let verts = self.mesh.polygon_vertices(prim);
            let n = verts.len();
            for i in 0..n {
                let w = attr.get_scalar(verts[i]);
                if w <= 0.0 {
                    continue;
                }
                let a = self.point_of_offset.get(&self.mesh.vertex_point(verts[i]));
                let b = self.point_of_offset.get(&self.mesh.vertex_point(verts[(i + 1) % n]));
                if let (Some(&a), Some(&b)) = (a, b) {
                    if a != b {
                        let entry = weights.entry(edge_key(a, b)).or_insert(0.0f64);
                        *entry = entry.max(w);
                    }
                }
            }
        }
        debug!("loaded {} creased edges", weights.len());
        self.weights = weights;
    }

    /// Write crease weights to the vertex attribute of built polygons
    pub fn build_creases(&mut self, report: &BuildReport) {
        if self.weights.is_empty() && self.mesh.attribute(AttributeOwner::Vertex, CREASE_ATTRIBUTE).is_none() {
            return;
        }
        let mut values = Vec::new();
        for f in self.faces().collect::<Vec<_>>() {
            let Some(prim) = report.prim_of(f) else {
                continue;
            };
            let pts = self.face_points(f);
            let verts = self.mesh.polygon_vertices(prim).to_vec();
            let n = pts.len().min(verts.len());
            for i in 0..n {
                let w = self
                    .weights
                    .get(&edge_key(pts[i], pts[(i + 1) % pts.len()]))
                    .copied()
                    .unwrap_or(0.0);
                values.push((verts[i], w));
            }
        }
        let attr = self.mesh.add_attribute(AttributeOwner::Vertex, CREASE_ATTRIBUTE, 1, &[0.0]);
        for (v, w) in values {
            attr.set_scalar(v, w);
        }
    }

    // ---- geometry emission ----

    /// Weighted host vertices whose attributes a corner of `p` inherits in
    /// the polygon that came from `prim`
    fn resolve_vertex(&self, p: PointId, prim: Option<usize>, depth: usize) -> Vec<(usize, f64)> {
        if let Some(prim) = prim {
            if let Some(&v) = self.source_vertices.get(&(prim, p)) {
                return vec![(v, 1.0)];
            }
        }
        let mut out = Vec::new();
        if depth < MAX_RECIPE_DEPTH {
            match self.recipes.get(&p) {
                Some(PointRecipe::Lerp { a, b, t }) => {
                    for (src, w) in [(*a, 1.0 - t), (*b, *t)] {
                        let sub = self.resolve_vertex(src, prim, depth + 1);
                        let total: f64 = sub.iter().map(|(_, x)| x).sum();
                        if total > 0.0 {
                            out.extend(sub.into_iter().map(|(v, x)| (v, x / total * w)));
                        }
                    }
                }
                Some(PointRecipe::Average(list)) => {
                    let w = 1.0 / list.len().max(1) as f64;
                    for &src in list {
                        let sub = self.resolve_vertex(src, prim, depth + 1);
                        let total: f64 = sub.iter().map(|(_, x)| x).sum();
                        if total > 0.0 {
                            out.extend(sub.into_iter().map(|(v, x)| (v, x / total * w)));
                        }
                    }
                }
                Some(PointRecipe::Alias(src)) => out = self.resolve_vertex(*src, prim, depth + 1),
                None => {}
            }
        }
        if out.is_empty() {
            if let Some(&v) = self.point_vertex.get(&p) {
                out.push((v, 1.0));
            }
        }
        out
    }

    /// Write every live face back to the host mesh. A face reuses its source
    /// primitive the first time it is seen; further faces from the same source
    /// become new primitives copying its attributes. Source primitives with
    /// no face left are removed.
    pub fn build_geometry(&mut self) -> BuildReport {
        let vertex_map = AttributeRefMap::new(&*self.mesh, AttributeOwner::Vertex);
        let prim_map = AttributeRefMap::new(&*self.mesh, AttributeOwner::Primitive);
        let mut report = BuildReport {
            face_prims: vec![None; self.faces.len()],
            ..BuildReport::default()
        };
        let mut claimed: BTreeSet<usize> = BTreeSet::new();
        let mut corner_vertices: Vec<(FaceId, PointId, usize)> = Vec::new();

        for f in self.faces().collect::<Vec<_>>() {
            let face = &self.faces[f.index()];
            if face.has_flag(face::flags::HOLE_FILL) {
                continue;
            }
            let source = face.prim();
            let pts = self.face_points(f);
            if pts.len() < 3 {
                self.diagnostics
                    .error(ErrorCode::Degenerate, format!("face {} has {} corners", f, pts.len()));
                continue;
            }

            let mut verts = Vec::with_capacity(pts.len());
            for &p in &pts {
                let offset = self.points[p.index()].offset();
                let v = self.mesh.add_vertex(offset);
                if !vertex_map.is_empty() {
                    let sources = self.resolve_vertex(p, source, 0);
                    vertex_map.blend(&mut *self.mesh, v, &sources);
                }
                corner_vertices.push((f, p, v));
                verts.push(v);
            }

            let prim = match source {
                Some(src) if !claimed.contains(&src) && self.mesh.is_polygon_alive(src) => {
                    self.mesh.set_polygon_vertices(src, verts);
                    src
                }
                other => {
                    let np = self.mesh.add_polygon_vertices(verts);
                    if let Some(src) = other {
                        if !prim_map.is_empty() && src < self.mesh.polygon_capacity() {
                            prim_map.copy(&mut *self.mesh, np, src);
                        }
                    }
                    report.created.insert(np);
                    np
                }
            };
            claimed.insert(prim);
            report.face_prims[f.index()] = Some(prim);
        }

        for &prim in &self.source_prims {
            if !claimed.contains(&prim) && self.mesh.is_polygon_alive(prim) {
                self.mesh.remove_polygon(prim);
                report.removed.insert(prim);
            }
        }

        if !self.corner_normals.is_empty() {
            let mut values = Vec::new();
            for &(f, p, v) in &corner_vertices {
                if let Some(n) = self.corner_normals.get(&(f, p)) {
                    values.push((v, *n));
                }
            }
            let attr = self.mesh.add_attribute(AttributeOwner::Vertex, NORMAL_ATTRIBUTE, 3, &[0.0, 0.0, 0.0]);
            for (v, n) in values {
                attr.set_vector3(v, &n);
            }
        }

        self.remove_dead_host_points();

        // Re-anchor on what was just written
        self.source_vertices.clear();
        self.point_vertex.clear();
        for &(f, p, v) in &corner_vertices {
            if let Some(prim) = report.face_prims[f.index()] {
                self.source_vertices.entry((prim, p)).or_insert(v);
            }
            self.point_vertex.entry(p).or_insert(v);
        }
        for (i, prim) in report.face_prims.iter().enumerate() {
            if let Some(prim) = prim {
                self.faces[i].set_prim(Some(*prim));
            }
        }
        self.recipes.clear();
        self.source_prims = claimed;
        self.build_creases(&report);

        debug!(
            "built geometry: {} faces, {} created, {} removed",
            report.face_prims.iter().filter(|p| p.is_some()).count(),
            report.created.len(),
            report.removed.len()
        );
        report
    }

    fn remove_dead_host_points(&mut self) {
        let dead: Vec<usize> = self
            .points
            .iter()
            .filter(|p| !p.is_alive() && self.mesh.is_point_alive(p.offset()))
            .map(|p| p.offset())
            .collect();
        if dead.is_empty() {
            return;
        }
        let mut used: AHashSet<usize> = AHashSet::new();
        for prim in self.mesh.polygons() {
            used.extend(self.mesh.polygon_points(prim));
        }
        for off in dead {
            if !used.contains(&off) {
                self.mesh.remove_point(off);
            }
        }
    }

    // ---- validation and dump ----

    /// Check the structural invariants of every live element
    pub fn validate(&self) -> Result<()> {
        let limit = self.config.max_ring_walk;
        for e in self.edges.edges() {
            for r in [e, e.sym()] {
                if !matches!(self.edges.origin(r), Origin::Point(_)) {
                    return Err(TopologyError::invariant("primal-origin", r, "record carries a face origin"));
                }
                if !matches!(self.edges.origin(r.rot()), Origin::Face(_)) {
                    return Err(TopologyError::invariant("dual-origin", r.rot(), "record carries a point origin"));
                }
                if self.org(r).is_some() != self.dest(r).is_some() {
                    return Err(TopologyError::invariant("endpoints", r, "exactly one endpoint is null"));
                }
                if !self.edges.org_ring_closes(r, limit) {
                    return Err(TopologyError::invariant("onext-closure", r, "origin ring does not close"));
                }
                if !self.edges.left_ring_closes(r, limit) {
                    return Err(TopologyError::invariant("lnext-closure", r, "left loop does not close"));
                }
                for x in self.edges.org_ring(r, limit) {
                    if !self.edges.is_alive(x) {
                        return Err(TopologyError::invariant("onext-live", x, "ring reaches a dead edge"));
                    }
                    if self.org(x) != self.org(r) {
                        return Err(TopologyError::invariant("onext-origin", x, "ring mixes origins"));
                    }
                }
                let left = self.left(r);
                for x in self.edges.left_ring(r, limit) {
                    if self.left(x) != left {
                        return Err(TopologyError::invariant("left-label", x, "loop mixes face labels"));
                    }
                }
                if self.right(r) != self.left(r.sym()) {
                    return Err(TopologyError::invariant("right-sym", r, "right(e) differs from left(sym e)"));
                }
                if let Some(p) = self.org(r) {
                    if !self.points[p.index()].is_alive() {
                        return Err(TopologyError::invariant("point-live", r, format!("origin {} is dead", p)));
                    }
                }
                if let Some(f) = left {
                    if !self.faces[f.index()].is_alive() {
                        return Err(TopologyError::invariant("face-live", r, format!("left face {} is dead", f)));
                    }
                }
            }
        }

        for f in self.faces() {
            let Some(e) = self.faces[f.index()].edge() else {
                return Err(TopologyError::invariant("face-anchor", f, "no bounding edge"));
            };
            if !self.edges.is_alive(e) || self.left(e) != Some(f) {
                return Err(TopologyError::invariant("face-anchor", f, format!("bounding edge {} is not on the face", e)));
            }
            let mut steps = 1;
            let mut cur = self.edges.lnext(e);
            while cur != e {
                steps += 1;
                if steps > limit {
                    return Err(TopologyError::invariant("face-closure", f, "loop does not close"));
                }
                cur = self.edges.lnext(cur);
            }
            if steps != self.face_edge_count(f) {
                return Err(TopologyError::invariant("face-count", f, "edge count mismatch"));
            }
        }

        for p in self.points() {
            if let Some(e) = self.points[p.index()].edge() {
                if !self.edges.is_alive(e) || self.org(e) != Some(p) {
                    return Err(TopologyError::invariant("point-anchor", p, format!("edge {} does not leave the point", e)));
                }
            }
        }
        Ok(())
    }

    /// Write the topology dump
    pub fn save<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "{}", self)
    }
}

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

impl fmt::Display for Detail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Detail: {} points, {} edges, {} faces",
            self.num_points(),
            self.num_edges(),
            self.num_faces()
        )?;
        writeln!(f, "Points:")?;
        for p in self.points() {
            let point = &self.points[p.index()];
            let pos = self.position(p);
            writeln!(
                f,
                "  {} offset {} pos ({:.6}, {:.6}, {:.6}) edge {} flags {:#x}",
                p,
                point.offset(),
                pos.x,
                pos.y,
                pos.z,
                opt(point.edge()),
                point.flags()
            )?;
        }
        writeln!(f, "Edges:")?;
        for e in self.edges.edges() {
            writeln!(
                f,
                "  {}: {} -> {} left {} right {} onext {} dnext {} weight {} flags {:#x}",
                e,
                opt(self.org(e)),
                opt(self.dest(e)),
                opt(self.left(e)),
                opt(self.right(e)),
                self.edges.onext(e),
                self.edges.dnext(e),
                self.get_edge_weight(e),
                self.edges.flags(e).0
            )?;
        }
        writeln!(f, "Faces:")?;
        for face in self.faces() {
            let pts: Vec<String> = self.face_points(face).iter().map(|p| p.to_string()).collect();
            writeln!(
                f,
                "  {} prim {} edges {}: {}",
                face,
                opt(self.faces[face.index()].prim()),
                pts.len(),
                pts.join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;

    #[test]
    fn test_clean_loop() {
        let p = |i| PointId(i);
        assert_eq!(clean_loop(vec![p(0), p(1), p(1), p(2), p(0)]), Some(vec![p(0), p(1), p(2)]));
        assert_eq!(clean_loop(vec![p(0), p(1), p(1), p(0)]), None);
    }

    #[test]
    fn test_cube_rings() {
        let mut mesh = Primitive::cube(1.0).to_mesh();
        let detail = Detail::from_mesh(&mut mesh);
        assert_eq!(detail.num_points(), 8);
        assert_eq!(detail.num_edges(), 12);
        assert_eq!(detail.num_faces(), 6);
        detail.validate().unwrap();
        for p in detail.points() {
            assert_eq!(detail.point_degree(p), 3);
        }
        for f in detail.faces() {
            assert_eq!(detail.face_edge_count(f), 4);
        }
    }

    #[test]
    fn test_open_grid_has_hole_loop() {
        let mut mesh = Primitive::grid(1.0, 2, 2).to_mesh();
        let detail = Detail::from_mesh(&mut mesh);
        detail.validate().unwrap();
        let hole = detail
            .edges()
            .flat_map(|e| [e, e.sym()])
            .find(|&e| detail.left(e).is_none())
            .unwrap();
        assert_eq!(detail.arena().left_ring(hole, 64).len(), 8);
        let center = detail.point_of_offset(4).unwrap();
        assert_eq!(detail.point_degree(center), 4);
    }

    #[test]
    fn test_split_and_connect() {
        let mut mesh = Primitive::grid(1.0, 1, 1).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        let e = detail.edges().next().unwrap();
        assert!(detail.split_edge(e, 0.0).is_none());
        let m = detail.split_edge(e, 0.5).unwrap();
        detail.validate().unwrap();
        let f = detail.faces().next().unwrap();
        assert_eq!(detail.face_edge_count(f), 5);

        let opposite = detail.point_of_offset(3).unwrap();
        let new_edge = detail.connect_points(f, m, opposite).unwrap();
        detail.validate().unwrap();
        assert_eq!(detail.num_faces(), 2);
        assert_ne!(detail.left(new_edge), detail.right(new_edge));

        assert!(detail.delete_edge(new_edge));
        detail.validate().unwrap();
        assert_eq!(detail.num_faces(), 1);
    }

    #[test]
    fn test_face_side_of_plane() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let detail = Detail::from_mesh(&mut mesh);
        let sides = |plane: Plane| -> Vec<Side> { detail.faces().map(|f| detail.face_side(f, &plane)).collect() };

        let mid = sides(Plane::new(Vector3::z(), 0.5));
        assert_eq!(mid.iter().filter(|&&s| s == Side::Both).count(), 4);
        assert_eq!(mid.iter().filter(|&&s| s == Side::Above).count(), 1);
        assert_eq!(mid.iter().filter(|&&s| s == Side::Below).count(), 1);

        let top = sides(Plane::new(Vector3::z(), 1.0));
        assert_eq!(top.iter().filter(|&&s| s == Side::On).count(), 1);
        assert_eq!(top.iter().filter(|&&s| s == Side::Below).count(), 5);
    }

    #[test]
    fn test_delete_edge_reanchors_faces() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        let f = detail.faces().next().unwrap();
        let e = detail.face(f).edge().unwrap();
        assert!(detail.delete_edge(e));
        detail.validate().unwrap();
        assert_eq!(detail.num_faces(), 5);
        for g in detail.faces() {
            let anchor = detail.face(g).edge().unwrap();
            assert!(detail.arena().is_alive(anchor));
        }
    }

    #[test]
    fn test_build_geometry_roundtrip_counts() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            let e = detail.edges().next().unwrap();
            detail.split_edge(e, 0.25).unwrap();
            let report = detail.build_geometry();
            assert!(report.created.is_empty());
            assert!(report.removed.is_empty());
        }
        assert_eq!(mesh.point_count(), 9);
        assert_eq!(mesh.polygon_count(), 6);
        assert_eq!(mesh.vertex_count(), 26);
    }

    #[test]
    fn test_dump_lists_elements() {
        let mut mesh = Primitive::tetrahedron(1.0).to_mesh();
        let detail = Detail::from_mesh(&mut mesh);
        let dump = detail.to_string();
        assert!(dump.starts_with("Detail: 4 points, 6 edges, 4 faces"));
        assert!(dump.contains("Faces:"));
        let mut buf = Vec::new();
        detail.save(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), dump);
    }
}
