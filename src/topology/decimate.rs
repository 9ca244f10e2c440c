// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Decimation primitives: edge collapse, split and swap

use super::detail::{edge_key, Detail};
use super::quadedge::{EdgeId, FaceId, PointId};
use crate::geometry::{AttributeOwner, AttributeRefMap};
use crate::utils::math::lerp_point;
use ahash::AHashSet;
use log::{debug, trace};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Edge queued for collapse, shortest first
#[derive(Debug, Clone, Copy)]
struct CollapseCandidate {
    length: f64,
    edge: EdgeId,
}

impl PartialEq for CollapseCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CollapseCandidate {}

impl PartialOrd for CollapseCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollapseCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; older edges win ties
        other
            .length
            .partial_cmp(&self.length)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

impl Detail<'_> {
    /// Contract `e` into its origin, which moves to the midpoint. Triangles
    /// on either side collapse and their remaining edges are merged. Refused
    /// (None) when the two ends share a neighbour outside those triangles or
    /// a face other than the two beside `e`, when an interior edge joins two
    /// boundary points, or when four points or fewer remain.
    pub fn dec_collapse(&mut self, e: EdgeId) -> Option<PointId> {
        if !self.edges.is_alive(e) {
            return None;
        }
        let e = if e.is_primal() { e } else { e.rot() };
        let (a, b) = (self.org(e)?, self.dest(e)?);
        if a == b || self.num_points() <= 4 || self.is_bridge(e) {
            return None;
        }
        let ring_a = self.point_edges(a);
        let ring_b = self.point_edges(b);
        if ring_a.len() < 2 || ring_b.len() < 2 {
            return None;
        }

        let limit = self.config.max_ring_walk;
        let mut allowed: AHashSet<PointId> = AHashSet::new();
        for side in [e, e.sym()] {
            if self.edges.left_ring(side, limit).len() == 3 {
                allowed.extend(self.dest(self.edges.lnext(side)));
            }
        }
        let around_a: AHashSet<PointId> = ring_a.iter().filter_map(|&r| self.dest(r)).collect();
        let link_broken = ring_b
            .iter()
            .filter_map(|&r| self.dest(r))
            .any(|q| q != a && around_a.contains(&q) && !allowed.contains(&q));
        if link_broken {
            trace!("collapse of {} refused: link condition", e);
            return None;
        }
        let (lf, rf) = (self.left(e), self.right(e));
        let faces_a: AHashSet<FaceId> = self.point_faces(a).into_iter().collect();
        if self
            .point_faces(b)
            .into_iter()
            .any(|f| Some(f) != lf && Some(f) != rf && faces_a.contains(&f))
        {
            trace!("collapse of {} refused: would pinch a face", e);
            return None;
        }
        let touches_hole = |ring: &[EdgeId]| ring.iter().any(|&r| self.left(r).is_none());
        if self.is_share(e) && touches_hole(&ring_a) && touches_hole(&ring_b) {
            return None;
        }

        let (oa, ob) = (self.point(a).offset(), self.point(b).offset());
        let mid = lerp_point(&self.position(a), &self.position(b), 0.5);
        let map = AttributeRefMap::new(&*self.mesh, AttributeOwner::Point);
        if !map.is_empty() {
            map.lerp(&mut *self.mesh, oa, oa, ob, 0.5);
        }
        self.set_position(a, mid);

        self.weights.remove(&edge_key(a, b));
        for &r in &ring_b {
            if let Some(q) = self.dest(r) {
                if let Some(w) = self.weights.remove(&edge_key(b, q)) {
                    let entry = self.weights.entry(edge_key(a, q)).or_insert(0.0);
                    *entry = entry.max(w);
                }
            }
        }

        let (ln, rn) = (self.edges.lnext(e), self.edges.lnext(e.sym()));
        let x = self.edges.oprev(e);
        let y = self.edges.oprev(e.sym());
        for &r in &ring_b {
            self.edges.set_org(r, Some(a));
        }
        self.edges.splice(e, x);
        self.edges.splice(e.sym(), y);
        self.edges.splice(x, y);
        self.edges.kill(e);
        self.points[a.index()].set_edge(Some(x));
        self.kill_point(b);

        for (f, anchor) in [(lf, ln), (rf, rn)] {
            if let Some(f) = f {
                self.faces[f.index()].set_edge(Some(anchor));
            }
        }
        for anchor in [ln, rn] {
            if self.edges.is_alive(anchor) && self.edges.left_ring(anchor, limit).len() == 2 {
                self.zip_digon(anchor);
            }
        }
        for f in self.point_faces(a) {
            self.faces[f.index()].invalidate_normal();
        }
        trace!("collapsed {} into {}", e, a);
        Some(a)
    }

    /// Merge the two edges of a two-sided loop into `r1`; the loop's face
    /// is removed and `r1` takes the place of its partner.
    fn zip_digon(&mut self, r1: EdgeId) {
        let r2 = self.edges.lnext(r1);
        let digon = self.left(r1);
        let outer = self.right(r2);
        let (a, c) = (self.org(r1), self.dest(r1));
        for r in [r2, r2.sym()] {
            let prev = self.edges.oprev(r);
            if prev != r {
                self.edges.splice(r, prev);
            }
        }
        self.edges.kill(r2);
        self.relabel_loop(r1, outer);
        if let Some(f) = digon {
            if Some(f) != outer {
                self.kill_face(f);
            }
        }
        if let Some(a) = a {
            self.points[a.index()].set_edge(Some(r1));
        }
        if let Some(c) = c {
            self.points[c.index()].set_edge(Some(r1.sym()));
        }
    }

    /// Bisect `e`, joining the new point to the far corner of each adjacent
    /// triangle
    pub fn dec_split(&mut self, e: EdgeId) -> Option<PointId> {
        if !self.edges.is_alive(e) {
            return None;
        }
        let e = if e.is_primal() { e } else { e.rot() };
        let limit = self.config.max_ring_walk;
        let mut opposite = Vec::with_capacity(2);
        for side in [e, e.sym()] {
            if let Some(f) = self.left(side) {
                if self.edges.left_ring(side, limit).len() == 3 {
                    if let Some(p) = self.dest(self.edges.lnext(side)) {
                        opposite.push((f, p));
                    }
                }
            }
        }
        let m = self.split_edge(e, 0.5)?;
        for (f, p) in opposite {
            self.connect_points(f, m, p);
        }
        trace!("split {} at {}", e, m);
        Some(m)
    }

    /// Flip the diagonal shared by two triangles. False when either side is
    /// not a triangle or the flipped diagonal already exists.
    pub fn dec_swap(&mut self, e: EdgeId) -> bool {
        if !self.edges.is_alive(e) {
            return false;
        }
        let e = if e.is_primal() { e } else { e.rot() };
        let (Some(l), Some(r)) = (self.left(e), self.right(e)) else {
            return false;
        };
        let limit = self.config.max_ring_walk;
        if l == r || self.edges.left_ring(e, limit).len() != 3 || self.edges.left_ring(e.sym(), limit).len() != 3 {
            return false;
        }
        let c = self.dest(self.edges.lnext(e));
        let d = self.dest(self.edges.lnext(e.sym()));
        let (Some(c), Some(d)) = (c, d) else {
            return false;
        };
        if c == d || self.find_edge(c, d).is_some() {
            return false;
        }

        let (pa, pb) = (self.org(e), self.dest(e));
        let x = self.edges.oprev(e);
        let y = self.edges.oprev(e.sym());
        self.edges.swap(e);
        self.relabel_loop(e, Some(l));
        self.relabel_loop(e.sym(), Some(r));
        if let (Some(pa), Some(pb)) = (pa, pb) {
            self.points[pa.index()].set_edge(Some(x));
            self.points[pb.index()].set_edge(Some(y));
            self.weights.remove(&edge_key(pa, pb));
        }
        trace!("swapped {} to {} - {}", e, d, c);
        true
    }

    /// Collapse shortest edges until `target` faces remain. A collapse that
    /// would drop below the target is skipped, so the count never
    /// overshoots. Returns the number of faces removed.
    pub fn simple_decimate(&mut self, target: usize) -> usize {
        let start = self.num_faces();
        let limit = self.config.max_ring_walk;
        let mut heap: BinaryHeap<CollapseCandidate> = self
            .edges()
            .map(|edge| CollapseCandidate {
                length: self.edge_length(edge),
                edge,
            })
            .collect();

        while self.num_faces() > target {
            let Some(cand) = heap.pop() else {
                break;
            };
            if !self.edges.is_alive(cand.edge) {
                continue;
            }
            let length = self.edge_length(cand.edge);
            if (length - cand.length).abs() > 1e-12 {
                heap.push(CollapseCandidate { length, ..cand });
                continue;
            }
            let removed = [cand.edge, cand.edge.sym()]
                .into_iter()
                .filter(|&side| self.left(side).is_some() && self.edges.left_ring(side, limit).len() == 3)
                .count();
            if self.num_faces() < target + removed {
                continue;
            }
            if let Some(p) = self.dec_collapse(cand.edge) {
                for r in self.point_edges(p) {
                    heap.push(CollapseCandidate {
                        length: self.edge_length(r),
                        edge: r.canonical(),
                    });
                }
            }
        }

        let removed = start.saturating_sub(self.num_faces());
        debug!("decimated {} -> {} faces (target {})", start, self.num_faces(), target);
        removed
    }
}
