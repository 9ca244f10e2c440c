// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Quad-edge records and the navigation algebra
//!
//! An undirected edge is stored as four consecutive records (a "quad"): the
//! primal edge, its rotation, its symmetric and its inverse rotation. Records
//! are addressed by `EdgeId = quad * 4 + quadrant`, so `rot`, `sym` and `irot`
//! are index arithmetic and only `onext` is stored. Quadrants 0 and 2 carry a
//! point origin, quadrants 1 and 3 a face origin.
//!
//! Quads are never reused after being killed, which keeps `EdgeId` order equal
//! to creation order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directed edge record handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Topology point handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub u32);

/// Topology face handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl EdgeId {
    pub fn new(quad: usize, quadrant: u32) -> Self {
        EdgeId(quad as u32 * 4 + (quadrant & 3))
    }

    pub fn quad(self) -> usize {
        (self.0 >> 2) as usize
    }

    pub fn quadrant(self) -> u32 {
        self.0 & 3
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// True for point-origin (primal) records
    pub fn is_primal(self) -> bool {
        self.0 & 1 == 0
    }

    /// Quadrant 0 record of the same quad
    pub fn canonical(self) -> EdgeId {
        EdgeId(self.0 & !3)
    }

    pub fn rot(self) -> EdgeId {
        EdgeId((self.0 & !3) | ((self.0 + 1) & 3))
    }

    pub fn sym(self) -> EdgeId {
        EdgeId((self.0 & !3) | ((self.0 + 2) & 3))
    }

    pub fn irot(self) -> EdgeId {
        EdgeId((self.0 & !3) | ((self.0 + 3) & 3))
    }
}

impl PointId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FaceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}.{}", self.quad(), self.quadrant())
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Origin payload of a record, keyed by quadrant parity.
/// A `Face(None)` origin is the hole outside a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Point(Option<PointId>),
    Face(Option<FaceId>),
}

/// Advisory per-record bit flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeFlags(pub u32);

impl EdgeFlags {
    pub const NONE: EdgeFlags = EdgeFlags(0);
    pub const BRIDGE: EdgeFlags = EdgeFlags(1 << 0);
    pub const INTERSECT: EdgeFlags = EdgeFlags(1 << 1);
    pub const INSIDE: EdgeFlags = EdgeFlags(1 << 2);
    pub const OUTSIDE: EdgeFlags = EdgeFlags(1 << 3);
    pub const VISIT: EdgeFlags = EdgeFlags(1 << 4);
    pub const DELETE: EdgeFlags = EdgeFlags(1 << 5);
    pub const NEW: EdgeFlags = EdgeFlags(1 << 6);
    pub const GLUE: EdgeFlags = EdgeFlags(1 << 7);
    pub const SELECTED: EdgeFlags = EdgeFlags(1 << 8);
    pub const VTXBOUNDARY: EdgeFlags = EdgeFlags(1 << 9);
    pub const EDGE: EdgeFlags = EdgeFlags(1 << 10);
    pub const CORNER: EdgeFlags = EdgeFlags(1 << 11);

    /// Scratch bits reset between independent passes
    pub const SCRATCH: EdgeFlags = EdgeFlags(
        Self::INTERSECT.0
            | Self::INSIDE.0
            | Self::OUTSIDE.0
            | Self::VISIT.0
            | Self::DELETE.0
            | Self::NEW.0
            | Self::GLUE.0
            | Self::SELECTED.0
            | Self::VTXBOUNDARY.0
            | Self::CORNER.0,
    );

    pub fn contains(self, other: EdgeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: EdgeFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: EdgeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EdgeFlags) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for EdgeFlags {
    type Output = EdgeFlags;

    fn bitor(self, rhs: EdgeFlags) -> EdgeFlags {
        EdgeFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Record {
    origin: Origin,
    next: EdgeId,
    flags: EdgeFlags,
}

/// Arena of quad-edges
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuadEdgeArena {
    records: Vec<Record>,
    alive: Vec<bool>,
}

impl QuadEdgeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(quads: usize) -> Self {
        Self {
            records: Vec::with_capacity(quads * 4),
            alive: Vec::with_capacity(quads),
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.alive.clear();
    }

    /// Create an isolated edge: a sphere cut by one edge into one face.
    /// Returns the quadrant 0 record.
    pub fn make_edge(&mut self) -> EdgeId {
        let quad = self.alive.len();
        self.alive.push(true);
        let e = EdgeId::new(quad, 0);
        for quadrant in 0..4 {
            let origin = if quadrant % 2 == 0 {
                Origin::Point(None)
            } else {
                Origin::Face(None)
            };
            self.records.push(Record {
                origin,
                next: e,
                flags: EdgeFlags::NONE,
            });
        }
        self.init(quad);
        e
    }

    /// Reset the rings of a quad to the single-edge topology
    pub fn init(&mut self, quad: usize) {
        let e = EdgeId::new(quad, 0);
        self.records[e.index()].next = e;
        self.records[e.sym().index()].next = e.sym();
        self.records[e.rot().index()].next = e.irot();
        self.records[e.irot().index()].next = e.rot();
    }

    /// Mark a quad dead. The caller must have disconnected it first.
    pub fn kill(&mut self, e: EdgeId) {
        if let Some(alive) = self.alive.get_mut(e.quad()) {
            *alive = false;
        }
    }

    pub fn is_alive(&self, e: EdgeId) -> bool {
        self.alive.get(e.quad()).copied().unwrap_or(false)
    }

    /// Number of quads ever allocated
    pub fn quad_count(&self) -> usize {
        self.alive.len()
    }

    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    /// Quadrant 0 records of live quads in creation order
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, a)| **a)
            .map(|(q, _)| EdgeId::new(q, 0))
    }

    /// Primal records (both directions) of live quads in creation order
    pub fn directed_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges().flat_map(|e| [e, e.sym()])
    }

    pub fn onext(&self, e: EdgeId) -> EdgeId {
        self.records[e.index()].next
    }

    pub fn oprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e.rot()).rot()
    }

    pub fn dnext(&self, e: EdgeId) -> EdgeId {
        self.onext(e.sym()).sym()
    }

    pub fn dprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e.irot()).irot()
    }

    pub fn lnext(&self, e: EdgeId) -> EdgeId {
        self.onext(e.irot()).rot()
    }

    pub fn lprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e).sym()
    }

    pub fn rnext(&self, e: EdgeId) -> EdgeId {
        self.onext(e.rot()).irot()
    }

    pub fn rprev(&self, e: EdgeId) -> EdgeId {
        self.onext(e.sym())
    }

    pub fn set_onext(&mut self, e: EdgeId, next: EdgeId) {
        self.records[e.index()].next = next;
    }

    pub fn origin(&self, e: EdgeId) -> Origin {
        self.records[e.index()].origin
    }

    pub fn org(&self, e: EdgeId) -> Option<PointId> {
        match self.records[e.index()].origin {
            Origin::Point(p) => p,
            Origin::Face(_) => None,
        }
    }

    pub fn dest(&self, e: EdgeId) -> Option<PointId> {
        self.org(e.sym())
    }

    /// Face on the left of a primal record; `None` is a hole
    pub fn left(&self, e: EdgeId) -> Option<FaceId> {
        match self.records[e.irot().index()].origin {
            Origin::Face(f) => f,
            Origin::Point(_) => None,
        }
    }

    pub fn right(&self, e: EdgeId) -> Option<FaceId> {
        match self.records[e.rot().index()].origin {
            Origin::Face(f) => f,
            Origin::Point(_) => None,
        }
    }

    pub fn set_org(&mut self, e: EdgeId, p: Option<PointId>) {
        debug_assert!(e.is_primal());
        self.records[e.index()].origin = Origin::Point(p);
    }

    pub fn set_dest(&mut self, e: EdgeId, p: Option<PointId>) {
        self.set_org(e.sym(), p);
    }

    pub fn set_left(&mut self, e: EdgeId, f: Option<FaceId>) {
        self.records[e.irot().index()].origin = Origin::Face(f);
    }

    pub fn set_right(&mut self, e: EdgeId, f: Option<FaceId>) {
        self.records[e.rot().index()].origin = Origin::Face(f);
    }

    pub fn flags(&self, e: EdgeId) -> EdgeFlags {
        self.records[e.index()].flags
    }

    pub fn has_flag(&self, e: EdgeId, flag: EdgeFlags) -> bool {
        self.records[e.index()].flags.intersects(flag)
    }

    pub fn set_flag(&mut self, e: EdgeId, flag: EdgeFlags) {
        self.records[e.index()].flags.insert(flag);
    }

    pub fn clear_flag(&mut self, e: EdgeId, flag: EdgeFlags) {
        self.records[e.index()].flags.remove(flag);
    }

    /// Set a flag on both directions of an undirected edge
    pub fn set_edge_flag(&mut self, e: EdgeId, flag: EdgeFlags) {
        self.set_flag(e, flag);
        self.set_flag(e.sym(), flag);
    }

    pub fn clear_edge_flag(&mut self, e: EdgeId, flag: EdgeFlags) {
        self.clear_flag(e, flag);
        self.clear_flag(e.sym(), flag);
    }

    /// Clear a flag on every record
    pub fn clear_all_flags(&mut self, flag: EdgeFlags) {
        for r in &mut self.records {
            r.flags.remove(flag);
        }
    }

    /// Merge the origin rings of `a` and `b` when distinct, split them when
    /// shared. The left-face rings are cut or joined correspondingly.
    /// Applying the same splice twice restores the original rings.
    pub fn splice(&mut self, a: EdgeId, b: EdgeId) {
        let alpha = self.onext(a).rot();
        let beta = self.onext(b).rot();

        let t1 = self.onext(b);
        let t2 = self.onext(a);
        let t3 = self.onext(beta);
        let t4 = self.onext(alpha);

        self.set_onext(a, t1);
        self.set_onext(b, t2);
        self.set_onext(alpha, t3);
        self.set_onext(beta, t4);
    }

    /// New edge from `dest(a)` to `org(b)` with `a` and `b` on its left.
    /// Both sides are labelled with `left(a)`; relabelling a split face is up
    /// to the caller.
    pub fn connect(&mut self, a: EdgeId, b: EdgeId) -> EdgeId {
        let e = self.make_edge();
        let a_dest = self.dest(a);
        let b_org = self.org(b);
        let face = self.left(a);
        let a_lnext = self.lnext(a);
        self.splice(e, a_lnext);
        self.splice(e.sym(), b);
        self.set_org(e, a_dest);
        self.set_dest(e, b_org);
        self.set_left(e, face);
        self.set_right(e, face);
        e
    }

    /// Detach `e` from both of its origin rings
    pub fn disconnect(&mut self, e: EdgeId) {
        self.disconnect_org(e);
        self.disconnect_org(e.sym());
    }

    /// Detach `e` from the ring around its origin only
    pub fn disconnect_org(&mut self, e: EdgeId) {
        let prev = self.oprev(e);
        if prev != e {
            self.splice(e, prev);
        }
    }

    /// Rotate `e` inside the quadrilateral formed by its two adjacent faces.
    /// Face labels of the surrounding records are left to the caller.
    pub fn swap(&mut self, e: EdgeId) {
        let a = self.oprev(e);
        let b = self.oprev(e.sym());
        self.splice(e, a);
        self.splice(e.sym(), b);
        let a_lnext = self.lnext(a);
        let b_lnext = self.lnext(b);
        self.splice(e, a_lnext);
        self.splice(e.sym(), b_lnext);
        let a_dest = self.dest(a);
        let b_dest = self.dest(b);
        self.set_org(e, a_dest);
        self.set_dest(e, b_dest);
    }

    /// Records of the origin ring of `e`, starting at `e`. Stops after
    /// `limit` steps when the ring does not close.
    pub fn org_ring(&self, e: EdgeId, limit: usize) -> Vec<EdgeId> {
        self.collect_ring(e, limit, |arena, x| arena.onext(x))
    }

    /// Records of the left loop of `e`, starting at `e`
    pub fn left_ring(&self, e: EdgeId, limit: usize) -> Vec<EdgeId> {
        self.collect_ring(e, limit, |arena, x| arena.lnext(x))
    }

    fn collect_ring<F>(&self, start: EdgeId, limit: usize, step: F) -> Vec<EdgeId>
    where
        F: Fn(&Self, EdgeId) -> EdgeId,
    {
        let mut ring = vec![start];
        let mut cur = step(self, start);
        while cur != start && ring.len() < limit {
            ring.push(cur);
            cur = step(self, cur);
        }
        ring
    }

    /// True when walking `onext` from `e` returns to `e` within `limit` steps
    pub fn org_ring_closes(&self, e: EdgeId, limit: usize) -> bool {
        let mut cur = self.onext(e);
        for _ in 0..limit {
            if cur == e {
                return true;
            }
            cur = self.onext(cur);
        }
        false
    }

    pub fn left_ring_closes(&self, e: EdgeId, limit: usize) -> bool {
        let mut cur = self.lnext(e);
        for _ in 0..limit {
            if cur == e {
                return true;
            }
            cur = self.lnext(cur);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_algebra() {
        let e = EdgeId::new(7, 1);
        assert_eq!(e.sym().sym(), e);
        assert_eq!(e.rot().rot().rot().rot(), e);
        assert_eq!(e.irot(), e.rot().rot().rot());
        assert_eq!(e.rot().quad(), 7);
        assert_eq!(e.canonical(), EdgeId::new(7, 0));
    }

    #[test]
    fn test_make_edge_topology() {
        let mut arena = QuadEdgeArena::new();
        let e = arena.make_edge();
        assert_eq!(arena.onext(e), e);
        assert_eq!(arena.onext(e.sym()), e.sym());
        assert_eq!(arena.onext(e.rot()), e.irot());
        assert_eq!(arena.lnext(e), e.sym());
        assert_eq!(arena.oprev(e), e);
        assert!(matches!(arena.origin(e.rot()), Origin::Face(None)));
    }

    #[test]
    fn test_splice_is_an_involution() {
        let mut arena = QuadEdgeArena::new();
        let a = arena.make_edge();
        let b = arena.make_edge();
        arena.splice(a, b);
        assert_eq!(arena.onext(a), b);
        assert_eq!(arena.onext(b), a);
        assert_eq!(arena.org_ring(a, 16).len(), 2);
        arena.splice(a, b);
        assert_eq!(arena.onext(a), a);
        assert_eq!(arena.onext(b), b);
        assert_eq!(arena.onext(a.rot()), a.irot());
    }

    #[test]
    fn test_connect_builds_triangle() {
        let mut arena = QuadEdgeArena::new();
        let p = [PointId(0), PointId(1), PointId(2)];
        let a = arena.make_edge();
        arena.set_org(a, Some(p[0]));
        arena.set_dest(a, Some(p[1]));
        let b = arena.make_edge();
        arena.set_org(b, Some(p[1]));
        arena.set_dest(b, Some(p[2]));
        arena.splice(a.sym(), b);
        let c = arena.connect(b, a);

        assert_eq!(arena.org(c), Some(p[2]));
        assert_eq!(arena.dest(c), Some(p[0]));
        assert_eq!(arena.lnext(a), b);
        assert_eq!(arena.lnext(b), c);
        assert_eq!(arena.lnext(c), a);
        assert!(arena.left_ring_closes(a, 8));
        assert_eq!(arena.left_ring(a, 8).len(), 3);
    }
}
