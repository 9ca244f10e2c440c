// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Stitching: fuse boundary loops that run along each other

use super::detail::{clean_loop, edge_key, Detail, FaceLoop};
use super::quadedge::{EdgeId, PointId};
use crate::config::TopologyConfig;
use crate::geometry::PrimitiveGroup;
use ahash::{AHashMap, AHashSet};
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Stitching parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StitchParms {
    /// Faces whose boundary is stitched; every face when None
    pub group_a: Option<PrimitiveGroup>,
    /// Faces stitched against; every face when None
    pub group_b: Option<PrimitiveGroup>,
    /// Maximum distance between matching endpoints
    pub tolerance: f64,
    /// Move fused points to the average of what they replace
    pub clamp: bool,
    /// Also fuse boundary points of the two sides that are within tolerance
    /// but whose edges did not match
    pub consolidate: bool,
}

impl StitchParms {
    /// Parameters matching within the configured stitch tolerance
    pub fn from_config(config: &TopologyConfig) -> Self {
        Self {
            group_a: None,
            group_b: None,
            tolerance: config.stitch_tolerance,
            clamp: false,
            consolidate: false,
        }
    }
}

impl Default for StitchParms {
    fn default() -> Self {
        Self::from_config(&TopologyConfig::default())
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller root survives
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

type Cell = (i64, i64, i64);

fn cell_of(p: &Point3<f64>, size: f64) -> Cell {
    (
        (p.x / size).floor() as i64,
        (p.y / size).floor() as i64,
        (p.z / size).floor() as i64,
    )
}

fn neighbours(c: Cell) -> impl Iterator<Item = Cell> {
    (-1..=1).flat_map(move |dx| (-1..=1).flat_map(move |dy| (-1..=1).map(move |dz| (c.0 + dx, c.1 + dy, c.2 + dz))))
}

impl Detail<'_> {
    /// Stitch the boundary of `group_a` against the boundary of `group_b`.
    /// Returns the number of boundary edge pairs matched.
    pub fn stitch(&mut self, parms: &StitchParms) -> usize {
        let in_group = |detail: &Self, e: EdgeId, group: &Option<PrimitiveGroup>| match group {
            None => true,
            Some(g) => detail
                .left(e)
                .and_then(|f| detail.face(f).prim())
                .map_or(false, |p| g.contains(p)),
        };
        let boundary = self.boundary();
        let side_a: Vec<EdgeId> = boundary.iter().copied().filter(|&e| in_group(self, e, &parms.group_a)).collect();
        let side_b: Vec<EdgeId> = boundary.iter().copied().filter(|&e| in_group(self, e, &parms.group_b)).collect();
        self.stitch_edges(&side_a, &side_b, parms)
    }

    /// Fuse each face-side boundary record of `a` with an oppositely running
    /// record of `b` whose endpoints lie within tolerance, then rebuild.
    /// Returns the number of pairs matched.
    pub fn stitch_edges(&mut self, a: &[EdgeId], b: &[EdgeId], parms: &StitchParms) -> usize {
        let tol = parms.tolerance.max(0.0);
        let cell = tol.max(1e-12);

        let mut by_org: AHashMap<Cell, Vec<EdgeId>> = AHashMap::new();
        for &eb in b {
            if let Some(p) = self.org(eb) {
                by_org.entry(cell_of(&self.position(p), cell)).or_default().push(eb);
            }
        }

        let mut uf = UnionFind::new(self.points.len());
        let mut used: AHashSet<EdgeId> = AHashSet::new();
        let mut matched = 0;
        for &ea in a {
            if used.contains(&ea) {
                continue;
            }
            let (Some(a0), Some(a1)) = (self.org(ea), self.dest(ea)) else {
                continue;
            };
            let (pa0, pa1) = (self.position(a0), self.position(a1));
            let mut best: Option<(f64, EdgeId)> = None;
            for c in neighbours(cell_of(&pa1, cell)) {
                let Some(list) = by_org.get(&c) else { continue };
                for &eb in list {
                    if eb == ea || eb == ea.sym() || used.contains(&eb) {
                        continue;
                    }
                    let (Some(b0), Some(b1)) = (self.org(eb), self.dest(eb)) else {
                        continue;
                    };
                    let d0 = (self.position(b0) - pa1).norm();
                    let d1 = (self.position(b1) - pa0).norm();
                    if d0 <= tol && d1 <= tol && best.map_or(true, |(bd, _)| d0 + d1 < bd) {
                        best = Some((d0 + d1, eb));
                    }
                }
            }
            if let Some((_, eb)) = best {
                let (Some(b0), Some(b1)) = (self.org(eb), self.dest(eb)) else {
                    continue;
                };
                uf.union(a1.index(), b0.index());
                uf.union(a0.index(), b1.index());
                used.insert(ea);
                used.insert(eb);
                matched += 1;
            }
        }

        if parms.consolidate {
            let mut grid: AHashMap<Cell, Vec<PointId>> = AHashMap::new();
            for &eb in b {
                if let Some(p) = self.org(eb) {
                    grid.entry(cell_of(&self.position(p), cell)).or_default().push(p);
                }
            }
            for &ea in a {
                let Some(p) = self.org(ea) else { continue };
                let pos = self.position(p);
                for c in neighbours(cell_of(&pos, cell)) {
                    for &q in grid.get(&c).into_iter().flatten() {
                        if q != p && (self.position(q) - pos).norm() <= tol {
                            uf.union(p.index(), q.index());
                        }
                    }
                }
            }
        }

        let live: Vec<PointId> = self.points().collect();
        let mut rep: AHashMap<PointId, PointId> = AHashMap::new();
        let mut members: AHashMap<PointId, Vec<PointId>> = AHashMap::new();
        for &p in &live {
            let r = PointId(uf.find(p.index()) as u32);
            if r != p {
                rep.insert(p, r);
                members.entry(r).or_default().push(p);
            }
        }
        if rep.is_empty() {
            return matched;
        }

        if parms.clamp {
            for (&r, list) in &members {
                let sum = list.iter().fold(self.position(r).coords, |acc, &p| acc + self.position(p).coords);
                let avg = Point3::from(sum / (list.len() + 1) as f64);
                self.set_position(r, avg);
            }
        }

        let map = |p: PointId| rep.get(&p).copied().unwrap_or(p);
        let loops: Vec<FaceLoop> = self
            .faces()
            .filter_map(|f| {
                let points = clean_loop(self.face_points(f).into_iter().map(map).collect())?;
                let face = self.face(f);
                Some(FaceLoop::new(points, face.prim()).with_flags(face.flags()))
            })
            .collect();
        let weights: AHashMap<(PointId, PointId), f64> = self
            .weights
            .iter()
            .map(|(&(p, q), &w)| (edge_key(map(p), map(q)), w))
            .collect();

        self.rebuild_faces(loops);
        self.weights = weights;
        for &p in rep.keys() {
            self.kill_point(p);
        }
        debug!("stitched {} edge pairs, fused {} points", matched, rep.len());
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Mesh;
    use approx::assert_relative_eq;

    fn two_squares(gap: f64) -> Mesh {
        let mut mesh = Mesh::new();
        for x0 in [0.0, 1.0 + gap] {
            let pts: Vec<usize> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
                .iter()
                .map(|(x, y)| mesh.add_point(Point3::new(x0 + x, *y, 0.0)))
                .collect();
            mesh.add_polygon(&pts);
        }
        mesh
    }

    #[test]
    fn test_stitch_two_squares() {
        let mut mesh = two_squares(0.0);
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            assert_eq!(detail.num_edges(), 8);
            let parms = StitchParms {
                group_a: Some([0].into_iter().collect()),
                group_b: Some([1].into_iter().collect()),
                ..StitchParms::default()
            };
            assert_eq!(detail.stitch(&parms), 1);
            detail.validate().unwrap();
            assert_eq!(detail.num_points(), 6);
            assert_eq!(detail.num_edges(), 7);
            assert_eq!(detail.edges().filter(|&e| detail.is_share(e)).count(), 1);
            detail.build_geometry();
        }
        assert_eq!(mesh.point_count(), 6);
    }

    #[test]
    fn test_stitch_respects_tolerance() {
        let mut mesh = two_squares(0.01);
        let mut detail = Detail::from_mesh(&mut mesh);
        assert_eq!(detail.stitch(&StitchParms::default()), 0);
        assert_eq!(detail.num_points(), 8);
    }

    #[test]
    fn test_stitch_tolerance_from_config() {
        let config = TopologyConfig {
            stitch_tolerance: 0.02,
            ..TopologyConfig::default()
        };
        assert_eq!(StitchParms::default().tolerance, TopologyConfig::default().stitch_tolerance);

        let mut mesh = two_squares(0.01);
        let mut detail = Detail::new(&mut mesh, None, &config);
        let parms = StitchParms::from_config(detail.config());
        assert_eq!(parms.tolerance, 0.02);
        assert_eq!(detail.stitch(&parms), 1);
        detail.validate().unwrap();
        assert_eq!(detail.num_points(), 6);
    }

    #[test]
    fn test_stitch_clamp_averages() {
        let mut mesh = two_squares(0.01);
        let mut detail = Detail::from_mesh(&mut mesh);
        let parms = StitchParms {
            tolerance: 0.02,
            clamp: true,
            ..StitchParms::default()
        };
        assert_eq!(detail.stitch(&parms), 1);
        detail.validate().unwrap();
        let shared = detail.edges().find(|&e| detail.is_share(e)).unwrap();
        let p = detail.org(shared).unwrap();
        assert_relative_eq!(detail.position(p).x, 1.005, epsilon = 1e-12);
    }

    #[test]
    fn test_consolidate_fuses_corner_touch() {
        // Two squares meeting at a single corner: no edge matches
        let mut mesh = Mesh::new();
        for (x0, y0) in [(0.0, 0.0), (1.0, 1.0)] {
            let pts: Vec<usize> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
                .iter()
                .map(|(x, y)| mesh.add_point(Point3::new(x0 + x, y0 + y, 0.0)))
                .collect();
            mesh.add_polygon(&pts);
        }
        let mut detail = Detail::from_mesh(&mut mesh);
        let parms = StitchParms {
            consolidate: true,
            ..StitchParms::default()
        };
        assert_eq!(detail.stitch(&parms), 0);
        detail.validate().unwrap();
        assert_eq!(detail.num_points(), 7);
    }
}
