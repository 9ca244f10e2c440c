// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Cusping: break shading continuity across sharp edges

use super::detail::{edge_key, Detail, FaceLoop, PointRecipe};
use super::quadedge::{EdgeFlags, EdgeId, FaceId, PointId};
use crate::geometry::EdgeGroup;
use crate::utils::math::angle_between_deg;
use ahash::{AHashMap, AHashSet};
use log::debug;
use nalgebra::Vector3;

/// Face corners around a point that shade together: (face, corner record)
type Sector = Vec<(FaceId, EdgeId)>;

impl Detail<'_> {
    /// Cusp every shared edge whose dihedral angle exceeds `angle` degrees.
    ///
    /// In cut mode each extra sector around a point gets its own copy of the
    /// point. With `no_cut` the topology is untouched and each corner gets
    /// the normal of its sector, written to the `N` vertex attribute by
    /// [`Detail::build_geometry`]. Sharp edges are flagged `EDGE` either way.
    /// Returns the number of extra sectors (points added in cut mode).
    pub fn cusp(&mut self, angle: f64, no_cut: bool) -> usize {
        let normals = self.all_face_normals();
        let sharp: AHashSet<EdgeId> = self
            .edges()
            .filter(|&e| self.is_share(e))
            .filter(|&e| match (self.left(e), self.right(e)) {
                (Some(l), Some(r)) => angle_between_deg(&normals[l.index()], &normals[r.index()]) > angle,
                _ => false,
            })
            .collect();
        self.cusp_sharp(sharp, no_cut)
    }

    /// Cusp along an explicit group of edges instead of an angle test
    pub fn cusp_edges(&mut self, group: &EdgeGroup, no_cut: bool) -> usize {
        let sharp: AHashSet<EdgeId> = self
            .edges()
            .filter(|&e| match (self.org(e), self.dest(e)) {
                (Some(a), Some(b)) => group.contains(self.point(a).offset(), self.point(b).offset()),
                _ => false,
            })
            .collect();
        self.cusp_sharp(sharp, no_cut)
    }

    pub(crate) fn all_face_normals(&mut self) -> Vec<Vector3<f64>> {
        (0..self.faces.len())
            .map(|i| {
                let f = FaceId(i as u32);
                if self.face(f).is_alive() {
                    self.face_normal(f)
                } else {
                    Vector3::zeros()
                }
            })
            .collect()
    }

    fn cusp_sharp(&mut self, sharp: AHashSet<EdgeId>, no_cut: bool) -> usize {
        let normals = self.all_face_normals();
        let mut sharp_keys: AHashSet<(PointId, PointId)> = AHashSet::new();
        for &e in &sharp {
            self.edges.set_edge_flag(e, EdgeFlags::EDGE);
            if let (Some(a), Some(b)) = (self.org(e), self.dest(e)) {
                sharp_keys.insert(edge_key(a, b));
            }
        }

        let mut extra = 0;
        let mut substitute: AHashMap<(FaceId, EdgeId), PointId> = AHashMap::new();
        for p in self.points().collect::<Vec<_>>() {
            let sectors = self.point_sectors(p, &sharp);
            extra += sectors.len().saturating_sub(1);
            if no_cut {
                for sector in &sectors {
                    let sum: Vector3<f64> = sector.iter().map(|(f, _)| normals[f.index()]).sum();
                    let n = sum.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros);
                    for &(f, _) in sector {
                        self.corner_normals.insert((f, p), n);
                    }
                }
            } else {
                for sector in sectors.iter().skip(1) {
                    let q = self.add_point(self.position(p), Some(PointRecipe::Alias(p)));
                    for &corner in sector {
                        substitute.insert(corner, q);
                    }
                }
            }
        }

        if !no_cut && !substitute.is_empty() {
            let loops: Vec<FaceLoop> = self
                .faces()
                .map(|f| {
                    let points = self
                        .face_edges(f)
                        .into_iter()
                        .filter_map(|r| substitute.get(&(f, r)).copied().or_else(|| self.org(r)))
                        .collect();
                    let face = self.face(f);
                    FaceLoop::new(points, face.prim()).with_flags(face.flags())
                })
                .collect();
            self.rebuild_faces(loops);

            for e in self.edges().collect::<Vec<_>>() {
                if let (Some(a), Some(b)) = (self.org(e), self.dest(e)) {
                    if sharp_keys.contains(&edge_key(self.alias_root(a), self.alias_root(b))) {
                        self.edges.set_edge_flag(e, EdgeFlags::EDGE);
                    }
                }
            }
        }

        debug!(
            "cusp: {} sharp edges, {} extra sectors ({})",
            sharp.len(),
            extra,
            if no_cut { "normals" } else { "cut" }
        );
        extra
    }

    /// Point a copy was made from, following alias recipes
    pub(crate) fn alias_root(&self, mut p: PointId) -> PointId {
        while let Some(PointRecipe::Alias(src)) = self.recipes.get(&p) {
            p = *src;
        }
        p
    }

    /// Group the corners around `p` into runs separated by sharp or
    /// boundary edges. Fewer than two separators leave a single sector.
    fn point_sectors(&self, p: PointId, sharp: &AHashSet<EdgeId>) -> Vec<Sector> {
        let ring = self.point_edges(p);
        let k = ring.len();
        if k == 0 {
            return Vec::new();
        }
        let slot_face: Vec<Option<FaceId>> = ring.iter().map(|&r| self.left(r)).collect();
        let cuts: Vec<usize> = (0..k)
            .filter(|&i| {
                let r = ring[i];
                let prev_face = slot_face[(i + k - 1) % k];
                sharp.contains(&r.canonical()) || slot_face[i].is_none() || prev_face.is_none()
            })
            .collect();

        let start = cuts.first().copied().unwrap_or(0);
        let mut sectors: Vec<Sector> = Vec::new();
        let mut current: Sector = Vec::new();
        for step in 0..k {
            let i = (start + step) % k;
            if step > 0 && cuts.len() >= 2 && cuts.contains(&i) && !current.is_empty() {
                sectors.push(std::mem::take(&mut current));
            }
            if let Some(f) = slot_face[i] {
                current.push((f, ring[i]));
            }
        }
        if !current.is_empty() {
            sectors.push(current);
        }
        sectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{AttributeOwner, Primitive};
    use approx::assert_relative_eq;

    #[test]
    fn test_cusp_cube_cut_duplicates_every_corner() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            assert_eq!(detail.cusp(0.0, false), 16);
            detail.validate().unwrap();
            assert_eq!(detail.num_points(), 24);
            assert!(detail.edges().all(|e| detail.arena().has_flag(e, EdgeFlags::EDGE)));
            detail.build_geometry();
        }
        assert_eq!(mesh.point_count(), 24);
        assert_eq!(mesh.polygon_count(), 6);
    }

    #[test]
    fn test_cusp_threshold_above_dihedral_keeps_points() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        assert_eq!(detail.cusp(100.0, false), 0);
        assert_eq!(detail.num_points(), 8);
    }

    #[test]
    fn test_cusp_no_cut_writes_face_normals() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            assert_eq!(detail.cusp(30.0, true), 16);
            assert_eq!(detail.num_points(), 8);
            detail.build_geometry();
        }
        let normals = mesh.attribute(AttributeOwner::Vertex, "N").unwrap();
        for prim in mesh.polygons() {
            let expected = mesh.polygon_normal(prim);
            for &v in mesh.polygon_vertices(prim) {
                assert_relative_eq!(normals.get_vector3(v), expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_cusp_edge_group_around_one_face() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let top = mesh.polygon_points(0);
        let group: EdgeGroup = (0..4).map(|i| (top[i], top[(i + 1) % 4])).collect();
        let mut detail = Detail::from_mesh(&mut mesh);
        assert_eq!(detail.cusp_edges(&group, false), 4);
        detail.validate().unwrap();
        assert_eq!(detail.num_points(), 12);
    }
}
