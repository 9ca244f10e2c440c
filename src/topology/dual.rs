// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Dual construction: points become faces and faces become points

use super::detail::Detail;
use super::quadedge::FaceId;
use crate::geometry::{AttributeOwner, AttributeRefMap, PrimitiveGroup};
use crate::utils::math::centroid;
use ahash::{AHashMap, AHashSet};
use log::debug;

impl Detail<'_> {
    /// Replace the mesh by its dual. Each face contributes a point at its
    /// centroid and each interior point a polygon through the centroids of
    /// its faces, wound like the faces around it. Boundary points have no
    /// dual polygon. Point and primitive attributes named in
    /// `attribs_to_swap` trade places. The Detail is rebuilt on the result;
    /// returns the number of dual polygons.
    pub fn dual(&mut self, attribs_to_swap: &[&str]) -> usize {
        let report = self.build_geometry();
        let point_map = AttributeRefMap::with_names(&*self.mesh, AttributeOwner::Point, attribs_to_swap);
        let prim_map = AttributeRefMap::with_names(&*self.mesh, AttributeOwner::Primitive, attribs_to_swap);

        let mut face_point: AHashMap<FaceId, usize> = AHashMap::new();
        for f in self.faces().collect::<Vec<_>>() {
            let positions = self.face_positions(f);
            if positions.len() < 3 {
                continue;
            }
            let offset = self.mesh.add_point(centroid(&positions));
            if let Some(prim) = report.prim_of(f) {
                if !prim_map.is_empty() {
                    prim_map.copy_across(&mut *self.mesh, AttributeOwner::Point, offset, prim);
                }
            }
            face_point.insert(f, offset);
        }

        let mut created = PrimitiveGroup::new();
        for p in self.points().collect::<Vec<_>>() {
            let ring = self.point_edges(p);
            if ring.len() < 3 {
                continue;
            }
            let corners: Option<Vec<usize>> = ring
                .iter()
                .map(|&r| self.left(r).and_then(|f| face_point.get(&f).copied()))
                .collect();
            let Some(corners) = corners else {
                continue;
            };
            let prim = self.mesh.add_polygon(&corners);
            if !point_map.is_empty() {
                let offset = self.point(p).offset();
                point_map.copy_across(&mut *self.mesh, AttributeOwner::Primitive, prim, offset);
            }
            created.insert(prim);
        }

        for prim in self.source_prims.iter().copied().collect::<Vec<_>>() {
            if self.mesh.is_polygon_alive(prim) {
                self.mesh.remove_polygon(prim);
            }
        }
        let used: AHashSet<usize> = self
            .mesh
            .polygons()
            .flat_map(|prim| self.mesh.polygon_points(prim))
            .collect();
        let stale: Vec<usize> = self
            .points()
            .map(|p| self.point(p).offset())
            .filter(|off| !used.contains(off))
            .collect();
        for offset in stale {
            self.mesh.remove_point(offset);
        }

        if self.group.is_some() {
            self.group = Some(created.clone());
        }
        self.reload();
        debug!("dual: {} points, {} faces", self.num_points(), created.len());
        created.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;

    #[test]
    fn test_cube_dual_is_octahedral() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            assert_eq!(detail.dual(&[]), 8);
            detail.validate().unwrap();
            assert_eq!(detail.num_points(), 6);
            assert_eq!(detail.num_edges(), 12);
            for f in detail.faces().collect::<Vec<_>>() {
                assert_eq!(detail.face_edge_count(f), 3);
            }
            for p in detail.points().collect::<Vec<_>>() {
                assert_eq!(detail.point_degree(p), 4);
            }
        }
        assert_eq!(mesh.point_count(), 6);
        assert_eq!(mesh.polygon_count(), 8);
    }

    #[test]
    fn test_dual_twice_restores_cube_adjacency() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        detail.dual(&[]);
        assert_eq!(detail.dual(&[]), 6);
        detail.validate().unwrap();
        assert!(detail.is_closed());
        assert_eq!(detail.num_points(), 8);
        assert_eq!(detail.num_edges(), 12);
        for p in detail.points().collect::<Vec<_>>() {
            assert_eq!(detail.point_degree(p), 3);
        }
        // Dual faces keep the outward winding
        for f in detail.faces().collect::<Vec<_>>() {
            let c = centroid(&detail.face_positions(f));
            assert!(detail.face_normal(f).dot(&c.coords) > 0.0);
        }
    }

    #[test]
    fn test_open_grid_dual_uses_interior_points() {
        let mut mesh = Primitive::grid(2.0, 2, 2).to_mesh();
        let mut detail = Detail::from_mesh(&mut mesh);
        assert_eq!(detail.dual(&[]), 1);
        let f = detail.faces().next().unwrap();
        assert_eq!(detail.face_edge_count(f), 4);
    }

    #[test]
    fn test_dual_swaps_named_attributes() {
        let mut mesh = Primitive::cube(2.0).to_mesh();
        let count = mesh.polygon_count();
        {
            let attr = mesh.add_attribute(AttributeOwner::Primitive, "piece", 1, &[0.0]);
            for prim in 0..count {
                attr.set_scalar(prim, prim as f64);
            }
        }
        {
            let mut detail = Detail::from_mesh(&mut mesh);
            detail.dual(&["piece"]);
        }
        let attr = mesh.attribute(AttributeOwner::Point, "piece").unwrap();
        let mut values: Vec<f64> = mesh.points().map(|p| attr.get_scalar(p)).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
