// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Host polygon mesh: points, polygons, vertices, attributes and groups
//!
//! Elements are addressed by offsets that stay valid for the lifetime of the
//! mesh. Removing an element marks it dead; nothing is compacted, so the
//! topology engine can keep offsets across edits.

use super::attribute::{Attribute, AttributeOwner, AttributeSet};
use super::group::{EdgeGroup, PointGroup, PrimitiveGroup};
use super::BoundingBox;
use crate::utils::math::polygon_normal;
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed polygon referencing vertex offsets in winding order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<usize>,
    alive: bool,
}

impl Polygon {
    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Polygon mesh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    positions: Vec<Point3<f64>>,
    point_alive: Vec<bool>,
    vertex_points: Vec<usize>,
    polygons: Vec<Polygon>,
    point_attributes: AttributeSet,
    vertex_attributes: AttributeSet,
    primitive_attributes: AttributeSet,
    point_groups: BTreeMap<String, PointGroup>,
    primitive_groups: BTreeMap<String, PrimitiveGroup>,
    edge_groups: BTreeMap<String, EdgeGroup>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(point_count: usize, polygon_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(point_count),
            point_alive: Vec::with_capacity(point_count),
            polygons: Vec::with_capacity(polygon_count),
            ..Self::default()
        }
    }

    /// Add a point and return its offset
    pub fn add_point(&mut self, position: Point3<f64>) -> usize {
        let offset = self.positions.len();
        self.positions.push(position);
        self.point_alive.push(true);
        self.point_attributes.push_default();
        offset
    }

    /// Add a vertex referencing `point` and return its offset
    pub fn add_vertex(&mut self, point: usize) -> usize {
        let offset = self.vertex_points.len();
        self.vertex_points.push(point);
        self.vertex_attributes.push_default();
        offset
    }

    /// Add a polygon over the given point offsets, creating one vertex per corner
    pub fn add_polygon(&mut self, points: &[usize]) -> usize {
        let vertices: Vec<usize> = points.iter().map(|&p| self.add_vertex(p)).collect();
        self.add_polygon_vertices(vertices)
    }

    /// Add a polygon over existing vertex offsets
    pub fn add_polygon_vertices(&mut self, vertices: Vec<usize>) -> usize {
        let offset = self.polygons.len();
        self.polygons.push(Polygon {
            vertices,
            alive: true,
        });
        self.primitive_attributes.push_default();
        offset
    }

    /// Replace the corner list of a polygon
    pub fn set_polygon_vertices(&mut self, prim: usize, vertices: Vec<usize>) {
        self.polygons[prim].vertices = vertices;
    }

    pub fn remove_polygon(&mut self, prim: usize) {
        if let Some(poly) = self.polygons.get_mut(prim) {
            poly.alive = false;
            poly.vertices.clear();
        }
        for group in self.primitive_groups.values_mut() {
            group.remove(prim);
        }
    }

    pub fn remove_point(&mut self, point: usize) {
        if let Some(alive) = self.point_alive.get_mut(point) {
            *alive = false;
        }
        for group in self.point_groups.values_mut() {
            group.remove(point);
        }
    }

    pub fn position(&self, point: usize) -> Point3<f64> {
        self.positions[point]
    }

    pub fn set_position(&mut self, point: usize, position: Point3<f64>) {
        self.positions[point] = position;
    }

    pub fn is_point_alive(&self, point: usize) -> bool {
        self.point_alive.get(point).copied().unwrap_or(false)
    }

    pub fn is_polygon_alive(&self, prim: usize) -> bool {
        self.polygons.get(prim).map(|p| p.alive).unwrap_or(false)
    }

    pub fn polygon(&self, prim: usize) -> &Polygon {
        &self.polygons[prim]
    }

    pub fn polygon_vertices(&self, prim: usize) -> &[usize] {
        &self.polygons[prim].vertices
    }

    /// Point offsets of a polygon's corners in winding order
    pub fn polygon_points(&self, prim: usize) -> Vec<usize> {
        self.polygons[prim]
            .vertices
            .iter()
            .map(|&v| self.vertex_points[v])
            .collect()
    }

    pub fn polygon_positions(&self, prim: usize) -> Vec<Point3<f64>> {
        self.polygons[prim]
            .vertices
            .iter()
            .map(|&v| self.positions[self.vertex_points[v]])
            .collect()
    }

    pub fn polygon_normal(&self, prim: usize) -> Vector3<f64> {
        polygon_normal(&self.polygon_positions(prim))
    }

    pub fn vertex_point(&self, vertex: usize) -> usize {
        self.vertex_points[vertex]
    }

    /// Live point offsets in ascending order
    pub fn points(&self) -> impl Iterator<Item = usize> + '_ {
        self.point_alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(i, _)| i)
    }

    /// Live primitive offsets in ascending order
    pub fn polygons(&self) -> impl Iterator<Item = usize> + '_ {
        self.polygons
            .iter()
            .enumerate()
            .filter(|(_, p)| p.alive)
            .map(|(i, _)| i)
    }

    /// Number of live points
    pub fn point_count(&self) -> usize {
        self.point_alive.iter().filter(|a| **a).count()
    }

    /// Number of live polygons
    pub fn polygon_count(&self) -> usize {
        self.polygons.iter().filter(|p| p.alive).count()
    }

    /// Number of vertices referenced by live polygons
    pub fn vertex_count(&self) -> usize {
        self.polygons.iter().filter(|p| p.alive).map(|p| p.len()).sum()
    }

    pub fn point_capacity(&self) -> usize {
        self.positions.len()
    }

    pub fn polygon_capacity(&self) -> usize {
        self.polygons.len()
    }

    pub fn vertex_capacity(&self) -> usize {
        self.vertex_points.len()
    }

    /// Size of the offset table of an owner class
    pub fn element_count(&self, owner: AttributeOwner) -> usize {
        match owner {
            AttributeOwner::Point => self.point_capacity(),
            AttributeOwner::Vertex => self.vertex_capacity(),
            AttributeOwner::Primitive => self.polygon_capacity(),
        }
    }

    pub fn attributes(&self, owner: AttributeOwner) -> &AttributeSet {
        match owner {
            AttributeOwner::Point => &self.point_attributes,
            AttributeOwner::Vertex => &self.vertex_attributes,
            AttributeOwner::Primitive => &self.primitive_attributes,
        }
    }

    pub fn attributes_mut(&mut self, owner: AttributeOwner) -> &mut AttributeSet {
        match owner {
            AttributeOwner::Point => &mut self.point_attributes,
            AttributeOwner::Vertex => &mut self.vertex_attributes,
            AttributeOwner::Primitive => &mut self.primitive_attributes,
        }
    }

    /// Add an attribute (or return the existing one of the same name)
    pub fn add_attribute(
        &mut self,
        owner: AttributeOwner,
        name: &str,
        tuple_size: usize,
        default: &[f64],
    ) -> &mut Attribute {
        let len = self.element_count(owner);
        self.attributes_mut(owner).add(name, tuple_size, default, len)
    }

    pub fn attribute(&self, owner: AttributeOwner, name: &str) -> Option<&Attribute> {
        self.attributes(owner).get(name)
    }

    pub fn attribute_mut(&mut self, owner: AttributeOwner, name: &str) -> Option<&mut Attribute> {
        self.attributes_mut(owner).get_mut(name)
    }

    pub fn point_group(&self, name: &str) -> Option<&PointGroup> {
        self.point_groups.get(name)
    }

    pub fn primitive_group(&self, name: &str) -> Option<&PrimitiveGroup> {
        self.primitive_groups.get(name)
    }

    pub fn edge_group(&self, name: &str) -> Option<&EdgeGroup> {
        self.edge_groups.get(name)
    }

    pub fn set_point_group(&mut self, name: &str, group: PointGroup) {
        self.point_groups.insert(name.to_string(), group);
    }

    pub fn set_primitive_group(&mut self, name: &str, group: PrimitiveGroup) {
        self.primitive_groups.insert(name.to_string(), group);
    }

    pub fn set_edge_group(&mut self, name: &str, group: EdgeGroup) {
        self.edge_groups.insert(name.to_string(), group);
    }

    /// Transform all points by a matrix
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for p in &mut self.positions {
            *p = matrix.transform_point(p);
        }
    }

    /// Compute bounding box of live points
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.points().map(|p| &self.positions[p]))
    }

    /// Append another mesh's points and polygons (attributes are not merged)
    pub fn merge(&mut self, other: &Mesh) {
        let offset = self.positions.len();
        for p in 0..other.positions.len() {
            let new_pt = self.add_point(other.positions[p]);
            if !other.point_alive[p] {
                self.point_alive[new_pt] = false;
            }
        }
        for prim in other.polygons() {
            let points: Vec<usize> = other.polygon_points(prim).iter().map(|p| p + offset).collect();
            self.add_polygon(&points);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Mesh {
        let mut mesh = Mesh::new();
        let a = mesh.add_point(Point3::new(0.0, 0.0, 0.0));
        let b = mesh.add_point(Point3::new(1.0, 0.0, 0.0));
        let c = mesh.add_point(Point3::new(1.0, 1.0, 0.0));
        let d = mesh.add_point(Point3::new(0.0, 1.0, 0.0));
        mesh.add_polygon(&[a, b, c, d]);
        mesh
    }

    #[test]
    fn test_polygon_points_and_normal() {
        let mesh = unit_square();
        assert_eq!(mesh.polygon_points(0), vec![0, 1, 2, 3]);
        assert_eq!(mesh.polygon_normal(0), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_attributes_follow_new_elements() {
        let mut mesh = unit_square();
        mesh.add_attribute(AttributeOwner::Point, "w", 1, &[2.0]);
        let p = mesh.add_point(Point3::new(5.0, 0.0, 0.0));
        assert_eq!(mesh.attribute(AttributeOwner::Point, "w").unwrap().get_scalar(p), 2.0);
    }

    #[test]
    fn test_removal_keeps_offsets() {
        let mut mesh = unit_square();
        let extra = mesh.add_point(Point3::new(3.0, 3.0, 3.0));
        mesh.remove_point(extra);
        assert!(!mesh.is_point_alive(extra));
        assert_eq!(mesh.point_count(), 4);
        assert_eq!(mesh.point_capacity(), 5);

        mesh.remove_polygon(0);
        assert_eq!(mesh.polygon_count(), 0);
        assert_eq!(mesh.polygon_capacity(), 1);
    }
}
