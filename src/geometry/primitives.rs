// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygonal primitive generators
//!
//! Every primitive shares points between adjacent polygons and winds its
//! polygons counter-clockwise when seen from outside.

use super::Mesh;
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

/// Geometric primitives
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Box { size: Vector3<f64>, center: bool },
    Grid { size: f64, rows: usize, cols: usize },
    Tetrahedron { size: f64 },
    Octahedron { radius: f64 },
    Cylinder { h: f64, r: f64, segments: usize },
    Torus { major: f64, minor: f64, rows: usize, cols: usize },
}

impl Primitive {
    pub fn cube(size: f64) -> Self {
        Self::cuboid(Vector3::repeat(size), true)
    }

    pub fn cuboid(size: Vector3<f64>, center: bool) -> Self {
        Self::Box { size, center }
    }

    pub fn grid(size: f64, rows: usize, cols: usize) -> Self {
        Self::Grid {
            size,
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }

    pub fn tetrahedron(size: f64) -> Self {
        Self::Tetrahedron { size }
    }

    pub fn octahedron(radius: f64) -> Self {
        Self::Octahedron { radius }
    }

    pub fn cylinder(h: f64, r: f64, segments: usize) -> Self {
        let segments = if segments >= 3 { segments } else { 16 };
        Self::Cylinder { h, r, segments }
    }

    pub fn torus(major: f64, minor: f64, rows: usize, cols: usize) -> Self {
        Self::Torus {
            major,
            minor,
            rows: rows.max(3),
            cols: cols.max(3),
        }
    }

    pub fn to_mesh(&self) -> Mesh {
        match self {
            Self::Box { size, center } => generate_box_mesh(*size, *center),
            Self::Grid { size, rows, cols } => generate_grid_mesh(*size, *rows, *cols),
            Self::Tetrahedron { size } => generate_tetrahedron_mesh(*size),
            Self::Octahedron { radius } => generate_octahedron_mesh(*radius),
            Self::Cylinder { h, r, segments } => generate_cylinder_mesh(*h, *r, *segments),
            Self::Torus {
                major,
                minor,
                rows,
                cols,
            } => generate_torus_mesh(*major, *minor, *rows, *cols),
        }
    }
}

fn generate_box_mesh(size: Vector3<f64>, center: bool) -> Mesh {
    let mut mesh = Mesh::with_capacity(8, 6);

    let (min, max) = if center {
        (-size / 2.0, size / 2.0)
    } else {
        (Vector3::zeros(), size)
    };

    let positions = [
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];
    for p in positions {
        mesh.add_point(p);
    }

    let faces = [
        // Front (z+)
        [4, 5, 6, 7],
        // Back (z-)
        [0, 3, 2, 1],
        // Right (x+)
        [1, 2, 6, 5],
        // Left (x-)
        [0, 4, 7, 3],
        // Top (y+)
        [3, 7, 6, 2],
        // Bottom (y-)
        [0, 1, 5, 4],
    ];
    for face in faces {
        mesh.add_polygon(&face);
    }

    mesh
}

fn generate_grid_mesh(size: f64, rows: usize, cols: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity((rows + 1) * (cols + 1), rows * cols);
    let half = size / 2.0;

    for r in 0..=rows {
        for c in 0..=cols {
            let x = c as f64 * size / cols as f64 - half;
            let y = r as f64 * size / rows as f64 - half;
            mesh.add_point(Point3::new(x, y, 0.0));
        }
    }

    let index = |r: usize, c: usize| r * (cols + 1) + c;
    for r in 0..rows {
        for c in 0..cols {
            mesh.add_polygon(&[index(r, c), index(r, c + 1), index(r + 1, c + 1), index(r + 1, c)]);
        }
    }

    mesh
}

fn generate_tetrahedron_mesh(size: f64) -> Mesh {
    let mut mesh = Mesh::with_capacity(4, 4);
    let s = size / 2.0;
    for p in [
        Point3::new(s, s, s),
        Point3::new(s, -s, -s),
        Point3::new(-s, s, -s),
        Point3::new(-s, -s, s),
    ] {
        mesh.add_point(p);
    }
    for face in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        mesh.add_polygon(&face);
    }
    mesh
}

fn generate_octahedron_mesh(radius: f64) -> Mesh {
    let mut mesh = Mesh::with_capacity(6, 8);
    for axis in 0..3 {
        for sign in [1.0, -1.0] {
            let mut v = Vector3::<f64>::zeros();
            v[axis] = sign * radius;
            mesh.add_point(Point3::from(v));
        }
    }

    // One triangle per octant; points are +x,-x,+y,-y,+z,-z
    for sx in [0usize, 1] {
        for sy in [0usize, 1] {
            for sz in [0usize, 1] {
                let (x, y, z) = (sx, 2 + sy, 4 + sz);
                if (sx + sy + sz) % 2 == 0 {
                    mesh.add_polygon(&[x, y, z]);
                } else {
                    mesh.add_polygon(&[x, z, y]);
                }
            }
        }
    }
    mesh
}

fn generate_cylinder_mesh(height: f64, radius: f64, segments: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(segments * 2, segments + 2);

    let mut bottom = Vec::with_capacity(segments);
    let mut top = Vec::with_capacity(segments);
    for i in 0..segments {
        let angle = 2.0 * PI * i as f64 / segments as f64;
        let (sin, cos) = angle.sin_cos();
        bottom.push(mesh.add_point(Point3::new(radius * cos, radius * sin, 0.0)));
        top.push(mesh.add_point(Point3::new(radius * cos, radius * sin, height)));
    }

    for i in 0..segments {
        let next = (i + 1) % segments;
        mesh.add_polygon(&[bottom[i], bottom[next], top[next], top[i]]);
    }

    // Caps are single n-gons
    mesh.add_polygon(&top);
    let reversed: Vec<usize> = bottom.iter().rev().copied().collect();
    mesh.add_polygon(&reversed);

    mesh
}

fn generate_torus_mesh(major: f64, minor: f64, rows: usize, cols: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(rows * cols, rows * cols);

    for i in 0..rows {
        let u = 2.0 * PI * i as f64 / rows as f64;
        for j in 0..cols {
            let v = 2.0 * PI * j as f64 / cols as f64;
            let ring = major + minor * v.cos();
            mesh.add_point(Point3::new(ring * u.cos(), ring * u.sin(), minor * v.sin()));
        }
    }

    let index = |i: usize, j: usize| (i % rows) * cols + (j % cols);
    for i in 0..rows {
        for j in 0..cols {
            mesh.add_polygon(&[index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1)]);
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &Mesh) {
        let center = mesh.bounding_box().center();
        for prim in mesh.polygons() {
            let pts = mesh.polygon_positions(prim);
            let c = crate::utils::math::centroid(&pts);
            assert!(
                mesh.polygon_normal(prim).dot(&(c - center)) > 0.0,
                "polygon {} faces inward",
                prim
            );
        }
    }

    #[test]
    fn test_box_generation() {
        let mesh = Primitive::cube(2.0).to_mesh();
        assert_eq!(mesh.point_count(), 8);
        assert_eq!(mesh.polygon_count(), 6);
        assert_outward(&mesh);
    }

    #[test]
    fn test_closed_solids_are_outward() {
        assert_outward(&Primitive::tetrahedron(1.0).to_mesh());
        assert_outward(&Primitive::octahedron(1.0).to_mesh());
        assert_outward(&Primitive::cylinder(2.0, 1.0, 8).to_mesh());
    }

    #[test]
    fn test_grid_counts() {
        let mesh = Primitive::grid(2.0, 3, 4).to_mesh();
        assert_eq!(mesh.point_count(), 20);
        assert_eq!(mesh.polygon_count(), 12);
        assert!(mesh.polygon_normal(0).z > 0.0);
    }

    #[test]
    fn test_torus_reuses_points() {
        let mesh = Primitive::torus(2.0, 0.5, 8, 6).to_mesh();
        assert_eq!(mesh.point_count(), 48);
        assert_eq!(mesh.polygon_count(), 48);
    }
}
