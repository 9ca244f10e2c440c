// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Math utilities

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Which side of a plane an element lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Above,
    Below,
    On,
    /// Only produced for faces: corners on both sides
    Both,
}

/// Oriented plane `normal . p = distance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: Vector3<f64>, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Plane with a unit normal. A zero normal is left untouched.
    pub fn normalized(normal: Vector3<f64>, distance: f64) -> Self {
        let len = normal.norm();
        if len > f64::EPSILON {
            Self::new(normal / len, distance)
        } else {
            Self::new(normal, distance)
        }
    }

    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.distance
    }

    pub fn side(&self, p: &Point3<f64>, tolerance: f64) -> Side {
        let d = self.signed_distance(p);
        if d > tolerance {
            Side::Above
        } else if d < -tolerance {
            Side::Below
        } else {
            Side::On
        }
    }

    /// Parameter along `a -> b` where the segment meets the plane
    pub fn intersect_param(&self, a: &Point3<f64>, b: &Point3<f64>) -> Option<f64> {
        let da = self.signed_distance(a);
        let db = self.signed_distance(b);
        let denom = da - db;
        if denom.abs() < f64::EPSILON {
            return None;
        }
        Some(da / denom)
    }
}

/// Newell normal of a closed polygon; zero for degenerate input
pub fn polygon_normal(points: &[Point3<f64>]) -> Vector3<f64> {
    let mut n = Vector3::<f64>::zeros();
    let count = points.len();
    for i in 0..count {
        let a = &points[i];
        let b = &points[(i + 1) % count];
        n.x += (a.y - b.y) * (a.z + b.z);
        n.y += (a.z - b.z) * (a.x + b.x);
        n.z += (a.x - b.x) * (a.y + b.y);
    }
    let len = n.norm();
    if len > f64::EPSILON {
        n / len
    } else {
        Vector3::zeros()
    }
}

/// Average of a set of points; the origin for an empty set
pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f64)
}

/// Angle between two vectors in degrees
pub fn angle_between_deg(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let la = a.norm();
    let lb = b.norm();
    if la < f64::EPSILON || lb < f64::EPSILON {
        return 0.0;
    }
    let c = clamp(a.dot(b) / (la * lb), -1.0, 1.0);
    rad_to_deg(c.acos())
}

/// Clamp a value between min and max
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

pub fn lerp_point(a: &Point3<f64>, b: &Point3<f64>, t: f64) -> Point3<f64> {
    Point3::from(a.coords + (b.coords - a.coords) * t)
}

/// Quadratic Bezier through `a` and `b` with control point `c`
pub fn quadratic_bezier(a: &Point3<f64>, c: &Point3<f64>, b: &Point3<f64>, t: f64) -> Point3<f64> {
    let s = 1.0 - t;
    Point3::from(a.coords * (s * s) + c.coords * (2.0 * s * t) + b.coords * (t * t))
}

/// Convert radians to degrees
pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / std::f64::consts::PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, 0.0, 10.0), 5.0);
        assert_eq!(clamp(-5.0, 0.0, 10.0), 0.0);
        assert_eq!(clamp(15.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn test_plane_side_and_param() {
        let plane = Plane::normalized(Vector3::new(2.0, 0.0, 0.0), 0.5);
        assert_eq!(plane.side(&Point3::new(1.0, 0.0, 0.0), 1e-9), Side::Above);
        assert_eq!(plane.side(&Point3::new(0.0, 3.0, 0.0), 1e-9), Side::Below);
        assert_eq!(plane.side(&Point3::new(0.5, 1.0, 0.0), 1e-9), Side::On);

        let t = plane
            .intersect_param(&Point3::new(0.0, 0.0, 0.0), &Point3::new(1.0, 0.0, 0.0))
            .unwrap();
        assert_relative_eq!(t, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_normal_ccw_square() {
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let n = polygon_normal(&square);
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
        assert_relative_eq!(angle_between_deg(&n, &Vector3::x()), 90.0, epsilon = 1e-9);
        assert_relative_eq!(rad_to_deg(std::f64::consts::PI), 180.0, epsilon = 1e-12);
    }
}
