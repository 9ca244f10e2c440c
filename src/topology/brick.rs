// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bricking: split faces along an axis-aligned lattice

use super::detail::Detail;
use crate::geometry::BoundingBox;
use crate::utils::math::Plane;
use log::{debug, warn};
use nalgebra::Vector3;

const MAX_PLANES_PER_AXIS: f64 = 4096.0;

impl Detail<'_> {
    /// Cut every face along the planes `offset[axis] + k * size[axis]` that
    /// pass through the mesh bounds. Axes with a non-positive size are
    /// skipped. Returns the number of faces created.
    pub fn brick(&mut self, size: Vector3<f64>, offset: Vector3<f64>) -> usize {
        let before = self.num_faces();
        let positions: Vec<_> = self.points().map(|p| self.position(p)).collect();
        let bounds = BoundingBox::from_points(positions.iter());
        if bounds.is_empty() {
            return 0;
        }
        let tol = self.config.plane_tolerance;

        for axis in 0..3 {
            let step = size[axis];
            if !step.is_finite() || step <= 0.0 || !offset[axis].is_finite() {
                continue;
            }
            let lo = ((bounds.min[axis] - offset[axis]) / step).ceil();
            let hi = ((bounds.max[axis] - offset[axis]) / step).floor();
            if !lo.is_finite() || !hi.is_finite() || hi - lo > MAX_PLANES_PER_AXIS {
                warn!("brick size {} on axis {} yields too many planes", step, axis);
                continue;
            }
            for k in (lo as i64)..=(hi as i64) {
                let distance = offset[axis] + k as f64 * step;
                if distance <= bounds.min[axis] + tol || distance >= bounds.max[axis] - tol {
                    continue;
                }
                let mut normal = Vector3::<f64>::zeros();
                normal[axis] = 1.0;
                self.split_by_plane(&Plane::new(normal, distance), None);
            }
        }

        let created = self.num_faces().saturating_sub(before);
        debug!("brick created {} faces", created);
        created
    }
}
