// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - host polygon mesh, attributes, groups and primitives

mod attribute;
mod bbox;
mod group;
mod mesh;
mod primitives;

pub use attribute::{Attribute, AttributeOwner, AttributeRefMap, AttributeSet};
pub use bbox::BoundingBox;
pub use group::{EdgeGroup, PointGroup, PrimitiveGroup};
pub use mesh::{Mesh, Polygon};
pub use primitives::Primitive;
