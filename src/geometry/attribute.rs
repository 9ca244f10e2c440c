// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Typed per-element attributes and the interpolation handler used when the
//! engine creates new elements.
//!
//! Every attribute is a fixed-size tuple of `f64` (size 1 for scalars, 3 for
//! vectors) stored densely per element offset. Appending an element appends
//! the attribute default, so offsets stay aligned with the owning table.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Mesh;

/// Element class that owns an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeOwner {
    Point,
    Vertex,
    Primitive,
}

/// One named attribute column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    tuple_size: usize,
    default: Vec<f64>,
    data: Vec<f64>,
}

impl Attribute {
    pub fn new(tuple_size: usize, default: &[f64], len: usize) -> Self {
        let tuple_size = tuple_size.max(1);
        let mut def = default.to_vec();
        def.resize(tuple_size, 0.0);
        let mut data = Vec::with_capacity(len * tuple_size);
        for _ in 0..len {
            data.extend_from_slice(&def);
        }
        Self {
            tuple_size,
            default: def,
            data,
        }
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    pub fn default_value(&self) -> &[f64] {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.tuple_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, offset: usize) -> &[f64] {
        let start = offset * self.tuple_size;
        &self.data[start..start + self.tuple_size]
    }

    pub fn set(&mut self, offset: usize, value: &[f64]) {
        let start = offset * self.tuple_size;
        let n = self.tuple_size.min(value.len());
        self.data[start..start + n].copy_from_slice(&value[..n]);
    }

    pub fn get_scalar(&self, offset: usize) -> f64 {
        self.get(offset)[0]
    }

    pub fn set_scalar(&mut self, offset: usize, value: f64) {
        self.data[offset * self.tuple_size] = value;
    }

    /// Vector view; missing components read as zero
    pub fn get_vector3(&self, offset: usize) -> Vector3<f64> {
        let v = self.get(offset);
        Vector3::new(
            v.first().copied().unwrap_or(0.0),
            v.get(1).copied().unwrap_or(0.0),
            v.get(2).copied().unwrap_or(0.0),
        )
    }

    pub fn set_vector3(&mut self, offset: usize, value: &Vector3<f64>) {
        self.set(offset, value.as_slice());
    }

    pub(crate) fn push_default(&mut self) {
        let def = self.default.clone();
        self.data.extend_from_slice(&def);
    }
}

/// All attributes of one owner class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: BTreeMap<String, Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, tuple_size: usize, default: &[f64], len: usize) -> &mut Attribute {
        self.attributes
            .entry(name.to_string())
            .or_insert_with(|| Attribute::new(tuple_size, default, len))
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub(crate) fn push_default(&mut self) {
        for attr in self.attributes.values_mut() {
            attr.push_default();
        }
    }
}

/// Blends every attribute of one owner class from weighted sources.
///
/// The map only records which attributes take part; the mesh is passed to
/// each call, so it can be held across mesh edits.
#[derive(Debug, Clone)]
pub struct AttributeRefMap {
    owner: AttributeOwner,
    names: Vec<(String, usize)>,
}

impl AttributeRefMap {
    /// Map covering every attribute the mesh currently holds for `owner`
    pub fn new(mesh: &Mesh, owner: AttributeOwner) -> Self {
        let set = mesh.attributes(owner);
        let names = set
            .names()
            .into_iter()
            .filter_map(|n| set.get(&n).map(|a| (n.clone(), a.tuple_size())))
            .collect();
        Self { owner, names }
    }

    /// Map restricted to the named attributes that exist on the mesh
    pub fn with_names(mesh: &Mesh, owner: AttributeOwner, names: &[&str]) -> Self {
        let set = mesh.attributes(owner);
        let names = names
            .iter()
            .filter_map(|n| set.get(n).map(|a| (n.to_string(), a.tuple_size())))
            .collect();
        Self { owner, names }
    }

    pub fn owner(&self) -> AttributeOwner {
        self.owner
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Weighted sum of the sources, normalised by the total weight
    pub fn blend(&self, mesh: &mut Mesh, dest: usize, sources: &[(usize, f64)]) {
        let total: f64 = sources.iter().map(|(_, w)| *w).sum();
        if sources.is_empty() || total.abs() < f64::EPSILON {
            return;
        }
        let set = mesh.attributes_mut(self.owner);
        for (name, size) in &self.names {
            if let Some(attr) = set.get_mut(name) {
                let mut acc = vec![0.0; *size];
                for (src, w) in sources {
                    for (a, v) in acc.iter_mut().zip(attr.get(*src)) {
                        *a += v * w;
                    }
                }
                for a in acc.iter_mut() {
                    *a /= total;
                }
                attr.set(dest, &acc);
            }
        }
    }

    pub fn copy(&self, mesh: &mut Mesh, dest: usize, source: usize) {
        self.blend(mesh, dest, &[(source, 1.0)]);
    }

    pub fn lerp(&self, mesh: &mut Mesh, dest: usize, a: usize, b: usize, t: f64) {
        self.blend(mesh, dest, &[(a, 1.0 - t), (b, t)]);
    }

    /// Copy the mapped attributes of `source` (owned by this map's class) onto
    /// `dest` owned by `target`, creating the target attributes when missing.
    pub fn copy_across(&self, mesh: &mut Mesh, target: AttributeOwner, dest: usize, source: usize) {
        for (name, size) in &self.names {
            let value = match mesh.attributes(self.owner).get(name) {
                Some(attr) => attr.get(source).to_vec(),
                None => continue,
            };
            let len = mesh.element_count(target);
            let default = vec![0.0; *size];
            let attr = mesh.attributes_mut(target).add(name, *size, &default, len);
            attr.set(dest, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_defaults_and_access() {
        let mut attr = Attribute::new(3, &[0.0, 1.0, 0.0], 2);
        assert_eq!(attr.len(), 2);
        assert_eq!(attr.get(1), &[0.0, 1.0, 0.0]);

        attr.set_vector3(0, &Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(attr.get_vector3(0), Vector3::new(1.0, 2.0, 3.0));

        attr.push_default();
        assert_eq!(attr.len(), 3);
        assert_eq!(attr.get_scalar(2), 0.0);
    }

    #[test]
    fn test_attribute_set_add_is_idempotent() {
        let mut set = AttributeSet::new();
        set.add("Cd", 3, &[1.0, 1.0, 1.0], 4).set_scalar(0, 0.5);
        set.add("Cd", 3, &[0.0, 0.0, 0.0], 4);
        assert_eq!(set.get("Cd").unwrap().get_scalar(0), 0.5);
        assert_eq!(set.names(), vec!["Cd".to_string()]);
    }
}
