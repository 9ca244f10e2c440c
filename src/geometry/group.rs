// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Element groups used as algorithm masks and outputs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

macro_rules! offset_group {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            members: BTreeSet<usize>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }

            pub fn insert(&mut self, offset: usize) -> bool {
                self.members.insert(offset)
            }

            pub fn remove(&mut self, offset: usize) -> bool {
                self.members.remove(&offset)
            }

            pub fn contains(&self, offset: usize) -> bool {
                self.members.contains(&offset)
            }

            pub fn len(&self) -> usize {
                self.members.len()
            }

            pub fn is_empty(&self) -> bool {
                self.members.is_empty()
            }

            /// Members in ascending offset order
            pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
                self.members.iter().copied()
            }

            pub fn clear(&mut self) {
                self.members.clear();
            }
        }

        impl FromIterator<usize> for $name {
            fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
                Self {
                    members: iter.into_iter().collect(),
                }
            }
        }
    };
}

offset_group!(
    /// Set of point offsets
    PointGroup
);

offset_group!(
    /// Set of primitive (polygon) offsets
    PrimitiveGroup
);

/// Set of undirected edges, each stored as an ordered pair of point offsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeGroup {
    members: BTreeSet<(usize, usize)>,
}

impl EdgeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: usize, b: usize) -> (usize, usize) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn insert(&mut self, a: usize, b: usize) -> bool {
        self.members.insert(Self::key(a, b))
    }

    pub fn remove(&mut self, a: usize, b: usize) -> bool {
        self.members.remove(&Self::key(a, b))
    }

    /// Membership regardless of direction
    pub fn contains(&self, a: usize, b: usize) -> bool {
        self.members.contains(&Self::key(a, b))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.members.iter().copied()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

impl FromIterator<(usize, usize)> for EdgeGroup {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        let mut group = Self::new();
        for (a, b) in iter {
            group.insert(a, b);
        }
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_group_is_undirected() {
        let mut group = EdgeGroup::new();
        assert!(group.insert(4, 1));
        assert!(!group.insert(1, 4));
        assert!(group.contains(4, 1));
        assert!(group.contains(1, 4));
        assert_eq!(group.iter().collect::<Vec<_>>(), vec![(1, 4)]);
    }

    #[test]
    fn test_primitive_group_ordering() {
        let group: PrimitiveGroup = [5, 2, 9, 2].into_iter().collect();
        assert_eq!(group.len(), 3);
        assert_eq!(group.iter().collect::<Vec<_>>(), vec![2, 5, 9]);
    }
}
