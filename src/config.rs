// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Engine configuration: tolerances and safety bounds

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tolerances used by the topology engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopologyConfig {
    /// Points closer than this are merged into super points on construction.
    /// Negative disables super point generation.
    pub super_point_tolerance: f64,
    /// Distance under which a point is considered on a plane
    pub plane_tolerance: f64,
    /// Parametric distance from an edge end under which a split is refused
    pub split_epsilon: f64,
    /// Default matching distance for stitching
    pub stitch_tolerance: f64,
    /// Default dihedral threshold for cusping, in degrees
    pub cusp_angle: f64,
    /// Upper bound on any single ring walk
    pub max_ring_walk: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            super_point_tolerance: -1.0,
            plane_tolerance: 1e-6,
            split_epsilon: 1e-4,
            stitch_tolerance: 1e-4,
            cusp_angle: 60.0,
            max_ring_walk: 1 << 20,
        }
    }
}

impl TopologyConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: TopologyConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if PathBuf::from("quadtopo.toml").exists() {
            Self::from_file("quadtopo.toml")?
        } else {
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            match std::env::var(name) {
                Ok(value) => {
                    let parsed = value
                        .trim()
                        .parse::<T>()
                        .with_context(|| format!("Invalid value for {}: {:?}", name, value))?;
                    Ok(Some(parsed))
                }
                Err(_) => Ok(None),
            }
        }

        if let Some(v) = parse_var("QUADTOPO_SUPER_POINT_TOLERANCE")? {
            self.super_point_tolerance = v;
        }
        if let Some(v) = parse_var("QUADTOPO_PLANE_TOLERANCE")? {
            self.plane_tolerance = v;
        }
        if let Some(v) = parse_var("QUADTOPO_SPLIT_EPSILON")? {
            self.split_epsilon = v;
        }
        if let Some(v) = parse_var("QUADTOPO_STITCH_TOLERANCE")? {
            self.stitch_tolerance = v;
        }
        if let Some(v) = parse_var("QUADTOPO_CUSP_ANGLE")? {
            self.cusp_angle = v;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Same configuration with a different super point tolerance
    pub fn with_super_point_tolerance(mut self, tolerance: f64) -> Self {
        self.super_point_tolerance = tolerance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_super_points() {
        let config = TopologyConfig::default();
        assert!(config.super_point_tolerance < 0.0);
        assert_eq!(config.cusp_angle, 60.0);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TopologyConfig = toml::from_str("plane_tolerance = 0.001\n").unwrap();
        assert_eq!(config.plane_tolerance, 0.001);
        assert_eq!(config.split_epsilon, TopologyConfig::default().split_epsilon);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = TopologyConfig::default().with_super_point_tolerance(0.01);
        let text = toml::to_string_pretty(&config).unwrap();
        let back: TopologyConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
