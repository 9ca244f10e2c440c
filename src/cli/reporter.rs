// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output reporter with colored formatting

use crate::topology::Detail;
use colored::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counts describing a mesh and its topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSummary {
    pub points: usize,
    pub polygons: usize,
    pub vertices: usize,
    pub edges: usize,
    pub shared_edges: usize,
    pub boundary_loops: usize,
    pub closed: bool,
    pub euler: i64,
    pub valid: bool,
}

impl MeshSummary {
    pub fn from_detail(detail: &Detail<'_>) -> Self {
        let mesh = detail.mesh();
        let (v, e, f) = (detail.num_points(), detail.num_edges(), detail.num_faces());
        Self {
            points: mesh.point_count(),
            polygons: mesh.polygon_count(),
            vertices: mesh.vertex_count(),
            edges: e,
            shared_edges: detail.edges().filter(|&r| detail.is_share(r)).count(),
            boundary_loops: detail.create_boundary_list().len(),
            closed: detail.is_closed(),
            euler: v as i64 - e as i64 + f as i64,
            valid: detail.validate().is_ok(),
        }
    }
}

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    /// Report the state of a mesh after an operation
    pub fn report_summary(operation: &str, summary: &MeshSummary, duration: Duration) {
        println!("\n{}", "━".repeat(60).bright_black());
        println!("{} {}", "Operation:".bold(), operation.cyan());
        println!("{}", "━".repeat(60).bright_black());

        Self::print_count("Points", summary.points);
        Self::print_count("Polygons", summary.polygons);
        Self::print_count("Vertices", summary.vertices);
        Self::print_count("Edges", summary.edges);
        Self::print_count("Shared edges", summary.shared_edges);
        Self::print_count("Boundary loops", summary.boundary_loops);
        println!(
            "  {} {}",
            "Euler:".bright_black(),
            summary.euler.to_string().cyan()
        );
        let closed = if summary.closed { "yes".green() } else { "no".yellow() };
        println!("  {} {}", "Closed:".bright_black(), closed);

        if summary.valid {
            println!("{} {}", "✅".green(), "Topology valid".green().bold());
        } else {
            println!("{} {}", "❌".red(), "Topology invalid".red().bold());
        }
        println!(
            "  {} {}",
            "Time:".bright_black(),
            Self::format_duration(duration).yellow()
        );
        println!("{}", "━".repeat(60).bright_black());
    }

    /// Report error
    pub fn report_error(message: &str) {
        eprintln!("\n{} {}", "❌ Error:".red().bold(), message);
    }

    /// Report warning
    pub fn report_warning(message: &str) {
        println!("\n{} {}", "⚠️  Warning:".yellow().bold(), message);
    }

    /// Report info
    pub fn report_info(message: &str) {
        println!("{} {}", "ℹ️".bright_blue(), message);
    }

    fn print_count(name: &str, value: usize) {
        println!(
            "  {} {}",
            format!("{}:", name).bright_black(),
            value.to_string().cyan()
        );
    }

    /// Format duration for display
    fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();

        if micros < 1_000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1_000.0)
        } else {
            format!("{:.2}s", micros as f64 / 1_000_000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;

    #[test]
    fn test_format_duration() {
        assert_eq!(
            Reporter::format_duration(Duration::from_micros(500)),
            "500µs"
        );
        assert_eq!(
            Reporter::format_duration(Duration::from_millis(5)),
            "5.00ms"
        );
        assert_eq!(Reporter::format_duration(Duration::from_secs(2)), "2.00s");
    }

    #[test]
    fn test_summary_of_cube() {
        let mut mesh = Primitive::cube(1.0).to_mesh();
        let detail = Detail::from_mesh(&mut mesh);
        let summary = MeshSummary::from_detail(&detail);
        assert_eq!(summary.points, 8);
        assert_eq!(summary.polygons, 6);
        assert_eq!(summary.edges, 12);
        assert_eq!(summary.shared_edges, 12);
        assert_eq!(summary.boundary_loops, 0);
        assert_eq!(summary.euler, 2);
        assert!(summary.closed && summary.valid);
    }
}
