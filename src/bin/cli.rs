// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Quadtopo CLI

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use nalgebra::Vector3;
use quadtopo::cli::{MeshSummary, Reporter};
use quadtopo::{
    BevelParms, BevelTarget, BevelType, Detail, EdgeGroup, Mesh, PointGroup, PolyBevel, Primitive,
    StitchParms, SubdivideParms, TopologyConfig,
};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "quadtopo")]
#[command(about = "Quadtopo - quad-edge mesh topology engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Primitive the operation runs on
    #[arg(short, long, value_enum, default_value = "box")]
    primitive: Shape,

    /// Size of the primitive
    #[arg(short, long, default_value = "2.0")]
    size: f64,

    /// Rows and columns for grids and tori
    #[arg(long, default_value = "4")]
    resolution: usize,

    /// Configuration file (defaults to quadtopo.toml when present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Print the full topology dump after the operation
    #[arg(long)]
    dump: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Shape {
    Box,
    Grid,
    Tetra,
    Octa,
    Cylinder,
    Torus,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the topology and report it
    Info,

    /// Catmull-Clark subdivision
    Subdivide {
        #[arg(short, long, default_value = "1")]
        iterations: usize,

        /// Fill holes before subdividing and reopen them afterwards
        #[arg(long)]
        close_holes: bool,

        /// Pin boundary points instead of smoothing them as creases
        #[arg(long)]
        pin_boundary: bool,

        #[arg(long)]
        linear_creases: bool,
    },

    /// Replace the mesh by its dual
    Dual {
        /// Attributes that trade places between points and primitives
        #[arg(long, value_delimiter = ',')]
        swap: Vec<String>,
    },

    /// Split points along sharp edges
    Cusp {
        /// Dihedral threshold in degrees
        #[arg(short, long)]
        angle: Option<f64>,

        /// Only write corner normals
        #[arg(long)]
        no_cut: bool,
    },

    /// Keep the part above a plane
    Clip {
        #[arg(short, long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 1.0])]
        normal: Vec<f64>,

        #[arg(short, long, default_value = "0.0")]
        distance: f64,
    },

    /// Split along a plane keeping both sides
    Crease {
        #[arg(short, long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 1.0])]
        normal: Vec<f64>,

        #[arg(short, long, default_value = "0.0")]
        distance: f64,
    },

    /// Fuse boundary edges that run along each other
    Stitch {
        /// Matching distance (defaults to the configured stitch tolerance)
        #[arg(short, long)]
        tolerance: Option<f64>,

        #[arg(long)]
        clamp: bool,

        #[arg(long)]
        consolidate: bool,
    },

    /// Collapse short edges down to a face count
    Decimate {
        #[arg(short, long)]
        target: usize,
    },

    /// Split faces along an axis-aligned lattice
    Brick {
        #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [1.0, 1.0, 1.0])]
        size: Vec<f64>,

        #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 0.0])]
        offset: Vec<f64>,
    },

    /// Bevel points or edges
    Bevel {
        /// Point offsets to bevel
        #[arg(long, value_delimiter = ',')]
        points: Vec<usize>,

        /// Edges to bevel, as a-b pairs of point offsets
        #[arg(long, value_delimiter = ',')]
        edges: Vec<String>,

        #[arg(short, long, default_value = "0.1")]
        offset: f64,

        /// Offset is a fraction of the local edge length
        #[arg(long)]
        relative: bool,

        #[arg(long, default_value = "1")]
        divisions: usize,

        /// Rounded profile
        #[arg(long)]
        smooth: bool,

        /// Name of the primitive group receiving the new polygons
        #[arg(long)]
        group: Option<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Commands::Version = cli.command {
        println!("Quadtopo v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => TopologyConfig::from_file(path)?,
        None => TopologyConfig::load()?,
    };
    let mut mesh = make_primitive(cli.primitive, cli.size, cli.resolution).to_mesh();
    info!(
        "built primitive with {} points and {} polygons",
        mesh.point_count(),
        mesh.polygon_count()
    );

    let start = Instant::now();
    let label = run_command(&cli.command, &mut mesh, &config)?;
    let duration = start.elapsed();

    let detail = Detail::new(&mut mesh, None, &config);
    let summary = MeshSummary::from_detail(&detail);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        Reporter::report_summary(&label, &summary, duration);
    }
    if cli.dump {
        print!("{}", detail);
    }
    if !summary.valid {
        if let Err(err) = detail.validate() {
            Reporter::report_error(&err.to_string());
        }
        std::process::exit(1);
    }

    Ok(())
}

fn make_primitive(shape: Shape, size: f64, resolution: usize) -> Primitive {
    match shape {
        Shape::Box => Primitive::cube(size),
        Shape::Grid => Primitive::grid(size, resolution, resolution),
        Shape::Tetra => Primitive::tetrahedron(size),
        Shape::Octa => Primitive::octahedron(size * 0.5),
        Shape::Cylinder => Primitive::cylinder(size, size * 0.5, resolution * 4),
        Shape::Torus => Primitive::torus(size, size * 0.25, resolution * 2, resolution),
    }
}

fn vector(values: &[f64]) -> Result<Vector3<f64>> {
    match values {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => bail!("expected three comma separated values, got {}", values.len()),
    }
}

fn parse_edges(pairs: &[String]) -> Result<EdgeGroup> {
    let mut group = EdgeGroup::new();
    for pair in pairs {
        let Some((a, b)) = pair.split_once('-') else {
            bail!("edge '{}' is not of the form a-b", pair);
        };
        group.insert(a.trim().parse()?, b.trim().parse()?);
    }
    Ok(group)
}

fn run_command(command: &Commands, mesh: &mut Mesh, config: &TopologyConfig) -> Result<String> {
    let label = match command {
        Commands::Info | Commands::Version => "info".to_string(),
        Commands::Subdivide {
            iterations,
            close_holes,
            pin_boundary,
            linear_creases,
        } => {
            let parms = SubdivideParms {
                iterations: *iterations,
                close_holes: *close_holes,
                smooth_boundary: !pin_boundary,
                linear_creases: *linear_creases,
            };
            let mut detail = Detail::new(mesh, None, config);
            let faces = detail.subdivide(&parms, None);
            detail.build_geometry();
            format!("subdivide x{} ({} faces)", iterations, faces)
        }
        Commands::Dual { swap } => {
            let names: Vec<&str> = swap.iter().map(String::as_str).collect();
            let mut detail = Detail::new(mesh, None, config);
            let faces = detail.dual(&names);
            format!("dual ({} faces)", faces)
        }
        Commands::Cusp { angle, no_cut } => {
            let angle = angle.unwrap_or(config.cusp_angle);
            let mut detail = Detail::new(mesh, None, config);
            let added = detail.cusp(angle, *no_cut);
            detail.build_geometry();
            format!("cusp at {}° ({} points added)", angle, added)
        }
        Commands::Clip { normal, distance } => {
            let result = Detail::new(mesh, None, config).clip(vector(normal)?, *distance, true);
            for (_, message) in result.diagnostics.errors() {
                Reporter::report_warning(message);
            }
            format!("clip ({} polygons kept)", result.kept.len())
        }
        Commands::Crease { normal, distance } => {
            let result = Detail::new(mesh, None, config).crease(vector(normal)?, *distance, true, Some(("above", "below")));
            format!("crease ({} points on the plane)", result.cut_points.len())
        }
        Commands::Stitch {
            tolerance,
            clamp,
            consolidate,
        } => {
            let mut detail = Detail::new(mesh, None, config);
            let mut parms = StitchParms::from_config(detail.config());
            if let Some(tolerance) = tolerance {
                parms.tolerance = *tolerance;
            }
            parms.clamp = *clamp;
            parms.consolidate = *consolidate;
            let matched = detail.stitch(&parms);
            detail.build_geometry();
            format!("stitch ({} edges matched)", matched)
        }
        Commands::Decimate { target } => {
            let mut detail = Detail::new(mesh, None, config);
            let removed = detail.simple_decimate(*target);
            detail.build_geometry();
            format!("decimate to {} ({} faces removed)", target, removed)
        }
        Commands::Brick { size, offset } => {
            let mut detail = Detail::new(mesh, None, config);
            let created = detail.brick(vector(size)?, vector(offset)?);
            detail.build_geometry();
            format!("brick ({} faces created)", created)
        }
        Commands::Bevel {
            points,
            edges,
            offset,
            relative,
            divisions,
            smooth,
            group,
        } => {
            let target = if !edges.is_empty() {
                BevelTarget::Edges(parse_edges(edges)?)
            } else if !points.is_empty() {
                BevelTarget::Points(points.iter().copied().collect::<PointGroup>())
            } else {
                bail!("bevel needs --points or --edges");
            };
            let parms = BevelParms {
                offset: *offset,
                relative: *relative,
                divisions: *divisions,
                bevel_type: if *smooth { BevelType::Smooth } else { BevelType::Flat },
                output_group: group.clone(),
            };
            let created = PolyBevel::new(mesh, parms).with_config(config.clone()).bevel(&target)?;
            if created.is_empty() {
                Reporter::report_info("nothing was bevelled");
            }
            format!("bevel ({} polygons created)", created.len())
        }
    };
    Ok(label)
}
