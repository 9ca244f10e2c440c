// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Seeded random sequences of local edits must keep every invariant

use anyhow::Result;
use quadtopo::geometry::Primitive;
use quadtopo::topology::EdgeId;
use quadtopo::{Detail, Mesh};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_edge(detail: &Detail<'_>, rng: &mut StdRng) -> Option<EdgeId> {
    let edges: Vec<EdgeId> = detail.edges().collect();
    if edges.is_empty() {
        return None;
    }
    let e = edges[rng.gen_range(0..edges.len())];
    Some(if rng.gen_bool(0.5) { e } else { e.sym() })
}

fn random_edit(detail: &mut Detail<'_>, rng: &mut StdRng) {
    let Some(e) = random_edge(detail, rng) else {
        return;
    };
    match rng.gen_range(0..5) {
        0 => {
            let t = rng.gen_range(0.2..0.8);
            detail.split_edge(e, t);
        }
        1 => {
            if let Some(f) = detail.left(e) {
                let corners = detail.face_points(f);
                if corners.len() >= 4 {
                    let i = rng.gen_range(0..corners.len());
                    let j = (i + 2) % corners.len();
                    detail.connect_points(f, corners[i], corners[j]);
                }
            }
        }
        2 => {
            detail.dec_swap(e);
        }
        3 => {
            detail.dec_collapse(e);
        }
        _ => {
            detail.dec_split(e);
        }
    }
}

fn run_edits(mut mesh: Mesh, seed: u64, steps: usize) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let faces = {
        let mut detail = Detail::from_mesh(&mut mesh);
        let euler = |d: &Detail<'_>| d.num_points() as i64 - d.num_edges() as i64 + d.num_faces() as i64;
        let start = euler(&detail);
        for _ in 0..steps {
            random_edit(&mut detail, &mut rng);
            detail.validate()?;
            assert_eq!(euler(&detail), start);
        }
        detail.build_geometry();
        detail.num_faces()
    };
    assert_eq!(mesh.polygon_count(), faces);
    let detail = Detail::from_mesh(&mut mesh);
    detail.validate()?;
    assert_eq!(detail.num_faces(), faces);
    Ok(())
}

#[test]
fn test_random_edits_on_closed_mesh() -> Result<()> {
    for seed in [1, 7, 42] {
        run_edits(Primitive::cube(2.0).to_mesh(), seed, 150)?;
    }
    Ok(())
}

#[test]
fn test_random_edits_on_open_mesh() -> Result<()> {
    for seed in [3, 11] {
        run_edits(Primitive::grid(2.0, 3, 3).to_mesh(), seed, 150)?;
    }
    Ok(())
}

#[test]
fn test_random_edits_on_torus() -> Result<()> {
    run_edits(Primitive::torus(3.0, 1.0, 8, 6).to_mesh(), 5, 200)
}
