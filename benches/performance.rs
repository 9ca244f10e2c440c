// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::Vector3;
use quadtopo::{BevelParms, BevelTarget, Detail, PolyBevel, Primitive, SubdivideParms};

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for rows in [8, 32, 64] {
        let mesh = Primitive::torus(10.0, 3.0, rows * 2, rows).to_mesh();
        group.bench_with_input(BenchmarkId::new("torus", rows), &mesh, |b, mesh| {
            b.iter(|| {
                let mut mesh = mesh.clone();
                let detail = Detail::from_mesh(black_box(&mut mesh));
                detail.num_edges()
            });
        });
    }

    group.finish();
}

fn bench_subdivide(c: &mut Criterion) {
    let mut group = c.benchmark_group("subdivide");

    for iterations in [1, 2, 3] {
        let parms = SubdivideParms {
            iterations,
            ..SubdivideParms::default()
        };
        group.bench_with_input(BenchmarkId::new("cube", iterations), &parms, |b, parms| {
            b.iter(|| {
                let mut mesh = Primitive::cube(10.0).to_mesh();
                let mut detail = Detail::from_mesh(&mut mesh);
                detail.subdivide(black_box(parms), None);
                detail.build_geometry();
            });
        });
    }

    group.finish();
}

fn bench_rewrites(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrites");
    let torus = Primitive::torus(10.0, 3.0, 32, 16).to_mesh();

    group.bench_function("dual", |b| {
        b.iter(|| {
            let mut mesh = torus.clone();
            Detail::from_mesh(black_box(&mut mesh)).dual(&[])
        });
    });

    group.bench_function("cusp", |b| {
        b.iter(|| {
            let mut mesh = Primitive::cylinder(10.0, 5.0, 64).to_mesh();
            Detail::from_mesh(&mut mesh).cusp(black_box(45.0), false)
        });
    });

    group.bench_function("clip", |b| {
        b.iter(|| {
            let mut mesh = torus.clone();
            Detail::from_mesh(&mut mesh).clip(black_box(Vector3::new(1.0, 1.0, 0.0)), 0.5, true)
        });
    });

    group.bench_function("brick", |b| {
        b.iter(|| {
            let mut mesh = Primitive::grid(10.0, 4, 4).to_mesh();
            let mut detail = Detail::from_mesh(&mut mesh);
            detail.brick(black_box(Vector3::new(0.5, 0.5, 0.0)), Vector3::zeros())
        });
    });

    group.bench_function("bevel_points", |b| {
        let target = BevelTarget::Points((0..64).collect());
        b.iter(|| {
            let mut mesh = torus.clone();
            PolyBevel::new(&mut mesh, BevelParms::default())
                .bevel(black_box(&target))
                .map(|group| group.len())
        });
    });

    group.finish();
}

fn bench_decimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimate");
    let mut source = Primitive::torus(10.0, 3.0, 32, 16).to_mesh();
    {
        // Triangles give the collapse queue the most to do
        let mut detail = Detail::from_mesh(&mut source);
        let faces: Vec<_> = detail.faces().collect();
        for f in faces {
            let corners = detail.face_points(f);
            detail.connect_points(f, corners[0], corners[2]);
        }
        detail.build_geometry();
    }

    for target in [512, 256] {
        group.bench_with_input(BenchmarkId::new("torus", target), &target, |b, &target| {
            b.iter(|| {
                let mut mesh = source.clone();
                let mut detail = Detail::from_mesh(&mut mesh);
                detail.simple_decimate(black_box(target))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_subdivide,
    bench_rewrites,
    bench_decimate
);
criterion_main!(benches);
