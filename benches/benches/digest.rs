// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_scope` digests.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use understory_scope::{Array, Equality, Scope, Value};

/// A root with `count` watchers, each observing one element of `list`.
fn flat_tree(count: u32) -> (Scope, Array) {
    let root = Scope::new();
    let list = Array::from((0..count).map(Value::from).collect::<Vec<_>>());
    root.set("list", list.clone());
    for i in 0..count {
        let index = i as usize;
        let _ = root.watch(
            move |s| Ok(s.get("list").as_array().map_or(Value::Undefined, |l| l.get(index))),
            |_, _, _| Ok(()),
        );
    }
    (root, list)
}

/// A balanced tree of inheriting scopes, with one watcher per scope.
fn deep_tree(depth: u32, fanout: u32) -> Scope {
    fn grow(scope: &Scope, depth: u32, fanout: u32) {
        let _ = scope.watch(|s| Ok(s.get("shared")), |_, _, _| Ok(()));
        if depth == 0 {
            return;
        }
        for _ in 0..fanout {
            grow(&scope.spawn(), depth - 1, fanout);
        }
    }
    let root = Scope::new();
    root.set("shared", 1);
    grow(&root, depth, fanout);
    root
}

fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    for &count in &[10_u32, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("clean", count), &count, |b, &count| {
            let (root, _) = flat_tree(count);
            root.digest().unwrap();
            b.iter(|| black_box(root.digest()));
        });

        group.bench_with_input(
            BenchmarkId::new("newest_changed", count),
            &count,
            |b, &count| {
                let (root, list) = flat_tree(count);
                root.digest().unwrap();
                let last = count as usize - 1;
                let mut n = 0.0_f64;
                b.iter(|| {
                    n += 1.0;
                    list.set(last, n);
                    black_box(root.digest())
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("first_digest", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || flat_tree(count).0,
                    |root| black_box(root.digest()),
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.bench_function("deep_tree_broadcast_change", |b| {
        let root = deep_tree(4, 4);
        root.digest().unwrap();
        let mut n = 1_i32;
        b.iter(|| {
            n += 1;
            root.set("shared", n);
            black_box(root.digest())
        });
    });

    group.finish();
}

fn bench_value_watch(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_equality");
    for &len in &[16_u32, 256] {
        group.bench_with_input(BenchmarkId::new("array", len), &len, |b, &len| {
            let root = Scope::new();
            let list = Array::from((0..len).map(Value::from).collect::<Vec<_>>());
            root.set("list", list.clone());
            let _ = root.watch_with(|s| Ok(s.get("list")), |_, _, _| Ok(()), Equality::Value);
            root.digest().unwrap();
            let mut n = 0.0_f64;
            b.iter(|| {
                n += 1.0;
                list.set(0, n);
                black_box(root.digest())
            });
        });
        group.bench_with_input(BenchmarkId::new("collection", len), &len, |b, &len| {
            let root = Scope::new();
            let list = Array::from((0..len).map(Value::from).collect::<Vec<_>>());
            root.set("list", list.clone());
            let _ = root.watch_collection(|s| Ok(s.get("list")), |_, _, _| Ok(()));
            root.digest().unwrap();
            let mut n = 0.0_f64;
            b.iter(|| {
                n += 1.0;
                list.set(0, n);
                black_box(root.digest())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_digest, bench_value_watch);
criterion_main!(benches);
