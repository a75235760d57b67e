// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scopes, watchers and the digest loop.
//!
//! Build a small tree, derive values with watchers and drive updates through
//! `apply` and a pumped `TaskQueue`.
//!
//! Run:
//! - `cargo run -p understory_examples --example scope_basics`
//! - `RUST_LOG=understory_scope=trace cargo run -p understory_examples --example scope_basics`

use std::rc::Rc;

use understory_scope::{Equality, Scope, TaskQueue, Value, watch_fn};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let queue = Rc::new(TaskQueue::new());
    let root = Scope::builder().scheduler(queue.clone()).build();
    let form = root.spawn();
    let sidebar = root.spawn_isolated();

    // Derived state on the form, fed by an inherited attribute.
    let _ = form.watch(
        |s| Ok(s.get("first")),
        |first, old, s| {
            println!("  first: {old:?} -> {first:?}");
            let first = first.as_str().unwrap_or_default();
            s.set("initial", first.chars().next().map(String::from));
            Ok(())
        },
    );

    // One listener over several inputs.
    let _ = form.watch_group(
        vec![
            watch_fn(|s| Ok(s.get("first"))),
            watch_fn(|s| Ok(s.get("last"))),
        ],
        |names, _, s| {
            let names = names.to_vec();
            let full: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            s.set("full", full.join(" "));
            Ok(())
        },
    );

    // The isolated sidebar keeps its own bag but shares the tree's digest.
    let tags = understory_scope::Array::new();
    sidebar.set("tags", tags.clone());
    let _ = sidebar.watch_with(
        |s| Ok(s.get("tags")),
        |tags, _, _| {
            println!("  tags now {tags:?}");
            Ok(())
        },
        Equality::Value,
    );

    println!("== apply ==");
    root.apply(|s| {
        s.set("first", "Ada");
        s.set("last", "Lovelace");
        Ok(())
    })
    .expect("digest converges");
    println!(
        "  full = {:?}, initial = {:?}, sidebar sees first = {:?}",
        form.get("full"),
        form.get("initial"),
        sidebar.get("first"),
    );

    println!("== apply_async (coalesced) ==");
    root.apply_async(|s| {
        s.set("first", "Grace");
        Ok(())
    });
    root.apply_async(|s| {
        s.set("last", "Hopper");
        Ok(())
    });
    let tags_in_thunk = tags.clone();
    sidebar.apply_async(move |_| {
        tags_in_thunk.push("navy");
        Ok(())
    });
    println!("  pending tasks: {}", queue.len());
    queue.run_until_idle();
    println!("  full = {:?}", form.get("full"));

    println!("== post_digest ==");
    let watched = form.clone();
    root.post_digest(move |_| {
        println!("  settled; full = {:?}", watched.get("full"));
        Ok(())
    });
    root.digest().expect("digest converges");
}
