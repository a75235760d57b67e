// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Emitting and broadcasting events through a scope tree.
//!
//! Run:
//! - `cargo run -p understory_examples --example scope_events`

use understory_scope::{Scope, Value};

fn main() {
    let root = Scope::new();
    let panel = root.spawn();
    let button = panel.spawn();
    let status = root.spawn();

    let named = [
        ("root", &root),
        ("panel", &panel),
        ("button", &button),
        ("status", &status),
    ];
    for (name, scope) in named {
        let _ = scope.on("click", move |event, args| {
            println!(
                "  {name:<6} saw {:?} from {} with {args:?}",
                event.name(),
                event.target_scope().id(),
            );
            Ok(())
        });
    }

    println!("== emit from button ==");
    button.emit("click", &[Value::from(1)]);

    println!("== emit from button, stopped at panel ==");
    let stopper = panel.on("click", |event, _| {
        event.stop_propagation();
        Ok(())
    });
    let event = button.emit("click", &[Value::from(2)]);
    println!("  stopped: {}", event.is_propagation_stopped());
    stopper.deregister();

    println!("== broadcast from root ==");
    root.broadcast("click", &[]);

    println!("== broadcast after destroying panel ==");
    panel.destroy();
    root.broadcast("click", &[]);
}
