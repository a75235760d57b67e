// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change detection: deciding whether a watched value is dirty.

use crate::value::Value;

/// How a watcher compares successive values.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Equality {
    /// Scalars by content, containers and host values by identity.
    ///
    /// Mutating a container in place is not a change in this mode.
    #[default]
    Reference,
    /// Full structural comparison.
    ///
    /// The watcher keeps a deep copy of the last value, so in-place mutation
    /// of a watched container is detected.
    Value,
}

/// Returns `true` if `new` and `old` are considered the same under `mode`.
///
/// In both modes two `NaN` numbers are equal, so a watcher over `NaN` settles.
///
/// ```rust
/// use understory_scope::{Array, Equality, Value, are_equal};
///
/// let a = Value::from(vec![Value::from(1)]);
/// let b = Value::from(vec![Value::from(1)]);
/// assert!(!are_equal(&a, &b, Equality::Reference));
/// assert!(are_equal(&a, &b, Equality::Value));
/// assert!(are_equal(&Value::from(f64::NAN), &Value::from(f64::NAN), Equality::Reference));
/// ```
#[must_use]
pub fn are_equal(new: &Value, old: &Value, mode: Equality) -> bool {
    match mode {
        Equality::Value => deep_equal(new, old),
        Equality::Reference => identical(new, old),
    }
}

/// Produces the value a watcher records as "last seen".
///
/// Value-mode watchers snapshot a deep copy so later in-place mutation of the
/// live container does not also mutate the record.
#[must_use]
pub fn snapshot(value: &Value, mode: Equality) -> Value {
    match mode {
        Equality::Value => value.deep_clone(),
        Equality::Reference => value.clone(),
    }
}

fn numbers_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

pub(crate) fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
        _ => false,
    }
}

pub(crate) fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Array(a), Value::Array(b)) => {
            if a.ptr_eq(b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            if a.ptr_eq(b) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            a.len() == b.len()
                && a.iter()
                    .all(|(k, x)| b.get(k).is_some_and(|y| deep_equal(x, y)))
        }
        _ => identical(a, b),
    }
}
