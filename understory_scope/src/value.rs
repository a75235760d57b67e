// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tagged attribute values.
//!
//! Scopes are open attribute bags, so every attribute, watched expression and
//! event argument is a [`Value`]. Scalars compare by content. Containers
//! ([`Array`], [`Object`]) are shared and interior-mutable: cloning a `Value`
//! clones the handle, not the contents, which gives the container the same
//! identity everywhere it is stored.
//!
//! Values that have no natural tagged representation can be carried as a
//! [`HostValue`], a type-erased handle that only ever compares by identity.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap;

/// A dynamically typed value stored on a scope.
///
/// # Example
///
/// ```rust
/// use understory_scope::{Array, Value};
///
/// let list = Array::from(vec![Value::from(1), Value::from(2)]);
/// let a = Value::Array(list.clone());
/// let b = a.clone();
///
/// // Both handles see the same container.
/// list.push(3);
/// assert_eq!(b.as_array().map(Array::len), Some(3));
/// ```
#[derive(Clone, Default)]
pub enum Value {
    /// No value. This is what reading an unset attribute yields.
    #[default]
    Undefined,
    /// An explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number. `NaN` is a legal value.
    Number(f64),
    /// An immutable string.
    String(Rc<str>),
    /// A shared, ordered list.
    Array(Array),
    /// A shared string-keyed mapping.
    Object(Object),
    /// An opaque host value compared by identity.
    Host(HostValue),
}

impl Value {
    /// Returns `true` for [`Value::Undefined`].
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is a number and that number is `NaN`.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Number(n) if n.is_nan())
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number, if this is one.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the array handle, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the object handle, if this is an object.
    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Returns the host handle, if this is a host value.
    #[must_use]
    pub fn as_host(&self) -> Option<&HostValue> {
        match self {
            Self::Host(h) => Some(h),
            _ => None,
        }
    }

    /// Copies this value, recursively allocating fresh containers.
    ///
    /// Host values are shared since their contents are opaque.
    /// Cyclic containers are not supported.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Array(a) => Self::Array(Array::from(
                a.borrow().iter().map(Self::deep_clone).collect::<Vec<_>>(),
            )),
            Self::Object(o) => Self::Object(Object::from(
                o.borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone()))
                    .collect::<HashMap<_, _>>(),
            )),
            other => other.clone(),
        }
    }

    /// Copies the outer container only; elements keep their identity.
    #[must_use]
    pub fn shallow_clone(&self) -> Self {
        match self {
            Self::Array(a) => Self::Array(Array::from(a.to_vec())),
            Self::Object(o) => Self::Object(Object::from(o.borrow().clone())),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(a) => f.debug_list().entries(a.borrow().iter()).finish(),
            Self::Object(o) => f.debug_map().entries(o.borrow().iter()).finish(),
            Self::Host(h) => h.fmt(f),
        }
    }
}

/// Structural comparison, used by tests and callers that want content equality.
///
/// Unlike the digest's reference mode this looks inside containers, and unlike
/// `f64` it treats two `NaN`s as equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equality::deep_equal(self, other)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Self::Number(f64::from(value))
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, u8, u16, u32, f32, f64);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(Rc::from(value))
    }
}

impl From<Vec<Self>> for Value {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(Array::from(value))
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Self::Array(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Self::Object(value)
    }
}

impl From<HostValue> for Value {
    fn from(value: HostValue) -> Self {
        Self::Host(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A shared, interior-mutable list of values.
///
/// Cloning an `Array` yields another handle to the same list.
#[derive(Clone, Default)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    /// Creates a new empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if both handles refer to the same list.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrows the list.
    ///
    /// # Panics
    ///
    /// Panics if the list is currently mutably borrowed.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    /// Mutably borrows the list.
    ///
    /// # Panics
    ///
    /// Panics if the list is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Returns `true` if the list has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Returns a clone of the element at `index`, or [`Value::Undefined`].
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Appends an element.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Overwrites the element at `index`, growing the list with
    /// [`Value::Undefined`] as needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    /// Copies the elements out into a plain vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}

/// A shared, interior-mutable string-keyed mapping.
///
/// Cloning an `Object` yields another handle to the same mapping.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<HashMap<String, Value>>>);

impl Object {
    /// Creates a new empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if both handles refer to the same mapping.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Borrows the mapping.
    ///
    /// # Panics
    ///
    /// Panics if the mapping is currently mutably borrowed.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, HashMap<String, Value>> {
        self.0.borrow()
    }

    /// Mutably borrows the mapping.
    ///
    /// # Panics
    ///
    /// Panics if the mapping is currently borrowed.
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, HashMap<String, Value>> {
        self.0.borrow_mut()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Returns `true` if the mapping has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Returns a clone of the entry for `key`, or [`Value::Undefined`].
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        self.0.borrow().get(key).cloned().unwrap_or_default()
    }

    /// Inserts or overwrites an entry.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().insert(key.into(), value.into());
    }

    /// Removes an entry, returning it if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().remove(key)
    }
}

impl From<HashMap<String, Value>> for Object {
    fn from(entries: HashMap<String, Value>) -> Self {
        Self(Rc::new(RefCell::new(entries)))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::from(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect::<HashMap<_, _>>(),
        )
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.borrow().iter()).finish()
    }
}

/// A type-erased host value.
///
/// This lets collaborators park arbitrary `'static` data on a scope. Host
/// values never compare structurally: two `HostValue`s are equal only when
/// they are handles to the same allocation.
///
/// # Example
///
/// ```rust
/// use understory_scope::HostValue;
///
/// let value = HostValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert!(value.ptr_eq(&value.clone()));
/// ```
#[derive(Clone)]
pub struct HostValue {
    inner: Rc<dyn Any>,
    type_name: &'static str,
}

impl HostValue {
    /// Wraps a concrete value.
    #[must_use]
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Returns the [`TypeId`] of the contained value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// Returns `true` if the contained value is of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Attempts to downcast to a reference of type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    /// Returns `true` if both handles refer to the same allocation.
    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostValue")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}
