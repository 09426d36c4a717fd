//! Host values produced by marshalers
//!
//! Provides the decoded `Value` and the conversion trait used to hand values
//! to callback methods:
//! - `FromValue` - Convert a `Value` into a Rust argument type
//! - `From<T> for Value` - Build values from Rust types
//!
//! Host-defined types (enums, boxed struct copies) travel as [`HostValue`]
//! and are made usable as callback arguments with [`impl_host_value!`](crate::impl_host_value).

use crate::error::{BridgeError, BridgeResult};
use crate::object::Object;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A decoded host value
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Str(String),
    Object(Object),
    Host(HostValue),
}

impl Value {
    /// Name of the value's kind, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Host(h) => h.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Wrap an arbitrary host type
    pub fn host<T: Any>(value: T) -> Self {
        Value::Host(HostValue::new(value))
    }

    pub fn as_host<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Host(h) => h.downcast_ref(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// A host-defined value carried opaquely
#[derive(Clone)]
pub struct HostValue {
    type_name: &'static str,
    inner: Rc<dyn Any>,
}

impl HostValue {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Rc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostValue<{}>", self.type_name)
    }
}

/// Trait for converting a `Value` into a Rust type
pub trait FromValue: Sized {
    /// Convert from `Value`
    ///
    /// # Errors
    ///
    /// `ValueMismatch` if the value has a different shape.
    fn from_value(value: &Value) -> BridgeResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> BridgeError {
    BridgeError::mismatch(expected, value.type_name())
}

impl FromValue for Value {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::UInt(u) => i64::try_from(*u).map_err(|_| mismatch("i64", value)),
            other => Err(mismatch("i64", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        let wide = i64::from_value(value).map_err(|_| mismatch("i32", value))?;
        i32::try_from(wide).map_err(|_| BridgeError::mismatch("i32", format!("out of range {}", wide)))
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::UInt(u) => Ok(*u),
            Value::Int(i) => u64::try_from(*i).map_err(|_| mismatch("u64", value)),
            other => Err(mismatch("u64", other)),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        let wide = u64::from_value(value).map_err(|_| mismatch("u32", value))?;
        u32::try_from(wide).map_err(|_| BridgeError::mismatch("u32", format!("out of range {}", wide)))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Double(d) => Ok(*d),
            other => Err(mismatch("f64", other)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        f64::from_value(value).map(|d| d as f32)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromValue for Object {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Object(o) => Ok(o.clone()),
            other => Err(mismatch("object", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> BridgeResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Let a host type travel through [`Value::Host`] and be received as a
/// callback argument.
///
/// ```
/// #[derive(Debug, Clone, Copy, PartialEq)]
/// enum Orientation { Horizontal, Vertical }
/// tether_runtime::impl_host_value!(Orientation);
///
/// use tether_runtime::marshal::{FromValue, Value};
/// let v = Value::from(Orientation::Vertical);
/// assert_eq!(Orientation::from_value(&v).unwrap(), Orientation::Vertical);
/// ```
#[macro_export]
macro_rules! impl_host_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::marshal::FromValue for $ty {
                fn from_value(value: &$crate::marshal::Value) -> $crate::error::BridgeResult<Self> {
                    value.as_host::<$ty>().cloned().ok_or_else(|| {
                        $crate::error::BridgeError::mismatch(stringify!($ty), value.type_name())
                    })
                }
            }

            impl From<$ty> for $crate::marshal::Value {
                fn from(value: $ty) -> Self {
                    $crate::marshal::Value::host(value)
                }
            }
        )+
    };
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u as u64)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}
