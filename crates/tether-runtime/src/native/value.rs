//! Type-erased native values
//!
//! A [`BoxedValue`] is what the native runtime hands over for a property or a
//! signal parameter: a dynamic type tag plus a raw payload. Only marshalers
//! look inside it.

use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativePtr, TypeTag};

/// Raw storage of a boxed native value
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Uninitialized or void
    Empty,
    Bool(bool),
    /// Signed integers, enums and chars
    Int(i64),
    /// Unsigned integers and flags
    UInt(u64),
    Double(f64),
    /// Native strings may be NULL
    Str(Option<String>),
    /// Objects, boxed structs and plain pointers
    Pointer(NativePtr),
}

impl RawPayload {
    /// Name of the payload kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            RawPayload::Empty => "empty",
            RawPayload::Bool(_) => "bool",
            RawPayload::Int(_) => "int",
            RawPayload::UInt(_) => "uint",
            RawPayload::Double(_) => "double",
            RawPayload::Str(_) => "string",
            RawPayload::Pointer(_) => "pointer",
        }
    }
}

/// A native value tagged with its dynamic type
#[derive(Debug, Clone, PartialEq)]
pub struct BoxedValue {
    tag: TypeTag,
    payload: RawPayload,
}

impl BoxedValue {
    pub fn new(tag: TypeTag, payload: RawPayload) -> Self {
        Self { tag, payload }
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(TypeTag::BOOLEAN, RawPayload::Bool(value))
    }

    pub fn int(value: i32) -> Self {
        Self::new(TypeTag::INT, RawPayload::Int(value as i64))
    }

    pub fn uint(value: u32) -> Self {
        Self::new(TypeTag::UINT, RawPayload::UInt(value as u64))
    }

    pub fn int64(value: i64) -> Self {
        Self::new(TypeTag::INT64, RawPayload::Int(value))
    }

    pub fn uint64(value: u64) -> Self {
        Self::new(TypeTag::UINT64, RawPayload::UInt(value))
    }

    pub fn float(value: f32) -> Self {
        Self::new(TypeTag::FLOAT, RawPayload::Double(value as f64))
    }

    pub fn double(value: f64) -> Self {
        Self::new(TypeTag::DOUBLE, RawPayload::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(TypeTag::STRING, RawPayload::Str(Some(value.into())))
    }

    pub fn null_string() -> Self {
        Self::new(TypeTag::STRING, RawPayload::Str(None))
    }

    /// An enum value of the given enum type
    pub fn enumeration(tag: TypeTag, value: i32) -> Self {
        Self::new(tag, RawPayload::Int(value as i64))
    }

    /// A flags value of the given flags type
    pub fn flags(tag: TypeTag, value: u32) -> Self {
        Self::new(tag, RawPayload::UInt(value as u64))
    }

    /// An object, boxed struct or pointer value
    pub fn pointer(tag: TypeTag, ptr: NativePtr) -> Self {
        Self::new(tag, RawPayload::Pointer(ptr))
    }

    /// Dynamic type tag of this value
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn payload(&self) -> &RawPayload {
        &self.payload
    }

    pub fn get_boolean(&self) -> BridgeResult<bool> {
        match self.payload {
            RawPayload::Bool(b) => Ok(b),
            // gboolean is an int on the native side
            RawPayload::Int(i) => Ok(i != 0),
            _ => Err(self.mismatch("bool")),
        }
    }

    pub fn get_int(&self) -> BridgeResult<i64> {
        match self.payload {
            RawPayload::Int(i) => Ok(i),
            _ => Err(self.mismatch("int")),
        }
    }

    pub fn get_uint(&self) -> BridgeResult<u64> {
        match self.payload {
            RawPayload::UInt(u) => Ok(u),
            _ => Err(self.mismatch("uint")),
        }
    }

    pub fn get_double(&self) -> BridgeResult<f64> {
        match self.payload {
            RawPayload::Double(d) => Ok(d),
            _ => Err(self.mismatch("double")),
        }
    }

    pub fn get_string(&self) -> BridgeResult<Option<&str>> {
        match &self.payload {
            RawPayload::Str(s) => Ok(s.as_deref()),
            _ => Err(self.mismatch("string")),
        }
    }

    pub fn get_pointer(&self) -> BridgeResult<NativePtr> {
        match self.payload {
            RawPayload::Pointer(p) => Ok(p),
            _ => Err(self.mismatch("pointer")),
        }
    }

    fn mismatch(&self, expected: &str) -> BridgeError {
        BridgeError::mismatch(
            format!("{} payload", expected),
            format!("{} payload tagged {}", self.payload.kind(), self.tag),
        )
    }
}
