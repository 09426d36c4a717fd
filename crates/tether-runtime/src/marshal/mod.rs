//! Marshaling - boxed native values ↔ host values
//!
//! - [`MarshalRegistry`]: type tag → marshaler, copy-on-write
//! - [`Value`]: what marshalers produce
//! - [`FromValue`]: how callbacks receive typed arguments

pub mod registry;
pub mod value;

pub use registry::{MarshalContext, MarshalRegistry, Marshaler};
pub use value::{FromValue, HostValue, Value};
