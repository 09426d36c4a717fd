//! Tether Runtime - bridge between Rust and a native refcounted object system
//!
//! This library provides:
//! - Lifetime bridging between Rust ownership and native reference counts
//! - A registry of marshalers decoding boxed native values by type tag
//! - Dispatch of native signals to methods on Rust callback objects

/// Tether runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bridge;
pub mod error;
pub mod handle;
pub mod marshal;
pub mod native;
pub mod object;
pub mod signal;

// Re-export commonly used types
pub use bridge::Bridge;
pub use error::{BridgeError, BridgeResult};
pub use handle::{native_or_null, AcquireMode, AsNative, Handle, RefOps};
pub use marshal::{FromValue, MarshalContext, MarshalRegistry, Marshaler, Value};
pub use native::{BoxedValue, FinalizeNotify, NativePtr, ObjectSystem, SystemRef, TypeTag};
pub use object::{Object, ObjectType};
pub use signal::{DispatchOutcome, MethodTable, Reflect, SignalDispatcher};
pub use tether_config::{BridgeConfig, NameStyle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
