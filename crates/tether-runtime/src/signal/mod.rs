//! Signal dispatch
//!
//! Routes native signal emissions to methods on registered callback objects:
//! - [`naming`]: handler name → method name
//! - [`method`]: per-object method tables with typed arguments
//! - [`dispatcher`]: per-container registration, connection and dispatch

pub mod dispatcher;
pub mod method;
pub mod naming;

pub use dispatcher::{ConnectionState, DispatchOptions, DispatchOutcome, SignalDispatcher};
pub use method::{IntoMethod, Method, MethodTable, Reflect};
pub use naming::normalize;
