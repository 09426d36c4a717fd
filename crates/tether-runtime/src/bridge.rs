//! Bridge API for embedding

use crate::error::BridgeResult;
use crate::handle::{AcquireMode, Handle};
use crate::marshal::{MarshalContext, MarshalRegistry, Value};
use crate::native::{BoxedValue, NativePtr, SystemRef};
use crate::object::Object;
use crate::signal::{DispatchOptions, SignalDispatcher};
use std::sync::Arc;
use tether_config::Config;

/// One native object system together with its registry and dispatcher
///
/// # Examples
///
/// ```
/// use std::rc::Rc;
/// use tether_runtime::native::{sim::SimSystem, BoxedValue, SystemRef};
/// use tether_runtime::{Bridge, Value};
///
/// let system: SystemRef = Rc::new(SimSystem::new());
/// let bridge = Bridge::new(&system);
/// let value = bridge.decode(&BoxedValue::boolean(true)).unwrap();
/// assert_eq!(value, Value::Bool(true));
/// ```
pub struct Bridge {
    system: SystemRef,
    registry: Arc<MarshalRegistry>,
    dispatcher: SignalDispatcher,
}

impl Bridge {
    /// Bridge using the global marshal registry and default options
    pub fn new(system: &SystemRef) -> Self {
        let registry = Arc::clone(MarshalRegistry::global());
        Self::assemble(system, registry, DispatchOptions::default())
    }

    /// Bridge with its own registry, configured from tether.toml settings
    pub fn from_config(system: &SystemRef, config: &Config) -> Self {
        let registry = Arc::new(MarshalRegistry::from_config(&config.bridge));
        Self::assemble(system, registry, DispatchOptions::from_config(&config.bridge))
    }

    fn assemble(system: &SystemRef, registry: Arc<MarshalRegistry>, options: DispatchOptions) -> Self {
        let dispatcher = SignalDispatcher::with_registry(system, Arc::clone(&registry), options);
        Self {
            system: SystemRef::clone(system),
            registry,
            dispatcher,
        }
    }

    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    pub fn registry(&self) -> &MarshalRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &SignalDispatcher {
        &self.dispatcher
    }

    pub fn wrap(&self, ptr: NativePtr, mode: AcquireMode) -> BridgeResult<Handle> {
        Handle::wrap(&self.system, ptr, mode)
    }

    pub fn wrap_object(&self, ptr: NativePtr, mode: AcquireMode) -> BridgeResult<Object> {
        Object::wrap(&self.system, ptr, mode)
    }

    pub fn decode(&self, boxed: &BoxedValue) -> BridgeResult<Value> {
        self.registry.decode(boxed, &MarshalContext::new(&self.system))
    }
}
