//! Signal dispatcher
//!
//! Callback objects are registered per UI container. `connect_all` asks the
//! native runtime to route every connection the container declares through
//! the dispatcher; from then on each native emission is decoded through the
//! marshal registry and delivered to the first registered callback object
//! that exposes the normalized handler name.
//!
//! Dispatch never fails toward the native caller. Undecodable parameters and
//! argument mismatches are logged and the emission is dropped; a handler name
//! nobody exposes is logged and ignored.
//!
//! Container entries are keyed by address and dropped when the native
//! runtime finalizes the container, together with their callback objects.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::AsNative;
use crate::marshal::{MarshalContext, MarshalRegistry, Value};
use crate::native::{BoxedValue, ConnectionSpec, NativeClosure, NativePtr, SystemRef};
use crate::signal::method::{Method, MethodTable};
use crate::signal::naming::{normalize, NameStyle};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tether_config::BridgeConfig;

/// Connection state of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connected,
}

/// What happened to one native emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A callback method ran
    Handled {
        method: String,
        /// Registration index of the callback object that handled it
        index: usize,
    },
    /// No registered callback object exposes the method
    Unhandled { method: String },
    /// Decoding or argument conversion failed; nothing ran
    Dropped { method: String, reason: String },
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled { .. })
    }
}

/// Dispatcher behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    pub name_style: NameStyle,
    /// Warn when no callback object exposes a handler
    pub warn_unhandled: bool,
    /// Log every invocation at debug level
    pub trace_invocations: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            name_style: NameStyle::Segments,
            warn_unhandled: true,
            trace_invocations: false,
        }
    }
}

impl DispatchOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            name_style: config.name_style(),
            warn_unhandled: config.warn_unhandled(),
            trace_invocations: config.trace_invocations(),
        }
    }
}

#[derive(Default)]
struct ContainerEntry {
    tables: Vec<MethodTable>,
    state: ConnectionState,
}

struct DispatcherInner {
    system: SystemRef,
    registry: Arc<MarshalRegistry>,
    options: DispatchOptions,
    containers: RefCell<FxHashMap<NativePtr, ContainerEntry>>,
}

/// Routes native signal emissions to registered callback objects
///
/// Cloning yields another handle to the same dispatcher.
#[derive(Clone)]
pub struct SignalDispatcher {
    inner: Rc<DispatcherInner>,
}

impl SignalDispatcher {
    /// Dispatcher decoding through the global registry
    pub fn new(system: &SystemRef) -> Self {
        Self::with_registry(system, Arc::clone(MarshalRegistry::global()), DispatchOptions::default())
    }

    pub fn with_registry(system: &SystemRef, registry: Arc<MarshalRegistry>, options: DispatchOptions) -> Self {
        Self {
            inner: Rc::new(DispatcherInner {
                system: Rc::clone(system),
                registry,
                options,
                containers: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.inner.options
    }

    pub fn registry(&self) -> &Arc<MarshalRegistry> {
        &self.inner.registry
    }

    /// Append callback objects to the container's list
    ///
    /// Dispatch searches them in registration order, across calls.
    pub fn register_callback_set<I>(&self, container: &impl AsNative, tables: I)
    where
        I: IntoIterator<Item = MethodTable>,
    {
        let key = container.as_native();
        self.track(key);
        let mut containers = self.inner.containers.borrow_mut();
        let entry = containers.entry(key).or_default();
        for table in tables {
            debug!(
                "container {}: callback object #{} '{}' ({} method(s))",
                key,
                entry.tables.len(),
                table.owner(),
                table.len()
            );
            entry.tables.push(table);
        }
    }

    /// Route every connection declared by the container through this dispatcher
    ///
    /// Returns the number of connections made.
    ///
    /// # Errors
    ///
    /// `NullHandle` for a null container, `AlreadyConnected` on a second call.
    pub fn connect_all(&self, container: &impl AsNative) -> BridgeResult<usize> {
        let key = container.as_native();
        if key.is_null() {
            return Err(BridgeError::null_handle("connect_all on a null container"));
        }
        self.track(key);
        {
            let mut containers = self.inner.containers.borrow_mut();
            let entry = containers.entry(key).or_default();
            if entry.state == ConnectionState::Connected {
                return Err(BridgeError::AlreadyConnected {
                    container: key.addr(),
                });
            }
            entry.state = ConnectionState::Connected;
        }

        let weak: Weak<DispatcherInner> = Rc::downgrade(&self.inner);
        let mut connector = |spec: &ConnectionSpec| -> NativeClosure {
            debug!(
                "connect '{}' on {} to handler '{}'",
                spec.signal, spec.object, spec.handler
            );
            let weak = weak.clone();
            let handler = spec.handler.clone();
            Box::new(move |params: &[BoxedValue]| match weak.upgrade() {
                Some(inner) => {
                    inner.dispatch(key, &handler, params);
                }
                None => debug!("dispatcher gone, ignoring '{}'", handler),
            })
        };
        let count = self.inner.system.connect_signals(key, &mut connector);
        debug!("container {}: {} connection(s) routed", key, count);
        Ok(count)
    }

    /// Deliver one native emission
    ///
    /// Never fails; see [`DispatchOutcome`] for what happened.
    pub fn dispatch(&self, container: &impl AsNative, signal: &str, params: &[BoxedValue]) -> DispatchOutcome {
        self.inner.dispatch(container.as_native(), signal, params)
    }

    /// Call a handler directly with host values
    ///
    /// Returns whether a callback object handled it.
    ///
    /// # Errors
    ///
    /// `CallbackSignature` if the matching method rejects the arguments.
    pub fn invoke(&self, container: &impl AsNative, signal: &str, args: &[Value]) -> BridgeResult<bool> {
        let method = normalize(signal, self.inner.options.name_style);
        let found = self.inner.invoke(container.as_native(), &method, args)?;
        Ok(found.is_some())
    }

    pub fn state(&self, container: &impl AsNative) -> ConnectionState {
        self.inner
            .containers
            .borrow()
            .get(&container.as_native())
            .map_or(ConnectionState::Unconnected, |e| e.state)
    }

    /// Create the container's entry and forget it once the container is finalized
    fn track(&self, key: NativePtr) {
        let created = {
            let mut containers = self.inner.containers.borrow_mut();
            if containers.contains_key(&key) {
                false
            } else {
                containers.insert(key, ContainerEntry::default());
                true
            }
        };
        if !created || key.is_null() {
            return;
        }
        let weak: Weak<DispatcherInner> = Rc::downgrade(&self.inner);
        self.inner.system.watch_finalize(
            key,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.forget(key);
                }
            }),
        );
    }

    /// Number of callback objects registered for the container
    pub fn callback_count(&self, container: &impl AsNative) -> usize {
        self.inner
            .containers
            .borrow()
            .get(&container.as_native())
            .map_or(0, |e| e.tables.len())
    }
}

impl DispatcherInner {
    fn forget(&self, container: NativePtr) {
        // Dropping the tables may release more native objects
        let removed = self.containers.borrow_mut().remove(&container);
        if let Some(entry) = removed {
            debug!(
                "container {} finalized, dropping {} callback object(s)",
                container,
                entry.tables.len()
            );
        }
    }

    fn dispatch(&self, container: NativePtr, signal: &str, params: &[BoxedValue]) -> DispatchOutcome {
        let method = normalize(signal, self.options.name_style);
        let ctx = MarshalContext::new(&self.system);

        let args = match self.registry.decode_all(params, &ctx) {
            Ok(args) => args,
            Err(err) => {
                warn!("Dropping signal '{}': {}", signal, err);
                return DispatchOutcome::Dropped {
                    method,
                    reason: err.to_string(),
                };
            }
        };

        match self.invoke(container, &method, &args) {
            Ok(Some(index)) => DispatchOutcome::Handled { method, index },
            Ok(None) => {
                if self.options.warn_unhandled {
                    warn!("Signal '{}' not defined", method);
                }
                DispatchOutcome::Unhandled { method }
            }
            Err(err) => {
                warn!("Dropping signal '{}': {}", signal, err);
                DispatchOutcome::Dropped {
                    method,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Find the first table exposing `method` and call it
    fn invoke(&self, container: NativePtr, method: &str, args: &[Value]) -> BridgeResult<Option<usize>> {
        // The borrow must end before the call: callbacks may register more
        // callback objects or dispatch again.
        let found: Option<(usize, Method)> = {
            let containers = self.containers.borrow();
            containers.get(&container).and_then(|entry| {
                entry
                    .tables
                    .iter()
                    .enumerate()
                    .find_map(|(index, table)| table.get(method).map(|m| (index, m.clone())))
            })
        };

        let Some((index, target)) = found else {
            return Ok(None);
        };
        if self.options.trace_invocations {
            debug!("invoke {} on callback object #{} ({} arg(s))", method, index, args.len());
        }
        target.invoke(args)?;
        Ok(Some(index))
    }
}
