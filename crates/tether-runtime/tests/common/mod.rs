//! Shared test utilities
//!
//! Every test builds its own simulated object system so reference counts and
//! connections never leak between tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tether_runtime::native::sim::SimSystem;
use tether_runtime::signal::{DispatchOptions, SignalDispatcher};
use tether_runtime::{MarshalRegistry, SystemRef};

/// A simulated system plus a private registry with the default marshalers
pub struct Fixture {
    pub sim: Rc<SimSystem>,
    pub system: SystemRef,
    pub registry: Arc<MarshalRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        let sim = Rc::new(SimSystem::new());
        let system: SystemRef = sim.clone();
        Self {
            sim,
            system,
            registry: Arc::new(MarshalRegistry::with_defaults()),
        }
    }

    /// Dispatcher over this fixture's registry with default options
    pub fn dispatcher(&self) -> SignalDispatcher {
        self.dispatcher_with(DispatchOptions::default())
    }

    pub fn dispatcher_with(&self, options: DispatchOptions) -> SignalDispatcher {
        SignalDispatcher::with_registry(&self.system, Arc::clone(&self.registry), options)
    }
}

/// Install the test logger once per binary
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Ordered record of callback invocations
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
