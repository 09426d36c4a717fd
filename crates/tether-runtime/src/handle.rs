//! Lifetime bridge between Rust ownership and native reference counting
//!
//! A [`Handle`] owns exactly one logical reference on a native object for as
//! long as it is alive. How that reference is obtained depends on the
//! [`AcquireMode`] the caller picks from the native function's ownership
//! contract; it is given back exactly once, either through an explicit
//! [`Handle::release`] or when the handle is dropped.
//!
//! Instances of the object system are referenced through it. Other refcounted
//! natives (cairo contexts and surfaces) are wrapped with [`Handle::wrap_with`]
//! and the [`RefOps`] pair that owns their count.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use tether_runtime::handle::{AcquireMode, Handle};
//! use tether_runtime::native::{sim::SimSystem, SystemRef, TypeTag};
//!
//! let sim = Rc::new(SimSystem::new());
//! let system: SystemRef = sim.clone();
//!
//! let ptr = sim.create_object(TypeTag::OBJECT);
//! let handle = Handle::wrap(&system, ptr, AcquireMode::Borrowed).unwrap();
//! assert_eq!(sim.refcount(ptr), 2);
//!
//! drop(handle);
//! assert_eq!(sim.refcount(ptr), 1);
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::native::{NativePtr, SystemRef, TypeTag};
use log::trace;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// How a wrapped pointer's reference is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquireMode {
    /// The caller does not own a reference: take one
    Borrowed,
    /// The native function transferred a reference to the caller: adopt it
    Owned,
    /// The object may carry a floating reference: sink it
    FloatingSink,
}

/// Reference protocol of a resource that lives outside the object system
pub trait RefOps {
    /// Take one more strong reference (`cairo_reference`)
    fn add_ref(&self, ptr: NativePtr);

    /// Give one strong reference back (`cairo_destroy`)
    fn release(&self, ptr: NativePtr);

    fn is_floating(&self, _ptr: NativePtr) -> bool {
        false
    }

    /// Turn a floating reference into an owned one
    fn sink(&self, ptr: NativePtr) {
        self.add_ref(ptr);
    }
}

#[derive(Clone)]
enum Protocol {
    Object,
    Custom(Rc<dyn RefOps>),
}

impl Protocol {
    fn add_ref(&self, system: &SystemRef, ptr: NativePtr) {
        match self {
            Protocol::Object => system.ref_object(ptr),
            Protocol::Custom(ops) => ops.add_ref(ptr),
        }
    }

    fn release(&self, system: &SystemRef, ptr: NativePtr) {
        match self {
            Protocol::Object => system.unref_object(ptr),
            Protocol::Custom(ops) => ops.release(ptr),
        }
    }

    /// Sink a floating reference, or take a plain one if there is none.
    /// Wrapping the same object twice therefore sinks it at most once.
    fn sink(&self, system: &SystemRef, ptr: NativePtr) {
        match self {
            Protocol::Object if system.is_floating(ptr) => system.ref_sink(ptr),
            Protocol::Custom(ops) if ops.is_floating(ptr) => ops.sink(ptr),
            _ => self.add_ref(system, ptr),
        }
    }
}

/// Owner of one native reference
pub struct Handle {
    ptr: Cell<NativePtr>,
    system: SystemRef,
    protocol: Protocol,
}

impl Handle {
    /// Wrap a non-null pointer
    ///
    /// # Errors
    ///
    /// `NullHandle` if `ptr` is null; no reference operation is performed.
    pub fn wrap(system: &SystemRef, ptr: NativePtr, mode: AcquireMode) -> BridgeResult<Self> {
        if ptr.is_null() {
            return Err(BridgeError::null_handle(format!(
                "wrap as {:?}",
                mode
            )));
        }
        Ok(Self::acquire(system, ptr, mode, Protocol::Object))
    }

    /// Wrap a non-object resource whose count is owned by `ops`
    ///
    /// # Errors
    ///
    /// `NullHandle` if `ptr` is null; `ops` is never called.
    pub fn wrap_with(
        system: &SystemRef,
        ptr: NativePtr,
        mode: AcquireMode,
        ops: Rc<dyn RefOps>,
    ) -> BridgeResult<Self> {
        if ptr.is_null() {
            return Err(BridgeError::null_handle(format!(
                "wrap resource as {:?}",
                mode
            )));
        }
        Ok(Self::acquire(system, ptr, mode, Protocol::Custom(ops)))
    }

    /// Wrap a pointer that is allowed to be null ("not found" results)
    pub fn wrap_nullable(system: &SystemRef, ptr: NativePtr, mode: AcquireMode) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self::acquire(system, ptr, mode, Protocol::Object))
        }
    }

    /// Wrap the result of a native constructor
    ///
    /// # Errors
    ///
    /// `ConstructionFailed` with the native diagnostic text if `ptr` is null.
    pub fn construct(
        system: &SystemRef,
        constructor: &str,
        ptr: NativePtr,
        mode: AcquireMode,
    ) -> BridgeResult<Self> {
        if ptr.is_null() {
            return Err(BridgeError::ConstructionFailed {
                constructor: constructor.to_string(),
                message: system.last_error(),
            });
        }
        Ok(Self::acquire(system, ptr, mode, Protocol::Object))
    }

    fn acquire(system: &SystemRef, ptr: NativePtr, mode: AcquireMode, protocol: Protocol) -> Self {
        match mode {
            AcquireMode::Borrowed => protocol.add_ref(system, ptr),
            AcquireMode::Owned => {}
            AcquireMode::FloatingSink => protocol.sink(system, ptr),
        }
        trace!("acquire {} ({:?})", ptr, mode);
        Self {
            ptr: Cell::new(ptr),
            system: Rc::clone(system),
            protocol,
        }
    }

    /// Give the reference back now
    ///
    /// Safe to call any number of times; only the first call decrements.
    pub fn release(&self) {
        let ptr = self.ptr.replace(NativePtr::null());
        if ptr.is_null() {
            return;
        }
        trace!("release {}", ptr);
        self.protocol.release(&self.system, ptr);
    }

    /// Run a side-effecting native teardown (close, finish) and then release
    ///
    /// The reference is given back whether or not the teardown succeeds.
    ///
    /// # Errors
    ///
    /// `NullHandle` if the handle was already released, `Teardown` carrying
    /// the native error text if the teardown failed.
    pub fn finish<F>(self, operation: &str, teardown: F) -> BridgeResult<()>
    where
        F: FnOnce(NativePtr) -> Result<(), String>,
    {
        let ptr = self.native();
        if ptr.is_null() {
            return Err(BridgeError::null_handle(format!(
                "{} on a released handle",
                operation
            )));
        }
        let outcome = teardown(ptr);
        self.release();
        outcome.map_err(|message| BridgeError::Teardown {
            operation: operation.to_string(),
            message,
        })
    }

    /// Raw pointer, or the null sentinel once released
    pub fn native(&self) -> NativePtr {
        self.ptr.get()
    }

    pub fn is_released(&self) -> bool {
        self.ptr.get().is_null()
    }

    pub fn system(&self) -> &SystemRef {
        &self.system
    }

    /// Whether the count is owned by a [`RefOps`] rather than the object system
    pub fn is_resource(&self) -> bool {
        matches!(self.protocol, Protocol::Custom(_))
    }

    /// Dynamic type of the wrapped object, `INVALID` for resources
    pub fn type_tag(&self) -> TypeTag {
        if self.is_released() || self.is_resource() {
            return TypeTag::INVALID;
        }
        self.system.type_of(self.native())
    }

    pub fn type_name(&self) -> Option<String> {
        self.system.type_name(self.type_tag())
    }
}

impl Clone for Handle {
    /// A clone owns its own reference
    fn clone(&self) -> Self {
        let ptr = self.native();
        if !ptr.is_null() {
            self.protocol.add_ref(&self.system, ptr);
        }
        Self {
            ptr: Cell::new(ptr),
            system: Rc::clone(&self.system),
            protocol: self.protocol.clone(),
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("ptr", &self.native())
            .field("released", &self.is_released())
            .field("resource", &self.is_resource())
            .finish()
    }
}

/// Anything that can be passed where a native pointer is expected
///
/// `None` maps to the null sentinel so call chains on a "not found" result
/// degrade to native no-ops instead of failing on the Rust side.
pub trait AsNative {
    fn as_native(&self) -> NativePtr;
}

impl AsNative for NativePtr {
    fn as_native(&self) -> NativePtr {
        *self
    }
}

impl AsNative for Handle {
    fn as_native(&self) -> NativePtr {
        self.native()
    }
}

impl<T: AsNative + ?Sized> AsNative for &T {
    fn as_native(&self) -> NativePtr {
        (**self).as_native()
    }
}

impl<T: AsNative> AsNative for Option<T> {
    fn as_native(&self) -> NativePtr {
        self.as_ref().map_or(NativePtr::null(), AsNative::as_native)
    }
}

/// Raw pointer of an optional handle, null for `None`
pub fn native_or_null(handle: Option<&Handle>) -> NativePtr {
    handle.as_native()
}

/// Check that a native call returned something before wrapping it
pub fn check_null(ptr: NativePtr, context: &str) -> BridgeResult<NativePtr> {
    if ptr.is_null() {
        Err(BridgeError::null_handle(context))
    } else {
        Ok(ptr)
    }
}
