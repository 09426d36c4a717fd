//! In-process object system
//!
//! `SimSystem` behaves like the GObject core for the parts the bridge relies
//! on: strong counts with finalization at zero, floating references sunk by
//! `ref_sink`, a dynamic type hierarchy, installed properties, UI containers
//! that declare signal connections, and closable streams. Every reference
//! operation is counted per object so lifetime properties can be asserted.
//!
//! It also hosts plain refcounted resources outside the object system (the
//! shape of cairo contexts and surfaces), reached only through their own
//! reference/destroy pair.

use crate::native::{
    BoxedValue, ConnectionSpec, FinalizeNotify, NativeClosure, NativePtr, ObjectSystem, RawPayload,
    TypeTag,
};
use log::{debug, error, trace};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Per-object reference traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefStats {
    pub refs: u32,
    pub unrefs: u32,
    /// Calls to `ref_sink`
    pub sinks: u32,
    /// `ref_sink` calls that cleared the floating flag
    pub sink_transitions: u32,
}

#[derive(Debug)]
struct SimObject {
    tag: TypeTag,
    refcount: u32,
    floating: bool,
    finalized: bool,
    stats: RefStats,
    properties: FxHashMap<String, BoxedValue>,
    connections: Vec<ConnectionSpec>,
    stream: Option<StreamState>,
}

#[derive(Debug, Default)]
struct StreamState {
    closed: bool,
    close_error: Option<String>,
}

#[derive(Debug)]
struct SimType {
    name: String,
    parent: TypeTag,
}

#[derive(Debug)]
struct SimState {
    objects: FxHashMap<NativePtr, SimObject>,
    types: FxHashMap<TypeTag, SimType>,
    next_addr: usize,
    next_type: usize,
    last_error: Option<String>,
    finalized: Vec<NativePtr>,
    invalid_accesses: usize,
    /// Strong counts of non-object resources; zero once destroyed
    resources: FxHashMap<NativePtr, u32>,
}

type SharedClosure = Rc<dyn Fn(&[BoxedValue])>;

/// Simulated native object system
pub struct SimSystem {
    state: RefCell<SimState>,
    closures: RefCell<FxHashMap<(NativePtr, String), Vec<SharedClosure>>>,
    finalize_hooks: RefCell<FxHashMap<NativePtr, Vec<FinalizeNotify>>>,
}

/// Type name of UI containers created by [`SimSystem::create_container`]
pub const CONTAINER_TYPE_NAME: &str = "GtkBuilder";
/// Type name of streams created by [`SimSystem::create_stream`]
pub const STREAM_TYPE_NAME: &str = "GInputStream";
/// Base type of floating objects
pub const INITIALLY_UNOWNED_TYPE_NAME: &str = "GInitiallyUnowned";

impl SimSystem {
    pub fn new() -> Self {
        let system = Self {
            state: RefCell::new(SimState {
                objects: FxHashMap::default(),
                types: FxHashMap::default(),
                next_addr: 0x1000,
                next_type: TypeTag::FUNDAMENTAL_MAX + 4,
                last_error: None,
                finalized: Vec::new(),
                invalid_accesses: 0,
                resources: FxHashMap::default(),
            }),
            closures: RefCell::new(FxHashMap::default()),
            finalize_hooks: RefCell::new(FxHashMap::default()),
        };
        system.register_type(INITIALLY_UNOWNED_TYPE_NAME, TypeTag::OBJECT);
        system.register_type(CONTAINER_TYPE_NAME, TypeTag::OBJECT);
        system.register_type(STREAM_TYPE_NAME, TypeTag::OBJECT);
        system
    }

    /// Register a derived type and return its tag
    pub fn register_type(&self, name: &str, parent: TypeTag) -> TypeTag {
        let mut state = self.state.borrow_mut();
        let tag = TypeTag(state.next_type);
        state.next_type += 4;
        state.types.insert(
            tag,
            SimType {
                name: name.to_string(),
                parent,
            },
        );
        tag
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeTag> {
        let state = self.state.borrow();
        if let Some((tag, _)) = state.types.iter().find(|(_, t)| t.name == name) {
            return Some(*tag);
        }
        (0..=21)
            .map(TypeTag::make_fundamental)
            .find(|tag| tag.fundamental_name() == Some(name))
    }

    /// New object holding one strong, non-floating reference
    pub fn create_object(&self, tag: TypeTag) -> NativePtr {
        self.insert_object(tag, false)
    }

    /// New object holding one floating reference
    pub fn create_floating(&self, tag: TypeTag) -> NativePtr {
        self.insert_object(tag, true)
    }

    /// Simulate a constructor that fails with `message` and returns null
    pub fn fail_construction(&self, message: &str) -> NativePtr {
        self.state.borrow_mut().last_error = Some(message.to_string());
        NativePtr::null()
    }

    /// New UI container
    pub fn create_container(&self) -> NativePtr {
        let tag = self.builtin(CONTAINER_TYPE_NAME);
        self.create_object(tag)
    }

    /// New stream that must be closed before release
    pub fn create_stream(&self) -> NativePtr {
        let tag = self.builtin(STREAM_TYPE_NAME);
        let ptr = self.create_object(tag);
        if let Some(obj) = self.state.borrow_mut().objects.get_mut(&ptr) {
            obj.stream = Some(StreamState::default());
        }
        ptr
    }

    /// Declare that `container` connects `signal` on `object` to `handler`
    pub fn declare_connection(&self, container: NativePtr, object: NativePtr, signal: &str, handler: &str) {
        let mut state = self.state.borrow_mut();
        match state.objects.get_mut(&container) {
            Some(obj) if !obj.finalized => obj.connections.push(ConnectionSpec {
                object,
                signal: signal.to_string(),
                handler: handler.to_string(),
            }),
            _ => {
                error!("declare_connection on dead container {}", container);
                state.invalid_accesses += 1;
            }
        }
    }

    /// Install a property with its initial value
    pub fn install_property(&self, ptr: NativePtr, name: &str, value: BoxedValue) {
        if let Some(obj) = self.state.borrow_mut().objects.get_mut(&ptr) {
            obj.properties.insert(name.to_string(), value);
        }
    }

    /// New refcounted resource outside the object system, holding one reference
    pub fn create_resource(&self) -> NativePtr {
        let mut state = self.state.borrow_mut();
        let ptr = NativePtr::from_addr(state.next_addr);
        state.next_addr += 0x10;
        state.resources.insert(ptr, 1);
        ptr
    }

    /// `cairo_reference` for simulated resources
    pub fn reference_resource(&self, ptr: NativePtr) {
        let mut state = self.state.borrow_mut();
        match state.resources.get_mut(&ptr) {
            Some(count) if *count > 0 => *count += 1,
            _ => {
                error!("reference on destroyed or unknown resource {}", ptr);
                state.invalid_accesses += 1;
            }
        }
    }

    /// `cairo_destroy` for simulated resources: drops one reference
    pub fn destroy_resource(&self, ptr: NativePtr) {
        let mut state = self.state.borrow_mut();
        match state.resources.get_mut(&ptr) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    trace!("destroy resource {}", ptr);
                }
            }
            _ => {
                error!("destroy on destroyed or unknown resource {}", ptr);
                state.invalid_accesses += 1;
            }
        }
    }

    /// Strong count of a resource (0 once destroyed or if unknown)
    pub fn resource_refcount(&self, ptr: NativePtr) -> u32 {
        self.state.borrow().resources.get(&ptr).copied().unwrap_or(0)
    }

    /// Emit `signal` on `object`, invoking every connected closure in
    /// connection order. Returns the number of closures run.
    pub fn emit(&self, object: NativePtr, signal: &str, params: &[BoxedValue]) -> usize {
        let handlers: Vec<SharedClosure> = self
            .closures
            .borrow()
            .get(&(object, signal.to_string()))
            .cloned()
            .unwrap_or_default();
        trace!("emit {} on {} ({} handler(s))", signal, object, handlers.len());
        for handler in &handlers {
            handler(params);
        }
        handlers.len()
    }

    /// Number of closures connected to `signal` on `object`
    pub fn connection_count(&self, object: NativePtr, signal: &str) -> usize {
        self.closures
            .borrow()
            .get(&(object, signal.to_string()))
            .map_or(0, Vec::len)
    }

    /// Make the next close of `stream` fail with `message`
    pub fn fail_next_close(&self, stream: NativePtr, message: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(s) = state.objects.get_mut(&stream).and_then(|o| o.stream.as_mut()) {
            s.close_error = Some(message.to_string());
        }
    }

    /// Close a stream, reporting the native error text on failure
    pub fn close_stream(&self, stream: NativePtr) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let obj = match state.objects.get_mut(&stream) {
            Some(obj) if !obj.finalized => obj,
            _ => return Err(format!("stream {} is not alive", stream)),
        };
        let s = obj
            .stream
            .as_mut()
            .ok_or_else(|| format!("object {} is not a stream", stream))?;
        if s.closed {
            return Err("Stream is already closed".to_string());
        }
        s.closed = true;
        match s.close_error.take() {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self, stream: NativePtr) -> bool {
        let state = self.state.borrow();
        state
            .objects
            .get(&stream)
            .and_then(|o| o.stream.as_ref())
            .map_or(false, |s| s.closed)
    }

    /// Current strong count (0 once finalized or if unknown)
    pub fn refcount(&self, ptr: NativePtr) -> u32 {
        self.state
            .borrow()
            .objects
            .get(&ptr)
            .map_or(0, |o| o.refcount)
    }

    pub fn is_alive(&self, ptr: NativePtr) -> bool {
        self.state
            .borrow()
            .objects
            .get(&ptr)
            .map_or(false, |o| !o.finalized)
    }

    pub fn stats(&self, ptr: NativePtr) -> RefStats {
        self.state
            .borrow()
            .objects
            .get(&ptr)
            .map(|o| o.stats)
            .unwrap_or_default()
    }

    /// Objects finalized so far, in finalization order
    pub fn finalized(&self) -> Vec<NativePtr> {
        self.state.borrow().finalized.clone()
    }

    /// Reference operations attempted on dead or unknown objects
    pub fn invalid_accesses(&self) -> usize {
        self.state.borrow().invalid_accesses
    }

    /// Every ref, unref and sink performed so far, across all objects
    pub fn reference_operations(&self) -> u64 {
        let state = self.state.borrow();
        let counted: u64 = state
            .objects
            .values()
            .map(|o| (o.stats.refs + o.stats.unrefs + o.stats.sinks) as u64)
            .sum();
        counted + state.invalid_accesses as u64
    }

    /// Hand out a boxed value the way `g_object_get_property` does: boxed
    /// structs as a fresh copy, objects with an extra reference. The copy or
    /// reference is gone once `visit` returns.
    fn with_transient(&self, value: &BoxedValue, fundamental: TypeTag, visit: &mut dyn FnMut(&BoxedValue)) {
        let ptr = match value.payload() {
            RawPayload::Pointer(ptr) if !ptr.is_null() => *ptr,
            _ => return visit(value),
        };
        match fundamental {
            TypeTag::BOXED => {
                let copy = self.insert_object(value.tag(), false);
                visit(&BoxedValue::pointer(value.tag(), copy));
                self.state.borrow_mut().objects.remove(&copy);
                trace!("free boxed copy {} of {}", copy, ptr);
            }
            TypeTag::OBJECT => {
                self.ref_object(ptr);
                visit(value);
                self.unref_object(ptr);
            }
            _ => visit(value),
        }
    }

    fn builtin(&self, name: &str) -> TypeTag {
        self.lookup_type(name).unwrap_or(TypeTag::OBJECT)
    }

    fn insert_object(&self, tag: TypeTag, floating: bool) -> NativePtr {
        let mut state = self.state.borrow_mut();
        let ptr = NativePtr::from_addr(state.next_addr);
        state.next_addr += 0x10;
        state.objects.insert(
            ptr,
            SimObject {
                tag,
                refcount: 1,
                floating,
                finalized: false,
                stats: RefStats::default(),
                properties: FxHashMap::default(),
                connections: Vec::new(),
                stream: None,
            },
        );
        ptr
    }

    fn with_live<R>(&self, ptr: NativePtr, op: &str, f: impl FnOnce(&mut SimObject) -> R) -> Option<R> {
        let mut state = self.state.borrow_mut();
        match state.objects.get_mut(&ptr) {
            Some(obj) if !obj.finalized => Some(f(obj)),
            _ => {
                error!("{} on dead or unknown object {}", op, ptr);
                state.invalid_accesses += 1;
                None
            }
        }
    }
}

impl SimState {
    fn parent(&self, tag: TypeTag) -> Option<TypeTag> {
        if tag.is_fundamental() {
            None
        } else {
            self.types.get(&tag).map(|t| t.parent)
        }
    }

    fn fundamental(&self, tag: TypeTag) -> TypeTag {
        let mut current = tag;
        while !current.is_fundamental() {
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return TypeTag::INVALID,
            }
        }
        current
    }

    fn is_a(&self, tag: TypeTag, ancestor: TypeTag) -> bool {
        let mut current = Some(tag);
        while let Some(t) = current {
            if t == ancestor {
                return true;
            }
            current = self.parent(t);
        }
        false
    }
}

impl Default for SimSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectSystem for SimSystem {
    fn ref_object(&self, ptr: NativePtr) {
        self.with_live(ptr, "ref", |obj| {
            obj.refcount += 1;
            obj.stats.refs += 1;
        });
    }

    fn unref_object(&self, ptr: NativePtr) {
        let finalized = self.with_live(ptr, "unref", |obj| {
            obj.stats.unrefs += 1;
            obj.refcount -= 1;
            if obj.refcount == 0 {
                obj.finalized = true;
                obj.connections.clear();
                true
            } else {
                false
            }
        });
        if finalized == Some(true) {
            trace!("finalize {}", ptr);
            self.state.borrow_mut().finalized.push(ptr);
            let removed: Vec<Vec<SharedClosure>> = {
                let mut closures = self.closures.borrow_mut();
                let keys: Vec<_> = closures.keys().filter(|(o, _)| *o == ptr).cloned().collect();
                keys.iter().filter_map(|k| closures.remove(k)).collect()
            };
            drop(removed);
            let hooks = self.finalize_hooks.borrow_mut().remove(&ptr).unwrap_or_default();
            for notify in hooks {
                notify();
            }
        }
    }

    fn ref_sink(&self, ptr: NativePtr) {
        self.with_live(ptr, "ref_sink", |obj| {
            obj.stats.sinks += 1;
            if obj.floating {
                obj.floating = false;
                obj.stats.sink_transitions += 1;
            } else {
                obj.refcount += 1;
            }
        });
    }

    fn is_floating(&self, ptr: NativePtr) -> bool {
        self.state
            .borrow()
            .objects
            .get(&ptr)
            .map_or(false, |o| o.floating && !o.finalized)
    }

    fn type_of(&self, ptr: NativePtr) -> TypeTag {
        self.state
            .borrow()
            .objects
            .get(&ptr)
            .map_or(TypeTag::INVALID, |o| o.tag)
    }

    fn type_name(&self, tag: TypeTag) -> Option<String> {
        if let Some(name) = tag.fundamental_name() {
            return Some(name.to_string());
        }
        self.state.borrow().types.get(&tag).map(|t| t.name.clone())
    }

    fn type_parent(&self, tag: TypeTag) -> Option<TypeTag> {
        self.state.borrow().parent(tag)
    }

    fn fundamental(&self, tag: TypeTag) -> TypeTag {
        self.state.borrow().fundamental(tag)
    }

    fn get_property(&self, ptr: NativePtr, name: &str, visit: &mut dyn FnMut(&BoxedValue)) -> bool {
        let (value, fundamental) = {
            let state = self.state.borrow();
            let value = state
                .objects
                .get(&ptr)
                .filter(|o| !o.finalized)
                .and_then(|o| o.properties.get(name).cloned());
            match value {
                Some(value) => {
                    let fundamental = state.fundamental(value.tag());
                    (value, fundamental)
                }
                None => return false,
            }
        };
        self.with_transient(&value, fundamental, visit);
        true
    }

    fn set_property(&self, ptr: NativePtr, name: &str, value: &BoxedValue) -> Result<(), String> {
        let mut state = self.state.borrow_mut();
        let (installed, type_name) = {
            let obj = state
                .objects
                .get(&ptr)
                .filter(|o| !o.finalized)
                .ok_or_else(|| format!("object {} is not alive", ptr))?;
            let installed = obj
                .properties
                .get(name)
                .map(|v| v.tag())
                .ok_or_else(|| format!("object class has no property named '{}'", name))?;
            (installed, obj.tag)
        };
        if !state.is_a(value.tag(), installed) {
            return Err(format!(
                "unable to set property '{}' of type {} from value of type {} (object type {})",
                name,
                installed,
                value.tag(),
                type_name
            ));
        }
        if let Some(obj) = state.objects.get_mut(&ptr) {
            obj.properties.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    fn connect_signals(
        &self,
        container: NativePtr,
        connector: &mut dyn FnMut(&ConnectionSpec) -> NativeClosure,
    ) -> usize {
        let connections = match self.state.borrow().objects.get(&container) {
            Some(obj) if !obj.finalized => obj.connections.clone(),
            _ => Vec::new(),
        };
        for spec in &connections {
            let closure: SharedClosure = Rc::from(connector(spec));
            self.closures
                .borrow_mut()
                .entry((spec.object, spec.signal.clone()))
                .or_default()
                .push(closure);
        }
        connections.len()
    }

    fn watch_finalize(&self, ptr: NativePtr, notify: FinalizeNotify) {
        if !self.is_alive(ptr) {
            debug!("finalize watch on dead or unknown object {} dropped", ptr);
            return;
        }
        self.finalize_hooks.borrow_mut().entry(ptr).or_default().push(notify);
    }

    fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }
}
