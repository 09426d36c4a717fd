//! GObject / GTK 3 backend
//!
//! Implements [`ObjectSystem`] directly on top of libgobject and libgtk-3.
//! Signal wiring goes through `gtk_builder_connect_signals_full`: each declared
//! connection gets a `GClosure` whose meta-marshal converts the native
//! `GValue` parameters into [`BoxedValue`]s and calls the bridge closure.
//!
//! Parameter lists include the emitting instance first, as GLib delivers them.

use crate::handle::RefOps;
use crate::native::{
    BoxedValue, ConnectionSpec, FinalizeNotify, NativeClosure, NativePtr, ObjectSystem, RawPayload,
    TypeTag,
};
use log::{debug, warn};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_double, c_float, c_int, c_long, c_uint, c_ulong, c_void};

#[repr(C)]
struct GValue {
    g_type: usize,
    data: [u64; 2],
}

impl GValue {
    fn zeroed() -> Self {
        GValue {
            g_type: 0,
            data: [0; 2],
        }
    }
}

#[repr(C)]
struct GTypeInstance {
    g_class: *mut c_void,
}

#[repr(C)]
#[allow(dead_code)]
struct GParamSpec {
    g_type_instance: GTypeInstance,
    name: *const c_char,
    flags: c_int,
    value_type: usize,
    owner_type: usize,
}

#[repr(C)]
#[allow(dead_code)]
struct GClosure {
    flags: c_uint,
    marshal: *mut c_void,
    data: *mut c_void,
    notifiers: *mut c_void,
}

#[repr(C)]
#[allow(dead_code)]
struct GError {
    domain: u32,
    code: c_int,
    message: *mut c_char,
}

type GClosureMarshal = unsafe extern "C" fn(
    closure: *mut GClosure,
    return_value: *mut GValue,
    n_param_values: c_uint,
    param_values: *const GValue,
    invocation_hint: *mut c_void,
    marshal_data: *mut c_void,
);

type GClosureNotify = unsafe extern "C" fn(data: *mut c_void, closure: *mut GClosure);

type GWeakNotify = unsafe extern "C" fn(data: *mut c_void, where_the_object_was: *mut c_void);

type GtkBuilderConnectFunc = unsafe extern "C" fn(
    builder: *mut c_void,
    object: *mut c_void,
    signal_name: *const c_char,
    handler_name: *const c_char,
    connect_object: *mut c_void,
    flags: c_int,
    user_data: *mut c_void,
);

#[link(name = "glib-2.0")]
extern "C" {
    fn g_error_free(error: *mut GError);
}

#[link(name = "gobject-2.0")]
extern "C" {
    fn g_object_ref(object: *mut c_void) -> *mut c_void;
    fn g_object_unref(object: *mut c_void);
    fn g_object_ref_sink(object: *mut c_void) -> *mut c_void;
    fn g_object_is_floating(object: *mut c_void) -> c_int;
    fn g_object_class_find_property(class: *mut c_void, name: *const c_char) -> *mut GParamSpec;
    fn g_object_get_property(object: *mut c_void, name: *const c_char, value: *mut GValue);
    fn g_object_set_property(object: *mut c_void, name: *const c_char, value: *const GValue);
    fn g_object_weak_ref(object: *mut c_void, notify: GWeakNotify, data: *mut c_void);

    fn g_type_name(type_: usize) -> *const c_char;
    fn g_type_parent(type_: usize) -> usize;
    fn g_type_fundamental(type_: usize) -> usize;

    fn g_value_init(value: *mut GValue, type_: usize) -> *mut GValue;
    fn g_value_unset(value: *mut GValue);
    fn g_value_get_boolean(value: *const GValue) -> c_int;
    fn g_value_set_boolean(value: *mut GValue, v: c_int);
    fn g_value_get_schar(value: *const GValue) -> i8;
    fn g_value_set_schar(value: *mut GValue, v: i8);
    fn g_value_get_uchar(value: *const GValue) -> u8;
    fn g_value_set_uchar(value: *mut GValue, v: u8);
    fn g_value_get_int(value: *const GValue) -> c_int;
    fn g_value_set_int(value: *mut GValue, v: c_int);
    fn g_value_get_uint(value: *const GValue) -> c_uint;
    fn g_value_set_uint(value: *mut GValue, v: c_uint);
    fn g_value_get_long(value: *const GValue) -> c_long;
    fn g_value_set_long(value: *mut GValue, v: c_long);
    fn g_value_get_ulong(value: *const GValue) -> c_ulong;
    fn g_value_set_ulong(value: *mut GValue, v: c_ulong);
    fn g_value_get_int64(value: *const GValue) -> i64;
    fn g_value_set_int64(value: *mut GValue, v: i64);
    fn g_value_get_uint64(value: *const GValue) -> u64;
    fn g_value_set_uint64(value: *mut GValue, v: u64);
    fn g_value_get_enum(value: *const GValue) -> c_int;
    fn g_value_set_enum(value: *mut GValue, v: c_int);
    fn g_value_get_flags(value: *const GValue) -> c_uint;
    fn g_value_set_flags(value: *mut GValue, v: c_uint);
    fn g_value_get_float(value: *const GValue) -> c_float;
    fn g_value_set_float(value: *mut GValue, v: c_float);
    fn g_value_get_double(value: *const GValue) -> c_double;
    fn g_value_set_double(value: *mut GValue, v: c_double);
    fn g_value_get_string(value: *const GValue) -> *const c_char;
    fn g_value_set_string(value: *mut GValue, v: *const c_char);
    fn g_value_get_pointer(value: *const GValue) -> *mut c_void;
    fn g_value_set_pointer(value: *mut GValue, v: *mut c_void);
    fn g_value_get_object(value: *const GValue) -> *mut c_void;
    fn g_value_set_object(value: *mut GValue, v: *mut c_void);
    fn g_value_get_boxed(value: *const GValue) -> *mut c_void;
    fn g_value_set_boxed(value: *mut GValue, v: *const c_void);
    fn g_value_peek_pointer(value: *const GValue) -> *mut c_void;

    fn g_closure_new_simple(sizeof_closure: c_uint, data: *mut c_void) -> *mut GClosure;
    fn g_closure_set_meta_marshal(
        closure: *mut GClosure,
        marshal_data: *mut c_void,
        meta_marshal: GClosureMarshal,
    );
    fn g_closure_add_finalize_notifier(
        closure: *mut GClosure,
        notify_data: *mut c_void,
        notify_func: GClosureNotify,
    );
    fn g_signal_connect_closure(
        instance: *mut c_void,
        detailed_signal: *const c_char,
        closure: *mut GClosure,
        after: c_int,
    ) -> c_ulong;
}

#[link(name = "cairo")]
extern "C" {
    fn cairo_reference(cr: *mut c_void) -> *mut c_void;
    fn cairo_destroy(cr: *mut c_void);
    fn cairo_surface_reference(surface: *mut c_void) -> *mut c_void;
    fn cairo_surface_destroy(surface: *mut c_void);
}

#[link(name = "gtk-3")]
extern "C" {
    fn gtk_builder_connect_signals_full(
        builder: *mut c_void,
        func: GtkBuilderConnectFunc,
        user_data: *mut c_void,
    );
}

/// The real native object system
#[derive(Default)]
pub struct GObjectSystem {
    last_error: RefCell<Option<String>>,
}

impl GObjectSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a diagnostic for the next `last_error` query
    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.borrow_mut() = Some(message.into());
    }

    /// Take the message out of a `GError*` out-parameter and free it
    ///
    /// # Safety
    ///
    /// `error` must be null or a valid `GError*` owned by the caller.
    pub unsafe fn record_gerror(&self, error: *mut c_void) {
        if error.is_null() {
            return;
        }
        let error = error as *mut GError;
        let message = cstr_lossy((*error).message);
        g_error_free(error);
        self.record_error(message);
    }
}

/// Reference protocol of `cairo_t` drawing contexts
#[derive(Debug, Clone, Copy, Default)]
pub struct CairoContextRefs;

impl RefOps for CairoContextRefs {
    fn add_ref(&self, ptr: NativePtr) {
        unsafe {
            cairo_reference(ptr.as_raw());
        }
    }

    fn release(&self, ptr: NativePtr) {
        unsafe { cairo_destroy(ptr.as_raw()) }
    }
}

/// Reference protocol of `cairo_surface_t`
#[derive(Debug, Clone, Copy, Default)]
pub struct CairoSurfaceRefs;

impl RefOps for CairoSurfaceRefs {
    fn add_ref(&self, ptr: NativePtr) {
        unsafe {
            cairo_surface_reference(ptr.as_raw());
        }
    }

    fn release(&self, ptr: NativePtr) {
        unsafe { cairo_surface_destroy(ptr.as_raw()) }
    }
}

struct ConnectState<'a> {
    connector: &'a mut dyn FnMut(&ConnectionSpec) -> NativeClosure,
    count: usize,
}

fn cstr_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

unsafe fn boxed_from_gvalue(value: *const GValue) -> BoxedValue {
    let tag = TypeTag((*value).g_type);
    let payload = match TypeTag(g_type_fundamental(tag.0)) {
        TypeTag::BOOLEAN => RawPayload::Bool(g_value_get_boolean(value) != 0),
        TypeTag::CHAR => RawPayload::Int(g_value_get_schar(value) as i64),
        TypeTag::UCHAR => RawPayload::UInt(g_value_get_uchar(value) as u64),
        TypeTag::INT => RawPayload::Int(g_value_get_int(value) as i64),
        TypeTag::UINT => RawPayload::UInt(g_value_get_uint(value) as u64),
        TypeTag::LONG => RawPayload::Int(g_value_get_long(value) as i64),
        TypeTag::ULONG => RawPayload::UInt(g_value_get_ulong(value) as u64),
        TypeTag::INT64 => RawPayload::Int(g_value_get_int64(value)),
        TypeTag::UINT64 => RawPayload::UInt(g_value_get_uint64(value)),
        TypeTag::ENUM => RawPayload::Int(g_value_get_enum(value) as i64),
        TypeTag::FLAGS => RawPayload::UInt(g_value_get_flags(value) as u64),
        TypeTag::FLOAT => RawPayload::Double(g_value_get_float(value) as f64),
        TypeTag::DOUBLE => RawPayload::Double(g_value_get_double(value)),
        TypeTag::STRING => {
            let s = g_value_get_string(value);
            RawPayload::Str(if s.is_null() { None } else { Some(cstr_lossy(s)) })
        }
        TypeTag::POINTER => RawPayload::Pointer(NativePtr::from_raw(g_value_get_pointer(value))),
        TypeTag::OBJECT => RawPayload::Pointer(NativePtr::from_raw(g_value_get_object(value))),
        TypeTag::BOXED => RawPayload::Pointer(NativePtr::from_raw(g_value_get_boxed(value))),
        TypeTag::INTERFACE | TypeTag::PARAM | TypeTag::VARIANT => {
            RawPayload::Pointer(NativePtr::from_raw(g_value_peek_pointer(value)))
        }
        _ => RawPayload::Empty,
    };
    BoxedValue::new(tag, payload)
}

/// Fill an initialized `GValue` from a boxed value
unsafe fn store_in_gvalue(target: *mut GValue, boxed: &BoxedValue) -> Result<(), String> {
    let fundamental = TypeTag(g_type_fundamental((*target).g_type));
    match (fundamental, boxed.payload()) {
        (TypeTag::BOOLEAN, RawPayload::Bool(b)) => g_value_set_boolean(target, *b as c_int),
        (TypeTag::CHAR, RawPayload::Int(i)) => g_value_set_schar(target, *i as i8),
        (TypeTag::UCHAR, RawPayload::UInt(u)) => g_value_set_uchar(target, *u as u8),
        (TypeTag::INT, RawPayload::Int(i)) => g_value_set_int(target, *i as c_int),
        (TypeTag::UINT, RawPayload::UInt(u)) => g_value_set_uint(target, *u as c_uint),
        (TypeTag::LONG, RawPayload::Int(i)) => g_value_set_long(target, *i as c_long),
        (TypeTag::ULONG, RawPayload::UInt(u)) => g_value_set_ulong(target, *u as c_ulong),
        (TypeTag::INT64, RawPayload::Int(i)) => g_value_set_int64(target, *i),
        (TypeTag::UINT64, RawPayload::UInt(u)) => g_value_set_uint64(target, *u),
        (TypeTag::ENUM, RawPayload::Int(i)) => g_value_set_enum(target, *i as c_int),
        (TypeTag::FLAGS, RawPayload::UInt(u)) => g_value_set_flags(target, *u as c_uint),
        (TypeTag::FLOAT, RawPayload::Double(d)) => g_value_set_float(target, *d as c_float),
        (TypeTag::DOUBLE, RawPayload::Double(d)) => g_value_set_double(target, *d),
        (TypeTag::STRING, RawPayload::Str(s)) => match s {
            Some(s) => {
                let c = CString::new(s.as_str()).map_err(|e| e.to_string())?;
                // g_value_set_string copies
                g_value_set_string(target, c.as_ptr());
            }
            None => g_value_set_string(target, std::ptr::null()),
        },
        (TypeTag::POINTER, RawPayload::Pointer(p)) => g_value_set_pointer(target, p.as_raw()),
        (TypeTag::OBJECT | TypeTag::INTERFACE, RawPayload::Pointer(p)) => {
            g_value_set_object(target, p.as_raw())
        }
        (TypeTag::BOXED, RawPayload::Pointer(p)) => g_value_set_boxed(target, p.as_raw()),
        (fundamental, payload) => {
            return Err(format!(
                "cannot store a {} payload in a value of fundamental type {}",
                payload.kind(),
                fundamental
            ))
        }
    }
    Ok(())
}

unsafe extern "C" fn meta_marshal(
    _closure: *mut GClosure,
    _return_value: *mut GValue,
    n_param_values: c_uint,
    param_values: *const GValue,
    _invocation_hint: *mut c_void,
    marshal_data: *mut c_void,
) {
    if marshal_data.is_null() {
        return;
    }
    let closure = &*(marshal_data as *const NativeClosure);
    let params: Vec<BoxedValue> = (0..n_param_values as usize)
        .map(|i| boxed_from_gvalue(param_values.add(i)))
        .collect();
    closure(&params);
}

unsafe extern "C" fn run_finalize_notify(data: *mut c_void, _where_the_object_was: *mut c_void) {
    if !data.is_null() {
        let notify = Box::from_raw(data as *mut FinalizeNotify);
        notify();
    }
}

unsafe extern "C" fn drop_closure_data(data: *mut c_void, _closure: *mut GClosure) {
    if !data.is_null() {
        drop(Box::from_raw(data as *mut NativeClosure));
    }
}

unsafe extern "C" fn connect_trampoline(
    _builder: *mut c_void,
    object: *mut c_void,
    signal_name: *const c_char,
    handler_name: *const c_char,
    _connect_object: *mut c_void,
    _flags: c_int,
    user_data: *mut c_void,
) {
    if user_data.is_null() || object.is_null() || signal_name.is_null() {
        return;
    }
    let state = &mut *(user_data as *mut ConnectState<'_>);
    let spec = ConnectionSpec {
        object: NativePtr::from_raw(object),
        signal: cstr_lossy(signal_name),
        handler: cstr_lossy(handler_name),
    };
    let closure = (state.connector)(&spec);
    let data = Box::into_raw(Box::new(closure)) as *mut c_void;

    let gclosure = g_closure_new_simple(std::mem::size_of::<GClosure>() as c_uint, std::ptr::null_mut());
    g_closure_set_meta_marshal(gclosure, data, meta_marshal);
    g_closure_add_finalize_notifier(gclosure, data, drop_closure_data);
    let id = g_signal_connect_closure(object, signal_name, gclosure, 0);
    if id == 0 {
        warn!("failed to connect '{}' for handler '{}'", spec.signal, spec.handler);
        return;
    }
    debug!("connected '{}' (id {}) to handler '{}'", spec.signal, id, spec.handler);
    state.count += 1;
}

impl ObjectSystem for GObjectSystem {
    fn ref_object(&self, ptr: NativePtr) {
        unsafe {
            g_object_ref(ptr.as_raw());
        }
    }

    fn unref_object(&self, ptr: NativePtr) {
        unsafe { g_object_unref(ptr.as_raw()) }
    }

    fn ref_sink(&self, ptr: NativePtr) {
        unsafe {
            g_object_ref_sink(ptr.as_raw());
        }
    }

    fn is_floating(&self, ptr: NativePtr) -> bool {
        !ptr.is_null() && unsafe { g_object_is_floating(ptr.as_raw()) } != 0
    }

    fn type_of(&self, ptr: NativePtr) -> TypeTag {
        if ptr.is_null() {
            return TypeTag::INVALID;
        }
        // G_TYPE_FROM_INSTANCE: the class struct starts with its GType
        unsafe {
            let class = (*(ptr.as_raw() as *const GTypeInstance)).g_class;
            TypeTag(*(class as *const usize))
        }
    }

    fn type_name(&self, tag: TypeTag) -> Option<String> {
        let name = unsafe { g_type_name(tag.0) };
        if name.is_null() {
            None
        } else {
            Some(cstr_lossy(name))
        }
    }

    fn type_parent(&self, tag: TypeTag) -> Option<TypeTag> {
        match unsafe { g_type_parent(tag.0) } {
            0 => None,
            parent => Some(TypeTag(parent)),
        }
    }

    fn fundamental(&self, tag: TypeTag) -> TypeTag {
        TypeTag(unsafe { g_type_fundamental(tag.0) })
    }

    fn get_property(&self, ptr: NativePtr, name: &str, visit: &mut dyn FnMut(&BoxedValue)) -> bool {
        if ptr.is_null() {
            return false;
        }
        let cname = match CString::new(name) {
            Ok(cname) => cname,
            Err(_) => return false,
        };
        unsafe {
            let class = (*(ptr.as_raw() as *const GTypeInstance)).g_class;
            let pspec = g_object_class_find_property(class, cname.as_ptr());
            if pspec.is_null() {
                return false;
            }
            let mut value = GValue::zeroed();
            g_value_init(&mut value, (*pspec).value_type);
            g_object_get_property(ptr.as_raw(), cname.as_ptr(), &mut value);
            // The GValue owns the boxed copy or object reference until unset
            visit(&boxed_from_gvalue(&value));
            g_value_unset(&mut value);
        }
        true
    }

    fn set_property(&self, ptr: NativePtr, name: &str, value: &BoxedValue) -> Result<(), String> {
        if ptr.is_null() {
            return Err("object is null".to_string());
        }
        let cname = CString::new(name).map_err(|e| e.to_string())?;
        unsafe {
            let class = (*(ptr.as_raw() as *const GTypeInstance)).g_class;
            let pspec = g_object_class_find_property(class, cname.as_ptr());
            if pspec.is_null() {
                return Err(format!("object class has no property named '{}'", name));
            }
            let mut gvalue = GValue::zeroed();
            g_value_init(&mut gvalue, (*pspec).value_type);
            let stored = store_in_gvalue(&mut gvalue, value);
            if stored.is_ok() {
                g_object_set_property(ptr.as_raw(), cname.as_ptr(), &gvalue);
            }
            g_value_unset(&mut gvalue);
            stored
        }
    }

    fn connect_signals(
        &self,
        container: NativePtr,
        connector: &mut dyn FnMut(&ConnectionSpec) -> NativeClosure,
    ) -> usize {
        if container.is_null() {
            return 0;
        }
        let mut state = ConnectState {
            connector,
            count: 0,
        };
        unsafe {
            gtk_builder_connect_signals_full(
                container.as_raw(),
                connect_trampoline,
                &mut state as *mut ConnectState<'_> as *mut c_void,
            );
        }
        state.count
    }

    fn watch_finalize(&self, ptr: NativePtr, notify: FinalizeNotify) {
        if ptr.is_null() {
            return;
        }
        let data = Box::into_raw(Box::new(notify)) as *mut c_void;
        unsafe { g_object_weak_ref(ptr.as_raw(), run_finalize_notify, data) }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }
}
