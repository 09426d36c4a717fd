//! Native object system surface
//!
//! Everything the bridge needs from the native runtime goes through the
//! [`ObjectSystem`] trait: reference counting, dynamic type queries, property
//! access and signal wiring. Two implementations ship with the crate:
//! - [`sim::SimSystem`]: an in-process object system used by tests and demos
//! - `gobject::GObjectSystem`: the real GObject/GTK 3 surface (feature `gobject`)

#[cfg(feature = "gobject")]
pub mod gobject;
pub mod sim;
pub mod value;

pub use value::{BoxedValue, RawPayload};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::raw::c_void;
use std::rc::Rc;

/// Raw native address
///
/// Never dereferenced by the bridge itself; it is only handed back to the
/// native runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativePtr(*mut c_void);

impl NativePtr {
    /// The null sentinel
    pub const fn null() -> Self {
        NativePtr(std::ptr::null_mut())
    }

    pub fn from_raw(ptr: *mut c_void) -> Self {
        NativePtr(ptr)
    }

    /// Address-only pointer (simulated runtimes hand out plain integers)
    pub fn from_addr(addr: usize) -> Self {
        NativePtr(addr as *mut c_void)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    pub fn addr(self) -> usize {
        self.0 as usize
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Default for NativePtr {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}

/// Dynamic type tag assigned by the native runtime
///
/// Fundamental tags follow GLib's `G_TYPE_MAKE_FUNDAMENTAL` numbering; derived
/// classes, enums and boxed types get tags above [`TypeTag::FUNDAMENTAL_MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub usize);

impl TypeTag {
    pub const fn make_fundamental(n: usize) -> Self {
        TypeTag(n << 2)
    }

    pub const INVALID: TypeTag = TypeTag::make_fundamental(0);
    pub const NONE: TypeTag = TypeTag::make_fundamental(1);
    pub const INTERFACE: TypeTag = TypeTag::make_fundamental(2);
    pub const CHAR: TypeTag = TypeTag::make_fundamental(3);
    pub const UCHAR: TypeTag = TypeTag::make_fundamental(4);
    pub const BOOLEAN: TypeTag = TypeTag::make_fundamental(5);
    pub const INT: TypeTag = TypeTag::make_fundamental(6);
    pub const UINT: TypeTag = TypeTag::make_fundamental(7);
    pub const LONG: TypeTag = TypeTag::make_fundamental(8);
    pub const ULONG: TypeTag = TypeTag::make_fundamental(9);
    pub const INT64: TypeTag = TypeTag::make_fundamental(10);
    pub const UINT64: TypeTag = TypeTag::make_fundamental(11);
    pub const ENUM: TypeTag = TypeTag::make_fundamental(12);
    pub const FLAGS: TypeTag = TypeTag::make_fundamental(13);
    pub const FLOAT: TypeTag = TypeTag::make_fundamental(14);
    pub const DOUBLE: TypeTag = TypeTag::make_fundamental(15);
    pub const STRING: TypeTag = TypeTag::make_fundamental(16);
    pub const POINTER: TypeTag = TypeTag::make_fundamental(17);
    pub const BOXED: TypeTag = TypeTag::make_fundamental(18);
    pub const PARAM: TypeTag = TypeTag::make_fundamental(19);
    pub const OBJECT: TypeTag = TypeTag::make_fundamental(20);
    pub const VARIANT: TypeTag = TypeTag::make_fundamental(21);

    /// Highest tag reserved for fundamental types
    pub const FUNDAMENTAL_MAX: usize = 255 << 2;

    pub fn is_fundamental(self) -> bool {
        self.0 <= Self::FUNDAMENTAL_MAX
    }

    /// Native type name of a fundamental tag
    pub fn fundamental_name(self) -> Option<&'static str> {
        let name = match self {
            TypeTag::NONE => "void",
            TypeTag::INTERFACE => "GInterface",
            TypeTag::CHAR => "gchar",
            TypeTag::UCHAR => "guchar",
            TypeTag::BOOLEAN => "gboolean",
            TypeTag::INT => "gint",
            TypeTag::UINT => "guint",
            TypeTag::LONG => "glong",
            TypeTag::ULONG => "gulong",
            TypeTag::INT64 => "gint64",
            TypeTag::UINT64 => "guint64",
            TypeTag::ENUM => "GEnum",
            TypeTag::FLAGS => "GFlags",
            TypeTag::FLOAT => "gfloat",
            TypeTag::DOUBLE => "gdouble",
            TypeTag::STRING => "gchararray",
            TypeTag::POINTER => "gpointer",
            TypeTag::BOXED => "GBoxed",
            TypeTag::PARAM => "GParam",
            TypeTag::OBJECT => "GObject",
            TypeTag::VARIANT => "GVariant",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One signal connection declared by a UI container
///
/// `handler` is the handler name written in the UI definition; it is what the
/// dispatcher routes on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub object: NativePtr,
    pub signal: String,
    pub handler: String,
}

/// Closure the native runtime invokes with the raw signal parameters
pub type NativeClosure = Box<dyn Fn(&[BoxedValue])>;

/// Callback run once when a watched object is finalized
pub type FinalizeNotify = Box<dyn FnOnce()>;

/// The consumed native call surface
///
/// The native runtime is single-threaded; implementations are used through
/// `Rc<dyn ObjectSystem>` and never cross threads.
pub trait ObjectSystem {
    /// Increment the strong count
    fn ref_object(&self, ptr: NativePtr);

    /// Decrement the strong count, finalizing the object at zero
    fn unref_object(&self, ptr: NativePtr);

    /// Convert a floating reference into a strong one, or add a strong
    /// reference if the object is not floating
    fn ref_sink(&self, ptr: NativePtr);

    fn is_floating(&self, ptr: NativePtr) -> bool;

    /// Dynamic type of an instance
    fn type_of(&self, ptr: NativePtr) -> TypeTag;

    fn type_name(&self, tag: TypeTag) -> Option<String>;

    /// Parent type, `None` for fundamentals
    fn type_parent(&self, tag: TypeTag) -> Option<TypeTag>;

    /// Fundamental ancestor of a type
    fn fundamental(&self, tag: TypeTag) -> TypeTag;

    /// Read a property and pass it to `visit` while the native value is live
    ///
    /// Pointer payloads (boxed copies, object references) are only valid
    /// inside `visit`. Returns `false` if the object has no such property.
    fn get_property(&self, ptr: NativePtr, name: &str, visit: &mut dyn FnMut(&BoxedValue)) -> bool;

    fn set_property(&self, ptr: NativePtr, name: &str, value: &BoxedValue) -> Result<(), String>;

    /// Ask the container to connect every declared signal, calling `connector`
    /// once per connection to obtain the closure to install.
    ///
    /// Returns the number of connections made.
    fn connect_signals(
        &self,
        container: NativePtr,
        connector: &mut dyn FnMut(&ConnectionSpec) -> NativeClosure,
    ) -> usize;

    /// Run `notify` once, after `ptr` is finalized
    ///
    /// Dropped without running if `ptr` is not a live object.
    fn watch_finalize(&self, ptr: NativePtr, notify: FinalizeNotify);

    /// Diagnostic text of the most recent failed native call
    fn last_error(&self) -> Option<String>;
}

/// Shared reference to an object system
pub type SystemRef = Rc<dyn ObjectSystem>;

/// Walk the parent chain of `tag` looking for `ancestor`
pub fn type_is_a(system: &dyn ObjectSystem, tag: TypeTag, ancestor: TypeTag) -> bool {
    let mut current = Some(tag);
    while let Some(t) = current {
        if t == ancestor {
            return true;
        }
        current = system.type_parent(t);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fundamental_numbering() {
        assert_eq!(TypeTag::INVALID.0, 0);
        assert_eq!(TypeTag::BOOLEAN.0, 20);
        assert_eq!(TypeTag::STRING.0, 64);
        assert_eq!(TypeTag::OBJECT.0, 80);
        assert_eq!(TypeTag::VARIANT.0, 84);
        assert!(TypeTag::VARIANT.is_fundamental());
        assert!(!TypeTag(1024).is_fundamental());
    }

    #[test]
    fn test_null_sentinel() {
        assert!(NativePtr::null().is_null());
        assert!(NativePtr::default().is_null());
        assert!(!NativePtr::from_addr(0x10).is_null());
    }
}
