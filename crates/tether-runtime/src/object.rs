//! Object wrappers
//!
//! [`Object`] is the shared, cheaply clonable face of a [`Handle`]; typed
//! wrappers for specific native classes implement [`ObjectType`] on top of it.
//! Property access goes through the marshal registry so properties decode
//! exactly like signal parameters do.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::{AcquireMode, AsNative, Handle};
use crate::marshal::{FromValue, MarshalContext, MarshalRegistry, Value};
use crate::native::{type_is_a, BoxedValue, NativePtr, SystemRef, TypeTag};
use std::fmt;
use std::rc::Rc;

/// A typed wrapper around a native class
pub trait ObjectType: Sized {
    /// Native type name of the class
    const TYPE_NAME: &'static str;

    /// Wrap an object already known to be an instance of the class
    fn from_object_unchecked(object: Object) -> Self;

    fn as_object(&self) -> &Object;
}

/// Shared handle to a native object
#[derive(Clone)]
pub struct Object {
    handle: Rc<Handle>,
}

impl Object {
    pub fn wrap(system: &SystemRef, ptr: NativePtr, mode: AcquireMode) -> BridgeResult<Self> {
        Handle::wrap(system, ptr, mode).map(Self::from_handle)
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle: Rc::new(handle),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn native(&self) -> NativePtr {
        self.handle.native()
    }

    pub fn system(&self) -> &SystemRef {
        self.handle.system()
    }

    pub fn type_tag(&self) -> TypeTag {
        self.handle.type_tag()
    }

    pub fn type_name(&self) -> Option<String> {
        self.handle.type_name()
    }

    /// Whether the object is an instance of the named class or a subclass
    pub fn is_a(&self, type_name: &str) -> bool {
        let system = self.system();
        let mut current = Some(self.type_tag());
        while let Some(tag) = current {
            if system.type_name(tag).as_deref() == Some(type_name) {
                return true;
            }
            current = system.type_parent(tag);
        }
        false
    }

    /// Whether the object's type derives from `ancestor`
    pub fn is_a_tag(&self, ancestor: TypeTag) -> bool {
        type_is_a(&**self.system(), self.type_tag(), ancestor)
    }

    /// Convert into a typed wrapper, giving the object back on mismatch
    pub fn downcast<T: ObjectType>(self) -> Result<T, Object> {
        if self.is_a(T::TYPE_NAME) {
            Ok(T::from_object_unchecked(self))
        } else {
            Err(self)
        }
    }

    /// Read a property and decode it through `registry`
    ///
    /// # Errors
    ///
    /// `Property` if the object has no such property, or any decode error.
    pub fn property(&self, name: &str, registry: &MarshalRegistry) -> BridgeResult<Value> {
        let ctx = MarshalContext::new(self.system());
        let mut decoded = None;
        // Decode inside the visit: boxed copies are freed once it returns
        let found = self.system().get_property(self.native(), name, &mut |boxed: &BoxedValue| {
            decoded = Some(registry.decode(boxed, &ctx));
        });
        match decoded {
            Some(value) if found => value,
            _ => Err(BridgeError::Property {
                name: name.to_string(),
                message: "object has no such property".to_string(),
            }),
        }
    }

    /// Read a property as a Rust type
    pub fn property_as<T: FromValue>(&self, name: &str, registry: &MarshalRegistry) -> BridgeResult<T> {
        let value = self.property(name, registry)?;
        T::from_value(&value).map_err(|err| BridgeError::Property {
            name: name.to_string(),
            message: err.to_string(),
        })
    }

    /// Write a property
    pub fn set_property(&self, name: &str, value: &BoxedValue) -> BridgeResult<()> {
        self.system()
            .set_property(self.native(), name, value)
            .map_err(|message| BridgeError::Property {
                name: name.to_string(),
                message,
            })
    }
}

impl AsNative for Object {
    fn as_native(&self) -> NativePtr {
        self.native()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.native() == other.native()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("ptr", &self.native())
            .field("type", &self.type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::sim::SimSystem;

    struct Button(Object);

    impl ObjectType for Button {
        const TYPE_NAME: &'static str = "GtkButton";

        fn from_object_unchecked(object: Object) -> Self {
            Button(object)
        }

        fn as_object(&self) -> &Object {
            &self.0
        }
    }

    #[test]
    fn test_downcast_follows_hierarchy() {
        let sim = Rc::new(SimSystem::new());
        let system: SystemRef = sim.clone();
        let button_type = sim.register_type("GtkButton", TypeTag::OBJECT);
        let toggle_type = sim.register_type("GtkToggleButton", button_type);

        let toggle = Object::wrap(&system, sim.create_object(toggle_type), AcquireMode::Owned).unwrap();
        let plain = Object::wrap(&system, sim.create_object(TypeTag::OBJECT), AcquireMode::Owned).unwrap();

        let button = toggle.downcast::<Button>().ok().unwrap();
        assert!(button.as_object().is_a_tag(TypeTag::OBJECT));
        assert!(plain.downcast::<Button>().is_err());
    }

    #[test]
    fn test_shared_clone_holds_one_reference() {
        let sim = Rc::new(SimSystem::new());
        let system: SystemRef = sim.clone();
        let ptr = sim.create_object(TypeTag::OBJECT);
        let a = Object::wrap(&system, ptr, AcquireMode::Borrowed).unwrap();
        let b = a.clone();
        assert_eq!(sim.refcount(ptr), 2);
        drop(a);
        drop(b);
        assert_eq!(sim.refcount(ptr), 1);
    }
}
