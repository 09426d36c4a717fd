//! Marshal registry tests
//!
//! Registration, replacement, strict and lenient lookup, derived type
//! marshalers and property access.

mod common;

use common::Fixture;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use std::thread;
use tether_config::{BridgeConfig, MarshalConfig};
use tether_runtime::marshal::{FromValue, MarshalContext, MarshalRegistry, Marshaler, Value};
use tether_runtime::native::{BoxedValue, NativePtr, TypeTag};
use tether_runtime::{impl_host_value, AcquireMode, BridgeError, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

impl TryFrom<i32> for Orientation {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Orientation::Horizontal),
            1 => Ok(Orientation::Vertical),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModifierMask(u32);

impl From<u32> for ModifierMask {
    fn from(bits: u32) -> Self {
        ModifierMask(bits)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Rectangle {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

impl_host_value!(Orientation, ModifierMask, Rectangle);

fn constant(n: i64) -> Marshaler {
    Arc::new(move |_: &BoxedValue, _: &MarshalContext<'_>| Ok(Value::Int(n)))
}

// ============================================================================
// Registration and lookup
// ============================================================================

#[test]
fn test_last_registration_wins() {
    let f = Fixture::new();
    let registry = MarshalRegistry::new();
    let ctx = MarshalContext::new(&f.system);

    registry.register_fn(TypeTag::INT, |_, _| Ok(Value::from("first")));
    registry.register_fn(TypeTag::INT, |_, _| Ok(Value::from("second")));

    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.decode(&BoxedValue::int(7), &ctx).unwrap(),
        Value::from("second")
    );
}

#[test]
fn test_lookup_returns_just_registered() {
    let registry = MarshalRegistry::new();
    let marshaler = constant(9);

    registry.register(TypeTag::DOUBLE, Arc::clone(&marshaler));
    assert!(Arc::ptr_eq(&registry.lookup(TypeTag::DOUBLE).unwrap(), &marshaler));

    let replacement = constant(10);
    registry.register(TypeTag::DOUBLE, Arc::clone(&replacement));
    assert!(Arc::ptr_eq(&registry.lookup(TypeTag::DOUBLE).unwrap(), &replacement));
}

#[test]
fn test_register_all_keeps_last_duplicate() {
    let f = Fixture::new();
    let registry = MarshalRegistry::new();
    registry.register_all(vec![(TypeTag::UINT, constant(1)), (TypeTag::UINT, constant(2))]);

    let ctx = MarshalContext::new(&f.system);
    assert_eq!(registry.decode(&BoxedValue::uint(0), &ctx).unwrap(), Value::Int(2));
}

#[test]
fn test_unregistered_tag_is_an_error() {
    let f = Fixture::new();
    let iter_type = f.sim.register_type("GtkTreeIter", TypeTag::BOXED);
    let ctx = MarshalContext::new(&f.system);

    let err = f
        .registry
        .decode(&BoxedValue::pointer(iter_type, NativePtr::from_addr(0x80)), &ctx)
        .unwrap_err();

    assert_eq!(
        err,
        BridgeError::UnregisteredType {
            tag: iter_type,
            type_name: Some("GtkTreeIter".to_string()),
        }
    );
    assert!(matches!(
        f.registry.lookup(iter_type),
        Err(BridgeError::UnregisteredType { .. })
    ));
}

#[test]
fn test_strict_mode_has_no_fundamental_fallback() {
    let f = Fixture::new();
    let label_type = f.sim.register_type("GtkLabel", TypeTag::OBJECT);
    let label = f.sim.create_object(label_type);
    let ctx = MarshalContext::new(&f.system);
    let boxed = BoxedValue::pointer(label_type, label);

    assert!(f.registry.is_strict());
    assert!(f.registry.decode(&boxed, &ctx).is_err());

    f.registry.set_strict(false);
    let value = f.registry.decode(&boxed, &ctx).unwrap();
    assert_eq!(value.as_object().map(Object::native), Some(label));
}

#[rstest]
#[case::boolean(BoxedValue::boolean(true), Value::Bool(true))]
#[case::int(BoxedValue::int(-4), Value::Int(-4))]
#[case::int64(BoxedValue::int64(1 << 40), Value::Int(1 << 40))]
#[case::uint(BoxedValue::uint(9), Value::UInt(9))]
#[case::double(BoxedValue::double(0.5), Value::Double(0.5))]
#[case::string(BoxedValue::string("Open"), Value::from("Open"))]
#[case::null_string(BoxedValue::null_string(), Value::Null)]
fn test_default_marshalers(#[case] boxed: BoxedValue, #[case] expected: Value) {
    let f = Fixture::new();
    let ctx = MarshalContext::new(&f.system);
    assert_eq!(f.registry.decode(&boxed, &ctx).unwrap(), expected);
}

#[test]
fn test_decode_all_stops_at_first_failure() {
    let f = Fixture::new();
    let ctx = MarshalContext::new(&f.system);
    let unknown = f.sim.register_type("GdkEvent", TypeTag::BOXED);

    let ok = f
        .registry
        .decode_all(&[BoxedValue::boolean(false), BoxedValue::int(3)], &ctx)
        .unwrap();
    assert_eq!(ok, vec![Value::Bool(false), Value::Int(3)]);

    let params = [
        BoxedValue::int(1),
        BoxedValue::pointer(unknown, NativePtr::from_addr(0x10)),
    ];
    assert!(f.registry.decode_all(&params, &ctx).is_err());
}

// ============================================================================
// Derived types
// ============================================================================

#[test]
fn test_enum_marshaler() {
    let f = Fixture::new();
    let tag = f.sim.register_type("GtkOrientation", TypeTag::ENUM);
    f.registry.register_enum::<Orientation>(tag);
    let ctx = MarshalContext::new(&f.system);

    let value = f.registry.decode(&BoxedValue::enumeration(tag, 1), &ctx).unwrap();
    assert_eq!(Orientation::from_value(&value).unwrap(), Orientation::Vertical);

    let err = f.registry.decode(&BoxedValue::enumeration(tag, 7), &ctx).unwrap_err();
    assert!(matches!(err, BridgeError::ValueMismatch { .. }));
}

#[test]
fn test_flags_marshaler() {
    let f = Fixture::new();
    let tag = f.sim.register_type("GdkModifierType", TypeTag::FLAGS);
    f.registry.register_flags::<ModifierMask>(tag);
    let ctx = MarshalContext::new(&f.system);

    let value = f.registry.decode(&BoxedValue::flags(tag, 0b101), &ctx).unwrap();
    assert_eq!(ModifierMask::from_value(&value).unwrap(), ModifierMask(0b101));
}

#[test]
fn test_boxed_marshaler_copies_out() {
    let f = Fixture::new();
    let tag = f.sim.register_type("GdkRectangle", TypeTag::BOXED);
    f.registry.register_boxed(tag, |ptr: NativePtr, _ctx: &MarshalContext<'_>| {
        let addr = ptr.addr() as i32;
        Ok(Rectangle {
            x: addr,
            y: addr + 1,
            width: 10,
            height: 20,
        })
    });
    let ctx = MarshalContext::new(&f.system);

    let value = f
        .registry
        .decode(&BoxedValue::pointer(tag, NativePtr::from_addr(0x40)), &ctx)
        .unwrap();
    assert_eq!(
        Rectangle::from_value(&value).unwrap(),
        Rectangle {
            x: 0x40,
            y: 0x41,
            width: 10,
            height: 20
        }
    );

    let null = f
        .registry
        .decode(&BoxedValue::pointer(tag, NativePtr::null()), &ctx)
        .unwrap();
    assert!(null.is_null());
}

#[test]
fn test_object_marshaler_borrows_reference() {
    let f = Fixture::new();
    let button_type = f.sim.register_type("GtkButton", TypeTag::OBJECT);
    f.registry.register_object(button_type);
    let button = f.sim.create_object(button_type);
    let ctx = MarshalContext::new(&f.system);

    let value = f
        .registry
        .decode(&BoxedValue::pointer(button_type, button), &ctx)
        .unwrap();
    assert_eq!(f.sim.refcount(button), 2);

    let object = Object::from_value(&value).unwrap();
    assert!(object.is_a("GtkButton"));
    assert!(object.is_a("GObject"));
    assert!(!object.is_a("GtkLabel"));

    drop(object);
    drop(value);
    assert_eq!(f.sim.refcount(button), 1);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_property_round_trip_through_registry() {
    let f = Fixture::new();
    let label_type = f.sim.register_type("GtkLabel", TypeTag::OBJECT);
    let ptr = f.sim.create_object(label_type);
    f.sim.install_property(ptr, "label", BoxedValue::string("Hello"));
    f.sim.install_property(ptr, "selectable", BoxedValue::boolean(false));
    let label = Object::wrap(&f.system, ptr, AcquireMode::Borrowed).unwrap();

    assert_eq!(label.property("label", &f.registry).unwrap(), Value::from("Hello"));

    label.set_property("label", &BoxedValue::string("Bye")).unwrap();
    let text: String = label.property_as("label", &f.registry).unwrap();
    assert_eq!(text, "Bye");

    label.set_property("selectable", &BoxedValue::boolean(true)).unwrap();
    assert!(label.property_as::<bool>("selectable", &f.registry).unwrap());
}

#[test]
fn test_property_errors() {
    let f = Fixture::new();
    let ptr = f.sim.create_object(TypeTag::OBJECT);
    f.sim.install_property(ptr, "name", BoxedValue::string("main"));
    let object = Object::wrap(&f.system, ptr, AcquireMode::Borrowed).unwrap();

    assert!(matches!(
        object.property("missing", &f.registry),
        Err(BridgeError::Property { .. })
    ));
    assert!(matches!(
        object.set_property("name", &BoxedValue::int(3)),
        Err(BridgeError::Property { .. })
    ));
    assert!(matches!(
        object.property_as::<i64>("name", &f.registry),
        Err(BridgeError::Property { .. })
    ));
}

#[test]
fn test_boxed_property_decoded_before_copy_is_freed() {
    let f = Fixture::new();
    let rect_type = f.sim.register_type("GdkRectangle", TypeTag::BOXED);
    // the copy function only succeeds while the native copy is still allocated
    f.registry
        .register_boxed(rect_type, move |ptr: NativePtr, ctx: &MarshalContext<'_>| {
            if ctx.system().type_of(ptr) != rect_type {
                return Err(BridgeError::mismatch("GdkRectangle", "freed memory"));
            }
            Ok(Rectangle {
                x: 1,
                y: 2,
                width: 30,
                height: 40,
            })
        });
    let ptr = f.sim.create_object(TypeTag::OBJECT);
    f.sim.install_property(ptr, "allocation", BoxedValue::pointer(rect_type, NativePtr::from_addr(0x40)));
    let widget = Object::wrap(&f.system, ptr, AcquireMode::Borrowed).unwrap();

    let rect: Rectangle = widget.property_as("allocation", &f.registry).unwrap();
    assert_eq!(
        rect,
        Rectangle {
            x: 1,
            y: 2,
            width: 30,
            height: 40
        }
    );
    assert_eq!(f.sim.invalid_accesses(), 0);
}

#[test]
fn test_object_property_keeps_its_own_reference() {
    let f = Fixture::new();
    let model_type = f.sim.register_type("GtkListStore", TypeTag::OBJECT);
    f.registry.register_object(model_type);
    let model = f.sim.create_object(model_type);
    let view = f.sim.create_object(TypeTag::OBJECT);
    f.sim.install_property(view, "model", BoxedValue::pointer(model_type, model));
    let view = Object::wrap(&f.system, view, AcquireMode::Owned).unwrap();

    let value = view.property("model", &f.registry).unwrap();
    // the transient reference taken by the read is gone, the wrapper's stays
    assert_eq!(f.sim.refcount(model), 2);
    assert!(Object::from_value(&value).unwrap().is_a("GtkListStore"));

    drop(value);
    assert_eq!(f.sim.refcount(model), 1);
    assert_eq!(f.sim.invalid_accesses(), 0);
}

// ============================================================================
// Configuration and sharing
// ============================================================================

#[rstest]
#[case::defaults(true, true, true)]
#[case::empty_strict(false, true, false)]
fn test_registry_from_config(
    #[case] register_defaults: bool,
    #[case] strict: bool,
    #[case] has_bool: bool,
) {
    let config = BridgeConfig {
        dispatch: None,
        marshal: Some(MarshalConfig {
            register_defaults: Some(register_defaults),
            strict: Some(strict),
        }),
    };
    let registry = MarshalRegistry::from_config(&config);
    assert_eq!(registry.is_strict(), strict);
    assert_eq!(registry.contains(TypeTag::BOOLEAN), has_bool);
}

#[test]
fn test_global_registry_is_shared() {
    let f = Fixture::new();
    let tag = TypeTag(0x7f_0000);
    MarshalRegistry::global().register_fn(tag, |_, _| Ok(Value::from("global")));

    let bridge = tether_runtime::Bridge::new(&f.system);
    let decoded = bridge.decode(&BoxedValue::pointer(tag, NativePtr::null())).unwrap();
    assert_eq!(decoded, Value::from("global"));
    assert!(bridge.registry().contains(TypeTag::STRING));
}

#[test]
fn test_concurrent_readers_see_complete_tables() {
    let registry = Arc::new(MarshalRegistry::with_defaults());
    let base = registry.len();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..50 {
                    registry.register_fn(TypeTag(0x10_0000 + (w * 50 + i) * 4), |_, _| Ok(Value::Null));
                }
            })
        })
        .collect();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..200 {
                    assert!(registry.lookup(TypeTag::BOOLEAN).is_ok());
                    assert!(registry.len() >= base);
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }
    assert_eq!(registry.len(), base + 200);
}
