//! Marshal registry - native type tag → decoder
//!
//! Every boxed native value entering the host (property reads, signal
//! parameters) is decoded through one registry lookup keyed by its dynamic
//! type tag. Registration can happen at any time from any module; the last
//! registration for a tag wins.
//!
//! # Concurrency
//!
//! The table is copy-on-write: readers clone an `Arc` snapshot and look up
//! without holding the lock, writers copy the table, insert and swap. Readers
//! never wait on each other and never observe a half-applied write.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::AcquireMode;
use crate::marshal::value::Value;
use crate::native::{BoxedValue, NativePtr, SystemRef, TypeTag};
use crate::object::Object;
use log::debug;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_config::BridgeConfig;

/// Decoder from a boxed native value to a host value
pub type Marshaler =
    Arc<dyn Fn(&BoxedValue, &MarshalContext<'_>) -> BridgeResult<Value> + Send + Sync>;

type Table = FxHashMap<TypeTag, Marshaler>;

/// What a marshaler may use while decoding
pub struct MarshalContext<'a> {
    system: &'a SystemRef,
}

impl<'a> MarshalContext<'a> {
    pub fn new(system: &'a SystemRef) -> Self {
        Self { system }
    }

    pub fn system(&self) -> &'a SystemRef {
        self.system
    }

    /// Wrap an object pointer found inside a boxed value
    ///
    /// The boxed value keeps its own reference, so the wrapper takes one.
    pub fn object(&self, ptr: NativePtr) -> BridgeResult<Value> {
        if ptr.is_null() {
            return Ok(Value::Null);
        }
        Object::wrap(self.system, ptr, AcquireMode::Borrowed).map(Value::Object)
    }
}

/// Registry of marshalers keyed by type tag
pub struct MarshalRegistry {
    table: RwLock<Arc<Table>>,
    strict: AtomicBool,
}

static GLOBAL: Lazy<Arc<MarshalRegistry>> = Lazy::new(|| Arc::new(MarshalRegistry::with_defaults()));

impl MarshalRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(Table::default())),
            strict: AtomicBool::new(true),
        }
    }

    /// Registry pre-populated with the fundamental marshalers
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Registry configured from `[marshal]` settings
    pub fn from_config(config: &BridgeConfig) -> Self {
        let registry = Self::new();
        if config.register_defaults() {
            registry.register_defaults();
        }
        registry.set_strict(config.strict_marshaling());
        registry
    }

    /// The process-wide registry
    pub fn global() -> &'static Arc<MarshalRegistry> {
        &GLOBAL
    }

    /// Insert or replace the marshaler for `tag`
    pub fn register(&self, tag: TypeTag, marshaler: Marshaler) {
        self.register_all(std::iter::once((tag, marshaler)));
    }

    /// Insert or replace several marshalers with a single table copy
    pub fn register_all(&self, entries: impl IntoIterator<Item = (TypeTag, Marshaler)>) {
        let mut guard = self.table.write();
        let mut next = Table::clone(&guard);
        for (tag, marshaler) in entries {
            if next.insert(tag, marshaler).is_some() {
                debug!("marshaler for type {} replaced", tag);
            }
        }
        *guard = Arc::new(next);
    }

    pub fn register_fn<F>(&self, tag: TypeTag, f: F)
    where
        F: Fn(&BoxedValue, &MarshalContext<'_>) -> BridgeResult<Value> + Send + Sync + 'static,
    {
        self.register(tag, Arc::new(f));
    }

    /// Decode values of an enum type into a host enum
    pub fn register_enum<E>(&self, tag: TypeTag)
    where
        E: TryFrom<i32> + Any,
    {
        self.register_fn(tag, |boxed, _| {
            let raw = boxed.get_int()?;
            let narrow = i32::try_from(raw).ok();
            match narrow.and_then(|n| E::try_from(n).ok()) {
                Some(e) => Ok(Value::host(e)),
                None => Err(BridgeError::mismatch(
                    std::any::type_name::<E>(),
                    format!("enum value {}", raw),
                )),
            }
        });
    }

    /// Decode values of a flags type into a host flags type
    pub fn register_flags<F>(&self, tag: TypeTag)
    where
        F: From<u32> + Any,
    {
        self.register_fn(tag, |boxed, _| {
            let raw = boxed.get_uint()?;
            let narrow = u32::try_from(raw).map_err(|_| {
                BridgeError::mismatch(std::any::type_name::<F>(), format!("flags value {}", raw))
            })?;
            Ok(Value::host(F::from(narrow)))
        });
    }

    /// Decode instances of a derived object class
    pub fn register_object(&self, tag: TypeTag) {
        self.register_fn(tag, |boxed, ctx| ctx.object(boxed.get_pointer()?));
    }

    /// Decode a boxed struct by copying it out of native memory
    pub fn register_boxed<T, F>(&self, tag: TypeTag, copy: F)
    where
        T: Any,
        F: Fn(NativePtr, &MarshalContext<'_>) -> BridgeResult<T> + Send + Sync + 'static,
    {
        self.register_fn(tag, move |boxed, ctx| {
            let ptr = boxed.get_pointer()?;
            if ptr.is_null() {
                return Ok(Value::Null);
            }
            copy(ptr, ctx).map(Value::host)
        });
    }

    /// Register marshalers for the fundamental types
    pub fn register_defaults(&self) {
        let entries = vec![
            entry(TypeTag::BOOLEAN, marshal_bool),
            entry(TypeTag::CHAR, marshal_int),
            entry(TypeTag::INT, marshal_int),
            entry(TypeTag::LONG, marshal_int),
            entry(TypeTag::INT64, marshal_int),
            entry(TypeTag::ENUM, marshal_int),
            entry(TypeTag::UCHAR, marshal_uint),
            entry(TypeTag::UINT, marshal_uint),
            entry(TypeTag::ULONG, marshal_uint),
            entry(TypeTag::UINT64, marshal_uint),
            entry(TypeTag::FLAGS, marshal_uint),
            entry(TypeTag::FLOAT, marshal_double),
            entry(TypeTag::DOUBLE, marshal_double),
            entry(TypeTag::STRING, marshal_string),
            entry(TypeTag::POINTER, marshal_pointer),
            entry(TypeTag::OBJECT, marshal_object),
            entry(TypeTag::INTERFACE, marshal_object),
        ];
        self.register_all(entries);
    }

    /// Exact-tag lookup
    ///
    /// # Errors
    ///
    /// `UnregisteredType` if nothing is registered for `tag`.
    pub fn lookup(&self, tag: TypeTag) -> BridgeResult<Marshaler> {
        self.snapshot()
            .get(&tag)
            .cloned()
            .ok_or(BridgeError::UnregisteredType {
                tag,
                type_name: None,
            })
    }

    /// Decode a boxed value
    ///
    /// In strict mode (the default) only an exact tag match is used. In
    /// lenient mode a tag with no marshaler of its own falls back to its
    /// fundamental type.
    ///
    /// # Errors
    ///
    /// `UnregisteredType` naming the tag, or whatever the marshaler reports.
    pub fn decode(&self, boxed: &BoxedValue, ctx: &MarshalContext<'_>) -> BridgeResult<Value> {
        let tag = boxed.tag();
        let snapshot = self.snapshot();
        let marshaler = match snapshot.get(&tag) {
            Some(m) => m,
            None => {
                let fallback = if self.is_strict() {
                    None
                } else {
                    snapshot.get(&ctx.system().fundamental(tag))
                };
                fallback.ok_or_else(|| BridgeError::UnregisteredType {
                    tag,
                    type_name: ctx.system().type_name(tag),
                })?
            }
        };
        marshaler(boxed, ctx)
    }

    /// Decode a parameter list, stopping at the first failure
    pub fn decode_all(&self, params: &[BoxedValue], ctx: &MarshalContext<'_>) -> BridgeResult<Vec<Value>> {
        params.iter().map(|p| self.decode(p, ctx)).collect()
    }

    pub fn set_strict(&self, strict: bool) {
        self.strict.store(strict, Ordering::Relaxed);
    }

    pub fn is_strict(&self) -> bool {
        self.strict.load(Ordering::Relaxed)
    }

    pub fn contains(&self, tag: TypeTag) -> bool {
        self.snapshot().contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Registered tags in ascending order
    pub fn tags(&self) -> Vec<TypeTag> {
        let mut tags: Vec<TypeTag> = self.snapshot().keys().copied().collect();
        tags.sort();
        tags
    }

    fn snapshot(&self) -> Arc<Table> {
        Arc::clone(&self.table.read())
    }
}

impl Default for MarshalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn entry<F>(tag: TypeTag, f: F) -> (TypeTag, Marshaler)
where
    F: Fn(&BoxedValue, &MarshalContext<'_>) -> BridgeResult<Value> + Send + Sync + 'static,
{
    (tag, Arc::new(f))
}

fn marshal_bool(boxed: &BoxedValue, _: &MarshalContext<'_>) -> BridgeResult<Value> {
    boxed.get_boolean().map(Value::Bool)
}

fn marshal_int(boxed: &BoxedValue, _: &MarshalContext<'_>) -> BridgeResult<Value> {
    boxed.get_int().map(Value::Int)
}

fn marshal_uint(boxed: &BoxedValue, _: &MarshalContext<'_>) -> BridgeResult<Value> {
    boxed.get_uint().map(Value::UInt)
}

fn marshal_double(boxed: &BoxedValue, _: &MarshalContext<'_>) -> BridgeResult<Value> {
    boxed.get_double().map(Value::Double)
}

fn marshal_string(boxed: &BoxedValue, _: &MarshalContext<'_>) -> BridgeResult<Value> {
    Ok(match boxed.get_string()? {
        Some(s) => Value::Str(s.to_string()),
        None => Value::Null,
    })
}

fn marshal_pointer(boxed: &BoxedValue, _: &MarshalContext<'_>) -> BridgeResult<Value> {
    let ptr = boxed.get_pointer()?;
    Ok(if ptr.is_null() {
        Value::Null
    } else {
        Value::host(ptr)
    })
}

fn marshal_object(boxed: &BoxedValue, ctx: &MarshalContext<'_>) -> BridgeResult<Value> {
    ctx.object(boxed.get_pointer()?)
}
