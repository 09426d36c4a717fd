//! Method tables for callback objects
//!
//! A callback object is exposed to the dispatcher as a [`MethodTable`]: a map
//! from method name to a closure that checks arity, converts each decoded
//! [`Value`] with [`FromValue`] and calls the Rust method. The table is built
//! once, when the object is registered, so dispatch is a hash lookup.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use tether_runtime::marshal::Value;
//! use tether_runtime::signal::{MethodTable, Reflect};
//!
//! #[derive(Default)]
//! struct Handlers {
//!     toggled: Cell<Option<bool>>,
//! }
//!
//! impl Reflect for Handlers {
//!     fn method_table(self: Rc<Self>) -> MethodTable {
//!         MethodTable::new("Handlers")
//!             .method("Toggled", move |active: bool| self.toggled.set(Some(active)))
//!     }
//! }
//!
//! let handlers = Rc::new(Handlers::default());
//! let table = handlers.clone().method_table();
//! table.call("Toggled", &[Value::Bool(true)]).unwrap().unwrap();
//! assert_eq!(handlers.toggled.get(), Some(true));
//! ```

use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{FromValue, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

type MethodFn = Rc<dyn Fn(&[Value]) -> BridgeResult<()>>;

/// One invocable method
#[derive(Clone)]
pub struct Method {
    name: Rc<str>,
    arity: usize,
    call: MethodFn,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Invoke with decoded arguments; the method's return value is discarded
    ///
    /// # Errors
    ///
    /// `CallbackSignature` on arity or argument type mismatch.
    pub fn invoke(&self, args: &[Value]) -> BridgeResult<()> {
        (self.call)(args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({}/{})", self.name, self.arity)
    }
}

/// Capability table of one callback object
#[derive(Clone)]
pub struct MethodTable {
    owner: String,
    methods: FxHashMap<String, Method>,
}

impl MethodTable {
    /// Empty table; `owner` names the object in diagnostics
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            methods: FxHashMap::default(),
        }
    }

    /// Builder form of [`MethodTable::insert`]
    pub fn method<Args, F>(mut self, name: &str, f: F) -> Self
    where
        F: IntoMethod<Args>,
    {
        self.insert(name, f);
        self
    }

    /// Expose `f` under `name`, replacing any previous method of that name
    pub fn insert<Args, F>(&mut self, name: &str, f: F)
    where
        F: IntoMethod<Args>,
    {
        let method = f.into_method(name);
        self.methods.insert(name.to_string(), method);
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Call `name` if present
    pub fn call(&self, name: &str, args: &[Value]) -> Option<BridgeResult<()>> {
        self.methods.get(name).map(|m| m.invoke(args))
    }

    /// Method names in sorted order
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("owner", &self.owner)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// A callback object that can describe its own methods
pub trait Reflect {
    fn method_table(self: Rc<Self>) -> MethodTable;
}

/// Conversion of a Rust closure into a [`Method`]
///
/// Implemented for `Fn` closures of up to six arguments whose types
/// implement [`FromValue`]. The closure's return value is ignored.
pub trait IntoMethod<Args> {
    fn into_method(self, name: &str) -> Method;
}

fn arity_error(name: &str, expected: usize, got: usize) -> BridgeError {
    BridgeError::CallbackSignature {
        method: name.to_string(),
        reason: format!("expected {} argument(s), got {}", expected, got),
    }
}

fn argument_error(name: &str, position: usize, err: BridgeError) -> BridgeError {
    let reason = match err {
        BridgeError::ValueMismatch { expected, found } => {
            format!("argument {}: expected {}, found {}", position, expected, found)
        }
        other => format!("argument {}: {}", position, other),
    };
    BridgeError::CallbackSignature {
        method: name.to_string(),
        reason,
    }
}

macro_rules! impl_into_method {
    ($count:expr; $($ty:ident $var:ident),*) => {
        impl<F, R, $($ty,)*> IntoMethod<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + 'static,
            $($ty: FromValue,)*
        {
            fn into_method(self, name: &str) -> Method {
                let f = self;
                let method_name: Rc<str> = Rc::from(name);
                let err_name = Rc::clone(&method_name);
                let call = move |args: &[Value]| -> BridgeResult<()> {
                    if args.len() != $count {
                        return Err(arity_error(&err_name, $count, args.len()));
                    }
                    #[allow(unused_mut, unused_variables)]
                    let mut iter = args.iter().enumerate();
                    $(
                        let $var = match iter.next() {
                            Some((position, value)) => <$ty as FromValue>::from_value(value)
                                .map_err(|err| argument_error(&err_name, position, err))?,
                            None => return Err(arity_error(&err_name, $count, args.len())),
                        };
                    )*
                    let _ = f($($var),*);
                    Ok(())
                };
                Method {
                    name: method_name,
                    arity: $count,
                    call: Rc::new(call),
                }
            }
        }
    };
}

impl_into_method!(0;);
impl_into_method!(1; A a);
impl_into_method!(2; A a, B b);
impl_into_method!(3; A a, B b, C c);
impl_into_method!(4; A a, B b, C c, D d);
impl_into_method!(5; A a, B b, C c, D d, E e);
impl_into_method!(6; A a, B b, C c, D d, E e, G g);
