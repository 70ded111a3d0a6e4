//! Script values
//!
//! `Value` is the closed set of values the script runtime understands.
//! Reference kinds (lists, sets, dicts, callables, objects) share their
//! storage through `Rc`: cloning a `Value` clones the handle, and the
//! allocation address is the value's identity.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHasher;

use crate::dict::{Dict, Set};
use crate::error::{ScriptError, ScriptResult};
use crate::function::{Builtin, Function};
use crate::object::{ScriptObject, ValueIter};

/// A value of the script runtime
#[derive(Clone)]
pub enum Value {
    /// The absent value
    None,
    /// Boolean
    Bool(bool),
    /// Integer, wide enough for every native integer width
    Int(i128),
    /// Floating point number
    Float(f64),
    /// Text string
    String(Rc<str>),
    /// Byte string (distinct from text)
    Bytes(Rc<[u8]>),
    /// Mutable list
    List(Rc<List>),
    /// Immutable tuple
    Tuple(Rc<[Value]>),
    /// Insertion-ordered set
    Set(Rc<Set>),
    /// Insertion-ordered mapping
    Dict(Rc<Dict>),
    /// Script function literal
    Function(Rc<Function>),
    /// Native function registered with the runtime
    Builtin(Rc<Builtin>),
    /// Any other value implementing the capability protocol
    Object(Rc<dyn ScriptObject>),
}

/// Mutable script list
#[derive(Default)]
pub struct List {
    items: RefCell<Vec<Value>>,
}

impl List {
    /// Create a list holding `items`
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: RefCell::new(items),
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    /// Replace the element at `index`
    pub fn set(&self, index: usize, value: Value) -> ScriptResult<()> {
        let mut items = self.items.borrow_mut();
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        *slot = value;
        Ok(())
    }

    /// Append an element
    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    /// Snapshot of the current elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }
}

pub(crate) fn out_of_range(index: usize, len: usize) -> ScriptError {
    ScriptError::IndexOutOfRange {
        index: i64::try_from(index).unwrap_or(i64::MAX),
        len,
    }
}

impl Value {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Text string value
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Byte string value
    pub fn bytes(b: impl Into<Rc<[u8]>>) -> Self {
        Value::Bytes(b.into())
    }

    /// New list value
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(List::new(items)))
    }

    /// New tuple value
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(items.into())
    }

    /// Wrap a dict
    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(dict))
    }

    /// Wrap a set
    pub fn set(set: Set) -> Self {
        Value::Set(Rc::new(set))
    }

    /// Wrap a protocol object
    pub fn object<T: ScriptObject>(object: T) -> Self {
        Value::Object(Rc::new(object))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Check if this is `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Byte string payload
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Downcast an `Object` value to its concrete protocol type
    pub fn downcast_ref<T: ScriptObject>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => {
                let any: &dyn Any = &**object;
                any.downcast_ref::<T>()
            }
            _ => None,
        }
    }

    /// Whether the value can be invoked by `Context::call`
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Builtin(_) => true,
            Value::Object(o) => o.is_callable(),
            _ => false,
        }
    }

    /// Allocation identity of reference kinds, `None` for immediates.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(l) => Some(Rc::as_ptr(l) as usize),
            Value::Set(s) => Some(Rc::as_ptr(s) as usize),
            Value::Dict(d) => Some(Rc::as_ptr(d) as usize),
            Value::Function(f) => Some(Rc::as_ptr(f) as usize),
            Value::Builtin(b) => Some(Rc::as_ptr(b) as usize),
            Value::Object(o) => Some(Rc::as_ptr(o) as *const () as usize),
            _ => None,
        }
    }

    // ========================================================================
    // Protocol dispatch
    // ========================================================================

    /// Script type name
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Bytes(_) => "bytes".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Tuple(_) => "tuple".to_string(),
            Value::Set(_) => "set".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Function(_) => "function".to_string(),
            Value::Builtin(_) => "builtin_function_or_method".to_string(),
            Value::Object(o) => o.type_name(),
        }
    }

    /// Truthiness
    pub fn truth(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
            Value::Object(o) => o.truth(),
        }
    }

    /// Hash for use as a dict key or set member
    pub fn hash(&self) -> ScriptResult<u64> {
        let mut hasher = FxHasher::default();
        self.hash_into(&mut hasher)?;
        Ok(hasher.finish())
    }

    fn hash_into(&self, state: &mut FxHasher) -> ScriptResult<()> {
        match self {
            Value::None => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            // integral floats hash like the equal int
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e38 => {
                2u8.hash(state);
                (*f as i128).hash(state);
            }
            Value::Float(f) => {
                3u8.hash(state);
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Value::Bytes(b) => {
                5u8.hash(state);
                b.hash(state);
            }
            Value::Tuple(items) => {
                6u8.hash(state);
                items.len().hash(state);
                for item in items.iter() {
                    item.hash_into(state)?;
                }
            }
            Value::Function(_) | Value::Builtin(_) => {
                7u8.hash(state);
                self.identity().hash(state);
            }
            Value::Object(o) => {
                8u8.hash(state);
                o.hash()?.hash(state);
            }
            Value::List(_) | Value::Set(_) | Value::Dict(_) => {
                return Err(ScriptError::Unhashable {
                    type_name: self.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Number of elements
    pub fn len(&self) -> ScriptResult<usize> {
        match self {
            Value::String(s) => Ok(s.len()),
            Value::Bytes(b) => Ok(b.len()),
            Value::List(l) => Ok(l.len()),
            Value::Tuple(t) => Ok(t.len()),
            Value::Set(s) => Ok(s.len()),
            Value::Dict(d) => Ok(d.len()),
            Value::Object(o) => o.len(),
            other => Err(ScriptError::unsupported(other.type_name(), "len")),
        }
    }

    /// Element at `index`
    pub fn index(&self, index: usize) -> ScriptResult<Value> {
        match self {
            Value::List(l) => l.get(index).ok_or_else(|| out_of_range(index, l.len())),
            Value::Tuple(t) => t
                .get(index)
                .cloned()
                .ok_or_else(|| out_of_range(index, t.len())),
            Value::Object(o) => o.index(index),
            other => Err(ScriptError::unsupported(other.type_name(), "index")),
        }
    }

    /// Assign the element at `index`
    pub fn set_index(&self, index: usize, value: Value) -> ScriptResult<()> {
        match self {
            Value::List(l) => l.set(index, value),
            Value::Object(o) => o.set_index(index, value),
            other => Err(ScriptError::unsupported(other.type_name(), "index assignment")),
        }
    }

    /// Iterate elements (dict keys for dicts)
    pub fn iterate(&self) -> ScriptResult<ValueIter> {
        let items = match self {
            Value::List(l) => l.to_vec(),
            Value::Tuple(t) => t.to_vec(),
            Value::Set(s) => s.to_vec(),
            Value::Dict(d) => d.keys(),
            Value::Object(o) => return o.iterate(),
            other => return Err(ScriptError::unsupported(other.type_name(), "iteration")),
        };
        Ok(Box::new(items.into_iter().map(Ok)))
    }

    /// Attribute lookup
    pub fn attr(&self, name: &str) -> ScriptResult<Value> {
        match self {
            Value::Object(o) => o.attr(name),
            other => Err(ScriptError::unsupported(
                other.type_name(),
                format!("attribute {name}"),
            )),
        }
    }

    /// Attribute assignment
    pub fn set_attr(&self, name: &str, value: Value) -> ScriptResult<()> {
        match self {
            Value::Object(o) => o.set_attr(name, value),
            other => Err(ScriptError::unsupported(
                other.type_name(),
                format!("attribute assignment {name}"),
            )),
        }
    }

    /// Mapping lookup
    pub fn get(&self, key: &Value) -> ScriptResult<Option<Value>> {
        match self {
            Value::Dict(d) => d.get(key),
            Value::Object(o) => o.get(key),
            other => Err(ScriptError::unsupported(other.type_name(), "get")),
        }
    }

    /// Mapping assignment
    pub fn set_key(&self, key: Value, value: Value) -> ScriptResult<()> {
        match self {
            Value::Dict(d) => d.insert(key, value).map(|_| ()),
            Value::Object(o) => o.set_key(key, value),
            other => Err(ScriptError::unsupported(other.type_name(), "set_key")),
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    fn write_repr(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => {
                f.write_str("b\"")?;
                for &byte in b.iter() {
                    write!(f, "{}", std::ascii::escape_default(byte))?;
                }
                f.write_str("\"")
            }
            Value::Tuple(items) if items.len() == 1 => {
                f.write_str("(")?;
                items[0].write_repr(f, seen)?;
                f.write_str(",)")
            }
            Value::Tuple(items) => write_items(f, seen, "(", ")", items),
            Value::List(l) => self.write_nested(f, seen, "[", "]", &l.to_vec()),
            Value::Set(s) => self.write_nested(f, seen, "set([", "])", &s.to_vec()),
            Value::Dict(d) => {
                let Some(id) = self.identity() else {
                    return Ok(());
                };
                if seen.contains(&id) {
                    return f.write_str("{...}");
                }
                seen.push(id);
                f.write_str("{")?;
                for (i, (key, value)) in d.items().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    key.write_repr(f, seen)?;
                    f.write_str(": ")?;
                    value.write_repr(f, seen)?;
                }
                seen.pop();
                f.write_str("}")
            }
            Value::Function(func) => write!(f, "<function {}>", func.name()),
            Value::Builtin(b) => write!(f, "<built-in function {}>", b.name()),
            Value::Object(o) => write!(f, "{o}"),
        }
    }

    fn write_nested(
        &self,
        f: &mut fmt::Formatter<'_>,
        seen: &mut Vec<usize>,
        open: &str,
        close: &str,
        items: &[Value],
    ) -> fmt::Result {
        let Some(id) = self.identity() else {
            return Ok(());
        };
        if seen.contains(&id) {
            return write!(f, "{open}...{close}");
        }
        seen.push(id);
        write_items(f, seen, open, close, items)?;
        seen.pop();
        Ok(())
    }
}

fn write_items(
    f: &mut fmt::Formatter<'_>,
    seen: &mut Vec<usize>,
    open: &str,
    close: &str,
    items: &[Value],
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.write_repr(f, seen)?;
    }
    f.write_str(close)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = Vec::new();
        self.write_repr(f, &mut seen)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || *a.items.borrow() == *b.items.borrow()
            }
            (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b) || **a == **b,
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b) || **a == **b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i.into())
    }
}

impl From<i128> for Value {
    fn from(i: i128) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Dict> for Value {
    fn from(dict: Dict) -> Self {
        Value::dict(dict)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(Rc::new(function))
    }
}

impl From<Builtin> for Value {
    fn from(builtin: Builtin) -> Self {
        Value::Builtin(Rc::new(builtin))
    }
}
