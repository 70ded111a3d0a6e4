//! Native to script conversion

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_core::{Context, Dict, List, ScriptResult, Value};
use tracing::{debug, trace};

use crate::adapter::Adapter;
use crate::native::NativeValue;
use crate::shape::Shape;

/// Convert a native value into the nearest script value.
///
/// Scalars, text and bytes become script primitives, nil references become
/// `None`, and everything else is wrapped in a fresh [`Adapter`].
pub fn encode(ctx: &Context, value: &NativeValue) -> Value {
    if let Some(i) = value.as_i128() {
        return Value::Int(i);
    }
    if let Some(x) = value.as_f64() {
        return Value::Float(x);
    }
    match value {
        NativeValue::Bool(b) => Value::Bool(*b),
        NativeValue::String(s) => Value::from(s.as_str()),
        NativeValue::Bytes(b) => Value::bytes(b.as_slice()),
        NativeValue::Script(v) => v.clone(),
        v if v.is_nil() => Value::None,
        v => {
            trace!(shape = %v.shape(), "wrapping native value");
            Value::object(Adapter::new(ctx, v.clone()))
        }
    }
}

/// Encode each value
pub fn encode_all(ctx: &Context, values: &[NativeValue]) -> Vec<Value> {
    values.iter().map(|value| encode(ctx, value)).collect()
}

/// Copy dynamic host collections into plain script containers.
///
/// Sequences of `any`, maps with `any` values and pointers to either become
/// script lists and dicts, converted deeply; scalars convert as in
/// [`encode`]. Values with no plain script form (structs, functions, typed
/// collections) become `None`. A collection reached twice converts to the
/// same script container, so cyclic graphs stay cyclic.
pub fn to_script(value: &NativeValue) -> ScriptResult<Value> {
    trace!(shape = %value.shape(), "to_script");
    plain(value, &mut FxHashMap::default())
}

fn is_any(shape: &Shape) -> bool {
    matches!(shape.resolve(), Shape::Any)
}

fn plain(value: &NativeValue, seen: &mut FxHashMap<usize, Value>) -> ScriptResult<Value> {
    if let Some(i) = value.as_i128() {
        return Ok(Value::Int(i));
    }
    if let Some(x) = value.as_f64() {
        return Ok(Value::Float(x));
    }
    match value {
        NativeValue::Nil => Ok(Value::None),
        NativeValue::Bool(b) => Ok(Value::Bool(*b)),
        NativeValue::String(s) => Ok(Value::from(s.as_str())),
        NativeValue::Bytes(b) => Ok(Value::bytes(b.as_slice())),
        NativeValue::Script(v) => Ok(v.clone()),
        NativeValue::Seq(seq) if is_any(seq.elem()) => {
            let Some(id) = seq.identity() else {
                return Ok(Value::list(Vec::new()));
            };
            if let Some(done) = seen.get(&id) {
                return Ok(done.clone());
            }
            let list = Rc::new(List::new(Vec::with_capacity(seq.len())));
            seen.insert(id, Value::List(list.clone()));
            for item in seq.to_vec() {
                list.push(plain(&item, seen)?);
            }
            Ok(Value::List(list))
        }
        NativeValue::Map(map) if is_any(map.value_shape()) => {
            let Some(id) = map.identity() else {
                return Ok(Value::dict(Dict::new()));
            };
            if let Some(done) = seen.get(&id) {
                return Ok(done.clone());
            }
            let dict = Rc::new(Dict::with_capacity(map.len()));
            seen.insert(id, Value::Dict(dict.clone()));
            for (key, entry) in map.entries() {
                dict.insert(plain(&key, seen)?, plain(&entry, seen)?)?;
            }
            Ok(Value::Dict(dict))
        }
        NativeValue::Ptr(ptr) if ptr.is_nil() => Ok(Value::None),
        NativeValue::Ptr(ptr) if matches!(ptr.elem().resolve(), Shape::Seq(_) | Shape::Map(..)) => {
            plain(&ptr.load()?, seen)
        }
        other => {
            debug!(shape = %other.shape(), "no plain script form");
            Ok(Value::None)
        }
    }
}
