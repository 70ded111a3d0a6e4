//! Script-side proxy for native values
//!
//! An [`Adapter`] wraps one native value that has no direct script
//! equivalent and implements the capability protocol over it. Capabilities
//! are discovered per operation from the value's kind: struct fields and
//! methods, element access on sequences and arrays, entry access on maps,
//! and calls on functions. Writes go through to the wrapped value.

use std::fmt;
use std::rc::Rc;

use tether_core::{Context, ScriptError, ScriptObject, ScriptResult, Value, ValueIter};
use tracing::debug;

use crate::decode::decode;
use crate::encode::{encode, encode_all};
use crate::host::StructType;
use crate::native::NativeValue;
use crate::place::{Place, PtrValue};
use crate::shape::Shape;

enum Held {
    /// Any value other than a struct held by value
    Value(NativeValue),
    /// A struct held by value, stored in the adapter's own place
    Owned(Place),
}

/// Proxy exposing a native value to scripts
pub struct Adapter {
    ctx: Context,
    shape: Shape,
    held: Held,
}

impl Adapter {
    /// Wrap `value`
    pub fn new(ctx: &Context, value: NativeValue) -> Self {
        let shape = value.shape();
        let held = match value {
            NativeValue::Struct(_) => Held::Owned(Place::new(value)),
            other => Held::Value(other),
        };
        Self {
            ctx: ctx.clone(),
            shape,
            held,
        }
    }

    /// Shape of the wrapped value
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Context the adapter was created in
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Current wrapped value
    pub fn native(&self) -> ScriptResult<NativeValue> {
        match &self.held {
            Held::Value(value) => Ok(value.clone()),
            Held::Owned(place) => place.load(),
        }
    }

    /// Wrapped value with pointers followed, plus the place it lives in
    fn deref(&self) -> ScriptResult<(NativeValue, Option<Place>)> {
        match &self.held {
            Held::Owned(place) => Ok((place.load()?, Some(place.clone()))),
            Held::Value(NativeValue::Ptr(ptr)) => match ptr.place() {
                Some(place) => Ok((place.load()?, Some(place.clone()))),
                None => Err(ScriptError::Host("nil pointer dereference".to_string())),
            },
            Held::Value(value) => Ok((value.clone(), None)),
        }
    }

    /// Place and type of the struct this adapter reaches, if any
    fn struct_target(&self) -> Option<(Place, Rc<StructType>)> {
        match (&self.held, self.shape.resolve()) {
            (Held::Owned(place), Shape::Struct(ty)) => Some((place.clone(), ty.clone())),
            (Held::Value(NativeValue::Ptr(ptr)), _) => match (ptr.elem().resolve(), ptr.place()) {
                (Shape::Struct(ty), Some(place)) => Some((place.clone(), ty.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    fn unsupported(&self, operation: impl Into<String>) -> ScriptError {
        let operation = operation.into();
        debug!(shape = %self.shape, operation = %operation, "unsupported adapter operation");
        ScriptError::unsupported(self.type_name(), operation)
    }

    fn wrap(&self, value: NativeValue) -> Value {
        Value::object(Adapter::new(&self.ctx, value))
    }
}

fn out_of_range(index: usize, len: usize) -> ScriptError {
    ScriptError::IndexOutOfRange {
        index: i64::try_from(index).unwrap_or(i64::MAX),
        len,
    }
}

fn foreign(ty: &StructType) -> ScriptError {
    ScriptError::Host(format!("{} instance expected", ty.name()))
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.native() {
            Ok(value) => write!(f, "{value}"),
            Err(_) => write!(f, "<{}>", self.shape),
        }
    }
}

impl ScriptObject for Adapter {
    fn type_name(&self) -> String {
        self.shape.to_string()
    }

    fn truth(&self) -> bool {
        match self.deref() {
            Ok((value, _)) => match &value {
                NativeValue::Seq(seq) => !seq.is_empty(),
                NativeValue::Array(array) => !array.is_empty(),
                NativeValue::Map(map) => !map.is_empty(),
                NativeValue::Chan(chan) => !chan.is_empty(),
                NativeValue::Bytes(bytes) => !bytes.is_empty(),
                other => !other.is_nil(),
            },
            Err(_) => true,
        }
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    fn attr(&self, name: &str) -> ScriptResult<Value> {
        if let Some((place, ty)) = self.struct_target() {
            if let Some(method) = ty.bind_method(name, &place) {
                return Ok(self.wrap(NativeValue::Func(method)));
            }
            if let Some(index) = ty.field_index(name) {
                let field_shape = ty.fields()[index].shape().clone();
                if matches!(field_shape.resolve(), Shape::Struct(_) | Shape::Array(..)) {
                    let projected = place.field(ty.clone(), index);
                    return Ok(self.wrap(NativeValue::Ptr(PtrValue::to_place(field_shape, projected))));
                }
                let value = place.with(|target| match target {
                    NativeValue::Struct(instance) => ty.get_field(instance, index),
                    _ => Err(foreign(&ty)),
                })??;
                return Ok(encode(&self.ctx, &value));
            }
        }
        Err(self.unsupported(format!("attribute {name}")))
    }

    fn set_attr(&self, name: &str, value: Value) -> ScriptResult<()> {
        let Some((place, ty)) = self.struct_target() else {
            return Err(self.unsupported(format!("attribute assignment {name}")));
        };
        let index = ty.field_index(name).ok_or_else(|| ScriptError::UnknownField {
            field: name.to_string(),
            type_name: ty.name().to_string(),
        })?;
        let decoded = decode(&self.ctx, &value, ty.fields()[index].shape())?;
        place.update(|target| match target {
            NativeValue::Struct(instance) => ty.set_field(instance, index, decoded),
            _ => Err(foreign(&ty)),
        })
    }

    fn attr_names(&self) -> Vec<String> {
        match self.struct_target() {
            Some((_, ty)) => ty
                .fields()
                .iter()
                .map(|field| field.name().to_string())
                .chain(ty.methods().iter().map(|method| method.name().to_string()))
                .collect(),
            None => Vec::new(),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn is_callable(&self) -> bool {
        matches!(&self.held, Held::Value(NativeValue::Func(func)) if !func.is_nil())
    }

    fn call(&self, ctx: &Context, args: &[Value], kwargs: &[(String, Value)]) -> ScriptResult<Value> {
        let NativeValue::Func(func) = self.native()? else {
            return Err(ScriptError::NotCallable {
                type_name: self.type_name(),
            });
        };
        if !kwargs.is_empty() {
            return Err(ScriptError::Argument(format!(
                "{}: keyword arguments are not supported",
                func.name()
            )));
        }

        let sig = func.sig().clone();
        let fixed = sig.fixed_arity();
        let arity_ok = if sig.is_variadic() {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !arity_ok {
            return Err(ScriptError::ArgumentCount {
                name: func.name().to_string(),
                expected: sig.arity_text(),
                got: args.len(),
            });
        }

        let mut native_args = Vec::with_capacity(sig.params().len());
        for (arg, shape) in args.iter().zip(&sig.params()[..fixed]) {
            native_args.push(decode(ctx, arg, shape)?);
        }
        if let Some(rest) = sig.rest() {
            let tail = args[fixed..]
                .iter()
                .map(|arg| decode(ctx, arg, &rest))
                .collect::<ScriptResult<Vec<_>>>()?;
            native_args.push(NativeValue::seq(rest, tail));
        }

        let results = func.call(native_args)?;
        Ok(match results.as_slice() {
            [] => Value::None,
            [single] => encode(ctx, single),
            many => Value::tuple(encode_all(ctx, many)),
        })
    }

    // ========================================================================
    // Sequences
    // ========================================================================

    fn index(&self, index: usize) -> ScriptResult<Value> {
        let (value, _) = self.deref()?;
        let (item, len) = match &value {
            NativeValue::Seq(seq) => (seq.get(index), seq.len()),
            NativeValue::Array(array) => (array.items().get(index).cloned(), array.len()),
            NativeValue::Bytes(bytes) => (bytes.get(index).map(|b| NativeValue::U8(*b)), bytes.len()),
            _ => return Err(self.unsupported("index")),
        };
        let item = item.ok_or_else(|| out_of_range(index, len))?;
        Ok(encode(&self.ctx, &item))
    }

    fn set_index(&self, index: usize, value: Value) -> ScriptResult<()> {
        let (target, place) = self.deref()?;
        match (&target, place) {
            (NativeValue::Seq(seq), _) => {
                let decoded = decode(&self.ctx, &value, seq.elem())?;
                seq.set(index, decoded)
            }
            (NativeValue::Array(array), Some(place)) => {
                let decoded = decode(&self.ctx, &value, array.elem())?;
                place.update(|current| match current {
                    NativeValue::Array(array) => array.set(index, decoded),
                    _ => Err(ScriptError::Host("array expected".to_string())),
                })
            }
            (NativeValue::Bytes(_), Some(place)) => {
                let NativeValue::U8(byte) = decode(&self.ctx, &value, &Shape::U8)? else {
                    return Err(ScriptError::conversion(&value, Shape::U8));
                };
                place.update(|current| match current {
                    NativeValue::Bytes(bytes) => {
                        let len = bytes.len();
                        let slot = bytes.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
                        *slot = byte;
                        Ok(())
                    }
                    _ => Err(ScriptError::Host("bytes expected".to_string())),
                })
            }
            _ => Err(self.unsupported("index assignment")),
        }
    }

    fn len(&self) -> ScriptResult<usize> {
        let (value, _) = self.deref()?;
        match &value {
            NativeValue::Seq(seq) => Ok(seq.len()),
            NativeValue::Array(array) => Ok(array.len()),
            NativeValue::Map(map) => Ok(map.len()),
            NativeValue::Chan(chan) => Ok(chan.len()),
            NativeValue::Bytes(bytes) => Ok(bytes.len()),
            _ => Err(self.unsupported("len")),
        }
    }

    fn slice(&self, start: i64, end: i64, step: i64) -> ScriptResult<Value> {
        let (value, _) = self.deref()?;
        let items = match value {
            NativeValue::Seq(seq) => seq.to_vec(),
            NativeValue::Array(array) => array.items().to_vec(),
            NativeValue::Bytes(bytes) => bytes.into_iter().map(NativeValue::U8).collect(),
            _ => return Err(self.unsupported("slice")),
        };
        if step == 0 {
            return Err(ScriptError::Argument("slice step cannot be zero".to_string()));
        }

        let len = items.len() as i64;
        let mut sliced = Vec::new();
        let mut i = start;
        while (step > 0 && i < end) || (step < 0 && i > end) {
            if (0..len).contains(&i) {
                sliced.push(encode(&self.ctx, &items[i as usize]));
            }
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        Ok(Value::list(sliced))
    }

    fn iterate(&self) -> ScriptResult<ValueIter> {
        let (value, _) = self.deref()?;
        let ctx = self.ctx.clone();
        match value {
            NativeValue::Map(map) => {
                let mut position = 0;
                Ok(Box::new(std::iter::from_fn(move || {
                    let key = map.key_at(position)?;
                    position += 1;
                    Some(Ok(encode(&ctx, &key)))
                })))
            }
            NativeValue::Seq(seq) => {
                let mut position = 0;
                Ok(Box::new(std::iter::from_fn(move || {
                    let item = seq.get(position)?;
                    position += 1;
                    Some(Ok(encode(&ctx, &item)))
                })))
            }
            NativeValue::Array(array) => Ok(Box::new(
                array
                    .items()
                    .to_vec()
                    .into_iter()
                    .map(move |item| Ok(encode(&ctx, &item))),
            )),
            NativeValue::Bytes(bytes) => Ok(Box::new(
                bytes.into_iter().map(|b| Ok(Value::Int(i128::from(b)))),
            )),
            _ => Err(self.unsupported("iteration")),
        }
    }

    // ========================================================================
    // Mappings
    // ========================================================================

    fn get(&self, key: &Value) -> ScriptResult<Option<Value>> {
        let (value, _) = self.deref()?;
        let NativeValue::Map(map) = value else {
            return Err(self.unsupported("get"));
        };
        let key = decode(&self.ctx, key, map.key_shape())?;
        Ok(map.get(&key)?.map(|found| encode(&self.ctx, &found)))
    }

    fn set_key(&self, key: Value, value: Value) -> ScriptResult<()> {
        let (target, _) = self.deref()?;
        let NativeValue::Map(map) = target else {
            return Err(self.unsupported("set_key"));
        };
        let key = decode(&self.ctx, &key, map.key_shape())?;
        let value = decode(&self.ctx, &value, map.value_shape())?;
        map.insert(key, value)
    }

    fn items(&self) -> ScriptResult<Vec<(Value, Value)>> {
        let (value, _) = self.deref()?;
        let NativeValue::Map(map) = value else {
            return Err(self.unsupported("items"));
        };
        Ok(map
            .entries()
            .iter()
            .map(|(key, value)| (encode(&self.ctx, key), encode(&self.ctx, value)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{MapValue, SeqValue};

    fn seq_of(items: &[i64]) -> NativeValue {
        NativeValue::Seq(SeqValue::new(
            Shape::I64,
            items.iter().map(|i| NativeValue::I64(*i)).collect(),
        ))
    }

    #[test]
    fn test_sequence_access() {
        let ctx = Context::new();
        let value = encode(&ctx, &seq_of(&[10, 20, 30]));
        assert_eq!(value.len().unwrap(), 3);
        assert_eq!(value.index(1).unwrap(), Value::Int(20));
        assert!(matches!(value.index(3), Err(ScriptError::IndexOutOfRange { index: 3, len: 3 })));
        assert_eq!(value.type_name(), "list<i64>");
    }

    #[test]
    fn test_set_index_writes_through() {
        let ctx = Context::new();
        let native = seq_of(&[1, 2]);
        let value = encode(&ctx, &native);
        value.set_index(0, Value::Int(9)).unwrap();
        match native {
            NativeValue::Seq(seq) => assert!(matches!(seq.get(0), Some(NativeValue::I64(9)))),
            _ => unreachable!(),
        }
        assert!(value.set_index(0, Value::from("x")).is_err());
    }

    #[test]
    fn test_slice() {
        let ctx = Context::new();
        let value = encode(&ctx, &seq_of(&[0, 1, 2, 3, 4]));
        let object = match &value {
            Value::Object(object) => object.clone(),
            _ => unreachable!(),
        };
        let forward = object.slice(1, 5, 2).unwrap();
        assert_eq!(forward, Value::list(vec![Value::Int(1), Value::Int(3)]));
        let backward = object.slice(4, -1, -1).unwrap();
        assert_eq!(backward.len().unwrap(), 5);
        assert_eq!(backward.index(0).unwrap(), Value::Int(4));
    }

    #[test]
    fn test_slice_with_extreme_step() {
        let ctx = Context::new();
        let value = encode(&ctx, &seq_of(&[0, 1, 2]));
        let Value::Object(object) = &value else {
            unreachable!();
        };
        let forward = object.slice(1, i64::MAX, i64::MAX).unwrap();
        assert_eq!(forward, Value::list(vec![Value::Int(1)]));
        let backward = object.slice(2, i64::MIN, i64::MIN).unwrap();
        assert_eq!(backward, Value::list(vec![Value::Int(2)]));
        assert!(object.slice(0, 3, 0).is_err());
    }

    #[test]
    fn test_only_functions_are_callable() {
        let ctx = Context::new();
        let func = crate::func::FuncValue::new(
            "noop",
            crate::shape::FuncSig::new(vec![], vec![]),
            |_| Ok(vec![]),
        );
        assert!(encode(&ctx, &NativeValue::Func(func)).is_callable());
        assert!(!encode(&ctx, &seq_of(&[1])).is_callable());
    }

    #[test]
    fn test_map_access() {
        let ctx = Context::new();
        let map = MapValue::new(Shape::String, Shape::I64);
        let value = encode(&ctx, &NativeValue::Map(map.clone()));
        assert!(!value.truth());

        value.set_key(Value::from("a"), Value::Int(1)).unwrap();
        assert!(value.truth());
        assert_eq!(value.get(&Value::from("a")).unwrap(), Some(Value::Int(1)));
        assert_eq!(value.get(&Value::from("b")).unwrap(), None);
        assert_eq!(map.len(), 1);

        let keys: Vec<Value> = value.iterate().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(keys, vec![Value::from("a")]);
    }

    #[test]
    fn test_mapping_ops_on_sequence_unsupported() {
        let ctx = Context::new();
        let value = encode(&ctx, &seq_of(&[1]));
        assert!(matches!(
            value.get(&Value::Int(0)),
            Err(ScriptError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            value.set_key(Value::Int(0), Value::Int(1)),
            Err(ScriptError::UnsupportedOperation { .. })
        ));
        assert!(matches!(value.hash(), Err(ScriptError::Unhashable { .. })));
    }

    #[test]
    fn test_call_kwargs_rejected() {
        let ctx = Context::new();
        let func = crate::func::FuncValue::new(
            "noop",
            crate::shape::FuncSig::new(vec![], vec![]),
            |_| Ok(vec![]),
        );
        let value = encode(&ctx, &NativeValue::Func(func));
        assert_eq!(ctx.call(&value, &[], &[]).unwrap(), Value::None);
        let err = ctx
            .call(&value, &[], &[("x".to_string(), Value::None)])
            .unwrap_err();
        assert!(matches!(err, ScriptError::Argument(_)));
        let err = ctx.call(&value, &[Value::Int(1)], &[]).unwrap_err();
        assert!(matches!(err, ScriptError::ArgumentCount { got: 1, .. }));
    }
}
