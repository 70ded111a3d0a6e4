//! Script to native conversion
//!
//! Decoding is driven by the target [`Shape`]: the pair (script kind, shape
//! kind) selects a conversion, recursing into containers, struct fields and
//! callables. Script containers already visited during one top-level decode
//! are remembered by identity, so cyclic graphs decode to cyclic native
//! values instead of recursing forever.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_core::{Context, ScriptError, ScriptResult, Value};
use tracing::{debug, error, trace};

use crate::adapter::Adapter;
use crate::encode::encode;
use crate::func::FuncValue;
use crate::host::StructType;
use crate::native::{ArrayValue, MapValue, NativeValue, SeqValue};
use crate::place::PtrValue;
use crate::shape::{FuncSig, Shape};

/// Convert a script value into a native value of `shape`
pub fn decode(ctx: &Context, value: &Value, shape: &Shape) -> ScriptResult<NativeValue> {
    trace!(value_type = %value.type_name(), shape = %shape, "decode");
    Decoder::new(ctx).decode(value, shape)
}

/// Native value registered for a script container
struct Visit {
    value: NativeValue,
    in_progress: bool,
}

/// One top-level decode and its cycle guard
struct Decoder<'a> {
    ctx: &'a Context,
    visited: FxHashMap<usize, Vec<Visit>>,
}

impl<'a> Decoder<'a> {
    fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            visited: FxHashMap::default(),
        }
    }

    fn decode(&mut self, value: &Value, shape: &Shape) -> ScriptResult<NativeValue> {
        let target = shape.resolve();
        if matches!(target, Shape::Value) {
            return Ok(NativeValue::Script(value.clone()));
        }
        if let Some(adapter) = value.downcast_ref::<Adapter>() {
            return self.unwrap_adapter(adapter, value, shape);
        }

        let conversion = || ScriptError::conversion(value, shape);
        match value {
            Value::None if shape.is_nilable() => Ok(NativeValue::zero(shape)),
            Value::None => Err(conversion()),
            Value::Bool(b) => match target {
                Shape::Bool | Shape::Any => Ok(NativeValue::Bool(*b)),
                _ => Err(conversion()),
            },
            Value::Int(i) => NativeValue::from_int(*i, target).ok_or_else(conversion),
            Value::Float(x) => NativeValue::from_float(*x, target).ok_or_else(conversion),
            Value::String(s) => match target {
                Shape::String | Shape::Any => Ok(NativeValue::String(s.to_string())),
                Shape::Bytes => Ok(NativeValue::Bytes(s.as_bytes().to_vec())),
                _ => Err(conversion()),
            },
            Value::Bytes(b) => match target {
                Shape::Bytes | Shape::Any => Ok(NativeValue::Bytes(b.to_vec())),
                Shape::String => std::str::from_utf8(b)
                    .map(|s| NativeValue::String(s.to_string()))
                    .map_err(|_| conversion()),
                _ => Err(conversion()),
            },
            Value::List(list) => {
                let id = value.identity();
                self.decode_items(value, id, list.to_vec(), shape)
            }
            Value::Tuple(items) => self.decode_items(value, None, items.to_vec(), shape),
            Value::Set(set) => self.decode_items(value, None, set.to_vec(), shape),
            Value::Dict(dict) => {
                let id = value.identity();
                self.decode_dict(value, id, dict.items(), shape)
            }
            Value::Function(_) | Value::Builtin(_) | Value::Object(_) => match target {
                Shape::Func(sig) if value.is_callable() => {
                    Ok(NativeValue::Func(bridge(self.ctx, value, sig)))
                }
                Shape::Any => Ok(NativeValue::Script(value.clone())),
                _ => Err(conversion()),
            },
        }
    }

    // ========================================================================
    // Cycle guard
    // ========================================================================

    /// Value already built for container `id` under `shape`. An `any`
    /// target accepts whatever was built first.
    fn lookup(&self, id: Option<usize>, shape: &Shape) -> Option<&Visit> {
        let visits = self.visited.get(&id?)?;
        if matches!(shape.resolve(), Shape::Any) {
            return visits.first();
        }
        visits.iter().find(|visit| visit.value.shape() == *shape)
    }

    fn register(&mut self, id: Option<usize>, value: NativeValue) {
        if let Some(id) = id {
            self.visited.entry(id).or_default().push(Visit {
                value,
                in_progress: true,
            });
        }
    }

    fn finish(&mut self, id: Option<usize>) {
        if let Some(visit) = id
            .and_then(|id| self.visited.get_mut(&id))
            .and_then(|visits| visits.last_mut())
        {
            visit.in_progress = false;
        }
    }

    // ========================================================================
    // Containers
    // ========================================================================

    fn decode_items(
        &mut self,
        value: &Value,
        id: Option<usize>,
        items: Vec<Value>,
        shape: &Shape,
    ) -> ScriptResult<NativeValue> {
        let target = shape.resolve();
        if let Some(visit) = self.lookup(id, target) {
            debug!(shape = %shape, "cycle guard hit");
            return Ok(visit.value.clone());
        }
        match target {
            Shape::Seq(elem) => {
                let mut seq = SeqValue::new((**elem).clone(), Vec::with_capacity(items.len()));
                self.register(id, NativeValue::Seq(seq.clone()));
                for item in &items {
                    let decoded = self.decode(item, elem)?;
                    seq.push(decoded);
                }
                self.finish(id);
                Ok(NativeValue::Seq(seq))
            }
            Shape::Bytes => {
                let bytes = items
                    .iter()
                    .map(|item| match self.decode(item, &Shape::U8)? {
                        NativeValue::U8(b) => Ok(b),
                        _ => Err(ScriptError::conversion(item, Shape::U8)),
                    })
                    .collect::<ScriptResult<Vec<u8>>>()?;
                Ok(NativeValue::Bytes(bytes))
            }
            Shape::Array(elem, len) if *len == items.len() => {
                let decoded = items
                    .iter()
                    .map(|item| self.decode(item, elem))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(NativeValue::Array(ArrayValue::new((**elem).clone(), decoded)))
            }
            Shape::Any => {
                let any = Shape::seq(Shape::Any);
                self.decode_items(value, id, items, &any)
            }
            _ => Err(ScriptError::conversion(value, shape)),
        }
    }

    fn decode_dict(
        &mut self,
        value: &Value,
        id: Option<usize>,
        entries: Vec<(Value, Value)>,
        shape: &Shape,
    ) -> ScriptResult<NativeValue> {
        let target = shape.resolve();
        if let Some(visit) = self.lookup(id, target) {
            debug!(shape = %shape, "cycle guard hit");
            return Ok(visit.value.clone());
        }
        match target {
            Shape::Map(key_shape, value_shape) => {
                let map = MapValue::new((**key_shape).clone(), (**value_shape).clone());
                self.register(id, NativeValue::Map(map.clone()));
                for (key, entry) in &entries {
                    let key = self.decode(key, key_shape)?;
                    let entry = self.decode(entry, value_shape)?;
                    map.insert(key, entry)?;
                }
                self.finish(id);
                Ok(NativeValue::Map(map))
            }
            Shape::Struct(ty) => {
                let ptr_shape = Shape::ptr(target.clone());
                if let Some(visit) = self.lookup(id, &ptr_shape) {
                    if visit.in_progress {
                        return Err(ScriptError::conversion(value, shape));
                    }
                    if let NativeValue::Ptr(ptr) = &visit.value {
                        return ptr.load();
                    }
                }
                let ptr = self.decode_struct(id, ty, &entries)?;
                ptr.load()
            }
            Shape::Ptr(elem) => match elem.resolve() {
                Shape::Struct(ty) => Ok(NativeValue::Ptr(self.decode_struct(id, ty, &entries)?)),
                _ => Err(ScriptError::conversion(value, shape)),
            },
            Shape::Any => {
                let any = Shape::map(Shape::Any, Shape::Any);
                self.decode_dict(value, id, entries, &any)
            }
            _ => Err(ScriptError::conversion(value, shape)),
        }
    }

    /// Decode mapping entries into the fields of a fresh zero instance
    fn decode_struct(
        &mut self,
        id: Option<usize>,
        ty: &Rc<StructType>,
        entries: &[(Value, Value)],
    ) -> ScriptResult<PtrValue> {
        let ptr = PtrValue::new(Shape::Struct(ty.clone()), NativeValue::Struct(ty.zero()));
        self.register(id, NativeValue::Ptr(ptr.clone()));
        for (key, entry) in entries {
            let Some(name) = key.as_str() else {
                continue;
            };
            let index = ty.field_index(name).ok_or_else(|| ScriptError::UnknownField {
                field: name.to_string(),
                type_name: ty.name().to_string(),
            })?;
            let field_shape = ty.fields()[index].shape().clone();
            let decoded = self.decode(entry, &field_shape)?;
            ptr.update(|target| match target {
                NativeValue::Struct(instance) => ty.set_field(instance, index, decoded),
                _ => Err(ScriptError::Host(format!("{} instance expected", ty.name()))),
            })?;
        }
        self.finish(id);
        Ok(ptr)
    }

    // ========================================================================
    // Adapters
    // ========================================================================

    fn unwrap_adapter(
        &mut self,
        adapter: &Adapter,
        value: &Value,
        shape: &Shape,
    ) -> ScriptResult<NativeValue> {
        let native = adapter.native()?;
        if let Some(converted) = native.convert(shape) {
            return Ok(converted);
        }
        match (shape.resolve(), &native) {
            (Shape::Ptr(_), NativeValue::Ptr(_)) => Err(ScriptError::conversion(value, shape)),
            (Shape::Ptr(elem), _) if native.shape() == **elem => {
                Ok(NativeValue::Ptr(PtrValue::new((**elem).clone(), native)))
            }
            (Shape::Func(sig), NativeValue::Func(_)) => {
                Ok(NativeValue::Func(bridge(self.ctx, value, sig)))
            }
            _ => Err(ScriptError::conversion(value, shape)),
        }
    }
}

// ============================================================================
// Bridging callables
// ============================================================================

fn callee_name(callee: &Value) -> String {
    match callee {
        Value::Function(function) => function.name().to_string(),
        Value::Builtin(builtin) => builtin.name().to_string(),
        other => other.type_name(),
    }
}

/// Native callable that invokes the script callable `callee` through `ctx`.
///
/// Any failure of the script call or of decoding its result is fatal to the
/// native caller and surfaces as `ScriptError::Aborted`.
pub fn bridge(ctx: &Context, callee: &Value, sig: &Rc<FuncSig>) -> FuncValue {
    let name = callee_name(callee);
    let ctx = ctx.clone();
    let callee = callee.clone();
    let call_sig = sig.clone();
    let abort_name = name.clone();
    FuncValue::with_sig(&name, sig.clone(), move |args| {
        invoke(&ctx, &callee, &call_sig, args).map_err(|err| {
            error!(callee = %abort_name, error = %err, "script callback aborted");
            ScriptError::abort(abort_name.clone(), err)
        })
    })
}

fn invoke(
    ctx: &Context,
    callee: &Value,
    sig: &FuncSig,
    args: Vec<NativeValue>,
) -> ScriptResult<Vec<NativeValue>> {
    let tail = if sig.is_variadic() { args.len().checked_sub(1) } else { None };
    let mut script_args = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        if Some(i) != tail {
            script_args.push(encode(ctx, arg));
            continue;
        }
        match arg {
            NativeValue::Seq(seq) => script_args.extend(seq.to_vec().iter().map(|v| encode(ctx, v))),
            NativeValue::Array(array) => {
                script_args.extend(array.items().iter().map(|v| encode(ctx, v)))
            }
            NativeValue::Bytes(bytes) => {
                script_args.extend(bytes.iter().map(|b| Value::Int(i128::from(*b))))
            }
            other => script_args.push(encode(ctx, other)),
        }
    }

    let result = ctx.call(callee, &script_args, &[])?;
    match sig.results() {
        [] => Ok(Vec::new()),
        [single] => Ok(vec![decode(ctx, &result, single)?]),
        many => match &result {
            Value::Tuple(items) if items.len() == many.len() => items
                .iter()
                .zip(many)
                .map(|(item, shape)| decode(ctx, item, shape))
                .collect(),
            other => Err(ScriptError::conversion(
                other,
                format!("tuple of {} values", many.len()),
            )),
        },
    }
}
