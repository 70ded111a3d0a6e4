//! Native host values
//!
//! [`NativeValue`] is the dynamic form of a host value: every variant carries
//! enough type information to recover its [`Shape`]. Reference kinds
//! (sequences, maps, pointers, functions, channels) share their storage, so
//! a clone is another handle to the same data; arrays and structs are held
//! by value.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use rustc_hash::FxHashMap;
use tether_core::{ScriptError, ScriptResult, Value};

use crate::func::FuncValue;
use crate::host::StructValue;
use crate::place::PtrValue;
use crate::shape::{OpaqueType, Shape};

/// A host value
#[derive(Clone)]
pub enum NativeValue {
    /// Empty dynamically typed slot
    Nil,
    /// `bool`
    Bool(bool),
    /// `i8`
    I8(i8),
    /// `i16`
    I16(i16),
    /// `i32`
    I32(i32),
    /// `i64`
    I64(i64),
    /// `isize`
    Isize(isize),
    /// `u8`
    U8(u8),
    /// `u16`
    U16(u16),
    /// `u32`
    U32(u32),
    /// `u64`
    U64(u64),
    /// `usize`
    Usize(usize),
    /// `f32`
    F32(f32),
    /// `f64`
    F64(f64),
    /// Text
    String(String),
    /// Byte sequence
    Bytes(Vec<u8>),
    /// Shared growable sequence
    Seq(SeqValue),
    /// Fixed-size sequence
    Array(ArrayValue),
    /// Shared hash map
    Map(MapValue),
    /// Registered host struct
    Struct(StructValue),
    /// Pointer
    Ptr(PtrValue),
    /// Native callable
    Func(FuncValue),
    /// Channel
    Chan(ChanValue),
    /// Slot already holding a script value
    Script(Value),
    /// Opaque host handle
    Opaque(OpaqueValue),
}

impl NativeValue {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Sequence of `elem`; `u8` elements produce `Bytes`
    pub fn seq(elem: Shape, items: Vec<NativeValue>) -> NativeValue {
        if matches!(elem.resolve(), Shape::U8) {
            let bytes = items
                .iter()
                .filter_map(|item| match item {
                    NativeValue::U8(b) => Some(*b),
                    _ => None,
                })
                .collect();
            NativeValue::Bytes(bytes)
        } else {
            NativeValue::Seq(SeqValue::new(elem, items))
        }
    }

    /// Pointer to a fresh place holding `value`
    pub fn ptr_to(value: NativeValue) -> NativeValue {
        NativeValue::Ptr(PtrValue::new(value.shape(), value))
    }

    /// Zero value of `shape`: `false`, `0`, empty text and bytes, nil
    /// references, arrays of zeros and zero structs.
    pub fn zero(shape: &Shape) -> NativeValue {
        match shape.resolve() {
            Shape::Bool => NativeValue::Bool(false),
            Shape::I8 => NativeValue::I8(0),
            Shape::I16 => NativeValue::I16(0),
            Shape::I32 => NativeValue::I32(0),
            Shape::I64 => NativeValue::I64(0),
            Shape::Isize => NativeValue::Isize(0),
            Shape::U8 => NativeValue::U8(0),
            Shape::U16 => NativeValue::U16(0),
            Shape::U32 => NativeValue::U32(0),
            Shape::U64 => NativeValue::U64(0),
            Shape::Usize => NativeValue::Usize(0),
            Shape::F32 => NativeValue::F32(0.0),
            Shape::F64 => NativeValue::F64(0.0),
            Shape::String => NativeValue::String(String::new()),
            Shape::Bytes => NativeValue::Bytes(Vec::new()),
            Shape::Value => NativeValue::Script(Value::None),
            Shape::Any | Shape::Named(_) => NativeValue::Nil,
            Shape::Seq(elem) => NativeValue::Seq(SeqValue::nil((**elem).clone())),
            Shape::Array(elem, len) => NativeValue::Array(ArrayValue::new(
                (**elem).clone(),
                (0..*len).map(|_| NativeValue::zero(elem)).collect(),
            )),
            Shape::Map(key, value) => {
                NativeValue::Map(MapValue::nil((**key).clone(), (**value).clone()))
            }
            Shape::Struct(ty) => NativeValue::Struct(ty.zero()),
            Shape::Ptr(elem) => NativeValue::Ptr(PtrValue::nil((**elem).clone())),
            Shape::Func(sig) => NativeValue::Func(FuncValue::nil(sig.clone())),
            Shape::Chan(elem) => NativeValue::Chan(ChanValue::nil((**elem).clone())),
            Shape::Opaque(ty) => NativeValue::Opaque(OpaqueValue::nil(ty.clone())),
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Shape of this value
    pub fn shape(&self) -> Shape {
        match self {
            NativeValue::Nil => Shape::Any,
            NativeValue::Bool(_) => Shape::Bool,
            NativeValue::I8(_) => Shape::I8,
            NativeValue::I16(_) => Shape::I16,
            NativeValue::I32(_) => Shape::I32,
            NativeValue::I64(_) => Shape::I64,
            NativeValue::Isize(_) => Shape::Isize,
            NativeValue::U8(_) => Shape::U8,
            NativeValue::U16(_) => Shape::U16,
            NativeValue::U32(_) => Shape::U32,
            NativeValue::U64(_) => Shape::U64,
            NativeValue::Usize(_) => Shape::Usize,
            NativeValue::F32(_) => Shape::F32,
            NativeValue::F64(_) => Shape::F64,
            NativeValue::String(_) => Shape::String,
            NativeValue::Bytes(_) => Shape::Bytes,
            NativeValue::Seq(seq) => Shape::seq(seq.elem().clone()),
            NativeValue::Array(array) => Shape::array(array.elem().clone(), array.len()),
            NativeValue::Map(map) => Shape::map(map.key_shape().clone(), map.value_shape().clone()),
            NativeValue::Struct(value) => Shape::Struct(value.ty().clone()),
            NativeValue::Ptr(ptr) => Shape::ptr(ptr.elem().clone()),
            NativeValue::Func(func) => Shape::Func(func.sig().clone()),
            NativeValue::Chan(chan) => Shape::chan(chan.elem().clone()),
            NativeValue::Script(_) => Shape::Value,
            NativeValue::Opaque(opaque) => Shape::Opaque(opaque.ty().clone()),
        }
    }

    /// Whether this is an empty slot or a nil reference
    pub fn is_nil(&self) -> bool {
        match self {
            NativeValue::Nil => true,
            NativeValue::Seq(seq) => seq.is_nil(),
            NativeValue::Map(map) => map.is_nil(),
            NativeValue::Ptr(ptr) => ptr.is_nil(),
            NativeValue::Func(func) => func.is_nil(),
            NativeValue::Chan(chan) => chan.is_nil(),
            NativeValue::Opaque(opaque) => opaque.is_nil(),
            _ => false,
        }
    }

    /// Integer payload of any width
    pub fn as_i128(&self) -> Option<i128> {
        Some(match self {
            NativeValue::I8(v) => i128::from(*v),
            NativeValue::I16(v) => i128::from(*v),
            NativeValue::I32(v) => i128::from(*v),
            NativeValue::I64(v) => i128::from(*v),
            NativeValue::Isize(v) => *v as i128,
            NativeValue::U8(v) => i128::from(*v),
            NativeValue::U16(v) => i128::from(*v),
            NativeValue::U32(v) => i128::from(*v),
            NativeValue::U64(v) => i128::from(*v),
            NativeValue::Usize(v) => *v as i128,
            _ => return None,
        })
    }

    /// Float payload of either width
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::F32(v) => Some(f64::from(*v)),
            NativeValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Text payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer `value` as `shape`; `None` when out of range or not numeric.
    ///
    /// Dynamically typed slots take `i64`, or `u64` above its range.
    pub fn from_int(value: i128, shape: &Shape) -> Option<NativeValue> {
        Some(match shape.resolve() {
            Shape::I8 => NativeValue::I8(i8::try_from(value).ok()?),
            Shape::I16 => NativeValue::I16(i16::try_from(value).ok()?),
            Shape::I32 => NativeValue::I32(i32::try_from(value).ok()?),
            Shape::I64 => NativeValue::I64(i64::try_from(value).ok()?),
            Shape::Isize => NativeValue::Isize(isize::try_from(value).ok()?),
            Shape::U8 => NativeValue::U8(u8::try_from(value).ok()?),
            Shape::U16 => NativeValue::U16(u16::try_from(value).ok()?),
            Shape::U32 => NativeValue::U32(u32::try_from(value).ok()?),
            Shape::U64 => NativeValue::U64(u64::try_from(value).ok()?),
            Shape::Usize => NativeValue::Usize(usize::try_from(value).ok()?),
            Shape::F32 => NativeValue::F32(value as f32),
            Shape::F64 => NativeValue::F64(value as f64),
            Shape::Any => match i64::try_from(value) {
                Ok(v) => NativeValue::I64(v),
                Err(_) => NativeValue::U64(u64::try_from(value).ok()?),
            },
            _ => return None,
        })
    }

    /// Float `value` as `shape`
    pub fn from_float(value: f64, shape: &Shape) -> Option<NativeValue> {
        match shape.resolve() {
            Shape::F32 => Some(NativeValue::F32(value as f32)),
            Shape::F64 | Shape::Any => Some(NativeValue::F64(value)),
            _ => None,
        }
    }

    /// Convert to `target` when the value already has that shape or a
    /// compatible scalar one (integer widths, floats, text and bytes).
    pub fn convert(&self, target: &Shape) -> Option<NativeValue> {
        let resolved = target.resolve();
        if matches!(resolved, Shape::Any) {
            return Some(self.clone());
        }
        if let Some(i) = self.as_i128() {
            return NativeValue::from_int(i, resolved);
        }
        if let Some(x) = self.as_f64() {
            return NativeValue::from_float(x, resolved);
        }
        match (self, resolved) {
            (NativeValue::String(s), Shape::Bytes) => Some(NativeValue::Bytes(s.clone().into_bytes())),
            (NativeValue::Bytes(b), Shape::String) => {
                String::from_utf8(b.clone()).ok().map(NativeValue::String)
            }
            _ if self.shape() == *resolved => Some(self.clone()),
            _ => None,
        }
    }

    fn write_native(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            NativeValue::Nil => f.write_str("nil"),
            NativeValue::Bool(v) => write!(f, "{v}"),
            NativeValue::I8(v) => write!(f, "{v}"),
            NativeValue::I16(v) => write!(f, "{v}"),
            NativeValue::I32(v) => write!(f, "{v}"),
            NativeValue::I64(v) => write!(f, "{v}"),
            NativeValue::Isize(v) => write!(f, "{v}"),
            NativeValue::U8(v) => write!(f, "{v}"),
            NativeValue::U16(v) => write!(f, "{v}"),
            NativeValue::U32(v) => write!(f, "{v}"),
            NativeValue::U64(v) => write!(f, "{v}"),
            NativeValue::Usize(v) => write!(f, "{v}"),
            NativeValue::F32(v) => write!(f, "{v}"),
            NativeValue::F64(v) => write!(f, "{v}"),
            NativeValue::String(s) => write!(f, "{s:?}"),
            NativeValue::Bytes(b) => write!(f, "{}", Value::bytes(b.as_slice())),
            NativeValue::Seq(seq) => match seq.identity() {
                None => f.write_str("[]"),
                Some(id) if seen.contains(&id) => f.write_str("[...]"),
                Some(id) => {
                    seen.push(id);
                    write_list(f, seen, &seq.to_vec())?;
                    seen.pop();
                    Ok(())
                }
            },
            NativeValue::Array(array) => write_list(f, seen, array.items()),
            NativeValue::Map(map) => match map.identity() {
                None => f.write_str("map[]"),
                Some(id) if seen.contains(&id) => f.write_str("map[...]"),
                Some(id) => {
                    seen.push(id);
                    f.write_str("map[")?;
                    for (i, (key, value)) in map.entries().iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        key.write_native(f, seen)?;
                        f.write_str(": ")?;
                        value.write_native(f, seen)?;
                    }
                    seen.pop();
                    f.write_str("]")
                }
            },
            NativeValue::Struct(value) => {
                write!(f, "{}{{", value.ty().name())?;
                for (i, field) in value.ty().fields().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ", field.name())?;
                    match value.ty().get_field(value, i) {
                        Ok(field_value) => field_value.write_native(f, seen)?,
                        Err(_) => f.write_str("?")?,
                    }
                }
                f.write_str("}")
            }
            NativeValue::Ptr(ptr) => match ptr.place() {
                None => f.write_str("nil"),
                Some(place) => {
                    let id = place.address();
                    if seen.contains(&id) {
                        return f.write_str("&...");
                    }
                    f.write_str("&")?;
                    seen.push(id);
                    match place.load() {
                        Ok(target) => target.write_native(f, seen)?,
                        Err(_) => f.write_str("?")?,
                    }
                    seen.pop();
                    Ok(())
                }
            },
            NativeValue::Func(func) if func.is_nil() => f.write_str("nil"),
            NativeValue::Func(func) => write!(f, "<fn {}>", func.name()),
            NativeValue::Chan(chan) if chan.is_nil() => f.write_str("nil"),
            NativeValue::Chan(chan) => write!(f, "chan<{}>", chan.elem()),
            NativeValue::Script(value) => write!(f, "{value}"),
            NativeValue::Opaque(opaque) if opaque.is_nil() => f.write_str("nil"),
            NativeValue::Opaque(opaque) => write!(f, "<{}>", opaque.ty().name()),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>, items: &[NativeValue]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.write_native(f, seen)?;
    }
    f.write_str("]")
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = Vec::new();
        self.write_native(f, &mut seen)
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Default for NativeValue {
    fn default() -> Self {
        NativeValue::Nil
    }
}

/// Conversion failure for a native value that does not fit `shape`
pub fn mismatch(value: &NativeValue, shape: &Shape) -> ScriptError {
    ScriptError::Conversion {
        value: value.to_string(),
        value_type: value.shape().to_string(),
        shape: shape.to_string(),
    }
}

// ============================================================================
// Sequences and arrays
// ============================================================================

/// Shared growable sequence
#[derive(Clone)]
pub struct SeqValue {
    elem: Shape,
    data: Option<Rc<RefCell<Vec<NativeValue>>>>,
}

impl SeqValue {
    /// Allocate a sequence holding `items`
    pub fn new(elem: Shape, items: Vec<NativeValue>) -> Self {
        Self {
            elem,
            data: Some(Rc::new(RefCell::new(items))),
        }
    }

    /// Nil sequence
    pub fn nil(elem: Shape) -> Self {
        Self { elem, data: None }
    }

    /// Element shape
    pub fn elem(&self) -> &Shape {
        &self.elem
    }

    /// Whether this is the nil sequence
    pub fn is_nil(&self) -> bool {
        self.data.is_none()
    }

    /// Number of elements (0 when nil)
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.borrow().len())
    }

    /// Whether the sequence has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<NativeValue> {
        self.data.as_ref()?.borrow().get(index).cloned()
    }

    /// Replace the element at `index`
    pub fn set(&self, index: usize, value: NativeValue) -> ScriptResult<()> {
        let len = self.len();
        let data = self.data.as_ref().ok_or(ScriptError::IndexOutOfRange {
            index: index as i64,
            len,
        })?;
        let mut items = data.borrow_mut();
        let slot = items.get_mut(index).ok_or(ScriptError::IndexOutOfRange {
            index: index as i64,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Append; a nil sequence is allocated first
    pub fn push(&mut self, value: NativeValue) {
        self.data
            .get_or_insert_with(|| Rc::new(RefCell::new(Vec::new())))
            .borrow_mut()
            .push(value);
    }

    /// Snapshot of the elements
    pub fn to_vec(&self) -> Vec<NativeValue> {
        self.data
            .as_ref()
            .map(|data| data.borrow().clone())
            .unwrap_or_default()
    }

    /// Storage identity, `None` when nil
    pub fn identity(&self) -> Option<usize> {
        self.data.as_ref().map(|data| Rc::as_ptr(data) as usize)
    }
}

/// Fixed-size sequence held by value
#[derive(Clone)]
pub struct ArrayValue {
    elem: Shape,
    items: Vec<NativeValue>,
}

impl ArrayValue {
    /// Array of `items`
    pub fn new(elem: Shape, items: Vec<NativeValue>) -> Self {
        Self { elem, items }
    }

    /// Element shape
    pub fn elem(&self) -> &Shape {
        &self.elem
    }

    /// Fixed length
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the array has length zero
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Elements
    pub fn items(&self) -> &[NativeValue] {
        &self.items
    }

    /// Replace the element at `index`
    pub fn set(&mut self, index: usize, value: NativeValue) -> ScriptResult<()> {
        let len = self.items.len();
        let slot = self.items.get_mut(index).ok_or(ScriptError::IndexOutOfRange {
            index: index as i64,
            len,
        })?;
        *slot = value;
        Ok(())
    }
}

// ============================================================================
// Maps
// ============================================================================

/// Hashable form of a native map key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    /// Boolean key
    Bool(bool),
    /// Integer key of any width
    Int(i128),
    /// Float key, by bit pattern
    Float(u64),
    /// Text key
    String(String),
    /// Byte sequence key
    Bytes(Vec<u8>),
    /// Pointer key, by place address
    Ptr(usize),
}

impl MapKey {
    /// Key for `value`; fails with `Unhashable` for non-comparable kinds
    pub fn of(value: &NativeValue) -> ScriptResult<MapKey> {
        if let Some(i) = value.as_i128() {
            return Ok(MapKey::Int(i));
        }
        match value {
            NativeValue::Bool(b) => Ok(MapKey::Bool(*b)),
            NativeValue::F32(_) | NativeValue::F64(_) => {
                let x = value.as_f64().unwrap_or_default();
                // -0.0 and 0.0 are the same key
                Ok(MapKey::Float(if x == 0.0 { 0 } else { x.to_bits() }))
            }
            NativeValue::String(s) => Ok(MapKey::String(s.clone())),
            NativeValue::Bytes(b) => Ok(MapKey::Bytes(b.clone())),
            NativeValue::Ptr(ptr) => Ok(MapKey::Ptr(ptr.place().map_or(0, |p| p.address()))),
            other => Err(ScriptError::Unhashable {
                type_name: other.shape().to_string(),
            }),
        }
    }
}

/// Insertion-ordered native map storage
#[derive(Clone, Default)]
pub struct NativeMap {
    entries: Vec<(NativeValue, NativeValue)>,
    index: FxHashMap<MapKey, usize>,
}

impl NativeMap {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key`
    pub fn get(&self, key: &NativeValue) -> ScriptResult<Option<&NativeValue>> {
        let key = MapKey::of(key)?;
        Ok(self.index.get(&key).map(|&i| &self.entries[i].1))
    }

    /// Insert or overwrite; returns the previous value
    pub fn insert(&mut self, key: NativeValue, value: NativeValue) -> ScriptResult<Option<NativeValue>> {
        let map_key = MapKey::of(&key)?;
        if let Some(&i) = self.index.get(&map_key) {
            return Ok(Some(std::mem::replace(&mut self.entries[i].1, value)));
        }
        self.index.insert(map_key, self.entries.len());
        self.entries.push((key, value));
        Ok(None)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(NativeValue, NativeValue)] {
        &self.entries
    }
}

/// Shared hash map handle
#[derive(Clone)]
pub struct MapValue {
    key: Shape,
    value: Shape,
    data: Option<Rc<RefCell<NativeMap>>>,
}

impl MapValue {
    /// Allocate an empty map
    pub fn new(key: Shape, value: Shape) -> Self {
        Self {
            key,
            value,
            data: Some(Rc::new(RefCell::new(NativeMap::default()))),
        }
    }

    /// Nil map
    pub fn nil(key: Shape, value: Shape) -> Self {
        Self {
            key,
            value,
            data: None,
        }
    }

    /// Key shape
    pub fn key_shape(&self) -> &Shape {
        &self.key
    }

    /// Value shape
    pub fn value_shape(&self) -> &Shape {
        &self.value
    }

    /// Whether this is the nil map
    pub fn is_nil(&self) -> bool {
        self.data.is_none()
    }

    /// Number of entries (0 when nil)
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.borrow().len())
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key`; a nil map has no entries
    pub fn get(&self, key: &NativeValue) -> ScriptResult<Option<NativeValue>> {
        match &self.data {
            Some(data) => Ok(data.borrow().get(key)?.cloned()),
            None => Ok(None),
        }
    }

    /// Insert or overwrite
    pub fn insert(&self, key: NativeValue, value: NativeValue) -> ScriptResult<()> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| ScriptError::Host("assignment to entry in nil map".to_string()))?;
        data.borrow_mut().insert(key, value)?;
        Ok(())
    }

    /// Snapshot of the entries
    pub fn entries(&self) -> Vec<(NativeValue, NativeValue)> {
        self.data
            .as_ref()
            .map(|data| data.borrow().entries().to_vec())
            .unwrap_or_default()
    }

    /// Key at enumeration position `index`
    pub fn key_at(&self, index: usize) -> Option<NativeValue> {
        let data = self.data.as_ref()?;
        let map = data.borrow();
        map.entries().get(index).map(|(key, _)| key.clone())
    }

    /// Storage identity, `None` when nil
    pub fn identity(&self) -> Option<usize> {
        self.data.as_ref().map(|data| Rc::as_ptr(data) as usize)
    }

    /// Whether both handles share storage
    pub fn same(&self, other: &MapValue) -> bool {
        matches!((&self.data, &other.data), (Some(a), Some(b)) if Rc::ptr_eq(a, b))
    }
}

// ============================================================================
// Channels and opaque handles
// ============================================================================

struct Channel {
    tx: Sender<NativeValue>,
    rx: Receiver<NativeValue>,
}

/// Channel handle
#[derive(Clone)]
pub struct ChanValue {
    elem: Shape,
    chan: Option<Rc<Channel>>,
}

impl ChanValue {
    /// Channel buffering up to `capacity` values
    pub fn bounded(elem: Shape, capacity: usize) -> Self {
        let (tx, rx) = channel::bounded(capacity);
        Self {
            elem,
            chan: Some(Rc::new(Channel { tx, rx })),
        }
    }

    /// Nil channel
    pub fn nil(elem: Shape) -> Self {
        Self { elem, chan: None }
    }

    /// Element shape
    pub fn elem(&self) -> &Shape {
        &self.elem
    }

    /// Whether this is the nil channel
    pub fn is_nil(&self) -> bool {
        self.chan.is_none()
    }

    /// Number of buffered values
    pub fn len(&self) -> usize {
        self.chan.as_ref().map_or(0, |chan| chan.rx.len())
    }

    /// Whether no values are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer a value without blocking
    pub fn send(&self, value: NativeValue) -> ScriptResult<()> {
        let chan = self
            .chan
            .as_ref()
            .ok_or_else(|| ScriptError::Host("send on nil channel".to_string()))?;
        chan.tx.try_send(value).map_err(|err| match err {
            TrySendError::Full(_) => ScriptError::Host("channel is full".to_string()),
            TrySendError::Disconnected(_) => ScriptError::Host("channel is closed".to_string()),
        })
    }

    /// Take a buffered value without blocking
    pub fn recv(&self) -> Option<NativeValue> {
        self.chan.as_ref()?.rx.try_recv().ok()
    }
}

/// Registered opaque host handle
#[derive(Clone)]
pub struct OpaqueValue {
    ty: OpaqueType,
    data: Option<Rc<dyn Any>>,
}

impl OpaqueValue {
    /// Wrap `value` as an opaque handle named `name`
    pub fn new<T: 'static>(name: &str, value: T) -> Self {
        Self {
            ty: OpaqueType::of::<T>(name),
            data: Some(Rc::new(value)),
        }
    }

    /// Empty handle
    pub fn nil(ty: OpaqueType) -> Self {
        Self { ty, data: None }
    }

    /// Handle type
    pub fn ty(&self) -> &OpaqueType {
        &self.ty
    }

    /// Whether the handle is empty
    pub fn is_nil(&self) -> bool {
        self.data.is_none()
    }

    /// Borrow the wrapped host value
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref::<T>()
    }
}
