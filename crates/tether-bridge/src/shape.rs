//! Type shapes
//!
//! A [`Shape`] describes the native type a script value is decoded into:
//! scalar kinds, containers with their element shapes, registered structs,
//! pointers and function signatures. Shapes are immutable and shared.

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use tether_core::{ScriptError, ScriptResult};

use crate::host::StructType;

/// Description of a native type
#[derive(Clone)]
pub enum Shape {
    /// `bool`
    Bool,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `isize`
    Isize,
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `usize`
    Usize,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// Text
    String,
    /// Byte sequence (also the shape of every `u8` sequence)
    Bytes,
    /// Slot holding a script value unchanged
    Value,
    /// Dynamically typed host slot
    Any,
    /// Growable shared sequence
    Seq(Rc<Shape>),
    /// Fixed-size sequence held by value
    Array(Rc<Shape>, usize),
    /// Hash map
    Map(Rc<Shape>, Rc<Shape>),
    /// Registered host struct
    Struct(Rc<StructType>),
    /// Reference to a place holding the element shape
    Ptr(Rc<Shape>),
    /// Native callable
    Func(Rc<FuncSig>),
    /// Channel
    Chan(Rc<Shape>),
    /// Opaque host handle
    Opaque(OpaqueType),
    /// Late-bound named shape, for self-referential types
    Named(Rc<NamedShape>),
}

impl Shape {
    /// Sequence of `elem`; a sequence of `u8` is `Bytes`
    pub fn seq(elem: Shape) -> Shape {
        if matches!(elem.resolve(), Shape::U8) {
            Shape::Bytes
        } else {
            Shape::Seq(Rc::new(elem))
        }
    }

    /// Fixed-size array
    pub fn array(elem: Shape, len: usize) -> Shape {
        Shape::Array(Rc::new(elem), len)
    }

    /// Hash map
    pub fn map(key: Shape, value: Shape) -> Shape {
        Shape::Map(Rc::new(key), Rc::new(value))
    }

    /// Pointer
    pub fn ptr(elem: Shape) -> Shape {
        Shape::Ptr(Rc::new(elem))
    }

    /// Channel
    pub fn chan(elem: Shape) -> Shape {
        Shape::Chan(Rc::new(elem))
    }

    /// Function
    pub fn func(sig: FuncSig) -> Shape {
        Shape::Func(Rc::new(sig))
    }

    /// Follow named shapes to their definition.
    ///
    /// A named shape that was declared but never defined resolves to itself.
    pub fn resolve(&self) -> &Shape {
        let mut shape = self;
        while let Shape::Named(named) = shape {
            match named.shape.get() {
                Some(inner) => shape = inner,
                None => break,
            }
        }
        shape
    }

    /// Whether `None` decodes to the zero value of this shape
    pub fn is_nilable(&self) -> bool {
        matches!(
            self.resolve(),
            Shape::Ptr(_)
                | Shape::Func(_)
                | Shape::Map(..)
                | Shape::Seq(_)
                | Shape::Bytes
                | Shape::Any
                | Shape::Chan(_)
        )
    }

    /// Whether this is one of the integer shapes
    pub fn is_int(&self) -> bool {
        matches!(
            self.resolve(),
            Shape::I8
                | Shape::I16
                | Shape::I32
                | Shape::I64
                | Shape::Isize
                | Shape::U8
                | Shape::U16
                | Shape::U32
                | Shape::U64
                | Shape::Usize
        )
    }

    /// Whether this is one of the float shapes
    pub fn is_float(&self) -> bool {
        matches!(self.resolve(), Shape::F32 | Shape::F64)
    }

    /// Element shape of sequences, arrays, pointers and channels
    pub fn elem(&self) -> Option<Shape> {
        match self.resolve() {
            Shape::Seq(elem) | Shape::Array(elem, _) | Shape::Ptr(elem) | Shape::Chan(elem) => {
                Some((**elem).clone())
            }
            Shape::Bytes => Some(Shape::U8),
            _ => None,
        }
    }
}

impl PartialEq for Shape {
    /// Structs, named shapes and opaque handles compare nominally; everything
    /// else compares structurally.
    fn eq(&self, other: &Self) -> bool {
        if let (Shape::Named(a), Shape::Named(b)) = (self, other) {
            return Rc::ptr_eq(a, b);
        }
        let (a, b) = (self.resolve(), other.resolve());
        if matches!(a, Shape::Named(_)) || matches!(b, Shape::Named(_)) {
            // declared but never defined
            return false;
        }
        match (a, b) {
            (Shape::Seq(x), Shape::Seq(y)) => x == y,
            (Shape::Array(x, n), Shape::Array(y, m)) => n == m && x == y,
            (Shape::Map(k1, v1), Shape::Map(k2, v2)) => k1 == k2 && v1 == v2,
            (Shape::Struct(x), Shape::Struct(y)) => Rc::ptr_eq(x, y),
            (Shape::Ptr(x), Shape::Ptr(y)) => x == y,
            (Shape::Func(x), Shape::Func(y)) => Rc::ptr_eq(x, y) || x == y,
            (Shape::Chan(x), Shape::Chan(y)) => x == y,
            (Shape::Opaque(x), Shape::Opaque(y)) => x == y,
            _ => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Bool => f.write_str("bool"),
            Shape::I8 => f.write_str("i8"),
            Shape::I16 => f.write_str("i16"),
            Shape::I32 => f.write_str("i32"),
            Shape::I64 => f.write_str("i64"),
            Shape::Isize => f.write_str("isize"),
            Shape::U8 => f.write_str("u8"),
            Shape::U16 => f.write_str("u16"),
            Shape::U32 => f.write_str("u32"),
            Shape::U64 => f.write_str("u64"),
            Shape::Usize => f.write_str("usize"),
            Shape::F32 => f.write_str("f32"),
            Shape::F64 => f.write_str("f64"),
            Shape::String => f.write_str("string"),
            Shape::Bytes => f.write_str("bytes"),
            Shape::Value => f.write_str("value"),
            Shape::Any => f.write_str("any"),
            Shape::Seq(elem) => write!(f, "list<{elem}>"),
            Shape::Array(elem, len) => write!(f, "array<{elem}; {len}>"),
            Shape::Map(key, value) => write!(f, "map<{key}, {value}>"),
            Shape::Struct(ty) => f.write_str(ty.name()),
            Shape::Ptr(elem) => write!(f, "ptr<{elem}>"),
            Shape::Func(sig) => write!(f, "{sig}"),
            Shape::Chan(elem) => write!(f, "chan<{elem}>"),
            Shape::Opaque(ty) => f.write_str(ty.name()),
            Shape::Named(named) => f.write_str(named.name()),
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ============================================================================
// Function signatures
// ============================================================================

/// Parameter and result shapes of a native callable
#[derive(Clone, PartialEq)]
pub struct FuncSig {
    params: Vec<Shape>,
    results: Vec<Shape>,
    variadic: bool,
}

impl FuncSig {
    /// Fixed-arity signature
    pub fn new(params: Vec<Shape>, results: Vec<Shape>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }

    /// Variadic signature: trailing arguments are collected into a sequence
    /// of `rest`
    pub fn variadic(mut params: Vec<Shape>, rest: Shape, results: Vec<Shape>) -> Self {
        params.push(Shape::seq(rest));
        Self {
            params,
            results,
            variadic: true,
        }
    }

    /// Declared parameter shapes; for a variadic signature the last one is
    /// the sequence the trailing arguments are collected into
    pub fn params(&self) -> &[Shape] {
        &self.params
    }

    /// Declared result shapes
    pub fn results(&self) -> &[Shape] {
        &self.results
    }

    /// Whether trailing arguments are collected
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Number of parameters before the variadic tail
    pub fn fixed_arity(&self) -> usize {
        if self.variadic {
            self.params.len() - 1
        } else {
            self.params.len()
        }
    }

    /// Element shape of the variadic tail
    pub fn rest(&self) -> Option<Shape> {
        if self.variadic {
            self.params.last().and_then(Shape::elem)
        } else {
            None
        }
    }

    /// Human-readable arity for error messages
    pub fn arity_text(&self) -> String {
        if self.variadic {
            format!("at least {}", self.fixed_arity())
        } else {
            self.params.len().to_string()
        }
    }
}

impl fmt::Display for FuncSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match (self.variadic && i + 1 == self.params.len(), param.elem()) {
                (true, Some(rest)) => write!(f, "...{rest}")?,
                _ => write!(f, "{param}")?,
            }
        }
        f.write_str(")")?;
        match self.results.as_slice() {
            [] => Ok(()),
            [single] => write!(f, " -> {single}"),
            many => {
                f.write_str(" -> (")?;
                for (i, result) in many.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{result}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Named and opaque shapes
// ============================================================================

/// A shape declared by name and defined later
pub struct NamedShape {
    name: String,
    shape: OnceCell<Shape>,
}

impl NamedShape {
    /// Declare a named shape without a definition
    pub fn declare(name: impl Into<String>) -> Rc<NamedShape> {
        Rc::new(Self {
            name: name.into(),
            shape: OnceCell::new(),
        })
    }

    /// Bind the definition; a named shape can be defined once
    pub fn define(&self, shape: Shape) -> ScriptResult<()> {
        self.shape
            .set(shape)
            .map_err(|_| ScriptError::Host(format!("shape {} is already defined", self.name)))
    }

    /// Shape name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Definition, if bound
    pub fn get(&self) -> Option<&Shape> {
        self.shape.get()
    }
}

/// Identity of an opaque host type
#[derive(Clone, PartialEq, Eq)]
pub struct OpaqueType {
    name: Rc<str>,
    type_id: TypeId,
}

impl OpaqueType {
    /// Opaque type for `T`, displayed as `name`
    pub fn of<T: 'static>(name: &str) -> Self {
        Self {
            name: name.into(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type identity
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}
