//! Typed conversion between Rust values and [`NativeValue`]
//!
//! `FromNative` and `ToNative` move values across the dynamic boundary;
//! `NativeType` adds the static shape for types that have one. Dynamic
//! handles (sequences, maps, pointers, callables) only convert, since their
//! shape is a property of each value.

use tether_core::{ScriptError, ScriptResult, Value};

use crate::func::FuncValue;
use crate::native::{mismatch, ChanValue, MapValue, NativeValue, OpaqueValue, SeqValue};
use crate::place::PtrValue;
use crate::shape::Shape;

/// Convert from a native value, failing if the value does not fit
pub trait FromNative: Sized {
    /// Extract `Self` from `value`
    fn from_native(value: NativeValue) -> ScriptResult<Self>;
}

/// Convert into a native value
pub trait ToNative {
    /// Wrap `self`
    fn to_native(self) -> NativeValue;
}

/// A Rust type with a fixed native shape
pub trait NativeType: FromNative + ToNative {
    /// Shape of every value of this type
    fn shape() -> Shape;
}

/// Typed argument `index` of a native call
pub fn arg<T: FromNative>(args: &[NativeValue], index: usize) -> ScriptResult<T> {
    T::from_native(args.get(index).cloned().unwrap_or_default())
}

// ============================================================================
// Scalars
// ============================================================================

macro_rules! scalar_native {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl FromNative for $ty {
            fn from_native(value: NativeValue) -> ScriptResult<Self> {
                match value.convert(&Shape::$variant) {
                    Some(NativeValue::$variant(v)) => Ok(v),
                    _ => Err(mismatch(&value, &Shape::$variant)),
                }
            }
        }

        impl ToNative for $ty {
            fn to_native(self) -> NativeValue {
                NativeValue::$variant(self)
            }
        }

        impl NativeType for $ty {
            fn shape() -> Shape {
                Shape::$variant
            }
        }
    )*};
}

scalar_native! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => String,
}

// ============================================================================
// Sequences
// ============================================================================

impl<T: NativeType> FromNative for Vec<T> {
    fn from_native(value: NativeValue) -> ScriptResult<Self> {
        match value {
            NativeValue::Seq(seq) => seq.to_vec().into_iter().map(T::from_native).collect(),
            NativeValue::Array(array) => array.items().iter().cloned().map(T::from_native).collect(),
            NativeValue::Bytes(bytes) => bytes
                .into_iter()
                .map(|b| T::from_native(NativeValue::U8(b)))
                .collect(),
            other => Err(mismatch(&other, &<Self as NativeType>::shape())),
        }
    }
}

impl<T: NativeType> ToNative for Vec<T> {
    fn to_native(self) -> NativeValue {
        NativeValue::seq(T::shape(), self.into_iter().map(ToNative::to_native).collect())
    }
}

impl<T: NativeType> NativeType for Vec<T> {
    fn shape() -> Shape {
        Shape::seq(T::shape())
    }
}

// ============================================================================
// Dynamic slots
// ============================================================================

impl FromNative for NativeValue {
    fn from_native(value: NativeValue) -> ScriptResult<Self> {
        Ok(value)
    }
}

impl ToNative for NativeValue {
    fn to_native(self) -> NativeValue {
        self
    }
}

impl NativeType for NativeValue {
    fn shape() -> Shape {
        Shape::Any
    }
}

impl FromNative for Value {
    fn from_native(value: NativeValue) -> ScriptResult<Self> {
        match value {
            NativeValue::Script(v) => Ok(v),
            NativeValue::Nil => Ok(Value::None),
            other => Err(mismatch(&other, &Shape::Value)),
        }
    }
}

impl ToNative for Value {
    fn to_native(self) -> NativeValue {
        NativeValue::Script(self)
    }
}

impl NativeType for Value {
    fn shape() -> Shape {
        Shape::Value
    }
}

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle_native {
    ($($ty:ty => $variant:ident, $kind:literal),* $(,)?) => {$(
        impl FromNative for $ty {
            fn from_native(value: NativeValue) -> ScriptResult<Self> {
                match value {
                    NativeValue::$variant(v) => Ok(v),
                    other => Err(ScriptError::Conversion {
                        value: other.to_string(),
                        value_type: other.shape().to_string(),
                        shape: $kind.to_string(),
                    }),
                }
            }
        }

        impl ToNative for $ty {
            fn to_native(self) -> NativeValue {
                NativeValue::$variant(self)
            }
        }
    )*};
}

handle_native! {
    SeqValue => Seq, "list",
    MapValue => Map, "map",
    PtrValue => Ptr, "ptr",
    FuncValue => Func, "fn",
    ChanValue => Chan, "chan",
    OpaqueValue => Opaque, "opaque",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_widening() {
        assert_eq!(i64::from_native(NativeValue::I8(-3)).unwrap(), -3);
        assert_eq!(f64::from_native(NativeValue::I32(2)).unwrap(), 2.0);
        assert!(u8::from_native(NativeValue::I64(256)).is_err());
        assert!(bool::from_native(NativeValue::I64(1)).is_err());
    }

    #[test]
    fn test_vec_round_trip() {
        let native = vec!["a".to_string(), "b".to_string()].to_native();
        assert_eq!(native.shape(), Shape::seq(Shape::String));
        let back = Vec::<String>::from_native(native).unwrap();
        assert_eq!(back, vec!["a", "b"]);
    }

    #[test]
    fn test_byte_vec_is_bytes() {
        let native = vec![1u8, 2, 3].to_native();
        assert!(matches!(&native, NativeValue::Bytes(b) if b == &[1, 2, 3]));
        assert_eq!(Vec::<u8>::from_native(native).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_arg_helper() {
        let args = vec![NativeValue::String("x".into())];
        assert_eq!(arg::<String>(&args, 0).unwrap(), "x");
        assert!(arg::<String>(&args, 1).is_err());
    }

    #[test]
    fn test_handle_mismatch() {
        let err = FuncValue::from_native(NativeValue::I64(1)).unwrap_err();
        assert!(matches!(err, ScriptError::Conversion { ref shape, .. } if shape == "fn"));
    }
}
