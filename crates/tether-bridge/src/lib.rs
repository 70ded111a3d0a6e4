//! Tether Bridge
//!
//! Moves values between Rust and the script runtime:
//! - `Shape`: runtime description of a native type
//! - `NativeValue`: a dynamically typed native value
//! - `StructType` / `host_struct!`: field and method registration for host types
//! - `encode`: native to script, wrapping composites in an `Adapter`
//! - `to_script`: deep copy of dynamic host collections into script containers
//! - `decode`: script to native against a target shape, cycle safe
//! - `bridge`: a script callable exposed as a native function

#![warn(missing_docs)]

pub mod adapter;
pub mod convert;
pub mod decode;
pub mod encode;
pub mod func;
pub mod host;
pub mod native;
pub mod place;
pub mod shape;

pub use adapter::Adapter;
pub use convert::{arg, FromNative, NativeType, ToNative};
pub use decode::{bridge, decode};
pub use encode::{encode, encode_all, to_script};
pub use func::FuncValue;
pub use host::{FieldDef, HostStruct, MethodDef, Receiver, StructType, StructValue};
pub use native::{ArrayValue, ChanValue, MapValue, NativeValue, OpaqueValue, SeqValue};
pub use place::{Place, PtrValue};
pub use shape::{FuncSig, NamedShape, OpaqueType, Shape};

pub use tether_core::{Context, ScriptError, ScriptResult, Value};
