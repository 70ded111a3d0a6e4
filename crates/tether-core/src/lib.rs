//! Tether Core
//!
//! The script side of the native bridge:
//! - `Value`: the script value universe
//! - `ScriptObject`: the capability protocol for non-primitive values
//! - `Context`: the evaluation handle callables are invoked through
//! - `Function` / `Builtin`: script and native callables
//! - `Module`: frozen named namespaces
//! - `ScriptError`: the shared error type

#![warn(missing_docs)]

pub mod context;
pub mod dict;
pub mod error;
pub mod function;
pub mod module;
pub mod object;
pub mod options;
pub mod value;

pub use context::Context;
pub use dict::{Dict, Set};
pub use error::{ScriptError, ScriptResult};
pub use function::{Builtin, Function};
pub use module::Module;
pub use object::{ScriptObject, ValueIter};
pub use options::{ContextOptions, OptionsError};
pub use value::{List, Value};
