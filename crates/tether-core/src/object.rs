//! Capability protocol for script objects
//!
//! Every operation the runtime can perform on a value is a method of
//! [`ScriptObject`]. Implementors override the capabilities they have; the
//! defaults fail with `UnsupportedOperation` (or `Unhashable` for `hash`,
//! `NotCallable` for `call`).

use std::any::Any;
use std::fmt;

use crate::context::Context;
use crate::error::{ScriptError, ScriptResult};
use crate::value::Value;

/// Lazy sequence of values produced by iteration
pub type ValueIter = Box<dyn Iterator<Item = ScriptResult<Value>>>;

/// A value participating in the script runtime's capability protocol.
///
/// `Display` supplies the value's string form.
pub trait ScriptObject: fmt::Display + Any {
    /// Type name reported to scripts
    fn type_name(&self) -> String;

    /// Truthiness
    fn truth(&self) -> bool {
        true
    }

    /// Hash for use as a mapping key
    fn hash(&self) -> ScriptResult<u64> {
        Err(ScriptError::Unhashable {
            type_name: self.type_name(),
        })
    }

    /// Attribute lookup
    fn attr(&self, name: &str) -> ScriptResult<Value> {
        Err(ScriptError::unsupported(
            self.type_name(),
            format!("attribute {name}"),
        ))
    }

    /// Attribute assignment
    fn set_attr(&self, name: &str, _value: Value) -> ScriptResult<()> {
        Err(ScriptError::unsupported(
            self.type_name(),
            format!("attribute assignment {name}"),
        ))
    }

    /// Names of the readable attributes
    fn attr_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether `call` is supported
    fn is_callable(&self) -> bool {
        false
    }

    /// Invoke with positional and keyword arguments
    fn call(
        &self,
        _ctx: &Context,
        _args: &[Value],
        _kwargs: &[(String, Value)],
    ) -> ScriptResult<Value> {
        Err(ScriptError::NotCallable {
            type_name: self.type_name(),
        })
    }

    /// Element at `index`
    fn index(&self, _index: usize) -> ScriptResult<Value> {
        Err(ScriptError::unsupported(self.type_name(), "index"))
    }

    /// Assign the element at `index`
    fn set_index(&self, _index: usize, _value: Value) -> ScriptResult<()> {
        Err(ScriptError::unsupported(self.type_name(), "index assignment"))
    }

    /// Number of elements
    fn len(&self) -> ScriptResult<usize> {
        Err(ScriptError::unsupported(self.type_name(), "len"))
    }

    /// Slice with normalized bounds; `step` is non-zero and may be negative.
    fn slice(&self, _start: i64, _end: i64, _step: i64) -> ScriptResult<Value> {
        Err(ScriptError::unsupported(self.type_name(), "slice"))
    }

    /// Fresh iterator over the elements
    fn iterate(&self) -> ScriptResult<ValueIter> {
        Err(ScriptError::unsupported(self.type_name(), "iteration"))
    }

    /// Mapping lookup; absence is `Ok(None)`
    fn get(&self, _key: &Value) -> ScriptResult<Option<Value>> {
        Err(ScriptError::unsupported(self.type_name(), "get"))
    }

    /// Mapping assignment
    fn set_key(&self, _key: Value, _value: Value) -> ScriptResult<()> {
        Err(ScriptError::unsupported(self.type_name(), "set_key"))
    }

    /// Mapping entries
    fn items(&self) -> ScriptResult<Vec<(Value, Value)>> {
        Err(ScriptError::unsupported(self.type_name(), "items"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque;

    impl fmt::Display for Opaque {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("<opaque>")
        }
    }

    impl ScriptObject for Opaque {
        fn type_name(&self) -> String {
            "opaque".to_string()
        }
    }

    #[test]
    fn test_defaults_fail() {
        let value = Value::object(Opaque);
        assert!(value.truth());
        assert_eq!(value.to_string(), "<opaque>");
        assert!(matches!(value.hash(), Err(ScriptError::Unhashable { .. })));
        assert!(matches!(
            value.get(&Value::Int(1)),
            Err(ScriptError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            value.len(),
            Err(ScriptError::UnsupportedOperation { .. })
        ));
        assert!(value.downcast_ref::<Opaque>().is_some());
        assert!(!value.is_callable());
    }
}
