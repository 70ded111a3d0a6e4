//! Named namespaces of values

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{ScriptError, ScriptResult};
use crate::object::ScriptObject;
use crate::value::Value;

/// A frozen, named namespace
pub struct Module {
    name: String,
    members: FxHashMap<String, Value>,
}

impl Module {
    /// Create a module from its members
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            name: name.into(),
            members: members.into_iter().collect(),
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member by name
    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members.get(name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module {:?}>", self.name)
    }
}

impl ScriptObject for Module {
    fn type_name(&self) -> String {
        "module".to_string()
    }

    fn attr(&self, name: &str) -> ScriptResult<Value> {
        self.members.get(name).cloned().ok_or_else(|| {
            ScriptError::unsupported(format!("module {}", self.name), format!("attribute {name}"))
        })
    }

    fn attr_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.members.keys().cloned().collect();
        names.sort();
        names
    }
}
