//! Script callables
//!
//! [`Function`] stands for a compiled script function literal: a name, its
//! parameter list and a body. [`Builtin`] is a native function registered
//! directly with the runtime; it receives arguments exactly as passed.

use std::fmt;

use crate::context::Context;
use crate::error::{ScriptError, ScriptResult};
use crate::value::Value;

/// Body of a script function; receives arguments bound to its parameters
pub type FunctionBody = dyn Fn(&Context, &[Value]) -> ScriptResult<Value>;

/// Body of a builtin; receives positional and keyword arguments
pub type BuiltinBody = dyn Fn(&Context, &[Value], &[(String, Value)]) -> ScriptResult<Value>;

/// Script function literal
pub struct Function {
    name: String,
    params: Vec<String>,
    body: Box<FunctionBody>,
}

impl Function {
    /// Create a named function
    pub fn new(
        name: impl Into<String>,
        params: &[&str],
        body: impl Fn(&Context, &[Value]) -> ScriptResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        }
    }

    /// Create an anonymous function
    pub fn lambda(
        params: &[&str],
        body: impl Fn(&Context, &[Value]) -> ScriptResult<Value> + 'static,
    ) -> Self {
        Self::new("lambda", params, body)
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter names
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub(crate) fn invoke(
        &self,
        ctx: &Context,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ScriptResult<Value> {
        let bound = self.bind(args, kwargs)?;
        (self.body)(ctx, &bound)
    }

    fn bind(&self, args: &[Value], kwargs: &[(String, Value)]) -> ScriptResult<Vec<Value>> {
        let arity_error = || ScriptError::ArgumentCount {
            name: self.name.clone(),
            expected: self.params.len().to_string(),
            got: args.len() + kwargs.len(),
        };
        if args.len() > self.params.len() {
            return Err(arity_error());
        }

        let mut slots: Vec<Option<Value>> = args.iter().cloned().map(Some).collect();
        slots.resize(self.params.len(), None);
        for (name, value) in kwargs {
            let slot = self
                .params
                .iter()
                .position(|p| p == name)
                .ok_or_else(|| {
                    ScriptError::Argument(format!(
                        "{}: unexpected keyword argument {name}",
                        self.name
                    ))
                })?;
            if slots[slot].is_some() {
                return Err(ScriptError::Argument(format!(
                    "{}: got multiple values for parameter {name}",
                    self.name
                )));
            }
            slots[slot] = Some(value.clone());
        }
        slots.into_iter().collect::<Option<Vec<_>>>().ok_or_else(arity_error)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Native function registered with the runtime
pub struct Builtin {
    name: String,
    body: Box<BuiltinBody>,
}

impl Builtin {
    /// Create a builtin
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&Context, &[Value], &[(String, Value)]) -> ScriptResult<Value> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// Builtin name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(
        &self,
        ctx: &Context,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ScriptResult<Value> {
        (self.body)(ctx, args, kwargs)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
