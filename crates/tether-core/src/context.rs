//! Evaluation context
//!
//! A [`Context`] is the handle through which callables are invoked. It is
//! cheap to clone; clones share the same globals and call depth, so a native
//! callback that captured a context reenters the very evaluation that
//! created it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::error::{ScriptError, ScriptResult};
use crate::module::Module;
use crate::options::ContextOptions;
use crate::value::Value;

/// Handle to an evaluation context
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

struct ContextInner {
    options: ContextOptions,
    depth: Cell<usize>,
    globals: RefCell<FxHashMap<String, Value>>,
}

/// Marks one active call; releases the depth slot on drop
struct CallFrame<'a> {
    depth: &'a Cell<usize>,
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Context {
    /// Create a context with default options
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    /// Create a context with the given options
    pub fn with_options(options: ContextOptions) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                options,
                depth: Cell::new(0),
                globals: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    /// Context name
    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Options this context was created with
    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    /// Number of calls currently active on this context
    pub fn depth(&self) -> usize {
        self.inner.depth.get()
    }

    /// Whether two handles refer to the same context
    pub fn same(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn enter(&self) -> ScriptResult<CallFrame<'_>> {
        let depth = self.inner.depth.get();
        if let Some(limit) = self.inner.options.max_call_depth {
            if depth >= limit {
                warn!(context = %self.name(), limit, "call depth limit reached");
                return Err(ScriptError::CallDepthExceeded { limit });
            }
        }
        self.inner.depth.set(depth + 1);
        Ok(CallFrame {
            depth: &self.inner.depth,
        })
    }

    /// Invoke `callee` synchronously with positional and keyword arguments
    pub fn call(
        &self,
        callee: &Value,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> ScriptResult<Value> {
        let _frame = self.enter()?;
        trace!(callee = %callee.type_name(), depth = self.depth(), "call");
        match callee {
            Value::Function(function) => function.invoke(self, args, kwargs),
            Value::Builtin(builtin) => builtin.invoke(self, args, kwargs),
            Value::Object(object) => object.call(self, args, kwargs),
            other => Err(ScriptError::NotCallable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Look up attribute `name` on `receiver` and call it
    pub fn call_method(&self, receiver: &Value, name: &str, args: &[Value]) -> ScriptResult<Value> {
        let method = receiver.attr(name)?;
        self.call(&method, args, &[])
    }

    /// Bind a global
    pub fn set_global(&self, name: impl Into<String>, value: Value) {
        self.inner.globals.borrow_mut().insert(name.into(), value);
    }

    /// Read a global
    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.globals.borrow().get(name).cloned()
    }

    /// Publish a module under its own name
    pub fn install(&self, module: Module) -> Value {
        let name = module.name().to_string();
        let value = Value::object(module);
        self.set_global(name, value.clone());
        value
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Builtin, Function};

    #[test]
    fn test_call_function() {
        let ctx = Context::new();
        let double = Value::from(Function::new("double", &["x"], |_, args| {
            Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))
        }));
        assert_eq!(ctx.call(&double, &[Value::Int(21)], &[]).unwrap(), Value::Int(42));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_not_callable() {
        let ctx = Context::new();
        let err = ctx.call(&Value::Int(1), &[], &[]).unwrap_err();
        assert!(matches!(err, ScriptError::NotCallable { .. }));
    }

    #[test]
    fn test_depth_limit() {
        let ctx = Context::with_options(ContextOptions::default().with_call_depth_limit(3));
        let recurse = Value::from(Builtin::new("recurse", |ctx, _, _| {
            let me = ctx.global("recurse").unwrap_or_default();
            ctx.call(&me, &[], &[])
        }));
        ctx.set_global("recurse", recurse.clone());
        let err = ctx.call(&recurse, &[], &[]).unwrap_err();
        assert!(matches!(err, ScriptError::CallDepthExceeded { limit: 3 }));
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = Context::new();
        let other = ctx.clone();
        other.set_global("x", Value::Int(1));
        assert_eq!(ctx.global("x"), Some(Value::Int(1)));
        assert!(ctx.same(&other));
        assert!(!ctx.same(&Context::new()));
    }
}
