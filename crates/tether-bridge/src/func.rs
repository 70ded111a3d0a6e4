//! Native callables

use std::fmt;
use std::rc::Rc;

use tether_core::{ScriptError, ScriptResult};

use crate::native::NativeValue;
use crate::shape::FuncSig;

/// Body of a native callable. Receives one value per declared parameter;
/// for a variadic signature the last one is the collected tail.
pub type FuncBody = dyn Fn(Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>>;

/// Native callable with a signature
#[derive(Clone)]
pub struct FuncValue {
    name: Rc<str>,
    sig: Rc<FuncSig>,
    body: Option<Rc<FuncBody>>,
}

impl FuncValue {
    /// Create a callable
    pub fn new(
        name: &str,
        sig: FuncSig,
        body: impl Fn(Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>> + 'static,
    ) -> Self {
        Self::with_sig(name, Rc::new(sig), body)
    }

    /// Create a callable sharing an existing signature
    pub fn with_sig(
        name: &str,
        sig: Rc<FuncSig>,
        body: impl Fn(Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            sig,
            body: Some(Rc::new(body)),
        }
    }

    /// Nil callable
    pub fn nil(sig: Rc<FuncSig>) -> Self {
        Self {
            name: "nil".into(),
            sig,
            body: None,
        }
    }

    /// Callable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signature
    pub fn sig(&self) -> &Rc<FuncSig> {
        &self.sig
    }

    /// Whether this is the nil callable
    pub fn is_nil(&self) -> bool {
        self.body.is_none()
    }

    /// Whether both handles share a body
    pub fn same(&self, other: &FuncValue) -> bool {
        matches!((&self.body, &other.body), (Some(a), Some(b)) if Rc::ptr_eq(a, b))
    }

    /// Invoke with exactly one argument per declared parameter
    pub fn call(&self, args: Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| ScriptError::Host("call of nil function".to_string()))?;
        if args.len() != self.sig.params().len() {
            return Err(ScriptError::ArgumentCount {
                name: self.name.to_string(),
                expected: self.sig.params().len().to_string(),
                got: args.len(),
            });
        }
        body(args)
    }

    /// Invoke with the variadic tail passed as trailing arguments
    pub fn call_spread(&self, mut args: Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>> {
        if let Some(rest) = self.sig.rest() {
            let fixed = self.sig.fixed_arity();
            if args.len() < fixed {
                return Err(ScriptError::ArgumentCount {
                    name: self.name.to_string(),
                    expected: self.sig.arity_text(),
                    got: args.len(),
                });
            }
            let tail = args.split_off(fixed);
            args.push(NativeValue::seq(rest, tail));
        }
        self.call(args)
    }
}

impl fmt::Debug for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {} {}>", self.name, self.sig)
    }
}
