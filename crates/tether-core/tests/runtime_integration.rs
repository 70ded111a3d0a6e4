//! Integration tests for the script runtime surface
//!
//! Tests cover:
//! - Container sharing and identity
//! - Reentrant calls through cloned context handles
//! - Modules published into a context

use std::cell::Cell;
use std::rc::Rc;

use tether_core::{Builtin, Context, ContextOptions, Dict, Function, Module, ScriptError, Value};

// ============================================================================
// Containers
// ============================================================================

#[test]
fn test_list_mutation_is_shared() {
    let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
    let alias = list.clone();
    alias.set_index(0, Value::from("one")).unwrap();
    assert_eq!(list.index(0).unwrap(), Value::from("one"));
    assert_eq!(list.identity(), alias.identity());
}

#[test]
fn test_dict_self_reference_renders() {
    let dict = Value::dict(Dict::new());
    dict.set_key(Value::from("self"), dict.clone()).unwrap();
    assert_eq!(dict.to_string(), "{\"self\": {...}}");

    let inner = dict.get(&Value::from("self")).unwrap().unwrap();
    assert_eq!(inner.identity(), dict.identity());
}

#[test]
fn test_iterate_dict_yields_keys() {
    let dict = Value::dict(
        Dict::from_pairs([
            (Value::from("a"), Value::Int(1)),
            (Value::from("b"), Value::Int(2)),
        ])
        .unwrap(),
    );
    let keys: Vec<Value> = dict.iterate().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(keys, vec![Value::from("a"), Value::from("b")]);
}

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_nested_reentrant_calls() {
    let ctx = Context::new();
    let deepest = Rc::new(Cell::new(0));

    let seen = deepest.clone();
    let countdown = Value::from(Builtin::new("countdown", move |ctx, args, _| {
        seen.set(seen.get().max(ctx.depth()));
        let n = args[0].as_int().unwrap_or(0);
        if n == 0 {
            return Ok(Value::from("done"));
        }
        let me = ctx.global("countdown").unwrap_or_default();
        ctx.call(&me, &[Value::Int(n - 1)], &[])
    }));
    ctx.set_global("countdown", countdown.clone());

    let result = ctx.call(&countdown, &[Value::Int(5)], &[]).unwrap();
    assert_eq!(result, Value::from("done"));
    assert_eq!(deepest.get(), 6);
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn test_depth_released_after_error() {
    let ctx = Context::with_options(ContextOptions::default().with_call_depth_limit(2));
    let fail = Value::from(Function::lambda(&[], |_, _| Err("boom".into())));
    assert!(matches!(
        ctx.call(&fail, &[], &[]),
        Err(ScriptError::Host(_))
    ));
    assert_eq!(ctx.depth(), 0);
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_call_module_member() {
    let ctx = Context::new();
    let upper = Value::from(Builtin::new("upper", |_, args, _| {
        let text = args.first().and_then(Value::as_str).unwrap_or_default();
        Ok(Value::from(text.to_uppercase()))
    }));
    let strings = ctx.install(Module::new("strings", [("upper".to_string(), upper)]));

    let result = ctx
        .call_method(&strings, "upper", &[Value::from("tether")])
        .unwrap();
    assert_eq!(result, Value::from("TETHER"));

    let err = ctx.call_method(&strings, "lower", &[]).unwrap_err();
    assert!(matches!(err, ScriptError::UnsupportedOperation { .. }));
}
