//! Integration tests for the native bridge
//!
//! Tests cover:
//! - Primitive round trips and struct decoding
//! - Cycle-safe decoding of self-referential containers
//! - Native methods taking script callables
//! - Variadic native functions
//! - Adapter field access, write-through and capability errors
//! - Plain conversion of dynamic host collections
//! - Abort propagation, reentrancy and the call depth cap

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{go_module, greet_module, new_greet, text, Greet, Team};
use tether_bridge::{
    decode, encode, Adapter, FromNative, FuncSig, FuncValue, NamedShape, NativeType, NativeValue,
    Shape, ToNative,
};
use tether_core::{Builtin, Context, ContextOptions, Dict, Function, ScriptError, Value};

fn lambda(body: impl Fn(&Context, &[Value]) -> Result<Value, ScriptError> + 'static) -> Value {
    Value::from(Function::lambda(&["a"], body))
}

// ============================================================================
// Conversion
// ============================================================================

#[test]
fn test_primitive_round_trip() {
    let ctx = Context::new();
    for (value, shape) in [
        (Value::Bool(false), Shape::Bool),
        (Value::Int(i128::from(i64::MIN)), Shape::I64),
        (Value::Int(i128::from(u64::MAX)), Shape::U64),
        (Value::Float(-0.5), Shape::F32),
        (Value::from("héllo"), Shape::String),
        (Value::bytes(b"\x00raw".to_vec()), Shape::Bytes),
    ] {
        let native = decode(&ctx, &value, &shape).unwrap();
        assert_eq!(encode(&ctx, &native), value, "round trip through {shape}");
    }
}

#[test]
fn test_struct_decode() {
    let ctx = Context::new();
    let dict = Value::dict(Dict::from_pairs([(Value::from("Name"), Value::from("tom"))]).unwrap());

    let native = decode(&ctx, &dict, &Greet::shape()).unwrap();
    assert_eq!(Greet::from_native(native).unwrap(), Greet { name: "tom".into() });

    let ptr = decode(&ctx, &dict, &Shape::ptr(Greet::shape())).unwrap();
    let NativeValue::Ptr(ptr) = ptr else {
        panic!("expected pointer");
    };
    assert_eq!(Greet::from_native(ptr.load().unwrap()).unwrap().name, "tom");
}

#[test]
fn test_struct_decode_unknown_field() {
    let ctx = Context::new();
    let dict = Value::dict(Dict::from_pairs([(Value::from("Missing"), Value::Int(1))]).unwrap());
    let err = decode(&ctx, &dict, &Greet::shape()).unwrap_err();
    assert!(matches!(
        err,
        ScriptError::UnknownField { ref field, ref type_name } if field == "Missing" && type_name == "Greet"
    ));
}

#[test]
fn test_self_containing_dict() {
    let ctx = Context::new();
    let dict = Value::dict(Dict::new());
    dict.set_key(Value::from("self"), dict.clone()).unwrap();

    let tree = NamedShape::declare("Tree");
    tree.define(Shape::map(Shape::String, Shape::Named(tree.clone()))).unwrap();

    let NativeValue::Map(map) = decode(&ctx, &dict, &Shape::Named(tree)).unwrap() else {
        panic!("expected map");
    };
    let inner = map.get(&NativeValue::String("self".into())).unwrap();
    match inner {
        Some(NativeValue::Map(inner)) => assert!(inner.same(&map)),
        other => panic!("expected nested map, got {other:?}"),
    }
}

#[test]
fn test_adapter_unwraps_on_decode() {
    let ctx = Context::new();
    let greet = encode(&ctx, &new_greet("ann"));
    let native = decode(&ctx, &greet, &Shape::ptr(Greet::shape())).unwrap();
    let NativeValue::Ptr(ptr) = native else {
        panic!("expected pointer");
    };
    assert_eq!(Greet::from_native(ptr.load().unwrap()).unwrap().name, "ann");

    let err = decode(&ctx, &greet, &Shape::String).unwrap_err();
    assert!(matches!(err, ScriptError::Conversion { .. }));
}

// ============================================================================
// Callables
// ============================================================================

#[test]
fn test_greet_module() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));

    let g = ctx.call_method(&greet, "new", &[]).unwrap();
    assert_eq!(ctx.call_method(&g, "Hello", &[]).unwrap(), Value::from("hello: <>"));

    let tom = ctx.call_method(&greet, "newWithName", &[Value::from("tom")]).unwrap();
    assert_eq!(ctx.call_method(&tom, "Hello", &[]).unwrap(), Value::from("hello: <tom>"));
    assert_eq!(
        ctx.call_method(&tom, "HelloTo", &[Value::from("sam")]).unwrap(),
        Value::from("hello: <sam>")
    );

    let default = greet.attr("default").unwrap();
    assert_eq!(default.type_name(), "ptr<Greet>");
    assert!(ctx.global("greet").is_some());
}

#[test]
fn test_rename_with_constant_lambda() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "new", &[]).unwrap();

    let renamed = ctx
        .call_method(&g, "RenameWithFunc", &[lambda(|_, _| Ok(Value::from("tom")))])
        .unwrap();
    assert_eq!(ctx.call_method(&renamed, "Hello", &[]).unwrap(), Value::from("hello: <tom>"));
}

#[test]
fn test_rename_with_appending_lambda() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "new", &[]).unwrap();

    let append = lambda(|_, args| Ok(Value::from(format!("{}tom", text(&args[0])))));
    let renamed = ctx.call_method(&g, "RenameWithFunc", &[append]).unwrap();
    assert_eq!(ctx.call_method(&renamed, "Hello", &[]).unwrap(), Value::from("hello: <tom>"));
    // the method mutated the receiver in place
    assert_eq!(g.attr("Name").unwrap(), Value::from("tom"));
}

#[test]
fn test_copy_from_pointer_argument() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let a = ctx.call_method(&greet, "new", &[]).unwrap();
    let b = ctx.call_method(&greet, "newWithName", &[Value::from("bo")]).unwrap();

    let copied = ctx.call_method(&a, "CopyFrom", &[b]).unwrap();
    assert_eq!(ctx.call_method(&copied, "Hello", &[]).unwrap(), Value::from("hello: <bo>"));

    let err = ctx.call_method(&a, "CopyFrom", &[Value::Int(1)]).unwrap_err();
    assert!(matches!(err, ScriptError::Conversion { .. }));
}

#[test]
fn test_variadic_call() {
    let ctx = Context::new();
    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    let run = FuncValue::new(
        "run",
        FuncSig::variadic(vec![], Shape::String, vec![Shape::I64]),
        move |args| {
            let all = Vec::<String>::from_native(args[0].clone())?;
            let count = all.len() as i64;
            sink.borrow_mut().extend(all);
            Ok(vec![count.to_native()])
        },
    );
    let run = encode(&ctx, &NativeValue::Func(run));

    let args = [Value::from("ls"), Value::from("-l"), Value::from("/tmp")];
    assert_eq!(ctx.call(&run, &args, &[]).unwrap(), Value::Int(3));
    assert_eq!(*received.borrow(), vec!["ls", "-l", "/tmp"]);

    assert_eq!(ctx.call(&run, &[], &[]).unwrap(), Value::Int(0));
    let err = ctx.call(&run, &[Value::Int(1)], &[]).unwrap_err();
    assert!(matches!(err, ScriptError::Conversion { .. }));
}

#[test]
fn test_multiple_results_become_tuple() {
    let ctx = Context::new();
    let split = FuncValue::new(
        "split",
        FuncSig::new(vec![Shape::String], vec![Shape::String, Shape::String]),
        |args| {
            let s = String::from_native(args[0].clone())?;
            let (head, tail) = s.split_once(' ').unwrap_or((s.as_str(), ""));
            Ok(vec![head.to_string().to_native(), tail.to_string().to_native()])
        },
    );
    let split = encode(&ctx, &NativeValue::Func(split));
    let result = ctx.call(&split, &[Value::from("a b c")], &[]).unwrap();
    assert_eq!(result, Value::tuple(vec![Value::from("a"), Value::from("b c")]));
}

#[test]
fn test_arity_errors() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "new", &[]).unwrap();
    let hello_to = g.attr("HelloTo").unwrap();

    let err = ctx.call(&hello_to, &[], &[]).unwrap_err();
    assert!(matches!(err, ScriptError::ArgumentCount { ref name, got: 0, .. } if name == "Greet.HelloTo"));

    let kwargs = [("a".to_string(), Value::from("x"))];
    let err = ctx.call(&hello_to, &[], &kwargs).unwrap_err();
    assert!(matches!(err, ScriptError::Argument(_)));
}

// ============================================================================
// Adapter capabilities
// ============================================================================

#[test]
fn test_field_write_through() {
    let ctx = Context::new();
    let g = encode(&ctx, &new_greet("ann"));
    g.set_attr("Name", Value::from("bob")).unwrap();
    assert_eq!(g.attr("Name").unwrap(), Value::from("bob"));
    assert_eq!(ctx.call_method(&g, "Hello", &[]).unwrap(), Value::from("hello: <bob>"));

    assert!(matches!(
        g.set_attr("Age", Value::Int(3)),
        Err(ScriptError::UnknownField { .. })
    ));
    assert!(matches!(
        g.set_attr("Name", Value::Int(3)),
        Err(ScriptError::Conversion { .. })
    ));
    assert!(matches!(
        g.attr("Age"),
        Err(ScriptError::UnsupportedOperation { .. })
    ));
}

#[test]
fn test_struct_held_by_value() {
    let ctx = Context::new();
    let g = encode(&ctx, &Greet { name: "v".into() }.to_native());
    assert_eq!(g.type_name(), "Greet");
    g.set_attr("Name", Value::from("w")).unwrap();
    assert_eq!(ctx.call_method(&g, "Hello", &[]).unwrap(), Value::from("hello: <w>"));
    assert_eq!(g.to_string(), "Greet{Name: \"w\"}");
}

#[test]
fn test_struct_field_by_reference() {
    let ctx = Context::new();
    let team = Team {
        lead: Greet { name: "kim".into() },
        size: 4,
    };
    let value = encode(&ctx, &NativeValue::ptr_to(team.to_native()));

    let lead = value.attr("Lead").unwrap();
    assert_eq!(lead.type_name(), "ptr<Greet>");
    lead.set_attr("Name", Value::from("lee")).unwrap();
    assert_eq!(ctx.call_method(&lead, "Hello", &[]).unwrap(), Value::from("hello: <lee>"));

    let adapter = value.downcast_ref::<Adapter>().unwrap();
    let NativeValue::Ptr(ptr) = adapter.native().unwrap() else {
        panic!("expected pointer");
    };
    let team = Team::from_native(ptr.load().unwrap()).unwrap();
    assert_eq!(team.lead.name, "lee");
    assert_eq!(value.attr("Size").unwrap(), Value::Int(4));
}

#[test]
fn test_attr_names() {
    let ctx = Context::new();
    let g = encode(&ctx, &new_greet(""));
    let Value::Object(object) = &g else {
        panic!("expected adapter");
    };
    assert_eq!(
        object.attr_names(),
        vec!["Name", "Hello", "HelloTo", "CopyFrom", "RenameWithFunc"]
    );
}

#[test]
fn test_map_adapter() {
    let ctx = Context::new();
    let go = ctx.install(go_module(&ctx));

    let m = ctx.call_method(&go, "new_m", &[]).unwrap();
    assert!(!m.truth());
    m.set_key(Value::from("a"), Value::Int(1)).unwrap();
    m.set_key(Value::from("b"), Value::list(vec![Value::Int(2)])).unwrap();
    assert!(m.truth());
    assert_eq!(m.len().unwrap(), 2);
    assert_eq!(m.get(&Value::from("a")).unwrap(), Some(Value::Int(1)));
    assert_eq!(m.get(&Value::from("z")).unwrap(), None);

    let keys: Vec<Value> = m.iterate().unwrap().collect::<Result<_, _>>().unwrap();
    assert_eq!(keys, vec![Value::from("a"), Value::from("b")]);

    let ptr = ctx.call_method(&go, "new_m_ptr", &[]).unwrap();
    ptr.set_key(Value::from("k"), Value::from("v")).unwrap();
    assert_eq!(ptr.len().unwrap(), 1);
    assert!(ptr.set_key(Value::Int(1), Value::None).is_err());
}

#[test]
fn test_sequence_adapter_rejects_mapping_ops() {
    let ctx = Context::new();
    let go = ctx.install(go_module(&ctx));
    let e = ctx.call_method(&go, "new_e", &[]).unwrap();

    assert!(!e.truth());
    assert_eq!(e.len().unwrap(), 0);
    assert!(matches!(
        e.get(&Value::from("a")),
        Err(ScriptError::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        e.set_key(Value::from("a"), Value::Int(1)),
        Err(ScriptError::UnsupportedOperation { .. })
    ));
    assert!(matches!(e.hash(), Err(ScriptError::Unhashable { .. })));
    assert!(matches!(
        encode(&ctx, &new_greet("")).hash(),
        Err(ScriptError::Unhashable { .. })
    ));
}

#[test]
fn test_truthiness() {
    let ctx = Context::new();
    let empty = encode(&ctx, &NativeValue::seq(Shape::I64, vec![]));
    let full = encode(&ctx, &NativeValue::seq(Shape::I64, vec![NativeValue::I64(0)]));
    let empty_ptr = encode(&ctx, &NativeValue::ptr_to(NativeValue::seq(Shape::I64, vec![])));
    assert!(!empty.truth());
    assert!(full.truth());
    assert!(!empty_ptr.truth());
    assert!(encode(&ctx, &new_greet("")).truth());
}

#[test]
fn test_plain_conversion_of_dynamic_collections() {
    let ctx = Context::new();
    let go = ctx.install(go_module(&ctx));

    let m = ctx.call_method(&go, "new_m", &[]).unwrap();
    m.set_key(Value::from("n"), Value::Int(1)).unwrap();
    m.set_key(Value::from("l"), Value::list(vec![Value::Int(2), Value::from("x")]))
        .unwrap();
    let inner = Dict::from_pairs([(Value::from("k"), Value::Bool(true))]).unwrap();
    m.set_key(Value::from("d"), Value::dict(inner)).unwrap();

    let plain = ctx.call_method(&go, "to_script", &[m]).unwrap();
    assert_eq!(plain.type_name(), "dict");
    assert_eq!(plain.get(&Value::from("n")).unwrap(), Some(Value::Int(1)));
    assert_eq!(
        plain.get(&Value::from("l")).unwrap(),
        Some(Value::list(vec![Value::Int(2), Value::from("x")]))
    );
    let d = plain.get(&Value::from("d")).unwrap().unwrap();
    assert_eq!(d.type_name(), "dict");
    assert_eq!(d.get(&Value::from("k")).unwrap(), Some(Value::Bool(true)));

    let e = ctx.call_method(&go, "new_e_ptr", &[]).unwrap();
    assert!(!e.truth());
    assert_eq!(ctx.call_method(&go, "to_script", &[e]).unwrap(), Value::list(vec![]));
    let m_ptr = ctx.call_method(&go, "new_m_ptr", &[]).unwrap();
    assert_eq!(ctx.call_method(&go, "to_script", &[m_ptr]).unwrap().type_name(), "dict");

    // structs have no plain form
    let g = encode(&ctx, &new_greet("bob"));
    assert!(ctx.call_method(&go, "to_script", &[g]).unwrap().is_none());
}

#[test]
fn test_module_rejected_as_callback() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "new", &[]).unwrap();

    let err = ctx.call_method(&g, "RenameWithFunc", &[greet.clone()]).unwrap_err();
    assert!(matches!(err, ScriptError::Conversion { .. }), "{err}");
    assert_eq!(g.attr("Name").unwrap(), Value::from(""));
}

// ============================================================================
// Aborts and reentrancy
// ============================================================================

#[test]
fn test_bad_callback_result_aborts() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "new", &[]).unwrap();

    let err = ctx
        .call_method(&g, "RenameWithFunc", &[lambda(|_, _| Ok(Value::Int(1)))])
        .unwrap_err();
    assert!(err.is_abort());
    match err {
        ScriptError::Aborted { callee, source } => {
            assert_eq!(callee, "lambda");
            assert!(matches!(*source, ScriptError::Conversion { .. }));
        }
        other => panic!("expected abort, got {other}"),
    }
    // receiver untouched
    assert_eq!(g.attr("Name").unwrap(), Value::from(""));
}

#[test]
fn test_failing_callback_aborts() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "new", &[]).unwrap();
    let fail = Value::from(Builtin::new("fail", |_, _, _| {
        Err(ScriptError::Host("boom".to_string()))
    }));

    let err = ctx.call_method(&g, "RenameWithFunc", &[fail]).unwrap_err();
    assert!(matches!(
        err,
        ScriptError::Aborted { ref callee, ref source } if callee == "fail" && matches!(**source, ScriptError::Host(_))
    ));
}

#[test]
fn test_reentrant_callback() {
    let ctx = Context::new();
    let greet = ctx.install(greet_module(&ctx));
    let g = ctx.call_method(&greet, "newWithName", &[Value::from("x")]).unwrap();

    let receiver = g.clone();
    let reenter = lambda(move |ctx, _| ctx.call_method(&receiver, "Hello", &[]));
    ctx.call_method(&g, "RenameWithFunc", &[reenter]).unwrap();
    assert_eq!(g.attr("Name").unwrap(), Value::from("hello: <x>"));
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn test_call_depth_cap() {
    let ctx = Context::with_options(ContextOptions::default().with_call_depth_limit(8));
    let apply = FuncValue::new(
        "apply",
        FuncSig::new(
            vec![
                Shape::func(FuncSig::new(vec![Shape::String], vec![Shape::String])),
                Shape::String,
            ],
            vec![Shape::String],
        ),
        |args| {
            let f = FuncValue::from_native(args[0].clone())?;
            f.call(vec![args[1].clone()])
        },
    );
    ctx.set_global("apply", encode(&ctx, &NativeValue::Func(apply)));
    let again = lambda(|ctx, args| {
        let apply = ctx.global("apply").unwrap_or_default();
        let again = ctx.global("again").unwrap_or_default();
        ctx.call(&apply, &[again, args[0].clone()], &[])
    });
    ctx.set_global("again", again.clone());

    let apply = ctx.global("apply").unwrap();
    let err = ctx.call(&apply, &[again, Value::from("go")], &[]).unwrap_err();
    match err {
        ScriptError::Aborted { source, .. } => {
            assert!(matches!(*source, ScriptError::CallDepthExceeded { limit: 8 }));
        }
        other => panic!("expected abort, got {other}"),
    }
    assert_eq!(ctx.depth(), 0);
}
