//! Host fixtures shared by the integration tests

#![allow(dead_code)]

use std::rc::Rc;

use tether_bridge::{
    arg, encode, host_struct, to_script, FuncSig, FuncValue, NamedShape, NativeType, NativeValue,
    PtrValue, Receiver, Shape, StructType, ToNative,
};
use tether_core::{Context, Module, Value};

// ============================================================================
// Greet
// ============================================================================

#[derive(Clone, Default, Debug, PartialEq)]
pub struct Greet {
    pub name: String,
}

fn greet_type() -> Rc<StructType> {
    let greet = NamedShape::declare("Greet");
    let greet_ptr = Shape::ptr(Shape::Named(greet.clone()));
    let rename_fn = Shape::func(FuncSig::new(vec![Shape::String], vec![Shape::String]));

    let ty = StructType::builder::<Greet>("Greet")
        .field("Name", |g| &g.name, |g| &mut g.name)
        .method(
            "Hello",
            FuncSig::new(vec![], vec![Shape::String]),
            |recv: &Receiver<Greet>, _| {
                let name = recv.with(|g| g.name.clone())?;
                Ok(vec![format!("hello: <{name}>").to_native()])
            },
        )
        .method(
            "HelloTo",
            FuncSig::new(vec![Shape::String], vec![Shape::String]),
            |_: &Receiver<Greet>, args| {
                let to: String = arg(&args, 0)?;
                Ok(vec![format!("hello: <{to}>").to_native()])
            },
        )
        .method(
            "CopyFrom",
            FuncSig::new(vec![greet_ptr.clone()], vec![greet_ptr.clone()]),
            |recv: &Receiver<Greet>, args| {
                let other: PtrValue = arg(&args, 0)?;
                let source: Greet = tether_bridge::FromNative::from_native(other.load()?)?;
                recv.with_mut(|g| g.name = source.name)?;
                Ok(vec![recv.pointer()?])
            },
        )
        .method(
            "RenameWithFunc",
            FuncSig::new(vec![rename_fn], vec![greet_ptr]),
            |recv: &Receiver<Greet>, args| {
                let rename: FuncValue = arg(&args, 0)?;
                let name = recv.with(|g| g.name.clone())?;
                let renamed: String = arg(&rename.call(vec![name.to_native()])?, 0)?;
                recv.with_mut(|g| g.name = renamed)?;
                Ok(vec![recv.pointer()?])
            },
        )
        .build();

    greet
        .define(Shape::Struct(ty.clone()))
        .expect("Greet is defined once");
    ty
}

host_struct!(Greet, greet_type);

/// Pointer to a fresh `Greet` holding `name`
pub fn new_greet(name: &str) -> NativeValue {
    NativeValue::ptr_to(
        Greet {
            name: name.to_string(),
        }
        .to_native(),
    )
}

/// The `greet` module: `new()`, `newWithName(name)` and `default`
pub fn greet_module(ctx: &Context) -> Module {
    let greet_ptr = Shape::ptr(Greet::shape());
    let new = FuncValue::new("new", FuncSig::new(vec![], vec![greet_ptr.clone()]), |_| {
        Ok(vec![new_greet("")])
    });
    let new_with_name = FuncValue::new(
        "newWithName",
        FuncSig::new(vec![Shape::String], vec![greet_ptr]),
        |args| {
            let name: String = arg(&args, 0)?;
            Ok(vec![new_greet(&name)])
        },
    );
    Module::new(
        "greet",
        [
            ("new".to_string(), encode(ctx, &NativeValue::Func(new))),
            (
                "newWithName".to_string(),
                encode(ctx, &NativeValue::Func(new_with_name)),
            ),
            ("default".to_string(), encode(ctx, &new_greet(""))),
        ],
    )
}

// ============================================================================
// Team
// ============================================================================

/// Struct with a struct-valued field
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Team {
    pub lead: Greet,
    pub size: i64,
}

fn team_type() -> Rc<StructType> {
    StructType::builder::<Team>("Team")
        .field("Lead", |t| &t.lead, |t| &mut t.lead)
        .field("Size", |t| &t.size, |t| &mut t.size)
        .build()
}

host_struct!(Team, team_type);

// ============================================================================
// Plain collections
// ============================================================================

/// The `go` module: `new_m()` and `new_m_ptr()` return empty
/// `map<string, any>` values, `new_e()` an empty `list<map<string, any>>`
pub fn go_module(ctx: &Context) -> Module {
    let m = Shape::map(Shape::String, Shape::Any);
    let e = Shape::seq(m.clone());
    let new_m = {
        let m = m.clone();
        FuncValue::new("new_m", FuncSig::new(vec![], vec![m]), |_| {
            Ok(vec![NativeValue::Map(tether_bridge::MapValue::new(
                Shape::String,
                Shape::Any,
            ))])
        })
    };
    let new_m_ptr = FuncValue::new("new_m_ptr", FuncSig::new(vec![], vec![Shape::ptr(m.clone())]), |_| {
        Ok(vec![NativeValue::ptr_to(NativeValue::Map(
            tether_bridge::MapValue::new(Shape::String, Shape::Any),
        ))])
    });
    let new_e = {
        let m = m.clone();
        FuncValue::new("new_e", FuncSig::new(vec![], vec![e.clone()]), move |_| {
            Ok(vec![NativeValue::seq(m.clone(), vec![])])
        })
    };
    let new_e_ptr = FuncValue::new("new_e_ptr", FuncSig::new(vec![], vec![Shape::ptr(e)]), move |_| {
        Ok(vec![NativeValue::ptr_to(NativeValue::seq(m.clone(), vec![]))])
    });
    let plain = FuncValue::new(
        "to_script",
        FuncSig::new(vec![Shape::Any], vec![Shape::Value]),
        |args| Ok(vec![NativeValue::Script(to_script(&args[0])?)]),
    );
    Module::new(
        "go",
        [
            ("new_m".to_string(), encode(ctx, &NativeValue::Func(new_m))),
            ("new_m_ptr".to_string(), encode(ctx, &NativeValue::Func(new_m_ptr))),
            ("new_e".to_string(), encode(ctx, &NativeValue::Func(new_e))),
            ("new_e_ptr".to_string(), encode(ctx, &NativeValue::Func(new_e_ptr))),
            ("to_script".to_string(), encode(ctx, &NativeValue::Func(plain))),
        ],
    )
}

/// Script string payload, or an empty string
pub fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}
