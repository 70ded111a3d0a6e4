//! Exposes a host struct to script code and calls back into a script lambda.
//!
//! Run with `RUST_LOG=tether_bridge=trace` to watch values cross the bridge.

use std::rc::Rc;

use tether_bridge::{
    arg, encode, host_struct, FuncSig, FuncValue, NativeType, NativeValue, Receiver, Shape,
    StructType, ToNative,
};
use tether_core::{Context, ContextOptions, Function, Module, ScriptResult, Value};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Default)]
struct Greet {
    name: String,
}

fn greet_type() -> Rc<StructType> {
    let rename = Shape::func(FuncSig::new(vec![Shape::String], vec![Shape::String]));
    StructType::builder::<Greet>("Greet")
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
            "RenameWithFunc",
            FuncSig::new(vec![rename], vec![]),
            |recv: &Receiver<Greet>, args| {
                let rename: FuncValue = arg(&args, 0)?;
                let name = recv.with(|g| g.name.clone())?;
                let renamed: String = arg(&rename.call(vec![name.to_native()])?, 0)?;
                recv.with_mut(|g| g.name = renamed)?;
                Ok(vec![])
            },
        )
        .build()
}

host_struct!(Greet, greet_type);

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> ScriptResult<()> {
    install_tracing();

    let ctx = Context::with_options(ContextOptions::default().named("demo"));
    let new = FuncValue::new(
        "new",
        FuncSig::new(vec![Shape::String], vec![Shape::ptr(Greet::shape())]),
        |args| {
            let name: String = arg(&args, 0)?;
            Ok(vec![NativeValue::ptr_to(Greet { name }.to_native())])
        },
    );
    let greet = ctx.install(Module::new(
        "greet",
        [("new".to_string(), encode(&ctx, &NativeValue::Func(new)))],
    ));

    let g = ctx.call_method(&greet, "new", &[Value::from("world")])?;
    println!("{}", ctx.call_method(&g, "Hello", &[])?);

    let shout = Value::from(Function::lambda(&["a"], |_, args| {
        Ok(Value::from(args[0].as_str().unwrap_or_default().to_uppercase()))
    }));
    ctx.call_method(&g, "RenameWithFunc", &[shout])?;
    println!("{}", ctx.call_method(&g, "Hello", &[])?);
    println!("{g}");

    Ok(())
}
