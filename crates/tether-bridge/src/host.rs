//! Host struct registration
//!
//! Rust has no runtime reflection, so a host type exposes its fields and
//! methods by registering a [`StructType`]: a name table of field accessors
//! and method bodies, built once per type with [`StructType::builder`].
//!
//! ```ignore
//! #[derive(Clone, Default)]
//! struct Greet { name: String }
//!
//! fn greet_type() -> Rc<StructType> {
//!     StructType::builder::<Greet>("Greet")
//!         .field("Name", |g| &g.name, |g| &mut g.name)
//!         .method("Hello", FuncSig::new(vec![], vec![Shape::String]), |recv, _| {
//!             let name = recv.with(|g| g.name.clone())?;
//!             Ok(vec![NativeValue::String(format!("hello: <{name}>"))])
//!         })
//!         .build()
//! }
//!
//! host_struct!(Greet, greet_type);
//! ```

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_core::{ScriptError, ScriptResult};

use crate::convert::NativeType;
use crate::func::FuncValue;
use crate::native::{mismatch, NativeValue};
use crate::place::{Place, PtrValue};
use crate::shape::{FuncSig, Shape};

// ============================================================================
// Struct values
// ============================================================================

/// Type-erased host struct storage
pub trait HostData: Any {
    /// Copy into a new box
    fn clone_box(&self) -> Box<dyn HostData>;
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Borrow as mutable `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Clone> HostData for T {
    fn clone_box(&self) -> Box<dyn HostData> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A registered host struct held by value
pub struct StructValue {
    ty: Rc<StructType>,
    data: Box<dyn HostData>,
}

impl StructValue {
    /// Wrap `value` as an instance of `ty`
    pub fn new<T: Any + Clone>(ty: Rc<StructType>, value: T) -> Self {
        Self {
            ty,
            data: Box::new(value),
        }
    }

    /// Struct type
    pub fn ty(&self) -> &Rc<StructType> {
        &self.ty
    }

    /// Borrow the host value
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.as_any().downcast_ref::<T>()
    }

    /// Mutably borrow the host value
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.as_any_mut().downcast_mut::<T>()
    }
}

impl Clone for StructValue {
    fn clone(&self) -> Self {
        Self {
            ty: self.ty.clone(),
            data: self.data.clone_box(),
        }
    }
}

// ============================================================================
// Struct types
// ============================================================================

type FieldGetter = Box<dyn Fn(&dyn Any) -> Option<NativeValue>>;
type FieldSetter = Box<dyn Fn(&mut dyn Any, NativeValue) -> Option<ScriptResult<()>>>;
type MethodBody = Rc<dyn Fn(&Place, Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>>>;

/// Registered field
pub struct FieldDef {
    name: String,
    shape: Shape,
    get: FieldGetter,
    set: FieldSetter,
}

impl FieldDef {
    /// Exported field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field shape
    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

/// Registered method
pub struct MethodDef {
    name: String,
    sig: Rc<FuncSig>,
    body: MethodBody,
}

impl MethodDef {
    /// Exported method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method signature, without the receiver
    pub fn sig(&self) -> &Rc<FuncSig> {
        &self.sig
    }
}

/// Field and method tables of a host struct type
pub struct StructType {
    name: String,
    type_id: TypeId,
    fields: Vec<FieldDef>,
    field_index: FxHashMap<String, usize>,
    methods: Vec<MethodDef>,
    method_index: FxHashMap<String, usize>,
    zero: Box<dyn Fn() -> Box<dyn HostData>>,
}

impl StructType {
    /// Start registering host type `T` under `name`
    pub fn builder<T: Any + Clone + Default>(name: &str) -> StructTypeBuilder<T> {
        StructTypeBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type identity of instances
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Methods in declaration order
    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    /// Field position by exported name
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_index.get(name).copied()
    }

    /// Method by exported name
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.method_index.get(name).map(|&i| &self.methods[i])
    }

    /// Zero instance
    pub fn zero(self: &Rc<Self>) -> StructValue {
        StructValue {
            ty: self.clone(),
            data: (self.zero)(),
        }
    }

    fn field_def(&self, index: usize) -> ScriptResult<&FieldDef> {
        self.fields.get(index).ok_or_else(|| ScriptError::UnknownField {
            field: format!("#{index}"),
            type_name: self.name.clone(),
        })
    }

    fn foreign(&self, value: &StructValue) -> ScriptError {
        ScriptError::Host(format!(
            "{} value used as instance of {}",
            value.ty.name, self.name
        ))
    }

    /// Read field `index` of `value`
    pub fn get_field(&self, value: &StructValue, index: usize) -> ScriptResult<NativeValue> {
        let field = self.field_def(index)?;
        (field.get)(value.data.as_any()).ok_or_else(|| self.foreign(value))
    }

    /// Assign field `index` of `value`
    pub fn set_field(
        &self,
        value: &mut StructValue,
        index: usize,
        field_value: NativeValue,
    ) -> ScriptResult<()> {
        let field = self.field_def(index)?;
        match (field.set)(value.data.as_any_mut(), field_value) {
            Some(result) => result,
            None => Err(self.foreign(value)),
        }
    }

    /// Method `name` bound to the struct stored at `place`
    pub fn bind_method(&self, name: &str, place: &Place) -> Option<FuncValue> {
        let method = self.method(name)?;
        let body = method.body.clone();
        let place = place.clone();
        Some(FuncValue::with_sig(
            &format!("{}.{}", self.name, method.name),
            method.sig.clone(),
            move |args| body(&place, args),
        ))
    }
}

/// Builder for [`StructType`]
pub struct StructTypeBuilder<T> {
    name: String,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Clone + Default> StructTypeBuilder<T> {
    /// Field of a statically typed member
    pub fn field<F: NativeType + Clone + 'static>(
        self,
        name: &str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        self.field_raw(
            name,
            F::shape(),
            move |host| get(host).clone().to_native(),
            move |host, value| {
                *get_mut(host) = F::from_native(value)?;
                Ok(())
            },
        )
    }

    /// Field with an explicit shape and dynamic accessors
    pub fn field_raw(
        mut self,
        name: &str,
        shape: Shape,
        get: impl Fn(&T) -> NativeValue + 'static,
        set: impl Fn(&mut T, NativeValue) -> ScriptResult<()> + 'static,
    ) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            shape,
            get: Box::new(move |data: &dyn Any| data.downcast_ref::<T>().map(|host| get(host))),
            set: Box::new(move |data: &mut dyn Any, value| {
                data.downcast_mut::<T>().map(|host| set(host, value))
            }),
        });
        self
    }

    /// Method callable on any instance; the body reaches the instance
    /// through its [`Receiver`]
    pub fn method(
        mut self,
        name: &str,
        sig: FuncSig,
        body: impl Fn(&Receiver<T>, Vec<NativeValue>) -> ScriptResult<Vec<NativeValue>> + 'static,
    ) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig: Rc::new(sig),
            body: Rc::new(move |place: &Place, args| body(&Receiver::new(place.clone()), args)),
        });
        self
    }

    /// Finish registration
    pub fn build(self) -> Rc<StructType> {
        let field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.clone(), i))
            .collect();
        let method_index = self
            .methods
            .iter()
            .enumerate()
            .map(|(i, method)| (method.name.clone(), i))
            .collect();
        Rc::new(StructType {
            name: self.name,
            type_id: TypeId::of::<T>(),
            fields: self.fields,
            field_index,
            methods: self.methods,
            method_index,
            zero: Box::new(|| Box::new(T::default())),
        })
    }
}

// ============================================================================
// Method receivers
// ============================================================================

/// Handle to the instance a method was invoked on.
///
/// Access is scoped: each `with`/`with_mut` borrows the instance only for the
/// duration of the closure, so a method may call back into script code
/// between accesses.
pub struct Receiver<T> {
    place: Place,
    _marker: PhantomData<fn() -> T>,
}

fn not_an_instance() -> ScriptError {
    ScriptError::Host("method receiver does not hold the registered type".to_string())
}

impl<T: Any + Clone> Receiver<T> {
    fn new(place: Place) -> Self {
        Self {
            place,
            _marker: PhantomData,
        }
    }

    /// Read the instance
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> ScriptResult<R> {
        self.place
            .with(|value| match value {
                NativeValue::Struct(instance) => instance.downcast_ref::<T>().map(f),
                _ => None,
            })?
            .ok_or_else(not_an_instance)
    }

    /// Modify the instance
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> ScriptResult<R> {
        self.place.update(|value| match value {
            NativeValue::Struct(instance) => instance
                .downcast_mut::<T>()
                .map(f)
                .ok_or_else(not_an_instance),
            _ => Err(not_an_instance()),
        })
    }

    /// Copy of the instance
    pub fn get(&self) -> ScriptResult<T> {
        self.with(T::clone)
    }

    /// Place holding the instance
    pub fn place(&self) -> &Place {
        &self.place
    }

    /// Pointer to the instance, for methods returning their receiver
    pub fn pointer(&self) -> ScriptResult<NativeValue> {
        let shape = self.place.with(NativeValue::shape)?;
        Ok(NativeValue::Ptr(PtrValue::to_place(shape, self.place.clone())))
    }
}

// ============================================================================
// Typed host structs
// ============================================================================

/// A Rust type with a registered [`StructType`]
pub trait HostStruct: Any + Clone + Default {
    /// The registered type, built once per thread
    fn struct_type() -> Rc<StructType>;
}

#[doc(hidden)]
pub fn struct_from_native<T: HostStruct>(value: NativeValue) -> ScriptResult<T> {
    if let NativeValue::Struct(instance) = &value {
        if let Some(host) = instance.downcast_ref::<T>() {
            return Ok(host.clone());
        }
    }
    Err(mismatch(&value, &Shape::Struct(T::struct_type())))
}

/// Connect a host type to its registered [`StructType`].
///
/// `host_struct!(Greet, greet_type)` implements [`HostStruct`] with the
/// type built by `greet_type()` (cached per thread) and the conversion
/// traits, so `Greet` can be used as a field type, argument or result.
#[macro_export]
macro_rules! host_struct {
    ($ty:ty, $build:path) => {
        impl $crate::HostStruct for $ty {
            fn struct_type() -> ::std::rc::Rc<$crate::StructType> {
                ::std::thread_local! {
                    static STRUCT_TYPE: ::std::rc::Rc<$crate::StructType> = $build();
                }
                STRUCT_TYPE.with(::std::rc::Rc::clone)
            }
        }

        impl $crate::FromNative for $ty {
            fn from_native(value: $crate::NativeValue) -> $crate::ScriptResult<Self> {
                $crate::host::struct_from_native(value)
            }
        }

        impl $crate::ToNative for $ty {
            fn to_native(self) -> $crate::NativeValue {
                $crate::NativeValue::Struct($crate::StructValue::new(
                    <$ty as $crate::HostStruct>::struct_type(),
                    self,
                ))
            }
        }

        impl $crate::NativeType for $ty {
            fn shape() -> $crate::Shape {
                $crate::Shape::Struct(<$ty as $crate::HostStruct>::struct_type())
            }
        }
    };
}
