//! Addressable storage and pointers
//!
//! A [`Place`] is a location that holds a native value: either a shared cell
//! or a field of a struct stored in another place. Pointers are handles to
//! places; loads copy the value out, stores write it back.

use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rustc_hash::FxHasher;
use tether_core::{ScriptError, ScriptResult};

use crate::host::StructType;
use crate::native::NativeValue;
use crate::shape::Shape;

/// Storage location of a native value
#[derive(Clone)]
pub enum Place {
    /// Shared cell
    Cell(Rc<RefCell<NativeValue>>),
    /// Field `index` of the struct held in `base`
    Field {
        /// Place holding the struct
        base: Rc<Place>,
        /// Field position in the struct type
        index: usize,
        /// Struct type of the base value
        ty: Rc<StructType>,
    },
}

fn busy() -> ScriptError {
    ScriptError::Host("value is already borrowed".to_string())
}

impl Place {
    /// Allocate a cell holding `value`
    pub fn new(value: NativeValue) -> Place {
        Place::Cell(Rc::new(RefCell::new(value)))
    }

    /// Projection onto field `index` of the struct held here
    pub fn field(&self, ty: Rc<StructType>, index: usize) -> Place {
        Place::Field {
            base: Rc::new(self.clone()),
            index,
            ty,
        }
    }

    /// Copy the value out
    pub fn load(&self) -> ScriptResult<NativeValue> {
        match self {
            Place::Cell(cell) => Ok(cell.try_borrow().map_err(|_| busy())?.clone()),
            Place::Field { base, index, ty } => match base.load()? {
                NativeValue::Struct(value) => ty.get_field(&value, *index),
                other => Err(ScriptError::Host(format!(
                    "field projection on non-struct value {other}"
                ))),
            },
        }
    }

    /// Overwrite the value
    pub fn store(&self, value: NativeValue) -> ScriptResult<()> {
        match self {
            Place::Cell(cell) => {
                *cell.try_borrow_mut().map_err(|_| busy())? = value;
                Ok(())
            }
            Place::Field { base, index, ty } => base.update(|target| match target {
                NativeValue::Struct(target) => ty.set_field(target, *index, value),
                other => Err(ScriptError::Host(format!(
                    "field projection on non-struct value {other}"
                ))),
            }),
        }
    }

    /// Read the value in place
    pub fn with<R>(&self, f: impl FnOnce(&NativeValue) -> R) -> ScriptResult<R> {
        match self {
            Place::Cell(cell) => Ok(f(&*cell.try_borrow().map_err(|_| busy())?)),
            Place::Field { .. } => Ok(f(&self.load()?)),
        }
    }

    /// Modify the value in place.
    ///
    /// The storage stays borrowed while `f` runs; `f` must not reenter
    /// script code that reaches the same place.
    pub fn update<R>(&self, f: impl FnOnce(&mut NativeValue) -> ScriptResult<R>) -> ScriptResult<R> {
        match self {
            Place::Cell(cell) => f(&mut *cell.try_borrow_mut().map_err(|_| busy())?),
            Place::Field { .. } => {
                let mut value = self.load()?;
                let result = f(&mut value)?;
                self.store(value)?;
                Ok(result)
            }
        }
    }

    /// Identity of the location
    pub fn address(&self) -> usize {
        match self {
            Place::Cell(cell) => Rc::as_ptr(cell) as usize,
            Place::Field { base, index, .. } => {
                let mut hasher = FxHasher::default();
                base.address().hash(&mut hasher);
                index.hash(&mut hasher);
                hasher.finish() as usize
            }
        }
    }

    /// Whether both places denote the same location
    pub fn same(&self, other: &Place) -> bool {
        match (self, other) {
            (Place::Cell(a), Place::Cell(b)) => Rc::ptr_eq(a, b),
            (
                Place::Field { base: a, index: i, .. },
                Place::Field { base: b, index: j, .. },
            ) => i == j && a.same(b),
            _ => false,
        }
    }
}

/// Pointer to a place holding a value of the element shape
#[derive(Clone)]
pub struct PtrValue {
    elem: Shape,
    place: Option<Place>,
}

impl PtrValue {
    /// Pointer to a fresh place holding `value`
    pub fn new(elem: Shape, value: NativeValue) -> Self {
        Self {
            elem,
            place: Some(Place::new(value)),
        }
    }

    /// Pointer to an existing place
    pub fn to_place(elem: Shape, place: Place) -> Self {
        Self {
            elem,
            place: Some(place),
        }
    }

    /// Nil pointer
    pub fn nil(elem: Shape) -> Self {
        Self { elem, place: None }
    }

    /// Pointee shape
    pub fn elem(&self) -> &Shape {
        &self.elem
    }

    /// Whether this is the nil pointer
    pub fn is_nil(&self) -> bool {
        self.place.is_none()
    }

    /// Target place
    pub fn place(&self) -> Option<&Place> {
        self.place.as_ref()
    }

    fn target(&self) -> ScriptResult<&Place> {
        self.place
            .as_ref()
            .ok_or_else(|| ScriptError::Host("nil pointer dereference".to_string()))
    }

    /// Copy the pointee out
    pub fn load(&self) -> ScriptResult<NativeValue> {
        self.target()?.load()
    }

    /// Overwrite the pointee
    pub fn store(&self, value: NativeValue) -> ScriptResult<()> {
        self.target()?.store(value)
    }

    /// Modify the pointee in place
    pub fn update<R>(&self, f: impl FnOnce(&mut NativeValue) -> ScriptResult<R>) -> ScriptResult<R> {
        self.target()?.update(f)
    }

    /// Whether both pointers target the same place (nil pointers are equal)
    pub fn same(&self, other: &PtrValue) -> bool {
        match (&self.place, &other.place) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}
