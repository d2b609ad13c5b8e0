//! Runtime value model.
//!
//! Values are single-threaded `Rc` data: one logical thread of control is
//! inside a VM at any moment, and nothing is shared across VM instances.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::table::Table;

/// Identity of a registered native capability.
///
/// Allocated once by the registry when the runtime is installed and stable
/// for the life of the VM; never reallocated or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSlot(pub u32);

/// Coroutine identity within one VM instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroId(pub u32);

/// A callable backed by a registered native slot, plus per-instance
/// upvalues (for example a host closure capsule).
pub struct NativeValue {
    pub slot: NativeSlot,
    pub name: Rc<str>,
    pub upvalues: Vec<Value>,
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeValue({}, slot {})", self.name, self.slot.0)
    }
}

/// Host-owned payload visible to the VM as an opaque value.
///
/// `uv` holds the user-value slots; how many a fresh userdata carries is
/// decided by the compatibility shim for the negotiated API revision.
pub struct Userdata {
    payload: Rc<dyn Any>,
    uv: RefCell<Vec<Value>>,
}

impl Userdata {
    pub fn new(payload: Rc<dyn Any>, uv_slots: usize) -> Self {
        Userdata {
            payload,
            uv: RefCell::new(vec![Value::Nil; uv_slots]),
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn uv_count(&self) -> usize {
        self.uv.borrow().len()
    }

    /// User value at 1-based `slot`; `Nil` when out of range.
    pub fn user_value(&self, slot: usize) -> Value {
        self.uv
            .borrow()
            .get(slot.wrapping_sub(1))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// Store into 1-based `slot`; returns false when out of range.
    pub fn set_user_value(&self, slot: usize, v: Value) -> bool {
        match self.uv.borrow_mut().get_mut(slot.wrapping_sub(1)) {
            Some(s) => {
                *s = v;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Userdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Userdata({} uv)", self.uv_count())
    }
}

/// A VM value.
#[derive(Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    Str(Rc<str>),
    Table(Rc<RefCell<Table>>),
    Native(Rc<NativeValue>),
    Coroutine(CoroId),
    Userdata(Rc<Userdata>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn table(t: Table) -> Value {
        Value::Table(Rc::new(RefCell::new(t)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Native(_) => "function",
            Value::Coroutine(_) => "coroutine",
            Value::Userdata(_) => "userdata",
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything but `nil` and `false` is truthy.
    #[inline]
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.trunc() == *n && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical display text, one line, never fails.
    pub fn display(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => {
                if n.is_finite() && n.trunc() == *n {
                    format!("{:.1}", n)
                } else {
                    format!("{}", n)
                }
            }
            Value::Str(s) => s.to_string(),
            Value::Table(t) => format!("table: {:p}", Rc::as_ptr(t)),
            Value::Native(n) => format!("function: {}", n.name),
            Value::Coroutine(id) => format!("coroutine: {}", id.0),
            Value::Userdata(u) => format!("userdata: {:p}", Rc::as_ptr(u)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Coroutine(a), Value::Coroutine(b)) => a == b,
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            v => f.write_str(&v.display()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Rc::from(s.as_str()))
    }
}
