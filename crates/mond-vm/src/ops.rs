//! Raw value operations backing the one-shot natives.
//!
//! These can raise (non-table index targets, invalid keys, bad operand
//! types), so host code reaches them only through registered natives under
//! a protected call, never directly.

use std::rc::Rc;

use mond_core::{ArithOp, CompareOp, Key, Value};

use crate::control::Control;
use crate::vm::Vm;

fn floor_div(x: i64, y: i64) -> i64 {
    let q = x.wrapping_div(y);
    if x % y != 0 && (x < 0) != (y < 0) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(x: i64, y: i64) -> i64 {
    let r = x % y;
    if r != 0 && (r < 0) != (y < 0) {
        r + y
    } else {
        r
    }
}

impl Vm {
    /// `t[k]`: pops the key, pushes the value. Raw access; an invalid key
    /// reads as `Nil`, indexing a non-table raises.
    pub fn table_get(&mut self, idx: i32) -> Result<(), Control> {
        let t = self.value(idx);
        let key = self.pop();
        match t {
            Value::Table(t) => {
                let v = match Key::from_value(&key) {
                    Ok(k) => t.borrow().get(&k),
                    Err(_) => Value::Nil,
                };
                self.push(v);
                Ok(())
            }
            v => Err(self.type_error("index", v.type_name())),
        }
    }

    /// `t[k] = v`: pops the value, then the key. Invalid keys raise.
    pub fn table_set(&mut self, idx: i32) -> Result<(), Control> {
        let t = self.value(idx);
        let value = self.pop();
        let key = self.pop();
        match t {
            Value::Table(t) => {
                let k = match Key::from_value(&key) {
                    Ok(k) => k,
                    Err(e) => return Err(self.raise_msg(e.message())),
                };
                t.borrow_mut().set(k, value);
                Ok(())
            }
            v => Err(self.type_error("index", v.type_name())),
        }
    }

    /// Push `t[i]` for an integer index; raises on a non-indexable target.
    pub fn get_index(&mut self, idx: i32, i: i64) -> Result<(), Control> {
        match self.value(idx) {
            Value::Table(t) => {
                let v = t.borrow().get(&Key::Int(i));
                self.push(v);
                Ok(())
            }
            v => Err(self.type_error("index", v.type_name())),
        }
    }

    /// Advance a table traversal: pops the previous key (`Nil` starts),
    /// pushes the next key/value pair and returns true, or pushes nothing
    /// and returns false once the table is exhausted.
    pub fn table_next(&mut self, idx: i32) -> Result<bool, Control> {
        let t = self.value(idx);
        let prev = self.pop();
        let Value::Table(t) = t else {
            return Err(self.type_error("iterate", t.type_name()));
        };
        let after = match &prev {
            Value::Nil => None,
            v => match Key::from_value(v) {
                Ok(k) => Some(k),
                Err(e) => return Err(self.raise_msg(e.message())),
            },
        };
        let next = t.borrow().next(after.as_ref());
        match next {
            Ok(Some((k, v))) => {
                self.push(k);
                self.push(v);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(()) => Err(self.raise_msg("invalid key to table traversal")),
        }
    }

    /// Apply an arithmetic operator to the top operand(s), replacing them
    /// with the result.
    pub fn arith(&mut self, op: ArithOp) -> Result<(), Control> {
        let result = if op.arity() == 1 {
            let a = self.pop();
            self.arith_unary(op, a)?
        } else {
            let b = self.pop();
            let a = self.pop();
            self.arith_binary(op, a, b)?
        };
        self.push(result);
        Ok(())
    }

    fn arith_unary(&self, op: ArithOp, a: Value) -> Result<Value, Control> {
        match (op, &a) {
            (ArithOp::Unm, Value::Integer(i)) => Ok(Value::Integer(i.wrapping_neg())),
            (ArithOp::Unm, Value::Number(n)) => Ok(Value::Number(-n)),
            _ => Err(self.type_error("perform arithmetic on", a.type_name())),
        }
    }

    fn arith_binary(&self, op: ArithOp, a: Value, b: Value) -> Result<Value, Control> {
        use ArithOp::*;
        if let (Value::Integer(x), Value::Integer(y)) = (&a, &b) {
            let (x, y) = (*x, *y);
            return match op {
                Add => Ok(Value::Integer(x.wrapping_add(y))),
                Sub => Ok(Value::Integer(x.wrapping_sub(y))),
                Mul => Ok(Value::Integer(x.wrapping_mul(y))),
                Div => Ok(Value::Number(x as f64 / y as f64)),
                IDiv if y == 0 => Err(self.raise_msg("attempt to perform integer division by zero")),
                IDiv => Ok(Value::Integer(floor_div(x, y))),
                Mod if y == 0 => Err(self.raise_msg("attempt to perform 'n%0'")),
                Mod => Ok(Value::Integer(floor_mod(x, y))),
                Unm => unreachable!(),
            };
        }
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => match op {
                Add => Ok(Value::Number(x + y)),
                Sub => Ok(Value::Number(x - y)),
                Mul => Ok(Value::Number(x * y)),
                Div => Ok(Value::Number(x / y)),
                IDiv => Ok(Value::Number((x / y).floor())),
                Mod => Ok(Value::Number(x - (x / y).floor() * y)),
                Unm => unreachable!(),
            },
            _ => {
                let bad = if a.as_number().is_none() { a } else { b };
                Err(self.type_error("perform arithmetic on", bad.type_name()))
            }
        }
    }

    /// Compare the values at two indices. `Eq` never raises; ordering of
    /// incomparable types does.
    pub fn compare(&mut self, op: CompareOp, a_idx: i32, b_idx: i32) -> Result<bool, Control> {
        let a = self.value(a_idx);
        let b = self.value(b_idx);
        match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Lt | CompareOp::Le => {
                let le = op == CompareOp::Le;
                if let (Value::Str(x), Value::Str(y)) = (&a, &b) {
                    return Ok(if le { x <= y } else { x < y });
                }
                match (a.as_number(), b.as_number()) {
                    (Some(x), Some(y)) => Ok(if le { x <= y } else { x < y }),
                    _ => Err(Control::Raise(Value::from(format!(
                        "attempt to compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    )))),
                }
            }
        }
    }

    /// Canonical display text of the value at `idx`.
    pub fn display_string(&self, idx: i32) -> String {
        self.value(idx).display()
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    pub fn set_global(&mut self, name: &str, v: Value) {
        self.globals().borrow_mut().set(Key::Str(Rc::from(name)), v);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals().borrow().get(&Key::Str(Rc::from(name)))
    }
}
