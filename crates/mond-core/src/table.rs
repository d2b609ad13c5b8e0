//! Tables: an array part for a dense integer prefix plus a hash part.

use std::rc::Rc;

use hashbrown::HashMap;

use crate::value::Value;

/// A normalized table key. Integral floats collapse onto integers so that
/// `t[2]` and `t[2.0]` address the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
    Bool(bool),
    /// Non-integral finite float, stored by bit pattern.
    Num(u64),
}

/// Why a value cannot be used as a table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    Nil,
    NaN,
    Unsupported(&'static str),
}

impl KeyError {
    pub fn message(self) -> &'static str {
        match self {
            KeyError::Nil => "table index is nil",
            KeyError::NaN => "table index is NaN",
            KeyError::Unsupported(_) => "unsupported table key type",
        }
    }
}

impl Key {
    pub fn from_value(v: &Value) -> Result<Key, KeyError> {
        match v {
            Value::Nil => Err(KeyError::Nil),
            Value::Boolean(b) => Ok(Key::Bool(*b)),
            Value::Integer(i) => Ok(Key::Int(*i)),
            Value::Number(n) if n.is_nan() => Err(KeyError::NaN),
            Value::Number(n) if n.trunc() == *n && n.is_finite() => Ok(Key::Int(*n as i64)),
            Value::Number(n) => Ok(Key::Num(n.to_bits())),
            Value::Str(s) => Ok(Key::Str(s.clone())),
            v => Err(KeyError::Unsupported(v.type_name())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(i) => Value::Integer(*i),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Bool(b) => Value::Boolean(*b),
            Key::Num(bits) => Value::Number(f64::from_bits(*bits)),
        }
    }
}

#[derive(Debug, Default)]
pub struct Table {
    array: Vec<Value>,
    hash: HashMap<Key, Value>,
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    /// Length of the dense integer prefix.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    pub fn get(&self, key: &Key) -> Value {
        if let Key::Int(i) = key {
            if *i >= 1 && (*i as usize) <= self.array.len() {
                return self.array[*i as usize - 1].clone();
            }
        }
        self.hash.get(key).cloned().unwrap_or(Value::Nil)
    }

    pub fn set(&mut self, key: Key, value: Value) {
        if let Key::Int(i) = key {
            let i = i;
            if i >= 1 && (i as usize) <= self.array.len() {
                let idx = i as usize - 1;
                if value.is_nil() && idx == self.array.len() - 1 {
                    self.array.pop();
                    // shrink past any trailing nils left in the middle earlier
                    while matches!(self.array.last(), Some(Value::Nil)) {
                        self.array.pop();
                    }
                } else {
                    self.array[idx] = value;
                }
                return;
            }
            if i >= 1 && i as usize == self.array.len() + 1 {
                if !value.is_nil() {
                    self.array.push(value);
                    // absorb any keys that now extend the prefix
                    loop {
                        let next = Key::Int(self.array.len() as i64 + 1);
                        match self.hash.remove(&next) {
                            Some(v) => self.array.push(v),
                            None => break,
                        }
                    }
                }
                return;
            }
        }
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            self.hash.insert(key, value);
        }
    }

    /// Deterministic traversal: the array part in index order, then the
    /// hash part. `after` of `None` starts from the beginning. Returns
    /// `Err(())` when `after` names a key that is not present (the caller
    /// mutated the table mid-traversal).
    pub fn next(&self, after: Option<&Key>) -> Result<Option<(Value, Value)>, ()> {
        let first_hash = || {
            self.hash
                .iter()
                .next()
                .map(|(k, v)| (k.to_value(), v.clone()))
        };
        let after = match after {
            None => {
                return Ok(match self.array.first() {
                    Some(v) => Some((Value::Integer(1), v.clone())),
                    None => first_hash(),
                })
            }
            Some(k) => k,
        };
        if let Key::Int(i) = after {
            let i = *i;
            if i >= 1 && (i as usize) <= self.array.len() {
                let next = i as usize; // 0-based index of the following slot
                return Ok(match self.array.get(next) {
                    Some(v) => Some((Value::Integer(i + 1), v.clone())),
                    None => first_hash(),
                });
            }
        }
        let mut it = self.hash.iter();
        for (k, _) in it.by_ref() {
            if k == after {
                return Ok(it.next().map(|(k, v)| (k.to_value(), v.clone())));
            }
        }
        Err(())
    }
}
