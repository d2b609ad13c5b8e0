//! One-shot natives and their protected host wrappers.
//!
//! Each operation here can raise (bad index targets, invalid keys, bad
//! operand types), so the raw work happens in a registered native and the
//! host wrappers run it under a protected call.

use mond_core::{ArithOp, CompareOp, HostError, Key, Value};
use mond_vm::{Control, Invoke, Vm};

use crate::{names, protected_call, slot};

fn decode<T: TryFrom<u8>>(vm: &Vm, idx: i32, what: &str) -> Result<T, Control> {
    vm.value(idx)
        .as_integer()
        .and_then(|i| u8::try_from(i).ok())
        .and_then(|b| T::try_from(b).ok())
        .ok_or_else(|| vm.raise_msg(format!("invalid {} operator code", what)))
}

/// Frame: 1 = table, 2 = previous key. Pushes the next key/value pair, or
/// nil once the traversal is done.
pub(crate) fn next_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    vm.set_top(2);
    if vm.table_next(1)? {
        Ok(2)
    } else {
        vm.push(Value::Nil);
        Ok(1)
    }
}

/// Frame: 1 = table, 2 = key.
pub(crate) fn get_table_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    vm.set_top(2);
    vm.table_get(1)?;
    Ok(1)
}

/// Frame: 1 = table, 2 = key, 3 = value.
pub(crate) fn set_table_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    vm.set_top(3);
    vm.table_set(1)?;
    Ok(0)
}

/// Frame: 1 = value.
pub(crate) fn tostring_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    let s = vm.display_string(1);
    vm.push(Value::from(s));
    Ok(1)
}

/// Frame: 1 = module name, 2 = opener, 3 = install-as-global flag.
///
/// Loads the module once: a cached entry in the loaded-modules table wins
/// over the opener on every later registration.
pub(crate) fn require_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    let name = match vm.value(1) {
        Value::Str(s) => s,
        v => {
            return Err(vm.raise_msg(format!(
                "module name must be a string, got {}",
                v.type_name()
            )))
        }
    };
    let key = Key::Str(name.clone());
    let loaded = vm.loaded_modules();
    let cached = loaded.borrow().get(&key);
    let module = if cached.is_nil() {
        vm.push_value(2);
        vm.push_value(1);
        vm.call(1, 1)?; // opener(name); may raise
        let m = vm.pop();
        loaded.borrow_mut().set(key, m.clone());
        m
    } else {
        cached
    };
    if vm.value(3).truthy() {
        vm.set_global(&name, module);
    }
    Ok(0)
}

/// Frame: 1 = lhs, 2 = rhs, 3 = operator code. Pushes 1 or 0.
pub(crate) fn compare_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    let op: CompareOp = decode(vm, 3, "comparison")?;
    let r = vm.compare(op, 1, 2)?;
    vm.push(Value::Integer(r as i64));
    Ok(1)
}

/// Frame: operand(s) with the operator code on top.
pub(crate) fn arith_entry(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
    let op: ArithOp = decode(vm, -1, "arithmetic")?;
    vm.pop();
    vm.arith(op)?;
    Ok(1)
}

fn call_entry(vm: &mut Vm, name: &str, nargs: i32, nresults: i32) -> Result<(), HostError> {
    let entry = vm.make_native(slot(vm, name), Vec::new());
    vm.push(entry);
    vm.insert(-(nargs + 1));
    protected_call(vm, nargs, nresults)
}

/// `t[k]` with `[t, k]` on the stack; leaves the value.
pub fn get_table(vm: &mut Vm) -> Result<(), HostError> {
    call_entry(vm, names::GET_TABLE, 2, 1)
}

/// `t[k] = v` with `[t, k, v]` on the stack.
pub fn set_table(vm: &mut Vm) -> Result<(), HostError> {
    call_entry(vm, names::SET_TABLE, 3, 0)
}

/// Display text of the top value (consumed).
pub fn to_display_string(vm: &mut Vm) -> Result<String, HostError> {
    call_entry(vm, names::TOSTRING, 1, 1)?;
    let v = vm.pop();
    Ok(match v.as_str() {
        Some(s) => s.to_owned(),
        None => v.display(),
    })
}

/// Register a named built-in module. The opener runs at most once; later
/// registrations reuse the cached module. With `global` the module is also
/// stored under `name` in the globals table.
pub fn register_module(
    vm: &mut Vm,
    name: &str,
    opener: Value,
    global: bool,
) -> Result<(), HostError> {
    vm.push(Value::str(name));
    vm.push(opener);
    vm.push(global);
    call_entry(vm, names::REQUIRE, 3, 0)
}

/// Compare the two values on top of the stack (consumed).
pub fn compare_values(vm: &mut Vm, op: CompareOp) -> Result<bool, HostError> {
    vm.push(Value::Integer(u8::from(op) as i64));
    call_entry(vm, names::COMPARE, 3, 1)?;
    Ok(vm.pop().as_integer() == Some(1))
}

/// Apply an arithmetic operator to the operand(s) on top of the stack,
/// leaving the result.
pub fn apply_arith(vm: &mut Vm, op: ArithOp) -> Result<(), HostError> {
    vm.push(Value::Integer(u8::from(op) as i64));
    call_entry(vm, names::ARITH, op.arity() as i32 + 1, 1)
}
