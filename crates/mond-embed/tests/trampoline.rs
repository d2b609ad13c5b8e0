//! End-to-end properties of the closure trampoline: outcome dispatch,
//! continuations, protected calls, yields, and chained suspension.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use mond_core::{Status, Value};
use mond_embed::{install, protected_call, push_closure, HostClosure, Outcome};
use mond_vm::{ResumeStatus, Vm};

fn bridge_vm() -> Vm {
    let mut vm = Vm::new();
    install(&mut vm);
    vm
}

#[test]
fn plain_return_never_runs_the_continuation() {
    let mut vm = bridge_vm();
    let cont_runs = Rc::new(Cell::new(0));
    let c = cont_runs.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            |vm| {
                let x = vm.value(1).as_integer().unwrap();
                vm.push(Value::Integer(x + 1));
                Outcome::Return(1)
            },
            move |_vm, _status, _ctx| {
                c.set(c.get() + 1);
                Outcome::Return(0)
            },
        ),
    );
    vm.push(Value::Integer(5));
    protected_call(&mut vm, 1, 1).unwrap();
    assert_eq!(vm.pop(), Value::Integer(6));
    assert_eq!(vm.top(), 0);
    assert_eq!(cont_runs.get(), 0);
}

#[test]
fn error_outcome_surfaces_as_caught_raise() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            vm.push(Value::str("boom"));
            Outcome::Error
        }),
    );
    let err = protected_call(&mut vm, 0, 0).unwrap_err();
    assert_eq!(err.value(), Some(&Value::str("boom")));
    assert_eq!(vm.top(), 0);
}

#[test]
fn synchronous_call_fires_continuation_once_with_ok() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            let a = vm.value(1).as_integer().unwrap();
            let b = vm.value(2).as_integer().unwrap();
            vm.push(Value::Integer(a + b));
            Outcome::Return(1)
        }),
    );
    let adder = vm.pop();

    let log = Rc::new(RefCell::new(Vec::new()));
    let l = log.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            move |vm| {
                vm.push(adder.clone());
                vm.push(Value::Integer(2));
                vm.push(Value::Integer(3));
                Outcome::Call {
                    nargs: 2,
                    nresults: 1,
                }
            },
            move |vm, status, ctx| {
                l.borrow_mut().push((status, vm.value((ctx + 1) as i32)));
                // the declared result count sits on top of the stack
                assert_eq!(vm.value(-1), vm.value((ctx + 1) as i32));
                vm.push_value((ctx + 1) as i32);
                Outcome::Return(1)
            },
        ),
    );
    protected_call(&mut vm, 0, 1).unwrap();
    assert_eq!(vm.pop(), Value::Integer(5));
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0], (Status::Ok, Value::Integer(5)));
}

#[test]
fn protected_call_delivers_error_raised_and_can_swallow() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            vm.push(Value::str("inner failure"));
            Outcome::Error
        }),
    );
    let failing = vm.pop();

    let statuses = Rc::new(RefCell::new(Vec::new()));
    let s = statuses.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            move |vm| {
                vm.push(failing.clone());
                Outcome::ProtectedCall {
                    nargs: 0,
                    nresults: 1,
                    has_handler: false,
                }
            },
            move |vm, status, _ctx| {
                s.borrow_mut().push(status);
                // swallow: hand the error text back as an ordinary result
                vm.push_value(-1);
                Outcome::Return(1)
            },
        ),
    );
    protected_call(&mut vm, 0, 1).unwrap();
    assert_eq!(vm.pop(), Value::str("inner failure"));
    assert_eq!(&*statuses.borrow(), &[Status::ErrorRaised]);
}

#[test]
fn protected_call_continuation_can_escalate() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            vm.push(Value::str("root cause"));
            Outcome::Error
        }),
    );
    let failing = vm.pop();

    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            move |vm| {
                vm.push(failing.clone());
                Outcome::ProtectedCall {
                    nargs: 0,
                    nresults: 0,
                    has_handler: false,
                }
            },
            |vm, status, _ctx| {
                assert_eq!(status, Status::ErrorRaised);
                vm.push(Value::str("escalated"));
                Outcome::Error
            },
        ),
    );
    let err = protected_call(&mut vm, 0, 0).unwrap_err();
    assert_eq!(err.value(), Some(&Value::str("escalated")));
}

#[test]
fn protected_call_handler_filters_the_error() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            vm.push(Value::str("raw"));
            Outcome::Error
        }),
    );
    let failing = vm.pop();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            let msg = vm.value(1).display();
            vm.push(Value::from(format!("<{}>", msg)));
            Outcome::Return(1)
        }),
    );
    let handler = vm.pop();

    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            move |vm| {
                vm.push(handler.clone());
                vm.push(failing.clone());
                Outcome::ProtectedCall {
                    nargs: 0,
                    nresults: 0,
                    has_handler: true,
                }
            },
            |vm, status, _ctx| {
                assert_eq!(status, Status::ErrorRaised);
                vm.push_value(-1);
                Outcome::Return(1)
            },
        ),
    );
    protected_call(&mut vm, 0, 1).unwrap();
    assert_eq!(vm.pop(), Value::str("<raw>"));
}

#[test]
fn yield_then_resume_runs_continuation_with_resume_args() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            |vm| {
                vm.push(Value::Integer(10));
                vm.push(Value::Integer(20));
                Outcome::Yield {
                    nresults: 2,
                    has_continuation: true,
                }
            },
            |vm, status, ctx| {
                assert_eq!(status, Status::Yielded);
                vm.push_value((ctx + 1) as i32);
                Outcome::Return(1)
            },
        ),
    );
    let body = vm.pop();
    let co = vm.create_coroutine(body).unwrap();

    let r = mond_embed::resume(&mut vm, co, 0);
    assert_eq!(r.status, ResumeStatus::Yielded);
    assert_eq!(r.nresults, 2);
    assert_eq!(vm.pop(), Value::Integer(20));
    assert_eq!(vm.pop(), Value::Integer(10));

    vm.push(Value::Integer(7));
    let r = mond_embed::resume(&mut vm, co, 1);
    assert_eq!(r.status, ResumeStatus::Ok);
    assert_eq!(r.nresults, 1);
    assert_eq!(vm.pop(), Value::Integer(7));
}

#[test]
fn continuation_less_yield_finishes_with_resume_args() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|vm| {
            vm.push(Value::Integer(1));
            Outcome::Yield {
                nresults: 1,
                has_continuation: false,
            }
        }),
    );
    let body = vm.pop();
    let co = vm.create_coroutine(body).unwrap();

    let r = mond_embed::resume(&mut vm, co, 0);
    assert_eq!(r.status, ResumeStatus::Yielded);
    assert_eq!(r.nresults, 1);
    vm.pop_n(1);

    vm.push(Value::Integer(8));
    vm.push(Value::Integer(9));
    let r = mond_embed::resume(&mut vm, co, 2);
    assert_eq!(r.status, ResumeStatus::Ok);
    assert_eq!(r.nresults, 2);
    assert_eq!(vm.pop(), Value::Integer(9));
    assert_eq!(vm.pop(), Value::Integer(8));
}

#[test]
fn chained_suspension_counts_one_continuation_per_resume() {
    let mut vm = bridge_vm();
    let cont_runs = Rc::new(Cell::new(0u32));
    let c = cont_runs.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            |vm| {
                vm.push(Value::Integer(0));
                Outcome::Yield {
                    nresults: 1,
                    has_continuation: true,
                }
            },
            move |vm, status, _ctx| {
                assert_eq!(status, Status::Yielded);
                c.set(c.get() + 1);
                if c.get() < 4 {
                    vm.push(Value::Integer(c.get() as i64));
                    Outcome::Yield {
                        nresults: 1,
                        has_continuation: true,
                    }
                } else {
                    vm.push(Value::str("done"));
                    Outcome::Return(1)
                }
            },
        ),
    );
    let body = vm.pop();
    let co = vm.create_coroutine(body).unwrap();

    let mut yields = 0;
    loop {
        let r = mond_embed::resume(&mut vm, co, 0);
        vm.pop_n(r.nresults);
        match r.status {
            ResumeStatus::Yielded => yields += 1,
            ResumeStatus::Ok => break,
            ResumeStatus::Error => panic!("unexpected error"),
        }
    }
    // 4 suspensions total, each answered by exactly one continuation run
    assert_eq!(yields, 4);
    assert_eq!(cont_runs.get(), 4);
}

#[test]
fn call_target_that_yields_completes_with_ok_later() {
    let mut vm = bridge_vm();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            |vm| {
                vm.push(Value::str("pause"));
                Outcome::Yield {
                    nresults: 1,
                    has_continuation: true,
                }
            },
            move |vm, status, _ctx| {
                assert_eq!(status, Status::Yielded);
                o.borrow_mut().push("inner-cont");
                vm.push(Value::str("inner-done"));
                Outcome::Return(1)
            },
        ),
    );
    let inner = vm.pop();

    let o = order.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            move |vm| {
                vm.push(inner.clone());
                Outcome::Call {
                    nargs: 0,
                    nresults: 1,
                }
            },
            move |vm, status, ctx| {
                assert_eq!(status, Status::Ok);
                o.borrow_mut().push("outer-cont");
                assert_eq!(vm.value((ctx + 1) as i32), Value::str("inner-done"));
                vm.push_value((ctx + 1) as i32);
                Outcome::Return(1)
            },
        ),
    );
    let outer = vm.pop();
    let co = vm.create_coroutine(outer).unwrap();

    let r = mond_embed::resume(&mut vm, co, 0);
    assert_eq!(r.status, ResumeStatus::Yielded);
    assert_eq!(vm.pop(), Value::str("pause"));

    let r = mond_embed::resume(&mut vm, co, 0);
    assert_eq!(r.status, ResumeStatus::Ok);
    assert_eq!(r.nresults, 1);
    assert_eq!(vm.pop(), Value::str("inner-done"));
    assert_eq!(&*order.borrow(), &["inner-cont", "outer-cont"]);
}

#[test]
fn yield_on_the_main_thread_raises() {
    let mut vm = bridge_vm();
    push_closure(
        &mut vm,
        HostClosure::new(|_vm| Outcome::Yield {
            nresults: 0,
            has_continuation: false,
        }),
    );
    let err = protected_call(&mut vm, 0, 0).unwrap_err();
    assert!(err
        .to_string()
        .contains("attempt to yield from outside a coroutine"));
}

#[test]
fn yield_across_plain_call_boundary_raises() {
    use mond_vm::{Control, Invoke};

    fn plain_caller(vm: &mut Vm, _invoke: Invoke) -> Result<i32, Control> {
        vm.push_value(1);
        vm.call(0, 0)?;
        Ok(0)
    }

    let mut vm = bridge_vm();
    let slot = vm.registry_mut().register("test.plain_caller", plain_caller);
    let caller = vm.make_native(slot, Vec::new());

    push_closure(
        &mut vm,
        HostClosure::new(|_vm| Outcome::Yield {
            nresults: 0,
            has_continuation: false,
        }),
    );
    let yielder = vm.pop();

    let co = vm.create_coroutine(caller).unwrap();
    vm.push(yielder);
    let r = mond_embed::resume(&mut vm, co, 1);
    assert_eq!(r.status, ResumeStatus::Error);
    assert!(vm
        .pop()
        .display()
        .contains("attempt to yield across a native call boundary"));
}

#[test]
fn protected_call_inside_coroutine_survives_post_resume_error() {
    let mut vm = bridge_vm();

    // inner yields, then escalates after resume
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            |vm| {
                vm.push(Value::str("first"));
                Outcome::Yield {
                    nresults: 1,
                    has_continuation: true,
                }
            },
            |vm, _status, _ctx| {
                vm.push(Value::str("late failure"));
                Outcome::Error
            },
        ),
    );
    let inner = vm.pop();

    let statuses = Rc::new(RefCell::new(Vec::new()));
    let s = statuses.clone();
    push_closure(
        &mut vm,
        HostClosure::with_continuation(
            move |vm| {
                vm.push(inner.clone());
                Outcome::ProtectedCall {
                    nargs: 0,
                    nresults: 0,
                    has_handler: false,
                }
            },
            move |vm, status, _ctx| {
                s.borrow_mut().push(status);
                vm.push_value(-1);
                Outcome::Return(1)
            },
        ),
    );
    let outer = vm.pop();
    let co = vm.create_coroutine(outer).unwrap();

    let r = mond_embed::resume(&mut vm, co, 0);
    assert_eq!(r.status, ResumeStatus::Yielded);
    assert_eq!(vm.pop(), Value::str("first"));

    // the raise after resume lands in the outer continuation, not the host
    let r = mond_embed::resume(&mut vm, co, 0);
    assert_eq!(r.status, ResumeStatus::Ok);
    assert_eq!(r.nresults, 1);
    assert_eq!(vm.pop(), Value::str("late failure"));
    assert_eq!(&*statuses.borrow(), &[Status::ErrorRaised]);
}
