use sentra_asm::op;
use sentra_vm::prelude::*;

/// Fiber yielding 1, 2 then returning 3.
fn gen_proto() -> std::sync::Arc<FunctionProto> {
    let mut gen = ProtoBuilder::new("gen");
    let k1 = gen.constant(Constant::Int(1));
    let k2 = gen.constant(Constant::Int(2));
    let k3 = gen.constant(Constant::Int(3));
    gen.ops([
        op::loadk(0, k1),
        op::yield_op(0, 0, 0),
        op::loadk(0, k2),
        op::yield_op(0, 0, 0),
        op::loadk(0, k3),
        op::ret(0, 2, 0),
    ])
    .build()
}

#[test]
fn yields_and_final_return_arrive_in_program_order() {
    let mut main = ProtoBuilder::new("main");
    let p = main.proto(gen_proto());
    let main = main
        .ops([
            op::closure(0, p),
            op::fiber(1, 0, 0),
            op::resume(3, 1, 0),
            op::resume(4, 1, 0),
            op::resume(5, 1, 0),
            op::newarray(2, 3, 0),
            op::ret(2, 2, 0),
        ])
        .build();

    let mut vm = Interpreter::new();
    let v = vm.run(main).unwrap();
    let items = sentra_vm::native::as_vec(vm.heap(), v).unwrap();
    let observed: Vec<i64> = items.iter().map(|v| v.as_int()).collect();
    assert_eq!(observed, [1, 2, 3]);
}

#[test]
fn resuming_a_dead_fiber_is_a_fiber_error() {
    let mut main = ProtoBuilder::new("main");
    let p = main.proto(gen_proto());
    let main = main
        .ops([
            op::closure(0, p),
            op::fiber(1, 0, 0),
            op::resume(2, 1, 0),
            op::resume(2, 1, 0),
            op::resume(2, 1, 0),
            op::resume(2, 1, 0), // fourth: the fiber is Dead
            op::ret(2, 2, 0),
        ])
        .build();

    match Interpreter::new().run(main) {
        Err(VmError::Uncaught { kind, .. }) => assert_eq!(kind, ErrorKind::Fiber),
        other => panic!("expected FiberError, got {other:?}"),
    }
}

#[test]
fn resume_argument_becomes_the_yield_value() {
    // echo: yield 10, then return whatever the resumer passed back.
    let mut echo = ProtoBuilder::new("echo");
    let k10 = echo.constant(Constant::Int(10));
    let echo = echo
        .ops([op::loadk(0, k10), op::yield_op(0, 0, 0), op::ret(0, 2, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k99 = main.constant(Constant::Int(99));
    let p = main.proto(echo);
    let main = main
        .ops([
            op::closure(0, p),
            op::fiber(1, 0, 0),
            op::resume(2, 1, 0),  // 10
            op::loadk(2, k99),    // resume argument
            op::resume(3, 1, 1),  // passes R(B+1) = R2
            op::ret(3, 2, 0),
        ])
        .build();

    let v = Interpreter::new().run(main).unwrap();
    assert_eq!(v.as_int(), 99);
}

#[test]
fn new_fibers_start_with_arguments() {
    let mut double = ProtoBuilder::new("double");
    let double = double
        .arity(1)
        .ops([op::add(1, 0, 0), op::ret(1, 2, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k21 = main.constant(Constant::Int(21));
    let p = main.proto(double);
    let main = main
        .ops([
            op::closure(0, p),
            op::fiber(1, 0, 0),
            op::loadk(2, k21),
            op::resume(3, 1, 1),
            op::ret(3, 2, 0),
        ])
        .build();

    let v = Interpreter::new().run(main).unwrap();
    assert_eq!(v.as_int(), 42);
}

#[test]
fn yield_outside_a_fiber_is_a_fiber_error() {
    let proto = ProtoBuilder::new("main")
        .ops([op::yield_op(0, 0, 0), op::ret(0, 1, 0)])
        .build();

    match Interpreter::new().run(proto) {
        Err(VmError::Uncaught { kind, .. }) => assert_eq!(kind, ErrorKind::Fiber),
        other => panic!("expected FiberError, got {other:?}"),
    }
}

#[test]
fn fiber_death_surfaces_the_error_to_the_resumer() {
    // The fiber throws without a handler; RESUME evaluates to the error.
    let mut bad = ProtoBuilder::new("bad");
    let k = bad.constant(Constant::Str("inner failure".into()));
    let bad = bad
        .ops([op::loadk(0, k), op::throw(0, 0, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let p = main.proto(bad);
    let main = main
        .ops([
            op::closure(0, p),
            op::fiber(1, 0, 0),
            op::resume(2, 1, 0),
            op::ret(2, 2, 0),
        ])
        .build();

    let mut vm = Interpreter::new();
    let v = vm.run(main).unwrap();
    assert_eq!(v.to_text(vm.heap()), "inner failure");
}

#[test]
fn cancellation_is_thrown_at_the_next_resumption() {
    // gen: try { yield 1; return 2 } catch e { return e }
    let mut gen = ProtoBuilder::new("gen");
    let k1 = gen.constant(Constant::Int(1));
    let k2 = gen.constant(Constant::Int(2));
    let gen = gen
        .ops([
            op::try_op(0, 4),
            op::loadk(0, k1),
            op::yield_op(0, 0, 0),
            op::loadk(0, k2),
            op::ret(0, 2, 0),
            op::geterror(1, 0, 0),
            op::ret(1, 2, 0),
        ])
        .build();

    let mut vm = Interpreter::new();
    let throw_into = vm.intern_global("throw_into");

    let mut main = ProtoBuilder::new("main");
    let kstop = main.constant(Constant::Str("stop".into()));
    let p = main.proto(gen);
    let main = main
        .ops([
            op::closure(0, p),
            op::fiber(1, 0, 0),
            op::resume(2, 1, 0), // 1
            op::getglobal(3, throw_into),
            op::mov(4, 1, 0),
            op::loadk(5, kstop),
            op::call(3, 3, 1),
            op::resume(6, 1, 0), // delivers the pending throw; gen catches
            op::ret(6, 2, 0),
        ])
        .build();

    let v = vm.run(main).unwrap();
    assert_eq!(v.to_text(vm.heap()), "stop");
}

#[test]
fn fibers_nest() {
    // inner yields 5; outer resumes it and returns the value + 1.
    let mut inner = ProtoBuilder::new("inner");
    let k5 = inner.constant(Constant::Int(5));
    let inner = inner
        .ops([op::loadk(0, k5), op::yield_op(0, 0, 0), op::ret(0, 1, 0)])
        .build();

    let mut outer = ProtoBuilder::new("outer");
    let p_inner = outer.proto(inner);
    let outer = outer
        .ops([
            op::closure(0, p_inner),
            op::fiber(1, 0, 0),
            op::resume(2, 1, 0),
            op::addi(2, 2, 1),
            op::ret(2, 2, 0),
        ])
        .build();

    let mut main = ProtoBuilder::new("main");
    let p_outer = main.proto(outer);
    let main = main
        .ops([
            op::closure(0, p_outer),
            op::fiber(1, 0, 0),
            op::resume(2, 1, 0),
            op::ret(2, 2, 0),
        ])
        .build();

    let v = Interpreter::new().run(main).unwrap();
    assert_eq!(v.as_int(), 6);
}
