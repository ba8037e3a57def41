use sentra_asm::op;
use sentra_vm::prelude::*;

#[test]
fn call_passes_arguments_and_returns() {
    let add1 = ProtoBuilder::new("add1")
        .arity(1)
        .ops([op::addi(0, 0, 1), op::ret(0, 2, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k41 = main.constant(Constant::Int(41));
    let p = main.proto(add1);
    let main = main
        .ops([
            op::closure(0, p),
            op::loadk(1, k41),
            op::call(0, 2, 2),
            op::ret(0, 2, 0),
        ])
        .build();

    let v = Interpreter::new().run(main).unwrap();
    assert_eq!(v.as_int(), 42);
}

#[test]
fn wrong_argument_count_is_an_arity_error() {
    let two = ProtoBuilder::new("two")
        .arity(2)
        .ops([op::ret(0, 2, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k = main.constant(Constant::Int(1));
    let p = main.proto(two);
    let main = main
        .ops([op::closure(0, p), op::loadk(1, k), op::call(0, 2, 1), op::ret(0, 1, 0)])
        .build();

    match Interpreter::new().run(main) {
        Err(VmError::Uncaught { kind, .. }) => assert_eq!(kind, ErrorKind::Arity),
        other => panic!("expected ArityError, got {other:?}"),
    }
}

#[test]
fn variadic_callees_pack_surplus_arguments() {
    // R0 = fixed param, R1 = rest array; returns len(rest).
    let var = ProtoBuilder::new("var")
        .arity(1)
        .variadic()
        .ops([op::arrlen(2, 1, 0), op::ret(2, 2, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k = main.constant(Constant::Int(9));
    let p = main.proto(var);
    let main = main
        .ops([
            op::closure(0, p),
            op::loadk(1, k),
            op::loadk(2, k),
            op::loadk(3, k),
            op::loadk(4, k),
            op::call(0, 5, 2),
            op::ret(0, 2, 0),
        ])
        .build();

    let v = Interpreter::new().run(main).unwrap();
    assert_eq!(v.as_int(), 3);
}

/// Two closures over one captured counter share storage after the defining
/// frame returns; increments through one are visible through the other.
#[test]
fn closures_share_closed_upvalues() {
    // inc: counter += 1; return counter.
    let inc = ProtoBuilder::new("inc")
        .upval(0, true)
        .ops([
            op::getupval(0, 0, 0),
            op::addi(0, 0, 1),
            op::setupval(0, 0, 0),
            op::ret(0, 2, 0),
        ])
        .build();

    // mk: local counter = 0; return [inc, inc] capturing it.
    let mut mk = ProtoBuilder::new("mk");
    let k0 = mk.constant(Constant::Int(0));
    let p = mk.proto(inc);
    let mk = mk
        .ops([
            op::loadk(0, k0),
            op::closure(1, p),
            op::closure(2, p),
            op::mov(4, 1, 0),
            op::mov(5, 2, 0),
            op::newarray(3, 2, 0),
            op::ret(3, 2, 0),
        ])
        .build();

    let mut main = ProtoBuilder::new("main");
    let p = main.proto(mk);
    let main = main
        .ops([
            op::closure(0, p),
            op::call(0, 1, 2),
            op::getarri(1, 0, 0),
            op::getarri(2, 0, 1),
            op::mov(3, 1, 0),
            op::call(3, 1, 2),
            op::mov(4, 1, 0),
            op::call(4, 1, 2),
            op::mov(5, 2, 0),
            op::call(5, 1, 2),
            op::ret(5, 2, 0),
        ])
        .build();

    // inc, inc through the first closure, then once through the second:
    // the third call observes both prior increments.
    let v = Interpreter::new().run(main).unwrap();
    assert_eq!(v.as_int(), 3);
}

#[test]
fn tail_calls_run_in_constant_stack() {
    let mut vm = Interpreter::new();
    let loop_id = vm.intern_global("loop");

    let mut looper = ProtoBuilder::new("loop");
    let k0 = looper.constant(Constant::Int(0));
    let looper = looper
        .arity(1)
        .ops([
            op::nejk(0, k0 as u8, 1),
            op::ret(0, 2, 0),
            op::getglobal(1, loop_id),
            op::subi(2, 0, 1),
            op::tailcall(1, 2, 0),
        ])
        .build();

    let mut main = ProtoBuilder::new("main");
    let kn = main.constant(Constant::Int(100_000));
    let p = main.proto(looper);
    let main = main
        .ops([
            op::closure(0, p),
            op::setglobal(0, loop_id),
            op::getglobal(1, loop_id),
            op::loadk(2, kn),
            op::call(1, 2, 2),
            op::ret(1, 2, 0),
        ])
        .build();

    // Well past MAX_CALL_FRAMES; only tail-call frame reuse makes this pass.
    let v = vm.run(main).unwrap();
    assert_eq!(v.as_int(), 0);
}

#[test]
fn deep_recursion_overflows_recoverably() {
    let mut vm = Interpreter::new();
    let rec_id = vm.intern_global("rec");

    let rec = ProtoBuilder::new("rec")
        .arity(1)
        .ops([
            op::getglobal(1, rec_id),
            op::mov(2, 0, 0),
            op::call(1, 2, 2),
            op::ret(1, 2, 0),
        ])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k0 = main.constant(Constant::Int(0));
    let p = main.proto(rec);
    let main = main
        .ops([
            op::closure(0, p),
            op::setglobal(0, rec_id),
            // try { rec(0) } catch e { return e }
            op::try_op(0, 4),
            op::getglobal(1, rec_id),
            op::loadk(2, k0),
            op::call(1, 2, 2),
            op::ret(1, 2, 0),
            op::geterror(3, 0, 0),
            op::ret(3, 2, 0),
        ])
        .build();

    let v = vm.run(main).unwrap();
    let kind = match vm.heap().get(v.as_obj()) {
        Object::Error(e) => e.kind,
        other => panic!("expected an error object, got {:?}", other.kind()),
    };
    assert_eq!(kind, ErrorKind::StackOverflow);
}

#[test]
fn chunks_execute_after_a_round_trip() {
    let add1 = ProtoBuilder::new("main.0")
        .arity(1)
        .ops([op::addi(0, 0, 1), op::ret(0, 2, 0)])
        .build();

    let mut main = ProtoBuilder::new("main");
    let k = main.constant(Constant::Int(41));
    let p = main.proto(add1);
    let main = main
        .ops([
            op::closure(0, p),
            op::loadk(1, k),
            op::call(0, 2, 2),
            op::ret(0, 2, 0),
        ])
        .build();

    let bytes = encode_chunk(&main);
    let v = Interpreter::new().run_chunk(&bytes).unwrap();
    assert_eq!(v.as_int(), 42);
}
