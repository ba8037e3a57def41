use sentra_asm::op;
use sentra_vm::prelude::*;

#[test]
fn try_catches_a_thrown_string() {
    // try { throw "boom" } catch e { return e }
    let mut builder = ProtoBuilder::new("main");
    let k = builder.constant(Constant::Str("boom".into()));
    let proto = builder
        .ops([
            op::try_op(0, 2),
            op::loadk(0, k),
            op::throw(0, 0, 0),
            op::geterror(1, 0, 0),
            op::ret(1, 2, 0),
        ])
        .build();

    let mut vm = Interpreter::new();
    let v = vm.run(proto).unwrap();
    assert_eq!(v.to_text(vm.heap()), "boom");
    // GETERROR clears the slot.
    assert!(vm.last_error().is_nil());
}

#[test]
fn unwinding_crosses_call_frames_and_closes_upvalues() {
    let mut vm = Interpreter::new();
    let saved = vm.intern_global("saved");

    // reader: returns its captured upvalue.
    let reader = ProtoBuilder::new("reader")
        .upval(0, true)
        .ops([op::getupval(0, 0, 0), op::ret(0, 2, 0)])
        .build();

    // thrower: local = 7; saved = closure over local; throw "bad".
    let mut thrower = ProtoBuilder::new("thrower");
    let k7 = thrower.constant(Constant::Int(7));
    let kbad = thrower.constant(Constant::Str("bad".into()));
    let p_reader = thrower.proto(reader);
    let thrower = thrower
        .ops([
            op::loadk(0, k7),
            op::closure(1, p_reader),
            op::setglobal(1, saved),
            op::loadk(2, kbad),
            op::throw(2, 0, 0),
        ])
        .build();

    let mut main = ProtoBuilder::new("main");
    let p_thrower = main.proto(thrower);
    let main = main
        .ops([
            op::try_op(0, 3),
            op::closure(0, p_thrower),
            op::call(0, 1, 1),
            op::nop(0),
            // handler: the frame that owned the captured register is gone;
            // the closure must read the closed-over value.
            op::geterror(1, 0, 0),
            op::getglobal(2, saved),
            op::call(2, 1, 2),
            op::ret(2, 2, 0),
        ])
        .build();

    let v = vm.run(main).unwrap();
    assert_eq!(v.as_int(), 7);
    assert_eq!(vm.last_error().to_text(vm.heap()), "bad");
}

#[test]
fn uncaught_user_throw_reaches_the_embedder() {
    let mut builder = ProtoBuilder::new("main");
    let k = builder.constant(Constant::Str("bad".into()));
    let proto = builder
        .ops([op::loadk(0, k), op::throw(0, 0, 0)])
        .build();

    match Interpreter::new().run(proto) {
        Err(VmError::Uncaught { kind, message, .. }) => {
            assert_eq!(kind, ErrorKind::User);
            assert_eq!(message, "bad");
        }
        other => panic!("expected an uncaught error, got {other:?}"),
    }
}

#[test]
fn internal_errors_carry_kind_and_stack_trace() {
    // fail: 1 / 0, two frames deep.
    let mut fail = ProtoBuilder::new("fail");
    let k1 = fail.constant(Constant::Int(1));
    let k0 = fail.constant(Constant::Int(0));
    let fail = fail
        .ops([
            op::loadk(0, k1),
            op::loadk(1, k0),
            op::div(2, 0, 1),
            op::ret(2, 2, 0),
        ])
        .build();

    let mut main = ProtoBuilder::new("main");
    let p = main.proto(fail);
    let main = main
        .ops([op::closure(0, p), op::call(0, 1, 2), op::ret(0, 2, 0)])
        .build();

    match Interpreter::new().run(main) {
        Err(VmError::Uncaught { kind, trace, .. }) => {
            assert_eq!(kind, ErrorKind::Value);
            let functions: Vec<&str> = trace.iter().map(|f| f.function.as_str()).collect();
            assert_eq!(functions, ["fail", "main"]);
        }
        other => panic!("expected an uncaught error, got {other:?}"),
    }
}

#[test]
fn caught_internal_errors_are_error_objects() {
    let mut builder = ProtoBuilder::new("main");
    let k1 = builder.constant(Constant::Int(1));
    let k0 = builder.constant(Constant::Int(0));
    let proto = builder
        .ops([
            op::try_op(0, 4),
            op::loadk(0, k1),
            op::loadk(1, k0),
            op::div(2, 0, 1),
            op::ret(2, 2, 0),
            op::geterror(3, 0, 0),
            op::ret(3, 2, 0),
        ])
        .build();

    let mut vm = Interpreter::new();
    let v = vm.run(proto).unwrap();
    match vm.heap().get(v.as_obj()) {
        Object::Error(e) => assert_eq!(e.kind, ErrorKind::Value),
        other => panic!("expected an error object, got {:?}", other.kind()),
    }
}

#[test]
fn endtry_uninstalls_the_handler() {
    let mut builder = ProtoBuilder::new("main");
    let k = builder.constant(Constant::Str("late".into()));
    let proto = builder
        .ops([
            op::try_op(0, 4),
            op::endtry(0),
            op::loadk(0, k),
            op::throw(0, 0, 0),
            op::ret(0, 1, 0),
            op::geterror(1, 0, 0),
            op::ret(1, 2, 0),
        ])
        .build();

    match Interpreter::new().run(proto) {
        Err(VmError::Uncaught { kind, .. }) => assert_eq!(kind, ErrorKind::User),
        other => panic!("expected the throw to escape, got {other:?}"),
    }
}

#[test]
fn nested_handlers_catch_innermost_first() {
    let mut builder = ProtoBuilder::new("main");
    let k = builder.constant(Constant::Str("x".into()));
    let kinner = builder.constant(Constant::Str("inner:".into()));
    let proto = builder
        .ops([
            op::try_op(0, 6),             // outer handler at 7
            op::try_op(0, 3),             // inner handler at 5
            op::loadk(0, k),
            op::throw(0, 0, 0),
            op::ret(0, 1, 0),
            op::geterror(1, 0, 0),        // inner catches
            op::ret(1, 2, 0),
            op::loadk(2, kinner),         // outer would prepend a marker
            op::ret(2, 2, 0),
        ])
        .build();

    let mut vm = Interpreter::new();
    let v = vm.run(proto).unwrap();
    assert_eq!(v.to_text(vm.heap()), "x");
}
