use sentra_asm::op;
use sentra_vm::prelude::*;

fn eval(consts: Vec<Constant>, code: Vec<Instruction>) -> (Value, Interpreter) {
    let mut builder = ProtoBuilder::new("main");
    for constant in consts {
        builder.constant(constant);
    }
    let proto = builder.ops(code).build();
    let mut vm = Interpreter::new();
    let value = vm.run(proto).expect("program failed");
    (value, vm)
}

fn text_of(vm: &Interpreter, v: Value) -> String {
    v.to_text(vm.heap())
}

#[test]
fn push_pop_len_round_trip() {
    // let a = [1, 2, 3]; a.push(4); a.pop(); return len(a)
    let (v, _) = eval(
        vec![Constant::Int(1), Constant::Int(2), Constant::Int(3), Constant::Int(4)],
        vec![
            op::loadk(1, 0),
            op::loadk(2, 1),
            op::loadk(3, 2),
            op::newarray(0, 3, 0),
            op::loadk(4, 3),
            op::append(0, 4, 0),
            op::pop(5, 0, 0),
            op::len(6, 0, 0),
            op::ret(6, 2, 0),
        ],
    );
    assert_eq!(v.as_int(), 3);
}

#[test]
fn shift_and_unshift() {
    let (v, _) = eval(
        vec![Constant::Int(1), Constant::Int(2), Constant::Int(0)],
        vec![
            op::loadk(1, 0),
            op::loadk(2, 1),
            op::newarray(0, 2, 0),
            op::loadk(3, 2),
            op::unshift(0, 3, 0),
            op::shift(4, 0, 0),
            op::ret(4, 2, 0),
        ],
    );
    assert_eq!(v.as_int(), 0);
}

#[test]
fn array_index_out_of_range_is_an_index_error() {
    let mut builder = ProtoBuilder::new("main");
    let k = builder.constant(Constant::Int(5));
    let proto = builder
        .ops([
            op::newarray(0, 0, 0),
            op::loadk(1, k),
            op::gettable(2, 0, 1),
            op::ret(2, 2, 0),
        ])
        .build();
    match Interpreter::new().run(proto) {
        Err(VmError::Uncaught { kind, .. }) => assert_eq!(kind, ErrorKind::Index),
        other => panic!("expected IndexError, got {other:?}"),
    }
}

#[test]
fn map_reads_and_writes() {
    // m = {}; m["x"] = 7; return m["x"] + (m has "y" ? 1 : 0)
    let (v, _) = eval(
        vec![
            Constant::Str("x".into()),
            Constant::Int(7),
            Constant::Str("y".into()),
        ],
        vec![
            op::newtable(0, 0, 0),
            op::loadk(1, 1),
            op::settablek(0, 0, 1),
            op::gettablek(2, 0, 0),
            op::loadk(3, 2),
            op::haskey(4, 0, 3),
            op::ret(2, 2, 0),
        ],
    );
    assert_eq!(v.as_int(), 7);
}

#[test]
fn missing_map_key_reads_nil() {
    let (v, _) = eval(
        vec![Constant::Str("absent".into())],
        vec![op::newtable(0, 0, 0), op::gettablek(1, 0, 0), op::ret(1, 2, 0)],
    );
    assert!(v.is_nil());
}

#[test]
fn keys_are_sorted() {
    let (v, vm) = eval(
        vec![
            Constant::Str("beta".into()),
            Constant::Str("alpha".into()),
            Constant::Int(1),
            Constant::Str(", ".into()),
        ],
        vec![
            op::newtable(0, 0, 0),
            op::loadk(1, 2),
            op::settablek(0, 0, 1),
            op::settablek(0, 1, 1),
            op::keys(2, 0, 0),
            op::loadk(3, 3),
            op::join(4, 2, 3),
            op::ret(4, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "alpha, beta");
}

#[test]
fn array_iteration_visits_in_order() {
    // sum = 0; for e in [10, 20, 30] { sum += e }; return sum
    let (v, _) = eval(
        vec![Constant::Int(10), Constant::Int(20), Constant::Int(30), Constant::Int(0)],
        vec![
            op::loadk(1, 0),
            op::loadk(2, 1),
            op::loadk(3, 2),
            op::newarray(0, 3, 0),
            op::iterinit(1, 0, 0),
            op::loadk(2, 3),
            op::iternext(3, 1, 2),
            op::add(2, 2, 3),
            op::jmp(0, -3),
            op::ret(2, 2, 0),
        ],
    );
    assert_eq!(v.as_int(), 60);
}

#[test]
fn map_iteration_follows_sorted_keys() {
    // keys "a","b" with values 1,2; concatenate key:value pairs in order.
    let (v, vm) = eval(
        vec![
            Constant::Str("b".into()),
            Constant::Str("a".into()),
            Constant::Int(2),
            Constant::Int(1),
            Constant::Str("".into()),
        ],
        vec![
            op::newtable(0, 0, 0),
            op::loadk(1, 2),
            op::settablek(0, 0, 1),
            op::loadk(1, 3),
            op::settablek(0, 1, 1),
            op::iterinit(1, 0, 0),
            op::loadk(2, 4),
            op::iternext(3, 1, 3),
            op::concat(5, 2, 4),
            op::mov(2, 5, 0),
            op::jmp(0, -4),
            op::ret(2, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "a1b2");
}

#[test]
fn string_indexing_yields_characters() {
    let (v, vm) = eval(
        vec![Constant::Str("hey".into()), Constant::Int(1)],
        vec![
            op::loadk(0, 0),
            op::loadk(1, 1),
            op::gettable(2, 0, 1),
            op::ret(2, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "e");
}

#[test]
fn string_specializations() {
    let (v, vm) = eval(
        vec![Constant::Str("  Hello World  ".into())],
        vec![
            op::loadk(0, 0),
            op::trim(1, 0, 0),
            op::upper(2, 1, 0),
            op::ret(2, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "HELLO WORLD");

    let (v, _) = eval(
        vec![Constant::Str("hello".into()), Constant::Str("ell".into())],
        vec![
            op::loadk(0, 0),
            op::loadk(1, 1),
            op::indexof(2, 0, 1),
            op::ret(2, 2, 0),
        ],
    );
    assert_eq!(v.as_int(), 1);

    let (v, vm) = eval(
        vec![
            Constant::Str("a,b,c".into()),
            Constant::Str(",".into()),
            Constant::Str("-".into()),
        ],
        vec![
            op::loadk(0, 0),
            op::loadk(1, 1),
            op::split(2, 0, 1),
            op::loadk(3, 2),
            op::join(4, 2, 3),
            op::ret(4, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "a-b-c");

    let (v, vm) = eval(
        vec![
            Constant::Str("hello".into()),
            Constant::Str("l".into()),
            Constant::Str("L".into()),
        ],
        vec![
            op::loadk(0, 0),
            op::loadk(2, 1),
            op::loadk(3, 2),
            op::replace(1, 0, 2),
            op::ret(1, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "heLLo");

    let (v, vm) = eval(
        vec![Constant::Str("hello".into()), Constant::Int(1), Constant::Int(3)],
        vec![
            op::loadk(0, 0),
            op::loadk(2, 1),
            op::loadk(3, 2),
            op::slicestr(1, 0, 2),
            op::ret(1, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "el");

    let (v, vm) = eval(
        vec![Constant::Str("hello".into()), Constant::Int(1), Constant::Int(3)],
        vec![
            op::loadk(0, 0),
            op::loadk(2, 1),
            op::loadk(3, 2),
            op::substr(1, 0, 2),
            op::ret(1, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "ell");
}

#[test]
fn concat_coerces_every_operand() {
    let (v, vm) = eval(
        vec![Constant::Str("n=".into()), Constant::Int(42), Constant::Bool(true)],
        vec![
            op::loadk(1, 0),
            op::loadk(2, 1),
            op::loadk(3, 2),
            op::concat(0, 1, 3),
            op::ret(0, 2, 0),
        ],
    );
    assert_eq!(text_of(&vm, v), "n=42true");
}

#[test]
fn strcat_requires_strings() {
    let mut builder = ProtoBuilder::new("main");
    let ks = builder.constant(Constant::Str("a".into()));
    let ki = builder.constant(Constant::Int(1));
    let proto = builder
        .ops([
            op::loadk(0, ks),
            op::loadk(1, ki),
            op::strcat(2, 0, 1),
            op::ret(2, 2, 0),
        ])
        .build();
    match Interpreter::new().run(proto) {
        Err(VmError::Uncaught { kind, .. }) => assert_eq!(kind, ErrorKind::Type),
        other => panic!("expected TypeError, got {other:?}"),
    }
}

/// Builds far more garbage than the first GC watermark while keeping one
/// array rooted in a register; the collector must preserve it.
#[test]
fn collector_preserves_reachable_data_under_pressure() {
    let (v, vm) = eval(
        vec![Constant::Int(1), Constant::Int(3000)],
        vec![
            op::newarray(0, 0, 0),
            op::loadk(2, 0),
            op::loadk(3, 1),
            op::loadk(4, 0),
            op::forprep(2, 2),
            op::concat(6, 5, 5),
            op::append(0, 6, 0),
            op::forloop(2, -3),
            op::arrlen(1, 0, 0),
            op::ret(1, 2, 0),
        ],
    );
    assert_eq!(v.as_int(), 3000);
    // Several cycles ran; the live set is far below the total allocated.
    assert!(vm.heap().live() < 10_000);
}
