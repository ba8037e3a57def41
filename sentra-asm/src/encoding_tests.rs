#![allow(clippy::cast_possible_truncation)]

use crate::*;

use rstest::rstest;
use strum::IntoEnumIterator;

#[test]
fn opcode_bytes_round_trip() {
    for op in Opcode::iter() {
        let byte = op as u8;
        assert_eq!(Opcode::try_from(byte), Ok(op));
    }
}

#[test]
fn reserved_bytes_are_rejected() {
    let valid: Vec<u8> = Opcode::iter().map(|op| op as u8).collect();
    for byte in 0..=u8::MAX {
        if !valid.contains(&byte) {
            assert_eq!(Opcode::try_from(byte), Err(InvalidOpcode));
        }
    }
}

#[test]
fn discriminants_are_dense_from_zero() {
    // The loader indexes dispatch on the opcode byte; holes in the numbering
    // would silently reserve bytecode space.
    let mut bytes: Vec<u8> = Opcode::iter().map(|op| op as u8).collect();
    bytes.sort_unstable();
    for (i, byte) in bytes.iter().enumerate() {
        assert_eq!(*byte as usize, i);
    }
}

#[rstest]
#[case(op::add(1, 2, 3), 1, 2, 3)]
#[case(op::call(0, 255, 0), 0, 255, 0)]
#[case(op::mov(255, 255, 255), 255, 255, 255)]
fn abc_fields(#[case] instr: Instruction, #[case] a: u8, #[case] b: u8, #[case] c: u8) {
    assert_eq!(instr.a(), a);
    assert_eq!(instr.b(), b);
    assert_eq!(instr.c(), c);
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(0x7FFF)]
#[case(0xFFFF)]
fn abx_fields(#[case] bx: u16) {
    let instr = op::loadk(7, bx);
    assert_eq!(instr.opcode(), Ok(Opcode::LOADK));
    assert_eq!(instr.a(), 7);
    assert_eq!(instr.bx(), bx);
}

#[rstest]
#[case(-0x7FFF)]
#[case(-1)]
#[case(0)]
#[case(1)]
#[case(0x8000)]
fn asbx_bias_round_trips(#[case] sbx: i32) {
    let instr = op::jmp(0, sbx);
    assert_eq!(instr.sbx(), sbx);
}

#[test]
fn ax_field_width() {
    let instr = op::hotloop(0x00AB_CDEF);
    assert_eq!(instr.opcode(), Ok(Opcode::HOTLOOP));
    assert_eq!(instr.ax_field(), 0x00AB_CDEF);
}

#[test]
fn signed_immediates() {
    let instr = op::addi(4, 4, (-2i8) as u8);
    assert_eq!(instr.sc(), -2);
    let instr = op::subi(4, 4, 1);
    assert_eq!(instr.sc(), 1);
}

#[test]
fn le_byte_order_round_trips() {
    let instr = op::forloop(3, -12);
    assert_eq!(Instruction::from_le_bytes(instr.to_le_bytes()), instr);
    assert_eq!(instr.to_le_bytes()[0], Opcode::FORLOOP as u8);
}

#[test]
fn display_uses_mnemonics() {
    assert_eq!(op::add(0, 1, 2).to_string(), "add 0 1 2");
    assert_eq!(op::loadk(3, 17).to_string(), "loadk 3 17");
    assert_eq!(op::jmp(0, -4).to_string(), "jmp 0 -4");
    assert_eq!(Instruction::from_raw(0x0000_00FF).to_string(), "invalid<0x000000ff>");
}
