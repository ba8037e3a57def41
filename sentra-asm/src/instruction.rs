use crate::{InvalidOpcode, Opcode};

use core::fmt;

/// An instruction before field extraction.
pub type RawInstruction = u32;

/// Operand layout of a 32-bit instruction word.
///
/// Field positions, counted from the least significant bit:
///
/// | Format | Fields                                     |
/// |--------|--------------------------------------------|
/// | `ABC`  | `op[0:8] A[8:16] B[16:24] C[24:32]`        |
/// | `ABx`  | `op[0:8] A[8:16] Bx[16:32]` (unsigned)     |
/// | `AsBx` | `op[0:8] A[8:16] sBx[16:32]` (biased)      |
/// | `Ax`   | `op[0:8] Ax[8:32]` (unsigned)              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstrFormat {
    /// Three 8-bit operands.
    ABC,
    /// One 8-bit operand and one unsigned 16-bit operand.
    ABx,
    /// One 8-bit operand and one biased signed 16-bit operand.
    AsBx,
    /// One unsigned 24-bit operand.
    Ax,
}

/// Excess bias applied to the `sBx` field, giving it the range
/// `-0x7FFF..=0x8000`.
pub(crate) const SBX_BIAS: i32 = 0x7FFF;

/// A single 32-bit instruction word.
///
/// Fields are extracted lazily by the accessors; the interpreter only reads
/// the fields its opcode's format defines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction(RawInstruction);

impl Instruction {
    /// Size of an encoded instruction in bytes.
    pub const LEN: usize = 4;

    /// Wrap a raw instruction word without validating its opcode byte.
    pub const fn from_raw(raw: RawInstruction) -> Self {
        Self(raw)
    }

    /// The raw instruction word.
    pub const fn raw(self) -> RawInstruction {
        self.0
    }

    /// Build an `ABC`-format instruction.
    pub const fn abc(op: Opcode, a: u8, b: u8, c: u8) -> Self {
        Self(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24)
    }

    /// Build an `ABx`-format instruction.
    pub const fn abx(op: Opcode, a: u8, bx: u16) -> Self {
        Self(op as u32 | (a as u32) << 8 | (bx as u32) << 16)
    }

    /// Build an `AsBx`-format instruction.
    ///
    /// `sbx` must be within `-0x7FFF..=0x8000`; out-of-range offsets are a
    /// compiler bug and panic in debug builds.
    pub const fn asbx(op: Opcode, a: u8, sbx: i32) -> Self {
        let biased = sbx + SBX_BIAS;
        debug_assert!(biased >= 0 && biased <= u16::MAX as i32);
        Self(op as u32 | (a as u32) << 8 | (biased as u32) << 16)
    }

    /// Build an `Ax`-format instruction. Only the low 24 bits of `ax` are
    /// representable.
    pub const fn ax(op: Opcode, ax: u32) -> Self {
        debug_assert!(ax <= 0x00FF_FFFF);
        Self(op as u32 | ax << 8)
    }

    /// Opcode byte, unvalidated.
    pub const fn op(self) -> u8 {
        self.0 as u8
    }

    /// Decoded opcode, or [`InvalidOpcode`] for reserved bytes.
    pub fn opcode(self) -> Result<Opcode, InvalidOpcode> {
        Opcode::try_from(self.op())
    }

    /// Operand `A`.
    pub const fn a(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Operand `B`.
    pub const fn b(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Operand `C`.
    pub const fn c(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Operand `C` reinterpreted as a signed 8-bit immediate (`ADDI`, `SUBI`,
    /// fused compare-and-jump offsets).
    pub const fn sc(self) -> i8 {
        self.c() as i8
    }

    /// Operand `Bx`.
    pub const fn bx(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Operand `sBx`, bias removed.
    pub const fn sbx(self) -> i32 {
        self.bx() as i32 - SBX_BIAS
    }

    /// Operand `Ax`.
    pub const fn ax_field(self) -> u32 {
        self.0 >> 8
    }

    /// Encode to the little-endian byte order used by chunk files.
    pub const fn to_le_bytes(self) -> [u8; Self::LEN] {
        self.0.to_le_bytes()
    }

    /// Decode from the little-endian byte order used by chunk files.
    pub const fn from_le_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl From<RawInstruction> for Instruction {
    fn from(raw: RawInstruction) -> Self {
        Self(raw)
    }
}

impl From<Instruction> for RawInstruction {
    fn from(instr: Instruction) -> Self {
        instr.0
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Err(InvalidOpcode) => write!(f, "invalid<{:#010x}>", self.0),
            Ok(op) => match op.format() {
                InstrFormat::ABC => {
                    write!(f, "{} {} {} {}", op.mnemonic(), self.a(), self.b(), self.c())
                }
                InstrFormat::ABx => write!(f, "{} {} {}", op.mnemonic(), self.a(), self.bx()),
                InstrFormat::AsBx => write!(f, "{} {} {}", op.mnemonic(), self.a(), self.sbx()),
                InstrFormat::Ax => write!(f, "{} {}", op.mnemonic(), self.ax_field()),
            },
        }
    }
}
