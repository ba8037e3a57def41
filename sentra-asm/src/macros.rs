//! The `impl_opcodes!` macro.
//!
//! One table drives everything derived from the opcode catalogue: the
//! [`Opcode`](crate::Opcode) enum with its fixed discriminants, the
//! `TryFrom<u8>` decoder, the per-opcode instruction format, the assembler
//! mnemonic, and the shorthand constructors in [`op`](crate::op).
//!
//! A row looks like:
//!
//! ```rust,ignore
//! impl_opcodes! {
//!     "Adds two registers."
//!     0x05 ADD add "add" [ABC]
//! }
//! ```
//!
//! in order: docstring, opcode byte, enum variant, constructor ident,
//! mnemonic, instruction format.

macro_rules! opcode_constructor {
    ($doc:literal $fn:ident $Op:ident ABC) => {
        #[doc = $doc]
        pub const fn $fn(a: u8, b: u8, c: u8) -> Instruction {
            Instruction::abc(Opcode::$Op, a, b, c)
        }
    };
    ($doc:literal $fn:ident $Op:ident ABx) => {
        #[doc = $doc]
        pub const fn $fn(a: u8, bx: u16) -> Instruction {
            Instruction::abx(Opcode::$Op, a, bx)
        }
    };
    ($doc:literal $fn:ident $Op:ident AsBx) => {
        #[doc = $doc]
        pub const fn $fn(a: u8, sbx: i32) -> Instruction {
            Instruction::asbx(Opcode::$Op, a, sbx)
        }
    };
    ($doc:literal $fn:ident $Op:ident Ax) => {
        #[doc = $doc]
        pub const fn $fn(ax: u32) -> Instruction {
            Instruction::ax(Opcode::$Op, ax)
        }
    };
}

macro_rules! impl_opcodes {
    ($($doc:literal $val:literal $Op:ident $fn:ident $mn:literal [$fmt:ident])*) => {
        /// Opcode portion of an instruction, one byte.
        ///
        /// Discriminants are part of the serialized bytecode format and must
        /// never be renumbered.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum Opcode {
            $(#[doc = $doc] $Op = $val,)*
        }

        impl Opcode {
            /// The instruction format this opcode is encoded with.
            pub const fn format(self) -> $crate::InstrFormat {
                match self {
                    $(Self::$Op => $crate::InstrFormat::$fmt,)*
                }
            }

            /// Lowercase assembler mnemonic, as rendered by disassembly.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$Op => $mn,)*
                }
            }
        }

        impl core::convert::TryFrom<u8> for Opcode {
            type Error = InvalidOpcode;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($val => Ok(Self::$Op),)*
                    _ => Err(InvalidOpcode),
                }
            }
        }

        impl From<Opcode> for u8 {
            fn from(op: Opcode) -> u8 {
                op as u8
            }
        }

        /// Shorthand instruction constructors, one per opcode.
        pub mod op {
            use super::Opcode;
            use $crate::Instruction;

            $(opcode_constructor!($doc $fn $Op $fmt);)*
        }
    };
}
