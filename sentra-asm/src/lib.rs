//! Atomic types of the Sentra VM: the opcode catalogue and the 32-bit
//! instruction word.
//!
//! The compiler and the interpreter both depend on this crate, so the numeric
//! opcode ids defined here are the single source of truth for the bytecode
//! format. Changing a discriminant is a breaking change to every compiled
//! chunk in existence.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

#[macro_use]
mod macros;

mod instruction;
mod opcode;

#[cfg(test)]
mod encoding_tests;

pub use instruction::{InstrFormat, Instruction, RawInstruction};
pub use opcode::{op, InvalidOpcode, Opcode};

/// Index of a virtual register inside the current frame.
pub type RegisterId = u8;

/// Index into a prototype's constant table.
pub type ConstId = u16;

/// Interned id of a global slot.
pub type GlobalId = u16;
