//! Function prototypes: the immutable, shareable product of compilation.

use sentra_asm::{Instruction, Opcode};

use std::sync::Arc;

bitflags::bitflags! {
    /// Prototype attribute bits, serialized as one byte in chunk files.
    pub struct ProtoFlags: u8 {
        /// Surplus call arguments are packed into an array in the register
        /// after the last fixed parameter.
        const VARIADIC = 0b0000_0001;
    }
}

/// A compile-time constant, before it is materialized into a `Value`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `nil`.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A small integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string, interned into the heap when the prototype is installed.
    Str(String),
}

impl Constant {
    /// Kind byte used by the chunk format.
    pub const fn kind_byte(&self) -> u8 {
        match self {
            Self::Nil => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Float(_) => 3,
            Self::Str(_) => 4,
        }
    }
}

/// Where a closure's upvalue is captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalDesc {
    /// Register index (when `is_local`) or enclosing-upvalue index.
    pub index: u8,
    /// Capture from the enclosing frame's registers rather than from the
    /// enclosing closure's upvalues.
    pub is_local: bool,
}

/// An immutable function prototype.
///
/// Prototypes are shared between every closure instantiated from them and
/// never mutated after construction, so they live outside the GC heap behind
/// an `Arc`.
#[derive(Debug, Clone)]
pub struct FunctionProto {
    /// Function name for stack traces; not serialized.
    pub name: String,
    /// Fixed parameter count.
    pub arity: u8,
    /// Attribute bits.
    pub flags: ProtoFlags,
    /// Upvalue capture descriptors.
    pub upvals: Vec<UpvalDesc>,
    /// Constant table.
    pub consts: Vec<Constant>,
    /// Instruction sequence.
    pub code: Vec<Instruction>,
    /// Nested prototypes referenced by CLOSURE.
    pub protos: Vec<Arc<FunctionProto>>,
    /// Register window size, derived from `code`.
    pub frame_size: u16,
}

impl FunctionProto {
    /// Build a prototype, deriving the register window from the code.
    pub fn new(
        name: impl Into<String>,
        arity: u8,
        flags: ProtoFlags,
        upvals: Vec<UpvalDesc>,
        consts: Vec<Constant>,
        code: Vec<Instruction>,
        protos: Vec<Arc<FunctionProto>>,
    ) -> Self {
        let frame_size = compute_frame_size(&code).max(arity as u16 + 1);
        Self {
            name: name.into(),
            arity,
            flags,
            upvals,
            consts,
            code,
            protos,
            frame_size,
        }
    }

    /// Whether surplus arguments are collected instead of rejected.
    pub const fn is_variadic(&self) -> bool {
        self.flags.contains(ProtoFlags::VARIADIC)
    }
}

/// Conservative register-window scan.
///
/// Operands that are immediates or constant indices are counted as if they
/// were registers, which can only overestimate the window; multi-register
/// opcodes get their documented extra margin.
fn compute_frame_size(code: &[Instruction]) -> u16 {
    let mut max = 0u16;
    for instr in code {
        let a = instr.a() as u16;
        let b = instr.b() as u16;
        let c = instr.c() as u16;
        let mut hi = a.max(b).max(c) + 1;
        if let Ok(op) = instr.opcode() {
            let extra = match op {
                Opcode::FORPREP | Opcode::FORLOOP => a + 4,
                Opcode::SELF | Opcode::ITERNEXT => a + 2,
                Opcode::CALL | Opcode::TAILCALL => a + b.max(c) + 1,
                Opcode::NEWARRAY | Opcode::RETURN | Opcode::LOADNIL => a + b + 1,
                Opcode::RESUME => (b + c + 1).max(a + 1),
                Opcode::REPLACE | Opcode::SLICESTR | Opcode::SUBSTR => c + 2,
                Opcode::CONCAT => c + 1,
                _ => 0,
            };
            hi = hi.max(extra);
        }
        max = max.max(hi);
    }
    max.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentra_asm::op;

    #[test]
    fn frame_size_covers_for_loop_window() {
        let proto = FunctionProto::new(
            "loop",
            0,
            ProtoFlags::empty(),
            vec![],
            vec![],
            vec![op::forprep(2, 1), op::forloop(2, -1), op::ret(0, 1, 0)],
            vec![],
        );
        // FORPREP at base 2 touches R(2)..R(5).
        assert!(proto.frame_size >= 6);
    }

    #[test]
    fn frame_size_covers_call_window() {
        let proto = FunctionProto::new(
            "caller",
            0,
            ProtoFlags::empty(),
            vec![],
            vec![],
            vec![op::call(3, 4, 2), op::ret(0, 1, 0)],
            vec![],
        );
        // Callee at R(3), args R(4)..R(6).
        assert!(proto.frame_size >= 8);
    }
}
