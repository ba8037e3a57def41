//! Utilities for embedders and tests.

pub mod test_helpers {
    //! Hand-assembly helpers used by the integration tests and by compiler
    //! authors experimenting with the instruction set.

    use crate::proto::{Constant, FunctionProto, ProtoFlags, UpvalDesc};

    use sentra_asm::Instruction;

    use std::sync::Arc;

    /// Incremental [`FunctionProto`] builder.
    #[derive(Debug)]
    pub struct ProtoBuilder {
        name: String,
        arity: u8,
        flags: ProtoFlags,
        upvals: Vec<UpvalDesc>,
        consts: Vec<Constant>,
        code: Vec<Instruction>,
        protos: Vec<Arc<FunctionProto>>,
    }

    impl Default for ProtoBuilder {
        fn default() -> Self {
            Self {
                name: String::new(),
                arity: 0,
                flags: ProtoFlags::empty(),
                upvals: Vec::new(),
                consts: Vec::new(),
                code: Vec::new(),
                protos: Vec::new(),
            }
        }
    }

    impl ProtoBuilder {
        /// Start a prototype named `name`.
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                ..Self::default()
            }
        }

        /// Set the fixed parameter count.
        pub fn arity(mut self, arity: u8) -> Self {
            self.arity = arity;
            self
        }

        /// Mark the function variadic.
        pub fn variadic(mut self) -> Self {
            self.flags |= ProtoFlags::VARIADIC;
            self
        }

        /// Add an upvalue descriptor.
        pub fn upval(mut self, index: u8, is_local: bool) -> Self {
            self.upvals.push(UpvalDesc { index, is_local });
            self
        }

        /// Add a constant, returning its table index.
        pub fn constant(&mut self, constant: Constant) -> u16 {
            self.consts.push(constant);
            (self.consts.len() - 1) as u16
        }

        /// Append one instruction.
        pub fn op(mut self, instr: Instruction) -> Self {
            self.code.push(instr);
            self
        }

        /// Append a batch of instructions.
        pub fn ops(mut self, instrs: impl IntoIterator<Item = Instruction>) -> Self {
            self.code.extend(instrs);
            self
        }

        /// Attach a nested prototype, returning its index for CLOSURE.
        pub fn proto(&mut self, proto: Arc<FunctionProto>) -> u16 {
            self.protos.push(proto);
            (self.protos.len() - 1) as u16
        }

        /// Finish the prototype.
        pub fn build(self) -> Arc<FunctionProto> {
            Arc::new(FunctionProto::new(
                self.name,
                self.arity,
                self.flags,
                self.upvals,
                self.consts,
                self.code,
                self.protos,
            ))
        }
    }
}
