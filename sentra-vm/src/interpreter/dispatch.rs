//! The dispatch loop: fetch, decode, execute.

use super::Interpreter;
use crate::error::{ErrorKind, RuntimeError, VmError};
use crate::state::ExecuteState;
use crate::value::Value;

use sentra_asm::{Instruction, Opcode};

impl Interpreter {
    /// Base offset of the executing frame.
    pub(crate) fn base(&self) -> usize {
        self.exec.frame().base
    }

    /// Absolute register index of frame-relative register `i`.
    pub(crate) fn abs_reg(&self, i: u8) -> usize {
        self.base() + i as usize
    }

    /// Read frame-relative register `i`.
    pub(crate) fn reg(&self, i: u8) -> Value {
        self.exec.registers[self.abs_reg(i)]
    }

    /// Write frame-relative register `i`.
    pub(crate) fn set_reg(&mut self, i: u8, v: Value) {
        let slot = self.abs_reg(i);
        self.exec.registers[slot] = v;
    }

    /// Constant `i` of the executing function.
    pub(crate) fn konst(&self, i: usize) -> Result<Value, RuntimeError> {
        self.exec
            .frame()
            .consts
            .get(i)
            .copied()
            .ok_or_else(|| RuntimeError::value(format!("constant index {i} out of range")))
    }

    /// Adjust the pc of the executing frame by `offset` instructions.
    pub(crate) fn jump(&mut self, offset: i32) {
        let frame = self.exec.frame_mut();
        frame.pc = (frame.pc as i64 + offset as i64) as usize;
    }

    /// Skip the next instruction.
    fn skip(&mut self) {
        self.jump(1);
    }

    /// Drive the current fiber topology until the main fiber returns or an
    /// error escapes it.
    pub(crate) fn run_loop(&mut self) -> Result<Value, VmError> {
        loop {
            match self.step() {
                Ok(ExecuteState::Proceed) => self.maybe_collect(),
                Ok(ExecuteState::Return(value)) => {
                    if self.current_fiber.is_some() {
                        self.fiber_return(value);
                    } else {
                        return Ok(value);
                    }
                }
                // YIELD already switched back to the resumer and delivered
                // the value; execution simply continues there.
                Ok(ExecuteState::Yield(_)) => self.maybe_collect(),
                Err(raised) => {
                    let error = self.materialize_error(raised);
                    if let Err(error) = self.unwind(error) {
                        if self.current_fiber.is_some() {
                            self.fiber_die(error);
                        } else {
                            return Err(self.uncaught(error));
                        }
                    }
                }
            }
        }
    }

    /// Execute one instruction of the executing fiber.
    pub(crate) fn step(&mut self) -> Result<ExecuteState, RuntimeError> {
        let (instr, next_pc) = {
            let frame = self.exec.frame();
            match frame.proto.code.get(frame.pc) {
                Some(instr) => (*instr, frame.pc + 1),
                // Fell off the end of the code: implicit `return nil`.
                None => return self.do_return(0, 1),
            }
        };
        self.exec.frame_mut().pc = next_pc;
        self.instruction(instr)
    }

    fn instruction(&mut self, instr: Instruction) -> Result<ExecuteState, RuntimeError> {
        let op = instr
            .opcode()
            .map_err(|_| RuntimeError::value(format!("invalid opcode {:#04x}", instr.op())))?;
        let (a, b, c) = (instr.a(), instr.b(), instr.c());

        match op {
            Opcode::NOP => {}

            // -- loads and moves ------------------------------------------
            Opcode::MOVE => {
                let v = self.reg(b);
                self.set_reg(a, v);
            }
            Opcode::LOADK => {
                let v = self.konst(instr.bx() as usize)?;
                self.set_reg(a, v);
            }
            Opcode::LOADBOOL => {
                self.set_reg(a, Value::boolean(b != 0));
                if c != 0 {
                    self.skip();
                }
            }
            Opcode::LOADNIL => {
                for i in a..=a.saturating_add(b) {
                    self.set_reg(i, Value::NIL);
                }
            }

            // -- arithmetic -----------------------------------------------
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV | Opcode::MOD | Opcode::POW => {
                let result = self.arith(op, self.reg(b), self.reg(c))?;
                self.set_reg(a, result);
            }
            Opcode::ADDK | Opcode::SUBK | Opcode::MULK | Opcode::DIVK => {
                let rhs = self.konst(c as usize)?;
                let arith_op = match op {
                    Opcode::ADDK => Opcode::ADD,
                    Opcode::SUBK => Opcode::SUB,
                    Opcode::MULK => Opcode::MUL,
                    _ => Opcode::DIV,
                };
                let result = self.arith(arith_op, self.reg(b), rhs)?;
                self.set_reg(a, result);
            }
            Opcode::ADDI => {
                let result = self.arith(Opcode::ADD, self.reg(b), Value::int(instr.sc() as i64))?;
                self.set_reg(a, result);
            }
            Opcode::SUBI => {
                let result = self.arith(Opcode::SUB, self.reg(b), Value::int(instr.sc() as i64))?;
                self.set_reg(a, result);
            }
            Opcode::INCR => {
                let result = self.arith(Opcode::ADD, self.reg(a), Value::int(1))?;
                self.set_reg(a, result);
            }
            Opcode::UNM => {
                let result = self.negate(self.reg(b))?;
                self.set_reg(a, result);
            }

            // -- comparison -----------------------------------------------
            Opcode::EQ => {
                let eq = self.values_equal(self.reg(b), self.reg(c));
                self.set_reg(a, Value::boolean(eq));
            }
            Opcode::NEQ => {
                let eq = self.values_equal(self.reg(b), self.reg(c));
                self.set_reg(a, Value::boolean(!eq));
            }
            Opcode::LT | Opcode::LE | Opcode::GT | Opcode::GE => {
                let holds = self.ordered(op, self.reg(b), self.reg(c))?;
                self.set_reg(a, Value::boolean(holds));
            }

            // -- fused compare-and-jump -----------------------------------
            Opcode::LTJ | Opcode::LEJ => {
                let cmp = if op == Opcode::LTJ { Opcode::LT } else { Opcode::LE };
                if self.ordered(cmp, self.reg(a), self.reg(b))? {
                    self.jump(instr.sc() as i32);
                }
            }
            Opcode::EQJ => {
                if self.values_equal(self.reg(a), self.reg(b)) {
                    self.jump(instr.sc() as i32);
                }
            }
            Opcode::NEJ => {
                if !self.values_equal(self.reg(a), self.reg(b)) {
                    self.jump(instr.sc() as i32);
                }
            }
            Opcode::LTJK | Opcode::LEJK | Opcode::GTJK | Opcode::GEJK => {
                let cmp = match op {
                    Opcode::LTJK => Opcode::LT,
                    Opcode::LEJK => Opcode::LE,
                    Opcode::GTJK => Opcode::GT,
                    _ => Opcode::GE,
                };
                let rhs = self.konst(b as usize)?;
                if self.ordered(cmp, self.reg(a), rhs)? {
                    self.jump(instr.sc() as i32);
                }
            }
            Opcode::EQJK => {
                let rhs = self.konst(b as usize)?;
                if self.values_equal(self.reg(a), rhs) {
                    self.jump(instr.sc() as i32);
                }
            }
            Opcode::NEJK => {
                let rhs = self.konst(b as usize)?;
                if !self.values_equal(self.reg(a), rhs) {
                    self.jump(instr.sc() as i32);
                }
            }

            // -- globals and upvalues -------------------------------------
            Opcode::GETGLOBAL => {
                let v = self.globals.get(instr.bx());
                self.set_reg(a, v);
            }
            Opcode::SETGLOBAL => {
                let v = self.reg(a);
                self.globals.set(instr.bx(), v);
            }
            Opcode::GETUPVAL => {
                let v = self.get_upvalue(b)?;
                self.set_reg(a, v);
            }
            Opcode::SETUPVAL => {
                let v = self.reg(a);
                self.set_upvalue(b, v)?;
            }

            // -- composites -----------------------------------------------
            Opcode::NEWTABLE => {
                let v = self.heap.new_map();
                self.set_reg(a, v);
            }
            Opcode::NEWARRAY => {
                let items: Vec<Value> = (1..=b).map(|i| self.reg(a + i)).collect();
                let v = self.heap.new_array(items);
                self.set_reg(a, v);
            }
            Opcode::GETTABLE => {
                let v = self.table_get(self.reg(b), self.reg(c))?;
                self.set_reg(a, v);
            }
            Opcode::SETTABLE => {
                self.table_set(self.reg(a), self.reg(b), self.reg(c))?;
            }
            Opcode::GETTABLEK => {
                let key = self.konst(c as usize)?;
                let v = self.table_get(self.reg(b), key)?;
                self.set_reg(a, v);
            }
            Opcode::SETTABLEK => {
                let key = self.konst(b as usize)?;
                self.table_set(self.reg(a), key, self.reg(c))?;
            }
            Opcode::SELF => {
                let receiver = self.reg(b);
                let name = self.konst(c as usize)?;
                let method = self.method_lookup(receiver, name)?;
                self.set_reg(a + 1, receiver);
                self.set_reg(a, method);
            }
            Opcode::LEN => {
                let v = self.generic_len(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::APPEND => self.array_append(self.reg(a), self.reg(b))?,
            Opcode::POP => {
                let v = self.array_pop(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::SHIFT => {
                let v = self.array_shift(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::UNSHIFT => self.array_unshift(self.reg(a), self.reg(b))?,
            Opcode::CONCAT => {
                let v = self.concat_range(b, c)?;
                self.set_reg(a, v);
            }
            Opcode::KEYS => {
                let v = self.map_keys(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::HASKEY => {
                let v = self.map_has_key(self.reg(b), self.reg(c))?;
                self.set_reg(a, v);
            }
            Opcode::GETARRAYI => {
                let v = self.array_get_index(self.reg(b), c as i64)?;
                self.set_reg(a, v);
            }
            Opcode::SETARRAYI => {
                self.array_set_index(self.reg(a), b as i64, self.reg(c))?;
            }
            Opcode::ARRLEN => {
                let v = self.array_len(self.reg(b))?;
                self.set_reg(a, v);
            }

            // -- string specializations -----------------------------------
            Opcode::UPPER
            | Opcode::LOWER
            | Opcode::TRIM
            | Opcode::STRLEN
            | Opcode::CONTAINS
            | Opcode::STARTSWITH
            | Opcode::ENDSWITH
            | Opcode::INDEXOF
            | Opcode::SPLIT
            | Opcode::JOIN
            | Opcode::REPLACE
            | Opcode::SLICESTR
            | Opcode::STRCAT
            | Opcode::SUBSTR => {
                let v = self.string_op(op, instr)?;
                self.set_reg(a, v);
            }

            // -- math specializations -------------------------------------
            Opcode::ABS | Opcode::SQRT | Opcode::FLOOR | Opcode::CEIL | Opcode::ROUND => {
                let v = self.math_unary(op, self.reg(b))?;
                self.set_reg(a, v);
            }

            // -- control flow ---------------------------------------------
            Opcode::JMP => self.jump(instr.sbx()),
            Opcode::TEST => {
                if self.reg(a).is_truthy(&self.heap) != (c != 0) {
                    self.skip();
                }
            }
            Opcode::TESTSET => {
                let v = self.reg(b);
                if v.is_truthy(&self.heap) == (c != 0) {
                    self.set_reg(a, v);
                } else {
                    self.skip();
                }
            }
            Opcode::JMPINTLOOP => self.jmp_intloop(a)?,
            Opcode::FORPREP => self.for_prep(a, instr.sbx())?,
            Opcode::FORLOOP => self.for_loop(a, instr.sbx())?,
            Opcode::ITERINIT => {
                let v = self.iter_init(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::ITERNEXT => self.iter_next(a, b, c)?,

            // -- functions ------------------------------------------------
            Opcode::CLOSURE => {
                let v = self.make_closure(instr.bx() as usize)?;
                self.set_reg(a, v);
            }
            Opcode::CALL => return self.call(a, b, c),
            Opcode::TAILCALL => return self.tail_call(a, b),
            Opcode::RETURN => return self.do_return(a, b),

            // -- classes --------------------------------------------------
            Opcode::CLASS => {
                let v = self.make_class(instr.bx() as usize)?;
                self.set_reg(a, v);
            }
            Opcode::INSTANCE => {
                let v = self.instantiate(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::GETMETHOD => {
                let name = self.konst(c as usize)?;
                let v = self.method_lookup(self.reg(b), name)?;
                self.set_reg(a, v);
            }
            Opcode::SETMETHOD => {
                let name = self.konst(b as usize)?;
                self.define_method(self.reg(a), name, self.reg(c))?;
            }
            Opcode::GETPROP => {
                let name = self.konst(c as usize)?;
                let v = self.get_property(self.reg(b), name)?;
                self.set_reg(a, v);
            }
            Opcode::SETPROP => {
                let name = self.konst(b as usize)?;
                self.set_property(self.reg(a), name, self.reg(c))?;
            }
            Opcode::INHERIT => self.inherit(self.reg(a), self.reg(b))?,
            Opcode::SUPER => {
                let name = self.konst(c as usize)?;
                let v = self.super_lookup(self.reg(b), name)?;
                self.set_reg(a, v);
            }

            // -- fibers ---------------------------------------------------
            Opcode::FIBER => {
                let v = self.make_fiber(self.reg(b))?;
                self.set_reg(a, v);
            }
            Opcode::YIELD => return self.fiber_yield(a),
            Opcode::RESUME => return self.fiber_resume(a, b, c),

            // -- errors ---------------------------------------------------
            Opcode::TRY => self.try_install(instr.sbx()),
            Opcode::ENDTRY => self.try_pop()?,
            Opcode::THROW => {
                let value = self.reg(a);
                let message = value.to_text(&self.heap);
                self.thrown = Some(value);
                return Err(RuntimeError::new(ErrorKind::User, message));
            }
            Opcode::GETERROR => {
                let error = std::mem::replace(&mut self.last_error, Value::NIL);
                self.set_reg(a, error);
            }

            // -- hints and diagnostics ------------------------------------
            Opcode::HOTLOOP => {
                self.profiler.record_loop(instr.ax_field());
            }
            Opcode::FUNCENTRY => self.record_entry_feedback(),
            Opcode::PRINT => {
                let text = self.reg(a).to_text(&self.heap);
                println!("{text}");
            }
        }

        Ok(ExecuteState::Proceed)
    }

    fn uncaught(&mut self, error: Value) -> VmError {
        let (kind, message, trace) = self.error_parts(error);
        VmError::Uncaught { kind, message, trace }
    }
}
