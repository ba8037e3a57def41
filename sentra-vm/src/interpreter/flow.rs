//! Call protocol, returns, numeric for loops, and TRY bookkeeping.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::frame::{callee_parts, CallFrame, TryFrame};
use crate::object::{ObjKind, Object};
use crate::profiler::FnId;
use crate::proto::FunctionProto;
use crate::state::ExecuteState;
use crate::value::Value;

use sentra_asm::Opcode;

use std::sync::Arc;

impl Interpreter {
    /// Install the bottom frame of a fiber's (or the main) call stack.
    pub(crate) fn push_initial_frame(
        &mut self,
        callee: Value,
        proto: Arc<FunctionProto>,
        consts: Arc<[Value]>,
    ) -> Result<(), RuntimeError> {
        let frame_size = proto.frame_size as usize;
        self.exec.reserve(frame_size)?;
        for slot in &mut self.exec.registers[..frame_size] {
            *slot = Value::NIL;
        }
        self.exec.frames.push(CallFrame {
            callee,
            proto,
            consts,
            base: 0,
            pc: 0,
            return_reg: 0,
            expected: Some(1),
            tries: Vec::new(),
        });
        self.exec.top = frame_size;
        Ok(())
    }

    /// CALL(A, B, C).
    pub(crate) fn call(&mut self, a: u8, b: u8, c: u8) -> Result<ExecuteState, RuntimeError> {
        let base = self.base();
        let abs_fn = base + a as usize;
        let argc = if b == 0 {
            self.open_results_end(abs_fn + 1).saturating_sub(abs_fn + 1)
        } else {
            (b - 1) as usize
        };
        let expected = if c == 0 { None } else { Some((c - 1) as usize) };
        let callee = self.exec.registers[abs_fn];

        match callee.kind(&self.heap) {
            Some(ObjKind::Native) => self.call_native(abs_fn, argc, expected),
            Some(ObjKind::Function | ObjKind::Closure) => {
                self.call_function(callee, abs_fn, argc, expected)
            }
            _ => Err(RuntimeError::type_error(format!(
                "cannot call a {}",
                callee.type_name(&self.heap)
            ))),
        }
    }

    fn open_results_end(&mut self, fallback: usize) -> usize {
        self.varargs_top.take().unwrap_or(fallback)
    }

    fn call_native(
        &mut self,
        abs_fn: usize,
        argc: usize,
        expected: Option<usize>,
    ) -> Result<ExecuteState, RuntimeError> {
        let (name, arity, callable) = match self.heap.get(self.exec.registers[abs_fn].as_obj()) {
            Object::Native(n) => (n.name.clone(), n.arity, n.call.clone()),
            _ => unreachable!("checked native kind"),
        };
        crate::native::check_arity(&name, arity, argc)?;

        let args: Vec<Value> =
            self.exec.registers[abs_fn + 1..abs_fn + 1 + argc].to_vec();
        let result = callable(&mut self.heap, &args)?;

        // Materialize the single-result vector into the expected window.
        self.exec.registers[abs_fn] = result;
        let deliver = expected.unwrap_or(1);
        for i in 1..deliver {
            self.exec.registers[abs_fn + i] = Value::NIL;
        }
        if expected.is_none() {
            self.varargs_top = Some(abs_fn + 1);
        }
        Ok(ExecuteState::Proceed)
    }

    fn call_function(
        &mut self,
        callee: Value,
        abs_fn: usize,
        argc: usize,
        expected: Option<usize>,
    ) -> Result<ExecuteState, RuntimeError> {
        let (proto, consts) =
            callee_parts(&self.heap, callee).expect("checked function kind");
        let (promoted, tier) = self.profiler.record_call(FnId::of(&proto), &proto.name);
        if promoted && proto.code.len() <= crate::consts::INLINE_SIZE_LIMIT {
            tracing::debug!(function = %proto.name, ?tier, "small body, inline-expansion candidate");
        }
        self.exec.check_frame_depth()?;

        let new_base = abs_fn + 1;
        let frame_size = proto.frame_size as usize;
        self.exec.reserve(new_base + frame_size)?;
        self.bind_arguments(&proto, new_base, argc)?;

        self.exec.frames.push(CallFrame {
            callee,
            proto,
            consts,
            base: new_base,
            pc: 0,
            return_reg: abs_fn,
            expected,
            tries: Vec::new(),
        });
        self.exec.top = new_base + frame_size;
        Ok(ExecuteState::Proceed)
    }

    /// Arity validation plus variadic packing, with the arguments already in
    /// place at `new_base..new_base + argc`.
    fn bind_arguments(
        &mut self,
        proto: &FunctionProto,
        new_base: usize,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        let arity = proto.arity as usize;
        let frame_size = proto.frame_size as usize;

        if proto.is_variadic() {
            let surplus: Vec<Value> = if argc > arity {
                self.exec.registers[new_base + arity..new_base + argc].to_vec()
            } else {
                Vec::new()
            };
            for slot in &mut self.exec.registers[new_base + argc.min(arity)..new_base + frame_size]
            {
                *slot = Value::NIL;
            }
            let rest = self.heap.new_array(surplus);
            self.exec.registers[new_base + arity] = rest;
        } else {
            if argc != arity {
                return Err(RuntimeError::arity(format!(
                    "{} expects {} argument(s), got {}",
                    proto.name, arity, argc
                )));
            }
            for slot in &mut self.exec.registers[new_base + arity..new_base + frame_size] {
                *slot = Value::NIL;
            }
        }
        Ok(())
    }

    /// TAILCALL(A, B): replace the current frame in place. The frame stack
    /// does not grow, so self-recursive tail calls run in constant stack.
    pub(crate) fn tail_call(&mut self, a: u8, b: u8) -> Result<ExecuteState, RuntimeError> {
        let base = self.base();
        let abs_fn = base + a as usize;
        let argc = if b == 0 {
            self.open_results_end(abs_fn + 1).saturating_sub(abs_fn + 1)
        } else {
            (b - 1) as usize
        };
        let callee = self.exec.registers[abs_fn];

        match callee.kind(&self.heap) {
            // A native in tail position degenerates to call-then-return.
            Some(ObjKind::Native) => {
                self.call_native(abs_fn, argc, Some(1))?;
                self.do_return(a, 2)
            }
            Some(ObjKind::Function | ObjKind::Closure) => {
                let (proto, consts) =
                    callee_parts(&self.heap, callee).expect("checked function kind");
                self.profiler.record_call(FnId::of(&proto), &proto.name);

                self.exec.close_upvalues(&mut self.heap, base);

                // Shift the arguments down to the frame base.
                for i in 0..argc {
                    self.exec.registers[base + i] = self.exec.registers[abs_fn + 1 + i];
                }
                let frame_size = proto.frame_size as usize;
                self.exec.reserve(base + frame_size)?;
                self.bind_arguments(&proto, base, argc)?;

                let frame = self.exec.frame_mut();
                frame.callee = callee;
                frame.proto = proto;
                frame.consts = consts;
                frame.pc = 0;
                frame.tries.clear();
                self.exec.top = base + frame_size;
                Ok(ExecuteState::Proceed)
            }
            _ => Err(RuntimeError::type_error(format!(
                "cannot call a {}",
                callee.type_name(&self.heap)
            ))),
        }
    }

    /// RETURN(A, B).
    pub(crate) fn do_return(&mut self, a: u8, b: u8) -> Result<ExecuteState, RuntimeError> {
        let (base, return_reg, expected) = {
            let frame = self.exec.frame();
            (frame.base, frame.return_reg, frame.expected)
        };
        let results_start = base + a as usize;
        let count = if b == 0 {
            self.open_results_end(results_start).saturating_sub(results_start)
        } else {
            (b - 1) as usize
        };

        self.exec.close_upvalues(&mut self.heap, base);

        let first = if count > 0 {
            self.exec.registers[results_start]
        } else {
            Value::NIL
        };
        let deliver = expected.unwrap_or(count);
        for i in 0..deliver {
            let v = if i < count {
                self.exec.registers[results_start + i]
            } else {
                Value::NIL
            };
            self.exec.registers[return_reg + i] = v;
        }

        self.exec.frames.pop();
        match self.exec.frames.last() {
            None => Ok(ExecuteState::Return(first)),
            Some(caller) => {
                self.exec.top = caller.base + caller.proto.frame_size as usize;
                if expected.is_none() {
                    self.varargs_top = Some(return_reg + deliver);
                }
                Ok(ExecuteState::Proceed)
            }
        }
    }

    /// FORPREP(A, sBx).
    pub(crate) fn for_prep(&mut self, a: u8, sbx: i32) -> Result<(), RuntimeError> {
        let (start, limit, step) = (self.reg(a), self.reg(a + 1), self.reg(a + 2));
        for v in [start, limit, step] {
            if !v.is_numeric() {
                return Err(RuntimeError::type_error(format!(
                    "for loop bound must be numeric, got {}",
                    v.type_name(&self.heap)
                )));
            }
        }
        let zero_step = if step.is_int() {
            step.as_int() == 0
        } else {
            step.as_number() == 0.0
        };
        if zero_step {
            return Err(RuntimeError::value("for loop step is zero"));
        }
        let prepared = self.arith(Opcode::SUB, start, step)?;
        self.set_reg(a, prepared);
        self.jump(sbx);
        Ok(())
    }

    /// FORLOOP(A, sBx).
    pub(crate) fn for_loop(&mut self, a: u8, sbx: i32) -> Result<(), RuntimeError> {
        let (limit, step) = (self.reg(a + 1), self.reg(a + 2));
        if !step.is_numeric() {
            return Err(RuntimeError::type_error(format!(
                "for loop step must be numeric, got {}",
                step.type_name(&self.heap)
            )));
        }
        let counter = self.arith(Opcode::ADD, self.reg(a), step)?;
        self.set_reg(a, counter);

        let ascending = if step.is_int() {
            step.as_int() > 0
        } else {
            step.as_number() > 0.0
        };
        let cmp = if ascending { Opcode::LE } else { Opcode::GE };
        if self.ordered(cmp, counter, limit)? {
            self.set_reg(a + 3, counter);
            self.jump(sbx);
        }
        Ok(())
    }

    /// TRY(sBx): install a handler on the current frame.
    pub(crate) fn try_install(&mut self, sbx: i32) {
        let saved_top = self.exec.top;
        let frame = self.exec.frame_mut();
        let handler_pc = (frame.pc as i64 + sbx as i64) as usize;
        frame.tries.push(TryFrame { handler_pc, saved_top });
    }

    /// ENDTRY: drop the innermost handler of the current frame.
    pub(crate) fn try_pop(&mut self) -> Result<(), RuntimeError> {
        self.exec
            .frame_mut()
            .tries
            .pop()
            .map(|_| ())
            .ok_or_else(|| RuntimeError::value("ENDTRY without a matching TRY"))
    }

    /// FUNCENTRY: record argument type feedback for the current frame's
    /// entry site.
    pub(crate) fn record_entry_feedback(&mut self) {
        let (site, base, arity) = {
            let frame = self.exec.frame();
            let site = (Arc::as_ptr(&frame.proto) as u64)
                .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ frame.pc as u64;
            (site, frame.base, frame.proto.arity.min(4) as usize)
        };
        for i in 0..arity {
            let tag = self.exec.registers[base + i].type_tag(&self.heap);
            self.profiler.record_type(site, tag);
        }
    }
}
