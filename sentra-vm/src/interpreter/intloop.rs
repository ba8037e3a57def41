//! JMP_INTLOOP: enter a compiled integer loop, or fall through.
//!
//! The glue copies the affected registers into `i64` scratch, maps the
//! construct's bounds onto the executor's templates, and writes the final
//! state back only on success. Every guard failure falls through to the
//! generic loop that follows the instruction, so behavior under deopt is
//! the interpreter's own.
//!
//! The numeric mapping is deliberately conservative: operands stay inside
//! ranges where `i64` arithmetic and the interpreter's promote-on-overflow
//! arithmetic provably agree, which is what makes the deopt-equivalence
//! property testable rather than aspirational.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::jit::{self, IntLoopCode, IntLoopRegs, LoopShape, LoopTemplate};
use crate::value::{Value, INT_MAX, INT_MIN};

/// Magnitude bound on counters and limits of Sum loops; keeps every partial
/// sum below the small-int ceiling.
const SUM_OPERAND_BOUND: i64 = 1 << 22;

/// Magnitude bound on the incoming accumulator of Sum loops.
const SUM_ACCUM_BOUND: i64 = 1 << 45;

impl Interpreter {
    pub(crate) fn jmp_intloop(&mut self, a: u8) -> Result<(), RuntimeError> {
        let loop_id = a as u32;
        if !self.profiler.is_hot_loop(loop_id) {
            return Ok(());
        }

        if self.loop_cache.get(loop_id).is_none() {
            let analysis = {
                let frame = self.exec.frame();
                // frame.pc already points at the loop construct.
                jit::analyze_loop(&frame.proto.code, &frame.consts, frame.pc, loop_id)
            };
            self.loop_cache.insert(analysis);
        }
        let analysis = match self.loop_cache.get(loop_id) {
            Some(analysis) => analysis.clone(),
            None => return Ok(()),
        };
        if analysis.template == LoopTemplate::Unknown {
            return Ok(());
        }

        let base = self.base();
        let read_int = |slot: usize, exec: &crate::frame::FiberCore| -> Option<i64> {
            let v = exec.registers[slot];
            v.is_int().then(|| v.as_int())
        };

        let Some(counter) = read_int(base + analysis.counter_reg as usize, &self.exec) else {
            return Ok(());
        };
        let (limit, limit_from_const) = match analysis.int_loop_code.limit_const {
            Some(k) => (k, true),
            None => match read_int(base + analysis.limit_reg as usize, &self.exec) {
                Some(limit) => (limit, false),
                None => return Ok(()),
            },
        };
        let signed_step = match analysis.step_reg {
            Some(r) => match read_int(base + r as usize, &self.exec) {
                Some(step) => step,
                None => return Ok(()),
            },
            None => 1,
        };
        if signed_step == 0 {
            // The generic FORPREP raises the ValueError with its own trace.
            return Ok(());
        }
        let accum0 = match (analysis.accum_reg, analysis.accum_global_idx) {
            (Some(r), _) => match read_int(base + r as usize, &self.exec) {
                Some(accum) => accum,
                None => return Ok(()),
            },
            (None, Some(g)) => {
                let v = self.globals.get(g);
                if !v.is_int() {
                    return Ok(());
                }
                v.as_int()
            }
            (None, None) => 0,
        };

        // Map the construct onto an executor template and exclusive/inclusive
        // limit. Generic for-loops continue while `counter <= limit`, the
        // executor's CountUp/Sum run while `counter < limit`.
        let (template, exec_limit) = match (analysis.shape, analysis.template, signed_step > 0) {
            (LoopShape::NumericFor, LoopTemplate::Counter, true) => {
                match limit.checked_add(1) {
                    Some(l) => (LoopTemplate::Counter, l),
                    None => return Ok(()),
                }
            }
            (LoopShape::NumericFor, LoopTemplate::Counter, false) => {
                match limit.checked_sub(1) {
                    Some(l) => (LoopTemplate::CountDown, l),
                    None => return Ok(()),
                }
            }
            (LoopShape::NumericFor, LoopTemplate::Sum, true) => match limit.checked_add(1) {
                Some(l) => (LoopTemplate::Sum, l),
                None => return Ok(()),
            },
            (LoopShape::NumericFor, LoopTemplate::Product, true) => (LoopTemplate::Product, limit),
            (LoopShape::WhileSum, template, true) => {
                let l = if analysis.inclusive {
                    match limit.checked_add(1) {
                        Some(l) => l,
                        None => return Ok(()),
                    }
                } else {
                    limit
                };
                (template, l)
            }
            _ => return Ok(()),
        };

        // Domain guards; outside these the generic loop's int/float
        // promotion could diverge from straight i64 arithmetic.
        match template {
            LoopTemplate::Sum => {
                if counter.abs() >= SUM_OPERAND_BOUND
                    || exec_limit.abs() >= SUM_OPERAND_BOUND
                    || accum0.abs() >= SUM_ACCUM_BOUND
                {
                    return Ok(());
                }
            }
            LoopTemplate::Product => {
                if counter < 1 || accum0 < 1 {
                    return Ok(());
                }
            }
            LoopTemplate::Counter | LoopTemplate::CountDown => {
                // The final counter lands at most one step past the limit.
                match exec_limit.checked_add(signed_step) {
                    Some(edge) if (INT_MIN..=INT_MAX).contains(&edge) => {}
                    _ => return Ok(()),
                }
            }
            LoopTemplate::Unknown => return Ok(()),
        }

        let code = IntLoopCode {
            template,
            ..analysis.int_loop_code
        };
        let mut scratch = IntLoopRegs {
            counter,
            limit: exec_limit,
            step: signed_step.abs(),
            accum: accum0,
        };
        if !jit::execute_int_loop(&code, &mut scratch) {
            return Ok(());
        }
        if !(INT_MIN..=INT_MAX).contains(&scratch.counter)
            || !(INT_MIN..=INT_MAX).contains(&scratch.accum)
        {
            return Ok(());
        }

        // Success: write the final state back and exit past the loop.
        self.exec.registers[base + analysis.counter_reg as usize] = Value::int(scratch.counter);
        if analysis.shape == LoopShape::NumericFor && scratch.counter != counter {
            let loop_var = scratch.counter - signed_step;
            self.exec.registers[base + analysis.counter_reg as usize + 3] = Value::int(loop_var);
        }
        if let Some(r) = analysis.accum_reg {
            self.exec.registers[base + r as usize] = Value::int(scratch.accum);
        }
        if let Some(g) = analysis.accum_global_idx {
            self.globals.set(g, Value::int(scratch.accum));
        }
        if let Some(cond) = analysis.cond_reg {
            self.exec.registers[base + cond as usize] = Value::FALSE;
        }
        if limit_from_const {
            self.exec.registers[base + analysis.limit_reg as usize] = Value::int(limit);
        }
        self.exec.frame_mut().pc = analysis.end_pc;
        tracing::trace!(loop_id, template = ?template, "compiled loop executed");
        Ok(())
    }
}
