//! Loop pattern analyzer and the specialized integer-loop executor.
//!
//! "Compilation" here selects a closed integer loop over `i64` scratch
//! registers instead of emitting machine code. The contract is strict
//! deopt-equivalence: for any input satisfying a template's preconditions,
//! the executor must leave exactly the register state the generic
//! interpreter would have produced, and every input it cannot prove returns
//! `false` so the interpreter runs the loop generically.

use crate::consts::{LOOP_CACHE_MAX, MAX_ANALYZED_BODY};
use crate::value::Value;

use sentra_asm::{Instruction, Opcode};

use std::collections::HashMap;
use std::sync::Arc;

/// Shape a loop body was classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopTemplate {
    /// Pure counting, no live body effect.
    Counter,
    /// Accumulator `+=` counter.
    Sum,
    /// Accumulator `*=` counter.
    Product,
    /// Pure counting with a negative step.
    CountDown,
    /// Not specializable; always interpreted.
    Unknown,
}

/// Loop construct the analysis was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopShape {
    /// FORPREP/FORLOOP numeric loop.
    NumericFor,
    /// Head-tested while loop with a unit-step counter.
    WhileSum,
}

/// Register assignment handed to [`execute_int_loop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLoopCode {
    /// Selected template.
    pub template: LoopTemplate,
    /// Counter register, frame-relative.
    pub counter: u8,
    /// Limit register, frame-relative.
    pub limit: u8,
    /// Step register for numeric for loops; while loops step by one.
    pub step: Option<u8>,
    /// Accumulator register for Sum/Product.
    pub accum: Option<u8>,
    /// Limit value captured from a LOADK in the loop head, so the compiled
    /// path does not depend on the skipped load having run.
    pub limit_const: Option<i64>,
}

/// Everything `JMP_INTLOOP` needs to run and exit a specialized loop.
#[derive(Debug, Clone)]
pub struct LoopAnalysis {
    /// Selected template; `Unknown` analyses are cached to avoid rescanning.
    pub template: LoopTemplate,
    /// First instruction of the loop construct.
    pub start_pc: usize,
    /// First instruction after the loop construct.
    pub end_pc: usize,
    /// Counter register.
    pub counter_reg: u8,
    /// Limit register.
    pub limit_reg: u8,
    /// Step register, for numeric for loops.
    pub step_reg: Option<u8>,
    /// Accumulator register, if the template has one.
    pub accum_reg: Option<u8>,
    /// Global id of a global accumulator, when the body accumulates through
    /// GETGLOBAL/SETGLOBAL instead of a register.
    pub accum_global_idx: Option<u16>,
    /// Head-comparison result register of a while loop, reset to `false` on
    /// the compiled exit path.
    pub cond_reg: Option<u8>,
    /// Whether the while head compared with LE rather than LT.
    pub inclusive: bool,
    /// Loop id, as carried by HOTLOOP/JMP_INTLOOP.
    pub loop_id: u32,
    /// Construct shape.
    pub shape: LoopShape,
    /// Register assignment for the executor.
    pub int_loop_code: IntLoopCode,
}

impl LoopAnalysis {
    fn unknown(start_pc: usize, loop_id: u32) -> Self {
        Self {
            template: LoopTemplate::Unknown,
            start_pc,
            end_pc: start_pc,
            counter_reg: 0,
            limit_reg: 0,
            step_reg: None,
            accum_reg: None,
            accum_global_idx: None,
            cond_reg: None,
            inclusive: false,
            loop_id,
            shape: LoopShape::NumericFor,
            int_loop_code: IntLoopCode {
                template: LoopTemplate::Unknown,
                counter: 0,
                limit: 0,
                step: None,
                accum: None,
                limit_const: None,
            },
        }
    }
}

/// Scratch registers of the integer executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntLoopRegs {
    /// Counter.
    pub counter: i64,
    /// Exclusive (CountUp/Sum) or inclusive (Product) limit, pre-adjusted by
    /// the caller.
    pub limit: i64,
    /// Step magnitude; must be positive.
    pub step: i64,
    /// Accumulator.
    pub accum: i64,
}

/// Opcodes whose presence in a body disqualifies specialization.
const SIDE_EFFECT_OPS: &[Opcode] = &[
    Opcode::CALL,
    Opcode::TAILCALL,
    Opcode::PRINT,
    Opcode::SETGLOBAL,
    Opcode::SETTABLE,
    Opcode::SETTABLEK,
    Opcode::APPEND,
    Opcode::THROW,
    Opcode::TRY,
    Opcode::YIELD,
    Opcode::RESUME,
];

/// Opcodes that neither read nor write loop state.
const NEUTRAL_OPS: &[Opcode] = &[Opcode::HOTLOOP, Opcode::NOP, Opcode::FUNCENTRY];

/// Run the specialized loop. Returns `false` (scratch state is then
/// discarded) whenever a precondition fails: non-positive step, an unknown
/// template, or arithmetic that would leave the 48-bit integer domain the
/// generic interpreter promotes out of.
pub fn execute_int_loop(code: &IntLoopCode, regs: &mut IntLoopRegs) -> bool {
    if code.template != LoopTemplate::Unknown && regs.step <= 0 {
        return false;
    }
    match code.template {
        LoopTemplate::Counter => {
            while regs.counter < regs.limit {
                let Some(next) = regs.counter.checked_add(regs.step) else {
                    return false;
                };
                regs.counter = next;
            }
            true
        }
        LoopTemplate::CountDown => {
            while regs.counter > regs.limit {
                let Some(next) = regs.counter.checked_sub(regs.step) else {
                    return false;
                };
                regs.counter = next;
            }
            true
        }
        LoopTemplate::Sum => {
            while regs.counter < regs.limit {
                let Some(sum) = regs.accum.checked_add(regs.counter) else {
                    return false;
                };
                regs.accum = sum;
                let Some(next) = regs.counter.checked_add(regs.step) else {
                    return false;
                };
                regs.counter = next;
            }
            true
        }
        LoopTemplate::Product => {
            while regs.counter <= regs.limit {
                let Some(product) = regs.accum.checked_mul(regs.counter) else {
                    return false;
                };
                regs.accum = product;
                let Some(next) = regs.counter.checked_add(regs.step) else {
                    return false;
                };
                regs.counter = next;
            }
            true
        }
        LoopTemplate::Unknown => false,
    }
}

/// Classify the loop starting at `start_pc`.
///
/// `consts` is the materialized constant table of the enclosing function,
/// used to capture integer limits loaded in the loop head.
pub fn analyze_loop(
    code: &[Instruction],
    consts: &[Value],
    start_pc: usize,
    loop_id: u32,
) -> LoopAnalysis {
    let analysis = match code.get(start_pc).map(|i| i.op()) {
        Some(op) if op == Opcode::FORPREP as u8 => analyze_numeric_for(code, start_pc, loop_id),
        _ => analyze_while(code, consts, start_pc, loop_id),
    };
    tracing::debug!(
        loop_id,
        start_pc,
        template = ?analysis.template,
        "loop analyzed"
    );
    analysis
}

fn opcode_of(instr: Instruction) -> Option<Opcode> {
    instr.opcode().ok()
}

fn is_side_effect(op: Opcode) -> bool {
    SIDE_EFFECT_OPS.contains(&op)
}

fn is_neutral(op: Opcode) -> bool {
    NEUTRAL_OPS.contains(&op)
}

fn analyze_numeric_for(code: &[Instruction], start_pc: usize, loop_id: u32) -> LoopAnalysis {
    let prep = code[start_pc];
    let base = prep.a();
    let forloop_pc = start_pc.wrapping_add(1).wrapping_add(prep.sbx() as usize);

    let Some(forloop) = code.get(forloop_pc) else {
        return LoopAnalysis::unknown(start_pc, loop_id);
    };
    if forloop.op() != Opcode::FORLOOP as u8 || forloop.a() != base {
        return LoopAnalysis::unknown(start_pc, loop_id);
    }

    let body = &code[start_pc + 1..forloop_pc];
    if body.len() > MAX_ANALYZED_BODY {
        return LoopAnalysis::unknown(start_pc, loop_id);
    }

    let loop_var = base + 3;
    let mut accum: Option<u8> = None;
    let mut template = LoopTemplate::Counter;

    for instr in body {
        let Some(op) = opcode_of(*instr) else {
            return LoopAnalysis::unknown(start_pc, loop_id);
        };
        if is_side_effect(op) {
            return LoopAnalysis::unknown(start_pc, loop_id);
        }
        if is_neutral(op) {
            continue;
        }
        match op {
            Opcode::ADD if template == LoopTemplate::Counter => {
                // Accepted shape: accum += loop variable.
                let (a, b, c) = (instr.a(), instr.b(), instr.c());
                if a == b && c == loop_var || a == c && b == loop_var {
                    template = LoopTemplate::Sum;
                    accum = Some(a);
                } else {
                    return LoopAnalysis::unknown(start_pc, loop_id);
                }
            }
            Opcode::MUL if template == LoopTemplate::Counter => {
                let (a, b, c) = (instr.a(), instr.b(), instr.c());
                if a == b && c == loop_var || a == c && b == loop_var {
                    template = LoopTemplate::Product;
                    accum = Some(a);
                } else {
                    return LoopAnalysis::unknown(start_pc, loop_id);
                }
            }
            // A second arithmetic op, or anything else live, is unknown.
            _ => return LoopAnalysis::unknown(start_pc, loop_id),
        }
    }

    LoopAnalysis {
        template,
        start_pc,
        end_pc: forloop_pc + 1,
        counter_reg: base,
        limit_reg: base + 1,
        step_reg: Some(base + 2),
        accum_reg: accum,
        accum_global_idx: None,
        cond_reg: None,
        inclusive: true,
        loop_id,
        shape: LoopShape::NumericFor,
        int_loop_code: IntLoopCode {
            template,
            counter: base,
            limit: base + 1,
            step: Some(base + 2),
            accum,
            limit_const: None,
        },
    }
}

/// Match the `while counter < limit { accum += counter; counter += 1 }`
/// family: optional LOADK of the limit, a LT/LE head writing a boolean, a
/// TEST, a forward JMP to the exit, an accumulate (register or global), a
/// unit counter increment, and a backward JMP to the head.
fn analyze_while(
    code: &[Instruction],
    consts: &[Value],
    start_pc: usize,
    loop_id: u32,
) -> LoopAnalysis {
    let mut pc = start_pc;
    let mut limit_const = None;

    // Optional constant load of the limit in the head.
    if let Some(instr) = code.get(pc) {
        if instr.op() == Opcode::LOADK as u8 {
            if let Some(v) = consts.get(instr.bx() as usize) {
                if v.is_int() {
                    limit_const = Some(v.as_int());
                }
            }
            pc += 1;
        }
    }

    let Some(cmp) = code.get(pc) else {
        return LoopAnalysis::unknown(start_pc, loop_id);
    };
    let inclusive = match cmp.opcode() {
        Ok(Opcode::LT) => false,
        Ok(Opcode::LE) => true,
        _ => return LoopAnalysis::unknown(start_pc, loop_id),
    };
    let (cond_reg, counter, limit) = (cmp.a(), cmp.b(), cmp.c());

    let test_ok = code
        .get(pc + 1)
        .is_some_and(|i| i.op() == Opcode::TEST as u8 && i.a() == cond_reg && i.c() == 0);
    if !test_ok {
        return LoopAnalysis::unknown(start_pc, loop_id);
    }
    let Some(exit_jmp) = code.get(pc + 2) else {
        return LoopAnalysis::unknown(start_pc, loop_id);
    };
    if exit_jmp.op() != Opcode::JMP as u8 || exit_jmp.sbx() <= 0 {
        return LoopAnalysis::unknown(start_pc, loop_id);
    }
    let end_pc = pc + 3 + exit_jmp.sbx() as usize;

    // Locate the backward jump that closes the loop.
    let body_start = pc + 3;
    let mut back_jmp_pc = None;
    for (offset, instr) in code[body_start..end_pc.min(code.len())].iter().enumerate() {
        if instr.op() == Opcode::JMP as u8 && instr.sbx() < 0 {
            let target = body_start + offset + 1;
            let target = target.wrapping_add(instr.sbx() as usize);
            if target == start_pc {
                back_jmp_pc = Some(body_start + offset);
                break;
            }
        }
    }
    let Some(back_jmp_pc) = back_jmp_pc else {
        return LoopAnalysis::unknown(start_pc, loop_id);
    };

    let body = &code[body_start..back_jmp_pc];
    if body.len() > MAX_ANALYZED_BODY {
        return LoopAnalysis::unknown(start_pc, loop_id);
    }

    let mut accum_reg = None;
    let mut accum_global = None;
    let mut add_seen_at = None;
    let mut incr_seen_at = None;

    let mut i = 0;
    while i < body.len() {
        let instr = body[i];
        let Some(op) = opcode_of(instr) else {
            return LoopAnalysis::unknown(start_pc, loop_id);
        };
        match op {
            _ if is_neutral(op) => {}
            // accum += counter, in place.
            Opcode::ADD
                if add_seen_at.is_none()
                    && instr.a() == instr.b()
                    && instr.c() == counter =>
            {
                accum_reg = Some(instr.a());
                add_seen_at = Some(i);
            }
            // accum += counter through a temporary: ADD t, accum, counter; MOVE accum, t.
            Opcode::ADD
                if add_seen_at.is_none()
                    && body.get(i + 1).map(|i| i.op()) == Some(Opcode::MOVE as u8)
                    && body[i + 1].b() == instr.a()
                    && body[i + 1].a() == instr.b()
                    && instr.c() == counter =>
            {
                accum_reg = Some(body[i + 1].a());
                add_seen_at = Some(i);
                i += 1;
            }
            // Global accumulator: GETGLOBAL t, g; ADD t, t, counter; SETGLOBAL t, g.
            Opcode::GETGLOBAL
                if add_seen_at.is_none()
                    && body.get(i + 1).map(|i| i.op()) == Some(Opcode::ADD as u8)
                    && body.get(i + 2).map(|i| i.op()) == Some(Opcode::SETGLOBAL as u8)
                    && body[i + 1].a() == instr.a()
                    && body[i + 1].b() == instr.a()
                    && body[i + 1].c() == counter
                    && body[i + 2].a() == instr.a()
                    && body[i + 2].bx() == instr.bx() =>
            {
                accum_global = Some(instr.bx());
                add_seen_at = Some(i);
                i += 2;
            }
            // Unit counter increment.
            Opcode::INCR if instr.a() == counter && incr_seen_at.is_none() => {
                incr_seen_at = Some(i);
            }
            Opcode::ADDI
                if instr.a() == counter
                    && instr.b() == counter
                    && instr.sc() == 1
                    && incr_seen_at.is_none() =>
            {
                incr_seen_at = Some(i);
            }
            Opcode::ADDK
                if instr.a() == counter
                    && instr.b() == counter
                    && incr_seen_at.is_none()
                    && consts.get(instr.c() as usize).is_some_and(|v| v.is_int() && v.as_int() == 1) =>
            {
                incr_seen_at = Some(i);
            }
            _ => return LoopAnalysis::unknown(start_pc, loop_id),
        }
        i += 1;
    }

    let Some(incr_at) = incr_seen_at else {
        return LoopAnalysis::unknown(start_pc, loop_id);
    };
    let template = match add_seen_at {
        // The accumulate must precede the increment so each addend is the
        // pre-increment counter, as the generic order produces.
        Some(add_at) if add_at < incr_at => LoopTemplate::Sum,
        Some(_) => return LoopAnalysis::unknown(start_pc, loop_id),
        None => LoopTemplate::Counter,
    };

    LoopAnalysis {
        template,
        start_pc,
        end_pc,
        counter_reg: counter,
        limit_reg: limit,
        step_reg: None,
        accum_reg,
        accum_global_idx: accum_global,
        cond_reg: Some(cond_reg),
        inclusive,
        loop_id,
        shape: LoopShape::WhileSum,
        int_loop_code: IntLoopCode {
            template,
            counter,
            limit,
            step: None,
            accum: accum_reg,
            limit_const,
        },
    }
}

/// Bounded cache of loop analyses, keyed by loop id.
///
/// Mutated only on hotness-threshold crossings, which happen under the
/// profiler lock; reads are the common case.
#[derive(Debug, Default)]
pub struct LoopCache {
    entries: HashMap<u32, Arc<LoopAnalysis>>,
}

impl LoopCache {
    /// Cached analysis for `loop_id`.
    pub fn get(&self, loop_id: u32) -> Option<&Arc<LoopAnalysis>> {
        self.entries.get(&loop_id)
    }

    /// Install an analysis unless the cache is full.
    pub fn insert(&mut self, analysis: LoopAnalysis) {
        if self.entries.len() < LOOP_CACHE_MAX || self.entries.contains_key(&analysis.loop_id) {
            self.entries.insert(analysis.loop_id, Arc::new(analysis));
        }
    }

    /// Number of cached analyses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentra_asm::op;

    #[test]
    fn executor_rejects_non_positive_steps() {
        let code = IntLoopCode {
            template: LoopTemplate::Counter,
            counter: 0,
            limit: 1,
            step: Some(2),
            accum: None,
            limit_const: None,
        };
        let mut regs = IntLoopRegs { counter: 0, limit: 10, step: 0, accum: 0 };
        assert!(!execute_int_loop(&code, &mut regs));
        regs.step = -1;
        assert!(!execute_int_loop(&code, &mut regs));
    }

    #[test]
    fn sum_template_matches_the_naive_loop() {
        let code = IntLoopCode {
            template: LoopTemplate::Sum,
            counter: 0,
            limit: 1,
            step: None,
            accum: Some(2),
            limit_const: None,
        };
        for (start, limit, step) in [(1, 11, 1), (0, 100, 3), (5, 5, 1), (-4, 9, 2)] {
            let mut regs = IntLoopRegs { counter: start, limit, step, accum: 0 };
            assert!(execute_int_loop(&code, &mut regs));

            let (mut counter, mut accum) = (start, 0i64);
            while counter < limit {
                accum += counter;
                counter += step;
            }
            assert_eq!(regs.accum, accum);
            assert_eq!(regs.counter, counter);
        }
    }

    #[test]
    fn product_template_is_inclusive() {
        let code = IntLoopCode {
            template: LoopTemplate::Product,
            counter: 0,
            limit: 1,
            step: None,
            accum: Some(2),
            limit_const: None,
        };
        let mut regs = IntLoopRegs { counter: 1, limit: 10, step: 1, accum: 1 };
        assert!(execute_int_loop(&code, &mut regs));
        assert_eq!(regs.accum, 3_628_800);
        assert_eq!(regs.counter, 11);
    }

    #[test]
    fn overflow_deoptimizes_instead_of_wrapping() {
        let code = IntLoopCode {
            template: LoopTemplate::Product,
            counter: 0,
            limit: 1,
            step: None,
            accum: Some(2),
            limit_const: None,
        };
        let mut regs = IntLoopRegs { counter: 1, limit: 30, step: 1, accum: 1 };
        assert!(!execute_int_loop(&code, &mut regs));
    }

    fn sum_for_loop() -> Vec<Instruction> {
        // R0 accum, R2 counter, R3 limit, R4 step, R5 loop var.
        vec![
            op::forprep(2, 1),
            op::add(0, 0, 5),
            op::forloop(2, -2),
            op::ret(0, 2, 0),
        ]
    }

    #[test]
    fn for_loop_sum_is_recognized() {
        let analysis = analyze_loop(&sum_for_loop(), &[], 0, 7);
        assert_eq!(analysis.template, LoopTemplate::Sum);
        assert_eq!(analysis.shape, LoopShape::NumericFor);
        assert_eq!(analysis.counter_reg, 2);
        assert_eq!(analysis.limit_reg, 3);
        assert_eq!(analysis.step_reg, Some(4));
        assert_eq!(analysis.accum_reg, Some(0));
        assert_eq!(analysis.end_pc, 3);
        assert_eq!(analysis.loop_id, 7);
    }

    #[test]
    fn empty_for_body_is_a_counter() {
        let code = vec![op::forprep(1, 0), op::forloop(1, -1), op::ret(0, 1, 0)];
        let analysis = analyze_loop(&code, &[], 0, 1);
        assert_eq!(analysis.template, LoopTemplate::Counter);
    }

    #[test]
    fn side_effects_disqualify_a_for_body() {
        let code = vec![
            op::forprep(1, 2),
            op::add(0, 0, 4),
            op::print(0, 0, 0),
            op::forloop(1, -3),
        ];
        let analysis = analyze_loop(&code, &[], 0, 2);
        assert_eq!(analysis.template, LoopTemplate::Unknown);
    }

    #[test]
    fn mixed_add_and_mul_is_unknown() {
        let code = vec![
            op::forprep(1, 3),
            op::add(0, 0, 4),
            op::mul(0, 0, 4),
            op::nop(0),
            op::forloop(1, -4),
        ];
        assert_eq!(analyze_loop(&code, &[], 0, 3).template, LoopTemplate::Unknown);
    }

    #[test]
    fn oversized_bodies_are_unknown() {
        let body_len = MAX_ANALYZED_BODY + 1;
        let mut code = vec![op::forprep(1, body_len as i32)];
        code.extend(std::iter::repeat(op::nop(0)).take(body_len));
        code.push(op::forloop(1, -(body_len as i32) - 1));
        assert_eq!(analyze_loop(&code, &[], 0, 4).template, LoopTemplate::Unknown);
    }

    #[test]
    fn while_sum_is_recognized_with_constant_limit() {
        let consts = [Value::int(100)];
        // R0 accum, R1 counter, R2 limit, R3 cond.
        let code = vec![
            op::loadk(2, 0),
            op::lt(3, 1, 2),
            op::test(3, 0, 0),
            op::jmp(0, 3),
            op::add(0, 0, 1),
            op::addi(1, 1, 1),
            op::jmp(0, -7),
            op::ret(0, 2, 0),
        ];
        let analysis = analyze_loop(&code, &consts, 0, 11);
        assert_eq!(analysis.template, LoopTemplate::Sum);
        assert_eq!(analysis.shape, LoopShape::WhileSum);
        assert_eq!(analysis.counter_reg, 1);
        assert_eq!(analysis.accum_reg, Some(0));
        assert_eq!(analysis.cond_reg, Some(3));
        assert_eq!(analysis.int_loop_code.limit_const, Some(100));
        assert_eq!(analysis.end_pc, 7);
        assert!(!analysis.inclusive);
    }

    #[test]
    fn while_with_global_accumulator_captures_the_global_id() {
        let consts = [Value::int(10)];
        let code = vec![
            op::loadk(2, 0),
            op::lt(3, 1, 2),
            op::test(3, 0, 0),
            op::jmp(0, 5),
            op::getglobal(4, 6),
            op::add(4, 4, 1),
            op::setglobal(4, 6),
            op::incr(1, 0, 0),
            op::jmp(0, -9),
            op::ret(0, 1, 0),
        ];
        let analysis = analyze_loop(&code, &consts, 0, 12);
        assert_eq!(analysis.template, LoopTemplate::Sum);
        assert_eq!(analysis.accum_global_idx, Some(6));
        assert_eq!(analysis.accum_reg, None);
    }

    #[test]
    fn increment_before_accumulate_is_unknown() {
        let consts = [Value::int(10)];
        let code = vec![
            op::loadk(2, 0),
            op::lt(3, 1, 2),
            op::test(3, 0, 0),
            op::jmp(0, 3),
            op::addi(1, 1, 1),
            op::add(0, 0, 1),
            op::jmp(0, -7),
            op::ret(0, 1, 0),
        ];
        assert_eq!(analyze_loop(&code, &consts, 0, 13).template, LoopTemplate::Unknown);
    }

    #[test]
    fn cache_is_bounded() {
        let mut cache = LoopCache::default();
        for id in 0..(LOOP_CACHE_MAX as u32 + 32) {
            let mut analysis = LoopAnalysis::unknown(0, id);
            analysis.loop_id = id;
            cache.insert(analysis);
        }
        assert_eq!(cache.len(), LOOP_CACHE_MAX);
        assert!(cache.get(0).is_some());
        assert!(cache.get(LOOP_CACHE_MAX as u32 + 1).is_none());
    }
}
