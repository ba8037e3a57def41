//! Cooperative fiber scheduling.
//!
//! Exactly one core executes at a time. RESUME parks the resumer's register
//! file (into its fiber object, or into `parked_main` for the main fiber)
//! and installs the target's; YIELD and fiber termination reverse the swap.
//! The resume/yield topology is therefore a chain of parked cores linked by
//! the fibers' parent references.

use super::Interpreter;
use crate::error::{ErrorKind, RuntimeError};
use crate::frame::{callee_parts, FiberCore};
use crate::heap::ObjId;
use crate::object::{ObjFiber, Object};
use crate::state::{ExecuteState, FiberState};
use crate::value::Value;

impl Interpreter {
    /// FIBER(A, B): wrap closure `R(B)` in a new fiber.
    pub(crate) fn make_fiber(&mut self, entry: Value) -> Result<Value, RuntimeError> {
        if !entry.is_function(&self.heap) {
            return Err(RuntimeError::type_error(format!(
                "fiber entry must be a function, got {}",
                entry.type_name(&self.heap)
            )));
        }
        let fiber = Object::Fiber(ObjFiber {
            state: FiberState::New,
            core: None,
            parent: None,
            entry,
            resume_dst: 0,
            yield_dst: None,
            pending_throw: None,
        });
        Ok(Value::object(self.heap.alloc(fiber)))
    }

    /// RESUME(A, B, C): transfer control into fiber `R(B)`.
    pub(crate) fn fiber_resume(&mut self, a: u8, b: u8, c: u8) -> Result<ExecuteState, RuntimeError> {
        let fiber_val = self.reg(b);
        if !fiber_val.is_fiber(&self.heap) {
            return Err(RuntimeError::type_error(format!(
                "cannot resume {}",
                fiber_val.type_name(&self.heap)
            )));
        }
        let target = fiber_val.as_obj();
        let state = match self.heap.get(target) {
            Object::Fiber(f) => f.state,
            _ => unreachable!("checked fiber kind"),
        };
        let resume_dst = self.abs_reg(a);

        match state {
            FiberState::Dead => Err(RuntimeError::fiber("cannot resume a dead fiber")),
            FiberState::Running => Err(RuntimeError::fiber("fiber is already running")),
            FiberState::New => {
                let args: Vec<Value> = (1..=c).map(|i| self.reg(b + i)).collect();
                let entry = match self.heap.get(target) {
                    Object::Fiber(f) => f.entry,
                    _ => unreachable!("checked fiber kind"),
                };
                let (proto, consts) = callee_parts(&self.heap, entry)
                    .ok_or_else(|| RuntimeError::fiber("fiber entry is not callable"))?;
                // Validate before any state is disturbed.
                if !proto.is_variadic() && args.len() != proto.arity as usize {
                    return Err(RuntimeError::arity(format!(
                        "{} expects {} argument(s), got {}",
                        proto.name,
                        proto.arity,
                        args.len()
                    )));
                }

                self.park_current(target, resume_dst);
                self.exec = FiberCore::new();
                self.push_initial_frame(entry, proto.clone(), consts)?;
                let base = self.exec.frame().base;
                self.exec.reserve(base + args.len() + 1)?;
                for (i, arg) in args.iter().enumerate() {
                    self.exec.registers[base + i] = *arg;
                }
                self.bind_fiber_varargs(&proto, args.len())?;
                tracing::trace!(?target, "fiber started");
                self.take_pending_throw(target)
            }
            FiberState::Suspended => {
                let resume_arg = if c >= 1 { self.reg(b + 1) } else { Value::NIL };
                self.park_current(target, resume_dst);

                let (core, yield_dst) = match self.heap.get_mut(target) {
                    Object::Fiber(f) => (f.core.take(), f.yield_dst.take()),
                    _ => unreachable!("checked fiber kind"),
                };
                self.exec = *core.expect("suspended fiber has a parked core");
                if let Some(slot) = yield_dst {
                    self.exec.registers[slot] = resume_arg;
                }
                tracing::trace!(?target, "fiber resumed");
                self.take_pending_throw(target)
            }
        }
    }

    fn bind_fiber_varargs(
        &mut self,
        proto: &crate::proto::FunctionProto,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        if proto.is_variadic() {
            let base = self.exec.frame().base;
            let arity = proto.arity as usize;
            let surplus: Vec<Value> = if argc > arity {
                self.exec.registers[base + arity..base + argc].to_vec()
            } else {
                Vec::new()
            };
            for slot in &mut self.exec.registers[base + arity..base + argc.max(arity)] {
                *slot = Value::NIL;
            }
            let rest = self.heap.new_array(surplus);
            self.exec.registers[base + arity] = rest;
        }
        Ok(())
    }

    /// Deliver a cancellation scheduled by `throw_into`, if one is pending.
    fn take_pending_throw(&mut self, target: ObjId) -> Result<ExecuteState, RuntimeError> {
        let pending = match self.heap.get_mut(target) {
            Object::Fiber(f) => f.pending_throw.take(),
            _ => None,
        };
        match pending {
            Some(value) => {
                let message = value.to_text(&self.heap);
                self.thrown = Some(value);
                Err(RuntimeError::new(ErrorKind::User, message))
            }
            None => Ok(ExecuteState::Proceed),
        }
    }

    /// Park the executing core and make `target` current.
    fn park_current(&mut self, target: ObjId, resume_dst: usize) {
        let old_core = std::mem::take(&mut self.exec);
        match self.current_fiber {
            None => self.parked_main = Some(Box::new(old_core)),
            Some(id) => {
                if let Object::Fiber(f) = self.heap.get_mut(id) {
                    // The resumer stays Running: it is blocked, not parked at
                    // a yield.
                    f.core = Some(Box::new(old_core));
                }
            }
        }
        let parent = self.current_fiber;
        if let Object::Fiber(f) = self.heap.get_mut(target) {
            f.parent = parent;
            f.resume_dst = resume_dst;
            f.state = FiberState::Running;
        }
        self.current_fiber = Some(target);
        self.varargs_top = None;
    }

    /// YIELD(A): suspend and hand `R(A)` to the resumer.
    pub(crate) fn fiber_yield(&mut self, a: u8) -> Result<ExecuteState, RuntimeError> {
        let Some(current) = self.current_fiber else {
            return Err(RuntimeError::fiber("yield outside a fiber"));
        };
        let value = self.reg(a);
        let yield_slot = self.abs_reg(a);

        let parked = std::mem::take(&mut self.exec);
        let (parent, resume_dst) = match self.heap.get_mut(current) {
            Object::Fiber(f) => {
                f.core = Some(Box::new(parked));
                f.state = FiberState::Suspended;
                f.yield_dst = Some(yield_slot);
                (f.parent, f.resume_dst)
            }
            _ => unreachable!("current fiber is not a fiber object"),
        };

        self.switch_back(parent);
        self.exec.registers[resume_dst] = value;
        tracing::trace!(?current, "fiber yielded");
        Ok(ExecuteState::Yield(value))
    }

    /// The current fiber's bottom frame returned `value`.
    pub(crate) fn fiber_return(&mut self, value: Value) {
        let current = self
            .current_fiber
            .expect("fiber_return called on the main fiber");
        let (parent, resume_dst) = match self.heap.get_mut(current) {
            Object::Fiber(f) => {
                f.state = FiberState::Dead;
                f.core = None;
                f.yield_dst = None;
                (f.parent, f.resume_dst)
            }
            _ => unreachable!("current fiber is not a fiber object"),
        };
        self.switch_back(parent);
        self.exec.registers[resume_dst] = value;
        tracing::trace!(?current, "fiber returned");
    }

    /// The current fiber died with an uncaught `error`; the pending RESUME
    /// in the parent evaluates to the error value.
    pub(crate) fn fiber_die(&mut self, error: Value) {
        let current = self
            .current_fiber
            .expect("fiber_die called on the main fiber");
        let (parent, resume_dst) = match self.heap.get_mut(current) {
            Object::Fiber(f) => {
                f.state = FiberState::Dead;
                f.core = None;
                f.yield_dst = None;
                (f.parent, f.resume_dst)
            }
            _ => unreachable!("current fiber is not a fiber object"),
        };
        self.switch_back(parent);
        self.exec.registers[resume_dst] = error;
        tracing::trace!(?current, "fiber died");
    }

    /// Reinstall the parent's core; the dead/suspended child's core has
    /// already been parked or dropped.
    fn switch_back(&mut self, parent: Option<ObjId>) {
        let core = match parent {
            None => *self
                .parked_main
                .take()
                .expect("main core is parked while a fiber runs"),
            Some(id) => match self.heap.get_mut(id) {
                Object::Fiber(f) => *f.core.take().expect("resuming parent has a parked core"),
                _ => unreachable!("parent is not a fiber object"),
            },
        };
        self.exec = core;
        self.current_fiber = parent;
        self.varargs_top = None;
    }
}
