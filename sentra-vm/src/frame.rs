//! Register file and call-frame layout.
//!
//! Each fiber owns a [`FiberCore`]: one contiguous register file plus the
//! frame stack. The call protocol itself (argument shuffling, arity checks,
//! tail calls) lives in `interpreter::flow`; this module owns the data and
//! the invariant-preserving primitives.

use crate::consts::{MAX_CALL_FRAMES, REGISTER_FILE_CEILING, REGISTER_FILE_INITIAL};
use crate::error::{RuntimeError, TraceFrame};
use crate::heap::{Heap, ObjId};
use crate::object::{Object, UpvalueState};
use crate::proto::FunctionProto;
use crate::value::Value;

use std::sync::Arc;

/// An installed error handler.
#[derive(Debug, Clone, Copy)]
pub struct TryFrame {
    /// Absolute pc of the handler inside the owning frame.
    pub handler_pc: usize,
    /// Register top to restore when the handler is entered.
    pub saved_top: usize,
}

/// One activation record.
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// The callee value, kept for stack traces and GC reachability.
    pub callee: Value,
    /// Prototype being executed.
    pub proto: Arc<FunctionProto>,
    /// Materialized constant table, shared with the callee object.
    pub consts: Arc<[Value]>,
    /// Offset of this frame's `R(0)` in the register file.
    pub base: usize,
    /// Saved program counter.
    pub pc: usize,
    /// Absolute register where results are copied on return.
    pub return_reg: usize,
    /// Result count the caller expects; `None` is open-ended.
    pub expected: Option<usize>,
    /// Error handlers installed by TRY, innermost last.
    pub tries: Vec<TryFrame>,
}

/// A fiber's register file and frame stack.
#[derive(Debug, Default)]
pub struct FiberCore {
    /// The register file; `base + local count` of every frame stays within.
    pub registers: Vec<Value>,
    /// One past the highest register in use.
    pub top: usize,
    /// Activation records, outermost first.
    pub frames: Vec<CallFrame>,
    /// Open upvalue cells pointing into `registers`, sorted by slot.
    pub open_upvalues: Vec<ObjId>,
}

impl FiberCore {
    /// A fresh core with the initial register file.
    pub fn new() -> Self {
        Self {
            registers: vec![Value::NIL; REGISTER_FILE_INITIAL],
            top: 0,
            frames: Vec::new(),
            open_upvalues: Vec::new(),
        }
    }

    /// The executing frame.
    pub fn frame(&self) -> &CallFrame {
        self.frames.last().expect("fiber core has no active frame")
    }

    /// The executing frame, mutably.
    pub fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("fiber core has no active frame")
    }

    /// Grow the register file (by doubling, up to the ceiling) so slots
    /// below `needed` are valid.
    pub fn reserve(&mut self, needed: usize) -> Result<(), RuntimeError> {
        if needed <= self.registers.len() {
            return Ok(());
        }
        if needed > REGISTER_FILE_CEILING {
            return Err(RuntimeError::stack_overflow("register file limit exceeded"));
        }
        let mut len = self.registers.len().max(1);
        while len < needed {
            len *= 2;
        }
        self.registers.resize(len.min(REGISTER_FILE_CEILING), Value::NIL);
        Ok(())
    }

    /// Whether another frame fits on the stack.
    pub fn check_frame_depth(&self) -> Result<(), RuntimeError> {
        if self.frames.len() >= MAX_CALL_FRAMES {
            Err(RuntimeError::stack_overflow("call stack limit exceeded"))
        } else {
            Ok(())
        }
    }

    /// Close every open upvalue whose slot is at or above `from`.
    ///
    /// The slot value moves into the upvalue's own storage; the slot may be
    /// reused immediately afterwards. Closing an already-closed upvalue is a
    /// no-op by construction: closed cells are removed from this list.
    pub fn close_upvalues(&mut self, heap: &mut Heap, from: usize) {
        let mut kept = Vec::with_capacity(self.open_upvalues.len());
        for id in self.open_upvalues.drain(..) {
            let slot = match heap.get(id) {
                Object::Upvalue(u) => match u.state {
                    UpvalueState::Open { slot, .. } => Some(slot),
                    UpvalueState::Closed(_) => None,
                },
                _ => None,
            };
            match slot {
                Some(slot) if slot >= from => {
                    let value = self.registers[slot];
                    if let Object::Upvalue(u) = heap.get_mut(id) {
                        u.state = UpvalueState::Closed(value);
                    }
                }
                Some(_) => kept.push(id),
                None => {}
            }
        }
        self.open_upvalues = kept;
    }

    /// Capture the live stack for an error, innermost frame first.
    pub fn capture_trace(&self) -> Vec<TraceFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| TraceFrame {
                function: frame.proto.name.clone(),
                pc: frame.pc as u32,
            })
            .collect()
    }

    /// Enumerate every heap object reachable from this core.
    pub fn trace(&self, mark: &mut dyn FnMut(ObjId)) {
        for v in &self.registers[..self.top] {
            if v.is_obj() {
                mark(v.as_obj());
            }
        }
        for frame in &self.frames {
            if frame.callee.is_obj() {
                mark(frame.callee.as_obj());
            }
        }
        for id in &self.open_upvalues {
            mark(*id);
        }
    }
}

/// Shared helper: the prototype and materialized constants of a callee
/// value, when it is a function or closure.
pub fn callee_parts(heap: &Heap, callee: Value) -> Option<(Arc<FunctionProto>, Arc<[Value]>)> {
    if !callee.is_obj() {
        return None;
    }
    match heap.get(callee.as_obj()) {
        Object::Function(f) => Some((f.proto.clone(), f.consts.clone())),
        Object::Closure(c) => Some((c.proto.clone(), c.consts.clone())),
        _ => None,
    }
}
