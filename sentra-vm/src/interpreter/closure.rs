//! Closure construction and upvalue access.
//!
//! Upvalues are independently allocated cells. An open cell names the owning
//! fiber and an absolute register slot; closing moves the slot's value into
//! the cell. Frames close their upvalues on every exit path (return, tail
//! call, unwind), so observers transparently switch to the new storage.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::heap::ObjId;
use crate::object::{ObjClosure, ObjUpvalue, Object, UpvalueState};
use crate::value::Value;

impl Interpreter {
    /// CLOSURE(A, Bx): instantiate nested prototype `Bx`.
    pub(crate) fn make_closure(&mut self, proto_index: usize) -> Result<Value, RuntimeError> {
        let (proto, parent_upvalues, base) = {
            let frame = self.exec.frame();
            let proto = frame.proto.protos.get(proto_index).cloned().ok_or_else(|| {
                RuntimeError::value(format!("prototype index {proto_index} out of range"))
            })?;
            let parent_upvalues = match frame.callee.kind(&self.heap) {
                Some(crate::object::ObjKind::Closure) => {
                    match self.heap.get(frame.callee.as_obj()) {
                        Object::Closure(c) => c.upvalues.clone(),
                        _ => unreachable!("checked closure kind"),
                    }
                }
                _ => Vec::new(),
            };
            (proto, parent_upvalues, frame.base)
        };

        let mut upvalues = Vec::with_capacity(proto.upvals.len());
        for desc in &proto.upvals {
            let cell = if desc.is_local {
                self.capture_upvalue(base + desc.index as usize)
            } else {
                parent_upvalues
                    .get(desc.index as usize)
                    .copied()
                    .ok_or_else(|| {
                        RuntimeError::value(format!(
                            "upvalue index {} out of range in {}",
                            desc.index, proto.name
                        ))
                    })?
            };
            upvalues.push(cell);
        }

        let consts = self.heap.materialize_consts(&proto);
        let closure = Object::Closure(ObjClosure {
            proto,
            consts,
            upvalues,
        });
        Ok(Value::object(self.heap.alloc(closure)))
    }

    /// Find the open upvalue for `slot`, or create one. Sharing the cell is
    /// what makes two closures over the same variable observe each other's
    /// writes.
    fn capture_upvalue(&mut self, slot: usize) -> ObjId {
        for id in &self.exec.open_upvalues {
            if let Object::Upvalue(u) = self.heap.get(*id) {
                if matches!(u.state, UpvalueState::Open { slot: s, .. } if s == slot) {
                    return *id;
                }
            }
        }
        let id = self.heap.alloc(Object::Upvalue(ObjUpvalue {
            state: UpvalueState::Open {
                owner: self.current_fiber,
                slot,
            },
        }));
        self.exec.open_upvalues.push(id);
        id
    }

    fn upvalue_cell(&self, index: u8) -> Result<ObjId, RuntimeError> {
        let frame = self.exec.frame();
        match self.heap.get(frame.callee.as_obj()) {
            Object::Closure(c) => c.upvalues.get(index as usize).copied().ok_or_else(|| {
                RuntimeError::value(format!("upvalue index {index} out of range"))
            }),
            _ => Err(RuntimeError::value(
                "GETUPVAL/SETUPVAL outside a closure frame",
            )),
        }
    }

    /// GETUPVAL(A, B): read upvalue `B`.
    pub(crate) fn get_upvalue(&mut self, index: u8) -> Result<Value, RuntimeError> {
        let cell = self.upvalue_cell(index)?;
        match self.heap.get(cell) {
            Object::Upvalue(u) => match u.state {
                UpvalueState::Closed(v) => Ok(v),
                UpvalueState::Open { owner, slot } => Ok(self.read_fiber_slot(owner, slot)),
            },
            _ => unreachable!("upvalue cell holds a non-upvalue"),
        }
    }

    /// SETUPVAL(A, B): write upvalue `B`.
    pub(crate) fn set_upvalue(&mut self, index: u8, value: Value) -> Result<(), RuntimeError> {
        let cell = self.upvalue_cell(index)?;
        let open = match self.heap.get_mut(cell) {
            Object::Upvalue(u) => match &mut u.state {
                UpvalueState::Closed(v) => {
                    *v = value;
                    None
                }
                UpvalueState::Open { owner, slot } => Some((*owner, *slot)),
            },
            _ => unreachable!("upvalue cell holds a non-upvalue"),
        };
        if let Some((owner, slot)) = open {
            self.write_fiber_slot(owner, slot, value);
        }
        Ok(())
    }

    /// Read a register slot of the owning fiber, which may currently be
    /// parked in the heap while another fiber executes.
    fn read_fiber_slot(&self, owner: Option<ObjId>, slot: usize) -> Value {
        if owner == self.current_fiber {
            return self.exec.registers[slot];
        }
        match owner {
            None => self
                .parked_main
                .as_ref()
                .map(|core| core.registers[slot])
                .unwrap_or(Value::NIL),
            Some(fiber) => match self.heap.get(fiber) {
                Object::Fiber(f) => f
                    .core
                    .as_ref()
                    .map(|core| core.registers[slot])
                    .unwrap_or(Value::NIL),
                _ => Value::NIL,
            },
        }
    }

    fn write_fiber_slot(&mut self, owner: Option<ObjId>, slot: usize, value: Value) {
        if owner == self.current_fiber {
            self.exec.registers[slot] = value;
            return;
        }
        match owner {
            None => {
                if let Some(core) = self.parked_main.as_mut() {
                    core.registers[slot] = value;
                }
            }
            Some(fiber) => {
                if let Object::Fiber(f) = self.heap.get_mut(fiber) {
                    if let Some(core) = f.core.as_mut() {
                        core.registers[slot] = value;
                    }
                }
            }
        }
    }
}
