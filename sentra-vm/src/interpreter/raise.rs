//! Throw materialization and frame unwinding.

use super::Interpreter;
use crate::error::{ErrorKind, RuntimeError, TraceFrame};
use crate::object::Object;
use crate::value::Value;

impl Interpreter {
    /// Turn a raised [`RuntimeError`] into the script-visible error value.
    ///
    /// A user THROW travels as the thrown value itself, untouched, so a
    /// handler observes exactly what was thrown. Internal errors become
    /// error objects carrying the stack captured here, at raise time.
    pub(crate) fn materialize_error(&mut self, raised: RuntimeError) -> Value {
        if let Some(value) = self.thrown.take() {
            return value;
        }
        let trace = self.exec.capture_trace();
        self.heap
            .new_error(raised.kind, raised.message, Value::NIL, trace)
    }

    /// Unwind the executing fiber until a handler catches `error`.
    ///
    /// Frames are popped top-down, closing each frame's open upvalues before
    /// its registers are abandoned. On a catch, the register top saved by
    /// TRY is restored and `last_error` holds the error for GETERROR. When
    /// no handler exists the error is handed back for fiber death.
    pub(crate) fn unwind(&mut self, error: Value) -> Result<(), Value> {
        loop {
            let handler = match self.exec.frames.last_mut() {
                None => return Err(error),
                Some(frame) => frame.tries.pop(),
            };
            match handler {
                Some(handler) => {
                    self.exec.frame_mut().pc = handler.handler_pc;
                    self.exec.top = handler.saved_top;
                    self.varargs_top = None;
                    self.last_error = error;
                    return Ok(());
                }
                None => {
                    let base = self.exec.frame().base;
                    self.exec.close_upvalues(&mut self.heap, base);
                    self.exec.frames.pop();
                }
            }
        }
    }

    /// Deconstruct an error value for the embedder-facing [`crate::VmError`].
    pub(crate) fn error_parts(&self, error: Value) -> (ErrorKind, String, Vec<TraceFrame>) {
        if error.is_obj() {
            if let Object::Error(e) = self.heap.get(error.as_obj()) {
                return (e.kind, e.message.clone(), e.trace.clone());
            }
        }
        (ErrorKind::User, error.to_text(&self.heap), Vec::new())
    }
}
