//! String opcode implementations.
//!
//! Positions are byte indices; slicing at a non-UTF-8 boundary is a
//! `ValueError`. Range operands clamp to the string like the rest of the
//! scripting surface.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::object::Object;
use crate::value::Value;

use sentra_asm::{Instruction, Opcode};

impl Interpreter {
    fn want_str(&self, v: Value) -> Result<String, RuntimeError> {
        if v.is_string(&self.heap) {
            Ok(self.heap.string(v.as_obj()).text.to_string())
        } else {
            Err(RuntimeError::type_error(format!(
                "expected string, got {}",
                v.type_name(&self.heap)
            )))
        }
    }

    fn want_index(&self, v: Value) -> Result<usize, RuntimeError> {
        v.to_int(&self.heap)
            .filter(|i| *i >= 0)
            .map(|i| i as usize)
            .ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "expected a non-negative index, got {}",
                    v.type_name(&self.heap)
                ))
            })
    }

    fn slice_of(&self, text: &str, start: usize, end: usize) -> Result<String, RuntimeError> {
        let start = start.min(text.len());
        let end = end.clamp(start, text.len());
        text.get(start..end)
            .map(str::to_owned)
            .ok_or_else(|| RuntimeError::value("string slice is not on a character boundary"))
    }

    /// Dispatch target for the string-specialization opcodes; returns the
    /// value destined for `R(A)`.
    pub(crate) fn string_op(&mut self, op: Opcode, instr: Instruction) -> Result<Value, RuntimeError> {
        let (b, c) = (instr.b(), instr.c());
        match op {
            Opcode::UPPER => {
                let s = self.want_str(self.reg(b))?;
                Ok(self.heap.new_string(s.to_uppercase()))
            }
            Opcode::LOWER => {
                let s = self.want_str(self.reg(b))?;
                Ok(self.heap.new_string(s.to_lowercase()))
            }
            Opcode::TRIM => {
                let s = self.want_str(self.reg(b))?;
                Ok(self.heap.new_string(s.trim()))
            }
            Opcode::STRLEN => {
                let s = self.want_str(self.reg(b))?;
                Ok(Value::from_i64(s.len() as i64))
            }
            Opcode::CONTAINS => {
                let s = self.want_str(self.reg(b))?;
                let needle = self.want_str(self.reg(c))?;
                Ok(Value::boolean(s.contains(&needle)))
            }
            Opcode::STARTSWITH => {
                let s = self.want_str(self.reg(b))?;
                let prefix = self.want_str(self.reg(c))?;
                Ok(Value::boolean(s.starts_with(&prefix)))
            }
            Opcode::ENDSWITH => {
                let s = self.want_str(self.reg(b))?;
                let suffix = self.want_str(self.reg(c))?;
                Ok(Value::boolean(s.ends_with(&suffix)))
            }
            Opcode::INDEXOF => {
                let s = self.want_str(self.reg(b))?;
                let needle = self.want_str(self.reg(c))?;
                let index = s.find(&needle).map(|i| i as i64).unwrap_or(-1);
                Ok(Value::from_i64(index))
            }
            Opcode::SPLIT => {
                let s = self.want_str(self.reg(b))?;
                let sep = self.want_str(self.reg(c))?;
                let pieces: Vec<String> = if sep.is_empty() {
                    s.chars().map(String::from).collect()
                } else {
                    s.split(&sep).map(str::to_owned).collect()
                };
                let items: Vec<Value> = pieces
                    .into_iter()
                    .map(|piece| self.heap.new_string(piece))
                    .collect();
                Ok(self.heap.new_array(items))
            }
            Opcode::JOIN => {
                let sep = self.want_str(self.reg(c))?;
                let items = match self.reg(b) {
                    v if v.is_array(&self.heap) => match self.heap.get(v.as_obj()) {
                        Object::Array(a) => a.items.clone(),
                        _ => unreachable!("checked array kind"),
                    },
                    v => {
                        return Err(RuntimeError::type_error(format!(
                            "join expects an array, got {}",
                            v.type_name(&self.heap)
                        )))
                    }
                };
                let pieces: Vec<String> = items.iter().map(|v| v.to_text(&self.heap)).collect();
                Ok(self.heap.new_string(pieces.join(&sep)))
            }
            Opcode::REPLACE => {
                let s = self.want_str(self.reg(b))?;
                let pattern = self.want_str(self.reg(c))?;
                let replacement = self.want_str(self.reg(c + 1))?;
                if pattern.is_empty() {
                    return Ok(self.heap.new_string(s));
                }
                Ok(self.heap.new_string(s.replace(&pattern, &replacement)))
            }
            Opcode::SLICESTR => {
                let s = self.want_str(self.reg(b))?;
                let start = self.want_index(self.reg(c))?;
                let end = self.want_index(self.reg(c + 1))?;
                let piece = self.slice_of(&s, start, end)?;
                Ok(self.heap.new_string(piece))
            }
            Opcode::SUBSTR => {
                let s = self.want_str(self.reg(b))?;
                let start = self.want_index(self.reg(c))?;
                let len = self.want_index(self.reg(c + 1))?;
                let piece = self.slice_of(&s, start, start.saturating_add(len))?;
                Ok(self.heap.new_string(piece))
            }
            Opcode::STRCAT => {
                let mut s = self.want_str(self.reg(b))?;
                let tail = self.want_str(self.reg(c))?;
                s.push_str(&tail);
                Ok(self.heap.new_string(s))
            }
            _ => unreachable!("not a string opcode"),
        }
    }

    /// CONCAT: stringify and join `R(B)..=R(C)`.
    pub(crate) fn concat_range(&mut self, b: u8, c: u8) -> Result<Value, RuntimeError> {
        let mut out = String::new();
        for i in b..=c.max(b) {
            out.push_str(&self.reg(i).to_text(&self.heap));
        }
        Ok(self.heap.new_string(out))
    }
}
