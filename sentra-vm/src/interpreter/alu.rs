//! Arithmetic, comparison, and equality semantics.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::object::Object;
use crate::value::{Value, INT_MAX, INT_MIN};

use sentra_asm::Opcode;

/// Whether `i` still fits the boxed small-int range.
fn representable(i: i64) -> bool {
    (INT_MIN..=INT_MAX).contains(&i)
}

impl Interpreter {
    /// Binary arithmetic. Two small ints stay int while the result is
    /// representable; otherwise the operation is carried out in `f64` with
    /// the correctly rounded result. Booleans coerce to 0/1; everything else
    /// is a `TypeError`.
    pub(crate) fn arith(&self, op: Opcode, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
        if lhs.is_int() && rhs.is_int() {
            let (x, y) = (lhs.as_int(), rhs.as_int());
            match op {
                Opcode::ADD => {
                    if let Some(sum) = x.checked_add(y).filter(|i| representable(*i)) {
                        return Ok(Value::int(sum));
                    }
                }
                Opcode::SUB => {
                    if let Some(diff) = x.checked_sub(y).filter(|i| representable(*i)) {
                        return Ok(Value::int(diff));
                    }
                }
                Opcode::MUL => {
                    if let Some(product) = x.checked_mul(y).filter(|i| representable(*i)) {
                        return Ok(Value::int(product));
                    }
                }
                Opcode::DIV => {
                    if y == 0 {
                        return Err(RuntimeError::value("integer division by zero"));
                    }
                    if x % y == 0 {
                        if let Some(quotient) = x.checked_div(y).filter(|i| representable(*i)) {
                            return Ok(Value::int(quotient));
                        }
                    }
                    return Ok(Value::number(x as f64 / y as f64));
                }
                Opcode::MOD => {
                    if y == 0 {
                        return Err(RuntimeError::value("integer modulo by zero"));
                    }
                    return Ok(Value::from_i64(x.wrapping_rem(y)));
                }
                Opcode::POW => {
                    if let Ok(exp) = u32::try_from(y) {
                        if let Some(power) = x.checked_pow(exp).filter(|i| representable(*i)) {
                            return Ok(Value::int(power));
                        }
                    }
                    return Ok(Value::number((x as f64).powf(y as f64)));
                }
                _ => {}
            }
            // Small-int overflow: promote with the correctly rounded result.
            let (x, y) = (x as f64, y as f64);
            return Ok(Value::number(match op {
                Opcode::ADD => x + y,
                Opcode::SUB => x - y,
                Opcode::MUL => x * y,
                _ => unreachable!("int fast path covers the remaining operators"),
            }));
        }

        let x = self.arith_operand(op, lhs)?;
        let y = self.arith_operand(op, rhs)?;
        let result = match op {
            Opcode::ADD => x + y,
            Opcode::SUB => x - y,
            Opcode::MUL => x * y,
            Opcode::DIV => x / y,
            Opcode::MOD => x % y,
            Opcode::POW => x.powf(y),
            _ => unreachable!("not an arithmetic opcode"),
        };
        Ok(Value::number(result))
    }

    fn arith_operand(&self, op: Opcode, v: Value) -> Result<f64, RuntimeError> {
        if v.is_int() {
            Ok(v.as_int() as f64)
        } else if v.is_number() {
            Ok(v.as_number())
        } else if v.is_bool() {
            Ok(if v.as_bool() { 1.0 } else { 0.0 })
        } else {
            Err(RuntimeError::type_error(format!(
                "cannot apply {} to {}",
                op.mnemonic(),
                v.type_name(&self.heap)
            )))
        }
    }

    /// Unary minus.
    pub(crate) fn negate(&self, v: Value) -> Result<Value, RuntimeError> {
        if v.is_int() {
            let i = v.as_int();
            if representable(-i) {
                return Ok(Value::int(-i));
            }
            return Ok(Value::number(-(i as f64)));
        }
        if v.is_number() {
            return Ok(Value::number(-v.as_number()));
        }
        Err(RuntimeError::type_error(format!(
            "cannot negate {}",
            v.type_name(&self.heap)
        )))
    }

    /// Ordering comparison (LT/LE/GT/GE). Numeric operands compare through
    /// `to_number`; two strings compare by byte order; anything else is a
    /// `TypeError`.
    pub(crate) fn ordered(&self, op: Opcode, lhs: Value, rhs: Value) -> Result<bool, RuntimeError> {
        if lhs.is_int() && rhs.is_int() {
            let (x, y) = (lhs.as_int(), rhs.as_int());
            return Ok(match op {
                Opcode::LT => x < y,
                Opcode::LE => x <= y,
                Opcode::GT => x > y,
                _ => x >= y,
            });
        }
        if lhs.is_string(&self.heap) && rhs.is_string(&self.heap) {
            let x = &self.heap.string(lhs.as_obj()).text;
            let y = &self.heap.string(rhs.as_obj()).text;
            let (x, y) = (x.as_bytes(), y.as_bytes());
            return Ok(match op {
                Opcode::LT => x < y,
                Opcode::LE => x <= y,
                Opcode::GT => x > y,
                _ => x >= y,
            });
        }
        match (lhs.to_number(&self.heap), rhs.to_number(&self.heap)) {
            (Some(x), Some(y)) => Ok(match op {
                Opcode::LT => x < y,
                Opcode::LE => x <= y,
                Opcode::GT => x > y,
                _ => x >= y,
            }),
            _ => Err(RuntimeError::type_error(format!(
                "cannot compare {} with {}",
                lhs.type_name(&self.heap),
                rhs.type_name(&self.heap)
            ))),
        }
    }

    /// Deep equality: structural for strings, arrays, and maps; numeric
    /// across int/float; reference equality for every other heap kind.
    pub(crate) fn values_equal(&self, lhs: Value, rhs: Value) -> bool {
        if lhs == rhs {
            // Identical bits: primitives match semantically, heap values are
            // the same object.
            return true;
        }
        if lhs.is_numeric() && rhs.is_numeric() {
            if lhs.is_int() && rhs.is_int() {
                return lhs.as_int() == rhs.as_int();
            }
            let x = if lhs.is_int() { lhs.as_int() as f64 } else { lhs.as_number() };
            let y = if rhs.is_int() { rhs.as_int() as f64 } else { rhs.as_number() };
            return x == y;
        }
        if !lhs.is_obj() || !rhs.is_obj() {
            return false;
        }
        match (self.heap.get(lhs.as_obj()), self.heap.get(rhs.as_obj())) {
            (Object::String(x), Object::String(y)) => x.hash == y.hash && x.text == y.text,
            (Object::Array(x), Object::Array(y)) => {
                x.items.len() == y.items.len()
                    && x.items
                        .iter()
                        .zip(y.items.iter())
                        .all(|(a, b)| self.values_equal(*a, *b))
            }
            (Object::Map(x), Object::Map(y)) => {
                x.entries.len() == y.entries.len()
                    && x.entries.iter().all(|(key, a)| {
                        y.entries.get(key).is_some_and(|b| self.values_equal(*a, *b))
                    })
            }
            _ => false,
        }
    }

    /// ABS/SQRT/FLOOR/CEIL/ROUND.
    pub(crate) fn math_unary(&self, op: Opcode, v: Value) -> Result<Value, RuntimeError> {
        if v.is_int() {
            let i = v.as_int();
            return Ok(match op {
                Opcode::ABS => Value::from_i64(i.saturating_abs()),
                Opcode::SQRT => Value::number((i as f64).sqrt()),
                // Integral inputs pass through the rounding family.
                _ => v,
            });
        }
        let x = self.arith_operand(op, v)?;
        let result = match op {
            Opcode::ABS => x.abs(),
            Opcode::SQRT => x.sqrt(),
            Opcode::FLOOR => x.floor(),
            Opcode::CEIL => x.ceil(),
            Opcode::ROUND => x.round(),
            _ => unreachable!("not a math opcode"),
        };
        if op != Opcode::SQRT && op != Opcode::ABS && result.is_finite() && representable(result as i64) {
            return Ok(Value::int(result as i64));
        }
        Ok(Value::number(result))
    }
}
