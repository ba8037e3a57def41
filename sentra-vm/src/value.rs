//! NaN-boxed value representation.
//!
//! Every value is one 64-bit word. Bit patterns that are not quiet NaNs in
//! the tag space below are finite `f64`s stored verbatim; the quiet-NaN
//! payload encodes everything else:
//!
//! ```text
//! 0x7FF8_0000_0000_0000   canonical NaN (result of float ops producing NaN)
//! 0x7FF8_0000_0000_0001   nil
//! 0x7FF8_0000_0000_0002   false
//! 0x7FF8_0000_0000_0003   true
//! 0x7FFC_pppp_pppp_pppp   heap handle, 48-bit payload
//! 0x7FFE_iiii_iiii_iiii   small integer, 48-bit two's complement payload
//! ```
//!
//! Comparing `Value`s with `==` compares bit identity, which is exact for
//! primitives and handle identity for heap values; semantic (deep) equality
//! lives in the interpreter, which can see the heap.

use crate::consts::{INTERNED_INT_MAX, INTERNED_INT_MIN};
use crate::heap::{Heap, ObjId};
use crate::object::{ObjKind, Object};

const TAG_SINGLETON: u64 = 0x7FF8;
const TAG_OBJ: u64 = 0x7FFC;
const TAG_INT: u64 = 0x7FFE;

const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;
const NIL_BITS: u64 = 0x7FF8_0000_0000_0001;
const FALSE_BITS: u64 = 0x7FF8_0000_0000_0002;
const TRUE_BITS: u64 = 0x7FF8_0000_0000_0003;

/// Smallest integer that stays an integer when boxed.
pub const INT_MIN: i64 = -(1i64 << 47);

/// Largest integer that stays an integer when boxed.
pub const INT_MAX: i64 = (1i64 << 47) - 1;

/// Values in `INTERNED_INT_MIN..=INTERNED_INT_MAX` are served from this
/// table so the common loop counters share one precomputed encoding.
static INTERNED_INTS: [Value; 512] = {
    let mut table = [Value(NIL_BITS); 512];
    let mut i = 0;
    while i < table.len() {
        let n = i as i64 + INTERNED_INT_MIN;
        table[i] = Value(TAG_INT << 48 | (n as u64 & PAYLOAD_MASK));
        i += 1;
    }
    table
};

/// A NaN-boxed Sentra value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    /// The `nil` singleton.
    pub const NIL: Self = Self(NIL_BITS);

    /// The `false` singleton.
    pub const FALSE: Self = Self(FALSE_BITS);

    /// The `true` singleton.
    pub const TRUE: Self = Self(TRUE_BITS);

    /// Box a float. NaN inputs collapse to the canonical NaN, which is a
    /// tagged word and no longer satisfies [`is_number`](Self::is_number).
    pub fn number(x: f64) -> Self {
        if x.is_nan() {
            Self(CANONICAL_NAN)
        } else {
            Self(x.to_bits())
        }
    }

    /// Box a small integer. The caller asserts `i` is within
    /// [`INT_MIN`]`..=`[`INT_MAX`]; use [`from_i64`](Self::from_i64) when the
    /// range is not statically known.
    pub fn int(i: i64) -> Self {
        if (INTERNED_INT_MIN..=INTERNED_INT_MAX).contains(&i) {
            return INTERNED_INTS[(i - INTERNED_INT_MIN) as usize];
        }
        debug_assert!((INT_MIN..=INT_MAX).contains(&i));
        Self(TAG_INT << 48 | (i as u64 & PAYLOAD_MASK))
    }

    /// Box any `i64`, falling back to `f64` outside the 48-bit range.
    pub fn from_i64(i: i64) -> Self {
        if (INT_MIN..=INT_MAX).contains(&i) {
            Self::int(i)
        } else {
            Self::number(i as f64)
        }
    }

    /// Box a boolean.
    pub const fn boolean(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Box a heap handle. Handles past 48 bits cannot be encoded and abort
    /// the VM.
    pub fn object(id: ObjId) -> Self {
        assert!(id.raw() <= PAYLOAD_MASK, "heap handle exceeds 48-bit payload");
        Self(TAG_OBJ << 48 | id.raw())
    }

    /// The raw word, exposed for the encoding tests.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// `nil` predicate.
    pub const fn is_nil(self) -> bool {
        self.0 == NIL_BITS
    }

    /// Boolean predicate.
    pub const fn is_bool(self) -> bool {
        self.0 == FALSE_BITS || self.0 == TRUE_BITS
    }

    /// Small-integer predicate.
    pub const fn is_int(self) -> bool {
        self.0 >> 48 == TAG_INT
    }

    /// Float predicate. Tagged words, including the canonical NaN, are not
    /// numbers.
    pub const fn is_number(self) -> bool {
        let tag = self.0 >> 48;
        tag != TAG_SINGLETON && tag != TAG_OBJ && tag != TAG_INT
    }

    /// Int-or-float predicate.
    pub const fn is_numeric(self) -> bool {
        self.is_int() || self.is_number()
    }

    /// Heap-handle predicate.
    pub const fn is_obj(self) -> bool {
        self.0 >> 48 == TAG_OBJ
    }

    /// Extract a float. Requires [`is_number`](Self::is_number).
    pub fn as_number(self) -> f64 {
        debug_assert!(self.is_number());
        f64::from_bits(self.0)
    }

    /// Extract a small integer. Requires [`is_int`](Self::is_int).
    pub fn as_int(self) -> i64 {
        debug_assert!(self.is_int());
        // Shift the 48-bit payload into the top bits so the sign extends.
        ((self.0 << 16) as i64) >> 16
    }

    /// Extract a boolean. Requires [`is_bool`](Self::is_bool).
    pub fn as_bool(self) -> bool {
        debug_assert!(self.is_bool());
        self.0 == TRUE_BITS
    }

    /// Extract a heap handle. Requires [`is_obj`](Self::is_obj).
    pub fn as_obj(self) -> ObjId {
        debug_assert!(self.is_obj());
        ObjId::from_raw(self.0 & PAYLOAD_MASK)
    }

    /// The handle, after checking the value is a heap object of `kind`.
    pub fn as_obj_checked(
        self,
        heap: &Heap,
        kind: ObjKind,
    ) -> Result<ObjId, crate::error::RuntimeError> {
        if self.kind(heap) == Some(kind) {
            Ok(self.as_obj())
        } else {
            Err(crate::error::RuntimeError::type_error(format!(
                "expected {}, got {}",
                kind.name(),
                self.type_name(heap)
            )))
        }
    }

    /// Heap kind of this value, if it is a heap value.
    pub fn kind(self, heap: &Heap) -> Option<ObjKind> {
        if self.is_obj() {
            Some(heap.get(self.as_obj()).kind())
        } else {
            None
        }
    }

    /// String predicate.
    pub fn is_string(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::String))
    }

    /// Array predicate.
    pub fn is_array(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Array))
    }

    /// Map predicate.
    pub fn is_map(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Map))
    }

    /// Function-or-closure predicate.
    pub fn is_function(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Function | ObjKind::Closure))
    }

    /// Anything the CALL instruction accepts.
    pub fn is_callable(self, heap: &Heap) -> bool {
        matches!(
            self.kind(heap),
            Some(ObjKind::Function | ObjKind::Closure | ObjKind::Native)
        )
    }

    /// Class predicate.
    pub fn is_class(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Class))
    }

    /// Instance predicate.
    pub fn is_instance(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Instance))
    }

    /// Fiber predicate.
    pub fn is_fiber(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Fiber))
    }

    /// Error-object predicate.
    pub fn is_error(self, heap: &Heap) -> bool {
        matches!(self.kind(heap), Some(ObjKind::Error))
    }

    /// Numeric coercion: ints and floats pass through, booleans map to 0/1,
    /// strings parse as float literals. Everything else is `None`.
    pub fn to_number(self, heap: &Heap) -> Option<f64> {
        if self.is_int() {
            Some(self.as_int() as f64)
        } else if self.is_number() {
            Some(self.as_number())
        } else if self.is_bool() {
            Some(if self.as_bool() { 1.0 } else { 0.0 })
        } else if self.is_string(heap) {
            heap.string(self.as_obj()).text.trim().parse().ok()
        } else {
            None
        }
    }

    /// Integer coercion; floats truncate toward zero.
    pub fn to_int(self, heap: &Heap) -> Option<i64> {
        if self.is_int() {
            Some(self.as_int())
        } else if self.is_number() {
            let x = self.as_number();
            x.is_finite().then(|| x as i64)
        } else if self.is_bool() {
            Some(self.as_bool() as i64)
        } else if self.is_string(heap) {
            let text = heap.string(self.as_obj()).text.trim().to_owned();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|x| x as i64))
        } else {
            None
        }
    }

    /// Truthiness: `nil` and `false` are falsy, as are `0`, `0.0`, the empty
    /// string, the empty array, and the empty map.
    pub fn is_truthy(self, heap: &Heap) -> bool {
        if self.is_nil() {
            return false;
        }
        if self.is_bool() {
            return self.as_bool();
        }
        if self.is_int() {
            return self.as_int() != 0;
        }
        if self.is_number() {
            return self.as_number() != 0.0;
        }
        match heap.get(self.as_obj()) {
            Object::String(s) => !s.text.is_empty(),
            Object::Array(a) => !a.items.is_empty(),
            Object::Map(m) => !m.entries.is_empty(),
            _ => true,
        }
    }

    /// Render the value as text; used by PRINT, CONCAT coercion, and error
    /// messages. Floats render in shortest round-trip form.
    pub fn to_text(self, heap: &Heap) -> String {
        self.to_text_depth(heap, 0)
    }

    fn to_text_depth(self, heap: &Heap, depth: usize) -> String {
        if self.is_nil() {
            return "nil".to_owned();
        }
        if self.is_bool() {
            return if self.as_bool() { "true" } else { "false" }.to_owned();
        }
        if self.is_int() {
            return self.as_int().to_string();
        }
        if self.is_number() {
            return self.as_number().to_string();
        }
        if depth > 8 {
            return "...".to_owned();
        }
        match heap.get(self.as_obj()) {
            Object::String(s) => s.text.to_string(),
            Object::Array(a) => {
                let items: Vec<String> = a
                    .items
                    .iter()
                    .map(|v| v.to_text_depth(heap, depth + 1))
                    .collect();
                format!("[{}]", items.join(", "))
            }
            Object::Map(m) => {
                let mut entries: Vec<(&String, &Value)> = m.entries.iter().collect();
                entries.sort_by_key(|(k, _)| k.as_str());
                let body: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_text_depth(heap, depth + 1)))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Object::Function(f) => format!("<fn {}>", f.proto.name),
            Object::Closure(c) => format!("<fn {}>", c.proto.name),
            Object::Native(n) => format!("<native {}>", n.name),
            Object::Module(m) => format!("<module {}>", m.name),
            Object::Error(e) => format!("{}: {}", e.kind, e.message),
            Object::Channel(_) => "<channel>".to_owned(),
            Object::Iterator(_) => "<iterator>".to_owned(),
            Object::Class(c) => format!("<class {}>", c.name),
            Object::Instance(i) => match heap.get(i.class) {
                Object::Class(c) => format!("<{} instance>", c.name),
                _ => "<instance>".to_owned(),
            },
            Object::Upvalue(_) => "<upvalue>".to_owned(),
            Object::Fiber(_) => "<fiber>".to_owned(),
        }
    }

    /// Human-readable type name, used in error messages.
    pub fn type_name(self, heap: &Heap) -> &'static str {
        if self.is_nil() {
            "nil"
        } else if self.is_bool() {
            "bool"
        } else if self.is_int() {
            "int"
        } else if self.is_number() {
            "float"
        } else {
            heap.get(self.as_obj()).kind().name()
        }
    }

    /// Compact tag for profiler type feedback.
    pub fn type_tag(self, heap: &Heap) -> u8 {
        if self.is_nil() {
            0
        } else if self.is_bool() {
            1
        } else if self.is_int() {
            2
        } else if self.is_number() {
            3
        } else {
            4 + heap.get(self.as_obj()).kind() as u8
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::NIL
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::boolean(b)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::number(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::from_i64(i)
    }
}
