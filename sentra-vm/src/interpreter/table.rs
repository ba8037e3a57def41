//! Array, map, and iterator opcode implementations.
//!
//! Indexing contract: array reads and writes outside `0..len` are
//! `IndexError`s; reading a missing map key yields nil (HASKEY exists to
//! distinguish), writing inserts.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::heap::ObjId;
use crate::object::{ObjIterator, Object};
use crate::value::Value;

impl Interpreter {
    fn array_id(&self, v: Value) -> Result<ObjId, RuntimeError> {
        if v.is_array(&self.heap) {
            Ok(v.as_obj())
        } else {
            Err(RuntimeError::type_error(format!(
                "expected array, got {}",
                v.type_name(&self.heap)
            )))
        }
    }

    fn array_items_mut(&mut self, id: ObjId) -> &mut Vec<Value> {
        match self.heap.get_mut(id) {
            Object::Array(a) => &mut a.items,
            _ => unreachable!("checked array kind"),
        }
    }

    /// GETTABLE: `container[key]`.
    pub(crate) fn table_get(&mut self, container: Value, key: Value) -> Result<Value, RuntimeError> {
        use crate::object::ObjKind;

        match container.kind(&self.heap) {
            Some(ObjKind::Array) => match self.heap.get(container.as_obj()) {
                Object::Array(a) => {
                    let index = self.index_in(key, a.items.len())?;
                    Ok(a.items[index])
                }
                _ => unreachable!("checked array kind"),
            },
            Some(ObjKind::Map) => {
                let key = self.map_key(key)?;
                match self.heap.get(container.as_obj()) {
                    Object::Map(m) => Ok(m.entries.get(&key).copied().unwrap_or(Value::NIL)),
                    _ => unreachable!("checked map kind"),
                }
            }
            Some(ObjKind::String) => {
                let ch = {
                    let text = &self.heap.string(container.as_obj()).text;
                    let index = self.index_in(key, text.chars().count())?;
                    text.chars().nth(index)
                };
                match ch {
                    Some(ch) => Ok(self.heap.new_string(ch.to_string())),
                    None => Err(RuntimeError::index("string index out of range")),
                }
            }
            _ => Err(RuntimeError::type_error(format!(
                "cannot index {}",
                container.type_name(&self.heap)
            ))),
        }
    }

    /// SETTABLE: `container[key] = value`.
    pub(crate) fn table_set(
        &mut self,
        container: Value,
        key: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        if !container.is_obj() {
            return Err(RuntimeError::type_error(format!(
                "cannot index {}",
                container.type_name(&self.heap)
            )));
        }
        match self.heap.get(container.as_obj()) {
            Object::Array(a) => {
                let index = self.index_in(key, a.items.len())?;
                self.array_items_mut(container.as_obj())[index] = value;
                Ok(())
            }
            Object::Map(_) => {
                let key = self.map_key(key)?;
                if let Object::Map(m) = self.heap.get_mut(container.as_obj()) {
                    m.entries.insert(key, value);
                }
                Ok(())
            }
            other => Err(RuntimeError::type_error(format!(
                "cannot index {}",
                other.kind().name()
            ))),
        }
    }

    fn index_in(&self, key: Value, len: usize) -> Result<usize, RuntimeError> {
        let index = key.to_int(&self.heap).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "array index must be an int, got {}",
                key.type_name(&self.heap)
            ))
        })?;
        if index < 0 || index as usize >= len {
            return Err(RuntimeError::index(format!(
                "index {index} out of range for length {len}"
            )));
        }
        Ok(index as usize)
    }

    fn map_key(&self, key: Value) -> Result<String, RuntimeError> {
        if key.is_string(&self.heap) {
            Ok(self.heap.string(key.as_obj()).text.to_string())
        } else {
            Err(RuntimeError::type_error(format!(
                "map key must be a string, got {}",
                key.type_name(&self.heap)
            )))
        }
    }

    /// LEN over strings, arrays, and maps.
    pub(crate) fn generic_len(&self, v: Value) -> Result<Value, RuntimeError> {
        let len = match v.kind(&self.heap) {
            Some(_) => match self.heap.get(v.as_obj()) {
                Object::String(s) => s.text.chars().count(),
                Object::Array(a) => a.items.len(),
                Object::Map(m) => m.entries.len(),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "{} has no length",
                        other.kind().name()
                    )))
                }
            },
            None => {
                return Err(RuntimeError::type_error(format!(
                    "{} has no length",
                    v.type_name(&self.heap)
                )))
            }
        };
        Ok(Value::from_i64(len as i64))
    }

    /// ARRLEN: array length, the specialized integer-indexed form.
    pub(crate) fn array_len(&self, v: Value) -> Result<Value, RuntimeError> {
        let id = self.array_id(v)?;
        match self.heap.get(id) {
            Object::Array(a) => Ok(Value::from_i64(a.items.len() as i64)),
            _ => unreachable!("checked array kind"),
        }
    }

    pub(crate) fn array_append(&mut self, array: Value, value: Value) -> Result<(), RuntimeError> {
        let id = self.array_id(array)?;
        self.array_items_mut(id).push(value);
        Ok(())
    }

    pub(crate) fn array_pop(&mut self, array: Value) -> Result<Value, RuntimeError> {
        let id = self.array_id(array)?;
        self.array_items_mut(id)
            .pop()
            .ok_or_else(|| RuntimeError::index("pop from empty array"))
    }

    pub(crate) fn array_shift(&mut self, array: Value) -> Result<Value, RuntimeError> {
        let id = self.array_id(array)?;
        let items = self.array_items_mut(id);
        if items.is_empty() {
            return Err(RuntimeError::index("shift from empty array"));
        }
        Ok(items.remove(0))
    }

    pub(crate) fn array_unshift(&mut self, array: Value, value: Value) -> Result<(), RuntimeError> {
        let id = self.array_id(array)?;
        self.array_items_mut(id).insert(0, value);
        Ok(())
    }

    /// GETARRAYI: immediate-index read.
    pub(crate) fn array_get_index(&self, array: Value, index: i64) -> Result<Value, RuntimeError> {
        let id = self.array_id(array)?;
        match self.heap.get(id) {
            Object::Array(a) => {
                let index = self.index_in(Value::from_i64(index), a.items.len())?;
                Ok(a.items[index])
            }
            _ => unreachable!("checked array kind"),
        }
    }

    /// SETARRAYI: immediate-index write.
    pub(crate) fn array_set_index(
        &mut self,
        array: Value,
        index: i64,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let id = self.array_id(array)?;
        let len = match self.heap.get(id) {
            Object::Array(a) => a.items.len(),
            _ => unreachable!("checked array kind"),
        };
        let index = self.index_in(Value::from_i64(index), len)?;
        self.array_items_mut(id)[index] = value;
        Ok(())
    }

    /// KEYS: sorted key array of a map.
    pub(crate) fn map_keys(&mut self, map: Value) -> Result<Value, RuntimeError> {
        let mut keys = match map.kind(&self.heap) {
            Some(_) => match self.heap.get(map.as_obj()) {
                Object::Map(m) => m.entries.keys().cloned().collect::<Vec<_>>(),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "keys expects a map, got {}",
                        other.kind().name()
                    )))
                }
            },
            None => {
                return Err(RuntimeError::type_error(format!(
                    "keys expects a map, got {}",
                    map.type_name(&self.heap)
                )))
            }
        };
        keys.sort_unstable();
        let items: Vec<Value> = keys.into_iter().map(|k| self.heap.new_string(k)).collect();
        Ok(self.heap.new_array(items))
    }

    /// HASKEY.
    pub(crate) fn map_has_key(&self, map: Value, key: Value) -> Result<Value, RuntimeError> {
        if !map.is_map(&self.heap) {
            return Err(RuntimeError::type_error(format!(
                "haskey expects a map, got {}",
                map.type_name(&self.heap)
            )));
        }
        let key = self.map_key(key)?;
        match self.heap.get(map.as_obj()) {
            Object::Map(m) => Ok(Value::boolean(m.entries.contains_key(&key))),
            _ => unreachable!("checked map kind"),
        }
    }

    /// ITERINIT: build an iterator over an array, map, or string.
    pub(crate) fn iter_init(&mut self, source: Value) -> Result<Value, RuntimeError> {
        let keys = match source.kind(&self.heap) {
            Some(_) => match self.heap.get(source.as_obj()) {
                Object::Array(_) | Object::String(_) => None,
                Object::Map(m) => {
                    let mut keys: Vec<String> = m.entries.keys().cloned().collect();
                    keys.sort_unstable();
                    Some(keys)
                }
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "cannot iterate {}",
                        other.kind().name()
                    )))
                }
            },
            None => {
                return Err(RuntimeError::type_error(format!(
                    "cannot iterate {}",
                    source.type_name(&self.heap)
                )))
            }
        };
        let iter = Object::Iterator(ObjIterator {
            source: source.as_obj(),
            index: 0,
            keys,
        });
        Ok(Value::object(self.heap.alloc(iter)))
    }

    /// ITERNEXT: advance; on exhaustion jump forward by `exit_offset`.
    pub(crate) fn iter_next(&mut self, a: u8, b: u8, exit_offset: u8) -> Result<(), RuntimeError> {
        let iter_val = self.reg(b);
        let iter_id = match iter_val.kind(&self.heap) {
            Some(crate::object::ObjKind::Iterator) => iter_val.as_obj(),
            _ => {
                return Err(RuntimeError::type_error(format!(
                    "expected iterator, got {}",
                    iter_val.type_name(&self.heap)
                )))
            }
        };
        let (source, index, key) = match self.heap.get(iter_id) {
            Object::Iterator(it) => (
                it.source,
                it.index,
                it.keys.as_ref().and_then(|keys| keys.get(it.index).cloned()),
            ),
            _ => unreachable!("checked iterator kind"),
        };

        enum Step {
            Done,
            Pair(Value, Value),
            NewString(String, Value),
        }

        let step = match self.heap.get(source) {
            Object::Array(arr) => match arr.items.get(index) {
                Some(element) => Step::Pair(*element, Value::from_i64(index as i64)),
                None => Step::Done,
            },
            Object::Map(m) => match key {
                Some(key) => {
                    let value = m.entries.get(&key).copied().unwrap_or(Value::NIL);
                    Step::NewString(key, value)
                }
                None => Step::Done,
            },
            Object::String(s) => match s.text.chars().nth(index) {
                Some(ch) => Step::NewString(ch.to_string(), Value::from_i64(index as i64)),
                None => Step::Done,
            },
            other => {
                return Err(RuntimeError::type_error(format!(
                    "cannot iterate {}",
                    other.kind().name()
                )))
            }
        };

        match step {
            Step::Done => {
                self.jump(exit_offset as i32);
            }
            Step::Pair(first, second) => {
                self.bump_iter(iter_id);
                self.set_reg(a, first);
                self.set_reg(a + 1, second);
            }
            Step::NewString(text, second) => {
                self.bump_iter(iter_id);
                let first = self.heap.new_string(text);
                self.set_reg(a, first);
                self.set_reg(a + 1, second);
            }
        }
        Ok(())
    }

    fn bump_iter(&mut self, id: ObjId) {
        if let Object::Iterator(it) = self.heap.get_mut(id) {
            it.index += 1;
        }
    }
}
