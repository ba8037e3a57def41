//! Native-function ABI and conversion helpers.
//!
//! A native callable is `(name, arity, fn(&mut Heap, &[Value]) -> Result)`;
//! negative arity means variadic. Registration interns the name as a global
//! id and stores the callable in the global table, making it visible to
//! compiled scripts like any other global. The helpers below are the
//! supported way for host modules to move composite data across the
//! boundary.

use crate::error::RuntimeError;
use crate::heap::Heap;
use crate::object::{NativeCallable, ObjNative, Object};
use crate::value::Value;

use std::collections::HashMap;
use std::sync::Arc;

/// Build a native-function value.
pub fn native_value(
    heap: &mut Heap,
    name: impl Into<String>,
    arity: i32,
    call: impl Fn(&mut Heap, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
) -> Value {
    let call: NativeCallable = Arc::new(call);
    Value::object(heap.alloc(Object::Native(ObjNative {
        name: name.into(),
        arity,
        call,
    })))
}

/// Check an argument count against a declared arity.
pub fn check_arity(name: &str, arity: i32, argc: usize) -> Result<(), RuntimeError> {
    if arity >= 0 && argc != arity as usize {
        Err(RuntimeError::arity(format!(
            "{name} expects {arity} argument(s), got {argc}"
        )))
    } else {
        Ok(())
    }
}

/// Extract an `i64`, coercing floats with integral values.
pub fn as_i64(heap: &Heap, v: Value) -> Result<i64, RuntimeError> {
    v.to_int(heap)
        .ok_or_else(|| RuntimeError::type_error(format!("expected int, got {}", v.type_name(heap))))
}

/// Extract an `f64` through the numeric coercion rules.
pub fn as_f64(heap: &Heap, v: Value) -> Result<f64, RuntimeError> {
    v.to_number(heap)
        .ok_or_else(|| RuntimeError::type_error(format!("expected number, got {}", v.type_name(heap))))
}

/// Extract the contents of a string value.
pub fn as_str(heap: &Heap, v: Value) -> Result<&str, RuntimeError> {
    if v.is_string(heap) {
        Ok(&heap.string(v.as_obj()).text)
    } else {
        Err(RuntimeError::type_error(format!(
            "expected string, got {}",
            v.type_name(heap)
        )))
    }
}

/// Extract a cloned element vector from an array value.
pub fn as_vec(heap: &Heap, v: Value) -> Result<Vec<Value>, RuntimeError> {
    match heap_object(heap, v) {
        Some(Object::Array(a)) => Ok(a.items.clone()),
        _ => Err(RuntimeError::type_error(format!(
            "expected array, got {}",
            v.type_name(heap)
        ))),
    }
}

/// Extract a cloned entry map from a map value.
pub fn as_hash_map(heap: &Heap, v: Value) -> Result<HashMap<String, Value>, RuntimeError> {
    match heap_object(heap, v) {
        Some(Object::Map(m)) => Ok(m.entries.clone()),
        _ => Err(RuntimeError::type_error(format!(
            "expected map, got {}",
            v.type_name(heap)
        ))),
    }
}

/// Build an array value from host data.
pub fn vec_to_value(heap: &mut Heap, items: Vec<Value>) -> Value {
    heap.new_array(items)
}

/// Build a map value from host data.
pub fn hash_map_to_value(heap: &mut Heap, entries: HashMap<String, Value>) -> Value {
    let v = heap.new_map();
    if let Object::Map(m) = heap.get_mut(v.as_obj()) {
        m.entries = entries;
    }
    v
}

/// Build a string value from host data.
pub fn str_to_value(heap: &mut Heap, text: &str) -> Value {
    heap.new_string(text)
}

/// Build a module value; host libraries expose their surface as a module of
/// exports.
pub fn module_value(
    heap: &mut Heap,
    name: impl Into<String>,
    path: impl Into<String>,
    exports: HashMap<String, Value>,
) -> Value {
    Value::object(heap.alloc(Object::Module(crate::object::ObjModule {
        name: name.into(),
        path: path.into(),
        exports,
        loaded: true,
    })))
}

fn heap_object(heap: &Heap, v: Value) -> Option<&Object> {
    if v.is_obj() {
        Some(heap.get(v.as_obj()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_round_trip_composites() {
        let mut heap = Heap::new();
        let s = str_to_value(&mut heap, "key");
        let arr = vec_to_value(&mut heap, vec![Value::int(1), s]);
        let items = as_vec(&heap, arr).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(as_str(&heap, items[1]).unwrap(), "key");

        let mut entries = HashMap::new();
        entries.insert("answer".to_owned(), Value::int(42));
        let map = hash_map_to_value(&mut heap, entries);
        let back = as_hash_map(&heap, map).unwrap();
        assert_eq!(back["answer"].as_int(), 42);
    }

    #[test]
    fn modules_expose_their_exports() {
        let mut heap = Heap::new();
        let mut exports = HashMap::new();
        exports.insert("version".to_owned(), Value::int(3));
        let m = module_value(&mut heap, "net", "lib/net.sn", exports);
        match heap.get(m.as_obj()) {
            Object::Module(module) => {
                assert!(module.loaded);
                assert_eq!(module.exports["version"].as_int(), 3);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn arity_checks() {
        assert!(check_arity("f", 2, 2).is_ok());
        assert!(check_arity("f", 2, 3).is_err());
        assert!(check_arity("f", -1, 7).is_ok());
    }

    #[test]
    fn natives_are_callable_objects() {
        let mut heap = Heap::new();
        let f = native_value(&mut heap, "double", 1, |heap, args| {
            let n = as_i64(heap, args[0])?;
            Ok(Value::from_i64(n * 2))
        });
        assert!(f.is_callable(&heap));

        let (callable, arity) = match heap.get(f.as_obj()) {
            Object::Native(n) => (n.call.clone(), n.arity),
            _ => unreachable!(),
        };
        assert_eq!(arity, 1);
        let out = callable(&mut heap, &[Value::int(21)]).unwrap();
        assert_eq!(out.as_int(), 42);
    }
}
