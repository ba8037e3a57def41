//! Builtin native registration.
//!
//! The set installed here is the minimal host surface the runtime promises
//! to every script: introspection, collection helpers, channels, and fiber
//! cancellation. Library modules register their own natives on top through
//! [`Interpreter::register_native`].

use super::Interpreter;
use crate::error::RuntimeError;
use crate::object::{ObjChannel, ObjKind, Object};
use crate::value::Value;

impl Interpreter {
    pub(crate) fn install_builtins(&mut self) {
        self.register_native("print", -1, |heap, args| {
            let line: Vec<String> = args.iter().map(|v| v.to_text(heap)).collect();
            println!("{}", line.join(" "));
            Ok(Value::NIL)
        });

        self.register_native("type", 1, |heap, args| {
            let name = args[0].type_name(heap);
            Ok(heap.new_string(name))
        });

        self.register_native("len", 1, |heap, args| {
            let v = args[0];
            let len = match v.kind(heap) {
                Some(ObjKind::String) => heap.string(v.as_obj()).text.chars().count(),
                Some(ObjKind::Array) => match heap.get(v.as_obj()) {
                    Object::Array(a) => a.items.len(),
                    _ => unreachable!("checked array kind"),
                },
                Some(ObjKind::Map) => match heap.get(v.as_obj()) {
                    Object::Map(m) => m.entries.len(),
                    _ => unreachable!("checked map kind"),
                },
                _ => {
                    return Err(RuntimeError::type_error(format!(
                        "{} has no length",
                        v.type_name(heap)
                    )))
                }
            };
            Ok(Value::from_i64(len as i64))
        });

        self.register_native("str", 1, |heap, args| {
            let text = args[0].to_text(heap);
            Ok(heap.new_string(text))
        });

        self.register_native("int", 1, |heap, args| {
            args[0].to_int(heap).map(Value::from_i64).ok_or_else(|| {
                RuntimeError::type_error(format!("cannot convert {} to int", args[0].type_name(heap)))
            })
        });

        self.register_native("num", 1, |heap, args| {
            args[0].to_number(heap).map(Value::number).ok_or_else(|| {
                RuntimeError::type_error(format!(
                    "cannot convert {} to number",
                    args[0].type_name(heap)
                ))
            })
        });

        self.register_native("push", 2, |heap, args| {
            let (array, value) = (args[0], args[1]);
            match heap.get_mut(array.as_obj_checked(heap, ObjKind::Array)?) {
                Object::Array(a) => a.items.push(value),
                _ => unreachable!("checked array kind"),
            }
            Ok(array)
        });

        self.register_native("pop", 1, |heap, args| {
            match heap.get_mut(args[0].as_obj_checked(heap, ObjKind::Array)?) {
                Object::Array(a) => a
                    .items
                    .pop()
                    .ok_or_else(|| RuntimeError::index("pop from empty array")),
                _ => unreachable!("checked array kind"),
            }
        });

        self.register_native("keys", 1, |heap, args| {
            let mut keys = match heap.get(args[0].as_obj_checked(heap, ObjKind::Map)?) {
                Object::Map(m) => m.entries.keys().cloned().collect::<Vec<_>>(),
                _ => unreachable!("checked map kind"),
            };
            keys.sort_unstable();
            let items: Vec<Value> = keys.into_iter().map(|k| heap.new_string(k)).collect();
            Ok(heap.new_array(items))
        });

        self.register_native("chan", -1, |heap, args| {
            let capacity = match args {
                [] => None,
                [cap, ..] => Some(
                    cap.to_int(heap)
                        .filter(|c| *c >= 0)
                        .ok_or_else(|| RuntimeError::value("channel capacity must be >= 0"))?
                        as usize,
                ),
            };
            Ok(Value::object(heap.alloc(Object::Channel(ObjChannel {
                capacity,
                ..ObjChannel::default()
            }))))
        });

        self.register_native("send", 2, |heap, args| {
            let (value, id) = (args[1], args[0].as_obj_checked(heap, ObjKind::Channel)?);
            match heap.get_mut(id) {
                Object::Channel(ch) => {
                    if ch.closed {
                        return Err(RuntimeError::value("send on a closed channel"));
                    }
                    if ch.capacity.is_some_and(|cap| ch.queue.len() >= cap) {
                        return Err(RuntimeError::value("send on a full channel"));
                    }
                    ch.queue.push_back(value);
                    Ok(Value::NIL)
                }
                _ => unreachable!("checked channel kind"),
            }
        });

        self.register_native("recv", 1, |heap, args| {
            match heap.get_mut(args[0].as_obj_checked(heap, ObjKind::Channel)?) {
                Object::Channel(ch) => match ch.queue.pop_front() {
                    Some(value) => Ok(value),
                    None if ch.closed => Ok(Value::NIL),
                    None => Err(RuntimeError::value("receive on an empty channel")),
                },
                _ => unreachable!("checked channel kind"),
            }
        });

        self.register_native("close", 1, |heap, args| {
            match heap.get_mut(args[0].as_obj_checked(heap, ObjKind::Channel)?) {
                Object::Channel(ch) => {
                    ch.closed = true;
                    Ok(Value::NIL)
                }
                _ => unreachable!("checked channel kind"),
            }
        });

        // Cancellation: schedule a throw for the fiber's next resumption.
        self.register_native("throw_into", 2, |heap, args| {
            let (value, id) = (args[1], args[0].as_obj_checked(heap, ObjKind::Fiber)?);
            match heap.get_mut(id) {
                Object::Fiber(f) => {
                    f.pending_throw = Some(value);
                    Ok(Value::NIL)
                }
                _ => unreachable!("checked fiber kind"),
            }
        });
    }
}
