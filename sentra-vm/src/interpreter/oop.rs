//! Class, instance, and property opcodes.
//!
//! Method resolution walks the class chain; property reads on instances
//! check fields first, then methods, then class statics, and fall back to
//! nil. Maps and modules answer the same property protocol so field access
//! syntax works uniformly.

use super::Interpreter;
use crate::error::RuntimeError;
use crate::heap::ObjId;
use crate::object::{ObjClass, ObjInstance, ObjKind, Object};
use crate::value::Value;

impl Interpreter {
    fn name_of(&self, name: Value) -> Result<String, RuntimeError> {
        if name.is_string(&self.heap) {
            Ok(self.heap.string(name.as_obj()).text.to_string())
        } else {
            Err(RuntimeError::type_error(format!(
                "property name must be a string, got {}",
                name.type_name(&self.heap)
            )))
        }
    }

    /// CLASS(A, Bx): new class named by constant `Bx`.
    pub(crate) fn make_class(&mut self, name_index: usize) -> Result<Value, RuntimeError> {
        let name = self.name_of(self.konst(name_index)?)?;
        let class = Object::Class(ObjClass {
            name,
            ..ObjClass::default()
        });
        Ok(Value::object(self.heap.alloc(class)))
    }

    /// INSTANCE(A, B): instantiate class `R(B)` with empty fields. The
    /// compiler emits the `init` call separately.
    pub(crate) fn instantiate(&mut self, class: Value) -> Result<Value, RuntimeError> {
        if !class.is_class(&self.heap) {
            return Err(RuntimeError::type_error(format!(
                "cannot instantiate {}",
                class.type_name(&self.heap)
            )));
        }
        let instance = Object::Instance(ObjInstance {
            class: class.as_obj(),
            fields: Default::default(),
        });
        Ok(Value::object(self.heap.alloc(instance)))
    }

    /// SETMETHOD(A, B, C): define method `K(B)` on class `R(A)`.
    pub(crate) fn define_method(
        &mut self,
        class: Value,
        name: Value,
        method: Value,
    ) -> Result<(), RuntimeError> {
        let name = self.name_of(name)?;
        if !method.is_callable(&self.heap) {
            return Err(RuntimeError::type_error("method must be callable"));
        }
        match class.kind(&self.heap) {
            Some(ObjKind::Class) => {
                if let Object::Class(c) = self.heap.get_mut(class.as_obj()) {
                    if name == "init" {
                        c.ctor = Some(method);
                    }
                    c.methods.insert(name, method);
                }
                Ok(())
            }
            _ => Err(RuntimeError::type_error(format!(
                "cannot define a method on {}",
                class.type_name(&self.heap)
            ))),
        }
    }

    fn class_of(&self, receiver: Value) -> Option<ObjId> {
        match receiver.kind(&self.heap) {
            Some(ObjKind::Instance) => match self.heap.get(receiver.as_obj()) {
                Object::Instance(i) => Some(i.class),
                _ => None,
            },
            Some(ObjKind::Class) => Some(receiver.as_obj()),
            _ => None,
        }
    }

    fn find_method(&self, mut class: Option<ObjId>, name: &str) -> Option<Value> {
        while let Some(id) = class {
            match self.heap.get(id) {
                Object::Class(c) => {
                    if let Some(method) = c.methods.get(name) {
                        return Some(*method);
                    }
                    class = c.parent;
                }
                _ => return None,
            }
        }
        None
    }

    /// GETMETHOD / SELF resolution target.
    pub(crate) fn method_lookup(&self, receiver: Value, name: Value) -> Result<Value, RuntimeError> {
        let name = self.name_of(name)?;
        // Maps may hold callables; method-call syntax reaches them too.
        if receiver.is_map(&self.heap) {
            if let Object::Map(m) = self.heap.get(receiver.as_obj()) {
                if let Some(v) = m.entries.get(&name) {
                    return Ok(*v);
                }
            }
        }
        self.find_method(self.class_of(receiver), &name)
            .ok_or_else(|| {
                RuntimeError::index(format!(
                    "{} has no method '{name}'",
                    receiver.type_name(&self.heap)
                ))
            })
    }

    /// SUPER(A, B, C): resolve starting at the parent of the instance's
    /// class.
    pub(crate) fn super_lookup(&self, receiver: Value, name: Value) -> Result<Value, RuntimeError> {
        let name = self.name_of(name)?;
        let parent = self.class_of(receiver).and_then(|id| match self.heap.get(id) {
            Object::Class(c) => c.parent,
            _ => None,
        });
        self.find_method(parent, &name).ok_or_else(|| {
            RuntimeError::index(format!("no superclass method '{name}'"))
        })
    }

    /// GETPROP(A, B, C).
    pub(crate) fn get_property(&self, receiver: Value, name: Value) -> Result<Value, RuntimeError> {
        let name = self.name_of(name)?;
        match receiver.kind(&self.heap) {
            Some(ObjKind::Instance) => {
                let class = match self.heap.get(receiver.as_obj()) {
                    Object::Instance(i) => {
                        if let Some(v) = i.fields.get(&name) {
                            return Ok(*v);
                        }
                        i.class
                    }
                    _ => unreachable!("checked instance kind"),
                };
                if let Some(method) = self.find_method(Some(class), &name) {
                    return Ok(method);
                }
                match self.heap.get(class) {
                    Object::Class(c) => Ok(c.statics.get(&name).copied().unwrap_or(Value::NIL)),
                    _ => Ok(Value::NIL),
                }
            }
            Some(ObjKind::Class) => match self.heap.get(receiver.as_obj()) {
                Object::Class(c) => Ok(c
                    .statics
                    .get(&name)
                    .or_else(|| c.methods.get(&name))
                    .copied()
                    .unwrap_or(Value::NIL)),
                _ => unreachable!("checked class kind"),
            },
            Some(ObjKind::Map) => match self.heap.get(receiver.as_obj()) {
                Object::Map(m) => Ok(m.entries.get(&name).copied().unwrap_or(Value::NIL)),
                _ => unreachable!("checked map kind"),
            },
            Some(ObjKind::Module) => match self.heap.get(receiver.as_obj()) {
                Object::Module(m) => Ok(m.exports.get(&name).copied().unwrap_or(Value::NIL)),
                _ => unreachable!("checked module kind"),
            },
            _ => Err(RuntimeError::type_error(format!(
                "{} has no properties",
                receiver.type_name(&self.heap)
            ))),
        }
    }

    /// SETPROP(A, B, C).
    pub(crate) fn set_property(
        &mut self,
        receiver: Value,
        name: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let name = self.name_of(name)?;
        match receiver.kind(&self.heap) {
            Some(ObjKind::Instance) => {
                if let Object::Instance(i) = self.heap.get_mut(receiver.as_obj()) {
                    i.fields.insert(name, value);
                }
                Ok(())
            }
            Some(ObjKind::Class) => {
                if let Object::Class(c) = self.heap.get_mut(receiver.as_obj()) {
                    c.statics.insert(name, value);
                }
                Ok(())
            }
            Some(ObjKind::Map) => {
                if let Object::Map(m) = self.heap.get_mut(receiver.as_obj()) {
                    m.entries.insert(name, value);
                }
                Ok(())
            }
            Some(ObjKind::Module) => {
                if let Object::Module(m) = self.heap.get_mut(receiver.as_obj()) {
                    m.exports.insert(name, value);
                }
                Ok(())
            }
            _ => Err(RuntimeError::type_error(format!(
                "{} has no properties",
                receiver.type_name(&self.heap)
            ))),
        }
    }

    /// INHERIT(A, B): wire `R(A)`'s parent to class `R(B)`.
    pub(crate) fn inherit(&mut self, class: Value, parent: Value) -> Result<(), RuntimeError> {
        if !class.is_class(&self.heap) || !parent.is_class(&self.heap) {
            return Err(RuntimeError::type_error("INHERIT expects two classes"));
        }
        if class.as_obj() == parent.as_obj() {
            return Err(RuntimeError::value("a class cannot inherit from itself"));
        }
        if let Object::Class(c) = self.heap.get_mut(class.as_obj()) {
            c.parent = Some(parent.as_obj());
        }
        Ok(())
    }
}
