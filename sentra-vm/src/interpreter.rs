//! [`Interpreter`] implementation.

use crate::error::{RuntimeError, VmError};
use crate::frame::{callee_parts, FiberCore};
use crate::globals::Globals;
use crate::heap::{Heap, ObjId};
use crate::jit::LoopCache;
use crate::loader;
use crate::object::{ObjFunction, Object};
use crate::profiler::Profiler;
use crate::proto::FunctionProto;
use crate::value::Value;

use std::sync::Arc;

mod alu;
mod closure;
mod dispatch;
mod fiber;
mod flow;
mod initialization;
mod intloop;
mod oop;
mod raise;
mod strings;
mod table;

/// The Sentra VM.
///
/// One interpreter instance is single-threaded: fibers are cooperative tasks
/// multiplexed onto the embedding thread. Internal state is deliberately not
/// exposed; scripts communicate with the host through return values, globals,
/// and registered native functions.
#[derive(Debug)]
pub struct Interpreter {
    pub(crate) heap: Heap,
    pub(crate) globals: Globals,
    /// Register file and frame stack of the fiber currently executing.
    pub(crate) exec: FiberCore,
    /// The executing fiber; `None` is the main fiber.
    pub(crate) current_fiber: Option<ObjId>,
    /// Main fiber's core, parked while a child fiber executes.
    pub(crate) parked_main: Option<Box<FiberCore>>,
    /// One past the last value of an open-ended result list, produced by a
    /// `C == 0` call or consumed by a `B == 0` call/return.
    pub(crate) varargs_top: Option<usize>,
    /// Last caught error, read and cleared by GETERROR.
    pub(crate) last_error: Value,
    /// Value in flight between THROW and the handler search.
    pub(crate) thrown: Option<Value>,
    pub(crate) profiler: Profiler,
    pub(crate) loop_cache: LoopCache,
}

impl Interpreter {
    /// A fresh VM with the builtin natives registered and the standard
    /// profiler thresholds.
    pub fn new() -> Self {
        Self::with_profiler(Profiler::new())
    }

    /// A fresh VM sharing (or specializing) an existing profiler, used by
    /// embedders that pin thresholds or aggregate profiles across VMs.
    pub fn with_profiler(profiler: Profiler) -> Self {
        let mut vm = Self {
            heap: Heap::new(),
            globals: Globals::new(),
            exec: FiberCore::new(),
            current_fiber: None,
            parked_main: None,
            varargs_top: None,
            last_error: Value::NIL,
            thrown: None,
            profiler,
            loop_cache: LoopCache::default(),
        };
        vm.install_builtins();
        vm
    }

    /// The object heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The object heap, mutably; used by embedders building argument values.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// The global table.
    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The shared profiler.
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// The last caught error, `nil` when the slot is clear.
    pub fn last_error(&self) -> Value {
        self.last_error
    }

    /// Register a native function under `name`, assigning it a global id.
    pub fn register_native(
        &mut self,
        name: &str,
        arity: i32,
        call: impl Fn(&mut Heap, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> u16 {
        let value = crate::native::native_value(&mut self.heap, name, arity, call);
        let id = self.globals.intern(name);
        self.globals.set(id, value);
        id
    }

    /// Read a global by name, if it has been interned.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.lookup(name).map(|id| self.globals.get(id))
    }

    /// Intern a global name, returning the id GETGLOBAL/SETGLOBAL carry.
    /// Compilers call this while resolving names.
    pub fn intern_global(&mut self, name: &str) -> u16 {
        self.globals.intern(name)
    }

    /// Number of loops the JIT has analyzed and cached.
    pub fn compiled_loop_count(&self) -> usize {
        self.loop_cache.len()
    }

    /// Intern `name` and set its slot, for embedders seeding configuration.
    pub fn set_global(&mut self, name: &str, value: Value) {
        let id = self.globals.intern(name);
        self.globals.set(id, value);
    }

    /// Decode a chunk and run its root prototype on the main fiber.
    pub fn run_chunk(&mut self, bytes: &[u8]) -> Result<Value, VmError> {
        let proto = loader::decode_chunk(bytes)?;
        self.run(proto)
    }

    /// Run a prototype on the main fiber to completion.
    pub fn run(&mut self, proto: Arc<FunctionProto>) -> Result<Value, VmError> {
        let consts = self.heap.materialize_consts(&proto);
        let main = Value::object(self.heap.alloc(Object::Function(ObjFunction {
            proto: proto.clone(),
            consts,
        })));
        let (proto, consts) = callee_parts(&self.heap, main).expect("just allocated a function");

        self.exec = FiberCore::new();
        self.current_fiber = None;
        self.parked_main = None;
        self.varargs_top = None;
        self.last_error = Value::NIL;
        self.thrown = None;
        self.push_initial_frame(main, proto, consts)
            .map_err(|e| VmError::Uncaught {
                kind: e.kind,
                message: e.message,
                trace: vec![],
            })?;

        self.run_loop()
    }

    /// Collect garbage now, rooting globals, every live fiber, and the
    /// error slots.
    pub fn collect_garbage(&mut self) {
        let mut roots: Vec<ObjId> = Vec::new();
        for v in self.globals.values() {
            if v.is_obj() {
                roots.push(v.as_obj());
            }
        }
        self.exec.trace(&mut |id| roots.push(id));
        // An open-ended result list can extend past the frame extent `top`
        // tracks; keep it alive until the consuming call claims it.
        if let Some(end) = self.varargs_top {
            for v in &self.exec.registers[..end.min(self.exec.registers.len())] {
                if v.is_obj() {
                    roots.push(v.as_obj());
                }
            }
        }
        if let Some(core) = &self.parked_main {
            core.trace(&mut |id| roots.push(id));
        }
        if let Some(id) = self.current_fiber {
            roots.push(id);
        }
        for v in [self.last_error, self.thrown.unwrap_or(Value::NIL)] {
            if v.is_obj() {
                roots.push(v.as_obj());
            }
        }
        self.heap.collect(roots);
    }

    pub(crate) fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
