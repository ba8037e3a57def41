//! Heap object variants.
//!
//! Every heap value is one arm of [`Object`]; the discriminant doubles as
//! the type tag the dispatch loop branches on. Objects refer to each other
//! through [`ObjId`] handles, never through raw pointers, so the collector
//! can move over the slab freely.

use crate::error::{ErrorKind, RuntimeError, TraceFrame};
use crate::frame::FiberCore;
use crate::heap::{Heap, ObjId};
use crate::proto::FunctionProto;
use crate::state::FiberState;
use crate::value::Value;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Object type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjKind {
    /// Immutable UTF-8 string.
    String = 0,
    /// Growable value sequence.
    Array,
    /// String-keyed mapping.
    Map,
    /// Bare function (a prototype installed into the heap).
    Function,
    /// Function plus captured upvalues.
    Closure,
    /// Captured variable cell.
    Upvalue,
    /// Host-provided callable.
    Native,
    /// Loaded module.
    Module,
    /// Error with captured stack trace.
    Error,
    /// Value queue.
    Channel,
    /// Iterator over an array, map, or string.
    Iterator,
    /// Class with a method table.
    Class,
    /// Instance of a class.
    Instance,
    /// Cooperative coroutine.
    Fiber,
}

impl ObjKind {
    /// Type name reported to scripts.
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
            Self::Function | Self::Closure => "function",
            Self::Upvalue => "upvalue",
            Self::Native => "function",
            Self::Module => "module",
            Self::Error => "error",
            Self::Channel => "channel",
            Self::Iterator => "iterator",
            Self::Class => "class",
            Self::Instance => "instance",
            Self::Fiber => "fiber",
        }
    }
}

/// FNV-1a over the string bytes; cached on every string object.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Immutable string with its cached hash.
#[derive(Debug, Clone)]
pub struct ObjString {
    /// UTF-8 contents.
    pub text: Box<str>,
    /// Cached FNV-1a hash of the contents.
    pub hash: u64,
}

impl ObjString {
    /// Build a string object, hashing its contents once.
    pub fn new(text: impl Into<Box<str>>) -> Self {
        let text = text.into();
        let hash = fnv1a(text.as_bytes());
        Self { text, hash }
    }
}

/// Growable array of values.
#[derive(Debug, Clone, Default)]
pub struct ObjArray {
    /// Elements in order.
    pub items: Vec<Value>,
}

/// String-keyed map. Iteration order is unspecified; KEYS sorts for
/// reproducibility.
#[derive(Debug, Clone, Default)]
pub struct ObjMap {
    /// Entries.
    pub entries: HashMap<String, Value>,
}

/// A prototype installed into the heap, with its constants materialized.
#[derive(Debug, Clone)]
pub struct ObjFunction {
    /// Shared prototype.
    pub proto: Arc<FunctionProto>,
    /// Constants materialized into values (strings interned once).
    pub consts: Arc<[Value]>,
}

/// A function plus its captured upvalues.
#[derive(Debug, Clone)]
pub struct ObjClosure {
    /// Shared prototype.
    pub proto: Arc<FunctionProto>,
    /// Constants materialized into values.
    pub consts: Arc<[Value]>,
    /// Captured upvalue cells, one per descriptor in the prototype.
    pub upvalues: Vec<ObjId>,
}

/// Which storage an upvalue currently reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpvalueState {
    /// Points into a live register slot of the owning fiber
    /// (`owner == None` means the main fiber).
    Open {
        /// Fiber whose register file holds the slot.
        owner: Option<ObjId>,
        /// Absolute slot index in that fiber's register file.
        slot: usize,
    },
    /// Owns its value; the defining frame has returned.
    Closed(Value),
}

/// A captured variable cell.
#[derive(Debug, Clone)]
pub struct ObjUpvalue {
    /// Open or closed storage.
    pub state: UpvalueState,
}

/// Callable signature of host functions. Natives receive the heap so the
/// conversion helpers in [`crate::native`] can build and inspect composite
/// values.
pub type NativeCallable = Arc<dyn Fn(&mut Heap, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Host-provided callable.
#[derive(Clone)]
pub struct ObjNative {
    /// Registered name.
    pub name: String,
    /// Fixed argument count; negative means variadic.
    pub arity: i32,
    /// The callable itself.
    pub call: NativeCallable,
}

impl fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjNative")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A loaded module: a named bag of exports.
#[derive(Debug, Clone, Default)]
pub struct ObjModule {
    /// Module name.
    pub name: String,
    /// Source path the module was loaded from.
    pub path: String,
    /// Exported bindings.
    pub exports: HashMap<String, Value>,
    /// Set once the module body has run.
    pub loaded: bool,
}

/// An error value with the stack captured at throw time.
#[derive(Debug, Clone)]
pub struct ObjError {
    /// Error taxonomy kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The thrown value for `UserError`s; `nil` otherwise.
    pub payload: Value,
    /// Stack frames, innermost first.
    pub trace: Vec<TraceFrame>,
}

/// A value queue shared between fibers.
#[derive(Debug, Clone, Default)]
pub struct ObjChannel {
    /// Pending values in send order.
    pub queue: VecDeque<Value>,
    /// Bound on queued values; `None` is unbounded.
    pub capacity: Option<usize>,
    /// Closed channels reject sends and drain to nil.
    pub closed: bool,
}

/// Iteration state over an array, map, or string.
#[derive(Debug, Clone)]
pub struct ObjIterator {
    /// The iterated collection.
    pub source: ObjId,
    /// Next position.
    pub index: usize,
    /// Key list snapshot for map iteration, sorted at creation.
    pub keys: Option<Vec<String>>,
}

/// A class: method table, statics, optional parent.
#[derive(Debug, Clone, Default)]
pub struct ObjClass {
    /// Class name.
    pub name: String,
    /// Instance methods.
    pub methods: HashMap<String, Value>,
    /// Static properties.
    pub statics: HashMap<String, Value>,
    /// Parent class for inheritance.
    pub parent: Option<ObjId>,
    /// Constructor, mirrored from `methods["init"]`.
    pub ctor: Option<Value>,
}

/// An instance with per-instance fields.
#[derive(Debug, Clone)]
pub struct ObjInstance {
    /// The instantiated class.
    pub class: ObjId,
    /// Field storage.
    pub fields: HashMap<String, Value>,
}

/// A cooperative coroutine.
///
/// The register file and frame stack live in `core`; while the fiber is the
/// one executing, the interpreter holds the core and this slot is `None`.
#[derive(Debug)]
pub struct ObjFiber {
    /// Lifecycle state.
    pub state: FiberState,
    /// Registers + frames, parked here while not executing.
    pub core: Option<Box<FiberCore>>,
    /// Fiber that resumed this one; `None` is the main fiber.
    pub parent: Option<ObjId>,
    /// Entry closure, invoked on the first resume.
    pub entry: Value,
    /// Absolute register in the resumer where yields/returns land.
    pub resume_dst: usize,
    /// Absolute register of the pending YIELD expression result.
    pub yield_dst: Option<usize>,
    /// Error scheduled by cancellation, thrown at the next resumption.
    pub pending_throw: Option<Value>,
}

/// A heap object.
#[derive(Debug)]
pub enum Object {
    /// String.
    String(ObjString),
    /// Array.
    Array(ObjArray),
    /// Map.
    Map(ObjMap),
    /// Function.
    Function(ObjFunction),
    /// Closure.
    Closure(ObjClosure),
    /// Upvalue cell.
    Upvalue(ObjUpvalue),
    /// Native function.
    Native(ObjNative),
    /// Module.
    Module(ObjModule),
    /// Error.
    Error(ObjError),
    /// Channel.
    Channel(ObjChannel),
    /// Iterator.
    Iterator(ObjIterator),
    /// Class.
    Class(ObjClass),
    /// Instance.
    Instance(ObjInstance),
    /// Fiber.
    Fiber(ObjFiber),
}

impl Object {
    /// Type tag of this object.
    pub const fn kind(&self) -> ObjKind {
        match self {
            Self::String(_) => ObjKind::String,
            Self::Array(_) => ObjKind::Array,
            Self::Map(_) => ObjKind::Map,
            Self::Function(_) => ObjKind::Function,
            Self::Closure(_) => ObjKind::Closure,
            Self::Upvalue(_) => ObjKind::Upvalue,
            Self::Native(_) => ObjKind::Native,
            Self::Module(_) => ObjKind::Module,
            Self::Error(_) => ObjKind::Error,
            Self::Channel(_) => ObjKind::Channel,
            Self::Iterator(_) => ObjKind::Iterator,
            Self::Class(_) => ObjKind::Class,
            Self::Instance(_) => ObjKind::Instance,
            Self::Fiber(_) => ObjKind::Fiber,
        }
    }

    /// Enumerate every object this one keeps alive.
    pub fn trace(&self, mark: &mut dyn FnMut(ObjId)) {
        let mut mark_value = |v: Value, mark: &mut dyn FnMut(ObjId)| {
            if v.is_obj() {
                mark(v.as_obj());
            }
        };
        match self {
            Self::String(_) | Self::Native(_) => {}
            Self::Array(a) => {
                for v in &a.items {
                    mark_value(*v, mark);
                }
            }
            Self::Map(m) => {
                for v in m.entries.values() {
                    mark_value(*v, mark);
                }
            }
            Self::Function(f) => {
                for v in f.consts.iter() {
                    mark_value(*v, mark);
                }
            }
            Self::Closure(c) => {
                for v in c.consts.iter() {
                    mark_value(*v, mark);
                }
                for id in &c.upvalues {
                    mark(*id);
                }
            }
            Self::Upvalue(u) => {
                if let UpvalueState::Closed(v) = u.state {
                    mark_value(v, mark);
                }
            }
            Self::Module(m) => {
                for v in m.exports.values() {
                    mark_value(*v, mark);
                }
            }
            Self::Error(e) => mark_value(e.payload, mark),
            Self::Channel(c) => {
                for v in &c.queue {
                    mark_value(*v, mark);
                }
            }
            Self::Iterator(i) => mark(i.source),
            Self::Class(c) => {
                for v in c.methods.values().chain(c.statics.values()) {
                    mark_value(*v, mark);
                }
                if let Some(parent) = c.parent {
                    mark(parent);
                }
                if let Some(ctor) = c.ctor {
                    mark_value(ctor, mark);
                }
            }
            Self::Instance(i) => {
                mark(i.class);
                for v in i.fields.values() {
                    mark_value(*v, mark);
                }
            }
            Self::Fiber(f) => {
                mark_value(f.entry, mark);
                if let Some(parent) = f.parent {
                    mark(parent);
                }
                if let Some(v) = f.pending_throw {
                    mark_value(v, mark);
                }
                if let Some(core) = &f.core {
                    core.trace(mark);
                }
            }
        }
    }
}
