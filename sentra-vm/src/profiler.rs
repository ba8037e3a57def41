//! Call-count and loop-iteration profiler feeding the tiered JIT.
//!
//! Counters are shared behind one mutex so fibers (and an embedder that
//! offloads compilation decisions to another thread) can observe a
//! consistent view; the increment is the only critical section on the hot
//! path, and threshold crossings are reported at most once.

use crate::consts::{
    FN_CACHE_MAX, HOT_LOOP_THRESHOLD, LOOP_CACHE_MAX, TIER1_CALL_THRESHOLD, TIER2_CALL_THRESHOLD,
};
use crate::proto::FunctionProto;

use dyn_clone::DynClone;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Identity of a function, derived from its shared prototype allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FnId(usize);

impl FnId {
    /// Identity of `proto`.
    pub fn of(proto: &Arc<FunctionProto>) -> Self {
        Self(Arc::as_ptr(proto) as usize)
    }
}

/// Optimization tier of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tier {
    /// Interpreted, no feedback consumed.
    Baseline,
    /// Promoted at the tier-1 call threshold.
    Tier1,
    /// Promoted at the tier-2 call threshold.
    Tier2,
}

/// Per-site type observations: at most four distinct tags with counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeFeedback {
    entries: [(u8, u32); 4],
    len: u8,
}

impl TypeFeedback {
    /// Record one observation of `tag`. Tags beyond the fourth distinct one
    /// are dropped.
    pub fn record(&mut self, tag: u8) {
        for entry in self.entries.iter_mut().take(self.len as usize) {
            if entry.0 == tag {
                entry.1 = entry.1.saturating_add(1);
                return;
            }
        }
        if (self.len as usize) < self.entries.len() {
            self.entries[self.len as usize] = (tag, 1);
            self.len += 1;
        }
    }

    /// Observed `(tag, count)` pairs.
    pub fn observed(&self) -> &[(u8, u32)] {
        &self.entries[..self.len as usize]
    }

    /// Whether only a single type has ever been seen here.
    pub fn is_monomorphic(&self) -> bool {
        self.len == 1
    }
}

/// Consumes promotion events from the profiler.
pub trait ProfileReceiver: DynClone + Send {
    /// A function crossed a tier threshold.
    fn on_function_promoted(&mut self, name: &str, tier: Tier);

    /// A loop crossed the hotness threshold.
    fn on_hot_loop(&mut self, loop_id: u32);
}

dyn_clone::clone_trait_object!(ProfileReceiver);

/// Prints promotion events to stderr.
#[derive(Debug, Clone)]
pub struct StderrReceiver;

impl ProfileReceiver for StderrReceiver {
    fn on_function_promoted(&mut self, name: &str, tier: Tier) {
        eprintln!("PROFILER: {name} promoted to {tier:?}");
    }

    fn on_hot_loop(&mut self, loop_id: u32) {
        eprintln!("PROFILER: loop {loop_id} is hot");
    }
}

struct ProfilerState {
    tier1_threshold: u32,
    tier2_threshold: u32,
    hot_loop_threshold: u32,
    call_counts: HashMap<FnId, u32>,
    loop_counts: HashMap<u32, u32>,
    type_feedback: HashMap<u64, TypeFeedback>,
    hot_functions: HashSet<FnId>,
    hot_loops: HashSet<u32>,
    receiver: Option<Box<dyn ProfileReceiver>>,
}

impl ProfilerState {
    fn tier_of(&self, count: u32) -> Tier {
        if count >= self.tier2_threshold {
            Tier::Tier2
        } else if count >= self.tier1_threshold {
            Tier::Tier1
        } else {
            Tier::Baseline
        }
    }
}

/// The shared profiler.
#[derive(Clone)]
pub struct Profiler {
    state: Arc<Mutex<ProfilerState>>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    /// A profiler with the standard thresholds.
    pub fn new() -> Self {
        Self::with_thresholds(TIER1_CALL_THRESHOLD, TIER2_CALL_THRESHOLD, HOT_LOOP_THRESHOLD)
    }

    /// A profiler with explicit thresholds; `u32::MAX` disables a tier.
    pub fn with_thresholds(tier1: u32, tier2: u32, hot_loop: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProfilerState {
                tier1_threshold: tier1,
                tier2_threshold: tier2,
                hot_loop_threshold: hot_loop,
                call_counts: HashMap::new(),
                loop_counts: HashMap::new(),
                type_feedback: HashMap::new(),
                hot_functions: HashSet::new(),
                hot_loops: HashSet::new(),
                receiver: None,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProfilerState> {
        self.state.lock().expect("profiler mutex poisoned")
    }

    /// Install a promotion-event receiver.
    pub fn set_receiver(&self, receiver: Box<dyn ProfileReceiver>) {
        self.lock().receiver = Some(receiver);
    }

    /// Count one call of `f`. Returns `(should_compile, tier)`; the flag is
    /// set exactly when this call crosses a tier threshold, so each function
    /// is promoted at most once per tier.
    pub fn record_call(&self, f: FnId, name: &str) -> (bool, Tier) {
        let mut state = self.lock();
        let count = state.call_counts.entry(f).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;

        if count == state.tier1_threshold {
            if state.hot_functions.len() < FN_CACHE_MAX {
                state.hot_functions.insert(f);
            }
            if let Some(receiver) = state.receiver.as_mut() {
                receiver.on_function_promoted(name, Tier::Tier1);
            }
            tracing::debug!(function = name, "promoted to tier 1");
            (true, Tier::Tier1)
        } else if count == state.tier2_threshold {
            if let Some(receiver) = state.receiver.as_mut() {
                receiver.on_function_promoted(name, Tier::Tier2);
            }
            tracing::debug!(function = name, "promoted to tier 2");
            (true, Tier::Tier2)
        } else {
            (false, state.tier_of(count))
        }
    }

    /// Count one iteration of loop `id`. Returns whether this iteration
    /// crossed the hotness threshold.
    pub fn record_loop(&self, id: u32) -> bool {
        let mut state = self.lock();
        let count = state.loop_counts.entry(id).or_insert(0);
        *count = count.saturating_add(1);
        let crossed = *count == state.hot_loop_threshold;
        if crossed {
            if state.hot_loops.len() < LOOP_CACHE_MAX {
                state.hot_loops.insert(id);
            }
            if let Some(receiver) = state.receiver.as_mut() {
                receiver.on_hot_loop(id);
            }
            tracing::debug!(loop_id = id, "loop is hot");
        }
        crossed
    }

    /// Whether loop `id` has crossed the hotness threshold.
    pub fn is_hot_loop(&self, id: u32) -> bool {
        self.lock().hot_loops.contains(&id)
    }

    /// Whether `f` has been promoted past baseline.
    pub fn is_hot_function(&self, f: FnId) -> bool {
        self.lock().hot_functions.contains(&f)
    }

    /// Record a type observation keyed by call-site pc.
    pub fn record_type(&self, site: u64, tag: u8) {
        self.lock().type_feedback.entry(site).or_default().record(tag);
    }

    /// Feedback recorded for a site, if any.
    pub fn feedback(&self, site: u64) -> Option<TypeFeedback> {
        self.lock().type_feedback.get(&site).copied()
    }

    /// Calls recorded for `f`.
    pub fn call_count(&self, f: FnId) -> u32 {
        self.lock().call_counts.get(&f).copied().unwrap_or(0)
    }

    /// Iterations recorded for loop `id`.
    pub fn loop_count(&self, id: u32) -> u32 {
        self.lock().loop_counts.get(&id).copied().unwrap_or(0)
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Profiler")
            .field("functions", &state.call_counts.len())
            .field("loops", &state.loop_counts.len())
            .field("hot_functions", &state.hot_functions.len())
            .field("hot_loops", &state.hot_loops.len())
            .finish()
    }
}
