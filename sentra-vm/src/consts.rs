//! Tuning constants of the VM.
//!
//! The profiler thresholds are part of the observable behavior of the tiered
//! JIT and are fixed for reproducibility; see the profiler tests.

/// Calls after which a function is promoted to tier 1.
pub const TIER1_CALL_THRESHOLD: u32 = 100;

/// Calls after which a function is promoted to tier 2.
pub const TIER2_CALL_THRESHOLD: u32 = 1000;

/// Iterations after which a loop is considered hot.
pub const HOT_LOOP_THRESHOLD: u32 = 50;

/// Largest function body, in instructions, eligible for inline expansion.
pub const INLINE_SIZE_LIMIT: usize = 32;

/// Upper bound on cached compiled loops.
pub const LOOP_CACHE_MAX: usize = 256;

/// Upper bound on tier-promoted functions tracked by the profiler.
pub const FN_CACHE_MAX: usize = 512;

/// Longest loop body, in instructions, the analyzer will classify.
pub const MAX_ANALYZED_BODY: usize = 20;

/// Frame stack capacity; exceeding it raises a recoverable `StackOverflow`.
pub const MAX_CALL_FRAMES: usize = 1024;

/// Initial register-file size of a fiber.
pub const REGISTER_FILE_INITIAL: usize = 256;

/// Register-file growth ceiling; exceeding it raises `StackOverflow`.
pub const REGISTER_FILE_CEILING: usize = 1 << 16;

/// Live-object count that arms the first collection cycle.
pub const GC_INITIAL_WATERMARK: usize = 1024;

/// Watermark multiplier applied after each collection.
pub const GC_GROWTH_FACTOR: usize = 2;

/// Smallest interned small integer.
pub const INTERNED_INT_MIN: i64 = -256;

/// Largest interned small integer.
pub const INTERNED_INT_MAX: i64 = 255;

/// Magic prefix of a serialized chunk.
pub const CHUNK_MAGIC: [u8; 4] = [0x1b, b'S', b'N', b'T'];

/// Current chunk format version.
pub const CHUNK_VERSION: u8 = 1;
