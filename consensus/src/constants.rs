/// The only block version currently accepted
pub const BLOCK_VERSION: u16 = 1;

/// Default per-store cache size, in entries
pub const DEFAULT_CACHE_SIZE: u64 = 10_000;

/// Base mass units charged per transaction, input and output when estimating
/// block mass
pub const MASS_PER_TX: u64 = 16;
pub const MASS_PER_INPUT: u64 = 40;
pub const MASS_PER_OUTPUT: u64 = 36;
pub const MASS_PER_SCRIPT_BYTE: u64 = 1;
