//! Pipeline-wide constants: progress checkpoints, defaults and limits.

/// Progress at which the collecting stage starts.
pub const COLLECTING_START: f64 = 0.1;

/// Progress reached once every collection chunk has finished.
///
/// Chunk progress is scaled into `[COLLECTING_START, COLLECTING_END]`.
pub const COLLECTING_END: f64 = 0.3;

/// Default number of identifiers per collection chunk.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default number of collection lookups allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default upper bound on identifiers accepted by a single submission.
pub const DEFAULT_MAX_IDENTIFIERS: usize = 100;

/// Default number of finished task results kept for `get_result`.
pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 256;

/// Prefix of generated report names; the task id is appended.
pub const REPORT_NAME_PREFIX: &str = "archi_analysis_";

/// Version stamped into the metadata block of JSON reports.
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Metadata key carrying the machine-readable failure kind on a failed task.
pub const ERROR_KIND_META_KEY: &str = "error_kind";

/// Prefix for environment variable configuration overrides.
pub const ENV_PREFIX: &str = "ARCHI_";
