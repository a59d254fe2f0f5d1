// =============================================================================
// Application Identity
// =============================================================================

/// Crate name as it appears in tracing targets
pub const APP_CRATE_TARGET: &str = "loopmetrics_server";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".loopmetrics";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "loopmetrics.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "LOOPMETRICS_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "LOOPMETRICS_LOG";

// =============================================================================
// Environment Variables - Metrics
// =============================================================================

/// Route old ranges to the offline store
pub const ENV_SUPPORT_OFFLINE: &str = "LOOPMETRICS_SUPPORT_OFFLINE";

/// Days before today from which queries are served offline
pub const ENV_OFFLINE_CRITICAL_POINT_DAYS: &str = "LOOPMETRICS_OFFLINE_CRITICAL_POINT_DAYS";

/// IANA timezone used for day boundaries
pub const ENV_TIMEZONE: &str = "LOOPMETRICS_TIMEZONE";

// =============================================================================
// Environment Variables - Traverse
// =============================================================================

/// Items traversed concurrently
pub const ENV_TRAVERSE_CONCURRENCY: &str = "LOOPMETRICS_TRAVERSE_CONCURRENCY";

/// Per-attempt query timeout in seconds
pub const ENV_TRAVERSE_QUERY_TIMEOUT_SECS: &str = "LOOPMETRICS_TRAVERSE_QUERY_TIMEOUT_SECS";

// =============================================================================
// Metrics Defaults
// =============================================================================

/// Default number of days served by the online store
pub const DEFAULT_OFFLINE_CRITICAL_POINT_DAYS: u32 = 3;

/// Default timezone name
pub const DEFAULT_TIMEZONE: &str = "UTC";

// =============================================================================
// Traverse Defaults
// =============================================================================

/// Default items in flight (sequential)
pub const DEFAULT_TRAVERSE_CONCURRENCY: usize = 1;

/// Default pause after a failed item, in seconds
pub const DEFAULT_TRAVERSE_FAILURE_COOLDOWN_SECS: u64 = 0;
