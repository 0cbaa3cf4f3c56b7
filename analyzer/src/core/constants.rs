// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "CtrlScope";

/// Application name in lowercase (for paths, identifiers and log filters)
pub const APP_NAME_LOWER: &str = "ctrlscope";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".ctrlscope";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "ctrlscope.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "CTRLSCOPE_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "CTRLSCOPE_LOG";

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "CTRLSCOPE_DEBUG";

/// Environment variable for the output format (text or json)
pub const ENV_FORMAT: &str = "CTRLSCOPE_FORMAT";

/// Environment variable for the output file
pub const ENV_OUTPUT: &str = "CTRLSCOPE_OUTPUT";

/// Environment variable enabling the staged pipeline
pub const ENV_STAGED: &str = "CTRLSCOPE_STAGED";

/// Environment variable for the decode worker count
pub const ENV_WORKERS: &str = "CTRLSCOPE_WORKERS";

/// Environment variable for the lifecycle base date (YYYY-MM-DD)
pub const ENV_BASE_DATE: &str = "CTRLSCOPE_BASE_DATE";

// =============================================================================
// Lifecycle Defaults
// =============================================================================

/// Action status substring marking a command start
pub const DEFAULT_STARTED_MARKER: &str = "SHM_Updated";

/// Action status substring marking a command finish
pub const DEFAULT_FINISHED_MARKER: &str = "Finish";

/// Year of the date attached to time-only lifecycle timestamps (Jan 1st)
pub const DEFAULT_BASE_YEAR: i32 = 1900;

// =============================================================================
// Pipeline Defaults
// =============================================================================

/// Bounded channel capacity between staged pipeline tasks (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Decode workers in staged mode
pub const DEFAULT_DECODE_WORKERS: usize = 4;

/// Upper bound for the configured decode worker count
pub const MAX_DECODE_WORKERS: usize = 64;

// =============================================================================
// Output
// =============================================================================

/// Command records shown in the text timeline preview
pub const TIMELINE_PREVIEW_LEN: usize = 5;

/// Width of the separator rules in text output
pub const RULE_WIDTH: usize = 80;
