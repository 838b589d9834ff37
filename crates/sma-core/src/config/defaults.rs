//! Default values for SMA configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Storage Defaults
// ============================================================================

/// Base directory for SMA data.
pub const DEFAULT_DATA_DIR: &str = ".sma";

/// Directory (under the data dir) holding the embedded graph database.
pub const DEFAULT_DATABASE_DIR: &str = "graph.db";

/// SurrealDB namespace. Each org gets its own database inside it.
pub const DEFAULT_NAMESPACE: &str = "sma";

/// Project-local config file name.
pub const PROJECT_CONFIG_FILE: &str = "sma.toml";

// ============================================================================
// Extraction Defaults
// ============================================================================

/// Units normalized and persisted concurrently.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Highest declared API revision still expected to deliver legacy markup.
pub const DEFAULT_MARKUP_MAX_API_REVISION: f64 = 43.0;

// ============================================================================
// Logging Defaults
// ============================================================================

/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "sma=info,sma_core=info";
