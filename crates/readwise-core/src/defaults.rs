//! Centralized default constants for the readwise client.
//!
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// BACKEND
// =============================================================================

/// Default backend origin.
pub const BASE_URL: &str = "http://localhost:8000";

/// Path prefix for every backend route.
pub const API_PREFIX: &str = "/api";

/// Timeout for plain (non-streaming) requests, in seconds.
///
/// Job streams are not bounded by this timeout: an extraction can run for
/// tens of minutes.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// JOB TRACKING
// =============================================================================

/// Interval between status polls while re-attached to a running job.
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Capacity of each controller's event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Literal payload that ends an event stream.
pub const SSE_DONE: &str = "[DONE]";

/// Prefix of an event line.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Lower bound of a displayed percentage.
pub const PROGRESS_MIN: u8 = 0;

/// Upper bound of a displayed percentage.
pub const PROGRESS_MAX: u8 = 100;

// =============================================================================
// ENVIRONMENT VARIABLES
// =============================================================================

/// Backend origin override.
pub const ENV_BASE_URL: &str = "READWISE_BASE_URL";

/// Request timeout override (seconds).
pub const ENV_TIMEOUT_SECS: &str = "READWISE_TIMEOUT_SECS";

/// Poll interval override (milliseconds).
pub const ENV_POLL_INTERVAL_MS: &str = "READWISE_POLL_INTERVAL_MS";
