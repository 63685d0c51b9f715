// Engine-wide constants

use std::time::Duration;

pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Channels
// ============================================================================

/// Buffer size of the serialized engine message channel
pub(crate) const CHANNEL_BUFFER_SIZE: usize = 100;

// ============================================================================
// Rate Limiting
// ============================================================================

/// Per-app notification budget within one window
pub(crate) const RATE_LIMIT_PER_MINUTE: u32 = 60;

/// Length of one rate-limiting window
pub(crate) const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Cap on distinct apps the limiter tracks at once
pub(crate) const RATE_LIMIT_MAX_APPS: usize = 1000;

/// Limiter upkeep cadence, counted in allocated notification ids
pub(crate) const RATE_LIMIT_CLEANUP_INTERVAL: u64 = 100;

// ============================================================================
// Bus Connection
// ============================================================================

/// Attempts to claim the well-known bus name before giving up
pub(crate) const BUS_CONNECT_ATTEMPTS: usize = 5;

/// Delay between bus connection attempts
pub(crate) const BUS_CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Image Cache
// ============================================================================

/// Cached image files older than this are swept at startup
pub(crate) const CACHE_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
