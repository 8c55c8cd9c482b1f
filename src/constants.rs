//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Request validation bounds (characters, after trimming)
pub mod validation {
    pub const TITLE_MIN_CHARS: usize = 3;
    pub const TITLE_MAX_CHARS: usize = 200;
    pub const DESCRIPTION_MIN_CHARS: usize = 50;
    pub const DESCRIPTION_MAX_CHARS: usize = 5000;
}

/// Retry/backoff constants
pub mod retry {
    /// Total attempts per provider call (first try included)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Delay before the first retry (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;
}

/// Stream progress milestones reported to clients
pub mod progress {
    pub const INITIALIZING: u8 = 0;
    pub const CACHE_HIT: u8 = 50;
    /// Connecting status of the first attempt; each later attempt adds `STEP`
    pub const CONNECTING: u8 = 10;
    /// Reported once the provider stream is open
    pub const GENERATING: u8 = 20;
    /// Ceiling for fragment-driven progress updates
    pub const GENERATION_CEILING: u8 = 90;
    /// Emit a progress update every N fragments
    pub const FRAGMENTS_PER_UPDATE: usize = 10;
    /// Progress gained per update
    pub const STEP: u8 = 5;
    /// Base progress for retry notices; each attempt adds `STEP`
    pub const RETRY_BASE: u8 = 10;
}

/// Cache constants
pub mod cache {
    /// Key namespace for stored analyses
    pub const KEY_PREFIX: &str = "analysis:";

    /// Number of hex characters of the SHA-256 digest kept in the key
    pub const DIGEST_HEX_CHARS: usize = 16;

    /// Entry time-to-live (7 days)
    pub const DEFAULT_TTL_SECS: u64 = 604_800;

    /// Keys fetched per SCAN round when clearing
    pub const SCAN_BATCH: usize = 500;
}

/// HTTP/Network constants
pub mod network {
    /// Default LLM request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8000;
}

/// Problem record listing defaults
pub mod records {
    pub const DEFAULT_LIST_LIMIT: usize = 20;
    pub const MAX_LIST_LIMIT: usize = 100;
}
