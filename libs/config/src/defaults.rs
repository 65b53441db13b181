//! Default values shared by the configuration model and the runtime.

/// Dispatcher defaults
pub mod dispatcher {
    /// Worker threads when none are configured
    pub const WORKERS: usize = 4;

    pub const LOG_LEVEL: &str = "info";
}

/// Proxy actor and peer session defaults
pub mod proxy {
    /// Concurrent peer sessions, inbound and outbound together
    pub const MAX_SESSIONS: usize = 64;

    /// Outbound connect timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Delay before an outbound session retries (milliseconds)
    pub const RECONNECT_INTERVAL_MS: u64 = 3_000;

    pub const OPEN_HEARTBEAT: bool = true;

    /// Heartbeat send interval (milliseconds)
    pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;

    /// Silence after which a session is dropped (milliseconds)
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 15_000;

    /// Frames cached per unresolved remote actor
    pub const PENDING_LIMIT: usize = 10_000;

    /// Frames cached across all unresolved remote actors
    pub const PENDING_TOTAL_LIMIT: usize = 100_000;
}

/// Shutdown sequencing defaults
pub mod shutdown {
    /// Bound on waiting for one destroy-priority batch (milliseconds)
    pub const DESTROY_TIMEOUT_MS: u64 = 10_000;

    /// Bound on waiting for each listener to close (milliseconds)
    pub const LISTENER_CLOSE_TIMEOUT_MS: u64 = 3_000;
}

/// Environment variable prefix for overrides, e.g. `SKEIN__WORKERS=8`
pub const ENV_PREFIX: &str = "SKEIN";

pub const ENV_SEPARATOR: &str = "__";
