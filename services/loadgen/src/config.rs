use std::env;
use std::time::Duration;

/// The per-core CPU noise floor below which a `PerfSample` is discarded.
pub const CPU_NOISE_FLOOR: f32 = 0.03;
/// Upper bound on the number of random words in a generated chat message.
pub const MAX_MESSAGE_LENGTH: usize = 10;
/// Join threshold: a user stops picking up new channels once it holds this many.
pub const MAX_HELD_CHANNELS: usize = 11;
/// A user only sheds a channel once it holds at least this many.
pub const MIN_HELD_CHANNELS_TO_LEAVE: usize = 4;
/// The reserved account the server grants telemetry replies to; must match
/// the server's own `MONITOR_USERNAME`.
pub const MONITOR_USERNAME: &str = "monitor";

/// Run parameters for a load-generator invocation, assembled from CLI flags
/// and the `URL`/`WS_URL` environment variables (spec.md §6).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub http_url: String,
    pub ws_url: String,
    pub num_users: usize,
    pub num_actions: u32,
    pub connection_delay: Duration,
    pub delay_before_actions: Duration,
    pub delay_between_actions: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub test_channels: Vec<String>,
}

impl RunConfig {
    /// Reads `URL` / `WS_URL` from the environment, panicking (like the
    /// server's own `main` does for `DATABASE_URL`) if either is unset.
    pub fn endpoints_from_env() -> (String, String) {
        let http_url = env::var("URL").expect("URL must be set");
        let ws_url = env::var("WS_URL").expect("WS_URL must be set");
        (http_url, ws_url)
    }
}

/// The default test-channel pool: ten named channels, matching the
/// original load tester's `test_{i}` naming.
pub fn default_test_channels() -> Vec<String> {
    (0..10).map(|i| format!("test_{i}")).collect()
}
