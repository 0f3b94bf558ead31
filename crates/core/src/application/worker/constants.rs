// Worker constants (no magic values)
use std::time::Duration;

/// Sleep after a failed source read before trying again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Capacity of the transport error channel handed out by in-memory senders
pub const DELIVERY_ERROR_CHANNEL_CAPACITY: usize = 64;
