use std::time::Duration;

pub(crate) const DEFAULT_PORT: u16 = 6000;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
/// Pause after a failed `accept` before polling the listener again.
pub(crate) const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
/// Largest wire frame accepted from a peer.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;
