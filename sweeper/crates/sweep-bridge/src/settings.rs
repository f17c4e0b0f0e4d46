use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sweep_core::PollPolicy;

const SOCKET_NAME: &str = "tv-sweep-bridge.sock";

/// `$XDG_RUNTIME_DIR/tv-sweep-bridge.sock`, else under `/tmp`.
pub fn default_socket_path() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir).join(SOCKET_NAME),
        _ => PathBuf::from("/tmp").join(SOCKET_NAME),
    }
}

/// Timing for page interaction. All durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub socket_path: PathBuf,
    /// How long to wait for a control or region to appear.
    pub element_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Wait after clicking apply before the step counts as done.
    pub post_apply_ms: u64,
    /// Bound on a single request/response exchange.
    pub rpc_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            element_timeout_ms: 10_000,
            poll_interval_ms: 100,
            post_apply_ms: 2_000,
            rpc_timeout_ms: 5_000,
        }
    }
}

impl BridgeSettings {
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn element_poll(&self) -> PollPolicy {
        PollPolicy {
            timeout_ms: self.element_timeout_ms,
            interval_ms: self.poll_interval_ms,
        }
    }

    pub fn post_apply_delay(&self) -> Duration {
        Duration::from_millis(self.post_apply_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_page_timings() {
        let s = BridgeSettings::default();
        assert_eq!(s.element_poll(), PollPolicy::default());
        assert_eq!(s.post_apply_delay(), Duration::from_secs(2));
        assert_eq!(s.rpc_timeout(), Duration::from_secs(5));
        assert!(s.socket_path.ends_with(SOCKET_NAME));
    }

    #[test]
    fn zero_rpc_timeout_is_clamped() {
        let s = BridgeSettings {
            rpc_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(s.rpc_timeout(), Duration::from_millis(1));
    }
}
