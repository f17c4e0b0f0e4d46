use std::env;
use std::path::PathBuf;

use sweep_bridge::{BridgeSettings, default_socket_path};
use sweep_core::{BestSelection, SweepSettings};

const MIN_POLL_MS: u64 = 10;
/// Shortest wait between applying a candidate and reading its results.
pub const MIN_SETTLE_MS: u64 = 50;
const MIN_RPC_TIMEOUT_MS: u64 = 100;

/// Hub configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,
    /// Bearer token for API auth.  Empty ⇒ auth disabled.
    pub token: String,

    // ── In-page agent ──────────────────────────────────────────────
    pub bridge: BridgeSettings,

    // ── Sweep defaults (requests may override settle/selection) ────
    pub sweep: SweepSettings,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_path_or(name: &str, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(fallback)
}

impl HubConfig {
    pub fn from_env() -> Self {
        let bridge_defaults = BridgeSettings::default();
        let bridge = BridgeSettings {
            socket_path: env_path_or("SWEEP_BRIDGE_SOCK", default_socket_path),
            element_timeout_ms: env_u64(
                "SWEEP_ELEMENT_TIMEOUT_MS",
                bridge_defaults.element_timeout_ms,
            ),
            poll_interval_ms: env_u64("SWEEP_POLL_MS", bridge_defaults.poll_interval_ms)
                .max(MIN_POLL_MS),
            post_apply_ms: env_u64("SWEEP_POST_APPLY_MS", bridge_defaults.post_apply_ms),
            rpc_timeout_ms: env_u64("SWEEP_RPC_TIMEOUT_MS", bridge_defaults.rpc_timeout_ms)
                .max(MIN_RPC_TIMEOUT_MS),
        };

        let sweep_defaults = SweepSettings::default();
        let sweep = SweepSettings {
            settle_ms: env_u64("SWEEP_SETTLE_MS", sweep_defaults.settle_ms).max(MIN_SETTLE_MS),
            max_candidates_per_parameter: env_usize(
                "SWEEP_MAX_CANDIDATES",
                sweep_defaults.max_candidates_per_parameter,
            )
            .max(1),
            selection: sweep_defaults.selection,
        };

        Self {
            bind: env_str("SWEEP_HUB_BIND", "127.0.0.1"),
            port: env_u16("SWEEP_HUB_PORT", 61020),
            token: env_str("SWEEP_HUB_TOKEN", ""),
            bridge,
            sweep,
        }
    }

    /// Sweep settings for one run, with the caller's overrides applied on
    /// top of the configured defaults.
    pub fn sweep_settings(
        &self,
        settle_ms: Option<u64>,
        selection: Option<BestSelection>,
    ) -> SweepSettings {
        let mut settings = self.sweep;
        if let Some(ms) = settle_ms {
            settings.settle_ms = ms.max(MIN_SETTLE_MS);
        }
        if let Some(selection) = selection {
            settings.selection = selection;
        }
        settings
    }
}
