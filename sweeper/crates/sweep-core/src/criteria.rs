use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::MetricsSnapshot;

/// Thresholds a snapshot must clear to count as a valid candidate.
///
/// A threshold whose metric is absent from the snapshot is unmet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptanceCriteria {
    /// Net profit must be at least this.
    pub min_profit: f64,
    /// Max drawdown must be at most this.
    pub max_drawdown: f64,
    /// Total closed trades must be at least this.
    pub min_trades: f64,
    /// Percent profitable must be at least this (0-100).
    pub min_win_rate: f64,
}

impl Default for AcceptanceCriteria {
    fn default() -> Self {
        Self {
            min_profit: 0.0,
            max_drawdown: 100.0,
            min_trades: 10.0,
            min_win_rate: 50.0,
        }
    }
}

impl AcceptanceCriteria {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_profit.is_finite() {
            return Err(ConfigError::InvalidCriteria("min_profit"));
        }
        if !self.max_drawdown.is_finite() {
            return Err(ConfigError::InvalidCriteria("max_drawdown"));
        }
        if !self.min_trades.is_finite() || self.min_trades < 0.0 {
            return Err(ConfigError::InvalidCriteria("min_trades"));
        }
        if !self.min_win_rate.is_finite() {
            return Err(ConfigError::InvalidCriteria("min_win_rate"));
        }
        Ok(())
    }

    pub fn is_satisfied_by(&self, snap: &MetricsSnapshot) -> bool {
        self.unmet(snap).is_empty()
    }

    /// Names of the thresholds `snap` fails, in declaration order.
    pub fn unmet(&self, snap: &MetricsSnapshot) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !matches!(snap.net_profit, Some(v) if v >= self.min_profit) {
            failed.push("min_profit");
        }
        if !matches!(snap.max_drawdown, Some(v) if v <= self.max_drawdown) {
            failed.push("max_drawdown");
        }
        if !matches!(snap.total_trades, Some(v) if v >= self.min_trades) {
            failed.push("min_trades");
        }
        if !matches!(snap.percent_profitable, Some(v) if v >= self.min_win_rate) {
            failed.push("min_win_rate");
        }
        failed
    }
}
