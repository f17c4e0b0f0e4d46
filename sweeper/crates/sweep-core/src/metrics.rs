use serde::{Deserialize, Serialize};

/// Named metric in the tester's performance summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    NetProfit,
    TotalTrades,
    PercentProfitable,
    ProfitFactor,
    MaxDrawdown,
    AvgTrade,
    AvgWinTrade,
    AvgLossTrade,
    AvgBarsInTrade,
}

impl MetricKey {
    pub const ALL: [MetricKey; 9] = [
        MetricKey::NetProfit,
        MetricKey::TotalTrades,
        MetricKey::PercentProfitable,
        MetricKey::ProfitFactor,
        MetricKey::MaxDrawdown,
        MetricKey::AvgTrade,
        MetricKey::AvgWinTrade,
        MetricKey::AvgLossTrade,
        MetricKey::AvgBarsInTrade,
    ];

    /// Wire name used by the in-page agent.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::NetProfit => "net_profit",
            MetricKey::TotalTrades => "total_trades",
            MetricKey::PercentProfitable => "percent_profitable",
            MetricKey::ProfitFactor => "profit_factor",
            MetricKey::MaxDrawdown => "max_drawdown",
            MetricKey::AvgTrade => "avg_trade",
            MetricKey::AvgWinTrade => "avg_win_trade",
            MetricKey::AvgLossTrade => "avg_loss_trade",
            MetricKey::AvgBarsInTrade => "avg_bars_in_trade",
        }
    }
}

/// Point-in-time read of the tester's rendered metrics.
///
/// Any field may be absent when the page had not rendered it. A partial
/// snapshot is still a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_trades: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_profitable: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drawdown: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_trade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_win_trade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_loss_trade: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_bars_in_trade: Option<f64>,
}

impl MetricsSnapshot {
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        match key {
            MetricKey::NetProfit => self.net_profit,
            MetricKey::TotalTrades => self.total_trades,
            MetricKey::PercentProfitable => self.percent_profitable,
            MetricKey::ProfitFactor => self.profit_factor,
            MetricKey::MaxDrawdown => self.max_drawdown,
            MetricKey::AvgTrade => self.avg_trade,
            MetricKey::AvgWinTrade => self.avg_win_trade,
            MetricKey::AvgLossTrade => self.avg_loss_trade,
            MetricKey::AvgBarsInTrade => self.avg_bars_in_trade,
        }
    }

    pub fn set(&mut self, key: MetricKey, value: Option<f64>) {
        let slot = match key {
            MetricKey::NetProfit => &mut self.net_profit,
            MetricKey::TotalTrades => &mut self.total_trades,
            MetricKey::PercentProfitable => &mut self.percent_profitable,
            MetricKey::ProfitFactor => &mut self.profit_factor,
            MetricKey::MaxDrawdown => &mut self.max_drawdown,
            MetricKey::AvgTrade => &mut self.avg_trade,
            MetricKey::AvgWinTrade => &mut self.avg_win_trade,
            MetricKey::AvgLossTrade => &mut self.avg_loss_trade,
            MetricKey::AvgBarsInTrade => &mut self.avg_bars_in_trade,
        };
        *slot = value;
    }

    /// Number of metrics present.
    pub fn present(&self) -> usize {
        MetricKey::ALL
            .iter()
            .filter(|k| self.get(**k).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.present() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_cover_every_key() {
        let mut snap = MetricsSnapshot::default();
        assert!(snap.is_empty());
        for (i, key) in MetricKey::ALL.iter().enumerate() {
            snap.set(*key, Some(i as f64));
        }
        for (i, key) in MetricKey::ALL.iter().enumerate() {
            assert_eq!(snap.get(*key), Some(i as f64), "{}", key.as_str());
        }
        assert_eq!(snap.present(), MetricKey::ALL.len());
    }

    #[test]
    fn wire_names_match_serde_names() {
        for key in MetricKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
    }

    #[test]
    fn absent_fields_are_omitted() {
        let snap = MetricsSnapshot {
            net_profit: Some(12.5),
            ..Default::default()
        };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json, serde_json::json!({ "net_profit": 12.5 }));
    }
}
