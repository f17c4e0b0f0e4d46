use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sweep_core::{MetricKey, MetricsSnapshot, ResultReader, poll_until};
use tracing::{debug, warn};

use crate::client::PageBridgeClient;
use crate::error::BridgeError;
use crate::parse::{parse_metric_text, parse_trade_date};
use crate::settings::BridgeSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One row of the tester's trade list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Date cell as rendered.
    pub date_text: String,
    pub date: Option<NaiveDateTime>,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub profit: f64,
}

impl Trade {
    /// Build from the row's cells: date, type, price, quantity, profit.
    /// Rows with fewer cells or unreadable numbers are rejected.
    pub fn from_cells(cells: &[String]) -> Option<Self> {
        let [date, kind, price, quantity, profit, ..] = cells else {
            return None;
        };
        let side = if kind.to_lowercase().contains("buy") {
            Side::Buy
        } else {
            Side::Sell
        };
        Some(Self {
            date_text: date.trim().to_string(),
            date: parse_trade_date(date),
            side,
            price: parse_metric_text(price)?,
            quantity: parse_metric_text(quantity)?,
            profit: parse_metric_text(profit)?,
        })
    }
}

/// Everything the tester currently shows, read in one go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentResults {
    pub metrics: Option<MetricsSnapshot>,
    pub trades: Vec<Trade>,
    pub balance: Option<f64>,
    pub drawdown: Option<f64>,
}

/// Reads the tester's rendered results through the agent.
pub struct DomResultReader {
    client: Arc<PageBridgeClient>,
    settings: BridgeSettings,
}

impl DomResultReader {
    pub fn new(client: Arc<PageBridgeClient>, settings: BridgeSettings) -> Self {
        Self { client, settings }
    }

    /// Poll `check` until the element it reads is rendered.
    ///
    /// `Ok(None)` when it never appears within the element timeout.
    /// Transport errors end the wait.
    async fn poll_found<T, F, Fut>(&self, check: F) -> Result<Option<T>, BridgeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, BridgeError>>,
    {
        let mut check = check;
        let waited = poll_until(self.settings.element_poll(), move || {
            let attempt = check();
            async move {
                match attempt.await {
                    Ok(Some(found)) => Some(Ok(found)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            }
        })
        .await;
        waited.transpose()
    }

    async fn wait_for_results(&self) -> Result<bool, BridgeError> {
        let client = &self.client;
        let found = self
            .poll_found(|| async move {
                client.find_results().await.map(|found| found.then_some(()))
            })
            .await?;
        Ok(found.is_some())
    }

    /// Metrics snapshot, or `None` when the results region never rendered.
    ///
    /// Each metric is parsed on its own; missing or unreadable text leaves
    /// just that metric absent.
    pub async fn snapshot(&self) -> Result<Option<MetricsSnapshot>, BridgeError> {
        if !self.wait_for_results().await? {
            return Ok(None);
        }
        let Some(texts) = self.client.read_metrics().await? else {
            return Ok(None);
        };

        let mut snap = MetricsSnapshot::default();
        for key in MetricKey::ALL {
            let text = texts.get(key.as_str()).and_then(|t| t.as_deref());
            let value = text.and_then(parse_metric_text);
            if value.is_none() {
                debug!(metric = key.as_str(), text = ?text, "metric unreadable");
            }
            snap.set(key, value);
        }
        Ok(Some(snap))
    }

    /// Parsed trade list. Empty when the list never renders.
    pub async fn read_trades(&self) -> Result<Vec<Trade>, BridgeError> {
        let client = &self.client;
        let Some(rows) = self.poll_found(|| client.read_trades()).await? else {
            return Ok(Vec::new());
        };
        let total = rows.len();
        let trades: Vec<Trade> = rows.iter().filter_map(|r| Trade::from_cells(r)).collect();
        if trades.len() < total {
            debug!(skipped = total - trades.len(), "unreadable trade rows skipped");
        }
        Ok(trades)
    }

    pub async fn read_current_balance(&self) -> Result<Option<f64>, BridgeError> {
        self.read_number("balance").await
    }

    pub async fn read_current_drawdown(&self) -> Result<Option<f64>, BridgeError> {
        self.read_number("drawdown").await
    }

    async fn read_number(&self, key: &str) -> Result<Option<f64>, BridgeError> {
        let client = &self.client;
        let text = self.poll_found(|| client.read_text(key)).await?;
        Ok(text.as_deref().and_then(parse_metric_text))
    }

    pub async fn read_current(&self) -> Result<CurrentResults, BridgeError> {
        Ok(CurrentResults {
            metrics: self.snapshot().await?,
            trades: self.read_trades().await?,
            balance: self.read_current_balance().await?,
            drawdown: self.read_current_drawdown().await?,
        })
    }
}

#[async_trait]
impl ResultReader for DomResultReader {
    async fn read(&self) -> Option<MetricsSnapshot> {
        match self.snapshot().await {
            Ok(snap) => snap,
            Err(e) => {
                warn!(error = %e, "reading results failed");
                None
            }
        }
    }
}
