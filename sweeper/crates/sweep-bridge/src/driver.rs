use std::sync::Arc;

use async_trait::async_trait;
use sweep_core::{InputDriver, StepError, poll_until};
use tokio::time::sleep;
use tracing::debug;

use crate::client::PageBridgeClient;
use crate::discover::InputInfo;
use crate::error::BridgeError;
use crate::settings::BridgeSettings;

/// Render a candidate for a text input without float noise.
pub fn format_value(value: f64) -> String {
    if value == 0.0 {
        // Avoids "-0".
        return "0".to_string();
    }
    format!("{value}")
}

/// Sets strategy inputs through the agent and triggers the recompute.
pub struct DomInputDriver {
    client: Arc<PageBridgeClient>,
    settings: BridgeSettings,
}

impl DomInputDriver {
    pub fn new(client: Arc<PageBridgeClient>, settings: BridgeSettings) -> Self {
        Self { client, settings }
    }

    /// Controls of the strategy settings dialog, waiting for it to open.
    /// Empty when it never opens within the element timeout.
    pub async fn list_inputs(&self) -> Result<Vec<InputInfo>, BridgeError> {
        let client = &self.client;
        let listed = poll_until(self.settings.element_poll(), move || async move {
            match client.list_inputs().await {
                Ok(Some(inputs)) => Some(Ok(inputs)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        })
        .await;
        match listed {
            Some(Ok(inputs)) => Ok(inputs),
            Some(Err(e)) => Err(e),
            None => {
                debug!("settings dialog not open, no inputs listed");
                Ok(Vec::new())
            }
        }
    }

    /// Poll `check` until it reports found. Transport errors end the wait.
    async fn wait_found<F, Fut>(&self, check: F) -> Option<Result<(), BridgeError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, BridgeError>>,
    {
        let mut check = check;
        poll_until(self.settings.element_poll(), move || {
            let attempt = check();
            async move {
                match attempt.await {
                    Ok(true) => Some(Ok(())),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl InputDriver for DomInputDriver {
    async fn set_value(&self, name: &str, value: f64) -> Result<(), StepError> {
        let client = &self.client;

        match self.wait_found(|| client.find_input(name)).await {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(StepError::ControlNotFound { name: name.into() }),
        }

        let text = format_value(value);
        debug!(param = name, value = %text, "setting input");
        client.set_input(name, &text).await?;

        match self.wait_found(|| client.find_apply()).await {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(e.into()),
            None => return Err(StepError::ApplyNotFound),
        }
        client.click_apply().await?;

        sleep(self.settings.post_apply_delay()).await;
        Ok(())
    }
}
