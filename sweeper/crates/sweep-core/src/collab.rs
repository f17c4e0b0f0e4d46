//! Capabilities the optimizer needs from the page.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StepError;
use crate::metrics::MetricsSnapshot;

/// Applies one input value and triggers the tester's recompute.
///
/// Mutates live page state; nothing here is undoable.
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// Locate the control bound to `name`, set it, notify the page of the
    /// change, activate apply and wait out the post-apply delay.
    async fn set_value(&self, name: &str, value: f64) -> Result<(), StepError>;
}

/// Takes a read-only snapshot of the tester's rendered metrics.
#[async_trait]
pub trait ResultReader: Send + Sync {
    /// `None` when the results region could not be located in time.
    async fn read(&self) -> Option<MetricsSnapshot>;
}

#[async_trait]
impl<T: InputDriver + ?Sized> InputDriver for Arc<T> {
    async fn set_value(&self, name: &str, value: f64) -> Result<(), StepError> {
        (**self).set_value(name, value).await
    }
}

#[async_trait]
impl<T: ResultReader + ?Sized> ResultReader for Arc<T> {
    async fn read(&self) -> Option<MetricsSnapshot> {
        (**self).read().await
    }
}
