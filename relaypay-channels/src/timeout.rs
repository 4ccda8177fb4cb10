use std::future::Future;
use std::time::Duration;

use relaypay_lib::{ChannelError, Result};

/// Run `fut`, bounded by `limit` when one is configured.
pub(crate) async fn bounded<T, F>(operation: &str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ChannelError::Timeout {
                operation: operation.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })?,
        None => fut.await,
    }
}
