use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::poll::{await_condition, PollPolicy};
use std::time::Duration;

/// Polls `url` until it answers with a success status.
#[allow(dead_code)]
pub async fn wait_for_http_ok(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    await_condition(&format!("{url} healthy"), PollPolicy::new(timeout, Duration::from_millis(50)), || async move {
        let response = client.get(url).send().await.map_err(|err| ItestError::NodeRpcError(err.to_string()))?;
        Ok(response.status().is_success())
    })
    .await
    .is_ok()
}
