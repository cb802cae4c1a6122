use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use super::PseError;

/// Low-level fetch-with-timeout-and-retry primitive.
///
/// No caching happens here; this layer only knows how to get a JSON body
/// from a URL or fail with the last error after exhausting its retries.
pub struct RequestClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl RequestClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            client: Client::new(),
            timeout,
            max_retries: max_retries.max(1),
        }
    }

    /// Fetch `url` with the given query parameters and parse the body as JSON.
    ///
    /// Each attempt is bounded by the configured timeout. Any failure
    /// (non-2xx status, connect error, timeout, malformed body) triggers a
    /// retry with exponential backoff until the attempt budget is spent.
    pub async fn fetch_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, PseError> {
        let mut last_error = PseError::NoAttempts;

        for attempt in 1..=self.max_retries {
            tracing::debug!(%url, attempt, max = self.max_retries, "API request");

            match self.try_fetch(url, params).await {
                Ok(body) => return Ok(body),
                Err(err) => {
                    tracing::warn!(%url, attempt, error = %err, "request attempt failed");
                    last_error = err;
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn try_fetch(&self, url: &str, params: &[(&str, String)]) -> Result<Value, PseError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PseError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Backoff before retry `attempt + 1`: 1s, 2s, 4s, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(2u64.pow(attempt - 1) * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn unreachable_host_reports_request_error() {
        // Reserved TEST-NET-1 address; connection refused or timed out either way.
        let client = RequestClient::new(Duration::from_millis(200), 1);
        let result = client.fetch_json("http://192.0.2.1:9/api/kse-load", &[]).await;
        assert!(result.is_err());
    }
}
