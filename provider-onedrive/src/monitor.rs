//! # Async Operation Monitor
//!
//! Long-running operations (copy, large deletes) answer `202 Accepted` with
//! a `Location` monitor URL. [`AsyncMonitor`] polls it until the operation
//! finishes.
//!
//! | Poll response                    | Outcome                              |
//! |----------------------------------|--------------------------------------|
//! | 2xx other than 202               | `Ok(Some(result))`                   |
//! | status `cancelled`               | `Ok(None)`                           |
//! | status `failed` / `deleteFailed` | `generalException` with the message  |
//! | no decodable status              | `generalException`                   |
//! | anything else                    | progress callback, sleep, poll again |
//!
//! Caller cancellation ends polling with `Ok(None)`.

use crate::client::OneDriveClient;
use crate::error::{ErrorCode, OneDriveError, Result};
use crate::models::AsyncOperationStatus;
use crate::request::decode_json;
use bridge_traits::{HttpMethod, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Progress callback invoked with every non-terminal status.
pub type ProgressCallback<'a> = &'a (dyn Fn(&AsyncOperationStatus) + Send + Sync);

pub struct AsyncMonitor<T> {
    client: OneDriveClient,
    monitor_url: String,
    poll_interval: Duration,
    _result: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> AsyncMonitor<T> {
    pub fn new(client: OneDriveClient, monitor_url: impl Into<String>) -> Self {
        let poll_interval = client.config().monitor_poll_interval;
        Self {
            client,
            monitor_url: monitor_url.into(),
            poll_interval,
            _result: PhantomData,
        }
    }

    /// Monitor for the `Location` of a `202 Accepted` response.
    pub fn from_response(client: OneDriveClient, response: &HttpResponse) -> Result<Self> {
        let location = response.header("Location").ok_or_else(|| {
            OneDriveError::general("Monitor URL not present in the accepted response.")
        })?;
        Ok(Self::new(client, location))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn monitor_url(&self) -> &str {
        &self.monitor_url
    }

    /// Polls until the operation reaches a terminal state.
    ///
    /// Returns `Ok(None)` when the service reports the operation cancelled
    /// or `cancellation` fires first.
    #[instrument(skip(self, progress, cancellation))]
    pub async fn poll_for_operation_completion(
        &self,
        progress: Option<ProgressCallback<'_>>,
        cancellation: &CancellationToken,
    ) -> Result<Option<T>> {
        while !cancellation.is_cancelled() {
            let request = HttpRequest::new(HttpMethod::Get, self.monitor_url.clone());
            let response = match self
                .client
                .send_authenticated(request, Some(cancellation))
                .await
            {
                Ok(response) => response,
                Err(e) if cancellation.is_cancelled() && e.code() == ErrorCode::Timeout => {
                    debug!("Polling cancelled during request");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            if response.status != 202 {
                info!(status = response.status, "Operation completed");
                return decode_json(&response).map(Some);
            }

            let status = match decode_json::<AsyncOperationStatus>(&response) {
                Ok(status) if status.status.is_some() => status,
                _ => return Err(OneDriveError::general("Error retrieving monitor status.")),
            };

            match status.status.as_deref() {
                Some("cancelled") => {
                    info!("Operation was cancelled by the service");
                    return Ok(None);
                }
                Some(state @ ("failed" | "deleteFailed")) => {
                    let message = status
                        .message()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Operation {}", state));
                    warn!(state, message = %message, "Operation failed");
                    return Err(OneDriveError::general(message));
                }
                state => {
                    debug!(
                        state = ?state,
                        percentage = ?status.percentage_complete,
                        "Operation in progress"
                    );
                    if let Some(report) = progress {
                        report(&status);
                    }
                }
            }

            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!("Polling cancelled by caller");
        Ok(None)
    }
}
