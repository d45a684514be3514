//! # HTTP Transport
//!
//! Sends requests through the host [`HttpClient`], follows redirects itself
//! and turns every non-success response into a typed [`OneDriveError`].
//!
//! ## Redirects
//!
//! 3xx responses other than 304 are followed up to [`MAX_REDIRECTS`] times.
//! Each hop re-sends the same method, headers and body to the resolved
//! `Location`, minus `Authorization`: redirect targets (pre-authenticated
//! download URLs, other hosts) must never see the bearer token.
//!
//! ## Timeouts
//!
//! One overall timeout bounds each hop. It can be changed until the first
//! request goes out; afterwards [`HttpTransport::set_overall_timeout`]
//! fails with `notAllowed`.

use crate::error::{ErrorCode, ErrorDetail, ErrorResponse, OneDriveError, Result};
use bridge_traits::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::config::HttpSettings;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 5;

pub struct HttpTransport {
    http_client: Arc<dyn HttpClient>,
    overall_timeout_ms: AtomicU64,
    sent: AtomicBool,
    user_agent: Option<String>,
}

impl HttpTransport {
    pub fn new(http_client: Arc<dyn HttpClient>, settings: &HttpSettings) -> Self {
        Self {
            http_client,
            overall_timeout_ms: AtomicU64::new(duration_to_ms(settings.overall_timeout)),
            sent: AtomicBool::new(false),
            user_agent: settings.user_agent.clone(),
        }
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms.load(Ordering::SeqCst))
    }

    /// # Errors
    ///
    /// `notAllowed` once any request has been sent.
    pub fn set_overall_timeout(&self, timeout: Duration) -> Result<()> {
        if self.sent.load(Ordering::SeqCst) {
            return Err(OneDriveError::not_allowed(
                "Overall timeout cannot be set after the first request is sent.",
            ));
        }
        self.overall_timeout_ms
            .store(duration_to_ms(timeout), Ordering::SeqCst);
        Ok(())
    }

    /// Sends `request`, following redirects.
    ///
    /// # Errors
    ///
    /// - The service's own error code when the body carries one
    /// - `itemNotFound` for a 404 without a parsable body
    /// - `tooManyRedirects` after [`MAX_REDIRECTS`] hops
    /// - `timeout` when the overall timeout elapses or the host cancels
    /// - `generalException` for anything else, with the cause attached
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.send_inner(request, None).await
    }

    /// Like [`send`](Self::send), racing `cancellation`. A cancelled send
    /// fails with `timeout`.
    pub async fn send_with_cancellation(
        &self,
        request: HttpRequest,
        cancellation: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.send_inner(request, Some(cancellation)).await
    }

    #[instrument(
        skip(self, request, cancellation),
        fields(method = %request.method, url = %loggable_url(&request.url))
    )]
    async fn send_inner(
        &self,
        mut request: HttpRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<HttpResponse> {
        if let Some(user_agent) = &self.user_agent {
            if request.header_value("User-Agent").is_none() {
                request.set_header("User-Agent", user_agent.clone());
            }
        }

        let mut redirects = 0;
        loop {
            let response = self.send_once(request.clone(), cancellation).await?;

            if response.is_redirect() {
                if redirects >= MAX_REDIRECTS {
                    warn!(redirects, "Redirect limit reached");
                    return Err(OneDriveError::from_response(
                        ErrorDetail::new(
                            ErrorCode::TooManyRedirects,
                            format!(
                                "More than {} redirects encountered while sending the request.",
                                MAX_REDIRECTS
                            ),
                        ),
                        response.status,
                    ));
                }
                redirects += 1;
                request = redirect_request(&request, &response)?;
                debug!(
                    hop = redirects,
                    status = response.status,
                    location = %loggable_url(&request.url),
                    "Following redirect"
                );
                continue;
            }

            if response.is_success() || response.status == 304 {
                debug!(status = response.status, "Request completed");
                return Ok(response);
            }

            let error = error_from_response(&response);
            warn!(status = response.status, code = %error.code(), "Service returned an error");
            return Err(error);
        }
    }

    async fn send_once(
        &self,
        request: HttpRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<HttpResponse> {
        self.sent.store(true, Ordering::SeqCst);
        let overall_timeout = self.overall_timeout();
        let send = tokio::time::timeout(overall_timeout, self.http_client.execute(request));

        let outcome = match cancellation {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Request cancelled by caller");
                        return Err(OneDriveError::Timeout {
                            message: "The request was cancelled.".to_string(),
                            source: None,
                        });
                    }
                    outcome = send => outcome,
                }
            }
            None => send.await,
        };

        match outcome {
            Ok(result) => result.map_err(OneDriveError::from),
            Err(_) => {
                warn!(timeout_ms = overall_timeout.as_millis() as u64, "Request timed out");
                Err(OneDriveError::Timeout {
                    message: format!(
                        "The request did not complete within {} ms.",
                        overall_timeout.as_millis()
                    ),
                    source: None,
                })
            }
        }
    }
}

fn redirect_request(current: &HttpRequest, response: &HttpResponse) -> Result<HttpRequest> {
    let location = response.header("Location").ok_or_else(|| {
        OneDriveError::general("Location header not present in redirection response.")
    })?;

    let target = match Url::parse(&current.url) {
        Ok(base) => base.join(location),
        Err(_) => Url::parse(location),
    }
    .map_err(|e| OneDriveError::general(format!("Invalid redirect location '{}': {}", location, e)))?;

    let mut next = current.clone();
    next.url = target.to_string();
    next.remove_header("Authorization");
    Ok(next)
}

/// Maps a non-success response to an error, preferring the service's own
/// error object.
pub(crate) fn error_from_response(response: &HttpResponse) -> OneDriveError {
    if let Ok(ErrorResponse {
        error: Some(detail),
    }) = response.json::<ErrorResponse>()
    {
        return OneDriveError::from_response(detail, response.status);
    }

    let detail = if response.status == 404 {
        ErrorDetail::new(ErrorCode::ItemNotFound, "Item does not exist")
    } else {
        ErrorDetail::new(
            ErrorCode::GeneralException,
            format!("Unexpected exception returned from the service (HTTP {}).", response.status),
        )
    };
    OneDriveError::from_response(detail, response.status)
}

// Query strings of upload and download URLs carry credentials
fn loggable_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::HttpMethod;
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    #[tokio::test]
    async fn test_not_modified_is_returned_without_following() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(304).with_header("Location", "https://elsewhere")));

        let transport = HttpTransport::new(Arc::new(mock), &HttpSettings::default());
        let response = transport
            .send(HttpRequest::new(HttpMethod::Get, "https://api.onedrive.com/v1.0/drive"))
            .await
            .unwrap();

        assert_eq!(response.status, 304);
    }

    #[tokio::test]
    async fn test_caller_user_agent_is_kept() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .withf(|request| request.header_value("User-Agent") == Some("host-app/1.0"))
            .returning(|_| Ok(HttpResponse::new(200)));

        let settings = HttpSettings {
            user_agent: Some("onedrive-core".to_string()),
            ..HttpSettings::default()
        };
        HttpTransport::new(Arc::new(mock), &settings)
            .send(
                HttpRequest::new(HttpMethod::Get, "https://api.onedrive.com/v1.0/drive")
                    .header("User-Agent", "host-app/1.0"),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_relative_location_resolves_against_current_url() {
        let current = HttpRequest::new(HttpMethod::Get, "https://api.onedrive.com/v1.0/drive/items/1/content")
            .bearer_token("secret")
            .header("Accept", "application/json");
        let response = HttpResponse::new(302).with_header("Location", "/redirected/file?x=1");

        let next = redirect_request(&current, &response).unwrap();

        assert_eq!(next.url, "https://api.onedrive.com/redirected/file?x=1");
        assert_eq!(next.method, HttpMethod::Get);
        assert!(next.header_value("authorization").is_none());
        assert_eq!(next.header_value("Accept"), Some("application/json"));
    }

    #[test]
    fn test_missing_location_is_general_exception() {
        let current = HttpRequest::new(HttpMethod::Get, "https://api.onedrive.com/v1.0/drive");
        let err = redirect_request(&current, &HttpResponse::new(301)).unwrap_err();

        assert_eq!(err.code(), ErrorCode::GeneralException);
        assert!(err.message().contains("Location header"));
    }

    #[test]
    fn test_error_body_wins_over_status() {
        let response = HttpResponse::new(404)
            .with_body(r#"{"error":{"code":"accessDenied","message":"Nope"}}"#);
        let err = error_from_response(&response);

        assert_eq!(err.code(), ErrorCode::Other("accessDenied".to_string()));
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_loggable_url_drops_query() {
        assert_eq!(
            loggable_url("https://up.example.com/session?tempauth=abc"),
            "https://up.example.com/session"
        );
        assert_eq!(loggable_url("https://a/b"), "https://a/b");
    }
}
