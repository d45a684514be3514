//! Request pipeline: URL and header assembly, body encoding, credentials,
//! then the transport.

use crate::client::{not_authenticated, OneDriveClient};
use crate::error::{OneDriveError, Result};
use bridge_traits::{HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Request body.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Sent as-is.
    Bytes(Bytes),
    /// Encoded with the request's content type.
    Json(serde_json::Value),
}

impl RequestBody {
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|source| OneDriveError::Decode {
                message: "Unable to serialize the request body.".to_string(),
                source,
            })
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        RequestBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

/// One API request.
///
/// The URL is split into a base path and ordered, decoded query options;
/// both can be edited before sending.
#[derive(Clone)]
pub struct BaseRequest {
    client: OneDriveClient,
    method: HttpMethod,
    request_url: String,
    query_options: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    content_type: String,
}

impl std::fmt::Debug for BaseRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseRequest")
            .field("method", &self.method)
            .field("request_url", &self.request_url)
            .field("query_options", &self.query_options)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl BaseRequest {
    pub fn new(client: OneDriveClient, request_url: &str) -> Self {
        let (base, query) = match request_url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (request_url, None),
        };

        let query_options = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            client,
            method: HttpMethod::Get,
            request_url: base.to_string(),
            query_options,
            headers: Vec::new(),
            content_type: JSON_CONTENT_TYPE.to_string(),
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_options.push((name.into(), value.into()));
        self
    }

    /// Content type for JSON bodies. Defaults to `application/json`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn http_method(&self) -> HttpMethod {
        self.method
    }

    /// URL without the query string.
    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    pub fn query_options(&self) -> &[(String, String)] {
        &self.query_options
    }

    /// Full URL with the query options re-encoded in order.
    pub fn url(&self) -> String {
        if self.query_options.is_empty() {
            return self.request_url.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query_options.iter())
            .finish();
        format!("{}?{}", self.request_url, query)
    }

    /// Sends and decodes a JSON response.
    pub async fn send<T: DeserializeOwned>(&self, body: Option<RequestBody>) -> Result<T> {
        let response = self.send_raw(body).await?;
        decode_json(&response)
    }

    /// Sends and returns the raw response.
    ///
    /// # Errors
    ///
    /// `invalidRequest` when the client has not been authenticated; no
    /// request is sent in that case.
    pub async fn send_raw(&self, body: Option<RequestBody>) -> Result<HttpResponse> {
        self.send_inner(body, None).await
    }

    pub async fn send_raw_with_cancellation(
        &self,
        body: Option<RequestBody>,
        cancellation: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.send_inner(body, Some(cancellation)).await
    }

    #[instrument(skip(self, body, cancellation), fields(method = %self.method))]
    async fn send_inner(
        &self,
        body: Option<RequestBody>,
        cancellation: Option<&CancellationToken>,
    ) -> Result<HttpResponse> {
        let info = self
            .client
            .service_info()
            .await
            .ok_or_else(not_authenticated)?;

        let mut request = HttpRequest::new(self.method, self.url());
        for (name, value) in &self.headers {
            request.set_header(name.clone(), value.clone());
        }
        request.set_header(info.version_header_name, info.sdk_version.clone());

        match body {
            Some(RequestBody::Bytes(bytes)) => {
                request.body = Some(bytes);
            }
            Some(RequestBody::Json(value)) => {
                let encoded = serde_json::to_vec(&value).map_err(|source| OneDriveError::Decode {
                    message: "Unable to serialize the request body.".to_string(),
                    source,
                })?;
                request.set_header("Content-Type", self.content_type.clone());
                request.body = Some(Bytes::from(encoded));
            }
            None => {}
        }

        debug!(query_options = self.query_options.len(), "Sending API request");
        self.client.send_authenticated(request, cancellation).await
    }
}

pub(crate) fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|source| OneDriveError::Decode {
        message: "Unable to deserialize the response.".to_string(),
        source,
    })
}
