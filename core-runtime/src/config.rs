//! # Service Configuration
//!
//! Provides the immutable configuration value the OneDrive client is built
//! from.
//!
//! ## Overview
//!
//! [`ServiceConfig`] carries the application registration (app id, secret,
//! return URL, scopes), the identity and API endpoints for the chosen
//! [`ClientType`], transport settings and the host bridges. It is assembled by
//! [`ServiceConfigBuilder`], which fills per-client-type defaults and validates
//! everything before handing out a config. Nothing reads these values from
//! globals; every component receives the config (or a piece of it) at
//! construction.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - injected, or the desktop `ReqwestHttpClient` when the
//!   `desktop-shims` feature is enabled
//!
//! ## Optional Dependencies
//!
//! - `SecureStore` - persists the credential cache between runs
//! - `WebAuthenticationUi` - required only by interactive strategies
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{ClientType, ServiceConfig};
//!
//! let config = ServiceConfig::builder(ClientType::Consumer)
//!     .app_id("0000000040123456")
//!     .scopes(["onedrive.readwrite", "wl.offline_access"])
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! The builder fails fast with [`Error::Config`] or
//! [`Error::CapabilityMissing`] and a message naming the setter to call:
//!
//! ```should_panic
//! use core_runtime::config::{ClientType, ServiceConfig};
//!
//! // No app id: the builder refuses to produce a config
//! let config = ServiceConfig::builder(ClientType::Consumer)
//!     .build()
//!     .expect("Should fail - missing app id");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, SecureStore, WebAuthenticationUi};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Upload chunk sizes must be a multiple of this (320 KiB).
pub const UPLOAD_CHUNK_ALIGNMENT: usize = 320 * 1024;

/// Default upload chunk size (5 MiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default overall timeout for one logical send, redirects included.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(100);

/// Default interval between async-operation monitor polls.
pub const DEFAULT_MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Secure store key for the credential cache blob.
pub const DEFAULT_CREDENTIAL_STORE_KEY: &str = "onedrive_credential_cache";

pub const ENV_CLIENT_ID: &str = "ONEDRIVE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "ONEDRIVE_CLIENT_SECRET";
pub const ENV_RETURN_URL: &str = "ONEDRIVE_RETURN_URL";

/// Which OneDrive service family the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    /// OneDrive personal, Microsoft account (MSA) sign-in.
    Consumer,
    /// OneDrive for Business, Azure AD (ADAL) sign-in.
    Business,
}

impl ClientType {
    /// Name of the header carrying the SDK version on every API request.
    pub fn version_header_name(&self) -> &'static str {
        match self {
            ClientType::Consumer => "X-RequestStats",
            ClientType::Business => "X-ClientService-ClientTag",
        }
    }

    pub fn is_business(&self) -> bool {
        matches!(self, ClientType::Business)
    }

    fn default_return_url(&self) -> &'static str {
        match self {
            ClientType::Consumer => "https://login.live.com/oauth20_desktop.srf",
            ClientType::Business => "urn:ietf:wg:oauth:2.0:oob",
        }
    }

    fn default_scopes(&self) -> Vec<String> {
        match self {
            ClientType::Consumer => ["onedrive.readwrite", "wl.signin", "wl.offline_access"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            // ADAL requests a resource, not scopes
            ClientType::Business => Vec::new(),
        }
    }
}

/// Identity provider and API endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub sign_out_url: Option<String>,
    /// Business only: discovery service listing the tenant's capabilities.
    pub discovery_url: Option<String>,
    /// Business only: resource id the discovery token is requested for.
    pub discovery_resource: Option<String>,
    /// API base URL. Required for consumer; for business, setting it skips
    /// discovery.
    pub api_base_url: Option<String>,
    /// Business only: resource id for the API token when discovery is skipped.
    pub service_resource: Option<String>,
}

impl ServiceEndpoints {
    pub fn consumer() -> Self {
        Self {
            authorize_url: "https://login.live.com/oauth20_authorize.srf".to_string(),
            token_url: "https://login.live.com/oauth20_token.srf".to_string(),
            sign_out_url: Some("https://login.live.com/oauth20_logout.srf".to_string()),
            discovery_url: None,
            discovery_resource: None,
            api_base_url: Some("https://api.onedrive.com/v1.0".to_string()),
            service_resource: None,
        }
    }

    pub fn business() -> Self {
        Self {
            authorize_url: "https://login.microsoftonline.com/common/oauth2/authorize".to_string(),
            token_url: "https://login.microsoftonline.com/common/oauth2/token".to_string(),
            sign_out_url: Some(
                "https://login.microsoftonline.com/common/oauth2/logout".to_string(),
            ),
            discovery_url: Some("https://api.office.com/discovery/v2.0/me/services".to_string()),
            discovery_resource: Some("https://api.office.com/discovery/".to_string()),
            api_base_url: None,
            service_resource: None,
        }
    }

    pub fn for_client_type(client_type: ClientType) -> Self {
        match client_type {
            ClientType::Consumer => Self::consumer(),
            ClientType::Business => Self::business(),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Bound on one logical send including redirect hops.
    pub overall_timeout: Duration,
    /// Connect timeout handed to the default desktop client.
    pub connect_timeout: Duration,
    /// `User-Agent` set on requests that don't carry one.
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
        }
    }
}

/// Immutable OneDrive client configuration.
///
/// Use [`ServiceConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct ServiceConfig {
    pub client_type: ClientType,
    pub app_id: String,
    pub client_secret: Option<String>,
    pub return_url: String,
    pub scopes: Vec<String>,
    pub endpoints: ServiceEndpoints,
    pub http: HttpSettings,
    pub monitor_poll_interval: Duration,
    pub upload_chunk_size: usize,
    /// Value of the version telemetry header, e.g. `SDK-Version=Rust-v0.1.0`.
    pub sdk_version: String,
    pub credential_store_key: String,

    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Option<Arc<dyn SecureStore>>,
    pub web_ui: Option<Arc<dyn WebAuthenticationUi>>,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("client_type", &self.client_type)
            .field("app_id", &self.app_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("return_url", &self.return_url)
            .field("scopes", &self.scopes)
            .field("endpoints", &self.endpoints)
            .field("http", &self.http)
            .field("monitor_poll_interval", &self.monitor_poll_interval)
            .field("upload_chunk_size", &self.upload_chunk_size)
            .field("sdk_version", &self.sdk_version)
            .field("http_client", &"HttpClient { ... }")
            .field(
                "secure_store",
                &self.secure_store.as_ref().map(|_| "SecureStore { ... }"),
            )
            .field(
                "web_ui",
                &self.web_ui.as_ref().map(|_| "WebAuthenticationUi { ... }"),
            )
            .finish()
    }
}

impl ServiceConfig {
    /// Creates a builder pre-filled with the defaults for `client_type`.
    pub fn builder(client_type: ClientType) -> ServiceConfigBuilder {
        ServiceConfigBuilder::new(client_type)
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - App id and return URL are not empty
    /// - Endpoints are absolute http(s) URLs
    /// - Consumer configs carry an API base URL; business configs can reach
    ///   the API either through discovery or an explicit base URL + resource
    /// - Timeouts and poll interval are non-zero
    /// - The upload chunk size is a positive multiple of 320 KiB
    pub fn validate(&self) -> Result<()> {
        if self.app_id.trim().is_empty() {
            return Err(Error::Config(
                "App id cannot be empty. Use .app_id() or set ONEDRIVE_CLIENT_ID.".to_string(),
            ));
        }

        if self.return_url.trim().is_empty() {
            return Err(Error::Config("Return URL cannot be empty".to_string()));
        }

        validate_url("authorize_url", &self.endpoints.authorize_url)?;
        validate_url("token_url", &self.endpoints.token_url)?;
        for (name, value) in [
            ("sign_out_url", &self.endpoints.sign_out_url),
            ("discovery_url", &self.endpoints.discovery_url),
            ("api_base_url", &self.endpoints.api_base_url),
        ] {
            if let Some(url) = value {
                validate_url(name, url)?;
            }
        }

        match self.client_type {
            ClientType::Consumer => {
                if self.endpoints.api_base_url.is_none() {
                    return Err(Error::Config(
                        "Consumer clients need an API base URL. Use .api_base_url() to set it."
                            .to_string(),
                    ));
                }
            }
            ClientType::Business => {
                let explicit_service = self.endpoints.api_base_url.is_some()
                    && self.endpoints.service_resource.is_some();
                let discoverable = self.endpoints.discovery_url.is_some()
                    && self.endpoints.discovery_resource.is_some();
                if !explicit_service && !discoverable {
                    return Err(Error::Config(
                        "Business clients need either a discovery endpoint and resource, or \
                         an API base URL and service resource. Use .discovery() or .service()."
                            .to_string(),
                    ));
                }
            }
        }

        if self.http.overall_timeout.is_zero() {
            return Err(Error::Config(
                "Overall timeout must be greater than zero".to_string(),
            ));
        }

        if self.monitor_poll_interval.is_zero() {
            return Err(Error::Config(
                "Monitor poll interval must be greater than zero".to_string(),
            ));
        }

        validate_chunk_size(self.upload_chunk_size)?;

        Ok(())
    }
}

/// Checks that `size` is a positive multiple of [`UPLOAD_CHUNK_ALIGNMENT`].
pub fn validate_chunk_size(size: usize) -> Result<()> {
    if size == 0 || size % UPLOAD_CHUNK_ALIGNMENT != 0 {
        return Err(Error::Config(format!(
            "Upload chunk size {} must be a positive multiple of 320 KiB ({} bytes)",
            size, UPLOAD_CHUNK_ALIGNMENT
        )));
    }
    Ok(())
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be an absolute http(s) URL, got '{}'",
            name, value
        )))
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_settings: &HttpSettings) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for all service calls. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack (URLSession/OkHttp)."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(settings: &HttpSettings) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_connect_timeout(settings.connect_timeout).map_err(|e| {
        Error::Internal(format!("Failed to initialize default HttpClient: {}", e))
    })?;
    Ok(Arc::new(client))
}

/// Builder for constructing [`ServiceConfig`] instances.
pub struct ServiceConfigBuilder {
    client_type: ClientType,
    app_id: Option<String>,
    client_secret: Option<String>,
    return_url: Option<String>,
    scopes: Option<Vec<String>>,
    endpoints: ServiceEndpoints,
    http: HttpSettings,
    monitor_poll_interval: Duration,
    upload_chunk_size: usize,
    credential_store_key: String,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    web_ui: Option<Arc<dyn WebAuthenticationUi>>,
}

impl ServiceConfigBuilder {
    pub fn new(client_type: ClientType) -> Self {
        Self {
            client_type,
            app_id: None,
            client_secret: None,
            return_url: None,
            scopes: None,
            endpoints: ServiceEndpoints::for_client_type(client_type),
            http: HttpSettings::default(),
            monitor_poll_interval: DEFAULT_MONITOR_POLL_INTERVAL,
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            credential_store_key: DEFAULT_CREDENTIAL_STORE_KEY.to_string(),
            http_client: None,
            secure_store: None,
            web_ui: None,
        }
    }

    /// Builder seeded from `ONEDRIVE_CLIENT_ID`, `ONEDRIVE_CLIENT_SECRET` and
    /// `ONEDRIVE_RETURN_URL`. Unset variables leave the defaults in place.
    pub fn from_env(client_type: ClientType) -> Self {
        Self::from_lookup(client_type, |name| std::env::var(name).ok())
    }

    fn from_lookup(client_type: ClientType, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut builder = Self::new(client_type);
        builder.app_id = non_empty(ENV_CLIENT_ID);
        builder.client_secret = non_empty(ENV_CLIENT_SECRET);
        builder.return_url = non_empty(ENV_RETURN_URL);
        builder
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    /// Replaces the default scopes.
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces every endpoint at once.
    pub fn endpoints(mut self, endpoints: ServiceEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.api_base_url = Some(url.into());
        self
    }

    /// Business: discovery endpoint and the resource its token is issued for.
    pub fn discovery(mut self, url: impl Into<String>, resource: impl Into<String>) -> Self {
        self.endpoints.discovery_url = Some(url.into());
        self.endpoints.discovery_resource = Some(resource.into());
        self
    }

    /// Business: skip discovery and talk to a known service directly.
    pub fn service(mut self, api_base_url: impl Into<String>, resource: impl Into<String>) -> Self {
        self.endpoints.api_base_url = Some(api_base_url.into());
        self.endpoints.service_resource = Some(resource.into());
        self
    }

    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.http.overall_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.http.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.http.user_agent = Some(user_agent.into());
        self
    }

    pub fn monitor_poll_interval(mut self, interval: Duration) -> Self {
        self.monitor_poll_interval = interval;
        self
    }

    pub fn upload_chunk_size(mut self, size: usize) -> Self {
        self.upload_chunk_size = size;
        self
    }

    pub fn credential_store_key(mut self, key: impl Into<String>) -> Self {
        self.credential_store_key = key.into();
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Persist the credential cache in the OS keychain.
    #[cfg(feature = "desktop-shims")]
    pub fn keyring_store(self) -> Self {
        self.secure_store(Arc::new(bridge_desktop::KeyringSecureStore::new()))
    }

    pub fn web_ui(mut self, web_ui: Arc<dyn WebAuthenticationUi>) -> Self {
        self.web_ui = Some(web_ui);
        self
    }

    /// Builds the final `ServiceConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(ServiceConfig)` on success, or an error if:
    /// - The app id is missing
    /// - No `HttpClient` was injected and no desktop default is available
    /// - Any value fails [`ServiceConfig::validate`]
    pub fn build(self) -> Result<ServiceConfig> {
        let app_id = self.app_id.ok_or_else(|| {
            Error::Config(
                "App id is required. Use .app_id() or set ONEDRIVE_CLIENT_ID.".to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&self.http)?,
        };

        let config = ServiceConfig {
            client_type: self.client_type,
            app_id,
            client_secret: self.client_secret,
            return_url: self
                .return_url
                .unwrap_or_else(|| self.client_type.default_return_url().to_string()),
            scopes: self
                .scopes
                .unwrap_or_else(|| self.client_type.default_scopes()),
            endpoints: self.endpoints,
            http: self.http,
            monitor_poll_interval: self.monitor_poll_interval,
            upload_chunk_size: self.upload_chunk_size,
            sdk_version: format!("SDK-Version=Rust-v{}", env!("CARGO_PKG_VERSION")),
            credential_store_key: self.credential_store_key,
            http_client,
            secure_store: self.secure_store,
            web_ui: self.web_ui,
        };

        config.validate()?;

        Ok(config)
    }
}
