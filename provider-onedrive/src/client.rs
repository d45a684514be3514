//! OneDrive client: owns configuration, transport and authentication, and
//! resolves which service endpoint requests go to.

use crate::discovery;
use crate::error::{OneDriveError, Result};
use crate::request::BaseRequest;
use crate::transport::HttpTransport;
use bridge_traits::{HttpRequest, HttpResponse};
use core_auth::{
    AccountSession, AuthSettings, AuthenticationProvider, AuthorizationCodeStrategy,
    CredentialCache, SecureStoreCacheNotification, TokenStrategy,
};
use core_runtime::config::{ClientType, ServiceConfig};
use core_runtime::events::EventBus;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Per-session service values, resolved by [`OneDriveClient::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub client_type: ClientType,
    pub app_id: String,
    pub return_url: String,
    /// API root every request URL is built from, e.g.
    /// `https://api.onedrive.com/v1.0`
    pub base_url: String,
    /// Azure AD resource API tokens are issued for (business only)
    pub service_resource: Option<String>,
    pub version_header_name: &'static str,
    pub sdk_version: String,
}

/// Entry point for all API traffic.
///
/// Cloning is cheap; clones share transport, credentials and service info.
///
/// # Example
///
/// ```ignore
/// let config = ServiceConfig::builder(ClientType::Consumer)
///     .app_id("00000000-0000-0000-0000-000000000000")
///     .web_ui(web_ui)
///     .build()?;
/// let client = OneDriveClient::builder(config).build()?;
/// client.authenticate().await?;
/// let drive: serde_json::Value = client.api_request("/drive").await?.send(None).await?;
/// ```
#[derive(Clone)]
pub struct OneDriveClient {
    config: Arc<ServiceConfig>,
    transport: Arc<HttpTransport>,
    auth: Arc<AuthenticationProvider>,
    service_info: Arc<RwLock<Option<ServiceInfo>>>,
}

impl OneDriveClient {
    pub fn builder(config: ServiceConfig) -> OneDriveClientBuilder {
        OneDriveClientBuilder::new(config)
    }

    /// Assembles a client from pre-built parts.
    pub fn from_parts(
        config: ServiceConfig,
        transport: Arc<HttpTransport>,
        auth: Arc<AuthenticationProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            auth,
            service_info: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<HttpTransport> {
        &self.transport
    }

    pub fn auth_provider(&self) -> &Arc<AuthenticationProvider> {
        &self.auth
    }

    /// `None` until [`authenticate`](Self::authenticate) succeeds.
    pub async fn service_info(&self) -> Option<ServiceInfo> {
        self.service_info.read().await.clone()
    }

    pub async fn base_url(&self) -> Option<String> {
        self.service_info
            .read()
            .await
            .as_ref()
            .map(|info| info.base_url.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.service_info.read().await.is_some() && self.auth.state().await.is_authenticated()
    }

    /// Resolves service info and a session for it.
    ///
    /// Business clients without an explicit API endpoint first sign in to
    /// the discovery service, look up their OneDrive for Business endpoint,
    /// then switch the session to that endpoint's resource.
    #[instrument(skip(self), fields(client_type = ?self.config.client_type))]
    pub async fn authenticate(&self) -> Result<AccountSession> {
        let endpoints = &self.config.endpoints;

        let (base_url, service_resource) = match (
            self.config.client_type,
            endpoints.api_base_url.as_ref(),
        ) {
            (ClientType::Consumer, Some(base_url)) => (base_url.clone(), None),
            (ClientType::Consumer, None) => {
                return Err(core_runtime::Error::Config(
                    "Consumer clients need an API base URL".to_string(),
                )
                .into())
            }
            (ClientType::Business, Some(base_url)) => {
                (base_url.clone(), endpoints.service_resource.clone())
            }
            (ClientType::Business, None) => {
                let discovery_url = endpoints.discovery_url.as_deref().ok_or_else(|| {
                    OneDriveError::from(core_runtime::Error::Config(
                        "Business clients need a discovery endpoint or an API base URL"
                            .to_string(),
                    ))
                })?;
                if let Some(resource) = endpoints.discovery_resource.as_deref() {
                    self.auth.set_resource(resource).await;
                }
                self.auth.authenticate().await?;

                let service = discovery::discover_my_files(self, discovery_url).await?;
                (service.endpoint_uri, Some(service.resource_id))
            }
        };

        if let Some(resource) = service_resource.as_deref() {
            self.auth.set_resource(resource).await;
        }
        let session = self.auth.authenticate().await?;

        let info = ServiceInfo {
            client_type: self.config.client_type,
            app_id: self.config.app_id.clone(),
            return_url: self.config.return_url.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_resource,
            version_header_name: self.config.client_type.version_header_name(),
            sdk_version: self.config.sdk_version.clone(),
        };
        info!(base_url = %info.base_url, "Client authenticated");
        *self.service_info.write().await = Some(info);

        Ok(session)
    }

    /// Signs out and forgets the resolved service info.
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await?;
        *self.service_info.write().await = None;
        debug!("Service info cleared");
        Ok(())
    }

    /// Request against an absolute URL.
    pub fn request(&self, request_url: &str) -> BaseRequest {
        BaseRequest::new(self.clone(), request_url)
    }

    /// Request against a path under the resolved API base URL.
    ///
    /// # Errors
    ///
    /// `invalidRequest` before [`authenticate`](Self::authenticate).
    pub async fn api_request(&self, path: &str) -> Result<BaseRequest> {
        let base_url = self.base_url().await.ok_or_else(not_authenticated)?;
        let path = path.trim_start_matches('/');
        Ok(self.request(&format!("{}/{}", base_url, path)))
    }

    /// Attaches credentials to `request` and sends it through the transport.
    ///
    /// Used by requests that target URLs handed out by the service (monitor
    /// and upload session URLs) rather than the API base URL.
    pub async fn send_authenticated(
        &self,
        mut request: HttpRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<HttpResponse> {
        self.auth.append_auth_header(&mut request).await?;
        match cancellation {
            Some(token) => self.transport.send_with_cancellation(request, token).await,
            None => self.transport.send(request).await,
        }
    }
}

pub(crate) fn not_authenticated() -> OneDriveError {
    OneDriveError::invalid_request("The client must be authenticated before sending a request.")
}

/// Builds a [`OneDriveClient`] from a [`ServiceConfig`].
///
/// When no strategy is given the authorization-code flow is used, which
/// needs a [`WebAuthenticationUi`](bridge_traits::WebAuthenticationUi) in
/// the config.
pub struct OneDriveClientBuilder {
    config: ServiceConfig,
    strategy: Option<Arc<dyn TokenStrategy>>,
    cache: Option<Arc<CredentialCache>>,
    event_bus: Option<EventBus>,
}

impl OneDriveClientBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            strategy: None,
            cache: None,
            event_bus: None,
        }
    }

    pub fn strategy(mut self, strategy: Arc<dyn TokenStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Shares a credential cache with other clients.
    pub fn credential_cache(mut self, cache: Arc<CredentialCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// # Errors
    ///
    /// `CapabilityMissing` when neither a strategy nor a web UI is available.
    pub fn build(self) -> Result<OneDriveClient> {
        let config = self.config;
        let settings = AuthSettings::from_service_config(&config);
        let token_client = Arc::new(settings.token_client(config.http_client.clone()));

        let strategy: Arc<dyn TokenStrategy> = match (self.strategy, config.web_ui.as_ref()) {
            (Some(strategy), _) => strategy,
            (None, Some(web_ui)) => Arc::new(AuthorizationCodeStrategy::new(
                web_ui.clone(),
                token_client.clone(),
                settings.authorize_url.clone(),
                settings.return_url.clone(),
                settings.sign_out_url.clone(),
            )),
            (None, None) => {
                return Err(core_runtime::Error::CapabilityMissing {
                    capability: "WebAuthenticationUi".to_string(),
                    message: "No token strategy configured. Provide a web UI with \
                              ServiceConfigBuilder::web_ui() or a strategy with \
                              OneDriveClientBuilder::strategy()."
                        .to_string(),
                }
                .into())
            }
        };

        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let cache = CredentialCache::new();
                let cache = match &config.secure_store {
                    Some(store) => cache.with_notification(Arc::new(
                        SecureStoreCacheNotification::new(
                            store.clone(),
                            config.credential_store_key.clone(),
                        ),
                    )),
                    None => cache,
                };
                Arc::new(cache)
            }
        };

        let mut auth = AuthenticationProvider::new(settings, strategy, token_client, cache);
        if let Some(event_bus) = self.event_bus {
            auth = auth.with_event_bus(event_bus);
        }

        let transport = Arc::new(HttpTransport::new(config.http_client.clone(), &config.http));
        Ok(OneDriveClient::from_parts(config, transport, Arc::new(auth)))
    }
}
