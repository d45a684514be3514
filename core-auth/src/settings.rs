//! Identity-side view of the service configuration.

use crate::oauth::TokenEndpointClient;
use crate::types::AccountType;
use bridge_traits::HttpClient;
use core_runtime::config::{ClientType, ServiceConfig};
use std::fmt;
use std::sync::Arc;

/// Everything the authentication layer needs from [`ServiceConfig`].
#[derive(Clone)]
pub struct AuthSettings {
    pub account_type: AccountType,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub return_url: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub sign_out_url: Option<String>,
    /// Azure AD v1 resource tokens are requested for. `None` for consumer
    /// accounts, which use scopes only.
    pub resource: Option<String>,
}

impl AuthSettings {
    pub fn from_service_config(config: &ServiceConfig) -> Self {
        let (account_type, resource) = match config.client_type {
            ClientType::Consumer => (AccountType::MicrosoftAccount, None),
            ClientType::Business => (
                AccountType::ActiveDirectory,
                config
                    .endpoints
                    .service_resource
                    .clone()
                    .or_else(|| config.endpoints.discovery_resource.clone()),
            ),
        };

        Self {
            account_type,
            client_id: config.app_id.clone(),
            client_secret: config.client_secret.clone(),
            return_url: config.return_url.clone(),
            scopes: config.scopes.clone(),
            authorize_url: config.endpoints.authorize_url.clone(),
            token_url: config.endpoints.token_url.clone(),
            sign_out_url: config.endpoints.sign_out_url.clone(),
            resource,
        }
    }

    /// Token endpoint client bound to these settings.
    pub fn token_client(&self, http_client: Arc<dyn HttpClient>) -> TokenEndpointClient {
        TokenEndpointClient::new(
            http_client,
            self.token_url.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
            self.return_url.clone(),
        )
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("account_type", &self.account_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("return_url", &self.return_url)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("sign_out_url", &self.sign_out_url)
            .field("resource", &self.resource)
            .finish()
    }
}
