use super::{TokenRequest, TokenStrategy};
use crate::error::{AuthError, Result};
use crate::oauth::{ClientCredential, TokenEndpointClient};
use crate::session::AccountSession;
use crate::types::AccountType;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Produces a signed client assertion (JWT) for certificate-based
/// app-only authentication. Signing stays with the host, which owns the
/// certificate's private key.
#[async_trait]
pub trait ClientAssertionSource: Send + Sync {
    /// Returns a fresh assertion whose `aud` is `token_url`.
    async fn client_assertion(&self, client_id: &str, token_url: &str) -> Result<String>;
}

enum Credential {
    Secret(String),
    Assertion(Arc<dyn ClientAssertionSource>),
}

/// App-only tokens through the `client_credentials` grant.
///
/// Sessions carry no user and cannot sign out.
pub struct ClientCredentialsStrategy {
    token_client: Arc<TokenEndpointClient>,
    token_url: String,
    credential: Credential,
}

impl ClientCredentialsStrategy {
    pub fn with_secret(
        token_client: Arc<TokenEndpointClient>,
        token_url: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            token_client,
            token_url: token_url.into(),
            credential: Credential::Secret(secret.into()),
        }
    }

    pub fn with_assertion_source(
        token_client: Arc<TokenEndpointClient>,
        token_url: impl Into<String>,
        source: Arc<dyn ClientAssertionSource>,
    ) -> Self {
        Self {
            token_client,
            token_url: token_url.into(),
            credential: Credential::Assertion(source),
        }
    }
}

#[async_trait]
impl TokenStrategy for ClientCredentialsStrategy {
    fn name(&self) -> &'static str {
        "client_credentials"
    }

    #[instrument(skip(self, request), fields(resource = ?request.resource))]
    async fn resolve_token(&self, request: &TokenRequest) -> Result<AccountSession> {
        let credential = match &self.credential {
            Credential::Secret(secret) if secret.is_empty() => {
                return Err(AuthError::InvalidConfiguration(
                    "Client secret must not be empty".to_string(),
                ))
            }
            Credential::Secret(secret) => ClientCredential::Secret(secret.clone()),
            Credential::Assertion(source) => {
                debug!("Requesting client assertion from host");
                ClientCredential::Assertion(
                    source
                        .client_assertion(&request.client_id, &self.token_url)
                        .await?,
                )
            }
        };

        let token = self
            .token_client
            .redeem_client_credentials(&credential, request.resource.as_deref(), &request.scopes)
            .await?;

        Ok(AccountSession::from_token_response(
            &token,
            AccountType::ActiveDirectory,
            Some(request.client_id.clone()),
        )
        .with_can_sign_out(false))
    }
}
