use super::{TokenRequest, TokenStrategy};
use crate::error::{AuthError, Result};
use crate::oauth::{
    build_authorize_url, parse_authorization_callback, AuthorizeRequest, PkceVerifier,
    TokenEndpointClient,
};
use crate::session::AccountSession;
use async_trait::async_trait;
use bridge_traits::{BridgeError, PromptMode, WebAuthenticationUi};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Authorization-code flow through a host web view.
///
/// Every acquisition first navigates with `prompt=none`; only when that
/// cannot complete is the user shown the sign-in page.
pub struct AuthorizationCodeStrategy {
    web_ui: Arc<dyn WebAuthenticationUi>,
    token_client: Arc<TokenEndpointClient>,
    authorize_url: String,
    redirect_uri: String,
    sign_out_url: Option<String>,
}

impl AuthorizationCodeStrategy {
    pub fn new(
        web_ui: Arc<dyn WebAuthenticationUi>,
        token_client: Arc<TokenEndpointClient>,
        authorize_url: impl Into<String>,
        redirect_uri: impl Into<String>,
        sign_out_url: Option<String>,
    ) -> Self {
        Self {
            web_ui,
            token_client,
            authorize_url: authorize_url.into(),
            redirect_uri: redirect_uri.into(),
            sign_out_url,
        }
    }

    async fn acquire(&self, request: &TokenRequest, mode: PromptMode) -> Result<AccountSession> {
        let pkce = PkceVerifier::new();
        let url = build_authorize_url(
            &AuthorizeRequest {
                authorize_url: &self.authorize_url,
                client_id: &request.client_id,
                redirect_uri: &self.redirect_uri,
                scopes: &request.scopes,
                resource: request.resource.as_deref(),
                login_hint: request.login_hint.as_deref(),
                silent: mode == PromptMode::Silent,
            },
            &pkce,
        )?;

        let callback = self
            .web_ui
            .authenticate(&url, &self.redirect_uri, mode)
            .await
            .map_err(map_ui_error)?;

        let response = parse_authorization_callback(&callback)?;
        match response.state.as_deref() {
            Some(state) if state == pkce.state() => {}
            other => {
                return Err(AuthError::StateMismatch {
                    expected: pkce.state().to_string(),
                    actual: other.unwrap_or_default().to_string(),
                })
            }
        }

        let token = self
            .token_client
            .redeem_authorization_code(&response.code, Some(&pkce), request.resource.as_deref())
            .await?;

        Ok(AccountSession::from_token_response(
            &token,
            request.account_type,
            Some(request.client_id.clone()),
        ))
    }
}

fn map_ui_error(error: BridgeError) -> AuthError {
    match error {
        BridgeError::Cancelled(msg) => AuthError::AuthenticationCancelled(msg),
        other => AuthError::AuthenticationFailed(format!("Web authentication failed: {}", other)),
    }
}

#[async_trait]
impl TokenStrategy for AuthorizationCodeStrategy {
    fn name(&self) -> &'static str {
        "authorization_code"
    }

    #[instrument(skip(self, request), fields(account_type = %request.account_type))]
    async fn resolve_token(&self, request: &TokenRequest) -> Result<AccountSession> {
        match self.acquire(request, PromptMode::Silent).await {
            Ok(session) => {
                info!("Silent sign-in succeeded");
                return Ok(session);
            }
            Err(e) => debug!(error = %e, "Silent sign-in did not complete, prompting user"),
        }

        self.acquire(request, PromptMode::Interactive).await
    }

    async fn sign_out(&self, session: &AccountSession) -> Result<()> {
        let Some(sign_out_url) = self.sign_out_url.as_deref() else {
            return Ok(());
        };

        let mut url = Url::parse(sign_out_url).map_err(|e| {
            AuthError::InvalidConfiguration(format!("Invalid sign-out URL: {}", e))
        })?;
        url.query_pairs_mut()
            .append_pair(
                "client_id",
                session
                    .client_id
                    .as_deref()
                    .unwrap_or(self.token_client.client_id()),
            )
            .append_pair("redirect_uri", &self.redirect_uri);

        match self
            .web_ui
            .authenticate(url.as_str(), &self.redirect_uri, PromptMode::Interactive)
            .await
        {
            Ok(_) => Ok(()),
            Err(BridgeError::Cancelled(_)) => {
                warn!("Sign-out page was closed before completing");
                Ok(())
            }
            Err(e) => Err(map_ui_error(e)),
        }
    }
}
