use super::{TokenRequest, TokenStrategy};
use crate::error::{AuthError, Result};
use crate::oauth::TokenEndpointClient;
use crate::session::AccountSession;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Bootstraps a session from a refresh token the host already holds, e.g.
/// one persisted by a previous installation.
pub struct RefreshTokenStrategy {
    token_client: Arc<TokenEndpointClient>,
    refresh_token: String,
    sign_out_url: Option<String>,
}

impl RefreshTokenStrategy {
    pub fn new(
        token_client: Arc<TokenEndpointClient>,
        refresh_token: impl Into<String>,
        sign_out_url: Option<String>,
    ) -> Self {
        Self {
            token_client,
            refresh_token: refresh_token.into(),
            sign_out_url,
        }
    }
}

impl fmt::Debug for RefreshTokenStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenStrategy")
            .field("refresh_token", &"[REDACTED]")
            .field("sign_out_url", &self.sign_out_url)
            .finish()
    }
}

#[async_trait]
impl TokenStrategy for RefreshTokenStrategy {
    fn name(&self) -> &'static str {
        "refresh_token"
    }

    #[instrument(skip(self, request), fields(account_type = %request.account_type))]
    async fn resolve_token(&self, request: &TokenRequest) -> Result<AccountSession> {
        if self.refresh_token.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token is required to bootstrap a session".to_string(),
            ));
        }

        let token = self
            .token_client
            .redeem_refresh_token(&self.refresh_token, request.resource.as_deref())
            .await?;

        Ok(AccountSession::from_token_response(
            &token,
            request.account_type,
            Some(request.client_id.clone()),
        ))
    }

    async fn sign_out(&self, _session: &AccountSession) -> Result<()> {
        match self.sign_out_url.as_deref() {
            Some(url) => self.token_client.sign_out(url).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountType;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn strategy(http: MockHttpClient, refresh_token: &str) -> RefreshTokenStrategy {
        let client = TokenEndpointClient::new(
            Arc::new(http),
            "https://login.microsoftonline.com/common/oauth2/token",
            "app-id",
            Some("secret".to_string()),
            "urn:ietf:wg:oauth:2.0:oob",
        );
        RefreshTokenStrategy::new(
            Arc::new(client),
            refresh_token,
            Some("https://login.microsoftonline.com/common/oauth2/logout".to_string()),
        )
    }

    fn request() -> TokenRequest {
        TokenRequest {
            account_type: AccountType::ActiveDirectory,
            client_id: "app-id".to_string(),
            scopes: Vec::new(),
            resource: Some("https://contoso-my.sharepoint.com/".to_string()),
            login_hint: None,
        }
    }

    #[tokio::test]
    async fn test_redeems_bootstrap_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|req| {
                let body = String::from_utf8(req.body.clone().unwrap_or_default().to_vec()).unwrap();
                body.contains("refresh_token=bootstrap") && body.contains("resource=")
            })
            .returning(|_| {
                Ok(HttpResponse::new(200).with_body(
                    r#"{"access_token":"at","token_type":"Bearer","expires_in":"3599"}"#,
                ))
            });

        let session = strategy(http, "bootstrap").resolve_token(&request()).await.unwrap();
        assert_eq!(session.account_type, AccountType::ActiveDirectory);
        assert_eq!(session.refresh_token.as_deref(), Some("bootstrap"));
        assert!(session.can_sign_out);
    }

    #[tokio::test]
    async fn test_empty_refresh_token_fails_before_io() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(0);

        let err = strategy(http, "").resolve_token(&request()).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_sign_out_is_http_get() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|req| req.method == HttpMethod::Get && req.url.contains("/oauth2/logout?"))
            .returning(|_| Ok(HttpResponse::new(200)));

        let session = AccountSession::new(AccountType::ActiveDirectory);
        strategy(http, "rt").sign_out(&session).await.unwrap();
    }
}
