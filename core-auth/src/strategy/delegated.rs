use super::{TokenRequest, TokenStrategy};
use crate::error::{AuthError, Result};
use crate::session::AccountSession;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// Host-managed token broker, such as an OS web account manager.
///
/// The broker owns refresh; the core only ever asks it for the current
/// token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire_token(&self, request: &TokenRequest) -> Result<AccountSession>;

    async fn sign_out(&self, _session: &AccountSession) -> Result<()> {
        Ok(())
    }
}

/// Delegates acquisition to a [`TokenSource`].
///
/// Refresh tokens never leave the broker, so this strategy reports
/// `supports_silent_refresh() == false` and a failed re-acquisition keeps
/// using the last access token.
pub struct DelegatedTokenStrategy {
    source: Arc<dyn TokenSource>,
}

impl DelegatedTokenStrategy {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl TokenStrategy for DelegatedTokenStrategy {
    fn name(&self) -> &'static str {
        "delegated"
    }

    #[instrument(skip(self, request), fields(account_type = %request.account_type))]
    async fn resolve_token(&self, request: &TokenRequest) -> Result<AccountSession> {
        let mut session = self.source.acquire_token(request).await?;
        if !session.has_access_token() {
            return Err(AuthError::AuthenticationFailed(
                "Token source returned no access token".to_string(),
            ));
        }
        if session.client_id.is_none() {
            session.client_id = Some(request.client_id.clone());
        }
        // Broker-held refresh tokens are not redeemable here
        session.refresh_token = None;
        Ok(session)
    }

    fn supports_silent_refresh(&self) -> bool {
        false
    }

    async fn sign_out(&self, session: &AccountSession) -> Result<()> {
        self.source.sign_out(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountType;

    struct Broker {
        token: Option<&'static str>,
    }

    #[async_trait]
    impl TokenSource for Broker {
        async fn acquire_token(&self, _request: &TokenRequest) -> Result<AccountSession> {
            let mut session =
                AccountSession::new(AccountType::MicrosoftAccount).with_refresh_token("broker-rt");
            if let Some(token) = self.token {
                session = session.with_access_token(token);
            }
            Ok(session)
        }
    }

    fn request() -> TokenRequest {
        TokenRequest {
            account_type: AccountType::MicrosoftAccount,
            client_id: "app".to_string(),
            scopes: Vec::new(),
            resource: None,
            login_hint: None,
        }
    }

    #[tokio::test]
    async fn test_delegated_session() {
        let strategy = DelegatedTokenStrategy::new(Arc::new(Broker { token: Some("wam") }));
        let session = strategy.resolve_token(&request()).await.unwrap();

        assert!(!strategy.supports_silent_refresh());
        assert_eq!(session.access_token.as_deref(), Some("wam"));
        assert_eq!(session.client_id.as_deref(), Some("app"));
        assert!(session.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_missing_token_fails() {
        let strategy = DelegatedTokenStrategy::new(Arc::new(Broker { token: None }));
        let err = strategy.resolve_token(&request()).await.unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed(_)));
    }
}
