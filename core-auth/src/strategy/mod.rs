//! Token acquisition strategies.
//!
//! The [`AuthenticationProvider`](crate::provider::AuthenticationProvider)
//! owns caching, refresh and state; a strategy only knows how to produce a
//! brand new session when nothing cached can be used.

mod authorization_code;
mod client_credentials;
mod delegated;
mod refresh_token;

pub use authorization_code::AuthorizationCodeStrategy;
pub use client_credentials::{ClientAssertionSource, ClientCredentialsStrategy};
pub use delegated::{DelegatedTokenStrategy, TokenSource};
pub use refresh_token::RefreshTokenStrategy;

use crate::error::Result;
use crate::session::AccountSession;
use crate::types::AccountType;
use async_trait::async_trait;

/// What the provider is asking a strategy for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub account_type: AccountType,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub resource: Option<String>,
    /// User id of the last known session, if any.
    pub login_hint: Option<String>,
}

#[async_trait]
pub trait TokenStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Acquire a new session.
    ///
    /// # Errors
    ///
    /// [`AuthError::AuthenticationCancelled`](crate::AuthError::AuthenticationCancelled)
    /// when the user aborts, any other [`AuthError`](crate::AuthError) when
    /// acquisition fails.
    async fn resolve_token(&self, request: &TokenRequest) -> Result<AccountSession>;

    /// Whether refresh tokens issued through this strategy can be redeemed
    /// silently at the token endpoint.
    ///
    /// When `false`, an acquisition failure during header attachment falls
    /// back to the current access token if one exists.
    fn supports_silent_refresh(&self) -> bool {
        true
    }

    /// Identity-provider side sign-out. Local state is cleared by the
    /// provider regardless.
    async fn sign_out(&self, _session: &AccountSession) -> Result<()> {
        Ok(())
    }
}
