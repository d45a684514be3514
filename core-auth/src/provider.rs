//! # Authentication Provider
//!
//! Resolves an [`AccountSession`] for outgoing requests and attaches it as
//! the `Authorization` header.
//!
//! ## Resolution order
//!
//! 1. The in-memory session, when it is not expiring (no I/O)
//! 2. One silent refresh of the in-memory session's refresh token
//! 3. The [`CredentialCache`] entry for the same identity, refreshed if needed
//! 4. The configured [`TokenStrategy`]
//!
//! Whatever wins is written back to the cache and becomes the in-memory
//! session. Every transition is mirrored on [`AuthState`] and, when an
//! [`EventBus`] is attached, emitted as an [`AuthEvent`].
//!
//! Callers serialize `authenticate` per provider; the cache tolerates
//! concurrent use from several providers.

use crate::cache::CredentialCache;
use crate::error::{AuthError, Result};
use crate::oauth::TokenEndpointClient;
use crate::session::AccountSession;
use crate::settings::AuthSettings;
use crate::strategy::{TokenRequest, TokenStrategy};
use crate::types::AuthState;
use bridge_traits::HttpRequest;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

const NO_TOKEN_MESSAGE: &str = "Failed to retrieve a valid authentication token for the user";

fn loggable_user(session: &AccountSession) -> String {
    session
        .user_id
        .as_deref()
        .map(|id| redact_if_sensitive("user_id", id))
        .unwrap_or_default()
}

pub struct AuthenticationProvider {
    settings: AuthSettings,
    strategy: Arc<dyn TokenStrategy>,
    token_client: Arc<TokenEndpointClient>,
    cache: Arc<CredentialCache>,
    event_bus: Option<EventBus>,
    current: RwLock<Option<AccountSession>>,
    resource: RwLock<Option<String>>,
    state: RwLock<AuthState>,
}

impl AuthenticationProvider {
    /// # Arguments
    ///
    /// * `settings` - Client id, endpoints and resource
    /// * `strategy` - Acquisition flow used when nothing cached is usable
    /// * `token_client` - Token endpoint used for silent refresh
    /// * `cache` - Shared credential cache
    pub fn new(
        settings: AuthSettings,
        strategy: Arc<dyn TokenStrategy>,
        token_client: Arc<TokenEndpointClient>,
        cache: Arc<CredentialCache>,
    ) -> Self {
        let resource = settings.resource.clone();
        Self {
            settings,
            strategy,
            token_client,
            cache,
            event_bus: None,
            current: RwLock::new(None),
            resource: RwLock::new(resource),
            state: RwLock::new(AuthState::NoSession),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<CredentialCache> {
        &self.cache
    }

    pub fn strategy(&self) -> &Arc<dyn TokenStrategy> {
        &self.strategy
    }

    pub async fn state(&self) -> AuthState {
        *self.state.read().await
    }

    pub async fn current_session(&self) -> Option<AccountSession> {
        self.current.read().await.clone()
    }

    /// Installs a session restored by the host.
    pub async fn set_current_session(&self, session: AccountSession) {
        let state = if session.has_access_token() && !session.is_expiring() {
            AuthState::CachedValid
        } else {
            AuthState::CachedExpiring
        };
        *self.current.write().await = Some(session);
        self.set_state(state).await;
    }

    pub async fn resource(&self) -> Option<String> {
        self.resource.read().await.clone()
    }

    /// Targets a different Azure AD resource.
    ///
    /// The current access token was minted for the old resource, so only the
    /// refresh token is kept; the next [`authenticate`](Self::authenticate)
    /// redeems it for the new one. The cached entry for the same identity is
    /// dropped as well, since cache keys do not carry the resource.
    pub async fn set_resource(&self, resource: impl Into<String>) {
        let resource = resource.into();
        {
            let mut current_resource = self.resource.write().await;
            if current_resource.as_deref() == Some(resource.as_str()) {
                return;
            }
            *current_resource = Some(resource.clone());
        }

        let stale = {
            let mut current = self.current.write().await;
            let stale = current.take();
            *current = stale.as_ref().map(|session| AccountSession {
                access_token: None,
                expires_on_utc: None,
                ..session.clone()
            });
            stale
        };
        if let Some(stale) = stale {
            self.cache.delete(&stale).await;
        }
        debug!(resource = %resource, "Switched token resource");
    }

    /// Returns a session with a usable access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AuthenticationCancelled`] when the user aborted
    /// - [`AuthError::AuthenticationFailed`] when no access token could be
    ///   obtained
    /// - Whatever the strategy raised otherwise
    #[instrument(skip(self), fields(strategy = self.strategy.name()))]
    pub async fn authenticate(&self) -> Result<AccountSession> {
        let current = self.current.read().await.clone();
        let mut attempted_refresh: Option<String> = None;

        if let Some(session) = current.as_ref() {
            if session.has_access_token() && !session.is_expiring() {
                self.set_state(AuthState::CachedValid).await;
                return Ok(session.clone());
            }

            self.set_state(AuthState::CachedExpiring).await;
            if let Some(refreshed) = self.try_refresh(session).await {
                return Ok(self.commit(refreshed).await);
            }
            attempted_refresh = session.refresh_token.clone();
        }

        let user_id = current.as_ref().and_then(|s| s.user_id.clone());
        let cached = self
            .cache
            .get(
                self.settings.account_type,
                Some(&self.settings.client_id),
                user_id.as_deref(),
            )
            .await;

        if let Some(cached) = cached {
            if cached.has_access_token() && !cached.is_expiring() {
                debug!("Using cached session");
                *self.current.write().await = Some(cached.clone());
                self.set_state(AuthState::CachedValid).await;
                return Ok(cached);
            }

            self.set_state(AuthState::CachedExpiring).await;
            if cached.refresh_token.is_some() && cached.refresh_token != attempted_refresh {
                if let Some(refreshed) = self.try_refresh(&cached).await {
                    return Ok(self.commit(refreshed).await);
                }
            }

            self.cache.delete(&cached).await;
        }

        if let Some(stale) = current.as_ref() {
            self.cache.delete(stale).await;
        }

        self.acquire(user_id).await
    }

    /// Authenticates and sets `Authorization` on `request`.
    ///
    /// Strategies that cannot refresh silently keep working with the last
    /// access token when re-acquisition fails for any reason other than a
    /// user cancellation.
    pub async fn append_auth_header(&self, request: &mut HttpRequest) -> Result<()> {
        let session = match self.authenticate().await {
            Ok(session) => session,
            Err(e) if !e.is_cancellation() && !self.strategy.supports_silent_refresh() => {
                match self.current_session().await.filter(|s| s.has_access_token()) {
                    Some(session) => {
                        debug!(error = %e, "Re-acquisition failed, reusing current token");
                        session
                    }
                    None => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let value = session
            .authorization_header_value()
            .ok_or_else(|| AuthError::AuthenticationFailed(NO_TOKEN_MESSAGE.to_string()))?;
        request.set_header("Authorization", value);
        Ok(())
    }

    /// Signs the current user out. No-op when nobody is signed in.
    ///
    /// Identity-provider sign-out failures are logged; local state is
    /// cleared either way.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.current.write().await.take() else {
            debug!("Sign-out requested with no current session");
            return Ok(());
        };

        if session.can_sign_out {
            if let Err(e) = self.strategy.sign_out(&session).await {
                warn!(error = %e, "Identity provider sign-out failed");
            }
        }

        self.cache.delete(&session).await;
        self.set_state(AuthState::NoSession).await;

        info!(user = %loggable_user(&session), "Signed out");
        self.emit(AuthEvent::SignedOut {
            user_id: session.user_id.clone(),
        });
        Ok(())
    }

    async fn try_refresh(&self, session: &AccountSession) -> Option<AccountSession> {
        if !self.strategy.supports_silent_refresh() {
            return None;
        }
        let refresh_token = session.refresh_token.as_deref()?;

        self.set_state(AuthState::Refreshing).await;
        self.emit(AuthEvent::TokenRefreshing {
            user_id: session.user_id.clone(),
        });

        let resource = self.resource.read().await.clone();
        let response = match self
            .token_client
            .redeem_refresh_token(refresh_token, resource.as_deref())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Silent refresh failed");
                return None;
            }
        };

        let mut refreshed = AccountSession::from_token_response(
            &response,
            session.account_type,
            session
                .client_id
                .clone()
                .or_else(|| Some(self.settings.client_id.clone())),
        )
        .with_can_sign_out(session.can_sign_out);
        if refreshed.user_id.is_none() {
            refreshed.user_id = session.user_id.clone();
        }
        if refreshed.scopes.is_empty() {
            refreshed.scopes = session.scopes.clone();
        }

        if !refreshed.has_access_token() {
            warn!("Refresh response carried no access token");
            return None;
        }

        info!(user = %loggable_user(&refreshed), "Token refreshed");
        self.emit(AuthEvent::TokenRefreshed {
            user_id: refreshed.user_id.clone(),
            expires_at: refreshed
                .expires_on_utc
                .map(|t| t.timestamp())
                .unwrap_or_default(),
        });
        Some(refreshed)
    }

    async fn acquire(&self, login_hint: Option<String>) -> Result<AccountSession> {
        self.set_state(AuthState::Interactive).await;
        self.emit(AuthEvent::SigningIn {
            account_type: self.settings.account_type.to_string(),
        });

        let request = TokenRequest {
            account_type: self.settings.account_type,
            client_id: self.settings.client_id.clone(),
            scopes: self.settings.scopes.clone(),
            resource: self.resource.read().await.clone(),
            login_hint: login_hint.clone(),
        };

        let session = match self.strategy.resolve_token(&request).await {
            Ok(session) if session.has_access_token() => session,
            Ok(_) => {
                return Err(self
                    .fail(
                        login_hint,
                        AuthError::AuthenticationFailed(NO_TOKEN_MESSAGE.to_string()),
                    )
                    .await)
            }
            Err(e) => return Err(self.fail(login_hint, e).await),
        };

        let session = self.commit(session).await;
        info!(user = %loggable_user(&session), "Signed in");
        self.emit(AuthEvent::SignedIn {
            user_id: session.user_id.clone(),
            account_type: session.account_type.to_string(),
        });
        Ok(session)
    }

    async fn commit(&self, session: AccountSession) -> AccountSession {
        self.cache.add(session.clone()).await;
        *self.current.write().await = Some(session.clone());
        self.set_state(AuthState::Authenticated).await;
        session
    }

    async fn fail(&self, user_id: Option<String>, error: AuthError) -> AuthError {
        self.set_state(AuthState::Failed).await;
        warn!(error = %error, "Authentication failed");
        self.emit(AuthEvent::AuthError {
            user_id,
            message: error.to_string(),
            cancelled: error.is_cancellation(),
        });
        error
    }

    async fn set_state(&self, state: AuthState) {
        *self.state.write().await = state;
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }
}
