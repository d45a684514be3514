//! # Authentication Module
//!
//! Account sessions, the credential cache and the authentication provider
//! for OneDrive consumer (Microsoft account) and business (Azure AD)
//! identities.
//!
//! ## Overview
//!
//! - [`AccountSession`] is the token state of one identity
//! - [`CredentialCache`] stores sessions keyed by identity, with a versioned
//!   binary blob for persistence and [`CacheNotification`] hooks
//! - [`AuthenticationProvider`] resolves a usable session (memory, refresh,
//!   cache, then a [`TokenStrategy`]) and attaches it to requests
//! - [`oauth`] holds the token endpoint client and PKCE helpers
//!
//! ## Strategies
//!
//! - [`AuthorizationCodeStrategy`] - web view sign-in, silent first
//! - [`RefreshTokenStrategy`] - bootstrap from a known refresh token
//! - [`ClientCredentialsStrategy`] - app-only, secret or certificate assertion
//! - [`DelegatedTokenStrategy`] - tokens from a host broker

pub mod cache;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod session;
pub mod settings;
pub mod strategy;
pub mod types;

pub use cache::{CacheContents, CacheNotification, CredentialCache, SecureStoreCacheNotification};
pub use error::{AuthError, Result};
pub use oauth::{ClientCredential, PkceVerifier, TokenEndpointClient, TokenResponse};
pub use provider::AuthenticationProvider;
pub use session::{AccountSession, CredentialCacheKey, EXPIRATION_BUFFER_SECONDS};
pub use settings::AuthSettings;
pub use strategy::{
    AuthorizationCodeStrategy, ClientAssertionSource, ClientCredentialsStrategy,
    DelegatedTokenStrategy, RefreshTokenStrategy, TokenRequest, TokenSource, TokenStrategy,
};
pub use types::{AccountType, AuthState};
