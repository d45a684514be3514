//! Account sessions and their cache identity.

use crate::oauth::TokenResponse;
use crate::types::AccountType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sessions expiring within this window are refreshed before use (5 minutes).
pub const EXPIRATION_BUFFER_SECONDS: i64 = 300;

/// Longest `expires_in` honoured from a token response (one year); larger
/// values are clamped.
const MAX_TOKEN_LIFETIME_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Token state for one identity.
///
/// Sessions are values: a refresh or re-acquisition produces a new session
/// that replaces the old one wherever it is held.
///
/// # Examples
///
/// ```
/// use core_auth::{AccountSession, AccountType};
/// use chrono::{Duration, Utc};
///
/// let session = AccountSession::new(AccountType::MicrosoftAccount)
///     .with_access_token("token")
///     .with_expires_on(Utc::now() + Duration::hours(1));
///
/// assert!(!session.is_expiring());
/// assert_eq!(session.authorization_header_value().as_deref(), Some("Bearer token"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountSession {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub access_token_type: Option<String>,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub can_sign_out: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub expires_on_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes in first-seen order, without duplicates.
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AccountSession {
    pub fn new(account_type: AccountType) -> Self {
        Self {
            account_type,
            ..Self::default()
        }
    }

    /// Builds a session from a token endpoint response.
    ///
    /// `expires_in` is relative to now; `scope` is URL-decoded and split on
    /// whitespace.
    pub fn from_token_response(
        response: &TokenResponse,
        account_type: AccountType,
        client_id: Option<String>,
    ) -> Self {
        Self::from_token_response_at(response, account_type, client_id, Utc::now())
    }

    pub(crate) fn from_token_response_at(
        response: &TokenResponse,
        account_type: AccountType,
        client_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let scopes = response
            .scope
            .as_deref()
            .map(parse_scopes)
            .unwrap_or_default();

        Self {
            access_token: response.access_token.clone().filter(|t| !t.is_empty()),
            access_token_type: response.token_type.clone(),
            account_type,
            can_sign_out: true,
            client_id,
            expires_on_utc: response
                .expires_in
                .and_then(|seconds| expiry_after(now, seconds)),
            refresh_token: response.refresh_token.clone().filter(|t| !t.is_empty()),
            scopes,
            user_id: response.user_id.clone(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_access_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.access_token_type = Some(token_type.into());
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expires_on(mut self, expires_on: DateTime<Utc>) -> Self {
        self.expires_on_utc = Some(expires_on);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = dedup_scopes(scopes.into_iter().map(Into::into));
        self
    }

    pub fn with_can_sign_out(mut self, can_sign_out: bool) -> Self {
        self.can_sign_out = can_sign_out;
        self
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// True when the session expires within the next five minutes, or has
    /// no expiry at all.
    pub fn is_expiring(&self) -> bool {
        self.is_expiring_at(Utc::now())
    }

    pub fn is_expiring_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_on_utc {
            Some(expires_on) => expires_on <= now + Duration::seconds(EXPIRATION_BUFFER_SECONDS),
            None => true,
        }
    }

    /// `"{token type} {access token}"`, defaulting the type to `Bearer`.
    pub fn authorization_header_value(&self) -> Option<String> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let token_type = self
            .access_token_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("Bearer");
        Some(format!("{} {}", token_type, token))
    }

    pub fn cache_key(&self) -> CredentialCacheKey {
        CredentialCacheKey::new(
            self.account_type,
            self.client_id.as_deref(),
            self.user_id.as_deref(),
        )
    }
}

// Tokens never reach logs
impl fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountSession")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token_type", &self.access_token_type)
            .field("account_type", &self.account_type)
            .field("can_sign_out", &self.can_sign_out)
            .field("client_id", &self.client_id)
            .field("expires_on_utc", &self.expires_on_utc)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("scopes", &self.scopes)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Identity a session is cached under. Same identity, same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCacheKey {
    pub account_type: AccountType,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
}

impl CredentialCacheKey {
    pub fn new(account_type: AccountType, client_id: Option<&str>, user_id: Option<&str>) -> Self {
        Self {
            account_type,
            client_id: client_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
        }
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    // Form encoding uses '+' for spaces
    let decoded = decoded.replace('+', " ");
    dedup_scopes(decoded.split_whitespace().map(str::to_string))
}

fn dedup_scopes(scopes: impl Iterator<Item = String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for scope in scopes {
        if !scope.is_empty() && !result.contains(&scope) {
            result.push(scope);
        }
    }
    result
}

/// `None` leaves the session without an expiry, which reads as expired.
fn expiry_after(now: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(seconds.clamp(0, MAX_TOKEN_LIFETIME_SECONDS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_is_expiring_boundary() {
        let now = fixed_now();
        let at_boundary = AccountSession::new(AccountType::MicrosoftAccount)
            .with_access_token("t")
            .with_expires_on(now + Duration::minutes(5));
        let past_boundary = at_boundary
            .clone()
            .with_expires_on(now + Duration::minutes(5) + Duration::seconds(1));

        assert!(at_boundary.is_expiring_at(now));
        assert!(!past_boundary.is_expiring_at(now));
    }

    #[test]
    fn test_out_of_range_expires_in_is_clamped() {
        let now = fixed_now();
        let response = |expires_in| TokenResponse {
            access_token: Some("a".to_string()),
            expires_in: Some(expires_in),
            ..TokenResponse::default()
        };

        let huge = AccountSession::from_token_response_at(
            &response(i64::MAX),
            AccountType::MicrosoftAccount,
            None,
            now,
        );
        assert_eq!(
            huge.expires_on_utc,
            Some(now + Duration::seconds(MAX_TOKEN_LIFETIME_SECONDS))
        );
        assert!(!huge.is_expiring_at(now));

        let negative = AccountSession::from_token_response_at(
            &response(-60),
            AccountType::MicrosoftAccount,
            None,
            now,
        );
        assert_eq!(negative.expires_on_utc, Some(now));
        assert!(negative.is_expiring_at(now));
    }

    #[test]
    fn test_token_without_expiry_is_expiring() {
        let session = AccountSession::new(AccountType::MicrosoftAccount).with_access_token("t");
        assert!(session.is_expiring());
    }

    #[test]
    fn test_from_token_response() {
        let response = TokenResponse {
            access_token: Some("access".to_string()),
            token_type: Some("bearer".to_string()),
            expires_in: Some(3600),
            scope: Some("wl.signin%20onedrive.readwrite wl.signin".to_string()),
            refresh_token: Some("refresh".to_string()),
            user_id: Some("user-1".to_string()),
            resource: None,
        };

        let session = AccountSession::from_token_response_at(
            &response,
            AccountType::MicrosoftAccount,
            Some("client".to_string()),
            fixed_now(),
        );

        assert_eq!(session.access_token.as_deref(), Some("access"));
        assert_eq!(session.expires_on_utc, Some(fixed_now() + Duration::hours(1)));
        assert_eq!(session.scopes, vec!["wl.signin", "onedrive.readwrite"]);
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
        assert_eq!(session.client_id.as_deref(), Some("client"));
        assert!(session.can_sign_out);
        assert_eq!(
            session.authorization_header_value().as_deref(),
            Some("bearer access")
        );
    }

    #[test]
    fn test_form_encoded_scope_plus_signs() {
        assert_eq!(
            parse_scopes("Files.Read+offline_access"),
            vec!["Files.Read", "offline_access"]
        );
    }

    #[test]
    fn test_cache_key_identity() {
        let a = AccountSession::new(AccountType::ActiveDirectory)
            .with_client_id("app")
            .with_user_id("u");
        let b = a.clone().with_access_token("different");

        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(
            a.cache_key(),
            CredentialCacheKey::new(AccountType::MicrosoftAccount, Some("app"), Some("u"))
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let session = AccountSession::new(AccountType::MicrosoftAccount)
            .with_access_token("super-secret-access")
            .with_refresh_token("super-secret-refresh");

        let debug = format!("{:?}", session);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_json_uses_camel_case() {
        let session = AccountSession::new(AccountType::MicrosoftAccount).with_user_id("u");
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"userId\":\"u\""));
        assert!(json.contains("\"canSignOut\":false"));
    }
}
