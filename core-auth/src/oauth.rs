//! OAuth 2.0 Token Endpoint Client with PKCE Support
//!
//! This module implements the wire side of RFC 6749 (OAuth 2.0) and RFC 7636
//! (PKCE) against Microsoft account and Azure AD endpoints.
//!
//! # Overview
//!
//! - Building authorize URLs with a PKCE challenge and CSRF state
//! - Parsing the callback URL the browser lands on
//! - Redeeming authorization codes, refresh tokens and client credentials
//!
//! Every redemption is a single URL-encoded POST. There is no retry loop; a
//! failed redemption surfaces immediately so the provider can fall back to
//! the next acquisition step.
//!
//! # Security
//!
//! - Code verifier and state come from a CSPRNG
//! - Tokens, codes, secrets and verifiers are never logged

use crate::error::{AuthError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// PKCE (Proof Key for Code Exchange) verifier plus CSRF state.
///
/// Only the challenge derived from the verifier leaves the process during
/// authorization; the verifier itself goes to the token endpoint.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Generates a 32-byte verifier and a 16-byte state, both base64url
    /// encoded without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Parameters of one authorize-endpoint navigation.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest<'a> {
    pub authorize_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    /// Azure AD v1 resource, when targeting ADAL endpoints.
    pub resource: Option<&'a str>,
    pub login_hint: Option<&'a str>,
    /// Adds `prompt=none` so the identity provider never shows UI.
    pub silent: bool,
}

/// Builds the authorize URL for the code flow.
pub fn build_authorize_url(request: &AuthorizeRequest<'_>, pkce: &PkceVerifier) -> Result<String> {
    let mut url = Url::parse(request.authorize_url).map_err(|e| {
        AuthError::InvalidConfiguration(format!("Invalid authorize URL: {}", e))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", request.client_id);
        query.append_pair("redirect_uri", request.redirect_uri);
        query.append_pair("response_type", "code");
        if !request.scopes.is_empty() {
            query.append_pair("scope", &request.scopes.join(" "));
        }
        if let Some(resource) = request.resource {
            query.append_pair("resource", resource);
        }
        if let Some(hint) = request.login_hint {
            query.append_pair("login_hint", hint);
        }
        query.append_pair("state", pkce.state());
        query.append_pair("code_challenge", &pkce.challenge());
        query.append_pair("code_challenge_method", "S256");
        if request.silent {
            query.append_pair("prompt", "none");
        }
    }

    Ok(url.to_string())
}

/// Outcome of an authorize-endpoint redirect.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: Option<String>,
}

impl fmt::Debug for AuthorizationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationResponse")
            .field("code", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// Parses the callback URL (query first, then fragment).
///
/// `access_denied` and `user_cancelled` map to
/// [`AuthError::AuthenticationCancelled`]; any other `error` to
/// [`AuthError::TokenEndpoint`].
pub fn parse_authorization_callback(callback_url: &str) -> Result<AuthorizationResponse> {
    let url = Url::parse(callback_url).map_err(|e| {
        AuthError::AuthenticationFailed(format!("Invalid authorization callback URL: {}", e))
    })?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(fragment) = url.fragment() {
        pairs.extend(
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    let value = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };

    if let Some(error) = value("error") {
        let description = value("error_description").unwrap_or_default();
        return Err(match error.as_str() {
            "access_denied" | "user_cancelled" => AuthError::AuthenticationCancelled(
                if description.is_empty() { error } else { description },
            ),
            _ => AuthError::TokenEndpoint { error, description },
        });
    }

    let code = value("code").filter(|c| !c.is_empty()).ok_or_else(|| {
        AuthError::AuthenticationFailed(
            "Authorization callback did not contain a code".to_string(),
        )
    })?;

    Ok(AuthorizationResponse {
        code,
        state: value("state"),
    })
}

/// Token endpoint success body.
///
/// Azure AD v1 endpoints send `expires_in` as a string; both forms parse.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &self.user_id)
            .field("resource", &self.resource)
            .finish()
    }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// How a confidential client proves its identity for `client_credentials`.
#[derive(Clone)]
pub enum ClientCredential {
    Secret(String),
    /// Signed JWT (certificate-based assertion).
    Assertion(String),
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCredential::Secret(_) => f.write_str("Secret([REDACTED])"),
            ClientCredential::Assertion(_) => f.write_str("Assertion([REDACTED])"),
        }
    }
}

/// Client for one token endpoint.
pub struct TokenEndpointClient {
    http_client: Arc<dyn HttpClient>,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl TokenEndpointClient {
    /// # Arguments
    ///
    /// * `http_client` - Host HTTP bridge used for every POST
    /// * `token_url` - Token endpoint
    /// * `client_id` - Application id
    /// * `client_secret` - Sent with code and refresh redemptions when present
    /// * `redirect_uri` - Must match the one used at the authorize endpoint
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.http_client
    }

    /// Redeems an authorization code.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TokenEndpoint`] when the endpoint returns an OAuth error body
    /// - [`AuthError::NetworkError`] when the request never completes
    #[instrument(skip(self, code, pkce))]
    pub async fn redeem_authorization_code(
        &self,
        code: &str,
        pkce: Option<&PkceVerifier>,
        resource: Option<&str>,
    ) -> Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ];
        if let Some(pkce) = pkce {
            params.push(("code_verifier", pkce.verifier()));
        }
        if let Some(resource) = resource {
            params.push(("resource", resource));
        }
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        debug!("Redeeming authorization code");
        self.post_form(&params).await
    }

    /// Redeems a refresh token. When the response omits a new refresh token
    /// the one that was redeemed is carried over.
    #[instrument(skip(self, refresh_token))]
    pub async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
        resource: Option<&str>,
    ) -> Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(resource) = resource {
            params.push(("resource", resource));
        }
        if let Some(secret) = self.client_secret.as_deref() {
            params.push(("client_secret", secret));
        }

        debug!("Redeeming refresh token");
        let mut response = self.post_form(&params).await?;
        if response.refresh_token.as_deref().map_or(true, str::is_empty) {
            response.refresh_token = Some(refresh_token.to_string());
        }
        Ok(response)
    }

    /// App-only token via the `client_credentials` grant.
    #[instrument(skip(self, credential))]
    pub async fn redeem_client_credentials(
        &self,
        credential: &ClientCredential,
        resource: Option<&str>,
        scopes: &[String],
    ) -> Result<TokenResponse> {
        let scope = scopes.join(" ");
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
        ];
        match credential {
            ClientCredential::Secret(secret) => params.push(("client_secret", secret.as_str())),
            ClientCredential::Assertion(assertion) => {
                params.push(("client_assertion_type", JWT_BEARER_ASSERTION_TYPE));
                params.push(("client_assertion", assertion.as_str()));
            }
        }
        if let Some(resource) = resource {
            params.push(("resource", resource));
        }
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        debug!("Requesting app-only token");
        self.post_form(&params).await
    }

    /// Plain GET against a sign-out endpoint; any status counts as done.
    pub async fn sign_out(&self, sign_out_url: &str) -> Result<()> {
        let mut url = Url::parse(sign_out_url).map_err(|e| {
            AuthError::InvalidConfiguration(format!("Invalid sign-out URL: {}", e))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri);

        let response = self
            .http_client
            .execute(HttpRequest::new(HttpMethod::Get, url.to_string()))
            .await
            .map_err(AuthError::NetworkError)?;

        debug!(status = response.status, "Sign-out endpoint responded");
        Ok(())
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let body = serde_urlencoded::to_string(params).map_err(|e| {
            AuthError::SerializationFailed(format!("Failed to encode token request: {}", e))
        })?;

        let request = HttpRequest::new(HttpMethod::Post, self.token_url.clone())
            .header("Content-Type", FORM_CONTENT_TYPE)
            .header("Accept", "application/json")
            .body(Bytes::from(body));

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(AuthError::NetworkError)?;

        parse_token_response(&response)
    }
}

fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
    // Error bodies can arrive with any status
    if let Ok(error) = response.json::<TokenErrorResponse>() {
        warn!(
            status = response.status,
            error = %error.error,
            "Token endpoint rejected the request"
        );
        return Err(AuthError::TokenEndpoint {
            error: error.error,
            description: error.error_description.unwrap_or_default(),
        });
    }

    if !response.is_success() {
        warn!(status = response.status, "Token endpoint returned an unexpected status");
        return Err(AuthError::AuthenticationFailed(format!(
            "Token endpoint returned HTTP {}",
            response.status
        )));
    }

    let token: TokenResponse = response.json().map_err(|e| {
        AuthError::SerializationFailed(format!("Failed to parse token response: {}", e))
    })?;

    debug!(
        expires_in = ?token.expires_in,
        has_refresh_token = token.refresh_token.is_some(),
        "Token endpoint returned tokens"
    );
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn client(http: MockHttpClient) -> TokenEndpointClient {
        TokenEndpointClient::new(
            Arc::new(http),
            "https://login.live.com/oauth20_token.srf",
            "app-id",
            Some("s3cret".to_string()),
            "https://login.live.com/oauth20_desktop.srf",
        )
    }

    fn body_of(request: &HttpRequest) -> String {
        String::from_utf8(request.body.clone().unwrap_or_default().to_vec()).unwrap()
    }

    #[test]
    fn test_pkce_verifier_generation() {
        let verifier = PkceVerifier::new();
        let other = PkceVerifier::new();

        assert!(!verifier.verifier().is_empty());
        assert_eq!(verifier.challenge(), verifier.challenge());
        assert_ne!(verifier.verifier(), other.verifier());
        assert_ne!(verifier.state(), other.state());
    }

    #[test]
    fn test_pkce_challenge_matches_rfc7636_example() {
        let verifier = PkceVerifier {
            verifier: "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string(),
            state: "state".to_string(),
        };
        assert_eq!(
            verifier.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_build_authorize_url() {
        let pkce = PkceVerifier::new();
        let scopes = vec!["onedrive.readwrite".to_string(), "wl.signin".to_string()];
        let url = build_authorize_url(
            &AuthorizeRequest {
                authorize_url: "https://login.live.com/oauth20_authorize.srf",
                client_id: "app-id",
                redirect_uri: "https://login.live.com/oauth20_desktop.srf",
                scopes: &scopes,
                resource: None,
                login_hint: None,
                silent: true,
            },
            &pkce,
        )
        .unwrap();

        assert!(url.contains("client_id=app-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=onedrive.readwrite+wl.signin"));
        assert!(url.contains(&format!("state={}", pkce.state())));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("prompt=none"));
        assert!(!url.contains("resource="));
    }

    #[test]
    fn test_build_authorize_url_rejects_invalid_url() {
        let pkce = PkceVerifier::new();
        let result = build_authorize_url(
            &AuthorizeRequest {
                authorize_url: "not a url",
                client_id: "app-id",
                redirect_uri: "urn:ietf:wg:oauth:2.0:oob",
                scopes: &[],
                resource: Some("https://api.office.com/discovery/"),
                login_hint: None,
                silent: false,
            },
            &pkce,
        );
        assert!(matches!(result, Err(AuthError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_parse_callback_with_code() {
        let response = parse_authorization_callback(
            "https://login.live.com/oauth20_desktop.srf?code=M123&state=abc",
        )
        .unwrap();
        assert_eq!(response.code, "M123");
        assert_eq!(response.state.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_callback_cancellation() {
        let result = parse_authorization_callback(
            "https://login.live.com/oauth20_desktop.srf?error=access_denied&error_description=The%20user%20has%20denied%20access",
        );
        match result {
            Err(AuthError::AuthenticationCancelled(msg)) => {
                assert_eq!(msg, "The user has denied access")
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_callback_fragment_error() {
        let result = parse_authorization_callback(
            "https://login.live.com/oauth20_desktop.srf#error=login_required",
        );
        assert!(matches!(
            result,
            Err(AuthError::TokenEndpoint { ref error, .. }) if error == "login_required"
        ));
    }

    #[test]
    fn test_token_response_accepts_string_expiry() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":"3599"}"#).unwrap();
        assert_eq!(response.expires_in, Some(3599));

        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(response.expires_in, None);
    }

    #[tokio::test]
    async fn test_redeem_code_posts_form() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|req| {
                let body = body_of(req);
                req.method == HttpMethod::Post
                    && req.header_value("content-type") == Some(FORM_CONTENT_TYPE)
                    && body.contains("grant_type=authorization_code")
                    && body.contains("code=the-code")
                    && body.contains("code_verifier=")
                    && body.contains("client_secret=s3cret")
            })
            .returning(|_| {
                Ok(HttpResponse::new(200).with_body(
                    r#"{"access_token":"at","token_type":"bearer","expires_in":3600,"refresh_token":"rt","user_id":"u1","scope":"wl.signin"}"#,
                ))
            });

        let pkce = PkceVerifier::new();
        let token = client(http)
            .redeem_authorization_code("the-code", Some(&pkce), None)
            .await
            .unwrap();

        assert_eq!(token.access_token.as_deref(), Some("at"));
        assert_eq!(token.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_error_body_becomes_token_endpoint_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(400).with_body(
                r#"{"error":"invalid_grant","error_description":"The refresh token has expired."}"#,
            ))
        });

        let result = client(http).redeem_refresh_token("old", None).await;
        match result {
            Err(AuthError::TokenEndpoint { error, description }) => {
                assert_eq!(error, "invalid_grant");
                assert_eq!(description, "The refresh token has expired.");
            }
            other => panic!("expected token endpoint error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(200).with_body(r#"{"access_token":"new","expires_in":3600}"#))
        });

        let token = client(http)
            .redeem_refresh_token("keep-me", Some("https://contoso-my.sharepoint.com/"))
            .await
            .unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_cause() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Timeout("connect timed out".to_string())));

        let result = client(http).redeem_refresh_token("rt", None).await;
        match result {
            Err(AuthError::NetworkError(BridgeError::Timeout(msg))) => {
                assert_eq!(msg, "connect timed out")
            }
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_assertion_params() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|req| {
                let body = body_of(req);
                body.contains("grant_type=client_credentials")
                    && body.contains("client_assertion=signed.jwt")
                    && body.contains("client_assertion_type=urn%3Aietf%3Aparams%3Aoauth%3Aclient-assertion-type%3Ajwt-bearer")
                    && body.contains("resource=https%3A%2F%2Fcontoso-my.sharepoint.com%2F")
                    && !body.contains("client_secret")
            })
            .returning(|_| Ok(HttpResponse::new(200).with_body(r#"{"access_token":"app"}"#)));

        let token = client(http)
            .redeem_client_credentials(
                &ClientCredential::Assertion("signed.jwt".to_string()),
                Some("https://contoso-my.sharepoint.com/"),
                &[],
            )
            .await
            .unwrap();
        assert_eq!(token.access_token.as_deref(), Some("app"));
    }

    #[tokio::test]
    async fn test_sign_out_hits_endpoint_with_client_id() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .withf(|req| {
                req.method == HttpMethod::Get
                    && req.url.starts_with("https://login.live.com/oauth20_logout.srf?")
                    && req.url.contains("client_id=app-id")
            })
            .returning(|_| Ok(HttpResponse::new(302)));

        client(http)
            .sign_out("https://login.live.com/oauth20_logout.srf")
            .await
            .unwrap();
    }
}
