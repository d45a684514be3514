//! Web Authentication UI Abstraction
//!
//! Interactive OAuth flows need a browser or embedded web view, which only the
//! host can provide. The core builds the authorize URL, the host navigates it
//! and reports back the URL the identity provider redirected to.

use async_trait::async_trait;

use crate::error::Result;

/// How the host should present the authorization page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Navigate without showing any UI. Succeeds only when the identity
    /// provider can complete the flow from existing browser state.
    Silent,
    /// Show the page and let the user interact with it.
    Interactive,
}

/// Host-provided web authentication surface.
///
/// # Contract
///
/// - Return the full callback URL (including query string) once the browser
///   navigates to a URL starting with `callback_url`.
/// - Return [`BridgeError::Cancelled`](crate::error::BridgeError::Cancelled)
///   when the user closes the window or otherwise aborts.
/// - In [`PromptMode::Silent`], fail instead of showing UI.
#[async_trait]
pub trait WebAuthenticationUi: Send + Sync {
    async fn authenticate(
        &self,
        request_url: &str,
        callback_url: &str,
        mode: PromptMode,
    ) -> Result<String>;
}
