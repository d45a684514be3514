use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity provider family a session was issued by.
///
/// # Examples
///
/// ```
/// use core_auth::AccountType;
///
/// assert_eq!(AccountType::default(), AccountType::None);
/// assert_eq!(AccountType::ActiveDirectory.as_str(), "ActiveDirectory");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountType {
    #[default]
    None,
    MicrosoftAccount,
    ActiveDirectory,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::None => "None",
            AccountType::MicrosoftAccount => "MicrosoftAccount",
            AccountType::ActiveDirectory => "ActiveDirectory",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the authentication provider is in its resolution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    /// Nothing resolved yet, or signed out.
    #[default]
    NoSession,
    /// Served a non-expiring session without I/O.
    CachedValid,
    /// Found a session that expires within the refresh window.
    CachedExpiring,
    /// Redeeming a refresh token.
    Refreshing,
    /// Running the strategy's acquisition flow.
    Interactive,
    /// A freshly acquired or refreshed session is current.
    Authenticated,
    /// The last attempt failed.
    Failed,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::CachedValid | AuthState::Authenticated)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            AuthState::CachedExpiring | AuthState::Refreshing | AuthState::Interactive
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::NoSession => write!(f, "No Session"),
            AuthState::CachedValid => write!(f, "Cached (valid)"),
            AuthState::CachedExpiring => write!(f, "Cached (expiring)"),
            AuthState::Refreshing => write!(f, "Refreshing Token..."),
            AuthState::Interactive => write!(f, "Signing In..."),
            AuthState::Authenticated => write!(f, "Signed In"),
            AuthState::Failed => write!(f, "Failed"),
        }
    }
}
