//! OneDrive client core.
//!
//! Facade over the workspace crates so host applications can depend on a
//! single crate:
//!
//! - [`bridge`] - host capability traits (`HttpClient`, `SecureStore`, `WebAuthenticationUi`)
//! - [`runtime`] - configuration, logging, and the auth event bus
//! - [`auth`] - account sessions, credential cache, and the authentication provider
//! - [`onedrive`] - HTTP transport, request pipeline, async monitor, chunked uploads
//!
//! With the default `desktop-shims` feature the reqwest-backed HTTP client is
//! re-exported as [`desktop`].

pub use bridge_traits as bridge;
pub use core_auth as auth;
pub use core_runtime as runtime;
pub use provider_onedrive as onedrive;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
