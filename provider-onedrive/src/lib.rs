//! # OneDrive Provider
//!
//! Request pipeline for the OneDrive and OneDrive for Business REST APIs.
//!
//! ## Overview
//!
//! - [`HttpTransport`] sends through the host `HttpClient`, follows up to
//!   five redirects without forwarding credentials and classifies failures
//! - [`OneDriveClient`] resolves the service endpoint (with discovery for
//!   business accounts) and owns the authentication provider
//! - [`BaseRequest`] builds API requests with the version header and
//!   credentials
//! - [`AsyncMonitor`] polls long-running operations
//! - [`UploadChunkRequest`] and [`ChunkedUploadProvider`] implement
//!   resumable uploads
//!
//! Errors are [`OneDriveError`]s; [`OneDriveError::code`] yields the wire
//! [`ErrorCode`].

pub mod client;
pub mod discovery;
pub mod error;
pub mod models;
pub mod monitor;
pub mod request;
pub mod transport;
pub mod upload;

pub use client::{OneDriveClient, OneDriveClientBuilder, ServiceInfo};
pub use error::{ErrorCode, ErrorDetail, OneDriveError, Result};
pub use models::{AsyncOperationStatus, Item, UploadChunkResult, UploadSession};
pub use monitor::AsyncMonitor;
pub use request::{BaseRequest, RequestBody};
pub use transport::{HttpTransport, MAX_REDIRECTS};
pub use upload::{ChunkedUploadProvider, UploadChunkRequest};
