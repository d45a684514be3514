//! Office 365 service discovery for OneDrive for Business.

use crate::client::OneDriveClient;
use crate::error::Result;
use crate::models::{DiscoveredService, DiscoveryResponse};
use crate::request::decode_json;
use bridge_traits::{HttpMethod, HttpRequest};
use core_auth::AuthError;
use tracing::{debug, instrument};

pub const MY_FILES_CAPABILITY: &str = "MyFiles";
pub const MY_FILES_API_VERSION: &str = "v2.0";

/// Endpoint and resource of the user's OneDrive for Business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MyFilesService {
    pub endpoint_uri: String,
    pub resource_id: String,
}

/// Picks the `MyFiles` v2.0 entry.
pub fn select_my_files(services: &[DiscoveredService]) -> Option<MyFilesService> {
    services.iter().find_map(|service| {
        let capability = service.capability.as_deref()?;
        let version = service.service_api_version.as_deref()?;
        if capability != MY_FILES_CAPABILITY || version != MY_FILES_API_VERSION {
            return None;
        }
        Some(MyFilesService {
            endpoint_uri: service.service_endpoint_uri.clone()?,
            resource_id: service.service_resource_id.clone()?,
        })
    })
}

/// Queries the discovery endpoint with the current (discovery resource)
/// session.
///
/// # Errors
///
/// `authenticationFailure` when the user has no OneDrive for Business.
#[instrument(skip(client))]
pub(crate) async fn discover_my_files(
    client: &OneDriveClient,
    discovery_url: &str,
) -> Result<MyFilesService> {
    let request = HttpRequest::new(HttpMethod::Get, discovery_url)
        .header("Accept", "application/json");
    let response = client.send_authenticated(request, None).await?;
    let discovered: DiscoveryResponse = decode_json(&response)?;

    debug!(services = discovered.value.len(), "Discovery returned services");
    select_my_files(&discovered.value).ok_or_else(|| {
        AuthError::AuthenticationFailed("No OneDrive for Business service found".to_string())
            .into()
    })
}
