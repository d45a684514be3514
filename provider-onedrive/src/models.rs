//! OneDrive API response types
//!
//! Only the resources the request pipeline itself needs are modeled; every
//! type keeps unknown properties in `additional_data`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Drive item resource, reduced to identity and size.
///
/// See: https://learn.microsoft.com/onedrive/developer/rest-api/resources/driveitem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_tag: Option<String>,

    #[serde(flatten)]
    pub additional_data: HashMap<String, serde_json::Value>,
}

/// Upload session state returned by `createUploadSession` and by every
/// intermediate chunk PUT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,

    /// ISO 8601 timestamp after which the session is discarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<String>,

    /// Ranges still missing, as `"start-end"` or open-ended `"start-"`
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,

    #[serde(flatten)]
    pub additional_data: HashMap<String, serde_json::Value>,
}

/// Outcome of one chunk PUT: either the finished item or the updated
/// session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadChunkResult {
    pub item_response: Option<Item>,
    pub upload_session: Option<UploadSession>,
}

impl UploadChunkResult {
    pub fn upload_succeeded(&self) -> bool {
        self.item_response.is_some()
    }
}

/// Body of a monitor URL while an async operation is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AsyncOperationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_complete: Option<f64>,

    /// `notStarted`, `inProgress`, `completed`, `failed`, `cancelled`,
    /// `deleteFailed` ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(flatten)]
    pub additional_data: HashMap<String, serde_json::Value>,
}

impl AsyncOperationStatus {
    /// The service's `message` property, when it sent one as a string.
    pub fn message(&self) -> Option<&str> {
        self.additional_data
            .get("message")
            .and_then(|value| value.as_str())
    }
}

/// One entry of the Office 365 discovery service response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredService {
    #[serde(default)]
    pub capability: Option<String>,
    #[serde(default)]
    pub service_api_version: Option<String>,
    #[serde(default)]
    pub service_endpoint_uri: Option<String>,
    #[serde(default)]
    pub service_resource_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DiscoveryResponse {
    #[serde(default)]
    pub value: Vec<DiscoveredService>,
}
