use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct FcmRequest {
    pub message: FcmMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct FcmMessage {
    pub token: String,
    pub notification: FcmNotification,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

/// Successful send: `name` is `projects/{project}/messages/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct FcmResponse {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorResponse {
    pub error: FcmErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorBody {
    #[serde(default)]
    pub code: u16,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcmErrorDetail {
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,

    #[serde(rename = "fieldViolations", default)]
    pub field_violations: Vec<FcmFieldViolation>,
}

/// Entry of a `google.rpc.BadRequest` detail.
#[derive(Debug, Clone, Deserialize)]
pub struct FcmFieldViolation {
    #[serde(default)]
    pub field: String,

    #[serde(default)]
    pub description: String,
}

impl FcmErrorBody {
    /// The FCM-specific code (`UNREGISTERED`, `QUOTA_EXCEEDED`, ...) when present.
    pub fn fcm_error_code(&self) -> Option<&str> {
        self.details
            .iter()
            .find_map(|detail| detail.error_code.as_deref())
    }

    /// Whether a bad-request detail blames the registration token itself.
    pub fn rejects_token(&self) -> bool {
        self.details
            .iter()
            .flat_map(|detail| &detail.field_violations)
            .any(|violation| violation.field == "message.token")
    }
}
