use serde::Serialize;

use crate::models::request::FieldError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub message: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message,
            field_errors: Vec::new(),
        }
    }

    pub fn error(error: String, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            message,
            field_errors: Vec::new(),
        }
    }

    /// Error response that still carries a payload, e.g. an all-failed dispatch.
    pub fn error_with_data(data: T, error: String, message: String) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error),
            message,
            field_errors: Vec::new(),
        }
    }

    pub fn invalid(field_errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some("validation_failed".to_string()),
            message: "Request body failed validation".to_string(),
            field_errors,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifySecretResponse {
    pub valid: bool,
    pub consumed: bool,
}
