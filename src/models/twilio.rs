use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct TwilioMessageForm<'a> {
    #[serde(rename = "To")]
    pub to: &'a str,

    #[serde(rename = "From")]
    pub from: &'a str,

    #[serde(rename = "Body")]
    pub body: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioMessageResponse {
    pub sid: String,

    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwilioErrorResponse {
    #[serde(default)]
    pub code: Option<u32>,

    #[serde(default)]
    pub message: String,
}

impl TwilioErrorResponse {
    /// Error codes that mean the destination number itself is unusable.
    pub fn is_invalid_destination(&self) -> bool {
        matches!(
            self.code,
            Some(21211 | 21214 | 21217 | 21408 | 21610 | 21612 | 21614)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.code, Some(14107 | 20429 | 30022))
    }
}
