use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct MailgunMessageForm<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
    pub html: &'a str,

    #[serde(rename = "h:Reply-To", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunResponse {
    pub id: String,

    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailgunErrorResponse {
    #[serde(default)]
    pub message: String,
}
