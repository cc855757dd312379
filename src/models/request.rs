use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{
    channel::Channel,
    event::{ChannelPolicy, EventKind, NotificationEvent},
    secret::SecretPurpose,
    validation::validate_email_address,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Declarative request checks: every rule runs and all violations are reported together.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub event: EventKind,

    #[serde(default)]
    pub recipient_id: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Overrides the phone number held by the profile store for this request only.
    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default)]
    pub payload: Map<String, Value>,

    #[serde(default)]
    pub template_id: Option<String>,

    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
}

impl DispatchRequest {
    pub fn to_event(&self) -> NotificationEvent {
        let mut event = NotificationEvent::new(self.event, self.payload.clone());

        if let Some(template_id) = &self.template_id {
            event = event.with_template(template_id.trim());
        }
        if let Some(channels) = &self.channels {
            event = event.with_policy(ChannelPolicy::new(channels.iter().copied()));
        }
        event
    }
}

impl Validate for DispatchRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        let recipient_id = self.recipient_id.as_deref().map(str::trim).unwrap_or("");
        let email = self.email.as_deref().map(str::trim).unwrap_or("");

        if recipient_id.is_empty() && email.is_empty() {
            errors.push(FieldError::new(
                "recipient_id",
                "either recipient_id or email is required",
            ));
        }

        if !email.is_empty() {
            if let Err(e) = validate_email_address(email) {
                errors.push(FieldError::new("email", e.to_string()));
            }
        }

        if let Some(phone_number) = &self.phone_number {
            if phone_number.trim().is_empty() {
                errors.push(FieldError::new("phone_number", "must not be blank"));
            }
        }

        let is_custom = self.event == EventKind::Custom;
        match self.template_id.as_deref().map(str::trim) {
            None | Some("") if is_custom => {
                errors.push(FieldError::new("template_id", "required for custom events"));
            }
            Some(_) if !is_custom => {
                errors.push(FieldError::new(
                    "template_id",
                    "only custom events may name a template",
                ));
            }
            _ => {}
        }

        match &self.channels {
            Some(_) if !is_custom => errors.push(FieldError::new(
                "channels",
                "only custom events may override the channel policy",
            )),
            Some(channels) if channels.is_empty() => {
                errors.push(FieldError::new("channels", "must name at least one channel"))
            }
            _ => {}
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn default_consume() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifySecretRequest {
    pub recipient_id: String,
    pub purpose: SecretPurpose,
    pub code: String,

    /// Consume the secret when it matches. Defaults to true.
    #[serde(default = "default_consume")]
    pub consume: bool,
}

impl Validate for VerifySecretRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.recipient_id.trim().is_empty() {
            errors.push(FieldError::new("recipient_id", "is required"));
        }
        if self.code.trim().is_empty() {
            errors.push(FieldError::new("code", "is required"));
        }
        if self.code.len() > 128 {
            errors.push(FieldError::new("code", "must be at most 128 characters"));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> DispatchRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn recipient_is_required() {
        let errors = request(r#"{"event":"invoice"}"#).validate().unwrap_err();
        assert_eq!(errors[0].field, "recipient_id");
    }

    #[test]
    fn custom_event_needs_template() {
        let errors = request(r#"{"event":"custom","recipient_id":"u-1"}"#)
            .validate()
            .unwrap_err();
        assert!(errors.iter().any(|e| e.field == "template_id"));
    }

    #[test]
    fn builtin_event_cannot_widen_policy() {
        let errors = request(r#"{"event":"invoice","recipient_id":"u-1","channels":["sms"]}"#)
            .validate()
            .unwrap_err();
        assert!(errors.iter().any(|e| e.field == "channels"));
    }

    #[test]
    fn all_violations_reported_together() {
        let errors = request(r#"{"event":"custom","email":"nope","channels":[]}"#)
            .validate()
            .unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["email", "template_id", "channels"]);
    }

    #[test]
    fn custom_request_builds_event() {
        let req = request(
            r#"{"event":"custom","email":"ana@example.com","template_id":"promo","channels":["push","email"],"payload":{"offer":"20%"}}"#,
        );
        assert!(req.validate().is_ok());

        let event = req.to_event();
        assert_eq!(event.template_id(), "promo");
        assert!(event.policy.allows(Channel::Push));
        assert!(!event.policy.allows(Channel::Sms));
        assert_eq!(event.payload["offer"], "20%");
    }

    #[test]
    fn verify_defaults_to_consume() {
        let req: VerifySecretRequest = serde_json::from_str(
            r#"{"recipient_id":"u-1","purpose":"password_reset","code":"123456"}"#,
        )
        .unwrap();
        assert!(req.consume);
        assert!(req.validate().is_ok());
    }
}
