use serde::{Deserialize, Serialize};

use crate::models::channel::{Channel, ChannelTarget};

/// Contact profile as returned by the profile store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(alias = "_id")]
    pub id: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default, alias = "firebaseToken")]
    pub push_token: Option<String>,

    #[serde(default = "default_push_token_valid")]
    pub push_token_valid: bool,
}

fn default_push_token_valid() -> bool {
    true
}

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            push_token_valid: true,
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone_number(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = Some(phone_number.into());
        self
    }

    pub fn with_push_token(mut self, push_token: impl Into<String>) -> Self {
        self.push_token = Some(push_token.into());
        self.push_token_valid = true;
        self
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    /// Contact data for `channel`, or `None` when the recipient cannot be reached there.
    ///
    /// Presence is all that is checked here; malformed values are still returned so the
    /// adapter can report them as an invalid target.
    pub fn target_for(&self, channel: Channel) -> Option<ChannelTarget> {
        match channel {
            Channel::Email => present(&self.email).map(ChannelTarget::Email),
            Channel::Sms => present(&self.phone_number).map(ChannelTarget::Sms),
            Channel::Push if self.push_token_valid => {
                present(&self.push_token).map(ChannelTarget::Push)
            }
            Channel::Push => None,
        }
    }

    pub fn has_any_contact(&self) -> bool {
        Channel::ALL
            .iter()
            .any(|channel| self.target_for(*channel).is_some())
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_contact_counts_as_missing() {
        let recipient = Recipient::new("u-1").with_email("   ").with_phone_number("+33612345678");

        assert!(recipient.target_for(Channel::Email).is_none());
        assert_eq!(
            recipient.target_for(Channel::Sms),
            Some(ChannelTarget::Sms("+33612345678".to_string()))
        );
        assert!(recipient.target_for(Channel::Push).is_none());
    }

    #[test]
    fn stale_push_token_is_not_a_contact() {
        let mut recipient = Recipient::new("u-2").with_push_token("fcm-token-abcdefghijklmnop");
        assert!(recipient.target_for(Channel::Push).is_some());

        recipient.push_token_valid = false;
        assert!(recipient.target_for(Channel::Push).is_none());
        assert!(!recipient.has_any_contact());
    }

    #[test]
    fn deserializes_profile_store_document() {
        let recipient: Recipient = serde_json::from_str(
            r#"{"_id":"64f1","firstName":"Ana","email":"ana@example.com","firebaseToken":"tok"}"#,
        )
        .unwrap();

        assert_eq!(recipient.id, "64f1");
        assert_eq!(recipient.first_name.as_deref(), Some("Ana"));
        assert_eq!(recipient.push_token.as_deref(), Some("tok"));
        assert!(recipient.push_token_valid);
    }
}
