use std::fmt::{Debug, Display, Formatter, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretPurpose {
    AccountVerification,
    PasswordReset,
}

impl SecretPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretPurpose::AccountVerification => "account_verification",
            SecretPurpose::PasswordReset => "password_reset",
        }
    }

    pub fn format(&self) -> SecretFormat {
        match self {
            SecretPurpose::AccountVerification => SecretFormat::Token { bytes: 32 },
            SecretPurpose::PasswordReset => SecretFormat::NumericCode { digits: 6 },
        }
    }
}

impl Display for SecretPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretFormat {
    NumericCode { digits: u32 },
    /// Random bytes, hex encoded.
    Token { bytes: usize },
}

/// A freshly issued secret. The plain value only lives as long as the dispatch that sends it.
#[derive(Clone)]
pub struct Secret {
    pub recipient_id: String,
    pub purpose: SecretPurpose,
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("Secret")
            .field("recipient_id", &self.recipient_id)
            .field("purpose", &self.purpose)
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What the token store keeps: the digest only, never the plain secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSecret {
    pub recipient_id: String,
    pub purpose: SecretPurpose,
    pub digest: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredSecret {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Verification query sent to a remote token store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretLookup<'a> {
    pub recipient_id: &'a str,
    pub purpose: SecretPurpose,
    pub digest: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecretLookupResponse {
    #[serde(default)]
    pub valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_value() {
        let secret = Secret {
            recipient_id: "u-1".to_string(),
            purpose: SecretPurpose::PasswordReset,
            value: "482913".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now(),
        };

        let printed = format!("{:?}", secret);
        assert!(!printed.contains("482913"));
        assert!(printed.contains("<redacted>"));
    }
}
