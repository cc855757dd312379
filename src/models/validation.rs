use anyhow::{Result, anyhow};

pub fn validate_push_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow!("Device token cannot be empty"));
    }

    if token.len() < 20 {
        return Err(anyhow!("Device token too short (minimum 20 characters)"));
    }

    if token.len() > 200 {
        return Err(anyhow!("Device token too long (maximum 200 characters)"));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(anyhow!("Device token contains invalid characters"));
    }

    Ok(())
}

pub fn validate_email_address(address: &str) -> Result<()> {
    let (local, domain) = address
        .split_once('@')
        .ok_or_else(|| anyhow!("Email address must contain '@'"))?;

    if local.is_empty() || domain.is_empty() {
        return Err(anyhow!("Email address has an empty local part or domain"));
    }

    if domain.contains('@') || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(anyhow!("Email address has an invalid domain"));
    }

    if address.chars().any(|c| c.is_whitespace()) {
        return Err(anyhow!("Email address cannot contain whitespace"));
    }

    Ok(())
}

/// Brings a phone number to E.164.
///
/// National numbers starting with `0` get `default_country_code`; anything else missing the
/// leading `+` gets one. Spaces, dots, dashes and parentheses are dropped first.
pub fn normalize_phone_number(raw: &str, default_country_code: &str) -> Result<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-' | '(' | ')'))
        .collect();

    let normalized = if let Some(national) = compact.strip_prefix('0') {
        format!("+{}{}", default_country_code.trim_start_matches('+'), national)
    } else if compact.starts_with('+') {
        compact
    } else {
        format!("+{}", compact)
    };

    let digits = &normalized[1..];
    let is_e164 = (2..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');

    if !is_e164 {
        return Err(anyhow!("Phone number '{}' is not E.164-normalizable", raw));
    }

    Ok(normalized)
}
