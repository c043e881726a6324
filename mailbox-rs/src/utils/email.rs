use crate::error::{MailError, Result};

const MAX_EMAIL_LEN: usize = 254;
const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Basic email validation
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(MailError::InvalidEmail("Email is empty".to_string()));
    }

    if email.len() > MAX_EMAIL_LEN {
        return Err(MailError::InvalidEmail(format!(
            "Email exceeds {} characters",
            MAX_EMAIL_LEN
        )));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(MailError::InvalidEmail(
            "Email must not contain whitespace".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(MailError::InvalidEmail(
            "Email must contain exactly one @".to_string(),
        ));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(MailError::InvalidEmail(
            "Email parts cannot be empty".to_string(),
        ));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(MailError::InvalidEmail(
            "Domain must contain a dot".to_string(),
        ));
    }

    Ok(())
}

/// Hostname validation for a managed domain, e.g. `example.com`
///
/// Labels are 1-63 alphanumeric or `-` characters without a leading or
/// trailing hyphen, and the final label is alphabetic with at least two
/// characters.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(MailError::InvalidDomain("Domain is empty".to_string()));
    }

    if domain.len() > MAX_DOMAIN_LEN {
        return Err(MailError::InvalidDomain(format!(
            "{} exceeds {} characters",
            domain, MAX_DOMAIN_LEN
        )));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(MailError::InvalidDomain(format!(
            "{} must have at least two labels",
            domain
        )));
    }

    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

        if !valid {
            return Err(MailError::InvalidDomain(format!(
                "{} has an invalid label '{}'",
                domain, label
            )));
        }
    }

    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(MailError::InvalidDomain(format!(
            "{} has an invalid top-level label",
            domain
        )));
    }

    Ok(())
}

/// Lower-case a domain and drop a trailing root dot
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
