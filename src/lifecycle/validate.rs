// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local checks run before any wallet or gateway call.

use unicode_normalization::UnicodeNormalization;

use crate::error::AccessError;

/// RFC 5321 path limit.
const MAX_EMAIL_LEN: usize = 254;

const MAX_SUBJECT_LEN: usize = 78 * 4;

/// NFKC-normalize and trim an email address, then check its shape.
///
/// Deliverability is not checked; the gateway never sees the plain text
/// after protection anyway.
pub fn normalize_email(raw: &str) -> Result<String, AccessError> {
    let email: String = raw.nfkc().collect::<String>().trim().to_string();

    if email.is_empty() {
        return Err(AccessError::validation("Please enter a valid email address"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(AccessError::validation("Email address is too long"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AccessError::validation("Email address must not contain spaces"));
    }

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(AccessError::validation("Email address must contain exactly one '@'")),
    };
    if local.is_empty() {
        return Err(AccessError::validation("Email address is missing its local part"));
    }
    let domain_ok = domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty());
    if !domain_ok {
        return Err(AccessError::validation("Email address has an invalid domain"));
    }

    Ok(email)
}

/// Display name of a protected record. Optional, trimmed.
pub fn normalize_name(raw: Option<&str>) -> String {
    raw.map(|name| name.nfkc().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

pub fn number_of_access(raw: Option<u32>) -> Result<u32, AccessError> {
    match raw.unwrap_or(1) {
        0 => Err(AccessError::validation("Number of access must be at least 1")),
        n => Ok(n),
    }
}

/// Subject and content of an email; both must be non-blank.
pub fn email_message(subject: &str, content: &str) -> Result<(String, String), AccessError> {
    let subject = subject.trim();
    let content = content.trim();
    if subject.is_empty() {
        return Err(AccessError::validation("Email subject is required"));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(AccessError::validation("Email subject is too long"));
    }
    if content.is_empty() {
        return Err(AccessError::validation("Email content is required"));
    }
    Ok((subject.to_string(), content.to_string()))
}
