//! Input checks that run before any I/O.

use super::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Trims and checks the shape `local@domain.tld`.
pub fn email(value: &str) -> Result<String, AuthError> {
    let value = required("email", value)?;

    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(value.to_string())
    } else {
        Err(AuthError::InvalidEmail(value.to_string()))
    }
}

pub fn password(value: &str) -> Result<(), AuthError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN));
    }
    Ok(())
}

pub fn confirmation(password: &str, confirm: &str) -> Result<(), AuthError> {
    if password != confirm {
        return Err(AuthError::PasswordMismatch);
    }
    Ok(())
}

pub fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, AuthError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AuthError::MissingField(field));
    }
    Ok(trimmed)
}
