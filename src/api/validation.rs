//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("Invalid email address".to_string());
    };

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err("Invalid email address".to_string());
    }

    if email.chars().any(char::is_whitespace) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate a nickname
pub fn validate_nickname(nickname: &str) -> Result<(), String> {
    if nickname.is_empty() {
        return Err("Nickname is required".to_string());
    }

    if nickname.chars().count() < 2 {
        return Err("Nickname is too short (min 2 characters)".to_string());
    }

    if nickname.chars().count() > 30 {
        return Err("Nickname is too long (max 30 characters)".to_string());
    }

    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }

    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter || !has_digit {
        return Err("Password must contain at least one letter and one digit".to_string());
    }

    Ok(())
}

/// Validate a category name
pub fn validate_category_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Category name is required".to_string());
    }

    if name.chars().count() > 50 {
        return Err("Category name is too long (max 50 characters)".to_string());
    }

    Ok(())
}
