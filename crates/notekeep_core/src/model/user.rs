//! User identity mirror.
//!
//! Authentication lives outside the core; this record only exists so notes
//! and version records can reference the acting identity.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const USERNAME_MAX_CHARS: usize = 45;
pub const EMAIL_MAX_CHARS: usize = 80;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Integer identity of a user as issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserValidationError {
    EmptyUsername,
    UsernameTooLong { max: usize, actual: usize },
    EmailTooLong { max: usize, actual: usize },
    InvalidEmail(String),
}

impl Display for UserValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyUsername => write!(f, "username cannot be empty"),
            Self::UsernameTooLong { max, actual } => {
                write!(f, "username is {actual} chars, at most {max} allowed")
            }
            Self::EmailTooLong { max, actual } => {
                write!(f, "email is {actual} chars, at most {max} allowed")
            }
            Self::InvalidEmail(value) => write!(f, "invalid email address `{value}`"),
        }
    }
}

impl Error for UserValidationError {}

/// Checks username/email shape before a user row is written.
pub fn validate_user_fields(username: &str, email: &str) -> Result<(), UserValidationError> {
    if username.trim().is_empty() {
        return Err(UserValidationError::EmptyUsername);
    }
    let username_chars = username.chars().count();
    if username_chars > USERNAME_MAX_CHARS {
        return Err(UserValidationError::UsernameTooLong {
            max: USERNAME_MAX_CHARS,
            actual: username_chars,
        });
    }
    let email_chars = email.chars().count();
    if email_chars > EMAIL_MAX_CHARS {
        return Err(UserValidationError::EmailTooLong {
            max: EMAIL_MAX_CHARS,
            actual: email_chars,
        });
    }
    if !EMAIL_RE.is_match(email) {
        return Err(UserValidationError::InvalidEmail(email.to_string()));
    }
    Ok(())
}
