//! Transient, user-facing messages.

use std::fmt;

use crate::error::{AuthError, BackendError};

/// A message the UI shows once, e.g. in an alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notice {
    /// Builds a notice from its parts.
    #[must_use]
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Failure heading with the given body.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Success heading with the given body.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new("Success", message)
    }

    /// Sign-up went through; the account now waits for an administrator.
    #[must_use]
    pub fn sign_up_complete() -> Self {
        Self::success("Sign up successful! Please wait for admin approval.")
    }

    /// Sign-in refused until the email address is verified.
    #[must_use]
    pub fn verification_required() -> Self {
        Self::new(
            "Email Verification Required",
            "Please verify your email address before logging in. A verification link has been sent to your email.",
        )
    }

    /// A suggestion was stored.
    #[must_use]
    pub fn suggestion_sent() -> Self {
        Self::success("Suggestion sent successfully!")
    }

    /// Sign-up failed.
    #[must_use]
    pub fn sign_up_failed(error: &AuthError) -> Self {
        match error {
            AuthError::EmailAlreadyInUse => Self::error("Email already in use."),
            AuthError::WeakPassword => Self::error("Password should be at least 6 characters."),
            AuthError::InvalidEmail => Self::error("Invalid email address."),
            _ => Self::error("An error occurred during sign up."),
        }
    }

    /// Sign-in failed.
    #[must_use]
    pub fn sign_in_failed(error: &AuthError) -> Self {
        match error {
            AuthError::EmailNotVerified => Self::verification_required(),
            AuthError::InvalidEmail => Self::error("Invalid email address."),
            other => Self::error(format!("Sign in failed: {other}")),
        }
    }

    /// Sign-out failed.
    #[must_use]
    pub fn sign_out_failed(error: &AuthError) -> Self {
        Self::error(format!("Failed to log out: {error}"))
    }

    /// A document or blob call failed while doing `action`.
    #[must_use]
    pub fn from_backend(action: &str, error: &BackendError) -> Self {
        let detail = match error {
            BackendError::Unreachable => "The library service cannot be reached. Please try again later.".to_owned(),
            BackendError::Forbidden => "You are not allowed to do this.".to_owned(),
            other => other.to_string(),
        };
        Self::error(format!("Failed to {action}: {detail}"))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}
