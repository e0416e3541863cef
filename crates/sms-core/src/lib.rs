//! # SMS Core
//!
//! Core traits and types shared by SMS and phone-verification providers.
//!
//! This crate provides the fundamental building blocks:
//! - [`SmsClient`] trait for sending SMS messages
//! - [`VerifyClient`] trait for issuing and checking one-time verification codes
//! - Common types for requests, responses, and errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use sms_core::{Channel, VerificationRequest, VerifyClient};
//!
//! let response = client.start_verification(VerificationRequest {
//!     service_id: "VAxxxx",
//!     to: "+1234567890",
//!     channel: Channel::Sms,
//! }).await?;
//! println!("{} - {}", response.status, response.to);
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors that can occur during provider calls
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// HTTP communication error
    #[error("http error: {0}")]
    Http(String),
    /// Authentication/authorization error
    #[error("authentication error: {0}")]
    Auth(String),
    /// Invalid request parameters
    #[error("invalid request: {0}")]
    Invalid(String),
    /// Provider returned an error
    #[error("provider error: {0}")]
    Provider(String),
    /// Unexpected error occurred
    #[error("unexpected: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest<'a> {
    pub to: &'a str,
    pub from: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub id: String,
    /// Delivery status reported by the provider, e.g. "queued".
    pub status: String,
    /// Destination as echoed back by the provider.
    pub to: String,
    /// Name of the backend/provider that produced the response, e.g. "twilio".
    pub provider: &'static str,
    pub created: Option<OffsetDateTime>,
    /// Raw provider payload for debugging / audit.
    pub raw: serde_json::Value,
}

/// Delivery channel for a verification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Sms,
    Call,
    Whatsapp,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Call => "call",
            Channel::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ask the verification service to issue a new code to `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest<'a> {
    pub service_id: &'a str,
    pub to: &'a str,
    pub channel: Channel,
}

/// Check a code the user submitted against the verification service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheckRequest<'a> {
    pub service_id: &'a str,
    pub to: &'a str,
    pub code: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub id: String,
    /// "pending", "approved", "canceled", ...
    pub status: String,
    pub to: String,
    /// Only meaningful for checks; `Some(true)` once the code was accepted.
    pub valid: Option<bool>,
    pub provider: &'static str,
    pub created: Option<OffsetDateTime>,
    pub raw: serde_json::Value,
}

impl VerificationResponse {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

#[async_trait]
pub trait SmsClient: Send + Sync {
    /// Send a single text SMS.
    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError>;
}

/// Provider-side one-time code issuing and checking.
#[async_trait]
pub trait VerifyClient: Send + Sync {
    /// Issue a verification code over the requested channel.
    async fn start_verification(
        &self,
        req: VerificationRequest<'_>,
    ) -> Result<VerificationResponse, SmsError>;

    /// Check a submitted code. A wrong code is not an error: the returned
    /// status simply stays "pending".
    async fn check_verification(
        &self,
        req: VerificationCheckRequest<'_>,
    ) -> Result<VerificationResponse, SmsError>;
}

/// Utility to create a pseudo id if a provider doesn't return one.
pub fn fallback_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Channel::Sms).unwrap(), r#""sms""#);
        assert_eq!(Channel::Whatsapp.to_string(), "whatsapp");
        assert_eq!(Channel::default(), Channel::Sms);
    }

    #[test]
    fn approved_status() {
        let mut resp = VerificationResponse {
            id: fallback_id(),
            status: "pending".into(),
            to: "+15550001111".into(),
            valid: Some(false),
            provider: "test",
            created: None,
            raw: serde_json::Value::Null,
        };
        assert!(!resp.is_approved());
        resp.status = "approved".into();
        assert!(resp.is_approved());
    }

    #[test]
    fn fallback_ids_are_unique() {
        assert_ne!(fallback_id(), fallback_id());
    }

    #[test]
    fn error_messages() {
        let err = SmsError::Provider("20404: not found".into());
        assert_eq!(err.to_string(), "provider error: 20404: not found");
    }
}
