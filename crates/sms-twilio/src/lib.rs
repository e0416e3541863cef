//! # Twilio Provider
//!
//! Twilio backend for sms-core: plain SMS through the Programmable Messaging
//! API and one-time codes through Verify v2.
//!
//! ```rust,ignore
//! use sms_core::{SendRequest, SmsClient};
//! use sms_twilio::TwilioClient;
//!
//! let client = TwilioClient::new("ACxxxx", "auth_token");
//! let response = client.send(SendRequest {
//!     to: "+1234567890",
//!     from: "+0987654321",
//!     text: "Hello from Twilio!",
//! }).await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sms_core::{
    SendRequest, SendResponse, SmsClient, SmsError, VerificationCheckRequest, VerificationRequest,
    VerificationResponse, VerifyClient,
};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

const PROVIDER: &str = "twilio";

pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";
pub const DEFAULT_VERIFY_BASE: &str = "https://verify.twilio.com";

/// Twilio REST client.
#[derive(Clone, Debug)]
pub struct TwilioClient {
    /// Twilio Account SID, also the Basic auth user.
    account_sid: String,
    auth_token: String,
    /// Programmable Messaging base; override for testing/mocking.
    api_base: String,
    /// Verify v2 base; override for testing/mocking.
    verify_base: String,
    http: reqwest::Client,
}

impl TwilioClient {
    pub fn new<S: Into<String>>(account_sid: S, auth_token: S) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            verify_base: DEFAULT_VERIFY_BASE.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point the client at different API hosts.
    pub fn with_base_urls(mut self, api_base: &str, verify_base: &str) -> Result<Self, SmsError> {
        parse_base(api_base)?;
        parse_base(verify_base)?;
        self.api_base = api_base.to_string();
        self.verify_base = verify_base.to_string();
        Ok(self)
    }

    /// Bound every request by `timeout`. Without it a hung call hangs the caller.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, SmsError> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmsError::Unexpected(format!("http client: {}", e)))?;
        Ok(self)
    }

    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    async fn post_form<F: Serialize + ?Sized>(
        &self,
        url: Url,
        form: &F,
    ) -> Result<serde_json::Value, SmsError> {
        debug!(%url, "POST");
        let res = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        let status = res.status();
        let raw_text = res
            .text()
            .await
            .map_err(|e| SmsError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(error_from_response(status, &raw_text));
        }

        serde_json::from_str(&raw_text)
            .map_err(|e| SmsError::Unexpected(format!("invalid response body: {}", e)))
    }
}

fn parse_base(base: &str) -> Result<Url, SmsError> {
    let url =
        Url::parse(base).map_err(|e| SmsError::Invalid(format!("base url {}: {}", base, e)))?;
    if url.cannot_be_a_base() {
        return Err(SmsError::Invalid(format!(
            "base url {} cannot be a base",
            base
        )));
    }
    Ok(url)
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, SmsError> {
    let mut url = parse_base(base)?;
    url.path_segments_mut()
        .map_err(|_| SmsError::Invalid(format!("base url {} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Twilio's standard JSON error document.
#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    code: Option<i64>,
    message: String,
}

fn error_from_response(status: StatusCode, body: &str) -> SmsError {
    let detail = match serde_json::from_str::<TwilioErrorBody>(body) {
        Ok(TwilioErrorBody {
            code: Some(code),
            message,
        }) => format!("HTTP {}: {} (code {})", status, message, code),
        Ok(TwilioErrorBody { message, .. }) => format!("HTTP {}: {}", status, message),
        Err(_) => format!("HTTP {}: {}", status, body),
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SmsError::Auth(detail),
        _ => SmsError::Provider(detail),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageForm<'a> {
    to: &'a str,
    from: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct VerificationForm<'a> {
    to: &'a str,
    channel: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct VerificationCheckForm<'a> {
    to: &'a str,
    code: &'a str,
}

/// Fields shared by Message, Verification and VerificationCheck resources.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TwilioResource {
    sid: Option<String>,
    status: Option<String>,
    to: Option<String>,
    valid: Option<bool>,
    date_created: Option<String>,
}

impl TwilioResource {
    fn from_raw(raw: &serde_json::Value) -> Self {
        serde_json::from_value(raw.clone()).unwrap_or_default()
    }
}

fn parse_created(
    date: Option<&str>,
    format: &(impl time::parsing::Parsable + ?Sized),
) -> Option<OffsetDateTime> {
    date.and_then(|s| OffsetDateTime::parse(s, format).ok())
}

fn verification_response(raw: serde_json::Value, fallback_to: &str) -> VerificationResponse {
    let resource = TwilioResource::from_raw(&raw);
    VerificationResponse {
        id: resource.sid.unwrap_or_else(sms_core::fallback_id),
        status: resource.status.unwrap_or_else(|| "unknown".to_string()),
        to: resource.to.unwrap_or_else(|| fallback_to.to_string()),
        valid: resource.valid,
        provider: PROVIDER,
        // Verify speaks ISO 8601, the 2010 messaging API RFC 2822
        created: parse_created(resource.date_created.as_deref(), &Rfc3339),
        raw,
    }
}

#[async_trait]
impl SmsClient for TwilioClient {
    async fn send(&self, req: SendRequest<'_>) -> Result<SendResponse, SmsError> {
        let url = endpoint(
            &self.api_base,
            &["2010-04-01", "Accounts", self.account_sid.as_str(), "Messages.json"],
        )?;
        let form = MessageForm {
            to: req.to,
            from: req.from,
            body: req.text,
        };

        let raw = self.post_form(url, &form).await.inspect_err(|e| {
            warn!(to = req.to, error = %e, "twilio message failed");
        })?;
        let resource = TwilioResource::from_raw(&raw);
        let response = SendResponse {
            id: resource.sid.unwrap_or_else(sms_core::fallback_id),
            status: resource.status.unwrap_or_else(|| "unknown".to_string()),
            to: resource.to.unwrap_or_else(|| req.to.to_string()),
            provider: PROVIDER,
            created: parse_created(resource.date_created.as_deref(), &Rfc2822),
            raw,
        };
        info!(id = %response.id, status = %response.status, to = %response.to, "twilio message created");
        Ok(response)
    }
}

#[async_trait]
impl VerifyClient for TwilioClient {
    async fn start_verification(
        &self,
        req: VerificationRequest<'_>,
    ) -> Result<VerificationResponse, SmsError> {
        let url = endpoint(
            &self.verify_base,
            &["v2", "Services", req.service_id, "Verifications"],
        )?;
        let form = VerificationForm {
            to: req.to,
            channel: req.channel.as_str(),
        };

        let raw = self.post_form(url, &form).await.inspect_err(|e| {
            warn!(to = req.to, error = %e, "twilio verification failed");
        })?;
        let response = verification_response(raw, req.to);
        info!(id = %response.id, status = %response.status, to = %response.to, "twilio verification created");
        Ok(response)
    }

    async fn check_verification(
        &self,
        req: VerificationCheckRequest<'_>,
    ) -> Result<VerificationResponse, SmsError> {
        if req.code.is_empty() {
            return Err(SmsError::Invalid("verification code is empty".into()));
        }
        let url = endpoint(
            &self.verify_base,
            &["v2", "Services", req.service_id, "VerificationCheck"],
        )?;
        let form = VerificationCheckForm {
            to: req.to,
            code: req.code,
        };

        let raw = self.post_form(url, &form).await.inspect_err(|e| {
            warn!(to = req.to, error = %e, "twilio verification check failed");
        })?;
        let response = verification_response(raw, req.to);
        info!(status = %response.status, to = %response.to, "twilio verification checked");
        Ok(response)
    }
}
