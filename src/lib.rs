//! # smsverify
//!
//! Send SMS messages and phone-verification codes through Twilio, and check
//! the codes users type back.
//!
//! ## Actions
//!
//! - **Plain SMS** (`-sms`): a fixed test message from `-sendFrom` to `-sendTo`
//! - **Verification SMS** (`-ver`): a one-time code issued by the Verify service `-verifyServiceId`
//! - **Code check** (`-chk <code>`): checks a code against the same service
//!
//! The first two run concurrently; the check runs inline. Each action reports
//! its own outcome on stdout and none of them can abort another.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use smsverify::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_args(["smsverify", "-sms", "-sendTo", "+34600000000"])?;
//!     let dispatcher = Dispatcher::new(settings.twilio_client()?);
//!     dispatcher.run(&settings, &mut std::io::stdout()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Flags may also come from a flat config file (`-config`, default
//! `config.conf`) holding one `key value` pair per line. Flags typed on the
//! command line win over the file.

pub mod dispatch;
pub mod logging;
pub mod settings;

pub use settings::*;

/// Common imports
pub mod prelude {
    pub use crate::dispatch::{Action, Dispatcher, Outcome, Report, SMS_BODY};
    pub use crate::logging::{LogFormat, LoggingConfig};
    pub use crate::settings::{Actions, Settings, SettingsError};
    pub use sms_core::*;
    pub use sms_twilio::TwilioClient;
}
