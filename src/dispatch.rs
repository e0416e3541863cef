//! Action dispatch and result reporting.
//!
//! The plain SMS and the verification SMS each run on their own task and hand
//! back exactly one [`Outcome`] through a dedicated oneshot channel. The code
//! check runs inline on the calling task. Results are printed SMS first, then
//! verification, whatever order the remote calls finish in.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use sms_core::{
    Channel, SendRequest, SmsClient, VerificationCheckRequest, VerificationRequest, VerifyClient,
};
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::settings::Settings;

/// Body of the plain SMS.
pub const SMS_BODY: &str = "Mensaje de prueba de sms normal desde SALTO";

/// The two actions that run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Sms,
    Verification,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::Sms => "sms",
            Action::Verification => "ver",
        }
    }
}

/// Single-shot result of a concurrent action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent { status: String, to: String },
    Failed,
}

/// An outcome bound to its action, printable as the report line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub action: Action,
    pub outcome: Outcome,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Sent { status, to } => {
                write!(f, "sended {}! ({} - {})", self.action.label(), status, to)
            }
            Outcome::Failed => write!(f, "error sending {}!", self.action.label()),
        }
    }
}

pub struct Dispatcher<C> {
    client: Arc<C>,
}

impl<C> Dispatcher<C>
where
    C: SmsClient + VerifyClient + 'static,
{
    pub fn new(client: C) -> Self {
        Self::from_shared(Arc::new(client))
    }

    pub fn from_shared(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Run every action `settings` selects and write the report to `out`.
    ///
    /// Remote failures never surface as `Err`; only a failing writer does.
    pub async fn run<W: Write>(&self, settings: &Settings, out: &mut W) -> io::Result<()> {
        let actions = settings.actions();

        let sms = actions.sms.then(|| self.spawn_sms(settings));
        let ver = actions
            .verification
            .then(|| self.spawn_verification(settings));

        if let Some(code) = &actions.check {
            writeln!(out, "checking with code")?;
            let line = self.check(settings, code).await;
            writeln!(out, "{}", line)?;
        }

        if actions.is_empty() {
            writeln!(out, "nothing to do")?;
        }

        if let Some(rx) = sms {
            writeln!(out, "{}", receive(Action::Sms, rx).await)?;
        }
        if let Some(rx) = ver {
            writeln!(out, "{}", receive(Action::Verification, rx).await)?;
        }
        out.flush()
    }

    fn spawn_sms(&self, settings: &Settings) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let client = Arc::clone(&self.client);
        let to = settings.send_to.clone();
        let from = settings.send_from.clone();

        tokio::spawn(async move {
            info!(%to, "sending sms");
            let req = SendRequest {
                to: &to,
                from: &from,
                text: SMS_BODY,
            };
            let outcome = match client.send(req).await {
                Ok(res) => {
                    info!(status = %res.status, to = %res.to, "sms response");
                    Outcome::Sent {
                        status: res.status,
                        to: res.to,
                    }
                }
                Err(e) => {
                    warn!(%to, error = %e, "error sending sms");
                    Outcome::Failed
                }
            };
            // receiver only goes away if the coordinator itself is gone
            let _ = tx.send(outcome);
        });
        rx
    }

    fn spawn_verification(&self, settings: &Settings) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let client = Arc::clone(&self.client);
        let to = settings.send_to.clone();
        let service_id = settings.verify_service_id.clone();

        tokio::spawn(async move {
            info!(%to, "sending verification");
            let req = VerificationRequest {
                service_id: &service_id,
                to: &to,
                channel: Channel::Sms,
            };
            let outcome = match client.start_verification(req).await {
                Ok(res) => {
                    info!(status = %res.status, to = %res.to, "verification response");
                    Outcome::Sent {
                        status: res.status,
                        to: res.to,
                    }
                }
                Err(e) => {
                    warn!(%to, error = %e, "error sending verification");
                    Outcome::Failed
                }
            };
            let _ = tx.send(outcome);
        });
        rx
    }

    async fn check(&self, settings: &Settings, code: &str) -> String {
        let req = VerificationCheckRequest {
            service_id: &settings.verify_service_id,
            to: &settings.send_to,
            code,
        };
        match self.client.check_verification(req).await {
            Ok(res) => format!("Response: {} - {}", res.status, res.to),
            Err(e) => {
                warn!(to = %settings.send_to, error = %e, "error checking code");
                format!("error checking code: {}", e)
            }
        }
    }
}

async fn receive(action: Action, rx: oneshot::Receiver<Outcome>) -> Report {
    let outcome = rx.await.unwrap_or_else(|_| {
        // sender dropped without a result: the task panicked
        warn!(action = action.label(), "task ended without a result");
        Outcome::Failed
    });
    Report { action, outcome }
}
