use std::process::ExitCode;

use smsverify::dispatch::Dispatcher;
use smsverify::logging;
use smsverify::settings::{Settings, SettingsError};
use tracing::{debug, error};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        // prints usage, or help/version, with clap's own exit code
        Err(SettingsError::Args(e)) => e.exit(),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(&settings.logging()) {
        eprintln!("logging disabled: {}", e);
    }
    debug!(actions = ?settings.actions(), to = %settings.send_to, "loaded settings");

    let client = match settings.twilio_client() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "cannot build twilio client");
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = Dispatcher::new(client);
    if let Err(e) = dispatcher.run(&settings, &mut std::io::stdout()).await {
        error!(error = %e, "cannot write report");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
