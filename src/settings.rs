use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Parser;
use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, File, FileStoredFormat, Format, Map, Value, ValueKind};
use serde::{Deserialize, Serialize};
use sms_core::SmsError;
use sms_twilio::{TwilioClient, DEFAULT_API_BASE, DEFAULT_VERIFY_BASE};

use crate::logging::{LogFormat, LoggingConfig};

/// Config file read when `-config` is not given. A missing file is skipped.
pub const DEFAULT_CONFIG_FILE: &str = "config.conf";

/// Placeholder for credentials and numbers nobody configured.
pub const UNSET: &str = "tbd";

/// Flag name on the command line / in the config file, and the settings key it feeds.
const OPTIONS: &[(&str, &str)] = &[
    ("sms", "sms"),
    ("ver", "ver"),
    ("chk", "chk"),
    ("accountSid", "account_sid"),
    ("authToken", "auth_token"),
    ("verifyServiceId", "verify_service_id"),
    ("sendTo", "send_to"),
    ("sendFrom", "send_from"),
    ("logLevel", "log_level"),
    ("logFormat", "log_format"),
    ("timeout", "timeout_secs"),
    ("apiBaseUrl", "api_base_url"),
    ("verifyBaseUrl", "verify_base_url"),
];

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Bad command line, or a help/version request
    #[error(transparent)]
    Args(#[from] clap::Error),
    /// Config file syntax or value type errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything one invocation needs. Built once, then only read.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Send a plain SMS
    pub sms: bool,
    /// Send a verification SMS
    pub ver: bool,
    /// Verification code to check; 0 or less skips the check
    pub chk: i64,
    pub account_sid: String,
    pub auth_token: String,
    pub verify_service_id: String,
    /// Destination phone number
    pub send_to: String,
    /// Origin phone number
    pub send_from: String,
    /// `EnvFilter` directive (default: warn)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Per-request deadline in seconds; 0 waits forever
    pub timeout_secs: u64,
    pub api_base_url: String,
    pub verify_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sms: false,
            ver: false,
            chk: 0,
            account_sid: UNSET.to_string(),
            auth_token: UNSET.to_string(),
            verify_service_id: UNSET.to_string(),
            send_to: UNSET.to_string(),
            send_from: UNSET.to_string(),
            log_level: "warn".to_string(),
            log_format: LogFormat::Pretty,
            timeout_secs: 0,
            api_base_url: DEFAULT_API_BASE.to_string(),
            verify_base_url: DEFAULT_VERIFY_BASE.to_string(),
        }
    }
}

/// Which of the three top-level actions this run performs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actions {
    pub sms: bool,
    pub verification: bool,
    /// The code to check, already in decimal form.
    pub check: Option<String>,
}

impl Actions {
    pub fn is_empty(&self) -> bool {
        !self.sms && !self.verification && self.check.is_none()
    }
}

impl Settings {
    /// Load from the process arguments.
    pub fn load() -> Result<Self, SettingsError> {
        Self::from_args(std::env::args())
    }

    /// Parse an argument vector (program name first).
    ///
    /// Precedence, lowest first: built-in defaults, the config file, flags
    /// given on the command line.
    pub fn from_args<I, T>(args: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let cli = Cli::try_parse_from(normalize_args(args))?;

        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(text) = cli.read_config_file()? {
            builder = builder.add_source(File::from_str(&text, PlainFormat));
        }
        let s = cli.apply_overrides(builder)?.build()?;

        Ok(s.try_deserialize()?)
    }

    pub fn actions(&self) -> Actions {
        Actions {
            sms: self.sms,
            verification: self.ver,
            check: (self.chk > 0).then(|| self.chk.to_string()),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Build the provider client from the credentials and endpoints.
    pub fn twilio_client(&self) -> Result<TwilioClient, SmsError> {
        let client = TwilioClient::new(self.account_sid.as_str(), self.auth_token.as_str())
            .with_base_urls(&self.api_base_url, &self.verify_base_url)?;
        match self.timeout() {
            Some(timeout) => client.with_timeout(timeout),
            None => Ok(client),
        }
    }
}

/// Command line surface. Every option is optional so that only the flags the
/// user actually typed override the config file.
#[derive(Debug, Parser)]
#[command(name = "smsverify", version)]
#[command(about = "Send SMS and phone verification codes through Twilio, and check codes")]
#[command(after_help = "Examples:
  smsverify -sms -sendTo +34600000000 -sendFrom +34911111111
  smsverify -ver -sendTo +34600000000 -verifyServiceId VAxxxx
  smsverify -chk 123456 -sendTo +34600000000 -verifyServiceId VAxxxx
  smsverify -config twilio.conf -sms -ver")]
struct Cli {
    /// Plain config file, one `key value` per line [default: config.conf]
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Send a regular SMS
    #[arg(long = "sms", num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    sms: Option<bool>,

    /// Send a verification SMS
    #[arg(long = "ver", num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    ver: Option<bool>,

    /// Verification code to check [default: 0, skip]
    #[arg(long = "chk", value_name = "CODE", allow_negative_numbers = true)]
    chk: Option<i64>,

    /// Twilio account SID
    #[arg(long = "accountSid")]
    account_sid: Option<String>,

    /// Twilio auth token
    #[arg(long = "authToken")]
    auth_token: Option<String>,

    /// Twilio Verify service id
    #[arg(long = "verifyServiceId")]
    verify_service_id: Option<String>,

    /// Destination phone number
    #[arg(long = "sendTo")]
    send_to: Option<String>,

    /// Origin phone number
    #[arg(long = "sendFrom")]
    send_from: Option<String>,

    /// Log filter, overridden by RUST_LOG [default: warn]
    #[arg(long = "logLevel")]
    log_level: Option<String>,

    /// Log output format: pretty or json [default: pretty]
    #[arg(long = "logFormat")]
    log_format: Option<LogFormat>,

    /// Per-request timeout in seconds [default: 0, none]
    #[arg(long = "timeout", value_name = "SECS")]
    timeout: Option<u32>,

    /// Twilio messaging API base URL
    #[arg(long = "apiBaseUrl", hide = true)]
    api_base_url: Option<String>,

    /// Twilio Verify API base URL
    #[arg(long = "verifyBaseUrl", hide = true)]
    verify_base_url: Option<String>,
}

impl Cli {
    fn read_config_file(&self) -> Result<Option<String>, SettingsError> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        // a missing file is skipped, wherever its path came from
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SettingsError::Io { path, source }),
        }
    }

    fn apply_overrides(
        self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut b = builder;
        b = override_with(b, "sms", self.sms)?;
        b = override_with(b, "ver", self.ver)?;
        b = override_with(b, "chk", self.chk)?;
        b = override_with(b, "account_sid", self.account_sid)?;
        b = override_with(b, "auth_token", self.auth_token)?;
        b = override_with(b, "verify_service_id", self.verify_service_id)?;
        b = override_with(b, "send_to", self.send_to)?;
        b = override_with(b, "send_from", self.send_from)?;
        b = override_with(b, "log_level", self.log_level)?;
        b = override_with(b, "log_format", self.log_format.map(LogFormat::as_str))?;
        b = override_with(b, "timeout_secs", self.timeout.map(i64::from))?;
        b = override_with(b, "api_base_url", self.api_base_url)?;
        override_with(b, "verify_base_url", self.verify_base_url)
    }
}

fn override_with<T: Into<Value>>(
    builder: ConfigBuilder<DefaultState>,
    key: &str,
    value: Option<T>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match value {
        Some(value) => builder.set_override(key, value),
        None => Ok(builder),
    }
}

/// Accept Go-style single-dash long flags (`-sendTo x`, `-chk=12`) by
/// rewriting them to the double-dash form clap understands.
///
/// A value flag written without `=` takes the next argument verbatim, even
/// when it looks like a flag (`-authToken -sms`), so the pair is joined into
/// `--authToken=-sms`.
fn normalize_args<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut out: Vec<String> = args.next().into_iter().collect();

    while let Some(arg) = args.next() {
        if arg == "--" {
            out.push(arg);
            out.extend(args.by_ref());
            break;
        }
        let name = match arg.strip_prefix("--").or_else(|| arg.strip_prefix('-')) {
            Some(rest) if !rest.starts_with('-') && is_long_flag(rest) => rest,
            _ => {
                out.push(arg);
                continue;
            }
        };
        if takes_value(name) {
            if let Some(value) = args.next() {
                out.push(format!("--{}={}", name, value));
                continue;
            }
        }
        out.push(format!("--{}", name));
    }
    out
}

fn is_long_flag(arg: &str) -> bool {
    let name = arg.split_once('=').map_or(arg, |(name, _)| name);
    matches!(name, "config" | "help" | "version")
        || OPTIONS.iter().any(|(flag, _)| *flag == name)
}

/// A known flag, without an inline `=value`, that consumes the next argument.
fn takes_value(name: &str) -> bool {
    !name.contains('=') && !matches!(name, "sms" | "ver" | "help" | "version")
}

/// The flat `key value` config format: blank lines and `#` comment lines are
/// skipped, the key runs up to the first space, a trailing ` #` starts a
/// comment, and a bare key means `true`.
#[derive(Debug, Clone)]
struct PlainFormat;

impl Format for PlainFormat {
    fn parse(
        &self,
        uri: Option<&String>,
        text: &str,
    ) -> Result<Map<String, Value>, Box<dyn Error + Send + Sync>> {
        let mut map = Map::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = match line.split_once(char::is_whitespace) {
                Some((name, rest)) => {
                    let rest = rest.trim_start();
                    let value = rest.find(" #").map_or(rest, |i| rest[..i].trim_end());
                    (name, value)
                }
                None => (line, "true"),
            };
            if name == "config" {
                continue;
            }
            let key = OPTIONS
                .iter()
                .find(|(flag, key)| *flag == name || *key == name)
                .map(|(_, key)| *key)
                .ok_or_else(|| format!("unknown option {:?} on line {}", name, number + 1))?;
            map.insert(
                key.to_string(),
                Value::new(uri, ValueKind::String(value.to_string())),
            );
        }
        Ok(map)
    }
}

impl FileStoredFormat for PlainFormat {
    fn file_extensions(&self) -> &'static [&'static str] {
        &["conf"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn parse_with_config(config: &Path, args: &[&str]) -> Settings {
        let config = config.to_str().unwrap();
        let mut argv = vec!["smsverify", "-config", config];
        argv.extend_from_slice(args);
        Settings::from_args(argv).unwrap()
    }

    /// Parse with a config path that does not exist, so a stray
    /// `config.conf` in the working directory cannot leak in.
    fn parse(args: &[&str]) -> Settings {
        let dir = tempfile::tempdir().unwrap();
        parse_with_config(&dir.path().join("absent.conf"), args)
    }

    #[test]
    fn defaults_when_nothing_given() {
        let settings = parse(&[]);
        assert_eq!(settings.send_to, "tbd");
        assert_eq!(settings.account_sid, "tbd");
        assert!(!settings.sms && !settings.ver);
        assert_eq!(settings.chk, 0);
        assert!(settings.actions().is_empty());
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn single_dash_flags() {
        let settings = parse(&[
            "-sms",
            "-chk",
            "1234",
            "-sendTo",
            "+34600000000",
            "-sendFrom=+34911111111",
            "-accountSid",
            "AC123",
        ]);
        assert!(settings.sms);
        assert!(!settings.ver);
        assert_eq!(settings.chk, 1234);
        assert_eq!(settings.send_to, "+34600000000");
        assert_eq!(settings.send_from, "+34911111111");
        assert_eq!(settings.account_sid, "AC123");
    }

    #[test]
    fn double_dash_and_explicit_bools() {
        let settings = parse(&["--ver", "--sms=false", "--timeout", "5"]);
        assert!(settings.ver);
        assert!(!settings.sms);
        assert_eq!(settings.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn actions_stringify_code() {
        let settings = parse(&["-chk", "1234"]);
        assert_eq!(
            settings.actions(),
            Actions {
                sms: false,
                verification: false,
                check: Some("1234".to_string()),
            }
        );
        assert_eq!(parse(&["-chk", "0"]).actions().check, None);
        assert_eq!(parse(&["-chk", "-7"]).actions().check, None);
    }

    #[test]
    fn config_file_is_layered_under_flags() {
        let file = write_config(
            "# twilio credentials\n\
             accountSid ACfromfile\n\
             authToken   secret # trailing comment\n\
             sendTo +34600000000\n\
             \n\
             ver\n\
             chk 99\n",
        );
        let settings = parse_with_config(file.path(), &["-chk", "123456"]);
        assert_eq!(settings.account_sid, "ACfromfile");
        assert_eq!(settings.auth_token, "secret");
        assert_eq!(settings.send_to, "+34600000000");
        assert!(settings.ver);
        // flag beats file
        assert_eq!(settings.chk, 123456);
        // untouched keys keep defaults
        assert_eq!(settings.send_from, "tbd");
    }

    #[test]
    fn config_file_accepts_bool_values() {
        let file = write_config("sms false\nver true\nlogFormat json\n");
        let settings = parse_with_config(file.path(), &[]);
        assert!(!settings.sms);
        assert!(settings.ver);
        assert_eq!(settings.log_format, LogFormat::Json);
    }

    #[test]
    fn unknown_config_key_is_rejected() {
        let file = write_config("sendTo +34600000000\nbogus 1\n");
        let err = Settings::from_args(["smsverify", "-config", file.path().to_str().unwrap()])
            .unwrap_err();
        assert!(matches!(err, SettingsError::Config(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn bad_code_in_config_file_is_rejected() {
        let file = write_config("chk notanumber\n");
        let err = Settings::from_args(["smsverify", "-config", file.path().to_str().unwrap()])
            .unwrap_err();
        assert!(matches!(err, SettingsError::Config(_)));
    }

    #[test]
    fn explicit_missing_config_file_is_skipped() {
        let settings = Settings::from_args([
            "smsverify",
            "-config",
            "/nope/here.conf",
            "-sms",
            "-sendTo",
            "+34600000000",
        ])
        .unwrap();
        assert!(settings.sms);
        assert_eq!(settings.send_to, "+34600000000");
        assert_eq!(settings.account_sid, UNSET);
    }

    #[test]
    fn unreadable_config_path_is_an_error() {
        // a directory exists but cannot be read as a file
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_args(["smsverify", "-config", dir.path().to_str().unwrap()])
            .unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn bad_flag_value_is_a_usage_error() {
        let err = Settings::from_args(["smsverify", "-chk", "abc"]).unwrap_err();
        assert!(matches!(err, SettingsError::Args(_)));
        let err = Settings::from_args(["smsverify", "-nope"]).unwrap_err();
        assert!(matches!(err, SettingsError::Args(_)));
    }

    #[test]
    fn normalizes_only_known_flags() {
        let args = normalize_args([
            "smsverify",
            "-sendTo",
            "-chk=5",
            "-h",
            "--ver",
            "-5",
            "--",
            "-sms",
        ]);
        assert_eq!(
            args,
            vec!["smsverify", "--sendTo=-chk=5", "-h", "--ver", "-5", "--", "-sms"]
        );

        let args = normalize_args(["smsverify", "-chk=5", "-sms", "-logLevel", "debug", "-x"]);
        assert_eq!(
            args,
            vec!["smsverify", "--chk=5", "--sms", "--logLevel=debug", "-x"]
        );
    }

    #[test]
    fn value_flags_take_dash_values_verbatim() {
        let settings = parse(&["-authToken", "-sms", "-sendFrom", "--ver"]);
        assert_eq!(settings.auth_token, "-sms");
        assert_eq!(settings.send_from, "--ver");
        assert!(!settings.sms);
        assert!(!settings.ver);

        let settings = parse(&["--authToken", "-sms", "-ver"]);
        assert_eq!(settings.auth_token, "-sms");
        assert!(settings.ver);

        let settings = parse(&["-chk", "-7", "-sms"]);
        assert_eq!(settings.chk, -7);
        assert!(settings.sms);
    }

    #[test]
    fn builds_client_with_overrides() {
        let settings = parse(&["-apiBaseUrl", "http://localhost:1", "-timeout", "3"]);
        let client = settings.twilio_client().unwrap();
        assert_eq!(client.account_sid(), "tbd");

        let broken = parse(&["-verifyBaseUrl", "not a url"]);
        assert!(broken.twilio_client().is_err());
    }
}
