use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;
use crate::turnstile;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown BOOKING_SINK '{0}' (expected store, email or store+email)")]
    UnknownSink(String),
    #[error("{0} must be a number")]
    NotANumber(&'static str),
    #[error("BOOKING_SINK={0} needs MAIL_API_URL")]
    MissingMailApi(&'static str),
    #[error("BOOKING_SINK={0} needs NOTIFY_EMAIL or a site profile with notifyEmail")]
    NoRecipients(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkMode {
    Store,
    Email,
    StoreAndEmail,
}

impl SinkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkMode::Store => "store",
            SinkMode::Email => "email",
            SinkMode::StoreAndEmail => "store+email",
        }
    }

    pub fn sends_email(self) -> bool {
        !matches!(self, SinkMode::Store)
    }
}

impl FromStr for SinkMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "store" | "db" => Ok(SinkMode::Store),
            "email" => Ok(SinkMode::Email),
            "store+email" | "both" => Ok(SinkMode::StoreAndEmail),
            other => Err(ConfigError::UnknownSink(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub turnstile_secret: Option<String>,
    pub turnstile_verify_url: String,
    pub turnstile_timeout: Duration,
    pub allowed_origins: Vec<String>,
    pub admin_user: Option<String>,
    pub admin_pass: Option<String>,
    pub trusted_identity_header: Option<String>,
    pub client_ip_header: Option<String>,
    pub sink_mode: SinkMode,
    pub mail_api_url: Option<String>,
    pub mail_api_token: Option<String>,
    pub notify_to: Vec<String>,
    pub notify_from: String,
    pub sites_file: Option<PathBuf>,
    pub enable_hsts: bool,
    pub rate_limit_enabled: bool,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let num = |k: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(k) {
                Some(v) => v.parse().map_err(|_| ConfigError::NotANumber(k)),
                None => Ok(default),
            }
        };
        let flag = |k: &str, default: bool| get(k).and_then(|v| parse_flag(&v)).unwrap_or(default);

        let rate_defaults = RateLimitConfig::default();
        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            database_url: get("DATABASE_URL"),
            data_dir: get("BOOKINGS_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data")),
            turnstile_secret: get("TURNSTILE_SECRET_KEY"),
            turnstile_verify_url: get("TURNSTILE_VERIFY_URL").unwrap_or_else(|| turnstile::DEFAULT_VERIFY_URL.into()),
            turnstile_timeout: Duration::from_secs(num("TURNSTILE_TIMEOUT_SECS", turnstile::DEFAULT_TIMEOUT.as_secs())?),
            allowed_origins: split_csv(get("ALLOWED_ORIGINS")),
            admin_user: get("ADMIN_USER"),
            admin_pass: get("ADMIN_PASS"),
            trusted_identity_header: get("TRUSTED_IDENTITY_HEADER"),
            client_ip_header: Some(get("CLIENT_IP_HEADER").unwrap_or_else(|| "CF-Connecting-IP".into())),
            sink_mode: get("BOOKING_SINK").map_or(Ok(SinkMode::Store), |v| v.parse())?,
            mail_api_url: get("MAIL_API_URL"),
            mail_api_token: get("MAIL_API_TOKEN"),
            notify_to: split_csv(get("NOTIFY_EMAIL")),
            notify_from: get("NOTIFY_FROM").unwrap_or_else(|| "bookings@localhost".into()),
            sites_file: get("SITES_FILE").map(PathBuf::from),
            enable_hsts: flag("ENABLE_HSTS", true),
            rate_limit_enabled: flag("RATE_LIMIT_ENABLED", false),
            rate_limit: RateLimitConfig {
                booking_limit: usize::try_from(num("RL_BOOKING_LIMIT", rate_defaults.booking_limit as u64)?)
                    .map_err(|_| ConfigError::NotANumber("RL_BOOKING_LIMIT"))?,
                booking_window: Duration::from_secs(num("RL_BOOKING_WINDOW", rate_defaults.booking_window.as_secs())?),
            },
        })
    }

    /// Cross-field checks. `site_recipients` says whether any site profile
    /// carries its own notification address.
    pub fn validate(&self, site_recipients: bool) -> Result<(), ConfigError> {
        if self.sink_mode.sends_email() {
            if self.mail_api_url.is_none() {
                return Err(ConfigError::MissingMailApi(self.sink_mode.as_str()));
            }
            if self.notify_to.is_empty() && !site_recipients {
                return Err(ConfigError::NoRecipients(self.sink_mode.as_str()));
            }
        }
        Ok(())
    }

    /// Non-fatal gaps worth logging at startup.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut w = Vec::new();
        if self.turnstile_secret.is_none() {
            w.push("TURNSTILE_SECRET_KEY not set: every booking submission will be rejected");
        }
        let basic = self.admin_user.is_some() && self.admin_pass.is_some();
        if !basic && self.trusted_identity_header.is_none() {
            w.push("no admin access configured (ADMIN_USER/ADMIN_PASS or TRUSTED_IDENTITY_HEADER): admin routes deny all");
        }
        if self.allowed_origins.is_empty() {
            w.push("ALLOWED_ORIGINS empty: browsers will block cross-origin reads");
        }
        w
    }
}

/// `1/true/yes/on` or `0/false/no/off`, any case. Anything else is `None`
/// and the caller keeps its default.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
