use crate::auth::{AuthConfig, config};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_REMEMBER_DAYS: &str = "remember-days";
pub const ARG_RESET_TTL_SECONDS: &str = "reset-ttl-seconds";
pub const ARG_MAIL_FROM: &str = "mail-from";
pub const ARG_EMAIL_TIMEOUT_SECONDS: &str = "email-timeout-seconds";
pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_COOKIE_INSECURE: &str = "cookie-insecure";
pub const ARG_REQUEST_TIMEOUT_SECONDS: &str = "request-timeout-seconds";
pub const ARG_APPLY_SCHEMA: &str = "apply-schema";
pub const ARG_BOOTSTRAP_ADMIN_EMAIL: &str = "bootstrap-admin-email";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";

#[derive(Debug, Clone)]
pub struct Options {
    pub base_url: String,
    pub session_ttl_seconds: i64,
    pub remember_days: i64,
    pub reset_ttl_seconds: i64,
    pub mail_from: String,
    pub email_timeout_seconds: u64,
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub request_timeout_seconds: u64,
    pub apply_schema: bool,
    pub bootstrap_admin_email: Option<String>,
    pub trust_proxy_headers: bool,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a TTL is not positive or exceeds its maximum.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };
        let get_bounded = |id: &str, default: i64, max: i64| -> anyhow::Result<i64> {
            let value = matches.get_one::<i64>(id).copied().unwrap_or(default);
            if value <= 0 {
                anyhow::bail!("--{id} must be greater than zero");
            }
            if value > max {
                anyhow::bail!("--{id} must be at most {max}");
            }
            Ok(value)
        };

        Ok(Self {
            base_url: get_non_empty(ARG_BASE_URL)
                .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string()),
            session_ttl_seconds: get_bounded(
                ARG_SESSION_TTL_SECONDS,
                config::DEFAULT_SESSION_TTL_SECONDS,
                config::MAX_SESSION_TTL_SECONDS,
            )?,
            remember_days: get_bounded(
                ARG_REMEMBER_DAYS,
                config::DEFAULT_REMEMBER_DAYS,
                config::MAX_REMEMBER_DAYS,
            )?,
            reset_ttl_seconds: get_bounded(
                ARG_RESET_TTL_SECONDS,
                config::DEFAULT_RESET_TTL_SECONDS,
                config::MAX_RESET_TTL_SECONDS,
            )?,
            mail_from: get_non_empty(ARG_MAIL_FROM)
                .unwrap_or_else(|| config::DEFAULT_MAIL_FROM.to_string()),
            email_timeout_seconds: matches
                .get_one::<u64>(ARG_EMAIL_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(config::DEFAULT_EMAIL_TIMEOUT_SECONDS),
            cookie_name: get_non_empty(ARG_COOKIE_NAME)
                .unwrap_or_else(|| config::DEFAULT_COOKIE_NAME.to_string()),
            cookie_domain: get_non_empty(ARG_COOKIE_DOMAIN),
            cookie_secure: !matches.get_flag(ARG_COOKIE_INSECURE),
            request_timeout_seconds: matches
                .get_one::<u64>(ARG_REQUEST_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(crate::api::DEFAULT_REQUEST_TIMEOUT_SECONDS),
            apply_schema: matches.get_flag(ARG_APPLY_SCHEMA),
            bootstrap_admin_email: get_non_empty(ARG_BOOTSTRAP_ADMIN_EMAIL),
            trust_proxy_headers: matches.get_flag(ARG_TRUST_PROXY_HEADERS),
        })
    }

    /// Build the core configuration; the issuer comes from the token options.
    #[must_use]
    pub fn auth_config(&self, issuer: &str) -> AuthConfig {
        AuthConfig::new()
            .with_issuer(issuer)
            .with_base_url(self.base_url.clone())
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_remember_days(self.remember_days)
            .with_reset_ttl_seconds(self.reset_ttl_seconds)
            .with_mail_from(self.mail_from.clone())
            .with_email_timeout(Duration::from_secs(self.email_timeout_seconds))
            .with_cookie_name(self.cookie_name.clone())
            .with_cookie_domain(self.cookie_domain.clone())
            .with_cookie_secure(self.cookie_secure)
            .with_trust_proxy_headers(self.trust_proxy_headers)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_reset_args(command);
    with_server_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("PORTAL_AUTH_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REMEMBER_DAYS)
                .long(ARG_REMEMBER_DAYS)
                .help("Session lifetime in days when \"remember me\" is set")
                .env("PORTAL_AUTH_REMEMBER_DAYS")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Session cookie name")
                .env("PORTAL_AUTH_COOKIE_NAME")
                .default_value("sso_token"),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Session cookie domain, shared by the portal apps")
                .env("PORTAL_AUTH_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_COOKIE_INSECURE)
                .long(ARG_COOKIE_INSECURE)
                .help("Omit the Secure cookie attribute (local HTTP development only)")
                .env("PORTAL_AUTH_COOKIE_INSECURE")
                .action(ArgAction::SetTrue),
        )
}

fn with_reset_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public portal URL used for reset links and CORS")
                .env("PORTAL_AUTH_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_RESET_TTL_SECONDS)
                .long(ARG_RESET_TTL_SECONDS)
                .help("Password reset link lifetime in seconds")
                .env("PORTAL_AUTH_RESET_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long(ARG_MAIL_FROM)
                .help("Sender address for reset emails")
                .env("PORTAL_AUTH_MAIL_FROM")
                .default_value("no-reply@portal.local"),
        )
        .arg(
            Arg::new(ARG_EMAIL_TIMEOUT_SECONDS)
                .long(ARG_EMAIL_TIMEOUT_SECONDS)
                .help("Give up on email delivery after this many seconds")
                .env("PORTAL_AUTH_EMAIL_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_server_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT_SECONDS)
                .long(ARG_REQUEST_TIMEOUT_SECONDS)
                .help("Per-request timeout in seconds")
                .env("PORTAL_AUTH_REQUEST_TIMEOUT_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_APPLY_SCHEMA)
                .long(ARG_APPLY_SCHEMA)
                .help("Create missing tables and indexes on startup")
                .env("PORTAL_AUTH_APPLY_SCHEMA")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Take the client address from X-Forwarded-For/X-Real-IP (only behind a trusted proxy)")
                .env("PORTAL_AUTH_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_BOOTSTRAP_ADMIN_EMAIL)
                .long(ARG_BOOTSTRAP_ADMIN_EMAIL)
                .help("Create this admin on startup if no admin exists yet")
                .long_help(
                    "Create this admin on startup if no admin exists yet.\n\nThe account has no password; a reset link is emailed (or logged if delivery fails).",
                )
                .env("PORTAL_AUTH_BOOTSTRAP_ADMIN_EMAIL"),
        )
}
