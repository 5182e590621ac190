//! Runtime knobs for the auth core.

use std::time::Duration;

pub const DEFAULT_ISSUER: &str = "portal-auth";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 3600;
pub const DEFAULT_REMEMBER_DAYS: i64 = 30;
pub const DEFAULT_RESET_TTL_SECONDS: i64 = 3600;
pub const DEFAULT_COOKIE_NAME: &str = "sso_token";
pub const DEFAULT_MAIL_FROM: &str = "no-reply@portal.local";
pub const DEFAULT_EMAIL_TIMEOUT_SECONDS: u64 = 10;

pub const MAX_SESSION_TTL_SECONDS: i64 = 365 * 24 * 3600;
pub const MAX_REMEMBER_DAYS: i64 = 3650;
pub const MAX_RESET_TTL_SECONDS: i64 = 7 * 24 * 3600;

const fn clamp_ttl(value: i64, max: i64) -> i64 {
    if value < 1 {
        1
    } else if value > max {
        max
    } else {
        value
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    issuer: String,
    base_url: String,
    session_ttl_seconds: i64,
    remember_days: i64,
    reset_ttl_seconds: i64,
    mail_from: String,
    email_timeout: Duration,
    cookie_name: String,
    cookie_domain: Option<String>,
    cookie_secure: bool,
    trust_proxy_headers: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            issuer: DEFAULT_ISSUER.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            remember_days: DEFAULT_REMEMBER_DAYS,
            reset_ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
            mail_from: DEFAULT_MAIL_FROM.to_string(),
            email_timeout: Duration::from_secs(DEFAULT_EMAIL_TIMEOUT_SECONDS),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: None,
            cookie_secure: true,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Public URL of the portal, used to build reset links.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// TTL setters clamp to `1..=MAX_*` so expiry arithmetic stays in range.
    #[must_use]
    pub const fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = clamp_ttl(seconds, MAX_SESSION_TTL_SECONDS);
        self
    }

    #[must_use]
    pub const fn with_remember_days(mut self, days: i64) -> Self {
        self.remember_days = clamp_ttl(days, MAX_REMEMBER_DAYS);
        self
    }

    #[must_use]
    pub const fn with_reset_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_ttl_seconds = clamp_ttl(seconds, MAX_RESET_TTL_SECONDS);
        self
    }

    #[must_use]
    pub fn with_mail_from(mut self, mail_from: impl Into<String>) -> Self {
        self.mail_from = mail_from.into();
        self
    }

    #[must_use]
    pub const fn with_email_timeout(mut self, timeout: Duration) -> Self {
        self.email_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain.filter(|value| !value.trim().is_empty());
        self
    }

    #[must_use]
    pub const fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    /// Take the client origin from `X-Forwarded-For`/`X-Real-IP`. Only for
    /// deployments behind a proxy that overwrites those headers.
    #[must_use]
    pub const fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub const fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_seconds)
    }

    #[must_use]
    pub const fn remember_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.remember_days)
    }

    #[must_use]
    pub const fn reset_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reset_ttl_seconds)
    }

    #[must_use]
    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    #[must_use]
    pub const fn email_timeout(&self) -> Duration {
        self.email_timeout
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    #[must_use]
    pub const fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub const fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}
