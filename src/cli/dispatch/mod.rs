//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary executes.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, token};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let token_opts = token::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        token: token_opts,
        auth: auth_opts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const DSN: &str = "postgres://portal@localhost:5432/portal";

    fn env_with(
        overrides: &[(&'static str, &'static str)],
    ) -> Vec<(&'static str, Option<&'static str>)> {
        let mut vars = vec![
            ("PORTAL_AUTH_DSN", Some(DSN)),
            ("PORTAL_AUTH_SIGNING_KEY", Some("/tmp/portal-auth.pem")),
        ];
        for key in [
            "PORTAL_AUTH_PREVIOUS_PUBLIC_KEY",
            "PORTAL_AUTH_PREVIOUS_KEY_ID",
            "PORTAL_AUTH_SESSION_TTL_SECONDS",
            "PORTAL_AUTH_REMEMBER_DAYS",
            "PORTAL_AUTH_TRUST_PROXY_HEADERS",
            "PORTAL_AUTH_COOKIE_DOMAIN",
            "PORTAL_AUTH_COOKIE_INSECURE",
            "PORTAL_AUTH_BOOTSTRAP_ADMIN_EMAIL",
            "PORTAL_AUTH_ISSUER",
            "PORTAL_AUTH_SIGNING_KEY_ID",
        ] {
            let value = overrides
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| *value);
            vars.push((key, value));
        }
        vars
    }

    #[test]
    fn builds_server_action_from_env() {
        let vars = env_with(&[
            ("PORTAL_AUTH_COOKIE_DOMAIN", ".portal.test"),
            ("PORTAL_AUTH_BOOTSTRAP_ADMIN_EMAIL", "root@portal.test"),
        ]);
        temp_env::with_vars(vars, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["portal-auth"]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert_eq!(args.dsn.expose_secret(), DSN);
                assert_eq!(args.token.signing_key_id, "portal-auth-1");
                assert!(args.token.previous_key.is_none());
                assert_eq!(args.auth.cookie_domain.as_deref(), Some(".portal.test"));
                assert!(args.auth.cookie_secure);
                assert_eq!(
                    args.auth.bootstrap_admin_email.as_deref(),
                    Some("root@portal.test")
                );

                let config = args.auth.auth_config(&args.token.issuer);
                assert_eq!(config.issuer(), "portal-auth");
                assert_eq!(config.cookie_domain(), Some(".portal.test"));
                assert!(!config.trust_proxy_headers());
            }
        });
    }

    #[test]
    fn previous_key_needs_both_halves() {
        let vars = env_with(&[("PORTAL_AUTH_PREVIOUS_PUBLIC_KEY", "/tmp/old.pem")]);
        temp_env::with_vars(vars, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["portal-auth"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("must be set together"));
            }
        });
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let vars = env_with(&[("PORTAL_AUTH_SESSION_TTL_SECONDS", "0")]);
        temp_env::with_vars(vars, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["portal-auth"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--session-ttl-seconds"));
            }
        });
    }

    #[test]
    fn rejects_remember_days_beyond_maximum() {
        let vars = env_with(&[("PORTAL_AUTH_REMEMBER_DAYS", "9223372036854775807")]);
        temp_env::with_vars(vars, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["portal-auth"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("--remember-days must be at most"));
            }
        });
    }

    #[test]
    fn trust_proxy_headers_flag_reaches_config() {
        let vars = env_with(&[("PORTAL_AUTH_TRUST_PROXY_HEADERS", "true")]);
        temp_env::with_vars(vars, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["portal-auth"]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert!(args.auth.auth_config(&args.token.issuer).trust_proxy_headers());
            }
        });
    }
}
