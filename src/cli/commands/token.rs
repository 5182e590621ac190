use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_SIGNING_KEY_ID: &str = "signing-key-id";
pub const ARG_GENERATE_SIGNING_KEY: &str = "generate-signing-key";
pub const ARG_PREVIOUS_PUBLIC_KEY: &str = "previous-public-key";
pub const ARG_PREVIOUS_KEY_ID: &str = "previous-key-id";
pub const ARG_ISSUER: &str = "issuer";

#[derive(Debug, Clone)]
pub struct Options {
    pub signing_key_path: PathBuf,
    pub signing_key_id: String,
    pub generate_signing_key: bool,
    /// Public key (and its kid) still accepted after a key rotation.
    pub previous_key: Option<(String, PathBuf)>,
    pub issuer: String,
}

impl Options {
    /// Parse token arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let signing_key_path = get_non_empty(ARG_SIGNING_KEY)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_SIGNING_KEY}"))?;

        let previous_key = match (
            get_non_empty(ARG_PREVIOUS_KEY_ID),
            get_non_empty(ARG_PREVIOUS_PUBLIC_KEY),
        ) {
            (Some(kid), Some(path)) => Some((kid, PathBuf::from(path))),
            (None, None) => None,
            _ => anyhow::bail!(
                "--{ARG_PREVIOUS_PUBLIC_KEY} and --{ARG_PREVIOUS_KEY_ID} must be set together"
            ),
        };

        Ok(Self {
            signing_key_path,
            signing_key_id: get_non_empty(ARG_SIGNING_KEY_ID)
                .unwrap_or_else(|| "portal-auth-1".to_string()),
            generate_signing_key: matches.get_flag(ARG_GENERATE_SIGNING_KEY),
            previous_key,
            issuer: get_non_empty(ARG_ISSUER)
                .unwrap_or_else(|| crate::auth::config::DEFAULT_ISSUER.to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("Path to the Ed25519 session signing key (PKCS#8 PEM)")
                .env("PORTAL_AUTH_SIGNING_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SIGNING_KEY_ID)
                .long(ARG_SIGNING_KEY_ID)
                .help("Key id (kid) placed in session token headers")
                .env("PORTAL_AUTH_SIGNING_KEY_ID")
                .default_value("portal-auth-1"),
        )
        .arg(
            Arg::new(ARG_GENERATE_SIGNING_KEY)
                .long(ARG_GENERATE_SIGNING_KEY)
                .help("Generate the signing key file if it does not exist")
                .env("PORTAL_AUTH_GENERATE_SIGNING_KEY")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_PREVIOUS_PUBLIC_KEY)
                .long(ARG_PREVIOUS_PUBLIC_KEY)
                .help("Path to a retired public key (SPKI PEM) still accepted for verification")
                .env("PORTAL_AUTH_PREVIOUS_PUBLIC_KEY"),
        )
        .arg(
            Arg::new(ARG_PREVIOUS_KEY_ID)
                .long(ARG_PREVIOUS_KEY_ID)
                .help("Key id of the retired public key")
                .env("PORTAL_AUTH_PREVIOUS_KEY_ID"),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Session token issuer (iss)")
                .env("PORTAL_AUTH_ISSUER")
                .default_value("portal-auth"),
        )
}
