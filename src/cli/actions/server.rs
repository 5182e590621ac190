use crate::{
    api,
    auth::{TokenSigner, TokenVerifier},
    cli::{
        commands::{auth, token},
        telemetry,
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{path::Path, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub token: token::Options,
    pub auth: auth::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing key cannot be loaded or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let signer = load_signer(
        &args.token.signing_key_path,
        &args.token.signing_key_id,
        args.token.generate_signing_key,
    )
    .await?;

    let verifier = match &args.token.previous_key {
        Some((kid, path)) => Some(previous_key_verifier(&signer, &args.token.issuer, kid, path).await?),
        None => None,
    };

    debug!("Auth options: {:?}", args.auth);

    let options = api::ServerOptions {
        auth_config: args.auth.auth_config(&args.token.issuer),
        signer,
        verifier,
        request_timeout: Duration::from_secs(args.auth.request_timeout_seconds),
        apply_schema: args.auth.apply_schema,
        bootstrap_admin_email: args.auth.bootstrap_admin_email,
    };

    let result = api::new(args.port, &args.dsn, options).await;

    telemetry::shutdown_tracer();

    result
}

/// Read the PKCS#8 signing key, creating it first when `generate` is set and
/// the file is missing.
async fn load_signer(path: &Path, kid: &str, generate: bool) -> Result<TokenSigner> {
    if generate && !tokio::fs::try_exists(path).await.unwrap_or(false) {
        let signer = TokenSigner::generate(kid);
        let pem = signer
            .to_pkcs8_pem()
            .context("Failed to encode signing key")?;
        tokio::fs::write(path, pem.as_bytes())
            .await
            .with_context(|| format!("Failed to write signing key: {}", path.display()))?;
        restrict_permissions(path).await?;
        info!("Generated new signing key at {}", path.display());
        return Ok(signer);
    }

    let pem = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read signing key: {}", path.display()))?;
    TokenSigner::from_pkcs8_pem(&pem, kid)
        .with_context(|| format!("Invalid signing key: {}", path.display()))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to restrict permissions: {}", path.display()))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Verifier trusting the current key plus one retired public key.
async fn previous_key_verifier(
    signer: &TokenSigner,
    issuer: &str,
    kid: &str,
    path: &Path,
) -> Result<TokenVerifier> {
    let pem = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read previous public key: {}", path.display()))?;
    signer
        .verifier(issuer)
        .with_public_key_pem(kid, &pem)
        .with_context(|| format!("Invalid previous public key: {}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::SessionClaims;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn temp_path(suffix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("portal-auth-{}-{suffix}", Ulid::new()))
    }

    fn claims(issuer: &str) -> SessionClaims {
        SessionClaims {
            iss: issuer.to_string(),
            iat: 1_700_000_000,
            exp: 1_700_003_600,
            sub: "1".to_string(),
            jti: Ulid::new().to_string(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: crate::auth::Role::Admin,
        }
    }

    #[tokio::test]
    async fn generates_then_reloads_the_same_key() {
        let path = temp_path("signing.pem");

        let generated = load_signer(&path, "k1", true).await.unwrap();
        let reloaded = load_signer(&path, "k1", false).await.unwrap();
        assert_eq!(
            generated.public_key_pem().unwrap(),
            reloaded.public_key_pem().unwrap()
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn missing_key_without_generate_fails() {
        let path = temp_path("missing.pem");
        let result = load_signer(&path, "k1", false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn previous_key_stays_trusted() {
        let retired = TokenSigner::generate("old");
        let current = TokenSigner::generate("new");
        let path = temp_path("old.pub.pem");
        std::fs::write(&path, retired.public_key_pem().unwrap()).unwrap();

        let verifier = previous_key_verifier(&current, "portal-auth", "old", &path)
            .await
            .unwrap();
        let old_token = retired.sign(&claims("portal-auth")).unwrap();
        let new_token = current.sign(&claims("portal-auth")).unwrap();
        assert!(verifier.verify(&old_token, 1_700_000_100).is_ok());
        assert!(verifier.verify(&new_token, 1_700_000_100).is_ok());

        let _ = std::fs::remove_file(&path);
    }
}
