use crate::auth::{
    AuthConfig, AuthService, PgStore, ResetRequestOutcome, TokenSigner, TokenVerifier,
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, options},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything the server needs besides the database.
#[derive(Debug)]
pub struct ServerOptions {
    pub auth_config: AuthConfig,
    pub signer: TokenSigner,
    /// Overrides the verifier derived from `signer` (key rotation).
    pub verifier: Option<TokenVerifier>,
    pub request_timeout: Duration,
    pub apply_schema: bool,
    pub bootstrap_admin_email: Option<String>,
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: &SecretString, options: ServerOptions) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    let store = PgStore::new(pool);
    if options.apply_schema {
        store.apply_schema().await?;
        info!("Database schema applied");
    }

    let mut service = AuthService::new(options.auth_config, Arc::new(store), options.signer);
    if let Some(verifier) = options.verifier {
        service = service.with_verifier(verifier);
    }
    let auth = Arc::new(service);

    if let Some(email) = options.bootstrap_admin_email.as_deref() {
        match auth.bootstrap_admin(email).await {
            Ok(Some((user, ResetRequestOutcome::DeliveryFailed { reset_url }))) => {
                // Operator-only fallback: the admin has no other way in.
                warn!(user_id = user.id, "Reset email failed, use this link: {reset_url}");
            }
            Ok(Some((user, _))) => info!(user_id = user.id, "Created bootstrap admin"),
            Ok(None) => info!("Admin already exists, bootstrap skipped"),
            Err(err) => warn!("Failed to bootstrap admin: {err}"),
        }
    }

    let app = app(auth, options.request_timeout)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    // Login rate limiting keys on the peer address.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Assemble the full application: documented routes, `/openapi.json` and the
/// middleware stack.
///
/// # Errors
/// Returns an error if the configured base URL is not a valid origin.
pub fn app(auth: Arc<AuthService>, request_timeout: Duration) -> Result<Router> {
    let portal_origin = portal_origin(auth.config().base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::exact(portal_origin))
        .allow_credentials(true);

    // Build the router from OpenAPI-wired routes, then extend it with non-doc routes like
    // `/openapi.json` and preflight-only `OPTIONS /health`.
    let (router, openapi) = router().split_for_parts();
    let openapi = Arc::new(openapi);
    let app = router
        .route(
            "/openapi.json",
            get(move || {
                let openapi = Arc::clone(&openapi);
                async move { Json(openapi.as_ref().clone()) }
            }),
        )
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(TimeoutLayer::new(request_timeout))
                .layer(cors)
                .layer(Extension(auth)),
        );

    Ok(app)
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn portal_origin(base_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(base_url).with_context(|| format!("Invalid portal base URL: {base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Portal base URL must include a valid host: {base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build portal origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn portal_origin_drops_path_and_keeps_port() {
        let origin = portal_origin("https://portal.test:8443/apps/auth/").unwrap();
        assert_eq!(origin.to_str().unwrap(), "https://portal.test:8443");
    }

    #[test]
    fn portal_origin_rejects_garbage() {
        assert!(portal_origin("not a url").is_err());
    }
}
