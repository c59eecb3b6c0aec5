use crate::{
    api::{
        email::{spawn_dispatch_worker, EmailSender, MailWorkerConfig},
        handlers::{
            auth::{self, AuthBackends, AuthState, Passwords, PgCredentialStore, PgSessionStore},
            health, root,
        },
    },
    cli::globals::GlobalArgs,
    ephemeral,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, options},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Backing services for [`new`].
pub struct Backends {
    pub dsn: String,
    pub redis_url: Option<String>,
    pub mail_sender: Arc<dyn EmailSender>,
    pub mail_config: MailWorkerConfig,
}

/// Build the full application: documented routes, docs UI and HTTP layers.
///
/// # Errors
/// Returns an error if the configured frontend URL cannot be turned into a CORS origin
/// or the route wiring is rejected.
pub fn router(auth_state: Arc<AuthState>) -> Result<Router> {
    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Routes outside the OpenAPI router (`/`, preflight `OPTIONS /health`) stay undocumented.
    let (router, openapi) = openapi::api_parts(Some(&auth_state))?;
    let app = router
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi))
        .route("/", get(root::root))
        .route("/health", options(health::health))
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
                .layer(cors)
                .layer(Extension(auth_state)),
        );

    Ok(app)
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    globals: &GlobalArgs,
    auth_config: auth::AuthConfig,
    backends: Backends,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&backends.dsn)
        .await
        .context("Failed to connect to database")?;

    let ephemeral = ephemeral::connect(backends.redis_url.as_deref()).await?;

    // Background worker drains the in-process mail queue and retries failed sends with
    // exponential backoff.
    let (mailer, _worker) = spawn_dispatch_worker(backends.mail_sender, backends.mail_config);

    let auth_state = Arc::new(AuthState::new(
        auth_config,
        globals,
        Passwords::with_defaults()?,
        AuthBackends {
            credentials: Arc::new(PgCredentialStore::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool)),
            ephemeral,
            mailer,
        },
    )?);

    let app = router(auth_state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
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

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
