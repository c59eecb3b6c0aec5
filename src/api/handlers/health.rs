use crate::{api::handlers::auth::AuthState, GIT_COMMIT_HASH};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    ephemeral: String,
}

fn status_label(healthy: bool) -> String {
    let label = if healthy { "ok" } else { "error" };
    label.to_string()
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database and ephemeral store are healthy", body = [Health]),
        (status = 503, description = "Database or ephemeral store is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(method: Method, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let limit = auth_state.config().store_timeout();

    let database = match timeout(limit, auth_state.credentials().ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!("Failed to ping database: {err:#}");
            false
        }
        Err(_) => {
            error!("Database ping timed out after {limit:?}");
            false
        }
    };

    let ephemeral = match timeout(limit, auth_state.ephemeral().ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!(
                "Failed to ping {} ephemeral store: {err:#}",
                auth_state.ephemeral().backend()
            );
            false
        }
        Err(_) => {
            error!("Ephemeral store ping timed out after {limit:?}");
            false
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_label(database),
        ephemeral: status_label(ephemeral),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    if database && ephemeral {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
