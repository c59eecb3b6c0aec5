use axum::response::IntoResponse;

/// Plain-text banner with the service name and version.
pub async fn root() -> impl IntoResponse {
    format!(
        "{} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        crate::GIT_COMMIT_HASH
    )
}
