use super::handlers::{
    auth::{
        self,
        admin::{SESSIONS_READ, USERS_DELETE},
        middleware::{authenticate, require_permission},
        AuthState, Gate, PermissionGate, ADMIN_ROLE,
    },
    health,
};
use anyhow::Result;
use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Components, Contact, InfoBuilder, License, OpenApi, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

/// The `OpenAPI` document for every served route.
///
/// # Errors
/// Returns an error if the route wiring is rejected.
pub fn openapi() -> Result<OpenApi> {
    // Same route wiring, without access gates; only the document is kept.
    let (_router, openapi) = api_parts(None)?;
    Ok(openapi)
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec. With `gates` set, protected
/// routes get their access middleware attached as route layers.
fn api_router(gates: Option<&Arc<AuthState>>) -> Result<OpenApiRouter> {
    let public = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::refresh::refresh))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::register::request_otp))
        .routes(routes!(auth::register::verify));

    let mut identity = OpenApiRouter::new()
        .routes(routes!(auth::session::me))
        .routes(routes!(auth::session::list_sessions))
        .routes(routes!(auth::session::revoke_session));

    let mut session_admin =
        OpenApiRouter::new().routes(routes!(auth::admin::list_user_sessions));
    let mut user_admin = OpenApiRouter::new().routes(routes!(auth::admin::delete_user));

    if let Some(state) = gates {
        identity = identity.route_layer(from_fn_with_state(
            Gate::identity(state.clone()),
            authenticate,
        ));
        session_admin = session_admin.route_layer(from_fn_with_state(
            PermissionGate::new(state.clone(), &[SESSIONS_READ]),
            require_permission,
        ));
        user_admin = user_admin.route_layer(from_fn_with_state(
            PermissionGate::new(state.clone(), &[USERS_DELETE]),
            require_permission,
        ));
    }

    // Permission checks sit inside the role gate, so they see the principal.
    let mut admin = session_admin.merge(user_admin);
    if let Some(state) = gates {
        admin = admin.route_layer(from_fn_with_state(
            Gate::role(state.clone(), ADMIN_ROLE)?,
            authenticate,
        ));
    }

    Ok(public.merge(identity).merge(admin))
}

/// Split the documented routes into the served router and the finished `OpenAPI`
/// document, with tags and the bearer scheme attached.
pub(crate) fn api_parts(gates: Option<&Arc<AuthState>>) -> Result<(Router, OpenApi)> {
    let (router, mut openapi) = api_router(gates)?.split_for_parts();
    describe(&mut openapi);
    Ok((router, openapi))
}

fn describe(openapi: &mut OpenApi) {
    let mut lexicard_tag = Tag::new("lexicard");
    lexicard_tag.description = Some("Credential and session lifecycle API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, token refresh and identity".to_string());

    let mut registration_tag = Tag::new("registration");
    registration_tag.description = Some("Email OTP sign-up".to_string());

    let mut sessions_tag = Tag::new("sessions");
    sessions_tag.description = Some("The caller's own sessions".to_string());

    let mut admin_tag = Tag::new("admin");
    admin_tag.description = Some("User and session administration".to_string());

    openapi.tags = Some(vec![
        lexicard_tag,
        auth_tag,
        registration_tag,
        sessions_tag,
        admin_tag,
    ]);
    openapi
        .components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
}

fn cargo_openapi() -> OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}
