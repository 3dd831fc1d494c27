use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    auth::{authenticate, require_role},
    handlers::{auth, users},
    models::user::Role,
    uploads::DocumentKind,
    AppState,
};

/// Room for every document at the size limit plus the text fields.
fn body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_mul(DocumentKind::ALL.len())
        .saturating_add(64 * 1024)
}

pub fn router(state: AppState) -> Router {
    let limit = body_limit(state.uploads.max_bytes());

    let authenticated = Router::new()
        .route("/api/auth/profile", get(auth::profile))
        .route("/api/users/update/:npm", put(users::update_user))
        .route("/api/users/delete/:npm", delete(users::delete_user))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let admin = Router::new()
        .route("/api/users/:npm", get(users::get_user))
        .route_layer(from_fn_with_state(Role::Admin, require_role))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/users", get(users::list_users))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .merge(authenticated)
        .merge(admin)
        .nest_service("/api/uploads", ServeDir::new(state.uploads.dir()))
        .layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
