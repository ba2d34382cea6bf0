use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all Notary endpoints.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config().verify.max_upload_bytes;

    // Verification is public and called from browsers.
    let public = Router::new()
        .route(
            "/verify",
            get(handler::verify_fingerprint_handler).post(handler::verify_upload_handler),
        )
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/registration-status", get(handler::registration_status_handler))
        .route("/registrations", post(handler::submit_registration_handler))
        .route("/registrations/:id/retry", post(handler::retry_registration_handler))
        .route("/registrations/:id/certificate", get(handler::certificate_handler))
        .route("/credits/balance", get(handler::balance_handler))
        .route("/credits/reconcile", post(handler::reconcile_handler))
        .route("/credits/grant", post(handler::grant_handler))
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
