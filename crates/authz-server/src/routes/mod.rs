//! HTTP route tables: one module per callable-surface group (§6), plus the
//! `/healthz` supplement.

pub mod health;
pub mod pap;
pub mod pdp;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Assemble the full router over [`SharedState`]. Request tracing and CORS
/// are the one piece of generic HTTP middleware this crate carries — ambient
/// request logging, not the general-purpose routing layer §1 keeps out of
/// scope.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]);

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/evaluate", post(pdp::evaluate))
        .route("/v1/batch-evaluate", post(pdp::batch_evaluate))
        .route("/v1/subject-profile", post(pdp::subject_profile))
        .route("/v1/actions", get(pap::list_actions))
        .route("/v1/namespaces/{namespace}/roles", get(pap::list_roles))
        .route("/v1/namespaces/{namespace}/roles/{name}", post(pap::create_role).get(pap::get_role).put(pap::update_role))
        .route("/v1/cluster-roles", get(pap::list_cluster_roles))
        .route("/v1/cluster-roles/{name}", post(pap::create_cluster_role).get(pap::get_cluster_role).put(pap::update_cluster_role))
        .route("/v1/namespaces/{namespace}/role-bindings", get(pap::list_role_bindings))
        .route(
            "/v1/namespaces/{namespace}/role-bindings/{name}",
            post(pap::create_role_binding).get(pap::get_role_binding).put(pap::update_role_binding),
        )
        .route("/v1/cluster-role-bindings", get(pap::list_cluster_role_bindings))
        .route(
            "/v1/cluster-role-bindings/{name}",
            post(pap::create_cluster_role_binding).get(pap::get_cluster_role_binding).put(pap::update_cluster_role_binding),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
