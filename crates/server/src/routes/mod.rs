use axum::{Router, middleware::from_fn_with_state};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{AppState, middleware::rate_limit::rate_limit};

pub mod applications;
pub mod approvals;
pub mod candidates;
pub mod emails;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod scorecards;

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health::router(&state))
        .merge(jobs::router(&state))
        .merge(applications::router(&state))
        .merge(scorecards::router(&state))
        .merge(approvals::router(&state))
        .merge(candidates::router(&state))
        .merge(emails::router(&state))
        .merge(notifications::router(&state));

    Router::new()
        .nest("/api", api_routes)
        .layer(from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
