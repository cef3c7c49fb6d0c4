//! Operator API route definitions

use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers::*, ApiState};

pub fn create_status_routes() -> Router<ApiState> {
    Router::new().route("/status", get(get_status))
}

pub fn create_trigger_routes() -> Router<ApiState> {
    Router::new()
        .route("/cycle", post(run_cycle))
        .route("/rewards/check", post(check_rewards))
        .route("/distribution/run", post(run_distribution))
        .route("/holders/refresh", post(refresh_holders))
}

pub fn create_admin_routes() -> Router<ApiState> {
    Router::new()
        .route("/exclusions", get(list_exclusions))
        .route(
            "/exclusions/:address",
            post(add_exclusion).delete(remove_exclusion),
        )
        .route("/emergency-withdraw", post(emergency_withdraw))
}
