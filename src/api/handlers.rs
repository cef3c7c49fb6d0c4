//! Operator API handlers
//!
//! Manual triggers wrap the same service entry points the scheduler drives;
//! nothing here carries its own business logic.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;

use super::responses::*;
use super::ApiState;

fn error_response(status: StatusCode, message: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// GET /status
pub async fn get_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.status().await {
        Ok(status) => Json(status).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err),
    }
}

/// POST /cycle: run one harvest cycle now
pub async fn run_cycle(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.orchestrator.run_cycle().await;
    Json(CycleResponse::from(report)).into_response()
}

/// POST /rewards/check: force a reward-asset selection pass
pub async fn check_rewards(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.selector().check_and_select(chrono::Utc::now().timestamp()).await {
        Ok(updated) => Json(RewardCheckResponse {
            updated: updated.is_some(),
            reward_mint: state.orchestrator.selector().current_reward_mint().to_string(),
        })
        .into_response(),
        Err(err) => error_response(StatusCode::BAD_GATEWAY, err),
    }
}

/// POST /distribution/run: distribute the carried balance now
pub async fn run_distribution(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.run_distribution().await {
        Ok(result) => Json(DistributionRunResponse {
            distributed: result.distributed,
            recipients: result.recipients,
            undistributed: result.undistributed_amount,
        })
        .into_response(),
        Err(err) => error_response(StatusCode::CONFLICT, err),
    }
}

/// POST /holders/refresh: re-query the holder registry
pub async fn refresh_holders(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.refresh_holders().await {
        Ok(count) => Json(HolderRefreshResponse {
            eligible_holders: count,
        })
        .into_response(),
        Err(err) => error_response(StatusCode::BAD_GATEWAY, err),
    }
}

/// GET /exclusions
pub async fn list_exclusions(State(state): State<ApiState>) -> impl IntoResponse {
    let addresses: Vec<String> = state
        .orchestrator
        .distribution()
        .exclusions()
        .iter()
        .map(|a| a.to_string())
        .collect();
    Json(ExclusionsResponse {
        count: addresses.len(),
        addresses,
    })
}

/// POST /exclusions/:address
pub async fn add_exclusion(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    match Pubkey::from_str(&address) {
        Ok(pubkey) => {
            state.orchestrator.distribution().add_exclusion(pubkey);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(_) => error_response(StatusCode::BAD_REQUEST, "invalid address"),
    }
}

/// DELETE /exclusions/:address
pub async fn remove_exclusion(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    match Pubkey::from_str(&address) {
        Ok(pubkey) => {
            if state.orchestrator.distribution().remove_exclusion(pubkey) {
                StatusCode::NO_CONTENT.into_response()
            } else {
                error_response(StatusCode::NOT_FOUND, "address not excluded")
            }
        }
        Err(_) => error_response(StatusCode::BAD_REQUEST, "invalid address"),
    }
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub destination: String,
}

/// POST /emergency-withdraw: manual override, zeroes the undistributed
/// balance and transfers it out
pub async fn emergency_withdraw(
    State(state): State<ApiState>,
    Json(request): Json<WithdrawRequest>,
) -> impl IntoResponse {
    let destination = match Pubkey::from_str(&request.destination) {
        Ok(pubkey) => pubkey,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "invalid destination"),
    };

    let amount = state.orchestrator.distribution().undistributed().amount;
    match state
        .orchestrator
        .distribution()
        .emergency_withdraw(destination)
        .await
    {
        Ok(receipt) => Json(WithdrawResponse {
            signature: receipt.signature,
            amount,
        })
        .into_response(),
        Err(err) => error_response(StatusCode::CONFLICT, err),
    }
}
