//! JSON response shapes for the operator API

use serde::Serialize;

use crate::core::types::{CycleOutcome, CycleReport};

#[derive(Debug, Serialize)]
pub struct CycleResponse {
    pub outcome: String,
    pub harvested: u64,
    pub swapped_out: u64,
    pub distributed: u64,
    pub recipients: usize,
    pub undistributed: u64,
    pub duration_secs: i64,
}

impl From<CycleReport> for CycleResponse {
    fn from(report: CycleReport) -> Self {
        let outcome = match &report.outcome {
            CycleOutcome::Completed => "completed".to_string(),
            CycleOutcome::Skipped(reason) => format!("skipped: {}", reason),
            CycleOutcome::Aborted(reason) => format!("aborted: {}", reason),
        };
        Self {
            outcome,
            harvested: report.harvested,
            swapped_out: report.swapped_out,
            distributed: report.distributed,
            recipients: report.recipients,
            undistributed: report.undistributed,
            duration_secs: report.finished_at - report.started_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExclusionsResponse {
    pub count: usize,
    pub addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RewardCheckResponse {
    pub updated: bool,
    pub reward_mint: String,
}

#[derive(Debug, Serialize)]
pub struct HolderRefreshResponse {
    pub eligible_holders: usize,
}

#[derive(Debug, Serialize)]
pub struct DistributionRunResponse {
    pub distributed: u64,
    pub recipients: usize,
    pub undistributed: u64,
}

#[derive(Debug, Serialize)]
pub struct WithdrawResponse {
    pub signature: String,
    pub amount: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
