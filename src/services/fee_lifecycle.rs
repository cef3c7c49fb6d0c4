//! Fee-rate lifecycle state machine
//!
//! Tracks elapsed time since launch and derives the mandated transfer-fee
//! rate. Transitions are strictly forward: Unlaunched -> HighRate ->
//! MidRate -> FinalRate, with update authority revoked exactly once at the
//! final breakpoint. Methods take `now` so tests run without a clock.

use tracing::{info, warn};

use crate::config::FeeScheduleConfig;
use crate::core::types::{FeeSchedule, FeeTransition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unlaunched,
    HighRate,
    MidRate,
    FinalRate,
}

pub struct FeeLifecycleManager {
    config: FeeScheduleConfig,
    launch_timestamp: Option<i64>,
    phase: Phase,
}

impl FeeLifecycleManager {
    pub fn new(config: FeeScheduleConfig) -> Self {
        Self {
            config,
            launch_timestamp: None,
            phase: Phase::Unlaunched,
        }
    }

    /// Record the launch timestamp. First write wins; a repeat call logs
    /// and no-ops.
    pub fn set_launch(&mut self, timestamp: i64) {
        if self.launch_timestamp.is_some() {
            warn!("Launch timestamp already set, ignoring new value");
            return;
        }
        self.launch_timestamp = Some(timestamp);
        self.phase = Phase::HighRate;
        info!("Launch timestamp set: {}", timestamp);
    }

    /// The mandated rate at `now`. Defaults to the maximum rate before
    /// launch (fail-safe-high).
    pub fn current_rate(&self, now: i64) -> u16 {
        let Some(launch) = self.launch_timestamp else {
            return self.config.initial_rate_bps;
        };
        let elapsed = now - launch;
        if elapsed >= self.config.final_transition_secs {
            self.config.final_rate_bps
        } else if elapsed >= self.config.mid_transition_secs {
            self.config.mid_rate_bps
        } else {
            self.config.initial_rate_bps
        }
    }

    pub fn finalized(&self) -> bool {
        self.phase == Phase::FinalRate
    }

    /// Whether a breakpoint has been crossed since the last issued
    /// transition. Issuing the final transition also revokes update
    /// authority and permanently finalizes the schedule; the revocation
    /// flag is produced exactly once.
    pub fn check_and_transition(&mut self, now: i64) -> Option<FeeTransition> {
        let launch = self.launch_timestamp?;
        if self.phase == Phase::FinalRate {
            return None;
        }
        let elapsed = now - launch;

        if elapsed >= self.config.final_transition_secs {
            self.phase = Phase::FinalRate;
            info!(
                "Final fee breakpoint crossed: {} bps, revoking update authority",
                self.config.final_rate_bps
            );
            return Some(FeeTransition {
                rate_bps: self.config.final_rate_bps,
                revoke_authority: true,
            });
        }

        if elapsed >= self.config.mid_transition_secs && self.phase == Phase::HighRate {
            self.phase = Phase::MidRate;
            info!("Mid fee breakpoint crossed: {} bps", self.config.mid_rate_bps);
            return Some(FeeTransition {
                rate_bps: self.config.mid_rate_bps,
                revoke_authority: false,
            });
        }

        None
    }

    pub fn schedule(&self, now: i64) -> FeeSchedule {
        FeeSchedule {
            launch_timestamp: self.launch_timestamp,
            current_rate_bps: self.current_rate(now),
            finalized: self.finalized(),
        }
    }
}
