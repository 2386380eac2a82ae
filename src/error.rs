use crate::{RoadSegmentId, VehicleId};
use thiserror::Error;

/// An error that stops the simulation from advancing.
#[derive(Debug, Error)]
pub enum SimError {
    /// Two vehicles overlap and the crash policy is [CrashPolicy::Terminate](crate::CrashPolicy::Terminate).
    #[error("{0}")]
    Crash(Box<CrashReport>),

    #[error("invalid time step dt={0}")]
    InvalidTimeStep(f64),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type SimResult<T> = Result<T, SimError>;

/// The vehicles involved in a crash and where it happened.
#[derive(Clone, Debug, PartialEq)]
pub struct CrashReport {
    pub segment: RoadSegmentId,
    pub user_id: String,
    pub lane: usize,
    pub follower: VehicleId,
    pub follower_position: f64,
    pub leader: VehicleId,
    pub leader_position: f64,
    pub net_distance: f64,
    pub time: f64,
    pub iteration: u64,
}

impl std::fmt::Display for CrashReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "crash of vehicle {} at x={:.4} with vehicle {} in front at x={:.4} on road {} lane {} \
             (net distance {:.4}, t={:.2}, iteration {})",
            self.follower,
            self.follower_position,
            self.leader,
            self.leader_position,
            self.user_id,
            self.lane,
            self.net_distance,
            self.time,
            self.iteration
        )
    }
}
