//! # Local planner
//!
//! The local planner runs once per control cycle, turning the global plan and the obstacle
//! avoiding band into a drivable local plan and a velocity command.
//!
//! Each cycle:
//!  1. Checks whether the goal has been reached, in which case a stop command is produced.
//!  1. Synchronises the band with the robot's progress along the global plan.
//!  1. Interpolates the orientations of the band.
//!  1. Converts the band into a drivable path using the configured [`StrategyMode`].
//!  1. Stitches the band poses the conversion could not reach onto the end of that path.
//!  1. Asks the tracking controller for a command along the result.
//!
//! Any failure only affects the current cycle, no command is produced and the next cycle starts
//! afresh.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod conversion;
mod goal;
mod orientation;
mod params;
mod state;
mod stitch;
mod window;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use conversion::*;
pub use goal::*;
pub use orientation::*;
pub use params::*;
pub use state::*;
pub use stitch::*;
pub use window::*;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::{band::BandError, loc::TransformError, traj_ctrl::TrackingError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors returned by the local planner.
///
/// None of these are fatal to the planner, callers should treat an error as "no command this
/// cycle".
#[derive(Debug, thiserror::Error)]
pub enum LocalPlannerError {
    #[error("The local planner has not been initialised")]
    NotInitialised,

    #[error("No global plan has been accepted")]
    NoPlan,

    #[error("The last global plan was rejected, a new plan is required")]
    PlanRejected,

    #[error("Transform error: {0}")]
    TransformError(TransformError),

    #[error("The band could not be initialised from the global plan, even after clearing obstacles: {0}")]
    BandInitFailed(BandError),

    #[error("Band error: {0}")]
    BandError(BandError),

    #[error("Could not synchronise the band with the global plan: {0}")]
    SyncError(SyncError),

    #[error("Could not convert the band: {0}")]
    PlannerError(PlannerError),

    #[error("{0:?} conversion could not connect any band poses")]
    ConversionFailed(StrategyMode),

    #[error("Could not stitch the local plan: {0}")]
    StitchError(StitchError),

    #[error("Tracking controller failed: {0}")]
    TrackingError(TrackingError),

    #[error("Configuration error: {0}")]
    ConfigError(ConfigError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl From<TransformError> for LocalPlannerError {
    fn from(e: TransformError) -> Self {
        LocalPlannerError::TransformError(e)
    }
}

impl From<BandError> for LocalPlannerError {
    fn from(e: BandError) -> Self {
        LocalPlannerError::BandError(e)
    }
}

impl From<SyncError> for LocalPlannerError {
    fn from(e: SyncError) -> Self {
        LocalPlannerError::SyncError(e)
    }
}

impl From<PlannerError> for LocalPlannerError {
    fn from(e: PlannerError) -> Self {
        LocalPlannerError::PlannerError(e)
    }
}

impl From<StitchError> for LocalPlannerError {
    fn from(e: StitchError) -> Self {
        LocalPlannerError::StitchError(e)
    }
}

impl From<TrackingError> for LocalPlannerError {
    fn from(e: TrackingError) -> Self {
        LocalPlannerError::TrackingError(e)
    }
}

impl From<ConfigError> for LocalPlannerError {
    fn from(e: ConfigError) -> Self {
        LocalPlannerError::ConfigError(e)
    }
}
