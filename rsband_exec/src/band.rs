//! # Deformable band interface
//!
//! The band is the obstacle-avoiding local path held by an external elastic-band optimiser. The
//! local planner seeds it from the global plan, keeps it attached to the robot and extends it as
//! the plan window advances, but never looks inside the optimisation itself.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::path::Path;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Which end of the band frames are added to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BandEnd {
    /// The robot end of the band.
    Front,

    /// The goal end of the band.
    Back,
}

/// Errors reported by a band implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BandError {
    #[error("The band could not be initialised from the given path")]
    InitFailed,

    #[error("Frames could not be connected to the {0:?} of the band")]
    CannotConnect(BandEnd),

    #[error("Band optimisation failed")]
    OptimisationFailed,

    #[error("The band holds no path")]
    Empty,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Operations the local planner needs from the band optimiser.
pub trait DeformableBand {
    /// Discard the current band and initialise a new one from `path`.
    fn reset(&mut self, path: &Path) -> Result<(), BandError>;

    /// Add frames to one end of the band.
    ///
    /// Adding to the front splices the frames onto the robot end and fails if they are too far
    /// from the existing band to connect.
    fn append_frames(&mut self, path: &Path, end: BandEnd) -> Result<(), BandError>;

    /// Run one optimisation pass over the band.
    fn optimize(&mut self) -> Result<(), BandError>;

    /// Get the current band as a path.
    fn path(&self) -> Result<Path, BandError>;

    /// Clear the obstacle layers the band is optimised against.
    ///
    /// Used when seeding the band fails, as stale obstacles are the usual cause.
    fn clear_obstacle_layers(&mut self);
}
