//! # Trajectory control interface
//!
//! Trajectory control turns the merged local plan into a velocity command for the robot base. The
//! controller itself lives outside the local planner, which only needs the [`TrackingController`]
//! interface defined here.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::path::Path;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A planar velocity command for the robot base.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Forward speed in meters/second.
    pub linear_x_ms: f64,

    /// Lateral speed in meters/second, positive to the left.
    pub linear_y_ms: f64,

    /// Turn rate in radians/second, following the right hand rule about the robot's Z+ axis.
    pub angular_z_rads: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a tracking controller may refuse to produce a command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackingError {
    #[error("Cannot track an empty path")]
    EmptyPath,

    #[error("The controller declined the path: {0}")]
    Declined(String),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Produces velocity commands which keep the robot on a path.
pub trait TrackingController {
    /// Compute the command for this cycle from the merged local plan.
    fn compute_command(&mut self, path: &Path) -> Result<Velocity, TrackingError>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Velocity {
    /// The stop command.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}
