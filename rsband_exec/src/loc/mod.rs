//! # Localisation module
//!
//! This module provides the stamped, framed poses used throughout the local planner and the
//! [`PoseTransformGateway`] interface through which the planner learns where the robot is and
//! moves poses between coordinate frames.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::{local_planner::WindowCounters, path::Path};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A planar pose (position and heading) expressed in a named frame at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// The position in `frame_id`
    pub position_m: Vector2<f64>,

    /// The heading (angle to the frame's positive X axis) in radians.
    ///
    /// `None` means the orientation is unset, i.e. the zero rotation a pose message carries when
    /// nobody filled it in.
    pub heading_rad: Option<f64>,

    /// Name of the frame the pose is expressed in
    pub frame_id: String,

    /// Time the pose refers to
    pub stamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while looking up the robot pose or transforming between frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("The robot pose is not available")]
    RobotPoseUnavailable,

    #[error("No transform is known from frame \"{from}\" to frame \"{to}\"")]
    NoTransform { from: String, to: String },

    #[error("Cannot transform an empty path")]
    EmptyPath,

    #[error("Window [{start}, {end}) is not valid for a path of {len} poses")]
    InvalidWindow { start: usize, end: usize, len: usize },
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Pose and frame lookups required by the local planner.
pub trait PoseTransformGateway {
    /// The local (planning) frame, in which the band and all local paths are expressed.
    fn local_frame(&self) -> &str;

    /// Get the current pose of the robot.
    fn current_pose(&self) -> Result<Pose, TransformError>;

    /// Express `pose` in `target_frame`, keeping its stamp.
    fn transform_pose(&self, pose: &Pose, target_frame: &str) -> Result<Pose, TransformError>;

    /// Transform the part of `path` that lies within `window_bound_m` of the robot into
    /// `target_frame`.
    ///
    /// Poses further than the bound from the robot are skipped until the first pose inside it,
    /// after which the contiguous run of poses inside the bound makes up the window. The returned
    /// counters give the window as a half-open index range into `path`. If no pose lies within
    /// the bound an empty path is returned with counters `[len, len)`.
    fn transform_path(
        &self,
        path: &Path,
        target_frame: &str,
        window_bound_m: f64,
    ) -> Result<(Path, WindowCounters), TransformError> {
        if path.is_empty() {
            return Err(TransformError::EmptyPath);
        }

        let robot = self.transform_pose(&self.current_pose()?, target_frame)?;
        let len = path.len();

        let mut window = Path::new_empty();
        let mut start = None;
        let mut end = len;

        for (i, pose) in path.iter().enumerate() {
            let local = self.transform_pose(pose, target_frame)?;
            let in_bound = local.distance_to(&robot) < window_bound_m;

            match (start, in_bound) {
                (None, false) => continue,
                (None, true) => {
                    start = Some(i);
                    window.push(local);
                }
                (Some(_), true) => window.push(local),
                (Some(_), false) => {
                    end = i;
                    break;
                }
            }
        }

        let (start, end) = match start {
            Some(s) => (s, end),
            None => (len, len),
        };

        let counters = WindowCounters::new(start, end, len)
            .ok_or(TransformError::InvalidWindow { start, end, len })?;

        Ok((window, counters))
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    /// Create a new pose with a known heading.
    pub fn new(position_m: Vector2<f64>, heading_rad: f64, frame_id: &str, stamp: DateTime<Utc>) -> Self {
        Self {
            position_m,
            heading_rad: Some(heading_rad),
            frame_id: frame_id.into(),
            stamp,
        }
    }

    /// Create a new pose whose orientation has not been set.
    pub fn new_unoriented(position_m: Vector2<f64>, frame_id: &str, stamp: DateTime<Utc>) -> Self {
        Self {
            position_m,
            heading_rad: None,
            frame_id: frame_id.into(),
            stamp,
        }
    }

    /// Euclidean distance between the positions of the two poses.
    ///
    /// Frames are not checked, both poses must be in the same frame for the result to be
    /// meaningful.
    pub fn distance_to(&self, other: &Pose) -> f64 {
        (other.position_m - self.position_m).norm()
    }

    /// Heading of the vector from this pose to `other`.
    pub fn heading_to(&self, other: &Pose) -> f64 {
        let diff = other.position_m - self.position_m;
        diff[1].atan2(diff[0])
    }
}
