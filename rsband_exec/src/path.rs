//! # Path
//!
//! This module defines the path type shared by the global plan, the band and the local plans
//! produced by the local planner.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::ops::Index;

// External
use serde::{Deserialize, Serialize};

use crate::loc::Pose;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An ordered sequence of poses, in travel order.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Path {
    pub poses: Vec<Pose>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Point separation must be positive, got {0}")]
    InvalidSeparation(f64),

    #[error("Cannot join poses in frame \"{0}\" to poses in frame \"{1}\"")]
    FrameMismatch(String, String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Path {
    /// Create a new empty path
    pub fn new_empty() -> Self {
        Path { poses: Vec::new() }
    }

    /// Produces a direct path between the two poses, with each pose in the path having at most
    /// the given separation from the previous one.
    ///
    /// Both `from` and `to` are included unchanged. Interior poses take the heading of the
    /// straight line and the stamp of `from`.
    pub fn direct(from: &Pose, to: &Pose, point_sep_m: f64) -> Result<Self, PathError> {
        if !(point_sep_m > 0.0) {
            return Err(PathError::InvalidSeparation(point_sep_m));
        }
        if from.frame_id != to.frame_id {
            return Err(PathError::FrameMismatch(
                from.frame_id.clone(),
                to.frame_id.clone(),
            ));
        }

        let diff_vec = to.position_m - from.position_m;
        let dist = diff_vec.norm();

        // Number of segments needed so that none is longer than the separation. A small
        // tolerance stops exact multiples of the separation gaining an extra segment through
        // rounding.
        let num_segments = ((dist / point_sep_m) - 1e-9).ceil().max(1.0) as usize;
        let heading_rad = from.heading_to(to);

        let mut path = Self {
            poses: Vec::with_capacity(num_segments + 1),
        };
        path.push(from.clone());

        for i in 1..num_segments {
            let mut pose = from.clone();
            pose.position_m = from.position_m + diff_vec * (i as f64 / num_segments as f64);
            pose.heading_rad = Some(heading_rad);
            path.push(pose);
        }

        path.push(to.clone());

        Ok(path)
    }

    /// Append another path onto the end of this one.
    ///
    /// If the first pose of `segment` sits at the same position as the current last pose it is
    /// the joint between the two and is not duplicated.
    pub fn append_segment(&mut self, segment: Path) {
        let mut poses = segment.poses.into_iter().peekable();

        if let (Some(last), Some(first)) = (self.poses.last(), poses.peek()) {
            if last.distance_to(first) <= std::f64::EPSILON {
                poses.next();
            }
        }

        self.poses.extend(poses);
    }

    /// Return the length of the path in meters.
    ///
    /// If the path is empty (not enough points) then `None` is returned.
    pub fn get_length(&self) -> Option<f64> {
        if self.poses.len() < 2 {
            return None;
        }

        Some(
            self.poses
                .windows(2)
                .map(|p| p[0].distance_to(&p[1]))
                .sum(),
        )
    }

    /// Get the number of points in the path
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn front(&self) -> Option<&Pose> {
        self.poses.first()
    }

    pub fn back(&self) -> Option<&Pose> {
        self.poses.last()
    }

    pub fn get(&self, index: usize) -> Option<&Pose> {
        self.poses.get(index)
    }

    pub fn push(&mut self, pose: Pose) {
        self.poses.push(pose)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pose> {
        self.poses.iter()
    }
}

impl Index<usize> for Path {
    type Output = Pose;

    fn index(&self, index: usize) -> &Pose {
        &self.poses[index]
    }
}

impl From<Vec<Pose>> for Path {
    fn from(poses: Vec<Pose>) -> Self {
        Self { poses }
    }
}

impl std::iter::FromIterator<Pose> for Path {
    fn from_iter<I: IntoIterator<Item = Pose>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Path {
    type Item = Pose;
    type IntoIter = std::vec::IntoIter<Pose>;

    fn into_iter(self) -> Self::IntoIter {
        self.poses.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Pose;
    type IntoIter = std::slice::Iter<'a, Pose>;

    fn into_iter(self) -> Self::IntoIter {
        self.poses.iter()
    }
}
