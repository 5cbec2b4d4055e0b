//! Orientation interpolation for band paths

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::params::DegenerateHeadingPolicy;
use crate::path::Path;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Overwrite the headings of the interior poses of `path` so that each points at the next pose.
///
/// Interior poses and the final pose take the stamp of the first pose. If the final heading is
/// considered undefined under `policy` it is copied from the pose before it. The first pose is
/// left untouched, as are paths of fewer than two poses.
pub fn interpolate_orientations(path: &mut Path, policy: DegenerateHeadingPolicy) {
    let n = path.len();
    if n < 2 {
        return;
    }

    let stamp = path.poses[0].stamp;

    for i in 1..n - 1 {
        let heading = path.poses[i].heading_to(&path.poses[i + 1]);
        let pose = &mut path.poses[i];
        pose.heading_rad = Some(heading);
        pose.stamp = stamp;
    }

    let prev_heading = path.poses[n - 2].heading_rad;
    let last = &mut path.poses[n - 1];
    last.stamp = stamp;

    let degenerate = match (last.heading_rad, policy) {
        (None, _) => true,
        (Some(h), DegenerateHeadingPolicy::UnsetOrZero) => h == 0.0,
        (Some(_), DegenerateHeadingPolicy::UnsetOnly) => false,
    };

    if degenerate {
        last.heading_rad = prev_heading;
    }
}
