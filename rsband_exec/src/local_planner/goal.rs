//! Goal evaluation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::ang_diff;

use super::params::LocalPlannerParams;
use crate::loc::Pose;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Determine whether the robot has reached the goal.
///
/// The robot must be strictly within both tolerances of `params`. If the goal has no heading only
/// the position is checked, while a robot with no heading never satisfies a goal that has one.
///
/// An unset goal heading is not read as a yaw of zero, so a robot at the goal position facing any
/// direction has reached it.
pub fn goal_reached(robot: &Pose, goal: &Pose, params: &LocalPlannerParams) -> bool {
    if robot.distance_to(goal) >= params.xy_goal_tolerance_m {
        return false;
    }

    match (robot.heading_rad, goal.heading_rad) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(r), Some(g)) => ang_diff(r, g).abs() < params.yaw_goal_tolerance_rad,
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use nalgebra::Vector2;
    use std::f64::consts::PI;

    use super::*;
    use crate::local_planner::params::{DegenerateHeadingPolicy, StrategyMode};

    fn params() -> LocalPlannerParams {
        LocalPlannerParams {
            window_bound_m: 3.0,
            xy_goal_tolerance_m: 0.5,
            yaw_goal_tolerance_rad: 0.25,
            strategy: StrategyMode::StartToEnd,
            max_connect_attempts: 8,
            degenerate_heading: DegenerateHeadingPolicy::UnsetOrZero,
        }
    }

    fn pose(x: f64, heading: Option<f64>) -> Pose {
        let mut p = Pose::new_unoriented(Vector2::new(x, 0.0), "map", Utc::now());
        p.heading_rad = heading;
        p
    }

    #[test]
    fn test_goal_reached() {
        let goal = pose(10.0, Some(0.0));

        assert!(goal_reached(&pose(9.8, Some(0.1)), &goal, &params()));
        assert!(!goal_reached(&pose(9.0, Some(0.0)), &goal, &params()));
        assert!(!goal_reached(&pose(9.8, Some(0.3)), &goal, &params()));

        // Headings either side of the wrap
        let goal = pose(10.0, Some(PI - 0.05));
        assert!(goal_reached(&pose(10.0, Some(-PI + 0.05)), &goal, &params()));
    }

    #[test]
    fn test_goal_boundaries() {
        // Equality on either tolerance is not reached
        let goal = pose(10.0, Some(0.0));
        assert!(!goal_reached(&pose(9.5, Some(0.0)), &goal, &params()));
        assert!(!goal_reached(&pose(10.0, Some(0.25)), &goal, &params()));
    }

    #[test]
    fn test_unset_headings() {
        assert!(goal_reached(&pose(10.0, Some(2.0)), &pose(10.0, None), &params()));
        assert!(!goal_reached(&pose(10.0, None), &pose(10.0, Some(0.0)), &params()));
    }
}
