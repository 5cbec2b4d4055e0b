//! # Band conversion strategies
//!
//! The band avoids obstacles but ignores the robot's turning constraints. This module turns it
//! into a drivable path by asking a [`NonholonomicPlanner`] to connect band poses, following one
//! of the [`StrategyMode`]s.
//!
//! Every strategy reports a fail index alongside the converted path. Zero means nothing could be
//! converted. Any other value is the band index the converted path ends at, and the band poses
//! after it are left for the stitcher to append.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace, warn};
use serde::Serialize;

use super::params::StrategyMode;
use crate::{loc::Pose, path::Path};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The result of converting a band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    /// The drivable path produced.
    pub path: Path,

    /// How far along the band the conversion succeeded, `0` for total failure.
    ///
    /// For [`StrategyMode::StartToEnd`] a success is reported as the band length, for all other
    /// strategies it is the index of the last band pose the path reaches.
    pub fail_index: usize,

    /// Number of calls made to the planner.
    pub attempts: usize,
}

/// Limits the number of planner calls made in one cycle.
struct AttemptBudget<'p, P> {
    planner: &'p mut P,
    remaining: usize,
    used: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors reported by a nonholonomic planner.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlannerError {
    #[error("No feasible path exists between the poses")]
    NoSolution,

    #[error("Planning did not finish in time")]
    Timeout,

    #[error("Pose in frame \"{0}\" cannot be planned from, expected frame \"{1}\"")]
    InvalidFrame(String, String),

    #[error("At least two band poses are needed for conversion, got {0}")]
    PathTooShort(usize),
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Plans kinematically feasible paths between two poses.
pub trait NonholonomicPlanner {
    /// Find a path from `start` to `end`.
    ///
    /// A returned path starts at `start` and ends at `end`.
    fn connect(&mut self, start: &Pose, end: &Pose) -> Result<Path, PlannerError>;
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert `band` into a drivable path using the given strategy, making at most `max_attempts`
/// planner calls.
///
/// Planner failures are absorbed into the fail index, an error is only returned if the band is
/// too short to convert.
pub fn convert_band<P>(
    planner: &mut P,
    band: &Path,
    mode: StrategyMode,
    max_attempts: usize,
) -> Result<ConversionResult, PlannerError>
where
    P: NonholonomicPlanner,
{
    if band.len() < 2 {
        return Err(PlannerError::PathTooShort(band.len()));
    }

    let mut budget = AttemptBudget {
        planner,
        remaining: max_attempts,
        used: 0,
    };

    let (path, fail_index) = match mode {
        StrategyMode::StartToEnd => start_to_end(&mut budget, band),
        StrategyMode::PointToPointUntilFailure => until_failure(&mut budget, band),
        StrategyMode::PointToPointSkipFailures => skip_failures(&mut budget, band),
        StrategyMode::RecedingEnd => receding_end(&mut budget, band),
    };

    debug!(
        "{:?} conversion of {} band poses: fail index {}, {} planner calls",
        mode,
        band.len(),
        fail_index,
        budget.used
    );

    Ok(ConversionResult {
        path,
        fail_index,
        attempts: budget.used,
    })
}

fn start_to_end<P: NonholonomicPlanner>(budget: &mut AttemptBudget<P>, band: &Path) -> (Path, usize) {
    let last = band.len() - 1;

    match budget.connect(band, 0, last) {
        Some(Ok(path)) => (path, band.len()),
        _ => (Path::new_empty(), 0),
    }
}

fn until_failure<P: NonholonomicPlanner>(budget: &mut AttemptBudget<P>, band: &Path) -> (Path, usize) {
    let mut path = Path::new_empty();
    let mut reached = 0;

    for target in 1..band.len() {
        match budget.connect(band, target - 1, target) {
            Some(Ok(segment)) => {
                path.append_segment(segment);
                reached = target;
            }
            _ => break,
        }
    }

    (path, reached)
}

fn skip_failures<P: NonholonomicPlanner>(budget: &mut AttemptBudget<P>, band: &Path) -> (Path, usize) {
    let mut path = Path::new_empty();
    let mut from = 0;

    for target in 1..band.len() {
        match budget.connect(band, from, target) {
            Some(Ok(segment)) => {
                path.append_segment(segment);
                from = target;
            }
            Some(Err(_)) => trace!("Skipping unreachable band pose {}", target),
            None => break,
        }
    }

    (path, from)
}

fn receding_end<P: NonholonomicPlanner>(budget: &mut AttemptBudget<P>, band: &Path) -> (Path, usize) {
    let mut target = band.len() - 1;

    while target > 0 {
        match budget.connect(band, 0, target) {
            Some(Ok(path)) => return (path, target),
            Some(Err(_)) => target -= 1,
            None => break,
        }
    }

    (Path::new_empty(), 0)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'p, P: NonholonomicPlanner> AttemptBudget<'p, P> {
    /// Connect two band poses, or return `None` if the budget is spent.
    fn connect(
        &mut self,
        band: &Path,
        from: usize,
        to: usize,
    ) -> Option<Result<Path, PlannerError>> {
        if self.remaining == 0 {
            warn!(
                "Planning attempt limit reached, stopping before connecting band poses {} and {}",
                from, to
            );
            return None;
        }

        self.remaining -= 1;
        self.used += 1;

        let result = self.planner.connect(&band[from], &band[to]);

        if let Err(ref e) = result {
            trace!("Band poses {} and {} not connected: {}", from, to, e);
        }

        Some(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{straight_plan, ScriptedPlanner};

    #[test]
    fn test_start_to_end() {
        let band = straight_plan(5, 1.0);

        let mut planner = ScriptedPlanner::new(1.0);
        let result = convert_band(&mut planner, &band, StrategyMode::StartToEnd, 10).unwrap();
        assert_eq!(result.fail_index, 5);
        assert_eq!(result.path.len(), 5);
        assert_eq!(result.attempts, 1);

        let mut planner = ScriptedPlanner::new(1.0).failing_between(&band[0], &band[4]);
        let result = convert_band(&mut planner, &band, StrategyMode::StartToEnd, 10).unwrap();
        assert_eq!(result.fail_index, 0);
        assert!(result.path.is_empty());
    }

    #[test]
    fn test_until_failure() {
        let band = straight_plan(5, 1.0);

        let mut planner = ScriptedPlanner::new(1.0).failing_between(&band[2], &band[3]);
        let result =
            convert_band(&mut planner, &band, StrategyMode::PointToPointUntilFailure, 10).unwrap();

        // Unbroken chain over [0, 2], and the walk stops at the failure
        assert_eq!(result.fail_index, 2);
        assert_eq!(result.path.len(), 3);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.path.back().unwrap().position_m, band[2].position_m);

        let mut planner = ScriptedPlanner::new(1.0);
        let result =
            convert_band(&mut planner, &band, StrategyMode::PointToPointUntilFailure, 10).unwrap();
        assert_eq!(result.fail_index, 4);
        assert_eq!(result.path.len(), 5);

        let mut planner = ScriptedPlanner::new(1.0).failing_between(&band[0], &band[1]);
        let result =
            convert_band(&mut planner, &band, StrategyMode::PointToPointUntilFailure, 10).unwrap();
        assert_eq!(result.fail_index, 0);
    }

    #[test]
    fn test_skip_failures() {
        let band = straight_plan(5, 1.0);

        // Pose 2 can't be reached from pose 1, so it is dropped and pose 3 is reached from 1
        let mut planner = ScriptedPlanner::new(1.0).failing_between(&band[1], &band[2]);
        let result =
            convert_band(&mut planner, &band, StrategyMode::PointToPointSkipFailures, 10).unwrap();

        assert_eq!(result.fail_index, 4);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.path.back().unwrap().position_m, band[4].position_m);
        assert_eq!(
            planner.calls().last().map(|(s, e)| (s.position_m, e.position_m)),
            Some((band[3].position_m, band[4].position_m))
        );

        // An unreachable final pose leaves the fail index at the last incorporated pose
        let mut planner = ScriptedPlanner::new(1.0).unreachable(&band[4]);
        let result =
            convert_band(&mut planner, &band, StrategyMode::PointToPointSkipFailures, 10).unwrap();
        assert_eq!(result.fail_index, 3);
    }

    #[test]
    fn test_receding_end() {
        let band = straight_plan(5, 1.0);

        let mut planner = ScriptedPlanner::new(1.0)
            .unreachable(&band[4])
            .unreachable(&band[3]);
        let result = convert_band(&mut planner, &band, StrategyMode::RecedingEnd, 10).unwrap();

        assert_eq!(result.fail_index, 2);
        assert_eq!(result.attempts, 3);

        // Targets recede one pose per attempt
        let targets: Vec<f64> = planner.calls().iter().map(|(_, e)| e.position_m[0]).collect();
        assert_eq!(targets, vec![4.0, 3.0, 2.0]);

        // Total failure after at most N - 1 attempts
        let mut planner = ScriptedPlanner::new(1.0).unreachable_all();
        let result = convert_band(&mut planner, &band, StrategyMode::RecedingEnd, 10).unwrap();
        assert_eq!(result.fail_index, 0);
        assert_eq!(result.attempts, 4);
    }

    #[test]
    fn test_attempt_budget() {
        let band = straight_plan(6, 1.0);

        let mut planner = ScriptedPlanner::new(1.0);
        let result =
            convert_band(&mut planner, &band, StrategyMode::PointToPointUntilFailure, 2).unwrap();
        assert_eq!(result.fail_index, 2);
        assert_eq!(result.attempts, 2);

        let mut planner = ScriptedPlanner::new(1.0).unreachable(&band[5]);
        let result = convert_band(&mut planner, &band, StrategyMode::RecedingEnd, 1).unwrap();
        assert_eq!(result.fail_index, 0);
        assert_eq!(planner.calls().len(), 1);
    }

    #[test]
    fn test_short_band() {
        let band = straight_plan(1, 1.0);
        let mut planner = ScriptedPlanner::new(1.0);

        assert_eq!(
            convert_band(&mut planner, &band, StrategyMode::StartToEnd, 10),
            Err(PlannerError::PathTooShort(1))
        );
    }
}
