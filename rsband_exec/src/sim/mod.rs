//! # Scripted collaborators
//!
//! Deterministic stand-ins for the services the local planner depends on, used by the tests and
//! by the scenario replay executable. Each one follows a script of poses, successes and failures
//! given when it is built, and records what was asked of it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{collections::HashMap, path::Path as FsPath};

// External
use chrono::{DateTime, Utc};
use log::{debug, trace};
use nalgebra::{Isometry2, Point2, Vector2};
use serde::Deserialize;
use util::{
    maths::wrap_pi,
    params::{self, LoadError},
};

// Internal
use crate::{
    band::{BandEnd, BandError, DeformableBand},
    local_planner::{NonholonomicPlanner, PlannerError, Reconfigure},
    loc::{Pose, PoseTransformGateway, TransformError},
    path::{Path, PathError},
    traj_ctrl::{TrackingController, TrackingError, Velocity},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Default distance within which the robot pose can be connected to the band.
pub const DEFAULT_CONNECT_RADIUS_M: f64 = 2.0;

/// Positions closer than this are treated as the same position by scripts.
const POSITION_TOLERANCE_M: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gateway which reports a scripted sequence of robot poses and knows a fixed set of transforms.
#[derive(Debug, Clone)]
pub struct ScriptedGateway {
    local_frame: String,
    robot_poses: Vec<Pose>,
    index: usize,
    transforms: HashMap<(String, String), Isometry2<f64>>,
}

/// Band which keeps the frames it is given without deforming them.
///
/// Front appends splice the given poses in place of the closest band frame and everything before
/// it, failing if that frame is further than the connect radius.
#[derive(Debug, Clone)]
pub struct ScriptedBand {
    frames: Vec<Pose>,
    connect_radius_m: f64,
    reset_failures: usize,
    back_append_failures: usize,
    optimise_failures: usize,
    reset_calls: usize,
    obstacle_clears: usize,
}

/// Planner which connects poses with straight sampled paths, except where scripted to fail.
#[derive(Debug, Clone)]
pub struct ScriptedPlanner {
    point_sep_m: f64,
    failing_pairs: Vec<(Vector2<f64>, Vector2<f64>)>,
    unreachable: Vec<Vector2<f64>>,
    unreachable_all: bool,
    calls: Vec<(Pose, Pose)>,
}

/// Tracking controller which returns a fixed command.
#[derive(Debug, Clone)]
pub struct ScriptedTracker {
    command: Velocity,
    declines: usize,
    tracked_lens: Vec<usize>,
}

/// A scenario for the replay executable.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// The frame the band and local plans are expressed in
    pub local_frame: String,

    /// The global plan
    pub plan: Vec<ScenarioPose>,

    /// The robot pose on each cycle
    pub robot_poses: Vec<ScenarioPose>,

    /// Pairs of positions the planner cannot connect
    #[serde(default)]
    pub failing_pairs: Vec<[[f64; 2]; 2]>,

    /// Separation of the poses in planned paths
    #[serde(default = "default_point_sep")]
    pub point_sep_m: f64,

    /// Command returned by the tracker
    #[serde(default)]
    pub command: Velocity,

    /// Reconfiguration requests delivered before given cycles
    #[serde(default)]
    pub reconfigure: Vec<ScheduledReconfigure>,
}

/// A planar pose in a scenario file.
#[derive(Debug, Copy, Clone, Deserialize)]
pub struct ScenarioPose {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub heading: Option<f64>,
}

/// A reconfiguration request to deliver before the given cycle.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledReconfigure {
    pub cycle: usize,
    pub update: Reconfigure,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Build a straight plan of `num_poses` poses along the X axis of the `map` frame, `sep_m` apart,
/// all heading along the axis.
pub fn straight_plan(num_poses: usize, sep_m: f64) -> Path {
    let stamp = Utc::now();

    (0..num_poses)
        .map(|i| Pose::new(Vector2::new(i as f64 * sep_m, 0.0), 0.0, "map", stamp))
        .collect()
}

fn default_point_sep() -> f64 {
    1.0
}

fn same_position(a: &Vector2<f64>, b: &Vector2<f64>) -> bool {
    (a - b).norm() < POSITION_TOLERANCE_M
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptedGateway {
    /// Create a gateway whose robot is at each of `robot_poses` in turn.
    pub fn new(local_frame: &str, robot_poses: Vec<Pose>) -> Self {
        Self {
            local_frame: local_frame.into(),
            robot_poses,
            index: 0,
            transforms: HashMap::new(),
        }
    }

    /// Add a transform taking poses in `from` into `to`. The inverse is added as well.
    pub fn with_transform(mut self, from: &str, to: &str, iso: Isometry2<f64>) -> Self {
        self.transforms
            .insert((from.into(), to.into()), iso);
        self.transforms
            .insert((to.into(), from.into()), iso.inverse());
        self
    }

    /// Move the robot to the next scripted pose.
    ///
    /// Returns false if there are no more poses, in which case the robot pose becomes unavailable.
    pub fn advance(&mut self) -> bool {
        if self.index < self.robot_poses.len() {
            self.index += 1;
        }

        self.index < self.robot_poses.len()
    }

    /// Index of the current scripted robot pose.
    pub fn cycle_index(&self) -> usize {
        self.index
    }
}

impl PoseTransformGateway for ScriptedGateway {
    fn local_frame(&self) -> &str {
        &self.local_frame
    }

    fn current_pose(&self) -> Result<Pose, TransformError> {
        self.robot_poses
            .get(self.index)
            .cloned()
            .ok_or(TransformError::RobotPoseUnavailable)
    }

    fn transform_pose(&self, pose: &Pose, target_frame: &str) -> Result<Pose, TransformError> {
        if pose.frame_id == target_frame {
            return Ok(pose.clone());
        }

        let iso = self
            .transforms
            .get(&(pose.frame_id.clone(), target_frame.to_string()))
            .ok_or_else(|| TransformError::NoTransform {
                from: pose.frame_id.clone(),
                to: target_frame.into(),
            })?;

        let position = iso.transform_point(&Point2::from(pose.position_m));

        Ok(Pose {
            position_m: position.coords,
            heading_rad: pose.heading_rad.map(|h| wrap_pi(h + iso.rotation.angle())),
            frame_id: target_frame.into(),
            stamp: pose.stamp,
        })
    }
}

impl ScriptedBand {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            connect_radius_m: DEFAULT_CONNECT_RADIUS_M,
            reset_failures: 0,
            back_append_failures: 0,
            optimise_failures: 0,
            reset_calls: 0,
            obstacle_clears: 0,
        }
    }

    pub fn with_connect_radius(mut self, radius_m: f64) -> Self {
        self.connect_radius_m = radius_m;
        self
    }

    /// Fail the next `n` resets.
    pub fn failing_resets(mut self, n: usize) -> Self {
        self.reset_failures = n;
        self
    }

    /// Fail the next `n` appends to the back of the band.
    pub fn failing_back_appends(mut self, n: usize) -> Self {
        self.back_append_failures = n;
        self
    }

    /// Fail the next `n` optimisations.
    pub fn failing_optimisations(mut self, n: usize) -> Self {
        self.optimise_failures = n;
        self
    }

    pub fn frames(&self) -> &[Pose] {
        &self.frames
    }

    /// Number of calls to `reset`, successful or not.
    pub fn reset_calls(&self) -> usize {
        self.reset_calls
    }

    pub fn obstacle_clears(&self) -> usize {
        self.obstacle_clears
    }

    fn splice_front(&mut self, path: &Path) -> Result<(), BandError> {
        let joint = path.back().ok_or(BandError::CannotConnect(BandEnd::Front))?;

        let closest = self
            .frames
            .iter()
            .enumerate()
            .map(|(i, f)| (i, f.distance_to(joint)))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((i, d)),
            });

        match closest {
            Some((i, d)) if d <= self.connect_radius_m => {
                let mut frames = path.poses.clone();
                frames.extend(self.frames.drain(i + 1..));
                self.frames = frames;
                Ok(())
            }
            _ => Err(BandError::CannotConnect(BandEnd::Front)),
        }
    }
}

impl Default for ScriptedBand {
    fn default() -> Self {
        Self::new()
    }
}

impl DeformableBand for ScriptedBand {
    fn reset(&mut self, path: &Path) -> Result<(), BandError> {
        self.reset_calls += 1;

        if self.reset_failures > 0 {
            self.reset_failures -= 1;
            return Err(BandError::InitFailed);
        }
        if path.is_empty() {
            return Err(BandError::InitFailed);
        }

        self.frames = path.poses.clone();
        debug!("Band reset with {} frames", self.frames.len());

        Ok(())
    }

    fn append_frames(&mut self, path: &Path, end: BandEnd) -> Result<(), BandError> {
        match end {
            BandEnd::Front => self.splice_front(path),
            BandEnd::Back => {
                if self.back_append_failures > 0 {
                    self.back_append_failures -= 1;
                    return Err(BandError::CannotConnect(BandEnd::Back));
                }

                self.frames.extend(path.iter().cloned());
                trace!("Appended {} frames, band now {} frames", path.len(), self.frames.len());
                Ok(())
            }
        }
    }

    fn optimize(&mut self) -> Result<(), BandError> {
        if self.optimise_failures > 0 {
            self.optimise_failures -= 1;
            return Err(BandError::OptimisationFailed);
        }

        Ok(())
    }

    fn path(&self) -> Result<Path, BandError> {
        if self.frames.is_empty() {
            return Err(BandError::Empty);
        }

        Ok(self.frames.clone().into())
    }

    fn clear_obstacle_layers(&mut self) {
        self.obstacle_clears += 1;
        debug!("Obstacle layers cleared");
    }
}

impl ScriptedPlanner {
    /// Create a planner whose paths have poses at most `point_sep_m` apart.
    pub fn new(point_sep_m: f64) -> Self {
        Self {
            point_sep_m,
            failing_pairs: Vec::new(),
            unreachable: Vec::new(),
            unreachable_all: false,
            calls: Vec::new(),
        }
    }

    /// Fail to connect `start` to `end`.
    pub fn failing_between(mut self, start: &Pose, end: &Pose) -> Self {
        self.failing_pairs.push((start.position_m, end.position_m));
        self
    }

    /// Fail every connection ending at `target`.
    pub fn unreachable(mut self, target: &Pose) -> Self {
        self.unreachable.push(target.position_m);
        self
    }

    /// Fail every connection.
    pub fn unreachable_all(mut self) -> Self {
        self.unreachable_all = true;
        self
    }

    /// The start and end poses of every call made, in order.
    pub fn calls(&self) -> &[(Pose, Pose)] {
        &self.calls
    }

    fn scripted_failure(&self, start: &Pose, end: &Pose) -> bool {
        self.unreachable_all
            || self
                .unreachable
                .iter()
                .any(|u| same_position(u, &end.position_m))
            || self.failing_pairs.iter().any(|(s, e)| {
                same_position(s, &start.position_m) && same_position(e, &end.position_m)
            })
    }
}

impl NonholonomicPlanner for ScriptedPlanner {
    fn connect(&mut self, start: &Pose, end: &Pose) -> Result<Path, PlannerError> {
        self.calls.push((start.clone(), end.clone()));

        if self.scripted_failure(start, end) {
            return Err(PlannerError::NoSolution);
        }

        Path::direct(start, end, self.point_sep_m).map_err(|e| match e {
            PathError::FrameMismatch(from, to) => PlannerError::InvalidFrame(from, to),
            PathError::InvalidSeparation(_) => PlannerError::NoSolution,
        })
    }
}

impl ScriptedTracker {
    pub fn new(command: Velocity) -> Self {
        Self {
            command,
            declines: 0,
            tracked_lens: Vec::new(),
        }
    }

    /// Decline the next `n` paths.
    pub fn declining(mut self, n: usize) -> Self {
        self.declines = n;
        self
    }

    /// Length of each path a command was requested for.
    pub fn tracked_lens(&self) -> &[usize] {
        &self.tracked_lens
    }
}

impl TrackingController for ScriptedTracker {
    fn compute_command(&mut self, path: &Path) -> Result<Velocity, TrackingError> {
        self.tracked_lens.push(path.len());

        if path.is_empty() {
            return Err(TrackingError::EmptyPath);
        }
        if self.declines > 0 {
            self.declines -= 1;
            return Err(TrackingError::Declined("scripted decline".into()));
        }

        Ok(self.command)
    }
}

impl Scenario {
    /// Load a scenario from a TOML file.
    pub fn load<F: AsRef<FsPath>>(path: F) -> Result<Self, LoadError> {
        params::load_from(path)
    }

    /// The global plan, in the local frame.
    pub fn global_plan(&self, stamp: DateTime<Utc>) -> Path {
        self.plan
            .iter()
            .map(|p| p.to_pose(&self.local_frame, stamp))
            .collect()
    }

    /// Build the scripted collaborators for this scenario.
    pub fn collaborators(
        &self,
        stamp: DateTime<Utc>,
    ) -> (ScriptedGateway, ScriptedBand, ScriptedPlanner, ScriptedTracker) {
        let robot_poses = self
            .robot_poses
            .iter()
            .map(|p| p.to_pose(&self.local_frame, stamp))
            .collect();

        let mut planner = ScriptedPlanner::new(self.point_sep_m);
        for [s, e] in self.failing_pairs.iter() {
            planner
                .failing_pairs
                .push((Vector2::new(s[0], s[1]), Vector2::new(e[0], e[1])));
        }

        (
            ScriptedGateway::new(&self.local_frame, robot_poses),
            ScriptedBand::new(),
            planner,
            ScriptedTracker::new(self.command),
        )
    }

    /// Reconfiguration requests to deliver before `cycle`.
    pub fn reconfigure_at(&self, cycle: usize) -> impl Iterator<Item = &Reconfigure> {
        self.reconfigure
            .iter()
            .filter(move |r| r.cycle == cycle)
            .map(|r| &r.update)
    }
}

impl ScenarioPose {
    fn to_pose(&self, frame_id: &str, stamp: DateTime<Utc>) -> Pose {
        let mut pose = Pose::new_unoriented(Vector2::new(self.x, self.y), frame_id, stamp);
        pose.heading_rad = self.heading;
        pose
    }
}

#[cfg(test)]
mod test {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn test_gateway_transforms() {
        let plan = straight_plan(3, 1.0);
        let gateway = ScriptedGateway::new("odom", vec![plan[0].clone()]).with_transform(
            "map",
            "odom",
            Isometry2::new(Vector2::new(1.0, 0.0), FRAC_PI_2),
        );

        let p = gateway.transform_pose(&plan[1], "odom").unwrap();
        assert!((p.position_m - Vector2::new(1.0, 1.0)).norm() < 1e-9);
        assert!((p.heading_rad.unwrap() - FRAC_PI_2).abs() < 1e-9);
        assert_eq!(p.frame_id, "odom");

        // The inverse takes it back
        let q = gateway.transform_pose(&p, "map").unwrap();
        assert!((q.position_m - plan[1].position_m).norm() < 1e-9);

        assert!(gateway.transform_pose(&plan[1], "base_link").is_err());
    }

    #[test]
    fn test_gateway_advance() {
        let plan = straight_plan(2, 1.0);
        let mut gateway = ScriptedGateway::new("map", plan.poses.clone());

        assert_eq!(gateway.current_pose().unwrap(), plan[0]);
        assert!(gateway.advance());
        assert_eq!(gateway.current_pose().unwrap(), plan[1]);
        assert!(!gateway.advance());
        assert_eq!(gateway.current_pose(), Err(TransformError::RobotPoseUnavailable));
    }

    #[test]
    fn test_band_front_splice() {
        let plan = straight_plan(5, 1.0);
        let mut band = ScriptedBand::new().with_connect_radius(0.5);
        band.reset(&plan).unwrap();

        let mut robot = plan[2].clone();
        robot.position_m[1] = 0.2;
        band.append_frames(&vec![robot.clone()].into(), BandEnd::Front)
            .unwrap();

        assert_eq!(band.frames().len(), 3);
        assert_eq!(band.frames()[0], robot);

        robot.position_m[1] = 5.0;
        assert_eq!(
            band.append_frames(&vec![robot].into(), BandEnd::Front),
            Err(BandError::CannotConnect(BandEnd::Front))
        );
    }

    #[test]
    fn test_scenario_parse() {
        let scenario: Scenario = toml::from_str(
            r#"
            local_frame = "map"
            plan = [{ x = 0.0, y = 0.0 }, { x = 1.0, y = 0.0, heading = 0.0 }]
            robot_poses = [{ x = 0.0, y = 0.0, heading = 0.0 }]
            failing_pairs = [[[0.0, 0.0], [1.0, 0.0]]]

            [command]
            linear_x_ms = 0.5
            linear_y_ms = 0.0
            angular_z_rads = 0.0

            [[reconfigure]]
            cycle = 1
            update = { eband_to_rs_strategy = 3 }
            "#,
        )
        .unwrap();

        let plan = scenario.global_plan(Utc::now());
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].heading_rad, None);

        let (_, _, mut planner, _) = scenario.collaborators(Utc::now());
        assert!(planner.connect(&plan[0], &plan[1]).is_err());
        assert!(planner.connect(&plan[1], &plan[0]).is_ok());

        assert_eq!(scenario.reconfigure_at(1).count(), 1);
        assert_eq!(scenario.reconfigure_at(0).count(), 0);
    }
}
