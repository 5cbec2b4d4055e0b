//! Local planner module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, info, warn};
use serde::Serialize;

// Internal
use super::*;
use crate::{
    band::{BandError, DeformableBand},
    loc::PoseTransformGateway,
    path::Path,
    traj_ctrl::{TrackingController, Velocity},
};
use util::{module::State, params as param_loader};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The local planner.
///
/// Generic over its collaborators: the pose and transform lookups `G`, the band optimiser `B`,
/// the nonholonomic planner `P` and the tracking controller `C`.
pub struct LocalPlanner<G, B, P, C> {
    gateway: G,
    band: B,
    planner: P,
    controller: C,

    /// Parameter snapshot source, `None` until initialised.
    config: Option<ConfigHandle>,

    mode: LocalPlannerMode,

    /// The accepted global plan
    plan: Option<Path>,

    sync: PathWindowSynchronizer,

    /// The merged local plan of the last successful cycle
    last_local_plan: Option<Path>,

    report: CycleReport,
}

/// Input data to the module
#[derive(Debug, Clone, Default)]
pub struct InputData {
    /// A new global plan to accept before running the cycle
    pub new_plan: Option<Path>,
}

/// Report on a single control cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// Strategy used to convert the band, `None` if conversion did not run.
    pub strategy: Option<StrategyMode>,

    /// Number of poses in the band after synchronisation
    pub band_len: usize,

    /// Fail index of the conversion, `None` if conversion did not run.
    pub fail_index: Option<usize>,

    /// Number of poses in the merged local plan
    pub merged_len: usize,

    /// Number of global plan poses appended to the band this cycle
    pub frames_appended: usize,

    /// True if the goal was reached this cycle
    pub goal_reached: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The possible modes of the local planner.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum LocalPlannerMode {
    /// No plan has been accepted.
    Idle,

    /// Following the accepted plan.
    Tracking,

    /// The robot is at the goal of the accepted plan.
    GoalReached,

    /// No plan has been accepted and the last one offered was rejected.
    Failed,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<G, B, P, C> State for LocalPlanner<G, B, P, C>
where
    G: PoseTransformGateway,
    B: DeformableBand,
    P: NonholonomicPlanner,
    C: TrackingController,
{
    type InitData = &'static str;
    type InitError = LocalPlannerError;

    type InputData = InputData;
    type OutputData = Velocity;
    type StatusReport = CycleReport;
    type ProcError = LocalPlannerError;

    /// Initialise the local planner.
    ///
    /// Expected init data is a path to the parameter file, relative to the parameters directory.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        let params: LocalPlannerParams = param_loader::load(init_data).map_err(ConfigError::from)?;

        self.init_with(ConfigHandle::new(params)?);

        Ok(())
    }

    /// Process one control cycle, accepting a new plan first if one is given.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if let Some(ref plan) = input_data.new_plan {
            self.set_plan(plan.clone())?;
        }

        let cmd = self.compute_velocity_command()?;

        Ok((cmd, self.report.clone()))
    }
}

impl<G, B, P, C> LocalPlanner<G, B, P, C>
where
    G: PoseTransformGateway,
    B: DeformableBand,
    P: NonholonomicPlanner,
    C: TrackingController,
{
    /// Create a new, uninitialised, local planner.
    pub fn new(gateway: G, band: B, planner: P, controller: C) -> Self {
        Self {
            gateway,
            band,
            planner,
            controller,
            config: None,
            mode: LocalPlannerMode::Idle,
            plan: None,
            sync: PathWindowSynchronizer::new(),
            last_local_plan: None,
            report: CycleReport::default(),
        }
    }

    /// Initialise the planner with an existing configuration handle, discarding any plan.
    pub fn init_with(&mut self, config: ConfigHandle) {
        let params = config.snapshot();
        info!(
            "Local planner initialised: window bound {} m, strategy {:?}",
            params.window_bound_m, params.strategy
        );

        self.config = Some(config);
        self.mode = LocalPlannerMode::Idle;
        self.plan = None;
        self.sync.clear();
        self.last_local_plan = None;
        self.report = CycleReport::default();
    }

    /// Accept a new global plan, rebuilding the band from it.
    ///
    /// If the band cannot be built the obstacle layers are cleared and the build is tried once
    /// more. If the plan is rejected the current plan, band, window and mode are kept and the
    /// previous plan is still followed. Without a previous plan the planner enters
    /// [`LocalPlannerMode::Failed`].
    pub fn set_plan(&mut self, plan: Path) -> Result<(), LocalPlannerError> {
        let params = self.snapshot()?;

        let (window, counters) =
            match PathWindowSynchronizer::initial_window(&plan, &self.gateway, params.window_bound_m) {
                Ok(w) => w,
                Err(e) => {
                    warn!("Could not compute the window of the new plan: {}", e);
                    self.reject_plan();
                    return Err(e.into());
                }
            };

        if let Err(e) = self.band.reset(&window) {
            warn!("Band initialisation failed ({}), clearing obstacle layers and retrying", e);
            self.band.clear_obstacle_layers();

            if let Err(e) = self.band.reset(&window) {
                error!("Could not initialise the band from the new plan: {}", e);
                self.reject_plan();
                return Err(LocalPlannerError::BandInitFailed(e));
            }
        }

        info!(
            "Accepted plan of {} poses, initial window [{}, {})",
            plan.len(),
            counters.start(),
            counters.end()
        );

        self.plan = Some(plan);
        self.sync.seed(counters);
        self.last_local_plan = None;
        self.mode = LocalPlannerMode::Tracking;

        if let Err(e) = self.band.optimize() {
            warn!("Initial band optimisation failed: {}", e);
        }

        Ok(())
    }

    /// Determine whether the robot has reached the end of the accepted plan.
    pub fn is_goal_reached(&self) -> Result<bool, LocalPlannerError> {
        let params = self.snapshot()?;
        let plan = self.accepted_plan()?;

        self.check_goal(plan, &params)
    }

    /// Run the planning pipeline and compute a velocity command.
    pub fn compute_velocity_command(&mut self) -> Result<Velocity, LocalPlannerError> {
        let params = self.snapshot()?;
        self.accepted_plan()?;
        self.report = CycleReport::default();

        let result = self.cycle(&params);

        match result {
            Ok(cmd) => {
                self.report.goal_reached = self.mode == LocalPlannerMode::GoalReached;
                Ok(cmd)
            }
            Err(e) => {
                warn!("No command this cycle: {}", e);
                Err(e)
            }
        }
    }

    /// The current mode.
    pub fn mode(&self) -> LocalPlannerMode {
        self.mode
    }

    /// The report of the last cycle.
    pub fn report(&self) -> &CycleReport {
        &self.report
    }

    /// The merged local plan of the last successful cycle.
    pub fn last_local_plan(&self) -> Option<&Path> {
        self.last_local_plan.as_ref()
    }

    /// The configuration handle, so that reconfiguration sources can share it.
    pub fn config(&self) -> Option<&ConfigHandle> {
        self.config.as_ref()
    }

    /// Counters of the plan window the band was last grown to.
    pub fn window(&self) -> Option<WindowCounters> {
        self.sync.counters()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn band(&self) -> &B {
        &self.band
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    fn snapshot(&self) -> Result<std::sync::Arc<LocalPlannerParams>, LocalPlannerError> {
        match self.config {
            Some(ref c) => Ok(c.snapshot()),
            None => {
                error!("The local planner must be initialised before it is used");
                Err(LocalPlannerError::NotInitialised)
            }
        }
    }

    fn accepted_plan(&self) -> Result<&Path, LocalPlannerError> {
        match (self.mode, self.plan.as_ref()) {
            (LocalPlannerMode::Failed, _) => Err(LocalPlannerError::PlanRejected),
            (_, Some(plan)) => Ok(plan),
            (_, None) => {
                warn!("A plan must be set before the local planner can run");
                Err(LocalPlannerError::NoPlan)
            }
        }
    }

    fn reject_plan(&mut self) {
        match self.plan {
            Some(_) => info!("Keeping the previous plan"),
            None => self.mode = LocalPlannerMode::Failed,
        }
    }

    fn check_goal(&self, plan: &Path, params: &LocalPlannerParams) -> Result<bool, LocalPlannerError> {
        let robot = self.gateway.current_pose()?;
        let goal = match plan.back() {
            Some(g) => self.gateway.transform_pose(g, &robot.frame_id)?,
            None => return Err(LocalPlannerError::NoPlan),
        };

        Ok(goal_reached(&robot, &goal, params))
    }

    fn cycle(&mut self, params: &LocalPlannerParams) -> Result<Velocity, LocalPlannerError> {
        let plan = self.plan.as_ref().ok_or(LocalPlannerError::NoPlan)?;

        if self.check_goal(plan, params)? {
            if self.mode != LocalPlannerMode::GoalReached {
                info!("Goal reached");
            }
            self.mode = LocalPlannerMode::GoalReached;
            return Ok(Velocity::zero());
        }
        self.mode = LocalPlannerMode::Tracking;

        let sync = self
            .sync
            .sync(plan, &self.gateway, &mut self.band, params.window_bound_m)?;
        self.report.frames_appended = sync.frames_appended;

        let mut band_path = self.band.path()?;
        if band_path.is_empty() {
            return Err(LocalPlannerError::BandError(BandError::Empty));
        }
        self.report.band_len = band_path.len();

        interpolate_orientations(&mut band_path, params.degenerate_heading);

        self.report.strategy = Some(params.strategy);
        let conversion = convert_band(
            &mut self.planner,
            &band_path,
            params.strategy,
            params.max_connect_attempts,
        )?;
        self.report.fail_index = Some(conversion.fail_index);

        if conversion.fail_index == 0 {
            return Err(LocalPlannerError::ConversionFailed(params.strategy));
        }

        let merged = stitch(&self.gateway, &conversion, &band_path)?;
        self.report.merged_len = merged.len();

        debug!(
            "Band of {} poses, fail index {}, local plan of {} poses",
            band_path.len(),
            conversion.fail_index,
            merged.len()
        );

        let cmd = self.controller.compute_command(&merged)?;
        self.last_local_plan = Some(merged);

        Ok(cmd)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        sim::{straight_plan, ScriptedBand, ScriptedGateway, ScriptedPlanner, ScriptedTracker},
        traj_ctrl::TrackingError,
    };

    type TestPlanner = LocalPlanner<ScriptedGateway, ScriptedBand, ScriptedPlanner, ScriptedTracker>;

    fn params(strategy: StrategyMode) -> LocalPlannerParams {
        LocalPlannerParams {
            window_bound_m: 10.0,
            xy_goal_tolerance_m: 0.2,
            yaw_goal_tolerance_rad: 0.1,
            strategy,
            max_connect_attempts: 16,
            degenerate_heading: DegenerateHeadingPolicy::UnsetOrZero,
        }
    }

    fn command() -> Velocity {
        Velocity {
            linear_x_ms: 0.3,
            ..Velocity::zero()
        }
    }

    fn planner(band: ScriptedBand, tracker: ScriptedTracker) -> TestPlanner {
        let plan = straight_plan(5, 1.0);
        let mut lp = LocalPlanner::new(
            ScriptedGateway::new("map", vec![plan[0].clone()]),
            band,
            ScriptedPlanner::new(1.0),
            tracker,
        );
        lp.init_with(ConfigHandle::new(params(StrategyMode::StartToEnd)).unwrap());
        lp
    }

    #[test]
    fn test_preconditions() {
        let plan = straight_plan(5, 1.0);
        let mut lp = LocalPlanner::new(
            ScriptedGateway::new("map", vec![plan[0].clone()]),
            ScriptedBand::new(),
            ScriptedPlanner::new(1.0),
            ScriptedTracker::new(command()),
        );

        assert!(matches!(
            lp.compute_velocity_command(),
            Err(LocalPlannerError::NotInitialised)
        ));
        assert!(matches!(
            lp.set_plan(plan.clone()),
            Err(LocalPlannerError::NotInitialised)
        ));

        lp.init_with(ConfigHandle::new(params(StrategyMode::StartToEnd)).unwrap());
        assert!(matches!(
            lp.compute_velocity_command(),
            Err(LocalPlannerError::NoPlan)
        ));
        assert!(matches!(lp.is_goal_reached(), Err(LocalPlannerError::NoPlan)));

        // Nothing was touched
        assert_eq!(lp.band().reset_calls(), 0);
        assert!(lp.planner().calls().is_empty());
        assert_eq!(lp.mode(), LocalPlannerMode::Idle);
    }

    #[test]
    fn test_cycle() {
        let mut lp = planner(ScriptedBand::new(), ScriptedTracker::new(command()));

        lp.set_plan(straight_plan(5, 1.0)).unwrap();
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);
        assert_eq!(lp.window(), WindowCounters::new(0, 5, 5));

        let cmd = lp.compute_velocity_command().unwrap();
        assert_eq!(cmd, command());
        assert_eq!(
            *lp.report(),
            CycleReport {
                strategy: Some(StrategyMode::StartToEnd),
                band_len: 5,
                fail_index: Some(5),
                merged_len: 5,
                frames_appended: 0,
                goal_reached: false,
            }
        );
        assert_eq!(lp.last_local_plan().map(|p| p.len()), Some(5));
        assert_eq!(lp.controller().tracked_lens(), &[5]);
    }

    #[test]
    fn test_set_plan_retry() {
        let mut lp = planner(ScriptedBand::new().failing_resets(1), ScriptedTracker::new(command()));

        lp.set_plan(straight_plan(5, 1.0)).unwrap();

        assert_eq!(lp.band().reset_calls(), 2);
        assert_eq!(lp.band().obstacle_clears(), 1);
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);
    }

    #[test]
    fn test_set_plan_rejected() {
        let mut lp = planner(ScriptedBand::new().failing_resets(2), ScriptedTracker::new(command()));

        assert!(matches!(
            lp.set_plan(straight_plan(5, 1.0)),
            Err(LocalPlannerError::BandInitFailed(_))
        ));
        assert_eq!(lp.band().reset_calls(), 2);
        assert_eq!(lp.mode(), LocalPlannerMode::Failed);
        assert_eq!(lp.window(), None);

        // Cycles are refused until a plan is accepted
        assert!(matches!(
            lp.compute_velocity_command(),
            Err(LocalPlannerError::PlanRejected)
        ));

        lp.set_plan(straight_plan(5, 1.0)).unwrap();
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);
        assert!(lp.compute_velocity_command().is_ok());

        // A plan in a frame with no transform is refused, the accepted plan is still followed
        let mut odom_plan = straight_plan(3, 1.0);
        for pose in odom_plan.poses.iter_mut() {
            pose.frame_id = "odom".into();
        }
        let window = lp.window();

        assert!(matches!(
            lp.set_plan(odom_plan),
            Err(LocalPlannerError::SyncError(SyncError::TransformError(_)))
        ));
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);
        assert_eq!(lp.window(), window);
        assert_eq!(lp.compute_velocity_command().unwrap(), command());
        assert_eq!(lp.controller().tracked_lens(), &[5, 5]);
    }

    #[test]
    fn test_optimisation_failures() {
        let mut lp = planner(
            ScriptedBand::new().failing_optimisations(2),
            ScriptedTracker::new(command()),
        );

        // The initial optimisation failing does not reject the plan
        lp.set_plan(straight_plan(5, 1.0)).unwrap();
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);

        // During a cycle it aborts the cycle
        assert!(matches!(
            lp.compute_velocity_command(),
            Err(LocalPlannerError::SyncError(SyncError::OptimisationFailed(_)))
        ));
        assert!(lp.last_local_plan().is_none());
        assert!(lp.planner().calls().is_empty());

        assert_eq!(lp.compute_velocity_command().unwrap(), command());
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);
    }

    #[test]
    fn test_failures_are_not_sticky() {
        let mut lp = planner(ScriptedBand::new(), ScriptedTracker::new(command()).declining(1));
        lp.set_plan(straight_plan(5, 1.0)).unwrap();

        assert!(matches!(
            lp.compute_velocity_command(),
            Err(LocalPlannerError::TrackingError(TrackingError::Declined(_)))
        ));
        assert_eq!(lp.mode(), LocalPlannerMode::Tracking);
        assert!(lp.last_local_plan().is_none());

        assert_eq!(lp.compute_velocity_command().unwrap(), command());
    }

    #[test]
    fn test_reconfigure_between_cycles() {
        let mut lp = planner(ScriptedBand::new(), ScriptedTracker::new(command()));
        lp.set_plan(straight_plan(5, 1.0)).unwrap();
        lp.compute_velocity_command().unwrap();

        let update = Reconfigure {
            eband_to_rs_strategy: Some(1),
            ..Default::default()
        };
        lp.config().unwrap().apply(&update).unwrap();

        lp.compute_velocity_command().unwrap();
        assert_eq!(lp.report().strategy, Some(StrategyMode::PointToPointUntilFailure));
        assert_eq!(lp.report().fail_index, Some(4));

        // An invalid strategy is refused and the planner carries on with the last good one
        let update = Reconfigure {
            eband_to_rs_strategy: Some(9),
            ..Default::default()
        };
        assert!(lp.config().unwrap().apply(&update).is_err());
        lp.compute_velocity_command().unwrap();
        assert_eq!(lp.report().strategy, Some(StrategyMode::PointToPointUntilFailure));
    }

    #[test]
    fn test_proc() {
        let mut lp = planner(ScriptedBand::new(), ScriptedTracker::new(command()));

        let input = InputData {
            new_plan: Some(straight_plan(5, 1.0)),
        };
        let (cmd, report) = lp.proc(&input).unwrap();

        assert_eq!(cmd, command());
        assert_eq!(report.merged_len, 5);
        assert_eq!(lp.band().reset_calls(), 1);

        // No new plan, the band is not rebuilt
        lp.proc(&InputData::default()).unwrap();
        assert_eq!(lp.band().reset_calls(), 1);
    }
}
