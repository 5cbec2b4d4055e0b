//! Local planner parameters and run-time reconfiguration
//!
//! Parameters are held as an immutable snapshot. Reconfiguration builds a new snapshot and swaps
//! it in atomically, and the planner takes one snapshot at the start of each cycle, so a cycle
//! never sees a half-applied update.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    convert::TryFrom,
    sync::{Arc, RwLock},
};

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};
use util::params::LoadError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the local planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalPlannerParams {
    /// Distance from the robot within which global plan poses are part of the local window.
    ///
    /// Units: meters
    pub window_bound_m: f64,

    /// The robot must be strictly closer than this to the goal position for the goal to be
    /// reached.
    ///
    /// Units: meters
    pub xy_goal_tolerance_m: f64,

    /// The robot heading must differ from the goal heading by strictly less than this for the
    /// goal to be reached.
    ///
    /// Units: radians
    pub yaw_goal_tolerance_rad: f64,

    /// Strategy used to convert the band into a nonholonomic path.
    pub strategy: StrategyMode,

    /// Maximum number of calls to the nonholonomic planner in a single cycle.
    pub max_connect_attempts: usize,

    /// What counts as an undefined final heading when interpolating band orientations.
    #[serde(default)]
    pub degenerate_heading: DegenerateHeadingPolicy,
}

/// A partial update delivered by the reconfiguration channel.
///
/// Field names follow the channel. Fields which are `None` keep their current value, and fields
/// the local planner does not recognise (such as controller gains) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reconfigure {
    pub xy_goal_tolerance: Option<f64>,
    pub yaw_goal_tolerance: Option<f64>,
    pub eband_to_rs_strategy: Option<i64>,
    pub max_connect_attempts: Option<usize>,
    pub degenerate_heading: Option<DegenerateHeadingPolicy>,
}

/// Shared handle to the current parameter snapshot.
///
/// Cloning the handle shares the snapshot, so a reconfiguration source can hold a clone while the
/// planner reads from the original.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<LocalPlannerParams>>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The available band to nonholonomic path conversion strategies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    /// Connect the first and last band poses with a single path.
    StartToEnd,

    /// Connect consecutive band poses, stopping at the first failure.
    PointToPointUntilFailure,

    /// Connect consecutive band poses, skipping poses that cannot be reached.
    PointToPointSkipFailures,

    /// Connect the first band pose to the last, pulling the end back one pose per failure.
    RecedingEnd,
}

/// Decides when the final band pose's heading is treated as undefined and replaced by the heading
/// of the pose before it.
///
/// A heading of exactly zero is ambiguous: it is what an unset orientation decodes to, but it is
/// also a legitimate heading along the frame's X axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateHeadingPolicy {
    /// Replace unset headings and headings of exactly zero.
    UnsetOrZero,

    /// Replace unset headings only, trusting a zero heading.
    UnsetOnly,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unrecognised strategy mode {0}, expected a value between 0 and 3")]
    InvalidStrategyMode(i64),

    #[error("Parameter {name} must be a finite, non-negative number, got {value}")]
    InvalidValue { name: &'static str, value: f64 },

    #[error("At least one planning attempt must be allowed per cycle")]
    NoConnectAttempts,

    #[error("Could not parse the reconfiguration request: {0}")]
    ParseError(toml::de::Error),

    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LocalPlannerParams {
    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("window_bound_m", self.window_bound_m),
            ("xy_goal_tolerance_m", self.xy_goal_tolerance_m),
            ("yaw_goal_tolerance_rad", self.yaw_goal_tolerance_rad),
        ];

        for (name, value) in checks.iter() {
            if !value.is_finite() || *value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    name: *name,
                    value: *value,
                });
            }
        }

        if self.max_connect_attempts == 0 {
            return Err(ConfigError::NoConnectAttempts);
        }

        Ok(())
    }

    /// Produce a new set of parameters with the recognised fields of `update` applied.
    pub fn with_update(&self, update: &Reconfigure) -> Result<Self, ConfigError> {
        let mut params = self.clone();

        if let Some(tol) = update.xy_goal_tolerance {
            params.xy_goal_tolerance_m = tol;
        }
        if let Some(tol) = update.yaw_goal_tolerance {
            params.yaw_goal_tolerance_rad = tol;
        }
        if let Some(code) = update.eband_to_rs_strategy {
            params.strategy = StrategyMode::try_from(code)?;
        }
        if let Some(attempts) = update.max_connect_attempts {
            params.max_connect_attempts = attempts;
        }
        if let Some(policy) = update.degenerate_heading {
            params.degenerate_heading = policy;
        }

        params.validate()?;

        Ok(params)
    }
}

impl Reconfigure {
    /// Parse a reconfiguration request from TOML.
    pub fn from_toml(request: &str) -> Result<Self, ConfigError> {
        toml::from_str(request).map_err(ConfigError::ParseError)
    }
}

impl ConfigHandle {
    /// Create a new handle, checking the initial parameters.
    pub fn new(params: LocalPlannerParams) -> Result<Self, ConfigError> {
        params.validate()?;

        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(params))),
        })
    }

    /// Get the current snapshot.
    pub fn snapshot(&self) -> Arc<LocalPlannerParams> {
        // The guarded value is only ever replaced whole, so a poisoned lock still holds a
        // complete snapshot.
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply a partial update on top of the current snapshot.
    ///
    /// An invalid update is rejected as a whole and the current snapshot stays in force.
    pub fn apply(&self, update: &Reconfigure) -> Result<Arc<LocalPlannerParams>, ConfigError> {
        let params = match self.snapshot().with_update(update) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!("Reconfiguration rejected: {}", e);
                return Err(e);
            }
        };

        self.swap(params.clone());

        info!(
            "Reconfigured: xy tol {} m, yaw tol {} rad, strategy {:?}, max attempts {}",
            params.xy_goal_tolerance_m,
            params.yaw_goal_tolerance_rad,
            params.strategy,
            params.max_connect_attempts
        );

        Ok(params)
    }

    fn swap(&self, params: Arc<LocalPlannerParams>) {
        match self.current.write() {
            Ok(mut guard) => *guard = params,
            Err(poisoned) => *poisoned.into_inner() = params,
        }
    }
}

impl StrategyMode {
    /// The numeric code of the strategy on the reconfiguration channel.
    pub fn code(&self) -> i64 {
        match self {
            StrategyMode::StartToEnd => 0,
            StrategyMode::PointToPointUntilFailure => 1,
            StrategyMode::PointToPointSkipFailures => 2,
            StrategyMode::RecedingEnd => 3,
        }
    }
}

impl TryFrom<i64> for StrategyMode {
    type Error = ConfigError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(StrategyMode::StartToEnd),
            1 => Ok(StrategyMode::PointToPointUntilFailure),
            2 => Ok(StrategyMode::PointToPointSkipFailures),
            3 => Ok(StrategyMode::RecedingEnd),
            c => Err(ConfigError::InvalidStrategyMode(c)),
        }
    }
}

impl Default for DegenerateHeadingPolicy {
    fn default() -> Self {
        DegenerateHeadingPolicy::UnsetOrZero
    }
}

impl From<LoadError> for ConfigError {
    fn from(e: LoadError) -> Self {
        ConfigError::ParamLoadError(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> LocalPlannerParams {
        LocalPlannerParams {
            window_bound_m: 3.0,
            xy_goal_tolerance_m: 0.2,
            yaw_goal_tolerance_rad: 0.1,
            strategy: StrategyMode::StartToEnd,
            max_connect_attempts: 32,
            degenerate_heading: DegenerateHeadingPolicy::UnsetOrZero,
        }
    }

    #[test]
    fn test_strategy_codes() {
        for code in 0..4 {
            assert_eq!(StrategyMode::try_from(code).unwrap().code(), code);
        }
        assert!(matches!(
            StrategyMode::try_from(4),
            Err(ConfigError::InvalidStrategyMode(4))
        ));
    }

    #[test]
    fn test_parse_params() {
        let p: LocalPlannerParams = toml::from_str(
            r#"
            window_bound_m = 3.0
            xy_goal_tolerance_m = 0.2
            yaw_goal_tolerance_rad = 0.1
            strategy = "receding_end"
            max_connect_attempts = 32
            "#,
        )
        .unwrap();

        assert_eq!(p.strategy, StrategyMode::RecedingEnd);
        assert_eq!(p.degenerate_heading, DegenerateHeadingPolicy::UnsetOrZero);
    }

    #[test]
    fn test_apply_reconfigure() {
        let handle = ConfigHandle::new(params()).unwrap();
        let before = handle.snapshot();

        let update = Reconfigure::from_toml(
            r#"
            xy_goal_tolerance = 0.5
            eband_to_rs_strategy = 3
            max_vel_lin = 1.2
            "#,
        )
        .unwrap();
        handle.apply(&update).unwrap();

        let after = handle.snapshot();
        assert_eq!(after.xy_goal_tolerance_m, 0.5);
        assert_eq!(after.yaw_goal_tolerance_rad, 0.1);
        assert_eq!(after.strategy, StrategyMode::RecedingEnd);

        // Snapshots taken earlier are unaffected
        assert_eq!(before.xy_goal_tolerance_m, 0.2);
        assert_eq!(before.strategy, StrategyMode::StartToEnd);
    }

    #[test]
    fn test_invalid_reconfigure_rejected() {
        let handle = ConfigHandle::new(params()).unwrap();

        let update = Reconfigure {
            xy_goal_tolerance: Some(0.5),
            eband_to_rs_strategy: Some(7),
            ..Default::default()
        };
        assert!(matches!(
            handle.apply(&update),
            Err(ConfigError::InvalidStrategyMode(7))
        ));

        // Nothing from the rejected update is applied
        assert_eq!(*handle.snapshot(), params());

        let update = Reconfigure {
            max_connect_attempts: Some(0),
            ..Default::default()
        };
        assert!(handle.apply(&update).is_err());
        assert!(ConfigHandle::new(LocalPlannerParams {
            yaw_goal_tolerance_rad: -1.0,
            ..params()
        })
        .is_err());
    }
}
