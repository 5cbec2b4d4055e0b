//! # Plan window synchronisation
//!
//! Keeps the band in step with the robot as it advances along the global plan. Each cycle the
//! robot pose is spliced onto the front of the band, the plan window is recomputed, and any plan
//! poses which have entered the window since the band last grew are appended to its back.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, trace, warn};

use crate::{
    band::{BandEnd, BandError, DeformableBand},
    loc::{PoseTransformGateway, TransformError},
    path::Path,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A half-open range `[start, end)` of global plan indices making up the plan window.
///
/// Counters can only be built with `start <= end <= len`, where `len` is the length of the plan
/// they index.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WindowCounters {
    start: usize,
    end: usize,
}

/// Tracks which part of the global plan the band currently represents.
#[derive(Debug, Default)]
pub struct PathWindowSynchronizer {
    counters: Option<WindowCounters>,
}

/// Outcome of a successful synchronisation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// The window computed this cycle.
    pub window: WindowCounters,

    /// Number of plan poses appended to the back of the band.
    pub frames_appended: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("Could not compute the plan window: {0}")]
    TransformError(TransformError),

    #[error("No part of the global plan lies within the local window")]
    EmptyWindow,

    #[error("The robot pose could not be connected to the band: {0}")]
    RobotDiverged(BandError),

    #[error("New plan poses could not be appended to the band: {0}")]
    AppendFailed(BandError),

    #[error("The band could not be optimised: {0}")]
    OptimisationFailed(BandError),

    #[error("The synchroniser has not been seeded with a plan")]
    NotSeeded,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl WindowCounters {
    /// Build counters for a window into a plan of `len` poses.
    ///
    /// Returns `None` if the range is not ordered or runs past the end of the plan.
    pub fn new(start: usize, end: usize, len: usize) -> Option<Self> {
        if start <= end && end <= len {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Index of the first plan pose in the window.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Index one past the last plan pose in the window.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of plan poses in the window.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl PathWindowSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The counters of the window the band was last grown to, if seeded.
    pub fn counters(&self) -> Option<WindowCounters> {
        self.counters
    }

    /// Compute the initial window of a new plan.
    ///
    /// Nothing is stored, the returned counters must be passed to [`Self::seed`] once the band
    /// has accepted the window.
    pub fn initial_window<G>(
        plan: &Path,
        gateway: &G,
        window_bound_m: f64,
    ) -> Result<(Path, WindowCounters), SyncError>
    where
        G: PoseTransformGateway,
    {
        let (window, counters) = gateway
            .transform_path(plan, gateway.local_frame(), window_bound_m)
            .map_err(SyncError::TransformError)?;

        if window.is_empty() {
            return Err(SyncError::EmptyWindow);
        }

        Ok((window, counters))
    }

    /// Record the window a freshly reset band was built from.
    pub fn seed(&mut self, counters: WindowCounters) {
        self.counters = Some(counters);
    }

    /// Forget the current window.
    pub fn clear(&mut self) {
        self.counters = None;
    }

    /// Bring the band up to date with the robot's progress along `plan`, then optimise it.
    ///
    /// The stored counters only change when new poses are successfully appended, so a failure at
    /// any step leaves them as they were.
    pub fn sync<G, B>(
        &mut self,
        plan: &Path,
        gateway: &G,
        band: &mut B,
        window_bound_m: f64,
    ) -> Result<SyncReport, SyncError>
    where
        G: PoseTransformGateway,
        B: DeformableBand,
    {
        let prev = self.counters.ok_or(SyncError::NotSeeded)?;

        // Keep the band attached to the robot
        let robot = gateway
            .current_pose()
            .map_err(SyncError::TransformError)?;
        band.append_frames(&Path::from(vec![robot]), BandEnd::Front)
            .map_err(|e| {
                warn!("Could not connect the robot pose to the band");
                SyncError::RobotDiverged(e)
            })?;

        let (window, next) = gateway
            .transform_path(plan, gateway.local_frame(), window_bound_m)
            .map_err(SyncError::TransformError)?;

        if window.is_empty() {
            return Err(SyncError::EmptyWindow);
        }

        trace!(
            "Window [{}, {}) -> [{}, {})",
            prev.start,
            prev.end,
            next.start,
            next.end
        );

        let increment = window_increment(prev, next, window);
        let frames_appended = increment.len();

        if frames_appended > 0 {
            band.append_frames(&increment, BandEnd::Back)
                .map_err(SyncError::AppendFailed)?;
            self.counters = Some(next);

            debug!("Appended {} plan poses to the band", frames_appended);
        }

        band.optimize().map_err(SyncError::OptimisationFailed)?;

        Ok(SyncReport {
            window: next,
            frames_appended,
        })
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Select the poses of the new window which the band does not represent yet.
///
/// `window` holds the transformed poses of `next`. If the window has not advanced past `prev`
/// nothing is returned. If the two windows overlap, the poses already represented by `prev` are
/// skipped, otherwise the whole window is new.
pub fn window_increment(prev: WindowCounters, next: WindowCounters, window: Path) -> Path {
    if next.end <= prev.end {
        return Path::new_empty();
    }

    let skip = if next.start < prev.end {
        prev.end - next.start
    } else {
        0
    };

    window.into_iter().skip(skip).collect()
}
