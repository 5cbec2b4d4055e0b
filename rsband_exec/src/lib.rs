//! # RS-band local planner library.
//!
//! This library holds the local planner and the interfaces of the services it depends on, so
//! that executables and integration tests in the workspace can drive it.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Deformable band interface - the obstacle avoiding path maintained by the band optimiser
pub mod band;

/// Localisation module - robot pose and frame transform lookups
pub mod loc;

/// Local planner module - turns the global plan and the band into a drivable local plan
pub mod local_planner;

/// Path type shared by the global plan, the band and local plans
pub mod path;

/// Scripted stand-ins for the services the local planner depends on
pub mod sim;

/// Trajectory control interface - turns the local plan into a velocity command
pub mod traj_ctrl;
