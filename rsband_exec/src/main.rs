//! Scenario replay executable.
//!
//! Drives the local planner through a scripted scenario, using the stand-in collaborators from
//! `rsband_lib::sim` in place of the real transform service, band optimiser, nonholonomic planner
//! and tracking controller.
//!
//! # Usage
//!
//! ```text
//! rsband_exec <scenario.toml>
//! ```
//!
//! # Architecture
//!
//!     - Initialise the session, logging and the local planner
//!     - Accept the scenario's global plan
//!     - Main loop, one cycle per scripted robot pose:
//!         - Deliver any reconfiguration requests scheduled for the cycle
//!         - Local planner processing
//!         - Save the cycle's local plan and report to the session
//!
//! The loop ends when the goal is reached or the scripted robot poses run out.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use rsband_lib::{
    local_planner::{InputData, LocalPlanner, LocalPlannerMode},
    sim::Scenario,
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.10;

/// Parameter file of the local planner, relative to the parameters directory.
const LOCAL_PLANNER_PARAMS: &str = "local_planner.toml";

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let scenario_path = env::args()
        .nth(1)
        .ok_or_else(|| eyre!("Expected the path to a scenario file as the first argument"))?;

    // Initialise session
    let session = Session::new("rsband_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("RS-band Local Planner Scenario Replay\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD SCENARIO ----

    let scenario = Scenario::load(&scenario_path)
        .wrap_err_with(|| format!("Could not load scenario {}", scenario_path))?;

    info!(
        "Loaded scenario {} ({} plan poses, {} robot poses)",
        scenario_path,
        scenario.plan.len(),
        scenario.robot_poses.len()
    );

    // ---- INITIALISE LOCAL PLANNER ----

    let stamp = Utc::now();
    let (gateway, band, planner, tracker) = scenario.collaborators(stamp);

    let mut local_planner = LocalPlanner::new(gateway, band, planner, tracker);
    local_planner
        .init(LOCAL_PLANNER_PARAMS)
        .wrap_err("Failed to initialise the local planner")?;

    info!("Local planner initialised");

    // The plan is delivered with the first cycle
    let mut input = InputData {
        new_plan: Some(scenario.global_plan(stamp)),
    };

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut cycle = 0;
    let mut num_failed_cycles = 0;

    loop {
        let cycle_start_instant = Instant::now();

        for update in scenario.reconfigure_at(cycle) {
            if let Some(config) = local_planner.config() {
                // Rejected updates are logged by the handle and leave the snapshot unchanged
                config.apply(update).ok();
            }
        }

        match local_planner.proc(&input) {
            Ok((cmd, report)) => {
                info!(
                    "[{:.2}] Cycle {}: cmd ({:.3}, {:.3}, {:.3}), fail index {:?}, local plan {} poses",
                    session::get_elapsed_seconds(),
                    cycle,
                    cmd.linear_x_ms,
                    cmd.linear_y_ms,
                    cmd.angular_z_rads,
                    report.fail_index,
                    report.merged_len
                );

                session.save(format!("cycles/{:04}_report.json", cycle), report);
                if let Some(plan) = local_planner.last_local_plan() {
                    session.save(format!("cycles/{:04}_local_plan.json", cycle), plan.clone());
                }
            }
            Err(e) => {
                warn!("Cycle {} produced no command: {}", cycle, e);
                num_failed_cycles += 1;
            }
        }

        // Only deliver the plan once
        input.new_plan = None;

        if local_planner.mode() == LocalPlannerMode::GoalReached {
            info!("Goal reached after {} cycles", cycle + 1);
            break;
        }
        if local_planner.mode() == LocalPlannerMode::Failed {
            warn!("The plan was rejected, stopping");
            break;
        }

        cycle += 1;
        if !local_planner.gateway_mut().advance() {
            warn!("Scripted robot poses exhausted before reaching the goal");
            break;
        }

        // Sleep until the end of the cycle
        let cycle_dur = Instant::now() - cycle_start_instant;
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
            ),
        }
    }

    info!("{} of {} cycles produced no command", num_failed_cycles, cycle + 1);

    session.exit();

    Ok(())
}
