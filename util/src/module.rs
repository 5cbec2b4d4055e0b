//! Cyclic module interface
//!
//! Modules driven once per control cycle (currently the local planner) implement [`State`], so
//! that an executable initialises and steps each of them the same way.

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A module stepped once per control cycle.
pub trait State {
    /// Passed to [`State::init`], usually the name of the module's parameter file.
    type InitData;
    type InitError;

    /// Inputs gathered for the module at the start of a cycle.
    type InputData;
    /// The module's product for the cycle.
    type OutputData;
    /// Monitoring information about the cycle.
    type StatusReport;
    type ProcError;

    /// Load parameters and bring the module into its initial state.
    ///
    /// May be called again to reinitialise the module.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError>;

    /// Run one cycle.
    ///
    /// An error only means no output for this cycle, the module must be able to carry on with
    /// the next call.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
