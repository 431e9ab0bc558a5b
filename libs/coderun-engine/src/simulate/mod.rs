//! Local Simulation Fallback
//!
//! Best-effort approximations used only when no remote endpoint answered.
//! Every result produced here is tagged `is_simulated` so downstream graders
//! can tell it apart from a real run.
//!
//! The Python and C++ passes are single linear scans. JavaScript runs in an
//! embedded V8 isolate bounded by a wall-clock deadline and a heap limit.

pub mod cpp;
pub mod javascript;
pub mod python;

use coderun_common::{ExecutionResult, LanguageSpec, SimulatorKind};
use std::thread;

/// Stack for the simulation thread; must stay well above V8's own stack limit
const SIMULATION_STACK_BYTES: usize = 16 * 1024 * 1024;

/// Output of one simulator run before it is tagged and timed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOutput {
    pub output: String,
    pub error: Option<String>,
}

impl SimulationOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: Some(error.into()),
        }
    }

    fn into_result(self) -> ExecutionResult {
        match self.error {
            None => ExecutionResult::succeeded(self.output),
            Some(error) => ExecutionResult::failed(self.output, error),
        }
    }
}

pub fn unavailable_message(language: &str) -> String {
    format!(
        "Code execution service is unavailable and {} cannot be simulated locally",
        language
    )
}

/// Run the simulator registered for `spec`, if any
///
/// Never panics into the caller: the simulator runs on its own thread and a
/// crash there becomes a failed result.
pub fn simulate(spec: &LanguageSpec, code: &str, stdin: &str) -> ExecutionResult {
    let Some(kind) = spec.simulator else {
        tracing::info!(language = %spec.id, "No local simulator for language");
        return ExecutionResult::failed("", unavailable_message(&spec.id)).simulated();
    };

    tracing::info!(language = %spec.id, simulator = %kind, "Running local simulation");

    let code = code.to_string();
    let stdin = stdin.to_string();
    let handle = thread::Builder::new()
        .name(format!("simulate-{}", kind))
        .stack_size(SIMULATION_STACK_BYTES)
        .spawn(move || run_simulator(kind, &code, &stdin));

    let output = match handle {
        Ok(handle) => match handle.join() {
            Ok(output) => output,
            Err(_) => {
                tracing::error!(simulator = %kind, "Simulator crashed");
                SimulationOutput::failed("", "Simulation failed: internal evaluator error")
            }
        },
        Err(e) => {
            tracing::error!(simulator = %kind, error = %e, "Failed to start simulator thread");
            SimulationOutput::failed("", format!("Simulation failed: {}", e))
        }
    };

    output.into_result().simulated()
}

pub fn run_simulator(kind: SimulatorKind, code: &str, stdin: &str) -> SimulationOutput {
    match kind {
        SimulatorKind::Javascript => javascript::run(code),
        SimulatorKind::Python => python::run(code, stdin),
        SimulatorKind::Cpp => cpp::run(code),
    }
}
