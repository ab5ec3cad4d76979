//! ECS systems, one module per simulation phase.
//!
//! Every system returns `Result<(), SimError>` and is piped into [record_fault]. Once a fault is
//! recorded the remaining systems of the phase are skipped and the runner stops.

use bevy_ecs::prelude::{In, Res, ResMut, Resource};
use tracing::error;

use crate::clock::{CurrentEvent, EventKind};
use crate::error::SimError;

pub mod cleanup;
pub mod collect_metrics;
pub mod initialize;
pub mod prepare;
pub mod time_step;

pub use initialize::NewCohort;

/// First error raised by a system during the current run.
#[derive(Debug, Default, Resource)]
pub struct SimulationFault(pub Option<SimError>);

impl SimulationFault {
    pub fn take(&mut self) -> Option<SimError> {
        self.0.take()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

/// Stores the first error a system returns. Later errors are logged and dropped.
pub fn record_fault(In(result): In<Result<(), SimError>>, mut fault: ResMut<SimulationFault>) {
    if let Err(err) = result {
        if fault.0.is_none() {
            error!(error = %err, "simulation step failed");
            fault.0 = Some(err);
        } else {
            error!(error = %err, "additional failure after the first fault");
        }
    }
}

pub fn no_fault(fault: Option<Res<SimulationFault>>) -> bool {
    fault.map(|f| !f.is_set()).unwrap_or(true)
}

fn is_phase(event: Option<Res<CurrentEvent>>, kind: EventKind) -> bool {
    event.map(|e| e.0.kind == kind).unwrap_or(false)
}

pub fn is_simulation_started(event: Option<Res<CurrentEvent>>) -> bool {
    is_phase(event, EventKind::SimulationStarted)
}

pub fn is_time_step_prepare(event: Option<Res<CurrentEvent>>) -> bool {
    is_phase(event, EventKind::TimeStepPrepare)
}

pub fn is_time_step(event: Option<Res<CurrentEvent>>) -> bool {
    is_phase(event, EventKind::TimeStep)
}

pub fn is_time_step_cleanup(event: Option<Res<CurrentEvent>>) -> bool {
    is_phase(event, EventKind::TimeStepCleanup)
}

pub fn is_collect_metrics(event: Option<Res<CurrentEvent>>) -> bool {
    is_phase(event, EventKind::CollectMetrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{IntoSystem, IntoSystemConfigs, Schedule, World};
    use bevy_ecs::system::RunSystemOnce;

    use crate::error::ConfigError;

    fn fail() -> Result<(), SimError> {
        Err(ConfigError::InvalidParameter {
            name: "population_size",
            reason: "test".to_string(),
        }
        .into())
    }

    fn fail_again() -> Result<(), SimError> {
        Err(ConfigError::InvalidParameter {
            name: "step_days",
            reason: "test".to_string(),
        }
        .into())
    }

    #[test]
    fn first_fault_wins() {
        let mut world = World::new();
        world.insert_resource(SimulationFault::default());
        let mut schedule = Schedule::default();
        schedule.add_systems((fail.pipe(record_fault), fail_again.pipe(record_fault)).chain());
        schedule.run(&mut world);

        let fault = world.resource_mut::<SimulationFault>().take().expect("fault");
        assert!(
            matches!(fault, SimError::Config(ConfigError::InvalidParameter { name, .. }) if name == "population_size"),
            "{fault:?}"
        );
    }

    #[test]
    fn missing_fault_resource_counts_as_healthy() {
        let mut world = World::new();
        assert!(world.run_system_once(no_fault));
        world.insert_resource(SimulationFault(Some(fail().unwrap_err())));
        assert!(!world.run_system_once(no_fault));
    }
}
