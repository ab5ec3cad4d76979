//! `CollectMetrics`: close the step and schedule the next one.

use bevy_ecs::prelude::ResMut;
use tracing::{debug, info};

use crate::clock::SimulationClock;
use crate::error::SimError;
use crate::telemetry::SimTelemetry;

pub fn step_completed_system(
    mut clock: ResMut<SimulationClock>,
    mut telemetry: ResMut<SimTelemetry>,
) -> Result<(), SimError> {
    telemetry.steps_completed += 1;
    if clock.schedule_next_step() {
        debug!(day = clock.now(), steps = telemetry.steps_completed, "step completed");
    } else {
        info!(
            day = clock.now() + clock.step_days(),
            steps = telemetry.steps_completed,
            "simulation finished"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::World;
    use bevy_ecs::system::RunSystemOnce;

    use crate::clock::EventKind;

    #[test]
    fn collect_metrics_schedules_the_following_step() {
        let mut world = World::new();
        let mut clock = SimulationClock::new(2020, 2, 4);
        clock.schedule_at(0, EventKind::CollectMetrics);
        clock.pop_next();
        world.insert_resource(clock);
        world.insert_resource(SimTelemetry::default());

        world.run_system_once(step_completed_system).expect("step");
        assert_eq!(world.resource::<SimTelemetry>().steps_completed, 1);
        assert_eq!(world.resource::<SimulationClock>().next_event_time(), Some(2));

        world.resource_mut::<SimulationClock>().pop_next();
        world.run_system_once(step_completed_system).expect("step");
        let clock = world.resource::<SimulationClock>();
        assert_eq!(clock.next_event_time(), Some(2), "remaining phases of day 2 only");
    }
}
