#![allow(dead_code)]

use bevy_ecs::prelude::World;
use bevy_ecs::schedule::Schedule;
use cohort_sim::clock::{EventKind, SimulationClock};
use cohort_sim::runner::{run_next_event, run_until_empty, simulation_schedule};

/// Helper that owns a reusable `Schedule` so tests can step or drain the event queue.
pub struct ScheduleRunner {
    schedule: Schedule,
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRunner {
    /// Create a runner with the default simulation schedule.
    pub fn new() -> Self {
        Self {
            schedule: simulation_schedule(),
        }
    }

    /// Run a single event (returns `true` if an event was processed).
    pub fn run_one(&mut self, world: &mut World) -> bool {
        run_next_event(world, &mut self.schedule).expect("event should run")
    }

    /// Run events until the next one would be `kind` (or the queue empties), then run it too.
    pub fn run_through(&mut self, world: &mut World, kind: EventKind) -> bool {
        loop {
            let next = world.resource::<SimulationClock>().next_event_time();
            if next.is_none() {
                return false;
            }
            let current = {
                let processed = self.run_one(world);
                if !processed {
                    return false;
                }
                world
                    .get_resource::<cohort_sim::clock::CurrentEvent>()
                    .map(|e| e.0.kind)
            };
            if current == Some(kind) {
                return true;
            }
        }
    }

    /// Run multiple events up to `max_events`, returning the number of events executed.
    pub fn run_until_empty(&mut self, world: &mut World, max_events: usize) -> usize {
        run_until_empty(world, &mut self.schedule, max_events).expect("run should succeed")
    }

    /// Drive the simulation until the event queue is empty.
    pub fn run_full(&mut self, world: &mut World) -> usize {
        self.run_until_empty(world, usize::MAX)
    }
}
