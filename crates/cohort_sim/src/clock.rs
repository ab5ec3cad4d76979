use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::Resource;

/// Days per year used to convert step sizes into rate time units.
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Phases of the simulation. Phases sharing a timestamp pop in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    SimulationStarted,
    TimeStepPrepare,
    TimeStep,
    TimeStepCleanup,
    CollectMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by (timestamp, kind).
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.kind.cmp(&self.kind))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being processed by the schedule.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Time as seen by pipelines and systems during one phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimTime {
    /// Start of the current step, in simulation days.
    pub now: f64,
    /// End of the current step, in simulation days. Events in this step are stamped with it.
    pub event_time: f64,
    /// Fractional calendar year at the start of the step.
    pub year: f64,
    /// Step size in years.
    pub step_years: f64,
}

/// Fixed-step clock. Time is counted in whole simulation days from the start of the run.
#[derive(Debug, Resource)]
pub struct SimulationClock {
    now: u64,
    step_days: u64,
    end_day: u64,
    start_year: i32,
    events: BinaryHeap<Event>,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(2019, 1, 365)
    }
}

impl SimulationClock {
    pub fn new(start_year: i32, step_days: u64, duration_days: u64) -> Self {
        Self {
            now: 0,
            step_days: step_days.max(1),
            end_day: duration_days,
            start_year,
            events: BinaryHeap::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn step_days(&self) -> u64 {
        self.step_days
    }

    pub fn end_day(&self) -> u64 {
        self.end_day
    }

    pub fn step_years(&self) -> f64 {
        self.step_days as f64 / DAYS_PER_YEAR
    }

    pub fn sim_time(&self) -> SimTime {
        let now = self.now as f64;
        SimTime {
            now,
            event_time: now + self.step_days as f64,
            year: self.start_year as f64 + now / DAYS_PER_YEAR,
            step_years: self.step_years(),
        }
    }

    pub fn schedule(&mut self, event: Event) {
        debug_assert!(
            event.timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        self.events.push(event);
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind) {
        self.schedule(Event { timestamp, kind });
    }

    /// Schedules the four phases of the step starting at `day`.
    pub fn schedule_step(&mut self, day: u64) {
        for kind in [
            EventKind::TimeStepPrepare,
            EventKind::TimeStep,
            EventKind::TimeStepCleanup,
            EventKind::CollectMetrics,
        ] {
            self.schedule_at(day, kind);
        }
    }

    /// Schedules the step after the current one if it starts before the end of the run.
    /// Returns whether a step was scheduled.
    pub fn schedule_next_step(&mut self) -> bool {
        let next = self.now + self.step_days;
        if next < self.end_day {
            self.schedule_step(next);
            true
        } else {
            false
        }
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|e| e.timestamp)
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
