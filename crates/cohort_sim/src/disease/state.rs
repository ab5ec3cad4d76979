use crate::error::WiringError;
use crate::scenario::{DiseaseKind, DiseaseSpec};

pub const INCIDENCE_RATE: &str = "incidence_rate";
pub const REMISSION_RATE: &str = "remission_rate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Susceptible,
    WithCondition,
    Recovered,
}

/// What moves a simulant out of a state.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Hazard read from the `<cause>.<measure>` pipeline, converted with `1 - exp(-rate * dt)`.
    Rate { measure: String },
    /// Leaves exactly `duration_days` after entering the state.
    Dwell { duration_days: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Position of the destination in [DiseaseDefinition::states].
    pub to: usize,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseState {
    pub kind: StateKind,
    pub name: String,
    pub transitions: Vec<Transition>,
}

impl DiseaseState {
    fn new(kind: StateKind, name: String) -> Self {
        Self {
            kind,
            name,
            transitions: Vec::new(),
        }
    }

    /// Column holding the time the simulant last entered this state.
    pub fn event_time_column(&self) -> String {
        format!("{}_event_time", self.name)
    }
}

/// States and transitions of one cause. The first state is the susceptible state every
/// newborn starts in unless drawn into the condition at birth.
#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseDefinition {
    pub cause: String,
    pub states: Vec<DiseaseState>,
}

impl DiseaseDefinition {
    pub fn with_states(cause: &str, kinds: &[StateKind]) -> Self {
        let states = kinds
            .iter()
            .map(|&kind| DiseaseState::new(kind, state_name(cause, kind)))
            .collect();
        Self {
            cause: cause.to_string(),
            states,
        }
    }

    /// Adds a transition between two states the model already has.
    pub fn transition(
        mut self,
        from: StateKind,
        to: StateKind,
        trigger: Trigger,
    ) -> Result<Self, WiringError> {
        match (self.position_of(from), self.position_of(to)) {
            (Some(from), Some(to)) => {
                self.states[from].transitions.push(Transition { to, trigger });
                Ok(self)
            }
            (None, _) => Err(self.unknown_state(from)),
            (_, None) => Err(self.unknown_state(to)),
        }
    }

    fn position_of(&self, kind: StateKind) -> Option<usize> {
        self.states.iter().position(|s| s.kind == kind)
    }

    fn unknown_state(&self, kind: StateKind) -> WiringError {
        WiringError::UnknownDiseaseState {
            cause: self.cause.clone(),
            state: state_name(&self.cause, kind),
        }
    }

    pub fn state(&self, kind: StateKind) -> Option<&DiseaseState> {
        self.states.iter().find(|s| s.kind == kind)
    }

    pub fn susceptible(&self) -> &DiseaseState {
        &self.states[0]
    }

    pub fn state_names(&self) -> Vec<String> {
        self.states.iter().map(|s| s.name.clone()).collect()
    }

    /// Measures of every rate-driven transition, without duplicates.
    pub fn rate_measures(&self) -> Vec<String> {
        let mut measures: Vec<String> = Vec::new();
        for transition in self.states.iter().flat_map(|s| &s.transitions) {
            if let Trigger::Rate { measure } = &transition.trigger {
                if !measures.contains(measure) {
                    measures.push(measure.clone());
                }
            }
        }
        measures
    }
}

pub fn state_name(cause: &str, kind: StateKind) -> String {
    match kind {
        StateKind::Susceptible => format!("susceptible_to_{cause}"),
        StateKind::WithCondition => cause.to_string(),
        StateKind::Recovered => format!("recovered_from_{cause}"),
    }
}

fn rate(measure: &str) -> Trigger {
    Trigger::Rate {
        measure: measure.to_string(),
    }
}

const SI: [StateKind; 2] = [StateKind::Susceptible, StateKind::WithCondition];
const SIR: [StateKind; 3] = [
    StateKind::Susceptible,
    StateKind::WithCondition,
    StateKind::Recovered,
];

/// Susceptible to infected, with no way back.
pub fn si(cause: &str) -> Result<DiseaseDefinition, WiringError> {
    DiseaseDefinition::with_states(cause, &SI).transition(
        StateKind::Susceptible,
        StateKind::WithCondition,
        rate(INCIDENCE_RATE),
    )
}

pub fn sis(cause: &str) -> Result<DiseaseDefinition, WiringError> {
    si(cause)?.transition(
        StateKind::WithCondition,
        StateKind::Susceptible,
        rate(REMISSION_RATE),
    )
}

pub fn sir(cause: &str) -> Result<DiseaseDefinition, WiringError> {
    DiseaseDefinition::with_states(cause, &SIR)
        .transition(StateKind::Susceptible, StateKind::WithCondition, rate(INCIDENCE_RATE))?
        .transition(StateKind::WithCondition, StateKind::Recovered, rate(REMISSION_RATE))
}

/// SIS where the condition always lasts `duration_days`.
pub fn sis_fixed_duration(cause: &str, duration_days: f64) -> Result<DiseaseDefinition, WiringError> {
    si(cause)?.transition(
        StateKind::WithCondition,
        StateKind::Susceptible,
        Trigger::Dwell { duration_days },
    )
}

/// SIR where the condition always lasts `duration_days`.
pub fn sir_fixed_duration(cause: &str, duration_days: f64) -> Result<DiseaseDefinition, WiringError> {
    DiseaseDefinition::with_states(cause, &SIR)
        .transition(StateKind::Susceptible, StateKind::WithCondition, rate(INCIDENCE_RATE))?
        .transition(
            StateKind::WithCondition,
            StateKind::Recovered,
            Trigger::Dwell { duration_days },
        )
}

pub fn disease_definition(spec: &DiseaseSpec) -> Result<DiseaseDefinition, WiringError> {
    match spec.model {
        DiseaseKind::Si => si(&spec.cause),
        DiseaseKind::Sis => sis(&spec.cause),
        DiseaseKind::Sir => sir(&spec.cause),
        DiseaseKind::SisFixedDuration { duration_days } => {
            sis_fixed_duration(&spec.cause, duration_days)
        }
        DiseaseKind::SirFixedDuration { duration_days } => {
            sir_fixed_duration(&spec.cause, duration_days)
        }
    }
}
