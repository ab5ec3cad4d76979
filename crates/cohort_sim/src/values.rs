//! Value pipelines: named, uncached computations over simulant subsets.
//!
//! A pipeline is a source, an ordered list of modifiers folded through a combiner, and an
//! optional post-processor. Components register producers and modifiers on a [ValuesBuilder]
//! while they are wired; names are resolved to [ValueHandle]s immediately and
//! [ValuesBuilder::finalize] rejects any handle that never got a producer.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bevy_ecs::prelude::Resource;

use crate::clock::SimTime;
use crate::error::{PipelineError, WiringError};
use crate::population::{PopulationTable, SimulantId};
use crate::telemetry::SimTelemetry;

/// Everything a pipeline may read while it is evaluated.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub population: &'a PopulationTable,
    pub values: &'a ValueRegistry,
    pub time: SimTime,
    pub telemetry: &'a SimTelemetry,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        population: &'a PopulationTable,
        values: &'a ValueRegistry,
        time: SimTime,
        telemetry: &'a SimTelemetry,
    ) -> Self {
        Self {
            population,
            values,
            time,
            telemetry,
        }
    }
}

/// Named float columns of equal length, in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueFrame {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ValueFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Self {
        self.push(name, values);
        self
    }

    /// Appends a column, replacing any column with the same name in place.
    pub fn push(&mut self, name: &str, values: Vec<f64>) {
        match self.names.iter().position(|n| n == name) {
            Some(pos) => self.columns[pos] = values,
            None => {
                self.names.push(name.to_string());
                self.columns.push(values);
            }
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Result<&[f64], PipelineError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|pos| self.columns[pos].as_slice())
            .ok_or_else(|| PipelineError::MissingFrameColumn(name.to_string()))
    }

    pub fn column_mut(&mut self, name: &str) -> Result<&mut Vec<f64>, PipelineError> {
        match self.names.iter().position(|n| n == name) {
            Some(pos) => Ok(&mut self.columns[pos]),
            None => Err(PipelineError::MissingFrameColumn(name.to_string())),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .zip(&self.columns)
            .map(|(n, c)| (n.as_str(), c.as_slice()))
    }

    /// Number of rows (simulants).
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of row `i` across all columns, in column order.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }

    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.len()];
        for column in &self.columns {
            for (s, v) in sums.iter_mut().zip(column) {
                *s += v;
            }
        }
        sums
    }
}

/// Output of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Scalar(Vec<f64>),
    Frame(ValueFrame),
    Categories(Vec<String>),
    /// Unreduced list-combiner output, one vector per contribution.
    Contributions(Vec<Vec<f64>>),
    Metrics(BTreeMap<String, f64>),
}

impl Signal {
    fn kind(&self) -> &'static str {
        match self {
            Signal::Scalar(_) => "scalar",
            Signal::Frame(_) => "frame",
            Signal::Categories(_) => "categories",
            Signal::Contributions(_) => "contributions",
            Signal::Metrics(_) => "metrics",
        }
    }

    fn unexpected(&self, name: &str, expected: &'static str) -> PipelineError {
        PipelineError::UnexpectedSignal {
            name: name.to_string(),
            expected,
            actual: self.kind(),
        }
    }

    pub fn into_scalar(self, name: &str) -> Result<Vec<f64>, PipelineError> {
        match self {
            Signal::Scalar(v) => Ok(v),
            other => Err(other.unexpected(name, "scalar")),
        }
    }

    pub fn into_frame(self, name: &str) -> Result<ValueFrame, PipelineError> {
        match self {
            Signal::Frame(f) => Ok(f),
            other => Err(other.unexpected(name, "frame")),
        }
    }

    pub fn into_categories(self, name: &str) -> Result<Vec<String>, PipelineError> {
        match self {
            Signal::Categories(c) => Ok(c),
            other => Err(other.unexpected(name, "categories")),
        }
    }

    pub fn into_contributions(self, name: &str) -> Result<Vec<Vec<f64>>, PipelineError> {
        match self {
            Signal::Contributions(c) => Ok(c),
            Signal::Scalar(v) => Ok(vec![v]),
            other => Err(other.unexpected(name, "contributions")),
        }
    }

    pub fn into_metrics(self, name: &str) -> Result<BTreeMap<String, f64>, PipelineError> {
        match self {
            Signal::Metrics(m) => Ok(m),
            other => Err(other.unexpected(name, "metrics")),
        }
    }
}

pub type Source =
    Box<dyn Fn(&PipelineContext<'_>, &[SimulantId]) -> Result<Signal, PipelineError> + Send + Sync>;
pub type Modifier = Box<
    dyn Fn(&PipelineContext<'_>, &[SimulantId], Signal) -> Result<Signal, PipelineError>
        + Send
        + Sync,
>;
pub type PostProcessor = Modifier;

/// How modifiers are folded into the source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combiner {
    /// Each modifier receives the running value and returns its replacement.
    #[default]
    Replace,
    /// Each modifier receives the source value and its output is appended to a list.
    List,
}

/// Producer definition passed to [ValuesBuilder::register_value_producer].
pub struct ValueProducer {
    source: Source,
    combiner: Combiner,
    post_processor: Option<PostProcessor>,
    modifiers: Vec<Modifier>,
}

impl ValueProducer {
    pub fn new<F>(source: F) -> Self
    where
        F: Fn(&PipelineContext<'_>, &[SimulantId]) -> Result<Signal, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            source: Box::new(source),
            combiner: Combiner::Replace,
            post_processor: None,
            modifiers: Vec::new(),
        }
    }

    /// A producer whose source is zero for every simulant.
    pub fn zeros() -> Self {
        Self::new(|_, index| Ok(Signal::Scalar(vec![0.0; index.len()])))
    }

    pub fn combiner(mut self, combiner: Combiner) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn post_processor<F>(mut self, post: F) -> Self
    where
        F: Fn(&PipelineContext<'_>, &[SimulantId], Signal) -> Result<Signal, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        self.post_processor = Some(Box::new(post));
        self
    }

    pub fn modifier<F>(mut self, modifier: F) -> Self
    where
        F: Fn(&PipelineContext<'_>, &[SimulantId], Signal) -> Result<Signal, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        self.modifiers.push(Box::new(modifier));
        self
    }

    /// List combiner with the `1 - prod(1 - x)` post-processor, for attributable fractions
    /// and other independent multiplicative contributions.
    pub fn union_of_contributions() -> Self {
        Self::zeros()
            .combiner(Combiner::List)
            .post_processor(union_post_processor)
    }
}

/// Reduces a list of contributions `x_i` to `1 - prod(1 - x_i)`.
pub fn union_post_processor(
    _ctx: &PipelineContext<'_>,
    index: &[SimulantId],
    value: Signal,
) -> Result<Signal, PipelineError> {
    let parts = value.into_contributions("union")?;
    let mut keep = vec![1.0; index.len()];
    for part in parts {
        for (k, x) in keep.iter_mut().zip(part) {
            *k *= 1.0 - x;
        }
    }
    Ok(Signal::Scalar(keep.into_iter().map(|k| 1.0 - k).collect()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueHandle(usize);

struct Slot {
    name: String,
    producer: Option<ValueProducer>,
    modifiers: Vec<Modifier>,
}

/// Wiring-time pipeline registry.
#[derive(Default)]
pub struct ValuesBuilder {
    slots: Vec<Slot>,
    by_name: HashMap<String, usize>,
}

impl ValuesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&pos) = self.by_name.get(name) {
            return pos;
        }
        self.slots.push(Slot {
            name: name.to_string(),
            producer: None,
            modifiers: Vec::new(),
        });
        let pos = self.slots.len() - 1;
        self.by_name.insert(name.to_string(), pos);
        pos
    }

    pub fn register_value_producer(
        &mut self,
        name: &str,
        producer: ValueProducer,
    ) -> Result<ValueHandle, WiringError> {
        let pos = self.slot(name);
        let slot = &mut self.slots[pos];
        if slot.producer.is_some() {
            return Err(WiringError::DuplicateProducer {
                name: name.to_string(),
            });
        }
        slot.producer = Some(producer);
        Ok(ValueHandle(pos))
    }

    /// Appends a modifier. Modifiers run in registration order, after any supplied with the
    /// producer itself.
    pub fn register_value_modifier<F>(&mut self, name: &str, modifier: F) -> ValueHandle
    where
        F: Fn(&PipelineContext<'_>, &[SimulantId], Signal) -> Result<Signal, PipelineError>
            + Send
            + Sync
            + 'static,
    {
        let pos = self.slot(name);
        self.slots[pos].modifiers.push(Box::new(modifier));
        ValueHandle(pos)
    }

    /// Resolves a pipeline name. The producer may be registered later.
    pub fn get_value(&mut self, name: &str) -> ValueHandle {
        ValueHandle(self.slot(name))
    }

    pub fn finalize(self) -> Result<ValueRegistry, WiringError> {
        let mut pipelines = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            let Some(mut producer) = slot.producer else {
                return Err(WiringError::MissingProducer { name: slot.name });
            };
            producer.modifiers.extend(slot.modifiers);
            pipelines.push(Pipeline {
                name: slot.name,
                producer,
            });
        }
        Ok(ValueRegistry {
            pipelines,
            by_name: self.by_name,
        })
    }
}

struct Pipeline {
    name: String,
    producer: ValueProducer,
}

/// Resolved pipelines, shared read-only by every system.
#[derive(Resource)]
pub struct ValueRegistry {
    pipelines: Vec<Pipeline>,
    by_name: HashMap<String, usize>,
}

impl fmt::Debug for ValueRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRegistry")
            .field(
                "pipelines",
                &self.pipelines.iter().map(|p| &p.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ValueRegistry {
    pub fn handle(&self, name: &str) -> Option<ValueHandle> {
        self.by_name.get(name).copied().map(ValueHandle)
    }

    pub fn name(&self, handle: ValueHandle) -> &str {
        &self.pipelines[handle.0].name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(|p| p.name.as_str())
    }

    /// Source, modifiers, then post-processor.
    pub fn call(
        &self,
        handle: ValueHandle,
        ctx: &PipelineContext<'_>,
        index: &[SimulantId],
    ) -> Result<Signal, PipelineError> {
        self.evaluate(handle, ctx, index, true)
    }

    /// Like [Self::call] but skips the post-processor and returns the raw signal.
    pub fn call_raw(
        &self,
        handle: ValueHandle,
        ctx: &PipelineContext<'_>,
        index: &[SimulantId],
    ) -> Result<Signal, PipelineError> {
        self.evaluate(handle, ctx, index, false)
    }

    fn evaluate(
        &self,
        handle: ValueHandle,
        ctx: &PipelineContext<'_>,
        index: &[SimulantId],
        post_process: bool,
    ) -> Result<Signal, PipelineError> {
        let pipeline = &self.pipelines[handle.0];
        let producer = &pipeline.producer;
        let source = (producer.source)(ctx, index)?;
        let value = match producer.combiner {
            Combiner::Replace => {
                let mut value = source;
                for modifier in &producer.modifiers {
                    value = modifier(ctx, index, value)?;
                }
                value
            }
            Combiner::List => {
                let mut parts = source.clone().into_contributions(&pipeline.name)?;
                for modifier in &producer.modifiers {
                    parts.push(modifier(ctx, index, source.clone())?.into_scalar(&pipeline.name)?);
                }
                Signal::Contributions(parts)
            }
        };
        match (&producer.post_processor, post_process) {
            (Some(post), true) => post(ctx, index, value),
            _ => Ok(value),
        }
    }
}
