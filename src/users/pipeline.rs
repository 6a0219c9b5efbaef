//! Ordered pre-processing stages run before routing
//!
//! The host invokes the pipeline synchronously for each event before
//! dispatching it. Stages run in registration order. A stage that declines to
//! bind a user does not stop later stages; a stage error aborts processing of
//! that event only.

use super::error::Result;
use super::event::Event;

/// What a stage did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage bound a user to the event
    Bound,
    /// The stage had nothing to do for this event
    Declined,
}

/// One pre-processing step
pub trait Stage: Send + Sync {
    /// Stage name for logs
    fn name(&self) -> &str;

    /// Inspect and possibly enrich the event
    fn process(&self, event: &mut Event) -> Result<StageOutcome>;
}

/// Ordered list of stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// An empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// Stage names in run order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage over the event, in order
    pub fn run(&self, event: &mut Event) -> Result<Vec<StageOutcome>> {
        let mut outcomes = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let outcome = stage.process(event).inspect_err(|e| {
                tracing::warn!(event = %event.id(), stage = stage.name(), error = %e, "stage failed");
            })?;
            tracing::debug!(event = %event.id(), stage = stage.name(), ?outcome, "stage finished");
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
