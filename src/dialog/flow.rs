//! Flow definitions and the registry they live in

use super::effect::Effect;
use super::result::StepResult;
use super::sequencer::StepExecutionError;
use super::stack::{FlowId, FrameValues};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;

/// What a step asks the sequencer to do next
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Move to the next step and wait for the next inbound event
    Next,
    /// Move to the next step and run it now with this value
    Continue(StepResult),
    /// Stay on this step and wait (a prompt re-asking)
    Retry,
    /// Push a child flow; its result feeds this frame's next step
    BeginChild(FrameValues),
    /// Pop this frame, handing the value to the parent
    End(StepResult),
}

/// Signature every step implements
pub type StepFn = fn(&mut StepContext<'_>, StepResult) -> Result<StepOutcome, StepExecutionError>;

/// A named unit of flow logic
#[derive(Clone, Copy)]
pub struct Step {
    pub name: &'static str,
    pub run: StepFn,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// Ordered, immutable list of steps
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub id: FlowId,
    steps: Vec<Step>,
}

impl FlowDefinition {
    pub fn new(id: FlowId) -> Self {
        Self { id, steps: vec![] }
    }

    pub fn step(mut self, name: &'static str, run: StepFn) -> Self {
        self.steps.push(Step { name, run });
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// All flows known to the sequencer, fixed once built
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    flows: HashMap<FlowId, FlowDefinition>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the main flow and the three prompts
    pub fn standard() -> Self {
        Self::new()
            .with_flow(super::main_flow::definition())
            .with_flow(super::prompts::oauth_prompt())
            .with_flow(super::prompts::confirm_prompt())
            .with_flow(super::prompts::text_prompt())
    }

    pub fn with_flow(mut self, definition: FlowDefinition) -> Self {
        self.flows.insert(definition.id, definition);
        self
    }

    pub fn get(&self, id: FlowId) -> Option<&FlowDefinition> {
        self.flows.get(&id)
    }
}

/// Per-conversation configuration the steps read (immutable)
#[derive(Debug, Clone)]
pub struct DialogContext {
    pub conversation_id: String,
    /// OAuth connection configured on the token service
    pub connection_name: String,
    pub sign_in_timeout: TimeDelta,
}

/// Default interactive sign-in window
pub const DEFAULT_SIGN_IN_TIMEOUT_SECS: i64 = 300;

impl DialogContext {
    pub fn new(conversation_id: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            connection_name: connection_name.into(),
            sign_in_timeout: TimeDelta::seconds(DEFAULT_SIGN_IN_TIMEOUT_SECS),
        }
    }

    pub fn with_sign_in_timeout(mut self, timeout: TimeDelta) -> Self {
        self.sign_in_timeout = timeout;
        self
    }
}

/// What a running step can see and touch
pub struct StepContext<'a> {
    context: &'a DialogContext,
    now: DateTime<Utc>,
    flow: FlowId,
    step: &'static str,
    values: &'a mut FrameValues,
    effects: &'a mut Vec<Effect>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        context: &'a DialogContext,
        now: DateTime<Utc>,
        flow: FlowId,
        step: &'static str,
        values: &'a mut FrameValues,
        effects: &'a mut Vec<Effect>,
    ) -> Self {
        Self {
            context,
            now,
            flow,
            step,
            values,
            effects,
        }
    }

    pub fn context(&self) -> &DialogContext {
        self.context
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn step_name(&self) -> &'static str {
        self.step
    }

    pub fn values(&self) -> &FrameValues {
        self.values
    }

    pub fn values_mut(&mut self) -> &mut FrameValues {
        self.values
    }

    pub fn emit(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn send(&mut self, text: impl Into<String>) {
        self.emit(Effect::send_text(text));
    }

    /// Error for values that belong to another flow
    pub fn mismatch(&self) -> StepExecutionError {
        StepExecutionError::FrameMismatch {
            flow: self.flow,
            found: self.values.flow(),
        }
    }

    /// Error for an input kind this step cannot consume
    pub fn unexpected(&self, input: &StepResult) -> StepExecutionError {
        StepExecutionError::UnexpectedInput {
            step: self.step,
            kind: input.kind(),
        }
    }
}
