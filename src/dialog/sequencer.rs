//! Step sequencer
//!
//! Pure interpreter over the dialog stack: given the persisted stack and one
//! input, run steps until the flow suspends or completes. No I/O happens here;
//! steps describe side effects which the runtime executes afterwards. The input
//! stack is never modified, so a failed turn leaves the caller holding the
//! pre-turn state and replaying the same input re-runs the same step.

use super::effect::Effect;
use super::flow::{DialogContext, FlowRegistry, StepContext, StepOutcome};
use super::result::StepResult;
use super::stack::{DialogStack, FlowId, FrameValues, StackFrame};
use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// Upper bound on step invocations within one turn
pub const MAX_STEPS_PER_TURN: usize = 32;

/// Where the flow stands after a turn
#[derive(Debug, Clone, PartialEq)]
pub enum FlowStatus {
    /// Waiting for the next inbound event; the stack must be saved
    Suspended,
    /// Last frame popped; the conversation's dialog state must be cleared
    Completed(StepResult),
}

/// One mutation applied to the stack during a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTransition {
    Pushed { flow: FlowId },
    Popped { flow: FlowId },
    Advanced { flow: FlowId, step_index: usize },
    Retried { flow: FlowId, step_index: usize },
}

/// Result of advancing the stack
#[derive(Debug)]
pub struct Advance {
    pub stack: DialogStack,
    pub status: FlowStatus,
    pub effects: Vec<Effect>,
    pub transitions: Vec<FrameTransition>,
}

impl Advance {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, FlowStatus::Completed(_))
    }

    /// Texts of the messages this turn sends, in order
    pub fn texts(&self) -> Vec<&str> {
        self.effects.iter().filter_map(Effect::text).collect()
    }
}

/// Unexpected faults inside a step; fatal to the turn, state not advanced
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepExecutionError {
    #[error("No flow registered for {0}")]
    UnknownFlow(FlowId),
    #[error("Frame for {flow} carries {found} values")]
    FrameMismatch { flow: FlowId, found: FlowId },
    #[error("Step {step} cannot consume a {kind} result")]
    UnexpectedInput {
        step: &'static str,
        kind: &'static str,
    },
    #[error("No pending command to process")]
    MissingCommand,
    #[error("Turn exceeded {0} step invocations without suspending")]
    RunawayTurn(usize),
    #[error("Sign-in window of {0} runs past the representable time range")]
    SignInWindowOverflow(TimeDelta),
}

/// Feed `input` to the active step and run until the flow suspends or completes.
///
/// An empty stack starts the main flow; the input is then ignored and step 0
/// runs with no result.
pub fn advance(
    registry: &FlowRegistry,
    stack: &DialogStack,
    context: &DialogContext,
    input: StepResult,
    now: DateTime<Utc>,
) -> Result<Advance, StepExecutionError> {
    let mut stack = stack.clone();
    let mut effects = Vec::new();
    let mut transitions = Vec::new();
    let mut input = input;

    if stack.is_empty() {
        stack.push(StackFrame::begin(FrameValues::main()));
        transitions.push(FrameTransition::Pushed { flow: FlowId::Main });
        input = StepResult::None;
    }

    let mut invocations = 0;
    while let Some(frame) = stack.top_mut() {
        if invocations == MAX_STEPS_PER_TURN {
            return Err(StepExecutionError::RunawayTurn(MAX_STEPS_PER_TURN));
        }
        invocations += 1;

        if frame.values.flow() != frame.flow {
            return Err(StepExecutionError::FrameMismatch {
                flow: frame.flow,
                found: frame.values.flow(),
            });
        }
        let definition = registry
            .get(frame.flow)
            .ok_or(StepExecutionError::UnknownFlow(frame.flow))?;

        let step_input = std::mem::take(&mut input);
        let outcome = match definition.steps().get(frame.step_index) {
            Some(step) => {
                tracing::trace!(
                    conv_id = %context.conversation_id,
                    flow = %frame.flow,
                    step = step.name,
                    input = step_input.kind(),
                    "Running step"
                );
                let mut ctx = StepContext::new(
                    context,
                    now,
                    frame.flow,
                    step.name,
                    &mut frame.values,
                    &mut effects,
                );
                (step.run)(&mut ctx, step_input)?
            }
            // Ran off the end of the flow: finish with whatever arrived
            None => StepOutcome::End(step_input),
        };

        match outcome {
            StepOutcome::Next => {
                frame.step_index += 1;
                transitions.push(FrameTransition::Advanced {
                    flow: frame.flow,
                    step_index: frame.step_index,
                });
                return Ok(suspended(stack, effects, transitions));
            }
            StepOutcome::Continue(value) => {
                frame.step_index += 1;
                transitions.push(FrameTransition::Advanced {
                    flow: frame.flow,
                    step_index: frame.step_index,
                });
                input = value;
            }
            StepOutcome::Retry => {
                transitions.push(FrameTransition::Retried {
                    flow: frame.flow,
                    step_index: frame.step_index,
                });
                return Ok(suspended(stack, effects, transitions));
            }
            StepOutcome::BeginChild(values) => {
                // Parent resumes at the step that receives the child's result
                frame.step_index += 1;
                transitions.push(FrameTransition::Advanced {
                    flow: frame.flow,
                    step_index: frame.step_index,
                });
                let child = StackFrame::begin(values);
                transitions.push(FrameTransition::Pushed { flow: child.flow });
                stack.push(child);
            }
            StepOutcome::End(value) => {
                if let Some(popped) = stack.pop() {
                    transitions.push(FrameTransition::Popped { flow: popped.flow });
                }
                if stack.is_empty() {
                    return Ok(Advance {
                        stack,
                        status: FlowStatus::Completed(value),
                        effects,
                        transitions,
                    });
                }
                input = value;
            }
        }
    }

    Ok(Advance {
        stack,
        status: FlowStatus::Completed(input),
        effects,
        transitions,
    })
}

fn suspended(
    stack: DialogStack,
    effects: Vec<Effect>,
    transitions: Vec<FrameTransition>,
) -> Advance {
    Advance {
        stack,
        status: FlowStatus::Suspended,
        effects,
        transitions,
    }
}
