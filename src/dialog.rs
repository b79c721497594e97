//! Resumable dialog engine
//!
//! A conversation's position is a stack of frames persisted between turns.
//! Each turn feeds one input to the active step through a pure sequencer; the
//! runtime executes the effects it returns and saves the new stack.

mod effect;
pub mod event;
pub mod flow;
pub mod main_flow;
pub mod prompts;
pub mod result;
pub mod sequencer;
pub mod stack;


pub use effect::Effect;
pub use event::{ConversationRef, InboundEvent, TurnPayload};
pub use flow::{DialogContext, FlowRegistry};
pub use result::{StepResult, TokenResponse};
pub use sequencer::{advance, Advance, FlowStatus, StepExecutionError};
pub use stack::{DialogStack, FlowId, FrameValues, StackFrame};
