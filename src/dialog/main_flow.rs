//! The top-level flow: sign in, optionally show the token, run one command
//!
//! Every step that needs a token begins a fresh sign-in prompt instead of
//! reusing an earlier one. Turns can be hours apart, so a token from a previous
//! turn may be stale; the token capability's own cache makes the repeat cheap.

use super::effect::Effect;
use super::flow::{FlowDefinition, StepContext, StepOutcome};
use super::prompts::{ask_text, begin_sign_in, confirm};
use super::result::StepResult;
use super::sequencer::StepExecutionError;
use super::stack::{FlowId, FrameValues};
use crate::command;

pub const LOGGED_IN: &str = "You are now logged in.";
pub const LOGIN_FAILED: &str = "Login was not successful please try again.";
pub const VIEW_TOKEN_PROMPT: &str = "Would you like to view your token?";
pub const THANK_YOU: &str = "Thank you.";
pub const COMMAND_PROMPT: &str = "What would you like to do? (type 'me', 'send <EMAIL>' or 'recent')";
pub const PROCESS_LOGIN_FAILED: &str = "We couldn't log you in. Please try again later.";

pub fn definition() -> FlowDefinition {
    FlowDefinition::new(FlowId::Main)
        .step("prompt", prompt)
        .step("login", login)
        .step("display_token_phase1", display_token_phase1)
        .step("display_token_phase2", display_token_phase2)
        .step("command", command_step)
        .step("process", process)
}

fn prompt(ctx: &mut StepContext<'_>, _input: StepResult) -> Result<StepOutcome, StepExecutionError> {
    begin_sign_in(ctx)
}

fn login(ctx: &mut StepContext<'_>, input: StepResult) -> Result<StepOutcome, StepExecutionError> {
    if input.into_token().is_some() {
        ctx.send(LOGGED_IN);
        Ok(confirm(VIEW_TOKEN_PROMPT))
    } else {
        ctx.send(LOGIN_FAILED);
        Ok(StepOutcome::End(StepResult::None))
    }
}

fn display_token_phase1(
    ctx: &mut StepContext<'_>,
    input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    ctx.send(THANK_YOU);
    match input {
        StepResult::Boolean(true) => begin_sign_in(ctx),
        StepResult::Boolean(false) => Ok(StepOutcome::End(StepResult::None)),
        other => Err(ctx.unexpected(&other)),
    }
}

fn display_token_phase2(
    ctx: &mut StepContext<'_>,
    input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    match input.into_token() {
        Some(token) => {
            ctx.send(format!("Here is your token {}", token.token));
            Ok(ask_text(COMMAND_PROMPT))
        }
        None => {
            ctx.send(LOGIN_FAILED);
            Ok(StepOutcome::End(StepResult::None))
        }
    }
}

fn command_step(
    ctx: &mut StepContext<'_>,
    input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    let text = match input {
        StepResult::Text(text) => text,
        other => return Err(ctx.unexpected(&other)),
    };
    let mismatch = ctx.mismatch();
    let FrameValues::Main { pending_command } = ctx.values_mut() else {
        return Err(mismatch);
    };
    *pending_command = Some(text);
    begin_sign_in(ctx)
}

fn process(ctx: &mut StepContext<'_>, input: StepResult) -> Result<StepOutcome, StepExecutionError> {
    let mismatch = ctx.mismatch();
    let FrameValues::Main { pending_command } = ctx.values_mut() else {
        return Err(mismatch);
    };
    let raw = pending_command
        .take()
        .ok_or(StepExecutionError::MissingCommand)?;

    match input.into_token() {
        Some(token) => {
            let command = command::parse(&raw);
            tracing::info!(
                conv_id = %ctx.context().conversation_id,
                verb = ?command.verb,
                "Dispatching command"
            );
            ctx.emit(Effect::Dispatch { command, token });
        }
        None => ctx.send(PROCESS_LOGIN_FAILED),
    }
    Ok(StepOutcome::End(StepResult::None))
}
