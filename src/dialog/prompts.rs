//! Prompt flows: sign-in, yes/no confirmation, free text
//!
//! Every prompt is two steps: the first asks (and suspends), the second
//! recognizes the reply and either ends with a typed result or re-asks.

use super::effect::Effect;
use super::flow::{FlowDefinition, StepContext, StepOutcome};
use super::result::StepResult;
use super::sequencer::StepExecutionError;
use super::stack::{FlowId, FrameValues};
use regex::Regex;
use std::sync::LazyLock;

static MAGIC_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{6})\s*$").expect("valid magic code pattern"));

const CONFIRM_RETRY: &str = "Please answer yes or no.";
const TEXT_RETRY: &str = "Sorry, I didn't get that.";

// ============================================================================
// OAuth prompt
// ============================================================================

pub fn oauth_prompt() -> FlowDefinition {
    FlowDefinition::new(FlowId::OauthPrompt)
        .step("request_token", request_token)
        .step("recognize_token", recognize_token)
}

/// Frame values for a fresh sign-in prompt; the window starts now
pub fn begin_sign_in(ctx: &StepContext<'_>) -> Result<StepOutcome, StepExecutionError> {
    let timeout = ctx.context().sign_in_timeout;
    let expires_at = ctx
        .now()
        .checked_add_signed(timeout)
        .ok_or(StepExecutionError::SignInWindowOverflow(timeout))?;
    Ok(StepOutcome::BeginChild(FrameValues::OauthPrompt {
        connection_name: ctx.context().connection_name.clone(),
        expires_at,
    }))
}

fn request_token(
    ctx: &mut StepContext<'_>,
    _input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    let FrameValues::OauthPrompt {
        connection_name, ..
    } = ctx.values()
    else {
        return Err(ctx.mismatch());
    };
    let effect = Effect::request_token(connection_name.clone());
    ctx.emit(effect);
    Ok(StepOutcome::Next)
}

fn recognize_token(
    ctx: &mut StepContext<'_>,
    input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    let FrameValues::OauthPrompt {
        connection_name,
        expires_at,
    } = ctx.values()
    else {
        return Err(ctx.mismatch());
    };
    let connection_name = connection_name.clone();

    if ctx.now() >= *expires_at {
        tracing::info!(
            conv_id = %ctx.context().conversation_id,
            step = ctx.step_name(),
            "Sign-in window elapsed"
        );
        return Ok(StepOutcome::End(StepResult::None));
    }

    match input {
        StepResult::Token(token) => Ok(StepOutcome::End(StepResult::Token(token))),
        StepResult::Text(text) | StepResult::VerifyState(text) => match magic_code(&text) {
            Some(code) => {
                ctx.emit(Effect::ExchangeMagicCode {
                    connection_name,
                    code,
                });
                Ok(StepOutcome::Retry)
            }
            None => Ok(StepOutcome::End(StepResult::None)),
        },
        StepResult::None | StepResult::Boolean(_) | StepResult::Choice(_) => {
            Ok(StepOutcome::End(StepResult::None))
        }
    }
}

/// Six-digit code shown to the user after signing in on some channels
pub fn magic_code(text: &str) -> Option<String> {
    MAGIC_CODE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// Confirm prompt
// ============================================================================

pub fn confirm_prompt() -> FlowDefinition {
    FlowDefinition::new(FlowId::ConfirmPrompt)
        .step("ask", ask)
        .step("recognize_confirmation", recognize_confirmation)
}

pub fn confirm(prompt: impl Into<String>) -> StepOutcome {
    StepOutcome::BeginChild(FrameValues::ConfirmPrompt {
        prompt: prompt.into(),
    })
}

fn recognize_confirmation(
    ctx: &mut StepContext<'_>,
    input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    let FrameValues::ConfirmPrompt { prompt } = ctx.values() else {
        return Err(ctx.mismatch());
    };
    let prompt = prompt.clone();

    let answer = match input {
        StepResult::Boolean(value) => Some(value),
        StepResult::Text(text) => parse_confirmation(&text),
        // Buttons are rendered as [Yes, No]
        StepResult::Choice(choice) => {
            parse_confirmation(&choice.value).or(Some(choice.index == 0))
        }
        StepResult::None | StepResult::Token(_) | StepResult::VerifyState(_) => None,
    };

    match answer {
        Some(value) => Ok(StepOutcome::End(StepResult::Boolean(value))),
        None => {
            ctx.send(format!("{CONFIRM_RETRY} {prompt}"));
            Ok(StepOutcome::Retry)
        }
    }
}

/// Yes/no recognizer; `None` when the reply is neither
pub fn parse_confirmation(text: &str) -> Option<bool> {
    let normalized = text
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    match normalized.as_str() {
        "yes" | "y" | "yeah" | "yep" | "sure" | "ok" | "okay" | "true" => Some(true),
        "no" | "n" | "nope" | "nah" | "false" | "no thanks" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Text prompt
// ============================================================================

pub fn text_prompt() -> FlowDefinition {
    FlowDefinition::new(FlowId::TextPrompt)
        .step("ask", ask)
        .step("recognize_text", recognize_text)
}

pub fn ask_text(prompt: impl Into<String>) -> StepOutcome {
    StepOutcome::BeginChild(FrameValues::TextPrompt {
        prompt: prompt.into(),
    })
}

fn recognize_text(
    ctx: &mut StepContext<'_>,
    input: StepResult,
) -> Result<StepOutcome, StepExecutionError> {
    let FrameValues::TextPrompt { prompt } = ctx.values() else {
        return Err(ctx.mismatch());
    };
    let prompt = prompt.clone();

    match input {
        StepResult::Text(text) if !text.trim().is_empty() => {
            Ok(StepOutcome::End(StepResult::Text(text.trim().to_string())))
        }
        StepResult::Choice(choice) => Ok(StepOutcome::End(StepResult::Text(choice.value))),
        _ => {
            ctx.send(format!("{TEXT_RETRY} {prompt}"));
            Ok(StepOutcome::Retry)
        }
    }
}

/// Shared first step of the confirm and text prompts
fn ask(ctx: &mut StepContext<'_>, _input: StepResult) -> Result<StepOutcome, StepExecutionError> {
    let prompt = match ctx.values() {
        FrameValues::ConfirmPrompt { prompt } | FrameValues::TextPrompt { prompt } => prompt.clone(),
        FrameValues::Main { .. } | FrameValues::OauthPrompt { .. } => return Err(ctx.mismatch()),
    };
    ctx.send(prompt);
    Ok(StepOutcome::Next)
}
