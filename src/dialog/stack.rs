//! Dialog stack types
//!
//! The stack is the only state that survives between turns. Everything a flow
//! needs to resume lives in its frame: the flow id, the index of the step that
//! receives the next input, and a small closed record of local values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a registered flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowId {
    /// Top-level sign-in / token / command flow
    Main,
    OauthPrompt,
    ConfirmPrompt,
    TextPrompt,
}

impl FlowId {
    pub fn as_str(self) -> &'static str {
        match self {
            FlowId::Main => "main",
            FlowId::OauthPrompt => "oauth_prompt",
            FlowId::ConfirmPrompt => "confirm_prompt",
            FlowId::TextPrompt => "text_prompt",
        }
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-flow local values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameValues {
    Main {
        /// Raw command text held across the re-authentication suspend
        #[serde(default)]
        pending_command: Option<String>,
    },
    OauthPrompt {
        connection_name: String,
        /// Sign-in window end; any input after this resolves to "no token"
        expires_at: DateTime<Utc>,
    },
    ConfirmPrompt {
        prompt: String,
    },
    TextPrompt {
        prompt: String,
    },
}

impl FrameValues {
    pub fn main() -> Self {
        FrameValues::Main {
            pending_command: None,
        }
    }

    /// The flow these values belong to
    pub fn flow(&self) -> FlowId {
        match self {
            FrameValues::Main { .. } => FlowId::Main,
            FrameValues::OauthPrompt { .. } => FlowId::OauthPrompt,
            FrameValues::ConfirmPrompt { .. } => FlowId::ConfirmPrompt,
            FrameValues::TextPrompt { .. } => FlowId::TextPrompt,
        }
    }
}

/// Execution position of one active flow instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub flow: FlowId,
    pub step_index: usize,
    pub values: FrameValues,
}

impl StackFrame {
    /// A fresh frame positioned at the flow's first step
    pub fn begin(values: FrameValues) -> Self {
        Self {
            flow: values.flow(),
            step_index: 0,
            values,
        }
    }
}

/// Ordered frames, last element is the active one
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogStack {
    frames: Vec<StackFrame>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut()
    }

    pub(crate) fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    /// Expiry of the sign-in prompt on top of the stack, if one is waiting
    pub fn pending_sign_in(&self) -> Option<DateTime<Utc>> {
        match self.top().map(|frame| &frame.values) {
            Some(FrameValues::OauthPrompt { expires_at, .. }) => Some(*expires_at),
            _ => None,
        }
    }
}
