//! Runs a parsed command against Graph and renders the outcome as text
//!
//! Failures are reported to the user; they never change the dialog's control
//! flow.

use crate::command::{Command, Verb};
use crate::dialog::TokenResponse;
use crate::graph::{GraphApi, MailSummary};

pub const NO_RECENT_MAIL: &str = "You have no recent messages.";

pub async fn dispatch<G: GraphApi + ?Sized>(
    graph: &G,
    command: &Command,
    token: &TokenResponse,
) -> Vec<String> {
    match command.verb {
        Verb::Me => match graph.get_self(&token.token).await {
            Ok(profile) => vec![format!("You are {}.", profile.display_name)],
            Err(e) => {
                tracing::warn!(error = %e, "Profile lookup failed");
                vec![format!("Sorry, I couldn't look up your profile: {e}")]
            }
        },
        Verb::Send => {
            let recipient = command.argument.as_deref().unwrap_or_default();
            match graph.send_mail(&token.token, recipient).await {
                Ok(()) => vec![format!("I sent a message to '{recipient}' from your account.")],
                Err(e) => {
                    tracing::warn!(error = %e, "Sending mail failed");
                    vec![format!("Sorry, I couldn't send a message to '{recipient}': {e}")]
                }
            }
        }
        Verb::Recent => match graph.list_recent_mail(&token.token).await {
            Ok(mail) if mail.is_empty() => vec![NO_RECENT_MAIL.to_string()],
            Ok(mail) => vec![render_recent(&mail)],
            Err(e) => {
                tracing::warn!(error = %e, "Listing recent mail failed");
                vec![format!("Sorry, I couldn't list your recent mail: {e}")]
            }
        },
        Verb::Other => vec![format!("Your token is: {}", token.token)],
    }
}

fn render_recent(mail: &[MailSummary]) -> String {
    let mut text = String::from("Here are your recent messages:");
    for item in mail {
        let subject = if item.subject.is_empty() {
            "(no subject)"
        } else {
            item.subject.as_str()
        };
        text.push_str(&format!("\n- {subject} (from {})", item.from));
    }
    text
}
