//! Command parsing for the text typed after sign-in

use serde::Serialize;

/// Command verbs the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// "me": look up the signed-in user
    #[serde(rename = "self")]
    Me,
    /// "send <address>": mail the given recipient
    Send,
    /// "recent": list the latest inbox messages
    Recent,
    /// Anything else; answered by echoing the token
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub verb: Verb,
    pub argument: Option<String>,
}

/// Classify free text into a command.
///
/// Lower-cases and splits on whitespace. A first word starting with `send`
/// takes the second word (or `""`) as the recipient, unchecked. A first word
/// starting with `recent` lists mail, exactly `me` looks up the user, and
/// everything else (including empty input) is `Other`.
pub fn parse(raw: &str) -> Command {
    let lowered = raw.to_lowercase();
    let mut words = lowered.split_whitespace();
    let verb = words.next().unwrap_or_default();

    if verb.starts_with("send") {
        Command {
            verb: Verb::Send,
            argument: Some(words.next().unwrap_or_default().to_string()),
        }
    } else if verb.starts_with("recent") {
        Command {
            verb: Verb::Recent,
            argument: None,
        }
    } else if verb == "me" {
        Command {
            verb: Verb::Me,
            argument: None,
        }
    } else {
        Command {
            verb: Verb::Other,
            argument: Some(lowered.trim().to_string()),
        }
    }
}
