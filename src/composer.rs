use crate::platform::FeedMessage;

/// Exact text the model returns when a message does not warrant a reply.
pub const NO_REPLY_SENTINEL: &str = "null";

const LATEST_LABEL: &str = "(latest)";
const PAST_LABEL: &str = "(past)";

/// Build the prompt sent to the model for `target`.
///
/// `history` is newest first. When it is empty only the target is
/// rendered, labelled as the latest message.
pub fn build_prompt(target: &FeedMessage, history: &[FeedMessage], bot_name: &str) -> String {
    let log = if history.is_empty() {
        render_entry(target, LATEST_LABEL)
    } else {
        history
            .iter()
            .enumerate()
            .map(|(idx, msg)| {
                let label = if idx == 0 { LATEST_LABEL } else { PAST_LABEL };
                render_entry(msg, label)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!("{}\n\n{}", instructions(bot_name), log)
}

fn render_entry(msg: &FeedMessage, label: &str) -> String {
    format!("speaker:{}, content:「{}」 {}", msg.author, msg.body, label)
}

fn instructions(bot_name: &str) -> String {
    format!(
        "Below is a log from a group chat. Reply to the message marked {latest}, \
         taking the {past} messages into account only where they relate to it; \
         if they are unrelated, focus on the latest message alone. \
         Keep it casual and friendly, no polite or formal register. \
         You are one of the chat users and your name is \"{name}\": \
         whenever \"{name}\" is addressed it means you, and any past message \
         whose speaker is \"{name}\" was written by you. \
         If the intent of the latest message is unclear, if it is only small talk \
         with nothing to respond to, or if it is inappropriate to answer, \
         reply with exactly the four characters {sentinel} and nothing else.",
        latest = LATEST_LABEL,
        past = PAST_LABEL,
        name = bot_name,
        sentinel = NO_REPLY_SENTINEL,
    )
}

/// True when the model declined to reply.
///
/// Only newlines and ASCII spaces are ignored; any other character,
/// including tabs, makes the response a real reply.
pub fn is_no_reply_verdict(response: &str) -> bool {
    let compact: String = response
        .chars()
        .filter(|c| *c != '\n' && *c != ' ')
        .collect();
    compact == NO_REPLY_SENTINEL
}
