//! Detection of room messages addressed to the bot.

use crate::types::BotIdentity;

/// Returns the content directed at `bot_name`, or `None` if the bot isn't addressed.
///
/// Accepted forms are `@name `, `name: ` and `@name: ` at the very start of the
/// message. The prefix is matched case-insensitively, the remainder is returned
/// untouched.
#[must_use]
pub fn parse_mention<'a>(content: &'a str, bot_name: &str) -> Option<&'a str> {
    let name = bot_name.to_lowercase();
    let prefixes = [
        format!("@{name}: "),
        format!("@{name} "),
        format!("{name}: "),
    ];

    prefixes
        .iter()
        .find_map(|prefix| strip_prefix_ignore_case(content, prefix))
}

/// Whether a room message sent by `sender_gxs_id` is the network echoing our own message.
#[must_use]
pub fn is_self_echo(sender_gxs_id: &str, identity: &BotIdentity) -> bool {
    sender_gxs_id == identity.gxs_id
}

fn strip_prefix_ignore_case<'a>(content: &'a str, lowercase_prefix: &str) -> Option<&'a str> {
    let mut chars = content.char_indices();
    let mut expected = lowercase_prefix.chars().peekable();

    while expected.peek().is_some() {
        let (_, actual) = chars.next()?;
        for lowered in actual.to_lowercase() {
            if expected.next() != Some(lowered) {
                return None;
            }
        }
    }

    let rest = chars.next().map_or(content.len(), |(idx, _)| idx);
    Some(&content[rest..])
}
