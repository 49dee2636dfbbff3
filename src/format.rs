//! Text decoration for everything the bot says in chat.
//!
//! The prefix style is a plain value handed to the relay and the command
//! handler when they are built; nothing here reads process-wide state.

use serde::{Deserialize, Serialize};

/// IRC bold toggle
pub const IRC_BOLD: char = '\u{02}';

/// Prefix decoration set, selected by `irc.prefixes`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixStyle {
    /// Cat faces (default)
    #[default]
    Cats,
    /// No decoration at all
    None,
}

/// What a message is about, which selects its prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A relayed feed entry (also the fallback for kinds without their own prefix)
    NewEntry,
    /// A command failed or was a no-op
    Error,
    /// A channel-wide announcement
    Inform,
    /// Confirmation of a follow
    Followed,
    /// Confirmation of an unfollow
    StoppedFollowing,
    /// The usage reply
    Help,
}

impl PrefixStyle {
    /// Prefix for a message of the given kind
    pub fn prefix(self, kind: MessageKind) -> &'static str {
        match self {
            PrefixStyle::None => "",
            PrefixStyle::Cats => match kind {
                MessageKind::Error => "=O_o= ",
                MessageKind::Inform => "=o_o= ",
                MessageKind::NewEntry
                | MessageKind::Followed
                | MessageKind::StoppedFollowing
                | MessageKind::Help => "=^_^= ",
            },
        }
    }

    /// The channel line for a relayed entry: `<prefix> <bold>author:<bold> text`
    pub fn entry_line(self, author: &str, text: &str) -> String {
        format!(
            "{} {IRC_BOLD}{author}:{IRC_BOLD} {text}",
            self.prefix(MessageKind::NewEntry)
        )
    }
}

/// Replace every CR/LF run with a single space.
///
/// Chat transports are line oriented, so a literal newline would split one
/// entry into several protocol lines.
pub fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_break = false;
    for c in text.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(c);
            in_break = false;
        }
    }
    out
}

/// Decode the HTML entities feed APIs put into plain-text fields.
///
/// Handles the named entities `amp`, `lt`, `gt`, `quot`, `apos` and numeric
/// `&#NNN;` / `&#xHH;` references. Anything unrecognized is left as-is.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        // Entities are short; don't scan arbitrarily far for a ';'
        let end = candidate
            .char_indices()
            .take(12)
            .find(|&(_, c)| c == ';')
            .map(|(i, _)| i);

        match end.and_then(|end| decode_one(&candidate[1..end]).map(|c| (end, c))) {
            Some((end, c)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_one(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Strip line breaks and cut `text` so it is at most `max_bytes` long,
/// never splitting a UTF-8 sequence.
pub fn truncate_line(text: &str, max_bytes: usize) -> &str {
    let line = text.split(['\r', '\n']).next().unwrap_or("");
    if line.len() <= max_bytes {
        return line;
    }
    let mut cut = max_bytes;
    while !line.is_char_boundary(cut) {
        cut -= 1;
    }
    &line[..cut]
}
