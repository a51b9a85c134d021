//! Small text helpers shared by flows and the operator log.

/// Telegram hard limit for a single message body.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Escape text for inclusion in an HTML-mode Telegram message.
///
/// Only `&`, `<` and `>` are significant in Telegram's HTML dialect.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Clamp a message that would exceed the Telegram limit.
///
/// Anything at or over the limit is cut to a round 4000 characters, leaving
/// headroom for the markers a caller may still append.
pub fn clamp_message(text: &str) -> String {
    if text.chars().count() >= TELEGRAM_MESSAGE_LIMIT {
        text.chars().take(4000).collect()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn clamp_leaves_short_messages_alone() {
        let short = "x".repeat(4095);
        assert_eq!(clamp_message(&short), short);
    }

    #[test]
    fn clamp_cuts_at_four_thousand() {
        let long = "y".repeat(5000);
        let clamped = clamp_message(&long);
        assert_eq!(clamped.chars().count(), 4000);

        let exactly_at_limit = "z".repeat(4096);
        assert_eq!(clamp_message(&exactly_at_limit).chars().count(), 4000);
    }
}
