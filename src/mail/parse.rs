//! Inbound message parsing: RFC 822 extraction and quote stripping.

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;

use super::InboundEmail;

/// Parse raw RFC 822 bytes into an [`InboundEmail`].
///
/// Returns `None` when the message cannot be parsed or carries no
/// sender address; such messages are skipped (the watermark still
/// advances past them).
pub fn parse_inbound(raw: &[u8]) -> Option<InboundEmail> {
    let message = MessageParser::default().parse(raw)?;

    let sender = message
        .from()
        .and_then(first_address)
        .map(|a| a.trim().to_lowercase())?;

    let external_id = message
        .message_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("<generated-{}>", uuid::Uuid::new_v4()));

    let subject = message.subject().unwrap_or_default().to_string();

    let body = message
        .body_text(0)
        .map(|t| strip_quoted_text(&t))
        .unwrap_or_default();

    let received_at = message
        .date()
        .and_then(|d| DateTime::parse_from_rfc3339(&d.to_rfc3339()).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(InboundEmail {
        external_id,
        sender,
        subject,
        body,
        received_at,
    })
}

/// Pull the first concrete address out of a mail-parser Address field.
fn first_address(addr: &mail_parser::Address) -> Option<String> {
    match addr {
        mail_parser::Address::List(addrs) => addrs
            .iter()
            .find_map(|a| a.address.as_ref().map(|s| s.to_string())),
        mail_parser::Address::Group(groups) => groups.iter().find_map(|g| {
            g.addresses
                .iter()
                .find_map(|a| a.address.as_ref().map(|s| s.to_string()))
        }),
    }
}

/// Strip quoted text from an email body.
///
/// Removes lines starting with `>`, everything after an
/// "On ... wrote:" attribution line, and everything after an
/// "--- Original Message ---" separator. Pure string parsing.
pub fn strip_quoted_text(body: &str) -> String {
    let mut kept = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('>') {
            continue;
        }
        if trimmed.starts_with("On ") && trimmed.ends_with("wrote:") {
            break;
        }
        if trimmed.starts_with("---") && trimmed.contains("Original Message") {
            break;
        }

        kept.push(line);
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }

    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_message(from: &str, subject: &str, body: &str) -> Vec<u8> {
        format!(
            "From: {from}\r\nTo: me@example.com\r\nSubject: {subject}\r\n\
             Message-ID: <test-1@example.com>\r\nDate: Mon, 2 Feb 2026 10:00:00 +0000\r\n\
             Content-Type: text/plain\r\n\r\n{body}"
        )
        .into_bytes()
    }

    #[test]
    fn parse_extracts_normalized_sender() {
        let raw = raw_message("Alice Smith <Alice@Example.COM>", "Hi", "Sounds good!");
        let email = parse_inbound(&raw).unwrap();
        assert_eq!(email.sender, "alice@example.com");
        assert_eq!(email.subject, "Hi");
        assert_eq!(email.external_id, "<test-1@example.com>");
        assert_eq!(email.body, "Sounds good!");
    }

    #[test]
    fn parse_strips_quoted_reply() {
        let body = "Yes, interested!\r\n\r\nOn Mon, Feb 2, 2026 Bob wrote:\r\n> original pitch";
        let raw = raw_message("a@x.com", "Re: Pitch", body);
        let email = parse_inbound(&raw).unwrap();
        assert_eq!(email.body, "Yes, interested!");
    }

    #[test]
    fn parse_rejects_garbage_without_sender() {
        assert!(parse_inbound(b"Subject: no from header\r\n\r\nbody").is_none());
    }

    #[test]
    fn strip_basic_quoted_lines() {
        let body = "Hello!\n\n> This is quoted\n> Another quoted line\nThanks";
        assert_eq!(strip_quoted_text(body), "Hello!\n\nThanks");
    }

    #[test]
    fn strip_original_message_separator() {
        let body = "My reply\n\n--- Original Message ---\nOld stuff here";
        assert_eq!(strip_quoted_text(body), "My reply");
    }

    #[test]
    fn strip_trailing_blank_lines() {
        let body = "Hello\n\n> quoted\n\n\n";
        assert_eq!(strip_quoted_text(body), "Hello");
    }

    #[test]
    fn strip_no_quotes_passthrough() {
        let body = "Just a normal message\nWith multiple lines";
        assert_eq!(strip_quoted_text(body), body);
    }
}
