use mail_parser::{Address, Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::types::{AttachmentPart, Header, ParsedEmail};

/// MIME message parser
///
/// Never fails: input that is not a message yields an empty [`ParsedEmail`],
/// and a message with damaged parts yields whatever could be recovered.
pub struct MimeParser;

impl MimeParser {
    /// Parse a raw email message into structured parts
    pub fn parse(message: &[u8]) -> ParsedEmail {
        if !Self::starts_with_header(message) {
            return ParsedEmail::default();
        }

        let Some(parsed) = MessageParser::default().parse(message) else {
            let headers_block = Self::header_block(message);
            return ParsedEmail {
                headers: Self::parse_headers(&String::from_utf8_lossy(headers_block)),
                ..Default::default()
            };
        };

        let headers = Self::message_headers(&parsed, message);

        let text_body = parsed.text_bodies().find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.to_string()),
            _ => None,
        });

        let html_body = parsed.html_bodies().find_map(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        });

        let attachments = parsed
            .attachments()
            .map(|part| AttachmentPart {
                filename: part.attachment_name().map(|s| s.to_string()),
                mime_type: part.content_type().map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                }),
                content: Self::part_contents(part, message),
            })
            .collect();

        let cc = parsed.cc().map(Self::addresses).unwrap_or_default();

        ParsedEmail {
            headers,
            subject: parsed.subject().map(|s| s.to_string()),
            text_body,
            html_body,
            attachments,
            cc,
        }
    }

    /// Top-level headers in source order, names lower-cased, values unfolded
    fn message_headers(parsed: &Message<'_>, message: &[u8]) -> Vec<Header> {
        parsed
            .headers()
            .iter()
            .map(|h| {
                let raw = message.get(h.offset_start..h.offset_end).unwrap_or_default();
                Header {
                    key: h.name.as_str().to_lowercase(),
                    value: Self::unfold(&String::from_utf8_lossy(raw)),
                }
            })
            .collect()
    }

    fn unfold(value: &str) -> String {
        value
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Decoded bytes of an attachment part
    ///
    /// A `message/rfc822` part with nothing parseable inside has no nested
    /// root part, so its bytes come straight from the raw body.
    fn part_contents(part: &MessagePart<'_>, message: &[u8]) -> Vec<u8> {
        match &part.body {
            PartType::Message(nested) if nested.parts.is_empty() => message
                .get(part.offset_body..part.offset_end)
                .unwrap_or_default()
                .to_vec(),
            _ => part.contents().to_vec(),
        }
    }

    /// A message must open with a `name: value` header line
    fn starts_with_header(message: &[u8]) -> bool {
        let first_line = message
            .split(|&b| b == b'\n')
            .next()
            .unwrap_or_default();

        match first_line.iter().position(|&b| b == b':') {
            Some(0) | None => false,
            Some(colon) => first_line[..colon]
                .iter()
                .all(|&b| (33..=126).contains(&b)),
        }
    }

    /// Bytes up to the blank line that ends the header section
    fn header_block(message: &[u8]) -> &[u8] {
        let crlf = message.windows(4).position(|w| w == b"\r\n\r\n");
        let lf = message.windows(2).position(|w| w == b"\n\n");

        match (crlf, lf) {
            (Some(a), Some(b)) => &message[..a.min(b)],
            (Some(a), None) => &message[..a],
            (None, Some(b)) => &message[..b],
            (None, None) => message,
        }
    }

    /// Parse header lines in order, unfolding continuations
    ///
    /// Used when the MIME parser rejects the input outright.
    fn parse_headers(headers_str: &str) -> Vec<Header> {
        let mut headers = Vec::new();
        let mut current: Option<Header> = None;

        for line in headers_str.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Folded header
                if let Some(ref mut header) = current {
                    header.value.push(' ');
                    header.value.push_str(line.trim());
                }
            } else if let Some(colon_pos) = line.find(':') {
                if let Some(header) = current.take() {
                    headers.push(header);
                }

                current = Some(Header {
                    key: line[..colon_pos].trim().to_lowercase(),
                    value: line[colon_pos + 1..].trim().to_string(),
                });
            }
        }

        if let Some(header) = current {
            headers.push(header);
        }

        headers
    }

    fn addresses(address: &Address<'_>) -> Vec<String> {
        let addrs: Vec<_> = match address {
            Address::List(list) => list.iter().collect(),
            Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
        };

        addrs
            .into_iter()
            .filter_map(|a| a.address.as_ref().map(|s| s.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_folded() {
        let headers_str = "Subject: This is a very long subject\n that spans multiple lines";
        let headers = MimeParser::parse_headers(headers_str);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].key, "subject");
        assert_eq!(
            headers[0].value,
            "This is a very long subject that spans multiple lines"
        );
    }

    #[test]
    fn test_parse_headers_keeps_order_and_duplicates() {
        let headers_str = "Received: from a\r\nReceived: from b\r\nFrom: x@example.com";
        let headers = MimeParser::parse_headers(headers_str);

        let keys: Vec<&str> = headers.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["received", "received", "from"]);
        assert_eq!(headers[1].value, "from b");
    }

    #[test]
    fn test_non_mime_input_is_empty() {
        for input in [
            &b""[..],
            &b"\x00\x01\x02\xff\xfe"[..],
            &b"just some words without structure"[..],
            &b": leading colon\r\n\r\nbody"[..],
            &b"\r\n\r\nbody only"[..],
        ] {
            let parsed = MimeParser::parse(input);
            assert!(parsed.is_empty(), "expected empty result for {:?}", input);
        }
    }

    #[test]
    fn test_parse_simple_text_email() {
        let message = b"From: sender@example.com\r\nTo: recipient@example.com\r\nSubject: Test\r\n\r\nHello World";
        let parsed = MimeParser::parse(message);

        assert_eq!(parsed.header("from"), Some("sender@example.com"));
        assert_eq!(parsed.subject.as_deref(), Some("Test"));
        assert_eq!(parsed.text_body.as_deref().map(str::trim), Some("Hello World"));
        assert!(parsed.html_body.is_none());
        assert_eq!(parsed.attachment_count(), 0);
    }

    #[test]
    fn test_parse_html_only_email_has_no_text_body() {
        let message = b"From: a@example.com\r\nSubject: Html\r\nContent-Type: text/html; charset=utf-8\r\n\r\n<p>Hi</p>";
        let parsed = MimeParser::parse(message);

        assert!(parsed.text_body.is_none());
        assert_eq!(parsed.html_body.as_deref().map(str::trim), Some("<p>Hi</p>"));
    }

    #[test]
    fn test_parse_multipart_alternative() {
        let message = concat!(
            "From: a@example.com\r\n",
            "Subject: Both\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"b1\"\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "Text part\r\n",
            "--b1\r\n",
            "Content-Type: text/html\r\n\r\n",
            "<p>HTML part</p>\r\n",
            "--b1--\r\n",
        );

        let parsed = MimeParser::parse(message.as_bytes());

        assert_eq!(parsed.text_body.as_deref().map(str::trim), Some("Text part"));
        assert_eq!(
            parsed.html_body.as_deref().map(str::trim),
            Some("<p>HTML part</p>")
        );
    }

    #[test]
    fn test_parse_email_with_base64_attachment() {
        let message = concat!(
            "From: a@example.com\r\n",
            "Subject: Report\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"bound\"\r\n",
            "\r\n",
            "--bound\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "See attached\r\n",
            "--bound\r\n",
            "Content-Type: application/pdf; name=\"file.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"file.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n\r\n",
            "SGVsbG8gV29ybGQ=\r\n",
            "--bound--\r\n",
        );

        let parsed = MimeParser::parse(message.as_bytes());

        assert_eq!(parsed.attachment_count(), 1);
        let attachment = &parsed.attachments[0];
        assert_eq!(attachment.filename.as_deref(), Some("file.pdf"));
        assert_eq!(attachment.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(attachment.content, b"Hello World");
        assert_eq!(attachment.size(), 11);
    }

    #[test]
    fn test_parse_cc_addresses() {
        let message = b"From: a@example.com\r\nCc: Bob <bob@example.com>, carol@example.com\r\nSubject: cc\r\n\r\nbody";
        let parsed = MimeParser::parse(message);

        assert_eq!(parsed.cc, vec!["bob@example.com", "carol@example.com"]);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let message = b"From: a@example.com\r\nSubject: Same\r\n\r\nbody";
        let first = MimeParser::parse(message);
        let second = MimeParser::parse(message);

        assert_eq!(first.headers, second.headers);
        assert_eq!(first.subject, second.subject);
        assert_eq!(first.text_body, second.text_body);
    }

    #[test]
    fn test_empty_rfc822_message_does_not_panic() {
        let parsed = MimeParser::parse(b"From: a@b.c\r\nContent-Type: message/rfc822\r\n\r\n");

        assert_eq!(parsed.header("from"), Some("a@b.c"));
        assert_eq!(parsed.header("content-type"), Some("message/rfc822"));
    }

    #[test]
    fn test_empty_rfc822_attachment_does_not_panic() {
        let message = concat!(
            "From: mailer-daemon@example.com\r\n",
            "Subject: Undeliverable\r\n",
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "Delivery failed\r\n",
            "--b\r\n",
            "Content-Type: message/rfc822\r\n\r\n",
            "--b--\r\n",
        );

        let parsed = MimeParser::parse(message.as_bytes());

        assert_eq!(parsed.subject.as_deref(), Some("Undeliverable"));
        assert_eq!(parsed.text_body.as_deref().map(str::trim), Some("Delivery failed"));
        for attachment in &parsed.attachments {
            assert!(attachment.size() <= message.len());
        }
    }

    #[test]
    fn test_parsed_headers_are_unfolded_in_order() {
        let message = b"Received: from a\r\nReceived: from b\r\n\tby c\r\nX-Custom: kept\r\nSubject: Hi\r\n\r\nbody";
        let parsed = MimeParser::parse(message);

        let keys: Vec<&str> = parsed.headers.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["received", "received", "x-custom", "subject"]);
        assert_eq!(parsed.headers[1].value, "from b by c");
        assert_eq!(parsed.header("X-Custom"), Some("kept"));
    }

    #[test]
    fn test_truncated_multipart_does_not_panic() {
        let message = b"From: a@example.com\r\nContent-Type: multipart/mixed; boundary=\"x\"\r\n\r\n--x\r\nContent-Type: text/plain\r\n\r\nunterminated";
        let parsed = MimeParser::parse(message);

        assert_eq!(parsed.header("from"), Some("a@example.com"));
    }
}
