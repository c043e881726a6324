use serde::{Deserialize, Serialize};

/// A single header line, in source order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Lower-cased header name
    pub key: String,
    /// Unfolded header value
    pub value: String,
}

/// An attachment decoded from a MIME part
#[derive(Debug, Clone, Default)]
pub struct AttachmentPart {
    /// Filename from Content-Disposition or Content-Type
    pub filename: Option<String>,
    /// e.g. "application/pdf"
    pub mime_type: Option<String>,
    /// Decoded content
    pub content: Vec<u8>,
}

impl AttachmentPart {
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Parsed email with separated parts
#[derive(Debug, Clone, Default)]
pub struct ParsedEmail {
    /// Headers in the order they appear
    pub headers: Vec<Header>,
    pub subject: Option<String>,
    /// Plain text body (if present)
    pub text_body: Option<String>,
    /// HTML body (if present)
    pub html_body: Option<String>,
    /// List of attachments
    pub attachments: Vec<AttachmentPart>,
    /// Addresses from the Cc header
    pub cc: Vec<String>,
}

impl ParsedEmail {
    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Header list serialized as a JSON array of `{key, value}`
    pub fn headers_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.headers)
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// True when nothing could be extracted
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.subject.is_none()
            && self.text_body.is_none()
            && self.html_body.is_none()
            && self.attachments.is_empty()
            && self.cc.is_empty()
    }
}
