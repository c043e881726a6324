/// MIME message decoding
///
/// Turns a raw transport-level message into headers, bodies and
/// attachments. Decoding is best-effort and never returns an error.

pub mod parser;
pub mod types;

pub use parser::MimeParser;
pub use types::{AttachmentPart, Header, ParsedEmail};
