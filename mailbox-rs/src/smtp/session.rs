use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{MailError, Result};
use crate::intake::IntakePipeline;
use crate::smtp::commands::SmtpCommand;
use crate::utils::validate_email;

/// Maximum number of recipients per message
const MAX_RECIPIENTS: usize = 100;

/// Maximum line length in SMTP protocol (RFC 5321)
const MAX_LINE_LENGTH: usize = 1000;

/// Timeout for reading a command line
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300); // 5 minutes

/// Timeout for reading DATA content
const DATA_TIMEOUT: Duration = Duration::from_secs(600); // 10 minutes

/// Maximum number of errors before disconnecting
const MAX_ERRORS: usize = 10;

/// Length of the `.\r\n` line ending DATA
const DATA_TERMINATOR_LEN: usize = 3;

/// Read one line into `line`, keeping at most `limit` bytes of it
///
/// The rest of an overlong line is consumed and dropped. Returns the bytes
/// consumed from the stream and whether the line was cut short.
async fn read_line_bounded<R>(
    reader: &mut R,
    line: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<(usize, bool)>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    let mut overflow = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok((consumed, overflow));
        }

        let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (&available[..=end], true),
            None => (available, false),
        };

        let room = limit.saturating_sub(line.len());
        if chunk.len() > room {
            overflow = true;
        }
        line.extend_from_slice(&chunk[..chunk.len().min(room)]);

        let used = chunk.len();
        reader.consume(used);
        consumed += used;

        if done {
            return Ok((consumed, overflow));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SmtpState {
    Fresh,
    Greeted,
    MailFrom,
    RcptTo,
    Data,
}

/// Inbound SMTP session
///
/// Every accepted message is handed to the intake pipeline once per
/// recipient. If intake fails the client gets a transient `451` and is
/// expected to retry later.
pub struct SmtpSession {
    state: SmtpState,
    from: Option<String>,
    to: Vec<String>,
    data: Vec<u8>,
    hostname: String,
    intake: IntakePipeline,
    error_count: usize,
    max_message_size: usize,
}

impl SmtpSession {
    pub fn new(hostname: String, intake: IntakePipeline, max_message_size: usize) -> Self {
        Self {
            state: SmtpState::Fresh,
            from: None,
            to: Vec::new(),
            data: Vec::new(),
            hostname,
            intake,
            error_count: 0,
            max_message_size,
        }
    }

    /// Run the session until QUIT, disconnect or too many errors
    pub async fn handle<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf_reader = BufReader::new(stream);

        buf_reader
            .write_all(format!("220 {} ESMTP Service Ready\r\n", self.hostname).as_bytes())
            .await?;

        let mut line = Vec::new();

        loop {
            if self.error_count >= MAX_ERRORS {
                warn!("Too many errors, disconnecting");
                buf_reader
                    .write_all(b"421 Too many errors, closing connection\r\n")
                    .await?;
                return Ok(());
            }

            line.clear();

            let read = read_line_bounded(&mut buf_reader, &mut line, MAX_LINE_LENGTH);
            let (n, overflow) = match timeout(COMMAND_TIMEOUT, read).await {
                Ok(Ok(read)) => read,
                Ok(Err(e)) => {
                    error!("IO error reading line: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("Command timeout, disconnecting");
                    buf_reader
                        .write_all(b"421 Timeout, closing connection\r\n")
                        .await?;
                    return Ok(());
                }
            };

            if n == 0 {
                debug!("Client disconnected");
                return Ok(());
            }

            if overflow {
                error!("Line too long: {} bytes", n);
                buf_reader.write_all(b"500 Line too long\r\n").await?;
                self.error_count += 1;
                continue;
            }

            let text = String::from_utf8_lossy(&line);
            let line_trimmed = text.trim_end();
            debug!("Received: {}", line_trimmed);

            let cmd = match SmtpCommand::parse(line_trimmed) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("Command parse error: {}", e);
                    buf_reader
                        .write_all(b"501 Syntax error in parameters or arguments\r\n")
                        .await?;
                    self.error_count += 1;
                    continue;
                }
            };

            let response = match self.handle_command(cmd) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Rejected command: {}", e);
                    self.error_count += 1;
                    format!("553 {}\r\n", e)
                }
            };

            buf_reader.write_all(response.as_bytes()).await?;

            if response.starts_with("221") {
                return Ok(());
            }

            if self.state == SmtpState::Data {
                let reply = match self.receive_data(&mut buf_reader).await {
                    Ok(()) => self.deliver().await,
                    Err(MailError::SmtpProtocol(reason)) => {
                        self.error_count += 1;
                        format!("552 {}\r\n", reason)
                    }
                    Err(e) => return Err(e),
                };

                buf_reader.write_all(reply.as_bytes()).await?;
                self.reset_transaction();
            }
        }
    }

    fn handle_command(&mut self, cmd: SmtpCommand) -> Result<String> {
        match (&self.state, cmd) {
            (SmtpState::Fresh, SmtpCommand::Helo(domain)) => {
                info!("HELO from {}", domain);
                self.state = SmtpState::Greeted;
                Ok(format!("250 {} Hello {}\r\n", self.hostname, domain))
            }
            (SmtpState::Fresh, SmtpCommand::Ehlo(domain)) => {
                info!("EHLO from {}", domain);
                self.state = SmtpState::Greeted;
                Ok(format!(
                    "250-{} Hello {}\r\n250-SIZE {}\r\n250-8BITMIME\r\n250 HELP\r\n",
                    self.hostname, domain, self.max_message_size
                ))
            }
            (
                SmtpState::Greeted | SmtpState::MailFrom | SmtpState::RcptTo,
                SmtpCommand::MailFrom(from),
            ) => {
                // Null reverse path is allowed for bounces
                if !from.is_empty() {
                    validate_email(&from)?;
                }

                info!("MAIL FROM: <{}>", from);
                self.from = Some(from);
                self.to.clear();
                self.data.clear();
                self.state = SmtpState::MailFrom;
                Ok("250 OK\r\n".to_string())
            }
            (SmtpState::MailFrom | SmtpState::RcptTo, SmtpCommand::RcptTo(to)) => {
                validate_email(&to)?;

                if self.to.len() >= MAX_RECIPIENTS {
                    warn!("Too many recipients: {}", self.to.len());
                    return Ok(format!(
                        "452 Too many recipients (max {})\r\n",
                        MAX_RECIPIENTS
                    ));
                }

                info!("RCPT TO: {}", to);
                self.to.push(to);
                self.state = SmtpState::RcptTo;
                Ok("250 OK\r\n".to_string())
            }
            (SmtpState::RcptTo, SmtpCommand::Data) => {
                self.state = SmtpState::Data;
                Ok("354 Start mail input; end with <CRLF>.<CRLF>\r\n".to_string())
            }
            (SmtpState::Fresh, SmtpCommand::Rset) => Ok("250 OK\r\n".to_string()),
            (_, SmtpCommand::Rset) => {
                self.reset_transaction();
                Ok("250 OK\r\n".to_string())
            }
            (_, SmtpCommand::Noop) => Ok("250 OK\r\n".to_string()),
            (_, SmtpCommand::Quit) => {
                info!("QUIT command");
                Ok(format!("221 {} closing connection\r\n", self.hostname))
            }
            (_, SmtpCommand::Unknown(cmd)) => {
                warn!("Unknown command: {}", cmd);
                Ok("502 Command not implemented\r\n".to_string())
            }
            _ => {
                warn!("Invalid command sequence");
                Ok("503 Bad sequence of commands\r\n".to_string())
            }
        }
    }

    /// Read the message body up to the terminating `.` line
    ///
    /// Lines are read as raw bytes so 8-bit content survives unchanged.
    /// No line is buffered past what the size limit still allows. An
    /// oversized message is drained to its end before the error is
    /// returned, keeping the connection in sync.
    async fn receive_data<S>(&mut self, buf_reader: &mut BufReader<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut line = Vec::new();
        let mut too_large = false;

        loop {
            line.clear();

            // Room for the remaining budget plus a stuffed dot and CRLF
            let limit = if too_large {
                DATA_TERMINATOR_LEN
            } else {
                self.max_message_size.saturating_sub(self.data.len()) + DATA_TERMINATOR_LEN
            };

            let read = read_line_bounded(buf_reader, &mut line, limit);
            let (n, overflow) = match timeout(DATA_TIMEOUT, read).await {
                Ok(Ok(read)) => read,
                Ok(Err(e)) => {
                    error!("IO error during DATA: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    warn!("DATA timeout");
                    return Err(MailError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "Timeout during DATA",
                    )));
                }
            };

            if n == 0 {
                return Err(MailError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Connection closed during DATA",
                )));
            }

            if !overflow && (line == b".\r\n" || line == b".\n") {
                break;
            }

            if too_large {
                continue;
            }

            if overflow {
                warn!("Message too large: over {} bytes", self.max_message_size);
                too_large = true;
                self.data.clear();
                continue;
            }

            // Transparency: a leading dot was doubled by the client
            let content = if line.starts_with(b".") {
                &line[1..]
            } else {
                &line[..]
            };

            if self.data.len() + content.len() > self.max_message_size {
                warn!(
                    "Message too large: over {} bytes",
                    self.max_message_size
                );
                too_large = true;
                self.data.clear();
                continue;
            }

            self.data.extend_from_slice(content);
        }

        if too_large {
            return Err(MailError::SmtpProtocol(format!(
                "Message exceeds fixed maximum message size ({} bytes)",
                self.max_message_size
            )));
        }

        if self.data.is_empty() {
            return Err(MailError::SmtpProtocol("Empty message".to_string()));
        }

        info!("End of DATA received, total size: {} bytes", self.data.len());
        Ok(())
    }

    /// Run intake for every recipient and build the final reply
    async fn deliver(&self) -> String {
        let from = self.from.as_deref().unwrap_or_default();

        for recipient in &self.to {
            if let Err(e) = self.intake.handle_inbound(&self.data, from, recipient).await {
                error!("Intake failed for message to {}: {}", recipient, e);
                return "451 Requested action aborted: local error in processing\r\n".to_string();
            }
        }

        "250 OK: Message accepted\r\n".to_string()
    }

    fn reset_transaction(&mut self) {
        self.from = None;
        self.to.clear();
        self.data.clear();
        self.state = SmtpState::Greeted;
    }
}
