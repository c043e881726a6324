//! SMTP relay client
//!
//! Re-submits a received message, byte for byte, to a smarthost for
//! delivery to the configured destination address.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::{MailError, Result};
use crate::intake::Relay;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwards messages through an SMTP smarthost
///
/// # Examples
/// ```no_run
/// use mailbox_rs::intake::Relay;
/// use mailbox_rs::smtp::SmtpRelay;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let relay = SmtpRelay::new("127.0.0.1:25".to_string(), "mail.example.com".to_string());
/// relay.forward(
///     b"Subject: Test\r\n\r\nHello!",
///     "sender@example.com",
///     "owner@example.org",
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub struct SmtpRelay {
    server_addr: String,
    hostname: String,
}

impl SmtpRelay {
    pub fn new(server_addr: String, hostname: String) -> Self {
        Self {
            server_addr,
            hostname,
        }
    }

    /// Run one SMTP transaction delivering `data` to `to`
    async fn send_mail(&self, from: &str, to: &str, data: &[u8]) -> Result<()> {
        let stream = with_timeout(TcpStream::connect(&self.server_addr)).await?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let greeting = self.read_response(&mut reader, "220").await?;
        debug!("Received greeting: {}", greeting.trim());

        self.write_line(&mut writer, &format!("EHLO {}", self.hostname))
            .await?;
        self.read_response(&mut reader, "250").await?;

        self.write_line(&mut writer, &format!("MAIL FROM:<{}>", from))
            .await?;
        self.read_response(&mut reader, "250").await?;

        self.write_line(&mut writer, &format!("RCPT TO:<{}>", to))
            .await?;
        self.read_response(&mut reader, "25").await?;

        self.write_line(&mut writer, "DATA").await?;
        self.read_response(&mut reader, "354").await?;

        with_timeout(writer.write_all(&dot_stuff(data))).await?;
        self.read_response(&mut reader, "250").await?;

        self.write_line(&mut writer, "QUIT").await?;
        // The message is accepted at this point; a missing 221 is harmless
        let _ = self.read_line(&mut reader).await;

        Ok(())
    }

    async fn read_line<R>(&self, reader: &mut BufReader<R>) -> Result<String>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut line = String::new();
        let read = with_timeout(reader.read_line(&mut line)).await?;
        if read == 0 {
            return Err(MailError::Relay(format!(
                "{} closed the connection",
                self.server_addr
            )));
        }
        Ok(line)
    }

    /// Read a (possibly multi-line) reply and check its code prefix
    async fn read_response<R>(&self, reader: &mut BufReader<R>, expected: &str) -> Result<String>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut full_response = String::new();

        loop {
            let line = self.read_line(reader).await?;
            debug!("< {}", line.trim());

            full_response.push_str(&line);

            // Last line has a space (or nothing) after the code
            if line.len() < 4 || line.as_bytes()[3] != b'-' {
                break;
            }
        }

        if !full_response.starts_with(expected) {
            error!("Unexpected response from {}: {}", self.server_addr, full_response.trim());
            return Err(MailError::SmtpProtocol(format!(
                "Expected {}, got: {}",
                expected,
                full_response.trim()
            )));
        }

        Ok(full_response)
    }

    async fn write_line<W>(&self, writer: &mut W, line: &str) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        debug!("> {}", line);
        with_timeout(writer.write_all(format!("{}\r\n", line).as_bytes())).await?;
        Ok(())
    }
}

#[async_trait]
impl Relay for SmtpRelay {
    async fn forward(&self, raw: &[u8], from: &str, to: &str) -> Result<()> {
        info!("Relaying message from {} to {} via {}", from, to, self.server_addr);

        self.send_mail(from, to, raw).await.map_err(|e| match e {
            MailError::Relay(_) => e,
            other => MailError::Relay(format!("{} via {}: {}", to, self.server_addr, other)),
        })?;

        info!("Relayed message to {}", to);
        Ok(())
    }
}

async fn with_timeout<T, F>(future: F) -> Result<T>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    timeout(COMMAND_TIMEOUT, future)
        .await
        .map_err(|_| MailError::Relay("SMTP command timed out".to_string()))?
        .map_err(MailError::from)
}

/// Normalize line endings to CRLF, escape leading dots and append the
/// end-of-data marker
fn dot_stuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    let mut at_line_start = true;

    for (i, &b) in data.iter().enumerate() {
        if at_line_start && b == b'.' {
            out.push(b'.');
        }

        if b == b'\n' && (i == 0 || data[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(b);
        at_line_start = b == b'\n';
    }

    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
