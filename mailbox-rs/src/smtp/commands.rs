use crate::error::{MailError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    /// Reverse path; empty for bounces (`MAIL FROM:<>`)
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Quit,
    Noop,
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(MailError::SmtpProtocol("Empty command".to_string()));
        }

        let (command, args) = match line.split_once(' ') {
            Some((command, args)) => (command.to_uppercase(), args.trim()),
            None => (line.to_uppercase(), ""),
        };

        match command.as_str() {
            "HELO" | "EHLO" => {
                if args.is_empty() {
                    return Err(MailError::SmtpProtocol(format!(
                        "{} requires domain",
                        command
                    )));
                }
                if command == "HELO" {
                    Ok(SmtpCommand::Helo(args.to_string()))
                } else {
                    Ok(SmtpCommand::Ehlo(args.to_string()))
                }
            }
            "MAIL" => Ok(SmtpCommand::MailFrom(Self::parse_path(args, "FROM:")?)),
            "RCPT" => {
                let to = Self::parse_path(args, "TO:")?;
                if to.is_empty() {
                    return Err(MailError::SmtpProtocol("Empty recipient".to_string()));
                }
                Ok(SmtpCommand::RcptTo(to))
            }
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "QUIT" => Ok(SmtpCommand::Quit),
            "NOOP" => Ok(SmtpCommand::Noop),
            _ => Ok(SmtpCommand::Unknown(command)),
        }
    }

    /// Extract the address from `FROM:<addr> [params]` / `TO:<addr> [params]`
    fn parse_path(args: &str, prefix: &str) -> Result<String> {
        let has_prefix = args
            .get(..prefix.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(prefix));
        if !has_prefix {
            return Err(MailError::SmtpProtocol(format!(
                "Invalid syntax, expected {}<address>",
                prefix
            )));
        }

        let rest = args[prefix.len()..].trim_start();

        let address = if let Some(stripped) = rest.strip_prefix('<') {
            match stripped.find('>') {
                Some(end) => &stripped[..end],
                None => {
                    return Err(MailError::SmtpProtocol("Unterminated address".to_string()))
                }
            }
        } else {
            // Bare address, ESMTP parameters follow after a space
            rest.split_whitespace().next().unwrap_or("")
        };

        Ok(address.trim().to_string())
    }
}
