use crate::config::SmtpConfig;
use crate::error::Result;
use crate::intake::IntakePipeline;
use crate::smtp::session::SmtpSession;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accepts inbound SMTP connections and hands each one a session
pub struct SmtpServer {
    config: SmtpConfig,
    hostname: String,
    intake: IntakePipeline,
}

impl SmtpServer {
    pub fn new(config: SmtpConfig, hostname: String, intake: IntakePipeline) -> Self {
        Self {
            config,
            hostname,
            intake,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        info!("SMTP server listening on {}", self.config.listen_addr);
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("New SMTP connection from {}", addr);

                    let session = SmtpSession::new(
                        self.hostname.clone(),
                        self.intake.clone(),
                        self.config.max_message_size,
                    );

                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket).await {
                            error!("Session error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
