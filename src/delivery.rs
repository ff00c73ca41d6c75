//! Delivery dispatcher
//!
//! The finished archive leaves the machine through exactly one strategy per
//! run, either as an email attachment or as an FTP upload. Both are fatal on
//! failure; local artifacts are left in place.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fs::File;
use std::path::{Path, PathBuf};
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::{debug, info};

use crate::config::{Config, DeliveryKind, EmailSettings, FtpSettings};
use crate::error::GrabberError;

/// Something that can ship the run archive to its destination
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Destination description for logs
    fn describe(&self) -> String;

    async fn deliver(&self, archive: &Path) -> Result<()>;
}

/// Pick and build the strategy selected by the configuration
pub fn from_config(config: &Config) -> Result<Box<dyn Delivery>, GrabberError> {
    Ok(match config.delivery_kind()? {
        DeliveryKind::Email => Box::new(EmailDelivery::new(config.email_settings()?)),
        DeliveryKind::Ftp => Box::new(FtpDelivery::new(config.ftp_settings()?)),
    })
}

fn archive_name(archive: &Path) -> Result<String> {
    archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("archive path {:?} has no file name", archive))
}

pub struct EmailDelivery {
    settings: EmailSettings,
}

impl EmailDelivery {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    /// Multipart message: plain-text body plus the archive as an octet-stream attachment
    pub fn build_message(&self, archive: &Path) -> Result<Message> {
        let s = &self.settings;
        let from = s
            .sender_email
            .parse::<Mailbox>()
            .context(format!("Invalid sender_email {:?}", s.sender_email))?;

        let mut builder = Message::builder().from(from).subject(s.subject.clone());
        for receiver in s.receiver_email.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            let to = receiver
                .parse::<Mailbox>()
                .context(format!("Invalid receiver_email {:?}", receiver))?;
            builder = builder.to(to);
        }

        let data = std::fs::read(archive)
            .context(format!("Failed to read archive {:?}", archive))?;
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|e| anyhow!("{}", e))?;
        let attachment = Attachment::new(archive_name(archive)?).body(data, content_type);

        let message = builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(s.body.clone()))
                    .singlepart(attachment),
            )
            .context("Failed to build email")?;
        Ok(message)
    }
}

#[async_trait]
impl Delivery for EmailDelivery {
    fn describe(&self) -> String {
        format!("email to {} from {}", self.settings.receiver_email, self.settings.sender_email)
    }

    async fn deliver(&self, archive: &Path) -> Result<()> {
        let s = &self.settings;
        let message = self.build_message(archive)?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&s.smtp_host)
            .map_err(|e| GrabberError::Delivery(format!("smtp relay {}: {}", s.smtp_host, e)))?
            .port(s.smtp_port)
            .credentials(Credentials::new(s.sender_email.clone(), s.password.clone()))
            .build();

        debug!("Connecting to {}:{}", s.smtp_host, s.smtp_port);
        mailer
            .send(message)
            .await
            .map_err(|e| GrabberError::Delivery(format!("smtp send via {}: {}", s.smtp_host, e)))?;

        info!("sent email to {} successfully", s.receiver_email);
        Ok(())
    }
}

pub struct FtpDelivery {
    settings: FtpSettings,
}

impl FtpDelivery {
    pub fn new(settings: FtpSettings) -> Self {
        Self { settings }
    }

    /// Blocking upload session: connect, login, cwd, binary put, quit
    fn upload(settings: &FtpSettings, archive: &Path) -> Result<u64> {
        let name = archive_name(archive)?;
        let mut ftp = FtpStream::connect((settings.host.as_str(), settings.port))
            .map_err(|e| GrabberError::Delivery(format!("ftp connect {}:{}: {}", settings.host, settings.port, e)))?;

        ftp.login(&settings.username, &settings.password)
            .map_err(|e| GrabberError::Delivery(format!("ftp login as {}: {}", settings.username, e)))?;

        if let Some(dir) = &settings.remote_dir {
            ftp.cwd(dir)
                .map_err(|e| GrabberError::Delivery(format!("ftp cwd {}: {}", dir, e)))?;
        }
        ftp.transfer_type(FileType::Binary)
            .map_err(|e| GrabberError::Delivery(format!("ftp binary mode: {}", e)))?;

        let mut file = File::open(archive)
            .context(format!("Failed to open archive {:?}", archive))?;
        let written = ftp
            .put_file(name.as_str(), &mut file)
            .map_err(|e| GrabberError::Delivery(format!("ftp upload {}: {}", name, e)))?;

        // The file is already stored; a failed QUIT is not worth failing the run
        if let Err(e) = ftp.quit() {
            debug!("ftp quit: {}", e);
        }
        Ok(written)
    }
}

#[async_trait]
impl Delivery for FtpDelivery {
    fn describe(&self) -> String {
        let dir = self.settings.remote_dir.as_deref().unwrap_or("~");
        format!("ftp://{}@{}:{}/{}", self.settings.username, self.settings.host, self.settings.port, dir.trim_start_matches('/'))
    }

    async fn deliver(&self, archive: &Path) -> Result<()> {
        let settings = self.settings.clone();
        let archive: PathBuf = archive.to_path_buf();

        let written = tokio::task::spawn_blocking(move || Self::upload(&settings, &archive))
            .await
            .map_err(|e| anyhow!("Task failed: {}", e))??;

        info!("uploaded {} bytes to {}", written, self.describe());
        Ok(())
    }
}
