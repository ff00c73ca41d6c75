//! Configuration module for the merchant data grabber
//!
//! The configuration is a flat JSON document. Field names follow the vendor
//! deployment files as-is (including the `stmp` spelling for the SMTP host).

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GrabberError;

const DEFAULT_FTP_PORT: u16 = 21;

/// Which delivery strategy to wire into the pipeline
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    Email,
    Ftp,
}

/// Repeat the run every N minutes instead of running once
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval_minutes: u64,
}

impl ScheduleConfig {
    /// Interval as a duration; zero or overflowing minutes are rejected
    pub fn period(&self) -> Result<Duration, GrabberError> {
        if self.interval_minutes == 0 {
            return Err(GrabberError::Config("`schedule.interval_minutes` must be at least 1".into()));
        }
        self.interval_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                GrabberError::Config(format!(
                    "`schedule.interval_minutes` is too large: {}",
                    self.interval_minutes
                ))
            })
    }
}

/// Main configuration structure
#[derive(Clone, Deserialize)]
pub struct Config {
    /// API account, also sent as `sys_email`
    pub username: String,
    pub password: String,
    /// Sent as `sys_token`
    pub merchant_code: String,
    /// Only the first entry is used
    pub store_code: Vec<String>,
    /// API gateway base URL (e.g. "https://opendatabank-apigw.example.com")
    pub url: String,
    /// Root of the per-run output directories
    pub output_dir: PathBuf,
    /// IANA timezone name used to compute today/yesterday
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub receiver_email: Option<String>,
    #[serde(default)]
    pub email_password: Option<String>,
    #[serde(default, rename = "stmp")]
    pub smtp_host: Option<String>,
    #[serde(default, rename = "stmp_port")]
    pub smtp_port: Option<u16>,

    #[serde(default)]
    pub ftp_host: Option<String>,
    #[serde(default)]
    pub ftp_port: Option<u16>,
    #[serde(default)]
    pub ftp_username: Option<String>,
    #[serde(default)]
    pub ftp_password: Option<String>,
    #[serde(default)]
    pub ftp_output_dir: Option<String>,

    pub log_dir: PathBuf,

    /// Explicit delivery selection; inferred from the configured transports when absent
    #[serde(default)]
    pub delivery: Option<DeliveryKind>,
    /// Restrict the run to these dataset names
    #[serde(default)]
    pub datasets: Option<Vec<String>>,
    /// Override the public-sales projection list
    #[serde(default)]
    pub public_sales_columns: Option<Vec<String>>,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

/// Everything the email strategy needs, all fields present
#[derive(Clone)]
pub struct EmailSettings {
    pub subject: String,
    pub body: String,
    pub sender_email: String,
    pub receiver_email: String,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

/// Everything the FTP strategy needs, all fields present
#[derive(Clone)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_dir: Option<String>,
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, GrabberError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GrabberError::Config(format!("missing `{}`", field)))
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)
            .context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field rules serde cannot express
    pub fn validate(&self) -> Result<(), GrabberError> {
        self.store_code()?;
        self.tz()?;
        self.delivery_kind()?;

        if let Some(schedule) = &self.schedule {
            schedule.period()?;
        }
        Ok(())
    }

    /// First configured store code
    pub fn store_code(&self) -> Result<&str, GrabberError> {
        self.store_code
            .first()
            .map(String::as_str)
            .ok_or_else(|| GrabberError::Config("`store_code` must contain at least one entry".into()))
    }

    /// Parsed timezone, `None` means the local system zone
    pub fn tz(&self) -> Result<Option<Tz>, GrabberError> {
        match &self.timezone {
            None => Ok(None),
            Some(name) => name
                .parse::<Tz>()
                .map(Some)
                .map_err(|e| GrabberError::Config(format!("unknown timezone {:?}: {}", name, e))),
        }
    }

    /// Delivery strategy: explicit `delivery`, else email if `stmp` is set, else FTP if `ftp_host` is set
    pub fn delivery_kind(&self) -> Result<DeliveryKind, GrabberError> {
        if let Some(kind) = self.delivery {
            return Ok(kind);
        }
        if self.smtp_host.is_some() {
            Ok(DeliveryKind::Email)
        } else if self.ftp_host.is_some() {
            Ok(DeliveryKind::Ftp)
        } else {
            Err(GrabberError::Config("no delivery configured (set `stmp` or `ftp_host`)".into()))
        }
    }

    pub fn email_settings(&self) -> Result<EmailSettings, GrabberError> {
        Ok(EmailSettings {
            subject: self.subject.clone().unwrap_or_default(),
            body: self.body.clone().unwrap_or_default(),
            sender_email: required(&self.sender_email, "sender_email")?.to_string(),
            receiver_email: required(&self.receiver_email, "receiver_email")?.to_string(),
            password: required(&self.email_password, "email_password")?.to_string(),
            smtp_host: required(&self.smtp_host, "stmp")?.to_string(),
            smtp_port: self
                .smtp_port
                .ok_or_else(|| GrabberError::Config("missing `stmp_port`".into()))?,
        })
    }

    pub fn ftp_settings(&self) -> Result<FtpSettings, GrabberError> {
        Ok(FtpSettings {
            host: required(&self.ftp_host, "ftp_host")?.to_string(),
            port: self.ftp_port.unwrap_or(DEFAULT_FTP_PORT),
            username: required(&self.ftp_username, "ftp_username")?.to_string(),
            password: required(&self.ftp_password, "ftp_password")?.to_string(),
            remote_dir: self.ftp_output_dir.clone().filter(|d| !d.is_empty()),
        })
    }
}

const HIDDEN: &str = "HIDDEN";

fn hide(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| HIDDEN)
}

impl fmt::Debug for Config {
    /// Obfuscate the passwords
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("username", &self.username)
            .field("password", &HIDDEN)
            .field("merchant_code", &self.merchant_code)
            .field("store_code", &self.store_code)
            .field("url", &self.url)
            .field("output_dir", &self.output_dir)
            .field("timezone", &self.timezone)
            .field("sender_email", &self.sender_email)
            .field("receiver_email", &self.receiver_email)
            .field("email_password", &hide(&self.email_password))
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("ftp_host", &self.ftp_host)
            .field("ftp_port", &self.ftp_port)
            .field("ftp_username", &self.ftp_username)
            .field("ftp_password", &hide(&self.ftp_password))
            .field("ftp_output_dir", &self.ftp_output_dir)
            .field("log_dir", &self.log_dir)
            .field("delivery", &self.delivery)
            .field("datasets", &self.datasets)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "username": "ops@example.com",
        "password": "secret",
        "merchant_code": "M0001",
        "store_code": ["S0001", "S0002"],
        "url": "https://gw.example.com",
        "output_dir": "/data/grabber",
        "timezone": "Asia/Hong_Kong",
        "subject": "Daily export",
        "body": "See attachment",
        "sender_email": "bot@example.com",
        "receiver_email": "ops@example.com",
        "email_password": "mailpass",
        "stmp": "smtp.example.com",
        "stmp_port": 465,
        "log_dir": "/var/log/grabber"
    }"#;

    #[test]
    fn test_config_parsing() {
        let config = Config::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.store_code().unwrap(), "S0001");
        assert_eq!(config.smtp_host.as_deref(), Some("smtp.example.com"));
        assert_eq!(config.smtp_port, Some(465));
        assert_eq!(config.delivery_kind().unwrap(), DeliveryKind::Email);
        assert_eq!(config.tz().unwrap(), Some(chrono_tz::Asia::Hong_Kong));
        assert!(config.schedule.is_none());
    }

    #[test]
    fn test_empty_store_code_rejected() {
        let json = SAMPLE.replace(r#"["S0001", "S0002"]"#, "[]");
        let err = Config::from_json_str(&json).unwrap_err();
        assert!(err.to_string().contains("store_code"));
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let json = SAMPLE.replace("Asia/Hong_Kong", "Mars/Olympus");
        assert!(Config::from_json_str(&json).is_err());
    }

    #[test]
    fn test_ftp_inferred_without_smtp() {
        let json = r#"{
            "username": "u", "password": "p", "merchant_code": "m",
            "store_code": ["s"], "url": "http://localhost", "output_dir": "/tmp/out",
            "ftp_host": "ftp.example.com", "ftp_username": "f", "ftp_password": "fp",
            "ftp_output_dir": "/incoming", "log_dir": "/tmp/log"
        }"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.delivery_kind().unwrap(), DeliveryKind::Ftp);

        let ftp = config.ftp_settings().unwrap();
        assert_eq!(ftp.port, 21);
        assert_eq!(ftp.remote_dir.as_deref(), Some("/incoming"));
    }

    #[test]
    fn test_no_delivery_rejected() {
        let json = r#"{
            "username": "u", "password": "p", "merchant_code": "m",
            "store_code": ["s"], "url": "http://localhost", "output_dir": "/tmp/out",
            "log_dir": "/tmp/log"
        }"#;
        assert!(Config::from_json_str(json).is_err());
    }

    #[test]
    fn test_email_settings_require_password() {
        let mut config = Config::from_json_str(SAMPLE).unwrap();
        config.email_password = None;
        let err = config.email_settings().err().unwrap();
        assert!(err.to_string().contains("email_password"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let json = SAMPLE.replace(
            r#""log_dir": "/var/log/grabber""#,
            r#""log_dir": "/var/log/grabber", "schedule": {"interval_minutes": 0}"#,
        );
        assert!(Config::from_json_str(&json).is_err());
    }

    #[test]
    fn test_huge_interval_rejected() {
        let json = SAMPLE.replace(
            r#""log_dir": "/var/log/grabber""#,
            r#""log_dir": "/var/log/grabber", "schedule": {"interval_minutes": 18446744073709551615}"#,
        );
        let err = Config::from_json_str(&json).unwrap_err();
        assert!(format!("{:#}", err).contains("too large"));

        let every = ScheduleConfig { interval_minutes: 15 };
        assert_eq!(every.period().unwrap(), Duration::from_secs(900));
    }

    #[test]
    fn test_debug_hides_passwords() {
        let config = Config::from_json_str(SAMPLE).unwrap();
        let shown = format!("{:?}", config);
        assert!(!shown.contains("secret"));
        assert!(!shown.contains("mailpass"));
        assert!(shown.contains("HIDDEN"));
    }
}
