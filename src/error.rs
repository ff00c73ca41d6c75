//! Failure taxonomy of a grabber run
//!
//! Fatal conditions abort the run and bubble up through `anyhow`; recoverable
//! ones are logged by the caller and turn into an omitted dataset.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrabberError {
    /// Token endpoint refused the credentials (fatal)
    #[error("retrieve access token failed. response code: {status}")]
    Auth { status: u16 },

    /// A dataset endpoint answered with a non-200 status (recoverable)
    #[error("get {dataset} data failed. response code: {status}")]
    Http { dataset: String, status: u16 },

    /// The public-sales link request succeeded but carried no `presigned_url` (recoverable)
    #[error("no presigned_url returned for {dataset}")]
    MissingLink { dataset: String },

    /// A produced file disappeared before packaging (fatal)
    #[error("cannot package missing file: {path:?}")]
    Packaging { path: PathBuf },

    /// SMTP or FTP transport failure (fatal)
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Invalid or incomplete configuration (fatal)
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GrabberError {
    /// Whether the run can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GrabberError::Http { .. } | GrabberError::MissingLink { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(GrabberError::Http { dataset: "Merchant_User".into(), status: 500 }.is_recoverable());
        assert!(GrabberError::MissingLink { dataset: "Public_Transaction".into() }.is_recoverable());
        assert!(!GrabberError::Auth { status: 401 }.is_recoverable());
        assert!(!GrabberError::Packaging { path: PathBuf::from("/tmp/x.csv") }.is_recoverable());
        assert!(!GrabberError::Delivery("smtp down".into()).is_recoverable());
    }

    #[test]
    fn test_auth_message_carries_status() {
        let err = GrabberError::Auth { status: 401 };
        assert_eq!(err.to_string(), "retrieve access token failed. response code: 401");
    }
}
