//! Merchant Data Grabber Library
//!
//! Pulls the daily merchant analytics datasets (public sales, products,
//! traffic, wishlist, ...) from the vendor API gateway, writes them as CSV,
//! bundles them into one zip per run window and ships that zip by email or FTP.

pub mod config;
pub mod error;
pub mod logging;
pub mod run_context;
pub mod table;
pub mod dataset;
pub mod downloader;
pub mod api_client;
pub mod gate;
pub mod archive;
pub mod delivery;
pub mod pipeline;
pub mod schedule;

// Re-export commonly used types
pub use config::{Config, DeliveryKind, EmailSettings, FtpSettings, ScheduleConfig};
pub use error::GrabberError;
pub use run_context::{RunContext, RunDates};
pub use table::{project, Table};
pub use dataset::{default_catalog, DatasetKind, DatasetSpec, MerchantIdentity, SaveSuffix};
pub use downloader::Downloader;
pub use api_client::{AccessToken, ApiClient, Credentials};
pub use gate::{GateOutcome, PersistenceGate};
pub use archive::{cleanup, package, PackageOutcome};
pub use delivery::{Delivery, EmailDelivery, FtpDelivery};
pub use pipeline::{Pipeline, RunReport, SkippedDataset};
