//! One grabber run
//!
//! token -> (gate -> fetch -> project -> write) per dataset -> package ->
//! cleanup -> deliver. Strictly sequential; the only shared state across
//! datasets is the append-only produced-file list of the [`RunContext`].

use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::api_client::{ApiClient, Credentials};
use crate::archive::{self, PackageOutcome};
use crate::config::Config;
use crate::dataset::{self, DatasetSpec, MerchantIdentity};
use crate::delivery::{self, Delivery};
use crate::gate::{GateOutcome, PersistenceGate};
use crate::run_context::{RunContext, RunDates};

/// A dataset left out of the archive, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDataset {
    pub name: String,
    pub reason: String,
}

/// Outcome of a run that did not hit a fatal error
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// `None` when nothing was produced and packaging was skipped
    pub archive: Option<PathBuf>,
    pub delivered_to: Option<String>,
    pub produced: Vec<PathBuf>,
    pub skipped: Vec<SkippedDataset>,
}

pub struct Pipeline {
    api: ApiClient,
    credentials: Credentials,
    identity: MerchantIdentity,
    datasets: Vec<DatasetSpec>,
    output_dir: PathBuf,
    delivery: Box<dyn Delivery>,
    timezone: Option<Tz>,
}

impl Pipeline {
    pub fn new(
        api: ApiClient,
        credentials: Credentials,
        identity: MerchantIdentity,
        output_dir: impl Into<PathBuf>,
        delivery: Box<dyn Delivery>,
    ) -> Self {
        Self {
            api,
            credentials,
            identity,
            datasets: dataset::default_catalog(),
            output_dir: output_dir.into(),
            delivery,
            timezone: None,
        }
    }

    /// Wire everything from the configuration file
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = ApiClient::new(&config.url)?;
        let identity = MerchantIdentity {
            email: config.username.clone(),
            merchant_code: config.merchant_code.clone(),
            store_code: config.store_code()?.to_string(),
        };

        let mut catalog = dataset::default_catalog();
        if let Some(columns) = &config.public_sales_columns {
            for spec in catalog.iter_mut().filter(|d| d.name == dataset::PUBLIC_SALES) {
                spec.columns = Some(columns.clone());
            }
        }
        let datasets = match &config.datasets {
            Some(names) => dataset::select(catalog, names)?,
            None => catalog,
        };

        let pipeline = Self::new(
            api,
            Credentials::password_grant(&config.username, &config.password),
            identity,
            config.output_dir.clone(),
            delivery::from_config(config)?,
        )
        .with_datasets(datasets)
        .with_timezone(config.tz()?);

        Ok(pipeline)
    }

    pub fn with_datasets(mut self, datasets: Vec<DatasetSpec>) -> Self {
        self.datasets = datasets;
        self
    }

    pub fn with_timezone(mut self, timezone: Option<Tz>) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn datasets(&self) -> &[DatasetSpec] {
        &self.datasets
    }

    /// Run for the window ending today
    pub async fn run(&self) -> Result<RunReport> {
        self.run_for(RunDates::current(self.timezone)).await
    }

    pub async fn run_for(&self, dates: RunDates) -> Result<RunReport> {
        info!("Starting run for {}", dates.dir_name());

        let token = self.api.acquire_token(&self.credentials).await?;

        let mut ctx = RunContext::new(&self.output_dir, dates);
        let mut report = RunReport::default();
        let gate = PersistenceGate::new(&self.api, &self.identity);

        for spec in &self.datasets {
            match gate.ensure_dataset(spec, &token, &ctx).await? {
                GateOutcome::Existing(path) | GateOutcome::Fetched(path) => ctx.record_produced(path),
                GateOutcome::Skipped { reason } => report.skipped.push(SkippedDataset {
                    name: spec.name.clone(),
                    reason,
                }),
            }
        }
        report.produced = ctx.produced().to_vec();

        if !report.skipped.is_empty() {
            let names: Vec<&str> = report.skipped.iter().map(|s| s.name.as_str()).collect();
            warn!("Skipped datasets: {}", names.join(", "));
        }

        if ctx.produced().is_empty() {
            warn!("No dataset produced for {}, nothing to package or send", dates.dir_name());
            return Ok(report);
        }

        let archive_path = ctx.archive_path().to_path_buf();
        if archive::package(ctx.produced(), &archive_path)? == PackageOutcome::AlreadyExisted {
            info!("Reusing existing archive {:?}", archive_path);
        }
        archive::cleanup(ctx.produced(), Some(ctx.raw_download_path().as_path()));
        report.archive = Some(archive_path.clone());

        let destination = self.delivery.describe();
        info!("sending {:?} via {}...", archive_path, destination);
        self.delivery
            .deliver(&archive_path)
            .await
            .context(format!("Failed to deliver {:?}", archive_path))?;
        info!("delivered via {}", destination);
        report.delivered_to = Some(destination);

        info!(
            "Run {} finished: {} datasets packaged, {} skipped",
            dates.dir_name(),
            report.produced.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;

    #[test]
    fn test_from_config_applies_overrides() {
        let json = SAMPLE.replace(
            r#""log_dir": "/var/log/grabber""#,
            r#""log_dir": "/var/log/grabber",
               "datasets": ["Public_Transaction", "Merchant_OnlineStore"],
               "public_sales_columns": ["sku_id", "quantity"]"#,
        );
        let config = Config::from_json_str(&json).unwrap();
        let pipeline = Pipeline::from_config(&config).unwrap();

        let names: Vec<_> = pipeline.datasets().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Public_Transaction", "Merchant_OnlineStore"]);
        assert_eq!(
            pipeline.datasets()[0].columns,
            Some(vec!["sku_id".to_string(), "quantity".to_string()])
        );
    }

    #[test]
    fn test_from_config_rejects_unknown_dataset() {
        let json = SAMPLE.replace(
            r#""log_dir": "/var/log/grabber""#,
            r#""log_dir": "/var/log/grabber", "datasets": ["Merchant_Nothing"]"#,
        );
        let config = Config::from_json_str(&json).unwrap();
        assert!(Pipeline::from_config(&config).is_err());
    }
}
