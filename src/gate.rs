//! Local persistence gate
//!
//! The only place that decides whether a dataset touches the network. A dataset
//! whose target CSV already exists is never fetched again for the same run
//! window, whatever that file contains.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::api_client::{AccessToken, ApiClient};
use crate::dataset::{DatasetSpec, MerchantIdentity};
use crate::run_context::RunContext;

/// What the gate did for one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Target file was already on disk, no request sent
    Existing(PathBuf),
    /// Fetched and written during this run
    Fetched(PathBuf),
    /// Fetch failed; the dataset is left out of this run
    Skipped { reason: String },
}

impl GateOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            GateOutcome::Existing(p) | GateOutcome::Fetched(p) => Some(p),
            GateOutcome::Skipped { .. } => None,
        }
    }
}

pub struct PersistenceGate<'a> {
    api: &'a ApiClient,
    identity: &'a MerchantIdentity,
}

impl<'a> PersistenceGate<'a> {
    pub fn new(api: &'a ApiClient, identity: &'a MerchantIdentity) -> Self {
        Self { api, identity }
    }

    /// `{run_dir}/{name}_{suffix}.csv`
    pub fn target_path(spec: &DatasetSpec, ctx: &RunContext) -> PathBuf {
        ctx.run_dir().join(spec.file_name(ctx.dates()))
    }

    /// Make sure the dataset's CSV exists, fetching it only when it does not.
    ///
    /// Fetch failures are logged and reported as `Skipped`. Local write failures
    /// are returned as errors.
    pub async fn ensure_dataset(&self, spec: &DatasetSpec, token: &AccessToken, ctx: &RunContext) -> Result<GateOutcome> {
        let target = Self::target_path(spec, ctx);
        if target.exists() {
            info!("{:?} already existed", target);
            return Ok(GateOutcome::Existing(target));
        }

        let table = match self.api.fetch(spec, token, ctx, self.identity).await {
            Ok(table) => table,
            Err(e) => {
                error!("{} unavailable for this run: {:#}", spec.name, e);
                return Ok(GateOutcome::Skipped { reason: format!("{:#}", e) });
            }
        };

        let table = match &spec.columns {
            Some(columns) => table.project(columns),
            None => table,
        };

        table.write_csv(&target)?;
        Ok(GateOutcome::Fetched(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SaveSuffix;
    use crate::downloader::Downloader;
    use crate::run_context::RunDates;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::fs;

    fn ctx(dir: &Path) -> RunContext {
        RunContext::new(dir, RunDates::ending(NaiveDate::from_ymd_opt(2021, 6, 24).unwrap()))
    }

    fn identity() -> MerchantIdentity {
        MerchantIdentity {
            email: "ops@example.com".into(),
            merchant_code: "M0001".into(),
            store_code: "S0001".into(),
        }
    }

    fn api(server: &MockServer) -> ApiClient {
        let api = ApiClient::new(&server.base_url()).unwrap();
        let downloader = Downloader::new(api.http().clone()).without_progress();
        api.with_downloader(downloader)
    }

    fn product_spec() -> DatasetSpec {
        DatasetSpec::merchant("Merchant_Product", "/gw/api/v1/MerchantProduct", false, SaveSuffix::Day)
    }

    #[tokio::test]
    async fn test_existing_file_means_no_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/gw/api/v1/MerchantProduct");
                then.status(200).body("{\"a\":1}\n");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let target = PersistenceGate::target_path(&product_spec(), &ctx);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "stale,content\n").unwrap();

        let api = api(&server);
        let identity = identity();
        let outcome = PersistenceGate::new(&api, &identity)
            .ensure_dataset(&product_spec(), &AccessToken::new("TOKEN"), &ctx)
            .await
            .unwrap();

        assert_eq!(outcome, GateOutcome::Existing(target.clone()));
        assert_eq!(mock.hits_async().await, 0);
        assert_eq!(fs::read_to_string(&target).unwrap(), "stale,content\n");
    }

    #[tokio::test]
    async fn test_fetch_and_write() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/gw/api/v1/MerchantProduct");
                then.status(200).body("{\"a\":1,\"b\":2}\n{\"a\":3,\"b\":4}\n");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let api = api(&server);
        let identity = identity();
        let gate = PersistenceGate::new(&api, &identity);

        let outcome = gate
            .ensure_dataset(&product_spec(), &AccessToken::new("TOKEN"), &ctx)
            .await
            .unwrap();
        let path = outcome.path().unwrap().to_path_buf();
        assert_eq!(path, ctx.run_dir().join("Merchant_Product_23062021.csv"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n1,2\n3,4\n");

        // second pass reuses the file
        let again = gate
            .ensure_dataset(&product_spec(), &AccessToken::new("TOKEN"), &ctx)
            .await
            .unwrap();
        assert_eq!(again, GateOutcome::Existing(path));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_skipped() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/gw/api/v1/MerchantProduct");
                then.status(503);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let api = api(&server);
        let identity = identity();
        let outcome = PersistenceGate::new(&api, &identity)
            .ensure_dataset(&product_spec(), &AccessToken::new("TOKEN"), &ctx)
            .await
            .unwrap();

        assert!(matches!(outcome, GateOutcome::Skipped { .. }));
        assert!(outcome.path().is_none());
        assert!(!PersistenceGate::target_path(&product_spec(), &ctx).exists());
    }

    #[tokio::test]
    async fn test_public_sales_projected() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all("order_id,sku_id,secret,quantity\n1,A1,x,2\n2,B2,y,5\n".as_bytes())
            .unwrap();
        let gz = enc.finish().unwrap();

        let server = MockServer::start_async().await;
        let link = server.url("/exports/public.csv.gz");
        server
            .mock_async(|when, then| {
                when.method(POST).path("/gw/api/v1/PublicSaleTransaction/fileUrls");
                then.status(200).json_body(json!({ "presigned_url": link }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/exports/public.csv.gz");
                then.status(200).body(gz.clone());
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path());
        let api = api(&server);
        let identity = identity();
        let outcome = PersistenceGate::new(&api, &identity)
            .ensure_dataset(&DatasetSpec::public_sales(), &AccessToken::new("TOKEN"), &ctx)
            .await
            .unwrap();

        let path = outcome.path().unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "sku_id,quantity\nA1,2\nB2,5\n");
        assert!(ctx.raw_download_path().exists());
    }
}
