//! Merchant analytics API client
//!
//! Token exchange, the generic NDJSON merchant-data endpoints and the two-step
//! public-sales export (presigned link, then gzipped CSV download).

use anyhow::{Context, Result};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info};

use crate::dataset::{DatasetKind, DatasetSpec, MerchantIdentity};
use crate::downloader::Downloader;
use crate::error::GrabberError;
use crate::run_context::RunContext;
use crate::table::Table;

const TOKEN_PATH: &str = "/gw/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Password-grant credentials
#[derive(Clone, Serialize)]
pub struct Credentials {
    grant_type: &'static str,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn password_grant(username: &str, password: &str) -> Self {
        Self {
            grant_type: "password",
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("grant_type", &self.grant_type)
            .field("username", &self.username)
            .field("password", &"HIDDEN")
            .finish()
    }
}

/// Bearer token, valid for the duration of one run
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn bearer(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(HIDDEN)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    #[serde(default)]
    presigned_url: Option<String>,
}

/// HTTP client bound to one API gateway
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    downloader: Downloader,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            downloader: Downloader::new(client.clone()),
            client,
        })
    }

    /// Swap the downloader, e.g. to silence the progress bar
    pub fn with_downloader(mut self, downloader: Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange username/password for a bearer token. One attempt, no retry.
    pub async fn acquire_token(&self, credentials: &Credentials) -> Result<AccessToken> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);

        let response = self
            .client
            .post(&url)
            .header(CACHE_CONTROL, "no-cache")
            .form(credentials)
            .send()
            .await
            .context(format!("Failed to send token request to {}", url))?;

        let status = response.status();
        if status != StatusCode::OK {
            error!("retrieve access token failed. response code: {}", status.as_u16());
            return Err(GrabberError::Auth { status: status.as_u16() }.into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        info!("retrieve access token successfully");
        Ok(AccessToken(token.access_token))
    }

    /// Fetch one dataset as a table.
    ///
    /// Any error here means "dataset unavailable for this run"; the gate decides
    /// what to do with it.
    pub async fn fetch(
        &self,
        spec: &DatasetSpec,
        token: &AccessToken,
        ctx: &RunContext,
        identity: &MerchantIdentity,
    ) -> Result<Table> {
        match spec.kind {
            DatasetKind::MerchantData { .. } => {
                let body = spec.merchant_request(identity, ctx.dates());
                self.fetch_merchant_data(spec, token, &body).await
            }
            DatasetKind::PublicSales => self.fetch_public_sales(spec, token, ctx).await,
        }
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        spec: &DatasetSpec,
        token: &AccessToken,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = spec.url(&self.base_url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .bearer_auth(token.bearer())
            .json(body)
            .send()
            .await
            .context(format!("Failed to send HTTP request to {}", url))?;

        let status = response.status();
        if status != StatusCode::OK {
            error!("get {} data failed. response code: {}", spec.name, status.as_u16());
            return Err(GrabberError::Http {
                dataset: spec.name.clone(),
                status: status.as_u16(),
            }
            .into());
        }
        Ok(response)
    }

    /// POST the merchant payload and parse the NDJSON answer
    pub async fn fetch_merchant_data<B: Serialize + ?Sized>(
        &self,
        spec: &DatasetSpec,
        token: &AccessToken,
        body: &B,
    ) -> Result<Table> {
        let response = self.post_json(spec, token, body).await?;
        let text = response
            .text()
            .await
            .context(format!("Failed to read {} response body", spec.name))?;

        let table = Table::from_ndjson(&text);
        info!("get {} data successfully ({} rows)", spec.name, table.len());
        Ok(table)
    }

    /// Ask for the presigned link of the public-sales export.
    /// `None` when the answer carries no (or an empty) `presigned_url`.
    pub async fn public_sales_link(&self, spec: &DatasetSpec, token: &AccessToken, ctx: &RunContext) -> Result<Option<String>> {
        let body = spec.link_request(ctx.dates());
        let response = self.post_json(spec, token, &body).await?;

        let link: LinkResponse = response
            .json()
            .await
            .context("Failed to parse public sales link response")?;

        let url = link.presigned_url.filter(|u| !u.trim().is_empty());
        if url.is_some() {
            info!("get public sales successfully");
        }
        Ok(url)
    }

    async fn fetch_public_sales(&self, spec: &DatasetSpec, token: &AccessToken, ctx: &RunContext) -> Result<Table> {
        let link = self
            .public_sales_link(spec, token, ctx)
            .await?
            .ok_or_else(|| GrabberError::MissingLink { dataset: spec.name.clone() })?;

        let raw = self
            .downloader
            .download(&link, ctx.run_dir(), &ctx.raw_download_name())
            .await
            .ok_or_else(|| anyhow::anyhow!("download of {} export failed", spec.name))?;

        Table::from_gzip_csv(&raw)
    }
}
