//! Dataset catalog and the typed request payload of each endpoint

use serde::Serialize;

use crate::error::GrabberError;
use crate::run_context::RunDates;

pub const PUBLIC_SALES: &str = "Public_Transaction";

/// Columns kept from the public-sales export, in output order
pub const PUBLIC_SALES_COLUMNS: &[&str] = &[
    "membership_level",
    "device_type",
    "card_type",
    "housing_type",
    "order_value",
    "total_discounts",
    "sku_id",
    "sku_name_chi",
    "brand_chi",
    "quantity",
    "unit_price",
    "primary_category",
    "primary_category_name_chi",
    "sub_cat_1_name_chi",
    "sub_cat_2_name_chi",
    "sub_cat_3_name_chi",
    "order_sku_comm_rate",
    "order_sku_comm_amount",
    "sku_level_promotion_amount",
];

/// Which part of the run window ends up in the file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveSuffix {
    /// `ddmmYYYY_ddmmYYYY`
    Range,
    /// `ddmmYYYY` of yesterday
    Day,
}

/// How a dataset is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    /// One POST returning NDJSON rows; `with_date` adds yesterday as `date`
    MerchantData { with_date: bool },
    /// Presigned link request followed by a gzipped CSV download
    PublicSales,
}

/// Merchant identity sent with every merchant-data request
#[derive(Debug, Clone)]
pub struct MerchantIdentity {
    pub email: String,
    pub merchant_code: String,
    pub store_code: String,
}

/// Body of the generic merchant-data endpoints
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MerchantDataRequest {
    pub sys_email: String,
    pub sys_token: String,
    pub sys_store_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Body of the public-sales link endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicSalesLinkRequest {
    pub sys_start_date: String,
    pub sys_end_date: String,
}

/// Static description of one fetchable dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub endpoint: String,
    pub kind: DatasetKind,
    pub suffix: SaveSuffix,
    pub columns: Option<Vec<String>>,
}

impl DatasetSpec {
    pub fn merchant(name: &str, endpoint: &str, with_date: bool, suffix: SaveSuffix) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            kind: DatasetKind::MerchantData { with_date },
            suffix,
            columns: None,
        }
    }

    pub fn public_sales() -> Self {
        Self {
            name: PUBLIC_SALES.to_string(),
            endpoint: "/gw/api/v1/PublicSaleTransaction/fileUrls".to_string(),
            kind: DatasetKind::PublicSales,
            suffix: SaveSuffix::Range,
            columns: Some(PUBLIC_SALES_COLUMNS.iter().map(|c| c.to_string()).collect()),
        }
    }

    /// `{name}_{suffix}.csv`
    pub fn file_name(&self, dates: &RunDates) -> String {
        let suffix = match self.suffix {
            SaveSuffix::Range => dates.range_suffix(),
            SaveSuffix::Day => dates.day_suffix(),
        };
        format!("{}_{}.csv", self.name, suffix)
    }

    /// Full endpoint URL under the gateway base
    pub fn url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.endpoint)
    }

    pub fn merchant_request(&self, identity: &MerchantIdentity, dates: &RunDates) -> MerchantDataRequest {
        let date = match self.kind {
            DatasetKind::MerchantData { with_date: true } => Some(dates.yesterday_iso()),
            _ => None,
        };
        MerchantDataRequest {
            sys_email: identity.email.clone(),
            sys_token: identity.merchant_code.clone(),
            sys_store_code: identity.store_code.clone(),
            date,
        }
    }

    pub fn link_request(&self, dates: &RunDates) -> PublicSalesLinkRequest {
        PublicSalesLinkRequest {
            sys_start_date: dates.yesterday_iso(),
            sys_end_date: dates.today_iso(),
        }
    }
}

/// Every dataset the grabber knows about, in run order
pub fn default_catalog() -> Vec<DatasetSpec> {
    use SaveSuffix::{Day, Range};

    vec![
        DatasetSpec::public_sales(),
        DatasetSpec::merchant("Merchant_User", "/gw/api/v1/MerchantUser", false, Range),
        DatasetSpec::merchant(
            "Merchant_Website_And_App_Traffic_Product",
            "/gw/api/v1/MerchantTrafficProduct",
            true,
            Day,
        ),
        DatasetSpec::merchant(
            "Merchant_Website_And_App_Traffic_ProductList",
            "/gw/api/v1/MerchantTrafficProductList",
            true,
            Day,
        ),
        DatasetSpec::merchant("Merchant_Product", "/gw/api/v1/MerchantProduct", false, Day),
        DatasetSpec::merchant(
            "Merchant_Sale_Transaction_Simplified",
            "/gw/api/v1/MerchantSaleTransactionSimplified",
            false,
            Day,
        ),
        DatasetSpec::merchant("Merchant_WishlistItem", "/gw/api/v1/MerchantWishlistItem", false, Day),
        DatasetSpec::merchant("Merchant_SharedCartEntry", "/gw/api/v1/MerchantSharedCartEntry", false, Day),
        DatasetSpec::merchant("Merchant_OnlineStore", "/gw/api/v1/MerchantOnlineStore", false, Day),
    ]
}

/// Keep the catalog entries named in `names`, in catalog order
pub fn select(catalog: Vec<DatasetSpec>, names: &[String]) -> Result<Vec<DatasetSpec>, GrabberError> {
    if let Some(unknown) = names.iter().find(|n| !catalog.iter().any(|d| &d.name == *n)) {
        return Err(GrabberError::Config(format!("unknown dataset {:?}", unknown)));
    }
    Ok(catalog
        .into_iter()
        .filter(|d| names.contains(&d.name))
        .collect())
}
