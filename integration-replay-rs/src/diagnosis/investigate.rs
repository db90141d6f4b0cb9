//! Stage 2: investigate
//!
//! Checks the entities of the original request against the store's current
//! reference data (menu, coupons, profile).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Check, CheckStatus, ErrorCategory, Investigation, ItemKind, OrderLogRow, ProblematicItem};
use crate::cache::TtlCache;
use crate::core::{HttpMethod, HttpRequest, HttpTransport};
use crate::error::mapping::map_http_error;
use crate::error::{EngineError, ErrorContext, Result};
use crate::util::{encode_path_segment, join_url};

/// Alternatives offered per problematic item
pub const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, alias = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProfile {
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub service_methods: Vec<String>,
}

#[derive(Deserialize)]
struct MenuEnvelope {
    #[serde(default)]
    items: Vec<MenuItem>,
}

#[derive(Deserialize)]
struct CouponEnvelope {
    #[serde(default)]
    coupons: Vec<Coupon>,
}

/// Source of live reference data for a store
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    async fn menu(&self, base_url: &str, store_id: &str) -> Result<Vec<MenuItem>>;
    async fn coupons(&self, base_url: &str, store_id: &str) -> Result<Vec<Coupon>>;
    async fn store_profile(&self, base_url: &str, store_id: &str) -> Result<StoreProfile>;
}

/// Reference data fetched from `{base}/api/stores/{storeId}/{kind}`
pub struct HttpReferenceDataSource {
    transport: Arc<dyn HttpTransport>,
    cache: Arc<TtlCache<Value>>,
}

impl HttpReferenceDataSource {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_cache(transport, Arc::new(TtlCache::reference()))
    }

    pub fn with_cache(transport: Arc<dyn HttpTransport>, cache: Arc<TtlCache<Value>>) -> Self {
        Self { transport, cache }
    }

    async fn fetch(&self, base_url: &str, store_id: &str, kind: &str) -> Result<Value> {
        let key = format!("{}:{}", kind, store_id);
        if let Some(cached) = self.cache.get(&key) {
            debug!(key = %key, "reference data cache hit");
            return Ok(cached);
        }

        let segment = encode_path_segment(store_id).ok_or_else(|| {
            EngineError::validation(format!("store id '{}' is not a usable path segment", store_id))
        })?;
        let url = join_url(base_url, &format!("api/stores/{}/{}", segment, kind));
        let response = self
            .transport
            .send(HttpRequest::new(HttpMethod::Get, url.as_str()).header("Accept", "application/json"))
            .await?;
        let body: Value = serde_json::from_str(&response.body).unwrap_or(Value::String(response.body.clone()));

        if !response.is_success() {
            let mut context = ErrorContext::for_service("reference_data").endpoint(url.as_str());
            let error = map_http_error(response.status, &response.status_text, &body, &mut context);
            return Err(error.with_context(context));
        }

        self.cache.set(key, body.clone());
        Ok(body)
    }

    async fn fetch_as<T: DeserializeOwned>(&self, base_url: &str, store_id: &str, kind: &str) -> Result<T> {
        let body = self.fetch(base_url, store_id, kind).await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl ReferenceDataSource for HttpReferenceDataSource {
    async fn menu(&self, base_url: &str, store_id: &str) -> Result<Vec<MenuItem>> {
        let envelope: MenuEnvelope = self.fetch_as(base_url, store_id, "menu").await?;
        Ok(envelope.items)
    }

    async fn coupons(&self, base_url: &str, store_id: &str) -> Result<Vec<Coupon>> {
        let envelope: CouponEnvelope = self.fetch_as(base_url, store_id, "coupons").await?;
        Ok(envelope.coupons)
    }

    async fn store_profile(&self, base_url: &str, store_id: &str) -> Result<StoreProfile> {
        self.fetch_as(base_url, store_id, "profile").await
    }
}

/// Item line of an order request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestItem {
    pub code: String,
    pub qty: u64,
    pub category: Option<String>,
}

/// Item lines of an order request body
pub fn request_items(body: &Value) -> Vec<RequestItem> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let code = item.get("code").or_else(|| item.get("productCode"))?.as_str()?;
                    Some(RequestItem {
                        code: code.to_string(),
                        qty: item.get("qty").and_then(Value::as_u64).unwrap_or(1),
                        category: item.get("category").and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Discount codes of an order request body
pub fn request_coupons(body: &Value) -> Vec<String> {
    let mut codes: Vec<String> = body
        .get("coupons")
        .and_then(Value::as_array)
        .map(|coupons| {
            coupons
                .iter()
                .filter_map(|c| c.as_str().or_else(|| c.get("code").and_then(Value::as_str)))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if let Some(code) = body.get("couponCode").and_then(Value::as_str) {
        if !code.trim().is_empty() && !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

/// Fulfillment method of an order request body
pub fn request_service_method(body: &Value) -> Option<String> {
    body.get("serviceMethod").and_then(Value::as_str).map(str::to_string)
}

/// Run the category-specific checks
pub async fn investigate(
    category: ErrorCategory,
    row: &OrderLogRow,
    base_url: &str,
    reference: &dyn ReferenceDataSource,
) -> Investigation {
    let mut investigation = Investigation::default();

    let store_id = match row.store() {
        Some(id) => id,
        None => {
            investigation.checks.push(Check::new(
                "store id",
                CheckStatus::Warn,
                "log row and request body carry no store id; reference data not checked",
            ));
            return investigation;
        }
    };

    match category {
        ErrorCategory::InvalidItem => check_items(&mut investigation, row, base_url, &store_id, reference).await,
        ErrorCategory::InvalidDiscountCode => {
            check_coupons(&mut investigation, row, base_url, &store_id, reference).await
        }
        ErrorCategory::UnsupportedFulfillmentMethod => {
            check_fulfillment(&mut investigation, row, base_url, &store_id, reference).await
        }
        ErrorCategory::StoreUnavailable => check_store_status(&mut investigation, base_url, &store_id, reference).await,
        other => investigation.checks.push(Check::new(
            "reference data",
            CheckStatus::Warn,
            format!("no reference-data checks for category {}", other),
        )),
    }

    investigation
}

fn fetch_failed(investigation: &mut Investigation, what: &str, error: impl std::fmt::Display) {
    warn!(what, error = %error, "reference data fetch failed");
    investigation.checks.push(Check::new(
        format!("{} fetch", what),
        CheckStatus::Warn,
        format!("could not load {}: {}", what, error),
    ));
}

async fn check_items(
    investigation: &mut Investigation,
    row: &OrderLogRow,
    base_url: &str,
    store_id: &str,
    reference: &dyn ReferenceDataSource,
) {
    let items = request_items(&row.request_body);
    if items.is_empty() {
        investigation
            .checks
            .push(Check::new("request items", CheckStatus::Warn, "request body lists no items"));
        return;
    }

    let menu = match reference.menu(base_url, store_id).await {
        Ok(menu) => menu,
        Err(e) => return fetch_failed(investigation, "menu", e),
    };

    for item in items {
        let on_menu = menu.iter().find(|m| m.code == item.code);
        let reason = match on_menu {
            None => Some(format!("item {} is not on the menu of store {}", item.code, store_id)),
            Some(m) if !m.available => Some(format!("item {} ({}) is currently unavailable", item.code, m.name)),
            Some(_) => None,
        };

        match reason {
            None => investigation.checks.push(Check::new(
                format!("item {}", item.code),
                CheckStatus::Pass,
                "on menu and available",
            )),
            Some(reason) => {
                let category = on_menu.and_then(|m| m.category.clone()).or(item.category.clone());
                let alternatives = category
                    .map(|category| {
                        menu.iter()
                            .filter(|m| m.available && m.code != item.code && m.category.as_deref() == Some(category.as_str()))
                            .take(MAX_ALTERNATIVES)
                            .map(|m| m.code.clone())
                            .collect()
                    })
                    .unwrap_or_default();

                investigation
                    .checks
                    .push(Check::new(format!("item {}", item.code), CheckStatus::Fail, reason.clone()));
                investigation.problematic_items.push(ProblematicItem {
                    kind: ItemKind::MenuItem,
                    code: item.code,
                    reason,
                    alternatives,
                });
            }
        }
    }
}

async fn check_coupons(
    investigation: &mut Investigation,
    row: &OrderLogRow,
    base_url: &str,
    store_id: &str,
    reference: &dyn ReferenceDataSource,
) {
    let codes = request_coupons(&row.request_body);
    if codes.is_empty() {
        investigation
            .checks
            .push(Check::new("discount codes", CheckStatus::Warn, "request body carries no discount code"));
        return;
    }

    let coupons = match reference.coupons(base_url, store_id).await {
        Ok(coupons) => coupons,
        Err(e) => return fetch_failed(investigation, "coupons", e),
    };
    let now = Utc::now();

    for code in codes {
        let reason = match coupons.iter().find(|c| c.code.eq_ignore_ascii_case(&code)) {
            None => Some(format!("discount code {} does not exist for store {}", code, store_id)),
            Some(c) if !c.active => Some(format!("discount code {} is inactive", code)),
            Some(Coupon { expires_at: Some(expiry), .. }) if *expiry < now => {
                Some(format!("discount code {} expired at {}", code, expiry.to_rfc3339()))
            }
            Some(_) => None,
        };

        match reason {
            None => investigation
                .checks
                .push(Check::new(format!("coupon {}", code), CheckStatus::Pass, "active")),
            Some(reason) => {
                let alternatives = coupons
                    .iter()
                    .filter(|c| c.active && !c.code.eq_ignore_ascii_case(&code))
                    .filter(|c| c.expires_at.map_or(true, |e| e >= now))
                    .take(MAX_ALTERNATIVES)
                    .map(|c| c.code.clone())
                    .collect();
                investigation
                    .checks
                    .push(Check::new(format!("coupon {}", code), CheckStatus::Fail, reason.clone()));
                investigation.problematic_items.push(ProblematicItem {
                    kind: ItemKind::DiscountCode,
                    code,
                    reason,
                    alternatives,
                });
            }
        }
    }
}

async fn check_fulfillment(
    investigation: &mut Investigation,
    row: &OrderLogRow,
    base_url: &str,
    store_id: &str,
    reference: &dyn ReferenceDataSource,
) {
    let method = match request_service_method(&row.request_body) {
        Some(method) => method,
        None => {
            investigation
                .checks
                .push(Check::new("service method", CheckStatus::Warn, "request body names no service method"));
            return;
        }
    };

    let profile = match reference.store_profile(base_url, store_id).await {
        Ok(profile) => profile,
        Err(e) => return fetch_failed(investigation, "store profile", e),
    };

    if profile.service_methods.iter().any(|m| m.eq_ignore_ascii_case(&method)) {
        investigation.checks.push(Check::new(
            "service method",
            CheckStatus::Pass,
            format!("{} is offered by store {}", method, store_id),
        ));
        return;
    }

    let reason = format!(
        "service method {} is not offered by store {} (offered: {})",
        method,
        store_id,
        profile.service_methods.join(", ")
    );
    investigation
        .checks
        .push(Check::new("service method", CheckStatus::Fail, reason.clone()));
    investigation.problematic_items.push(ProblematicItem {
        kind: ItemKind::FulfillmentMethod,
        code: method,
        reason,
        alternatives: profile.service_methods.iter().take(MAX_ALTERNATIVES).cloned().collect(),
    });
}

async fn check_store_status(
    investigation: &mut Investigation,
    base_url: &str,
    store_id: &str,
    reference: &dyn ReferenceDataSource,
) {
    let profile = match reference.store_profile(base_url, store_id).await {
        Ok(profile) => profile,
        Err(e) => return fetch_failed(investigation, "store profile", e),
    };

    let status = |ok: bool| if ok { CheckStatus::Pass } else { CheckStatus::Fail };
    investigation.checks.push(Check::new(
        "store open",
        status(profile.is_open),
        format!("store {} isOpen={}", store_id, profile.is_open),
    ));
    investigation.checks.push(Check::new(
        "store online",
        status(profile.is_online),
        format!("store {} isOnline={}", store_id, profile.is_online),
    ));
}
