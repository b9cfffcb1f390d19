//! Marketplace listing and balance client
//!
//! All reads go out on the anonymous context; purchase traffic lives in
//! the executor. Transient failures (challenge pages, network drops) are
//! retried through the typed retry policy; rate-limit responses surface
//! to the caller so the watch loop can impose the long global pause.

use crate::config::{MarketApi, PET_CATEGORY_NO, WEI_PER_NESO};
use crate::error::ApiError;
use crate::retry::{with_retry, RetryConfig};
use crate::session::SessionManager;
use crate::types::Listing;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Page size for pet batches (recently listed)
const PET_PAGE_SIZE: u32 = 7;

/// Page size for equipment batches and name queries
const EQUIPMENT_PAGE_SIZE: u32 = 135;

const SORT_RECENTLY_LISTED: &str = "ExploreSorting_RECENTLY_LISTED";
const SORT_LOWEST_PRICE: &str = "ExploreSorting_LOWEST_PRICE";

/// Listing-fetcher boundary consumed by the watch engine.
/// Implemented by [`MarketClient`] and by test doubles.
#[allow(async_fn_in_trait)]
pub trait Marketplace {
    /// Most recently listed pets, newest first
    async fn fetch_pet_batch(&self) -> Result<Vec<Listing>, ApiError>;

    /// Most recently listed equipment, newest first
    async fn fetch_equipment_batch(&self) -> Result<Vec<Listing>, ApiError>;

    /// Per-item detail call for a pet's skill list
    async fn fetch_pet_skills(&self, token_id: u64) -> Result<BTreeSet<String>, ApiError>;

    /// Live wallet balance in display units (NESO)
    async fn fetch_balance(&self, wallet: &str) -> Result<Decimal, ApiError>;
}

/// HTTP client for the marketplace explore/detail/balance endpoints
pub struct MarketClient {
    client: reqwest::Client,
    sessions: Arc<SessionManager>,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct ExploreResponse {
    #[serde(default)]
    items: Vec<RawListing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawListing {
    token_id: u64,
    #[serde(default)]
    name: String,
    sales_info: SalesInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalesInfo {
    price_wei: String,
}

#[derive(Debug, Deserialize)]
struct ItemDetailResponse {
    item: ItemDetail,
}

#[derive(Debug, Deserialize)]
struct ItemDetail {
    #[serde(default)]
    pet: Option<PetDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PetDetail {
    #[serde(default)]
    pet_skills: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    balance_wei: String,
}

impl MarketClient {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            sessions,
            retry: RetryConfig::default(),
        }
    }

    /// Read-only lowest-price query by item name, reused by the stats path
    pub async fn query_listings(&self, name: &str) -> Result<Vec<Listing>, ApiError> {
        let payload = equipment_explore_payload(Some(name), SORT_LOWEST_PRICE, EQUIPMENT_PAGE_SIZE);
        self.explore(&payload).await
    }

    async fn explore(&self, payload: &Value) -> Result<Vec<Listing>, ApiError> {
        let body = with_retry(&self.retry, "explore/items", || {
            let req = self
                .sessions
                .anonymous()
                .apply(self.client.post(MarketApi::explore_items_url()).json(payload));
            Self::send(req)
        })
        .await?;
        let listings = parse_listings(&body)?;
        debug!("Fetched {} listings", listings.len());
        Ok(listings)
    }

    async fn get(&self, url: String, operation: &str) -> Result<String, ApiError> {
        with_retry(&self.retry, operation, || {
            let req = self.sessions.anonymous().apply(self.client.get(&url));
            Self::send(req)
        })
        .await
    }

    async fn send(req: reqwest::RequestBuilder) -> Result<String, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::from_network(&e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_network(&e))?;
        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        Ok(body)
    }
}

impl Marketplace for MarketClient {
    async fn fetch_pet_batch(&self) -> Result<Vec<Listing>, ApiError> {
        let payload = pet_explore_payload(PET_PAGE_SIZE);
        self.explore(&payload).await
    }

    async fn fetch_equipment_batch(&self) -> Result<Vec<Listing>, ApiError> {
        let payload = equipment_explore_payload(None, SORT_RECENTLY_LISTED, EQUIPMENT_PAGE_SIZE);
        self.explore(&payload).await
    }

    async fn fetch_pet_skills(&self, token_id: u64) -> Result<BTreeSet<String>, ApiError> {
        let body = self.get(MarketApi::item_url(token_id), "items/{id}").await?;
        parse_pet_skills(&body)
    }

    async fn fetch_balance(&self, wallet: &str) -> Result<Decimal, ApiError> {
        let body = self
            .get(MarketApi::balance_url(wallet), "wallets/{address}/balance")
            .await?;
        parse_balance(&body)
    }
}

fn pet_explore_payload(page_size: u32) -> Value {
    json!({
        "filter": {
            "categoryNo": PET_CATEGORY_NO,
            "price": { "min": 0, "max": 10_000_000_000u64 },
        },
        "sorting": SORT_RECENTLY_LISTED,
        "paginationParam": { "pageNo": 1, "pageSize": page_size },
    })
}

fn equipment_explore_payload(name: Option<&str>, sorting: &str, page_size: u32) -> Value {
    json!({
        "filter": {
            "name": name,
            "categoryNo": 0,
            "price": { "min": 0, "max": 10_000_000_000u64 },
            "level": { "min": 0, "max": 250 },
            "starforce": { "min": 0, "max": 25 },
            "potential": { "min": 0, "max": 4 },
            "bonusPotential": { "min": 0, "max": 4 },
        },
        "sorting": sorting,
        "paginationParam": { "pageNo": 1, "pageSize": page_size },
    })
}

fn parse_listings(body: &str) -> Result<Vec<Listing>, ApiError> {
    let resp: ExploreResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;
    Ok(resp
        .items
        .into_iter()
        .map(|raw| Listing {
            token_id: raw.token_id,
            name: raw.name,
            price_wei: raw.sales_info.price_wei,
            skills: BTreeSet::new(),
        })
        .collect())
}

fn parse_pet_skills(body: &str) -> Result<BTreeSet<String>, ApiError> {
    let resp: ItemDetailResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;
    let pet = resp
        .item
        .pet
        .ok_or_else(|| ApiError::Parse("item has no pet detail".to_string()))?;
    Ok(pet.pet_skills.into_iter().collect())
}

fn parse_balance(body: &str) -> Result<Decimal, ApiError> {
    let resp: BalanceResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;
    let wei = Decimal::from_str(&resp.balance_wei)
        .map_err(|e| ApiError::Parse(format!("bad balanceWei: {e}")))?;
    Ok(wei / WEI_PER_NESO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn pet_payload_shape() {
        let payload = pet_explore_payload(7);
        assert_eq!(payload["filter"]["categoryNo"], PET_CATEGORY_NO);
        assert_eq!(payload["sorting"], SORT_RECENTLY_LISTED);
        assert_eq!(payload["paginationParam"]["pageSize"], 7);
        // Pets have no equipment stat ranges
        assert!(payload["filter"].get("starforce").is_none());
    }

    #[test]
    fn equipment_payload_shape() {
        let payload = equipment_explore_payload(None, SORT_RECENTLY_LISTED, 135);
        assert_eq!(payload["filter"]["name"], Value::Null);
        assert_eq!(payload["filter"]["categoryNo"], 0);
        assert_eq!(payload["filter"]["level"]["max"], 250);
        assert_eq!(payload["paginationParam"]["pageSize"], 135);

        let named = equipment_explore_payload(Some("Gold Maple Leaf"), SORT_LOWEST_PRICE, 135);
        assert_eq!(named["filter"]["name"], "Gold Maple Leaf");
        assert_eq!(named["sorting"], SORT_LOWEST_PRICE);
    }

    #[test]
    fn listings_parse_from_explore_response() {
        let body = r#"{
            "items": [
                {"tokenId": 101, "name": "Baby Dragon", "salesInfo": {"priceWei": "300000000000000000000000"}},
                {"tokenId": 102, "salesInfo": {"priceWei": "1000000000000000000"}}
            ]
        }"#;
        let listings = parse_listings(body).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].token_id, 101);
        assert_eq!(listings[0].name, "Baby Dragon");
        assert_eq!(listings[0].price_neso(), Some(dec!(300000)));
        assert_eq!(listings[1].name, "");
        assert!(listings[1].skills.is_empty());
    }

    #[test]
    fn empty_and_malformed_explore_bodies() {
        assert!(parse_listings(r#"{"items": []}"#).unwrap().is_empty());
        assert!(parse_listings(r#"{}"#).unwrap().is_empty());
        assert!(matches!(
            parse_listings("<html>challenge</html>"),
            Err(ApiError::Parse(_))
        ));
    }

    #[test]
    fn pet_skills_parse_from_detail_response() {
        let body = r#"{"item": {"pet": {"petSkills": ["Auto Buff", "Auto Move"]}}}"#;
        let skills = parse_pet_skills(body).unwrap();
        assert!(skills.contains("Auto Buff"));
        assert!(skills.contains("Auto Move"));

        let not_a_pet = r#"{"item": {}}"#;
        assert!(matches!(
            parse_pet_skills(not_a_pet),
            Err(ApiError::Parse(_))
        ));
    }

    #[test]
    fn balance_parses_to_display_units() {
        let body = r#"{"balanceWei": "50000000000000000000000"}"#;
        assert_eq!(parse_balance(body).unwrap(), dec!(50000));

        assert!(matches!(
            parse_balance(r#"{"balanceWei": "abc"}"#),
            Err(ApiError::Parse(_))
        ));
    }
}
