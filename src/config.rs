//! Configuration management for the marketplace bot

use crate::types::FilterRule;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;

/// 1 NESO = 10^18 wei
pub const WEI_PER_NESO: Decimal = dec!(1_000_000_000_000_000_000);

/// Chain the marketplace settles on
pub const CHAIN_ID: u64 = 68414;

/// Payment token contract
pub const TOKEN_ADDRESS: &str = "0x07E49Ad54FcD23F6e7B911C2068F0148d1827c08";

/// Item NFT contract
pub const NFT_ADDRESS: &str = "0x43DCff2A0cedcd5e10e6f1c18b503498dDCe60d5";

/// EIP-712 verifying contract for order signatures
pub const VERIFYING_CONTRACT: &str = "0xf1c82c082af3de3614771105f01dc419c3163352";

/// Explore category for pets
pub const PET_CATEGORY_NO: u64 = 1000401001;

/// Bot configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Wallet private key used for challenge and order signing
    pub private_key: String,

    /// Wallet address, kept in its configured casing for transport payloads
    pub wallet: String,

    /// Pre-provisioned session cookies (browser-derived legacy mode).
    /// When set, the sign-in API is skipped.
    pub cookie_override: Option<String>,

    /// Pet-mode acceptance rules, in evaluation order
    pub pet_rules: Vec<FilterRule>,

    /// Equipment-mode acceptance rules, in evaluation order
    pub equipment_rules: Vec<FilterRule>,

    /// Sleep between listing batches in seconds
    pub poll_interval_secs: u64,

    /// Pacing sleep between items within one batch, in milliseconds
    pub item_pacing_ms: u64,
}

/// JSON shape for the `PET_FILTERS` environment variable
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PetFilterSpec {
    #[serde(default)]
    skills: BTreeSet<String>,
    #[serde(default)]
    price_limit: Option<Decimal>,
}

/// JSON shape for the `EQUIPMENT_WATCHLIST` environment variable
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EquipmentWatchSpec {
    name: String,
    #[serde(default)]
    price_limit: Option<Decimal>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Missing required keys or malformed rule JSON abort startup.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let private_key = env::var("MSU_PRIVATE_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .context("MSU_PRIVATE_KEY is required")?;

        let wallet = env::var("MSU_WALLET")
            .ok()
            .filter(|s| !s.is_empty())
            .context("MSU_WALLET is required")?;

        let cookie_override = env::var("MSU_COOKIE").ok().filter(|s| !s.is_empty());

        let pet_rules = match env::var("PET_FILTERS") {
            Ok(raw) => parse_pet_filters(&raw).context("invalid PET_FILTERS")?,
            Err(_) => default_pet_rules(),
        };

        let equipment_rules = match env::var("EQUIPMENT_WATCHLIST") {
            Ok(raw) => parse_equipment_watchlist(&raw).context("invalid EQUIPMENT_WATCHLIST")?,
            Err(_) => default_equipment_rules(),
        };

        let poll_interval_secs = env::var("POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        let item_pacing_ms = env::var("ITEM_PACING_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        Ok(Self {
            private_key,
            wallet,
            cookie_override,
            pet_rules,
            equipment_rules,
            poll_interval_secs,
            item_pacing_ms,
        })
    }
}

fn parse_pet_filters(raw: &str) -> Result<Vec<FilterRule>> {
    let specs: Vec<PetFilterSpec> = serde_json::from_str(raw)?;
    Ok(specs
        .into_iter()
        .map(|s| FilterRule::SkillSet {
            required: s.skills,
            price_limit: s.price_limit,
        })
        .collect())
}

fn parse_equipment_watchlist(raw: &str) -> Result<Vec<FilterRule>> {
    let specs: Vec<EquipmentWatchSpec> = serde_json::from_str(raw)?;
    Ok(specs
        .into_iter()
        .map(|s| FilterRule::NameFragment {
            fragment: s.name,
            price_limit: s.price_limit,
        })
        .collect())
}

/// Stock pet rules: skill combinations worth sniping, most valuable first.
/// The empty-set rule at the end is a catch-all floor for cheap pets.
fn default_pet_rules() -> Vec<FilterRule> {
    let skill_rule = |skills: &[&str], limit: Decimal| FilterRule::SkillSet {
        required: skills.iter().map(|s| s.to_string()).collect(),
        price_limit: Some(limit),
    };
    vec![
        skill_rule(&["Magnet Effect"], dec!(385501)),
        skill_rule(&["Auto Buff"], dec!(385501)),
        skill_rule(&["Expanded Auto Move", "Auto Move"], dec!(100000)),
        skill_rule(&[], dec!(40000)),
    ]
}

/// Stock equipment watchlist. A `None` limit means the live balance is
/// the ceiling at match time.
fn default_equipment_rules() -> Vec<FilterRule> {
    let name_rule = |name: &str, limit: Option<Decimal>| FilterRule::NameFragment {
        fragment: name.to_string(),
        price_limit: limit,
    };
    vec![
        name_rule("Golden Clover Belt", Some(dec!(200000))),
        name_rule("Noble Ifia's Ring", None),
        name_rule("Crystal Ventus Badge", None),
        name_rule("Badge of", None),
        name_rule("Gold Maple Leaf", None),
        name_rule("Condensed Power Crystal", Some(dec!(100000))),
        name_rule("Aquatic Letter Eye Accessory", Some(dec!(100000))),
        name_rule("Black Bean Mark", None),
        name_rule("Will o' the Wisps", None),
    ]
}

/// Marketplace API endpoints
pub struct MarketApi;

impl MarketApi {
    pub const BASE_URL: &'static str = "https://msu.io/marketplace/api/marketplace";

    pub fn explore_items_url() -> String {
        format!("{}/explore/items", Self::BASE_URL)
    }

    pub fn item_url(token_id: u64) -> String {
        format!("{}/items/{}", Self::BASE_URL, token_id)
    }

    pub fn buy_url(token_id: u64) -> String {
        format!("{}/items/{}/buy", Self::BASE_URL, token_id)
    }

    /// Transaction ids can contain a literal colon; the backend expects
    /// it percent-escaped in the path.
    pub fn transaction_result_url(transaction_id: &str) -> String {
        format!(
            "{}/transaction/{}/result",
            Self::BASE_URL,
            urlencoding::encode(transaction_id)
        )
    }

    pub fn balance_url(wallet: &str) -> String {
        format!("{}/wallets/{}/balance", Self::BASE_URL, wallet)
    }

    /// Lightweight endpoint used to probe session freshness
    pub fn auth_session_url() -> String {
        format!("{}/auth/session", Self::BASE_URL)
    }

    pub fn auth_challenge_url() -> String {
        format!("{}/auth/challenge", Self::BASE_URL)
    }

    pub fn auth_signin_url() -> String {
        format!("{}/auth/signin", Self::BASE_URL)
    }
}
