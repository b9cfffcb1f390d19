//! Core types for the marketplace bot

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::config::WEI_PER_NESO;

/// A single for-sale item as returned by the explore endpoint.
/// Identity is `token_id`; immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub token_id: u64,
    pub name: String,
    /// Raw price in wei, as transmitted (string to avoid u64 overflow)
    pub price_wei: String,
    /// Pet skill list, populated by the per-item detail call. Empty until
    /// fetched; equipment listings never carry skills.
    #[serde(default)]
    pub skills: BTreeSet<String>,
}

impl Listing {
    /// Price in display units (NESO). `None` if the wei string is malformed.
    pub fn price_neso(&self) -> Option<Decimal> {
        let wei = Decimal::from_str(&self.price_wei).ok()?;
        Some(wei / WEI_PER_NESO)
    }

    /// Marketplace page for this listing
    pub fn url(&self) -> String {
        format!("https://msu.io/marketplace/nft/{}", self.token_id)
    }
}

/// A user-defined acceptance rule. Rules are evaluated in declared order
/// and the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    /// Pet mode: matches when every required skill is present on the listing.
    /// An empty skill set matches any listing (catch-all floor).
    SkillSet {
        required: BTreeSet<String>,
        price_limit: Option<Decimal>,
    },
    /// Equipment mode: matches when the fragment occurs in the listing name
    /// (case-sensitive substring).
    NameFragment {
        fragment: String,
        price_limit: Option<Decimal>,
    },
}

impl FilterRule {
    pub fn matches(&self, listing: &Listing) -> bool {
        match self {
            FilterRule::SkillSet { required, .. } => {
                required.iter().all(|s| listing.skills.contains(s))
            }
            FilterRule::NameFragment { fragment, .. } => listing.name.contains(fragment),
        }
    }

    /// Explicit price ceiling; `None` means "use the live balance".
    pub fn price_limit(&self) -> Option<Decimal> {
        match self {
            FilterRule::SkillSet { price_limit, .. } => *price_limit,
            FilterRule::NameFragment { price_limit, .. } => *price_limit,
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = match self.price_limit() {
            Some(l) => l.to_string(),
            None => "balance".to_string(),
        };
        match self {
            FilterRule::SkillSet { required, .. } if required.is_empty() => {
                write!(f, "any pet | limit {}", limit)
            }
            FilterRule::SkillSet { required, .. } => {
                let skills: Vec<&str> = required.iter().map(|s| s.as_str()).collect();
                write!(f, "skills [{}] | limit {}", skills.join(", "), limit)
            }
            FilterRule::NameFragment { fragment, .. } => {
                write!(f, "name \"{}\" | limit {}", fragment, limit)
            }
        }
    }
}

/// Bounded at-most-once-processing ledger of token ids.
///
/// Insertion order is tracked so that trimming past the high-water mark
/// keeps the most-recently-inserted entries. The watch loop only trims
/// between batches, so an id whose purchase is still in flight is never
/// evicted mid-evaluation.
#[derive(Debug)]
pub struct SeenSet {
    order: VecDeque<u64>,
    ids: HashSet<u64>,
    high_water: usize,
    low_water: usize,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::with_watermarks(1000, 500)
    }

    pub fn with_watermarks(high_water: usize, low_water: usize) -> Self {
        assert!(low_water <= high_water);
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            high_water,
            low_water,
        }
    }

    /// Mark an id as processed. Returns false if it was already present.
    pub fn insert(&mut self, token_id: u64) -> bool {
        if !self.ids.insert(token_id) {
            return false;
        }
        self.order.push_back(token_id);
        true
    }

    pub fn contains(&self, token_id: u64) -> bool {
        self.ids.contains(&token_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Trim to the low-water mark if the high-water mark was exceeded,
    /// evicting the oldest entries first.
    pub fn trim(&mut self) {
        if self.ids.len() <= self.high_water {
            return;
        }
        while self.order.len() > self.low_water {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend transaction status code classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Success,
    Failed,
    /// Unrecognized code; terminal, treated the same as an explicit failure
    Unknown,
}

impl TxStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => TxStatus::Pending,
            2 => TxStatus::Success,
            _ => TxStatus::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Terminal outcome of a purchase attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Success,
    Failed,
}

impl fmt::Display for PurchaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseOutcome::Success => write!(f, "success"),
            PurchaseOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Counters for one watch cycle, used for logging and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new_listings: usize,
    pub detail_fetches: usize,
    pub detail_failures: usize,
    pub matched: usize,
    pub purchased: usize,
    pub skipped_over_limit: usize,
    pub skipped_insufficient_balance: usize,
    pub failed_purchases: usize,
}
