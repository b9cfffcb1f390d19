//! Watch loop: fetch, dedup, match, buy
//!
//! One engine instance owns one watch mode (pets or equipment), its rule
//! list and its seen-set. Every cycle fetches the newest listings, skips
//! ids already processed, evaluates the rules in declared order and hands
//! affordable matches to the purchaser. An id is marked seen before its
//! evaluation starts, so a listing gets exactly one purchase attempt no
//! matter how the attempt ends.

use crate::error::ApiError;
use crate::executor::Purchaser;
use crate::market::Marketplace;
use crate::types::{CycleReport, FilterRule, Listing, PurchaseOutcome, SeenSet};
use rust_decimal::Decimal;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Pets,
    Equipment,
}

/// Why a matched listing was not bought
enum Skip {
    OverLimit,
    InsufficientBalance,
}

pub struct WatchEngine<M, P> {
    market: M,
    purchaser: P,
    mode: WatchMode,
    rules: Vec<FilterRule>,
    wallet: String,
    seen: SeenSet,
    /// Live balance in NESO; refreshed at cycle start when any rule
    /// defers to it, and after every successful purchase. `None` until
    /// first fetched, and then it gates every purchase attempt.
    balance: Option<Decimal>,
    poll_interval: Duration,
    item_pacing: Duration,
}

impl<M: Marketplace, P: Purchaser> WatchEngine<M, P> {
    pub fn new(
        market: M,
        purchaser: P,
        mode: WatchMode,
        rules: Vec<FilterRule>,
        wallet: String,
        poll_interval: Duration,
        item_pacing: Duration,
    ) -> Self {
        Self {
            market,
            purchaser,
            mode,
            rules,
            wallet,
            seen: SeenSet::new(),
            balance: None,
            poll_interval,
            item_pacing,
        }
    }

    /// Log the active rule set so an unattended run records what it
    /// would have bought and at what ceilings.
    pub fn print_rules(&self) {
        let mode = match self.mode {
            WatchMode::Pets => "pets",
            WatchMode::Equipment => "equipment",
        };
        info!("Watching {} with {} rules:", mode, self.rules.len());
        for (i, rule) in self.rules.iter().enumerate() {
            info!("  {}. {}", i + 1, rule);
        }
    }

    /// Run watch cycles until cancelled. Cycle errors are absorbed: the
    /// loop pauses for the error's mandated backoff (or one poll
    /// interval) and continues.
    pub async fn run(&mut self) {
        self.print_rules();
        loop {
            match self.run_once().await {
                Ok(report) => {
                    if report.new_listings > 0 {
                        info!(
                            "Cycle: {} fetched, {} new, {} matched, {} bought",
                            report.fetched, report.new_listings, report.matched, report.purchased
                        );
                    } else {
                        debug!("Cycle: {} fetched, nothing new", report.fetched);
                    }
                    sleep(self.poll_interval).await;
                }
                Err(e) => {
                    let pause = e.backoff().unwrap_or(self.poll_interval);
                    warn!("Cycle failed ({}), pausing {:?}", e, pause);
                    sleep(pause).await;
                }
            }
        }
    }

    /// One fetch-and-evaluate pass over the newest listings.
    pub async fn run_once(&mut self) -> Result<CycleReport, ApiError> {
        let mut report = CycleReport::default();

        if self.rules.iter().any(|r| r.price_limit().is_none()) {
            let balance = self.market.fetch_balance(&self.wallet).await?;
            debug!("Balance: {} NESO", balance);
            self.balance = Some(balance);
        }

        let listings = match self.mode {
            WatchMode::Pets => self.market.fetch_pet_batch().await?,
            WatchMode::Equipment => self.market.fetch_equipment_batch().await?,
        };
        report.fetched = listings.len();

        let mut paced = false;
        for listing in listings {
            // Marked before evaluation: one attempt per id, ever
            if !self.seen.insert(listing.token_id) {
                continue;
            }
            report.new_listings += 1;

            // Only items that actually get processed pay the pacing
            // sleep; an all-seen batch goes straight back to the
            // inter-poll wait
            if paced {
                sleep(self.item_pacing).await;
            }
            paced = true;

            self.process(listing, &mut report).await;
        }

        // Trimming only between batches keeps in-flight ids pinned
        self.seen.trim();
        Ok(report)
    }

    async fn process(&mut self, mut listing: Listing, report: &mut CycleReport) {
        if self.mode == WatchMode::Pets {
            report.detail_fetches += 1;
            match self.market.fetch_pet_skills(listing.token_id).await {
                Ok(skills) => listing.skills = skills,
                Err(e) => {
                    // Stays seen; a flaky detail endpoint must not
                    // cause duplicate buys on the next cycle
                    warn!("Detail fetch for {} failed: {}", listing.token_id, e);
                    report.detail_failures += 1;
                    return;
                }
            }
        }

        let Some(rule) = self.rules.iter().find(|r| r.matches(&listing)) else {
            return;
        };
        report.matched += 1;

        let Some(price) = listing.price_neso() else {
            warn!(
                "Listing {} has malformed price {:?}, skipping",
                listing.token_id, listing.price_wei
            );
            return;
        };

        if let Some(reason) = affordability_skip(rule, price, self.balance) {
            match reason {
                Skip::OverLimit => {
                    debug!(
                        "{} at {} NESO over limit {:?} ({})",
                        listing.name,
                        price,
                        rule.price_limit(),
                        listing.url()
                    );
                    report.skipped_over_limit += 1;
                }
                Skip::InsufficientBalance => {
                    info!(
                        "{} at {} NESO exceeds balance {} ({})",
                        listing.name,
                        price,
                        self.balance.unwrap_or_default(),
                        listing.url()
                    );
                    report.skipped_insufficient_balance += 1;
                }
            }
            return;
        }

        info!(
            "Match: {} at {} NESO via [{}] ({})",
            listing.name,
            price,
            rule,
            listing.url()
        );

        match self.purchaser.buy(&listing).await {
            Ok(PurchaseOutcome::Success) => {
                info!("Bought {} for {} NESO", listing.name, price);
                report.purchased += 1;
                // Spent funds; the cached balance is stale now
                if let Ok(balance) = self.market.fetch_balance(&self.wallet).await {
                    self.balance = Some(balance);
                }
            }
            Ok(PurchaseOutcome::Failed) => {
                warn!("Purchase of {} failed", listing.name);
                report.failed_purchases += 1;
            }
            Err(e) => {
                warn!("Purchase of {} never submitted: {}", listing.name, e);
                report.failed_purchases += 1;
            }
        }
    }
}

/// Affordability gate. The explicit rule limit (if any) is checked
/// first; a known balance then gates every attempt, and is the only
/// ceiling for rules without a limit of their own.
fn affordability_skip(rule: &FilterRule, price: Decimal, balance: Option<Decimal>) -> Option<Skip> {
    if let Some(limit) = rule.price_limit() {
        if price > limit {
            return Some(Skip::OverLimit);
        }
    }
    match balance {
        Some(balance) if price > balance => Some(Skip::InsufficientBalance),
        _ => None,
    }
}
