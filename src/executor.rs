//! Order submission and confirmation polling
//!
//! Submits a signed order on the authenticated session, pulls the
//! transaction id out of the response, and drives a bounded poll loop
//! against the transaction-result endpoint: pending sleeps and polls
//! again, success and every other code are terminal, and running out of
//! poll budget counts as failure.

use crate::config::MarketApi;
use crate::error::ApiError;
use crate::session::SessionManager;
use crate::signer::OrderSigner;
use crate::types::{Listing, PurchaseOutcome, TxStatus};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Hard cap on confirmation polls per order
pub const MAX_CONFIRM_POLLS: u32 = 6;

/// Delay between confirmation polls
const CONFIRM_POLL_DELAY: Duration = Duration::from_millis(1500);

/// Purchase boundary consumed by the watch engine.
/// Implemented by [`Buyer`] and by test doubles.
#[allow(async_fn_in_trait)]
pub trait Purchaser {
    /// Sign, submit and confirm a purchase of the given listing.
    /// `Err` means the attempt never reached the order endpoint
    /// (authentication or signing failure); a submitted order always
    /// resolves to a terminal [`PurchaseOutcome`].
    async fn buy(&self, listing: &Listing) -> Result<PurchaseOutcome, ApiError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyResponse {
    #[serde(default)]
    transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TxResultResponse {
    code: i64,
}

/// Submits signed orders and tracks them to a terminal outcome
pub struct Buyer {
    client: reqwest::Client,
    sessions: Arc<SessionManager>,
    signer: OrderSigner,
}

impl Buyer {
    pub fn new(sessions: Arc<SessionManager>, signer: OrderSigner) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            sessions,
            signer,
        }
    }

    async fn fetch_code(&self, url: &str) -> Result<i64, ApiError> {
        let session = self.sessions.authenticated().await?;
        let resp = session
            .apply(self.client.get(url))
            .send()
            .await
            .map_err(|e| ApiError::from_network(&e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_network(&e))?;
        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        let result: TxResultResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(result.code)
    }
}

impl Purchaser for Buyer {
    async fn buy(&self, listing: &Listing) -> Result<PurchaseOutcome, ApiError> {
        let session = self.sessions.authenticated().await?;

        // Signed fresh per attempt; a stale order is never resubmitted
        let signed = self
            .signer
            .sign(listing.token_id, &listing.price_wei)
            .map_err(|e| ApiError::Parse(format!("order signing: {e}")))?;

        info!(
            "Submitting order for token {} at {} wei",
            listing.token_id, listing.price_wei
        );

        let resp = session
            .apply(self.client.post(MarketApi::buy_url(listing.token_id)).json(&signed))
            .send()
            .await
            .map_err(|e| ApiError::from_network(&e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_network(&e))?;
        if !status.is_success() {
            warn!(
                "Order submission for token {} rejected with {}: {}",
                listing.token_id, status, body
            );
            return Ok(PurchaseOutcome::Failed);
        }

        let parsed: BuyResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))?;
        let tx_id = match parsed.transaction_id {
            Some(id) => id,
            None => {
                warn!(
                    "Order response for token {} carried no transactionId: {}",
                    listing.token_id, body
                );
                return Ok(PurchaseOutcome::Failed);
            }
        };

        info!("Order accepted, transaction {}", tx_id);

        let url = MarketApi::transaction_result_url(&tx_id);
        let outcome = confirm(|| self.fetch_code(&url)).await;
        info!("Transaction {} settled: {}", tx_id, outcome);
        Ok(outcome)
    }
}

/// Drive the confirmation state machine over a code-fetching closure.
///
/// States: Submitting -> Pending | Success | Failed on the first poll,
/// Pending -> Pending | Success | Failed on subsequent polls, and
/// Pending -> Failed once the poll budget is exhausted.
pub async fn confirm<F, Fut>(mut fetch_code: F) -> PurchaseOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<i64, ApiError>>,
{
    for attempt in 1..=MAX_CONFIRM_POLLS {
        let code = match fetch_code().await {
            Ok(code) => code,
            Err(e) => {
                warn!("Confirmation poll failed: {}", e);
                return PurchaseOutcome::Failed;
            }
        };

        match TxStatus::from_code(code) {
            TxStatus::Success => return PurchaseOutcome::Success,
            TxStatus::Pending => {
                debug!(
                    "Transaction pending ({}/{})",
                    attempt, MAX_CONFIRM_POLLS
                );
                if attempt < MAX_CONFIRM_POLLS {
                    sleep(CONFIRM_POLL_DELAY).await;
                }
            }
            TxStatus::Failed | TxStatus::Unknown => {
                warn!("Transaction reported terminal failure code {}", code);
                return PurchaseOutcome::Failed;
            }
        }
    }

    warn!(
        "Transaction still pending after {} polls, treating as failed",
        MAX_CONFIRM_POLLS
    );
    PurchaseOutcome::Failed
}
