//! MSU.io Marketplace Sniper Library
//!
//! An unattended watcher for the MSU.io item marketplace. It polls the
//! newest listings, matches them against user-defined rules and buys
//! affordable matches with EIP-712 signed orders:
//!
//! 1. **Pet mode**: watch recently listed pets and buy ones whose skill
//!    set matches a configured combination under its price ceiling.
//! 2. **Equipment mode**: watch recently listed equipment and buy items
//!    whose name matches a watchlist entry, capped by an explicit limit
//!    or by the live wallet balance.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod market;
pub mod retry;
pub mod session;
pub mod signer;
pub mod stats;
pub mod types;

pub use config::Config;
pub use engine::{WatchEngine, WatchMode};
pub use error::ApiError;
pub use executor::{Buyer, Purchaser};
pub use market::{MarketClient, Marketplace};
pub use session::{Session, SessionManager};
pub use signer::{OrderSigner, SignedOrder};
pub use stats::PriceStats;
pub use types::{CycleReport, FilterRule, Listing, PurchaseOutcome, SeenSet, TxStatus};
