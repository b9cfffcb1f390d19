//! EIP-712 order signing
//!
//! Builds the marketplace's nine-field `Order` typed-data message and
//! signs its struct hash with the wallet key. Timestamps and the salt
//! are computed fresh per call, so two orders for the same item never
//! collide even on immediate retries.
//!
//! The signed message uses canonical binary addresses and `isSeller = 0`;
//! the transport payload keeps the configured address casing, stringified
//! numerics and `isSeller: false`. The backend expects exactly this split.

use crate::config::{Config, CHAIN_ID, NFT_ADDRESS, TOKEN_ADDRESS, VERIFYING_CONTRACT};
use alloy::primitives::{Address, U256};
use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

sol! {
    struct Order {
        uint256 isSeller;
        address maker;
        uint256 listingTime;
        uint256 expirationTime;
        address tokenAddress;
        uint256 tokenAmount;
        address nftAddress;
        uint256 nftTokenId;
        uint256 salt;
    }
}

/// Order lifetime baked into every purchase signature
const ORDER_TTL_SECS: u64 = 24 * 60 * 60;

/// Transport form of a signed order, as the buy endpoint expects it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub is_seller: bool,
    pub maker: String,
    pub listing_time: String,
    pub expiration_time: String,
    pub token_address: String,
    pub token_amount: String,
    pub nft_address: String,
    pub nft_token_id: String,
    pub salt: String,
}

/// A purchase order plus its typed-data signature
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub order: OrderPayload,
    pub order_sign: String,
}

/// Signs purchase orders for a single wallet
pub struct OrderSigner {
    signer: PrivateKeySigner,
    maker: Address,
    /// Wallet address in its configured casing, for the transport payload
    maker_display: String,
    token_address: Address,
    nft_address: Address,
    domain: Eip712Domain,
}

impl OrderSigner {
    pub fn new(config: &Config) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .context("MSU_PRIVATE_KEY is not a valid private key")?;

        let maker: Address = config
            .wallet
            .parse()
            .context("MSU_WALLET is not a valid address")?;

        let token_address: Address = TOKEN_ADDRESS.parse().context("bad token address")?;
        let nft_address: Address = NFT_ADDRESS.parse().context("bad NFT address")?;
        let verifying_contract: Address = VERIFYING_CONTRACT
            .parse()
            .context("bad verifying contract address")?;

        let domain = Eip712Domain::new(
            Some("Marketplace".into()),
            Some("1.0".into()),
            Some(U256::from(CHAIN_ID)),
            Some(verifying_contract),
            None,
        );

        Ok(Self {
            signer,
            maker,
            maker_display: config.wallet.clone(),
            token_address,
            nft_address,
            domain,
        })
    }

    /// Sign a purchase order for `token_id` at `price_wei`, with
    /// timestamps taken from the current clock.
    pub fn sign(&self, token_id: u64, price_wei: &str) -> Result<SignedOrder> {
        self.sign_at(token_id, price_wei, Utc::now())
    }

    /// Same as [`OrderSigner::sign`] with an explicit clock, so tests can
    /// assert deterministic output.
    pub fn sign_at(
        &self,
        token_id: u64,
        price_wei: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedOrder> {
        let listing_time = now.timestamp() as u64;
        let expiration_time = listing_time + ORDER_TTL_SECS;
        let salt = now.timestamp_millis() as u64;

        let token_amount =
            U256::from_str_radix(price_wei, 10).context("priceWei is not a decimal integer")?;

        let message = Order {
            isSeller: U256::ZERO,
            maker: self.maker,
            listingTime: U256::from(listing_time),
            expirationTime: U256::from(expiration_time),
            tokenAddress: self.token_address,
            tokenAmount: token_amount,
            nftAddress: self.nft_address,
            nftTokenId: U256::from(token_id),
            salt: U256::from(salt),
        };

        let hash = message.eip712_signing_hash(&self.domain);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .context("order signing failed")?;

        Ok(SignedOrder {
            order: OrderPayload {
                is_seller: false,
                maker: self.maker_display.clone(),
                listing_time: listing_time.to_string(),
                expiration_time: expiration_time.to_string(),
                token_address: TOKEN_ADDRESS.to_string(),
                token_amount: price_wei.to_string(),
                nft_address: NFT_ADDRESS.to_string(),
                nft_token_id: token_id.to_string(),
                salt: salt.to_string(),
            },
            order_sign: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Throwaway key, never funded
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_WALLET: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn test_signer() -> OrderSigner {
        let config = Config {
            private_key: TEST_KEY.to_string(),
            wallet: TEST_WALLET.to_string(),
            cookie_override: None,
            pet_rules: vec![],
            equipment_rules: vec![],
            poll_interval_secs: 8,
            item_pacing_ms: 100,
        };
        OrderSigner::new(&config).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn identical_inputs_and_clock_sign_identically() {
        let signer = test_signer();
        let a = signer.sign_at(4242, "300000000000000000000000", fixed_now()).unwrap();
        let b = signer.sign_at(4242, "300000000000000000000000", fixed_now()).unwrap();
        assert_eq!(a.order_sign, b.order_sign);
        assert_eq!(a.order.salt, b.order.salt);
    }

    #[test]
    fn fresh_salt_changes_the_signature() {
        let signer = test_signer();
        let a = signer.sign_at(4242, "1000000000000000000", fixed_now()).unwrap();
        let later = fixed_now() + chrono::Duration::milliseconds(1);
        let b = signer.sign_at(4242, "1000000000000000000", later).unwrap();
        assert_ne!(a.order.salt, b.order.salt);
        assert_ne!(a.order_sign, b.order_sign);
    }

    #[test]
    fn payload_carries_transport_conventions() {
        let signer = test_signer();
        let signed = signer.sign_at(4242, "1000000000000000000", fixed_now()).unwrap();

        assert!(!signed.order.is_seller);
        // Configured address casing is preserved on the wire
        assert_eq!(signed.order.maker, TEST_WALLET);
        assert_eq!(signed.order.listing_time, "1700000000");
        assert_eq!(signed.order.expiration_time, "1700086400");
        assert_eq!(signed.order.salt, "1700000000000");
        assert_eq!(signed.order.token_amount, "1000000000000000000");
        assert_eq!(signed.order.nft_token_id, "4242");

        // 65-byte ECDSA signature, 0x-prefixed hex
        assert!(signed.order_sign.starts_with("0x"));
        assert_eq!(signed.order_sign.len(), 2 + 130);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let signer = test_signer();
        let signed = signer.sign_at(7, "5", fixed_now()).unwrap();
        let value = serde_json::to_value(&signed).unwrap();
        assert_eq!(value["order"]["isSeller"], false);
        assert!(value["order"]["nftTokenId"].is_string());
        assert!(value["orderSign"].is_string());
        assert!(value.get("tokenId").is_none());
    }

    #[test]
    fn malformed_price_is_an_error() {
        let signer = test_signer();
        assert!(signer.sign_at(1, "12.5", fixed_now()).is_err());
        assert!(signer.sign_at(1, "abc", fixed_now()).is_err());
    }
}
