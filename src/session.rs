//! Authenticated session lifecycle
//!
//! The marketplace authenticates wallets with a challenge/response flow:
//! request a challenge message for the address, sign it with the wallet
//! key as a personal message (EIP-191, distinct from the order typed-data
//! scheme), and post the signature back to receive session cookies.
//!
//! The process holds at most one authenticated session. Re-authentication
//! is serialized behind a mutex so concurrent callers block on the
//! in-flight attempt instead of racing their own, and the session value
//! is replaced whole so readers never observe a half-refreshed one.

use crate::config::{Config, MarketApi};
use crate::error::ApiError;
use alloy::signers::{local::PrivateKeySigner, Signer};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Marker the backend puts in responses when session credentials are
/// missing or expired. Anything else is treated as a live session.
const MISSING_CREDENTIAL_MARKER: &str = "NO_AUTH_TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Authenticated,
    Anonymous,
}

/// Opaque request context: cookie set plus capability tag
#[derive(Debug, Clone)]
pub struct Session {
    pub kind: SessionKind,
    cookie_header: String,
    pub validated_at: DateTime<Utc>,
}

impl Session {
    fn new(kind: SessionKind, cookie_header: String) -> Self {
        Self {
            kind,
            cookie_header,
            validated_at: Utc::now(),
        }
    }

    /// Attach this session's cookies to an outgoing request
    pub fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.cookie_header.is_empty() {
            req
        } else {
            req.header(COOKIE, self.cookie_header.clone())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeResponse {
    challenge_message: String,
}

/// Owns the process-wide session values and serializes re-authentication
pub struct SessionManager {
    client: reqwest::Client,
    signer: PrivateKeySigner,
    wallet: String,
    cookie_override: Option<String>,
    authenticated: Mutex<Option<Session>>,
    anonymous: OnceLock<Session>,
}

impl SessionManager {
    pub fn new(config: &Config) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .context("MSU_PRIVATE_KEY is not a valid private key")?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            signer,
            wallet: config.wallet.clone(),
            cookie_override: config.cookie_override.clone(),
            authenticated: Mutex::new(None),
            anonymous: OnceLock::new(),
        })
    }

    /// Non-authenticated context with its own lifecycle, created lazily
    /// and reused for the remainder of the process.
    pub fn anonymous(&self) -> Session {
        self.anonymous
            .get_or_init(|| Session::new(SessionKind::Anonymous, String::new()))
            .clone()
    }

    /// Return a validated authenticated session, re-authenticating first
    /// if none exists or the freshness probe reports expiry. Holding the
    /// lock for the whole check-and-refresh means only one
    /// re-authentication runs at a time; concurrent callers block here
    /// and pick up its result.
    pub async fn authenticated(&self) -> Result<Session, ApiError> {
        let mut guard = self.authenticated.lock().await;

        if let Some(session) = guard.as_ref() {
            if self.probe_freshness(session).await {
                return Ok(session.clone());
            }
            info!("Session failed freshness probe, re-authenticating");
        }

        let fresh = self.sign_in().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Issue a lightweight authenticated call and look for the explicit
    /// credential-missing marker. Ambiguous responses (transport errors,
    /// unexpected bodies) count as fresh to avoid re-auth storms.
    async fn probe_freshness(&self, session: &Session) -> bool {
        let req = session.apply(self.client.get(MarketApi::auth_session_url()));
        match req.send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) => !body_reports_missing_credentials(&body),
                Err(_) => true,
            },
            Err(e) => {
                debug!("Freshness probe transport error, assuming fresh: {}", e);
                true
            }
        }
    }

    /// Full re-authentication: challenge, personal-message signature,
    /// sign-in. Any non-2xx fails the whole attempt; the caller decides
    /// whether to retry the outer loop.
    async fn sign_in(&self) -> Result<Session, ApiError> {
        if let Some(cookies) = &self.cookie_override {
            info!("Using pre-provisioned session cookies");
            return Ok(Session::new(SessionKind::Authenticated, cookies.clone()));
        }

        let resp = self
            .client
            .post(MarketApi::auth_challenge_url())
            .json(&json!({ "address": self.wallet }))
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("challenge request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!(
                "challenge request returned {status}: {body}"
            )));
        }

        let challenge: ChallengeResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("malformed challenge response: {e}")))?;

        let signature = self
            .signer
            .sign_message(challenge.challenge_message.as_bytes())
            .await
            .map_err(|e| ApiError::Auth(format!("challenge signing failed: {e}")))?;

        let resp = self
            .client
            .post(MarketApi::auth_signin_url())
            .json(&json!({
                "address": self.wallet,
                "signature": format!("0x{}", hex::encode(signature.as_bytes())),
                "walletType": "MetaMask",
            }))
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("sign-in request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!(
                "sign-in returned {status}: {body}"
            )));
        }

        let cookies = cookie_header_from_headers(resp.headers());
        if cookies.is_empty() {
            warn!("Sign-in succeeded but returned no cookies");
        }
        info!("Authenticated as {}", self.wallet);

        Ok(Session::new(SessionKind::Authenticated, cookies))
    }
}

fn body_reports_missing_credentials(body: &str) -> bool {
    body.contains(MISSING_CREDENTIAL_MARKER)
}

/// Collect `Set-Cookie` name=value pairs into a single `Cookie` header value
fn cookie_header_from_headers(headers: &HeaderMap) -> String {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn cookies_are_collected_from_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("session=abc123; Path=/; HttpOnly"),
        );
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("refresh=xyz789; Secure"),
        );
        assert_eq!(
            cookie_header_from_headers(&headers),
            "session=abc123; refresh=xyz789"
        );
    }

    #[test]
    fn no_cookies_yields_empty_header() {
        let headers = HeaderMap::new();
        assert_eq!(cookie_header_from_headers(&headers), "");
    }

    #[test]
    fn missing_credential_marker_detection() {
        assert!(body_reports_missing_credentials(
            r#"{"code":"NO_AUTH_TOKEN","message":"credential missing"}"#
        ));
        // Ambiguous bodies are treated as fresh
        assert!(!body_reports_missing_credentials(r#"{"address":"0xabc"}"#));
        assert!(!body_reports_missing_credentials(""));
    }
}
