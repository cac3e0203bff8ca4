use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use rowgate_core::config::ConnectConfig;

/// Ticket lifetime, measured from the last fetch.
const TICKET_TTL: Duration = Duration::from_secs(7000);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider error {code}: {message}")]
    Remote { code: i64, message: String },

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider response missing {0}")]
    Malformed(&'static str),

    #[error("third-party provider is not configured")]
    NotConfigured,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Identity handed back by the code exchange.
#[derive(Debug, Clone)]
pub struct ConnectIdentity {
    pub open_id: String,
    pub session_key: String,
    pub union_id: Option<String>,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    openid: Option<String>,
    session_key: Option<String>,
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Deserialize)]
struct TicketResponse {
    ticket: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

// ---------------------------------------------------------------------------
// ConnectClient
// ---------------------------------------------------------------------------

struct CachedTicket {
    value: String,
    fetched_at: Instant,
}

/// Client for the third-party identity provider: the authorization-code
/// exchange used by login, and the two-step ticket fetch behind a
/// process-wide cache used by signed requests.
pub struct ConnectClient {
    http: reqwest::Client,
    config: ConnectConfig,
    ticket: Mutex<Option<CachedTicket>>,
}

impl ConnectClient {
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            ticket: Mutex::new(None),
        }
    }

    /// Exchange an authorization code for the caller's external identity.
    pub async fn exchange_code(&self, code: &str) -> Result<ConnectIdentity, ProviderError> {
        if !self.config.login_configured() {
            return Err(ProviderError::NotConfigured);
        }
        let resp: ExchangeResponse = self
            .http
            .get(&self.config.auth_url)
            .query(&[
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.secret.as_str()),
                ("js_code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json()
            .await?;
        if resp.errcode != 0 {
            return Err(ProviderError::Remote {
                code: resp.errcode,
                message: resp.errmsg,
            });
        }
        let open_id = resp
            .openid
            .filter(|s| !s.is_empty())
            .ok_or(ProviderError::Malformed("openid"))?;
        Ok(ConnectIdentity {
            open_id,
            session_key: resp.session_key.unwrap_or_default(),
            union_id: resp.unionid.filter(|s| !s.is_empty()),
        })
    }

    /// The short-lived server ticket for page signatures. Callers either get
    /// the still-valid cached value or wait while one refresh runs under the
    /// lock; there is no stampede protection beyond that serialization.
    pub async fn page_ticket(&self) -> Result<String, ProviderError> {
        if !self.config.signature_configured() {
            return Err(ProviderError::NotConfigured);
        }
        let mut slot = self.ticket.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < TICKET_TTL {
                return Ok(cached.value.clone());
            }
        }
        let value = self.fetch_ticket().await?;
        *slot = Some(CachedTicket {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Two-step exchange: a client-credential access token, then the ticket.
    async fn fetch_ticket(&self) -> Result<String, ProviderError> {
        let token: TokenResponse = self
            .http
            .get(&self.config.token_url)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", self.config.app_id.as_str()),
                ("secret", self.config.secret.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;
        if token.errcode != 0 {
            return Err(ProviderError::Remote {
                code: token.errcode,
                message: token.errmsg,
            });
        }
        let access_token = token
            .access_token
            .filter(|s| !s.is_empty())
            .ok_or(ProviderError::Malformed("access_token"))?;

        let ticket: TicketResponse = self
            .http
            .get(&self.config.ticket_url)
            .query(&[("access_token", access_token.as_str()), ("type", "jsapi")])
            .send()
            .await?
            .json()
            .await?;
        if ticket.errcode != 0 {
            return Err(ProviderError::Remote {
                code: ticket.errcode,
                message: ticket.errmsg,
            });
        }
        ticket
            .ticket
            .filter(|s| !s.is_empty())
            .ok_or(ProviderError::Malformed("ticket"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
