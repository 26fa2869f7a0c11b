use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::{BoxFuture, FutureExt};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::backoff::with_backoff;
use crate::error::{Error, Result};
use crate::scheduled_task::ScheduledTask;

/// Retry interval after a failed refresh.
const RETRY_INTERVAL_SECONDS: i64 = 30;
/// Never schedule the next refresh sooner than this.
const MIN_REFRESH_INTERVAL_SECONDS: i64 = 30;

/// The current chain-query bearer token.
///
/// Written only by the refresher task, read by every chain request; the lock
/// is held just long enough to clone the string out.
#[derive(Debug, Clone, Default)]
pub struct TokenCell {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().unwrap().clone()
    }

    pub fn set(&self, token: String) {
        *self.inner.write().unwrap() = Some(token);
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Exchanges the long-lived API key for short-lived query tokens.
#[derive(Clone)]
pub struct ChainAuth {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChainAuth {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn fetch(&self) -> Result<String> {
        let url = format!("{}/v1/auth/token", self.base_url);
        let body = serde_json::json!({ "api_key": self.api_key });
        let response: TokenResponse = with_backoff("v1/auth/token", || {
            let request = self.http.post(&url).json(&body);
            async move {
                request
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<TokenResponse>()
                    .await
            }
        })
        .await
        .map_err(Error::Chain)?;
        Ok(response.token)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    exp: i64,
}

/// Read the expiry out of a JWT without verifying its signature. The bot is
/// the token's consumer, not its verifier; it only needs to know when to ask
/// for a new one.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Utc.timestamp_opt(data.claims.exp, 0)
        .single()
        .ok_or_else(|| Error::protocol(format!("token expiry {} out of range", data.claims.exp)))
}

type TaskSlot = Arc<Mutex<Option<ScheduledTask<Result<()>>>>>;

/// Keeps the [`TokenCell`] fresh: fetches a token, reads its expiry, and
/// schedules itself again ahead of that expiry. Runs for the life of the
/// process, independently of the poll loop.
pub struct TokenRefresher {
    _task: TaskSlot,
}

impl TokenRefresher {
    /// Fetch the first token immediately and keep refreshing from then on.
    pub async fn start(auth: ChainAuth, cell: TokenCell, margin: Duration) -> Self {
        let slot: TaskSlot = Arc::new(Mutex::new(None));
        let first = Self::refresh(auth, cell, margin, slot.clone());
        let task = ScheduledTask::new(first, Utc::now());
        *slot.lock().await = Some(task);
        Self { _task: slot }
    }

    /// One refresh cycle. Since this is a recursive async function, we must
    /// use `BoxFuture` to avoid an infinitely-recursive state machine.
    fn refresh(
        auth: ChainAuth,
        cell: TokenCell,
        margin: Duration,
        slot: TaskSlot,
    ) -> BoxFuture<'static, Result<()>> {
        async move {
            let result = async {
                let token = auth.fetch().await?;
                let expiry = token_expiry(&token)?;
                cell.set(token);
                Ok(expiry)
            }
            .await;

            let now = Utc::now();
            let run_at = match &result {
                Ok(expiry) => {
                    debug!("Chain query token refreshed, expires {expiry}");
                    let earliest = now + Duration::seconds(MIN_REFRESH_INTERVAL_SECONDS);
                    (*expiry - margin).max(earliest)
                }
                Err(e) => {
                    warn!(
                        "Token refresh failed, retrying in {RETRY_INTERVAL_SECONDS} seconds: {e}"
                    );
                    now + Duration::seconds(RETRY_INTERVAL_SECONDS)
                }
            };

            // Replacing the slot drops our own (completed) handle.
            let next = Self::refresh(auth, cell, margin, slot.clone());
            *slot.lock().await = Some(ScheduledTask::new(next, run_at));

            result.map(|_| ())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // HS256 token with exp = 2000000000 (2033-05-18T03:33:20Z), signed with
    // an arbitrary key; the decoder must not care about the signature.
    const TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.\
eyJleHAiOjIwMDAwMDAwMDB9.\
4adcPe3mSjXjXcbnVyIhsFPsQuS4DeLyCIzaz1rx-qI";

    #[test]
    fn expiry_decodes_without_signature_check() {
        let expiry = token_expiry(TOKEN).unwrap();
        assert_eq!(expiry.timestamp(), 2_000_000_000);
    }

    #[test]
    fn garbage_token_is_an_error() {
        assert!(token_expiry("not-a-jwt").is_err());
    }

    #[test]
    fn token_cell_is_single_writer_multi_reader() {
        let cell = TokenCell::new();
        assert_eq!(cell.get(), None);
        cell.set("abc".to_string());
        let reader = cell.clone();
        assert_eq!(reader.get().as_deref(), Some("abc"));
        cell.set("def".to_string());
        assert_eq!(reader.get().as_deref(), Some("def"));
    }
}
