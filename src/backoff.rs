use std::future::Future;
use std::time::Duration;

/// First retry delay.
const INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Total attempts before giving up.
const MAX_ATTEMPTS: u32 = 5;

/// Run a fallible request with capped exponential backoff: 100ms, 200ms,
/// 400ms, ... for a fixed number of attempts. On exhaustion the last error is
/// returned to the caller rather than waiting forever.
pub async fn with_backoff<T, F, Fut>(what: &str, mut attempt: F) -> reqwest::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = reqwest::Result<T>>,
{
    let mut delay = INITIAL_DELAY;
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tries += 1;
                if tries >= MAX_ATTEMPTS {
                    warn!("{what}: giving up after {tries} attempts: {err}");
                    return Err(err);
                }
                debug!("{what}: attempt {tries} failed, retrying in {delay:?}: {err}");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    // reqwest errors cannot be constructed directly, so failure paths are
    // exercised against a closed local port.
    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let client = reqwest::Client::new();
        let result: reqwest::Result<()> = with_backoff("test request", || {
            calls.fetch_add(1, Ordering::SeqCst);
            let client = client.clone();
            async move {
                client
                    .get("http://127.0.0.1:9/unroutable")
                    .send()
                    .await
                    .map(|_| ())
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test request", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<u32, reqwest::Error>(n) }
        })
        .await
        .unwrap();
        assert_eq!(result, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
