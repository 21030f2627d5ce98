//! # Feed Fetching
//!
//! Transport seam for remote calendar feeds, with the HTTP implementation
//! used by the daemon.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.4.0

use crate::core::{DecodeError, FetchError};
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;

/// Feeds larger than this are refused
pub const MAX_FEED_BYTES: u64 = 10 * 1024 * 1024;

/// Default request timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Feed bytes as text. Invalid UTF-8 is a decode failure, never lossy.
pub fn decode_text(bytes: Vec<u8>) -> Result<String, DecodeError> {
    String::from_utf8(bytes).map_err(|e| DecodeError(e.utf8_error().to_string()))
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("nudge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(HttpFetcher {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        // webcal:// is plain HTTPS with a different scheme
        let url = match url.strip_prefix("webcal://") {
            Some(rest) => format!("https://{rest}"),
            None => url.to_string(),
        };

        let mut response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Transport(format!("timed out after {} seconds", self.timeout_secs))
            } else if e.is_connect() {
                FetchError::Transport(format!("could not connect to {url}"))
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_FEED_BYTES {
                return Err(FetchError::Transport(format!(
                    "feed is too large ({length} bytes, limit {MAX_FEED_BYTES})"
                )));
            }
        }

        // Content-Length is absent for chunked bodies, so count as we read
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
        {
            append_limited(&mut bytes, &chunk, MAX_FEED_BYTES)?;
        }

        if bytes.is_empty() {
            warn!("Feed {url} returned an empty body");
        }
        debug!("Fetched {} bytes from {url}", bytes.len());
        Ok(bytes)
    }
}

fn append_limited(body: &mut Vec<u8>, chunk: &[u8], limit: u64) -> Result<(), FetchError> {
    let total = (body.len() + chunk.len()) as u64;
    if total > limit {
        return Err(FetchError::Transport(format!(
            "feed is too large (over {limit} bytes)"
        )));
    }
    body.extend_from_slice(chunk);
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::StaticFetcher;
    use super::*;

    #[test]
    fn test_decode_text_rejects_invalid_utf8() {
        assert_eq!(decode_text(b"BEGIN:VCALENDAR".to_vec()).unwrap(), "BEGIN:VCALENDAR");
        let err = decode_text(vec![0x42, 0xff, 0xfe]).unwrap_err();
        assert!(err.to_string().starts_with("feed is not valid UTF-8"));
    }

    #[test]
    fn test_body_limit_applies_across_chunks() {
        let mut body = Vec::new();
        append_limited(&mut body, b"BEGIN:", 10).unwrap();
        append_limited(&mut body, b"VCAL", 10).unwrap();
        assert_eq!(body, b"BEGIN:VCAL".to_vec());

        let err = append_limited(&mut body, b"E", 10).unwrap_err();
        assert!(matches!(err, FetchError::Transport(message) if message.contains("too large")));
        assert_eq!(body.len(), 10);
    }

    #[test]
    fn test_http_fetcher_builds() {
        assert!(HttpFetcher::new(DEFAULT_FETCH_TIMEOUT_SECS).is_ok());
    }

    #[tokio::test]
    async fn test_static_fetcher_serves_and_fails() {
        let fetcher = StaticFetcher::new();
        fetcher.respond("https://a.example/cal.ics", "BEGIN:VCALENDAR");
        fetcher.fail("https://b.example/cal.ics", FetchError::Status(500));

        assert_eq!(
            fetcher.fetch("https://a.example/cal.ics").await.unwrap(),
            b"BEGIN:VCALENDAR".to_vec()
        );
        assert_eq!(
            fetcher.fetch("https://b.example/cal.ics").await,
            Err(FetchError::Status(500))
        );
        assert_eq!(fetcher.fetch("https://c.example").await, Err(FetchError::Status(404)));
        assert_eq!(fetcher.calls().len(), 3);
    }
}
