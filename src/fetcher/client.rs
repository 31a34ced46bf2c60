use crate::config::FetcherConfig;
use crate::fetcher::{
    errors::FetchError,
    pipeline::process_response,
    ssrf::{check_resolved, is_blocked, validate_url},
    types::PageResponse,
};
use reqwest::{Client, ClientBuilder, redirect::Policy};
use std::net::IpAddr;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

pub const MAX_BODY_SIZE: u64 = 10 * 1024 * 1024; // 10MB
pub const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; PrecisBot/1.0; +https://precis.example.com/bot)";
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP GET with an outbound target policy, bounded timeouts, a size cap and
/// exponential-backoff retries.
///
/// Built once per process and shared; the inner `reqwest::Client` pools
/// connections.
#[derive(Clone)]
pub struct SafeFetcher {
    client: Client,
    config: FetcherConfig,
}

impl SafeFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let allow_private = config.allow_private_targets;
        let redirect = Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !allow_private && redirect_target_blocked(attempt.url()) {
                // Hand the 3xx back instead of following it.
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .timeout(config.read_timeout + config.write_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(5)
            .user_agent(USER_AGENT)
            .redirect(redirect)
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static(ACCEPT),
                );
                headers
            })
            .build()
            .map_err(|e| FetchError::ClientInit(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetches `url`, retrying transient failures up to `max_attempts` times
    /// with a `retry_base_delay * 2^n` wait between attempts.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        let target = if self.config.allow_private_targets {
            validate_scheme_only(url)?
        } else {
            validate_url(url)?
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(&target).await {
                Ok(page) => return Ok(page),
                Err(e) if e.should_retry() => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    let delay = self
                        .config
                        .retry_base_delay
                        .saturating_mul(2_u32.saturating_pow(attempt - 1));
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, target: &Url) -> Result<PageResponse, FetchError> {
        if self.config.resolve_dns && !self.config.allow_private_targets {
            check_resolved(target).await?;
        }

        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        // Check content length before downloading
        if let Some(content_length) = response.content_length()
            && content_length > MAX_BODY_SIZE
        {
            return Err(FetchError::BodyTooLarge(content_length));
        }

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            return Err(FetchError::Http {
                status,
                retriable: status.is_server_error(),
            });
        }

        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if is_binary_media(&content_type) {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?;

        // Check body size after download (in case Content-Length was missing or understated)
        if body_bytes.len() as u64 > MAX_BODY_SIZE {
            return Err(FetchError::BodyTooLarge(body_bytes.len() as u64));
        }

        debug!(
            status = status.as_u16(),
            bytes = body_bytes.len(),
            final_url = %final_url,
            "Fetched page"
        );

        process_response(final_url, status, headers, body_bytes, &content_type)
    }
}

/// Media the extractor cannot read. Any other 2xx body is decoded as text.
fn is_binary_media(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ["image/", "audio/", "video/", "font/"]
        .iter()
        .any(|prefix| essence.starts_with(prefix))
        || matches!(
            essence.as_str(),
            "application/octet-stream" | "application/zip" | "application/gzip"
        )
}

fn validate_scheme_only(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::SchemeNotAllowed(other.to_string())),
    }
}

fn redirect_target_blocked(url: &Url) -> bool {
    let addr = match url.host() {
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        _ => return !matches!(url.scheme(), "http" | "https"),
    };
    is_blocked(addr) || !matches!(url.scheme(), "http" | "https")
}
