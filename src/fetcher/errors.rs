use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("scheme not allowed: {0} (only http and https are fetched)")]
    SchemeNotAllowed(String),

    #[error("url has no host")]
    MissingHost,

    #[error("target address not allowed: {host} ({addr})")]
    BlockedTarget { host: String, addr: IpAddr },

    #[error("dns failure: {0}")]
    Dns(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("connect timeout")]
    ConnectTimeout,

    #[error("request timeout")]
    RequestTimeout,

    #[error("too many redirects")]
    RedirectLoop,

    #[error("http error {status}")]
    Http {
        status: reqwest::StatusCode,
        retriable: bool,
    },

    #[error("content too large: {0} bytes (max: {max})", max = crate::fetcher::MAX_BODY_SIZE)]
    BodyTooLarge(u64),

    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("http client could not be built: {0}")]
    ClientInit(String),

    #[error("failed to fetch {url} after {attempts} attempts: {source}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    #[error("unknown: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Transport failures and 5xx responses are worth another attempt; policy,
    /// size and decoding failures are not.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Http { retriable, .. } => *retriable,
            Self::Dns(_)
            | Self::Tls(_)
            | Self::ConnectTimeout
            | Self::RequestTimeout
            | Self::Io(_)
            | Self::Unknown(_) => true,
            _ => false,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            if err.is_connect() {
                Self::ConnectTimeout
            } else {
                Self::RequestTimeout
            }
        } else if err.is_redirect() {
            Self::RedirectLoop
        } else if let Some(status) = err.status() {
            Self::Http {
                status,
                retriable: status.is_server_error(),
            }
        } else if err.is_connect() || err.is_request() {
            // reqwest folds resolution failures into connect errors
            Self::Dns(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Io(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}
