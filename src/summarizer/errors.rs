use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("ollama request timed out: {0}")]
    Timeout(String),

    #[error("ollama request timed out after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<SummarizeError>,
    },

    #[error("ollama request failed: {0}")]
    Request(String),

    #[error("ollama returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid response from ollama: {0}")]
    InvalidResponse(String),

    #[error("ollama client could not be built: {0}")]
    ClientInit(String),
}

impl SummarizeError {
    /// Only timeouts are retried; every other failure is final.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RetriesExhausted { .. })
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}
