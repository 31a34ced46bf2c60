pub mod client;
pub mod errors;
pub mod pipeline;
pub mod ssrf;
pub mod types;

pub use client::{MAX_BODY_SIZE, MAX_REDIRECTS, SafeFetcher};
pub use errors::FetchError;
pub use ssrf::validate_url;
pub use types::{Charset, PageResponse};
