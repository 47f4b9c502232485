//! GitHub REST access for the issue pipeline.
//!
//! - [`http`]: transport seam, retry policy and the retrying client
//! - [`models`]: wire payloads of the Search and Repository endpoints
//! - [`query`]: search-query and URL construction
//! - [`pipeline`]: the fetch cycle behind [`IssueFetcher::fetch_issues`]

pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod models;
pub mod pipeline;
pub mod query;

pub use http::{HttpClient, ReqwestTransport, RetryPolicy, Transport};
pub use pipeline::{CacheMode, FetchDiagnostics, FetchOutcome, IssueFetcher};
