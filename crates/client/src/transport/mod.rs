//! HTTP transport: the [`ApiClient`] pipeline and failure normalization.

mod client;
mod normalize;

pub use client::{ApiClient, ApiClientBuilder, ProgressFn, RequestOptions};
pub use normalize::ErrorNormalizer;
