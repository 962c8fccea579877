//! Upstream clients, the capability traits the core is written against, and shared HTTP helpers.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use tracing::warn;

use crate::error::MedSafeError;

pub(crate) mod huggingface;
pub(crate) mod rate_limit;
pub(crate) mod rxnav;

pub use huggingface::{GenerationParams, HuggingFaceClient};
pub use rxnav::{ApproximateCandidate, InteractionData, RelatedConcept, RxNavClient};

const ERROR_BODY_MAX_BYTES: usize = 2048;
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

/// Approximate-match, label and relation lookups against a drug vocabulary.
#[async_trait]
pub trait Terminology: Send + Sync {
    /// Returns the rank-0 candidate for `term`, or `None` when nothing matches.
    async fn approximate_match(
        &self,
        term: &str,
    ) -> Result<Option<ApproximateCandidate>, MedSafeError>;

    /// Preferred display name for a code. A missing concept is `Ok(None)`.
    async fn label(&self, rxcui: &str) -> Result<Option<String>, MedSafeError>;

    /// Concepts related to `rxcui` restricted to the given term types (e.g. `IN`, `SCD`).
    async fn related(
        &self,
        rxcui: &str,
        term_types: &[&str],
    ) -> Result<Vec<RelatedConcept>, MedSafeError>;
}

/// Grouped interaction lookup for a set of codes.
#[async_trait]
pub trait InteractionSource: Send + Sync {
    async fn interactions(&self, rxcuis: &[String]) -> Result<InteractionData, MedSafeError>;
}

/// Free-text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, MedSafeError>;
}

pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Returns the shared HTTP client with rate-limit middleware.
///
/// Individual calls set their own timeout; the client-level timeout is only an upper bound.
/// No retry middleware is installed: a failed call is reported to the caller as-is.
pub(crate) fn shared_client() -> Result<ClientWithMiddleware, MedSafeError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let base_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("medsafe/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(MedSafeError::HttpClientInit)?;

    let client = ClientBuilder::new(base_client)
        .with(rate_limit::RateLimitMiddleware::new())
        .build();

    match HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HTTP_CLIENT.get().cloned().ok_or_else(|| MedSafeError::Api {
            api: "http-client".into(),
            message: "Shared HTTP client initialization race".into(),
        }),
    }
}

/// One-line, size-capped rendering of an upstream body for error messages.
pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let cut = bytes.len().min(ERROR_BODY_MAX_BYTES);
    let text = String::from_utf8_lossy(&bytes[..cut]);
    let mut excerpt = text
        .trim_end_matches('\u{fffd}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > cut {
        excerpt.push_str(" …");
    }
    excerpt
}

/// RxNav and the inference API answer outages with an HTML page; anything else is parsed.
pub(crate) fn reject_html(
    api: &str,
    content_type: Option<&HeaderValue>,
    body: &[u8],
) -> Result<(), MedSafeError> {
    let media_type = content_type
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if media_type != "text/html" {
        return Ok(());
    }
    warn!(source = api, "upstream answered with an HTML page");
    Err(MedSafeError::Api {
        api: api.to_string(),
        message: format!("Unexpected HTML response: {}", body_excerpt(body)),
    })
}

pub(crate) async fn read_capped(
    mut resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, MedSafeError> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(MedSafeError::Api {
                api: api.to_string(),
                message: format!("Response body exceeded {MAX_BODY_BYTES} bytes"),
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Sends `req`, requires a success status and a non-HTML body, and decodes it as JSON.
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    api: &str,
    req: reqwest_middleware::RequestBuilder,
) -> Result<T, MedSafeError> {
    let resp = req.send().await?;
    let status = resp.status();
    let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).cloned();
    let bytes = read_capped(resp, api).await?;
    if !status.is_success() {
        let excerpt = body_excerpt(&bytes);
        return Err(MedSafeError::Api {
            api: api.to_string(),
            message: format!("HTTP {status}: {excerpt}"),
        });
    }
    reject_html(api, content_type.as_ref(), &bytes)?;
    serde_json::from_slice(&bytes).map_err(|source| MedSafeError::ApiJson {
        api: api.to_string(),
        source,
    })
}
