use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use http::Extensions;
use reqwest_middleware::{Middleware, Next};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};

/// Minimum spacing between requests to one upstream.
///
/// Clients attach it to each request with `RequestBuilder::with_extension`; requests without a
/// pace go out immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Pace {
    pub api: &'static str,
    pub min_interval: Duration,
}

/// NLM asks RxNav clients to stay under 20 requests per second.
pub(crate) const RXNAV_PACE: Pace = Pace {
    api: "rxnav",
    min_interval: Duration::from_millis(50),
};

pub(crate) const HUGGINGFACE_PACE: Pace = Pace {
    api: "huggingface",
    min_interval: Duration::from_millis(250),
};

/// Hands out send slots per upstream, in request order.
#[derive(Debug, Default)]
pub(crate) struct RateLimiter {
    next_free: Mutex<HashMap<&'static str, Instant>>,
}

impl RateLimiter {
    /// Reserves the next slot for `pace.api` and sleeps until it arrives.
    ///
    /// The reservation happens under the lock; the sleep does not.
    pub(crate) async fn acquire(&self, pace: Pace) {
        if pace.min_interval.is_zero() {
            return;
        }
        let slot = {
            let mut next_free = self.next_free.lock().await;
            let now = Instant::now();
            let slot = next_free
                .get(pace.api)
                .copied()
                .filter(|at| *at > now)
                .unwrap_or(now);
            next_free.insert(pace.api, slot + pace.min_interval);
            slot
        };
        sleep_until(slot).await;
    }
}

static GLOBAL_RATE_LIMITER: OnceLock<Arc<RateLimiter>> = OnceLock::new();

#[derive(Clone, Debug)]
pub(crate) struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Middleware backed by the process-wide limiter shared by every client.
    pub(crate) fn new() -> Self {
        Self {
            limiter: GLOBAL_RATE_LIMITER
                .get_or_init(|| Arc::new(RateLimiter::default()))
                .clone(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        if let Some(pace) = extensions.get::<Pace>().copied() {
            self.limiter.acquire(pace).await;
        }
        next.run(req, extensions).await
    }
}
