//! Per-principal rate limiting.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tracing::warn;

use super::{Middleware, Next, RequestContext, Response};
use crate::{Error, Result};

type PrincipalRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rejects requests from principals over their per-minute quota.
///
/// Limiters are created lazily from [`Principal::rate_limit`]; a limit of
/// zero means unlimited.
///
/// [`Principal::rate_limit`]: crate::gateway::auth::Principal::rate_limit
#[derive(Default)]
pub struct RateLimitMiddleware {
    limiters: DashMap<String, Arc<PrincipalRateLimiter>>,
}

impl RateLimitMiddleware {
    /// Create the unit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, principal: &str, per_minute: u32) -> bool {
        let Some(quota) = NonZeroU32::new(per_minute) else {
            return true;
        };
        let limiter = self
            .limiters
            .entry(principal.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(Quota::per_minute(quota))))
            .clone();
        limiter.check().is_ok()
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> Result<Response> {
        let principal = ctx.principal();
        if !self.check(&principal.id, principal.rate_limit) {
            warn!(principal = %principal.id, limit = principal.rate_limit, "Rate limit exceeded");
            return Err(Error::RateLimited(principal.id.clone()));
        }
        next.run(ctx).await
    }
}
