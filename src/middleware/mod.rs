pub mod builder;

use crate::backend::{Backend, Quota, SlidingWindowBackend};
use crate::predicate::AdmissionPredicate;
use crate::service::{Service, Transform};
use builder::RateLimiterBuilder;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) type RollbackCondition<B> = dyn Fn(&Response<B>) -> bool + Send + Sync;

/// Rate limit middleware for outbound requests.
///
/// Requests matched by the [AdmissionPredicate] wait until the backend admits them; others are
/// passed straight through. Place a [CancellationToken] in the request extensions to be able to
/// abandon a request while it waits, the call then fails with the backend's error (for the
/// default backend, [Cancelled](crate::Cancelled)).
pub struct RateLimiter<BA, B> {
    pub(crate) backend: BA,
    pub(crate) predicate: AdmissionPredicate,
    pub(crate) rollback_condition: Option<Arc<RollbackCondition<B>>>,
}

impl<BA: Clone, B> Clone for RateLimiter<BA, B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            predicate: self.predicate.clone(),
            rollback_condition: self.rollback_condition.clone(),
        }
    }
}

impl<B: 'static> RateLimiter<SlidingWindowBackend, B> {
    /// A limiter applying `quota` to every request, giving back slots of cached responses.
    pub fn new(quota: Quota) -> Self {
        Self::builder(SlidingWindowBackend::new(quota)).build()
    }

    /// A limiter applying `quota` to requests whose URL starts with `prefix`.
    pub fn with_url_prefix(quota: Quota, prefix: &str) -> Self {
        Self::builder(SlidingWindowBackend::new(quota))
            .url_prefix(prefix)
            .build()
    }
}

impl<BA, B> RateLimiter<BA, B>
where
    BA: Backend,
    B: 'static,
{
    /// # Arguments
    ///
    /// * `backend`: A rate limiting algorithm and store implementation.
    pub fn builder(backend: BA) -> RateLimiterBuilder<BA, B> {
        RateLimiterBuilder::new(backend)
    }

    pub fn backend(&self) -> &BA {
        &self.backend
    }

    /// Wait for admission, then send `request` with `downstream`.
    ///
    /// The downstream result is returned unchanged. If the response satisfies the rollback
    /// condition the admission is given back to the backend afterwards.
    pub async fn proceed<ReqB, F, Fut, E>(
        &self,
        request: Request<ReqB>,
        downstream: F,
    ) -> Result<Response<B>, E>
    where
        F: FnOnce(Request<ReqB>) -> Fut,
        Fut: Future<Output = Result<Response<B>, E>>,
        E: From<BA::Error>,
        BA::Error: std::fmt::Display,
    {
        if !self.predicate.admits(request.uri()) {
            return downstream(request).await;
        }

        let cancel = request
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_default();
        let token = match self.backend.request(&cancel).await {
            Ok(token) => token,
            Err(e) => {
                log::debug!("Rate limiter did not admit {}: {e}", request.uri());
                return Err(e.into());
            }
        };

        let result = downstream(request).await;

        let rollback = match (&result, &self.rollback_condition) {
            (Ok(response), Some(rollback_condition)) => rollback_condition(response),
            _ => false,
        };
        if rollback {
            if let Err(e) = self.backend.rollback(token).await {
                log::error!("Unable to rollback rate limit admission: {e}");
            }
        }

        result
    }
}

impl<S, BA, B> Transform<S> for RateLimiter<BA, B>
where
    BA: Clone,
{
    type Service = RateLimiterMiddleware<S, BA, B>;

    fn new_transform(&self, service: S) -> Self::Service {
        RateLimiterMiddleware {
            service: Arc::new(service),
            limiter: self.clone(),
        }
    }
}

pub struct RateLimiterMiddleware<S, BA, B> {
    service: Arc<S>,
    limiter: RateLimiter<BA, B>,
}

impl<S, BA: Clone, B> Clone for RateLimiterMiddleware<S, BA, B> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

impl<S, ReqB, B, BA> Service<Request<ReqB>> for RateLimiterMiddleware<S, BA, B>
where
    S: Service<Request<ReqB>, Response = Response<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: From<BA::Error> + Send + 'static,
    ReqB: Send + 'static,
    B: Send + 'static,
    BA: Backend,
    BA::Error: std::fmt::Display,
{
    type Response = Response<B>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<ReqB>) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();

        Box::pin(async move { limiter.proceed(req, |req| service.call(req)).await })
    }
}
