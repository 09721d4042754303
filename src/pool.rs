use crate::backend::{Cancelled, SlidingWindowBackend};
use crate::middleware::{RateLimiter, RollbackCondition};
use crate::policy::{ConfigError, RateLimitConfig};
use crate::predicate::AdmissionPredicate;
use crate::service::{Service, Transform};
use crate::CacheStatus;
use dashmap::DashMap;
use futures::future::BoxFuture;
use http::{Request, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Independent sliding window limits for every host a client talks to.
///
/// Each host gets its own [SlidingWindowBackend], created on first use from the host's entry in
/// the [RateLimitConfig] (or its default policy). Requests to hosts without a policy, and
/// requests without a host, are not limited.
///
/// A backend is kept for every host seen until it is pruned, see [HostPool::prune] and
/// [HostPool::with_gc_interval].
pub struct HostPool<B> {
    hosts: Arc<DashMap<String, SlidingWindowBackend>>,
    config: Arc<RateLimitConfig>,
    rollback_condition: Option<Arc<RollbackCondition<B>>>,
    gc_handle: Option<Arc<GarbageCollector>>,
}

impl<B> Clone for HostPool<B> {
    fn clone(&self) -> Self {
        Self {
            hosts: self.hosts.clone(),
            config: self.config.clone(),
            rollback_condition: self.rollback_condition.clone(),
            gc_handle: self.gc_handle.clone(),
        }
    }
}

/// Stops the background task once the last pool handle is dropped.
struct GarbageCollector(JoinHandle<()>);

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn prune_idle(hosts: &DashMap<String, SlidingWindowBackend>) -> usize {
    let mut removed = 0;
    hosts.retain(|_host, backend| {
        let idle = backend.is_idle();
        if idle {
            removed += 1;
        }
        !idle
    });
    removed
}

impl<B: 'static> HostPool<B> {
    /// # Errors
    ///
    /// Returns an error if any policy in `config` is invalid.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            hosts: Arc::new(DashMap::new()),
            config: Arc::new(config),
            rollback_condition: Some(Arc::new(|response: &Response<B>| {
                CacheStatus::of(response).is_hit()
            })),
            gc_handle: None,
        })
    }

    /// Periodically [prune](HostPool::prune) the pool in a background task.
    ///
    /// Set to None to stop it. Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn with_gc_interval(mut self, interval: Option<Duration>) -> Self {
        self.gc_handle = interval.map(|interval| {
            assert!(!interval.is_zero(), "GC interval must be non-zero");
            let hosts = self.hosts.clone();
            Arc::new(GarbageCollector(tokio::spawn(async move {
                loop {
                    let removed = prune_idle(&hosts);
                    if removed > 0 {
                        log::debug!("Dropped rate limiters of {} idle hosts", removed);
                    }
                    tokio::time::sleep(interval).await;
                }
            })))
        });
        self
    }

    /// Replace the condition under which an admission is given back, see
    /// [RateLimiterBuilder::rollback_condition](crate::RateLimiterBuilder::rollback_condition).
    pub fn with_rollback_condition<C>(mut self, condition: Option<C>) -> Self
    where
        C: Fn(&Response<B>) -> bool + Send + Sync + 'static,
    {
        self.rollback_condition = condition.map(|c| Arc::new(c) as Arc<RollbackCondition<B>>);
        self
    }

    /// The backend limiting `host`, or [None] if no policy applies to it.
    pub fn backend(&self, host: &str) -> Option<SlidingWindowBackend> {
        let key = host.to_ascii_lowercase();
        if let Some(backend) = self.hosts.get(&key) {
            return Some(backend.clone());
        }
        // Validated on construction
        let quota = self.config.policy_for(&key)?.quota().ok()?;
        // Another caller may have created it in the meantime, theirs wins
        let backend = self
            .hosts
            .entry(key)
            .or_insert_with(|| SlidingWindowBackend::new(quota))
            .value()
            .clone();
        Some(backend)
    }

    /// Number of hosts a backend has been created for.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Drop the backends of hosts that have nothing left in their window and are not in use by
    /// any request, returning how many were dropped.
    ///
    /// A dropped host starts with a fresh window on its next request, which is equivalent since
    /// its window was empty.
    pub fn prune(&self) -> usize {
        prune_idle(&self.hosts)
    }

    fn limiter(&self, host: &str) -> Option<RateLimiter<SlidingWindowBackend, B>> {
        let backend = self.backend(host)?;
        Some(RateLimiter {
            backend,
            predicate: AdmissionPredicate::all(),
            rollback_condition: self.rollback_condition.clone(),
        })
    }

    /// Send `request` with `downstream` once the limit of its host admits it.
    pub async fn proceed<ReqB, F, Fut, E>(
        &self,
        request: Request<ReqB>,
        downstream: F,
    ) -> Result<Response<B>, E>
    where
        F: FnOnce(Request<ReqB>) -> Fut,
        Fut: Future<Output = Result<Response<B>, E>>,
        E: From<Cancelled>,
    {
        let limiter = request.uri().host().and_then(|host| self.limiter(host));
        match limiter {
            Some(limiter) => limiter.proceed(request, downstream).await,
            None => downstream(request).await,
        }
    }
}

impl<S, B> Transform<S> for HostPool<B> {
    type Service = HostPoolMiddleware<S, B>;

    fn new_transform(&self, service: S) -> Self::Service {
        HostPoolMiddleware {
            service: Arc::new(service),
            pool: self.clone(),
        }
    }
}

pub struct HostPoolMiddleware<S, B> {
    service: Arc<S>,
    pool: HostPool<B>,
}

impl<S, ReqB, B> Service<Request<ReqB>> for HostPoolMiddleware<S, B>
where
    S: Service<Request<ReqB>, Response = Response<B>> + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: From<Cancelled> + Send + 'static,
    ReqB: Send + 'static,
    B: Send + 'static,
{
    type Response = Response<B>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<ReqB>) -> Self::Future {
        let service = self.service.clone();
        let pool = self.pool.clone();

        Box::pin(async move { pool.proceed(req, |req| service.call(req)).await })
    }
}
