use crate::backend::Backend;
use crate::cache::CacheStatus;
use crate::middleware::{RateLimiter, RollbackCondition};
use crate::predicate::AdmissionPredicate;
use http::{Response, Uri};
use std::sync::Arc;

pub struct RateLimiterBuilder<BA, B> {
    backend: BA,
    predicate: AdmissionPredicate,
    rollback_condition: Option<Arc<RollbackCondition<B>>>,
}

impl<BA, B> RateLimiterBuilder<BA, B>
where
    BA: Backend,
    B: 'static,
{
    pub(super) fn new(backend: BA) -> Self {
        Self {
            backend,
            predicate: AdmissionPredicate::all(),
            rollback_condition: Some(Arc::new(|response: &Response<B>| {
                CacheStatus::of(response).is_hit()
            })),
        }
    }

    /// Choose which requests are subject to the limiter.
    ///
    /// By default every request is.
    pub fn admission_predicate(mut self, predicate: AdmissionPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Only limit requests matching `f`.
    pub fn admit_if<F>(self, f: F) -> Self
    where
        F: Fn(&Uri) -> bool + Send + Sync + 'static,
    {
        self.admission_predicate(AdmissionPredicate::custom(f))
    }

    /// Only limit requests whose URL starts with `prefix`.
    pub fn url_prefix(self, prefix: &str) -> Self {
        self.admission_predicate(AdmissionPredicate::url_prefix(prefix))
    }

    /// Only limit requests to `host`.
    pub fn host(self, host: &str) -> Self {
        self.admission_predicate(AdmissionPredicate::host(host))
    }

    /// After a request has been sent, decide from its response whether the request should still
    /// count against the quota.
    ///
    /// By default the admission is rolled back for responses marked with [CacheStatus::Hit].
    /// Passing [None] disables rollback entirely.
    pub fn rollback_condition<C>(mut self, condition: Option<C>) -> Self
    where
        C: Fn(&Response<B>) -> bool + Send + Sync + 'static,
    {
        self.rollback_condition = condition.map(|c| Arc::new(c) as Arc<RollbackCondition<B>>);
        self
    }

    /// Configures the [RateLimiterBuilder::rollback_condition] to also rollback if the status
    /// code is a server error (5xx), in addition to cache hits.
    pub fn rollback_server_errors(mut self) -> Self {
        self.rollback_condition = Some(Arc::new(|response: &Response<B>| {
            CacheStatus::of(response).is_hit() || response.status().is_server_error()
        }));
        self
    }

    pub fn build(self) -> RateLimiter<BA, B> {
        RateLimiter {
            backend: self.backend,
            predicate: self.predicate,
            rollback_condition: self.rollback_condition,
        }
    }
}
