use http::Uri;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

type PredicateFn = dyn Fn(&Uri) -> bool + Send + Sync;

/// Decides which requests a [RateLimiter](crate::RateLimiter) applies to.
///
/// Requests that are not admitted by the predicate bypass the limiter entirely. The predicate is
/// evaluated exactly once per request and should be free of side effects.
#[derive(Clone)]
pub struct AdmissionPredicate(Arc<PredicateFn>);

impl AdmissionPredicate {
    /// Applies the limiter to every request.
    pub fn all() -> Self {
        Self(Arc::new(|_| true))
    }

    /// Applies the limiter to requests whose full URL starts with `prefix`,
    /// e.g. `https://api.example.org/v2`.
    pub fn url_prefix(prefix: &str) -> Self {
        let prefix = prefix.to_owned();
        Self(Arc::new(move |uri| uri.to_string().starts_with(&prefix)))
    }

    /// Applies the limiter to requests for the given host (ignoring ASCII case).
    pub fn host(host: &str) -> Self {
        let host = host.to_owned();
        Self(Arc::new(move |uri| {
            uri.host()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(&host))
        }))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Uri) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn admits(&self, uri: &Uri) -> bool {
        (self.0)(uri)
    }
}

impl Default for AdmissionPredicate {
    fn default() -> Self {
        Self::all()
    }
}

impl Debug for AdmissionPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdmissionPredicate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_all() {
        let predicate = AdmissionPredicate::default();
        assert!(predicate.admits(&uri("https://example.org/")));
        assert!(predicate.admits(&uri("/relative")));
    }

    #[test]
    fn test_url_prefix() {
        let predicate = AdmissionPredicate::url_prefix("https://cdn.example");
        assert!(predicate.admits(&uri("https://cdn.example/covers/1.jpg")));
        assert!(predicate.admits(&uri("https://cdn.example")));
        assert!(!predicate.admits(&uri("https://other.example/covers/1.jpg")));
        assert!(!predicate.admits(&uri("http://cdn.example/covers/1.jpg")));
    }

    #[test]
    fn test_host() {
        let predicate = AdmissionPredicate::host("api.example.org");
        assert!(predicate.admits(&uri("https://API.example.org/search?q=1")));
        assert!(predicate.admits(&uri("http://api.example.org:8080/")));
        assert!(!predicate.admits(&uri("https://cdn.example.org/")));
        assert!(!predicate.admits(&uri("/no/host")));
    }

    #[test]
    fn test_custom() {
        let predicate = AdmissionPredicate::custom(|uri| uri.path().starts_with("/api/"));
        assert!(predicate.admits(&uri("https://example.org/api/manga")));
        assert!(!predicate.admits(&uri("https://example.org/static/logo.png")));
    }
}
