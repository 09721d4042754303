use http::Response;

/// Whether a response was produced by a network round-trip or by a local cache.
///
/// A caching layer below the [RateLimiter](crate::RateLimiter) marks its responses by inserting
/// this value into the response extensions; unmarked responses count as [CacheStatus::Miss].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheStatus {
    /// The response came from the network.
    #[default]
    Miss,
    /// The response was served locally, the remote host was never contacted.
    Hit,
}

impl CacheStatus {
    pub fn of<B>(response: &Response<B>) -> Self {
        response
            .extensions()
            .get::<CacheStatus>()
            .copied()
            .unwrap_or_default()
    }

    pub fn is_hit(self) -> bool {
        matches!(self, Self::Hit)
    }

    /// Record this status in the extensions of `response`.
    pub fn mark<B>(self, response: &mut Response<B>) {
        response.extensions_mut().insert(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_response_is_miss() {
        let response = Response::new(());
        assert_eq!(CacheStatus::of(&response), CacheStatus::Miss);
    }

    #[test]
    fn test_marked_response() {
        let mut response = Response::new(());
        CacheStatus::Hit.mark(&mut response);
        assert!(CacheStatus::of(&response).is_hit());
    }
}
