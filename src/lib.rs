#![cfg_attr(docsrs, feature(doc_cfg))]
//! Sliding window rate limiting for outbound HTTP requests.
//!
//! A [RateLimiter] admits at most `permits` requests within any trailing `period`, shared by
//! every caller of the same instance. Waiting callers are admitted in arrival order, can be
//! cancelled through a [CancellationToken](tokio_util::sync::CancellationToken) stored in the
//! request extensions, and responses marked with [CacheStatus::Hit] give their slot back.
//!
//! ```no_run
//! use outbound_rate_limit::backend::Quota;
//! use outbound_rate_limit::service::{service_fn, Service, ServiceExt};
//! use outbound_rate_limit::{Cancelled, RateLimiter};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let client = service_fn(|_req: http::Request<()>| async {
//!     Ok::<_, Cancelled>(http::Response::new(String::from("hello")))
//! });
//! let limiter = RateLimiter::with_url_prefix(
//!     Quota::new(5, Duration::from_secs(1)),
//!     "https://api.example.org",
//! );
//! let client = client.wrap(limiter);
//! let request = http::Request::get("https://api.example.org/manga").body(()).unwrap();
//! let response = client.call(request).await.unwrap();
//! # }
//! ```

pub mod backend;
mod cache;
mod middleware;
pub mod policy;
#[cfg(feature = "dashmap")]
#[cfg_attr(docsrs, doc(cfg(feature = "dashmap")))]
pub mod pool;
mod predicate;
pub mod service;

pub use backend::Cancelled;
pub use cache::CacheStatus;
pub use middleware::builder::RateLimiterBuilder;
pub use middleware::{RateLimiter, RateLimiterMiddleware};
pub use predicate::AdmissionPredicate;
