//! Minimal request/response service abstraction used to decorate an HTTP client.
//!
//! A [Service] sends a request and eventually yields a response. A [Transform] wraps one service
//! in another with the same request, response and error types, so decorators (rate limiting,
//! retries, logging, caching) compose by repeated [ServiceExt::wrap] calls:
//!
//! ```
//! use outbound_rate_limit::service::{service_fn, Service, ServiceExt, Transform};
//!
//! struct Uppercase;
//!
//! struct UppercaseService<S>(S);
//!
//! impl<S> Transform<S> for Uppercase {
//!     type Service = UppercaseService<S>;
//!
//!     fn new_transform(&self, service: S) -> Self::Service {
//!         UppercaseService(service)
//!     }
//! }
//!
//! impl<S> Service<String> for UppercaseService<S>
//! where
//!     S: Service<String>,
//! {
//!     type Response = S::Response;
//!     type Error = S::Error;
//!     type Future = S::Future;
//!
//!     fn call(&self, req: String) -> Self::Future {
//!         self.0.call(req.to_uppercase())
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let echo = service_fn(|req: String| async move { Ok::<_, ()>(req) }).wrap(Uppercase);
//! assert_eq!(echo.call("hello".to_string()).await, Ok("HELLO".to_string()));
//! # });
//! ```

use std::future::Future;

/// An asynchronous function from a request to a response.
pub trait Service<Req> {
    type Response;
    type Error;
    type Future: Future<Output = Result<Self::Response, Self::Error>>;

    fn call(&self, req: Req) -> Self::Future;
}

/// A factory for a decorator around a [Service].
pub trait Transform<S> {
    type Service;

    fn new_transform(&self, service: S) -> Self::Service;
}

pub trait ServiceExt<Req>: Service<Req> + Sized {
    /// Wrap this service in the given decorator.
    fn wrap<T>(self, transform: T) -> T::Service
    where
        T: Transform<Self>,
    {
        transform.new_transform(self)
    }
}

impl<S, Req> ServiceExt<Req> for S where S: Service<Req> {}

/// A [Service] backed by a closure, see [service_fn].
#[derive(Clone)]
pub struct ServiceFn<F>(F);

/// Create a [Service] from an async closure.
pub fn service_fn<F>(f: F) -> ServiceFn<F> {
    ServiceFn(f)
}

impl<F, Req, Fut, Res, E> Service<Req> for ServiceFn<F>
where
    F: Fn(Req) -> Fut,
    Fut: Future<Output = Result<Res, E>>,
{
    type Response = Res;
    type Error = E;
    type Future = Fut;

    fn call(&self, req: Req) -> Self::Future {
        (self.0)(req)
    }
}
