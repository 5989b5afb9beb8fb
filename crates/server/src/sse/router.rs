// SPDX-License-Identifier: BSD-3-Clause

use std::collections::HashMap;

use crate::http::Request;
use crate::sse::handler::Handler;

/// The outcome of routing a request.
#[derive(Debug)]
pub enum Route<'a> {
  /// The request opens an event stream served by the handler.
  Stream(&'a Handler),

  /// No event stream is served at the request path.
  NotFound,

  /// An event stream is served at the request path, but not for this method.
  MethodNotAllowed,
}

/// Maps request paths to event stream handlers.
///
/// Event streams are only opened by `GET` requests.
#[derive(Clone, Debug, Default)]
pub struct Router {
  routes: HashMap<String, Handler>,
}

// ===== impl Router =====

impl Router {
  pub fn new() -> Self {
    Self::default()
  }

  /// Serves an event stream at `path`, replacing any handler already there.
  pub fn route(mut self, path: impl Into<String>, handler: Handler) -> Self {
    self.routes.insert(path.into(), handler);
    self
  }

  /// Resolves the route for a request.
  pub fn resolve(&self, request: &Request) -> Route<'_> {
    match self.routes.get(request.path()) {
      Some(handler) if request.method == "GET" => Route::Stream(handler),
      Some(_) => Route::MethodNotAllowed,
      None => Route::NotFound,
    }
  }

  /// Returns whether no route has been registered.
  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use crate::sse::handler::producer_fn;

  fn router() -> Router {
    let handler = Handler::new(producer_fn(|_, _, _| async {}));
    Router::new().route("/stream", handler)
  }

  #[test]
  fn test_resolve() {
    let router = router();

    assert!(matches!(router.resolve(&Request::new("GET", "/stream")), Route::Stream(_)));
    assert!(matches!(router.resolve(&Request::new("GET", "/stream?topic=a")), Route::Stream(_)));
    assert!(matches!(router.resolve(&Request::new("POST", "/stream")), Route::MethodNotAllowed));
    assert!(matches!(router.resolve(&Request::new("GET", "/other")), Route::NotFound));
    assert!(matches!(router.resolve(&Request::new("GET", "/stream/")), Route::NotFound));
  }

  #[test]
  fn test_empty_router() {
    assert!(Router::new().is_empty());
    assert!(!router().is_empty());
    assert!(matches!(Router::new().resolve(&Request::new("GET", "/")), Route::NotFound));
  }
}
