use crate::http::{full_body, make_boxed_error_response};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

/// Serves `/health` and `/ready` on the admin listener.
pub struct AdminService<F, E> {
    is_ready: F,
    _error: PhantomData<E>,
}

impl<F, E> AdminService<F, E>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F) -> Self {
        Self {
            is_ready,
            _error: PhantomData,
        }
    }
}

fn admin_response<E: 'static>(path: &str, is_ready: bool) -> Response<BoxBody<Bytes, E>> {
    match path {
        "/health" => Response::new(full_body("ok\n")),
        "/ready" => match is_ready {
            true => Response::new(full_body("ok\n")),
            false => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
        },
        _ => make_boxed_error_response(StatusCode::NOT_FOUND),
    }
}

impl<F, E> Service<Request<Incoming>> for AdminService<F, E>
where
    F: Fn() -> bool + Send + 'static,
    E: Send + 'static,
{
    type Response = Response<BoxBody<Bytes, E>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let res = admin_response(req.uri().path(), (self.is_ready)());
        Box::pin(async move { Ok(res) })
    }
}
