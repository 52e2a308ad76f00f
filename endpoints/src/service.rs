use crate::cookie_sync::CookieSyncHandler;
use crate::errors::EndpointError;
use crate::handler::Handler;
use crate::metrics_defs::REQUEST_DURATION;
use crate::setuid::SetuidHandler;
use crate::state::SyncState;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use shared::histogram;
use shared::http::{full_body, make_boxed_error_response};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Routes `/cookie_sync` and `/setuid` to their handlers.
pub struct EndpointService {
    cookie_sync: Arc<dyn Handler>,
    setuid: Arc<dyn Handler>,
}

impl EndpointService {
    pub fn new(state: Arc<SyncState>) -> Self {
        EndpointService {
            cookie_sync: Arc::new(CookieSyncHandler::new(state.clone())),
            setuid: Arc::new(SetuidHandler::new(state)),
        }
    }

    fn route(&self, method: &Method, path: &str) -> Result<Arc<dyn Handler>, StatusCode> {
        let (handler, allowed) = match path {
            "/cookie_sync" => (&self.cookie_sync, Method::POST),
            "/setuid" => (&self.setuid, Method::GET),
            _ => return Err(StatusCode::NOT_FOUND),
        };
        if *method != allowed {
            return Err(StatusCode::METHOD_NOT_ALLOWED);
        }
        Ok(handler.clone())
    }
}

/// Runs a handler, turning its error into the matching response.
pub(crate) async fn serve(handler: &dyn Handler, request: Request<Bytes>) -> Response<Bytes> {
    let start = Instant::now();
    let response = match handler.handle(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(endpoint = handler.name(), error = %e, "request failed");
            e.to_response()
        }
    };
    histogram!(
        REQUEST_DURATION,
        "endpoint" => handler.name().to_string(),
        "status" => response.status().as_str().to_string()
    )
    .record(start.elapsed().as_secs_f64());
    response
}

impl Service<Request<Incoming>> for EndpointService {
    type Response = Response<BoxBody<Bytes, Self::Error>>;
    type Error = EndpointError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.route(req.method(), req.uri().path());

        Box::pin(async move {
            let handler = match handler {
                Ok(handler) => handler,
                Err(status) => {
                    tracing::debug!(
                        method = %req.method(),
                        path = %req.uri().path(),
                        "no endpoint matched"
                    );
                    return Ok(make_boxed_error_response(status));
                }
            };

            let (parts, body) = req.into_parts();
            let response = match body.collect().await {
                Ok(collected) => {
                    let request = Request::from_parts(parts, collected.to_bytes());
                    serve(handler.as_ref(), request).await
                }
                Err(e) => EndpointError::RequestBodyError(e.to_string()).to_response(),
            };
            Ok(response.map(full_body))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::test_state;

    #[test]
    fn test_route() {
        let service = EndpointService::new(test_state());

        let handler = service.route(&Method::POST, "/cookie_sync").unwrap();
        assert_eq!(handler.name(), "cookie_sync");
        let handler = service.route(&Method::GET, "/setuid").unwrap();
        assert_eq!(handler.name(), "setuid");

        assert_eq!(
            service.route(&Method::GET, "/cookie_sync").err(),
            Some(StatusCode::METHOD_NOT_ALLOWED)
        );
        assert_eq!(
            service.route(&Method::GET, "/unknown").err(),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[tokio::test]
    async fn test_serve_maps_errors() {
        let service = EndpointService::new(test_state());

        let request = Request::get("/setuid?uid=123").body(Bytes::new()).unwrap();
        let response = serve(service.setuid.as_ref(), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body(),
            &Bytes::from("\"bidder\" query param is required\n")
        );

        let request = Request::post("/cookie_sync")
            .body(Bytes::from(r#"{"bidders": ["appnexus"]}"#))
            .unwrap();
        let response = serve(service.cookie_sync.as_ref(), request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
