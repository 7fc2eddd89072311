use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::{
        header::{HeaderName, HeaderValue},
        StatusCode,
    },
    Error,
};
use futures::future::LocalBoxFuture;
use log::{info, warn};
use std::rc::Rc;
use std::time::Instant;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request access log with a correlation id.
///
/// The id is taken from an incoming `x-request-id` header when present,
/// otherwise generated, and echoed back on the response.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

fn request_id(req: &ServiceRequest) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();
        let id = request_id(&req);
        let method = req.method().to_string();
        let path = req.path().to_string();

        info!("[{}] {} {} started", id, method, path);

        let service = self.service.clone();

        Box::pin(async move {
            match service.call(req).await {
                Ok(mut res) => {
                    log_completion(&id, &method, &path, res.status(), started);
                    if let Ok(value) = HeaderValue::from_str(&id) {
                        res.headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(res)
                }
                // Guards such as BearerAuth reject with Err; render it here so
                // the rejection is logged and carries the id too
                Err(e) => {
                    let mut response = e.error_response();
                    log_completion(&id, &method, &path, response.status(), started);
                    if let Ok(value) = HeaderValue::from_str(&id) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Err(InternalError::from_response(e, response).into())
                }
            }
        })
    }
}

fn log_completion(id: &str, method: &str, path: &str, status: StatusCode, started: Instant) {
    let elapsed = started.elapsed().as_millis();
    if status.is_server_error() {
        warn!("[{}] {} {} -> {} ({}ms)", id, method, path, status.as_u16(), elapsed);
    } else {
        info!("[{}] {} {} -> {} ({}ms)", id, method, path, status.as_u16(), elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TokenCodec, TokenVerifier};
    use crate::blocklist::InMemoryBlocklist;
    use crate::configuration::JwtSettings;
    use crate::middleware::BearerAuth;
    use actix_web::{test, web, App, HttpResponse};
    use std::sync::Arc;

    fn verifier() -> TokenVerifier {
        let codec = TokenCodec::new(&JwtSettings {
            secret: "logger-test-secret".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 172800,
            url_token_expiry: 86400,
        })
        .unwrap();
        TokenVerifier::new(codec, Arc::new(InMemoryBlocklist::new()))
    }

    #[actix_web::test]
    async fn test_request_id_is_echoed() {
        let app = test::init_service(
            App::new()
                .wrap(LoggerMiddleware)
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/")
            .insert_header((REQUEST_ID_HEADER, "abc-123"))
            .to_request();
        let res = test::call_service(&app, req).await;

        assert_eq!(res.headers().get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    }

    #[actix_web::test]
    async fn test_request_id_is_generated_when_absent() {
        let app = test::init_service(
            App::new()
                .wrap(LoggerMiddleware)
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        let id = res.headers().get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[actix_web::test]
    async fn test_guard_rejection_keeps_request_id() {
        let app = test::init_service(
            App::new().wrap(LoggerMiddleware).service(
                web::resource("/me")
                    .wrap(BearerAuth::access(verifier()))
                    .route(web::get().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((REQUEST_ID_HEADER, "rejected-1"))
            .to_request();
        let err = app.call(req).await.err().expect("missing token must be rejected");
        let res = err.error_response();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers().get(REQUEST_ID_HEADER).unwrap(), "rejected-1");
    }
}
