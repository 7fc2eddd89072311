/// Bearer token middleware
///
/// Runs `TokenVerifier` for the wrapped route and, once a token is admitted,
/// stores its `TokenPayload` in the request extensions for the handler to
/// pick up through `web::ReqData<TokenPayload>`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::{TokenKind, TokenVerifier};

/// Guards a route with the given token kind
pub struct BearerAuth {
    verifier: TokenVerifier,
    required: TokenKind,
}

impl BearerAuth {
    /// Admit access tokens only
    pub fn access(verifier: TokenVerifier) -> Self {
        Self {
            verifier,
            required: TokenKind::Access,
        }
    }

    /// Admit refresh tokens only
    pub fn refresh(verifier: TokenVerifier) -> Self {
        Self {
            verifier,
            required: TokenKind::Refresh,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = BearerAuthService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(BearerAuthService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
            required: self.required,
        }))
    }
}

pub struct BearerAuthService<S> {
    service: Rc<S>,
    verifier: TokenVerifier,
    required: TokenKind,
}

impl<S, B> Service<ServiceRequest> for BearerAuthService<S>
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
        let authorization = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);

        let service = self.service.clone();
        let verifier = self.verifier.clone();
        let required = self.required;

        Box::pin(async move {
            // Rejections go through AppError's ResponseError for the JSON body
            let payload = verifier.verify(authorization.as_deref(), required).await?;

            tracing::debug!(
                user_id = %payload.user.user_id,
                jti = %payload.jti,
                "Bearer token admitted"
            );
            req.extensions_mut().insert(payload);

            service.call(req).await
        })
    }
}
