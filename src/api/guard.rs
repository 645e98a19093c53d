//! Request interceptor.
//!
//! Wraps the whole application: canary routes and throttled clients are
//! answered here, everything else continues to the route handlers with the
//! client fingerprint stored in the request extensions.

use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, HttpResponse};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::api::ApiResponse;
use crate::core::fingerprint::ClientFingerprint;
use crate::core::honeypot::CANARY_RESPONSE_BODY;
use crate::core::pipeline::{SecurityPipeline, Verdict};

/// Middleware factory
pub struct SecurityGuard {
    pipeline: Arc<SecurityPipeline>,
}

impl SecurityGuard {
    pub fn new(pipeline: Arc<SecurityPipeline>) -> Self {
        Self { pipeline }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SecurityGuardMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityGuardMiddleware {
            service: Rc::new(service),
            pipeline: Arc::clone(&self.pipeline),
        }))
    }
}

pub struct SecurityGuardMiddleware<S> {
    service: Rc<S>,
    pipeline: Arc<SecurityPipeline>,
}

impl<S, B> Service<ServiceRequest> for SecurityGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let fingerprint = ClientFingerprint::from_request(pipeline.fingerprint_config(), req.request());
            let path = req.path().to_string();
            let url = req.uri().to_string();

            match pipeline.intercept(&fingerprint, &path, &url).await {
                Verdict::Proceed => {
                    req.extensions_mut().insert(fingerprint);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Verdict::Throttled => {
                    let response = HttpResponse::TooManyRequests().json(ApiResponse {
                        success: false,
                        message: "Too many requests".to_string(),
                    });
                    Ok(req.into_response(response).map_into_right_body())
                }
                Verdict::Canary => {
                    let response = HttpResponse::NotFound()
                        .content_type("text/plain; charset=utf-8")
                        .body(CANARY_RESPONSE_BODY);
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}
