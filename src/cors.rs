use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::{header, Method};
use actix_web::{Error, HttpResponse};
use futures_util::future::{LocalBoxFuture, ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

const ALLOW_METHODS: &str = "GET, POST, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Reflects `Origin` only for allow-listed origins; anything else gets no
/// CORS headers at all and the browser blocks the read. Preflights never
/// reach the router.
#[derive(Clone, Default)]
pub struct CorsPolicy {
    allowed: Arc<Vec<String>>,
}

impl CorsPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed = origins
            .into_iter()
            .map(Into::into)
            .map(|o: String| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        Self { allowed: Arc::new(allowed) }
    }

    /// Comma-separated list, as found in `ALLOWED_ORIGINS`.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn allows(&self, origin: &str) -> bool {
        !origin.is_empty() && self.allowed.iter().any(|o| o == origin)
    }

    fn apply(&self, origin: Option<&str>, headers: &mut header::HeaderMap) {
        headers.insert(header::VARY, header::HeaderValue::from_static("Origin"));
        let Some(origin) = origin.filter(|o| self.allows(o)) else { return };
        let Ok(value) = header::HeaderValue::from_str(origin) else { return };
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, header::HeaderValue::from_static(ALLOW_METHODS));
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, header::HeaderValue::from_static(ALLOW_HEADERS));
    }
}

impl<S, B> Transform<S, ServiceRequest> for CorsPolicy
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = CorsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CorsMiddleware {
            service: Rc::new(service),
            policy: self.clone(),
        }))
    }
}

pub struct CorsMiddleware<S> {
    service: Rc<S>,
    policy: CorsPolicy,
}

impl<S, B> Service<ServiceRequest> for CorsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let policy = self.policy.clone();
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        if req.method() == Method::OPTIONS {
            let mut res = req.into_response(HttpResponse::NoContent().finish());
            policy.apply(origin.as_deref(), res.headers_mut());
            return Box::pin(async move { Ok(res.map_into_right_body()) });
        }

        Box::pin(async move {
            let mut res = svc.call(req).await?;
            policy.apply(origin.as_deref(), res.headers_mut());
            Ok(res.map_into_left_body())
        })
    }
}
