use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web::http::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::admin::{render_table, ADMIN_PAGE_LIMIT};
use crate::auth::AccessGate;
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::BookingRepo;
use crate::sink::{BookingSink, StoreSink};
use crate::sites::{SiteDirectory, SiteProfile};
use crate::turnstile::BotCheck;
use crate::validate::{truncate_chars, BookingSubmission, Provenance};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            .service(
                web::resource("/bookings")
                    .route(web::get().to(list_bookings))
                    .route(web::post().to(create_booking))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(web::resource("/bookings/").to(missing_id))
            .service(
                web::resource("/bookings/{id}")
                    .route(web::get().to(get_booking))
                    .route(web::patch().to(update_booking))
                    .route(web::delete().to(delete_booking))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/sites/{slug}")
                    .route(web::get().to(get_site))
                    .default_service(web::to(method_not_allowed)),
            ),
    );
    // legacy paths kept for already-deployed front ends
    cfg.service(
        web::resource("/booking")
            .route(web::post().to(create_booking))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/admin")
            .route(web::get().to(admin_page))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.service(
        web::resource("/admin/bookings")
            .route(web::get().to(list_bookings))
            .default_service(web::to(method_not_allowed)),
    );
    cfg.default_service(web::to(not_found));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn BookingRepo>,
    pub sink: Arc<dyn BookingSink>,
    pub bot_check: Arc<dyn BotCheck>,
    pub gate: Arc<AccessGate>,
    pub sites: Arc<SiteDirectory>,
    pub client_ip_header: Option<String>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

impl AppState {
    /// Store-backed state: accepted bookings are inserted into `repo`.
    pub fn new(repo: Arc<dyn BookingRepo>, bot_check: Arc<dyn BotCheck>, gate: AccessGate) -> Self {
        Self {
            sink: Arc::new(StoreSink::new(repo.clone())),
            repo,
            bot_check,
            gate: Arc::new(gate),
            sites: Arc::new(SiteDirectory::empty()),
            client_ip_header: None,
            rate_limiter: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn BookingSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_sites(mut self, sites: Arc<SiteDirectory>) -> Self {
        self.sites = sites;
        self
    }

    pub fn with_client_ip_header(mut self, name: impl Into<String>) -> Self {
        self.client_ip_header = Some(name.into());
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    fn client_ip(&self, req: &HttpRequest) -> Option<String> {
        self.client_ip_header
            .as_deref()
            .and_then(|h| req.headers().get(h))
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .or_else(|| req.peer_addr().map(|a| a.ip().to_string()))
    }
}

// Request/response shapes. The create body is read as raw JSON so that
// aliases and non-string values can be normalised by the validator; this
// struct only documents it.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Also accepted as `propertySlug` or `property`
    pub site: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Also accepted as `checkIn`
    pub start_date: String,
    /// Also accepted as `checkOut`
    pub end_date: String,
    pub message: Option<String>,
    pub turnstile_token: String,
    #[schema(value_type = Option<Object>)]
    pub guests: Option<Value>,
    pub flexibility: Option<String>,
    pub honeypot: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingResponse {
    pub ok: bool,
    pub data: Booking,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingListResponse {
    pub ok: bool,
    pub data: Vec<Booking>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SiteResponse {
    pub ok: bool,
    pub data: SiteProfile,
}

#[utoipa::path(
    post,
    path = "/v1/bookings",
    tag = "bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 200, description = "Booking accepted", body = CreatedResponse),
        (status = 400, description = "Invalid JSON, missing fields or invalid email", body = crate::error::ApiErrorBody),
        (status = 403, description = "Bot check failed", body = crate::error::ApiErrorBody),
        (status = 429, description = "Too many submissions from this address", body = crate::error::ApiErrorBody),
        (status = 500, description = "Store failure", body = crate::error::ApiErrorBody),
        (status = 502, description = "Email delivery failure", body = crate::error::ApiErrorBody)
    )
)]
pub async fn create_booking(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let ip = data.client_ip(&req);
    if let (Some(limiter), Some(ip)) = (&data.rate_limiter, ip.as_deref()) {
        if !limiter.allow_booking(ip) {
            warn!("booking submission throttled");
            debug!(ip, "throttled client");
            return Err(ApiError::RateLimited);
        }
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;
    let submission = BookingSubmission::from_json(&payload)?;

    if !data.bot_check.verify(&submission.turnstile_token, ip.as_deref()).await {
        info!(site = %submission.site, "bot check rejected submission");
        return Err(ApiError::VerificationFailed);
    }
    if submission.extras.honeypot_filled() {
        info!(site = %submission.site, "submission carries a honeypot value");
    }

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    debug!(ip = ?ip, "recording booking");
    let receipt = data.sink.record(submission.into_new_booking(Provenance { ip, user_agent })).await?;
    Ok(HttpResponse::Ok().json(CreatedResponse { ok: true, id: receipt.id }))
}

#[utoipa::path(
    get,
    path = "/v1/bookings",
    tag = "bookings",
    params(ListParams),
    responses(
        (status = 200, description = "Most recent bookings first", body = BookingListResponse),
        (status = 401, description = "Admin access required", body = crate::error::ApiErrorBody)
    )
)]
pub async fn list_bookings(
    req: HttpRequest,
    data: web::Data<AppState>,
    params: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ApiError> {
    data.gate.authorize(&req)?;
    let query = ListQuery::from_params(&ListParams::from_pairs(params.into_inner()));
    let bookings = data.repo.list(&query).await?;
    Ok(HttpResponse::Ok().json(BookingListResponse { ok: true, data: bookings }))
}

/// `/v1/bookings/` with an empty id segment.
async fn missing_id() -> Result<HttpResponse, ApiError> {
    Err(ApiError::InvalidId)
}

fn parse_id(raw: &str) -> Result<Id, ApiError> {
    raw.trim().parse::<Id>().map_err(|_| ApiError::InvalidId)
}

#[utoipa::path(
    get,
    path = "/v1/bookings/{id}",
    tag = "bookings",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking", body = BookingResponse),
        (status = 400, description = "Invalid ID", body = crate::error::ApiErrorBody),
        (status = 401, description = "Admin access required", body = crate::error::ApiErrorBody),
        (status = 404, description = "Not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_booking(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&path)?;
    data.gate.authorize(&req)?;
    let booking = data.repo.get(id).await?;
    Ok(HttpResponse::Ok().json(BookingResponse { ok: true, data: booking }))
}

/// Pulls the two mutable fields out of an arbitrary JSON body.
fn patch_from_json(body: &Value) -> BookingPatch {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(|s| truncate_chars(s.trim(), MAX_STATUS_LEN))
        .filter(|s| !s.is_empty());
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(|s| truncate_chars(s.trim(), MAX_MESSAGE_LEN));
    BookingPatch { status, message }
}

#[utoipa::path(
    patch,
    path = "/v1/bookings/{id}",
    tag = "bookings",
    request_body = BookingPatch,
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Updated booking", body = BookingResponse),
        (status = 400, description = "Invalid ID, invalid JSON or no updatable fields", body = crate::error::ApiErrorBody),
        (status = 401, description = "Admin access required", body = crate::error::ApiErrorBody),
        (status = 404, description = "Not found", body = crate::error::ApiErrorBody)
    )
)]
pub async fn update_booking(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&path)?;
    data.gate.authorize(&req)?;
    let payload: Value = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson)?;
    let patch = patch_from_json(&payload);
    if patch.is_empty() {
        return Err(ApiError::NoUpdatableFields);
    }
    let booking = data.repo.update_partial(id, patch).await?;
    info!(id, status = %booking.status, "booking updated");
    Ok(HttpResponse::Ok().json(BookingResponse { ok: true, data: booking }))
}

#[utoipa::path(
    delete,
    path = "/v1/bookings/{id}",
    tag = "bookings",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Marked deleted (idempotent)", body = OkResponse),
        (status = 400, description = "Invalid ID", body = crate::error::ApiErrorBody),
        (status = 401, description = "Admin access required", body = crate::error::ApiErrorBody)
    )
)]
pub async fn delete_booking(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&path)?;
    data.gate.authorize(&req)?;
    data.repo.soft_delete(id).await?;
    info!(id, "booking soft-deleted");
    Ok(HttpResponse::Ok().json(OkResponse { ok: true }))
}

#[utoipa::path(
    get,
    path = "/v1/sites/{slug}",
    tag = "sites",
    params(("slug" = String, Path, description = "Site slug")),
    responses(
        (status = 200, description = "Public site profile", body = SiteResponse),
        (status = 404, description = "Unknown site", body = crate::error::ApiErrorBody)
    )
)]
pub async fn get_site(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let profile = data.sites.get(&path).cloned().ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(SiteResponse { ok: true, data: profile }))
}

pub async fn admin_page(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.gate.authorize(&req)?;
    let query = ListQuery { limit: ADMIN_PAGE_LIMIT, ..ListQuery::default() };
    let rows = data.repo.list(&query).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_table(&rows)))
}

async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}
