use actix_web::dev::HttpServiceFactory;
use actix_web::http::header;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};

use serde::{Deserialize, Serialize};

use crate::auth::Administrator;
use crate::error::{RestError, RestResult};
use crate::repo::{SubmissionMeta, WaitlistEmail};
use crate::service::{ExportError, SubmitError, SubmitOutcome, WaitlistService, WaitlistStats};

/// Form deserialization wrapper for email submissions
#[derive(Debug, Deserialize)]
pub struct EmailForm {
    email: String,
}

/// UTM campaign parameters, forwarded by the signup form
#[derive(Debug, Deserialize)]
pub struct UtmQuery {
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
}

/// Wire response shared by the public waitlist endpoints
#[derive(Debug, Serialize)]
struct WaitlistResponse {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<WaitlistEmail>,
}

impl WaitlistResponse {
    fn new(success: bool, message: &'static str) -> Self {
        Self {
            success,
            message,
            data: None,
        }
    }

    fn with_data(success: bool, message: &'static str, data: Option<WaitlistEmail>) -> Self {
        Self {
            success,
            message,
            data,
        }
    }
}

/// Capture provenance metadata from the incoming request
fn submission_meta(req: &HttpRequest, utm: UtmQuery) -> SubmissionMeta {
    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .map(str::to_owned);

    SubmissionMeta {
        ip_address,
        user_agent: header_str(req, header::USER_AGENT),
        referrer: header_str(req, header::REFERER),
        utm_source: utm.utm_source,
        utm_medium: utm.utm_medium,
        utm_campaign: utm.utm_campaign,
    }
}

fn header_str(req: &HttpRequest, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Public signup endpoint
#[tracing::instrument(name = "Join the waitlist", skip(req, service, query, form))]
#[post("")]
async fn join(
    req: HttpRequest,
    service: web::Data<WaitlistService>,
    query: web::Query<UtmQuery>,
    form: web::Form<EmailForm>,
) -> impl Responder {
    let meta = submission_meta(&req, query.into_inner());

    match service.submit(&form.email, meta).await {
        Ok(SubmitOutcome::Joined(record)) => HttpResponse::Created().json(
            WaitlistResponse::with_data(
                true,
                "Success! You're now on our waitlist. We'll notify you when we launch!",
                record,
            ),
        ),
        Ok(SubmitOutcome::Reactivated(record)) => HttpResponse::Ok().json(
            WaitlistResponse::with_data(
                true,
                "Welcome back! You're now on our waitlist.",
                Some(record),
            ),
        ),
        Ok(SubmitOutcome::AlreadyJoined) => HttpResponse::Conflict().json(WaitlistResponse::new(
            false,
            "This email is already on our waitlist!",
        )),
        Ok(SubmitOutcome::Blocked) => HttpResponse::Conflict().json(WaitlistResponse::new(
            false,
            "This email address can't be added to the waitlist.",
        )),
        Err(SubmitError::InvalidEmail(_)) => HttpResponse::BadRequest().json(
            WaitlistResponse::new(false, "Please enter a valid email address."),
        ),
        Err(SubmitError::Store(error)) => {
            tracing::error!(%error, "Failed to submit waitlist email");
            HttpResponse::InternalServerError().json(WaitlistResponse::new(
                false,
                "An error occurred. Please try again.",
            ))
        }
    }
}

/// Public unsubscribe endpoint
#[tracing::instrument(name = "Unsubscribe from the waitlist", skip(service, form))]
#[post("/unsubscribe")]
async fn unsubscribe(
    service: web::Data<WaitlistService>,
    form: web::Form<EmailForm>,
) -> impl Responder {
    match service.unsubscribe(&form.email).await {
        Ok(()) => HttpResponse::Ok().json(WaitlistResponse::new(
            true,
            "You have been successfully unsubscribed from our waitlist.",
        )),
        Err(error) => {
            tracing::error!(%error, "Failed to unsubscribe waitlist email");
            HttpResponse::InternalServerError().json(WaitlistResponse::new(
                false,
                "An error occurred. Please try again.",
            ))
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    success: bool,
    data: WaitlistStats,
}

/// Statistics endpoint for administrative dashboards
#[tracing::instrument(name = "Waitlist statistics", skip(service))]
#[get("/stats")]
async fn stats(
    _admin: Administrator,
    service: web::Data<WaitlistService>,
) -> RestResult<impl Responder> {
    let data = service.stats().await.map_err(|error| {
        tracing::error!(%error, "Failed to load waitlist stats");
        RestError::InternalError("Failed to load statistics.".into())
    })?;

    Ok(web::Json(StatsResponse {
        success: true,
        data,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    success: bool,
    data: Vec<WaitlistEmail>,
    count: i64,
}

/// Paginated listing endpoint, newest-first
#[tracing::instrument(name = "List waitlist emails", skip(service))]
#[get("")]
async fn list(
    _admin: Administrator,
    service: web::Data<WaitlistService>,
    query: web::Query<PageQuery>,
) -> RestResult<impl Responder> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let offset = query.offset.unwrap_or(0).max(0);

    let (data, count) = service.all_emails(limit, offset).await.map_err(|error| {
        tracing::error!(%error, "Failed to list waitlist emails");
        RestError::InternalError("Failed to load emails.".into())
    })?;

    Ok(web::Json(ListResponse {
        success: true,
        data,
        count,
    }))
}

/// CSV export of all active signups
#[tracing::instrument(name = "Export waitlist emails", skip(service))]
#[get("/export")]
async fn export(
    _admin: Administrator,
    service: web::Data<WaitlistService>,
) -> RestResult<impl Responder> {
    match service.export_csv().await {
        Ok(csv) => Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"waitlist_emails.csv\"",
            ))
            .body(csv)),
        Err(ExportError::NoActiveEmails) => Ok(HttpResponse::NotFound().json(
            WaitlistResponse::new(false, "No active emails found."),
        )),
        Err(ExportError::Store(error)) => {
            tracing::error!(%error, "Failed to export waitlist emails");
            Err(RestError::InternalError("Failed to export emails.".into()))
        }
    }
}

/// Waitlist API endpoints
pub fn scope() -> impl HttpServiceFactory {
    web::scope("/waitlist")
        .service(join)
        .service(unsubscribe)
        .service(stats)
        .service(export)
        .service(list)
}
