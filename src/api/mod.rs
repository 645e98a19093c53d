//! API endpoints for the honeypot guard.
//!
//! Credential endpoints (`/register`, `/login`) run through the security
//! pipeline; the `/api/v1` scope exposes the attack report and health check.

pub mod guard;

use std::sync::Arc;

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse, Responder};
use log::error;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::core::attack_log::{AttackEvent, AttackSummary, EventFilter};
use crate::core::fingerprint::ClientFingerprint;
use crate::core::pipeline::{LoginOutcome, RegisterOutcome, SecurityPipeline};
use crate::utils::get_current_timestamp;

pub use guard::SecurityGuard;

pub struct ApiState {
    pub pipeline: Arc<SecurityPipeline>,
    pub metrics: Option<PrometheusHandle>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/metrics").route(web::get().to(metrics)))
        .service(
            web::scope("/api/v1")
                .service(web::resource("/health").route(web::get().to(health_check)))
                .service(web::resource("/attacks").route(web::get().to(list_attacks)))
                .service(web::resource("/attacks/summary").route(web::get().to(attack_summary))),
        );
}

/// Body shared by the credential endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    fn new(success: bool, message: &str) -> Self {
        Self {
            success,
            message: message.to_string(),
        }
    }
}

/// Registration request; every field is required
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Login request; every field is required
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: u64,
}

/// Attack report response
#[derive(Serialize)]
struct AttackReport {
    events: Vec<AttackEvent>,
    summary: AttackSummary,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn missing_fields() -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::new(false, "All fields are required!"))
}

fn invalid_input() -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::new(false, "Invalid input"))
}

fn client_of(state: &ApiState, req: &HttpRequest) -> ClientFingerprint {
    let stored = req.extensions().get::<ClientFingerprint>().cloned();
    stored.unwrap_or_else(|| ClientFingerprint::from_request(state.pipeline.fingerprint_config(), req))
}

fn log_unavailable(e: impl std::fmt::Display) -> HttpResponse {
    error!("Attack log read failed: {}", e);
    HttpResponse::ServiceUnavailable().json(ErrorResponse {
        error: "Attack log unavailable".to_string(),
    })
}

/// Registration endpoint
async fn register(
    state: web::Data<ApiState>,
    req: HttpRequest,
    body: web::Json<RegisterRequest>,
) -> impl Responder {
    let (Some(username), Some(email), Some(password)) =
        (required(&body.username), required(&body.email), required(&body.password))
    else {
        return missing_fields();
    };

    let client = client_of(&state, &req);
    let url = req.uri().to_string();
    match state.pipeline.register(&client, &url, username, email, password).await {
        RegisterOutcome::Created => HttpResponse::Ok().json(ApiResponse::new(true, "Registration successful!")),
        RegisterOutcome::AlreadyExists => HttpResponse::Ok().json(ApiResponse::new(false, "User already exists!")),
        RegisterOutcome::Rejected => invalid_input(),
    }
}

/// Login endpoint
async fn login(state: web::Data<ApiState>, req: HttpRequest, body: web::Json<LoginRequest>) -> impl Responder {
    let (Some(email), Some(password)) = (required(&body.email), required(&body.password)) else {
        return missing_fields();
    };

    let client = client_of(&state, &req);
    let url = req.uri().to_string();
    match state.pipeline.login(&client, &url, email, password).await {
        LoginOutcome::Success { .. } => HttpResponse::Ok().json(ApiResponse::new(true, "Login successful!")),
        LoginOutcome::Failed => HttpResponse::Ok().json(ApiResponse::new(false, "Invalid email or password!")),
        LoginOutcome::Rejected => invalid_input(),
    }
}

/// Full event history plus aggregate counts
async fn list_attacks(state: web::Data<ApiState>, filter: web::Query<EventFilter>) -> impl Responder {
    let log = state.pipeline.attack_log();
    let events = match log.query(&filter).await {
        Ok(events) => events,
        Err(e) => return log_unavailable(e),
    };
    match log.aggregate().await {
        Ok(summary) => HttpResponse::Ok().json(AttackReport { events, summary }),
        Err(e) => log_unavailable(e),
    }
}

/// Aggregate counts only
async fn attack_summary(state: web::Data<ApiState>) -> impl Responder {
    match state.pipeline.attack_log().aggregate().await {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(e) => log_unavailable(e),
    }
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: get_current_timestamp(),
    })
}

/// Prometheus exposition
async fn metrics(state: web::Data<ApiState>) -> impl Responder {
    match &state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accounts::{AccountDirectory, Authenticator, MockAuthenticator};
    use crate::core::attack_log::{AttackLog, AttackType, MemoryEventStore};
    use crate::core::honeypot::CANARY_RESPONSE_BODY;
    use crate::models::Config;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::time::Duration;

    const PEER: &str = "198.51.100.77:40000";

    fn pipeline(authenticator: Arc<dyn Authenticator>) -> Arc<SecurityPipeline> {
        let log = AttackLog::new(Arc::new(MemoryEventStore::new()), Duration::from_secs(1));
        Arc::new(SecurityPipeline::from_config(&Config::default(), log, authenticator).unwrap())
    }

    macro_rules! app {
        ($pipeline:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(ApiState {
                        pipeline: $pipeline.clone(),
                        metrics: None,
                    }))
                    .wrap(SecurityGuard::new($pipeline.clone()))
                    .configure(config),
            )
            .await
        };
    }

    async fn count(pipeline: &SecurityPipeline, attack_type: AttackType) -> usize {
        pipeline.flush().await;
        let filter = EventFilter {
            attack_type: Some(attack_type),
            ..Default::default()
        };
        pipeline.attack_log().query(&filter).await.unwrap().len()
    }

    #[actix_web::test]
    async fn test_health_check() {
        let pipeline = pipeline(Arc::new(AccountDirectory::new()));
        let app = app!(pipeline);

        let req = test::TestRequest::get().uri("/api/v1/health").peer_addr(PEER.parse().unwrap()).to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_register_then_login() {
        let pipeline = pipeline(Arc::new(AccountDirectory::new()));
        let app = app!(pipeline);

        let req = test::TestRequest::post()
            .uri("/register")
            .peer_addr(PEER.parse().unwrap())
            .set_json(json!({"username": "alice", "email": "alice@example.com", "password": "s3cret"}))
            .to_request();
        let body: ApiResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.success);

        let req = test::TestRequest::post()
            .uri("/login")
            .peer_addr(PEER.parse().unwrap())
            .set_json(json!({"email": "alice@example.com", "password": "s3cret"}))
            .to_request();
        let body: ApiResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.success);
        assert_eq!(body.message, "Login successful!");
    }

    #[actix_web::test]
    async fn test_injection_register_rejected_before_account_lookup() {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_register().times(0);
        authenticator.expect_authenticate().times(0);
        let pipeline = pipeline(Arc::new(authenticator));
        let app = app!(pipeline);

        let req = test::TestRequest::post()
            .uri("/register")
            .peer_addr(PEER.parse().unwrap())
            .set_json(json!({
                "username": "'; DROP TABLE users; --",
                "email": "mallory@example.com",
                "password": "pw"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pipeline.flush().await;
        let events = pipeline.attack_log().query(&EventFilter::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].attack_type, AttackType::InjectionAttempt);
        assert_eq!(events[0].identity.as_str(), "198.51.100.77");
        assert_eq!(events[0].url, "/register");
        assert!(events[0].payload.contains("'; DROP TABLE users; --"));
    }

    #[actix_web::test]
    async fn test_missing_fields_rejected_before_detection() {
        let mut authenticator = MockAuthenticator::new();
        authenticator.expect_authenticate().times(0);
        let pipeline = pipeline(Arc::new(authenticator));
        let app = app!(pipeline);

        let req = test::TestRequest::post()
            .uri("/login")
            .peer_addr(PEER.parse().unwrap())
            .set_json(json!({"email": "'; DROP TABLE users; --", "password": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiResponse = test::read_body_json(resp).await;
        assert_eq!(body.message, "All fields are required!");
        assert_eq!(count(&pipeline, AttackType::InjectionAttempt).await, 0);
    }

    #[actix_web::test]
    async fn test_canary_identical_for_any_method() {
        let pipeline = pipeline(Arc::new(AccountDirectory::new()));
        let app = app!(pipeline);

        let get = test::TestRequest::get()
            .uri("/wp-login.php")
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let post = test::TestRequest::post()
            .uri("/wp-login.php?redirect=1")
            .peer_addr(PEER.parse().unwrap())
            .set_payload("log=admin&pwd=admin")
            .to_request();

        let get_resp = test::call_service(&app, get).await;
        assert_eq!(get_resp.status(), StatusCode::NOT_FOUND);
        let get_body = test::read_body(get_resp).await;

        let post_resp = test::call_service(&app, post).await;
        assert_eq!(post_resp.status(), StatusCode::NOT_FOUND);
        let post_body = test::read_body(post_resp).await;

        assert_eq!(get_body, post_body);
        assert_eq!(get_body, CANARY_RESPONSE_BODY.as_bytes());

        pipeline.flush().await;
        let events = pipeline.attack_log().query(&EventFilter::default()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.attack_type == AttackType::HoneypotHit));
        assert!(events.iter().all(|e| e.payload == "/wp-login.php"));
    }

    #[actix_web::test]
    async fn test_eleventh_request_gets_429() {
        let pipeline = pipeline(Arc::new(AccountDirectory::new()));
        let app = app!(pipeline);

        for i in 0..11 {
            let req = test::TestRequest::get().uri("/api/v1/health").peer_addr(PEER.parse().unwrap()).to_request();
            let resp = test::call_service(&app, req).await;
            if i < 10 {
                assert_eq!(resp.status(), StatusCode::OK, "request {}", i + 1);
            } else {
                assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
            }
        }
        assert_eq!(count(&pipeline, AttackType::RateAbuse).await, 1);
    }

    #[actix_web::test]
    async fn test_fingerprint_from_guard_reaches_handlers() {
        let pipeline = pipeline(Arc::new(AccountDirectory::new()));
        let app = app!(pipeline);

        let req = test::TestRequest::post()
            .uri("/login")
            .peer_addr(PEER.parse().unwrap())
            .insert_header(("User-Agent", "curl/8.4.0"))
            .set_json(json!({"email": "x@example.com", "password": "<script>alert(1)</script>"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        pipeline.flush().await;
        let events = pipeline.attack_log().query(&EventFilter::default()).await.unwrap();
        assert_eq!(events.len(), 1);
        let metadata = events[0].client_metadata.as_ref().unwrap();
        assert_eq!(metadata.ip, "198.51.100.77");
        assert_eq!(metadata.user_agent.as_deref(), Some("curl/8.4.0"));
    }

    #[actix_web::test]
    async fn test_brute_force_reported_in_attack_listing() {
        let pipeline = pipeline(Arc::new(AccountDirectory::new()));
        let app = app!(pipeline);

        for _ in 0..4 {
            let req = test::TestRequest::post()
                .uri("/login")
                .peer_addr(PEER.parse().unwrap())
                .set_json(json!({"email": "admin@example.com", "password": "letmein"}))
                .to_request();
            let body: ApiResponse = test::call_and_read_body_json(&app, req).await;
            assert!(!body.success);
        }
        pipeline.flush().await;

        let req = test::TestRequest::get()
            .uri("/api/v1/attacks?type=BruteForce")
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["events"].as_array().unwrap().len(), 1);
        assert_eq!(report["events"][0]["type"], "BruteForce");
        assert_eq!(report["summary"]["total"], 1);
        assert_eq!(report["summary"]["by_type"]["BruteForce"], 1);
        assert_eq!(report["summary"]["by_type"]["HoneypotHit"], 0);
    }
}
