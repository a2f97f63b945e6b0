//! HTTP transport tests against a mock vendor gateway
//!
//! The gateway is an axum router served by `TestServer`; the client talks
//! to it over real HTTP.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use vlink_client::http::wire::{
    codes, CommandRequest, ErrorBody, LoginRequest, SendCodeRequest, SessionRequest, TokenResponse,
    TripList, VehicleList, VerifyCodeRequest, VerifyCodeResponse,
};
use vlink_client::http::REMEMBER_TOKEN_HEADER;
use vlink_client::testing::{sample_status, TestServer};
use vlink_client::{ClientConfig, ErrorCategory, MemoryStore, SessionStatus, VehicleClient};
use vlink_core::{
    AccountStore, Brand, ChallengeContext, Command, TripDetail, Vehicle, VehicleSummary, VerificationMethod,
};

const PASSWORD: &str = "correct-horse";
const PIN: &str = "1234";
const REMEMBER: &str = "device-ok";
const KIA_VIN: &str = "KNDTEST0000000001";
const KIA_KEY: &str = "veh-7f3a";

// =============================================================================
// Mock Vendor Gateway
// =============================================================================

#[derive(Default)]
struct Vendor {
    require_verification: bool,
    logins: AtomicUsize,
    status_reads: AtomicUsize,
    commands: AtomicUsize,
    locked: AtomicBool,
    valid_tokens: Mutex<HashSet<String>>,
}

type Shared = Arc<Vendor>;

fn error(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

impl Vendor {
    fn issue_token(&self, prefix: &str) -> TokenResponse {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token = format!("{}-{}", prefix, n);
        self.valid_tokens.lock().insert(access_token.clone());
        TokenResponse {
            access_token,
            refresh_token: None,
            expires_in: 3600,
        }
    }

    fn revoke_all(&self) {
        self.valid_tokens.lock().clear();
    }

    fn check_bearer(&self, headers: &HeaderMap) -> Result<(), Response> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) if self.valid_tokens.lock().contains(token) => Ok(()),
            _ => Err(error(StatusCode::UNAUTHORIZED, ErrorBody::new(codes::INVALID_SESSION))),
        }
    }
}

async fn login(State(vendor): State<Shared>, headers: HeaderMap, Json(req): Json<LoginRequest>) -> Response {
    if req.password != PASSWORD {
        return error(StatusCode::UNAUTHORIZED, ErrorBody::new(codes::INVALID_CREDENTIALS));
    }
    let remembered = headers
        .get(REMEMBER_TOKEN_HEADER)
        .is_some_and(|v| v.as_bytes() == REMEMBER.as_bytes());
    if vendor.require_verification && !remembered {
        let body = ErrorBody {
            challenge: Some(ChallengeContext::new(
                "tx-1",
                vec![VerificationMethod::Sms, VerificationMethod::Email],
            )),
            ..ErrorBody::new(codes::VERIFICATION_REQUIRED)
        };
        return error(StatusCode::PRECONDITION_REQUIRED, body);
    }
    Json(vendor.issue_token("access")).into_response()
}

async fn send_code(Json(req): Json<SendCodeRequest>) -> StatusCode {
    if req.session_id == "tx-1" {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn verify_code(Json(req): Json<VerifyCodeRequest>) -> Response {
    if req.code != "123456" {
        return error(
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("invalid_code").with_message("code mismatch"),
        );
    }
    Json(VerifyCodeResponse {
        remember_token: REMEMBER.to_string(),
        session_id: format!("{}-verified", req.session_id),
    })
    .into_response()
}

async fn session(State(vendor): State<Shared>, Json(req): Json<SessionRequest>) -> Response {
    if req.remember_token != REMEMBER {
        return error(StatusCode::UNAUTHORIZED, ErrorBody::new(codes::INVALID_SESSION));
    }
    Json(vendor.issue_token("verified")).into_response()
}

async fn vehicles(State(vendor): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(response) = vendor.check_bearer(&headers) {
        return response;
    }
    Json(VehicleList {
        vehicles: vec![VehicleSummary::new(KIA_VIN).with_key(KIA_KEY)],
    })
    .into_response()
}

async fn status(State(vendor): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if let Err(response) = vendor.check_bearer(&headers) {
        return response;
    }
    if id != KIA_KEY {
        return error(StatusCode::NOT_FOUND, ErrorBody::new("unknown_vehicle"));
    }
    vendor.status_reads.fetch_add(1, Ordering::SeqCst);
    Json(sample_status(vendor.locked.load(Ordering::SeqCst))).into_response()
}

async fn command(
    State(vendor): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Response {
    if let Err(response) = vendor.check_bearer(&headers) {
        return response;
    }
    if id != KIA_KEY {
        return error(StatusCode::NOT_FOUND, ErrorBody::new("unknown_vehicle"));
    }
    if req.pin.as_deref() != Some(PIN) {
        return error(StatusCode::FORBIDDEN, ErrorBody::new(codes::INVALID_PIN));
    }
    vendor.commands.fetch_add(1, Ordering::SeqCst);
    match req.command {
        Command::Lock => vendor.locked.store(true, Ordering::SeqCst),
        Command::Unlock => vendor.locked.store(false, Ordering::SeqCst),
        _ => {}
    }
    StatusCode::ACCEPTED.into_response()
}

async fn trips(State(vendor): State<Shared>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if let Err(response) = vendor.check_bearer(&headers) {
        return response;
    }
    if id != KIA_KEY {
        return StatusCode::NO_CONTENT.into_response();
    }
    let ended_at = chrono::Utc::now();
    Json(TripList {
        trips: vec![TripDetail {
            started_at: ended_at - chrono::Duration::minutes(42),
            ended_at,
            distance_km: 37.2,
            average_speed_kmh: Some(53.1),
            max_speed_kmh: Some(104.0),
        }],
    })
    .into_response()
}

fn vendor_router(vendor: Shared) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/verification/send", post(send_code))
        .route("/api/v1/auth/verification/verify", post(verify_code))
        .route("/api/v1/auth/session", post(session))
        .route("/api/v1/vehicles", get(vehicles))
        .route("/api/v1/vehicles/{id}/status", get(status))
        .route("/api/v1/vehicles/{id}/commands", post(command))
        .route("/api/v1/vehicles/{id}/trips", get(trips))
        .with_state(vendor)
}

async fn start(vendor: Vendor) -> (TestServer, Shared) {
    let vendor = Arc::new(vendor);
    let server = TestServer::start(vendor_router(vendor.clone())).await.unwrap();
    (server, vendor)
}

fn client_config(server: &TestServer, password: &str) -> ClientConfig {
    let mut config = server.config("driver@example.com", password, Brand::Kia);
    config.account.pin = Some(PIN.to_string());
    config
}

fn kia() -> Vehicle {
    Vehicle::new(KIA_VIN, Brand::Kia)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_lock_and_wait_over_http() {
    let (server, vendor) = start(Vendor::default()).await;
    let mut config = client_config(&server, PASSWORD);
    config.wait.initial_delay_secs = 0;
    let client = VehicleClient::with_http(&config, Arc::new(MemoryStore::new()));

    let status = client
        .send_command_and_wait(&kia(), &Command::Lock, None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(status.locked);
    assert_eq!(vendor.commands.load(Ordering::SeqCst), 1);
    assert_eq!(vendor.status_reads.load(Ordering::SeqCst), 1);
    assert_eq!(vendor.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_revoked_session_recovers() {
    let (server, vendor) = start(Vendor::default()).await;
    let store = Arc::new(MemoryStore::new());
    let client = VehicleClient::with_http(&client_config(&server, PASSWORD), store.clone());

    client.fetch_vehicle_status(&kia()).await.unwrap();
    vendor.revoke_all();
    client.cache().clear_cache();

    client.fetch_vehicle_status(&kia()).await.unwrap();
    assert_eq!(vendor.logins.load(Ordering::SeqCst), 2);
    assert!(store.token().unwrap().contains("access-2"));
}

#[tokio::test]
async fn test_error_mapping() {
    let (server, _vendor) = start(Vendor::default()).await;

    let client = VehicleClient::with_http(&client_config(&server, "wrong"), Arc::new(MemoryStore::new()));
    let err = client.initialize().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::SessionInvalid);

    let mut config = client_config(&server, PASSWORD);
    config.account.pin = Some("0000".to_string());
    let client = VehicleClient::with_http(&config, Arc::new(MemoryStore::new()));
    let err = client.send_command(&kia(), &Command::Unlock).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidInput);
}

#[tokio::test]
async fn test_verification_over_http() {
    let (server, vendor) = start(Vendor {
        require_verification: true,
        ..Default::default()
    })
    .await;
    let store = Arc::new(MemoryStore::new());
    let config = client_config(&server, PASSWORD);
    let client = VehicleClient::with_http(&config, store.clone());

    let err = client.fetch_vehicles().await.unwrap_err();
    assert!(err.is_challenge());
    let challenge = client.pending_challenge().unwrap();
    assert_eq!(challenge.session_id, "tx-1");

    client
        .send_verification_code(VerificationMethod::Sms)
        .await
        .unwrap();
    assert!(client.verify_code("999999").await.is_err());
    assert_eq!(client.session_status(), SessionStatus::ChallengePending);

    client.verify_code("123456").await.unwrap();
    assert_eq!(store.remember_token().as_deref(), Some(REMEMBER));

    let vehicles = client.fetch_vehicles().await.unwrap();
    assert_eq!(vehicles[0].key.as_deref(), Some(KIA_KEY));

    // a later process logs in with the remember-token and skips verification
    let store = Arc::new(MemoryStore::new());
    store.save_remember_token(REMEMBER).await.unwrap();
    let client = VehicleClient::with_http(&config, store);
    client.initialize().await.unwrap();
    assert_eq!(vendor.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_trip_details_over_http() {
    let (server, _vendor) = start(Vendor::default()).await;
    let client = VehicleClient::with_http(&client_config(&server, PASSWORD), Arc::new(MemoryStore::new()));

    let trips = client.fetch_trip_details(&kia()).await.unwrap().unwrap();
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].duration_secs(), 42 * 60);
}
