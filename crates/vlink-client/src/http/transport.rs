//! HTTP/JSON vendor transport

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;
use vlink_core::{
    AuthToken, ChallengeContext, Command, TransportError, TransportFactory, TransportResult,
    TripDetail, Vehicle, VehicleStatus, VehicleSummary, VehicleTransport, VerificationMethod,
    VerifiedSession,
};

use super::wire::*;
use crate::config::{AccountConfig, ClientConfig};

/// Header carrying the device remember-token on login
pub const REMEMBER_TOKEN_HEADER: &str = "x-remember-token";

/// Header correlating a request with vendor-side logs
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Encode a vehicle id for use as a single path segment
fn encode_path_segment(id: &str) -> String {
    id.replace('%', "%25").replace('/', "%2F")
}

/// Transport for a JSON vendor gateway
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    account: AccountConfig,
}

impl HttpTransport {
    /// Create a transport for the account in `config`
    pub fn new(config: &ClientConfig, remember_token: Option<&str>) -> TransportResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.connection.api_key {
            let name = HeaderName::from_bytes(config.connection.api_key_header.as_bytes())
                .map_err(|e| TransportError::Other(format!("Invalid API key header: {}", e)))?;
            headers.insert(name, header_value(key)?);
        }
        if let Some(token) = remember_token {
            headers.insert(REMEMBER_TOKEN_HEADER, header_value(token)?);
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeouts.request_ms))
            .connect_timeout(Duration::from_millis(config.timeouts.connect_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Other(format!("HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.connection.base_url)
            .map_err(|e| TransportError::Other(format!("Invalid base URL: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            account: config.account.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> TransportResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::Other(format!("Invalid URL {}: {}", path, e)))
    }

    fn vehicle_url(&self, vehicle: &Vehicle, resource: &str) -> TransportResult<Url> {
        self.url(&format!(
            "/api/v1/vehicles/{}/{}",
            encode_path_segment(vehicle.api_id()),
            resource
        ))
    }

    fn authorized(&self, request: RequestBuilder, token: &AuthToken) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Bearer {}", token.access_token))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn send(&self, request: RequestBuilder) -> TransportResult<reqwest::Response> {
        request
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
            .send()
            .await
            .map_err(map_reqwest_error)
    }

    /// Handle response and parse JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> TransportResult<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| TransportError::ServerError(format!("Malformed response: {}", e)))
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    /// Handle a response whose body is irrelevant
    async fn handle_empty(&self, response: reqwest::Response) -> TransportResult<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.extract_error_from_status(response, status).await)
        }
    }

    async fn extract_error_from_status(&self, response: reqwest::Response, status: StatusCode) -> TransportError {
        // Try to parse error response body
        let body = response
            .json::<ErrorBody>()
            .await
            .unwrap_or_else(|_| ErrorBody::new(format!("HTTP {}", status)));
        debug!(status = status.as_u16(), error = %body.error, "Vendor request failed");
        classify_error(status, body)
    }
}

fn header_value(value: &str) -> TransportResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| TransportError::Other(format!("Invalid header value: {}", e)))
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        TransportError::ServerError(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Map a failed HTTP exchange onto a transport error kind
pub fn classify_error(status: StatusCode, body: ErrorBody) -> TransportError {
    let detail = body.describe();
    match (status, body.error.as_str()) {
        (StatusCode::PRECONDITION_REQUIRED, _) => match body.challenge.clone() {
            Some(challenge) => TransportError::ChallengeRequired(challenge),
            None => TransportError::Other(format!("Verification required without context: {}", detail)),
        },
        (StatusCode::UNAUTHORIZED, codes::INVALID_CREDENTIALS) => TransportError::InvalidCredentials,
        (StatusCode::UNAUTHORIZED, _) => TransportError::InvalidSessionOrKey,
        (StatusCode::FORBIDDEN, codes::INVALID_PIN) => TransportError::InvalidPin,
        (StatusCode::FORBIDDEN, _) | (StatusCode::NOT_FOUND, _) => TransportError::InvalidSessionOrKey,
        (StatusCode::CONFLICT, _) | (StatusCode::TOO_MANY_REQUESTS, _) => TransportError::ConcurrentRequestRejected,
        (s, _) if s.is_server_error() => TransportError::ServerError(detail),
        (s, _) => TransportError::Other(format!("HTTP {}: {}", s.as_u16(), detail)),
    }
}

#[async_trait]
impl VehicleTransport for HttpTransport {
    #[instrument(skip(self))]
    async fn login(&self) -> TransportResult<AuthToken> {
        let request = LoginRequest {
            username: self.account.username.clone(),
            password: self.account.password.clone(),
            brand: self.account.brand,
            region: self.account.region.clone(),
        };
        let response = self
            .send(self.client.post(self.url("/api/v1/auth/login")?).json(&request))
            .await?;
        self.handle_response::<TokenResponse>(response)
            .await
            .map(TokenResponse::into_token)
    }

    #[instrument(skip(self, challenge))]
    async fn request_verification_code(
        &self,
        challenge: &ChallengeContext,
        method: VerificationMethod,
    ) -> TransportResult<()> {
        let request = SendCodeRequest {
            session_id: challenge.session_id.clone(),
            method,
        };
        let url = self.url("/api/v1/auth/verification/send")?;
        let response = self.send(self.client.post(url).json(&request)).await?;
        self.handle_empty(response).await
    }

    #[instrument(skip(self, challenge, code))]
    async fn exchange_verification_code(
        &self,
        challenge: &ChallengeContext,
        code: &str,
    ) -> TransportResult<VerifiedSession> {
        let request = VerifyCodeRequest {
            session_id: challenge.session_id.clone(),
            code: code.to_string(),
        };
        let url = self.url("/api/v1/auth/verification/verify")?;
        let response = self.send(self.client.post(url).json(&request)).await?;
        let verified: VerifyCodeResponse = self.handle_response(response).await?;
        Ok(VerifiedSession {
            remember_token: verified.remember_token,
            session_id: verified.session_id,
        })
    }

    #[instrument(skip(self, verified))]
    async fn complete_login(&self, verified: &VerifiedSession) -> TransportResult<AuthToken> {
        let request = SessionRequest {
            session_id: verified.session_id.clone(),
            remember_token: verified.remember_token.clone(),
        };
        let url = self.url("/api/v1/auth/session")?;
        let response = self.send(self.client.post(url).json(&request)).await?;
        self.handle_response::<TokenResponse>(response)
            .await
            .map(TokenResponse::into_token)
    }

    #[instrument(skip(self, token))]
    async fn fetch_vehicles(&self, token: &AuthToken) -> TransportResult<Vec<VehicleSummary>> {
        let url = self.url("/api/v1/vehicles")?;
        debug!("Listing vehicles from {}", url);
        let response = self.send(self.authorized(self.client.get(url), token)).await?;
        self.handle_response::<VehicleList>(response)
            .await
            .map(|list| list.vehicles)
    }

    #[instrument(skip(self, vehicle, token), fields(vin = %vehicle.vin))]
    async fn fetch_vehicle_status(&self, vehicle: &Vehicle, token: &AuthToken) -> TransportResult<VehicleStatus> {
        let url = self.vehicle_url(vehicle, "status")?;
        let response = self.send(self.authorized(self.client.get(url), token)).await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self, vehicle, command, token), fields(vin = %vehicle.vin, command = %command.kind()))]
    async fn send_command(&self, vehicle: &Vehicle, command: &Command, token: &AuthToken) -> TransportResult<()> {
        let request = CommandRequest {
            pin: self.account.pin.clone(),
            command: command.clone(),
        };
        let url = self.vehicle_url(vehicle, "commands")?;
        let response = self
            .send(self.authorized(self.client.post(url), token).json(&request))
            .await?;
        self.handle_empty(response).await
    }

    #[instrument(skip(self, vehicle, token), fields(vin = %vehicle.vin))]
    async fn fetch_trip_details(
        &self,
        vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<Option<Vec<TripDetail>>> {
        let url = self.vehicle_url(vehicle, "trips")?;
        let response = self.send(self.authorized(self.client.get(url), token)).await?;
        // no trip log for this vehicle
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        self.handle_response::<TripList>(response)
            .await
            .map(|list| Some(list.trips))
    }
}

/// Builds an [`HttpTransport`] per session from one account configuration
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    config: ClientConfig,
}

impl HttpTransportFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(&self, remember_token: Option<&str>) -> TransportResult<Arc<dyn VehicleTransport>> {
        Ok(Arc::new(HttpTransport::new(&self.config, remember_token)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vlink_core::Brand;

    fn config(base_url: &str) -> ClientConfig {
        ClientConfig::builder(base_url, "u", "p", Brand::Kia).build()
    }

    #[test]
    fn test_transport_creation() {
        assert!(HttpTransport::new(&config("http://localhost:9080"), Some("device")).is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let err = HttpTransport::new(&config("not a url"), None).unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[test]
    fn test_vehicle_url_prefers_key() {
        let transport = HttpTransport::new(&config("http://localhost:9080"), None).unwrap();
        let vehicle = Vehicle::new("KNA1", Brand::Kia);
        assert_eq!(
            transport.vehicle_url(&vehicle, "status").unwrap().path(),
            "/api/v1/vehicles/KNA1/status"
        );
        let vehicle = vehicle.with_key("a/b");
        assert_eq!(
            transport.vehicle_url(&vehicle, "status").unwrap().path(),
            "/api/v1/vehicles/a%2Fb/status"
        );
    }

    #[test]
    fn test_error_classification() {
        let cases = [
            (StatusCode::UNAUTHORIZED, codes::INVALID_CREDENTIALS, TransportError::InvalidCredentials),
            (StatusCode::UNAUTHORIZED, codes::INVALID_SESSION, TransportError::InvalidSessionOrKey),
            (StatusCode::FORBIDDEN, codes::INVALID_PIN, TransportError::InvalidPin),
            (StatusCode::CONFLICT, codes::CONCURRENT_REQUEST, TransportError::ConcurrentRequestRejected),
            (StatusCode::BAD_GATEWAY, "upstream", TransportError::ServerError("upstream".into())),
        ];
        for (status, code, expected) in cases {
            assert_eq!(classify_error(status, ErrorBody::new(code)), expected);
        }

        let challenge = ChallengeContext::new("tx-1", vec![VerificationMethod::Email]);
        let body = ErrorBody {
            challenge: Some(challenge.clone()),
            ..ErrorBody::new(codes::VERIFICATION_REQUIRED)
        };
        assert_eq!(
            classify_error(StatusCode::PRECONDITION_REQUIRED, body),
            TransportError::ChallengeRequired(challenge)
        );
        assert!(matches!(
            classify_error(StatusCode::PRECONDITION_REQUIRED, ErrorBody::new("x")),
            TransportError::Other(_)
        ));
    }
}
