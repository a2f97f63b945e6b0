//! Test utilities for vlink-client
//!
//! Provides a scriptable in-process transport and a helper for running an
//! axum router as a stand-in vendor gateway.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use vlink_core::{
    AuthToken, Brand, ChallengeContext, ChargeState, Command, TransportError, TransportFactory,
    TransportResult, TripDetail, Vehicle, VehicleStatus, VehicleSummary, VehicleTransport,
    VerificationMethod, VerifiedSession,
};

use crate::config::ClientConfig;

/// A status snapshot with the given lock state
pub fn sample_status(locked: bool) -> VehicleStatus {
    let mut status = VehicleStatus::new(locked);
    status.charge = Some(ChargeState {
        plugged_in: false,
        charging: false,
        battery_percent: Some(72),
        ac_limit_percent: Some(80),
        dc_limit_percent: Some(80),
    });
    status.range_km = Some(310.0);
    status
}

/// A token valid for one hour
pub fn sample_token(access_token: &str) -> AuthToken {
    AuthToken::expiring_in(access_token, chrono::Duration::hours(1))
}

/// A pending challenge offering SMS and email
pub fn sample_challenge() -> ChallengeContext {
    ChallengeContext::new("challenge-1", vec![VerificationMethod::Sms, VerificationMethod::Email])
}

#[derive(Default)]
struct Counters {
    login: AtomicUsize,
    vehicles: AtomicUsize,
    status: AtomicUsize,
    command: AtomicUsize,
    trips: AtomicUsize,
    request_code: AtomicUsize,
    exchange_code: AtomicUsize,
    complete_login: AtomicUsize,
}

#[derive(Default)]
struct Script {
    login: VecDeque<TransportResult<AuthToken>>,
    vehicles: VecDeque<TransportResult<Vec<VehicleSummary>>>,
    status: VecDeque<TransportResult<VehicleStatus>>,
    command: VecDeque<TransportResult<()>>,
    request_code: VecDeque<TransportResult<()>>,
    exchange_code: VecDeque<TransportResult<VerifiedSession>>,
    complete_login: VecDeque<TransportResult<AuthToken>>,
}

/// Command whose effect shows up in status after a number of reads
struct PendingEffect {
    command: Command,
    reads_remaining: usize,
}

/// Scriptable in-memory transport.
///
/// Each operation pops a queued response if one was pushed, otherwise it
/// succeeds with a default: a fresh token, the configured vehicle list, or
/// the current simulated status.
pub struct MockTransport {
    counters: Counters,
    script: Mutex<Script>,
    latency: Mutex<Duration>,
    vehicles: Mutex<Vec<VehicleSummary>>,
    status: Mutex<VehicleStatus>,
    effect_delay: Mutex<usize>,
    pending_effect: Mutex<Option<PendingEffect>>,
    tokens_seen: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            counters: Counters::default(),
            script: Mutex::new(Script::default()),
            latency: Mutex::new(Duration::ZERO),
            vehicles: Mutex::new(Vec::new()),
            status: Mutex::new(sample_status(true)),
            effect_delay: Mutex::new(0),
            pending_effect: Mutex::new(None),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    /// Simulated network latency applied to every call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Vehicles returned by `fetch_vehicles` when nothing is queued
    pub fn set_vehicles(&self, vehicles: Vec<VehicleSummary>) {
        *self.vehicles.lock() = vehicles;
    }

    /// Status returned by `fetch_vehicle_status` when nothing is queued
    pub fn set_status(&self, status: VehicleStatus) {
        *self.status.lock() = status;
    }

    /// Successful commands change the simulated status after this many
    /// further status reads (0 = on the next read)
    pub fn set_command_effect_delay(&self, reads: usize) {
        *self.effect_delay.lock() = reads;
    }

    pub fn push_login(&self, result: TransportResult<AuthToken>) {
        self.script.lock().login.push_back(result);
    }

    pub fn push_vehicles(&self, result: TransportResult<Vec<VehicleSummary>>) {
        self.script.lock().vehicles.push_back(result);
    }

    pub fn push_status(&self, result: TransportResult<VehicleStatus>) {
        self.script.lock().status.push_back(result);
    }

    pub fn push_command(&self, result: TransportResult<()>) {
        self.script.lock().command.push_back(result);
    }

    pub fn push_request_code(&self, result: TransportResult<()>) {
        self.script.lock().request_code.push_back(result);
    }

    pub fn push_exchange_code(&self, result: TransportResult<VerifiedSession>) {
        self.script.lock().exchange_code.push_back(result);
    }

    pub fn push_complete_login(&self, result: TransportResult<AuthToken>) {
        self.script.lock().complete_login.push_back(result);
    }

    pub fn login_calls(&self) -> usize {
        self.counters.login.load(Ordering::SeqCst)
    }

    pub fn vehicle_calls(&self) -> usize {
        self.counters.vehicles.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.counters.status.load(Ordering::SeqCst)
    }

    pub fn command_calls(&self) -> usize {
        self.counters.command.load(Ordering::SeqCst)
    }

    pub fn trip_calls(&self) -> usize {
        self.counters.trips.load(Ordering::SeqCst)
    }

    pub fn request_code_calls(&self) -> usize {
        self.counters.request_code.load(Ordering::SeqCst)
    }

    pub fn exchange_code_calls(&self) -> usize {
        self.counters.exchange_code.load(Ordering::SeqCst)
    }

    pub fn complete_login_calls(&self) -> usize {
        self.counters.complete_login.load(Ordering::SeqCst)
    }

    /// Access tokens presented on authenticated calls, in order
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().clone()
    }

    /// Total transport calls of any kind
    pub fn total_calls(&self) -> usize {
        self.login_calls()
            + self.vehicle_calls()
            + self.status_calls()
            + self.command_calls()
            + self.trip_calls()
            + self.request_code_calls()
            + self.exchange_code_calls()
            + self.complete_login_calls()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn record_token(&self, token: &AuthToken) {
        self.tokens_seen.lock().push(token.access_token.clone());
    }

    fn next_token(&self, prefix: &str, n: usize) -> AuthToken {
        sample_token(&format!("{}-{}", prefix, n))
    }

    fn current_status(&self) -> VehicleStatus {
        let mut pending = self.pending_effect.lock();
        let apply = match pending.as_mut() {
            Some(effect) if effect.reads_remaining == 0 => true,
            Some(effect) => {
                effect.reads_remaining -= 1;
                false
            }
            None => false,
        };
        if apply {
            if let Some(effect) = pending.take() {
                apply_command(&mut self.status.lock(), &effect.command);
            }
        }
        self.status.lock().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_command(status: &mut VehicleStatus, command: &Command) {
    match command {
        Command::Lock => status.locked = true,
        Command::Unlock => status.locked = false,
        Command::StartClimate(options) => {
            status.climate.active = true;
            status.climate.target_temp_c = Some(options.target_temp_c);
        }
        Command::StopClimate => status.climate.active = false,
        Command::StartCharge | Command::StopCharge | Command::SetChargeLimits { .. } => {
            let charge = status.charge.get_or_insert_with(ChargeState::default);
            match command {
                Command::StartCharge => charge.charging = true,
                Command::StopCharge => charge.charging = false,
                Command::SetChargeLimits {
                    ac_percent,
                    dc_percent,
                } => {
                    charge.ac_limit_percent = Some(*ac_percent);
                    charge.dc_limit_percent = Some(*dc_percent);
                }
                _ => {}
            }
        }
    }
    status.updated_at = Utc::now();
}

#[async_trait]
impl VehicleTransport for MockTransport {
    async fn login(&self) -> TransportResult<AuthToken> {
        let n = self.counters.login.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency().await;
        let scripted = self.script.lock().login.pop_front();
        scripted.unwrap_or_else(|| Ok(self.next_token("token", n)))
    }

    async fn request_verification_code(
        &self,
        _challenge: &ChallengeContext,
        _method: VerificationMethod,
    ) -> TransportResult<()> {
        self.counters.request_code.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let scripted = self.script.lock().request_code.pop_front();
        scripted.unwrap_or(Ok(()))
    }

    async fn exchange_verification_code(
        &self,
        challenge: &ChallengeContext,
        code: &str,
    ) -> TransportResult<VerifiedSession> {
        self.counters.exchange_code.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let scripted = self.script.lock().exchange_code.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(VerifiedSession {
                remember_token: format!("remember-{}", code),
                session_id: format!("{}-verified", challenge.session_id),
            })
        })
    }

    async fn complete_login(&self, _verified: &VerifiedSession) -> TransportResult<AuthToken> {
        let n = self.counters.complete_login.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_latency().await;
        let scripted = self.script.lock().complete_login.pop_front();
        scripted.unwrap_or_else(|| Ok(self.next_token("verified", n)))
    }

    async fn fetch_vehicles(&self, token: &AuthToken) -> TransportResult<Vec<VehicleSummary>> {
        self.counters.vehicles.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.simulate_latency().await;
        let scripted = self.script.lock().vehicles.pop_front();
        scripted.unwrap_or_else(|| Ok(self.vehicles.lock().clone()))
    }

    async fn fetch_vehicle_status(
        &self,
        _vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<VehicleStatus> {
        self.counters.status.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.simulate_latency().await;
        let scripted = self.script.lock().status.pop_front();
        scripted.unwrap_or_else(|| Ok(self.current_status()))
    }

    async fn send_command(
        &self,
        _vehicle: &Vehicle,
        command: &Command,
        token: &AuthToken,
    ) -> TransportResult<()> {
        self.counters.command.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.simulate_latency().await;
        let scripted = self.script.lock().command.pop_front();
        let result = scripted.unwrap_or(Ok(()));
        if result.is_ok() {
            *self.pending_effect.lock() = Some(PendingEffect {
                command: command.clone(),
                reads_remaining: *self.effect_delay.lock(),
            });
        }
        result
    }

    async fn fetch_trip_details(
        &self,
        _vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<Option<Vec<TripDetail>>> {
        self.counters.trips.fetch_add(1, Ordering::SeqCst);
        self.record_token(token);
        self.simulate_latency().await;
        let now = Utc::now();
        Ok(Some(vec![TripDetail {
            started_at: now - chrono::Duration::minutes(30),
            ended_at: now,
            distance_km: 21.5,
            average_speed_kmh: Some(43.0),
            max_speed_kmh: Some(88.0),
        }]))
    }
}

/// Factory handing out one shared [`MockTransport`]
pub struct MockTransportFactory {
    transport: Arc<MockTransport>,
    created: AtomicUsize,
    remember_tokens: Mutex<Vec<Option<String>>>,
    fail_next: Mutex<Option<TransportError>>,
}

impl MockTransportFactory {
    pub fn new(transport: Arc<MockTransport>) -> Self {
        Self {
            transport,
            created: AtomicUsize::new(0),
            remember_tokens: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    /// Number of transports created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Remember-tokens passed to each `create` call, in order
    pub fn remember_tokens(&self) -> Vec<Option<String>> {
        self.remember_tokens.lock().clone()
    }

    /// Make the next `create` call fail
    pub fn fail_next(&self, error: TransportError) {
        *self.fail_next.lock() = Some(error);
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, remember_token: Option<&str>) -> TransportResult<Arc<dyn VehicleTransport>> {
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.remember_tokens
            .lock()
            .push(remember_token.map(String::from));
        Ok(self.transport.clone())
    }
}

/// A vehicle for tests
pub fn sample_vehicle(brand: Brand) -> Vehicle {
    Vehicle::new("KMHTEST0000000001", brand).with_nickname("Test Car")
}

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on an ephemeral local port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use vlink_client::testing::TestServer;
    ///
    /// let server = TestServer::start(mock_vendor_router()).await?;
    /// let config = server.config("user", "pass", Brand::Hyundai);
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> std::io::Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router: axum::Router = router.into();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this server, with short timeouts
    pub fn config(&self, username: &str, password: &str, brand: Brand) -> ClientConfig {
        ClientConfig::builder(self.base_url(), username, password, brand)
            .request_timeout_ms(5_000)
            .sweep_interval_ms(0)
            .build()
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_take_priority() {
        let mock = MockTransport::new();
        mock.push_login(Err(TransportError::InvalidCredentials));

        assert_eq!(mock.login().await, Err(TransportError::InvalidCredentials));
        let token = mock.login().await.unwrap();
        assert_eq!(token.access_token, "token-2");
        assert_eq!(mock.login_calls(), 2);
    }

    #[tokio::test]
    async fn test_command_effect_delay() {
        let mock = MockTransport::new();
        mock.set_status(sample_status(false));
        mock.set_command_effect_delay(1);
        let vehicle = sample_vehicle(Brand::Hyundai);
        let token = sample_token("t");

        mock.send_command(&vehicle, &Command::Lock, &token).await.unwrap();
        assert!(!mock.fetch_vehicle_status(&vehicle, &token).await.unwrap().locked);
        assert!(mock.fetch_vehicle_status(&vehicle, &token).await.unwrap().locked);
        assert_eq!(mock.tokens_seen(), vec!["t", "t", "t"]);
    }
}
