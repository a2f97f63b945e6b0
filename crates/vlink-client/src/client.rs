//! Per-account facade over the session, cache, and waiter

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use vlink_core::{
    AccountStore, ChallengeContext, Command, TransportFactory, TripDetail, Vehicle, VehicleStatus,
    VerificationMethod,
};

use crate::cache::{CacheStats, OperationCache};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::HttpTransportFactory;
use crate::session::{SessionOrchestrator, SessionStatus};
use crate::waiter::{ProgressFn, StatusWaiter, WaitSchedule};

/// Client for one vendor account.
///
/// Construct once per account and share it; every operation may be called
/// concurrently.
pub struct VehicleClient {
    session: SessionOrchestrator,
    waiter: StatusWaiter,
    store: Arc<dyn AccountStore>,
    schedule: WaitSchedule,
}

impl VehicleClient {
    /// Create a client from explicit collaborators.
    ///
    /// Starts the cache sweeper when one is configured and a Tokio runtime
    /// is available.
    pub fn new(config: &ClientConfig, factory: Arc<dyn TransportFactory>, store: Arc<dyn AccountStore>) -> Self {
        let cache = OperationCache::with_ttl(config.cache_ttl());
        if let Some(interval) = config.sweep_interval() {
            if tokio::runtime::Handle::try_current().is_ok() {
                cache.start_sweeper(interval);
            } else {
                warn!("No Tokio runtime, cache sweeper not started");
            }
        }

        Self {
            session: SessionOrchestrator::new(config.account.brand, factory, store.clone(), cache),
            waiter: StatusWaiter::new(),
            store,
            schedule: config.wait_schedule(),
        }
    }

    /// Create a client talking to the gateway in `config` over HTTP
    pub fn with_http(config: &ClientConfig, store: Arc<dyn AccountStore>) -> Self {
        let factory = Arc::new(HttpTransportFactory::new(config.clone()));
        Self::new(config, factory, store)
    }

    /// Default schedule used by [`Self::send_command_and_wait`]
    pub fn wait_schedule(&self) -> WaitSchedule {
        self.schedule
    }

    pub fn cache(&self) -> &OperationCache {
        self.session.cache()
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn initialize(&self) -> Result<()> {
        self.session.initialize().await
    }

    pub fn session_status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn pending_challenge(&self) -> Option<ChallengeContext> {
        self.session.pending_challenge()
    }

    pub async fn send_verification_code(&self, method: VerificationMethod) -> Result<()> {
        self.session.send_verification_code(method).await
    }

    pub async fn verify_code(&self, code: &str) -> Result<()> {
        self.session.verify_code(code).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.session.sign_out().await
    }

    // =========================================================================
    // Vehicle Operations
    // =========================================================================

    pub async fn fetch_vehicles(&self) -> Result<Vec<Vehicle>> {
        self.session.fetch_vehicles().await
    }

    /// Fetch status and record it. A wait sleeping on this vehicle is woken
    /// so it can evaluate the new status right away.
    #[instrument(skip(self, vehicle), fields(vin = %vehicle.vin))]
    pub async fn fetch_vehicle_status(&self, vehicle: &Vehicle) -> Result<VehicleStatus> {
        let status = self.refresh_status(vehicle).await?;
        if self.waiter.wake(&vehicle.vin) {
            debug!("Status refresh woke a pending wait");
        }
        Ok(status)
    }

    pub async fn send_command(&self, vehicle: &Vehicle, command: &Command) -> Result<()> {
        self.session.send_command(vehicle, command).await
    }

    pub async fn fetch_trip_details(&self, vehicle: &Vehicle) -> Result<Option<Vec<TripDetail>>> {
        self.session.fetch_trip_details(vehicle).await
    }

    async fn refresh_status(&self, vehicle: &Vehicle) -> Result<VehicleStatus> {
        let status = self.session.fetch_vehicle_status(vehicle).await?;
        self.store.save_status(&vehicle.vin, &status).await?;
        Ok(status)
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Poll the vehicle's status until `predicate` holds.
    ///
    /// See [`StatusWaiter::wait_for`] for the outcomes. Any wait already
    /// running for this vehicle is superseded.
    #[instrument(skip(self, vehicle, predicate, progress, cancel), fields(vin = %vehicle.vin))]
    pub async fn wait_for_status_change<P>(
        &self,
        vehicle: &Vehicle,
        schedule: &WaitSchedule,
        predicate: P,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<VehicleStatus>
    where
        P: Fn(&VehicleStatus) -> bool,
    {
        self.waiter
            .wait_for(
                &vehicle.vin,
                schedule,
                || self.refresh_status(vehicle),
                predicate,
                progress,
                cancel,
            )
            .await
    }

    /// Send `command`, then wait on the default schedule until the vehicle
    /// reports its effect.
    ///
    /// A [`crate::ClientError::ConvergenceTimeout`] here means the command was
    /// accepted but its effect was not observed.
    pub async fn send_command_and_wait(
        &self,
        vehicle: &Vehicle,
        command: &Command,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<VehicleStatus> {
        self.send_command(vehicle, command).await?;
        self.wait_for_status_change(
            vehicle,
            &self.schedule,
            |status| command.is_reflected_in(status),
            progress,
            cancel,
        )
        .await
    }

    /// Resume a sleeping wait for `vin`; returns whether one existed
    pub fn wake(&self, vin: &str) -> bool {
        self.waiter.wake(vin)
    }

    /// Abandon the wait for `vin`; returns whether one was sleeping
    pub fn clear_pending_waiters(&self, vin: &str) -> bool {
        self.waiter.clear_pending_waiters(vin)
    }

    pub fn has_pending_waiter(&self, vin: &str) -> bool {
        self.waiter.has_pending_waiter(vin)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn cache_stats(&self) -> CacheStats {
        self.session.cache_stats()
    }

    /// Drop expired cache entries now, returning how many were dropped
    pub fn clear_expired(&self) -> usize {
        self.session.cache().clear_expired()
    }
}
