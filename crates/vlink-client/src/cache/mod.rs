//! Operation cache and request deduplicator
//!
//! Wraps the vendor transport so that:
//! - a fresh cached result is served without a network call (TTL, default 5s),
//! - concurrent identical requests share one underlying call and all observe
//!   its result or its error,
//! - a command invalidates the cached status of its vehicle before it is
//!   placed, so the next status read reflects the command's effect.
//!
//! Commands are deduplicated but never cached. Trip details pass straight
//! through. No retry happens here; see [`crate::session`].

mod keys;
mod slots;

pub use keys::OperationKey;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use vlink_core::{
    AuthToken, Command, TransportError, TransportResult, TripDetail, Vehicle, VehicleStatus,
    VehicleSummary, VehicleTransport,
};

use slots::{InFlight, ResultCache, SharedCall};

/// Default time-to-live of a cached result
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Snapshot of cache occupancy, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub in_flight: usize,
}

/// Marks the cache state a call started under. A result is only stored if
/// no clear (generation) or status invalidation (epoch) happened meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    generation: u64,
    epoch: u64,
}

struct CacheState {
    login: ResultCache<(), AuthToken>,
    vehicles: ResultCache<(), Vec<VehicleSummary>>,
    statuses: ResultCache<String, VehicleStatus>,

    login_calls: InFlight<(), AuthToken>,
    vehicle_calls: InFlight<(), Vec<VehicleSummary>>,
    status_calls: InFlight<String, VehicleStatus>,
    command_calls: InFlight<OperationKey, ()>,

    /// Bumped on every status invalidation of a vehicle
    status_epochs: HashMap<String, u64>,
    /// Bumped on every full clear
    generation: u64,
    next_call_id: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            login: ResultCache::new(),
            vehicles: ResultCache::new(),
            statuses: ResultCache::new(),
            login_calls: InFlight::new(),
            vehicle_calls: InFlight::new(),
            status_calls: InFlight::new(),
            command_calls: InFlight::new(),
            status_epochs: HashMap::new(),
            generation: 0,
            next_call_id: 0,
        }
    }

    fn allocate_call_id(&mut self) -> u64 {
        self.next_call_id += 1;
        self.next_call_id
    }

    fn stamp(&self, vin: Option<&str>) -> Stamp {
        Stamp {
            generation: self.generation,
            epoch: vin
                .and_then(|v| self.status_epochs.get(v).copied())
                .unwrap_or(0),
        }
    }

    /// Drop the cached status of `vin` and detach its in-flight fetch, so
    /// neither a pre-command snapshot nor a fetch started before the
    /// command can be served afterwards
    fn invalidate_status(&mut self, vin: &str) {
        let removed = self.statuses.remove(&vin.to_string());
        let detached = self.status_calls.detach(&vin.to_string());
        *self.status_epochs.entry(vin.to_string()).or_insert(0) += 1;
        if removed || detached {
            debug!(vin, removed, detached, "Invalidated cached status");
        }
    }
}

/// Selects the result cache and in-flight map of one cacheable operation
type Slot<K, V> = for<'a> fn(&'a mut CacheState) -> (&'a mut ResultCache<K, V>, &'a mut InFlight<K, V>);

fn login_slot(s: &mut CacheState) -> (&mut ResultCache<(), AuthToken>, &mut InFlight<(), AuthToken>) {
    (&mut s.login, &mut s.login_calls)
}

fn vehicles_slot(
    s: &mut CacheState,
) -> (
    &mut ResultCache<(), Vec<VehicleSummary>>,
    &mut InFlight<(), Vec<VehicleSummary>>,
) {
    (&mut s.vehicles, &mut s.vehicle_calls)
}

fn status_slot(
    s: &mut CacheState,
) -> (
    &mut ResultCache<String, VehicleStatus>,
    &mut InFlight<String, VehicleStatus>,
) {
    (&mut s.statuses, &mut s.status_calls)
}

struct CacheInner {
    ttl: Duration,
    state: Mutex<CacheState>,
}

/// Caching, deduplicating wrapper around a [`VehicleTransport`].
///
/// The transport and token are supplied per call because they belong to
/// the session orchestrator and are replaced on reinitialization.
pub struct OperationCache {
    inner: Arc<CacheInner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl OperationCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl,
                state: Mutex::new(CacheState::new()),
            }),
            sweeper: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    // =========================================================================
    // Cacheable Operations
    // =========================================================================

    /// Log in, serving a login performed within the TTL
    pub async fn login(&self, transport: &Arc<dyn VehicleTransport>) -> TransportResult<AuthToken> {
        let transport = transport.clone();
        self.run_cached(OperationKey::Login, (), None, login_slot, move || {
            async move { transport.login().await }.boxed()
        })
        .await
    }

    pub async fn fetch_vehicles(
        &self,
        transport: &Arc<dyn VehicleTransport>,
        token: &AuthToken,
    ) -> TransportResult<Vec<VehicleSummary>> {
        let transport = transport.clone();
        let token = token.clone();
        self.run_cached(OperationKey::FetchVehicles, (), None, vehicles_slot, move || {
            async move { transport.fetch_vehicles(&token).await }.boxed()
        })
        .await
    }

    pub async fn fetch_vehicle_status(
        &self,
        transport: &Arc<dyn VehicleTransport>,
        vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<VehicleStatus> {
        let op = OperationKey::FetchVehicleStatus {
            vin: vehicle.vin.clone(),
        };
        let transport = transport.clone();
        let vehicle = vehicle.clone();
        let token = token.clone();
        let vin = vehicle.vin.clone();
        self.run_cached(op, vin.clone(), Some(vin), status_slot, move || {
            async move { transport.fetch_vehicle_status(&vehicle, &token).await }.boxed()
        })
        .await
    }

    // =========================================================================
    // Commands and Passthrough
    // =========================================================================

    /// Send a command, sharing the call with any identical command already
    /// in flight for the same vehicle.
    ///
    /// The vehicle's cached status is invalidated before the call is placed
    /// and again once it completes.
    pub async fn send_command(
        &self,
        transport: &Arc<dyn VehicleTransport>,
        vehicle: &Vehicle,
        command: &Command,
        token: &AuthToken,
    ) -> TransportResult<()> {
        let vin = vehicle.vin.clone();
        let key = OperationKey::send_command(vin.clone(), command);

        let call = {
            let mut state = self.inner.state.lock();
            state.invalidate_status(&vin);

            if let Some(existing) = state.command_calls.get(&key) {
                debug!(op = %key, "Attaching to in-flight command");
                existing
            } else {
                let id = state.allocate_call_id();
                let weak = Arc::downgrade(&self.inner);
                let (transport, vehicle, command, token) =
                    (transport.clone(), vehicle.clone(), command.clone(), token.clone());
                let call_key = key.clone();
                let call = spawn_shared(
                    &key,
                    async move {
                        let result = transport.send_command(&vehicle, &command, &token).await;
                        if let Some(inner) = weak.upgrade() {
                            let mut state = inner.state.lock();
                            state.invalidate_status(&vehicle.vin);
                            state.command_calls.remove_if(&call_key, id);
                        }
                        result
                    }
                    .boxed(),
                );
                state.command_calls.insert(key.clone(), id, call.clone());
                debug!(op = %key, "Sending command");
                call
            }
        };

        call.await
    }

    /// Trip details are neither cached nor deduplicated
    pub async fn fetch_trip_details(
        &self,
        transport: &Arc<dyn VehicleTransport>,
        vehicle: &Vehicle,
        token: &AuthToken,
    ) -> TransportResult<Option<Vec<TripDetail>>> {
        transport.fetch_trip_details(vehicle, token).await
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop every cached result.
    ///
    /// In-flight reads are detached as well, so a caller arriving after the
    /// clear starts a fresh call instead of attaching to one made with a
    /// session that may have just been discarded. In-flight commands stay
    /// registered to avoid issuing a physical command twice.
    pub fn clear_cache(&self) {
        let mut state = self.inner.state.lock();
        state.login.clear();
        state.vehicles.clear();
        state.statuses.clear();
        state.login_calls.detach_all();
        state.vehicle_calls.detach_all();
        state.status_calls.detach_all();
        state.generation += 1;
        debug!("Operation cache cleared");
    }

    /// Invalidate the cached status of one vehicle
    pub fn invalidate_status(&self, vin: &str) {
        self.inner.state.lock().invalidate_status(vin);
    }

    /// Drop entries past the TTL, returning how many were dropped
    pub fn clear_expired(&self) -> usize {
        self.inner.clear_expired()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        let ttl = self.inner.ttl;
        let now = Instant::now();

        let (mut total, mut valid) = state.login.counts(ttl, now);
        for (t, v) in [state.vehicles.counts(ttl, now), state.statuses.counts(ttl, now)] {
            total += t;
            valid += v;
        }

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
            in_flight: state.login_calls.len()
                + state.vehicle_calls.len()
                + state.status_calls.len()
                + state.command_calls.len(),
        }
    }

    /// Start a background task that sweeps expired entries every `interval`.
    ///
    /// Replaces any sweeper already running.
    pub fn start_sweeper(&self, interval: Duration) {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(inner) => {
                        inner.clear_expired();
                    }
                    None => break,
                }
            }
        });

        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
        debug!(interval_ms = interval.as_millis() as u64, "Cache sweeper started");
    }

    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            debug!("Cache sweeper stopped");
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Serve from cache, attach to an in-flight call, or start a new one.
    ///
    /// The started call runs on its own task, stores its own result and
    /// deregisters itself, so the bookkeeping happens exactly once even if
    /// the caller that started it goes away.
    async fn run_cached<K, V, F>(
        &self,
        op: OperationKey,
        key: K,
        status_vin: Option<String>,
        slot: Slot<K, V>,
        start: F,
    ) -> TransportResult<V>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, TransportResult<V>>,
    {
        let call = {
            let mut state = self.inner.state.lock();
            let stamp = state.stamp(status_vin.as_deref());
            let id = state.allocate_call_id();
            let ttl = self.inner.ttl;
            let (cache, calls) = slot(&mut *state);

            if let Some(value) = cache.get_fresh(&key, ttl, Instant::now()) {
                debug!(op = %op, "Cache hit");
                return Ok(value);
            }

            if let Some(existing) = calls.get(&key) {
                debug!(op = %op, "Attaching to in-flight request");
                existing
            } else {
                debug!(op = %op, "Cache miss, calling transport");
                let weak = Arc::downgrade(&self.inner);
                let call_key = key.clone();
                let pending = start();
                let call = spawn_shared(
                    &op,
                    async move {
                        let result = pending.await;
                        if let Some(inner) = weak.upgrade() {
                            let mut state = inner.state.lock();
                            let current = state.stamp(status_vin.as_deref());
                            let (cache, calls) = slot(&mut *state);
                            if let Ok(value) = &result {
                                if current == stamp {
                                    cache.insert(call_key.clone(), value.clone(), Instant::now());
                                } else {
                                    debug!("Discarding result invalidated while in flight");
                                }
                            }
                            calls.remove_if(&call_key, id);
                        }
                        result
                    }
                    .boxed(),
                );
                calls.insert(key, id, call.clone());
                call
            }
        };

        call.await
    }
}

/// Run `call` on its own task and share its outcome.
///
/// The task keeps going when every awaiting caller is dropped, so an
/// abandoned call still completes and deregisters instead of lingering
/// half-done for a later caller to resume.
fn spawn_shared<V>(op: &OperationKey, call: BoxFuture<'static, TransportResult<V>>) -> SharedCall<V>
where
    V: Clone + Send + Sync + 'static,
{
    let op = op.to_string();
    tokio::spawn(call)
        .map(move |joined| {
            joined.unwrap_or_else(|e| {
                warn!(op = %op, error = %e, "In-flight call did not complete");
                Err(TransportError::Other(format!("{} did not complete: {}", op, e)))
            })
        })
        .boxed()
        .shared()
}

impl CacheInner {
    fn clear_expired(&self) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let swept = state.login.sweep(self.ttl, now)
            + state.vehicles.sweep(self.ttl, now)
            + state.statuses.sweep(self.ttl, now);
        trace!(swept, "Swept expired cache entries");
        swept
    }
}

impl Default for OperationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OperationCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
