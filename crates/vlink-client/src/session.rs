//! Session orchestrator
//!
//! Owns the transport client and auth token of one account. Every
//! authenticated operation runs through a retry wrapper: a challenge is
//! surfaced as-is, a transient or input error propagates, and a
//! session-invalid error triggers one full reinitialization followed by
//! exactly one retry.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use vlink_core::{
    AccountStore, AuthToken, Brand, ChallengeContext, Command, TransportError, TransportFactory,
    TransportResult, TripDetail, Vehicle, VehicleStatus, VehicleSummary, VehicleTransport,
    VerificationMethod,
};

use crate::cache::{CacheStats, OperationCache};
use crate::error::{ClientError, Result};

/// Externally visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No transport client has been constructed
    NoClient,
    /// Login is blocked on an out-of-band verification
    ChallengePending,
    /// A client exists and no challenge is outstanding
    Ready,
}

enum Phase {
    NoClient,
    ChallengePending {
        transport: Arc<dyn VehicleTransport>,
        challenge: ChallengeContext,
    },
    Ready(Arc<dyn VehicleTransport>),
}

/// Token as held in memory. `Unloaded` until the store has been read once.
enum TokenSlot {
    Unloaded,
    Loaded(Option<AuthToken>),
}

struct SessionState {
    phase: Phase,
    token: TokenSlot,
    /// Bumped on every full reinitialization
    generation: u64,
}

/// Session lifecycle and retry policy for one account
pub struct SessionOrchestrator {
    brand: Brand,
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn AccountStore>,
    cache: OperationCache,
    state: parking_lot::Mutex<SessionState>,
    /// Held across every write of the persisted token, so a reset's clear
    /// and a login's save reach the store in the order they hit memory
    persist: tokio::sync::Mutex<()>,
}

impl SessionOrchestrator {
    pub fn new(
        brand: Brand,
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn AccountStore>,
        cache: OperationCache,
    ) -> Self {
        Self {
            brand,
            factory,
            store,
            cache,
            state: parking_lot::Mutex::new(SessionState {
                phase: Phase::NoClient,
                token: TokenSlot::Unloaded,
                generation: 0,
            }),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    pub fn brand(&self) -> Brand {
        self.brand
    }

    pub fn cache(&self) -> &OperationCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn status(&self) -> SessionStatus {
        match self.state.lock().phase {
            Phase::NoClient => SessionStatus::NoClient,
            Phase::ChallengePending { .. } => SessionStatus::ChallengePending,
            Phase::Ready(_) => SessionStatus::Ready,
        }
    }

    /// The outstanding verification challenge, if any
    pub fn pending_challenge(&self) -> Option<ChallengeContext> {
        match &self.state.lock().phase {
            Phase::ChallengePending { challenge, .. } => Some(challenge.clone()),
            _ => None,
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Make sure a client and a valid token exist.
    ///
    /// Fails immediately with the pending challenge, without any network
    /// call, while a verification is outstanding.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let transport = self.ensure_client().await?;

        if let Some(token) = self.current_token().await? {
            if token.is_valid() {
                debug!("Using stored token");
                return Ok(());
            }
            debug!(valid_until = %token.valid_until, "Stored token expired");
        }

        match self.cache.login(&transport).await {
            Ok(token) => {
                self.store_token(token).await?;
                let mut state = self.state.lock();
                if matches!(state.phase, Phase::ChallengePending { .. }) {
                    state.phase = Phase::Ready(transport);
                }
                info!("Logged in");
                Ok(())
            }
            Err(TransportError::ChallengeRequired(challenge)) => {
                info!(session = %challenge.session_id, "Login requires verification");
                self.state.lock().phase = Phase::ChallengePending {
                    transport,
                    challenge: challenge.clone(),
                };
                Err(TransportError::ChallengeRequired(challenge).into())
            }
            Err(e) => {
                debug!(error = %e, "Login failed");
                Err(e.into())
            }
        }
    }

    /// The current transport, constructing one if none exists
    async fn ensure_client(&self) -> Result<Arc<dyn VehicleTransport>> {
        if let Some(transport) = self.existing_client()? {
            return Ok(transport);
        }

        let remember_token = self.store.load_remember_token().await?;
        let created = self.factory.create(remember_token.as_deref())?;

        let mut state = self.state.lock();
        match &state.phase {
            Phase::NoClient => {}
            // another caller got there first
            Phase::Ready(transport) => return Ok(transport.clone()),
            Phase::ChallengePending { challenge, .. } => {
                return Err(TransportError::ChallengeRequired(challenge.clone()).into())
            }
        }
        debug!(remembered = remember_token.is_some(), "Constructed transport client");
        state.phase = Phase::Ready(created.clone());
        Ok(created)
    }

    fn existing_client(&self) -> Result<Option<Arc<dyn VehicleTransport>>> {
        match &self.state.lock().phase {
            Phase::NoClient => Ok(None),
            Phase::Ready(transport) => Ok(Some(transport.clone())),
            Phase::ChallengePending { challenge, .. } => {
                Err(TransportError::ChallengeRequired(challenge.clone()).into())
            }
        }
    }

    /// The in-memory token, loading it from the store on first access.
    /// A record that fails to decode counts as no token.
    async fn current_token(&self) -> Result<Option<AuthToken>> {
        if let TokenSlot::Loaded(token) = &self.state.lock().token {
            return Ok(token.clone());
        }

        let encoded = self.store.load_token().await?;
        let loaded = encoded.as_deref().and_then(AuthToken::decode);
        if encoded.is_some() && loaded.is_none() {
            warn!("Stored token is unreadable, ignoring it");
        }

        let mut state = self.state.lock();
        // a login or reinit may have landed while the store was being read
        if let TokenSlot::Loaded(token) = &state.token {
            return Ok(token.clone());
        }
        state.token = TokenSlot::Loaded(loaded.clone());
        Ok(loaded)
    }

    async fn store_token(&self, token: AuthToken) -> Result<()> {
        let encoded = token.encode();
        let _persist = self.persist.lock().await;
        self.state.lock().token = TokenSlot::Loaded(Some(token));
        self.store.save_token(&encoded).await?;
        Ok(())
    }

    /// Drop client, token, and cached results, then initialize again.
    ///
    /// `seen_generation` is the generation the failed attempt ran under. If
    /// another caller already reinitialized since then, the reset is skipped
    /// and only `initialize` runs.
    async fn reinitialize(&self, seen_generation: u64) -> Result<()> {
        let persist = self.persist.lock().await;
        let reset = {
            let mut state = self.state.lock();
            if let Phase::ChallengePending { challenge, .. } = &state.phase {
                return Err(TransportError::ChallengeRequired(challenge.clone()).into());
            }
            if state.generation == seen_generation {
                state.generation += 1;
                state.phase = Phase::NoClient;
                state.token = TokenSlot::Loaded(None);
                self.cache.clear_cache();
                true
            } else {
                false
            }
        };

        if reset {
            warn!("Session reset, reinitializing");
            self.store.clear_token().await?;
        } else {
            debug!("Session already reset by a concurrent caller");
        }
        drop(persist);
        self.initialize().await
    }

    fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Transport and token for one attempt, initializing first
    async fn authorized(&self) -> Result<(Arc<dyn VehicleTransport>, AuthToken)> {
        self.initialize().await?;
        let transport = self
            .existing_client()?
            .ok_or(ClientError::Transport(TransportError::InvalidSessionOrKey))?;
        // a concurrent reset may have dropped the token again
        let token = self
            .current_token()
            .await?
            .ok_or(ClientError::Transport(TransportError::InvalidSessionOrKey))?;
        Ok((transport, token))
    }

    // =========================================================================
    // Retry Wrapper
    // =========================================================================

    async fn attempt<T, F, Fut>(&self, call: &F) -> Result<T>
    where
        F: Fn(Arc<dyn VehicleTransport>, AuthToken) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let (transport, token) = self.authorized().await?;
        Ok(call(transport, token).await?)
    }

    /// Run `call` with a full reinit and one retry on session failure
    async fn with_retry<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn VehicleTransport>, AuthToken) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let generation = self.generation();
        match self.attempt(&call).await {
            Err(e) if warrants_reinit(&e) => {
                warn!(op, error = %e, "Operation failed, retrying after reinitialization");
                self.reinitialize(generation).await?;
                self.attempt(&call).await
            }
            result => result,
        }
    }

    /// Like [`Self::with_retry`] for an operation addressed to a vehicle.
    ///
    /// The vehicle key is resolved first. For brands addressed by key, the
    /// vehicle list is refetched after any reinitialization, since the
    /// failure may have been a stale key.
    async fn with_vehicle_retry<T, F, Fut>(&self, op: &'static str, vehicle: &Vehicle, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn VehicleTransport>, AuthToken, Vehicle) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let vehicle = self.resolve_vehicle(vehicle).await?;
        let generation = self.generation();

        let first = {
            let vehicle = vehicle.clone();
            self.attempt(&|t, tok| call(t, tok, vehicle.clone())).await
        };
        match first {
            Err(e) if warrants_reinit(&e) => {
                warn!(op, vin = %vehicle.vin, error = %e, "Operation failed, retrying after reinitialization");
                self.reinitialize(generation).await?;
                let vehicle = if vehicle.brand.requires_vehicle_key() {
                    self.refresh_vehicle(&vehicle.vin).await?
                } else {
                    vehicle
                };
                self.attempt(&|t, tok| call(t, tok, vehicle.clone())).await
            }
            result => result,
        }
    }

    // =========================================================================
    // Vehicle Keys
    // =========================================================================

    /// The vehicle with its vendor key, refreshing the list when the brand
    /// needs a key and none is known
    async fn resolve_vehicle(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        if !vehicle.needs_key_refresh() {
            return Ok(vehicle.clone());
        }

        let stored = self.store.load_vehicles().await?;
        if let Some(known) = stored.into_iter().find(|v| v.vin == vehicle.vin && v.key.is_some()) {
            return Ok(known);
        }

        debug!(vin = %vehicle.vin, "Vehicle key unknown, refreshing vehicle list");
        self.refresh_vehicle(&vehicle.vin).await
    }

    async fn refresh_vehicle(&self, vin: &str) -> Result<Vehicle> {
        let vehicle = self
            .fetch_vehicles()
            .await?
            .into_iter()
            .find(|v| v.vin == vin)
            .ok_or_else(|| ClientError::VehicleNotFound(vin.to_string()))?;
        if vehicle.needs_key_refresh() {
            warn!(vin, "Vendor returned no key for vehicle, addressing it by VIN");
        }
        Ok(vehicle)
    }

    // =========================================================================
    // Authenticated Operations
    // =========================================================================

    /// Fetch the account's vehicles, merge them into the stored records and
    /// persist the result
    #[instrument(skip(self))]
    pub async fn fetch_vehicles(&self) -> Result<Vec<Vehicle>> {
        let cache = &self.cache;
        let summaries = self
            .with_retry("fetch_vehicles", |transport, token| async move {
                cache.fetch_vehicles(&transport, &token).await
            })
            .await?;

        let known = self.store.load_vehicles().await?;
        let vehicles = merge_vehicles(known, &summaries, self.brand);
        self.store.save_vehicles(&vehicles).await?;
        debug!(count = vehicles.len(), "Vehicle list refreshed");
        Ok(vehicles)
    }

    #[instrument(skip(self, vehicle), fields(vin = %vehicle.vin))]
    pub async fn fetch_vehicle_status(&self, vehicle: &Vehicle) -> Result<VehicleStatus> {
        let cache = &self.cache;
        self.with_vehicle_retry("fetch_vehicle_status", vehicle, |transport, token, vehicle| async move {
            cache.fetch_vehicle_status(&transport, &vehicle, &token).await
        })
        .await
    }

    #[instrument(skip(self, vehicle, command), fields(vin = %vehicle.vin, command = %command.kind()))]
    pub async fn send_command(&self, vehicle: &Vehicle, command: &Command) -> Result<()> {
        let cache = &self.cache;
        self.with_vehicle_retry("send_command", vehicle, |transport, token, vehicle| async move {
            cache.send_command(&transport, &vehicle, command, &token).await
        })
        .await?;
        info!("Command accepted");
        Ok(())
    }

    #[instrument(skip(self, vehicle), fields(vin = %vehicle.vin))]
    pub async fn fetch_trip_details(&self, vehicle: &Vehicle) -> Result<Option<Vec<TripDetail>>> {
        let cache = &self.cache;
        self.with_vehicle_retry("fetch_trip_details", vehicle, |transport, token, vehicle| async move {
            cache.fetch_trip_details(&transport, &vehicle, &token).await
        })
        .await
    }

    // =========================================================================
    // Verification
    // =========================================================================

    fn challenge_in_progress(&self) -> Result<(Arc<dyn VehicleTransport>, ChallengeContext)> {
        match &self.state.lock().phase {
            Phase::ChallengePending {
                transport,
                challenge,
            } => Ok((transport.clone(), challenge.clone())),
            _ => Err(ClientError::NoPendingChallenge),
        }
    }

    /// Ask for a one-time code, on the client that received the challenge
    #[instrument(skip(self))]
    pub async fn send_verification_code(&self, method: VerificationMethod) -> Result<()> {
        let (transport, challenge) = self.challenge_in_progress()?;
        if !challenge.supports(method) {
            debug!(%method, "Method not offered by the challenge, forwarding anyway");
        }
        transport.request_verification_code(&challenge, method).await?;
        info!(%method, "Verification code requested");
        Ok(())
    }

    /// Complete the challenge with a one-time code.
    ///
    /// On any failure the challenge stays pending so the code can be
    /// re-entered or a new one requested.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, code: &str) -> Result<()> {
        let (transport, challenge) = self.challenge_in_progress()?;

        let verified = transport.exchange_verification_code(&challenge, code).await?;
        self.store
            .save_remember_token(&verified.remember_token)
            .await?;
        let token = transport.complete_login(&verified).await?;
        self.store_token(token).await?;

        let mut state = self.state.lock();
        let same_challenge = matches!(
            &state.phase,
            Phase::ChallengePending { challenge: current, .. } if current.session_id == challenge.session_id
        );
        if same_challenge {
            state.phase = Phase::Ready(transport);
        }
        info!("Verification complete");
        Ok(())
    }

    /// Forget the session entirely: client, tokens, challenge, and cache
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let _persist = self.persist.lock().await;
        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.phase = Phase::NoClient;
            state.token = TokenSlot::Loaded(None);
            self.cache.clear_cache();
        }
        self.store.clear_token().await?;
        self.store.clear_remember_token().await?;
        info!("Signed out");
        Ok(())
    }
}

fn warrants_reinit(error: &ClientError) -> bool {
    error.transport().is_some_and(TransportError::warrants_reinit)
}

/// The vendor list is authoritative: vehicles missing from it are dropped,
/// known ones keep their local fields and take the vendor's identity
fn merge_vehicles(known: Vec<Vehicle>, summaries: &[VehicleSummary], brand: Brand) -> Vec<Vehicle> {
    summaries
        .iter()
        .map(|summary| {
            let mut vehicle = known
                .iter()
                .find(|v| v.vin == summary.vin)
                .cloned()
                .unwrap_or_else(|| Vehicle::new(summary.vin.clone(), brand));
            vehicle.apply_summary(summary);
            vehicle
        })
        .collect()
}
