//! Status-convergence waiter
//!
//! After a command is accepted the vehicle takes a while to act on it. A
//! wait polls status on a delayed schedule until a predicate holds or the
//! attempt budget runs out. Sleeps can be cut short by [`StatusWaiter::wake`]
//! when fresh status arrives through another path.
//!
//! At most one wait per vehicle is live. Starting a new one supersedes the
//! old one, which ends with [`ClientError::Cancelled`] at its next sleep or
//! poll. An in-flight status fetch of the superseded wait still completes.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vlink_core::VehicleStatus;

use crate::error::{ClientError, Result};

/// Polling schedule of a convergence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSchedule {
    pub max_attempts: u32,
    /// Sleep before the first poll
    pub initial_delay: Duration,
    /// Sleep between polls
    pub retry_delay: Duration,
}

impl WaitSchedule {
    pub fn new(max_attempts: u32, initial_delay: Duration, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            retry_delay,
        }
    }

    pub fn from_secs(max_attempts: u32, initial_delay_secs: u64, retry_delay_secs: u64) -> Self {
        Self::new(
            max_attempts,
            Duration::from_secs(initial_delay_secs),
            Duration::from_secs(retry_delay_secs),
        )
    }
}

impl Default for WaitSchedule {
    fn default() -> Self {
        Self::from_secs(10, 10, 5)
    }
}

/// Progress of a convergence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitProgress {
    /// The command was accepted; the initial delay is starting
    CommandSent,
    /// Poll `attempt` of `max_attempts` did not match yet
    Waiting { attempt: u32, max_attempts: u32 },
}

/// Callback receiving [`WaitProgress`] updates
pub type ProgressFn<'a> = &'a (dyn Fn(WaitProgress) + Send + Sync);

/// Why a sleeping wait was resumed before its timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeReason {
    /// New status is available; poll now
    Woken,
    /// Replaced by a newer wait or abandoned by the caller
    Released,
}

struct WakeSlot {
    id: u64,
    sender: oneshot::Sender<WakeReason>,
}

#[derive(Default)]
struct WaiterState {
    slots: HashMap<String, WakeSlot>,
    /// Current wait generation per vehicle; only the latest wait is live
    generations: HashMap<String, u64>,
    next_slot_id: u64,
}

impl WaiterState {
    /// Remove the slot for `vin` and resume its sleeper with `reason`
    fn release(&mut self, vin: &str, reason: WakeReason) -> bool {
        match self.slots.remove(vin) {
            Some(slot) => {
                // the sleeper may have just timed out; that is fine
                let _ = slot.sender.send(reason);
                true
            }
            None => false,
        }
    }

    fn is_current(&self, vin: &str, generation: u64) -> bool {
        self.generations.get(vin) == Some(&generation)
    }

    fn bump_generation(&mut self, vin: &str) -> u64 {
        let generation = self.generations.entry(vin.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }
}

/// Per-account registry of convergence waits
#[derive(Default)]
pub struct StatusWaiter {
    state: Mutex<WaiterState>,
}

/// Removes a wake slot when its sleep ends, however it ends
struct SlotGuard<'a> {
    waiter: &'a StatusWaiter,
    vin: &'a str,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.waiter.state.lock();
        if state.slots.get(self.vin).is_some_and(|slot| slot.id == self.id) {
            state.slots.remove(self.vin);
        }
    }
}

impl StatusWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll `fetch` until `predicate` holds.
    ///
    /// Returns the matching status, [`ClientError::ConvergenceTimeout`] when
    /// every attempt was used, [`ClientError::Cancelled`] when `cancel`
    /// fired or the wait was superseded, or the first fetch error.
    pub async fn wait_for<F, Fut, P>(
        &self,
        vin: &str,
        schedule: &WaitSchedule,
        mut fetch: F,
        predicate: P,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<VehicleStatus>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<VehicleStatus>>,
        P: Fn(&VehicleStatus) -> bool,
    {
        let generation = self.begin(vin);
        let report = |p: WaitProgress| {
            if let Some(progress) = progress {
                progress(p);
            }
        };

        report(WaitProgress::CommandSent);
        self.sleep(vin, generation, schedule.initial_delay, cancel)
            .await?;

        for attempt in 1..=schedule.max_attempts {
            if cancel.is_cancelled() || !self.state.lock().is_current(vin, generation) {
                debug!(vin, attempt, "Wait cancelled");
                return Err(ClientError::Cancelled);
            }

            debug!(vin, attempt, max_attempts = schedule.max_attempts, "Polling status");
            let status = fetch().await?;
            if predicate(&status) {
                info!(vin, attempt, "Vehicle status converged");
                return Ok(status);
            }

            if attempt < schedule.max_attempts {
                report(WaitProgress::Waiting {
                    attempt,
                    max_attempts: schedule.max_attempts,
                });
                self.sleep(vin, generation, schedule.retry_delay, cancel)
                    .await?;
            }
        }

        info!(vin, attempts = schedule.max_attempts, "Vehicle status did not converge");
        Err(ClientError::ConvergenceTimeout {
            attempts: schedule.max_attempts,
        })
    }

    /// Resume the sleeping wait for `vin`, if any, so it polls immediately.
    /// Returns whether a wait was sleeping.
    pub fn wake(&self, vin: &str) -> bool {
        let woken = self.state.lock().release(vin, WakeReason::Woken);
        if woken {
            debug!(vin, "Woke status waiter");
        }
        woken
    }

    /// Abandon the wait for `vin`: it ends with [`ClientError::Cancelled`]
    /// and its slot is removed. Returns whether a wait was sleeping.
    pub fn clear_pending_waiters(&self, vin: &str) -> bool {
        let mut state = self.state.lock();
        state.bump_generation(vin);
        let released = state.release(vin, WakeReason::Released);
        if released {
            debug!(vin, "Cleared pending waiter");
        }
        released
    }

    pub fn has_pending_waiter(&self, vin: &str) -> bool {
        self.state.lock().slots.contains_key(vin)
    }

    /// Start a new wait generation, releasing any wait already sleeping
    fn begin(&self, vin: &str) -> u64 {
        let mut state = self.state.lock();
        if state.release(vin, WakeReason::Released) {
            debug!(vin, "Superseding previous wait");
        }
        state.bump_generation(vin)
    }

    /// Sleep for `delay` unless woken, released, or cancelled first.
    ///
    /// A wake ends the sleep early with `Ok`; release and cancellation end
    /// it with `Cancelled`. The slot is removed before this returns.
    async fn sleep(
        &self,
        vin: &str,
        generation: u64,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (sender, receiver) = oneshot::channel();
        let id = {
            let mut state = self.state.lock();
            if !state.is_current(vin, generation) {
                return Err(ClientError::Cancelled);
            }
            // a stale slot would leak its sleeper
            state.release(vin, WakeReason::Released);
            state.next_slot_id += 1;
            let id = state.next_slot_id;
            state
                .slots
                .insert(vin.to_string(), WakeSlot { id, sender });
            id
        };
        let _slot = SlotGuard {
            waiter: self,
            vin,
            id,
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            reason = receiver => match reason {
                Ok(WakeReason::Woken) => {
                    debug!(vin, "Sleep interrupted by wake");
                    Ok(())
                }
                Ok(WakeReason::Released) | Err(_) => Err(ClientError::Cancelled),
            },
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
        }
    }
}
