//! Integration tests for vlink-client
//!
//! These drive a `VehicleClient` against the scriptable mock transport and
//! check the orchestration guarantees end to end: request coalescing, TTL,
//! invalidation by commands, session recovery, and status convergence.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;
use vlink_client::testing::{
    sample_challenge, sample_status, sample_token, wait_for, MockTransport, MockTransportFactory,
};
use vlink_client::{
    ClientConfig, ClientError, ErrorCategory, FileStore, MemoryStore, SessionStatus,
    TransportError, VehicleClient, WaitProgress, WaitSchedule,
};
use vlink_core::{AccountStore, AuthToken, Brand, Command, Vehicle, VehicleSummary, VerificationMethod};

// =============================================================================
// Fixtures
// =============================================================================

struct Fixture {
    mock: Arc<MockTransport>,
    store: Arc<MemoryStore>,
    client: Arc<VehicleClient>,
}

fn config(brand: Brand) -> ClientConfig {
    ClientConfig::builder("http://unused.invalid", "driver@example.com", "secret", brand)
        .sweep_interval_ms(0)
        .wait(3, 2, 6)
        .build()
}

fn fixture_with_store(brand: Brand, store: MemoryStore) -> Fixture {
    let mock = Arc::new(MockTransport::new());
    let store = Arc::new(store);
    let factory = Arc::new(MockTransportFactory::new(mock.clone()));
    let client = Arc::new(VehicleClient::new(&config(brand), factory, store.clone()));
    Fixture { mock, store, client }
}

fn fixture() -> Fixture {
    fixture_with_store(Brand::Hyundai, MemoryStore::new())
}

fn car() -> Vehicle {
    Vehicle::new("KMHTEST0000000001", Brand::Hyundai).with_nickname("Daily")
}

// =============================================================================
// Operation Cache
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_status_reads_are_coalesced() {
    let f = fixture();
    f.mock.set_latency(Duration::from_millis(250));
    f.client.initialize().await.unwrap();
    let vehicle = car();

    let results = futures::future::join_all((0..8).map(|_| f.client.fetch_vehicle_status(&vehicle))).await;

    assert_eq!(f.mock.status_calls(), 1);
    let first = results[0].as_ref().unwrap();
    assert!(results.iter().all(|r| r.as_ref().unwrap() == first));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_are_shared() {
    let f = fixture();
    f.mock.set_latency(Duration::from_millis(250));
    f.client.initialize().await.unwrap();
    f.mock.push_status(Err(TransportError::ServerError("gateway down".into())));
    let vehicle = car();

    let results = futures::future::join_all((0..4).map(|_| f.client.fetch_vehicle_status(&vehicle))).await;

    assert_eq!(f.mock.status_calls(), 1);
    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransientTransport);
    }
}

#[tokio::test(start_paused = true)]
async fn test_status_ttl() {
    let f = fixture();
    let vehicle = car();

    assert_ok!(f.client.fetch_vehicle_status(&vehicle).await);
    tokio::time::advance(Duration::from_secs(4)).await;
    assert_ok!(f.client.fetch_vehicle_status(&vehicle).await);
    assert_eq!(f.mock.status_calls(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_ok!(f.client.fetch_vehicle_status(&vehicle).await);
    assert_eq!(f.mock.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_command_invalidates_cached_status() {
    let f = fixture();
    f.mock.set_status(sample_status(false));
    let vehicle = car();

    let before = f.client.fetch_vehicle_status(&vehicle).await.unwrap();
    assert!(!before.locked);

    tokio::time::advance(Duration::from_secs(1)).await;
    f.client.send_command(&vehicle, &Command::Lock).await.unwrap();

    tokio::time::advance(Duration::from_secs(1)).await;
    let after = f.client.fetch_vehicle_status(&vehicle).await.unwrap();
    assert!(after.locked);
    assert_eq!(f.mock.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_commands_send_once() {
    let f = fixture();
    f.mock.set_latency(Duration::from_millis(300));
    f.client.initialize().await.unwrap();
    let vehicle = car();

    let (a, b) = tokio::join!(
        f.client.send_command(&vehicle, &Command::Unlock),
        f.client.send_command(&vehicle, &Command::Unlock)
    );
    assert_ok!(a);
    assert_ok!(b);
    assert_eq!(f.mock.command_calls(), 1);

    let stats = f.client.cache_stats();
    assert_eq!(stats.in_flight, 0);
}

// =============================================================================
// Session
// =============================================================================

#[tokio::test]
async fn test_challenge_short_circuits_concurrent_initialize() {
    let f = fixture();
    f.mock
        .push_login(Err(TransportError::ChallengeRequired(sample_challenge())));

    let err = f.client.initialize().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ChallengeRequired);
    let calls = f.mock.total_calls();

    let vehicle = car();
    let (a, b, c) = tokio::join!(
        f.client.initialize(),
        f.client.fetch_vehicle_status(&vehicle),
        f.client.fetch_vehicles()
    );
    assert!(a.unwrap_err().is_challenge());
    assert!(b.unwrap_err().is_challenge());
    assert!(c.unwrap_err().is_challenge());
    assert_eq!(f.mock.total_calls(), calls);
    assert_eq!(f.client.session_status(), SessionStatus::ChallengePending);
}

#[tokio::test]
async fn test_verification_completes_session() {
    let f = fixture();
    f.mock
        .push_login(Err(TransportError::ChallengeRequired(sample_challenge())));
    assert_err!(f.client.initialize().await);
    assert_eq!(f.client.pending_challenge(), Some(sample_challenge()));

    f.client
        .send_verification_code(VerificationMethod::Email)
        .await
        .unwrap();
    f.client.verify_code("424242").await.unwrap();

    assert_eq!(f.client.session_status(), SessionStatus::Ready);
    assert!(f.client.pending_challenge().is_none());
    assert_eq!(f.store.remember_token().as_deref(), Some("remember-424242"));

    f.client.fetch_vehicle_status(&car()).await.unwrap();
    assert_eq!(f.mock.login_calls(), 1);
    assert_eq!(f.mock.complete_login_calls(), 1);
}

#[tokio::test]
async fn test_reinit_and_retry_leaves_one_fresh_token() {
    let stale = sample_token("stale");
    let f = fixture_with_store(Brand::Hyundai, MemoryStore::new().with_token(stale.encode()));
    f.mock.push_status(Err(TransportError::InvalidSessionOrKey));
    f.mock.push_status(Ok(sample_status(false)));

    let status = f.client.fetch_vehicle_status(&car()).await.unwrap();

    assert!(!status.locked);
    assert_eq!(f.mock.login_calls(), 1);
    let stored = f.store.token().and_then(|s| AuthToken::decode(&s)).unwrap();
    assert_eq!(stored.access_token, "token-1");
    assert!(stored.is_valid());
}

#[tokio::test]
async fn test_invalid_pin_is_not_retried() {
    let f = fixture();
    f.mock.push_command(Err(TransportError::InvalidPin));

    let err = f.client.send_command(&car(), &Command::Unlock).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidInput);
    assert_eq!(f.mock.command_calls(), 1);
    assert_eq!(f.mock.login_calls(), 1);
}

#[tokio::test]
async fn test_keyed_vehicle_resolved_from_vendor_list() {
    let f = fixture_with_store(Brand::Kia, MemoryStore::new());
    f.mock.set_vehicles(vec![
        VehicleSummary::new("KNDTEST0000000002").with_key("veh-key-2"),
        VehicleSummary::new("KNDTEST0000000003").with_key("veh-key-3"),
    ]);

    let vehicle = Vehicle::new("KNDTEST0000000003", Brand::Kia);
    f.client.fetch_vehicle_status(&vehicle).await.unwrap();

    let stored = f.store.vehicles();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].key.as_deref(), Some("veh-key-3"));
    assert_eq!(stored[1].brand, Brand::Kia);
}

#[tokio::test]
async fn test_session_survives_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
        let mock = Arc::new(MockTransport::new());
        let client = VehicleClient::new(
            &config(Brand::Hyundai),
            Arc::new(MockTransportFactory::new(mock.clone())),
            store,
        );
        client.initialize().await.unwrap();
        assert_eq!(mock.login_calls(), 1);
    }

    let store = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let mock = Arc::new(MockTransport::new());
    let client = VehicleClient::new(
        &config(Brand::Hyundai),
        Arc::new(MockTransportFactory::new(mock.clone())),
        store.clone(),
    );
    client.fetch_vehicle_status(&car()).await.unwrap();

    assert_eq!(mock.login_calls(), 0);
    assert_eq!(mock.tokens_seen(), vec!["token-1"]);
    assert!(store.load_status(&car().vin).await.unwrap().is_some());
}

// =============================================================================
// Status Convergence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_converges_on_second_poll() {
    let f = fixture();
    f.mock.set_status(sample_status(false));
    f.mock.set_command_effect_delay(1);
    let vehicle = car();
    let reports = parking_lot::Mutex::new(Vec::new());
    let record = |p: WaitProgress| reports.lock().push(p);

    let status = f
        .client
        .send_command_and_wait(&vehicle, &Command::Lock, Some(&record), &CancellationToken::new())
        .await
        .unwrap();

    assert!(status.locked);
    assert_eq!(f.mock.status_calls(), 2);
    assert_eq!(
        *reports.lock(),
        vec![
            WaitProgress::CommandSent,
            WaitProgress::Waiting { attempt: 1, max_attempts: 3 }
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_after_exactly_max_attempts() {
    let f = fixture();
    f.mock.set_status(sample_status(false));
    let vehicle = car();

    let err = f
        .client
        .wait_for_status_change(
            &vehicle,
            &WaitSchedule::from_secs(3, 0, 6),
            |status| status.locked,
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::ConvergenceTimeout { attempts: 3 }));
    assert_eq!(err.category(), ErrorCategory::ConvergenceTimeout);
    assert_eq!(f.mock.status_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_background_refresh_wakes_wait() {
    let f = fixture();
    f.mock.set_status(sample_status(false));
    let vehicle = car();
    let start = Instant::now();

    let wait = {
        let (client, vehicle) = (f.client.clone(), vehicle.clone());
        tokio::spawn(async move {
            client
                .wait_for_status_change(
                    &vehicle,
                    &WaitSchedule::from_secs(3, 0, 120),
                    |status| status.locked,
                    None,
                    &CancellationToken::new(),
                )
                .await
        })
    };

    let sleeping = {
        let (client, vin) = (f.client.clone(), vehicle.vin.clone());
        wait_for(
            move || {
                let sleeping = client.has_pending_waiter(&vin);
                async move { sleeping }
            },
            Duration::from_secs(5),
        )
        .await
    };
    assert!(sleeping);

    // the car locks; an unrelated refresh sees it after the cache expires
    f.mock.set_status(sample_status(true));
    tokio::time::advance(Duration::from_secs(6)).await;
    let refreshed = f.client.fetch_vehicle_status(&vehicle).await.unwrap();
    assert!(refreshed.locked);

    let status = wait.await.unwrap().unwrap();
    assert!(status.locked);
    assert!(start.elapsed() < Duration::from_secs(120));
    // one poll by the wait, one refresh; the woken poll was served from cache
    assert_eq!(f.mock.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_is_distinct_and_clean() {
    let f = fixture();
    f.mock.set_status(sample_status(false));
    let vehicle = car();
    let cancel = CancellationToken::new();

    let wait = {
        let (client, vehicle, cancel) = (f.client.clone(), vehicle.clone(), cancel.clone());
        tokio::spawn(async move {
            client
                .send_command_and_wait(&vehicle, &Command::Lock, None, &cancel)
                .await
        })
    };
    let sleeping = {
        let (client, vin) = (f.client.clone(), vehicle.vin.clone());
        wait_for(
            move || {
                let sleeping = client.has_pending_waiter(&vin);
                async move { sleeping }
            },
            Duration::from_secs(1),
        )
        .await
    };
    assert!(sleeping);

    cancel.cancel();
    let err = wait.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.category(), ErrorCategory::Cancellation);
    assert!(!f.client.has_pending_waiter(&vehicle.vin));
    assert_eq!(f.mock.command_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_clear_pending_waiters_abandons_wait() {
    let f = fixture();
    let vehicle = car();

    let wait = {
        let (client, vehicle) = (f.client.clone(), vehicle.clone());
        tokio::spawn(async move {
            client
                .wait_for_status_change(
                    &vehicle,
                    &WaitSchedule::from_secs(3, 30, 30),
                    |status| !status.locked,
                    None,
                    &CancellationToken::new(),
                )
                .await
        })
    };
    let sleeping = {
        let (client, vin) = (f.client.clone(), vehicle.vin.clone());
        wait_for(
            move || {
                let sleeping = client.has_pending_waiter(&vin);
                async move { sleeping }
            },
            Duration::from_secs(1),
        )
        .await
    };
    assert!(sleeping);

    assert!(f.client.clear_pending_waiters(&vehicle.vin));
    assert!(wait.await.unwrap().unwrap_err().is_cancelled());
    assert!(!f.client.wake(&vehicle.vin));
    assert_eq!(f.mock.status_calls(), 0);
}
