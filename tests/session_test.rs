//! Session integration tests
//!
//! Two or more clients sharing one store: live candidate updates, hearts
//! removing candidates, matches, and teardown.

use std::sync::Arc;
use std::time::Duration;

use heartwave_node::config::{Config, StoreBackend};
use heartwave_node::identity::LocalIdentity;
use heartwave_node::models::USERS;
use heartwave_node::position::ManualPositionSource;
use heartwave_node::scheduler::RefreshState;
use heartwave_node::store::{self, DocumentStore, MemoryStore};
use heartwave_node::{ActorId, CandidateSet, Coordinate, HeartwaveError, Services, Session};
use tempfile::TempDir;

struct Client {
    identity: Arc<LocalIdentity>,
    positions: Arc<ManualPositionSource>,
    services: Services,
}

fn client(actor: &str, store: Arc<dyn DocumentStore>, lat: f64, lon: f64) -> Client {
    let identity = Arc::new(LocalIdentity::signed_in(actor));
    let positions = Arc::new(ManualPositionSource::new(Coordinate::new(lat, lon)));
    let services = Services::new(store, identity.clone(), positions.clone());
    Client {
        identity,
        positions,
        services,
    }
}

/// Read emissions until one satisfies `pred`.
async fn candidates_until(
    session: &mut Session,
    pred: impl Fn(&CandidateSet) -> bool,
) -> CandidateSet {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let set = session.next_candidates().await.expect("feed ended early");
            if pred(&set) {
                return set;
            }
        }
    })
    .await
    .expect("timed out waiting for candidate set")
}

async fn stored_latitude(store: &Arc<dyn DocumentStore>, actor: &str) -> Option<f64> {
    store
        .get(USERS, actor)
        .await
        .unwrap()
        .and_then(|doc| doc.get("latitude").and_then(|v| v.as_f64()))
}

// =============================================================================
// Session start
// =============================================================================

#[tokio::test]
async fn test_begin_requires_sign_in() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store, 0.0, 0.0);
    alice.identity.sign_out();

    let result = Session::begin(alice.services.clone(), &Config::default()).await;
    assert!(matches!(result, Err(HeartwaveError::NotAuthenticated)));
    assert_eq!(alice.positions.requests(), 0);
}

#[tokio::test]
async fn test_begin_requires_location_permission() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 0.0, 0.0);
    alice.positions.set_permission(false);

    let result = Session::begin(alice.services.clone(), &Config::default()).await;
    assert!(matches!(result, Err(HeartwaveError::PermissionDenied)));
    assert_eq!(stored_latitude(&store, "alice").await, None);
}

#[tokio::test]
async fn test_begin_publishes_position_first() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 52.1, 5.1);

    let session = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();
    assert_eq!(stored_latitude(&store, "alice").await, Some(52.1));
    assert_eq!(session.refresh_state(), RefreshState::Published);
    assert!(session.is_active());
    assert!(!session.session_id().is_empty());
}

#[tokio::test]
async fn test_anonymous_sign_in_gets_a_session() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let identity = Arc::new(LocalIdentity::new());
    let actor = identity.sign_in_anonymously();
    let positions = Arc::new(ManualPositionSource::new(Coordinate::new(1.0, 1.0)));
    let services = Services::new(store, identity, positions);

    let session = Session::begin(services, &Config::default()).await.unwrap();
    assert_eq!(session.actor(), &actor);
}

// =============================================================================
// Live candidates
// =============================================================================

#[tokio::test]
async fn test_candidates_follow_movement() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 0.0, 0.0);
    let bob = client("bob", store.clone(), 0.0, 0.01);
    let (a, b) = (ActorId::from("alice"), ActorId::from("bob"));

    let mut sa = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();
    let sb = Session::begin(bob.services.clone(), &Config::default())
        .await
        .unwrap();

    let first = candidates_until(&mut sa, |_| true).await;
    assert!(!first.contains(&b));

    // Bob walks over
    bob.positions.set(Coordinate::new(0.0, 0.0002));
    sb.refresh_now().await.unwrap();
    let set = candidates_until(&mut sa, |s| s.contains(&b)).await;
    assert_eq!(set.ids(), vec![b.clone()]);

    // And leaves again
    bob.positions.set(Coordinate::new(0.0, 0.02));
    sb.refresh_now().await.unwrap();
    let set = candidates_until(&mut sa, |s| !s.contains(&b)).await;
    assert!(set.is_empty());
    assert_eq!(sa.actor(), &a);
}

#[tokio::test]
async fn test_one_sided_heart_only_hides_target_for_sender() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 0.0, 0.0);
    let bob = client("bob", store.clone(), 0.0, 0.0002);
    let (a, b) = (ActorId::from("alice"), ActorId::from("bob"));

    let mut sa = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();
    let mut sb = Session::begin(bob.services.clone(), &Config::default())
        .await
        .unwrap();

    candidates_until(&mut sa, |s| s.contains(&b)).await;
    candidates_until(&mut sb, |s| s.contains(&a)).await;

    assert!(!sa.send_heart(&b).await.unwrap());

    candidates_until(&mut sa, |s| !s.contains(&b)).await;
    // Bob receives the snapshot carrying Alice's heart and still sees her
    let seen_by_bob = candidates_until(&mut sb, |_| true).await;
    assert!(seen_by_bob.contains(&a));

    assert!(sa.matches().await.unwrap().is_empty());
    assert!(sb.matches().await.unwrap().is_empty());
    assert_eq!(sa.hearts_sent().await.unwrap().into_iter().collect::<Vec<_>>(), vec![b]);
}

#[tokio::test]
async fn test_mutual_heart_reported_once() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 0.0, 0.0);
    let bob = client("bob", store.clone(), 0.0, 0.0002);
    let (a, b) = (ActorId::from("alice"), ActorId::from("bob"));

    let sa = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();
    let sb = Session::begin(bob.services.clone(), &Config::default())
        .await
        .unwrap();

    assert!(!sa.send_heart(&b).await.unwrap());
    assert!(sb.send_heart(&a).await.unwrap());
    assert!(!sb.send_heart(&a).await.unwrap());

    let for_alice = sa.matches().await.unwrap();
    assert_eq!(for_alice.len(), 1);
    assert_eq!(for_alice[0].partner_of(&a), Some(&b));
    assert_eq!(sb.matches().await.unwrap(), for_alice);
}

#[tokio::test]
async fn test_heart_after_sign_out_is_rejected() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store, 0.0, 0.0);
    let session = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();

    alice.identity.sign_out();
    let result = session.send_heart(&ActorId::from("bob")).await;
    assert!(matches!(result, Err(HeartwaveError::NotAuthenticated)));
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_stops_timer_and_feed() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 0.0, 0.0);
    let bob = client("bob", store.clone(), 0.0, 0.0002);

    let mut session = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();
    assert_eq!(alice.positions.requests(), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    session.end();
    assert!(!session.is_active());
    assert_eq!(session.refresh_state(), RefreshState::Stopped);

    // The 30 s tick would have landed in here
    alice.positions.set(Coordinate::new(9.0, 9.0));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(alice.positions.requests(), 1);
    assert_eq!(stored_latitude(&store, "alice").await, Some(0.0));

    // Store keeps changing; the ended feed stays silent
    let other = Session::begin(bob.services.clone(), &Config::default())
        .await
        .unwrap();
    assert!(session.next_candidates().await.is_none());
    drop(other);
}

#[tokio::test(start_paused = true)]
async fn test_session_refreshes_on_interval_until_ended() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store.clone(), 0.0, 0.0);
    let config = Config::from_toml("[refresh]\ninterval_secs = 30\n").unwrap();

    let mut session = Session::begin(alice.services.clone(), &config).await.unwrap();
    alice.positions.set(Coordinate::new(1.0, 1.0));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(alice.positions.requests(), 2);
    assert_eq!(stored_latitude(&store, "alice").await, Some(1.0));

    session.end();
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(alice.positions.requests(), 2);
}

#[tokio::test]
async fn test_operations_after_end_fail() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let alice = client("alice", store, 0.0, 0.0);
    let mut session = Session::begin(alice.services.clone(), &Config::default())
        .await
        .unwrap();
    session.end();
    session.end();

    let bob = ActorId::from("bob");
    assert!(matches!(
        session.send_heart(&bob).await,
        Err(HeartwaveError::InvalidState(_))
    ));
    assert!(matches!(
        session.refresh_now().await,
        Err(HeartwaveError::InvalidState(_))
    ));
    assert!(matches!(
        session.matches().await,
        Err(HeartwaveError::InvalidState(_))
    ));
}

// =============================================================================
// Persistent store
// =============================================================================

#[tokio::test]
async fn test_sessions_over_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.store.backend = StoreBackend::Sqlite;
    config.store.data_dir = dir.path().to_path_buf();
    let store = store::open(&config.store).unwrap();

    let alice = client("alice", store.clone(), 40.0, -3.7);
    let bob = client("bob", store.clone(), 40.0, -3.7002);
    let (a, b) = (ActorId::from("alice"), ActorId::from("bob"));

    let mut sa = Session::begin(alice.services.clone(), &config).await.unwrap();
    let sb = Session::begin(bob.services.clone(), &config).await.unwrap();

    candidates_until(&mut sa, |s| s.contains(&b)).await;
    assert!(!sa.send_heart(&b).await.unwrap());
    assert!(sb.send_heart(&a).await.unwrap());
    candidates_until(&mut sa, |s| !s.contains(&b)).await;
    drop(sa);
    drop(sb);

    let reopened = store::open(&config.store).unwrap();
    let doc = reopened.get(USERS, "alice").await.unwrap().unwrap();
    assert_eq!(doc["heartsSent"], serde_json::json!(["bob"]));
    assert_eq!(reopened.list("matches").await.unwrap().len(), 1);
}
