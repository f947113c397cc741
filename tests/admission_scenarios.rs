use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use ulid::Ulid;

use spacebook::clock::ManualClock;
use spacebook::model::*;
use spacebook::notify::NotifyHub;
use spacebook::store::{NewResource, WalStore};
use spacebook::{Collaborators, Engine, EngineError, TransitionPolicy};

const H: Ms = 3_600_000;
/// 2026-01-01T00:00:00Z
const DAY0: Ms = 1_767_225_600_000;

// ── Test infrastructure ──────────────────────────────────────

fn temp_wal(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spacebook_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

async fn setup() -> (Arc<WalStore>, Arc<Engine>) {
    let store = Arc::new(
        WalStore::open(
            &temp_wal("scenarios.wal"),
            Arc::new(NotifyHub::new()),
            Arc::new(ManualClock::with_step(DAY0, 1)),
        )
        .await
        .unwrap(),
    );
    let parts = Collaborators::wal_backed(store.clone()).with_clock(Arc::new(ManualClock::with_step(DAY0, 1)));
    let engine = Arc::new(Engine::new(parts, TransitionPolicy::Overwrite));
    (store, engine)
}

async fn equipment(store: &WalStore, name: &str, capacity: u32) -> ResourceInfo {
    store
        .register_resource(NewResource {
            name: name.into(),
            kind: ResourceKind::Equipment,
            category: Some("lab".into()),
            capacity,
        })
        .await
        .unwrap()
}

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) % bound
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn capacity_two_booking_day() {
    let (store, engine) = setup().await;
    let scope = equipment(&store, "Microscope", 2).await;
    let u1 = Ulid::new();

    let a = engine.request_booking(scope.id, u1, DAY0 + 10 * H, DAY0 + 12 * H).await.unwrap();
    assert_eq!(a.status, ReservationStatus::Pending);
    engine.request_booking(scope.id, Ulid::new(), DAY0 + 11 * H, DAY0 + 13 * H).await.unwrap();

    let err = engine
        .request_booking(scope.id, Ulid::new(), DAY0 + 11 * H + H / 2, DAY0 + 12 * H)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { capacity: 2, booked: 2, available: 0 }));

    engine.reject(a.id).await.unwrap();
    engine
        .request_booking(scope.id, Ulid::new(), DAY0 + 11 * H + H / 2, DAY0 + 12 * H)
        .await
        .unwrap();

    let mine = engine.notifications_for_user(u1).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].message, "Your reservation has been rejected");
}

#[tokio::test]
async fn rooms_hold_one_booking_at_a_time() {
    let (store, engine) = setup().await;
    let room = store
        .register_resource(NewResource {
            name: "Room 101".into(),
            kind: ResourceKind::Room,
            category: Some("ignored".into()),
            capacity: 40,
        })
        .await
        .unwrap();
    assert_eq!(room.capacity, 1);
    assert_eq!(room.category, "none");

    engine.request_booking(room.id, Ulid::new(), DAY0 + 9 * H, DAY0 + 10 * H).await.unwrap();
    engine.request_booking(room.id, Ulid::new(), DAY0 + 10 * H, DAY0 + 11 * H).await.unwrap();
    let err = engine
        .request_booking(room.id, Ulid::new(), DAY0 + 9 * H + H / 2, DAY0 + 10 * H + H / 2)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExceeded { capacity: 1, booked: 2, available: 0 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_random_requests_keep_every_instant_within_capacity() {
    let (store, engine) = setup().await;
    let mut resources = Vec::new();
    for (i, cap) in [1u32, 2, 3, 5].into_iter().enumerate() {
        resources.push(equipment(&store, &format!("Kit {i}"), cap).await);
    }

    let mut rng = Lcg(7);
    let mut requests = Vec::new();
    for _ in 0..400 {
        let r = &resources[rng.next(resources.len() as u64) as usize];
        let start = DAY0 + rng.next(48) as Ms * H / 2;
        let len = (1 + rng.next(8)) as Ms * H / 2;
        requests.push((r.id, start, start + len));
    }

    let results = join_all(requests.into_iter().map(|(rid, start, end)| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.request_booking(rid, Ulid::new(), start, end).await })
    }))
    .await;

    let mut admitted = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => admitted += 1,
            Err(EngineError::CapacityExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(admitted > 0);

    let all = engine.reservations(ReservationFilter::default()).await.unwrap();
    assert_eq!(all.len(), admitted);
    let mut spans: HashMap<Ulid, Vec<Span>> = HashMap::new();
    for r in &all {
        spans.entry(r.resource_id).or_default().push(r.span);
    }
    for r in &resources {
        let held = spans.get(&r.id).map(Vec::as_slice).unwrap_or_default();
        assert!(
            peak_occupancy(held) <= r.capacity,
            "{} over capacity: peak {} > {}",
            r.name,
            peak_occupancy(held),
            r.capacity
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reject_and_request_never_oversubscribe() {
    let (store, engine) = setup().await;
    let cam = equipment(&store, "Camera", 2).await;
    let rid = cam.id;
    let (start, end) = (DAY0 + 14 * H, DAY0 + 15 * H);

    let first = engine.request_booking(rid, Ulid::new(), start, end).await.unwrap();
    engine.request_booking(rid, Ulid::new(), start, end).await.unwrap();

    let rejecter = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reject(first.id).await })
    };
    let requests: Vec<_> = (0..10)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.request_booking(rid, Ulid::new(), start, end).await })
        })
        .collect();

    rejecter.await.unwrap().unwrap();
    let admitted = join_all(requests)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert!(admitted <= 1);

    let live = engine
        .reservations(ReservationFilter { resource_id: Some(rid), requester_id: None })
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status != ReservationStatus::Rejected)
        .count();
    assert!(live <= 2);
}

#[tokio::test]
async fn live_subscribers_see_the_lifecycle() {
    let (store, engine) = setup().await;
    let bike = equipment(&store, "Bike", 1).await;
    let alice = Ulid::new();
    store.register_user(alice, "Alice".into()).await.unwrap();

    let mut admin = store.hub().subscribe_admin();
    let mut inbox = store.hub().subscribe_user(alice);

    let r = engine.request_booking(bike.id, alice, DAY0 + 8 * H, DAY0 + 9 * H).await.unwrap();
    let announced = admin.recv().await.unwrap();
    assert_eq!(announced.target, Target::Broadcast);
    assert_eq!(announced.message, "New reservation request from Alice for Bike");

    engine.approve(r.id).await.unwrap();
    let approved = inbox.recv().await.unwrap();
    assert_eq!(approved.target, Target::User(alice));
    assert_eq!(approved.message, "Your reservation has been approved");
    assert_eq!(admin.recv().await.unwrap().id, approved.id);

    engine.mark_notification_read(approved.id).await.unwrap();
    let listed = engine.notifications_for_user(alice).await.unwrap();
    assert!(listed[0].read);
}

#[tokio::test]
async fn removing_a_booked_resource_is_refused() {
    let (store, engine) = setup().await;
    let kit = equipment(&store, "Tripod", 1).await;
    let spare = equipment(&store, "Spare", 1).await;
    let r = engine.request_booking(kit.id, Ulid::new(), DAY0 + H, DAY0 + 2 * H).await.unwrap();
    engine.reject(r.id).await.unwrap();

    assert!(store.remove_resource(kit.id).await.is_err());
    store.remove_resource(spare.id).await.unwrap();

    let err = engine
        .request_booking(spare.id, Ulid::new(), DAY0 + H, DAY0 + 2 * H)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ResourceNotFound(id) if id == spare.id));
}
