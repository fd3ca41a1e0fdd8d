use std::sync::Arc;
use std::time::Duration;
use tierlimit::{Clock, InMemoryStore, ManualClock, StateStore, WindowCounter};

const START: u64 = 1_700_000_000_000;

fn setup() -> (Arc<InMemoryStore>, Arc<dyn Clock>, ManualClock) {
    let clock = ManualClock::new(START);
    let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
    (store, Arc::new(clock.clone()), clock)
}

#[tokio::test]
async fn get_or_create_persists_a_fresh_window() {
    let (store, clock, _manual) = setup();
    let counter = WindowCounter::get_or_create(store.clone(), clock, "w", 5, 10).await.unwrap();

    assert_eq!(counter.state().counter(), 0);
    assert_eq!(counter.state().destroy_at(), START + 10_000);
    assert!(store.contains_key("w"));
}

#[tokio::test]
async fn state_survives_a_reload() {
    let (store, clock, _manual) = setup();
    let mut first = WindowCounter::get_or_create(store.clone(), clock.clone(), "w", 5, 10)
        .await
        .unwrap();
    first.increment(3).await.unwrap();

    // Capacity arguments only apply to brand-new windows.
    let mut second = WindowCounter::get_or_create(store, clock, "w", 99, 99).await.unwrap();
    assert_eq!(second.counter().await.unwrap(), 3);
    assert_eq!(second.state().max(), 5);
    assert!(second.is_less(None).await.unwrap());
    assert!(second.is_more_or_equal(Some(3)).await.unwrap());
    assert!(!second.is_more(Some(3)).await.unwrap());
    assert!(second.is_less_or_equal(Some(3)).await.unwrap());
}

#[tokio::test]
async fn accessors_heal_expired_windows() {
    let (store, clock, manual) = setup();
    let mut counter = WindowCounter::get_or_create(store.clone(), clock, "w", 2, 1).await.unwrap();
    counter.increment(2).await.unwrap();
    assert!(!counter.is_less(None).await.unwrap());

    manual.advance(Duration::from_secs(1));
    assert!(counter.is_less(None).await.unwrap());
    assert_eq!(counter.state().counter(), 0);
    assert_eq!(counter.time_left().await.unwrap(), 1_000);
    assert!(store.contains_key("w"));
}

#[tokio::test]
async fn stored_expiry_tracks_remaining_window() {
    let (store, clock, manual) = setup();
    let mut counter = WindowCounter::get_or_create(store.clone(), clock, "w", 2, 1).await.unwrap();

    manual.advance(Duration::from_millis(400));
    counter.increment(1).await.unwrap();
    manual.advance(Duration::from_millis(599));
    assert!(store.contains_key("w"));
    manual.advance(Duration::from_millis(1));
    assert!(!store.contains_key("w"));
}

#[tokio::test]
async fn step_after_expiry_counts_in_the_new_window() {
    let (store, clock, manual) = setup();
    let mut counter = WindowCounter::get_or_create(store, clock, "w", 10, 1).await.unwrap();
    counter.increment(4).await.unwrap();

    manual.advance(Duration::from_millis(1_500));
    counter.increment(1).await.unwrap();
    assert_eq!(counter.state().counter(), 1);
    assert_eq!(counter.state().created_at(), START + 1_500);
}

#[tokio::test]
async fn increment_if_writes_only_when_predicate_holds() {
    let (store, clock, _manual) = setup();
    let mut counter = WindowCounter::detached(store.clone(), clock, "w", 10, 5);

    counter.increment_if(|| false, 1).await.unwrap();
    assert!(store.is_empty());
    assert_eq!(counter.state().counter(), 0);

    counter.increment_if(|| true, 2).await.unwrap();
    assert_eq!(counter.state().counter(), 2);
    assert!(store.get("w").await.unwrap().is_some());
}

#[tokio::test]
async fn reset_restarts_and_persists() {
    let (store, clock, manual) = setup();
    let mut counter = WindowCounter::get_or_create(store.clone(), clock.clone(), "w", 10, 5)
        .await
        .unwrap();
    counter.increment(7).await.unwrap();

    manual.advance(Duration::from_secs(2));
    counter.reset().await.unwrap();
    assert_eq!(counter.state().destroy_at(), START + 7_000);

    let reloaded = WindowCounter::get_or_create(store, clock, "w", 10, 5).await.unwrap();
    assert_eq!(reloaded.state().counter(), 0);
}
