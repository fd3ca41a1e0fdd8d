use std::sync::Arc;
use std::time::Duration;
use tierlimit::{
    InMemoryStore, LimiterConfig, LimiterEvent, ManualClock, MemorySink, OutboundCall,
    RequestLimiter, Tier, TierLimits,
};

const START: u64 = 1_700_000_000_000;

fn limiter() -> (RequestLimiter<InMemoryStore>, ManualClock) {
    let clock = ManualClock::new(START);
    let store = InMemoryStore::with_clock(clock.clone());
    (RequestLimiter::new(store).with_clock(clock.clone()), clock)
}

fn send(chat_id: i64) -> OutboundCall {
    OutboundCall::new("sendMessage").to_chat(chat_id)
}

#[tokio::test]
async fn private_chat_defaults_to_one_message_per_second() {
    let (limiter, clock) = limiter();
    let call = send(42);

    assert_eq!(limiter.check_and_increase(&call).await.unwrap(), 0);
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 1);

    clock.advance(Duration::from_millis(400));
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 1);

    clock.advance(Duration::from_millis(600));
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 0);
}

#[tokio::test]
async fn group_traffic_feeds_the_groups_tier_only_for_groups() {
    let (limiter, _clock) = limiter();

    limiter.increase(&send(-500)).await.unwrap();
    let group = limiter.get_limiters().await.unwrap();
    assert_eq!((group.groups.counter(), group.difference.counter()), (1, 1));
    let particular = limiter.get_particular_limiter(Some(-500)).await.unwrap();
    assert_eq!(particular.state().counter(), 1);

    limiter.increase(&send(500)).await.unwrap();
    let group = limiter.get_limiters().await.unwrap();
    assert_eq!((group.groups.counter(), group.difference.counter()), (1, 2));

    limiter.increase(&OutboundCall::new("editMessageText").inline("abc")).await.unwrap();
    let group = limiter.get_limiters().await.unwrap();
    assert_eq!((group.groups.counter(), group.difference.counter()), (2, 3));
    // Inline calls have no chat id, so no particular counter is written.
    assert_eq!(limiter.store().len(), 3);
}

#[tokio::test]
async fn unlimited_calls_pass_through_untouched() {
    let (limiter, _clock) = limiter();

    for call in [OutboundCall::new("getChat").to_chat(1), OutboundCall::new("sendMessage")] {
        assert_eq!(limiter.check_limit(&call).await.unwrap(), 0);
        limiter.increase(&call).await.unwrap();
        assert_eq!(limiter.increase_and_check(&call).await.unwrap(), 0);
    }
    assert!(limiter.store().is_empty());
}

#[tokio::test]
async fn saturated_groups_tier_reports_its_window() {
    let (limiter, clock) = limiter();
    limiter.set_groups_and_channels_limits(3, 5);
    limiter.set_particular_limits(100, 1);

    for chat in [-1, -2, -3] {
        assert_eq!(limiter.check_and_increase(&send(chat)).await.unwrap(), 0);
    }

    let wait = limiter.check_limit(&send(-4)).await.unwrap();
    assert!(wait > 0 && wait <= 5, "wait was {wait}");
    // Private chats do not count against groups.
    assert_eq!(limiter.check_limit(&send(9)).await.unwrap(), 0);

    clock.advance(Duration::from_secs(5));
    assert_eq!(limiter.check_limit(&send(-4)).await.unwrap(), 0);
}

#[tokio::test]
async fn longest_saturated_window_wins() {
    let (limiter, _clock) = limiter();
    limiter.set_particular_limits(1, 10);
    limiter.set_groups_and_channels_limits(1, 3);

    limiter.increase(&send(-7)).await.unwrap();
    assert_eq!(limiter.check_limit(&send(-7)).await.unwrap(), 10);
    assert_eq!(limiter.check_limit(&send(-8)).await.unwrap(), 3);
}

#[tokio::test]
async fn refused_check_and_increase_records_nothing() {
    let (limiter, _clock) = limiter();
    let call = send(42);

    assert_eq!(limiter.check_and_increase(&call).await.unwrap(), 0);
    assert_eq!(limiter.check_and_increase(&call).await.unwrap(), 1);

    let group = limiter.get_limiters().await.unwrap();
    assert_eq!(group.difference.counter(), 1);
    let particular = limiter.get_particular_limiter(Some(42)).await.unwrap();
    assert_eq!(particular.state().counter(), 1);
}

#[tokio::test]
async fn increase_and_check_always_records() {
    let (limiter, _clock) = limiter();
    let call = send(42);

    assert_eq!(limiter.increase_and_check(&call).await.unwrap(), 1);
    assert_eq!(limiter.increase_and_check(&call).await.unwrap(), 1);
    let particular = limiter.get_particular_limiter(Some(42)).await.unwrap();
    assert_eq!(particular.state().counter(), 2);
}

#[tokio::test]
async fn queues_are_isolated() {
    let (limiter, _clock) = limiter();
    let call = send(42);

    limiter.set_queue("bulk");
    limiter.increase(&call).await.unwrap();
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 1);
    assert!(limiter.store().contains_key("bulklimiter"));
    assert!(limiter.store().contains_key("bulklimiter_for_42"));

    limiter.set_queue("");
    assert_eq!(limiter.queue(), "");
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 0);
}

#[tokio::test]
async fn reset_limiters_clears_shared_and_optionally_particular() {
    let (limiter, _clock) = limiter();
    limiter.set_particular_limits(1, 10);
    limiter.set_groups_and_channels_limits(1, 30);
    let call = send(-42);

    limiter.increase(&call).await.unwrap();
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 30);

    limiter.reset_limiters(None).await.unwrap();
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 10);

    limiter.reset_limiters(Some(-42)).await.unwrap();
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 0);

    let group = limiter.get_limiters().await.unwrap();
    assert_eq!(group.groups.counter(), 0);
    assert_eq!(group.difference.counter(), 0);
}

#[tokio::test]
async fn existing_windows_keep_their_length_after_reconfiguration() {
    let (limiter, _clock) = limiter();
    limiter.set_particular_limits(1, 10);
    limiter.increase(&send(1)).await.unwrap();

    limiter.set_particular_limits(1, 60);
    assert_eq!(limiter.check_limit(&send(1)).await.unwrap(), 10);

    limiter.increase(&send(2)).await.unwrap();
    assert_eq!(limiter.check_limit(&send(2)).await.unwrap(), 60);

    // Ceilings apply immediately.
    limiter.set_limits(Tier::Particular, TierLimits::new(5, 60));
    assert_eq!(limiter.check_limit(&send(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn save_limiters_writes_particular_under_recipient_key() {
    let (limiter, _clock) = limiter();
    let mut group = limiter.get_limiters().await.unwrap();
    let mut particular = limiter.get_particular_limiter(None).await.unwrap();
    assert!(limiter.store().is_empty());

    group.groups.set_counter(4);
    particular.state_mut().set_counter(1);
    limiter.save_limiters(&group, &particular, Some(77)).await.unwrap();

    assert_eq!(limiter.get_limiters().await.unwrap().groups.counter(), 4);
    let saved = limiter.get_particular_limiter(Some(77)).await.unwrap();
    assert_eq!(saved.state().key(), "limiter_for_77");
    assert_eq!(saved.state().counter(), 1);
}

#[tokio::test]
async fn three_second_private_window_end_to_end() {
    let clock = ManualClock::new(START);
    let config = LimiterConfig {
        particular: TierLimits::new(1, 3),
        groups: TierLimits::new(20, 60),
        difference: TierLimits::new(30, 1),
        queue: String::new(),
    };
    let limiter = RequestLimiter::with_config(InMemoryStore::with_clock(clock.clone()), config)
        .with_clock(clock.clone());
    let call = send(-100);

    assert_eq!(limiter.check_limit(&call).await.unwrap(), 0);
    limiter.increase(&call).await.unwrap();
    let wait = limiter.check_limit(&call).await.unwrap();
    assert!(wait > 0 && wait <= 3, "wait was {wait}");

    clock.advance(Duration::from_secs(3));
    assert_eq!(limiter.check_limit(&call).await.unwrap(), 0);
}

#[tokio::test]
async fn events_reach_the_sink() {
    let clock = ManualClock::new(START);
    let sink = MemorySink::new();
    let limiter = RequestLimiter::new(InMemoryStore::with_clock(clock.clone()))
        .with_clock(clock)
        .with_sink(sink.clone());
    let call = send(42);

    limiter.check_and_increase(&call).await.unwrap();
    limiter.check_and_increase(&call).await.unwrap();
    limiter.reset_limiters(Some(42)).await.unwrap();

    assert_eq!(
        sink.events(),
        vec![
            LimiterEvent::Recorded { method: "sendMessage".into(), groups: false, particular: true },
            LimiterEvent::Throttled {
                method: "sendMessage".into(),
                tier: Tier::Particular,
                wait: Duration::from_secs(1),
            },
            LimiterEvent::Reset { chat_id: Some(42) },
        ]
    );
}

#[tokio::test]
async fn concurrent_fan_out_to_distinct_chats_is_admitted() {
    let (limiter, _clock) = limiter();
    limiter.set_difference_limits(100, 1);
    let calls: Vec<_> = (1..=10).map(send).collect();

    let results = futures::future::join_all(calls.iter().map(|c| limiter.check_and_increase(c))).await;

    assert!(results.into_iter().all(|r| r.unwrap() == 0));
    // Read-modify-write without CAS: concurrent writers may lose updates.
    let recorded = limiter.get_limiters().await.unwrap().difference.counter();
    assert!((1..=10).contains(&recorded), "recorded {recorded}");
}

#[test]
fn setters_on_a_shared_limiter_do_not_lose_updates() {
    for _ in 0..50 {
        let limiter = Arc::new(RequestLimiter::new(InMemoryStore::new()));
        let queue = limiter.clone();
        let limits = limiter.clone();
        let a = std::thread::spawn(move || {
            for n in 1..=200 {
                queue.set_queue(format!("worker-{n}:"));
            }
        });
        let b = std::thread::spawn(move || {
            for n in 1..=200 {
                limits.set_particular_limits(n, 2);
                limits.set_groups_and_channels_limits(n, 30);
            }
        });
        a.join().unwrap();
        b.join().unwrap();

        let cfg = limiter.config();
        assert_eq!(cfg.queue, "worker-200:");
        assert_eq!(cfg.particular, TierLimits::new(200, 2));
        assert_eq!(cfg.groups, TierLimits::new(200, 30));
    }
}

#[tokio::test]
async fn saturated_difference_tier_stays_inside_its_queue() {
    let (limiter, _clock) = limiter();
    limiter.set_difference_limits(1, 60);

    limiter.set_queue("a:");
    limiter.increase(&send(1)).await.unwrap();
    assert_eq!(limiter.check_limit(&send(2)).await.unwrap(), 60);

    limiter.set_queue("b:");
    assert_eq!(limiter.check_limit(&send(2)).await.unwrap(), 0);

    limiter.set_queue("a:");
    assert_eq!(limiter.check_limit(&send(3)).await.unwrap(), 60);
}
