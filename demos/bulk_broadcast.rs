//! Broadcast one announcement to many chats from two dispatch queues.
//!
//! Each queue owns its own counter partition, so a slow bulk queue never starves the
//! interactive one. Limiter events are logged through `LogSink`.
//!
//! ```text
//! cargo run --example bulk_broadcast
//! ```
use std::sync::Arc;
use std::time::{Duration, Instant};
use tierlimit::prelude::*;

#[tokio::main]
async fn main() -> Result<(), LimiterError> {
    tracing_subscriber::fmt().with_target(true).init();

    let store = Arc::new(InMemoryStore::new());

    let bulk = RequestLimiter::new(store.clone()).with_sink(LogSink);
    bulk.set_queue("bulk:");
    bulk.set_difference_limits(5, 1);
    bulk.set_groups_and_channels_limits(4, 2);

    let interactive = RequestLimiter::new(store).with_sink(LogSink);
    interactive.set_queue("interactive:");

    let bulk_gate = AdmissionGate::new(Arc::new(bulk))
        .with_poll(PollConfig::new(30, Duration::from_millis(250))?);
    let interactive_gate = AdmissionGate::new(Arc::new(interactive));

    let recipients: Vec<i64> = (1..=6).chain((1..=6).map(|n| -1000 - n)).collect();
    let started = Instant::now();

    let broadcast = tokio::spawn(async move {
        for chat_id in recipients {
            let call = OutboundCall::new("sendMessage").to_chat(chat_id);
            let waited = bulk_gate.acquire(&call).await?;
            println!(
                "[{:>5} ms] bulk        -> {:>6} (waited {:?})",
                started.elapsed().as_millis(),
                chat_id,
                waited
            );
        }
        Ok::<_, LimiterError>(())
    });

    for chat_id in [10, 11, 12] {
        let call = OutboundCall::new("sendMessage").to_chat(chat_id);
        let waited = interactive_gate.acquire(&call).await?;
        println!(
            "[{:>5} ms] interactive -> {:>6} (waited {:?})",
            started.elapsed().as_millis(),
            chat_id,
            waited
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    match broadcast.await {
        Ok(result) => result,
        Err(join) => {
            eprintln!("broadcast task failed: {join}");
            Ok(())
        }
    }
}
