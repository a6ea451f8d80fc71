//! # Example: slow_reader
//!
//! Demonstrates how readers of the event buffer behave when one of them falls behind.
//!
//! Shows how to:
//! - Publish committed batches without waiting on readers
//! - Follow the live stream with a [`Subscription`]
//! - Recover a slow reader from a discontinuity by resyncing at the head
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► EventPublisher::new(buffer_size = 8)
//!   ├─► spawn fast reader  (Subscription, reads as soon as a batch lands)
//!   ├─► spawn slow reader  (Subscription, sleeps 50ms per batch)
//!   │     └─► Discontinuity → resync at head → continues with a gap
//!   ├─► publish 40 batches, one every 5ms
//!   └─► cancel token → readers and publisher stop
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example slow_reader
//! ```

use std::time::Duration;

use commitstream::{
    Event, EventPublisher, PublisherConfig, StreamError, SubscribeRequest, Subscription, Topic,
};
use tokio_util::sync::CancellationToken;

async fn follow(
    name: &'static str,
    mut sub: Subscription,
    pause: Duration,
    token: CancellationToken,
) {
    let mut seen = 0u32;
    loop {
        match sub.next(&token).await {
            Ok(batch) => {
                seen += 1;
                println!("[{name}] index={} events={}", batch.index(), batch.len());
                tokio::time::sleep(pause).await;
            }
            Err(StreamError::Discontinuity { index }) => {
                println!("[{name}] lost history after index={index}, resynced");
            }
            Err(err) => {
                println!("[{name}] stopping: {err}");
                break;
            }
        }
    }
    println!("[{name}] saw {seen} batches, resynced {} times", sub.resyncs());
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== slow_reader example ===\n");

    // 1. Configure a small buffer so the slow reader falls out of it
    let token = CancellationToken::new();
    let cfg = PublisherConfig::default().with_buffer_size(8);
    let publisher = EventPublisher::new(cfg, &token)?;

    // 2. Start both readers from the same point
    let fast = tokio::spawn(follow(
        "fast",
        publisher.subscribe(SubscribeRequest::all()),
        Duration::ZERO,
        token.clone(),
    ));
    let slow = tokio::spawn(follow(
        "slow",
        publisher.subscribe(SubscribeRequest::new().topic(Topic::Job, ["*"])),
        Duration::from_millis(50),
        token.clone(),
    ));

    // 3. Publish: the commit path never waits for either reader
    for index in 1..=40u64 {
        publisher.publish(
            index,
            vec![
                Event::new(Topic::Job, format!("job-{index}"), index),
                Event::new(Topic::Allocation, format!("alloc-{index}"), index),
            ],
        )?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // 4. Let the readers drain, then stop everything
    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();
    publisher.shutdown().await;
    fast.await?;
    slow.await?;
    Ok(())
}
