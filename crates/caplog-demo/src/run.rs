//! One demo run: publishers, per-event subscribers and a delivery tally

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use caplog_channel::{Channel, ChannelEvent, Client, TailState};
use caplog_store::{Connection, MemoryLogStore};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, instrument, warn};

use crate::config::DemoConfig;

/// Payload published by the demo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub publisher: usize,
    pub seq: u64,
    pub nonce: u32,
}

/// Event name used by a publisher
pub fn publisher_event(publisher: usize) -> String {
    format!("publisher-{publisher}")
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventTally {
    pub delivered: u64,
    pub out_of_order: u64,
    last_seq: Option<u64>,
}

#[derive(Default)]
struct Tally {
    delivered: AtomicU64,
    malformed: AtomicU64,
    per_event: Mutex<BTreeMap<String, EventTally>>,
}

impl Tally {
    fn record(&self, event: &str, message: &serde_json::Value) {
        let tick: Tick = match serde_json::from_value(message.clone()) {
            Ok(tick) => tick,
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(event, error = %err, "Malformed payload");
                return;
            }
        };

        let mut per_event = self.per_event.lock();
        let tally = per_event.entry(event.to_string()).or_default();
        if tally.last_seq.is_some_and(|last| tick.seq <= last) {
            tally.out_of_order += 1;
        }
        tally.last_seq = Some(tick.seq);
        tally.delivered += 1;
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct EventCounters {
    ready: u64,
    broken_cursors: u64,
    errors: u64,
}

impl EventCounters {
    /// Count every notification buffered so far
    fn drain(&mut self, events: &mut broadcast::Receiver<ChannelEvent>) {
        loop {
            match events.try_recv() {
                Ok(ChannelEvent::Ready { anchor }) => {
                    self.ready += 1;
                    debug!(%anchor, "Tail ready");
                }
                Ok(ChannelEvent::Error(err)) if err.is_broken_cursor() => {
                    self.broken_cursors += 1;
                }
                Ok(ChannelEvent::Error(err)) => {
                    self.errors += 1;
                    warn!(error = %err, "Channel error");
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notifications dropped before they were counted");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// Outcome of a demo run
#[derive(Debug, Clone)]
pub struct Summary {
    pub channel: String,
    pub published: u64,
    pub delivered: u64,
    pub lost: u64,
    pub out_of_order: u64,
    pub malformed: u64,
    pub ready: u64,
    pub broken_cursors: u64,
    pub errors: u64,
    pub retained: usize,
    pub final_state: TailState,
    pub per_event: BTreeMap<String, EventTally>,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "channel        {}", self.channel)?;
        writeln!(f, "published      {}", self.published)?;
        writeln!(f, "delivered      {}", self.delivered)?;
        writeln!(f, "lost           {}", self.lost)?;
        writeln!(f, "out of order   {}", self.out_of_order)?;
        writeln!(f, "ready events   {}", self.ready)?;
        writeln!(f, "broken cursors {}", self.broken_cursors)?;
        writeln!(f, "other errors   {}", self.errors)?;
        writeln!(f, "retained       {}", self.retained)?;
        writeln!(f, "final state    {}", self.final_state)?;
        for (event, tally) in &self.per_event {
            writeln!(f, "  {event:<14} {} delivered", tally.delivered)?;
        }
        write!(f, "elapsed        {:?}", self.elapsed)
    }
}

/// Run publishers and subscribers against a fresh in-memory store
#[instrument(skip_all, fields(channel = %config.channel))]
pub async fn run(config: DemoConfig) -> anyhow::Result<Summary> {
    let started = Instant::now();
    let store = Arc::new(MemoryLogStore::new());
    let client = Client::new(Connection::ready(store.clone()));
    let channel = client.channel_with_options(&config.channel, config.channel_options());

    let mut events = channel.events();

    let tally = Arc::new(Tally::default());
    for publisher in 0..config.publishers {
        let event = publisher_event(publisher);
        let tally = tally.clone();
        let name = event.clone();
        channel.subscribe(Some(&event), move |message| tally.record(&name, message));
    }
    channel
        .wait_until_listening()
        .await
        .context("channel did not start listening")?;

    let published = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::with_capacity(config.publishers);
    for publisher in 0..config.publishers {
        handles.push(tokio::spawn(publish_all(
            publisher,
            channel.clone(),
            store.clone(),
            published.clone(),
            config.clone(),
        )));
    }
    for handle in handles {
        handle.await.context("publisher task failed")??;
    }

    let published = published.load(Ordering::Relaxed);
    let deadline = Instant::now() + config.settle + config.retry_interval;
    while tally.delivered() < published && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let final_state = channel.state();
    client.close();

    let mut counters = EventCounters::default();
    counters.drain(&mut events);

    let per_event = tally.per_event.lock().clone();
    let delivered = tally.delivered();
    let summary = Summary {
        channel: config.channel.clone(),
        published,
        delivered,
        lost: published.saturating_sub(delivered),
        out_of_order: per_event.values().map(|t| t.out_of_order).sum(),
        malformed: tally.malformed.load(Ordering::Relaxed),
        ready: counters.ready,
        broken_cursors: counters.broken_cursors,
        errors: counters.errors,
        retained: store.log(&config.channel).map(|log| log.len()).unwrap_or(0),
        final_state,
        per_event,
        elapsed: started.elapsed(),
    };

    info!(
        published = summary.published,
        delivered = summary.delivered,
        broken_cursors = summary.broken_cursors,
        "Demo finished"
    );
    Ok(summary)
}

async fn publish_all(
    publisher: usize,
    channel: Channel,
    store: Arc<MemoryLogStore>,
    published: Arc<AtomicU64>,
    config: DemoConfig,
) -> anyhow::Result<()> {
    let event = publisher_event(publisher);
    let max_pause = config.jitter.as_millis() as u64;

    for seq in 0..config.messages {
        let tick = Tick {
            publisher,
            seq,
            nonce: rand::random(),
        };
        channel
            .publish(&event, &tick)
            .await
            .with_context(|| format!("{event} failed to publish #{seq}"))?;

        let total = published.fetch_add(1, Ordering::Relaxed) + 1;
        if config.break_every > 0 && total % config.break_every == 0 {
            debug!(total, "Breaking open cursors");
            store.terminate_cursors(&config.channel);
        }

        if max_pause > 0 {
            let pause = rand::rng().random_range(0..=max_pause);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
    }
    Ok(())
}
