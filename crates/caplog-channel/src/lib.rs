//! # Caplog Channel
//!
//! Publish/subscribe messaging over a capped, append-only log.
//!
//! A [`Channel`] appends published entries to a bounded log and runs a tail
//! loop that follows the log with an awaiting cursor, handing each new entry
//! to the listeners registered for its event name. Delivery is best effort:
//! the log's own eviction can drop entries, and a broken cursor is recreated
//! from the last delivered entry (possibly skipping entries that were evicted
//! in the meantime).
//!
//! ## Features
//!
//! - Lazy, single-flight provisioning of the capped log
//! - Tail loop with broken-cursor detection and automatic recovery
//! - Ordered per-event listeners plus generic `"message"` and `"document"` events
//! - Listener isolation: a panicking listener never stops delivery
//! - Notifications for readiness and background errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use caplog_channel::{ChannelOptions, Client};
//! use caplog_store::{Connection, MemoryLogStore};
//! use serde_json::json;
//!
//! let client = Client::new(Connection::ready(Arc::new(MemoryLogStore::new())));
//! let channel = client.channel("jobs");
//!
//! let sub = channel.subscribe(Some("greet"), |message| {
//!     println!("greeting for {}", message["who"]);
//! });
//! channel.wait_until_listening().await?;
//!
//! channel.publish("greet", json!({"who": "world"})).await?;
//!
//! sub.unsubscribe();
//! client.close();
//! ```

pub mod bootstrap;
pub mod channel;
pub mod client;
pub mod collection;
pub mod error;
pub mod events;
pub mod options;
pub mod registry;
mod tail;

// Re-exports
pub use channel::Channel;
pub use client::Client;
pub use collection::CollectionManager;
pub use error::{ChannelError, ChannelResult};
pub use events::{ChannelEvent, DOCUMENT_EVENT, MESSAGE_EVENT, TailState};
pub use options::{ChannelOptions, DEFAULT_CHANNEL_NAME};
pub use registry::{Listener, SubscriberRegistry, Subscription};
