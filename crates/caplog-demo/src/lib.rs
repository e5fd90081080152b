//! Demo harness for caplog channels
//!
//! Spawns several publishers on one channel, subscribes to each publisher's
//! event and reports how many messages arrived, optionally breaking the tail
//! cursor periodically to exercise recovery.

pub mod config;
pub mod run;

pub use config::{Cli, DemoConfig};
pub use run::{EventTally, Summary, Tick, publisher_event, run};
