use std::time::Duration;

use caplog_channel::{ChannelOptions, DEFAULT_CHANNEL_NAME};
use caplog_store::DEFAULT_SIZE_BYTES;
use clap::Parser;

/// Settings for one demo run
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub channel: String,
    pub publishers: usize,
    pub messages: u64,
    pub size_bytes: u64,
    pub max_count: Option<u64>,
    pub retry_interval: Duration,
    pub recreate_on_break: bool,
    /// Terminate open cursors after every N published messages; 0 disables
    pub break_every: u64,
    /// Upper bound of the random pause between two publishes
    pub jitter: Duration,
    /// How long to wait for stragglers once publishing is done
    pub settle: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL_NAME.into(),
            publishers: 2,
            messages: 100,
            size_bytes: DEFAULT_SIZE_BYTES,
            max_count: None,
            retry_interval: Duration::from_millis(200),
            recreate_on_break: true,
            break_every: 0,
            jitter: Duration::ZERO,
            settle: Duration::from_secs(2),
        }
    }
}

impl DemoConfig {
    pub fn channel_options(&self) -> ChannelOptions {
        let mut options = ChannelOptions::default()
            .with_size_bytes(self.size_bytes)
            .with_retry_interval(self.retry_interval)
            .with_recreate_on_break(self.recreate_on_break);
        if let Some(max_count) = self.max_count {
            options = options.with_max_count(max_count);
        }
        options
    }
}

#[derive(Parser, Debug)]
#[command(name = "caplog-demo", about = "Publish/subscribe over an in-memory capped log")]
pub struct Cli {
    /// Channel (log) name
    #[arg(long, default_value = DEFAULT_CHANNEL_NAME)]
    pub channel: String,
    /// Number of concurrent publishers, one event name each
    #[arg(long, default_value_t = 2)]
    pub publishers: usize,
    /// Messages per publisher
    #[arg(long, default_value_t = 100)]
    pub messages: u64,
    /// Byte cap of the log
    #[arg(long, default_value_t = DEFAULT_SIZE_BYTES)]
    pub size_bytes: u64,
    /// Entry count cap of the log
    #[arg(long)]
    pub max_count: Option<u64>,
    /// Retry interval in milliseconds
    #[arg(long, default_value_t = 200)]
    pub retry_ms: u64,
    /// Stop listening instead of recovering when the cursor breaks
    #[arg(long)]
    pub no_recreate: bool,
    /// Break open cursors every N messages (0 = never)
    #[arg(long, default_value_t = 0)]
    pub break_every: u64,
    /// Maximum random pause between publishes in milliseconds
    #[arg(long, default_value_t = 0)]
    pub jitter_ms: u64,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
    /// Human-readable logs instead of JSON lines
    #[arg(long)]
    pub pretty: bool,
}

impl From<&Cli> for DemoConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            channel: cli.channel.clone(),
            publishers: cli.publishers,
            messages: cli.messages,
            size_bytes: cli.size_bytes,
            max_count: cli.max_count,
            retry_interval: Duration::from_millis(cli.retry_ms),
            recreate_on_break: !cli.no_recreate,
            break_every: cli.break_every,
            jitter: Duration::from_millis(cli.jitter_ms),
            ..DemoConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["caplog-demo"]);
        let config = DemoConfig::from(&cli);
        assert_eq!(config.channel, "default");
        assert_eq!(config.publishers, 2);
        assert!(config.recreate_on_break);
        assert_eq!(config.channel_options().max_count, None);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "caplog-demo",
            "--channel",
            "jobs",
            "--max-count",
            "50",
            "--retry-ms",
            "25",
            "--break-every",
            "10",
            "--no-recreate",
            "--pretty",
        ]);
        let config = DemoConfig::from(&cli);
        let options = config.channel_options();

        assert_eq!(config.channel, "jobs");
        assert_eq!(config.break_every, 10);
        assert!(cli.pretty);
        assert_eq!(options.max_count, Some(50));
        assert_eq!(options.retry_interval, Duration::from_millis(25));
        assert!(!options.recreate_on_break);
    }
}
