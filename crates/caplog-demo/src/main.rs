use caplog_demo::{Cli, DemoConfig, run};
use caplog_logging::{CaplogSubscriberBuilder, LogConfig};
use clap::Parser;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.pretty {
        LogConfig::development()
    } else {
        LogConfig::default()
    };
    log_config.default_level = cli.log_level.clone();
    let _guard = CaplogSubscriberBuilder::new()
        .with_config(log_config)
        .try_init()?;

    let summary = run(DemoConfig::from(&cli)).await?;
    if summary.lost > 0 {
        warn!(lost = summary.lost, "Some messages were not delivered");
    }
    println!("{summary}");

    Ok(())
}
