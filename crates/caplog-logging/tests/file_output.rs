//! File output written through a locally scoped subscriber

use caplog_logging::{CaplogSubscriberBuilder, FileConfig, LogConfig, RotationStrategy};
use serde_json::Value;

#[test]
fn test_json_lines_written_to_file() {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        default_level: "info".to_string(),
        file: Some(FileConfig {
            directory: dir.path().to_path_buf(),
            prefix: "test".to_string(),
            rotation: RotationStrategy::Never,
            max_files: None,
        }),
        ..LogConfig::default()
    };

    let (subscriber, guard) = CaplogSubscriberBuilder::new()
        .with_config(config)
        .with_console(false)
        .build()
        .unwrap();

    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("filtered out");
        tracing::info!(channel = "greetings", "Channel listening");
    });
    // Flushes the background writer
    drop(guard);

    let contents = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
    let lines: Vec<Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["message"], "Channel listening");
    assert_eq!(lines[0]["channel"], "greetings");
    assert_eq!(lines[0]["level"], "INFO");
}

#[test]
fn test_rotating_file_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested").join("logs");

    let (_subscriber, guard) = CaplogSubscriberBuilder::new()
        .with_console(false)
        .with_file_output(FileConfig {
            directory: nested.clone(),
            prefix: "caplog".to_string(),
            rotation: RotationStrategy::Hourly,
            max_files: Some(2),
        })
        .build()
        .unwrap();

    assert!(guard.is_some());
    assert!(nested.is_dir());
}
