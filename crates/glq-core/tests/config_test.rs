//! Integration test: GlqConfig
//!
//! Defaults, partial TOML files, and the derived context attributes.

use glq_core::config::{GlqConfig, HostLayer, SurfaceMode};

#[test]
fn test_defaults_match_documented_values() {
    let config = GlqConfig::default();
    assert_eq!(config.queue.initial_capacity, 256);
    assert_eq!(config.queue.max_capacity, 1_000_000);
    assert_eq!(config.queue.max_frames_in_flight, 2);
    assert_eq!(config.surface.mode, SurfaceMode::Exclusive);
    assert_eq!(config.surface.layer, HostLayer::Background);
    assert_eq!(config.context.max_samples, 4);
    assert_eq!(config.diagnostics.fps_interval_ms, 500);
    assert!(!config.diagnostics.poll_errors_per_command);
    assert!(!config.context.multiply_alpha());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let config = GlqConfig::from_toml(
        r#"
[queue]
max_capacity = 4

[surface]
mode = "shared"
layer = "foreground"

[context]
premultiplied_alpha = false
"#,
    )
    .expect("parse");

    assert_eq!(config.queue.max_capacity, 4);
    assert_eq!(config.queue.initial_capacity, 256);
    assert_eq!(config.surface.mode, SurfaceMode::Shared);
    assert_eq!(config.surface.layer, HostLayer::Foreground);
    assert_eq!(config.surface.width, 300);
    assert!(config.context.multiply_alpha());
    assert!(config.context.antialias);
}

#[test]
fn test_invalid_file_is_a_config_error() {
    match GlqConfig::from_toml("[surface]\nmode = \"sideways\"\n") {
        Err(glq_core::CoreError::ConfigError(msg)) => assert!(!msg.is_empty()),
        other => panic!("expected ConfigError, got {:?}", other),
    }
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = GlqConfig::load_or_default("/nonexistent/glq.toml");
    assert_eq!(config.queue.initial_capacity, 256);
}

#[test]
fn test_serialized_defaults_parse_back() {
    let text = GlqConfig::default().to_toml().expect("serialize");
    let parsed = GlqConfig::from_toml(&text).expect("parse");
    assert_eq!(parsed.surface.height, 150);
    assert_eq!(parsed.context.max_samples, 4);
}
