// tests/config_load.rs
use std::path::Path;

use news_relay::config::{DestinationConfig, RelayConfig};
use serial_test::serial;

const VARS: &[&str] = &[
    "RELAY_CONFIG_PATH",
    "FEISHU_WEBHOOK_URL",
    "FEISHU_WEBHOOK_SECRET",
    "FEISHU_APP_ID",
    "FEISHU_APP_SECRET",
    "FEISHU_CHAT_ID",
    "MAX_PUSH_PER_CYCLE",
    "RELAY_INSTANCE_ID",
];

fn clear_env() {
    for v in VARS {
        std::env::remove_var(v);
    }
}

#[test]
fn shipped_config_parses() {
    let cfg = RelayConfig::from_path(Path::new("config/relay.toml")).unwrap();
    assert!(cfg.feeds.len() >= 3);
    assert!(cfg.feeds.iter().take(3).all(|f| f.priority));
    assert!(cfg.destinations.is_empty());
    assert!(cfg.lease.enabled);
    assert_eq!(cfg.ai.providers[0].name, "deepseek");
}

#[test]
#[serial]
fn load_reads_file_then_env() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.toml");
    std::fs::write(
        &path,
        r#"
        max_per_cycle = 2
        [[feeds]]
        url = "https://a.test/feed"
        "#,
    )
    .unwrap();

    std::env::set_var("RELAY_CONFIG_PATH", &path);
    std::env::set_var("MAX_PUSH_PER_CYCLE", "5");
    std::env::set_var("FEISHU_WEBHOOK_URL", "https://open.feishu.test/hook/abc");
    std::env::set_var("FEISHU_WEBHOOK_SECRET", "s3cret");
    std::env::set_var("RELAY_INSTANCE_ID", "runner-7");

    let cfg = RelayConfig::load().unwrap();
    clear_env();

    assert_eq!(cfg.max_per_cycle, 5);
    assert_eq!(cfg.feeds.len(), 1);
    assert_eq!(cfg.owner_id(), "runner-7");
    assert_eq!(
        cfg.destinations,
        vec![DestinationConfig::Feishu {
            webhook: "https://open.feishu.test/hook/abc".into(),
            secret: Some("s3cret".into()),
        }]
    );
}

#[test]
#[serial]
fn missing_explicit_path_is_an_error() {
    clear_env();
    std::env::set_var("RELAY_CONFIG_PATH", "/nonexistent/relay.toml");
    let res = RelayConfig::load();
    clear_env();
    assert!(res.is_err());
}
