use std::collections::HashMap;
use std::env::VarError;
use std::io::Write;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

const FULL_YAML: &str = r#"
general:
  max_workers: 8
  request_timeout_secs: 3
  log_dir: /var/log/harvester
kafka:
  host: kafka.internal
  port: 29092
rss_header:
  accept: text/html
  user-agent: harvester-test
reddit:
  client_id: reddit-id
  client_secret: reddit-secret
  subreddits: [rust, programming]
twitter:
  bearer_token: bearer
  trend_refresh_secs: 900
  stream_retry:
    max_retries: 3
database:
  max_connections: 2
"#;

#[test]
fn empty_file_yields_defaults() {
    let map = HashMap::new();
    let cfg = build_app_config("", lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.general.max_workers, 20);
    assert_eq!(cfg.general.request_timeout_secs, 5);
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.kafka.bootstrap_servers(), "localhost:9092");
    assert_eq!(cfg.reddit.user_agent, "oth-datapipeline");
    assert_eq!(cfg.reddit.subreddits.len(), 8);
    assert_eq!(cfg.twitter.trend_woeid, 1);
    assert_eq!(cfg.twitter.trend_refresh_secs, 30);
    assert_eq!(cfg.twitter.stream_retry.max_retries, 0);
    assert!(cfg.database.url.is_none());
    assert_eq!(cfg.database.max_connections, 5);
    assert_eq!(cfg.database.acquire_timeout_secs, 10);
    assert!(cfg.rss_header.is_empty());
}

#[test]
fn yaml_values_are_read() {
    let map = HashMap::new();
    let cfg = build_app_config(FULL_YAML, lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.general.max_workers, 8);
    assert_eq!(cfg.general.request_timeout_secs, 3);
    assert_eq!(cfg.kafka.bootstrap_servers(), "kafka.internal:29092");
    assert_eq!(cfg.rss_header.get("user-agent").map(String::as_str), Some("harvester-test"));
    assert_eq!(cfg.reddit.credentials().unwrap(), ("reddit-id", "reddit-secret"));
    assert_eq!(cfg.reddit.subreddits, vec!["rust", "programming"]);
    assert_eq!(cfg.twitter.trend_refresh_secs, 900);
    assert_eq!(cfg.twitter.stream_retry.max_retries, 3);
    assert_eq!(cfg.twitter.stream_retry.backoff_base_secs, 5);
    assert_eq!(cfg.twitter.bearer_token.as_deref(), Some("bearer"));
    assert_eq!(cfg.database.max_connections, 2);
    assert_eq!(cfg.database.acquire_timeout_secs, 10);
}

#[test]
fn env_overrides_take_precedence() {
    let mut map = HashMap::new();
    map.insert("HARVESTER_KAFKA_HOST", "broker");
    map.insert("HARVESTER_KAFKA_PORT", "9093");
    map.insert("HARVESTER_MAX_WORKERS", "2");
    map.insert("REDDIT_CLIENT_SECRET", "from-env");
    map.insert("DATABASE_URL", "postgres://localhost/harvester");
    let cfg = build_app_config(FULL_YAML, lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.kafka.bootstrap_servers(), "broker:9093");
    assert_eq!(cfg.general.max_workers, 2);
    assert_eq!(cfg.reddit.client_secret.as_deref(), Some("from-env"));
    assert_eq!(
        cfg.database.url.as_deref(),
        Some("postgres://localhost/harvester")
    );
}

#[test]
fn empty_secret_override_is_ignored() {
    let mut map = HashMap::new();
    map.insert("TWITTER_BEARER_TOKEN", "");
    let cfg = build_app_config(FULL_YAML, lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.twitter.bearer_token.as_deref(), Some("bearer"));
}

#[test]
fn invalid_port_override_fails() {
    let mut map = HashMap::new();
    map.insert("HARVESTER_KAFKA_PORT", "not-a-port");
    let result = build_app_config("", lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HARVESTER_KAFKA_PORT"),
        "expected InvalidEnvVar(HARVESTER_KAFKA_PORT), got: {result:?}"
    );
}

#[test]
fn invalid_max_workers_override_fails() {
    let mut map = HashMap::new();
    map.insert("HARVESTER_MAX_WORKERS", "-1");
    let result = build_app_config("", lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "HARVESTER_MAX_WORKERS"),
        "expected InvalidEnvVar(HARVESTER_MAX_WORKERS), got: {result:?}"
    );
}

#[test]
fn empty_database_pool_is_rejected() {
    let map = HashMap::new();
    let result = build_app_config("database:\n  max_connections: 0\n", lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "database.max_connections"),
        "expected Invalid(database.max_connections), got: {result:?}"
    );
}

#[test]
fn zero_max_workers_is_rejected() {
    let map = HashMap::new();
    let result = build_app_config("general:\n  max_workers: 0\n", lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "general.max_workers"),
        "expected Invalid(general.max_workers), got: {result:?}"
    );
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let map = HashMap::new();
    let result = build_app_config("general: [unterminated", lookup_from_map(&map));
    assert!(matches!(result, Err(ConfigError::FileParse(_))));
}

#[test]
fn missing_reddit_credentials_are_reported() {
    let map = HashMap::new();
    let cfg = build_app_config("", lookup_from_map(&map)).unwrap();
    let err = cfg.reddit.credentials().unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential("reddit.client_id")));
}

#[test]
fn debug_output_redacts_secrets() {
    let map = HashMap::new();
    let cfg = build_app_config(FULL_YAML, lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("reddit-secret"));
    assert!(!rendered.contains("bearer\""));
    assert!(rendered.contains("[redacted]"));
}

#[test]
fn load_app_config_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"kafka:\n  port: 19092\n").unwrap();
    let cfg = load_app_config(file.path()).unwrap();
    assert_eq!(cfg.kafka.port, 19092);
}

#[test]
fn load_app_config_missing_file_is_io_error() {
    let result = load_app_config(Path::new("/nonexistent/harvester.yaml"));
    assert!(matches!(result, Err(ConfigError::FileIo { .. })));
}
