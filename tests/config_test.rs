//! Configuration loading tests
//!
//! Files are written to temp dirs; env-dependent cases run serially.

use direct_uploadr::config::{Config, ConfigError, ConfigLoader};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
server:
  address: "127.0.0.1:8080"
  base_path: "/api"

storage:
  bucket: "wedding-media"
  region: "us-east-1"
  endpoint: "http://localhost:9000"
  access_key: "${DU_TEST_ACCESS_KEY}"
  secret_key: "${DU_TEST_SECRET_KEY:-minioadmin}"
  force_path_style: true
  public_base_url: "https://cdn.example.com"

auth:
  enabled: true
  jwt:
    secret: "${DU_TEST_JWT_SECRET:-dev-secret}"
    algorithm: "HS256"
    issuer: "https://auth.example.com"

upload:
  namespace: "wedding"
  default_ttl_seconds: 900
  size_tolerance_bytes: 512
  verify_object: true
  file_types:
    image:
      max_size: 10485760
      allowed_types: ["image/jpeg", "image/png"]

metrics:
  enabled: false
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_full_config_with_env_expansion() {
    std::env::set_var("DU_TEST_ACCESS_KEY", "from-env");
    std::env::remove_var("DU_TEST_SECRET_KEY");
    std::env::remove_var("DU_TEST_JWT_SECRET");

    let file = write_config(FULL_CONFIG);
    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.server.base_path, "/api");
    assert_eq!(config.storage.access_key.as_deref(), Some("from-env"));
    assert_eq!(config.storage.secret_key.as_deref(), Some("minioadmin"));
    assert!(config.storage.force_path_style);

    let jwt = config.auth.jwt.unwrap();
    assert_eq!(jwt.secret.as_deref(), Some("dev-secret"));
    assert_eq!(jwt.issuer.as_deref(), Some("https://auth.example.com"));

    assert_eq!(config.upload.namespace, "wedding");
    assert_eq!(config.upload.default_ttl_seconds, 900);
    assert_eq!(config.upload.min_ttl_seconds, 60);
    assert_eq!(config.upload.size_tolerance_bytes, 512);
    assert!(config.upload.verify_object);
    assert_eq!(config.upload.file_types.image.max_size, 10485760);
    // unspecified types keep their defaults
    assert_eq!(config.upload.file_types.video.max_size, 524288000);
    assert!(!config.metrics.enabled);

    std::env::remove_var("DU_TEST_ACCESS_KEY");
}

#[test]
#[serial]
fn test_minimal_config_uses_defaults() {
    let config = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
"#,
    )
    .unwrap();

    assert_eq!(config.server.base_path, "");
    assert!(!config.auth.enabled);
    assert_eq!(config.upload.default_ttl_seconds, 3600);
    assert_eq!(config.upload.max_ttl_seconds, 7200);
    assert_eq!(config.upload.size_tolerance_bytes, 0);
    assert!(!config.upload.verify_object);
    assert_eq!(config.storage.timeout_seconds, 30);
    assert!(config.metrics.enabled);
}

#[test]
fn test_missing_file_is_io_error() {
    let result = Config::load("/nonexistent/direct-uploadr.yaml");
    assert!(matches!(result, Err(ConfigError::IoError(_))));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let file = write_config("server: [unterminated");
    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_inverted_ttl_bounds_fail_validation() {
    let result = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
upload:
  min_ttl_seconds: 600
  max_ttl_seconds: 60
"#,
    );
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_auth_without_secret_fails_validation() {
    let result = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
auth:
  enabled: true
  jwt:
    algorithm: "HS256"
"#,
    );
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
#[serial]
fn test_unset_jwt_secret_placeholder_fails_validation() {
    std::env::remove_var("DU_TEST_UNSET_JWT_SECRET");

    let result = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
auth:
  enabled: true
  jwt:
    secret: "${DU_TEST_UNSET_JWT_SECRET}"
    algorithm: "HS256"
"#,
    );
    match result {
        Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("auth.jwt.secret")),
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
#[serial]
fn test_unset_storage_key_placeholder_fails_validation() {
    std::env::remove_var("DU_TEST_UNSET_SECRET_KEY");

    let result = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
  access_key: "minioadmin"
  secret_key: "${DU_TEST_UNSET_SECRET_KEY}"
"#,
    );
    match result {
        Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("storage.secret_key")),
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_retention_above_bound_fails_validation() {
    let result = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
upload:
  retention_seconds: 10000000000000
"#,
    );
    match result {
        Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("retention_seconds")),
        other => panic!("expected validation error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_retention_at_bound_is_accepted() {
    let result = ConfigLoader::from_yaml(
        r#"
server:
  address: "0.0.0.0:8080"
storage:
  bucket: "uploads"
  region: "eu-west-1"
upload:
  retention_seconds: 2592000
"#,
    );
    assert_eq!(result.unwrap().upload.retention_seconds, 2_592_000);
}
