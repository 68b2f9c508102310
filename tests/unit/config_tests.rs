//! Unit tests for configuration parsing and validation.

use notebook_mcp::config::GlobalConfig;
use notebook_mcp::AppError;

#[test]
fn empty_toml_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");
    assert_eq!(config.server_url, "http://localhost:8888");
    assert_eq!(config.timeouts.execute_seconds, 300);
    assert_eq!(config.timeouts.attach_seconds, 30);
    assert!(config.remediation.enabled);
    assert_eq!(config.remediation.install_command, "!uv pip install");
    assert!(config.token.is_empty());
}

#[test]
fn full_toml_parses() {
    let toml = r#"
server_url = "https://hub.example.org:8443"

[timeouts]
execute_seconds = 60
attach_seconds = 5

[remediation]
enabled = false
install_command = "!pip install"
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("valid config");
    assert_eq!(config.server_url, "https://hub.example.org:8443");
    assert_eq!(config.timeouts.execute_seconds, 60);
    assert_eq!(config.timeouts.attach_seconds, 5);
    assert!(!config.remediation.enabled);
    assert_eq!(config.remediation.install_command, "!pip install");
}

#[test]
fn token_is_never_read_from_toml() {
    let config = GlobalConfig::from_toml_str(r#"server_url = "http://x:1""#).expect("valid");
    assert!(config.token.is_empty());
}

#[test]
fn non_http_server_url_rejected() {
    let err = GlobalConfig::from_toml_str(r#"server_url = "ftp://x""#).expect_err("rejected");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn empty_server_url_rejected() {
    let err = GlobalConfig::from_toml_str(r#"server_url = """#).expect_err("rejected");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn zero_execute_timeout_rejected() {
    let toml = "[timeouts]\nexecute_seconds = 0\n";
    let err = GlobalConfig::from_toml_str(toml).expect_err("rejected");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn blank_install_command_rejected() {
    let toml = "[remediation]\ninstall_command = \"  \"\n";
    let err = GlobalConfig::from_toml_str(toml).expect_err("rejected");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "server_url = \"http://localhost:9999\"\n").expect("write");
    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.server_url, "http://localhost:9999");
}

#[test]
fn missing_config_file_is_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/config.toml").expect_err("rejected");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn malformed_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("server_url = [").expect_err("rejected");
    assert!(matches!(err, AppError::Config(_)));
}
