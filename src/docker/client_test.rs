//! Tests for daemon address parsing and bollard error classification.

use bollard::errors::Error as BollardError;
use std::time::Duration;

use super::client::{map_error, parse_api_version, DockerHost};
use super::{DockerClient, Orchestrator, OrchestratorError};
use crate::config::{Docker as DockerConfig, TlsFiles};

fn server_error(status_code: u16, message: &str) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message: message.to_string(),
    }
}

#[test]
fn test_parse_unix_host() {
    assert_eq!(
        DockerHost::parse("unix:///var/run/docker.sock", false).unwrap(),
        DockerHost::Unix("unix:///var/run/docker.sock".to_string())
    );
    assert!(DockerHost::parse("unix://", false).is_err());
}

#[test]
fn test_parse_tcp_host_follows_tls() {
    assert_eq!(
        DockerHost::parse("tcp://10.0.0.1:2375", false).unwrap(),
        DockerHost::Http("tcp://10.0.0.1:2375".to_string())
    );
    assert_eq!(
        DockerHost::parse("tcp://10.0.0.1:2376/", true).unwrap(),
        DockerHost::Tls("tcp://10.0.0.1:2376".to_string())
    );
    assert_eq!(
        DockerHost::parse("https://swarm:2376", true).unwrap(),
        DockerHost::Tls("tcp://swarm:2376".to_string())
    );
}

#[test]
fn test_parse_rejects_https_without_certs_and_garbage() {
    assert!(DockerHost::parse("https://swarm:2376", false).is_err());
    assert!(DockerHost::parse("ssh://swarm", false).is_err());
}

#[test]
fn test_parse_api_version() {
    let v = parse_api_version("v1.41").unwrap();
    assert_eq!((v.major_version, v.minor_version), (1, 41));
    let v = parse_api_version("/1.43/").unwrap();
    assert_eq!((v.major_version, v.minor_version), (1, 43));
    assert!(parse_api_version("latest").is_err());
    assert!(parse_api_version("v1").is_err());
}

#[test]
fn test_status_codes_are_classified() {
    assert!(map_error(server_error(404, "service jupyter-abc not found")).is_not_found());
    assert!(map_error(server_error(409, "name conflicts with an existing object")).is_conflict());
    // Older daemons answer a duplicate name with a 500.
    assert!(map_error(server_error(500, "rpc error: name conflicts with an existing object")).is_conflict());

    let err = map_error(server_error(503, "swarm has no leader"));
    assert_eq!(
        err,
        OrchestratorError::Api {
            status: 503,
            message: "swarm has no leader".to_string()
        }
    );
    assert!(err.is_transient());

    let err = map_error(server_error(400, "invalid mount config"));
    assert!(!err.is_transient());
}

#[test]
fn test_timeout_is_transient() {
    let err = map_error(BollardError::RequestTimeoutError);
    assert!(matches!(err, OrchestratorError::Transient(_)));
}

#[test]
fn test_client_requires_certs_for_tls_hosts() {
    let cfg = DockerConfig {
        host: Some("https://swarm:2376".to_string()),
        ..Default::default()
    };
    assert!(DockerClient::new(&cfg).is_err());

    let cfg = DockerConfig {
        host: Some("tcp://swarm:2376".to_string()),
        tls: Some(TlsFiles {
            ca: "/nonexistent/ca.pem".into(),
            cert: "/nonexistent/cert.pem".into(),
            key: "/nonexistent/key.pem".into(),
        }),
        ..Default::default()
    };
    assert!(DockerClient::new(&cfg).is_err());
}

#[tokio::test]
async fn test_unreachable_daemon_is_transient() {
    // Bind and drop to get a port nobody listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let cfg = DockerConfig {
        host: Some(format!("tcp://127.0.0.1:{port}")),
        timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let client = DockerClient::new(&cfg).unwrap();

    let err = client.list_tasks("jupyter-abc-1").await.unwrap_err();
    assert!(err.is_transient(), "unexpected error {err:?}");
    let err = client.remove_service("jupyter-abc-1").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Transient(_)));
}
