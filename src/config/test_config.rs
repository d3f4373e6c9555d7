use super::{Config, Docker, Logs, SpawnerBox};
use crate::model::WorkloadTemplate;
use std::time::Duration;

/// Creates a new test configuration with fast polling.
pub fn new_test_config() -> Config {
    let mut service = WorkloadTemplate::new("jupyter/base:latest");
    service.networks = vec!["jupyterhub".to_string()];
    service.start_timeout = Duration::from_millis(200);
    service.poll_interval = Duration::from_millis(10);

    Config {
        spawner: SpawnerBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            docker: Some(Docker {
                host: Some("tcp://127.0.0.1:2375".to_string()),
                ..Docker::default()
            }),
            service,
            state: None,
            metrics: None,
        },
    }
}
