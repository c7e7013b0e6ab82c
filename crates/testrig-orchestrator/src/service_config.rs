//! Configuration document handed to the service under test.

use crate::config::duration_serde;
use crate::config::{AlertThresholds, DependentServiceConfig, MonitorSettings, ServiceUnderTestConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use testrig_common::{Error, Result};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfigDocument {
    pub etcd: DependentEndpoints,
    pub monitor: MonitorSettings,
    pub api: ApiBinding,
    pub alerts: AlertThresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentEndpoints {
    pub endpoints: Vec<String>,
    #[serde(with = "duration_serde")]
    pub dial_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiBinding {
    pub host: String,
    pub port: u16,
}

impl ServiceConfigDocument {
    /// Endpoints come from the dependent service when one is managed,
    /// otherwise its conventional local address is assumed.
    pub fn build(service: &ServiceUnderTestConfig, dependent: Option<&DependentServiceConfig>) -> Self {
        let endpoint = dependent
            .map(|d| d.client_endpoint())
            .unwrap_or_else(|| "localhost:2379".to_string());
        Self {
            etcd: DependentEndpoints {
                endpoints: vec![endpoint],
                dial_timeout: service.dial_timeout,
            },
            monitor: service.monitor.clone(),
            api: ApiBinding {
                host: service.api_host.clone(),
                port: service.api_port,
            },
            alerts: service.alerts.clone(),
        }
    }

    /// Write the document as YAML (atomic write).
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize service config: {}", e)))?;

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, yaml).await?;
        tokio::fs::rename(&temp_path, path).await?;

        info!("Service configuration written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_written_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/monitor.yaml");

        let dependent = DependentServiceConfig {
            client_url: "http://127.0.0.1:23790".to_string(),
            ..Default::default()
        };
        let doc = ServiceConfigDocument::build(&ServiceUnderTestConfig::default(), Some(&dependent));
        doc.write(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(value["etcd"]["endpoints"][0].as_str(), Some("127.0.0.1:23790"));
        assert_eq!(value["etcd"]["dial_timeout"].as_str(), Some("5s"));
        assert_eq!(value["monitor"]["health_check_interval"].as_str(), Some("30s"));
        assert_eq!(value["monitor"]["metrics_interval"].as_str(), Some("10s"));
        assert_eq!(value["api"]["port"].as_u64(), Some(8080));
        assert_eq!(value["alerts"]["max_database_size_mb"].as_u64(), Some(8192));
        assert_eq!(value["alerts"]["min_available_nodes"].as_u64(), Some(2));

        let parsed: ServiceConfigDocument = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_default_endpoint_without_dependent() {
        let doc = ServiceConfigDocument::build(&ServiceUnderTestConfig::default(), None);
        assert_eq!(doc.etcd.endpoints, vec!["localhost:2379".to_string()]);
    }
}
