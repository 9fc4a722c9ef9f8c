//! Request and response shapes of the control-plane RPCs.
//!
//! Field names are the wire contract and serialise in camelCase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::{proxy::ProxySpec, resources::NetworkMode};
use crate::status::{AllocationSummary, StatusReport};

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployRequest {
    /// Used as the job id.
    pub name: String,
    pub image: String,
    pub replicas: u32,
    /// Fractional cores.
    pub cpu: f64,
    /// Megabytes.
    pub memory: u64,
    /// Empty means the orchestrator default region.
    pub region: String,
    pub network_mode: NetworkMode,
    /// Exposed to the task as environment variables.
    pub labels: BTreeMap<String, String>,
    #[serde(alias = "traefik", skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    pub enable: bool,
    pub host: String,
    pub entrypoint: String,
    pub enable_ssl: bool,
    pub ssl_host: String,
    pub cert_resolver: String,
    pub health_check_path: String,
    pub health_check_interval: String,
    pub path_prefix: String,
    pub middlewares: Vec<String>,
    pub custom_labels: BTreeMap<String, String>,
}

impl From<ProxyConfig> for ProxySpec {
    fn from(config: ProxyConfig) -> Self {
        ProxySpec {
            enable: config.enable,
            host: config.host,
            entrypoint: non_empty(config.entrypoint),
            enable_ssl: config.enable_ssl,
            ssl_host: non_empty(config.ssl_host),
            cert_resolver: non_empty(config.cert_resolver),
            health_check_path: non_empty(config.health_check_path),
            health_check_interval: non_empty(config.health_check_interval),
            path_prefix: non_empty(config.path_prefix),
            middlewares: config.middlewares,
            custom_labels: config.custom_labels,
        }
    }
}

impl From<ProxySpec> for ProxyConfig {
    fn from(spec: ProxySpec) -> Self {
        ProxyConfig {
            enable: spec.enable,
            host: spec.host,
            entrypoint: spec.entrypoint.unwrap_or_default(),
            enable_ssl: spec.enable_ssl,
            ssl_host: spec.ssl_host.unwrap_or_default(),
            cert_resolver: spec.cert_resolver.unwrap_or_default(),
            health_check_path: spec.health_check_path.unwrap_or_default(),
            health_check_interval: spec.health_check_interval.unwrap_or_default(),
            path_prefix: spec.path_prefix.unwrap_or_default(),
            middlewares: spec.middlewares,
            custom_labels: spec.custom_labels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployStatus {
    Submitted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    /// Evaluation id on success, empty on failure.
    #[serde(default)]
    pub deployment_id: String,
    pub status: DeployStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteRequest {
    pub deployment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusRequest {
    pub deployment_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusResponse {
    pub deployment_id: String,
    pub job_status: String,
    pub job_type: String,
    pub desired_instances: u32,
    pub running_instances: u32,
    pub allocations: Vec<AllocationStatus>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AllocationStatus {
    pub allocation_id: String,
    pub node_id: String,
    pub node_name: String,
    /// Client status.
    pub status: String,
    pub desired_status: String,
    pub create_time: i64,
    pub modify_time: i64,
    pub task_states: BTreeMap<String, String>,
}

impl From<AllocationSummary> for AllocationStatus {
    fn from(alloc: AllocationSummary) -> Self {
        Self {
            allocation_id: alloc.allocation_id,
            node_id: alloc.node_id,
            node_name: alloc.node_name,
            status: alloc.client_status.to_string(),
            desired_status: alloc.desired_status.to_string(),
            create_time: alloc.create_time,
            modify_time: alloc.modify_time,
            task_states: alloc.task_states,
        }
    }
}

impl StatusResponse {
    pub fn from_report(report: StatusReport, message: impl Into<String>) -> Self {
        Self {
            deployment_id: report.deployment_id,
            job_status: report.job_status.to_string(),
            job_type: report.job_type.to_string(),
            desired_instances: report.desired_instances,
            running_instances: report.running_instances,
            allocations: report.allocations.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// A report that carries only the failure message.
    pub fn failed(deployment_id: &str, message: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.to_string(),
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRequest {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Serving,
    NotServing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    #[serde(default)]
    pub message: String,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::resources::Network;

    #[test]
    fn test_deploy_request_wire_names() {
        let raw = r#"{
            "name": "web",
            "image": "nginx:latest",
            "replicas": 2,
            "cpu": 0.5,
            "memory": 512,
            "networkMode": "NETWORK_MODE_BRIDGE",
            "labels": {"ENV": "prod"},
            "traefik": {
                "enable": true,
                "host": "web.local",
                "enableSsl": true,
                "certResolver": "le",
                "middlewares": ["auth"],
                "customLabels": {"k": "v"}
            }
        }"#;
        let req: DeployRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.replicas, 2);
        assert_eq!(req.memory, 512);
        assert_eq!(req.region, "");
        assert_eq!(req.network_mode.resolve(), Network::Bridge);
        assert_eq!(req.labels.get("ENV").map(String::as_str), Some("prod"));

        let proxy = req.proxy.unwrap();
        assert!(proxy.enable_ssl);
        assert_eq!(proxy.cert_resolver, "le");
        assert_eq!(proxy.entrypoint, "");
    }

    #[test]
    fn test_proxy_config_empty_strings_become_unset() {
        let spec = ProxySpec::from(ProxyConfig {
            enable: true,
            host: "web.local".to_string(),
            ..ProxyConfig::default()
        });
        assert_eq!(spec.entrypoint, None);
        assert_eq!(spec.cert_resolver, None);
        assert_eq!(spec.health_check_path, None);
        assert_eq!(spec.path_prefix, None);
    }

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(
            serde_json::to_value(DeployStatus::Submitted).unwrap(),
            "SUBMITTED"
        );
        assert_eq!(
            serde_json::to_value(HealthStatus::NotServing).unwrap(),
            "NOT_SERVING"
        );
    }

    #[test]
    fn test_status_response_wire_names() {
        let response = StatusResponse {
            deployment_id: "web".to_string(),
            desired_instances: 2,
            running_instances: 1,
            allocations: vec![AllocationStatus {
                allocation_id: "a1".to_string(),
                ..AllocationStatus::default()
            }],
            ..StatusResponse::default()
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["deploymentId"], "web");
        assert_eq!(value["desiredInstances"], 2);
        assert_eq!(value["runningInstances"], 1);
        assert_eq!(value["allocations"][0]["allocationId"], "a1");
        assert!(value["allocations"][0].get("taskStates").is_some());
    }
}
