//! Command-line client for a running control plane.

use std::collections::BTreeMap;

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::api::server::{SERVICE_PATH, TIMEOUT_HEADER};
use crate::api::service::STATUS_RETRIEVED;
use crate::api::types::{
    DeleteRequest, DeleteResponse, DeployRequest, DeployResponse, DeployStatus,
    HealthCheckRequest, HealthCheckResponse, HealthStatus, ProxyConfig, StatusRequest,
    StatusResponse,
};
use crate::cli::{Command, DeployArgs};
use crate::job::{
    proxy::{
        DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_HEALTH_CHECK_PATH, ProxySpec, SECURE_ENTRYPOINT,
    },
    resources::NetworkMode,
};

/// Deadline attached to every call.
const CALL_TIMEOUT: &str = "30S";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
    #[error("Server responded with {code}: {body}")]
    Server { code: u16, body: String },
}

impl DeployArgs {
    pub fn validate(&self) -> Result<(), ClientError> {
        let invalid = |msg: &str| Err(ClientError::Validation(msg.to_string()));
        if self.name.is_empty() {
            return invalid("name cannot be empty");
        }
        if self.image.is_empty() {
            return invalid("image cannot be empty");
        }
        if self.replicas < 1 {
            return invalid("replicas must be at least 1");
        }
        if self.cpu.is_nan() || self.cpu <= 0.0 {
            return invalid("cpu must be greater than 0");
        }
        if self.memory == 0 {
            return invalid("memory must be greater than 0");
        }
        if self.network != "host" && self.network != "bridge" {
            return invalid("network mode must be 'host' or 'bridge'");
        }
        Ok(())
    }

    pub fn to_request(&self) -> Result<DeployRequest, ClientError> {
        self.validate()?;

        let proxy = self.proxy_host.as_deref().filter(|h| !h.is_empty()).map(|host| {
            let mut spec = ProxySpec::for_host(host)
                .with_entrypoint(SECURE_ENTRYPOINT)
                .with_health_check(DEFAULT_HEALTH_CHECK_PATH, DEFAULT_HEALTH_CHECK_INTERVAL);
            if self.proxy_ssl {
                spec = spec.with_ssl(None);
            }
            ProxyConfig::from(spec)
        });

        Ok(DeployRequest {
            name: self.name.clone(),
            image: self.image.clone(),
            replicas: self.replicas,
            cpu: self.cpu,
            memory: self.memory,
            region: self.region.clone(),
            network_mode: NetworkMode::parse(&self.network),
            labels: parse_env_pairs(&self.env)?,
            proxy,
        })
    }
}

/// Parses `KEY1=VALUE1,KEY2=VALUE2`. Keys and values are trimmed, values
/// may contain `=`.
pub fn parse_env_pairs(raw: &str) -> Result<BTreeMap<String, String>, ClientError> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(ClientError::Validation(format!(
                "invalid environment variable format: {pair} (should be KEY=VALUE)"
            ))),
        })
        .collect()
}

pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
}

impl ControlPlaneClient {
    pub fn new(server: &str) -> Result<Self, ClientError> {
        url::Url::parse(server).map_err(|e| {
            ClientError::Validation(format!("invalid server address '{server}': {e}"))
        })?;
        Ok(Self {
            client: Client::new(),
            base_url: format!("{}{SERVICE_PATH}", server.trim_end_matches('/')),
        })
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .header(TIMEOUT_HEADER, CALL_TIMEOUT)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                code: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(response.json().await?)
    }

    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployResponse, ClientError> {
        self.call("DeployApplication", request).await
    }

    pub async fn delete(&self, deployment_id: &str) -> Result<DeleteResponse, ClientError> {
        let request = DeleteRequest {
            deployment_id: deployment_id.to_string(),
        };
        self.call("DeleteApplication", &request).await
    }

    pub async fn status(&self, deployment_id: &str) -> Result<StatusResponse, ClientError> {
        let request = StatusRequest {
            deployment_id: deployment_id.to_string(),
        };
        self.call("GetApplicationStatus", &request).await
    }

    pub async fn health(&self) -> Result<HealthCheckResponse, ClientError> {
        self.call("HealthCheck", &HealthCheckRequest {}).await
    }
}

/// Runs one client subcommand and prints the outcome. Returns whether the
/// operation succeeded.
pub async fn run(server: &str, command: &Command) -> Result<bool, ClientError> {
    let client = ControlPlaneClient::new(server)?;
    match command {
        Command::Serve { .. } => Ok(true),
        Command::Deploy(args) => {
            let request = args.to_request()?;
            println!(
                "Deploying application '{}' with image '{}'...",
                request.name, request.image
            );
            let response = client.deploy(&request).await?;
            println!("ID: {}", response.deployment_id);
            println!("Status: {:?}", response.status);
            println!("Message: {}", response.message);
            Ok(response.status == DeployStatus::Submitted)
        }
        Command::Delete { id, name } => {
            let target = id
                .as_deref()
                .filter(|i| !i.is_empty())
                .or(name.as_deref().filter(|n| !n.is_empty()))
                .ok_or_else(|| {
                    ClientError::Validation("--id or --name must be provided".to_string())
                })?;
            println!("Deleting application with ID '{target}'...");
            let response = client.delete(target).await?;
            println!("{}", response.message);
            Ok(response.success)
        }
        Command::Status { id } => {
            let response = client.status(id).await?;
            print_status(&response);
            Ok(response.message == STATUS_RETRIEVED)
        }
        Command::Health => {
            let response = client.health().await?;
            println!("Status: {:?}", response.status);
            println!("Message: {}", response.message);
            Ok(response.status == HealthStatus::Serving)
        }
    }
}

fn print_status(status: &StatusResponse) {
    println!("Deployment: {}", status.deployment_id);
    println!("Job status: {}", status.job_status);
    println!("Job type: {}", status.job_type);
    println!(
        "Instances: {}/{} running",
        status.running_instances, status.desired_instances
    );
    for alloc in &status.allocations {
        println!(
            "  {} on {} ({}): {} / desired {}",
            alloc.allocation_id, alloc.node_name, alloc.node_id, alloc.status, alloc.desired_status
        );
        for (task, state) in &alloc.task_states {
            println!("    {task}: {state}");
        }
    }
    println!("Message: {}", status.message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::resources::Network;

    fn args() -> DeployArgs {
        DeployArgs {
            name: "web".to_string(),
            image: "nginx:latest".to_string(),
            replicas: 1,
            cpu: 0.1,
            memory: 128,
            region: "global".to_string(),
            network: "host".to_string(),
            env: String::new(),
            proxy_host: None,
            proxy_ssl: false,
        }
    }

    fn rejected(args: DeployArgs, expected: &str) {
        match args.validate() {
            Err(ClientError::Validation(msg)) => assert!(msg.contains(expected), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation() {
        assert!(args().validate().is_ok());
        let cases: [(fn(&mut DeployArgs), &str); 7] = [
            (|a| a.name.clear(), "name"),
            (|a| a.image.clear(), "image"),
            (|a| a.replicas = 0, "replicas"),
            (|a| a.cpu = 0.0, "cpu"),
            (|a| a.cpu = f64::NAN, "cpu"),
            (|a| a.memory = 0, "memory"),
            (|a| a.network = "overlay".to_string(), "network"),
        ];
        for (mutate, expected) in cases {
            let mut invalid = args();
            mutate(&mut invalid);
            rejected(invalid, expected);
        }
    }

    #[test]
    fn test_parse_env_pairs() {
        let env = parse_env_pairs(" ENV = production,DEBUG=false,URL=a=b ").unwrap();
        assert_eq!(env.get("ENV").map(String::as_str), Some("production"));
        assert_eq!(env.get("DEBUG").map(String::as_str), Some("false"));
        assert_eq!(env.get("URL").map(String::as_str), Some("a=b"));
        assert!(parse_env_pairs("").unwrap().is_empty());
        assert!(parse_env_pairs("NOVALUE").is_err());
        assert!(parse_env_pairs("=value").is_err());
    }

    #[test]
    fn test_request_without_proxy() {
        let request = DeployArgs {
            network: "bridge".to_string(),
            env: "A=1".to_string(),
            ..args()
        }
        .to_request()
        .unwrap();
        assert_eq!(request.network_mode.resolve(), Network::Bridge);
        assert_eq!(request.labels.len(), 1);
        assert_eq!(request.region, "global");
        assert_eq!(request.proxy, None);
    }

    #[test]
    fn test_request_with_proxy_host() {
        let request = DeployArgs {
            proxy_host: Some("web.local".to_string()),
            proxy_ssl: true,
            ..args()
        }
        .to_request()
        .unwrap();
        let proxy = request.proxy.unwrap();
        assert!(proxy.enable);
        assert!(proxy.enable_ssl);
        assert_eq!(proxy.host, "web.local");
        assert_eq!(proxy.entrypoint, "websecure");
        assert_eq!(proxy.health_check_path, "/");
        assert_eq!(proxy.health_check_interval, "30s");
        assert_eq!(proxy.cert_resolver, "");
    }

    #[test]
    fn test_invalid_server_address() {
        assert!(matches!(
            ControlPlaneClient::new("not a url"),
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = ControlPlaneClient::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(client.health().await, Err(ClientError::Http(_))));
    }
}
