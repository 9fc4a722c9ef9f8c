use std::{collections::BTreeMap, time::Duration};

use crate::config::DEFAULT_DRIVER;
use crate::job::{proxy::ProxySpec, resources::Network};
use crate::nomad::model::{
    Job, NetworkResource, Port, Resources, Service, ServiceCheck, Task, TaskGroup,
};

/// Job type of every compiled job: long-running services.
pub const JOB_TYPE: &str = "service";
pub const DEFAULT_PORT_LABEL: &str = "http";
pub const DEFAULT_CONTAINER_PORT: i32 = 80;
/// Used when a service check timeout is missing or malformed.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// The single port a deployment exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// An empty label disables networking and service registration.
    pub label: String,
    /// Host port for host networking, 0 lets the orchestrator pick.
    pub host_port: i32,
    /// Container port for bridge networking.
    pub container_port: i32,
}

impl Default for PortSpec {
    fn default() -> Self {
        Self {
            label: DEFAULT_PORT_LABEL.to_string(),
            host_port: 0,
            container_port: DEFAULT_CONTAINER_PORT,
        }
    }
}

/// Task resources. `None` leaves the field to the orchestrator default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSpec {
    pub cpu_units: Option<u32>,
    pub cores: Option<u32>,
    pub memory_mb: Option<u64>,
    pub memory_max_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCheckSpec {
    /// No check is attached while this is empty.
    pub check_type: String,
    pub path: String,
    pub interval: Duration,
    /// Go duration syntax (`10s`, `1.5s`, `1m30s`, `250ms`) or a humantime
    /// span (`10 seconds`). Anything else falls back to
    /// [`DEFAULT_CHECK_TIMEOUT`].
    pub timeout: String,
    /// Defaults to the service's own port label.
    pub port_label: Option<String>,
}

/// Everything needed to compile one orchestrator job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTemplate {
    /// Used as job id, job name and task name.
    pub name: String,
    pub image: String,
    pub instances: u32,
    pub region: Option<String>,
    pub datacenters: Vec<String>,
    pub driver: String,
    pub ports: PortSpec,
    pub environment: BTreeMap<String, String>,
    pub resources: ResourceSpec,
    pub network: Network,
    pub proxy: ProxySpec,
    pub health_check: ServiceCheckSpec,
    pub disable_service: bool,
}

impl JobTemplate {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            instances: 1,
            region: None,
            datacenters: vec!["dc1".to_string()],
            driver: DEFAULT_DRIVER.to_string(),
            ports: PortSpec::default(),
            environment: BTreeMap::new(),
            resources: ResourceSpec::default(),
            network: Network::default(),
            proxy: ProxySpec::default(),
            health_check: ServiceCheckSpec::default(),
            disable_service: false,
        }
    }

    /// Compiles the template. Never fails: missing optional inputs are left
    /// out of the document.
    pub fn to_job(&self) -> Job {
        Job {
            id: Some(self.name.clone()),
            name: Some(self.name.clone()),
            job_type: Some(JOB_TYPE.to_string()),
            region: self.region.clone().filter(|r| !r.is_empty()),
            datacenters: self.datacenters.clone(),
            task_groups: vec![self.task_group()],
            status: None,
        }
    }

    fn task_group(&self) -> TaskGroup {
        let has_port = !self.ports.label.is_empty();

        let networks = if has_port {
            vec![self.network_resource()]
        } else {
            Vec::new()
        };

        let services = if has_port && !self.disable_service {
            vec![self.service()]
        } else {
            Vec::new()
        };

        TaskGroup {
            name: Some(format!("{}-group", self.name)),
            count: Some(self.instances),
            tasks: vec![self.task()],
            networks,
            services,
        }
    }

    fn task(&self) -> Task {
        let config = BTreeMap::from([(
            "image".to_string(),
            serde_json::Value::String(self.image.clone()),
        )]);

        Task {
            name: self.name.clone(),
            driver: self.driver.clone(),
            config,
            env: self.environment.clone(),
            resources: Resources {
                cpu: self.resources.cpu_units,
                cores: self.resources.cores,
                memory_mb: self.resources.memory_mb,
                memory_max_mb: self.resources.memory_max_mb,
            },
        }
    }

    fn network_resource(&self) -> NetworkResource {
        let port = match self.network {
            Network::Bridge => Port {
                label: self.ports.label.clone(),
                value: None,
                to: Some(self.ports.container_port),
            },
            Network::Host => Port {
                label: self.ports.label.clone(),
                value: Some(self.ports.host_port),
                to: None,
            },
        };

        NetworkResource {
            mode: self.network.as_str().to_string(),
            dynamic_ports: vec![port],
        }
    }

    fn service(&self) -> Service {
        let label = &self.ports.label;
        let checks = if self.health_check.check_type.is_empty() {
            Vec::new()
        } else {
            vec![self.service_check()]
        };

        Service {
            name: format!("{}-{}", self.name, label),
            port_label: label.clone(),
            tags: self.proxy.tags(&self.name, label),
            checks,
        }
    }

    fn service_check(&self) -> ServiceCheck {
        let check = &self.health_check;
        let timeout = parse_check_timeout(&check.timeout).unwrap_or_else(|| {
            if !check.timeout.is_empty() {
                log::warn!(
                    "Invalid check timeout '{}' for {}, using {:?}",
                    check.timeout,
                    self.name,
                    DEFAULT_CHECK_TIMEOUT
                );
            }
            DEFAULT_CHECK_TIMEOUT
        });

        ServiceCheck {
            check_type: check.check_type.clone(),
            path: check.path.clone(),
            interval: check.interval,
            timeout,
            port_label: check
                .port_label
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| self.ports.label.clone()),
        }
    }
}

fn parse_check_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    humantime::parse_duration(raw)
        .ok()
        .or_else(|| parse_fractional_duration(raw))
}

/// Sequence of decimal numbers with units, such as `1.5s` or `1h2.5m`.
fn parse_fractional_duration(raw: &str) -> Option<Duration> {
    if raw == "0" {
        return Some(Duration::ZERO);
    }
    if raw.is_empty() {
        return None;
    }

    let mut rest = raw;
    let mut seconds = 0.0;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        seconds += value * scale;
        rest = &rest[unit_len..];
    }
    Duration::try_from_secs_f64(seconds).ok()
}
