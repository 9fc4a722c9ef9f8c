//! Conversion of user-facing resource and network inputs into the units and
//! topology the orchestrator expects.

use serde::{Deserialize, Deserializer, Serialize};

/// Orchestrator CPU units per requested core.
///
/// This scale is a contract with the orchestrator deployment: jobs compiled
/// against a cluster expecting a different scale will be over- or
/// under-provisioned.
pub const CPU_UNITS_PER_CORE: f64 = 10.0;

/// Converts fractional cores into orchestrator CPU units.
pub fn cpu_units(cores: f64) -> u32 {
    // `as` saturates: negatives and NaN become 0.
    (cores * CPU_UNITS_PER_CORE).round() as u32
}

/// Network mode as requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Unspecified,
    Host,
    Bridge,
}

impl NetworkMode {
    /// Lenient parse. Anything unrecognised is `Unspecified`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix("NETWORK_MODE_")
            .or_else(|| raw.strip_prefix("network_mode_"))
            .unwrap_or(raw);
        if raw.eq_ignore_ascii_case("bridge") {
            NetworkMode::Bridge
        } else if raw.eq_ignore_ascii_case("host") {
            NetworkMode::Host
        } else {
            NetworkMode::Unspecified
        }
    }

    fn from_number(n: i64) -> Self {
        match n {
            1 => NetworkMode::Host,
            2 => NetworkMode::Bridge,
            _ => NetworkMode::Unspecified,
        }
    }

    /// Resolves to the topology the job is compiled with. Only an explicit
    /// bridge request yields bridge networking.
    pub fn resolve(self) -> Network {
        match self {
            NetworkMode::Bridge => Network::Bridge,
            NetworkMode::Host | NetworkMode::Unspecified => Network::Host,
        }
    }
}

/// Accepts the mode by name (`"bridge"`, `"NETWORK_MODE_BRIDGE"`) or by enum
/// number. Malformed input never fails the request.
impl<'de> Deserialize<'de> for NetworkMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => NetworkMode::parse(&s),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(NetworkMode::from_number)
                .unwrap_or_default(),
            _ => NetworkMode::Unspecified,
        })
    }
}

/// Resolved network topology of a compiled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Host,
    Bridge,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Host => "host",
            Network::Bridge => "bridge",
        }
    }
}
