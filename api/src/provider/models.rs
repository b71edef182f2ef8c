//! The request/response models for the providers machines api

use std::collections::HashMap;

/// The guest hardware a machine is created with
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GuestSpec {
    /// The kind of cpu to allocate
    pub cpu_kind: String,
    /// How many cpus to allocate
    pub cpus: u32,
    /// How much memory to allocate in MB
    pub memory_mb: u32,
}

impl Default for GuestSpec {
    /// Default to the smallest worker shape
    fn default() -> Self {
        GuestSpec {
            cpu_kind: "shared".to_owned(),
            cpus: 1,
            memory_mb: 512,
        }
    }
}

/// The restart policy a machine is created with
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// The policy name
    pub policy: String,
}

impl Default for RestartPolicy {
    /// Workers are never restarted by the provider
    fn default() -> Self {
        RestartPolicy {
            policy: "no".to_owned(),
        }
    }
}

/// The config block of a machine create request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// The image to boot this machine from
    pub image: String,
    /// The env to inject into this machine
    pub env: HashMap<String, String>,
    /// The guest hardware to allocate
    pub guest: GuestSpec,
    /// The restart policy to apply
    pub restart: RestartPolicy,
    /// Whether to destroy this machine when it exits
    pub auto_destroy: bool,
}

/// A machine create request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MachineSpec {
    /// The name to create this machine under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The region to create this machine in
    pub region: String,
    /// The machines config block
    pub config: MachineConfig,
}

/// One machine as the provider reports it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProviderMachine {
    /// The stable id the provider assigned
    pub id: String,
    /// The physical state the provider reports
    pub state: String,
    /// The region this machine lives in
    #[serde(default)]
    pub region: Option<String>,
    /// When the provider created this machine
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ProviderMachine {
    /// Whether the provider reports this machine as stopped
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state == "stopped"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_specs_serialize_the_machines_api_shape() {
        let spec = MachineSpec {
            name: Some("worker-abc".to_owned()),
            region: "iad".to_owned(),
            config: MachineConfig {
                image: "ghcr.io/clipforge/worker:latest".to_owned(),
                env: HashMap::default(),
                guest: GuestSpec::default(),
                restart: RestartPolicy::default(),
                auto_destroy: false,
            },
        };
        let raw = serde_json::to_value(&spec).unwrap();
        assert_eq!(raw["region"], "iad");
        assert_eq!(raw["config"]["guest"]["cpu_kind"], "shared");
        assert_eq!(raw["config"]["guest"]["cpus"], 1);
        assert_eq!(raw["config"]["guest"]["memory_mb"], 512);
        assert_eq!(raw["config"]["restart"]["policy"], "no");
        assert_eq!(raw["config"]["auto_destroy"], false);
    }

    #[test]
    fn machines_parse_with_minimal_fields() {
        let machine: ProviderMachine =
            serde_json::from_str(r#"{"id": "m1", "state": "stopped"}"#).unwrap();
        assert!(machine.is_stopped());
        assert_eq!(machine.region, None);
        assert_eq!(machine.created_at, None);
    }
}
