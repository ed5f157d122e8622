//! Registration commands — one on-chain registration call per provisioned slot.
//!
//! Each line has the shape
//! `<registrationKind> <address> "<serviceURL>" <stake>`, optionally preceded
//! by a configured prefix for the operator's command runner.

use std::fmt;

use crate::{
    fleet::NodeSlot,
    keystore::Address,
    topology::Topology,
};

/// Where the fleet is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEnvironment {
    /// Every node on one host: `http://localhost<index>:<port>`.
    Local,
    /// Public DNS: `https://<ll><index>.<domain_suffix>`.
    Public { domain_suffix: String },
}

impl NetworkEnvironment {
    pub fn service_url(&self, slot: NodeSlot) -> String {
        match self {
            NetworkEnvironment::Local => {
                format!("http://localhost{}:{}", slot.index, slot.port())
            }
            NetworkEnvironment::Public { domain_suffix } => {
                let l = slot.role.letter();
                format!("https://{l}{l}{}.{domain_suffix}", slot.index)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationCommand {
    pub slot: NodeSlot,
    pub address: Address,
    pub service_url: String,
    pub stake: u64,
}

impl RegistrationCommand {
    pub fn kind(&self) -> &'static str {
        self.slot.role.registration_kind()
    }
}

impl fmt::Display for RegistrationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} \"{}\" {}", self.kind(), self.address, self.service_url, self.stake)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationScriptGenerator {
    /// Prepended to every line; `{network}` is replaced by the environment name.
    command_prefix: String,
}

impl RegistrationScriptGenerator {
    pub fn new(command_prefix: impl Into<String>) -> Self {
        Self { command_prefix: command_prefix.into() }
    }

    /// Commands in topology order, lowest index first.
    pub fn generate(
        &self,
        topology: &Topology,
        environment: &NetworkEnvironment,
    ) -> Vec<RegistrationCommand> {
        topology
            .entries()
            .iter()
            .map(|entry| RegistrationCommand {
                slot: entry.slot,
                address: entry.address,
                service_url: environment.service_url(entry.slot),
                stake: entry.slot.stake(),
            })
            .collect()
    }

    /// One line per command, newline-terminated.
    pub fn render(&self, network_name: &str, commands: &[RegistrationCommand]) -> String {
        let prefix = self.command_prefix.replace("{network}", network_name);
        commands
            .iter()
            .map(|cmd| format!("{prefix}{cmd}\n"))
            .collect()
    }
}
