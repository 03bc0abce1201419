// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Network Access Policies
//!
//! Named access-control groups built from declarative ingress rules. Each
//! policy is scoped to one bound network and registered with the builder that
//! created it; the builder is the per-run registry used for declaration.
//!
//! Management access (`ssh`) and public web access (`http/https`) are kept as
//! separate policies so each can be attached, audited or revoked on its own.
//!
//! ## Invariants
//!
//! - Policy names are unique within one builder.
//! - Rules are append-only and keep insertion order; nothing is merged.

use crate::domain::environment::ExternalResourceRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Access policy '{name}' is already declared")]
    DuplicatePolicyName { name: String },

    #[error("Invalid port range {low}-{high} on policy '{policy}': low port exceeds high port")]
    InvalidPortRange { policy: String, low: u16, high: u16 },

    #[error("Invalid rule source '{cidr}': expected an IPv4 CIDR block")]
    InvalidSource { cidr: String },

    #[error("Unknown access policy handle #{0}")]
    UnknownPolicy(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Every protocol.
    All,
}

impl Protocol {
    /// Protocol identifier as the firewall schema spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "-1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    low: u16,
    high: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self { low: port, high: port }
    }

    pub fn low(&self) -> u16 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

/// IPv4 CIDR block a rule admits traffic from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    pub fn any_ipv4() -> Self {
        Self("0.0.0.0/0".to_string())
    }

    pub fn cidr(block: &str) -> Result<Self, PolicyError> {
        let invalid = || PolicyError::InvalidSource {
            cidr: block.to_string(),
        };

        let (addr, prefix) = block.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;

        // Plain decimal only: no sign, no leading zeros
        if prefix.is_empty()
            || !prefix.bytes().all(|b| b.is_ascii_digit())
            || (prefix.len() > 1 && prefix.starts_with('0'))
        {
            return Err(invalid());
        }
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }

        Ok(Self(format!("{}/{}", addr, prefix)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub ports: PortRange,
    pub source: Source,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    construct_id: String,
    name: String,
    description: String,
    scope: ExternalResourceRef,
    allow_all_outbound: bool,
    rules: Vec<IngressRule>,
}

impl AccessPolicy {
    pub fn construct_id(&self) -> &str {
        &self.construct_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Network the policy is declared in.
    pub fn scope(&self) -> &ExternalResourceRef {
        &self.scope
    }

    pub fn allow_all_outbound(&self) -> bool {
        self.allow_all_outbound
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }
}

/// Index of a policy within the builder that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyHandle(usize);

/// Creates and registers access policies for one composition run.
#[derive(Debug, Default)]
pub struct NetworkPolicyBuilder {
    stack_name: String,
    policies: Vec<AccessPolicy>,
}

impl NetworkPolicyBuilder {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            policies: Vec::new(),
        }
    }

    /// Create an empty policy named `name` in the `scope` network.
    ///
    /// The construct id is derived from the name (`http/https` becomes
    /// `securityGroupHttpHttps`) and the description defaults to
    /// `<stack>/<construct id>`. Outbound traffic is allowed by default.
    pub fn new_policy(&mut self, name: &str, scope: &ExternalResourceRef) -> Result<PolicyHandle, PolicyError> {
        self.new_policy_with_id(name, &construct_id_for(name), scope)
    }

    /// Like [`new_policy`](Self::new_policy), with an explicit construct id.
    pub fn new_policy_with_id(
        &mut self,
        name: &str,
        construct_id: &str,
        scope: &ExternalResourceRef,
    ) -> Result<PolicyHandle, PolicyError> {
        if self.policies.iter().any(|p| p.name == name) {
            return Err(PolicyError::DuplicatePolicyName {
                name: name.to_string(),
            });
        }

        let construct_id = construct_id.to_string();
        let description = format!("{}/{}", self.stack_name, construct_id);
        debug!("Registering access policy '{}' in network {}", name, scope.id());

        self.policies.push(AccessPolicy {
            construct_id,
            name: name.to_string(),
            description,
            scope: scope.clone(),
            allow_all_outbound: true,
            rules: Vec::new(),
        });
        Ok(PolicyHandle(self.policies.len() - 1))
    }

    /// Append an ingress rule to `policy`.
    pub fn add_rule(
        &mut self,
        policy: PolicyHandle,
        protocol: Protocol,
        port_low: u16,
        port_high: u16,
        source: Source,
        description: &str,
    ) -> Result<(), PolicyError> {
        let target = self
            .policies
            .get_mut(policy.0)
            .ok_or(PolicyError::UnknownPolicy(policy.0))?;

        if port_low > port_high {
            return Err(PolicyError::InvalidPortRange {
                policy: target.name.clone(),
                low: port_low,
                high: port_high,
            });
        }

        target.rules.push(IngressRule {
            protocol,
            ports: PortRange {
                low: port_low,
                high: port_high,
            },
            source,
            description: description.to_string(),
        });
        Ok(())
    }

    pub fn policy(&self, handle: PolicyHandle) -> Option<&AccessPolicy> {
        self.policies.get(handle.0)
    }

    pub fn policies(&self) -> &[AccessPolicy] {
        &self.policies
    }

    pub fn into_policies(self) -> Vec<AccessPolicy> {
        self.policies
    }
}

fn construct_id_for(name: &str) -> String {
    let mut id = String::from("securityGroup");
    for word in name.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            id.push(first.to_ascii_uppercase());
            id.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }
    id
}
