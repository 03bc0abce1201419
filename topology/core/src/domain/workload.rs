// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workload Definitions
//!
//! A workload (task) definition declares a resource envelope, an execution
//! identity, a network mode and the ordered runnable units (containers) it
//! runs. CPU/memory quanta are validated by the scheduler, not here.
//!
//! ## Validation
//!
//! - Unit names are unique within a workload (`DuplicateUnitName`).
//! - Published ports are within 1–65535 (`InvalidPort`).
//! - Images are registry-qualified references (`InvalidImageReference`).
//! - At declaration time at least one unit is essential (`NoEssentialUnit`)
//!   and serverless-compatible workloads use `awsvpc` networking
//!   (`IncompatibleNetworkMode`).

use crate::domain::environment::ExternalResourceRef;
use crate::domain::network_policy::Protocol;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// `registry[:port]/path[:tag][@sha256:digest]`, registry host required.
static IMAGE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:localhost|[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+)(?::[0-9]+)?",
        r"(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)+",
        r"(?::[A-Za-z0-9_][A-Za-z0-9_.-]{0,127})?",
        r"(?:@sha256:[a-f0-9]{64})?$",
    ))
    .expect("Image reference pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkloadError {
    #[error("Runnable unit '{name}' is already defined in workload '{family}'")]
    DuplicateUnitName { family: String, name: String },

    #[error("Invalid published port {port} on unit '{unit}': must be within 1-65535")]
    InvalidPort { unit: String, port: u32 },

    #[error("Invalid image reference '{image}' on unit '{unit}': expected registry/repository[:tag]")]
    InvalidImageReference { unit: String, image: String },

    #[error("Workload '{family}' has no essential runnable unit")]
    NoEssentialUnit { family: String },

    #[error("Workload '{family}' is {compatibility} compatible but uses network mode {network_mode}")]
    IncompatibleNetworkMode {
        family: String,
        compatibility: Compatibility,
        network_mode: NetworkMode,
    },
}

/// Where the scheduler may place the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// Hosted on the instance fleet.
    Ec2,
    /// Hosted on serverless capacity.
    Fargate,
    Ec2AndFargate,
}

impl Compatibility {
    pub fn launch_types(&self) -> &'static [&'static str] {
        match self {
            Compatibility::Ec2 => &["EC2"],
            Compatibility::Fargate => &["FARGATE"],
            Compatibility::Ec2AndFargate => &["EC2", "FARGATE"],
        }
    }

    pub fn is_serverless_compatible(&self) -> bool {
        matches!(self, Compatibility::Fargate | Compatibility::Ec2AndFargate)
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.launch_types().join("+"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// One network namespace (and interface) per workload.
    AwsVpc,
    Bridge,
    Host,
    None,
}

impl NetworkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::AwsVpc => "awsvpc",
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
            NetworkMode::None => "none",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry-qualified container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerImage(String);

impl ContainerImage {
    pub fn is_valid_reference(reference: &str) -> bool {
        IMAGE_REFERENCE.is_match(reference)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Requested runnable unit, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnableUnitSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub essential: bool,
    #[serde(default)]
    pub published_ports: BTreeSet<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_reservation_mib: Option<u32>,
}

impl RunnableUnitSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            essential: false,
            published_ports: BTreeSet::new(),
            memory_reservation_mib: None,
        }
    }

    pub fn essential(mut self, essential: bool) -> Self {
        self.essential = essential;
        self
    }

    pub fn publish(mut self, port: u32) -> Self {
        self.published_ports.insert(port);
        self
    }

    pub fn memory_reservation(mut self, mib: u32) -> Self {
        self.memory_reservation_mib = Some(mib);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnableUnit {
    pub name: String,
    pub image: ContainerImage,
    pub essential: bool,
    pub port_mappings: Vec<PortMapping>,
    pub memory_reservation_mib: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDefinition {
    construct_id: String,
    family: String,
    compatibility: Compatibility,
    cpu_units: u32,
    memory_mib: u32,
    execution_role: ExternalResourceRef,
    network_mode: NetworkMode,
    units: Vec<RunnableUnit>,
}

impl WorkloadDefinition {
    pub fn construct_id(&self) -> &str {
        &self.construct_id
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn compatibility(&self) -> Compatibility {
        self.compatibility
    }

    pub fn cpu_units(&self) -> u32 {
        self.cpu_units
    }

    pub fn memory_mib(&self) -> u32 {
        self.memory_mib
    }

    pub fn execution_role(&self) -> &ExternalResourceRef {
        &self.execution_role
    }

    pub fn network_mode(&self) -> NetworkMode {
        self.network_mode
    }

    pub fn units(&self) -> &[RunnableUnit] {
        &self.units
    }

    pub fn unit(&self, name: &str) -> Option<&RunnableUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Validate `spec` and append it as the workload's next runnable unit.
    pub fn add_runnable_unit(&mut self, spec: RunnableUnitSpec) -> Result<(), WorkloadError> {
        if self.units.iter().any(|u| u.name == spec.name) {
            return Err(WorkloadError::DuplicateUnitName {
                family: self.family.clone(),
                name: spec.name,
            });
        }

        if !ContainerImage::is_valid_reference(&spec.image) {
            return Err(WorkloadError::InvalidImageReference {
                unit: spec.name,
                image: spec.image,
            });
        }

        let mut port_mappings = Vec::with_capacity(spec.published_ports.len());
        for &port in &spec.published_ports {
            let container_port = match u16::try_from(port) {
                Ok(p) if p >= 1 => p,
                _ => {
                    return Err(WorkloadError::InvalidPort {
                        unit: spec.name,
                        port,
                    })
                }
            };
            port_mappings.push(PortMapping {
                container_port,
                protocol: Protocol::Tcp,
            });
        }

        debug!(
            "Adding runnable unit '{}' to workload '{}' (essential: {}, ports: {})",
            spec.name,
            self.family,
            spec.essential,
            port_mappings.len()
        );

        self.units.push(RunnableUnit {
            name: spec.name,
            image: ContainerImage(spec.image),
            essential: spec.essential,
            port_mappings,
            memory_reservation_mib: spec.memory_reservation_mib,
        });
        Ok(())
    }

    /// Checks that only hold once every unit has been added.
    pub fn ensure_complete(&self) -> Result<(), WorkloadError> {
        if !self.units.iter().any(|u| u.essential) {
            return Err(WorkloadError::NoEssentialUnit {
                family: self.family.clone(),
            });
        }

        if self.compatibility.is_serverless_compatible() && self.network_mode != NetworkMode::AwsVpc {
            return Err(WorkloadError::IncompatibleNetworkMode {
                family: self.family.clone(),
                compatibility: self.compatibility,
                network_mode: self.network_mode,
            });
        }

        Ok(())
    }
}

pub struct WorkloadDefinitionBuilder;

impl WorkloadDefinitionBuilder {
    /// Declare an empty workload. Runnable units are added afterwards with
    /// [`WorkloadDefinition::add_runnable_unit`].
    pub fn define_workload(
        family: &str,
        cpu_units: u32,
        memory_mib: u32,
        execution_role: &ExternalResourceRef,
        compatibility: Compatibility,
        network_mode: NetworkMode,
    ) -> WorkloadDefinition {
        let construct_id: String = family.chars().filter(|c| c.is_ascii_alphanumeric()).collect();

        WorkloadDefinition {
            construct_id: format!("{}TaskDef", construct_id),
            family: family.to_string(),
            compatibility,
            cpu_units,
            memory_mib,
            execution_role: execution_role.clone(),
            network_mode,
            units: Vec::new(),
        }
    }
}
