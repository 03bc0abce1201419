// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Launch Profiles
//!
//! One launch profile per supported architecture, composed from the
//! [`ArchitectureCatalog`](crate::domain::architecture::ArchitectureCatalog),
//! a bound instance role and a default access policy.
//!
//! The generic launch schema infers its own image (latest Amazon Linux 2) and
//! injects a default bootstrap script before this crate gets a say. Both are
//! replaced by [`PropertyOverride`]s applied after the base profile is built:
//!
//! | Logical field | Override value |
//! |---------------|----------------|
//! | `launchData.image` | architecture's deferred ECS-optimized image |
//! | `launchData.bootstrap` | empty string |
//!
//! Overrides are keyed by logical field; mapping a field to a concrete schema
//! path is the synthesizer's job.

use crate::domain::architecture::{
    Architecture, ArchitectureCatalog, ArchitectureError, CapacityClass, MachineImage,
};
use crate::domain::environment::ExternalResourceRef;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditMode {
    Standard,
    Unlimited,
}

impl CreditMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditMode::Standard => "standard",
            CreditMode::Unlimited => "unlimited",
        }
    }
}

/// Launch-data fields the high-level schema cannot express directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LaunchField {
    #[serde(rename = "launchData.image")]
    Image,
    #[serde(rename = "launchData.bootstrap")]
    Bootstrap,
}

impl fmt::Display for LaunchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchField::Image => f.write_str("launchData.image"),
            LaunchField::Bootstrap => f.write_str("launchData.bootstrap"),
        }
    }
}

/// Literal value patched over a composed launch profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOverride {
    pub field: LaunchField,
    pub value: String,
}

/// Access policy a launch profile is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PolicyAttachment {
    /// A group that already exists in the environment (e.g. `default`).
    External(ExternalResourceRef),
    /// A policy declared in the same run, by construct id.
    Declared { name: String, construct_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchProfile {
    name: String,
    architecture: Architecture,
    capacity_class: CapacityClass,
    /// Role the launched instances operate as.
    role: ExternalResourceRef,
    network_policy: PolicyAttachment,
    storage_optimized: bool,
    credit_mode: CreditMode,
    base_image: MachineImage,
    overrides: Vec<PropertyOverride>,
}

impl LaunchProfile {
    /// Profile name; always the architecture tag.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn capacity_class(&self) -> CapacityClass {
        self.capacity_class
    }

    pub fn role(&self) -> &ExternalResourceRef {
        &self.role
    }

    pub fn network_policy(&self) -> &PolicyAttachment {
        &self.network_policy
    }

    pub fn storage_optimized(&self) -> bool {
        self.storage_optimized
    }

    pub fn credit_mode(&self) -> CreditMode {
        self.credit_mode
    }

    pub fn base_image(&self) -> &MachineImage {
        &self.base_image
    }

    pub fn overrides(&self) -> &[PropertyOverride] {
        &self.overrides
    }

    pub fn override_for(&self, field: LaunchField) -> Option<&str> {
        self.overrides
            .iter()
            .find(|o| o.field == field)
            .map(|o| o.value.as_str())
    }

    pub fn image_override(&self) -> Option<&str> {
        self.override_for(LaunchField::Image)
    }

    pub fn bootstrap_override(&self) -> Option<&str> {
        self.override_for(LaunchField::Bootstrap)
    }

    /// Image the instance boots from: the override when present, otherwise
    /// the schema's inferred image parameter.
    pub fn effective_image(&self) -> String {
        match self.image_override() {
            Some(image) => image.to_string(),
            None => self.base_image.parameter().render(),
        }
    }

    /// Set `field` to `value`, replacing an earlier override of the same field.
    pub fn apply_override(&mut self, field: LaunchField, value: impl Into<String>) {
        let value = value.into();
        match self.overrides.iter_mut().find(|o| o.field == field) {
            Some(existing) => existing.value = value,
            None => self.overrides.push(PropertyOverride { field, value }),
        }
    }
}

pub struct LaunchProfileComposer;

impl LaunchProfileComposer {
    /// Compose the launch profile for a raw architecture tag.
    pub fn compose(
        tag: &str,
        role: &ExternalResourceRef,
        default_policy: &PolicyAttachment,
    ) -> Result<LaunchProfile, ArchitectureError> {
        let arch = tag.parse::<Architecture>()?;
        Ok(Self::compose_for(arch, role, default_policy))
    }

    pub fn compose_for(
        arch: Architecture,
        role: &ExternalResourceRef,
        default_policy: &PolicyAttachment,
    ) -> LaunchProfile {
        let profile = ArchitectureCatalog::profile(arch);

        // Credits and storage optimization are fixed for this workload class.
        let mut launch = LaunchProfile {
            name: arch.tag().to_string(),
            architecture: arch,
            capacity_class: profile.capacity_class,
            role: role.clone(),
            network_policy: default_policy.clone(),
            storage_optimized: true,
            credit_mode: CreditMode::Unlimited,
            base_image: profile.baseline_image,
            overrides: Vec::new(),
        };

        launch.apply_override(LaunchField::Image, profile.image_reference.render());
        launch.apply_override(LaunchField::Bootstrap, "");
        launch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::environment::test_support::{role_ref, security_group_ref};

    fn default_policy() -> PolicyAttachment {
        PolicyAttachment::External(security_group_ref("default", "sg-0def", "vpc-1"))
    }

    #[test]
    fn test_compose_per_architecture() {
        let role = role_ref("ecsInstanceRole");
        let policy = default_policy();

        let arm = LaunchProfileComposer::compose("arm", &role, &policy).unwrap();
        let x86 = LaunchProfileComposer::compose("x86", &role, &policy).unwrap();

        assert_eq!(arm.name(), "arm");
        assert_eq!(x86.name(), "x86");
        assert_ne!(arm.image_override(), x86.image_override());
        assert!(arm.image_override().unwrap().contains("/arm64/"));
        assert!(!x86.image_override().unwrap().contains("arm64"));
        assert_eq!(arm.bootstrap_override(), Some(""));
        assert_eq!(x86.bootstrap_override(), Some(""));
        assert_eq!(arm.capacity_class().instance_type(), "t4g.medium");
        assert_eq!(x86.capacity_class().instance_type(), "t3a.medium");
    }

    #[test]
    fn test_fixed_operating_policy() {
        let profile =
            LaunchProfileComposer::compose_for(Architecture::X86, &role_ref("ecsInstanceRole"), &default_policy());

        assert!(profile.storage_optimized());
        assert_eq!(profile.credit_mode(), CreditMode::Unlimited);
        assert_eq!(profile.role().id(), "ecsInstanceRole");
        assert_eq!(profile.network_policy(), &default_policy());
    }

    #[test]
    fn test_image_override_wins_over_base_image() {
        let profile =
            LaunchProfileComposer::compose_for(Architecture::Arm, &role_ref("ecsInstanceRole"), &default_policy());

        assert_eq!(profile.effective_image(), profile.image_override().unwrap());
        assert_ne!(profile.effective_image(), profile.base_image().parameter().render());
    }

    #[test]
    fn test_override_replaces_existing_value() {
        let mut profile =
            LaunchProfileComposer::compose_for(Architecture::X86, &role_ref("ecsInstanceRole"), &default_policy());
        profile.apply_override(LaunchField::Bootstrap, "#!/bin/bash\necho hi");

        assert_eq!(profile.overrides().len(), 2);
        assert_eq!(profile.bootstrap_override(), Some("#!/bin/bash\necho hi"));
    }

    #[test]
    fn test_compose_unknown_tag_fails() {
        let result = LaunchProfileComposer::compose("sparc", &role_ref("ecsInstanceRole"), &default_policy());
        assert_eq!(
            result,
            Err(ArchitectureError::UnsupportedArchitecture { tag: "sparc".to_string() })
        );
    }
}
