// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Architecture Catalog
//!
//! Static mapping from a CPU architecture tag to the machine image and
//! capacity class a launch profile for that architecture uses.
//!
//! The table is a closed `match` over [`Architecture`]; adding a variant
//! without an entry fails to compile. Each entry pins environment-specific
//! knowledge (kernel 5.10 ECS-optimized images, Graviton vs AMD burstable
//! families) and must be reviewed by a human on change.
//!
//! | Tag | Capacity class | Deferred image |
//! |-----|----------------|----------------|
//! | `x86` | `t3a.medium` | `.../kernel-5.10/recommended/image_id` |
//! | `arm` | `t4g.medium` | `.../kernel-5.10/arm64/recommended/image_id` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ECS_OPTIMIZED_AMI_X86_64: &str =
    "/aws/service/ecs/optimized-ami/amazon-linux-2/kernel-5.10/recommended/image_id";
const ECS_OPTIMIZED_AMI_ARM64: &str =
    "/aws/service/ecs/optimized-ami/amazon-linux-2/kernel-5.10/arm64/recommended/image_id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchitectureError {
    #[error("Unsupported architecture '{tag}' (supported: x86, arm)")]
    UnsupportedArchitecture { tag: String },

    #[error("Architecture '{tag}' is listed more than once")]
    DuplicateArchitecture { tag: String },

    #[error("No launch profile planned for architecture '{tag}'")]
    MissingArchitecture { tag: String },
}

/// Supported CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    Arm,
}

impl Architecture {
    /// Every supported architecture, in declaration order.
    pub const ALL: [Architecture; 2] = [Architecture::X86, Architecture::Arm];

    pub fn tag(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::Arm => "arm",
        }
    }

    /// Processor type used by image naming conventions (`x86_64`, `arm64`).
    pub fn cpu_type(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86_64",
            Architecture::Arm => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Architecture {
    type Err = ArchitectureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" => Ok(Architecture::X86),
            "arm" => Ok(Architecture::Arm),
            other => Err(ArchitectureError::UnsupportedArchitecture {
                tag: other.to_string(),
            }),
        }
    }
}

/// Burstable instance families used by the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceFamily {
    /// AMD EPYC burstable
    T3a,
    /// AWS Graviton2 burstable
    T4g,
}

impl InstanceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceFamily::T3a => "t3a",
            InstanceFamily::T4g => "t4g",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSize {
    Small,
    Medium,
    Large,
}

impl InstanceSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceSize::Small => "small",
            InstanceSize::Medium => "medium",
            InstanceSize::Large => "large",
        }
    }
}

/// Compute capacity class: an instance family paired with a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapacityClass {
    pub family: InstanceFamily,
    pub size: InstanceSize,
}

impl CapacityClass {
    pub const fn of(family: InstanceFamily, size: InstanceSize) -> Self {
        Self { family, size }
    }

    /// Instance type name, e.g. `t4g.medium`.
    pub fn instance_type(&self) -> String {
        format!("{}.{}", self.family.as_str(), self.size.as_str())
    }
}

impl fmt::Display for CapacityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.family.as_str(), self.size.as_str())
    }
}

/// A value resolved by the deployment tool at apply time, never by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "path", rename_all = "snake_case")]
pub enum DeferredReference {
    /// Parameter-store path, resolved via `resolve:ssm:<path>`.
    SsmParameter(String),
}

impl DeferredReference {
    pub fn ssm(path: impl Into<String>) -> Self {
        Self::SsmParameter(path.into())
    }

    pub fn path(&self) -> &str {
        match self {
            Self::SsmParameter(path) => path,
        }
    }

    /// Dynamic-reference form understood by the deployment tool.
    pub fn render(&self) -> String {
        match self {
            Self::SsmParameter(path) => format!("resolve:ssm:{}", path),
        }
    }
}

impl fmt::Display for DeferredReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Generic machine image the high-level launch schema infers on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MachineImage {
    /// Latest Amazon Linux 2 HVM image for the given processor type.
    LatestAmazonLinux2 { cpu_type: String },
}

impl MachineImage {
    pub fn latest_amazon_linux2(arch: Architecture) -> Self {
        Self::LatestAmazonLinux2 {
            cpu_type: arch.cpu_type().to_string(),
        }
    }

    /// Parameter the generic schema would resolve the image from.
    pub fn parameter(&self) -> DeferredReference {
        match self {
            Self::LatestAmazonLinux2 { cpu_type } => DeferredReference::ssm(format!(
                "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-{}-gp2",
                cpu_type
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureProfile {
    pub tag: Architecture,
    /// Architecture-specific image, resolved at deploy time.
    pub image_reference: DeferredReference,
    /// Image the generic launch schema would pick without an override.
    pub baseline_image: MachineImage,
    pub capacity_class: CapacityClass,
}

pub struct ArchitectureCatalog;

impl ArchitectureCatalog {
    /// Resolve a raw tag. Unknown tags fail with `UnsupportedArchitecture`.
    pub fn resolve(tag: &str) -> Result<ArchitectureProfile, ArchitectureError> {
        let arch = tag.parse::<Architecture>()?;
        Ok(Self::profile(arch))
    }

    /// Resolve a set of tags that must name every supported architecture
    /// exactly once. The result is in [`Architecture::ALL`] order.
    pub fn resolve_all<S: AsRef<str>>(tags: &[S]) -> Result<Vec<Architecture>, ArchitectureError> {
        let mut seen = Vec::with_capacity(tags.len());
        for tag in tags {
            let arch = tag.as_ref().parse::<Architecture>()?;
            if seen.contains(&arch) {
                return Err(ArchitectureError::DuplicateArchitecture {
                    tag: arch.tag().to_string(),
                });
            }
            seen.push(arch);
        }

        if let Some(missing) = Architecture::ALL.iter().find(|a| !seen.contains(a)) {
            return Err(ArchitectureError::MissingArchitecture {
                tag: missing.tag().to_string(),
            });
        }
        Ok(Architecture::ALL.to_vec())
    }

    pub fn profile(arch: Architecture) -> ArchitectureProfile {
        let (path, capacity_class) = match arch {
            Architecture::X86 => (
                ECS_OPTIMIZED_AMI_X86_64,
                CapacityClass::of(InstanceFamily::T3a, InstanceSize::Medium),
            ),
            Architecture::Arm => (
                ECS_OPTIMIZED_AMI_ARM64,
                CapacityClass::of(InstanceFamily::T4g, InstanceSize::Medium),
            ),
        };

        ArchitectureProfile {
            tag: arch,
            image_reference: DeferredReference::ssm(path),
            baseline_image: MachineImage::latest_amazon_linux2(arch),
            capacity_class,
        }
    }
}
