// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Environment Binding
//!
//! Resolves references to resources that exist outside this system (the base
//! network, identity roles, the default security group, the target cluster).
//! Nothing here creates, renames or mutates a resource: the binder only asks an
//! [`EnvironmentDirectory`] which identity a selector points at and hands back
//! a read-only [`ExternalResourceRef`].
//!
//! ## Lookup rules
//!
//! - A selector that matches nothing fails with `ResourceNotFound`.
//! - A selector that matches more than one candidate fails with
//!   `AmbiguousSelector`. Every selector used by the topology is expected to be
//!   unique.
//! - Each selector is looked up at most once per binder; later binds of the
//!   same selector are served from the binder's cache.
//!
//! Clusters are bound by constructed identity (`arn:aws:ecs:<region>:<account>:cluster/<name>`)
//! and then confirmed against the directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const PARTITION: &str = "aws";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("No {kind} matches selector '{selector}'")]
    ResourceNotFound { kind: ResourceKind, selector: String },

    #[error("Selector '{selector}' matches {} {kind} candidates: {}", .candidates.len(), .candidates.join(", "))]
    AmbiguousSelector {
        kind: ResourceKind,
        selector: String,
        candidates: Vec<String>,
    },

    #[error("Invalid target environment: {0}")]
    InvalidEnvironment(String),

    #[error("Environment directory unavailable while resolving '{selector}': {reason}")]
    DirectoryUnavailable { selector: String, reason: String },
}

/// Failure reported by a directory backend itself (not a lookup miss).
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Role,
    SecurityGroup,
    Cluster,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Network => "network",
            ResourceKind::Role => "role",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::Cluster => "cluster",
        };
        f.write_str(name)
    }
}

/// Lookup key understood by an [`EnvironmentDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Selector {
    /// The account's default network.
    DefaultNetwork,
    NetworkId { id: String },
    RoleName { name: String },
    /// Security group by name, scoped to a network.
    SecurityGroupName { name: String, network_id: String },
    ClusterArn { arn: String },
}

impl Selector {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Selector::DefaultNetwork | Selector::NetworkId { .. } => ResourceKind::Network,
            Selector::RoleName { .. } => ResourceKind::Role,
            Selector::SecurityGroupName { .. } => ResourceKind::SecurityGroup,
            Selector::ClusterArn { .. } => ResourceKind::Cluster,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::DefaultNetwork => write!(f, "network:default"),
            Selector::NetworkId { id } => write!(f, "network:{}", id),
            Selector::RoleName { name } => write!(f, "role:{}", name),
            Selector::SecurityGroupName { name, network_id } => {
                write!(f, "security-group:{}@{}", name, network_id)
            }
            Selector::ClusterArn { arn } => write!(f, "cluster:{}", arn),
        }
    }
}

/// Network selectors accepted by [`EnvironmentBinder::bind_network`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSelector {
    Default,
    Id(String),
}

impl From<NetworkSelector> for Selector {
    fn from(selector: NetworkSelector) -> Self {
        match selector {
            NetworkSelector::Default => Selector::DefaultNetwork,
            NetworkSelector::Id(id) => Selector::NetworkId { id },
        }
    }
}

/// Identity of a resource as reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    /// Native identifier (`vpc-…`, `sg-…`, role name, cluster name).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
}

impl ResourceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), arn: None }
    }

    pub fn with_arn(id: impl Into<String>, arn: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            arn: Some(arn.into()),
        }
    }
}

/// Read-only handle on a resource owned outside this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResourceRef {
    kind: ResourceKind,
    selector: Selector,
    identity: ResourceIdentity,
}

impl ExternalResourceRef {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn arn(&self) -> Option<&str> {
        self.identity.arn.as_deref()
    }

    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }
}

/// Read-only directory of the target environment.
///
/// Implementations return every candidate matching `selector`; uniqueness is
/// enforced by the binder. Calls are synchronous and carry no retry policy.
pub trait EnvironmentDirectory: Send + Sync {
    fn lookup(&self, selector: &Selector) -> Result<Vec<ResourceIdentity>, DirectoryError>;
}

/// Account and region the topology is declared into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetEnvironment {
    account: String,
    region: String,
}

impl TargetEnvironment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Result<Self, BindingError> {
        let account = account.into();
        let region = region.into();

        if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
            return Err(BindingError::InvalidEnvironment(format!(
                "account '{}' must be a 12-digit account id",
                account
            )));
        }
        if region.is_empty()
            || region.starts_with('-')
            || region.ends_with('-')
            || !region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(BindingError::InvalidEnvironment(format!(
                "region '{}' must be lowercase alphanumeric with hyphens",
                region
            )));
        }

        Ok(Self { account, region })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Format a resource ARN in this environment.
    pub fn format_arn(&self, service: &str, resource: &str, resource_name: &str) -> String {
        format!(
            "arn:{}:{}:{}:{}:{}/{}",
            PARTITION, service, self.region, self.account, resource, resource_name
        )
    }
}

/// Binds selectors to external resources through an [`EnvironmentDirectory`].
pub struct EnvironmentBinder<'a> {
    directory: &'a dyn EnvironmentDirectory,
    resolved: BTreeMap<Selector, ResourceIdentity>,
}

impl<'a> EnvironmentBinder<'a> {
    pub fn new(directory: &'a dyn EnvironmentDirectory) -> Self {
        Self {
            directory,
            resolved: BTreeMap::new(),
        }
    }

    pub fn bind_network(&mut self, selector: NetworkSelector) -> Result<ExternalResourceRef, BindingError> {
        self.bind(selector.into())
    }

    pub fn bind_role(&mut self, name: &str) -> Result<ExternalResourceRef, BindingError> {
        self.bind(Selector::RoleName {
            name: name.to_string(),
        })
    }

    /// Bind an existing security group by name within `scope`.
    pub fn bind_policy_by_name(
        &mut self,
        name: &str,
        scope: &ExternalResourceRef,
    ) -> Result<ExternalResourceRef, BindingError> {
        self.bind(Selector::SecurityGroupName {
            name: name.to_string(),
            network_id: scope.id().to_string(),
        })
    }

    pub fn bind_cluster_by_identity(
        &mut self,
        target: &TargetEnvironment,
        cluster_name: &str,
    ) -> Result<ExternalResourceRef, BindingError> {
        let arn = target.format_arn("ecs", "cluster", cluster_name);
        self.bind(Selector::ClusterArn { arn })
    }

    /// Every selector resolved so far, in selector order.
    pub fn resolved(&self) -> impl Iterator<Item = (&Selector, &ResourceIdentity)> {
        self.resolved.iter()
    }

    fn bind(&mut self, selector: Selector) -> Result<ExternalResourceRef, BindingError> {
        let kind = selector.kind();

        if let Some(identity) = self.resolved.get(&selector) {
            debug!(selector = %selector, "Reusing resolved binding");
            return Ok(ExternalResourceRef {
                kind,
                selector,
                identity: identity.clone(),
            });
        }

        let mut candidates = self.directory.lookup(&selector).map_err(|e| {
            warn!(selector = %selector, error = %e, "Environment lookup failed");
            BindingError::DirectoryUnavailable {
                selector: selector.to_string(),
                reason: e.to_string(),
            }
        })?;
        debug!(selector = %selector, candidates = candidates.len(), "Environment lookup");

        let identity = match candidates.len() {
            0 => {
                warn!(selector = %selector, "Selector matched no {}", kind);
                return Err(BindingError::ResourceNotFound {
                    kind,
                    selector: selector.to_string(),
                });
            }
            1 => candidates.remove(0),
            _ => {
                candidates.sort();
                warn!(selector = %selector, "Selector matched {} {} candidates", candidates.len(), kind);
                return Err(BindingError::AmbiguousSelector {
                    kind,
                    selector: selector.to_string(),
                    candidates: candidates.into_iter().map(|c| c.id).collect(),
                });
            }
        };

        self.resolved.insert(selector.clone(), identity.clone());
        Ok(ExternalResourceRef {
            kind,
            selector,
            identity,
        })
    }
}
