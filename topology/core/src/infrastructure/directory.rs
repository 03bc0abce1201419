// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Environment Snapshot Directory
//!
//! An [`EnvironmentDirectory`] backed by a YAML snapshot of the target
//! account: its networks, roles, security groups and clusters.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → directory lookups
//! - **Anti-Corruption:** Snapshot field names follow the provider's spelling
//!
//! # Snapshot Format
//!
//! ```yaml
//! networks:
//!   - id: vpc-0a1b2c3d
//!     default: true
//! roles:
//!   - name: ecsInstanceRole
//!     arn: arn:aws:iam::123456789012:role/ecsInstanceRole
//! securityGroups:
//!   - id: sg-0def
//!     name: default
//!     networkId: vpc-0a1b2c3d
//! clusters:
//!   - name: default
//!     arn: arn:aws:ecs:eu-west-1:123456789012:cluster/default
//! ```

use crate::domain::environment::{DirectoryError, EnvironmentDirectory, ResourceIdentity, Selector};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    #[serde(default)]
    pub networks: Vec<NetworkRecord>,
    #[serde(default)]
    pub roles: Vec<RoleRecord>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupRecord>,
    #[serde(default)]
    pub clusters: Vec<ClusterRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupRecord {
    pub id: String,
    pub name: String,
    pub network_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub name: String,
    pub arn: String,
}

impl EnvironmentSnapshot {
    fn matches(&self, selector: &Selector) -> Vec<ResourceIdentity> {
        match selector {
            Selector::DefaultNetwork => self
                .networks
                .iter()
                .filter(|n| n.default)
                .map(|n| ResourceIdentity::new(&n.id))
                .collect(),
            Selector::NetworkId { id } => self
                .networks
                .iter()
                .filter(|n| &n.id == id)
                .map(|n| ResourceIdentity::new(&n.id))
                .collect(),
            Selector::RoleName { name } => self
                .roles
                .iter()
                .filter(|r| &r.name == name)
                .map(|r| ResourceIdentity::with_arn(&r.name, &r.arn))
                .collect(),
            Selector::SecurityGroupName { name, network_id } => self
                .security_groups
                .iter()
                .filter(|g| &g.name == name && &g.network_id == network_id)
                .map(|g| ResourceIdentity::new(&g.id))
                .collect(),
            Selector::ClusterArn { arn } => self
                .clusters
                .iter()
                .filter(|c| &c.arn == arn)
                .map(|c| ResourceIdentity::with_arn(&c.name, &c.arn))
                .collect(),
        }
    }
}

/// Read-only directory over an [`EnvironmentSnapshot`].
///
/// Counts lookups per selector so callers can check how often the
/// environment was consulted.
pub struct InMemoryEnvironmentDirectory {
    snapshot: EnvironmentSnapshot,
    lookups: Mutex<HashMap<Selector, usize>>,
}

impl InMemoryEnvironmentDirectory {
    pub fn from_snapshot(snapshot: EnvironmentSnapshot) -> Self {
        Self {
            snapshot,
            lookups: Mutex::new(HashMap::new()),
        }
    }

    /// Parse a snapshot from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let snapshot: EnvironmentSnapshot =
            serde_yaml::from_str(yaml).context("Failed to parse environment snapshot YAML")?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Parse a snapshot from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read environment snapshot: {:?}", path.as_ref()))?;

        Self::from_yaml(&yaml)
    }

    pub fn snapshot(&self) -> &EnvironmentSnapshot {
        &self.snapshot
    }

    pub fn lookup_count(&self, selector: &Selector) -> usize {
        self.lookups.lock().get(selector).copied().unwrap_or(0)
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().values().sum()
    }
}

impl EnvironmentDirectory for InMemoryEnvironmentDirectory {
    fn lookup(&self, selector: &Selector) -> Result<Vec<ResourceIdentity>, DirectoryError> {
        *self.lookups.lock().entry(selector.clone()).or_insert(0) += 1;

        let found = self.snapshot.matches(selector);
        debug!("Snapshot lookup {} -> {} match(es)", selector, found.len());
        Ok(found)
    }
}
