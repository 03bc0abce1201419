// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Declaration Set
//!
//! The in-memory output of one composition run: every external binding that
//! was resolved plus every resource this system declares (access policies,
//! launch profiles, workloads). Registering is a local append; nothing leaves
//! the process until the whole set has been built and is handed to a
//! synthesizer.

use crate::domain::environment::{ExternalResourceRef, TargetEnvironment};
use crate::domain::launch_profile::LaunchProfile;
use crate::domain::network_policy::AccessPolicy;
use crate::domain::workload::{WorkloadDefinition, WorkloadError};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Construct id '{0}' is declared more than once")]
    DuplicateConstructId(String),

    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

/// An external resource the topology attaches to, labelled by purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// Construct id the binding is known by (e.g. `defaultVpc`).
    pub construct_id: String,
    pub reference: ExternalResourceRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationSet {
    stack_name: String,
    target: TargetEnvironment,
    bindings: Vec<Binding>,
    access_policies: Vec<AccessPolicy>,
    launch_profiles: Vec<LaunchProfile>,
    workloads: Vec<WorkloadDefinition>,
    #[serde(skip)]
    construct_ids: BTreeSet<String>,
}

impl DeclarationSet {
    pub fn new(stack_name: impl Into<String>, target: TargetEnvironment) -> Self {
        Self {
            stack_name: stack_name.into(),
            target,
            bindings: Vec::new(),
            access_policies: Vec::new(),
            launch_profiles: Vec::new(),
            workloads: Vec::new(),
            construct_ids: BTreeSet::new(),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn target(&self) -> &TargetEnvironment {
        &self.target
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn access_policies(&self) -> &[AccessPolicy] {
        &self.access_policies
    }

    pub fn access_policy(&self, name: &str) -> Option<&AccessPolicy> {
        self.access_policies.iter().find(|p| p.name() == name)
    }

    pub fn launch_profiles(&self) -> &[LaunchProfile] {
        &self.launch_profiles
    }

    pub fn launch_profile(&self, name: &str) -> Option<&LaunchProfile> {
        self.launch_profiles.iter().find(|p| p.name() == name)
    }

    pub fn workloads(&self) -> &[WorkloadDefinition] {
        &self.workloads
    }

    pub fn workload(&self, family: &str) -> Option<&WorkloadDefinition> {
        self.workloads.iter().find(|w| w.family() == family)
    }

    pub fn register_binding(
        &mut self,
        construct_id: &str,
        reference: ExternalResourceRef,
    ) -> Result<(), DeclarationError> {
        self.claim(construct_id)?;
        self.bindings.push(Binding {
            construct_id: construct_id.to_string(),
            reference,
        });
        Ok(())
    }

    pub fn register_policy(&mut self, policy: AccessPolicy) -> Result<(), DeclarationError> {
        self.claim(policy.construct_id())?;
        info!("Declared access policy '{}' ({} rules)", policy.name(), policy.rules().len());
        self.access_policies.push(policy);
        Ok(())
    }

    pub fn register_launch_profile(&mut self, profile: LaunchProfile) -> Result<(), DeclarationError> {
        self.claim(profile.name())?;
        info!(
            "Declared launch profile '{}' ({})",
            profile.name(),
            profile.capacity_class()
        );
        self.launch_profiles.push(profile);
        Ok(())
    }

    /// Register a workload; it must be complete (see
    /// [`WorkloadDefinition::ensure_complete`]).
    pub fn register_workload(&mut self, workload: WorkloadDefinition) -> Result<(), DeclarationError> {
        workload.ensure_complete()?;
        self.claim(workload.construct_id())?;
        info!(
            "Declared workload '{}' ({} runnable units)",
            workload.family(),
            workload.units().len()
        );
        self.workloads.push(workload);
        Ok(())
    }

    fn claim(&mut self, construct_id: &str) -> Result<(), DeclarationError> {
        if !self.construct_ids.insert(construct_id.to_string()) {
            return Err(DeclarationError::DuplicateConstructId(construct_id.to_string()));
        }
        Ok(())
    }
}
