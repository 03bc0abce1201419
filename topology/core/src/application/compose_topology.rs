// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Compose Topology Use Case
//!
//! Application service that turns a [`TopologyPlan`] and a target environment
//! into a complete [`DeclarationSet`].
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Orchestrate one composition run
//! - **Collaborators:**
//!   - Domain: EnvironmentBinder, NetworkPolicyBuilder, LaunchProfileComposer,
//!     WorkloadDefinitionBuilder, DeclarationSet
//!   - Infrastructure: any EnvironmentDirectory, CloudFormationSynthesizer
//!
//! # Flow
//!
//! 1. Bind the network, then the instance and execution roles
//! 2. Bind the default security group inside the bound network
//! 3. Bind the cluster by its constructed identity
//! 4. Declare the access policies and their ingress rules
//! 5. Compose one launch profile per supported architecture
//! 6. Define the workload and its runnable units
//! 7. Return the declaration set (or synthesize it into a template)
//!
//! Any failure aborts the run; nothing partial is returned.

use crate::domain::architecture::{ArchitectureCatalog, ArchitectureError};
use crate::domain::declaration::{DeclarationError, DeclarationSet};
use crate::domain::environment::{BindingError, EnvironmentBinder, EnvironmentDirectory, TargetEnvironment};
use crate::domain::launch_profile::{LaunchProfileComposer, PolicyAttachment};
use crate::domain::network_policy::{NetworkPolicyBuilder, PolicyError, Source};
use crate::domain::plan::TopologyPlan;
use crate::domain::workload::{WorkloadDefinitionBuilder, WorkloadError};
use crate::infrastructure::cloudformation::{CloudFormationSynthesizer, SynthesisError, Template};
use thiserror::Error;
use tracing::{info, warn};

/// Construct ids of the external bindings.
pub const NETWORK_BINDING: &str = "defaultVpc";
pub const INSTANCE_ROLE_BINDING: &str = "instance_role";
pub const EXECUTION_ROLE_BINDING: &str = "task_execution_role";
pub const DEFAULT_POLICY_BINDING: &str = "securityGroupDefault";
pub const CLUSTER_BINDING: &str = "defaultEcsCluster";

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error(transparent)]
    Architecture(#[from] ArchitectureError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// Compose Topology Use Case
pub trait ComposeTopologyUseCase {
    /// Resolve every external reference and declare every resource in `plan`.
    ///
    /// # Errors
    ///
    /// - Binding errors: a selector matched zero or several resources
    /// - Architecture errors: an unsupported, missing or repeated architecture tag
    /// - Policy/workload errors: invalid rules, ports, images or units
    /// - Declaration errors: two declarations share a construct id
    fn compose(&self, target: &TargetEnvironment, plan: &TopologyPlan) -> Result<DeclarationSet, TopologyError>;

    /// Compose and synthesize in one step.
    fn synthesize(&self, target: &TargetEnvironment, plan: &TopologyPlan) -> Result<Template, TopologyError> {
        let declarations = self.compose(target, plan)?;
        Ok(CloudFormationSynthesizer::synthesize(&declarations)?)
    }
}

/// Standard implementation of ComposeTopologyUseCase
pub struct TopologyComposer<'a> {
    directory: &'a dyn EnvironmentDirectory,
}

impl<'a> TopologyComposer<'a> {
    pub fn new(directory: &'a dyn EnvironmentDirectory) -> Self {
        Self { directory }
    }

    fn compose_into(
        &self,
        declarations: &mut DeclarationSet,
        plan: &TopologyPlan,
    ) -> Result<(), TopologyError> {
        let mut binder = EnvironmentBinder::new(self.directory);
        let target = declarations.target().clone();

        // Step 1-3: external bindings, network first since the policy lookup is scoped to it
        let network = binder.bind_network(plan.network.clone())?;
        let instance_role = binder.bind_role(&plan.instance_role)?;
        let execution_role = binder.bind_role(&plan.execution_role)?;
        let default_policy = binder.bind_policy_by_name(&plan.default_policy, &network)?;
        let cluster = binder.bind_cluster_by_identity(&target, &plan.cluster_name)?;

        declarations.register_binding(NETWORK_BINDING, network.clone())?;
        declarations.register_binding(INSTANCE_ROLE_BINDING, instance_role.clone())?;
        declarations.register_binding(EXECUTION_ROLE_BINDING, execution_role.clone())?;
        declarations.register_binding(DEFAULT_POLICY_BINDING, default_policy.clone())?;
        declarations.register_binding(CLUSTER_BINDING, cluster)?;

        // Step 4: access policies
        let mut policies = NetworkPolicyBuilder::new(&plan.stack_name);
        for policy_plan in &plan.access_policies {
            let handle = match &policy_plan.construct_id {
                Some(construct_id) => policies.new_policy_with_id(&policy_plan.name, construct_id, &network)?,
                None => policies.new_policy(&policy_plan.name, &network)?,
            };
            for rule in &policy_plan.rules {
                policies.add_rule(
                    handle,
                    rule.protocol,
                    rule.port_low,
                    rule.port_high,
                    Source::cidr(&rule.source)?,
                    &rule.description,
                )?;
            }
        }
        for policy in policies.into_policies() {
            declarations.register_policy(policy)?;
        }

        // Step 5: one launch profile per supported architecture, all attached to the
        // pre-existing default group
        let attachment = PolicyAttachment::External(default_policy);
        for arch in ArchitectureCatalog::resolve_all(&plan.architectures)? {
            let profile = LaunchProfileComposer::compose_for(arch, &instance_role, &attachment);
            declarations.register_launch_profile(profile)?;
        }

        // Step 6: workload
        let workload_plan = &plan.workload;
        let mut workload = WorkloadDefinitionBuilder::define_workload(
            &workload_plan.family,
            workload_plan.cpu_units,
            workload_plan.memory_mib,
            &execution_role,
            workload_plan.compatibility,
            workload_plan.network_mode,
        );
        for unit in &workload_plan.units {
            workload.add_runnable_unit(unit.clone())?;
        }
        workload.ensure_complete()?;
        declarations.register_workload(workload)?;

        Ok(())
    }
}

impl ComposeTopologyUseCase for TopologyComposer<'_> {
    fn compose(&self, target: &TargetEnvironment, plan: &TopologyPlan) -> Result<DeclarationSet, TopologyError> {
        info!(
            "Composing topology '{}' for account {} in {}",
            plan.stack_name,
            target.account(),
            target.region()
        );

        let mut declarations = DeclarationSet::new(&plan.stack_name, target.clone());
        if let Err(e) = self.compose_into(&mut declarations, plan) {
            warn!("Composition of '{}' aborted: {}", plan.stack_name, e);
            return Err(e);
        }

        info!(
            "Composed topology '{}': {} bindings, {} access policies, {} launch profiles, {} workloads",
            plan.stack_name,
            declarations.bindings().len(),
            declarations.access_policies().len(),
            declarations.launch_profiles().len(),
            declarations.workloads().len()
        );
        Ok(declarations)
    }
}
