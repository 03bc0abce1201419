// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Topology Plan - the fixed shape of the ECS workspace
//
// Everything the composition needs besides the target account/region lives
// here as literal values:
// - which pre-existing network, roles, security group and cluster to bind
// - the access policies to declare and their ingress rules
// - the architectures to build launch profiles for
// - the workload (task) definition and its runnable units
//
// `TopologyPlan::default()` is the workspace topology. The struct is serde
// serializable so the plan can be reviewed as YAML next to the synthesized
// template; it is never read from the environment.

use crate::domain::environment::NetworkSelector;
use crate::domain::network_policy::Protocol;
use crate::domain::workload::{Compatibility, NetworkMode, RunnableUnitSpec};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STACK_NAME: &str = "EcsWorkspaceStack";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyPlan {
    /// Stack the declarations are grouped under
    pub stack_name: String,

    /// Network every policy and profile is scoped to
    pub network: NetworkSelector,

    /// Role launched instances operate as
    pub instance_role: String,

    /// Role the scheduler uses to start workloads
    pub execution_role: String,

    /// Pre-existing security group attached to every launch profile
    pub default_policy: String,

    pub access_policies: Vec<PolicyPlan>,

    /// Architecture tags, one launch profile each
    pub architectures: Vec<String>,

    /// Cluster name, bound as `arn:aws:ecs:<region>:<account>:cluster/<name>`
    pub cluster_name: String,

    pub workload: WorkloadPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPlan {
    pub name: String,
    /// Construct id; derived from `name` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construct_id: Option<String>,
    #[serde(default)]
    pub rules: Vec<RulePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePlan {
    pub protocol: Protocol,
    pub port_low: u16,
    pub port_high: u16,
    /// IPv4 CIDR block
    pub source: String,
    pub description: String,
}

impl RulePlan {
    fn tcp_from_anywhere(port: u16, description: &str) -> Self {
        Self {
            protocol: Protocol::Tcp,
            port_low: port,
            port_high: port,
            source: "0.0.0.0/0".to_string(),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadPlan {
    pub family: String,
    pub cpu_units: u32,
    pub memory_mib: u32,
    pub compatibility: Compatibility,
    pub network_mode: NetworkMode,
    pub units: Vec<RunnableUnitSpec>,
}

impl Default for TopologyPlan {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            network: NetworkSelector::Default,
            instance_role: "ecsInstanceRole".to_string(),
            execution_role: "ecsExecutionRole".to_string(),
            default_policy: "default".to_string(),
            // ssh is kept for instance-connect; key pairs are not part of the launch profiles
            access_policies: vec![
                PolicyPlan {
                    name: "ssh".to_string(),
                    construct_id: Some("securityGroupSsh".to_string()),
                    rules: vec![RulePlan::tcp_from_anywhere(22, "ssh access")],
                },
                PolicyPlan {
                    name: "http/https".to_string(),
                    construct_id: Some("securityGroupHttp".to_string()),
                    rules: vec![
                        RulePlan::tcp_from_anywhere(80, "http access"),
                        RulePlan::tcp_from_anywhere(443, "https access"),
                    ],
                },
            ],
            architectures: vec!["x86".to_string(), "arm".to_string()],
            cluster_name: "default".to_string(),
            workload: WorkloadPlan::default(),
        }
    }
}

impl Default for WorkloadPlan {
    fn default() -> Self {
        Self {
            family: "nginx".to_string(),
            cpu_units: 256,
            memory_mib: 512,
            compatibility: Compatibility::Ec2AndFargate,
            network_mode: NetworkMode::AwsVpc,
            units: vec![RunnableUnitSpec::new("web", "public.ecr.aws/nginx/nginx:stable")
                .essential(true)
                .publish(80)
                .memory_reservation(512)],
        }
    }
}

impl TopologyPlan {
    /// Render the plan for review.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_shape() {
        let plan = TopologyPlan::default();

        assert_eq!(plan.architectures, vec!["x86", "arm"]);
        assert_eq!(plan.access_policies.len(), 2);
        assert_eq!(plan.access_policies[0].name, "ssh");
        assert_eq!(plan.access_policies[1].rules.len(), 2);
        assert_eq!(plan.access_policies[1].construct_id.as_deref(), Some("securityGroupHttp"));
        assert_eq!(plan.workload.units.len(), 1);
        assert!(plan.workload.units[0].essential);
    }

    #[test]
    fn test_plan_yaml_round_trip() {
        let plan = TopologyPlan::default();
        let yaml = plan.to_yaml().unwrap();

        assert!(yaml.contains("ecsExecutionRole"));
        let parsed: TopologyPlan = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_partial_plan_uses_defaults() {
        let parsed: TopologyPlan = serde_yaml::from_str("cluster_name: staging\n").unwrap();

        assert_eq!(parsed.cluster_name, "staging");
        assert_eq!(parsed.instance_role, "ecsInstanceRole");
    }
}
