// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CloudFormation Synthesizer
//!
//! Renders a [`DeclarationSet`] into the CloudFormation template the
//! deployment tool applies.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Domain declarations → provider schema
//! - **Anti-Corruption:** The only module that knows CloudFormation property
//!   names and override paths
//!
//! # Resources
//!
//! | Declaration | Resource type |
//! |-------------|---------------|
//! | access policy | `AWS::EC2::SecurityGroup` |
//! | launch profile | `AWS::IAM::InstanceProfile` + `AWS::EC2::LaunchTemplate` |
//! | workload | `AWS::ECS::TaskDefinition` |
//!
//! External bindings are never rendered as resources. They are listed under
//! the template's `ecs-workspace:bindings` metadata.
//!
//! # Overrides
//!
//! Launch templates are first rendered generically (latest Amazon Linux 2
//! image, default bootstrap script), then every [`PropertyOverride`] on the
//! profile is written over its schema path and recorded under the resource's
//! `ecs-workspace:overrides` metadata.

use crate::domain::declaration::DeclarationSet;
use crate::domain::environment::ExternalResourceRef;
use crate::domain::launch_profile::{LaunchField, LaunchProfile, PolicyAttachment, PropertyOverride};
use crate::domain::network_policy::{AccessPolicy, Protocol};
use crate::domain::workload::{NetworkMode, WorkloadDefinition};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const OVERRIDES_METADATA_KEY: &str = "ecs-workspace:overrides";
pub const BINDINGS_METADATA_KEY: &str = "ecs-workspace:bindings";

/// `#!/bin/bash`, base64 encoded; what the generic launch schema injects.
pub const DEFAULT_USER_DATA: &str = "IyEvYmluL2Jhc2g=";

const ALL_TRAFFIC_CIDR: &str = "0.0.0.0/0";

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Logical id '{logical_id}' is generated for both '{first}' and '{second}'")]
    DuplicateLogicalId {
        logical_id: String,
        first: String,
        second: String,
    },

    #[error("Binding '{selector}' has no ARN but '{consumer}' requires one")]
    MissingArn { selector: String, consumer: String },

    #[error("Launch profile '{profile}' is attached to undeclared access policy '{policy}'")]
    UndeclaredPolicy { profile: String, policy: String },

    #[error("Failed to render template as JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to render template as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Schema path a logical launch field is written to.
pub fn override_path(field: LaunchField) -> &'static str {
    match field {
        LaunchField::Image => "Properties.LaunchTemplateData.ImageId",
        LaunchField::Bootstrap => "Properties.LaunchTemplateData.UserData",
    }
}

/// Logical id of a construct: its alphanumeric path plus the first 8
/// uppercase hex digits of SHA-256 over `<stack>/<path>`.
pub fn logical_id(stack_name: &str, construct_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}/{}", stack_name, construct_path).as_bytes());
    let digest = hex::encode_upper(hasher.finalize());

    let base: String = construct_path.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("{}{}", base, &digest[..8])
}

/// A synthesized CloudFormation template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    document: Value,
}

impl Template {
    pub fn as_value(&self) -> &Value {
        &self.document
    }

    pub fn description(&self) -> Option<&str> {
        self.document.get("Description").and_then(Value::as_str)
    }

    pub fn resources(&self) -> Option<&Map<String, Value>> {
        self.document.get("Resources").and_then(Value::as_object)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.resources().and_then(|r| r.get(logical_id))
    }

    /// Resources of `resource_type`, in logical id order.
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<(&str, &Value)> {
        self.resources()
            .map(|resources| {
                resources
                    .iter()
                    .filter(|(_, r)| r.get("Type").and_then(Value::as_str) == Some(resource_type))
                    .map(|(id, r)| (id.as_str(), r))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.document.get("Metadata").and_then(|m| m.get(key))
    }

    pub fn to_json_pretty(&self) -> Result<String, SynthesisError> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    pub fn to_yaml(&self) -> Result<String, SynthesisError> {
        Ok(serde_yaml::to_string(&self.document)?)
    }

    /// SHA-256 hex digest of the canonical (compact, key-sorted) JSON.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub struct CloudFormationSynthesizer;

impl CloudFormationSynthesizer {
    pub fn synthesize(declarations: &DeclarationSet) -> Result<Template, SynthesisError> {
        let stack = declarations.stack_name();
        let mut resources = Resources::default();

        for policy in declarations.access_policies() {
            let id = logical_id(stack, policy.construct_id());
            resources.insert(id, policy.construct_id(), render_security_group(policy))?;
        }

        for profile in declarations.launch_profiles() {
            let profile_path = format!("{}/InstanceProfile", profile.name());
            let profile_id = logical_id(stack, &profile_path);
            resources.insert(profile_id.clone(), &profile_path, render_instance_profile(profile))?;

            let group = security_group_id(declarations, profile)?;
            let mut template = render_launch_template(profile, &profile_id, group);
            apply_overrides(&mut template, profile.overrides());
            resources.insert(logical_id(stack, profile.name()), profile.name(), template)?;
        }

        for workload in declarations.workloads() {
            let id = logical_id(stack, workload.construct_id());
            resources.insert(id, workload.construct_id(), render_task_definition(workload)?)?;
        }

        let mut bindings = Map::new();
        for binding in declarations.bindings() {
            bindings.insert(binding.construct_id.clone(), render_binding(&binding.reference));
        }

        let target = declarations.target();
        let document = json!({
            "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
            "Description": format!("{} ({}/{})", stack, target.account(), target.region()),
            "Metadata": {
                BINDINGS_METADATA_KEY: bindings,
            },
            "Resources": resources.into_map(),
        });

        info!(
            "Synthesized template for '{}' with {} resources",
            stack,
            document["Resources"].as_object().map_or(0, Map::len)
        );
        Ok(Template { document })
    }
}

/// Resource table that refuses logical id collisions.
#[derive(Default)]
struct Resources {
    entries: BTreeMap<String, (String, Value)>,
}

impl Resources {
    fn insert(&mut self, logical_id: String, construct_path: &str, resource: Value) -> Result<(), SynthesisError> {
        if let Some((first, _)) = self.entries.get(&logical_id) {
            return Err(SynthesisError::DuplicateLogicalId {
                logical_id,
                first: first.clone(),
                second: construct_path.to_string(),
            });
        }
        debug!("Rendering {} as {}", construct_path, logical_id);
        self.entries.insert(logical_id, (construct_path.to_string(), resource));
        Ok(())
    }

    fn into_map(self) -> Map<String, Value> {
        self.entries.into_iter().map(|(id, (_, resource))| (id, resource)).collect()
    }
}

fn render_binding(reference: &ExternalResourceRef) -> Value {
    let mut binding = json!({
        "kind": reference.kind(),
        "selector": reference.selector().to_string(),
        "id": reference.id(),
    });
    if let Some(arn) = reference.arn() {
        binding["arn"] = json!(arn);
    }
    binding
}

fn render_security_group(policy: &AccessPolicy) -> Value {
    let ingress: Vec<Value> = policy
        .rules()
        .iter()
        .map(|rule| {
            let mut entry = json!({
                "CidrIp": rule.source.as_str(),
                "Description": rule.description,
                "IpProtocol": rule.protocol.as_str(),
            });
            if rule.protocol != Protocol::All {
                entry["FromPort"] = json!(rule.ports.low());
                entry["ToPort"] = json!(rule.ports.high());
            }
            entry
        })
        .collect();

    let mut properties = json!({
        "GroupName": policy.name(),
        "GroupDescription": policy.description(),
        "VpcId": policy.scope().id(),
        "SecurityGroupIngress": ingress,
    });
    if policy.allow_all_outbound() {
        properties["SecurityGroupEgress"] = json!([{
            "CidrIp": ALL_TRAFFIC_CIDR,
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": Protocol::All.as_str(),
        }]);
    }

    json!({
        "Type": "AWS::EC2::SecurityGroup",
        "Properties": properties,
    })
}

fn render_instance_profile(profile: &LaunchProfile) -> Value {
    json!({
        "Type": "AWS::IAM::InstanceProfile",
        "Properties": {
            "Roles": [profile.role().id()],
        },
    })
}

fn security_group_id(declarations: &DeclarationSet, profile: &LaunchProfile) -> Result<Value, SynthesisError> {
    match profile.network_policy() {
        PolicyAttachment::External(group) => Ok(json!(group.id())),
        PolicyAttachment::Declared { name, construct_id } => {
            if declarations.access_policy(name).is_none() {
                return Err(SynthesisError::UndeclaredPolicy {
                    profile: profile.name().to_string(),
                    policy: name.clone(),
                });
            }
            let id = logical_id(declarations.stack_name(), construct_id);
            Ok(json!({ "Fn::GetAtt": [id, "GroupId"] }))
        }
    }
}

/// Generic launch template, before any override is applied.
fn render_launch_template(profile: &LaunchProfile, instance_profile_id: &str, security_group: Value) -> Value {
    json!({
        "Type": "AWS::EC2::LaunchTemplate",
        "Properties": {
            "LaunchTemplateName": profile.name(),
            "LaunchTemplateData": {
                "CreditSpecification": { "CpuCredits": profile.credit_mode().as_str() },
                "EbsOptimized": profile.storage_optimized(),
                "IamInstanceProfile": {
                    "Arn": { "Fn::GetAtt": [instance_profile_id, "Arn"] },
                },
                "ImageId": profile.base_image().parameter().render(),
                "InstanceType": profile.capacity_class().instance_type(),
                "SecurityGroupIds": [security_group],
                "UserData": DEFAULT_USER_DATA,
            },
        },
        "DependsOn": [instance_profile_id],
    })
}

fn apply_overrides(resource: &mut Value, overrides: &[PropertyOverride]) {
    if overrides.is_empty() {
        return;
    }

    let mut recorded = Vec::with_capacity(overrides.len());
    for o in overrides {
        let path = override_path(o.field);
        info!("Applying override {} -> {} = {:?}", o.field, path, o.value);
        set_path(resource, path, json!(o.value));
        recorded.push(json!({ "field": o.field, "path": path, "value": o.value }));
    }
    resource["Metadata"][OVERRIDES_METADATA_KEY] = Value::Array(recorded);
}

/// Write `value` at a dotted path, creating intermediate objects.
fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut node = root;
    for key in path.split('.') {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = &mut node[key];
    }
    *node = value;
}

fn render_task_definition(workload: &WorkloadDefinition) -> Result<Value, SynthesisError> {
    let execution_role = workload.execution_role();
    let execution_role_arn = execution_role.arn().ok_or_else(|| SynthesisError::MissingArn {
        selector: execution_role.selector().to_string(),
        consumer: workload.construct_id().to_string(),
    })?;

    // Host port must equal container port when the workload owns its interface
    let pin_host_port = matches!(workload.network_mode(), NetworkMode::AwsVpc | NetworkMode::Host);

    let containers: Vec<Value> = workload
        .units()
        .iter()
        .map(|unit| {
            let port_mappings: Vec<Value> = unit
                .port_mappings
                .iter()
                .map(|m| {
                    let mut mapping = json!({
                        "ContainerPort": m.container_port,
                        "Protocol": m.protocol.as_str(),
                    });
                    if pin_host_port {
                        mapping["HostPort"] = json!(m.container_port);
                    }
                    mapping
                })
                .collect();

            let mut container = json!({
                "Essential": unit.essential,
                "Image": unit.image.as_str(),
                "Name": unit.name,
                "PortMappings": port_mappings,
            });
            if let Some(mib) = unit.memory_reservation_mib {
                container["MemoryReservation"] = json!(mib);
            }
            container
        })
        .collect();

    Ok(json!({
        "Type": "AWS::ECS::TaskDefinition",
        "Properties": {
            "ContainerDefinitions": containers,
            "Cpu": workload.cpu_units().to_string(),
            "ExecutionRoleArn": execution_role_arn,
            "Family": workload.family(),
            "Memory": workload.memory_mib().to_string(),
            "NetworkMode": workload.network_mode().as_str(),
            "RequiresCompatibilities": workload.compatibility().launch_types(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::architecture::Architecture;
    use crate::domain::environment::test_support::{role_ref, security_group_ref};
    use crate::domain::environment::TargetEnvironment;
    use crate::domain::launch_profile::LaunchProfileComposer;

    fn x86_profile() -> LaunchProfile {
        let group = PolicyAttachment::External(security_group_ref("default", "sg-0def", "vpc-1"));
        LaunchProfileComposer::compose_for(Architecture::X86, &role_ref("ecsInstanceRole"), &group)
    }

    fn ssh_attachment() -> PolicyAttachment {
        PolicyAttachment::Declared {
            name: "ssh".to_string(),
            construct_id: "securityGroupSsh".to_string(),
        }
    }

    fn empty_declarations() -> DeclarationSet {
        DeclarationSet::new("EcsWorkspaceStack", TargetEnvironment::new("123456789012", "eu-west-1").unwrap())
    }

    #[test]
    fn test_declared_policy_attachment_references_the_group() {
        use crate::domain::environment::test_support::network_ref;
        use crate::domain::network_policy::NetworkPolicyBuilder;

        let mut builder = NetworkPolicyBuilder::new("EcsWorkspaceStack");
        builder.new_policy("ssh", &network_ref("vpc-1")).unwrap();
        let mut declarations = empty_declarations();
        for policy in builder.into_policies() {
            declarations.register_policy(policy).unwrap();
        }
        let profile = LaunchProfileComposer::compose_for(Architecture::Arm, &role_ref("ecsInstanceRole"), &ssh_attachment());
        let profile_name = profile.name().to_string();
        declarations.register_launch_profile(profile).unwrap();

        let template = CloudFormationSynthesizer::synthesize(&declarations).unwrap();
        let group_id = logical_id("EcsWorkspaceStack", "securityGroupSsh");
        let launch_template = template
            .resource(&logical_id("EcsWorkspaceStack", &profile_name))
            .unwrap();

        assert!(template.resource(&group_id).is_some());
        assert_eq!(
            launch_template["Properties"]["LaunchTemplateData"]["SecurityGroupIds"],
            json!([{ "Fn::GetAtt": [group_id, "GroupId"] }])
        );
    }

    #[test]
    fn test_attachment_to_undeclared_policy_fails() {
        let mut declarations = empty_declarations();
        let profile = LaunchProfileComposer::compose_for(Architecture::Arm, &role_ref("ecsInstanceRole"), &ssh_attachment());
        let profile_name = profile.name().to_string();
        declarations.register_launch_profile(profile).unwrap();

        match CloudFormationSynthesizer::synthesize(&declarations) {
            Err(SynthesisError::UndeclaredPolicy { profile, policy }) => {
                assert_eq!(profile, profile_name);
                assert_eq!(policy, "ssh");
            }
            other => panic!("expected undeclared policy, got {:?}", other),
        }
    }

    #[test]
    fn test_generic_launch_template_uses_schema_defaults() {
        let profile = x86_profile();
        let rendered = render_launch_template(&profile, "x86InstanceProfile", json!("sg-0def"));
        let data = &rendered["Properties"]["LaunchTemplateData"];

        assert_eq!(
            data["ImageId"],
            json!("resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2")
        );
        assert_eq!(data["UserData"], json!(DEFAULT_USER_DATA));
        assert!(rendered.get("Metadata").is_none());
    }

    #[test]
    fn test_overrides_replace_schema_defaults() {
        let profile = x86_profile();
        let mut rendered = render_launch_template(&profile, "x86InstanceProfile", json!("sg-0def"));
        apply_overrides(&mut rendered, profile.overrides());
        let data = &rendered["Properties"]["LaunchTemplateData"];

        assert_eq!(data["ImageId"], json!(profile.image_override().unwrap()));
        assert_eq!(data["UserData"], json!(""));
        assert_eq!(data["InstanceType"], json!("t3a.medium"));
        assert_eq!(rendered["Metadata"][OVERRIDES_METADATA_KEY].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_execution_role_without_arn_fails() {
        use crate::domain::environment::test_support::network_ref;
        use crate::domain::workload::{Compatibility, RunnableUnitSpec, WorkloadDefinitionBuilder};

        let mut workload = WorkloadDefinitionBuilder::define_workload(
            "nginx",
            256,
            512,
            &network_ref("vpc-1"),
            Compatibility::Ec2,
            NetworkMode::Bridge,
        );
        workload
            .add_runnable_unit(RunnableUnitSpec::new("web", "public.ecr.aws/nginx/nginx:stable").essential(true))
            .unwrap();

        assert!(matches!(
            render_task_definition(&workload),
            Err(SynthesisError::MissingArn { .. })
        ));
    }

    #[test]
    fn test_bridge_mode_leaves_host_port_dynamic() {
        use crate::domain::workload::{Compatibility, RunnableUnitSpec, WorkloadDefinitionBuilder};

        let mut workload = WorkloadDefinitionBuilder::define_workload(
            "nginx",
            256,
            512,
            &role_ref("ecsExecutionRole"),
            Compatibility::Ec2,
            NetworkMode::Bridge,
        );
        workload
            .add_runnable_unit(
                RunnableUnitSpec::new("web", "public.ecr.aws/nginx/nginx:stable")
                    .essential(true)
                    .publish(80),
            )
            .unwrap();

        let rendered = render_task_definition(&workload).unwrap();
        let mapping = &rendered["Properties"]["ContainerDefinitions"][0]["PortMappings"][0];
        assert_eq!(mapping["ContainerPort"], json!(80));
        assert!(mapping.get("HostPort").is_none());
        assert!(rendered["Properties"]["ContainerDefinitions"][0].get("MemoryReservation").is_none());
    }

    #[test]
    fn test_logical_id_is_stable() {
        let a = logical_id("EcsWorkspaceStack", "securityGroupSsh");
        let b = logical_id("EcsWorkspaceStack", "securityGroupSsh");

        assert_eq!(a, b);
        assert!(a.starts_with("securityGroupSsh"));
        assert_eq!(a.len(), "securityGroupSsh".len() + 8);
        assert!(a[16..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_logical_id_depends_on_stack() {
        assert_ne!(logical_id("StackA", "x86"), logical_id("StackB", "x86"));
    }

    #[test]
    fn test_logical_id_strips_separators() {
        assert!(logical_id("EcsWorkspaceStack", "arm/InstanceProfile").starts_with("armInstanceProfile"));
    }

    #[test]
    fn test_set_path_creates_intermediate_objects() {
        let mut resource = json!({ "Type": "AWS::EC2::LaunchTemplate" });
        set_path(&mut resource, "Properties.LaunchTemplateData.UserData", json!(""));

        assert_eq!(resource["Properties"]["LaunchTemplateData"]["UserData"], json!(""));
        assert_eq!(resource["Type"], json!("AWS::EC2::LaunchTemplate"));
    }

    #[test]
    fn test_override_paths() {
        assert_eq!(override_path(LaunchField::Image), "Properties.LaunchTemplateData.ImageId");
        assert_eq!(override_path(LaunchField::Bootstrap), "Properties.LaunchTemplateData.UserData");
    }

    #[test]
    fn test_duplicate_logical_id_is_rejected() {
        let mut resources = Resources::default();
        resources.insert("x86ABCD1234".to_string(), "x86", json!({})).unwrap();

        assert!(matches!(
            resources.insert("x86ABCD1234".to_string(), "x-86", json!({})),
            Err(SynthesisError::DuplicateLogicalId { .. })
        ));
    }
}
